pub mod chat;
pub mod commands;
pub mod directory;
pub mod errors;
pub mod history;
pub mod message;
pub mod tabs;
pub mod transport;
