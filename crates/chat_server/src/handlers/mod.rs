pub mod blocking;
pub mod client;
pub mod login;
pub mod moderation;
pub mod request;
