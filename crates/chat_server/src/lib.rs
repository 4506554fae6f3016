pub mod channels;
pub mod commands;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod handlers;
pub mod identity;
pub mod message_models;
pub mod mute_checkers;
pub mod parsers;
pub mod profile_store;
pub mod records;
pub mod replies;
pub mod router;
pub mod sanitize;
pub mod server_state;
pub mod types;
pub mod user_state;
