pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod jwtoken;
pub mod loggers;
pub mod models;
pub mod server_messages;
pub mod store;
pub mod sync;
