pub mod client;
pub mod config;
pub mod errors;
pub mod integrations;
pub mod logging;
pub mod server;
pub mod settings;
