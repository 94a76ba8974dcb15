pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod fetch_head;
pub mod intent;
pub mod logging;
pub mod pending_db;
pub mod quality;
pub mod resolver;
pub mod retry;
pub mod transport;
pub mod url_model;
