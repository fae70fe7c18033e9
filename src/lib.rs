pub mod config;
pub mod errors;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod types;
pub mod ui;
