pub mod config;
pub mod db;
pub mod error;
pub mod settings;
pub mod transport;
pub mod types;
