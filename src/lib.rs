pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod grant;
pub mod permission;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod timeline;
pub mod utils;
