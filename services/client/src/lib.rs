pub mod adapters;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod render;
pub mod session;
pub mod store;
