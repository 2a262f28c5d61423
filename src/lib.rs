pub mod api;
pub mod config;
pub mod sensors;
pub mod session;
