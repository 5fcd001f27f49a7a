//! CLI command modules.

pub mod config;
pub mod http;
pub mod messages;
pub mod peers;
