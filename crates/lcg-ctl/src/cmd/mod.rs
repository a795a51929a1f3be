//! CLI command modules.

pub mod http;
pub mod ping;
pub mod status;
