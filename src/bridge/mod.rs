//! MCP tool bridge: exposes integration operations to a voice agent and
//! speaks the results back as plain sentences.

pub mod catalogue;
pub mod client;
pub mod server;
pub mod speech;
pub mod types;

pub use client::{IntegrationsClient, ToolAuth};
pub use server::ToolBridge;
