//! Model Context Protocol (MCP) engine and JSON-RPC implementations
//!
//! JSON-RPC validation, version negotiation and response formatting for the built-in engine.

pub mod rpc;
pub mod server;
