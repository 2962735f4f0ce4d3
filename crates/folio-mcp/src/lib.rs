//! Model-Context-Protocol surface: one server core serving two transports.
//!
//! The stdio transport is a single long-lived process speaking line-delimited
//! JSON-RPC; the streamable HTTP transport multiplexes sessions behind the
//! `mcp-session-id` header with an idle reaper.

pub mod http;
pub mod prompts;
pub mod resources;
pub mod server;
pub mod stdio;

pub use http::{router, McpHttpState};
pub use server::{McpError, McpServer};
