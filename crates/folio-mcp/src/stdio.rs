//! MCP stdio transport: line-delimited JSON-RPC over stdin/stdout.
//!
//! One process serves one peer and runs until stdin closes.

use std::io::Write;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::server::{err_response, McpServer, PARSE_ERROR};

/// Run the stdio loop. The database is ping-checked before the first read so
/// a misconfigured path fails fast instead of on the first tool call.
pub async fn run(server: McpServer) -> anyhow::Result<()> {
    server.ping_db()?;
    info!("mcp stdio server ready");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                write_line(&err_response(
                    json!(null),
                    PARSE_ERROR,
                    &format!("Parse error: {e}"),
                ))?;
                continue;
            }
        };

        if let Some(response) = server.handle(&request).await {
            write_line(&response)?;
        }
    }

    debug!("stdin closed; mcp stdio server stopping");
    Ok(())
}

/// Write one JSON-RPC message and flush — the peer reads line-by-line.
fn write_line(response: &Value) -> std::io::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer(&mut out, response)?;
    out.write_all(b"\n")?;
    out.flush()
}
