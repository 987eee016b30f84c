// crates/pml-gateway-mcp/src/stdio.rs
// ============================================================================
// Module: MCP Stdio Transport
// Description: Framed JSON-RPC 2.0 over stdin/stdout.
// Purpose: Serve the MCP method set to a locally attached LLM client.
// Dependencies: pml-gateway-mcp::rpc, serde_json, tokio
// ============================================================================

//! ## Overview
//! The stdio transport reads newline-delimited JSON-RPC requests from
//! standard input and writes one response line per request to standard
//! output. Malformed lines reply with a parse error instead of terminating
//! the loop; the loop ends on end-of-file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;

use pml_gateway_core::error::GatewayError;

use crate::rpc::JsonRpcRequest;
use crate::rpc::JsonRpcResponse;
use crate::rpc::McpService;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// JSON-RPC parse error code.
const PARSE_ERROR: i64 = -32700;

// ============================================================================
// SECTION: Transport Loop
// ============================================================================

/// Serves JSON-RPC over the given reader/writer pair until end-of-file.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] on channel I/O failure; malformed
/// request lines are answered in-band and do not end the loop.
pub async fn serve<R, W>(
    service: &McpService,
    reader: R,
    mut writer: W,
) -> Result<(), GatewayError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|err| GatewayError::Internal(format!("stdio read: {err}")))?;
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => service.handle(request).await,
            Err(err) => JsonRpcResponse::failure(
                serde_json::Value::Null,
                PARSE_ERROR,
                format!("parse error: {err}"),
            ),
        };
        let mut payload = serde_json::to_string(&response)
            .map_err(|err| GatewayError::Internal(format!("stdio encode: {err}")))?;
        payload.push('\n');
        writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|err| GatewayError::Internal(format!("stdio write: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| GatewayError::Internal(format!("stdio flush: {err}")))?;
    }
}

/// Serves JSON-RPC over the process stdio streams.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] on channel I/O failure.
pub async fn serve_process_stdio(service: &McpService) -> Result<(), GatewayError> {
    serve(service, tokio::io::stdin(), tokio::io::stdout()).await
}
