//! HTTP endpoint for question answering
//!
//! A small tokio-based HTTP/1.1 server with one real route, `POST /query`,
//! which takes `{"question": "..."}` and answers with the generated SQL and
//! its rows.

use crate::db::QueryOutcome;
use crate::orchestrator::Orchestrator;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

/// Requests larger than this are cut off.
const MAX_REQUEST_BYTES: usize = 1_000_000;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
}

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, orchestrator: Arc<Orchestrator>) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("New connection from: {}", addr);
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            handle_connection(stream, &orchestrator).await;
        });
    }
}

pub async fn handle_connection<S>(mut stream: S, orchestrator: &Orchestrator)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match timeout(READ_TIMEOUT, read_request(&mut stream)).await {
        Ok(Ok(Some(request))) => request,
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            warn!("Failed to read from stream: {}", e);
            return;
        }
        Err(_) => {
            warn!("Request read timeout");
            return;
        }
    };

    let response = handle_request(orchestrator, &request).await;
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Failed to write response: {}", e);
    }
}

async fn read_request<S>(stream: &mut S) -> std::io::Result<Option<String>>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(headers_end) = find_headers_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..headers_end]);
            let content_length = extract_content_length(&head).unwrap_or(0);
            if buffer.len() >= headers_end + content_length {
                break;
            }
        }
        if buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }

    if buffer.is_empty() {
        return Ok(None);
    }
    match String::from_utf8(buffer) {
        Ok(request) => Ok(Some(request)),
        Err(e) => {
            warn!("Failed to parse request as UTF-8: {}", e);
            Ok(None)
        }
    }
}

fn find_headers_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn extract_content_length(request: &str) -> Option<usize> {
    request.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

pub async fn handle_request(orchestrator: &Orchestrator, request: &str) -> String {
    let request_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", r#"{"error":"malformed request"}"#);
    }

    let method = parts[0];
    let path = parts[1].split('?').next().unwrap_or("/");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    info!("Request: {} {}", method, path);

    let body = request
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("");

    match (method, path) {
        ("GET", "/api/health") => create_response(200, "OK", r#"{"status":"ok","service":"aiql"}"#),
        ("OPTIONS", _) => create_response(204, "No Content", ""),
        ("POST", "/query") => {
            let (status, status_text, payload) = answer_query(orchestrator, body).await;
            create_response(status, status_text, &payload.to_string())
        }
        _ => create_response(404, "Not Found", r#"{"error":"not found"}"#),
    }
}

async fn answer_query(
    orchestrator: &Orchestrator,
    body: &str,
) -> (u16, &'static str, serde_json::Value) {
    let request: QueryRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            return (
                400,
                "Bad Request",
                json!({ "error": format!("SQL Query failed: invalid request body: {}", e) }),
            )
        }
    };

    match orchestrator.ask(&request.question).await {
        Ok(answer) => {
            let payload = match answer.outcome {
                QueryOutcome::Rows { rows, .. } => json!({
                    "sql_query": answer.sql,
                    "results": rows.into_iter().map(|row| json!({ "row": row })).collect::<Vec<_>>(),
                }),
                QueryOutcome::Affected { rows_affected } => json!({
                    "sql_query": answer.sql,
                    "rows_affected": rows_affected,
                }),
            };
            (200, "OK", payload)
        }
        Err(e) => (
            400,
            "Bad Request",
            json!({ "error": format!("SQL Query failed: {}", e) }),
        ),
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}
