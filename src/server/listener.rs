use super::routes::{AppState, Request, Response};
use crate::dipalme::client::PageFetcher;
use http::{Method, StatusCode};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

const MAX_HEADER_LINES: usize = 100;
const MAX_LINE_BYTES: u64 = 8 * 1024;
/// Time a peer gets to send its request line and headers
pub const REQUEST_HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections forever, one task per connection
pub async fn serve<F: PageFetcher + 'static>(
    listener: TcpListener,
    state: Arc<AppState<F>>,
) -> io::Result<()> {
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let state = state.clone();
        let span = info_span!("request", request_id = %Uuid::new_v4(), %peer);

        tokio::spawn(
            async move {
                let (reader, mut writer) = stream.split();

                let reader = BufReader::new(reader);
                let handled =
                    handle_connection(reader, &mut writer, &state, REQUEST_HEAD_TIMEOUT).await;
                if let Err(e) = handled {
                    warn!("Connection failed: {}", e);
                }
            }
            .instrument(span),
        );
    }
}

pub async fn handle_connection<R, W, F>(
    mut reader: R,
    writer: &mut W,
    state: &AppState<F>,
    head_timeout: Duration,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: PageFetcher + 'static,
{
    let (response, origin) = match timeout(head_timeout, read_request(&mut reader)).await {
        Ok(Ok(Some(request))) => {
            let response = state.handle(&request).await;
            (response, request.origin)
        }
        Ok(Ok(None)) => {
            debug!("Connection closed before sending a request");
            return Ok(());
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
            debug!("Malformed request: {}", e);
            (Response::error(StatusCode::BAD_REQUEST, "Bad request"), None)
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            debug!("No complete request head after {:?}", head_timeout);
            (Response::error(StatusCode::REQUEST_TIMEOUT, "Request timeout"), None)
        }
    };

    let cors = state.cors_headers(origin.as_deref());
    writer
        .write_all(render_response(&response, &cors).as_bytes())
        .await?;
    writer.flush().await
}

/// Reads the request line and headers; the body, if any, is ignored
pub async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Request>> {
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid(format!("bad request line '{}'", request_line)));
    };

    if !version.starts_with("HTTP/1.") {
        return Err(invalid(format!("unsupported version '{}'", version)));
    }

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| invalid(format!("bad method '{}'", method)))?;

    let mut origin = None;
    for _ in 0..MAX_HEADER_LINES {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| invalid("headers ended early".to_string()))?;

        if line.is_empty() {
            return Ok(Some(Request {
                method,
                path: path.to_string(),
                origin,
            }));
        }

        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("origin") {
                origin = Some(value.trim().to_string());
            }
        }
    }

    Err(invalid("too many headers".to_string()))
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    let read = (&mut *reader)
        .take(MAX_LINE_BYTES)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }

    if !line.ends_with('\n') {
        if read as u64 >= MAX_LINE_BYTES {
            return Err(invalid("line too long".to_string()));
        }
        return Err(invalid("unexpected end of request".to_string()));
    }

    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn render_response(response: &Response, cors: &[(&'static str, String)]) -> String {
    let status = response.status;
    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );

    if !response.body.is_empty() {
        head.push_str("Content-Type: application/json; charset=utf-8\r\n");
    }
    head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    head.push_str("Connection: close\r\n");

    for (name, value) in cors {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }

    head.push_str("\r\n");
    head.push_str(&response.body);
    head
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
