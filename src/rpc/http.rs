use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ControlDaemon, ResponseEnvelope, ServerError};

/// Upper bound on one buffered request, headers and body together.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

pub fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

pub fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Returns `(method, path)` from the request line.
pub fn parse_request_line(headers: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(headers).ok()?;
    let mut parts = text.lines().next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    Some((method, path))
}

/// Parses a raw HTTP/1.1 request and produces the full raw response.
pub fn handle_http_request(
    daemon: &ControlDaemon,
    request: &[u8],
) -> Result<Vec<u8>, std::io::Error> {
    let header_end = find_header_end(request).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "incomplete http headers")
    })?;
    let headers = &request[..header_end];
    let (method, path) = parse_request_line(headers).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed request line")
    })?;

    if !method.eq_ignore_ascii_case("POST") {
        let err = ServerError::method_not_allowed(&method);
        let secret = daemon.server_settings().server_sign_key;
        let body = ResponseEnvelope::failure(err.message, &secret).to_json();
        return Ok(build_json_response(err.status, &body));
    }

    let body_start = header_end + 4;
    let body_end = match parse_content_length(headers) {
        Some(length) => body_start.saturating_add(length).min(request.len()),
        None => request.len(),
    };
    let body = request.get(body_start..body_end).unwrap_or_default();

    let reply = daemon.handle_request(&path, body);
    Ok(build_json_response(reply.status, &reply.body))
}

pub fn build_json_response(status: u16, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text(status),
        body.len(),
        body
    )
    .into_bytes()
}

pub fn build_error_response(message: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        message.len(),
        message
    )
    .into_bytes()
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

/// Whether `buffer` holds a full request. Fails once the request cannot fit
/// in [`MAX_REQUEST_BYTES`], including when the declared length overflows.
pub fn request_complete(buffer: &[u8]) -> Result<bool, std::io::Error> {
    let too_large = || std::io::Error::new(std::io::ErrorKind::InvalidData, "request too large");
    let Some(header_end) = find_header_end(buffer) else {
        if buffer.len() > MAX_REQUEST_BYTES {
            return Err(too_large());
        }
        return Ok(false);
    };
    let Some(length) = parse_content_length(&buffer[..header_end]) else {
        return Ok(true);
    };
    let total = header_end
        .checked_add(4)
        .and_then(|body_start| body_start.checked_add(length))
        .filter(|total| *total <= MAX_REQUEST_BYTES)
        .ok_or_else(too_large)?;
    Ok(buffer.len() >= total)
}

/// Reads one request from `stream`, writes the reply and shuts the stream
/// down. The daemon call, store lock and sqlite writes included, runs on the
/// blocking pool.
pub async fn serve_connection<S>(daemon: Arc<ControlDaemon>, stream: &mut S) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut rejected = None;
    loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        match request_complete(&buffer) {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => {
                rejected = Some(build_error_response(&format!("control error: {}", err)));
                break;
            }
        }
    }

    if buffer.is_empty() {
        return Ok(());
    }

    let response = match rejected {
        Some(response) => response,
        None => tokio::task::spawn_blocking(move || handle_http_request(&daemon, &buffer))
            .await
            .map_err(std::io::Error::other)?
            .unwrap_or_else(|err| build_error_response(&format!("control error: {}", err))),
    };
    stream.write_all(&response).await?;
    stream.shutdown().await
}
