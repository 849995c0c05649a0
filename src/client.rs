use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

use serde_json::{json, Value as JsonValue};

use crate::auth::{verify_reply, AuthError};
use crate::clone::CloneInfo;
use crate::rpc::{BaseRequest, Endpoint, ResponseEnvelope};
use crate::sign::{calc_sign, now_millis};

/// Wraps `data` into a request body signed with the client key. Without a
/// key the request carries only the timestamp.
pub fn build_signed_request(
    data: Option<JsonValue>,
    client_secret: &str,
    now_ms: i64,
) -> BaseRequest<JsonValue> {
    let sign = (!client_secret.is_empty()).then(|| calc_sign(&now_ms.to_string(), client_secret));
    BaseRequest {
        data,
        timestamp: Some(now_ms),
        sign,
    }
}

pub fn build_http_post(path: &str, host: &str, body: &[u8]) -> Vec<u8> {
    let mut request = format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        path,
        host,
        body.len()
    )
    .into_bytes();
    request.extend_from_slice(body);
    request
}

/// Splits a raw HTTP response into its status code and body.
pub fn parse_http_response(response: &[u8]) -> io::Result<(u16, Vec<u8>)> {
    let header_end = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing http header terminator"))?;
    let status_line = std::str::from_utf8(&response[..header_end])
        .ok()
        .and_then(|headers| headers.lines().next())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing status line"))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed status line"))?;
    Ok((status, response[header_end + 4..].to_vec()))
}

pub fn parse_response(body: &[u8]) -> Result<ResponseEnvelope, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Strips an optional scheme and trailing slash from a configured server
/// address, leaving `host:port`.
pub fn normalize_server_address(address: &str) -> String {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Blocking client for a remote control server.
pub struct ControlClient {
    address: String,
    client_sign_key: String,
}

impl ControlClient {
    pub fn new(server_address: &str, client_sign_key: impl Into<String>) -> Self {
        Self {
            address: normalize_server_address(server_address),
            client_sign_key: client_sign_key.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends one signed request and returns the verified reply envelope.
    /// Failure envelopes come back as errors carrying the server message.
    pub fn call(&self, endpoint: Endpoint, data: Option<JsonValue>) -> io::Result<ResponseEnvelope> {
        let request = build_signed_request(data, &self.client_sign_key, now_millis());
        let body = serde_json::to_vec(&request).map_err(io::Error::other)?;
        let raw = build_http_post(endpoint.path(), &self.address, &body);

        let mut stream = TcpStream::connect(&self.address)?;
        stream.write_all(&raw)?;
        stream.shutdown(Shutdown::Write)?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response)?;

        let (_status, body) = parse_http_response(&response)?;
        let envelope = parse_response(&body)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        check_reply(&envelope, &self.client_sign_key).map_err(|err| {
            io::Error::new(io::ErrorKind::PermissionDenied, err)
        })?;
        if !envelope.is_success() {
            return Err(io::Error::other(envelope.msg));
        }
        Ok(envelope)
    }

    pub fn query_config(&self) -> io::Result<JsonValue> {
        let envelope = self.call(Endpoint::ConfigQuery, None)?;
        Ok(envelope.data.unwrap_or(JsonValue::Null))
    }

    pub fn pull(&self, local_version_code: i64) -> io::Result<CloneInfo> {
        let envelope = self.call(
            Endpoint::ClonePull,
            Some(json!({ "version_code": local_version_code })),
        )?;
        let data = envelope
            .data
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "clone pull returned no data"))?;
        serde_json::from_value(data).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    pub fn push(&self, snapshot: &CloneInfo) -> io::Result<()> {
        let data = serde_json::to_value(snapshot).map_err(io::Error::other)?;
        self.call(Endpoint::ClonePush, Some(data))?;
        Ok(())
    }
}

/// Checks the reply signature with the client key.
pub fn check_reply(envelope: &ResponseEnvelope, client_secret: &str) -> Result<(), AuthError> {
    verify_reply(envelope.timestamp, envelope.sign.as_deref(), client_secret)
}
