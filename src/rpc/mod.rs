mod daemon;
pub mod http;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::auth::AuthError;
use crate::clone::RestoreError;
use crate::sign::{calc_sign, now_millis};
use crate::storage::StoreError;
use crate::version::VersionError;

pub use daemon::{ControlDaemon, ControlReply, DeviceBridge};

pub const HTTP_SUCCESS_CODE: i32 = 200;
pub const HTTP_FAILURE_CODE: i32 = 500;
pub const SUCCESS_MSG: &str = "success";

/// Body of every control request. `timestamp` and `sign` are only
/// mandatory when the server sign key is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseRequest<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl<T> Default for BaseRequest<T> {
    fn default() -> Self {
        Self {
            data: None,
            timestamp: None,
            sign: None,
        }
    }
}

/// Canonical reply: `{code, msg, data?, timestamp, sign?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl ResponseEnvelope {
    pub fn build(output: Option<JsonValue>, server_secret: &str) -> Self {
        Self::build_at(output, server_secret, now_millis())
    }

    /// A JSON string other than `"success"` is an error message; anything
    /// else is a success, carrying `output` as `data` unless it is absent,
    /// null or the bare success marker.
    pub fn build_at(output: Option<JsonValue>, server_secret: &str, now_ms: i64) -> Self {
        match output {
            Some(JsonValue::String(message)) if message != SUCCESS_MSG => {
                Self::failure_at(message, server_secret, now_ms)
            }
            other => {
                let data = other.filter(|value| {
                    !value.is_null() && value.as_str() != Some(SUCCESS_MSG)
                });
                Self::sealed(HTTP_SUCCESS_CODE, SUCCESS_MSG.to_string(), data, server_secret, now_ms)
            }
        }
    }

    pub fn failure(message: impl Into<String>, server_secret: &str) -> Self {
        Self::failure_at(message, server_secret, now_millis())
    }

    pub fn failure_at(message: impl Into<String>, server_secret: &str, now_ms: i64) -> Self {
        Self::sealed(HTTP_FAILURE_CODE, message.into(), None, server_secret, now_ms)
    }

    fn sealed(
        code: i32,
        msg: String,
        data: Option<JsonValue>,
        server_secret: &str,
        timestamp: i64,
    ) -> Self {
        let sign = (!server_secret.is_empty())
            .then(|| calc_sign(&timestamp.to_string(), server_secret));
        Self {
            code,
            msg,
            data,
            timestamp,
            sign,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == HTTP_SUCCESS_CODE
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Builds the serialized reply for `output`, signed with the server key.
pub fn response(output: Option<JsonValue>, server_secret: &str) -> String {
    ResponseEnvelope::build(output, server_secret).to_json()
}

/// Control API endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ConfigQuery,
    ClonePull,
    ClonePush,
    SmsSend,
    SmsQuery,
    CallQuery,
    ContactQuery,
    BatteryQuery,
}

impl Endpoint {
    pub const ALL: [Endpoint; 8] = [
        Endpoint::ConfigQuery,
        Endpoint::ClonePull,
        Endpoint::ClonePush,
        Endpoint::SmsSend,
        Endpoint::SmsQuery,
        Endpoint::CallQuery,
        Endpoint::ContactQuery,
        Endpoint::BatteryQuery,
    ];

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
        Self::ALL.into_iter().find(|endpoint| endpoint.path() == path)
    }

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::ConfigQuery => "/config/query",
            Endpoint::ClonePull => "/clone/pull",
            Endpoint::ClonePush => "/clone/push",
            Endpoint::SmsSend => "/sms/send",
            Endpoint::SmsQuery => "/sms/query",
            Endpoint::CallQuery => "/call/query",
            Endpoint::ContactQuery => "/contact/query",
            Endpoint::BatteryQuery => "/battery/query",
        }
    }
}

/// Transport-level failure. Everything the core rejects is reported with
/// status 500 and a readable message; 404/405 are reserved for framing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServerError {
    pub status: u16,
    pub message: String,
}

impl ServerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self {
            status: 404,
            message: format!("no such endpoint: {path}"),
        }
    }

    pub fn method_not_allowed(method: &str) -> Self {
        Self {
            status: 405,
            message: format!("method not allowed: {method}"),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(err: AuthError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<VersionError> for ServerError {
    fn from(err: VersionError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<RestoreError> for ServerError {
    fn from(err: RestoreError) -> Self {
        Self::internal(err.message)
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("invalid request body: {err}"))
    }
}
