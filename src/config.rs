use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clone::RestoreMode;
use crate::rpc::Endpoint;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub const DEFAULT_DB: &str = "smsfwd.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Control server switches and credentials.
///
/// An empty sign key disables signing for that role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub enable_server_autorun: bool,
    pub server_sign_key: String,
    pub server_address: String,
    pub client_sign_key: String,
    pub enable_api_clone: bool,
    pub enable_api_sms_send: bool,
    pub enable_api_sms_query: bool,
    pub enable_api_call_query: bool,
    pub enable_api_contact_query: bool,
    pub enable_api_battery_query: bool,
}

impl ServerSettings {
    /// Whether `endpoint` is reachable at all. `/config/query` always is.
    pub fn endpoint_enabled(&self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::ConfigQuery => true,
            Endpoint::ClonePull | Endpoint::ClonePush => self.enable_api_clone,
            Endpoint::SmsSend => self.enable_api_sms_send,
            Endpoint::SmsQuery => self.enable_api_sms_query,
            Endpoint::CallQuery => self.enable_api_call_query,
            Endpoint::ContactQuery => self.enable_api_contact_query,
            Endpoint::BatteryQuery => self.enable_api_battery_query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub db: Option<PathBuf>,
    #[serde(default)]
    pub transactional_restore: bool,
    #[serde(default)]
    pub server: ServerSettings,
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&input)?)
    }

    pub fn listen_addr(&self) -> &str {
        self.listen.as_deref().unwrap_or(DEFAULT_LISTEN)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DB))
    }

    pub fn restore_mode(&self) -> RestoreMode {
        if self.transactional_restore {
            RestoreMode::Transactional
        } else {
            RestoreMode::BestEffort
        }
    }
}
