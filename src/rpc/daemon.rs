use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{BaseRequest, Endpoint, ResponseEnvelope, ServerError};
use crate::auth;
use crate::clone::{export_settings, restore_settings, CloneInfo, RestoreMode};
use crate::config::ServerSettings;
use crate::storage::{SettingsStore, SqliteSettingsStore};
use crate::version::{check_version, AppVersion};

/// Device-side operations that live outside the control core (SMS
/// sending, call log, contacts, battery).
pub trait DeviceBridge: Send + Sync {
    fn handle(&self, endpoint: Endpoint, data: Option<JsonValue>) -> Result<JsonValue, std::io::Error>;
}

/// Reply for one control request: HTTP status plus the serialized envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlReply {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Deserialize, Default)]
struct ClonePullParams {
    #[serde(default)]
    version_code: i64,
}

pub struct ControlDaemon {
    store: Mutex<Box<dyn SettingsStore + Send>>,
    settings: Mutex<ServerSettings>,
    version: AppVersion,
    restore_mode: RestoreMode,
    device_bridge: Option<Arc<dyn DeviceBridge>>,
}

impl ControlDaemon {
    pub fn with_store<S>(store: S, settings: ServerSettings) -> Self
    where
        S: SettingsStore + Send + 'static,
    {
        Self {
            store: Mutex::new(Box::new(store)),
            settings: Mutex::new(settings),
            version: AppVersion::current(),
            restore_mode: RestoreMode::default(),
            device_bridge: None,
        }
    }

    pub fn with_store_and_bridge<S>(
        store: S,
        settings: ServerSettings,
        device_bridge: Arc<dyn DeviceBridge>,
    ) -> Self
    where
        S: SettingsStore + Send + 'static,
    {
        let mut daemon = Self::with_store(store, settings);
        daemon.device_bridge = Some(device_bridge);
        daemon
    }

    pub fn test_instance() -> Self {
        let store = SqliteSettingsStore::in_memory().expect("in-memory store");
        Self::with_store(store, ServerSettings::default())
    }

    pub fn with_version(mut self, version: AppVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_restore_mode(mut self, mode: RestoreMode) -> Self {
        self.restore_mode = mode;
        self
    }

    pub fn version(&self) -> &AppVersion {
        &self.version
    }

    pub fn server_settings(&self) -> ServerSettings {
        self.settings
            .lock()
            .expect("server settings mutex poisoned")
            .clone()
    }

    pub fn set_server_settings(&self, settings: ServerSettings) {
        let mut guard = self.settings.lock().expect("server settings mutex poisoned");
        *guard = settings;
    }

    pub fn update_server_settings<F>(&self, updater: F)
    where
        F: FnOnce(&mut ServerSettings),
    {
        let mut guard = self.settings.lock().expect("server settings mutex poisoned");
        updater(&mut guard);
    }

    /// Runs `f` with exclusive access to the settings store. Restores hold
    /// the same lock, so `f` never sees a half-applied clone.
    pub fn with_settings_store<R>(&self, f: impl FnOnce(&dyn SettingsStore) -> R) -> R {
        let guard = self.store.lock().expect("settings store mutex poisoned");
        f(&**guard)
    }

    pub fn export_settings(&self) -> Result<CloneInfo, ServerError> {
        let snapshot = self.with_settings_store(|store| export_settings(store, &self.version))?;
        Ok(snapshot)
    }

    pub fn handle_request(&self, path: &str, body: &[u8]) -> ControlReply {
        let settings = self.server_settings();
        match self.dispatch(path, body, &settings) {
            Ok(output) => ControlReply {
                status: 200,
                body: ResponseEnvelope::build(output, &settings.server_sign_key).to_json(),
            },
            Err(err) => {
                log::warn!("control request {} rejected: {}", path, err);
                ControlReply {
                    status: err.status,
                    body: ResponseEnvelope::failure(err.message, &settings.server_sign_key)
                        .to_json(),
                }
            }
        }
    }

    fn dispatch(
        &self,
        path: &str,
        body: &[u8],
        settings: &ServerSettings,
    ) -> Result<Option<JsonValue>, ServerError> {
        let endpoint = Endpoint::from_path(path).ok_or_else(|| ServerError::not_found(path))?;

        let request: BaseRequest<JsonValue> = if body.iter().all(u8::is_ascii_whitespace) {
            BaseRequest::default()
        } else {
            serde_json::from_slice(body)?
        };
        // Auth precedes the endpoint gate.
        auth::verify(&request, &settings.server_sign_key)?;

        if !settings.endpoint_enabled(endpoint) {
            return Err(ServerError::internal(format!(
                "{} is disabled on this server",
                endpoint.path()
            )));
        }

        match endpoint {
            Endpoint::ConfigQuery => Ok(Some(self.config_query(settings))),
            Endpoint::ClonePull => self.clone_pull(request.data),
            Endpoint::ClonePush => self.clone_push(request.data),
            device => self.device_call(device, request.data),
        }
    }

    fn config_query(&self, settings: &ServerSettings) -> JsonValue {
        json!({
            "enable_api_clone": settings.enable_api_clone,
            "enable_api_sms_send": settings.enable_api_sms_send,
            "enable_api_sms_query": settings.enable_api_sms_query,
            "enable_api_call_query": settings.enable_api_call_query,
            "enable_api_contact_query": settings.enable_api_contact_query,
            "enable_api_battery_query": settings.enable_api_battery_query,
            "version_code": self.version.code,
            "version_name": self.version.name,
        })
    }

    fn clone_pull(&self, data: Option<JsonValue>) -> Result<Option<JsonValue>, ServerError> {
        let params: ClonePullParams = match data {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => ClonePullParams::default(),
        };
        check_version(params.version_code, self.version.code)?;
        let snapshot = self.export_settings()?;
        log::info!(
            "clone pull: exported {} senders, {} rules",
            snapshot.sender_list.len(),
            snapshot.rule_list.len()
        );
        Ok(Some(serde_json::to_value(snapshot)?))
    }

    fn clone_push(&self, data: Option<JsonValue>) -> Result<Option<JsonValue>, ServerError> {
        let snapshot: CloneInfo = match data {
            Some(value) if !value.is_null() => serde_json::from_value(value)?,
            _ => CloneInfo::default(),
        };
        check_version(snapshot.version_code, self.version.code)?;
        self.with_settings_store(|store| restore_settings(store, &snapshot, self.restore_mode))?;
        log::info!(
            "clone push: restored {} senders, {} rules from version {}",
            snapshot.sender_list.len(),
            snapshot.rule_list.len(),
            snapshot.version_name
        );
        Ok(Some(JsonValue::String(super::SUCCESS_MSG.to_string())))
    }

    fn device_call(
        &self,
        endpoint: Endpoint,
        data: Option<JsonValue>,
    ) -> Result<Option<JsonValue>, ServerError> {
        let bridge = self.device_bridge.as_ref().ok_or_else(|| {
            ServerError::internal(format!("{} is not supported on this device", endpoint.path()))
        })?;
        let output = bridge
            .handle(endpoint, data)
            .map_err(|err| ServerError::internal(err.to_string()))?;
        Ok(Some(output))
    }
}
