use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("settings encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store does not support {0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Other(String),
}

/// Every scalar setting that travels with a clone.
///
/// Values are taken as-is: nothing here enforces ranges, so a snapshot from
/// a misconfigured device is restored exactly as it was exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub enable_sms: bool,
    pub enable_phone: bool,
    pub call_type1: bool,
    pub call_type2: bool,
    pub call_type3: bool,
    pub enable_app_notify: bool,
    pub cancel_app_notify: bool,
    pub enable_not_user_present: bool,
    pub duplicate_messages_limits: i32,
    pub enable_battery_receiver: bool,
    pub battery_level_min: i32,
    pub battery_level_max: i32,
    pub battery_level_once: bool,
    pub enable_battery_cron: bool,
    pub battery_cron_start_time: String,
    pub battery_cron_interval: i32,
    pub enable_exclude_from_recents: bool,
    pub enable_play_silence_music: bool,
    pub request_retry_times: i32,
    pub request_delay_time: i32,
    pub request_timeout: i32,
    pub notify_content: String,
    pub enable_sms_template: bool,
    pub sms_template: String,
    pub enable_help_tip: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            enable_sms: false,
            enable_phone: false,
            call_type1: false,
            call_type2: false,
            call_type3: false,
            enable_app_notify: false,
            cancel_app_notify: false,
            enable_not_user_present: false,
            duplicate_messages_limits: 0,
            enable_battery_receiver: false,
            battery_level_min: 0,
            battery_level_max: 100,
            battery_level_once: false,
            enable_battery_cron: false,
            battery_cron_start_time: "00:00".to_string(),
            battery_cron_interval: 60,
            enable_exclude_from_recents: false,
            enable_play_silence_music: false,
            request_retry_times: 0,
            request_delay_time: 1,
            request_timeout: 10,
            notify_content: String::new(),
            enable_sms_template: false,
            sms_template: String::new(),
            enable_help_tip: true,
        }
    }
}

/// Outbound forwarding channel (webhook, push service, mail, ...).
///
/// Fields this build does not model are kept in `extra` and written back
/// unchanged, so a clone between different builds loses nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: i32,
    pub name: String,
    #[serde(default)]
    pub json_setting: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub time: i64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Mapping from inbound event conditions to one or more senders.
///
/// `sender_id` is the primary sender. Newer builds add fields such as
/// `sender_list`, `sender_logic` and `silent_period`; those travel in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub filed: String,
    #[serde(default)]
    pub check: String,
    #[serde(default)]
    pub value: String,
    pub sender_id: i64,
    #[serde(default)]
    pub sms_template: String,
    #[serde(default)]
    pub regex_replace: String,
    #[serde(default)]
    pub sim_slot: String,
    #[serde(default)]
    pub status: i32,
    #[serde(default)]
    pub time: i64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Backing store for the application settings and forwarding tables.
///
/// Lists come back in insertion order; inserts keep the record ids they are
/// given so rules keep pointing at the right senders after a clone.
pub trait SettingsStore {
    fn load_settings(&self) -> Result<AppSettings, StoreError>;
    fn save_settings(&self, settings: &AppSettings) -> Result<(), StoreError>;

    fn list_senders(&self) -> Result<Vec<SenderRecord>, StoreError>;
    fn insert_sender(&self, sender: &SenderRecord) -> Result<(), StoreError>;
    fn delete_all_senders(&self) -> Result<(), StoreError>;

    fn list_rules(&self) -> Result<Vec<RuleRecord>, StoreError>;
    fn insert_rule(&self, rule: &RuleRecord) -> Result<(), StoreError>;
    fn delete_all_rules(&self) -> Result<(), StoreError>;

    fn begin_transaction(&self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("transactions"))
    }

    fn commit_transaction(&self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("transactions"))
    }

    fn rollback_transaction(&self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("transactions"))
    }
}
