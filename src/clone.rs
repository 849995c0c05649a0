use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{AppSettings, RuleRecord, SenderRecord, SettingsStore, StoreError};
use crate::version::AppVersion;

/// Full, self-contained settings snapshot exchanged by clone pull/push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CloneInfo {
    #[serde(default)]
    pub version_code: i64,
    #[serde(default)]
    pub version_name: String,
    #[serde(flatten)]
    pub settings: AppSettings,
    /// Required on the wire: a snapshot without its lists is rejected
    /// instead of being read as "delete everything".
    pub sender_list: Vec<SenderRecord>,
    pub rule_list: Vec<RuleRecord>,
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RestoreError {
    pub message: String,
    #[source]
    pub source: Option<StoreError>,
}

impl From<StoreError> for RestoreError {
    fn from(err: StoreError) -> Self {
        Self {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// How [`restore_settings`] applies a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Sequential writes with no rollback. A failure after the delete step
    /// leaves the destination with an empty or partial sender/rule set.
    #[default]
    BestEffort,
    /// Runs the whole restore inside a store transaction and rolls back on
    /// failure. Requires a store that implements the transaction hooks.
    Transactional,
}

pub fn export_settings<S: SettingsStore + ?Sized>(
    store: &S,
    version: &AppVersion,
) -> Result<CloneInfo, StoreError> {
    Ok(CloneInfo {
        version_code: version.code,
        version_name: version.name.clone(),
        settings: store.load_settings()?,
        sender_list: store.list_senders()?,
        rule_list: store.list_rules()?,
    })
}

/// Applies `snapshot` onto `store`, replacing every sender and rule.
///
/// A failed restore is terminal for the request: the caller should clone
/// again rather than retry, since the destination may already be emptied.
pub fn restore_settings<S: SettingsStore + ?Sized>(
    store: &S,
    snapshot: &CloneInfo,
    mode: RestoreMode,
) -> Result<(), RestoreError> {
    let result = match mode {
        RestoreMode::BestEffort => apply_snapshot(store, snapshot),
        RestoreMode::Transactional => apply_in_transaction(store, snapshot),
    };
    if let Err(err) = &result {
        log::error!("restore settings failed: {}", err);
    }
    result.map_err(RestoreError::from)
}

fn apply_in_transaction<S: SettingsStore + ?Sized>(
    store: &S,
    snapshot: &CloneInfo,
) -> Result<(), StoreError> {
    store.begin_transaction()?;
    match apply_snapshot(store, snapshot) {
        Ok(()) => store.commit_transaction(),
        Err(err) => {
            if let Err(rollback_err) = store.rollback_transaction() {
                log::error!("rollback after failed restore failed: {}", rollback_err);
            }
            Err(err)
        }
    }
}

fn apply_snapshot<S: SettingsStore + ?Sized>(
    store: &S,
    snapshot: &CloneInfo,
) -> Result<(), StoreError> {
    store.save_settings(&snapshot.settings)?;

    store.delete_all_rules()?;
    store.delete_all_senders()?;

    for sender in &snapshot.sender_list {
        store.insert_sender(sender)?;
    }
    for rule in &snapshot.rule_list {
        store.insert_rule(rule)?;
    }
    Ok(())
}
