pub mod settings;
pub mod sqlite;

pub use settings::{AppSettings, RuleRecord, SenderRecord, SettingsStore, StoreError};
pub use sqlite::SqliteSettingsStore;
