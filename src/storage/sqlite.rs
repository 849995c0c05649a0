use rusqlite::{params, Connection};
use serde_json::{Map, Value as JsonValue};

use super::settings::{AppSettings, RuleRecord, SenderRecord, SettingsStore, StoreError};

pub struct SqliteSettingsStore {
    conn: Connection,
}

impl SqliteSettingsStore {
    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open(path: &std::path::Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        // `seq` keeps insertion order independent of the record ids.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS senders (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL UNIQUE,
                type INTEGER NOT NULL,
                name TEXT NOT NULL,
                json_setting TEXT NOT NULL,
                status INTEGER NOT NULL,
                time INTEGER NOT NULL,
                extra TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS rules (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id INTEGER NOT NULL UNIQUE,
                type TEXT NOT NULL,
                filed TEXT NOT NULL,
                check_op TEXT NOT NULL,
                value TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                sms_template TEXT NOT NULL,
                regex_replace TEXT NOT NULL,
                sim_slot TEXT NOT NULL,
                status INTEGER NOT NULL,
                time INTEGER NOT NULL,
                extra TEXT NOT NULL DEFAULT '{}'
            );",
        )?;
        Ok(())
    }
}

fn decode_extra(raw: String) -> Result<Map<String, JsonValue>, StoreError> {
    Ok(serde_json::from_str(&raw)?)
}

impl SettingsStore for SqliteSettingsStore {
    fn load_settings(&self) -> Result<AppSettings, StoreError> {
        let mut merged = match serde_json::to_value(AppSettings::default())? {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        let mut stmt = self.conn.prepare("SELECT key, value FROM settings")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let raw: String = row.get(1)?;
            merged.insert(key, serde_json::from_str(&raw)?);
        }
        Ok(serde_json::from_value(JsonValue::Object(merged))?)
    }

    fn save_settings(&self, settings: &AppSettings) -> Result<(), StoreError> {
        let JsonValue::Object(fields) = serde_json::to_value(settings)? else {
            return Err(StoreError::Other("settings did not encode as an object".into()));
        };
        for (key, value) in fields {
            self.conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value.to_string()],
            )?;
        }
        Ok(())
    }

    fn list_senders(&self) -> Result<Vec<SenderRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, type, name, json_setting, status, time, extra FROM senders ORDER BY seq")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(SenderRecord {
                id: row.get(0)?,
                kind: row.get(1)?,
                name: row.get(2)?,
                json_setting: row.get(3)?,
                status: row.get(4)?,
                time: row.get(5)?,
                extra: decode_extra(row.get(6)?)?,
            });
        }
        Ok(records)
    }

    fn insert_sender(&self, sender: &SenderRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO senders (id, type, name, json_setting, status, time, extra) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sender.id,
                sender.kind,
                sender.name,
                sender.json_setting,
                sender.status,
                sender.time,
                serde_json::to_string(&sender.extra)?,
            ],
        )?;
        Ok(())
    }

    fn delete_all_senders(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM senders", [])?;
        Ok(())
    }

    fn list_rules(&self) -> Result<Vec<RuleRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, type, filed, check_op, value, sender_id, sms_template, regex_replace, sim_slot, status, time, extra FROM rules ORDER BY seq",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(RuleRecord {
                id: row.get(0)?,
                kind: row.get(1)?,
                filed: row.get(2)?,
                check: row.get(3)?,
                value: row.get(4)?,
                sender_id: row.get(5)?,
                sms_template: row.get(6)?,
                regex_replace: row.get(7)?,
                sim_slot: row.get(8)?,
                status: row.get(9)?,
                time: row.get(10)?,
                extra: decode_extra(row.get(11)?)?,
            });
        }
        Ok(records)
    }

    fn insert_rule(&self, rule: &RuleRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO rules (id, type, filed, check_op, value, sender_id, sms_template, regex_replace, sim_slot, status, time, extra) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                rule.id,
                rule.kind,
                rule.filed,
                rule.check,
                rule.value,
                rule.sender_id,
                rule.sms_template,
                rule.regex_replace,
                rule.sim_slot,
                rule.status,
                rule.time,
                serde_json::to_string(&rule.extra)?,
            ],
        )?;
        Ok(())
    }

    fn delete_all_rules(&self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM rules", [])?;
        Ok(())
    }

    fn begin_transaction(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit_transaction(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
