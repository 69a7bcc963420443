//! Sqlite-backed persistence of client settings.

use std::path::Path;

use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension as _};
use solver_core::{
    DEFAULT_API_BASE_URL, DEFAULT_LOCALE, DEFAULT_TIMEOUT_SECS, Level, SettlementPolicy, Settings,
};
use tracing::debug;

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                api_base_url TEXT NOT NULL,
                locale TEXT NOT NULL,
                level TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, api_base_url, locale, level)
            VALUES (1, 'http://localhost:8000', 'en', 'auto');
            "#,
        )?;

        self.add_column(
            "ALTER TABLE settings ADD COLUMN request_timeout_secs INTEGER NOT NULL DEFAULT 60",
            "settings.request_timeout_secs",
        )?;
        self.add_column(
            "ALTER TABLE settings ADD COLUMN settlement_policy TEXT NOT NULL DEFAULT 'latest_issued'",
            "settings.settlement_policy",
        )?;
        Ok(())
    }

    fn add_column(&self, sql: &str, column: &str) -> anyhow::Result<()> {
        match self.conn.execute(sql, []) {
            Ok(_) => {
                debug!(column, "added column");
                Ok(())
            }
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("duplicate column name") {
                    Ok(())
                } else {
                    Err(err).with_context(|| format!("add {column} column"))
                }
            }
        }
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let row = self
            .conn
            .query_row(
                "SELECT api_base_url, locale, level, request_timeout_secs, settlement_policy FROM settings WHERE id = 1",
                [],
                |row| {
                    let api_base_url: String = row.get(0)?;
                    let locale: String = row.get(1)?;
                    let level: String = row.get(2)?;
                    let timeout: i64 = row.get(3)?;
                    let policy: String = row.get(4)?;
                    Ok((api_base_url, locale, level, timeout, policy))
                },
            )
            .optional()?;

        let (api_base_url, locale, level, timeout, policy) = match row {
            Some(value) => value,
            None => (
                DEFAULT_API_BASE_URL.to_string(),
                DEFAULT_LOCALE.to_string(),
                "auto".to_string(),
                DEFAULT_TIMEOUT_SECS as i64,
                "latest_issued".to_string(),
            ),
        };

        let mut settings = Settings {
            api_base_url,
            locale,
            level: level.parse::<Level>().unwrap_or_default(),
            request_timeout_secs: u64::try_from(timeout).unwrap_or(DEFAULT_TIMEOUT_SECS),
            settlement_policy: policy.parse::<SettlementPolicy>().unwrap_or_default(),
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();

        self.conn.execute(
            "UPDATE settings SET api_base_url = ?, locale = ?, level = ?, request_timeout_secs = ?, settlement_policy = ? WHERE id = 1",
            (
                &settings.api_base_url,
                &settings.locale,
                settings.level.as_str(),
                settings.request_timeout_secs as i64,
                settings.settlement_policy.as_str(),
            ),
        )?;
        Ok(())
    }
}
