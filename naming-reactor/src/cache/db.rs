use std::collections::HashMap;
use std::path::Path;
use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use shared::types::{ServiceInfo, ServiceKey};
use chrono::Utc;

/// File name of the snapshot database inside the cache directory
pub const DB_FILE_NAME: &str = "services.db";

pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    /// Open or create the SQLite database with WAL mode enabled
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS services (
                name        TEXT NOT NULL,
                clusters    TEXT NOT NULL,
                payload     TEXT NOT NULL,
                written_at  TEXT NOT NULL,
                PRIMARY KEY (name, clusters)
            );
            "#,
        )
        .context("Failed to create database schema")?;

        Ok(Self { conn })
    }

    /// Open the database file inside a cache directory
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::open(dir.as_ref().join(DB_FILE_NAME))
    }

    /// Insert or replace the snapshot stored for the service's key
    pub fn write_service(&self, service: &ServiceInfo) -> Result<()> {
        let key = service.key();
        let payload = serde_json::to_string(service)
            .context("Failed to serialize service")?;

        self.conn.execute(
            r#"
            INSERT INTO services (name, clusters, payload, written_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name, clusters) DO UPDATE SET
                payload = excluded.payload,
                written_at = excluded.written_at
            "#,
            params![key.name(), key.clusters(), payload, Utc::now().to_rfc3339()],
        )
        .context("Failed to write service")?;

        Ok(())
    }

    /// Read every stored snapshot. Rows whose payload no longer decodes are
    /// skipped.
    pub fn read_services(&self) -> Result<HashMap<ServiceKey, ServiceInfo>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, clusters, payload FROM services")
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .context("Failed to query services")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to collect services")?;

        let mut services = HashMap::with_capacity(rows.len());
        for (name, clusters, payload) in rows {
            match serde_json::from_str::<ServiceInfo>(&payload) {
                Ok(service) => {
                    services.insert(ServiceKey::new(&name, &clusters), service);
                }
                Err(e) => {
                    tracing::warn!(service = %name, clusters = %clusters, "Skipping unreadable cached service: {}", e);
                }
            }
        }

        Ok(services)
    }
}
