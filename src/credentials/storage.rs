//! SQLite persistence for the sealed credential blob.

use super::{Cipher, StoredCredential};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE accounting_credentials (
///     company_id TEXT PRIMARY KEY,
///     blob TEXT NOT NULL,        -- Encrypted JSON StoredCredential
///     nonce TEXT NOT NULL,
///     updated_at TEXT NOT NULL   -- ISO 8601 timestamp
/// );
/// ```
///
/// The connection sits behind a mutex; callers needing read-modify-write
/// atomicity across an HTTP round trip serialize above this layer.
pub struct CredentialStore {
    conn: Mutex<Connection>,
    cipher: Cipher,
}

impl CredentialStore {
    /// Creates or opens a credential store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher = Cipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS accounting_credentials (
                company_id TEXT PRIMARY KEY,
                blob TEXT NOT NULL,
                nonce TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create accounting_credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    /// Stores (upserts) the credential for a company.
    pub fn store(&self, company_id: &str, credential: &StoredCredential) -> Result<()> {
        let json = serde_json::to_vec(credential).context("Failed to serialize credential")?;
        let (blob, nonce) = self
            .cipher
            .seal(&json)
            .context("Failed to encrypt credential")?;

        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        conn.execute(
            r#"
            INSERT INTO accounting_credentials (company_id, blob, nonce, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(company_id) DO UPDATE SET
                blob = excluded.blob,
                nonce = excluded.nonce,
                updated_at = excluded.updated_at
            "#,
            params![company_id, blob, nonce, Utc::now().to_rfc3339()],
        )
        .context("Failed to store credential")?;

        Ok(())
    }

    /// Retrieves the credential for a company.
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing stored yet
    /// * `Err` - If decryption or the query fails
    pub fn get(&self, company_id: &str) -> Result<Option<StoredCredential>> {
        let row: Option<(String, String)> = {
            let conn = self
                .conn
                .lock()
                .map_err(|_| anyhow!("Credential store lock poisoned"))?;
            conn.query_row(
                "SELECT blob, nonce FROM accounting_credentials WHERE company_id = ?1",
                params![company_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to read credential")?
        };

        let Some((blob, nonce)) = row else {
            return Ok(None);
        };

        let json = self
            .cipher
            .open(&blob, &nonce)
            .context("Failed to decrypt credential")?;
        let credential =
            serde_json::from_slice(&json).context("Stored credential is not valid JSON")?;
        Ok(Some(credential))
    }
}
