//! SQLite persistence of external ids and per-entity sync status.

use crate::types::OrderExternalLink;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerLinkRecord {
    pub external_contact_id: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderLinkRecord {
    pub link: OrderExternalLink,
    pub allocation_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_sync_error: Option<String>,
}

/// Link storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE customer_links (
///     customer_id TEXT PRIMARY KEY,
///     external_contact_id TEXT,
///     last_synced_at TEXT,
///     last_sync_error TEXT
/// );
/// CREATE TABLE order_links (
///     order_id TEXT PRIMARY KEY,
///     invoice_id TEXT, invoice_number TEXT, invoice_status TEXT,
///     credit_note_id TEXT, credit_note_number TEXT, allocation_error TEXT,
///     last_synced_at TEXT,
///     last_sync_error TEXT
/// );
/// ```
///
/// Rows are never deleted. Recording an error leaves stored ids untouched.
pub struct LinkStore {
    conn: Mutex<Connection>,
}

impl LinkStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS customer_links (
                customer_id TEXT PRIMARY KEY,
                external_contact_id TEXT,
                last_synced_at TEXT,
                last_sync_error TEXT
            );
            CREATE TABLE IF NOT EXISTS order_links (
                order_id TEXT PRIMARY KEY,
                invoice_id TEXT,
                invoice_number TEXT,
                invoice_status TEXT,
                credit_note_id TEXT,
                credit_note_number TEXT,
                allocation_error TEXT,
                last_synced_at TEXT,
                last_sync_error TEXT
            );
            "#,
        )
        .context("Failed to create link tables")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Link store lock poisoned"))
    }

    pub fn record_contact(&self, customer_id: &str, contact_id: &str) -> Result<()> {
        self.lock()?
            .execute(
                r#"
                INSERT INTO customer_links (customer_id, external_contact_id, last_synced_at, last_sync_error)
                VALUES (?1, ?2, ?3, NULL)
                ON CONFLICT(customer_id) DO UPDATE SET
                    external_contact_id = excluded.external_contact_id,
                    last_synced_at = excluded.last_synced_at,
                    last_sync_error = NULL
                "#,
                params![customer_id, contact_id, Utc::now().to_rfc3339()],
            )
            .context("Failed to record contact link")?;
        Ok(())
    }

    pub fn record_customer_error(&self, customer_id: &str, error: &str) -> Result<()> {
        self.lock()?
            .execute(
                r#"
                INSERT INTO customer_links (customer_id, last_sync_error)
                VALUES (?1, ?2)
                ON CONFLICT(customer_id) DO UPDATE SET last_sync_error = excluded.last_sync_error
                "#,
                params![customer_id, error],
            )
            .context("Failed to record customer sync error")?;
        Ok(())
    }

    pub fn customer_link(&self, customer_id: &str) -> Result<Option<CustomerLinkRecord>> {
        let conn = self.lock()?;
        let row: Option<(Option<String>, Option<String>, Option<String>)> = conn
            .query_row(
                r#"
                SELECT external_contact_id, last_synced_at, last_sync_error
                FROM customer_links WHERE customer_id = ?1
                "#,
                params![customer_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .context("Failed to read customer link")?;

        let Some((external_contact_id, synced_at, last_sync_error)) = row else {
            return Ok(None);
        };
        Ok(Some(CustomerLinkRecord {
            external_contact_id,
            last_synced_at: parse_timestamp(synced_at)?,
            last_sync_error,
        }))
    }

    pub fn record_invoice(
        &self,
        order_id: &str,
        invoice_id: &str,
        invoice_number: Option<&str>,
        invoice_status: Option<&str>,
    ) -> Result<()> {
        self.lock()?
            .execute(
                r#"
                INSERT INTO order_links (order_id, invoice_id, invoice_number, invoice_status, last_synced_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(order_id) DO UPDATE SET
                    invoice_id = excluded.invoice_id,
                    invoice_number = excluded.invoice_number,
                    invoice_status = excluded.invoice_status,
                    last_synced_at = excluded.last_synced_at,
                    last_sync_error = NULL
                "#,
                params![
                    order_id,
                    invoice_id,
                    invoice_number,
                    invoice_status,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to record invoice link")?;
        Ok(())
    }

    /// `allocation_error` is `None` when the credit note was allocated.
    pub fn record_credit_note(
        &self,
        order_id: &str,
        credit_note_id: &str,
        credit_note_number: Option<&str>,
        allocation_error: Option<&str>,
    ) -> Result<()> {
        self.lock()?
            .execute(
                r#"
                INSERT INTO order_links (order_id, credit_note_id, credit_note_number, allocation_error, last_synced_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(order_id) DO UPDATE SET
                    credit_note_id = excluded.credit_note_id,
                    credit_note_number = excluded.credit_note_number,
                    allocation_error = excluded.allocation_error,
                    last_synced_at = excluded.last_synced_at,
                    last_sync_error = NULL
                "#,
                params![
                    order_id,
                    credit_note_id,
                    credit_note_number,
                    allocation_error,
                    Utc::now().to_rfc3339()
                ],
            )
            .context("Failed to record credit note link")?;
        Ok(())
    }

    pub fn record_order_error(&self, order_id: &str, error: &str) -> Result<()> {
        self.lock()?
            .execute(
                r#"
                INSERT INTO order_links (order_id, last_sync_error)
                VALUES (?1, ?2)
                ON CONFLICT(order_id) DO UPDATE SET last_sync_error = excluded.last_sync_error
                "#,
                params![order_id, error],
            )
            .context("Failed to record order sync error")?;
        Ok(())
    }

    pub fn order_link(&self, order_id: &str) -> Result<Option<OrderLinkRecord>> {
        type Row = (
            OrderExternalLink,
            Option<String>,
            Option<String>,
            Option<String>,
        );

        let conn = self.lock()?;
        let row: Option<Row> = conn
            .query_row(
                r#"
                SELECT invoice_id, invoice_number, invoice_status,
                       credit_note_id, credit_note_number, allocation_error,
                       last_synced_at, last_sync_error
                FROM order_links WHERE order_id = ?1
                "#,
                params![order_id],
                |row| {
                    Ok((
                        OrderExternalLink {
                            invoice_id: row.get(0)?,
                            invoice_number: row.get(1)?,
                            invoice_status: row.get(2)?,
                            credit_note_id: row.get(3)?,
                            credit_note_number: row.get(4)?,
                        },
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read order link")?;

        let Some((link, allocation_error, synced_at, last_sync_error)) = row else {
            return Ok(None);
        };
        Ok(Some(OrderLinkRecord {
            link,
            allocation_error,
            last_synced_at: parse_timestamp(synced_at)?,
            last_sync_error,
        }))
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Invalid timestamp in link store: {}", s))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_link_roundtrip() {
        let store = LinkStore::new(":memory:").unwrap();
        assert!(store.customer_link("cust-1").unwrap().is_none());

        store.record_contact("cust-1", "contact-9").unwrap();
        let record = store.customer_link("cust-1").unwrap().unwrap();
        assert_eq!(record.external_contact_id.as_deref(), Some("contact-9"));
        assert!(record.last_synced_at.is_some());
        assert!(record.last_sync_error.is_none());
    }

    #[test]
    fn test_error_keeps_existing_contact_id() {
        let store = LinkStore::new(":memory:").unwrap();
        store.record_contact("cust-1", "contact-9").unwrap();
        store
            .record_customer_error("cust-1", "Accounting API returned status 500: boom")
            .unwrap();

        let record = store.customer_link("cust-1").unwrap().unwrap();
        assert_eq!(record.external_contact_id.as_deref(), Some("contact-9"));
        assert_eq!(
            record.last_sync_error.as_deref(),
            Some("Accounting API returned status 500: boom")
        );

        // A later success clears the error
        store.record_contact("cust-1", "contact-9").unwrap();
        let record = store.customer_link("cust-1").unwrap().unwrap();
        assert!(record.last_sync_error.is_none());
    }

    #[test]
    fn test_error_before_first_sync() {
        let store = LinkStore::new(":memory:").unwrap();
        store.record_order_error("order-1", "Not connected").unwrap();

        let record = store.order_link("order-1").unwrap().unwrap();
        assert_eq!(record.link, OrderExternalLink::default());
        assert!(record.last_synced_at.is_none());
        assert_eq!(record.last_sync_error.as_deref(), Some("Not connected"));
    }

    #[test]
    fn test_invoice_then_credit_note() {
        let store = LinkStore::new(":memory:").unwrap();
        store
            .record_invoice("order-1", "inv-1", Some("INV-0042"), Some("AUTHORISED"))
            .unwrap();
        store
            .record_credit_note("order-1", "cn-1", Some("CN-0007"), Some("Invoice is already paid"))
            .unwrap();

        let record = store.order_link("order-1").unwrap().unwrap();
        assert_eq!(
            record.link,
            OrderExternalLink {
                invoice_id: Some("inv-1".to_string()),
                invoice_number: Some("INV-0042".to_string()),
                invoice_status: Some("AUTHORISED".to_string()),
                credit_note_id: Some("cn-1".to_string()),
                credit_note_number: Some("CN-0007".to_string()),
            }
        );
        assert_eq!(record.allocation_error.as_deref(), Some("Invoice is already paid"));
    }
}
