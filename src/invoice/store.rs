use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::U256;
use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension as _, Row, params};

use super::{Invoice, InvoiceStatus};

/// Store handle shared by the submitter, the watcher and the expiry sweeper.
pub type SharedInvoiceStore = Arc<Mutex<SqliteInvoiceStore>>;

const INVOICE_COLUMNS: &str = r#"
  id,
  onchain_invoice_id,
  merchant_address,
  amount_wei,
  status,
  expires_at,
  contract_address,
  tx_hash,
  payer_address,
  created_at,
  updated_at
"#;

#[derive(Debug)]
pub struct SqliteInvoiceStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteInvoiceStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create invoice store dir {}", dir.display()))?;
        }

        let conn =
            Connection::open(&path).with_context(|| format!("open sqlite {}", path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .context("set sqlite busy_timeout")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .context("configure sqlite pragmas")?;

        migrate(&conn).context("migrate sqlite schema")?;

        Ok(Self { conn, path })
    }

    pub fn into_shared(self) -> SharedInvoiceStore {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO invoices ({INVOICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    &invoice.id,
                    invoice.onchain_invoice_id.map(|id| id.to_string()),
                    &invoice.merchant_address,
                    invoice.amount_wei.to_string(),
                    status_to_str(invoice.status),
                    invoice.expires_at.timestamp_millis(),
                    &invoice.contract_address,
                    &invoice.tx_hash,
                    &invoice.payer_address,
                    invoice.created_at.timestamp_millis(),
                    invoice.updated_at.timestamp_millis(),
                ],
            )
            .with_context(|| format!("insert invoice {}", invoice.id))?;
        Ok(())
    }

    pub fn get_invoice(&self, id: &str) -> Result<Option<Invoice>> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1"),
                params![id],
                invoice_from_row,
            )
            .optional()
            .with_context(|| format!("get invoice {id}"))
    }

    pub fn find_by_tx_hash(&self, tx_hash: &str) -> Result<Option<Invoice>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM invoices WHERE tx_hash = ?1 ORDER BY created_at LIMIT 1"
                ),
                params![tx_hash],
                invoice_from_row,
            )
            .optional()
            .with_context(|| format!("find invoice by tx hash {tx_hash}"))
    }

    pub fn find_by_onchain_id(&self, onchain_id: U256) -> Result<Option<Invoice>> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE onchain_invoice_id = ?1"),
                params![onchain_id.to_string()],
                invoice_from_row,
            )
            .optional()
            .with_context(|| format!("find invoice by onchain id {onchain_id}"))
    }

    /// Links the contract-assigned id. Returns `false` when the invoice already had one.
    pub fn link_onchain_id(
        &mut self,
        id: &str,
        onchain_id: U256,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE invoices
SET onchain_invoice_id = ?2, updated_at = ?3
WHERE id = ?1 AND onchain_invoice_id IS NULL
"#,
                params![id, onchain_id.to_string(), now.timestamp_millis()],
            )
            .with_context(|| format!("link invoice {id} to onchain id {onchain_id}"))?;
        Ok(rows == 1)
    }

    /// Records a payment. Applies over PENDING and EXPIRED alike; a PAID row is left
    /// untouched and `false` is returned.
    pub fn mark_paid(
        &mut self,
        id: &str,
        payer_address: &str,
        payment_tx_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE invoices
SET status = ?2, payer_address = ?3, tx_hash = ?4, updated_at = ?5
WHERE id = ?1 AND status <> ?2
"#,
                params![
                    id,
                    status_to_str(InvoiceStatus::Paid),
                    payer_address,
                    payment_tx_hash,
                    now.timestamp_millis(),
                ],
            )
            .with_context(|| format!("mark invoice {id} paid"))?;
        Ok(rows == 1)
    }

    /// Moves every PENDING invoice whose expiry lies before `now` to EXPIRED in one
    /// statement. Returns the number of invoices expired.
    pub fn expire_overdue(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.conn
            .execute(
                r#"
UPDATE invoices
SET status = ?1, updated_at = ?3
WHERE status = ?2 AND expires_at < ?3
"#,
                params![
                    status_to_str(InvoiceStatus::Expired),
                    status_to_str(InvoiceStatus::Pending),
                    now.timestamp_millis(),
                ],
            )
            .context("expire overdue invoices")
    }

    pub fn load_checkpoint(&self) -> Result<Option<u64>> {
        let block: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_processed_block FROM scan_checkpoint WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("load scan checkpoint")?;
        block
            .map(|b| u64::try_from(b).with_context(|| format!("invalid checkpoint block {b}")))
            .transpose()
    }

    /// Creates the checkpoint if absent and returns the stored value, which is the
    /// existing one when another writer got there first.
    pub fn init_checkpoint(&mut self, block: u64) -> Result<u64> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO scan_checkpoint (id, last_processed_block) VALUES (1, ?1)",
                params![block_to_sql(block)?],
            )
            .context("init scan checkpoint")?;
        self.load_checkpoint()?
            .context("scan checkpoint missing after init")
    }

    /// Moves the checkpoint forward to `block`. Never lowers it; returns the stored value.
    pub fn advance_checkpoint(&mut self, block: u64) -> Result<u64> {
        let rows = self
            .conn
            .execute(
                r#"
UPDATE scan_checkpoint
SET last_processed_block = MAX(last_processed_block, ?1)
WHERE id = 1
"#,
                params![block_to_sql(block)?],
            )
            .with_context(|| format!("advance scan checkpoint to {block}"))?;
        anyhow::ensure!(rows == 1, "scan checkpoint not initialized");
        self.load_checkpoint()?
            .context("scan checkpoint missing after advance")
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS invoices (
  id TEXT PRIMARY KEY,
  onchain_invoice_id TEXT,
  merchant_address TEXT NOT NULL,
  amount_wei TEXT NOT NULL,
  status TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  contract_address TEXT NOT NULL,
  tx_hash TEXT NOT NULL,
  payer_address TEXT,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS invoices_onchain_id_idx
  ON invoices(onchain_invoice_id) WHERE onchain_invoice_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS invoices_submission_tx_idx
  ON invoices(tx_hash) WHERE status <> 'PAID';
CREATE INDEX IF NOT EXISTS invoices_tx_hash_idx ON invoices(tx_hash);
CREATE INDEX IF NOT EXISTS invoices_status_expiry_idx ON invoices(status, expires_at);

CREATE TABLE IF NOT EXISTS scan_checkpoint (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  last_processed_block INTEGER NOT NULL
);
"#,
    )
    .context("create tables")?;
    Ok(())
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    let onchain_invoice_id: Option<String> = row.get(1)?;
    let amount_wei: String = row.get(3)?;
    let status: String = row.get(4)?;

    Ok(Invoice {
        id: row.get(0)?,
        onchain_invoice_id: onchain_invoice_id
            .map(|s| u256_from_sql(&s, 1))
            .transpose()?,
        merchant_address: row.get(2)?,
        amount_wei: u256_from_sql(&amount_wei, 3)?,
        status: status_from_str(&status, 4)?,
        expires_at: timestamp_from_sql(row.get(5)?, 5)?,
        contract_address: row.get(6)?,
        tx_hash: row.get(7)?,
        payer_address: row.get(8)?,
        created_at: timestamp_from_sql(row.get(9)?, 9)?,
        updated_at: timestamp_from_sql(row.get(10)?, 10)?,
    })
}

fn u256_from_sql(s: &str, col: usize) -> rusqlite::Result<U256> {
    U256::from_str_radix(s, 10).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Text,
            format!("invalid uint256 {s:?}: {e}").into(),
        )
    })
}

fn timestamp_from_sql(millis: i64, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Integer,
            format!("invalid timestamp {millis}").into(),
        )
    })
}

fn block_to_sql(block: u64) -> Result<i64> {
    i64::try_from(block).with_context(|| format!("block number {block} out of range"))
}

fn status_to_str(status: InvoiceStatus) -> &'static str {
    match status {
        InvoiceStatus::Pending => "PENDING",
        InvoiceStatus::Paid => "PAID",
        InvoiceStatus::Expired => "EXPIRED",
    }
}

fn status_from_str(s: &str, col: usize) -> rusqlite::Result<InvoiceStatus> {
    match s {
        "PENDING" => Ok(InvoiceStatus::Pending),
        "PAID" => Ok(InvoiceStatus::Paid),
        "EXPIRED" => Ok(InvoiceStatus::Expired),
        other => Err(rusqlite::Error::FromSqlConversionFailure(
            col,
            Type::Text,
            format!("unknown invoice status: {other}").into(),
        )),
    }
}
