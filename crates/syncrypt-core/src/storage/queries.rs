use super::models::FileRecord;
use super::sqlite::Ledger;
use rusqlite::{params, Result, Row};
use tracing::debug;

const RECORD_COLUMNS: &str = "id, filename, hash, timestamp, deleted";

fn record_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        content_hash: row.get(2)?,
        last_updated: row.get(3)?,
        deleted: row.get(4)?,
    })
}

impl Ledger {
    // ── Lookups ──────────────────────────────────────────────────

    /// Stored hash for `filename`, whether or not the row is flagged deleted.
    pub fn get_hash(&self, filename: &str) -> Result<Option<String>> {
        match self.connection().query_row(
            "SELECT hash FROM files WHERE filename = ?1",
            params![filename],
            |row| row.get(0),
        ) {
            Ok(hash) => Ok(Some(hash)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// True when an active (not deleted) row already owns `hash`.
    pub fn has_hash(&self, hash: &str) -> Result<bool> {
        self.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE hash = ?1 AND deleted = 0)",
            params![hash],
            |row| row.get(0),
        )
    }

    pub fn has_filename(&self, filename: &str) -> Result<bool> {
        self.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM files WHERE filename = ?1)",
            params![filename],
            |row| row.get(0),
        )
    }

    pub fn get_record(&self, filename: &str) -> Result<Option<FileRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files WHERE filename = ?1");
        match self
            .connection()
            .query_row(&sql, params![filename], record_from_row)
        {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list_all_filenames(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT filename FROM files ORDER BY filename")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn list_deleted_filenames(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT filename FROM files WHERE deleted = 1 ORDER BY filename")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Full rows pending deletion, for review output.
    pub fn list_deleted(&self) -> Result<Vec<FileRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM files WHERE deleted = 1 ORDER BY filename"
        );
        let mut stmt = self.connection().prepare(&sql)?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn list_records(&self) -> Result<Vec<FileRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM files ORDER BY filename");
        let mut stmt = self.connection().prepare(&sql)?;
        let records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    // ── Writes ───────────────────────────────────────────────────
    //
    // Each write runs in its own transaction. An error drops the transaction
    // uncommitted, which rolls it back.

    /// Insert a new record, or with `is_update` replace the hash and timestamp
    /// of an existing one. An updated row is active again. Returns rows changed.
    pub fn upsert(&self, filename: &str, hash: &str, is_update: bool) -> Result<usize> {
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.connection().unchecked_transaction()?;
        let changed = if is_update {
            tx.execute(
                "UPDATE files SET hash = ?1, timestamp = ?2, deleted = 0 WHERE filename = ?3",
                params![hash, now, filename],
            )?
        } else {
            tx.execute(
                "INSERT INTO files (filename, hash, timestamp) VALUES (?1, ?2, ?3)",
                params![filename, hash, now],
            )?
        };
        tx.commit()?;
        debug!(
            "{} hash {} for {}",
            if is_update { "Updated" } else { "Stored" },
            hash,
            filename
        );
        Ok(changed)
    }

    /// Flag `filename` as pending deletion. Returns false if it was already
    /// flagged or is not tracked.
    pub fn mark_deleted(&self, filename: &str) -> Result<bool> {
        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE files SET deleted = 1 WHERE filename = ?1 AND deleted = 0",
            params![filename],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Clear the deletion flag of a row whose file showed up again.
    pub fn restore(&self, filename: &str) -> Result<bool> {
        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE files SET deleted = 0 WHERE filename = ?1 AND deleted = 1",
            params![filename],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    pub fn remove(&self, filename: &str) -> Result<bool> {
        let tx = self.connection().unchecked_transaction()?;
        let changed = tx.execute("DELETE FROM files WHERE filename = ?1", params![filename])?;
        tx.commit()?;
        Ok(changed > 0)
    }
}
