use rusqlite::{Connection, Result};
use std::path::Path;
use tracing::debug;

/// Handle on the persistent hash ledger. Opened once per process and passed
/// explicitly to everything that reads or writes tracked files.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let ledger = Ledger { conn };
        ledger.configure_pragmas()?;
        ledger.initialize()?;
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Ledger { conn };
        ledger.configure_pragmas()?;
        ledger.initialize()?;
        Ok(ledger)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        debug!("SQLite pragmas configured (WAL mode)");
        Ok(())
    }

    /// Create the `files` relation and its indexes if absent. Safe to call on
    /// every startup.
    pub fn initialize(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Ledger schema initialized (was version {})", version);
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the underlying connection, reporting any error SQLite raises on shutdown.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)
    }
}
