use crate::{Error, Result};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection as SqliteConnection;
use std::path::{Path, PathBuf};
use tracing::debug;

pub type Connection = SqliteConnection;

const SCHEMA: &str = include_str!("../../schema.sql");

/// SQL function lowercasing text with Unicode rules; `LOWER` and `LIKE`
/// only fold ASCII
pub(crate) const FOLD_CASE: &str = "fold_case";

/// Database manager for the quote store
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Create a new database manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Get a connection to the database
    pub fn connect(&self) -> Result<Connection> {
        let conn = SqliteConnection::open(&self.db_path)?;
        Self::configure(&conn)?;
        Ok(conn)
    }

    /// Create a new database and initialize it with the schema
    pub fn create(&self) -> Result<Connection> {
        // Ensure parent directory exists
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = self.connect()?;
        Self::initialize_schema(&conn)?;
        debug!(path = %self.db_path.display(), "database created");

        Ok(conn)
    }

    /// Open a private in-memory database with the schema applied
    pub fn open_in_memory() -> Result<Connection> {
        let conn = SqliteConnection::open_in_memory()?;
        Self::configure(&conn)?;
        Self::initialize_schema(&conn)?;
        Ok(conn)
    }

    /// Per-connection setup: foreign keys and the functions queries rely on
    fn configure(conn: &Connection) -> Result<()> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.create_scalar_function(
            FOLD_CASE,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|text| text.to_lowercase()))
            },
        )?;
        Ok(())
    }

    fn initialize_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Check if the database exists
    pub fn exists(&self) -> bool {
        self.db_path.exists()
    }

    /// Get or create a database connection
    pub fn get_or_create(&self) -> Result<Connection> {
        if self.exists() {
            self.connect()
        } else {
            self.create()
        }
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get the current schema version
    pub fn get_schema_version(conn: &Connection) -> Result<i32> {
        let version: String = conn.query_row(
            "SELECT value FROM metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;

        version
            .parse::<i32>()
            .map_err(|_| Error::InvalidInput("Invalid schema version".to_string()))
    }
}
