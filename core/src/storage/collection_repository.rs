use crate::models::{Collection, CollectionItem, Quote, datetime_to_timestamp, timestamp_to_datetime};
use crate::storage::quote_repository::{QUOTE_COLUMNS, quote_from_row};
use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

pub struct CollectionRepository;

impl CollectionRepository {
    /// Create a new collection
    pub fn create(conn: &Connection, collection: &Collection) -> Result<()> {
        conn.execute(
            "INSERT INTO collections (id, user_id, name, description, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection.id,
                collection.user_id,
                collection.name,
                collection.description,
                datetime_to_timestamp(&collection.created_at),
                datetime_to_timestamp(&collection.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get a collection by ID
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Collection> {
        let collection = conn
            .query_row(
                "SELECT id, user_id, name, description, created_at, updated_at FROM collections WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Collection {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        created_at: timestamp_to_datetime(row.get(4)?),
                        updated_at: timestamp_to_datetime(row.get(5)?),
                    })
                },
            )
            .optional()?;

        collection.ok_or_else(|| Error::NotFound(format!("Collection not found: {}", id)))
    }

    /// Get all collections of a user, newest first
    pub fn get_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Collection>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, description, created_at, updated_at FROM collections
             WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        )?;

        let collections = stmt.query_map(params![user_id], |row| {
            Ok(Collection {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                created_at: timestamp_to_datetime(row.get(4)?),
                updated_at: timestamp_to_datetime(row.get(5)?),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(collections)
    }

    /// Check whether a quote is already part of a collection
    pub fn contains(conn: &Connection, collection_id: &str, quote_id: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM collection_items WHERE collection_id = ?1 AND quote_id = ?2",
            params![collection_id, quote_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Add a quote to a collection and bump the collection's modified time
    pub fn add_item(conn: &Connection, item: &CollectionItem) -> Result<()> {
        if Self::contains(conn, &item.collection_id, &item.quote_id)? {
            return Err(Error::ConstraintViolation(
                "This quote is already in the collection".to_string(),
            ));
        }

        let inserted = conn.execute(
            "INSERT INTO collection_items (id, collection_id, quote_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                item.id,
                item.collection_id,
                item.quote_id,
                datetime_to_timestamp(&item.created_at),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                return Err(Error::NotFound(format!("Collection not found: {}", item.collection_id)));
            }
            Err(e) => return Err(e.into()),
        }

        conn.execute(
            "UPDATE collections SET updated_at = ?1 WHERE id = ?2",
            params![datetime_to_timestamp(&item.created_at), item.collection_id],
        )?;

        Ok(())
    }

    /// Get the quotes of a collection in insertion order, skipping dangling items
    pub fn quotes(conn: &Connection, collection_id: &str) -> Result<Vec<Quote>> {
        let sql = format!(
            "SELECT {} FROM collection_items i
             JOIN quotes q ON q.id = i.quote_id
             LEFT JOIN categories c ON c.id = q.category_id
             WHERE i.collection_id = ?1
             ORDER BY i.created_at ASC, i.rowid ASC",
            QUOTE_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let quotes = stmt
            .query_map(params![collection_id], quote_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(quotes)
    }
}
