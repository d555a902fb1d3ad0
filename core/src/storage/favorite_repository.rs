use crate::models::{Favorite, Quote, datetime_to_timestamp};
use crate::storage::quote_repository::{QUOTE_COLUMNS, quote_from_row};
use crate::{Error, Result};
use rusqlite::{Connection, ErrorCode, params};

pub struct FavoriteRepository;

impl FavoriteRepository {
    /// Add a quote to a user's favorites
    pub fn create(conn: &Connection, favorite: &Favorite) -> Result<()> {
        let inserted = conn.execute(
            "INSERT INTO favorites (id, user_id, quote_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                favorite.id,
                favorite.user_id,
                favorite.quote_id,
                datetime_to_timestamp(&favorite.created_at),
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(Error::ConstraintViolation(format!(
                    "Favorite already exists or quote is missing: {} / {}",
                    favorite.user_id, favorite.quote_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check if a quote is favorited by a user
    pub fn is_favorited(conn: &Connection, user_id: &str, quote_id: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND quote_id = ?2",
            params![user_id, quote_id],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Get the ids of all quotes a user has favorited, newest favorite first
    pub fn quote_ids_for_user(conn: &Connection, user_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT quote_id FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        )?;

        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    /// Get the full quotes a user has favorited, newest favorite first
    pub fn quotes_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Quote>> {
        let sql = format!(
            "SELECT {} FROM favorites f
             JOIN quotes q ON q.id = f.quote_id
             LEFT JOIN categories c ON c.id = q.category_id
             WHERE f.user_id = ?1
             ORDER BY f.created_at DESC, f.rowid DESC",
            QUOTE_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let quotes = stmt
            .query_map(params![user_id], quote_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(quotes)
    }

    /// Remove a quote from a user's favorites
    pub fn delete(conn: &Connection, user_id: &str, quote_id: &str) -> Result<()> {
        let rows_affected = conn.execute(
            "DELETE FROM favorites WHERE user_id = ?1 AND quote_id = ?2",
            params![user_id, quote_id],
        )?;

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("Favorite not found: {} / {}", user_id, quote_id)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, QuoteRepository};
    use chrono::{Duration, Utc};

    fn setup_with_quotes(ids: &[&str]) -> Connection {
        let conn = Database::open_in_memory().unwrap();
        for id in ids {
            let quote = Quote::with_id(id.to_string(), format!("Quote {}", id), "Author".to_string());
            QuoteRepository::create(&conn, &quote).unwrap();
        }
        conn
    }

    #[test]
    fn test_add_favorite() {
        let conn = setup_with_quotes(&["q1"]);

        let favorite = Favorite::new("user-1".to_string(), "q1".to_string());
        FavoriteRepository::create(&conn, &favorite).unwrap();

        assert!(FavoriteRepository::is_favorited(&conn, "user-1", "q1").unwrap());
        assert!(!FavoriteRepository::is_favorited(&conn, "user-2", "q1").unwrap());
    }

    #[test]
    fn test_duplicate_favorite_is_constraint_violation() {
        let conn = setup_with_quotes(&["q1"]);

        FavoriteRepository::create(&conn, &Favorite::new("user-1".to_string(), "q1".to_string())).unwrap();
        let result = FavoriteRepository::create(&conn, &Favorite::new("user-1".to_string(), "q1".to_string()));

        assert!(matches!(result, Err(Error::ConstraintViolation(_))));
    }

    #[test]
    fn test_favorites_newest_first() {
        let conn = setup_with_quotes(&["q1", "q2"]);

        let mut older = Favorite::new("user-1".to_string(), "q1".to_string());
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = Favorite::new("user-1".to_string(), "q2".to_string());

        FavoriteRepository::create(&conn, &older).unwrap();
        FavoriteRepository::create(&conn, &newer).unwrap();

        let ids = FavoriteRepository::quote_ids_for_user(&conn, "user-1").unwrap();
        assert_eq!(ids, vec!["q2".to_string(), "q1".to_string()]);

        let quotes = FavoriteRepository::quotes_for_user(&conn, "user-1").unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].id, "q2");
        assert_eq!(quotes[1].content, "Quote q1");
    }

    #[test]
    fn test_remove_favorite() {
        let conn = setup_with_quotes(&["q1"]);

        FavoriteRepository::create(&conn, &Favorite::new("user-1".to_string(), "q1".to_string())).unwrap();
        FavoriteRepository::delete(&conn, "user-1", "q1").unwrap();

        assert!(!FavoriteRepository::is_favorited(&conn, "user-1", "q1").unwrap());
        assert!(matches!(
            FavoriteRepository::delete(&conn, "user-1", "q1"),
            Err(Error::NotFound(_))
        ));
    }
}
