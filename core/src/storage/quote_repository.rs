use super::database::FOLD_CASE;
use crate::models::{Author, Quote, datetime_to_timestamp, timestamp_to_datetime};
use crate::{Error, Result};
use rusqlite::{Connection, Row, params};

/// Columns selected for every quote read, joined with its category name.
pub(crate) const QUOTE_COLUMNS: &str = "q.id, q.content, q.author, q.author_title, q.category_id, \
     c.name, q.is_quote_of_day, q.created_at";

/// Map a row selected with [`QUOTE_COLUMNS`] into a quote.
pub(crate) fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get(0)?,
        content: row.get(1)?,
        author: row.get(2)?,
        author_title: row.get(3)?,
        category_id: row.get(4)?,
        category_name: row.get(5)?,
        is_quote_of_day: row.get(6)?,
        created_at: timestamp_to_datetime(row.get(7)?),
    })
}

/// Browse filter for [`QuoteRepository::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuoteFilter {
    /// Category id; `None` or `"all"` disables the filter
    pub category: Option<String>,
    /// Case-insensitive substring matched against content or author
    pub search: Option<String>,
}

impl QuoteFilter {
    fn category_param(&self) -> Option<&str> {
        self.category
            .as_deref()
            .filter(|category| !category.is_empty() && *category != "all")
    }

    fn search_param(&self) -> Option<String> {
        let search = self.search.as_deref()?.trim();
        if search.is_empty() {
            return None;
        }

        let escaped = search
            .to_lowercase()
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

pub struct QuoteRepository;

impl QuoteRepository {
    /// Create a new quote
    pub fn create(conn: &Connection, quote: &Quote) -> Result<()> {
        conn.execute(
            "INSERT INTO quotes (id, content, author, author_title, category_id, is_quote_of_day, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                quote.id,
                quote.content,
                quote.author,
                quote.author_title,
                quote.category_id,
                quote.is_quote_of_day,
                datetime_to_timestamp(&quote.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a quote by ID
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Quote> {
        let sql = format!(
            "SELECT {} FROM quotes q LEFT JOIN categories c ON c.id = q.category_id WHERE q.id = ?1",
            QUOTE_COLUMNS
        );

        match conn.query_row(&sql, params![id], quote_from_row) {
            Ok(quote) => Ok(quote),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(Error::NotFound(format!("Quote not found: {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// List quotes newest first, filtered and paged
    pub fn list(conn: &Connection, filter: &QuoteFilter, offset: usize, limit: usize) -> Result<Vec<Quote>> {
        let sql = format!(
            "SELECT {} FROM quotes q LEFT JOIN categories c ON c.id = q.category_id
             WHERE (?1 IS NULL OR q.category_id = ?1)
               AND (?2 IS NULL
                    OR {fold}(q.content) LIKE ?2 ESCAPE '\\'
                    OR {fold}(q.author) LIKE ?2 ESCAPE '\\')
             ORDER BY q.created_at DESC, q.rowid DESC
             LIMIT ?3 OFFSET ?4",
            QUOTE_COLUMNS,
            fold = FOLD_CASE
        );

        let mut stmt = conn.prepare(&sql)?;
        let quotes = stmt
            .query_map(
                params![
                    filter.category_param(),
                    filter.search_param(),
                    limit as i64,
                    offset as i64,
                ],
                quote_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(quotes)
    }

    /// Aggregate authors by number of quotes, most prolific first
    pub fn top_authors(conn: &Connection, limit: usize) -> Result<Vec<Author>> {
        let mut stmt = conn.prepare(
            "SELECT author, COUNT(*) AS quote_count FROM quotes
             WHERE author <> ''
             GROUP BY author
             ORDER BY quote_count DESC, author ASC
             LIMIT ?1",
        )?;

        let authors = stmt
            .query_map(params![limit as i64], |row| {
                let count: i64 = row.get(1)?;
                Ok(Author {
                    name: row.get(0)?,
                    quote_count: count as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(authors)
    }

    /// Count all quotes
    pub fn count(conn: &Connection) -> Result<usize> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM quotes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
