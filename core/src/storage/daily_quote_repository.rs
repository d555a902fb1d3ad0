use crate::models::DailyQuote;
use crate::Result;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, params};

pub struct DailyQuoteRepository;

impl DailyQuoteRepository {
    /// Record the quote of the day
    pub fn create(conn: &Connection, daily_quote: &DailyQuote) -> Result<()> {
        conn.execute(
            "INSERT INTO daily_quotes (date, quote_id) VALUES (?1, ?2)",
            params![daily_quote.date_string(), daily_quote.quote_id],
        )?;

        Ok(())
    }

    /// Get the quote of the day for a date, if one was chosen
    pub fn get_by_date(conn: &Connection, date: NaiveDate) -> Result<Option<DailyQuote>> {
        let date_str = date.format("%Y-%m-%d").to_string();

        let quote_id: Option<String> = conn
            .query_row(
                "SELECT quote_id FROM daily_quotes WHERE date = ?1",
                params![date_str],
                |row| row.get(0),
            )
            .optional()?;

        Ok(quote_id.map(|quote_id| DailyQuote::new(date, quote_id)))
    }

    /// Get the quote of the day for a date, recording `quote_id` if none exists yet
    pub fn get_or_create(conn: &Connection, date: NaiveDate, quote_id: String) -> Result<DailyQuote> {
        match Self::get_by_date(conn, date)? {
            Some(daily_quote) => Ok(daily_quote),
            None => {
                let daily_quote = DailyQuote::new(date, quote_id);
                Self::create(conn, &daily_quote)?;
                Ok(daily_quote)
            }
        }
    }
}
