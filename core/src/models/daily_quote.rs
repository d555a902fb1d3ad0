use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyQuote {
    pub date: NaiveDate,
    pub quote_id: String,
}

impl DailyQuote {
    /// Create a new daily quote entry
    pub fn new(date: NaiveDate, quote_id: String) -> Self {
        Self { date, quote_id }
    }

    /// Format the date as YYYY-MM-DD
    pub fn date_string(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}
