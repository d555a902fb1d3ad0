mod quote;
mod category;
mod favorite;
mod collection;
mod daily_quote;
mod user;

pub use quote::{Author, Quote};
pub use category::Category;
pub use favorite::Favorite;
pub use collection::{Collection, CollectionItem};
pub use daily_quote::DailyQuote;
pub use user::AuthUser;

use chrono::{DateTime, Utc};

/// Opaque quote identifier
pub type QuoteId = String;

/// Convert Unix timestamp (milliseconds) to DateTime<Utc>
pub fn timestamp_to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(timestamp).unwrap_or_default()
}

/// Convert DateTime<Utc> to Unix timestamp (milliseconds)
pub fn datetime_to_timestamp(datetime: &DateTime<Utc>) -> i64 {
    datetime.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_keeps_millis() {
        let now = Utc::now();
        let restored = timestamp_to_datetime(datetime_to_timestamp(&now));
        assert_eq!(restored.timestamp_millis(), now.timestamp_millis());
    }
}
