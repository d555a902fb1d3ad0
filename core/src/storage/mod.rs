mod database;
mod quote_repository;
mod category_repository;
mod favorite_repository;
mod collection_repository;
mod daily_quote_repository;

pub use database::{Database, Connection};
pub use quote_repository::{QuoteFilter, QuoteRepository};
pub use category_repository::CategoryRepository;
pub use favorite_repository::FavoriteRepository;
pub use collection_repository::CollectionRepository;
pub use daily_quote_repository::DailyQuoteRepository;
