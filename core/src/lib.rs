//! Core library of QuoteVault: quote storage, a query cache, and the
//! favorites synchronizer that keeps a user's favorites responsive while
//! every change is written through to the store.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod models;
pub mod session;
pub mod storage;
pub mod store;

pub use cache::{CacheEvent, QueryCache, QueryKey};
pub use catalog::Catalog;
pub use config::{CacheConfig, Config};
pub use error::{Error, Result};
pub use favorites::{FavoritesSynchronizer, MutationPhase, ToggleAction};
pub use session::Session;
pub use store::{RemoteStore, SqliteStore};
