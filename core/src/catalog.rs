//! Quote browsing, collections and the quote of the day.
//!
//! Reads go through the query cache (`quotes`, `quote`, `categories`,
//! `authors`, `collections`, `collection_items`, `daily_quote` keys);
//! writes invalidate the keys they affect.

use crate::cache::{QueryCache, QueryKey};
use crate::models::{Author, Category, Collection, CollectionItem, Quote};
use crate::session::Session;
use crate::storage::{
    CategoryRepository, CollectionRepository, DailyQuoteRepository, QuoteFilter, QuoteRepository,
};
use crate::store::SqliteStore;
use crate::{Error, Result};
use chrono::NaiveDate;
use rand::seq::SliceRandom;
use tracing::info;

/// Authors listed by [`Catalog::top_authors`]
pub const TOP_AUTHORS: usize = 10;

/// Newest quotes the quote of the day is drawn from
pub const DAILY_QUOTE_CANDIDATES: usize = 20;

pub struct Catalog {
    store: SqliteStore,
    cache: QueryCache,
    session: Session,
    page_size: usize,
}

impl Catalog {
    pub fn new(store: SqliteStore, cache: QueryCache, session: Session, page_size: usize) -> Self {
        Self {
            store,
            cache,
            session,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One page of quotes, newest first
    pub async fn list_quotes(&self, filter: &QuoteFilter, page: usize) -> Result<Vec<Quote>> {
        let key = QueryKey::new([
            "quotes".to_string(),
            filter.category.clone().unwrap_or_else(|| "all".to_string()),
            filter.search.clone().unwrap_or_default(),
            page.to_string(),
        ]);
        let offset = page * self.page_size;
        let limit = self.page_size;

        self.cache
            .fetch(&key, || {
                let store = self.store.clone();
                let filter = filter.clone();
                async move {
                    store
                        .with_connection(move |conn| QuoteRepository::list(conn, &filter, offset, limit))
                        .await
                }
            })
            .await
    }

    /// Index of the page after `pages_loaded` pages, or `None` once a short page was seen
    pub fn next_page(&self, last_page_len: usize, pages_loaded: usize) -> Option<usize> {
        if last_page_len < self.page_size {
            None
        } else {
            Some(pages_loaded)
        }
    }

    pub async fn get_quote(&self, id: &str) -> Result<Quote> {
        let key = QueryKey::new(["quote", id]);
        self.cache
            .fetch(&key, || {
                let store = self.store.clone();
                let id = id.to_string();
                async move { store.with_connection(move |conn| QuoteRepository::get_by_id(conn, &id)).await }
            })
            .await
    }

    /// Submit a quote authored by the signed-in user
    pub async fn create_quote(&self, content: &str, category_id: Option<String>) -> Result<Quote> {
        let user = self.session.require_user()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::InvalidInput("Quote content cannot be empty".to_string()));
        }

        let quote = Quote::new(content.to_string(), user.display_name().to_string(), category_id);
        let stored = quote.clone();
        self.store
            .with_connection(move |conn| QuoteRepository::create(conn, &stored))
            .await?;

        self.cache.invalidate(&QueryKey::new(["quotes"]));
        self.cache.invalidate(&QueryKey::new(["authors"]));
        info!(quote_id = %quote.id, author = %quote.author, "quote created");
        Ok(quote)
    }

    /// All categories ordered by name
    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.cache
            .fetch(&QueryKey::new(["categories"]), || {
                let store = self.store.clone();
                async move { store.with_connection(CategoryRepository::get_all).await }
            })
            .await
    }

    /// The most quoted authors, most prolific first
    pub async fn top_authors(&self) -> Result<Vec<Author>> {
        self.cache
            .fetch(&QueryKey::new(["authors"]), || {
                let store = self.store.clone();
                async move {
                    store
                        .with_connection(|conn| QuoteRepository::top_authors(conn, TOP_AUTHORS))
                        .await
                }
            })
            .await
    }

    /// Collections of the signed-in user, newest first
    pub async fn collections(&self) -> Result<Vec<Collection>> {
        let user = self.session.require_user()?;
        self.cache
            .fetch(&QueryKey::new(["collections", user.id.as_str()]), || {
                let store = self.store.clone();
                let user_id = user.id.clone();
                async move {
                    store
                        .with_connection(move |conn| CollectionRepository::get_for_user(conn, &user_id))
                        .await
                }
            })
            .await
    }

    pub async fn create_collection(&self, name: &str, description: Option<String>) -> Result<Collection> {
        let user = self.session.require_user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Collection name cannot be empty".to_string()));
        }

        let collection = Collection::new(user.id.clone(), name.to_string(), description);
        let stored = collection.clone();
        self.store
            .with_connection(move |conn| CollectionRepository::create(conn, &stored))
            .await?;

        self.cache.invalidate(&QueryKey::new(["collections", user.id.as_str()]));
        info!(collection_id = %collection.id, "collection created");
        Ok(collection)
    }

    /// Add a quote to one of the signed-in user's collections
    pub async fn add_to_collection(&self, collection_id: &str, quote_id: &str) -> Result<()> {
        let user = self.session.require_user()?;
        let item = CollectionItem::new(collection_id.to_string(), quote_id.to_string());
        let user_id = user.id.clone();

        self.store
            .with_connection(move |conn| {
                let collection = CollectionRepository::get_by_id(conn, &item.collection_id)?;
                if collection.user_id != user_id {
                    return Err(Error::NotFound(format!("Collection not found: {}", item.collection_id)));
                }
                QuoteRepository::get_by_id(conn, &item.quote_id)?;
                CollectionRepository::add_item(conn, &item)
            })
            .await?;

        self.cache.invalidate(&QueryKey::new(["collection_items", collection_id]));
        self.cache.invalidate(&QueryKey::new(["collections", user.id.as_str()]));
        info!(collection_id, quote_id, "quote added to collection");
        Ok(())
    }

    pub async fn collection_quotes(&self, collection_id: &str) -> Result<Vec<Quote>> {
        if collection_id.is_empty() {
            return Err(Error::InvalidInput("Collection ID is required".to_string()));
        }

        self.cache
            .fetch(&QueryKey::new(["collection_items", collection_id]), || {
                let store = self.store.clone();
                let collection_id = collection_id.to_string();
                async move {
                    store
                        .with_connection(move |conn| CollectionRepository::quotes(conn, &collection_id))
                        .await
                }
            })
            .await
    }

    /// The quote of the day for `date`, chosen once and then kept for that date
    pub async fn daily_quote(&self, date: NaiveDate) -> Result<Option<Quote>> {
        let key = QueryKey::new(["daily_quote".to_string(), date.format("%Y-%m-%d").to_string()]);
        self.cache
            .fetch(&key, || {
                let store = self.store.clone();
                async move { store.with_connection(move |conn| pick_daily_quote(conn, date)).await }
            })
            .await
    }
}

fn pick_daily_quote(conn: &crate::storage::Connection, date: NaiveDate) -> Result<Option<Quote>> {
    let daily = match DailyQuoteRepository::get_by_date(conn, date)? {
        Some(daily) => daily,
        None => {
            let candidates = QuoteRepository::list(conn, &QuoteFilter::default(), 0, DAILY_QUOTE_CANDIDATES)?;
            let Some(pick) = candidates.choose(&mut rand::thread_rng()) else {
                return Ok(None);
            };
            DailyQuoteRepository::get_or_create(conn, date, pick.id.clone())?
        }
    };

    let mut quote = QuoteRepository::get_by_id(conn, &daily.quote_id)?;
    quote.is_quote_of_day = true;
    Ok(Some(quote))
}
