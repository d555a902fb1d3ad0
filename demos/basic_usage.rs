// Example: Basic usage of the quotevault-core library
use std::fs;
use std::sync::Arc;

use quotevault_core::models::*;
use quotevault_core::storage::*;
use quotevault_core::{CacheConfig, Catalog, FavoritesSynchronizer, QueryCache, Session, SqliteStore};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let db_path = "basic_usage_quotevault.db";
    fs::remove_file(db_path).ok(); // Clean up previous run

    println!("--- Basic Usage of quotevault-core ---");

    // Initialize database
    let db = Database::new(db_path);
    let conn = db.create()?;
    println!("   ✓ Database created with schema version {}", Database::get_schema_version(&conn)?);

    // ========== Create Quotes ==========
    println!("\n1. Creating quotes...");
    let wisdom = Category::new("Wisdom".to_string());
    CategoryRepository::create(&conn, &wisdom)?;

    let socrates = Quote::new(
        "The unexamined life is not worth living.".to_string(),
        "Socrates".to_string(),
        Some(wisdom.id.clone()),
    );
    QuoteRepository::create(&conn, &socrates)?;
    let seneca = Quote::new(
        "We suffer more often in imagination than in reality.".to_string(),
        "Seneca".to_string(),
        Some(wisdom.id.clone()),
    );
    QuoteRepository::create(&conn, &seneca)?;
    println!("   ✓ Created 2 quotes");

    // ========== Wire up the services ==========
    let store = SqliteStore::new(conn);
    let cache = QueryCache::new(CacheConfig::default());
    let session = Session::new();
    session.sign_in(AuthUser::new("demo-user", "demo@example.com"));

    let favorites = FavoritesSynchronizer::new(Arc::new(store.clone()), cache.clone(), session.clone());
    let catalog = Catalog::new(store, cache, session, 20);

    // ========== Favorites ==========
    println!("\n2. Toggling favorites...");
    favorites.load().await?;
    favorites.toggle_favorite(&socrates.id).await?;
    println!("   ✓ Favorited immediately: {}", favorites.is_favorited(&socrates.id));

    favorites.wait_for_refresh().await;
    for quote in favorites.favorite_quotes() {
        println!("   ★ \"{}\" - {}", quote.content, quote.author);
    }

    // ========== Collections ==========
    println!("\n3. Building a collection...");
    let collection = catalog.create_collection("Stoic mornings", None).await?;
    catalog.add_to_collection(&collection.id, &seneca.id).await?;
    let quotes = catalog.collection_quotes(&collection.id).await?;
    println!("   ✓ '{}' holds {} quote(s)", collection.name, quotes.len());

    // ========== Quote of the day ==========
    println!("\n4. Quote of the day...");
    if let Some(quote) = catalog.daily_quote(chrono::Utc::now().date_naive()).await? {
        println!("   ✓ \"{}\" - {}", quote.content, quote.author);
    }

    fs::remove_file(db_path).ok();
    Ok(())
}
