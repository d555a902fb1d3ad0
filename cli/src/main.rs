use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use quotevault_core::{
    models::{AuthUser, Category, Quote},
    storage::{CategoryRepository, Connection, Database, QuoteFilter, QuoteRepository},
    Catalog, Config, FavoritesSynchronizer, QueryCache, Session, SqliteStore, ToggleAction,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quotevault", version, about = "Browse, favorite and collect quotes")]
struct Cli {
    /// Path to the TOML config, created with defaults if missing
    #[arg(long, default_value = "quotevault.toml")]
    config: PathBuf,

    /// Act as this user (required for favorites and collections)
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fill an empty database with sample categories and quotes
    Seed,
    /// List quotes, newest first
    Quotes {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
    /// Show one quote
    Show { id: String },
    /// Submit a new quote
    Add {
        content: String,
        #[arg(long)]
        category: Option<String>,
    },
    Categories,
    /// Most quoted authors
    Authors,
    /// Quote of the day
    Daily,
    /// List your favorite quotes
    Favorites,
    /// Toggle a quote in your favorites
    Favorite { quote_id: String },
    /// List your collections
    Collections,
    #[command(subcommand)]
    Collection(CollectionCommand),
}

#[derive(Subcommand)]
enum CollectionCommand {
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    Add { collection_id: String, quote_id: String },
    Show { collection_id: String },
}

struct App {
    store: SqliteStore,
    catalog: Catalog,
    favorites: FavoritesSynchronizer,
    session: Session,
}

impl App {
    fn open(config: &Config, user: Option<String>) -> Result<Self> {
        let db = Database::new(&config.database_path);
        let conn = db
            .get_or_create()
            .with_context(|| format!("opening database {}", db.path().display()))?;

        let store = SqliteStore::new(conn);
        let cache = QueryCache::new(config.cache.clone());
        let session = Session::new();
        if let Some(id) = user {
            let mut auth_user = AuthUser::new(id.clone(), format!("{}@localhost", id));
            auth_user.username = Some(id);
            session.sign_in(auth_user);
        }

        let favorites = FavoritesSynchronizer::new(Arc::new(store.clone()), cache.clone(), session.clone());
        let catalog = Catalog::new(store.clone(), cache, session.clone(), config.page_size);

        Ok(Self {
            store,
            catalog,
            favorites,
            session,
        })
    }

    fn require_user(&self) -> Result<AuthUser> {
        self.session
            .require_user()
            .context("this command needs --user <id>")
    }

    fn print_quote(&self, quote: &Quote) {
        let marker = if self.favorites.is_favorited(&quote.id) { "*" } else { " " };
        let category = quote
            .category_name
            .as_deref()
            .map(|name| format!(" [{}]", name))
            .unwrap_or_default();
        println!("{} {}  \"{}\" - {}{}", marker, quote.id, quote.content, quote.author, category);
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Seed => {
                let inserted = self.store.with_connection(seed_sample_data).await?;
                println!("Seeded {} quotes", inserted);
            }
            Command::Quotes { category, search, page } => {
                if self.session.current_user().is_some() {
                    self.favorites.load().await?;
                }
                let filter = QuoteFilter { category, search };
                let quotes = self.catalog.list_quotes(&filter, page).await?;
                for quote in &quotes {
                    self.print_quote(quote);
                }
                if let Some(next) = self.catalog.next_page(quotes.len(), page + 1) {
                    println!("-- more: --page {}", next);
                }
            }
            Command::Show { id } => {
                if self.session.current_user().is_some() {
                    self.favorites.load().await?;
                }
                let quote = self.catalog.get_quote(&id).await?;
                self.print_quote(&quote);
            }
            Command::Add { content, category } => {
                self.require_user()?;
                let quote = self.catalog.create_quote(&content, category).await?;
                println!("Added {}", quote.id);
            }
            Command::Categories => {
                for category in self.catalog.categories().await? {
                    println!("{}  {}", category.id, category.name);
                }
            }
            Command::Authors => {
                for author in self.catalog.top_authors().await? {
                    println!("{:>4}  {}", author.quote_count, author.name);
                }
            }
            Command::Daily => match self.catalog.daily_quote(Local::now().date_naive()).await? {
                Some(quote) => self.print_quote(&quote),
                None => println!("No quotes yet, try `quotevault seed`"),
            },
            Command::Favorites => {
                self.require_user()?;
                self.favorites.load().await?;
                for quote in self.favorites.favorite_quotes() {
                    self.print_quote(&quote);
                }
            }
            Command::Favorite { quote_id } => {
                self.require_user()?;
                self.favorites.load().await?;
                let action = self.favorites.toggle_favorite(&quote_id).await?;
                self.favorites.wait_for_refresh().await;
                match action {
                    ToggleAction::Added => println!("Added {} to favorites", quote_id),
                    ToggleAction::Removed => println!("Removed {} from favorites", quote_id),
                }
                println!("{} favorites", self.favorites.favorite_ids().len());
            }
            Command::Collections => {
                self.require_user()?;
                for collection in self.catalog.collections().await? {
                    println!("{}  {}", collection.id, collection.name);
                }
            }
            Command::Collection(command) => {
                self.require_user()?;
                self.run_collection(command).await?;
            }
        }

        Ok(())
    }

    async fn run_collection(&self, command: CollectionCommand) -> Result<()> {
        match command {
            CollectionCommand::Create { name, description } => {
                let collection = self.catalog.create_collection(&name, description).await?;
                println!("Created collection {}", collection.id);
            }
            CollectionCommand::Add { collection_id, quote_id } => {
                self.catalog.add_to_collection(&collection_id, &quote_id).await?;
                println!("Quote added to collection!");
            }
            CollectionCommand::Show { collection_id } => {
                self.favorites.load().await?;
                for quote in self.catalog.collection_quotes(&collection_id).await? {
                    self.print_quote(&quote);
                }
            }
        }
        Ok(())
    }
}

const SAMPLE_QUOTES: &[(&str, &str, &str)] = &[
    ("The unexamined life is not worth living.", "Socrates", "Wisdom"),
    ("We suffer more often in imagination than in reality.", "Seneca", "Wisdom"),
    ("Waste no more time arguing about what a good man should be. Be one.", "Marcus Aurelius", "Motivation"),
    ("It does not matter how slowly you go as long as you do not stop.", "Confucius", "Motivation"),
    ("Love all, trust a few, do wrong to none.", "William Shakespeare", "Love"),
    ("I have not failed. I've just found 10,000 ways that won't work.", "Thomas Edison", "Success"),
    ("Luck is what happens when preparation meets opportunity.", "Seneca", "Success"),
    ("A day without laughter is a day wasted.", "Charlie Chaplin", "Humor"),
];

/// Insert the sample quotes unless the database already has some
fn seed_sample_data(conn: &Connection) -> quotevault_core::Result<usize> {
    if QuoteRepository::count(conn)? > 0 {
        return Ok(0);
    }

    for (content, author, category_name) in SAMPLE_QUOTES {
        let category = match CategoryRepository::find_by_name(conn, category_name)? {
            Some(category) => category,
            None => {
                let category = Category::new(category_name.to_string());
                CategoryRepository::create(conn, &category)?;
                category
            }
        };

        let quote = Quote::new(content.to_string(), author.to_string(), Some(category.id));
        QuoteRepository::create(conn, &quote)?;
    }

    Ok(SAMPLE_QUOTES.len())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let app = App::open(&config, cli.user)?;
    app.run(cli.command).await
}
