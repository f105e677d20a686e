use std::sync::Arc;

use clap::Parser;
use medsync_core::inference::{create_backend, InferenceConfig};
use medsync_core::{LedgerStore, MedsyncConfig, MemoryStore, PgStore, ProfileStore};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use medsync_server::{server, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "medsync.toml")]
    config: String,

    #[arg(long)]
    health: bool,

    /// Keep all data in memory instead of Postgres
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let mut config = match MedsyncConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = url;
    }

    // Init logging
    let default_level = config
        .service
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let (ledger_store, profiles): (Arc<dyn LedgerStore>, Arc<dyn ProfileStore>) = if args.ephemeral {
        tracing::warn!("Running with in-memory storage; data is lost on exit");
        let store = Arc::new(MemoryStore::new());
        let ledger_store: Arc<dyn LedgerStore> = store.clone();
        let profiles: Arc<dyn ProfileStore> = store;
        (ledger_store, profiles)
    } else {
        let pool = match medsync_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };

        if args.health {
            match medsync_core::db::health_check(&pool).await {
                Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                Err(e) => {
                    println!("❌ PostgreSQL connection failed: {}", e);
                    std::process::exit(1);
                }
            }

            match medsync_core::db::check_schema(&pool).await {
                Ok(5) => println!("✅ Schema present (5/5 tables)"),
                Ok(n) => {
                    println!("❌ Schema incomplete: {}/5 tables; run migrations/0001_init.sql", n);
                    std::process::exit(1);
                }
                Err(e) => {
                    println!("❌ Schema check failed: {}", e);
                    std::process::exit(1);
                }
            }

            match config.api_key() {
                Some(_) => println!("✅ {} is set", config.inference.api_key_env),
                None => println!("⚠️  {} is not set; advice will use fallback text", config.inference.api_key_env),
            }

            println!("✅ MedSync health check passed");
            return Ok(());
        }

        let store = Arc::new(PgStore::new(pool));
        let ledger_store: Arc<dyn LedgerStore> = store.clone();
        let profiles: Arc<dyn ProfileStore> = store;
        (ledger_store, profiles)
    };

    let backend = create_backend(InferenceConfig::from_settings(&config.inference, config.api_key()));
    let socket_path = config.service.socket_path.clone();
    let http_enabled = config.http.enabled;
    let state = Arc::new(AppState::new(config, ledger_store, profiles, backend));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // HTTP REST API alongside the IPC socket
    if http_enabled {
        let http_state = state.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = medsync_server::http::start_http_server(http_state, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    server::run_unix_server(&socket_path, state, tx.subscribe()).await?;

    Ok(())
}
