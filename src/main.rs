use std::sync::Arc;

use anyhow::Context;

use nutri_assist::catalog::LanguageCatalog;
use nutri_assist::channels::{TelegramChannel, WhatsAppChannel};
use nutri_assist::config::{AppConfig, TelegramConfig, VisionConfig, WhatsAppConfig};
use nutri_assist::conversation::{ConversationRouter, RouterDeps};
use nutri_assist::server::{self, AppState};
use nutri_assist::storage::LocalObjectStore;
use nutri_assist::store::{self, Database, LibSqlBackend, SessionStore};
use nutri_assist::vision::OpenAiVisionAnalyzer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let vision_config = VisionConfig::from_env().context("vision model not configured")?;

    eprintln!("🥗 Nutri Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Vision model: {}", vision_config.model);
    eprintln!("   HTTP: http://0.0.0.0:{}", config.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Catalog ──────────────────────────────────────────────────────────
    let catalog = Arc::new(match &config.catalog_path {
        Some(path) => LanguageCatalog::from_path(path, config.default_locale.clone())
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => LanguageCatalog::builtin(config.default_locale.clone())?,
    });
    eprintln!(
        "   Catalog: {} (locales: {})",
        config
            .catalog_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin".to_string()),
        catalog.locales().join(", ")
    );

    // ── Router ───────────────────────────────────────────────────────────
    let analyzer = Arc::new(OpenAiVisionAnalyzer::new(vision_config)?);
    let object_store = Arc::new(LocalObjectStore::new(
        config.media_dir.clone(),
        config.media_base_url.clone(),
    ));
    let router = Arc::new(ConversationRouter::new(RouterDeps {
        db: Arc::clone(&db),
        catalog: Arc::clone(&catalog),
        analyzer,
        object_store,
        low_health_threshold: config.low_health_threshold,
    }));

    // Spawn session sweep
    let _sweep_handle = store::spawn_session_sweeper(
        SessionStore::new(Arc::clone(&db)),
        config.session_retention,
        config.session_sweep_interval,
    );

    // ── Channels ─────────────────────────────────────────────────────────
    let mut active_channels = Vec::new();

    let whatsapp = WhatsAppConfig::from_env().map(|cfg| Arc::new(WhatsAppChannel::new(cfg)));
    if whatsapp.is_some() {
        active_channels.push("whatsapp");
    }

    if let Some(telegram_config) = TelegramConfig::from_env() {
        let telegram = Arc::new(TelegramChannel::new(telegram_config));
        tokio::spawn(telegram.run(Arc::clone(&router)));
        active_channels.push("telegram");
    }

    if active_channels.is_empty() {
        eprintln!("   Warning: no channels configured (set TELEGRAM_BOT_TOKEN or WHATSAPP_*)");
    }
    eprintln!("   Channels: {}\n", active_channels.join(", "));

    // ── HTTP server ──────────────────────────────────────────────────────
    let app = server::routes(
        AppState {
            router,
            whatsapp,
            catalog_path: config.catalog_path.clone(),
            admin_token: config.admin_token.clone(),
        },
        &config.media_dir,
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "HTTP server started");
    axum::serve(listener, app).await?;

    Ok(())
}
