//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::banner;
use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::AnalyticsRecorder;
use crate::data::duckdb::DuckdbService;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub database: Arc<DuckdbService>,
    pub analytics: Arc<dyn AnalyticsRecorder>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::Check) => return Self::check_config(&cli_config),
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    /// Build the application from already loaded configuration
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let database = Arc::new(
            DuckdbService::init(&config.database)
                .await
                .context("Failed to initialize database")?,
        );
        let analytics: Arc<dyn AnalyticsRecorder> = Arc::new(
            database
                .analytics_recorder()
                .context("Failed to open analytics connection")?,
        );
        let shutdown = ShutdownService::new(database.clone());

        Ok(Self {
            shutdown,
            config,
            database,
            analytics,
        })
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        Self::from_config(config).await
    }

    fn check_config(cli: &CliConfig) -> Result<()> {
        let config = AppConfig::load(cli)?;
        println!("Configuration OK");
        println!(
            "  listen:   {}:{}",
            config.server.host, config.server.port
        );
        println!(
            "  database: {}",
            config
                .database
                .path
                .as_ref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
        );
        println!("  auth:     {}", if config.auth.is_enabled() { "on" } else { "off" });
        for (name, dataset) in &config.datasets {
            println!(
                "  source {:<16} table={} filters={}{}",
                name,
                dataset.table,
                dataset.filters.len(),
                if dataset.trend.is_some() { " trend" } else { "" }
            );
        }
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        if let Some(handle) = app
            .database
            .start_checkpoint_task(app.shutdown.subscribe())
        {
            app.shutdown.register(handle).await;
        }

        banner::print_banner(&app.config);

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }
}
