use clap::Parser;
use miette::{IntoDiagnostic, Result};
use migration::MigratorTrait;
use tracing_subscriber::{fmt, EnvFilter};
use visadesk::access::catalog;
use visadesk::{jobs, settings, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "visadesk",
    version,
    about = "Access control service for the visa agency CRM"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Skip seeding the permission catalog, overriding the configuration
    #[arg(long)]
    no_seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        roles = ?settings.access.roles,
        settings_ttl_secs = settings.cache.settings_ttl_secs,
        "Loaded configuration"
    );

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    if settings.access.seed_catalog && !cli.no_seed {
        catalog::seed_catalog(&db).await?;
    }
    catalog::ensure_bootstrap_admin(&db, &settings).await?;

    // background jobs; the scheduler must outlive the server
    let _scheduler = jobs::init_scheduler(db.clone()).await?;

    // start web server
    web::serve(settings, db).await?;
    Ok(())
}
