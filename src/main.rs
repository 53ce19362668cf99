use mimalloc::MiMalloc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wp_portal_schema::config::Config;
use wp_portal_schema::db::MySqlStorage;
use wp_portal_schema::service::Portal;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let names = cfg.table_names()?;
    info!(
        prefix = %cfg.table_prefix,
        users_table = %names.users(),
        loglevel = %cfg.loglevel,
        "starting portal schema activation"
    );

    let storage =
        MySqlStorage::connect(&cfg.database_url, cfg.max_connections, &names.options()).await?;
    info!(database = %storage.database(), "connected");
    storage.init_options_table().await?;

    let portal = Portal::new(storage, names);
    match portal.activate().await {
        Ok(report) => {
            for (table, outcome) in &report.schema.tables {
                info!(table = %table, outcome = ?outcome, "table synced");
            }
            info!(
                added = report.foreign_keys.added.len(),
                present = report.foreign_keys.present.len(),
                failed = report.foreign_keys.failed.len(),
                "foreign keys checked"
            );
            info!(
                from = %report.upgrade.from,
                to = %report.upgrade.to,
                applied = ?report.upgrade.applied.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "schema is current"
            );
        }
        Err(e) => {
            error!(error = %e, "activation failed");
            portal.storage().pool().close().await;
            return Err(e.into());
        }
    }

    portal.storage().pool().close().await;
    Ok(())
}
