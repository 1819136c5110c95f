//! Runs one follow-up email sweep and prints the summary.
//!
//! Meant for an external scheduler as an alternative to the
//! `/api/cron/email-sequences` endpoint.

use chrono::Utc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solar_leads::config::Config;
use solar_leads::crm_client::CrmClient;
use solar_leads::db::Database;
use solar_leads::db_storage::PgStore;
use solar_leads::followup::FollowUpJob;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solar_leads=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let crm_config = config
        .crm
        .clone()
        .ok_or_else(|| anyhow::anyhow!("ZOHO_REFRESH_TOKEN must be set to send follow-ups"))?;
    let crm = CrmClient::new(crm_config)?;

    let db = Database::new(&config.database_url).await?;
    let store = PgStore::new(db.pool.clone());

    let job = FollowUpJob {
        store: &store,
        mail: &crm,
        public_base_url: &config.public_base_url,
        signing_secret: &config.signing_secret,
        batch_size: config.followup_batch_size,
    };
    let summary = job.run(Utc::now()).await?;

    println!("Follow-up sweep finished:");
    println!("  processed: {}", summary.processed);
    println!("  sent:      {}", summary.sent);
    println!("  skipped:   {}", summary.skipped);
    println!("  errors:    {}", summary.errors);

    Ok(())
}
