use serde::Deserialize;

/// OAuth client credentials for the CRM (Zoho-style refresh-token flow).
#[derive(Debug, Clone, Deserialize)]
pub struct CrmConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    /// Accounts server hosting `/oauth/v2/token`.
    pub accounts_url: String,
    /// API server hosting `/crm/v6/...`.
    pub api_url: String,
    /// Sender address for follow-up emails relayed through the CRM.
    pub from_email: String,
}

/// Chat bot used to announce new leads to sales staff.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Base URL used for links embedded in follow-up emails.
    pub public_base_url: String,
    /// HMAC key for unsubscribe / follow-up link tokens.
    pub signing_secret: String,
    /// Bearer secret guarding the cron endpoints.
    pub cron_secret: String,
    /// X-Webhook-Token expected on CRM sync webhooks. Validation is skipped when unset.
    pub webhook_secret: Option<String>,
    pub crm: Option<CrmConfig>,
    pub chat: Option<ChatConfig>,
    /// Generic endpoint receiving a JSON copy of every new lead.
    pub lead_webhook_url: Option<String>,
    pub wizard_debounce_ms: u64,
    pub followup_batch_size: i64,
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn check_http_url(name: &str, url: String) -> anyhow::Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = required("DATABASE_URL").and_then(|url| {
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
            }
            Ok(url)
        })?;

        let crm = match optional("ZOHO_REFRESH_TOKEN") {
            Some(refresh_token) => Some(CrmConfig {
                client_id: required("ZOHO_CLIENT_ID")?,
                client_secret: required("ZOHO_CLIENT_SECRET")?,
                refresh_token,
                accounts_url: check_http_url(
                    "ZOHO_ACCOUNTS_URL",
                    optional("ZOHO_ACCOUNTS_URL")
                        .unwrap_or_else(|| "https://accounts.zoho.eu".to_string()),
                )?,
                api_url: check_http_url(
                    "ZOHO_API_URL",
                    optional("ZOHO_API_URL")
                        .unwrap_or_else(|| "https://www.zohoapis.eu".to_string()),
                )?,
                from_email: required("ZOHO_FROM_EMAIL")?,
            }),
            None => None,
        };

        let chat = match (optional("TELEGRAM_BOT_TOKEN"), optional("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(ChatConfig {
                bot_token,
                chat_id,
                api_url: check_http_url(
                    "TELEGRAM_API_URL",
                    optional("TELEGRAM_API_URL")
                        .unwrap_or_else(|| "https://api.telegram.org".to_string()),
                )?,
            }),
            _ => None,
        };

        let config = Self {
            database_url,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            public_base_url: check_http_url("PUBLIC_BASE_URL", required("PUBLIC_BASE_URL")?)?,
            signing_secret: required("SIGNING_SECRET")?,
            cron_secret: required("CRON_SECRET")?,
            webhook_secret: optional("WEBHOOK_SECRET"),
            crm,
            chat,
            lead_webhook_url: optional("LEAD_WEBHOOK_URL")
                .map(|url| check_http_url("LEAD_WEBHOOK_URL", url))
                .transpose()?,
            wizard_debounce_ms: std::env::var("WIZARD_DEBOUNCE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WIZARD_DEBOUNCE_MS must be a number"))?,
            followup_batch_size: std::env::var("FOLLOWUP_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("FOLLOWUP_BATCH_SIZE must be a number"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Public base URL: {}", config.public_base_url);
        match config.crm {
            Some(ref crm) => tracing::info!("CRM configured: {}", crm.api_url),
            None => tracing::warn!("ZOHO_REFRESH_TOKEN not set, CRM mirroring disabled"),
        }
        if config.chat.is_none() {
            tracing::warn!("Telegram not configured, chat notifications disabled");
        }
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set, CRM webhook accepts unauthenticated calls");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Configuration for tests and local tooling: no external integrations.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/solar_leads_test".to_string(),
            port: 3000,
            public_base_url: "https://solar.example.com".to_string(),
            signing_secret: "test-signing-secret".to_string(),
            cron_secret: "test-cron-secret".to_string(),
            webhook_secret: None,
            crm: None,
            chat: None,
            lead_webhook_url: None,
            wizard_debounce_ms: 1000,
            followup_batch_size: 100,
        }
    }
}
