//! Outbound lead announcements: chat bot message and generic JSON webhook.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::errors::AppError;
use crate::models::{LeadFields, PriorityLevel};

/// What sales staff are told about a new or updated lead.
#[derive(Debug, Clone, Serialize)]
pub struct LeadNotice {
    pub lead_id: Option<Uuid>,
    pub crm_lead_id: Option<String>,
    /// `true` when an existing lead was updated.
    pub updated: bool,
    #[serde(flatten)]
    pub fields: LeadFields,
}

fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn money(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("€{:.0}", v))
}

impl LeadNotice {
    /// Markdown chat message.
    pub fn chat_text(&self) -> String {
        let f = &self.fields;
        let text = |v: &Option<String>| escape_markdown(v.as_deref().unwrap_or("-"));
        let headline = if self.updated {
            "🔄 *Lead updated*"
        } else {
            "☀️ *New solar lead*"
        };
        let priority = match f.priority_level {
            Some(PriorityLevel::High) => "🔥 high",
            Some(PriorityLevel::Medium) => "medium",
            Some(PriorityLevel::Low) => "low",
            None => "-",
        };

        let mut lines = vec![
            headline.to_string(),
            format!("*Name:* {}", text(&f.name)),
            format!("*Email:* {}", text(&f.email)),
            format!("*Phone:* {}", text(&f.phone)),
        ];
        if let Some(address) = &f.address {
            lines.push(format!("*Address:* {}", escape_markdown(address)));
        }
        if let Some(system) = &f.system_id {
            let size = f.system_size_kw.map(|kw| format!(" ({:.2} kWp)", kw)).unwrap_or_default();
            lines.push(format!("*System:* {}{}", escape_markdown(system), size));
        }
        if let Some(battery) = &f.battery_id {
            lines.push(format!("*Battery:* {}", escape_markdown(battery)));
        }
        lines.push(format!(
            "*Price:* {} - grant {} = {}",
            money(f.total_price),
            money(f.grant_amount),
            money(f.net_price)
        ));
        lines.push(format!(
            "*Priority:* {} ({})",
            priority,
            f.priority_score.map_or_else(|| "-".to_string(), |s| s.to_string())
        ));
        if let Some(crm_id) = &self.crm_lead_id {
            lines.push(format!("*CRM:* {}", escape_markdown(crm_id)));
        }
        lines.join("\n")
    }
}

/// Chat bot client (Telegram-style `sendMessage`).
#[derive(Clone)]
pub struct ChatNotifier {
    client: reqwest::Client,
    config: ChatConfig,
}

impl ChatNotifier {
    pub fn new(config: ChatConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create chat client: {}", e))
            })?;
        Ok(Self { client, config })
    }

    pub async fn send(&self, text: &str) -> Result<(), AppError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.config.api_url, self.config.bot_token
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.config.chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Chat request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Chat API returned {}: {}",
                status, error_text
            )));
        }

        tracing::debug!("✓ Chat notification delivered");
        Ok(())
    }
}

/// POSTs a JSON lead event to a configured URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create webhook client: {}", e))
            })?;
        Ok(Self { client, url })
    }

    pub async fn send(&self, notice: &LeadNotice) -> Result<(), AppError> {
        let event = if notice.updated { "lead.updated" } else { "lead.created" };
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "event": event, "lead": notice }))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Lead webhook failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApiError(format!(
                "Lead webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
