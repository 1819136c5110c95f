//! Follow-up email sequence.
//!
//! Each run takes a batch of recent, still-open leads and sends each at most
//! one templated email: the lowest-threshold template that is due and not yet
//! in the lead's communications log. The log is the only idempotency guard, so
//! overlapping runs must not share a batch.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::crm_client::{CrmClient, EmailMessage};
use crate::errors::AppError;
use crate::models::{Channel, Lead, NewCommunication};
use crate::signing;
use crate::store::LeadStore;

/// Leads older than this leave the sequence.
pub const SEQUENCE_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpTemplate {
    pub id: &'static str,
    pub threshold_hours: i64,
    pub subject: &'static str,
    pub intro: &'static str,
}

/// Ascending by threshold.
pub const TEMPLATES: [FollowUpTemplate; 4] = [
    FollowUpTemplate {
        id: "follow-up-24h",
        threshold_hours: 24,
        subject: "Your solar quote is ready",
        intro: "Thanks for pricing a solar system with us. Here is your quote again.",
    },
    FollowUpTemplate {
        id: "follow-up-48h",
        threshold_hours: 48,
        subject: "How the grant lowers your solar cost",
        intro: "The government grant covers a large share of your installation.",
    },
    FollowUpTemplate {
        id: "follow-up-72h",
        threshold_hours: 72,
        subject: "Questions about your solar system?",
        intro: "Our engineers can answer any question about panels, batteries or financing.",
    },
    FollowUpTemplate {
        id: "follow-up-168h",
        threshold_hours: 168,
        subject: "Grant funds are limited this year",
        intro: "Grant applications are processed in order, so an early booking keeps your place.",
    },
];

/// First template whose threshold is reached and that was not sent yet.
pub fn pick_template(hours_since_creation: i64, sent: &[String]) -> Option<&'static FollowUpTemplate> {
    TEMPLATES.iter().find(|t| {
        hours_since_creation >= t.threshold_hours && !sent.iter().any(|s| s == t.id)
    })
}

/// Quote figures used in the email. Missing values fall back to the
/// Essential 5kW defaults as-is, without recomputing.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteFigures {
    pub system_size_kw: f64,
    pub total_price: f64,
    pub grant_amount: f64,
    pub net_price: f64,
    pub annual_savings: f64,
    pub payback_years: f64,
}

pub const DEFAULT_FIGURES: QuoteFigures = QuoteFigures {
    system_size_kw: 5.22,
    total_price: 6_400.0,
    grant_amount: 3_000.0,
    net_price: 3_400.0,
    annual_savings: 1_140.0,
    payback_years: 3.0,
};

impl QuoteFigures {
    pub fn for_lead(lead: &Lead) -> Self {
        Self {
            system_size_kw: lead.system_size_kw.unwrap_or(DEFAULT_FIGURES.system_size_kw),
            total_price: lead.total_price.unwrap_or(DEFAULT_FIGURES.total_price),
            grant_amount: lead.grant_amount.unwrap_or(DEFAULT_FIGURES.grant_amount),
            net_price: lead.net_price.unwrap_or(DEFAULT_FIGURES.net_price),
            annual_savings: lead.annual_savings.unwrap_or(DEFAULT_FIGURES.annual_savings),
            payback_years: lead.payback_years.unwrap_or(DEFAULT_FIGURES.payback_years),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpSummary {
    pub processed: u32,
    pub sent: u32,
    pub skipped: u32,
    pub errors: u32,
}

/// Delivery channel for follow-up emails.
#[async_trait]
pub trait MailRelay: Send + Sync {
    /// Returns the provider's message id, when it reports one.
    async fn send_mail(
        &self,
        crm_lead_id: &str,
        message: &EmailMessage,
    ) -> Result<Option<String>, AppError>;
}

#[async_trait]
impl MailRelay for CrmClient {
    async fn send_mail(
        &self,
        crm_lead_id: &str,
        message: &EmailMessage,
    ) -> Result<Option<String>, AppError> {
        CrmClient::send_mail(self, crm_lead_id, message).await
    }
}

pub struct FollowUpJob<'a> {
    pub store: &'a dyn LeadStore,
    pub mail: &'a dyn MailRelay,
    pub public_base_url: &'a str,
    pub signing_secret: &'a str,
    pub batch_size: i64,
}

fn euros(value: f64) -> String {
    format!("€{:.0}", value)
}

/// Escapes text and attribute values interpolated into the email body.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl FollowUpJob<'_> {
    fn render(
        &self,
        template: &FollowUpTemplate,
        lead: &Lead,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<EmailMessage, AppError> {
        let figures = QuoteFigures::for_lead(lead);
        let lead_id = lead.id.to_string();
        let token = signing::sign_lead_token(self.signing_secret, &lead_id, now)?;
        let quote_url = format!(
            "{}/quote?lead={}&token={}",
            self.public_base_url, lead_id, token
        );
        let unsubscribe_url =
            signing::unsubscribe_url(self.public_base_url, self.signing_secret, &lead_id, now)?;

        let html = format!(
            r#"<p>Hi {name},</p>
<p>{intro}</p>
<table>
<tr><td>System size</td><td>{size:.2} kWp</td></tr>
<tr><td>Total price</td><td>{total}</td></tr>
<tr><td>Grant</td><td>{grant}</td></tr>
<tr><td>You pay</td><td>{net}</td></tr>
<tr><td>Yearly savings</td><td>{savings}</td></tr>
<tr><td>Payback</td><td>{payback:.1} years</td></tr>
</table>
<p><a href="{quote_url}">View your quote</a></p>
<p style="font-size:12px"><a href="{unsubscribe_url}">Unsubscribe</a></p>"#,
            name = escape_html(&lead.name),
            intro = escape_html(template.intro),
            quote_url = escape_html(&quote_url),
            unsubscribe_url = escape_html(&unsubscribe_url),
            size = figures.system_size_kw,
            total = euros(figures.total_price),
            grant = euros(figures.grant_amount),
            net = euros(figures.net_price),
            savings = euros(figures.annual_savings),
            payback = figures.payback_years,
        );

        Ok(EmailMessage {
            to: email.to_string(),
            to_name: lead.name.clone(),
            subject: template.subject.to_string(),
            html,
        })
    }

    /// Sends at most one email to `lead`. `Ok(false)` means skipped.
    async fn process_lead(&self, lead: &Lead, now: DateTime<Utc>) -> Result<bool, AppError> {
        let Some(crm_lead_id) = lead.crm_lead_id.as_deref() else {
            return Ok(false);
        };
        let Some(email) = lead.email.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(false);
        };

        let hours = (now - lead.created_at).num_hours();
        let sent = self.store.sent_templates(lead.id).await?;
        let Some(template) = pick_template(hours, &sent) else {
            return Ok(false);
        };

        let message = self.render(template, lead, email, now)?;
        let message_id = self.mail.send_mail(crm_lead_id, &message).await?;
        self.store
            .record_communication(&NewCommunication {
                lead_id: lead.id,
                channel: Channel::Email,
                template: Some(template.id.to_string()),
                external_message_id: message_id,
            })
            .await?;

        tracing::info!("✓ Sent {} to lead {}", template.id, lead.id);
        Ok(true)
    }

    /// One sweep over the batch. Per-lead failures are counted, never fatal.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<FollowUpSummary, AppError> {
        let created_after = now - Duration::days(SEQUENCE_WINDOW_DAYS);
        let leads = self
            .store
            .list_followup_candidates(created_after, self.batch_size)
            .await?;
        tracing::info!("Follow-up sweep: {} candidate leads", leads.len());

        let mut summary = FollowUpSummary::default();
        for lead in &leads {
            summary.processed += 1;
            match self.process_lead(lead, now).await {
                Ok(true) => summary.sent += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Follow-up failed for lead {}: {}", lead.id, e);
                    summary.errors += 1;
                }
            }
        }

        tracing::info!(
            "Follow-up sweep done: processed={} sent={} skipped={} errors={}",
            summary.processed,
            summary.sent,
            summary.skipped,
            summary.errors
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::models::LeadFields;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRelay {
        sent: Mutex<Vec<EmailMessage>>,
    }

    #[async_trait]
    impl MailRelay for RecordingRelay {
        async fn send_mail(
            &self,
            _crm_lead_id: &str,
            message: &EmailMessage,
        ) -> Result<Option<String>, AppError> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(Some("msg-1".to_string()))
        }
    }

    fn sent(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_nothing_due_before_first_threshold() {
        assert_eq!(pick_template(23, &[]), None);
    }

    #[test]
    fn test_next_unsent_template_after_24h_was_logged() {
        let template = pick_template(50, &sent(&["follow-up-24h"])).unwrap();
        assert_eq!(template.id, "follow-up-48h");
    }

    #[test]
    fn test_templates_go_out_in_ascending_order() {
        // a lead first seen at 100h still starts with the 24h email
        assert_eq!(pick_template(100, &[]).unwrap().id, "follow-up-24h");
        assert_eq!(
            pick_template(200, &sent(&["follow-up-24h", "follow-up-48h", "follow-up-72h"]))
                .unwrap()
                .id,
            "follow-up-168h"
        );
        assert_eq!(
            pick_template(
                300,
                &sent(&["follow-up-24h", "follow-up-48h", "follow-up-72h", "follow-up-168h"])
            ),
            None
        );
    }

    #[test]
    fn test_thresholds_ascend() {
        assert!(TEMPLATES
            .windows(2)
            .all(|w| w[0].threshold_hours < w[1].threshold_hours));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">O'Neil & Co</a>"#),
            "&lt;a href=&quot;x&quot;&gt;O&#39;Neil &amp; Co&lt;/a&gt;"
        );
    }

    #[tokio::test]
    async fn test_lead_name_is_escaped_in_email_body() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_lead_at(
                &LeadFields {
                    name: Some(r#"<a href="https://evil.example">Claim refund</a>"#.to_string()),
                    email: Some("victim@example.com".to_string()),
                    crm_lead_id: Some("crm-1".to_string()),
                    ..LeadFields::default()
                },
                now - Duration::hours(25),
            )
            .await
            .unwrap();

        let relay = RecordingRelay::default();
        let job = FollowUpJob {
            store: &store,
            mail: &relay,
            public_base_url: "https://solar.example.com",
            signing_secret: "test-signing-secret",
            batch_size: 10,
        };
        assert_eq!(job.run(now).await.unwrap().sent, 1);

        let sent = relay.sent.lock().unwrap();
        let html = &sent[0].html;
        assert!(!html.contains("<a href=\"https://evil.example\">"));
        assert!(html.contains("<p>Hi &lt;a href=&quot;https://evil.example&quot;&gt;Claim refund&lt;/a&gt;,</p>"));
        assert!(html.contains("/quote?lead="));
        assert!(html.contains("&amp;token="));
    }
}
