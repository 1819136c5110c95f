use crate::config::CrmConfig;
use crate::errors::AppError;
use crate::models::LeadFields;
use moka::future::Cache;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Access tokens live 60 minutes at the CRM; refresh a little earlier.
const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);
const ACCESS_TOKEN_KEY: &str = "access_token";

/// One email relayed through the CRM mail endpoint.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: String,
    pub subject: String,
    pub html: String,
}

/// Client for the CRM REST API (OAuth refresh-token flow).
#[derive(Clone)]
pub struct CrmClient {
    client: reqwest::Client,
    config: CrmConfig,
    token_cache: Cache<&'static str, String>,
}

/// CRM record for a lead. Unset fields are left out so updates never blank
/// values edited in the CRM.
pub fn crm_record(fields: &LeadFields) -> Value {
    let mut record = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            record.insert(key.to_string(), value);
        }
    };

    put("Last_Name", fields.name.as_ref().map(|v| json!(v)));
    put("Email", fields.email.as_ref().map(|v| json!(v)));
    put("Phone", fields.phone.as_ref().map(|v| json!(v)));
    put("Street", fields.address.as_ref().map(|v| json!(v)));
    put("Lead_Source", fields.source.as_ref().map(|v| json!(v)));
    put("Lead_Status", fields.status.map(|s| json!(s.as_str())));
    put("Description", fields.notes.as_ref().map(|v| json!(v)));
    put("Island", fields.location.map(|v| json!(v)));
    put("Monthly_Bill", fields.monthly_bill.map(|v| json!(v)));
    put("System_Package", fields.system_id.as_ref().map(|v| json!(v)));
    put("System_Size_kW", fields.system_size_kw.map(|v| json!(v)));
    put("Battery_kWh", fields.battery_kwh.map(|v| json!(v)));
    put("Grant_Type", fields.grant_type.map(|v| json!(v)));
    put("Total_Price", fields.total_price.map(|v| json!(v)));
    put("Grant_Amount", fields.grant_amount.map(|v| json!(v)));
    put("Net_Price", fields.net_price.map(|v| json!(v)));
    put("Annual_Savings", fields.annual_savings.map(|v| json!(v)));
    put("Payment_Method", fields.payment_method.map(|v| json!(v)));
    put("Monthly_Payment", fields.monthly_payment.map(|v| json!(v)));
    put("Priority_Score", fields.priority_score.map(|v| json!(v)));

    Value::Object(record)
}

/// Reads `data[0].details.id` (string or number) from a write response.
fn extract_record_id(response: &Value) -> Option<String> {
    let id = response
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|r| r.get("details"))
        .and_then(|d| d.get("id"))?;
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl CrmClient {
    /// Creates a new `CrmClient`.
    ///
    /// # Arguments
    ///
    /// * `config` - OAuth credentials and base URLs.
    pub fn new(config: CrmConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create CRM client: {}", e))
            })?;

        let token_cache = Cache::builder()
            .time_to_live(ACCESS_TOKEN_TTL)
            .max_capacity(1)
            .build();

        Ok(Self {
            client,
            config,
            token_cache,
        })
    }

    /// Returns a cached access token, refreshing it when expired.
    pub async fn access_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.token_cache.get(ACCESS_TOKEN_KEY).await {
            return Ok(token);
        }

        let url = format!("{}/oauth/v2/token", self.config.accounts_url);
        tracing::debug!("Refreshing CRM access token");

        let response = self
            .client
            .post(&url)
            .query(&[
                ("refresh_token", self.config.refresh_token.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("CRM token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::Unauthorized(format!(
                "CRM token refresh returned {}",
                status
            )));
        }

        let data: Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse CRM token response: {}", e))
        })?;

        // The token endpoint answers 200 with {"error": "invalid_code"} on bad credentials.
        let token = data
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| {
                let reason = data
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("missing access_token");
                AppError::Unauthorized(format!("CRM token refresh failed: {}", reason))
            })?
            .to_string();

        self.token_cache
            .insert(ACCESS_TOKEN_KEY, token.clone())
            .await;
        Ok(token)
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<Value, AppError> {
        let token = self.access_token().await?;
        let response = request
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("CRM {} failed: {}", action, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.token_cache.invalidate(ACCESS_TOKEN_KEY).await;
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "CRM {} returned {}: {}",
                action, status, error_text
            )));
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse CRM {} response: {}", action, e))
        })
    }

    /// Creates a lead in the CRM.
    ///
    /// # Returns
    ///
    /// * `Result<String, AppError>` - The CRM id of the created lead.
    pub async fn create_lead(&self, fields: &LeadFields) -> Result<String, AppError> {
        let url = format!("{}/crm/v6/Leads", self.config.api_url);
        let body = json!({ "data": [crm_record(fields)] });

        let response = self
            .send_json(self.client.post(&url).json(&body), "lead creation")
            .await?;

        let crm_id = extract_record_id(&response).ok_or_else(|| {
            tracing::warn!("Unexpected CRM response format: {:?}", response);
            AppError::ExternalApiError("Lead creation response missing 'id' field".to_string())
        })?;

        tracing::info!("✓ CRM lead created: {}", crm_id);
        Ok(crm_id)
    }

    /// Updates an existing CRM lead with the non-empty fields.
    pub async fn update_lead(&self, crm_lead_id: &str, fields: &LeadFields) -> Result<(), AppError> {
        let url = format!("{}/crm/v6/Leads/{}", self.config.api_url, crm_lead_id);
        let body = json!({ "data": [crm_record(fields)] });

        self.send_json(self.client.put(&url).json(&body), "lead update")
            .await?;

        tracing::info!("✓ CRM lead updated: {}", crm_lead_id);
        Ok(())
    }

    /// CRM id of the lead with this email, if any.
    pub async fn search_by_email(&self, email: &str) -> Result<Option<String>, AppError> {
        let url = format!("{}/crm/v6/Leads/search", self.config.api_url);
        let response = self
            .send_json(self.client.get(&url).query(&[("email", email)]), "lead search")
            .await?;

        Ok(response
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|r| r.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }))
    }

    /// Sends an email to the lead through the CRM mail relay.
    ///
    /// # Returns
    ///
    /// * `Result<Option<String>, AppError>` - The message id when the CRM reports one.
    pub async fn send_mail(
        &self,
        crm_lead_id: &str,
        message: &EmailMessage,
    ) -> Result<Option<String>, AppError> {
        let url = format!(
            "{}/crm/v6/Leads/{}/actions/send_mail",
            self.config.api_url, crm_lead_id
        );
        let body = json!({
            "data": [{
                "from": { "email": self.config.from_email },
                "to": [{ "user_name": message.to_name, "email": message.to }],
                "subject": message.subject,
                "content": message.html,
                "mail_format": "html"
            }]
        });

        let response = self
            .send_json(self.client.post(&url).json(&body), "send_mail")
            .await?;

        let message_id = response
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|r| r.get("details"))
            .and_then(|d| d.get("message_id"))
            .and_then(|id| id.as_str())
            .map(str::to_string);

        tracing::info!("✓ Email sent to CRM lead {}", crm_lead_id);
        Ok(message_id)
    }
}
