use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    Communication, Lead, LeadFields, LeadStatus, NewCommunication, SessionSnapshot, WizardSession,
};
use crate::store::LeadStore;

const INSERT_LEAD: &str = r#"
    INSERT INTO leads (
        id, name, email, phone, address, latitude, longitude, location,
        household_size, monthly_bill, consumption_kwh, system_id, system_size_kw,
        battery_id, battery_kwh, grant_type, total_price, grant_amount, net_price,
        annual_savings, payback_years, payment_method, loan_term_months,
        monthly_payment, status, priority_score, priority_level, source,
        crm_lead_id, notes, wizard_session_token, crm_modified_at
    )
    VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
        $17, $18, $19, $20, $21, $22, $23, $24, COALESCE($25, 'new'), $26, $27,
        $28, $29, $30, $31, $32
    )
    RETURNING *
"#;

const UPDATE_LEAD: &str = r#"
    UPDATE leads SET
        name = COALESCE($2, name),
        email = COALESCE($3, email),
        phone = COALESCE($4, phone),
        address = COALESCE($5, address),
        latitude = COALESCE($6, latitude),
        longitude = COALESCE($7, longitude),
        location = COALESCE($8, location),
        household_size = COALESCE($9, household_size),
        monthly_bill = COALESCE($10, monthly_bill),
        consumption_kwh = COALESCE($11, consumption_kwh),
        system_id = COALESCE($12, system_id),
        system_size_kw = COALESCE($13, system_size_kw),
        battery_id = COALESCE($14, battery_id),
        battery_kwh = COALESCE($15, battery_kwh),
        grant_type = COALESCE($16, grant_type),
        total_price = COALESCE($17, total_price),
        grant_amount = COALESCE($18, grant_amount),
        net_price = COALESCE($19, net_price),
        annual_savings = COALESCE($20, annual_savings),
        payback_years = COALESCE($21, payback_years),
        payment_method = COALESCE($22, payment_method),
        loan_term_months = COALESCE($23, loan_term_months),
        monthly_payment = COALESCE($24, monthly_payment),
        status = COALESCE($25, status),
        priority_score = COALESCE($26, priority_score),
        priority_level = COALESCE($27, priority_level),
        source = COALESCE($28, source),
        crm_lead_id = COALESCE($29, crm_lead_id),
        notes = COALESCE($30, notes),
        wizard_session_token = COALESCE($31, wizard_session_token),
        crm_modified_at = COALESCE($32, crm_modified_at),
        updated_at = now()
    WHERE id = $1 AND deleted_at IS NULL
    RETURNING *
"#;

/// Binds the writable columns as `$2..=$32`.
fn bind_fields<'q>(
    query: QueryAs<'q, Postgres, Lead, PgArguments>,
    f: &'q LeadFields,
) -> QueryAs<'q, Postgres, Lead, PgArguments> {
    query
        .bind(f.name.as_deref())
        .bind(f.email.as_deref())
        .bind(f.phone.as_deref())
        .bind(f.address.as_deref())
        .bind(f.latitude)
        .bind(f.longitude)
        .bind(f.location)
        .bind(f.household_size)
        .bind(f.monthly_bill)
        .bind(f.consumption_kwh)
        .bind(f.system_id.as_deref())
        .bind(f.system_size_kw)
        .bind(f.battery_id.as_deref())
        .bind(f.battery_kwh)
        .bind(f.grant_type)
        .bind(f.total_price)
        .bind(f.grant_amount)
        .bind(f.net_price)
        .bind(f.annual_savings)
        .bind(f.payback_years)
        .bind(f.payment_method)
        .bind(f.loan_term_months)
        .bind(f.monthly_payment)
        .bind(f.status)
        .bind(f.priority_score)
        .bind(f.priority_level)
        .bind(f.source.as_deref())
        .bind(f.crm_lead_id.as_deref())
        .bind(f.notes.as_deref())
        .bind(f.wizard_session_token.as_deref())
        .bind(f.crm_modified_at)
}

/// Escapes `LIKE` wildcards so `value` matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Postgres-backed [`LeadStore`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<Lead>, AppError> {
        let sql = format!(
            "SELECT * FROM leads WHERE deleted_at IS NULL AND {} ORDER BY created_at DESC LIMIT 1",
            filter
        );
        let lead = sqlx::query_as::<_, Lead>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database error in lead lookup ({}): {:?}", filter, e);
                AppError::DatabaseError(e)
            })?;

        Ok(lead)
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn find_lead_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<_, Lead>(
            "SELECT * FROM leads WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    async fn find_lead_by_crm_id(&self, crm_lead_id: &str) -> Result<Option<Lead>, AppError> {
        self.find_one("crm_lead_id = $1", crm_lead_id).await
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        self.find_one("email = $1", email).await
    }

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, AppError> {
        self.find_one("phone = $1", phone).await
    }

    async fn find_lead_by_phone_suffix(&self, digits: &str) -> Result<Option<Lead>, AppError> {
        self.find_one(r"regexp_replace(phone, '\D', '', 'g') LIKE '%' || $1", digits)
            .await
    }

    async fn find_lead_by_name(&self, name: &str) -> Result<Option<Lead>, AppError> {
        self.find_one(
            r"name ILIKE '%' || $1 || '%' ESCAPE '\'",
            &escape_like(name),
        )
        .await
    }

    async fn insert_lead(&self, fields: &LeadFields) -> Result<Lead, AppError> {
        if fields.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err(AppError::BadRequest("Lead name is required".to_string()));
        }

        let query = sqlx::query_as::<_, Lead>(INSERT_LEAD).bind(Uuid::new_v4());
        let lead = bind_fields(query, fields)
            .fetch_one(&self.pool)
            .await
            .context("Failed to insert lead")?;

        tracing::debug!("Inserted lead {}", lead.id);
        Ok(lead)
    }

    async fn update_lead(&self, id: Uuid, fields: &LeadFields) -> Result<Lead, AppError> {
        let query = sqlx::query_as::<_, Lead>(UPDATE_LEAD).bind(id);
        bind_fields(query, fields)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to update lead {}", id))?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))
    }

    async fn set_opted_out(&self, id: Uuid) -> Result<Lead, AppError> {
        let updated = sqlx::query_as::<_, Lead>(
            r#"
            UPDATE leads
            SET opted_out = true, opted_out_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL AND NOT opted_out
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(lead) => Ok(lead),
            None => self
                .find_lead_by_id(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id))),
        }
    }

    async fn list_followup_candidates(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, AppError> {
        let statuses: Vec<&str> = LeadStatus::FOLLOW_UP.iter().map(|s| s.as_str()).collect();
        let leads = sqlx::query_as::<_, Lead>(
            r#"
            SELECT * FROM leads
            WHERE deleted_at IS NULL
              AND NOT opted_out
              AND status = ANY($1)
              AND created_at >= $2
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(&statuses)
        .bind(created_after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list follow-up candidates")?;

        Ok(leads)
    }

    async fn sent_templates(&self, lead_id: Uuid) -> Result<Vec<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT template FROM communications WHERE lead_id = $1 AND template IS NOT NULL",
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(template,)| template).collect())
    }

    async fn record_communication(
        &self,
        communication: &NewCommunication,
    ) -> Result<Communication, AppError> {
        let row = sqlx::query_as::<_, Communication>(
            r#"
            INSERT INTO communications (id, lead_id, channel, template, external_message_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(communication.lead_id)
        .bind(communication.channel)
        .bind(communication.template.as_deref())
        .bind(communication.external_message_id.as_deref())
        .fetch_one(&self.pool)
        .await
        .context("Failed to record communication")?;

        Ok(row)
    }

    async fn get_session(&self, token: &str) -> Result<Option<WizardSession>, AppError> {
        let session =
            sqlx::query_as::<_, WizardSession>("SELECT * FROM wizard_sessions WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO wizard_sessions (token, current_step, highest_step, state, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO UPDATE SET
                current_step = EXCLUDED.current_step,
                highest_step = GREATEST(wizard_sessions.highest_step, EXCLUDED.highest_step),
                state = EXCLUDED.state,
                status = EXCLUDED.status,
                updated_at = now()
            WHERE wizard_sessions.status <> 'converted_to_lead'
            "#,
        )
        .bind(&snapshot.token)
        .bind(snapshot.current_step)
        .bind(snapshot.highest_step)
        .bind(Json(&snapshot.state))
        .bind(snapshot.status)
        .execute(&self.pool)
        .await
        .context("Failed to save wizard session")?;

        Ok(())
    }

    async fn convert_session(&self, token: &str, lead_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE wizard_sessions
            SET status = 'converted_to_lead', lead_id = $2, converted_at = now(), updated_at = now()
            WHERE token = $1 AND status <> 'converted_to_lead'
            "#,
        )
        .bind(token)
        .bind(lead_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn abandon_stale_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE wizard_sessions SET status = 'abandoned' WHERE status = 'in_progress' AND updated_at < $1",
        )
        .bind(idle_before)
        .execute(&self.pool)
        .await
        .context("Failed to sweep wizard sessions")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_makes_wildcards_literal() {
        assert_eq!(escape_like("Maria Borg"), "Maria Borg");
        assert_eq!(escape_like("%"), r"\%");
        assert_eq!(escape_like("a_b"), r"a\_b");
        assert_eq!(escape_like(r"c:\x"), r"c:\\x");
    }
}
