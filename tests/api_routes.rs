/// Router tests against the in-memory store
/// Drives the HTTP surface with `tower::ServiceExt::oneshot`, no network or database
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use solar_leads::api::handlers::AppState;
use solar_leads::api::routes;
use solar_leads::config::{Config, CrmConfig};
use solar_leads::core::{catalog, grant_scheme};
use solar_leads::crm_client::CrmClient;
use solar_leads::errors::AppError;
use solar_leads::memory_store::MemoryStore;
use solar_leads::models::{
    Communication, Lead, LeadFields, NewCommunication, SessionSnapshot, SessionStatus,
    WizardSession,
};
use solar_leads::signing;
use solar_leads::store::LeadStore;

fn build_app(config: Config, store: Arc<dyn LeadStore>, crm: Option<CrmClient>) -> Router {
    let (state, _worker) = AppState::new(config, store, crm).unwrap();
    routes::app(state, routes::api_routes())
}

fn memory_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (build_app(Config::for_tests(), store.clone(), None), store)
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn submission() -> Value {
    json!({
        "name": "Maria Borg",
        "email": "Maria.Borg@Example.com",
        "phone": "7912 3456",
        "address": "Triq il-Kbira, Mosta",
        "location": "malta",
        "household_size": 3,
        "monthly_bill": 150.0,
        "system_id": "essential-5kw",
        "battery_id": "battery-15kwh",
        "grant_type": "pv_battery"
    })
}

fn crm_config(base_url: String) -> CrmConfig {
    CrmConfig {
        client_id: "test_client".to_string(),
        client_secret: "test_secret".to_string(),
        refresh_token: "test_refresh".to_string(),
        accounts_url: base_url.clone(),
        api_url: base_url,
        from_email: "quotes@solar.example.com".to_string(),
    }
}

/// Store whose every call fails, standing in for an unreachable database.
struct UnavailableStore;

fn down<T>() -> Result<T, AppError> {
    Err(AppError::InternalError("store unavailable".to_string()))
}

#[async_trait]
impl LeadStore for UnavailableStore {
    async fn find_lead_by_id(&self, _id: Uuid) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn find_lead_by_crm_id(&self, _crm_lead_id: &str) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn find_lead_by_email(&self, _email: &str) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn find_lead_by_phone(&self, _phone: &str) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn find_lead_by_phone_suffix(&self, _digits: &str) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn find_lead_by_name(&self, _name: &str) -> Result<Option<Lead>, AppError> {
        down()
    }
    async fn insert_lead(&self, _fields: &LeadFields) -> Result<Lead, AppError> {
        down()
    }
    async fn update_lead(&self, _id: Uuid, _fields: &LeadFields) -> Result<Lead, AppError> {
        down()
    }
    async fn set_opted_out(&self, _id: Uuid) -> Result<Lead, AppError> {
        down()
    }
    async fn list_followup_candidates(
        &self,
        _created_after: DateTime<Utc>,
        _limit: i64,
    ) -> Result<Vec<Lead>, AppError> {
        down()
    }
    async fn sent_templates(&self, _lead_id: Uuid) -> Result<Vec<String>, AppError> {
        down()
    }
    async fn record_communication(
        &self,
        _communication: &NewCommunication,
    ) -> Result<Communication, AppError> {
        down()
    }
    async fn get_session(&self, _token: &str) -> Result<Option<WizardSession>, AppError> {
        down()
    }
    async fn save_session(&self, _snapshot: &SessionSnapshot) -> Result<(), AppError> {
        down()
    }
    async fn convert_session(&self, _token: &str, _lead_id: Uuid) -> Result<bool, AppError> {
        down()
    }
    async fn abandon_stale_sessions(&self, _idle_before: DateTime<Utc>) -> Result<u64, AppError> {
        down()
    }
}

#[tokio::test]
async fn test_health() {
    let (app, _) = memory_app();
    let (status, body) = send_json(&app, empty_request(Method::GET, "/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_quote_endpoint() {
    let (app, _) = memory_app();
    let (status, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/quote",
            json!({
                "monthly_bill": 150.0,
                "household_size": 3,
                "system_id": "essential-5kw",
                "battery_id": "battery-15kwh",
                "grant_type": "pv_battery"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_price"], 18_400.0);
    assert_eq!(body["grant_amount"], 10_200.0);
    assert_eq!(body["net_price"], 8_200.0);
    assert_eq!(body["financing_options"].as_array().unwrap().len(), 4);

    let (status, _) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/quote",
            json!({"monthly_bill": 150.0, "household_size": 3, "system_id": "mega-50kw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_catalog_lists_packages() {
    let (app, _) = memory_app();
    let (status, body) = send_json(&app, empty_request(Method::GET, "/api/catalog")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["systems"].as_array().unwrap().len(),
        catalog::SYSTEM_PACKAGES.len()
    );
    assert_eq!(
        body["batteries"].as_array().unwrap().len(),
        catalog::BATTERY_OPTIONS.len()
    );
    assert_eq!(body["systems"][1]["id"], catalog::SYSTEM_PACKAGES[1].id);
    assert_eq!(body["scheme_year"], grant_scheme::CURRENT.year);
}

#[tokio::test]
async fn test_create_lead_without_crm() {
    let (app, store) = memory_app();
    let (status, body) =
        send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["updated"], false);
    assert_eq!(body["store"]["ok"], true);
    assert_eq!(body["crm"]["ok"], false);
    assert_eq!(body["crm"]["error"], "CRM not configured");

    let lead_id: Uuid = serde_json::from_value(body["lead_id"].clone()).unwrap();
    let lead = store.find_lead_by_id(lead_id).await.unwrap().unwrap();
    assert_eq!(lead.email.as_deref(), Some("maria.borg@example.com"));
    assert_eq!(lead.phone.as_deref(), Some("+35679123456"));
    assert_eq!(lead.total_price, Some(18_400.0));
    // 20 size + 25 price + 15 battery + 10 grant + 5 consumption + 5 address
    assert_eq!(lead.priority_score, Some(80));
}

#[tokio::test]
async fn test_create_lead_validation_lists_fields() {
    let (app, _) = memory_app();
    let (status, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/leads",
            json!({"name": "Joe", "email": "not-an-email"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["email", "phone"]));
}

#[tokio::test]
async fn test_create_then_update_through_crm() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v6/Leads/search"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v6/Leads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": [{"code": "SUCCESS", "details": {"id": "crm-100"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/crm/v6/Leads/crm-100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"code": "SUCCESS", "details": {"id": "crm-100"}}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let crm = CrmClient::new(crm_config(mock_server.uri())).unwrap();
    let app = build_app(Config::for_tests(), store.clone(), Some(crm));

    let (status, created) =
        send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["crm_lead_id"], "crm-100");
    assert_eq!(created["crm"]["ok"], true);

    let lead = store.find_lead_by_crm_id("crm-100").await.unwrap().unwrap();
    assert_eq!(created["lead_id"], json!(lead.id));

    let mut resubmission = submission();
    resubmission["crm_lead_id"] = json!("crm-100");
    resubmission["notes"] = json!("Prefers mornings");
    let (status, updated) =
        send_json(&app, json_request(Method::POST, "/api/leads", resubmission)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["updated"], true);
    assert_eq!(updated["lead_id"], json!(lead.id));

    let lead = store.find_lead_by_id(lead.id).await.unwrap().unwrap();
    assert_eq!(lead.notes.as_deref(), Some("Prefers mornings"));
}

#[tokio::test]
async fn test_both_writes_failing_is_bad_gateway() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let crm = CrmClient::new(crm_config(mock_server.uri())).unwrap();
    let app = build_app(Config::for_tests(), Arc::new(UnavailableStore), Some(crm));

    let (status, body) =
        send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["store"]["ok"], false);
    assert_eq!(body["crm"]["ok"], false);
    assert!(body["lead_id"].is_null());
}

#[tokio::test]
async fn test_store_failure_alone_still_succeeds() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/crm/v6/Leads/search"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/crm/v6/Leads"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": [{"code": "SUCCESS", "details": {"id": "crm-7"}}]
        })))
        .mount(&mock_server)
        .await;

    let crm = CrmClient::new(crm_config(mock_server.uri())).unwrap();
    let app = build_app(Config::for_tests(), Arc::new(UnavailableStore), Some(crm));

    let (status, body) =
        send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["store"]["ok"], false);
    assert_eq!(body["crm_lead_id"], "crm-7");
}

#[tokio::test]
async fn test_submission_links_wizard_session() {
    let (app, store) = memory_app();

    let (status, _) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/wizard-sessions/sess-1/beacon",
            json!({"state": {"current_step": 5, "highest_step": 5, "monthly_bill": 150.0}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let mut body = submission();
    body["wizard_session_token"] = json!("sess-1");
    let (status, created) = send_json(&app, json_request(Method::POST, "/api/leads", body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let lead_id: Uuid = serde_json::from_value(created["lead_id"].clone()).unwrap();

    // linkage runs on the background queue
    let mut linked = None;
    for _ in 0..50 {
        let session = store.get_session("sess-1").await.unwrap().unwrap();
        if session.status == SessionStatus::ConvertedToLead {
            linked = session.lead_id;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(linked, Some(lead_id));

    // converted sessions refuse further actions
    let (status, _) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/wizard-sessions/sess-1/actions",
            json!({"type": "NEXT_STEP"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_lead_by_email() {
    let (app, store) = memory_app();
    send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;

    let (status, body) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({"email": "MARIA.BORG@example.com", "payment_method": "loan", "status": "contacted"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["crm"]["error"], "CRM not configured");

    let lead = store
        .find_lead_by_email("maria.borg@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lead.status, solar_leads::models::LeadStatus::Contacted);
    assert_eq!(lead.priority_score, Some(90));

    let (status, _) = send_json(
        &app,
        json_request(Method::PATCH, "/api/leads", json!({"email": "nobody@example.com"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &app,
        json_request(Method::PATCH, "/api/leads", json!({"notes": "no key"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_lead_validates_contact_fields_and_reprices() {
    let (app, store) = memory_app();
    let (_, created) =
        send_json(&app, json_request(Method::POST, "/api/leads", submission())).await;
    let lead_id = created["lead_id"].as_str().unwrap().to_string();
    let id = Uuid::parse_str(&lead_id).unwrap();

    let (status, body) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({"id": lead_id, "email": "not-an-email", "phone": "n/a"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["email", "phone"]));
    let unchanged = store.find_lead_by_id(id).await.unwrap().unwrap();
    assert_eq!(unchanged.email.as_deref(), Some("maria.borg@example.com"));

    let (status, _) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({
                "id": lead_id,
                "phone": "9912 3456",
                "grant_amount": 99999,
                "total_price": 1,
                "system_id": "max-10kw"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let lead = store.find_lead_by_id(id).await.unwrap().unwrap();
    assert_eq!(lead.phone.as_deref(), Some("+35699123456"));
    assert_eq!(lead.system_id.as_deref(), Some("max-10kw"));
    assert_eq!(lead.system_size_kw, Some(10.0));
    // max-10kw plus the stored 15kWh battery
    assert_eq!(lead.total_price, Some(23_200.0));
    let grant = lead.grant_amount.unwrap();
    assert!(grant > 0.0 && grant < 23_200.0);
    assert_eq!(lead.net_price, Some(23_200.0 - grant));

    let (status, _) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({"id": lead_id, "system_id": "mega-50kw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_patch_pricing_without_bill_is_rejected() {
    let (app, store) = memory_app();
    let lead = store
        .insert_lead(&LeadFields {
            name: Some("Joe Vella".to_string()),
            email: Some("joe@example.com".to_string()),
            ..LeadFields::default()
        })
        .await
        .unwrap();

    let (status, body) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({"id": lead.id, "system_id": "plus-7kw"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["monthly_bill"]));

    let (status, _) = send_json(
        &app,
        json_request(
            Method::PATCH,
            "/api/leads",
            json!({"id": lead.id, "system_id": "plus-7kw", "monthly_bill": 120.0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let lead = store.find_lead_by_id(lead.id).await.unwrap().unwrap();
    assert_eq!(lead.system_size_kw, Some(7.4));
    assert_eq!(lead.total_price, Some(8_600.0));
}

#[tokio::test]
async fn test_wizard_actions_are_debounced() {
    let (app, store) = memory_app();

    let (status, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/wizard-sessions/sess-2/actions",
            json!({"type": "SET_CONSUMPTION", "monthly_bill": 150.0, "household_size": 3}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");
    assert_eq!(body["state"]["quote"]["system_id"], "max-10kw");

    let (_, body) = send_json(
        &app,
        json_request(
            Method::POST,
            "/api/wizard-sessions/sess-2/actions",
            json!({"type": "NEXT_STEP"}),
        ),
    )
    .await;
    assert_eq!(body["current_step"], 2);

    // pending write is served before it reaches the store
    assert!(store.get_session("sess-2").await.unwrap().is_none());
    let (status, body) =
        send_json(&app, empty_request(Method::GET, "/api/wizard-sessions/sess-2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["current_step"], 2);
    assert_eq!(body["state"]["monthly_bill"], 150.0);

    // beacon without a body flushes the pending write
    let (status, _) = send_json(
        &app,
        empty_request(Method::POST, "/api/wizard-sessions/sess-2/beacon"),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let session = store.get_session("sess-2").await.unwrap().unwrap();
    assert_eq!(session.current_step, 2);
    assert_eq!(session.highest_step, 2);
}

#[tokio::test]
async fn test_wizard_rejects_bad_tokens() {
    let (app, _) = memory_app();
    let (status, _) = send_json(
        &app,
        empty_request(Method::GET, "/api/wizard-sessions/bad%20token"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        send_json(&app, empty_request(Method::GET, "/api/wizard-sessions/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsubscribe_flow() {
    let (app, store) = memory_app();
    let lead = store
        .insert_lead(&LeadFields {
            name: Some("Maria Borg".to_string()),
            email: Some("maria@example.com".to_string()),
            ..LeadFields::default()
        })
        .await
        .unwrap();

    let url = signing::unsubscribe_url(
        "https://solar.example.com",
        "test-signing-secret",
        &lead.id.to_string(),
        Utc::now(),
    )
    .unwrap();
    let path_and_query = url.trim_start_matches("https://solar.example.com");

    let (status, page) = send(&app, empty_request(Method::GET, path_and_query)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(page).unwrap().contains("unsubscribed"));
    let stored = store.find_lead_by_id(lead.id).await.unwrap().unwrap();
    assert!(stored.opted_out);
    let opted_out_at = stored.opted_out_at;

    // idempotent
    let (status, _) = send(&app, empty_request(Method::GET, path_and_query)).await;
    assert_eq!(status, StatusCode::OK);
    let stored = store.find_lead_by_id(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.opted_out_at, opted_out_at);

    let tampered = format!("/api/unsubscribe?lead={}&token=abc", lead.id);
    let (status, _) = send(&app, empty_request(Method::GET, &tampered)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, empty_request(Method::GET, "/api/unsubscribe")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = Uuid::new_v4().to_string();
    let token = signing::sign_lead_token("test-signing-secret", &missing, Utc::now()).unwrap();
    let (status, _) = send(
        &app,
        empty_request(
            Method::GET,
            &format!("/api/unsubscribe?lead={}&token={}", missing, token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cron_endpoints_require_bearer_secret() {
    let (app, _) = memory_app();

    let (status, _) = send_json(
        &app,
        empty_request(Method::POST, "/api/cron/wizard-sessions"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .method(Method::POST)
        .uri("/api/cron/wizard-sessions")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send_json(&app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = |uri: &str| {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::AUTHORIZATION, "Bearer test-cron-secret")
            .body(Body::empty())
            .unwrap()
    };
    let (status, body) = send_json(&app, authorized("/api/cron/wizard-sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abandoned"], 0);

    // no CRM configured
    let (status, _) = send_json(&app, authorized("/api/cron/email-sequences")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_crm_webhook_requires_token_when_configured() {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        webhook_secret: Some("hook-secret".to_string()),
        ..Config::for_tests()
    };
    let app = build_app(config, store.clone(), None);
    let event = json!([
        {"id": "crm-1", "Full_Name": "Joe Vella", "Email": "JOE@example.com"},
        {"id": "crm-2"}
    ]);

    let (status, _) = send_json(
        &app,
        json_request(Method::POST, "/api/webhooks/crm", event.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut request = json_request(Method::POST, "/api/webhooks/crm", event);
    request
        .headers_mut()
        .insert("x-webhook-token", "hook-secret".parse().unwrap());
    let (status, body) = send_json(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], 2);
    assert_eq!(body["created"], 1);
    assert_eq!(body["failed"], 1);

    let lead = store.find_lead_by_email("joe@example.com").await.unwrap().unwrap();
    assert_eq!(lead.crm_lead_id.as_deref(), Some("crm-1"));
    assert_eq!(lead.source.as_deref(), Some("crm"));
}
