//! Solar Lead Generation Service Library
//!
//! This library provides the quote calculator for the Maltese PV/battery
//! grant scheme, the lead ingestion pipeline (validation, dedup, store + CRM
//! dual write, notifications), wizard session persistence and the follow-up
//! email jobs.
//!
//! # Modules
//!
//! - `api`: HTTP-facing components.
//! - `core`: Pricing, scoring and wizard logic.
//! - `integrations`: External service clients.
//! - `catalog`: System packages and battery options.
//! - `config`: Configuration management.
//! - `cron_handler`: Bearer-guarded scheduled jobs.
//! - `crm_client`: CRM (Zoho-style) client.
//! - `db`: Database connection, pool and migrations.
//! - `db_storage`: Postgres `LeadStore`.
//! - `dedup`: Existing-lead matching.
//! - `errors`: Error handling types.
//! - `financing`: Loan payments and term ladder.
//! - `followup`: Follow-up email sequence.
//! - `grant_scheme`: Versioned grant and tariff constants.
//! - `handlers`: HTTP request handlers and shared state.
//! - `memory_store`: In-memory `LeadStore`.
//! - `models`: Core data models.
//! - `notifications`: Chat and webhook notifiers.
//! - `quote`: Quote builder.
//! - `routes`: Router assembly.
//! - `scoring`: Lead priority.
//! - `session_writer`: Debounced wizard-session writes.
//! - `side_effects`: Background notification queue.
//! - `signing`: HMAC link tokens.
//! - `store`: `LeadStore` trait.
//! - `tariff`: Consumption, grant and savings formulas.
//! - `unsubscribe_handler`: Opt-out page.
//! - `validation`: Email and phone checks.
//! - `webhook_handler`: CRM sync webhook.
//! - `webhook_models`: CRM webhook payload models.
//! - `wizard`: Wizard state reducer.

pub mod api;
pub mod core;
pub mod integrations;

pub mod catalog;
pub mod config;
pub mod cron_handler;
pub mod crm_client;
pub mod db;
pub mod db_storage;
pub mod dedup;
pub mod errors;
pub mod financing;
pub mod followup;
pub mod grant_scheme;
pub mod handlers;
pub mod memory_store;
pub mod models;
pub mod notifications;
pub mod quote;
pub mod routes;
pub mod scoring;
pub mod session_writer;
pub mod side_effects;
pub mod signing;
pub mod store;
pub mod tariff;
pub mod unsubscribe_handler;
pub mod validation;
pub mod webhook_handler;
pub mod webhook_models;
pub mod wizard;

// Re-exports used by the binaries and integration tests
pub use errors::AppError;
pub use store::LeadStore;
