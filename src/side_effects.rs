//! Best-effort background work queued by request handlers.
//!
//! Effects are handed to a single worker task over an unbounded channel and run
//! after the response is sent. Failures are logged and dropped, and anything
//! still queued when the process stops is lost: callers must not rely on an
//! effect having completed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{Channel, NewCommunication};
use crate::notifications::{ChatNotifier, LeadNotice, WebhookNotifier};
use crate::store::LeadStore;

#[derive(Debug, Clone)]
pub enum SideEffect {
    /// Announce the lead to sales staff in chat.
    NotifyChat(LeadNotice),
    /// POST the lead to the configured generic webhook.
    NotifyWebhook(LeadNotice),
    /// Mark the wizard session as converted into this lead.
    LinkWizardSession { token: String, lead_id: Uuid },
}

struct Worker {
    store: Arc<dyn LeadStore>,
    chat: Option<ChatNotifier>,
    webhook: Option<WebhookNotifier>,
}

impl Worker {
    async fn log_channel(&self, lead_id: Option<Uuid>, channel: Channel) {
        let Some(lead_id) = lead_id else { return };
        let entry = NewCommunication {
            lead_id,
            channel,
            template: None,
            external_message_id: None,
        };
        if let Err(e) = self.store.record_communication(&entry).await {
            tracing::warn!("⚠️ Failed to log {:?} notification for {}: {}", channel, lead_id, e);
        }
    }

    async fn run(&self, effect: SideEffect) {
        match effect {
            SideEffect::NotifyChat(notice) => {
                let Some(chat) = &self.chat else { return };
                match chat.send(&notice.chat_text()).await {
                    Ok(()) => self.log_channel(notice.lead_id, Channel::Chat).await,
                    Err(e) => tracing::warn!("⚠️ Chat notification failed: {}", e),
                }
            }
            SideEffect::NotifyWebhook(notice) => {
                let Some(webhook) = &self.webhook else { return };
                match webhook.send(&notice).await {
                    Ok(()) => self.log_channel(notice.lead_id, Channel::Webhook).await,
                    Err(e) => tracing::warn!("⚠️ Lead webhook failed: {}", e),
                }
            }
            SideEffect::LinkWizardSession { token, lead_id } => {
                match self.store.convert_session(&token, lead_id).await {
                    Ok(true) => tracing::info!("✓ Wizard session linked to lead {}", lead_id),
                    Ok(false) => {
                        tracing::debug!("Wizard session not linked (unknown or already converted)")
                    }
                    Err(e) => tracing::warn!("⚠️ Wizard session linkage failed: {}", e),
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct SideEffectQueue {
    tx: mpsc::UnboundedSender<SideEffect>,
}

impl SideEffectQueue {
    /// Starts the worker. It stops once every queue handle is dropped.
    pub fn spawn(
        store: Arc<dyn LeadStore>,
        chat: Option<ChatNotifier>,
        webhook: Option<WebhookNotifier>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = Worker {
            store,
            chat,
            webhook,
        };
        let handle = tokio::spawn(async move {
            while let Some(effect) = rx.recv().await {
                worker.run(effect).await;
            }
            tracing::debug!("Side-effect queue closed");
        });
        (Self { tx }, handle)
    }

    pub fn enqueue(&self, effect: SideEffect) {
        if let Err(e) = self.tx.send(effect) {
            tracing::warn!("⚠️ Side-effect queue closed, dropping {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::wizard::WizardState;

    #[tokio::test]
    async fn test_links_session_in_background() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_session(&WizardState::default().snapshot("tok"))
            .await
            .unwrap();

        let (queue, handle) = SideEffectQueue::spawn(store.clone(), None, None);
        let lead_id = Uuid::new_v4();
        queue.enqueue(SideEffect::LinkWizardSession {
            token: "tok".to_string(),
            lead_id,
        });
        drop(queue);
        handle.await.unwrap();

        let session = store.get_session("tok").await.unwrap().unwrap();
        assert_eq!(session.lead_id, Some(lead_id));
        assert_eq!(session.status, crate::models::SessionStatus::ConvertedToLead);
    }
}
