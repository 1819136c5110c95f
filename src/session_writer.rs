//! Debounced wizard-session persistence.
//!
//! Every change replaces the token's pending snapshot and restarts its timer;
//! only the snapshot still pending when a timer fires is written (last write
//! wins). [`SessionWriter::flush`] writes immediately, for the unload beacon.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::errors::AppError;
use crate::models::SessionSnapshot;
use crate::store::LeadStore;

struct Pending {
    generation: u64,
    snapshot: SessionSnapshot,
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    by_token: HashMap<String, Pending>,
}

#[derive(Clone)]
pub struct SessionWriter {
    store: Arc<dyn LeadStore>,
    debounce: Duration,
    slots: Arc<Mutex<Slots>>,
}

impl SessionWriter {
    pub fn new(store: Arc<dyn LeadStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            slots: Arc::new(Mutex::new(Slots::default())),
        }
    }

    /// Queues `snapshot` and (re)starts the token's debounce timer.
    pub async fn schedule(&self, snapshot: SessionSnapshot) {
        let token = snapshot.token.clone();
        let generation = {
            let mut slots = self.slots.lock().await;
            slots.next_generation += 1;
            let generation = slots.next_generation;
            slots
                .by_token
                .insert(token.clone(), Pending { generation, snapshot });
            generation
        };

        let writer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(writer.debounce).await;
            let due = {
                let mut slots = writer.slots.lock().await;
                match slots.by_token.get(&token) {
                    Some(pending) if pending.generation == generation => {
                        slots.by_token.remove(&token).map(|p| p.snapshot)
                    }
                    _ => None,
                }
            };
            if let Some(snapshot) = due {
                if let Err(e) = writer.store.save_session(&snapshot).await {
                    tracing::warn!("⚠️ Debounced wizard session write failed for {}: {}", token, e);
                }
            }
        });
    }

    /// The snapshot waiting to be written for `token`, if any.
    pub async fn pending(&self, token: &str) -> Option<SessionSnapshot> {
        let slots = self.slots.lock().await;
        slots.by_token.get(token).map(|p| p.snapshot.clone())
    }

    /// Writes the pending snapshot now. Returns `false` when nothing was pending.
    pub async fn flush(&self, token: &str) -> Result<bool, AppError> {
        let pending = self.slots.lock().await.by_token.remove(token);
        match pending {
            Some(p) => {
                self.store.save_session(&p.snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replaces anything pending for the token with `snapshot` and writes it now.
    pub async fn write_now(&self, snapshot: SessionSnapshot) -> Result<(), AppError> {
        self.slots.lock().await.by_token.remove(&snapshot.token);
        self.store.save_session(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::wizard::{reduce, WizardAction, WizardState};

    fn writer(store: Arc<MemoryStore>) -> SessionWriter {
        SessionWriter::new(store, Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_coalesce_into_last_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());

        let mut state = WizardState::default();
        for step in 2..=4 {
            state = reduce(&state, WizardAction::SetStep { step });
            writer.schedule(state.snapshot("tok-1")).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(store.get_session("tok-1").await.unwrap().is_none());
        assert_eq!(writer.pending("tok-1").await.map(|s| s.current_step), Some(4));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let saved = store.get_session("tok-1").await.unwrap().unwrap();
        assert_eq!(saved.current_step, 4);
        assert_eq!(saved.highest_step, 4);
        assert!(writer.pending("tok-1").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_writes_immediately() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());

        let state = reduce(&WizardState::default(), WizardAction::NextStep);
        writer.schedule(state.snapshot("tok-2")).await;
        assert!(writer.flush("tok-2").await.unwrap());
        assert_eq!(
            store.get_session("tok-2").await.unwrap().map(|s| s.current_step),
            Some(2)
        );
        assert!(!writer.flush("tok-2").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let writer = writer(store.clone());

        writer.schedule(WizardState::default().snapshot("a")).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        writer.schedule(WizardState::default().snapshot("b")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(store.get_session("a").await.unwrap().is_some());
        assert!(store.get_session("b").await.unwrap().is_none());
    }
}
