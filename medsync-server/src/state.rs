//! Shared server state.
//!
//! Durable data lives behind the store traits; per-user feeds, consultations
//! and carts are process memory keyed by user id.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use medsync_core::{
    ActivityFeed, AdviceClient, Cart, ConsultationState, Feature, InferenceBackend, LedgerStore,
    MedsyncConfig, ProfileStore, SessionLedger,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Per-user values, created on first write.
///
/// Callers only reach a slot after resolving a registered user, so the map is
/// bounded by the user table. Carts and consultations give their slot back
/// through [`UserScoped::release_if`] once they return to their empty state.
pub struct UserScoped<T> {
    entries: Mutex<HashMap<Uuid, Arc<Mutex<T>>>>,
}

impl<T: Default> UserScoped<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The user's slot. Lock it for as long as the value is in use.
    pub async fn slot(&self, user_id: Uuid) -> Arc<Mutex<T>> {
        let mut entries = self.entries.lock().await;
        entries.entry(user_id).or_default().clone()
    }

    /// The user's slot if one exists; read paths use this to avoid allocating.
    pub async fn get(&self, user_id: Uuid) -> Option<Arc<Mutex<T>>> {
        self.entries.lock().await.get(&user_id).cloned()
    }

    /// Drop the user's slot when `idle` holds for its value. A slot another
    /// task still holds is kept. Returns whether the slot was removed.
    pub async fn release_if(&self, user_id: Uuid, idle: impl FnOnce(&T) -> bool) -> bool {
        let mut entries = self.entries.lock().await;
        let Some(slot) = entries.get(&user_id) else {
            return false;
        };
        if Arc::strong_count(slot) > 1 {
            return false;
        }
        let releasable = match slot.try_lock() {
            Ok(value) => idle(&*value),
            Err(_) => false,
        };
        if releasable {
            entries.remove(&user_id);
        }
        releasable
    }
}

impl<T: Default> Default for UserScoped<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of `(user, feature)` requests currently running.
#[derive(Clone, Default)]
pub struct InFlight {
    running: Arc<std::sync::Mutex<HashSet<(Uuid, Feature)>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the key, or `None` if a request for it is already running.
    pub fn try_acquire(&self, user_id: Uuid, feature: Feature) -> Option<InFlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if !running.insert((user_id, feature)) {
            return None;
        }
        Some(InFlightGuard {
            running: self.running.clone(),
            key: (user_id, feature),
        })
    }

    pub fn is_running(&self, user_id: Uuid, feature: Feature) -> bool {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.contains(&(user_id, feature))
    }
}

/// Releases its key on drop, whether the request finished or failed.
pub struct InFlightGuard {
    running: Arc<std::sync::Mutex<HashSet<(Uuid, Feature)>>>,
    key: (Uuid, Feature),
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        running.remove(&self.key);
    }
}

pub struct AppState {
    pub config: MedsyncConfig,
    pub ledger: SessionLedger,
    pub profiles: Arc<dyn ProfileStore>,
    pub advisor: AdviceClient,
    pub activity: UserScoped<ActivityFeed>,
    pub consultations: UserScoped<ConsultationState>,
    pub carts: UserScoped<Cart>,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new(
        config: MedsyncConfig,
        ledger_store: Arc<dyn LedgerStore>,
        profiles: Arc<dyn ProfileStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let advisor = AdviceClient::new(backend, config.inference.model.clone());
        Self {
            config,
            ledger: SessionLedger::new(ledger_store),
            profiles,
            advisor,
            activity: UserScoped::new(),
            consultations: UserScoped::new(),
            carts: UserScoped::new(),
            in_flight: InFlight::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_rejects_duplicate_until_released() {
        let registry = InFlight::new();
        let user = Uuid::new_v4();

        let guard = registry.try_acquire(user, Feature::SymptomAnalysis);
        assert!(guard.is_some());
        assert!(registry.try_acquire(user, Feature::SymptomAnalysis).is_none());

        // Other features and other users are independent.
        assert!(registry.try_acquire(user, Feature::MedicationCheck).is_some());
        assert!(registry.try_acquire(Uuid::new_v4(), Feature::SymptomAnalysis).is_some());

        drop(guard);
        assert!(!registry.is_running(user, Feature::SymptomAnalysis));
        assert!(registry.try_acquire(user, Feature::SymptomAnalysis).is_some());
    }

    #[tokio::test]
    async fn test_user_scoped_slots_are_shared_per_user() {
        let carts: UserScoped<Cart> = UserScoped::new();
        let user = Uuid::new_v4();

        carts.slot(user).await.lock().await.add(1).unwrap();
        assert_eq!(carts.slot(user).await.lock().await.item_count(), 1);
        assert!(carts.slot(Uuid::new_v4()).await.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_user_scoped_releases_idle_slots() {
        let carts: UserScoped<Cart> = UserScoped::new();
        let user = Uuid::new_v4();
        assert!(carts.get(user).await.is_none());
        assert!(!carts.release_if(user, Cart::is_empty).await);

        carts.slot(user).await.lock().await.add(1).unwrap();
        assert!(!carts.release_if(user, Cart::is_empty).await);
        assert!(carts.get(user).await.is_some());

        // Held elsewhere: kept even though it is empty.
        let held = carts.slot(user).await;
        held.lock().await.remove(1);
        assert!(!carts.release_if(user, Cart::is_empty).await);
        drop(held);

        assert!(carts.release_if(user, Cart::is_empty).await);
        assert!(carts.get(user).await.is_none());
    }
}
