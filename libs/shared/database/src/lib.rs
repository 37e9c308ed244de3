pub mod change_feed;
pub mod memory;
pub mod notify;
pub mod store;
pub mod supabase;
pub mod supabase_store;

use std::sync::Arc;

use tracing::info;

use shared_config::AppConfig;

pub use change_feed::{AppointmentChange, ChangeFeed, ChangeKind};
pub use memory::InMemoryStore;
pub use notify::{LogNotificationSink, NotificationSink, SupabaseNotificationSink};
pub use store::{AppointmentStore, DirectoryStore, PaymentStore, StoreError, StoreResult};
pub use supabase::{SupabaseClient, SupabaseError};
pub use supabase_store::SupabaseStore;

/// The persistence handles every service is built from.
#[derive(Clone)]
pub struct Stores {
    pub directory: Arc<dyn DirectoryStore>,
    pub appointments: Arc<dyn AppointmentStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub changes: ChangeFeed,
}

impl Stores {
    /// Supabase when configured, otherwise a process-local store.
    pub fn from_config(config: &AppConfig) -> Self {
        if config.is_configured() {
            info!("Using Supabase persistence at {}", config.supabase_url);
            let supabase = Arc::new(SupabaseClient::new(config));
            let changes = ChangeFeed::default();
            let store = Arc::new(SupabaseStore::new(supabase.clone(), changes.clone()));
            Self {
                directory: store.clone(),
                appointments: store.clone(),
                payments: store,
                notifications: Arc::new(SupabaseNotificationSink::new(supabase)),
                changes,
            }
        } else {
            info!("Using in-memory persistence");
            Self::in_memory(Arc::new(InMemoryStore::default()))
        }
    }

    /// Every handle points at the same in-memory store, notifications included.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            changes: store.changes().clone(),
            directory: store.clone(),
            appointments: store.clone(),
            payments: store.clone(),
            notifications: store,
        }
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }
}
