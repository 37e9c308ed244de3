use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_database::{AppointmentChange, Stores};

use crate::models::{DayQueue, QueueEvent, QueueKey, QueueSnapshot};
use crate::services::calculator::QueuePositionCalculator;

pub type QueueSender = broadcast::Sender<Arc<DayQueue>>;
pub type QueueReceiver = broadcast::Receiver<Arc<DayQueue>>;

/// One broadcast topic per watched (provider, date).
///
/// Appointment changes are collected for a debounce window, then each touched
/// queue is recomputed once and fanned out to all of its subscribers.
#[derive(Clone)]
pub struct QueueWatchService {
    calculator: Arc<QueuePositionCalculator>,
    channels: Arc<RwLock<HashMap<QueueKey, QueueSender>>>,
    debounce: Duration,
}

impl QueueWatchService {
    pub fn new(stores: &Stores, debounce: Duration) -> Self {
        Self {
            calculator: Arc::new(QueuePositionCalculator::new(stores)),
            channels: Arc::new(RwLock::new(HashMap::new())),
            debounce,
        }
    }

    pub fn calculator(&self) -> &QueuePositionCalculator {
        &self.calculator
    }

    pub async fn subscribe(&self, key: QueueKey) -> QueueReceiver {
        let mut channels = self.channels.write().await;
        if let Some(sender) = channels.get(&key) {
            return sender.subscribe();
        }

        let (sender, receiver) = broadcast::channel(16);
        channels.insert(key, sender);
        debug!("Created queue channel for doctor {} on {}", key.provider_id, key.date);
        receiver
    }

    pub async fn watched(&self) -> Vec<QueueKey> {
        let channels = self.channels.read().await;
        channels.keys().copied().collect()
    }

    /// Recomputes one queue and pushes it to its subscribers, if it has any.
    pub async fn refresh(&self, key: QueueKey) {
        let sender = {
            let channels = self.channels.read().await;
            channels.get(&key).cloned()
        };
        let Some(sender) = sender else {
            return;
        };
        if sender.receiver_count() == 0 {
            self.remove_if_idle(key).await;
            return;
        }

        match self.calculator.day_queue(key).await {
            Ok(day) => {
                if sender.send(Arc::new(day)).is_err() {
                    self.remove_if_idle(key).await;
                }
            }
            Err(e) => warn!(
                "Failed to recompute queue for doctor {} on {}: {}",
                key.provider_id, key.date, e
            ),
        }
    }

    async fn remove_if_idle(&self, key: QueueKey) {
        let mut channels = self.channels.write().await;
        if channels
            .get(&key)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(&key);
            debug!("Removed queue channel for doctor {} on {}", key.provider_id, key.date);
        }
    }

    /// Consumes the appointment change feed until it closes.
    #[instrument(skip_all, fields(debounce_ms = self.debounce.as_millis() as u64))]
    pub async fn run(self, mut changes: broadcast::Receiver<AppointmentChange>) {
        info!("Queue watcher started");

        loop {
            let mut dirty = HashSet::new();
            let mut closed = match changes.recv().await {
                Ok(change) => {
                    dirty.insert(QueueKey::from(&change));
                    false
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Queue watcher lagged by {} changes, refreshing every queue", missed);
                    dirty.extend(self.watched().await);
                    false
                }
                Err(RecvError::Closed) => true,
            };

            if !closed {
                let window = tokio::time::sleep(self.debounce);
                tokio::pin!(window);
                loop {
                    tokio::select! {
                        _ = &mut window => break,
                        received = changes.recv() => match received {
                            Ok(change) => {
                                dirty.insert(QueueKey::from(&change));
                            }
                            Err(RecvError::Lagged(missed)) => {
                                warn!("Queue watcher lagged by {} changes, refreshing every queue", missed);
                                dirty.extend(self.watched().await);
                            }
                            Err(RecvError::Closed) => {
                                closed = true;
                                break;
                            }
                        }
                    }
                }
            }

            for key in dirty {
                self.refresh(key).await;
            }
            if closed {
                break;
            }
        }

        info!("Queue watcher stopped");
    }
}

/// Updates for one appointment: the initial snapshot, then every change of it,
/// ending with [`QueueEvent::Left`] once the appointment stops waiting.
pub fn appointment_updates(
    appointment_id: Uuid,
    initial: QueueSnapshot,
    receiver: QueueReceiver,
) -> impl Stream<Item = QueueEvent> {
    let first = stream::once(async move { QueueEvent::Position(initial) });
    let rest = stream::unfold(Some((receiver, initial)), move |state| async move {
        let (mut receiver, last) = state?;
        loop {
            match receiver.recv().await {
                Ok(day) => match day.snapshots.get(&appointment_id) {
                    Some(snapshot) if *snapshot == last => continue,
                    Some(snapshot) => {
                        return Some((QueueEvent::Position(*snapshot), Some((receiver, *snapshot))))
                    }
                    None => return Some((QueueEvent::Left, None)),
                },
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });
    first.chain(rest)
}
