use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use shared_database::{AppointmentStore, PaymentStore, Stores};
use shared_models::AppointmentStatus;

use crate::models::AppointmentError;

/// Releases slots held by reservations whose deposit was never started or
/// has failed. A deposit still open at the gateway keeps the slot.
pub struct PendingReservationSweeper {
    appointments: Arc<dyn AppointmentStore>,
    payments: Arc<dyn PaymentStore>,
    ttl: Duration,
}

impl PendingReservationSweeper {
    pub fn new(stores: &Stores, ttl_minutes: i64) -> Self {
        Self {
            appointments: stores.appointments.clone(),
            payments: stores.payments.clone(),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Cancels every pending appointment created before `now - ttl` with no
    /// open or paid deposit. Returns how many were cancelled.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, AppointmentError> {
        let cutoff = now - self.ttl;
        let stale = self.appointments.list_pending_created_before(cutoff).await?;
        let mut cancelled = 0;

        for appointment in stale {
            if self.payments.has_live_deposit(appointment.id).await? {
                debug!("Appointment {} has an open or paid deposit; left for reconciliation", appointment.id);
                continue;
            }

            // CAS on pending: a confirmation that lands first wins.
            let released = self
                .appointments
                .transition_status(
                    appointment.id,
                    &[AppointmentStatus::Pending],
                    AppointmentStatus::Cancelled,
                    None,
                )
                .await?;
            if released.is_some() {
                info!(
                    "Expired pending appointment {} ({} {})",
                    appointment.id, appointment.date, appointment.time
                );
                cancelled += 1;
            }
        }

        Ok(cancelled)
    }

    #[instrument(skip(self), name = "pending_sweeper")]
    pub async fn run(self: Arc<Self>, every: StdDuration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match self.sweep_once(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => info!("Released {} expired reservations", n),
                Err(e) => warn!("Pending reservation sweep failed: {}", e),
            }
        }
    }
}
