use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use shared_database::{AppointmentStore, DirectoryStore, Stores};
use shared_models::AvailabilityWindow;

use crate::models::{AvailabilityError, SlotView, SLOT_MINUTES};

/// Read projection of a provider's bookable slots for one day.
pub struct AvailabilityCalendar {
    directory: Arc<dyn DirectoryStore>,
    appointments: Arc<dyn AppointmentStore>,
}

impl AvailabilityCalendar {
    pub fn new(stores: &Stores) -> Self {
        Self {
            directory: stores.directory.clone(),
            appointments: stores.appointments.clone(),
        }
    }

    /// Ordered slots for `date`. Empty when the provider does not work that weekday.
    /// Booking-horizon policy belongs to the caller.
    pub async fn get_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<SlotView>, AvailabilityError> {
        let windows = self.directory.list_availability(provider_id).await?;
        let candidates = slot_starts(&windows, date);
        if candidates.is_empty() {
            debug!("Doctor {} has no availability on {}", provider_id, date);
            return Ok(Vec::new());
        }

        let taken: HashSet<NaiveTime> = self
            .appointments
            .list_active_for_day(provider_id, date)
            .await?
            .into_iter()
            .map(|a| a.time)
            .collect();

        debug!(
            "Doctor {} on {}: {} slots, {} taken",
            provider_id,
            date,
            candidates.len(),
            taken.len()
        );

        Ok(candidates
            .into_iter()
            .map(|time| SlotView {
                time,
                available: !taken.contains(&time),
            })
            .collect())
    }

    /// Only the free slots, for callers that offer choices.
    pub async fn free_slots(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, AvailabilityError> {
        Ok(self
            .get_slots(provider_id, date)
            .await?
            .into_iter()
            .filter(|slot| slot.available)
            .map(|slot| slot.time)
            .collect())
    }
}

/// Start times of every full slot inside the active windows matching `date`'s weekday.
/// Overlapping windows contribute each start time once.
pub fn slot_starts(windows: &[AvailabilityWindow], date: NaiveDate) -> Vec<NaiveTime> {
    let step = Duration::minutes(SLOT_MINUTES);
    let mut starts = BTreeSet::new();

    for window in windows.iter().filter(|w| w.applies_to(date)) {
        let mut cursor = window.start_time;
        loop {
            let (slot_end, wrapped) = cursor.overflowing_add_signed(step);
            if wrapped != 0 || slot_end > window.end_time {
                break;
            }
            starts.insert(cursor);
            cursor = slot_end;
        }
    }

    starts.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(day: u8, start: (u32, u32), end: (u32, u32)) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            provider_id: Uuid::nil(),
            day_of_week: day,
            start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
            is_active: true,
        }
    }

    // 2024-06-10 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn partial_trailing_slot_is_dropped() {
        let starts = slot_starts(&[window(1, (8, 0), (9, 45))], monday());
        assert_eq!(starts.len(), 3);
        assert_eq!(starts.last(), Some(&NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
    }

    #[test]
    fn windows_are_merged_in_order() {
        let starts = slot_starts(
            &[window(1, (14, 0), (15, 0)), window(1, (8, 0), (9, 0)), window(1, (8, 30), (9, 30))],
            monday(),
        );
        let rendered: Vec<String> = starts.iter().map(|t| t.format("%H:%M").to_string()).collect();
        assert_eq!(rendered, ["08:00", "08:30", "09:00", "14:00", "14:30"]);
    }

    #[test]
    fn inactive_or_other_day_windows_are_ignored() {
        let mut inactive = window(1, (8, 0), (12, 0));
        inactive.is_active = false;
        assert!(slot_starts(&[inactive, window(2, (8, 0), (12, 0))], monday()).is_empty());
    }
}
