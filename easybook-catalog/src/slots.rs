use chrono::{DateTime, Duration, FixedOffset, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Slot timestamps compare at millisecond precision, matching what clients send
/// as ISO-8601 strings and what the database round-trips.
pub fn normalize_slot(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}

/// The set of currently bookable timestamps of a service.
///
/// Removing a timestamp is the only reservation mechanism: a slot present in
/// the registry is bookable, an absent one is not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotRegistry {
    slots: BTreeSet<DateTime<Utc>>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots<I>(slots: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        Self {
            slots: slots.into_iter().map(normalize_slot).collect(),
        }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.slots.contains(&normalize_slot(time))
    }

    /// Take a slot out of the registry. Fails if it is not currently bookable.
    pub fn reserve(&mut self, time: DateTime<Utc>) -> Result<(), SlotError> {
        if self.remove(time) {
            Ok(())
        } else {
            Err(SlotError::NotAvailable(normalize_slot(time)))
        }
    }

    /// Drop a slot if listed. Returns whether it was.
    pub fn remove(&mut self, time: DateTime<Utc>) -> bool {
        self.slots.remove(&normalize_slot(time))
    }

    /// Put a slot back. Returns false when it was already present.
    pub fn release(&mut self, time: DateTime<Utc>) -> bool {
        self.slots.insert(normalize_slot(time))
    }

    /// Append slots, ignoring exact duplicates. Returns how many were new.
    pub fn extend<I>(&mut self, slots: I) -> usize
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        slots
            .into_iter()
            .filter(|slot| self.slots.insert(normalize_slot(*slot)))
            .count()
    }

    /// Slots strictly after `now`, ascending.
    pub fn upcoming(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.slots.iter().filter(|slot| **slot > now).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DateTime<Utc>> {
        self.slots.iter()
    }

    pub fn to_vec(&self) -> Vec<DateTime<Utc>> {
        self.slots.iter().copied().collect()
    }
}

/// Default schedule for a freshly created service: `days` days starting
/// tomorrow, one slot per entry of `hours`, on the hour in the business timezone.
pub fn generate_default_slots(
    now: DateTime<Utc>,
    offset: FixedOffset,
    days: u32,
    hours: &[u32],
) -> Vec<DateTime<Utc>> {
    let mut slots = Vec::with_capacity(days as usize * hours.len());

    for day in 1..=days {
        let local_date = (now + Duration::days(day as i64))
            .with_timezone(&offset)
            .date_naive();

        for hour in hours {
            let Some(naive) = local_date.and_hms_opt(*hour, 0, 0) else {
                continue;
            };
            if let Some(local) = offset.from_local_datetime(&naive).single() {
                slots.push(local.with_timezone(&Utc));
            }
        }
    }

    slots
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {0} is not available")]
    NotAvailable(DateTime<Utc>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_reserve_removes_slot_once() {
        let slot = at("2025-06-01T09:00:00Z");
        let mut registry = SlotRegistry::from_slots(vec![slot, at("2025-06-01T14:00:00Z")]);

        assert!(registry.contains(slot));
        registry.reserve(slot).unwrap();
        assert!(!registry.contains(slot));
        assert_eq!(registry.len(), 1);

        // Second reservation of the same slot must fail
        assert_eq!(registry.reserve(slot), Err(SlotError::NotAvailable(slot)));
    }

    #[test]
    fn test_release_and_extend_keep_set_semantics() {
        let slot = at("2025-06-01T09:00:00Z");
        let mut registry = SlotRegistry::new();

        assert!(registry.release(slot));
        assert!(!registry.release(slot));
        assert_eq!(registry.len(), 1);

        let added = registry.extend(vec![slot, at("2025-06-02T09:00:00Z")]);
        assert_eq!(added, 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_sub_millisecond_noise_is_ignored() {
        let slot = at("2025-06-01T09:00:00.123Z");
        let noisy = slot + Duration::nanoseconds(456_789);
        let registry = SlotRegistry::from_slots(vec![noisy]);
        assert!(registry.contains(slot));
    }

    #[test]
    fn test_upcoming_filters_past_slots() {
        let now = at("2025-06-01T12:00:00Z");
        let registry = SlotRegistry::from_slots(vec![
            at("2025-06-01T09:00:00Z"),
            at("2025-06-01T12:00:00Z"),
            at("2025-06-01T19:00:00Z"),
        ]);
        assert_eq!(registry.upcoming(now), vec![at("2025-06-01T19:00:00Z")]);
    }

    #[test]
    fn test_default_slots_three_per_day_for_thirty_days() {
        let now = at("2025-06-01T20:30:00Z"); // 03:30 on June 2nd in GMT+7
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let slots = generate_default_slots(now, offset, 30, &[9, 14, 19]);

        assert_eq!(slots.len(), 90);
        // First day is "tomorrow" relative to now, in local time: June 3rd 09:00 +07:00
        assert_eq!(slots[0], at("2025-06-03T02:00:00Z"));
        assert_eq!(slots[1], at("2025-06-03T07:00:00Z"));
        assert_eq!(slots[2], at("2025-06-03T12:00:00Z"));
        assert!(slots.iter().all(|s| *s > now));
    }

    #[test]
    fn test_registry_serializes_as_sorted_list() {
        let registry = SlotRegistry::from_slots(vec![
            at("2025-06-02T09:00:00Z"),
            at("2025-06-01T09:00:00Z"),
        ]);
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json, serde_json::json!(["2025-06-01T09:00:00Z", "2025-06-02T09:00:00Z"]));
    }
}
