use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::slots::{SlotError, SlotRegistry};

/// Kinds of bookable services
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Stay,
    Transport,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Stay => "stay",
            ServiceType::Transport => "transport",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stay" => Ok(ServiceType::Stay),
            "transport" => Ok(ServiceType::Transport),
            other => Err(format!("Unknown service type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// A stay or transport offering together with its slot registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub location: String,
    pub price: i64,
    pub image: String,
    pub description: String,
    pub available_slots: SlotRegistry,
    pub capacity: i32,
    pub is_active: bool,
    pub rating: f64,
    pub review_count: i32,
    pub amenities: Vec<String>,
    pub contact_info: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-editable fields of a service, already validated by the caller.
#[derive(Debug, Clone)]
pub struct ServiceDraft {
    pub name: String,
    pub service_type: ServiceType,
    pub location: String,
    pub price: i64,
    pub image: String,
    pub description: String,
    pub capacity: i32,
    pub rating: f64,
    pub review_count: i32,
    pub amenities: Vec<String>,
    pub contact_info: ContactInfo,
    pub available_slots: Option<Vec<DateTime<Utc>>>,
}

impl Service {
    /// Build an active service. `default_slots` is used only when the draft
    /// carries no explicit slots.
    pub fn new(draft: ServiceDraft, default_slots: Vec<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        let slots = draft.available_slots.clone().unwrap_or(default_slots);

        Self {
            id: Uuid::new_v4(),
            name: draft.name,
            service_type: draft.service_type,
            location: draft.location,
            price: draft.price,
            image: draft.image,
            description: draft.description,
            available_slots: SlotRegistry::from_slots(slots),
            capacity: draft.capacity,
            is_active: true,
            rating: draft.rating,
            review_count: draft.review_count,
            amenities: draft.amenities,
            contact_info: draft.contact_info,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the descriptive fields. The slot registry is not touched;
    /// slot changes go through the repository so they serialize with
    /// reservations.
    pub fn apply(&mut self, draft: ServiceDraft) {
        self.name = draft.name;
        self.service_type = draft.service_type;
        self.location = draft.location;
        self.price = draft.price;
        self.image = draft.image;
        self.description = draft.description;
        self.capacity = draft.capacity;
        self.rating = draft.rating;
        self.review_count = draft.review_count;
        self.amenities = draft.amenities;
        self.contact_info = draft.contact_info;
        self.updated_at = Utc::now();
    }

    pub fn is_slot_available(&self, time: DateTime<Utc>) -> bool {
        self.available_slots.contains(time)
    }

    pub fn reserve_slot(&mut self, time: DateTime<Utc>) -> Result<(), SlotError> {
        self.available_slots.reserve(time)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn release_slot(&mut self, time: DateTime<Utc>) {
        self.available_slots.release(time);
        self.updated_at = Utc::now();
    }

    /// Future slots only; past timestamps stay in storage but are never offered.
    pub fn upcoming_slots(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.available_slots.upcoming(now)
    }

    /// Soft delete
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(slots: Option<Vec<DateTime<Utc>>>) -> ServiceDraft {
        ServiceDraft {
            name: "Homestay Da Lat View".to_string(),
            service_type: ServiceType::Stay,
            location: "Da Lat, Lam Dong".to_string(),
            price: 800_000,
            image: "https://images.example.com/dalat.jpg".to_string(),
            description: "Cozy homestay with a mountain view".to_string(),
            capacity: 4,
            rating: 4.5,
            review_count: 12,
            amenities: vec!["WiFi".to_string()],
            contact_info: ContactInfo::default(),
            available_slots: slots,
        }
    }

    #[test]
    fn test_explicit_slots_win_over_defaults() {
        let explicit = Utc::now() + chrono::Duration::days(2);
        let default = Utc::now() + chrono::Duration::days(3);

        let service = Service::new(draft(Some(vec![explicit])), vec![default]);
        assert!(service.is_slot_available(explicit));
        assert!(!service.is_slot_available(default));

        let service = Service::new(draft(None), vec![default]);
        assert!(service.is_slot_available(default));
        assert!(service.is_active);
    }

    #[test]
    fn test_update_leaves_slots_alone() {
        let slot = Utc::now() + chrono::Duration::days(1);
        let other = slot + chrono::Duration::days(1);
        let mut service = Service::new(draft(None), vec![slot]);

        let mut update = draft(Some(vec![other]));
        update.price = 900_000;
        service.apply(update);

        assert_eq!(service.price, 900_000);
        assert!(service.is_slot_available(slot));
        assert!(!service.is_slot_available(other));
    }

    #[test]
    fn test_json_shape_uses_camel_case_and_type() {
        let service = Service::new(draft(Some(vec![])), vec![]);
        let json = serde_json::to_value(&service).unwrap();
        assert_eq!(json["type"], "stay");
        assert!(json.get("availableSlots").is_some());
        assert_eq!(json["isActive"], true);
    }

    #[test]
    fn test_service_type_parsing() {
        assert_eq!("transport".parse::<ServiceType>().unwrap(), ServiceType::Transport);
        assert!("flight".parse::<ServiceType>().is_err());
    }
}
