pub mod service;
pub mod slots;

pub use service::{ContactInfo, Service, ServiceDraft, ServiceType};
pub use slots::{generate_default_slots, normalize_slot, SlotError, SlotRegistry};
