pub mod gateways;
pub mod manager;
pub mod orchestrator;
pub mod reminder;

pub use gateways::{MomoGateway, PaypalGateway, VnpayGateway};
pub use manager::{BookingManager, BookingRules, BookingUpdate};
pub use orchestrator::{CallbackResult, PaymentOrchestrator};
pub use reminder::{ReminderSweep, SweepReport};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use easybook_catalog::{ContactInfo, Service, ServiceDraft, ServiceType};
    use easybook_core::notify::{Notification, Notifier, NotifyError};
    use easybook_core::{CustomerInfo, NewBooking, PaymentMethod, Role, User};
    use easybook_shared::Masked;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    pub fn sample_service(slots: Vec<DateTime<Utc>>) -> Service {
        Service::new(
            ServiceDraft {
                name: "Hotel Sai Gon".to_string(),
                service_type: ServiceType::Stay,
                location: "Ho Chi Minh".to_string(),
                price: 800_000,
                image: "https://img.example.com/hotel.jpg".to_string(),
                description: "A quiet hotel near the river".to_string(),
                capacity: 1,
                rating: 4.0,
                review_count: 12,
                amenities: vec!["wifi".to_string()],
                contact_info: ContactInfo::default(),
                available_slots: Some(slots),
            },
            vec![],
        )
    }

    pub fn sample_user(role: Role) -> User {
        let email = format!("user-{}@example.com", Uuid::new_v4().simple());
        User::new(&email, "secret123", "Tran Van An", None, role, 4).unwrap()
    }

    pub fn new_booking(service_id: Uuid, time: DateTime<Utc>, amount: i64) -> NewBooking {
        NewBooking {
            service_id,
            time,
            payment_method: PaymentMethod::Cash,
            amount,
            customer_info: CustomerInfo {
                name: "Tran Van An".to_string(),
                phone: Masked("0901234567".to_string()),
                email: Masked("an@example.com".to_string()),
                note: String::new(),
            },
        }
    }

    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    pub struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("connection refused".to_string()))
        }
    }

    /// Fails the first `failures` sends, then succeeds.
    pub struct FlakyNotifier {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyNotifier {
        pub fn failing_first(failures: usize) -> Self {
            Self { failures, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(NotifyError::Timeout);
            }
            Ok(())
        }
    }
}
