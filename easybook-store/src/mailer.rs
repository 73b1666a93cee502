use async_trait::async_trait;
use chrono::FixedOffset;
use easybook_core::notify::{Notification, NotificationKind, Notifier, NotifyError};
use easybook_core::BookingStatus;
use easybook_shared::mask_email;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::info;

use crate::app_config::SmtpConfig;

/// Sends booking emails through an SMTP relay (STARTTLS).
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    offset: FixedOffset,
    timeout: Duration,
}

impl SmtpNotifier {
    /// `offset` is the business timezone booking times are rendered in.
    pub fn new(config: &SmtpConfig, host: &str, offset: FixedOffset) -> Result<Self, NotifyError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(config.port)
            .timeout(Some(timeout));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username.clone(), config.password.clone()));
        }

        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidAddress(format!("{}: {}", config.from, e)))?;

        Ok(Self { transport: builder.build(), from, offset, timeout })
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to = notification
            .recipient
            .email
            .parse::<Mailbox>()
            .map_err(|_| NotifyError::InvalidAddress(mask_email(&notification.recipient.email)))?;
        let rendered = render(notification, self.offset);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(rendered.subject)
            .header(ContentType::TEXT_HTML)
            .body(rendered.html)
            .map_err(|e| NotifyError::Message(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(notification)?;

        match tokio::time::timeout(self.timeout, self.transport.send(message)).await {
            Err(_) => Err(NotifyError::Timeout),
            Ok(Err(e)) => Err(NotifyError::Transport(e.to_string())),
            Ok(Ok(_)) => {
                info!(
                    kind = notification.kind.as_str(),
                    booking_id = %notification.booking.id,
                    to = %mask_email(&notification.recipient.email),
                    "Email sent"
                );
                Ok(())
            }
        }
    }
}

pub(crate) struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub(crate) fn render(notification: &Notification, offset: FixedOffset) -> RenderedEmail {
    let booking = &notification.booking;
    let service = &notification.service;
    let when = booking.time.with_timezone(&offset).format("%d/%m/%Y %H:%M").to_string();
    let contact = &service.contact_info;

    let service_block = format!(
        "<h3>Service</h3>\
         <p><strong>Service:</strong> {}</p>\
         <p><strong>Location:</strong> {}</p>\
         <p><strong>Time:</strong> {}</p>\
         <p><strong>Amount:</strong> {} VND</p>",
        escape_html(&service.name),
        escape_html(&service.location),
        when,
        format_vnd(booking.amount),
    );
    let contact_block = format!(
        "<h3>Provider contact</h3>\
         <p><strong>Phone:</strong> {}</p>\
         <p><strong>Email:</strong> {}</p>\
         <p><strong>Address:</strong> {}</p>",
        escape_html(contact.phone.as_deref().unwrap_or("-")),
        escape_html(contact.email.as_deref().unwrap_or("-")),
        escape_html(contact.address.as_deref().unwrap_or("-")),
    );

    let (subject, body) = match notification.kind {
        NotificationKind::BookingConfirmation => {
            let status = if booking.status == BookingStatus::Paid { "Paid" } else { "Awaiting payment" };
            let note = if booking.customer_info.note.is_empty() {
                String::new()
            } else {
                format!("<p><strong>Note:</strong> {}</p>", escape_html(&booking.customer_info.note))
            };
            (
                format!("Booking confirmed - {}", service.name),
                format!(
                    "<p>Thank you for booking with EasyBook. Here are the details of your booking:</p>\
                     {service_block}\
                     <p><strong>Status:</strong> {status}</p>\
                     <p><strong>Payment method:</strong> {method}</p>\
                     <h3>Your details</h3>\
                     <p><strong>Name:</strong> {name}</p>\
                     <p><strong>Email:</strong> {email}</p>\
                     <p><strong>Phone:</strong> {phone}</p>\
                     {note}\
                     {contact_block}",
                    method = booking.payment_method.as_str().to_uppercase(),
                    name = escape_html(&booking.customer_info.name),
                    email = escape_html(booking.customer_info.email.inner()),
                    phone = escape_html(booking.customer_info.phone.inner()),
                ),
            )
        }
        NotificationKind::BookingReminder => (
            format!("Reminder - {} tomorrow", service.name),
            format!(
                "<p>This is a reminder of your booking tomorrow:</p>\
                 {service_block}\
                 <ul><li>Please arrive on time</li><li>Bring an identity document</li>\
                 <li>Contact the provider if your plans change</li></ul>\
                 {contact_block}"
            ),
        ),
    };

    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>EasyBook</h1>\
         <h2>Hello {}!</h2>\
         {}\
         <p>Best regards,<br>The EasyBook team</p>\
         </div>",
        escape_html(&notification.recipient.name),
        body
    );

    RenderedEmail { subject, html }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `1250000` -> `1.250.000`
fn format_vnd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use easybook_catalog::{ContactInfo, Service, ServiceDraft, ServiceType};
    use easybook_core::notify::Recipient;
    use easybook_core::{Booking, CustomerInfo, NewBooking, PaymentMethod};
    use easybook_shared::Masked;
    use uuid::Uuid;

    fn notification(kind: NotificationKind) -> Notification {
        let time = DateTime::parse_from_rfc3339("2025-06-01T09:00:00Z").unwrap().with_timezone(&Utc);
        let service = Service::new(
            ServiceDraft {
                name: "Hotel <Sai Gon>".to_string(),
                service_type: ServiceType::Stay,
                location: "Ho Chi Minh".to_string(),
                price: 1_250_000,
                image: "https://img.example.com/1.jpg".to_string(),
                description: "A quiet hotel near the river".to_string(),
                capacity: 1,
                rating: 0.0,
                review_count: 0,
                amenities: vec![],
                contact_info: ContactInfo {
                    phone: Some("028 1234 5678".to_string()),
                    email: None,
                    address: None,
                },
                available_slots: Some(vec![time]),
            },
            vec![],
        );
        let booking = Booking::new(
            Uuid::new_v4(),
            NewBooking {
                service_id: service.id,
                time,
                payment_method: PaymentMethod::Vnpay,
                amount: 1_250_000,
                customer_info: CustomerInfo {
                    name: "Tran Van An".to_string(),
                    phone: Masked("0901234567".to_string()),
                    email: Masked("an@example.com".to_string()),
                    note: String::new(),
                },
            },
        );
        Notification {
            kind,
            recipient: Recipient { name: "An".to_string(), email: "an@example.com".to_string() },
            booking,
            service,
        }
    }

    #[test]
    fn test_confirmation_renders_local_time_and_escapes() {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let email = render(&notification(NotificationKind::BookingConfirmation), offset);

        assert_eq!(email.subject, "Booking confirmed - Hotel <Sai Gon>");
        assert!(email.html.contains("01/06/2025 16:00"));
        assert!(email.html.contains("1.250.000 VND"));
        assert!(email.html.contains("Hotel &lt;Sai Gon&gt;"));
        assert!(email.html.contains("VNPAY"));
        assert!(email.html.contains("Awaiting payment"));
    }

    #[test]
    fn test_reminder_subject() {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let email = render(&notification(NotificationKind::BookingReminder), offset);
        assert!(email.subject.starts_with("Reminder - "));
        assert!(email.html.contains("Bring an identity document"));
    }

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(0), "0");
        assert_eq!(format_vnd(800_000), "800.000");
        assert_eq!(format_vnd(1_250_000), "1.250.000");
        assert_eq!(format_vnd(-1_000), "-1.000");
    }
}
