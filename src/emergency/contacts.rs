//! Emergency contacts and telephony interfaces

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Who an emergency number belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactKind {
    /// Someone the user chose
    Personal,
    Ambulance,
    Police,
    Fire,
}

/// A number to dial during an emergency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub number: String,

    #[serde(default = "default_kind")]
    pub kind: ContactKind,
}

const fn default_kind() -> ContactKind {
    ContactKind::Personal
}

impl EmergencyContact {
    pub fn personal(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            kind: ContactKind::Personal,
        }
    }

    pub fn service(kind: ContactKind, name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            kind,
        }
    }

    /// Whether this is a public service rather than a person
    #[must_use]
    pub const fn is_service(&self) -> bool {
        !matches!(self.kind, ContactKind::Personal)
    }
}

/// Egyptian emergency services
#[must_use]
pub fn regional_services() -> Vec<EmergencyContact> {
    vec![
        EmergencyContact::service(ContactKind::Ambulance, "الإسعاف", "123"),
        EmergencyContact::service(ContactKind::Police, "الشرطة", "122"),
        EmergencyContact::service(ContactKind::Fire, "المطافي", "180"),
    ]
}

/// Dialing order: user contacts first, then services, without duplicate numbers
#[must_use]
pub fn dial_order(
    personal: &[EmergencyContact],
    services: &[EmergencyContact],
) -> Vec<EmergencyContact> {
    let mut ordered: Vec<EmergencyContact> = Vec::with_capacity(personal.len() + services.len());
    for contact in personal.iter().chain(services) {
        let number = contact.number.trim();
        if number.is_empty() || ordered.iter().any(|c| c.number.trim() == number) {
            continue;
        }
        ordered.push(contact.clone());
    }
    ordered
}

/// Telephony
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Place a call; resolves once the call is ringing
    async fn dial(&self, contact: &EmergencyContact) -> Result<()>;

    /// Send a text alert to a contact
    async fn send_alert(&self, _contact: &EmergencyContact, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Alert raised on the device while an emergency is active
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertSignal {
    Started { episode_id: Uuid, reason: String },
    Cleared { episode_id: Uuid },
}

/// Device alerting (notification, flashlight, vibration); fire-and-forget
pub trait NotificationChannel: Send + Sync {
    fn signal(&self, signal: AlertSignal);
}

/// Notification channel that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationChannel for LogNotifier {
    fn signal(&self, signal: AlertSignal) {
        match signal {
            AlertSignal::Started { episode_id, reason } => {
                tracing::warn!(%episode_id, reason = %reason, "emergency alert raised");
            }
            AlertSignal::Cleared { episode_id } => {
                tracing::info!(%episode_id, "emergency alert cleared");
            }
        }
    }
}
