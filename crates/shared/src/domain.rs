use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(ShipmentId);
id_newtype!(UserId);
id_newtype!(TrackingNumber);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    Pending,
    #[serde(rename = "In Transit")]
    InTransit,
    #[serde(rename = "Picked Up")]
    PickedUp,
    #[serde(rename = "Handover Requested")]
    HandoverRequested,
    Delivered,
    Delayed,
    Cancelled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 7] = [
        ShipmentStatus::Pending,
        ShipmentStatus::InTransit,
        ShipmentStatus::PickedUp,
        ShipmentStatus::HandoverRequested,
        ShipmentStatus::Delivered,
        ShipmentStatus::Delayed,
        ShipmentStatus::Cancelled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "Pending",
            ShipmentStatus::InTransit => "In Transit",
            ShipmentStatus::PickedUp => "Picked Up",
            ShipmentStatus::HandoverRequested => "Handover Requested",
            ShipmentStatus::Delivered => "Delivered",
            ShipmentStatus::Delayed => "Delayed",
            ShipmentStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown shipment status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ShipmentStatus::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Session role carried in the token's `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Driver,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver => "driver",
            Role::Admin => "admin",
            Role::SuperAdmin => "superAdmin",
        }
    }

    pub fn is_staff(self) -> bool {
        match self {
            Role::Driver => false,
            Role::Admin | Role::SuperAdmin => true,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "driver" => Ok(Role::Driver),
            "admin" => Ok(Role::Admin),
            "superAdmin" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub status: ShipmentStatus,
    #[serde(default)]
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    #[serde(rename = "_id")]
    pub id: ShipmentId,
    pub tracking_number: TrackingNumber,
    pub status: ShipmentStatus,
    pub sender: Party,
    pub recipient: Party,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub pickup_requested: bool,
    #[serde(default)]
    pub pickup_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_notes: Option<String>,
    #[serde(default)]
    pub handover_requested: bool,
    #[serde(default)]
    pub handover_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handover_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handover_notes: Option<String>,
    #[serde(default)]
    pub tracking_history: Vec<TrackingEvent>,
}

impl Shipment {
    /// Newest tracking event; history is append-only, oldest first.
    pub fn latest_event(&self) -> Option<&TrackingEvent> {
        self.tracking_history.last()
    }

    pub fn history_is_consistent(&self) -> bool {
        self.latest_event()
            .map_or(true, |event| event.status == self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    #[serde(rename = "userID", alias = "_id")]
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_through_from_str() {
        for status in ShipmentStatus::ALL {
            assert_eq!(status.label().parse::<ShipmentStatus>(), Ok(status));
        }
        assert_eq!("in transit".parse::<ShipmentStatus>(), Ok(ShipmentStatus::InTransit));
        assert!("Lost".parse::<ShipmentStatus>().is_err());
    }

    #[test]
    fn status_uses_display_labels_on_the_wire() {
        let json = serde_json::to_string(&ShipmentStatus::HandoverRequested).expect("encode");
        assert_eq!(json, "\"Handover Requested\"");
    }

    #[test]
    fn role_parsing_rejects_unrecognized_values() {
        assert_eq!("driver".parse::<Role>(), Ok(Role::Driver));
        assert_eq!("superAdmin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!(
            "Driver".parse::<Role>(),
            Err(UnknownRole("Driver".to_string()))
        );
        assert!("customer".parse::<Role>().is_err());
        assert!(Role::SuperAdmin.is_staff());
        assert!(!Role::Driver.is_staff());
    }

    #[test]
    fn shipment_decodes_backend_shape_with_missing_flags() {
        let raw = serde_json::json!({
            "_id": "64ab",
            "trackingNumber": "TRK-1",
            "status": "Picked Up",
            "sender": { "name": "Ann" },
            "recipient": { "name": "Bo", "address": "1 Main St" },
            "destination": "Branch North",
            "trackingHistory": [
                { "status": "In Transit", "location": "Depot", "timestamp": "2024-05-01T08:00:00Z" },
                { "status": "Picked Up", "location": "Sender", "timestamp": "2024-05-01T09:30:00Z" }
            ]
        });
        let shipment: Shipment = serde_json::from_value(raw).expect("decode");
        assert_eq!(shipment.status, ShipmentStatus::PickedUp);
        assert!(!shipment.handover_requested);
        assert!(shipment.history_is_consistent());
        assert_eq!(
            shipment.latest_event().map(|e| e.location.as_str()),
            Some("Sender")
        );
    }

    #[test]
    fn history_mismatch_is_reported() {
        let raw = serde_json::json!({
            "_id": "1",
            "trackingNumber": "TRK-2",
            "status": "Delivered",
            "sender": { "name": "Ann" },
            "recipient": { "name": "Bo" },
            "trackingHistory": [
                { "status": "In Transit", "timestamp": "2024-05-01T08:00:00Z" }
            ]
        });
        let shipment: Shipment = serde_json::from_value(raw).expect("decode");
        assert!(!shipment.history_is_consistent());
    }
}
