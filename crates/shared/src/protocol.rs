use serde::{Deserialize, Serialize};

use crate::domain::{Driver, Shipment};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupRequest {
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverRequest {
    pub notes: String,
    pub branch_location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment: Option<Shipment>,
}

/// List endpoints answer either with a bare array or wrapped in an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ShipmentList {
    Bare(Vec<Shipment>),
    Wrapped { shipments: Vec<Shipment> },
}

impl ShipmentList {
    pub fn into_vec(self) -> Vec<Shipment> {
        match self {
            ShipmentList::Bare(shipments) | ShipmentList::Wrapped { shipments } => shipments,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DriverList {
    Bare(Vec<Driver>),
    Wrapped { drivers: Vec<Driver> },
}

impl DriverList {
    pub fn into_vec(self) -> Vec<Driver> {
        match self {
            DriverList::Bare(drivers) | DriverList::Wrapped { drivers } => drivers,
        }
    }
}
