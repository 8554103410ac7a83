use super::{ListFilter, Resource};
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "TRANSFER")]
    Transfer,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Transfer => "TRANSFER",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            "TRANSFER" => Ok(MovementType::Transfer),
            _ => Err(ApiError::Validation(format!(
                "type must be one of IN, OUT, TRANSFER, got '{s}'"
            ))),
        }
    }
}

/// Immutable audit entry for one committed inventory change.
///
/// For `IN` and `OUT` the single affected store is recorded as both source
/// and target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub source_store_id: Uuid,
    pub target_store_id: Uuid,
    pub quantity: i32,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub timestamp: DateTime<Utc>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Movement {
    pub fn from_new(id: Uuid, new: &NewMovement, now: DateTime<Utc>) -> Self {
        Movement {
            id,
            product_id: new.product_id,
            source_store_id: new.source_store_id,
            target_store_id: new.target_store_id,
            quantity: new.quantity,
            movement_type: new.movement_type,
            timestamp: now,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Resource for Movement {
    const NAME: &'static str = "movement";

    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn matches(&self, filter: &ListFilter) -> bool {
        filter.product_id.map_or(true, |id| self.product_id == id)
            && filter
                .store_id
                .map_or(true, |id| self.source_store_id == id || self.target_store_id == id)
            && filter
                .movement_type
                .map_or(true, |kind| self.movement_type == kind)
    }
}

/// A movement joined with the names of its product and both stores.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementDetail {
    #[serde(flatten)]
    pub movement: Movement,
    pub product_name: String,
    pub source_store_name: String,
    pub target_store_name: String,
}

/// A movement about to be appended by the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub source_store_id: Uuid,
    pub target_store_id: Uuid,
    pub quantity: i32,
    pub movement_type: MovementType,
}

/// Body of `POST /inventory/transfer`. Both camelCase and snake_case keys are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(alias = "product_id")]
    pub product_id: Uuid,
    #[serde(alias = "source_store_id")]
    pub source_store_id: Uuid,
    #[serde(alias = "target_store_id")]
    pub target_store_id: Uuid,
    pub quantity: i64,
}

/// Body of `POST /movements`.
///
/// `IN` needs `targetStoreId`, `OUT` needs `sourceStoreId`, `TRANSFER` needs
/// both.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRequest {
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub product_id: Uuid,
    #[serde(default)]
    pub source_store_id: Option<Uuid>,
    #[serde(default)]
    pub target_store_id: Option<Uuid>,
    pub quantity: i64,
}
