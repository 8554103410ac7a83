//! Resource types and the traits that let storage and HTTP code treat them
//! uniformly.
//!
//! Every resource is a [`Resource`]: it has an id, an active flag, and can be
//! matched against a [`ListFilter`]. Products, stores and inventory rows are
//! also [`Editable`]: they are created from a draft and updated from a set of
//! changes. Movements are not; only the ledger writes them.

pub mod inventory;
pub mod movement;
pub mod product;
pub mod store;

pub use inventory::{InventoryChanges, InventoryDetail, InventoryDraft, InventoryRecord, StockAlert};
pub use movement::{
    Movement, MovementDetail, MovementRequest, MovementType, NewMovement, TransferRequest,
};
pub use product::{Product, ProductDraft};
pub use store::{Store, StoreDraft};

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

/// Anything served by the generic list/get routes.
pub trait Resource: Clone + Serialize + Send + Sync + 'static {
    /// Singular noun used in messages, e.g. `"product"`.
    const NAME: &'static str;

    fn id(&self) -> Uuid;
    fn is_active(&self) -> bool;

    /// Whether `self` passes the list filter. Unknown criteria are ignored.
    fn matches(&self, filter: &ListFilter) -> bool;
}

/// A resource with a client-facing write path.
pub trait Editable: Resource {
    /// Body of `POST`.
    type Draft: DeserializeOwned + Send;
    /// Body of `PUT`.
    type Changes: DeserializeOwned + Send;

    fn validate_draft(draft: &Self::Draft) -> Result<(), ApiError>;
    fn validate_changes(changes: &Self::Changes) -> Result<(), ApiError>;

    /// Build a fresh active row. Used by backends that do not assign
    /// columns themselves.
    fn from_draft(id: Uuid, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    fn apply(&mut self, changes: Self::Changes, now: DateTime<Utc>);

    fn set_active(&mut self, active: bool, now: DateTime<Utc>);
}

/// Optional list criteria taken from the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub category: Option<String>,
    pub product_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
}

impl ListFilter {
    /// Parse `category`, `productId`, `storeId` and `type` from a raw query
    /// string. Other keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for a malformed id or movement type.
    pub fn from_query(query: &str) -> Result<Self, ApiError> {
        let mut filter = ListFilter::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "category" => filter.category = Some(value.into_owned()),
                "productId" | "product_id" => filter.product_id = Some(parse_id(&key, &value)?),
                "storeId" | "store_id" => filter.store_id = Some(parse_id(&key, &value)?),
                "type" => filter.movement_type = Some(value.parse()?),
                _ => {}
            }
        }
        Ok(filter)
    }
}

/// Parse a canonical UUID, naming `field` in the error.
///
/// # Errors
///
/// Returns `ApiError::Validation` when `value` is not a UUID.
pub fn parse_id(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value)
        .map_err(|_| ApiError::Validation(format!("{field} must be a valid UUID, got '{value}'")))
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) fn require_non_negative(field: &str, value: i32) -> Result<(), ApiError> {
    if value < 0 {
        return Err(ApiError::Validation(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(())
}
