//! Inventory ledger.
//!
//! The only writer of movements and the only place where stock moves between
//! rows. Every operation is planned and validated first, without touching
//! storage, then executed inside one [`LedgerUnit`]: it commits as a whole
//! or rolls back as a whole.
//!
//! A transfer locks the source and target rows in store-id order, checks
//! the source quantity, debits it, credits the target (creating the row with
//! the configured minimum stock if needed) and appends a `TRANSFER`
//! movement. Receipts (`IN`) and dispatches (`OUT`) follow the same protocol
//! for a single store.

use crate::error::ApiError;
use crate::model::{Movement, MovementRequest, MovementType, NewMovement, TransferRequest};
use crate::store::{Backend, LedgerUnit};
use std::sync::Arc;
use uuid::Uuid;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// A validated ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Posting {
    Transfer {
        product_id: Uuid,
        source_store_id: Uuid,
        target_store_id: Uuid,
        quantity: i32,
    },
    Receive {
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
    },
    Dispatch {
        product_id: Uuid,
        store_id: Uuid,
        quantity: i32,
    },
}

impl Posting {
    /// # Errors
    ///
    /// Returns `ApiError::Validation` for a non-positive or oversized
    /// quantity, or when source and target are the same store.
    pub fn transfer(request: &TransferRequest) -> Result<Self, ApiError> {
        let quantity = checked_quantity(request.quantity)?;
        if request.source_store_id == request.target_store_id {
            return Err(ApiError::Validation(
                "sourceStoreId and targetStoreId must differ".into(),
            ));
        }
        Ok(Posting::Transfer {
            product_id: request.product_id,
            source_store_id: request.source_store_id,
            target_store_id: request.target_store_id,
            quantity,
        })
    }

    /// Plan a `POST /movements` request.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Validation` when the quantity is invalid or a store
    /// id required by the movement type is missing.
    pub fn from_request(request: &MovementRequest) -> Result<Self, ApiError> {
        let store = |id: Option<Uuid>, field: &str| {
            id.ok_or_else(|| {
                ApiError::Validation(format!(
                    "{field} is required for {} movements",
                    request.movement_type
                ))
            })
        };

        match request.movement_type {
            MovementType::Transfer => Posting::transfer(&TransferRequest {
                product_id: request.product_id,
                source_store_id: store(request.source_store_id, "sourceStoreId")?,
                target_store_id: store(request.target_store_id, "targetStoreId")?,
                quantity: request.quantity,
            }),
            MovementType::In => Ok(Posting::Receive {
                product_id: request.product_id,
                store_id: store(request.target_store_id, "targetStoreId")?,
                quantity: checked_quantity(request.quantity)?,
            }),
            MovementType::Out => Ok(Posting::Dispatch {
                product_id: request.product_id,
                store_id: store(request.source_store_id, "sourceStoreId")?,
                quantity: checked_quantity(request.quantity)?,
            }),
        }
    }

    pub fn movement_type(&self) -> MovementType {
        match self {
            Posting::Transfer { .. } => MovementType::Transfer,
            Posting::Receive { .. } => MovementType::In,
            Posting::Dispatch { .. } => MovementType::Out,
        }
    }
}

/// Quantities travel as JSON integers; only `1..=i32::MAX` is storable.
fn checked_quantity(quantity: i64) -> Result<i32, ApiError> {
    if quantity <= 0 {
        return Err(ApiError::Validation(format!(
            "quantity must be a positive integer, got {quantity}"
        )));
    }
    i32::try_from(quantity)
        .map_err(|_| ApiError::Validation(format!("quantity {quantity} is too large")))
}

pub struct Ledger<B: Backend> {
    backend: Arc<B>,
    default_min_stock: i32,
}

impl<B: Backend> Ledger<B> {
    /// `default_min_stock` is given to inventory rows the ledger creates.
    pub fn new(backend: Arc<B>, default_min_stock: i32) -> Self {
        Self {
            backend,
            default_min_stock,
        }
    }

    /// Move stock of one product between two stores.
    ///
    /// # Errors
    ///
    /// `Validation` before any I/O; `NotFound` for an absent or inactive
    /// product or store; `InsufficientStock` when the source holds too
    /// little; `Conflict` when a row lock could not be obtained in time;
    /// `Storage` otherwise. Nothing is written on error.
    pub fn transfer(&self, request: &TransferRequest) -> Result<Movement, ApiError> {
        self.post(Posting::transfer(request)?)
    }

    /// Add stock to a store (`IN`).
    ///
    /// # Errors
    ///
    /// As [`Ledger::transfer`], except that stock is never insufficient.
    pub fn receive(
        &self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i64,
    ) -> Result<Movement, ApiError> {
        self.post(Posting::Receive {
            product_id,
            store_id,
            quantity: checked_quantity(quantity)?,
        })
    }

    /// Remove stock from a store (`OUT`).
    ///
    /// # Errors
    ///
    /// As [`Ledger::transfer`].
    pub fn dispatch(
        &self,
        product_id: Uuid,
        store_id: Uuid,
        quantity: i64,
    ) -> Result<Movement, ApiError> {
        self.post(Posting::Dispatch {
            product_id,
            store_id,
            quantity: checked_quantity(quantity)?,
        })
    }

    /// Entry point of `POST /movements`.
    ///
    /// # Errors
    ///
    /// As [`Ledger::transfer`].
    pub fn record(&self, request: &MovementRequest) -> Result<Movement, ApiError> {
        self.post(Posting::from_request(request)?)
    }

    /// Execute a validated posting in its own unit.
    ///
    /// # Errors
    ///
    /// As [`Ledger::transfer`].
    pub fn post(&self, posting: Posting) -> Result<Movement, ApiError> {
        let kind = posting.movement_type();

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::ledger_span(kind.as_str()).entered();

        let result = self.run(&posting);

        #[cfg(feature = "metrics")]
        METRICS.record_ledger(
            kind.as_str(),
            result.as_ref().map_or_else(ApiError::kind, |_| "committed"),
        );

        match &result {
            Ok(movement) => log::info!(
                "{kind} committed: movement={} product={} source={} target={} quantity={}",
                movement.id,
                movement.product_id,
                movement.source_store_id,
                movement.target_store_id,
                movement.quantity
            ),
            Err(err @ ApiError::Storage(_)) => log::error!("{kind} failed: {err}"),
            Err(err @ ApiError::Conflict(_)) => log::warn!("{kind} aborted: {err}"),
            Err(err) => log::debug!("{kind} rejected: {err}"),
        }
        result
    }

    fn run(&self, posting: &Posting) -> Result<Movement, ApiError> {
        let mut unit = self.backend.begin()?;
        match self.apply(&mut unit, posting) {
            Ok(movement) => {
                unit.commit()?;
                Ok(movement)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback() {
                    log::warn!("rollback after failed {} failed: {rollback_err}", posting.movement_type());
                }
                Err(err)
            }
        }
    }

    fn apply<U: LedgerUnit>(&self, unit: &mut U, posting: &Posting) -> Result<Movement, ApiError> {
        match *posting {
            Posting::Transfer {
                product_id,
                source_store_id,
                target_store_id,
                quantity,
            } => {
                require_product(unit, product_id)?;
                require_store(unit, source_store_id)?;
                require_store(unit, target_store_id)?;

                let locked = unit.lock_stock(product_id, &[source_store_id, target_store_id])?;
                take(unit, &locked, product_id, source_store_id, quantity)?;
                unit.credit(product_id, target_store_id, quantity, self.default_min_stock)?;

                Ok(unit.append_movement(&NewMovement {
                    product_id,
                    source_store_id,
                    target_store_id,
                    quantity,
                    movement_type: MovementType::Transfer,
                })?)
            }
            Posting::Receive {
                product_id,
                store_id,
                quantity,
            } => {
                require_product(unit, product_id)?;
                require_store(unit, store_id)?;

                unit.lock_stock(product_id, &[store_id])?;
                unit.credit(product_id, store_id, quantity, self.default_min_stock)?;

                Ok(unit.append_movement(&NewMovement {
                    product_id,
                    source_store_id: store_id,
                    target_store_id: store_id,
                    quantity,
                    movement_type: MovementType::In,
                })?)
            }
            Posting::Dispatch {
                product_id,
                store_id,
                quantity,
            } => {
                require_product(unit, product_id)?;
                require_store(unit, store_id)?;

                let locked = unit.lock_stock(product_id, &[store_id])?;
                take(unit, &locked, product_id, store_id, quantity)?;

                Ok(unit.append_movement(&NewMovement {
                    product_id,
                    source_store_id: store_id,
                    target_store_id: store_id,
                    quantity,
                    movement_type: MovementType::Out,
                })?)
            }
        }
    }
}

fn require_product<U: LedgerUnit>(unit: &mut U, product_id: Uuid) -> Result<(), ApiError> {
    if unit.product_is_active(product_id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("product", product_id))
    }
}

fn require_store<U: LedgerUnit>(unit: &mut U, store_id: Uuid) -> Result<(), ApiError> {
    if unit.store_is_active(store_id)? {
        Ok(())
    } else {
        Err(ApiError::not_found("store", store_id))
    }
}

/// Debit a locked row, refusing to go below zero.
fn take<U: LedgerUnit>(
    unit: &mut U,
    locked: &[(Uuid, i32)],
    product_id: Uuid,
    store_id: Uuid,
    quantity: i32,
) -> Result<(), ApiError> {
    let available = locked
        .iter()
        .find(|(store, _)| *store == store_id)
        .map_or(0, |(_, qty)| *qty);
    if available < quantity || !unit.debit(product_id, store_id, quantity)? {
        return Err(ApiError::InsufficientStock {
            requested: quantity,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        InventoryDraft, InventoryRecord, ListFilter, Product, ProductDraft, Store, StoreDraft,
    };
    use crate::store::{EditableRepository, MemoryBackend, Repository};
    use rust_decimal::Decimal;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        ledger: Ledger<MemoryBackend>,
        product: Uuid,
        a: Uuid,
        b: Uuid,
    }

    fn fixture(stock_at_a: i32) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let product = EditableRepository::<Product>::create(
            backend.as_ref(),
            ProductDraft {
                name: "Widget".into(),
                description: String::new(),
                category: "parts".into(),
                price: Decimal::new(150, 2),
                sku: "W-1".into(),
            },
        )
        .unwrap()
        .id;
        let mut stores = ["A", "B"].map(|name| {
            EditableRepository::<Store>::create(
                backend.as_ref(),
                StoreDraft {
                    name: name.into(),
                    address: String::new(),
                    phone: String::new(),
                },
            )
            .unwrap()
            .id
        });
        stores.sort();
        let [a, b] = stores;
        EditableRepository::<InventoryRecord>::create(
            backend.as_ref(),
            InventoryDraft {
                product_id: product,
                store_id: a,
                quantity: stock_at_a,
                min_stock: 5,
            },
        )
        .unwrap();
        Fixture {
            ledger: Ledger::new(backend.clone(), 7),
            backend,
            product,
            a,
            b,
        }
    }

    fn quantity_at(f: &Fixture, store: Uuid) -> Option<InventoryRecord> {
        Repository::<InventoryRecord>::list(
            f.backend.as_ref(),
            &ListFilter {
                product_id: Some(f.product),
                store_id: Some(store),
                ..ListFilter::default()
            },
        )
        .unwrap()
        .into_iter()
        .next()
    }

    fn request(f: &Fixture, quantity: i64) -> TransferRequest {
        TransferRequest {
            product_id: f.product,
            source_store_id: f.a,
            target_store_id: f.b,
            quantity,
        }
    }

    #[test]
    fn test_checked_quantity() {
        assert_eq!(checked_quantity(1).unwrap(), 1);
        assert!(checked_quantity(0).is_err());
        assert!(checked_quantity(-4).is_err());
        assert!(checked_quantity(i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn test_plan_rejects_same_store() {
        let store = Uuid::new_v4();
        let err = Posting::transfer(&TransferRequest {
            product_id: Uuid::new_v4(),
            source_store_id: store,
            target_store_id: store,
            quantity: 1,
        })
        .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_plan_from_request_requires_stores() {
        let request = MovementRequest {
            movement_type: MovementType::Out,
            product_id: Uuid::new_v4(),
            source_store_id: None,
            target_store_id: Some(Uuid::new_v4()),
            quantity: 3,
        };
        let err = Posting::from_request(&request).unwrap_err();
        assert!(err.to_string().contains("sourceStoreId"));

        let request = MovementRequest {
            movement_type: MovementType::In,
            ..request
        };
        assert!(matches!(
            Posting::from_request(&request).unwrap(),
            Posting::Receive { quantity: 3, .. }
        ));
    }

    #[test]
    fn test_transfer_creates_target_with_default_min_stock() {
        let f = fixture(100);
        let movement = f.ledger.transfer(&request(&f, 40)).unwrap();
        assert_eq!(movement.movement_type, MovementType::Transfer);
        assert_eq!(movement.quantity, 40);

        assert_eq!(quantity_at(&f, f.a).unwrap().quantity, 60);
        let target = quantity_at(&f, f.b).unwrap();
        assert_eq!(target.quantity, 40);
        assert_eq!(target.min_stock, 7);
    }

    #[test]
    fn test_insufficient_stock_changes_nothing() {
        let f = fixture(30);
        let err = f.ledger.transfer(&request(&f, 50)).unwrap_err();
        assert!(matches!(
            err,
            ApiError::InsufficientStock {
                requested: 50,
                available: 30
            }
        ));
        assert_eq!(quantity_at(&f, f.a).unwrap().quantity, 30);
        assert!(quantity_at(&f, f.b).is_none());
        assert!(Repository::<Movement>::list(f.backend.as_ref(), &ListFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_transfer_from_store_without_row() {
        let f = fixture(10);
        let err = f
            .ledger
            .transfer(&TransferRequest {
                product_id: f.product,
                source_store_id: f.b,
                target_store_id: f.a,
                quantity: 1,
            })
            .unwrap_err();
        assert!(matches!(err, ApiError::InsufficientStock { available: 0, .. }));
    }

    #[test]
    fn test_inactive_store_is_not_found() {
        let f = fixture(10);
        EditableRepository::<Store>::delete(f.backend.as_ref(), f.b).unwrap();
        let err = f.ledger.transfer(&request(&f, 1)).unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(quantity_at(&f, f.a).unwrap().quantity, 10);
    }

    #[test]
    fn test_receive_and_dispatch() {
        let f = fixture(10);
        let received = f.ledger.receive(f.product, f.b, 5).unwrap();
        assert_eq!(received.movement_type, MovementType::In);
        assert_eq!(received.source_store_id, f.b);
        assert_eq!(quantity_at(&f, f.b).unwrap().quantity, 5);

        let dispatched = f.ledger.dispatch(f.product, f.a, 10).unwrap();
        assert_eq!(dispatched.movement_type, MovementType::Out);
        assert_eq!(quantity_at(&f, f.a).unwrap().quantity, 0);

        let err = f.ledger.dispatch(f.product, f.a, 1).unwrap_err();
        assert_eq!(err.kind(), "InsufficientStock");
    }
}
