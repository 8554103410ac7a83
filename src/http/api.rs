//! Request handling, independent of the HTTP server.
//!
//! [`Api::handle`] takes a method, a request target and a body, and always
//! produces an [`ApiResponse`]. Errors become JSON bodies here; nothing above
//! this layer inspects them.

use super::router::{Action, Collection, Method, MovementAction, Operation, RouteMatch, Router};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::model::{
    parse_id, Editable, InventoryDetail, InventoryRecord, ListFilter, Movement, MovementDetail,
    MovementRequest, Product, Resource, Store, TransferRequest,
};
use crate::store::{Backend, DetailRepository, EditableRepository, Repository};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const JSON: &str = "Content-Type: application/json";

/// A response ready to be written by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Complete `Content-Type` header line.
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// # Errors
    ///
    /// Returns `ApiError::Storage` if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self, ApiError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| ApiError::Storage(format!("response serialization failed: {e}")))?;
        Ok(ApiResponse {
            status,
            content_type: JSON,
            body,
        })
    }

    pub fn no_content() -> Self {
        ApiResponse {
            status: 204,
            content_type: JSON,
            body: Vec::new(),
        }
    }

    pub fn error(err: &ApiError) -> Self {
        ApiResponse {
            status: err.status(),
            content_type: JSON,
            body: err.body().to_string().into_bytes(),
        }
    }

    /// Body parsed as JSON, for tests and clients.
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

/// Body of `PATCH /{collection}/{id}`.
#[derive(Debug, Deserialize)]
struct ActiveFlag {
    active: bool,
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError::Validation(format!("invalid request body: {e}")))
}

fn path_id(params: &[&str]) -> Result<Uuid, ApiError> {
    let raw = params.first().copied().unwrap_or_default();
    parse_id("id", raw)
}

#[cfg(feature = "metrics")]
fn metrics_response() -> Result<ApiResponse, ApiError> {
    Ok(ApiResponse {
        status: 200,
        content_type: "Content-Type: text/plain; version=0.0.4",
        body: crate::metrics::render(),
    })
}

#[cfg(not(feature = "metrics"))]
fn metrics_response() -> Result<ApiResponse, ApiError> {
    Err(ApiError::NotFound("metrics are disabled".into()))
}

/// Router, backend and ledger wired together. Shared by every connection.
pub struct Api<B: Backend> {
    backend: Arc<B>,
    ledger: Ledger<B>,
    router: Router,
}

impl<B: Backend> Api<B> {
    pub fn new(backend: B, config: &AppConfig) -> Self {
        Self::with_options(
            Arc::new(backend),
            &config.server.base_path,
            config.inventory.default_min_stock,
        )
    }

    pub fn with_options(backend: Arc<B>, base_path: &str, default_min_stock: i32) -> Self {
        Api {
            ledger: Ledger::new(backend.clone(), default_min_stock),
            backend,
            router: Router::new(base_path),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn ledger(&self) -> &Ledger<B> {
        &self.ledger
    }

    /// Serve one request. `target` is the request path, optionally followed
    /// by `?query`.
    pub fn handle(&self, method: &str, target: &str, body: &[u8]) -> ApiResponse {
        let start = Instant::now();
        let (path, query) = target.split_once('?').unwrap_or((target, ""));

        let response = match self.dispatch(method, path, query, body) {
            Ok(response) => response,
            Err(err) => {
                if let ApiError::Storage(detail) = &err {
                    log::error!("{method} {path} failed: {detail}");
                }
                ApiResponse::error(&err)
            }
        };

        log::info!(
            "{method} {path} -> {} in {:?}",
            response.status,
            start.elapsed()
        );
        #[cfg(feature = "metrics")]
        METRICS.record_http(
            Method::parse(method).map_or("OTHER", Method::as_str),
            response.status,
        );

        response
    }

    fn dispatch(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &[u8],
    ) -> Result<ApiResponse, ApiError> {
        match self.router.resolve(Method::parse(method), path) {
            RouteMatch::Found { operation, params } => {
                self.execute(operation, &params, query, body)
            }
            RouteMatch::MethodNotAllowed { allowed } => {
                let allowed: Vec<&str> = allowed.iter().map(|m| m.as_str()).collect();
                Err(ApiError::MethodNotAllowed(format!(
                    "{method} {path} (allowed: {})",
                    allowed.join(", ")
                )))
            }
            RouteMatch::NotFound => Err(ApiError::NotFound(format!("no route for {path}"))),
        }
    }

    fn execute(
        &self,
        operation: Operation,
        params: &[&str],
        query: &str,
        body: &[u8],
    ) -> Result<ApiResponse, ApiError> {
        match operation {
            Operation::Health => {
                self.backend.health()?;
                ApiResponse::json(200, &json!({ "status": "ok" }))
            }
            Operation::Metrics => metrics_response(),
            Operation::Transfer => {
                let request: TransferRequest = parse_body(body)?;
                let movement = self.ledger.transfer(&request)?;
                ApiResponse::json(
                    200,
                    &json!({ "message": "transfer completed", "movement": movement }),
                )
            }
            Operation::StockAlerts => ApiResponse::json(200, &self.backend.stock_alerts()?),
            Operation::StoreInventory => {
                let store_id = path_id(params)?;
                ApiResponse::json(200, &self.backend.store_inventory(store_id)?)
            }
            Operation::Resource(collection, action) => match (collection, action) {
                (Collection::Products, _) => self.resource::<Product>(action, params, query, body),
                (Collection::Stores, _) => self.resource::<Store>(action, params, query, body),
                // Inventory reads carry product and store names.
                (Collection::Inventory, Action::List) => {
                    self.list_details::<InventoryDetail>(query)
                }
                (Collection::Inventory, Action::Get) => {
                    self.get_detail::<InventoryDetail>(InventoryRecord::NAME, params)
                }
                (Collection::Inventory, _) => {
                    self.resource::<InventoryRecord>(action, params, query, body)
                }
            },
            Operation::Movement(action) => match action {
                MovementAction::List => self.list_details::<MovementDetail>(query),
                MovementAction::Get => self.get_detail::<MovementDetail>(Movement::NAME, params),
                MovementAction::Record => {
                    let request: MovementRequest = parse_body(body)?;
                    ApiResponse::json(201, &self.ledger.record(&request)?)
                }
            },
        }
    }

    fn list_details<D>(&self, query: &str) -> Result<ApiResponse, ApiError>
    where
        D: Serialize,
        B: DetailRepository<D>,
    {
        let filter = ListFilter::from_query(query)?;
        let rows = DetailRepository::<D>::list_details(self.backend.as_ref(), &filter)?;
        ApiResponse::json(200, &rows)
    }

    fn get_detail<D>(&self, name: &str, params: &[&str]) -> Result<ApiResponse, ApiError>
    where
        D: Serialize,
        B: DetailRepository<D>,
    {
        let id = path_id(params)?;
        let row = DetailRepository::<D>::get_detail(self.backend.as_ref(), id)?
            .ok_or_else(|| ApiError::not_found(name, id))?;
        ApiResponse::json(200, &row)
    }

    fn resource<R>(
        &self,
        action: Action,
        params: &[&str],
        query: &str,
        body: &[u8],
    ) -> Result<ApiResponse, ApiError>
    where
        R: Editable,
        B: EditableRepository<R>,
    {
        let backend = self.backend.as_ref();
        match action {
            Action::List => {
                let filter = ListFilter::from_query(query)?;
                ApiResponse::json(200, &Repository::<R>::list(backend, &filter)?)
            }
            Action::Get => {
                let id = path_id(params)?;
                let row = Repository::<R>::get(backend, id)?
                    .ok_or_else(|| ApiError::not_found(R::NAME, id))?;
                ApiResponse::json(200, &row)
            }
            Action::Create => {
                let draft: R::Draft = parse_body(body)?;
                R::validate_draft(&draft)?;
                let row = EditableRepository::<R>::create(backend, draft)?;
                log::debug!("created {} {}", R::NAME, row.id());
                ApiResponse::json(201, &row)
            }
            Action::Update => {
                let id = path_id(params)?;
                let changes: R::Changes = parse_body(body)?;
                R::validate_changes(&changes)?;
                let row = EditableRepository::<R>::update(backend, id, changes)?
                    .ok_or_else(|| ApiError::not_found(R::NAME, id))?;
                ApiResponse::json(200, &row)
            }
            Action::SetActive => {
                let id = path_id(params)?;
                let flag: ActiveFlag = parse_body(body)?;
                let row = EditableRepository::<R>::set_active(backend, id, flag.active)?
                    .ok_or_else(|| ApiError::not_found(R::NAME, id))?;
                ApiResponse::json(200, &row)
            }
            Action::Delete => {
                let id = path_id(params)?;
                if !EditableRepository::<R>::delete(backend, id)? {
                    return Err(ApiError::not_found(R::NAME, id));
                }
                Ok(ApiResponse::no_content())
            }
        }
    }
}
