//! Static route table.
//!
//! Built once at startup. A path that matches no pattern is `NotFound`; a
//! path that matches but not for the request's verb is `MethodNotAllowed`.
//! When several patterns match, the one with the fewest parameters wins, so
//! `/inventory/alerts` never reaches `/inventory/{id}`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Products,
    Stores,
    Inventory,
}

/// Generic resource operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Get,
    Create,
    Update,
    SetActive,
    Delete,
}

/// The read and append operations of the movement log. Movements are
/// written by the ledger only and never change, so there is no update or
/// delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementAction {
    List,
    Get,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Health,
    Metrics,
    Resource(Collection, Action),
    Movement(MovementAction),
    Transfer,
    StockAlerts,
    StoreInventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Literal(&'static str),
    Param,
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<Segment>,
    operation: Operation,
}

impl Route {
    fn new(method: Method, pattern: &'static str, operation: Operation) -> Self {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s)
                }
            })
            .collect();
        Route {
            method,
            segments,
            operation,
        }
    }

    fn params(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param))
            .count()
    }

    /// Captured parameters if `path` fits this pattern.
    fn capture<'p>(&self, path: &[&'p str]) -> Option<Vec<&'p str>> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param => params.push(*part),
            }
        }
        Some(params)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteMatch<'p> {
    Found {
        operation: Operation,
        params: Vec<&'p str>,
    },
    MethodNotAllowed {
        allowed: Vec<Method>,
    },
    NotFound,
}

#[derive(Debug, Clone)]
pub struct Router {
    base: Vec<String>,
    routes: Vec<Route>,
}

impl Router {
    /// Build the table, mounted under `base_path` (empty for the root).
    pub fn new(base_path: &str) -> Self {
        let mut routes = vec![Route::new(Method::Get, "/health", Operation::Health)];
        if cfg!(feature = "metrics") {
            routes.push(Route::new(Method::Get, "/metrics", Operation::Metrics));
        }

        for (collection, path, item) in [
            (Collection::Products, "/products", "/products/{id}"),
            (Collection::Stores, "/stores", "/stores/{id}"),
            (Collection::Inventory, "/inventory", "/inventory/{id}"),
        ] {
            let op = |action| Operation::Resource(collection, action);
            routes.extend([
                Route::new(Method::Get, path, op(Action::List)),
                Route::new(Method::Post, path, op(Action::Create)),
                Route::new(Method::Get, item, op(Action::Get)),
                Route::new(Method::Put, item, op(Action::Update)),
                Route::new(Method::Patch, item, op(Action::SetActive)),
                Route::new(Method::Delete, item, op(Action::Delete)),
            ]);
        }

        routes.extend([
            Route::new(Method::Get, "/movements", Operation::Movement(MovementAction::List)),
            Route::new(Method::Post, "/movements", Operation::Movement(MovementAction::Record)),
            Route::new(Method::Get, "/movements/{id}", Operation::Movement(MovementAction::Get)),
            Route::new(Method::Post, "/inventory/transfer", Operation::Transfer),
            Route::new(Method::Get, "/inventory/alerts", Operation::StockAlerts),
            Route::new(Method::Get, "/stores/{id}/inventory", Operation::StoreInventory),
        ]);

        Router {
            base: split(base_path).map(str::to_string).collect(),
            routes,
        }
    }

    /// `method` is `None` for verbs the service does not serve at all.
    pub fn resolve<'p>(&self, method: Option<Method>, path: &'p str) -> RouteMatch<'p> {
        let parts: Vec<&str> = split(path).collect();
        if parts.len() < self.base.len()
            || parts.iter().zip(&self.base).any(|(part, base)| *part != base.as_str())
        {
            return RouteMatch::NotFound;
        }
        let parts = &parts[self.base.len()..];

        let candidates: Vec<(&Route, Vec<&'p str>)> = self
            .routes
            .iter()
            .filter_map(|route| route.capture(parts).map(|params| (route, params)))
            .collect();
        let Some(fewest) = candidates.iter().map(|(route, _)| route.params()).min() else {
            return RouteMatch::NotFound;
        };

        let mut allowed = Vec::new();
        for (route, params) in candidates {
            if route.params() != fewest {
                continue;
            }
            if Some(route.method) == method {
                return RouteMatch::Found {
                    operation: route.operation,
                    params,
                };
            }
            allowed.push(route.method);
        }
        RouteMatch::MethodNotAllowed { allowed }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found(router: &Router, method: Method, path: &str) -> Operation {
        match router.resolve(Some(method), path) {
            RouteMatch::Found { operation, .. } => operation,
            other => panic!("{method} {path} resolved to {other:?}"),
        }
    }

    #[test]
    fn test_resource_routes() {
        let router = Router::new("");
        assert_eq!(
            found(&router, Method::Get, "/products"),
            Operation::Resource(Collection::Products, Action::List)
        );
        assert_eq!(
            found(&router, Method::Patch, "/stores/abc"),
            Operation::Resource(Collection::Stores, Action::SetActive)
        );
        assert_eq!(
            found(&router, Method::Delete, "/inventory/abc/"),
            Operation::Resource(Collection::Inventory, Action::Delete)
        );
    }

    #[test]
    fn test_literal_beats_parameter() {
        let router = Router::new("");
        assert_eq!(
            found(&router, Method::Get, "/inventory/alerts"),
            Operation::StockAlerts
        );
        assert_eq!(
            found(&router, Method::Post, "/inventory/transfer"),
            Operation::Transfer
        );
        assert_eq!(
            router.resolve(Some(Method::Get), "/inventory/transfer"),
            RouteMatch::MethodNotAllowed {
                allowed: vec![Method::Post]
            }
        );
    }

    #[test]
    fn test_params_are_captured() {
        let router = Router::new("");
        match router.resolve(Some(Method::Get), "/stores/s-1/inventory") {
            RouteMatch::Found { operation, params } => {
                assert_eq!(operation, Operation::StoreInventory);
                assert_eq!(params, vec!["s-1"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_movement_routes() {
        let router = Router::new("");
        assert_eq!(
            found(&router, Method::Get, "/movements"),
            Operation::Movement(MovementAction::List)
        );
        assert_eq!(
            found(&router, Method::Post, "/movements"),
            Operation::Movement(MovementAction::Record)
        );
        assert_eq!(
            found(&router, Method::Get, "/movements/abc"),
            Operation::Movement(MovementAction::Get)
        );
    }

    #[test]
    fn test_movements_are_immutable() {
        let router = Router::new("");
        for method in [Method::Put, Method::Patch, Method::Delete] {
            assert_eq!(
                router.resolve(Some(method), "/movements/abc"),
                RouteMatch::MethodNotAllowed {
                    allowed: vec![Method::Get]
                }
            );
        }
    }

    #[test]
    fn test_unknown_path_and_verb() {
        let router = Router::new("");
        assert_eq!(
            router.resolve(Some(Method::Get), "/warehouses"),
            RouteMatch::NotFound
        );
        assert!(matches!(
            router.resolve(None, "/products"),
            RouteMatch::MethodNotAllowed { .. }
        ));
    }

    #[test]
    fn test_base_path() {
        let router = Router::new("/api/v1");
        assert_eq!(found(&router, Method::Get, "/api/v1/health"), Operation::Health);
        assert_eq!(
            router.resolve(Some(Method::Get), "/health"),
            RouteMatch::NotFound
        );
        assert_eq!(
            router.resolve(Some(Method::Get), "/api/v2/health"),
            RouteMatch::NotFound
        );
    }
}
