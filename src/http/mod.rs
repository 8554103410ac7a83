//! HTTP surface: route table, request handling, and the server adapter.

pub mod api;
pub mod router;
pub mod server;

pub use api::{Api, ApiResponse};
pub use router::{Method, Operation, Router};
pub use server::{serve, HttpApi};
