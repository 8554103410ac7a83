//! `may_minihttp` front end.

use super::api::Api;
use crate::store::Backend;
use may::coroutine::JoinHandle;
use may_minihttp::{HttpServer, HttpService, Request, Response};
use std::io::{self, Read};
use std::net::ToSocketAddrs;
use std::sync::Arc;

/// Adapts an [`Api`] to `may_minihttp`. Each connection gets a clone; all
/// clones share one `Api`.
pub struct HttpApi<B: Backend> {
    api: Arc<Api<B>>,
}

impl<B: Backend> Clone for HttpApi<B> {
    fn clone(&self) -> Self {
        HttpApi {
            api: Arc::clone(&self.api),
        }
    }
}

impl<B: Backend> HttpApi<B> {
    pub fn new(api: Api<B>) -> Self {
        HttpApi { api: Arc::new(api) }
    }
}

impl<B: Backend> HttpService for HttpApi<B> {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let method = req.method().to_owned();
        let target = req.path().to_owned();
        let mut body = Vec::new();
        req.body().read_to_end(&mut body)?;

        let response = self.api.handle(&method, &target, &body);

        res.status_code(response.status.into(), reason(response.status));
        res.header(response.content_type);
        res.body_mut().extend_from_slice(&response.body);
        Ok(())
    }
}

/// Start serving `api` on `addr`. Join the handle to block until the
/// server stops.
///
/// # Errors
///
/// Returns the bind error if the listener cannot be opened.
pub fn serve<B: Backend, A: ToSocketAddrs>(api: Api<B>, addr: A) -> io::Result<JoinHandle<()>> {
    HttpServer(HttpApi::new(api)).start(addr)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
