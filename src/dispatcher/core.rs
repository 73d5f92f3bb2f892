//! Dispatcher core - the per-request state machine.

use crate::error::DispatchError;
use crate::registry::{SessionRequest, SessionResponse, SessionTable};
use crate::router::{PathRouter, Route};
use crate::server::request::{parse_request, ParsedRequest};
use crate::server::response::{write_response, HeaderBlocks, WireResponse};
use crate::server::ShutdownSignal;
use crate::static_files::{StatusPage, FAVICON, FAVICON_CONTENT_TYPE};
use http::Method;
use may_minihttp::{HttpService, Request, Response};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Body of every 500 response. Error details only go to the log.
pub const INTERNAL_ERROR_BODY: &str =
    "Internal Server Error caught by Dispatcher. See logs if available.";
/// Header block of a 500 that replaces a response whose headers cannot be written.
const INTERNAL_ERROR_HEADERS: &str = "content-type: text/plain; charset=utf-8";
/// Body of the shutdown acknowledgement.
pub const SHUTDOWN_BODY: &str = "Shutdown";

/// HTTP entry point: control routes plus forwarding to session applications.
///
/// Cheap to clone; may_minihttp clones the service once per connection.
#[derive(Clone)]
pub struct Dispatcher {
    router: PathRouter,
    table: Arc<SessionTable>,
    status_page: Arc<StatusPage>,
    shutdown: ShutdownSignal,
    header_blocks: Arc<HeaderBlocks>,
}

impl Dispatcher {
    pub fn new(
        router: PathRouter,
        table: Arc<SessionTable>,
        status_page: Arc<StatusPage>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            router,
            table,
            status_page,
            shutdown,
            header_blocks: Arc::new(HeaderBlocks::new()),
        }
    }

    #[must_use]
    pub fn router(&self) -> &PathRouter {
        &self.router
    }

    /// Produce the response for one request. Never fails: unknown paths become 400,
    /// handler errors and panics become 500.
    #[must_use]
    pub fn handle(&self, req: ParsedRequest) -> SessionResponse {
        let started = Instant::now();
        let route = self.router.resolve(&req.path);
        debug!(method = %req.method, path = %req.path, route = ?route, "Route resolved");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.respond(route, &req)
        }));

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(DispatchError::RouteNotFound(path))) => {
                let msg = DispatchError::RouteNotFound(path).to_string();
                error!(method = %req.method, "{msg}");
                SessionResponse::text(400, msg)
            }
            Ok(Err(e)) => {
                error!(method = %req.method, path = %req.path, error = %e, "Request failed");
                internal_error()
            }
            Err(panic) => {
                let panic_message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    method = %req.method,
                    path = %req.path,
                    panic_message = %panic_message,
                    "Request handler panicked"
                );
                internal_error()
            }
        };

        debug!(
            path = %req.path,
            status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "Request complete"
        );
        response
    }

    /// Turn a response into its wire form. A response with a header that cannot be
    /// written verbatim is replaced by a 500 rather than sent truncated.
    #[must_use]
    pub fn render(&self, response: SessionResponse) -> WireResponse {
        match self.header_blocks.block(&response.headers) {
            Ok(header_block) => WireResponse {
                status: response.status,
                header_block,
                body: response.body,
            },
            Err(e) => {
                error!(status = response.status, error = %e, "Response headers rejected");
                WireResponse {
                    status: 500,
                    header_block: Some(INTERNAL_ERROR_HEADERS),
                    body: INTERNAL_ERROR_BODY.as_bytes().to_vec(),
                }
            }
        }
    }

    fn respond(&self, route: Route, req: &ParsedRequest) -> Result<SessionResponse, DispatchError> {
        match route {
            Route::Root => {
                info!("Root path requested");
                let ids = self.table.ids();
                let page = self.status_page.render(self.router.base_url(), &ids)?;
                Ok(SessionResponse::html(200, page))
            }
            Route::Shutdown => {
                info!(method = %req.method, "Shutting down");
                self.shutdown.trigger();
                Ok(SessionResponse::new(200, "text/html", SHUTDOWN_BODY.as_bytes().to_vec()))
            }
            Route::Favicon => {
                debug!("Favicon requested");
                Ok(SessionResponse::new(200, FAVICON_CONTENT_TYPE, FAVICON.to_vec()))
            }
            Route::Session(id) => {
                let app = self
                    .table
                    .get(&id)
                    .ok_or_else(|| DispatchError::RouteNotFound(req.path.clone()))?;
                let method = Method::from_bytes(req.method.as_bytes())
                    .map_err(|e| DispatchError::InternalHandler(e.to_string()))?;
                let path = self.router.forwarded_path(&req.path);
                if path != req.path {
                    debug!(from = %req.path, to = %path, "No base url in path; rewritten");
                }
                info!(session_id = %id, method = %method, path = %path, "Routing request");

                let request = SessionRequest {
                    session_id: id,
                    method,
                    path,
                    query: req.query.clone(),
                    headers: req.headers.clone(),
                    body: req.body.clone(),
                };
                app.call(&request)
                    .map_err(|e| DispatchError::InternalHandler(format!("{e:#}")))
            }
            Route::NotFound => Err(DispatchError::RouteNotFound(req.path.clone())),
        }
    }
}

fn internal_error() -> SessionResponse {
    SessionResponse::text(500, INTERNAL_ERROR_BODY)
}

impl HttpService for Dispatcher {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let _in_flight = self.shutdown.enter();
        let parsed = parse_request(req);
        let response = self.render(self.handle(parsed));
        write_response(res, response);
        Ok(())
    }
}
