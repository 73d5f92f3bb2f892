//! # Dispatcher Module
//!
//! The dispatcher is the `may_minihttp` service behind the embedded server. Every
//! connection coroutine holds a clone of it and runs each request through
//! [`Dispatcher::handle`].
//!
//! ## Request Flow
//!
//! 1. The raw request is flattened into a [`ParsedRequest`](crate::server::ParsedRequest)
//! 2. The [`PathRouter`](crate::router::PathRouter) classifies the path
//! 3. Control routes are answered directly:
//!    - `/` renders the status page listing active sessions
//!    - `/shutdown` fires the shutdown signal and answers `Shutdown`
//!    - `/favicon.ico` serves the bundled icon
//! 4. Session routes are forwarded to the session's application with the base URL
//!    prefix restored on the path
//!
//! ## Error Handling
//!
//! - An unknown path answers 400 with `URL not supported: {path}`
//! - A handler error or panic answers 500 with a fixed message; details go to the log
//! - Neither outcome touches the registry or stops the server
//!
//! ## Example
//!
//! ```rust
//! use dashrouter::dispatcher::Dispatcher;
//! use dashrouter::registry::SessionTable;
//! use dashrouter::router::PathRouter;
//! use dashrouter::server::{ParsedRequest, ShutdownSignal};
//! use dashrouter::static_files::StatusPage;
//! use std::sync::Arc;
//!
//! let table = Arc::new(SessionTable::new());
//! let dispatcher = Dispatcher::new(
//!     PathRouter::new(None, Arc::clone(&table)),
//!     table,
//!     Arc::new(StatusPage::new().unwrap()),
//!     ShutdownSignal::new(),
//! );
//! let response = dispatcher.handle(ParsedRequest::new("GET", "/missing/"));
//! assert_eq!(response.status, 400);
//! assert_eq!(response.body, b"URL not supported: /missing/");
//! ```

mod core;

pub use core::{Dispatcher, INTERNAL_ERROR_BODY, SHUTDOWN_BODY};
