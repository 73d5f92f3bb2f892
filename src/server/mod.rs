//! # Server Module
//!
//! The embedded HTTP server and its lifecycle.
//!
//! - [`ServerManager`] owns the background server thread, the session registry and the
//!   self-issued ping/shutdown client
//! - [`ServerConfig`] says where to listen and under which base URL
//! - [`HttpServer`] wraps `may_minihttp`; [`ShutdownSignal`] is what stops it
//! - `request`/`response` translate between `may_minihttp` and the dispatcher's types
//!
//! ## Example
//!
//! ```rust,no_run
//! use dashrouter::registry::{session_app, SessionApp, SessionFactory, SessionOptions,
//!     SessionResponse};
//! use dashrouter::server::{ServerConfig, ServerManager};
//! use std::sync::Arc;
//!
//! struct Pages;
//!
//! impl SessionFactory for Pages {
//!     type Context = String;
//!
//!     fn create_session(
//!         &self,
//!         title: &String,
//!         _options: &SessionOptions,
//!         _prefix: &str,
//!     ) -> anyhow::Result<Arc<dyn SessionApp>> {
//!         let title = title.clone();
//!         Ok(session_app(move |_| Ok(SessionResponse::html(200, title.clone()))))
//!     }
//! }
//!
//! let manager = ServerManager::new(ServerConfig::default(), Pages)?;
//! manager.start()?;
//! let page = Arc::new("Feature importances".to_string());
//! manager.register(&page, SessionOptions::default())?;
//! println!("{}", manager.display(&page, "100%", 800, true)?);
//! manager.stop();
//! # Ok::<(), dashrouter::error::DispatchError>(())
//! ```

pub mod config;
pub mod http_server;
pub mod manager;
pub mod request;
pub mod response;
pub mod shutdown;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use http_server::{HttpServer, ServerHandle, MAX_REQUEST_HEADERS};
pub use manager::{LifecycleState, ServerManager, ServerStatus};
pub use request::{parse_request, ParsedRequest};
pub use response::{write_response, HeaderBlocks, WireResponse};
pub use shutdown::{InFlightGuard, ShutdownSignal};
