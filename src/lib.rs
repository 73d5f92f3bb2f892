//! # dashrouter
//!
//! **dashrouter** hosts many independent interactive web applications behind one embedded
//! HTTP server, each addressable under its own path prefix.
//!
//! ## Overview
//!
//! A caller registers opaque context objects. The first registration of a context asks a
//! [`SessionFactory`](registry::SessionFactory) to build a session application for it and
//! binds a stable identifier to the context. From then on every request under
//! `/{identifier}/` (or `/{base_url}/{identifier}/` behind a reverse proxy) is forwarded
//! to that application.
//!
//! The server runs on a background thread using the `may` coroutine runtime and
//! `may_minihttp`, so the caller's thread stays free. It can be pinged, inspected,
//! stopped and restarted.
//!
//! ## Architecture
//!
//! - **[`server`]** - [`ServerManager`](server::ServerManager) lifecycle, configuration
//!   and the `may_minihttp` glue
//! - **[`dispatcher`]** - the HTTP entry point: control routes, forwarding, 400/500 mapping
//! - **[`router`]** - path parsing into control routes and session identifiers
//! - **[`registry`]** - identity-keyed session registration and the routing table
//! - **[`port_allocator`]** - default port selection with random fallback
//! - **[`static_files`]** - status page and favicon
//! - **[`embed`]** - links and iframe markup for notebook hosts
//! - **[`logging`]** - opt-in `tracing-subscriber` setup
//!
//! ### Request Handling Flow
//!
//! ```text
//! client ──► may_minihttp ──► Dispatcher::handle
//!                                │
//!                   PathRouter::resolve(path)
//!        ┌──────────────┬────────┴───────┬─────────────────┐
//!        ▼              ▼                ▼                 ▼
//!   status page     /shutdown      /favicon.ico     Session(id) ──► SessionApp::call
//!                  (fires signal)                   NotFound    ──► 400
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dashrouter::registry::{session_app, SessionApp, SessionFactory, SessionOptions,
//!     SessionResponse};
//! use dashrouter::server::{ServerConfig, ServerManager};
//! use std::sync::Arc;
//!
//! struct Explanation {
//!     title: String,
//! }
//!
//! struct Dashboards;
//!
//! impl SessionFactory for Dashboards {
//!     type Context = Explanation;
//!
//!     fn create_session(
//!         &self,
//!         ctx: &Explanation,
//!         _options: &SessionOptions,
//!         prefix: &str,
//!     ) -> anyhow::Result<Arc<dyn SessionApp>> {
//!         let page = format!("<h1>{}</h1><p>served under {prefix}</p>", ctx.title);
//!         Ok(session_app(move |_| Ok(SessionResponse::html(200, page.clone()))))
//!     }
//! }
//!
//! let config = ServerConfig::builder().base_url("proxy/7001").build()?;
//! let manager = ServerManager::new(config, Dashboards)?;
//! manager.start()?;
//!
//! let ebm = Arc::new(Explanation { title: "Global importances".into() });
//! manager.register(&ebm, SessionOptions::default())?;
//! println!("{}", manager.display_link(&ebm)?);
//!
//! assert!(manager.stop());
//! # Ok::<(), dashrouter::error::DispatchError>(())
//! ```
//!
//! ## Runtime Considerations
//!
//! Coroutine stack size and the ping/startup/shutdown timeouts come from
//! [`RuntimeConfig`](runtime_config::RuntimeConfig) (`DASHR_*` environment variables).
//! The default bind address is loopback; `/shutdown` is unauthenticated.

pub mod dispatcher;
pub mod embed;
pub mod error;
pub mod ids;
pub mod logging;
pub mod port_allocator;
pub mod registry;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod static_files;

pub use dispatcher::Dispatcher;
pub use error::{DispatchError, Result};
pub use ids::SessionId;
pub use registry::{
    session_app, SessionApp, SessionFactory, SessionOptions, SessionRegistry, SessionRequest,
    SessionResponse,
};
pub use server::{LifecycleState, ServerConfig, ServerManager, ServerStatus};
