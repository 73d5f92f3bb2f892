//! # Registry Module
//!
//! The registry maps session identifiers to lazily constructed session applications.
//!
//! ## Overview
//!
//! A caller registers an opaque context object (held in an `Arc`). The first time a
//! context is seen the registry:
//!
//! 1. mints a [`SessionId`](crate::ids::SessionId) bound to the context's allocation,
//! 2. computes the session's path prefix (`/{id}/` or `/{base_url}/{id}/`),
//! 3. asks the [`SessionFactory`] to build a [`SessionApp`] for that prefix,
//! 4. publishes the application in the shared [`SessionTable`].
//!
//! Registering the same context again returns the same identifier without touching the
//! factory. Identity is tracked through `Weak` references, so an identifier is never
//! handed to a different object that happens to reuse a freed allocation.
//!
//! ## Concurrency
//!
//! Registration is serialised by a mutex around check, build and insert. Routing reads
//! go straight to the concurrent [`SessionTable`] and never wait on registration of an
//! unrelated session.
//!
//! ## Example
//!
//! ```rust
//! use dashrouter::registry::{session_app, SessionApp, SessionFactory, SessionOptions,
//!     SessionRegistry, SessionResponse};
//! use std::sync::Arc;
//!
//! struct Explanation { name: String }
//!
//! struct Renderer;
//!
//! impl SessionFactory for Renderer {
//!     type Context = Explanation;
//!
//!     fn create_session(
//!         &self,
//!         ctx: &Explanation,
//!         _options: &SessionOptions,
//!         _prefix: &str,
//!     ) -> anyhow::Result<Arc<dyn SessionApp>> {
//!         let name = ctx.name.clone();
//!         Ok(session_app(move |_| Ok(SessionResponse::html(200, name.clone()))))
//!     }
//! }
//!
//! let registry = SessionRegistry::new(Renderer, None);
//! let ctx = Arc::new(Explanation { name: "ebm".into() });
//! let id = registry.register(&ctx, &SessionOptions::default()).unwrap();
//! assert_eq!(registry.register(&ctx, &SessionOptions::default()).unwrap(), id);
//! ```

mod core;
mod session;

pub use core::{SessionRegistry, SessionTable};
pub use session::{
    session_app, HeaderVec, SessionApp, SessionFactory, SessionOptions, SessionRequest,
    SessionResponse, MAX_INLINE_HEADERS,
};
