//! Bundled assets and the status page served on the root path.
//!
//! Nothing is read from disk at runtime: the icon and the page template are compiled
//! into the crate.

use crate::error::{DispatchError, Result};
use crate::ids::SessionId;
use crate::router::{session_prefix, FAVICON_PATH};
use minijinja::{context, Environment, Value};
use serde::Serialize;

/// Icon served on `/favicon.ico`.
pub static FAVICON: &[u8] = include_bytes!("../assets/favicon.ico");
pub const FAVICON_CONTENT_TYPE: &str = "image/x-icon";

const STATUS_TEMPLATE_NAME: &str = "status.html";
const STATUS_TEMPLATE: &str = include_str!("../templates/status.html");

/// One entry in the status page's link list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionLink {
    pub id: String,
    pub href: String,
}

impl SessionLink {
    #[must_use]
    pub fn new(base_url: Option<&str>, id: &SessionId) -> Self {
        Self {
            id: id.to_string(),
            href: session_prefix(base_url, id),
        }
    }
}

/// Renders the HTML status page listing active sessions.
pub struct StatusPage {
    env: Environment<'static>,
}

impl StatusPage {
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] if the bundled template fails to compile.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(STATUS_TEMPLATE_NAME, STATUS_TEMPLATE)
            .map_err(|e| DispatchError::Config(format!("status page template: {e}")))?;
        Ok(Self { env })
    }

    /// Render the page.
    ///
    /// The template is auto-escaped; hrefs are built from ULIDs and a validated base URL
    /// and go in unescaped.
    pub fn render(&self, base_url: Option<&str>, ids: &[SessionId]) -> Result<String> {
        let links: Vec<Value> = ids
            .iter()
            .map(|id| {
                let link = SessionLink::new(base_url, id);
                context! { id => link.id, href => Value::from_safe_string(link.href) }
            })
            .collect();
        let favicon_href = Value::from_safe_string(match base_url {
            Some(base) => format!("/{base}{FAVICON_PATH}"),
            None => FAVICON_PATH.to_string(),
        });
        let tmpl = self
            .env
            .get_template(STATUS_TEMPLATE_NAME)
            .map_err(|e| DispatchError::InternalHandler(e.to_string()))?;
        tmpl.render(context! { links => links, favicon_href => favicon_href })
            .map_err(|e| DispatchError::InternalHandler(e.to_string()))
    }
}
