//! Links and embeddable markup for registered sessions.
//!
//! A session is shown to the user either as a plain link or as an `<iframe>` fragment
//! that a notebook-style host can render inline.

use crate::ids::SessionId;
use crate::router::session_prefix;
use std::fmt::Display;
use std::net::SocketAddr;

/// Start of every session link: `/` for relative links, otherwise the server origin.
#[must_use]
pub fn link_start(addr: SocketAddr, use_relative_links: bool) -> String {
    if use_relative_links {
        "/".to_string()
    } else {
        format!("http://{addr}/")
    }
}

/// Full link to a session, e.g. `http://127.0.0.1:7001/proxy/7001/<id>/`.
#[must_use]
pub fn session_link(
    addr: SocketAddr,
    use_relative_links: bool,
    base_url: Option<&str>,
    id: &SessionId,
) -> String {
    let prefix = session_prefix(base_url, id);
    format!(
        "{}{}",
        link_start(addr, use_relative_links),
        prefix.trim_start_matches('/')
    )
}

/// HTML fragment embedding `url`: a comment carrying the link, an optional
/// "open in new window" anchor and the iframe itself.
#[must_use]
pub fn embed_markup(url: &str, width: impl Display, height: impl Display, open_link: bool) -> String {
    let mut markup = format!("<!-- {url} -->\n");
    if open_link {
        markup.push_str(&format!(
            "<a href=\"{url}\" target=\"_new\">Open in new window</a>"
        ));
    }
    markup.push_str(&format!(
        "<iframe src=\"{url}\" width={width} height={height} frameBorder=\"0\"></iframe>"
    ));
    markup
}
