use super::core::{normalize_base_url, session_prefix, PathRouter, Route};
use crate::ids::SessionId;
use crate::registry::{session_app, SessionResponse, SessionTable};
use std::sync::Arc;

fn table_with(ids: &[SessionId]) -> Arc<SessionTable> {
    let table = Arc::new(SessionTable::new());
    for id in ids {
        table.insert_if_absent(*id, session_app(|_| Ok(SessionResponse::text(200, "ok"))));
    }
    table
}

#[test]
fn test_control_paths() {
    let router = PathRouter::new(None, table_with(&[]));
    assert_eq!(router.resolve("/"), Route::Root);
    assert_eq!(router.resolve("/?refresh=1"), Route::Root);
    assert_eq!(router.resolve("/shutdown"), Route::Shutdown);
    assert_eq!(router.resolve("/favicon.ico"), Route::Favicon);
    assert_eq!(router.resolve("/shutdown/now"), Route::NotFound);
}

#[test]
fn test_session_paths() {
    let known = SessionId::new();
    let unknown = SessionId::new();
    let router = PathRouter::new(None, table_with(&[known]));

    assert_eq!(router.resolve(&format!("/{known}/")), Route::Session(known));
    assert_eq!(router.resolve(&format!("/{known}")), Route::Session(known));
    assert_eq!(
        router.resolve(&format!("/{known}/_dash-layout?x=1")),
        Route::Session(known)
    );
    assert_eq!(router.resolve(&format!("/{unknown}/")), Route::NotFound);
    assert_eq!(router.resolve("/not-a-session/"), Route::NotFound);
}

#[test]
fn test_session_segment_is_case_sensitive() {
    let known = SessionId::new();
    let router = PathRouter::new(None, table_with(&[known]));
    let lower = known.to_string().to_ascii_lowercase();
    assert_eq!(router.resolve(&format!("/{lower}/")), Route::NotFound);
}

#[test]
fn test_base_url_is_optional_on_inbound_paths() {
    let id = SessionId::new();
    let router = PathRouter::new(Some("/dash/"), table_with(&[id]));

    assert_eq!(router.base_url(), Some("dash"));
    assert_eq!(router.resolve(&format!("/dash/{id}/")), Route::Session(id));
    assert_eq!(router.resolve(&format!("/{id}/")), Route::Session(id));
    assert_eq!(router.resolve("/dash"), Route::Root);
    assert_eq!(router.resolve("/dash/"), Route::Root);
    assert_eq!(router.resolve("/dash/shutdown"), Route::Shutdown);
    assert_eq!(router.resolve("/dash/favicon.ico"), Route::Favicon);
    assert_eq!(router.resolve("/dashboard/"), Route::NotFound);
}

#[test]
fn test_forwarded_path_adds_missing_base() {
    let id = SessionId::new();
    let router = PathRouter::new(Some("dash"), table_with(&[id]));

    assert_eq!(
        router.forwarded_path(&format!("/{id}/_dash-layout")),
        format!("/dash/{id}/_dash-layout")
    );
    assert_eq!(
        router.forwarded_path(&format!("/dash/{id}/")),
        format!("/dash/{id}/")
    );

    let plain = PathRouter::new(None, table_with(&[id]));
    assert_eq!(plain.forwarded_path(&format!("/{id}/")), format!("/{id}/"));
}

#[test]
fn test_session_prefix() {
    let id = SessionId::new();
    assert_eq!(session_prefix(None, &id), format!("/{id}/"));
    assert_eq!(session_prefix(Some("a/b"), &id), format!("/a/b/{id}/"));
}

#[test]
fn test_normalize_base_url() {
    assert_eq!(normalize_base_url("/dash/"), Some("dash".to_string()));
    assert_eq!(normalize_base_url("proxy/7001"), Some("proxy/7001".to_string()));
    assert_eq!(normalize_base_url("/"), None);
    assert_eq!(normalize_base_url(""), None);
}
