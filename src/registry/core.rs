use super::session::{SessionApp, SessionFactory, SessionOptions};
use crate::error::{DispatchError, Result};
use crate::ids::SessionId;
use crate::router::session_prefix;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, error, info};

/// Routing table shared between the registry (writer) and the dispatcher (readers).
///
/// Entries are inserted whole and never mutated or removed, so a reader either sees a
/// complete session or none at all.
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<SessionId, Arc<dyn SessionApp>>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone out the application so no shard lock is held while it runs.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn SessionApp>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Insert unless present; returns whether the entry was inserted.
    pub fn insert_if_absent(&self, id: SessionId, app: Arc<dyn SessionApp>) -> bool {
        let mut inserted = false;
        self.sessions.entry(id).or_insert_with(|| {
            inserted = true;
            app
        });
        inserted
    }

    /// Session identifiers in registration order.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

struct Identity<C> {
    context: Weak<C>,
    id: SessionId,
}

impl<C> Identity<C> {
    /// Same allocation, still alive. A dead entry at the same address belongs to an
    /// earlier object and must not be reused.
    fn matches(&self, context: &Arc<C>) -> bool {
        self.context.strong_count() > 0 && std::ptr::eq(self.context.as_ptr(), Arc::as_ptr(context))
    }
}

fn identity_key<C>(context: &Arc<C>) -> usize {
    Arc::as_ptr(context).cast::<()>() as usize
}

/// Lazily builds one session application per registered context.
pub struct SessionRegistry<F: SessionFactory> {
    factory: F,
    table: Arc<SessionTable>,
    identities: Mutex<HashMap<usize, Identity<F::Context>>>,
    base_url: Option<String>,
}

impl<F: SessionFactory> SessionRegistry<F> {
    pub fn new(factory: F, base_url: Option<String>) -> Self {
        Self {
            factory,
            table: Arc::new(SessionTable::new()),
            identities: Mutex::new(HashMap::new()),
            base_url,
        }
    }

    /// Register a context, building its session on first sight.
    ///
    /// The identity check, the factory call and the insert all happen under one lock,
    /// so concurrent registrations of the same context build exactly one session.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionFactory`] if the factory fails; nothing is stored.
    pub fn register(&self, context: &Arc<F::Context>, options: &SessionOptions) -> Result<SessionId> {
        let mut identities = self
            .identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let key = identity_key(context);
        if let Some(existing) = identities.get(&key) {
            if existing.matches(context) {
                debug!(session_id = %existing.id, "App entry found");
                return Ok(existing.id);
            }
        }

        let id = SessionId::new();
        let prefix = session_prefix(self.base_url.as_deref(), &id);
        info!(session_id = %id, path_prefix = %prefix, "Creating app entry");

        let app = self
            .factory
            .create_session(context, options, &prefix)
            .map_err(|e| {
                error!(session_id = %id, error = %e, "Session factory failed");
                DispatchError::SessionFactory(e)
            })?;

        self.table.insert_if_absent(id, app);
        identities.retain(|_, identity| identity.context.strong_count() > 0);
        identities.insert(
            key,
            Identity {
                context: Arc::downgrade(context),
                id,
            },
        );
        Ok(id)
    }

    /// Identifier of an already registered, still alive context.
    #[must_use]
    pub fn id_of(&self, context: &Arc<F::Context>) -> Option<SessionId> {
        let identities = self
            .identities
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        identities
            .get(&identity_key(context))
            .filter(|identity| identity.matches(context))
            .map(|identity| identity.id)
    }

    #[must_use]
    pub fn lookup(&self, id: &SessionId) -> Option<Arc<dyn SessionApp>> {
        self.table.get(id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.table.ids()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The routing table, shared with the dispatcher.
    #[must_use]
    pub fn table(&self) -> Arc<SessionTable> {
        Arc::clone(&self.table)
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::session::{session_app, SessionResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Report {
        title: String,
    }

    #[derive(Default)]
    struct CountingFactory {
        calls: AtomicUsize,
        prefixes: Mutex<Vec<String>>,
    }

    impl SessionFactory for CountingFactory {
        type Context = Report;

        fn create_session(
            &self,
            context: &Report,
            _options: &SessionOptions,
            path_prefix: &str,
        ) -> anyhow::Result<Arc<dyn SessionApp>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prefixes.lock().unwrap().push(path_prefix.to_string());
            let title = context.title.clone();
            Ok(session_app(move |_| Ok(SessionResponse::text(200, title.clone()))))
        }
    }

    struct FailingFactory;

    impl SessionFactory for FailingFactory {
        type Context = Report;

        fn create_session(
            &self,
            _context: &Report,
            _options: &SessionOptions,
            _path_prefix: &str,
        ) -> anyhow::Result<Arc<dyn SessionApp>> {
            Err(anyhow::anyhow!("no renderer for this report"))
        }
    }

    fn report(title: &str) -> Arc<Report> {
        Arc::new(Report {
            title: title.to_string(),
        })
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = SessionRegistry::new(CountingFactory::default(), None);
        let ctx = report("a");
        let first = registry.register(&ctx, &SessionOptions::default()).unwrap();
        let second = registry.register(&ctx, &SessionOptions::default()).unwrap();
        let via_clone = registry.register(&Arc::clone(&ctx), &SessionOptions::default()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, via_clone);
        assert_eq!(registry.factory().calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_contexts_get_distinct_sessions() {
        let registry = SessionRegistry::new(CountingFactory::default(), None);
        let a = report("a");
        let b = report("b");
        let id_a = registry.register(&a, &SessionOptions::default()).unwrap();
        let id_b = registry.register(&b, &SessionOptions::default()).unwrap();

        assert_ne!(id_a, id_b);
        assert_eq!(registry.ids(), vec![id_a, id_b]);
        assert_eq!(registry.id_of(&a), Some(id_a));
        assert_eq!(registry.id_of(&b), Some(id_b));
    }

    #[test]
    fn test_factory_receives_prefix_with_base_url() {
        let registry = SessionRegistry::new(CountingFactory::default(), Some("dash".to_string()));
        let id = registry.register(&report("a"), &SessionOptions::default()).unwrap();
        let prefixes = registry.factory().prefixes.lock().unwrap().clone();
        assert_eq!(prefixes, vec![format!("/dash/{id}/")]);
    }

    #[test]
    fn test_dropped_context_is_not_reused() {
        let registry = SessionRegistry::new(CountingFactory::default(), None);
        let first = {
            let ctx = report("short-lived");
            registry.register(&ctx, &SessionOptions::default()).unwrap()
        };
        let ctx = report("new");
        let second = registry.register(&ctx, &SessionOptions::default()).unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.factory().calls.load(Ordering::SeqCst), 2);
        // The earlier session stays routable; there is no eviction.
        assert!(registry.lookup(&first).is_some());
    }

    #[test]
    fn test_factory_failure_stores_nothing() {
        let registry = SessionRegistry::new(FailingFactory, None);
        let ctx = report("a");
        let err = registry.register(&ctx, &SessionOptions::default()).unwrap_err();
        assert!(matches!(err, DispatchError::SessionFactory(_)));
        assert!(registry.is_empty());
        assert_eq!(registry.id_of(&ctx), None);
    }

    #[test]
    fn test_concurrent_registration_builds_once() {
        let registry = Arc::new(SessionRegistry::new(CountingFactory::default(), None));
        let ctx = report("shared");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || registry.register(&ctx, &SessionOptions::default()).unwrap())
            })
            .collect();
        let ids: Vec<SessionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.factory().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_table_insert_if_absent_keeps_first() {
        let table = SessionTable::new();
        let id = SessionId::new();
        let first = session_app(|_| Ok(SessionResponse::text(200, "first")));
        let second = session_app(|_| Ok(SessionResponse::text(200, "second")));

        assert!(table.insert_if_absent(id, first));
        assert!(!table.insert_if_absent(id, second));
        assert_eq!(table.len(), 1);
    }
}
