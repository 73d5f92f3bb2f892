use crate::dispatcher::Dispatcher;
use crate::embed::{embed_markup, session_link};
use crate::error::{DispatchError, Result};
use crate::ids::SessionId;
use crate::port_allocator::PortAllocator;
use crate::registry::{SessionFactory, SessionOptions, SessionRegistry};
use crate::router::{PathRouter, ROOT_PATH, SHUTDOWN_PATH};
use crate::runtime_config::RuntimeConfig;
use crate::server::config::ServerConfig;
use crate::server::http_server::HttpServer;
use crate::server::shutdown::ShutdownSignal;
use crate::static_files::StatusPage;
use serde::Serialize;
use std::fmt::Display;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often a draining server thread reports the requests it is still waiting on.
const DRAIN_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Where the background server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Snapshot returned by [`ServerManager::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub addr: SocketAddr,
    pub base_url: Option<String>,
    pub use_relative_links: bool,
    pub state: LifecycleState,
    /// Whether a server thread is still running, including one that outlived a timed-out stop
    pub thread_alive: bool,
    /// Result of a fresh `GET /` against the server
    pub http_reachable: bool,
}

struct Worker {
    signal: ShutdownSignal,
    done_rx: mpsc::Receiver<()>,
    thread: thread::JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

struct Lifecycle {
    state: LifecycleState,
    worker: Option<Worker>,
    /// Liveness flag of a thread that did not finish within the shutdown timeout
    orphan: Option<Arc<AtomicBool>>,
}

/// Clears the liveness flag when the server thread exits, panics included.
struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the embedded HTTP server and the session registry behind it.
///
/// The server runs on a dedicated OS thread hosting the may coroutine runtime.
/// `start()` returns once the listener is bound; the thread then parks until the
/// shutdown signal fires, either from `/shutdown` or from [`stop`](Self::stop).
pub struct ServerManager<F: SessionFactory> {
    config: ServerConfig,
    runtime: RuntimeConfig,
    addr: SocketAddr,
    registry: Arc<SessionRegistry<F>>,
    status_page: Arc<StatusPage>,
    client: reqwest::blocking::Client,
    lifecycle: Mutex<Lifecycle>,
    /// Notified whenever a start or stop settles
    settled: Condvar,
}

impl<F: SessionFactory> ServerManager<F> {
    /// Build a manager with runtime settings from the environment.
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, no port is free, or the HTTP client cannot be built.
    pub fn new(config: ServerConfig, factory: F) -> Result<Self> {
        Self::with_runtime(config, RuntimeConfig::from_env(), factory)
    }

    /// Build a manager with explicit runtime settings.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_runtime(config: ServerConfig, runtime: RuntimeConfig, factory: F) -> Result<Self> {
        let mut config = config.validated()?;
        let addr = match config.addr {
            Some(addr) if addr.port() == 0 => PortAllocator::ephemeral(addr.ip())?,
            Some(addr) => addr,
            None => PortAllocator::default().allocate()?,
        };
        config.addr = Some(addr);

        let client = reqwest::blocking::Client::builder()
            .timeout(runtime.ping_timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .map_err(|e| DispatchError::HttpClient(e.to_string()))?;

        info!(
            addr = %addr,
            base_url = ?config.base_url,
            use_relative_links = config.use_relative_links,
            "Server manager created"
        );

        Ok(Self {
            registry: Arc::new(SessionRegistry::new(factory, config.base_url.clone())),
            status_page: Arc::new(StatusPage::new()?),
            config,
            runtime,
            addr,
            client,
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::Stopped,
                worker: None,
                orphan: None,
            }),
            settled: Condvar::new(),
        })
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<F> {
        &self.registry
    }

    /// Current lifecycle state. A server stopped through `/shutdown` reads as `Stopped`
    /// once its thread has exited.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        let mut lifecycle = self.lock();
        Self::reap(&mut lifecycle);
        lifecycle.state
    }

    /// Start the background server.
    ///
    /// The lifecycle lock is released while waiting for the bind result, so `state()` and
    /// `status()` answer `Starting` in the meantime.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::AlreadyRunning`] unless the server is stopped
    /// - [`DispatchError::Bind`] if the address cannot be bound
    /// - [`DispatchError::StartupTimeout`] if the bind result does not arrive in time
    pub fn start(&self) -> Result<()> {
        {
            let mut lifecycle = self.lock();
            Self::reap(&mut lifecycle);
            if lifecycle.state != LifecycleState::Stopped {
                return Err(DispatchError::AlreadyRunning);
            }
            lifecycle.state = LifecycleState::Starting;
        }

        let result = self.spawn_server();
        self.settled.notify_all();
        result
    }

    fn spawn_server(&self) -> Result<()> {
        may::config().set_stack_size(self.runtime.stack_size);

        let table = self.registry.table();
        let signal = ShutdownSignal::new();
        let dispatcher = Dispatcher::new(
            PathRouter::new(self.config.base_url.as_deref(), Arc::clone(&table)),
            table,
            Arc::clone(&self.status_page),
            signal.clone(),
        );

        let (ready_tx, ready_rx) = mpsc::channel::<io::Result<()>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let alive = Arc::new(AtomicBool::new(true));

        let addr = self.addr;
        let thread_signal = signal.clone();
        let thread_alive = Arc::clone(&alive);
        let spawned = thread::Builder::new()
            .name(format!("dashr-server-{}", addr.port()))
            .spawn(move || {
                let _alive = AliveGuard(thread_alive);
                let handle = match HttpServer(dispatcher).start(addr) {
                    Ok(handle) => handle,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                thread_signal.wait();
                info!(addr = %addr, "Shutdown signal received; stopping listener");
                handle.stop();
                while !thread_signal.wait_drained(DRAIN_LOG_INTERVAL) {
                    warn!(
                        addr = %addr,
                        in_flight = thread_signal.in_flight(),
                        "Waiting for in-flight requests"
                    );
                }
                let _ = done_tx.send(());
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.lock().state = LifecycleState::Stopped;
                return Err(DispatchError::Bind(e));
            }
        };

        let outcome = ready_rx.recv_timeout(self.runtime.startup_timeout);
        let mut lifecycle = self.lock();
        match outcome {
            Ok(Ok(())) => {
                lifecycle.state = LifecycleState::Running;
                lifecycle.worker = Some(Worker {
                    signal,
                    done_rx,
                    thread,
                    alive,
                });
                info!(
                    addr = %addr,
                    stack_size = self.runtime.stack_size,
                    "Server started"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                lifecycle.state = LifecycleState::Stopped;
                drop(lifecycle);
                let _ = thread.join();
                error!(addr = %addr, error = %e, "Failed to bind");
                Err(DispatchError::Bind(e))
            }
            Err(RecvTimeoutError::Disconnected) => {
                lifecycle.state = LifecycleState::Stopped;
                drop(lifecycle);
                let _ = thread.join();
                error!(addr = %addr, "Server thread exited during startup");
                Err(DispatchError::Bind(io::Error::other(
                    "server thread exited during startup",
                )))
            }
            Err(RecvTimeoutError::Timeout) => {
                signal.trigger();
                lifecycle.state = LifecycleState::Stopped;
                lifecycle.orphan = Some(alive);
                error!(
                    addr = %addr,
                    timeout_ms = self.runtime.startup_timeout.as_millis() as u64,
                    "Server did not report its bind result in time"
                );
                Err(DispatchError::StartupTimeout(self.runtime.startup_timeout))
            }
        }
    }

    /// Stop the server; `true` on a clean stop or if it was never running.
    ///
    /// `false` while a thread from an earlier timed-out stop is still alive.
    pub fn stop(&self) -> bool {
        match self.try_stop() {
            Ok(()) => true,
            Err(e) => {
                warn!(addr = %self.addr, error = %e, "Stop did not complete");
                false
            }
        }
    }

    /// Stop the server, reporting why it did not stop cleanly.
    ///
    /// A call that arrives while another caller is starting or stopping the server waits
    /// for that transition and then reports the same outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ShutdownTimeout`] if the server thread is still running
    /// after the shutdown timeout, or still running from an earlier stop that timed out.
    /// The state is `Stopped` either way.
    pub fn try_stop(&self) -> Result<()> {
        let timeout = self.runtime.shutdown_timeout;
        let worker = {
            let mut lifecycle = self.lock();
            Self::reap(&mut lifecycle);
            if Self::in_transition(&lifecycle) {
                debug!(addr = %self.addr, state = ?lifecycle.state, "Waiting for lifecycle transition");
                let (settled, wait) = self
                    .settled
                    .wait_timeout_while(lifecycle, self.runtime.startup_timeout + timeout, |l| {
                        Self::in_transition(l)
                    })
                    .unwrap_or_else(PoisonError::into_inner);
                lifecycle = settled;
                if wait.timed_out() {
                    return Err(DispatchError::ShutdownTimeout(timeout));
                }
                Self::reap(&mut lifecycle);
            }
            if lifecycle.state == LifecycleState::Stopped {
                if Self::orphan_alive(&lifecycle) {
                    return Err(DispatchError::ShutdownTimeout(timeout));
                }
                debug!(addr = %self.addr, "Stop requested but server is not running");
                return Ok(());
            }
            match lifecycle.worker.take() {
                Some(worker) => {
                    lifecycle.state = LifecycleState::Stopping;
                    worker
                }
                None => {
                    lifecycle.state = LifecycleState::Stopped;
                    return Ok(());
                }
            }
        };

        self.request_shutdown(&worker.signal);

        let finished = match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };

        let result = {
            let mut lifecycle = self.lock();
            lifecycle.state = LifecycleState::Stopped;
            if finished {
                let _ = worker.thread.join();
                info!(addr = %self.addr, "Server stopped");
                Ok(())
            } else {
                lifecycle.orphan = Some(worker.alive);
                warn!(
                    addr = %self.addr,
                    timeout_ms = timeout.as_millis() as u64,
                    "Server thread still alive after shutdown timeout"
                );
                Err(DispatchError::ShutdownTimeout(timeout))
            }
        };
        self.settled.notify_all();
        result
    }

    /// `true` if the server answers `GET /` with any HTTP response.
    #[must_use]
    pub fn ping(&self) -> bool {
        match self.client.get(self.local_url(ROOT_PATH)).send() {
            Ok(response) => {
                debug!(addr = %self.addr, status = response.status().as_u16(), "Ping answered");
                true
            }
            Err(e) => {
                info!(addr = %self.addr, error = %e, "Ping failed");
                false
            }
        }
    }

    /// Lifecycle snapshot plus a fresh ping.
    #[must_use]
    pub fn status(&self) -> ServerStatus {
        let (state, thread_alive) = {
            let mut lifecycle = self.lock();
            Self::reap(&mut lifecycle);
            let running = lifecycle
                .worker
                .as_ref()
                .is_some_and(|w| w.alive.load(Ordering::SeqCst));
            (lifecycle.state, running || Self::orphan_alive(&lifecycle))
        };
        ServerStatus {
            addr: self.addr,
            base_url: self.config.base_url.clone(),
            use_relative_links: self.config.use_relative_links,
            state,
            thread_alive,
            http_reachable: self.ping(),
        }
    }

    /// Register a context and return its session identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::SessionFactory`] if the session cannot be built.
    pub fn register(&self, context: &Arc<F::Context>, options: SessionOptions) -> Result<SessionId> {
        self.registry.register(context, &options)
    }

    /// Link to a registered context's session.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotRegistered`] for an unknown context.
    pub fn display_link(&self, context: &Arc<F::Context>) -> Result<String> {
        let id = self
            .registry
            .id_of(context)
            .ok_or(DispatchError::NotRegistered)?;
        Ok(session_link(
            self.addr,
            self.config.use_relative_links,
            self.config.base_url.as_deref(),
            &id,
        ))
    }

    /// Embeddable iframe markup for a registered context's session.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NotRegistered`] for an unknown context.
    pub fn display(
        &self,
        context: &Arc<F::Context>,
        width: impl Display,
        height: impl Display,
        open_link: bool,
    ) -> Result<String> {
        let url = self.display_link(context)?;
        Ok(embed_markup(&url, width, height, open_link))
    }

    fn request_shutdown(&self, signal: &ShutdownSignal) {
        match self.client.post(self.local_url(SHUTDOWN_PATH)).send() {
            Ok(response) => {
                debug!(addr = %self.addr, status = response.status().as_u16(), "Shutdown request answered");
            }
            Err(e) => warn!(addr = %self.addr, error = %e, "Shutdown request failed"),
        }
        if signal.trigger() {
            info!(addr = %self.addr, "Shutdown signal fired directly");
        }
    }

    /// URL on the server's own address; unspecified bind addresses map to loopback.
    fn local_url(&self, path: &str) -> String {
        let ip = match self.addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!("http://{}{path}", SocketAddr::new(ip, self.addr.port()))
    }

    /// Notice a server thread that exited on its own, e.g. after an external `/shutdown`.
    fn reap(lifecycle: &mut Lifecycle) {
        let exited = lifecycle
            .worker
            .as_ref()
            .is_some_and(|w| w.thread.is_finished());
        if exited {
            if let Some(worker) = lifecycle.worker.take() {
                let _ = worker.thread.join();
            }
            lifecycle.state = LifecycleState::Stopped;
            info!("Server thread exited; lifecycle reset to stopped");
        }
        if lifecycle
            .orphan
            .as_ref()
            .is_some_and(|alive| !alive.load(Ordering::SeqCst))
        {
            lifecycle.orphan = None;
        }
    }

    fn in_transition(lifecycle: &Lifecycle) -> bool {
        matches!(
            lifecycle.state,
            LifecycleState::Starting | LifecycleState::Stopping
        )
    }

    fn orphan_alive(lifecycle: &Lifecycle) -> bool {
        lifecycle
            .orphan
            .as_ref()
            .is_some_and(|alive| alive.load(Ordering::SeqCst))
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: SessionFactory> Drop for ServerManager<F> {
    fn drop(&mut self) {
        if self.state() != LifecycleState::Stopped {
            debug!(addr = %self.addr, "Stopping server on drop");
            self.stop();
        }
    }
}
