use may::coroutine::JoinHandle;
use may_minihttp::{HttpServerWithHeaders, HttpService};
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

/// Request headers parsed per request. Browsers behind a proxy routinely send more than
/// the 16 the stock parser allows (`sec-ch-ua*`, `sec-fetch-*`, `x-forwarded-*`, cookies).
pub const MAX_REQUEST_HEADERS: usize = 32;

/// Wrapper around may_minihttp's HTTP server
pub struct HttpServer<T>(pub T);

/// Handle to a running HTTP server
///
/// Owns the coroutine running the accept loop. Stopping cancels that coroutine, which
/// closes the listener; connection coroutines already in flight finish on their own.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if nothing accepts within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the accept coroutine and wait for it to unwind.
    pub fn stop(self) {
        // SAFETY: cancel() is unsafe in may because a cancelled coroutine unwinds at its
        // next yield point. The accept loop owns nothing but the listener, which is
        // exactly what we want dropped.
        unsafe {
            self.handle.coroutine().cancel();
        }
        // A cancelled coroutine reports its unwind as a join error.
        let _ = self.handle.join();
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` and start serving in a may coroutine.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub fn start(self, addr: SocketAddr) -> io::Result<ServerHandle> {
        let handle = HttpServerWithHeaders::<_, MAX_REQUEST_HEADERS>(self.0).start(addr)?;
        Ok(ServerHandle { addr, handle })
    }
}
