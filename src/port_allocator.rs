//! Local port acquisition for the embedded server.
//!
//! The allocator probes a port by binding a listener and dropping it straight away.
//! Nothing is held between the probe and the real bind in the server thread, so another
//! process can grab the port in between. That window is accepted for local interactive
//! use; callers that cannot tolerate it should pin an explicit address.

use crate::error::{DispatchError, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::ops::RangeInclusive;
use tracing::{error, info};

/// First port tried when no address is configured.
pub const DEFAULT_START_PORT: u16 = 7001;
/// Range random fallback candidates are drawn from.
pub const DEFAULT_FALLBACK_RANGE: RangeInclusive<u16> = 7002..=7999;
/// Probes before giving up with [`DispatchError::PortExhausted`].
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Finds a bindable `(ip, port)` pair on the local machine.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    ip: IpAddr,
    start_port: u16,
    fallback: RangeInclusive<u16>,
    max_attempts: usize,
}

impl PortAllocator {
    pub fn new(ip: IpAddr, start_port: u16, fallback: RangeInclusive<u16>, max_attempts: usize) -> Self {
        Self {
            ip,
            start_port,
            fallback,
            max_attempts,
        }
    }

    /// Probe the start port, then random fallback candidates.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::PortExhausted`] when every attempt found its port in use.
    pub fn allocate(&self) -> Result<SocketAddr> {
        let mut port = self.start_port;
        for _ in 0..self.max_attempts {
            if self.is_available(port) {
                info!(ip = %self.ip, port, "Found open port");
                return Ok(SocketAddr::new(self.ip, port));
            }
            info!(ip = %self.ip, port, "Port already in use");
            port = self.random_candidate();
        }
        error!(
            attempts = self.max_attempts,
            "Could not find open port; configure an explicit address instead"
        );
        Err(DispatchError::PortExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Bind and immediately release a listener on `port`.
    #[must_use]
    pub fn is_available(&self, port: u16) -> bool {
        TcpListener::bind((self.ip, port)).is_ok()
    }

    fn random_candidate(&self) -> u16 {
        let (lo, hi) = (*self.fallback.start(), *self.fallback.end());
        if hi <= lo {
            return lo;
        }
        let span = u128::from(hi - lo) + 1;
        // ULIDs carry 80 random bits; borrowing them avoids a separate RNG.
        let offset = ulid::Ulid::new().random() % span;
        lo + offset as u16
    }

    /// Resolve port `0` to a concrete OS-assigned port on `ip`.
    ///
    /// The manager needs a real port to address itself for pings and shutdown, and the
    /// may_minihttp listener does not report the port it ended up with.
    pub fn ephemeral(ip: IpAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind((ip, 0)).map_err(DispatchError::Bind)?;
        listener.local_addr().map_err(DispatchError::Bind)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DEFAULT_START_PORT,
            DEFAULT_FALLBACK_RANGE,
            DEFAULT_MAX_ATTEMPTS,
        )
    }
}
