//! Endpoint selection per dispatch mode

use super::{Transport, TransportError, TransportFactory};
use crate::random::SharedRng;
use mailcast_common::{DispatchMode, TransportEndpoint};
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

/// No endpoint can be selected for a task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotAvailable {
    #[error("No endpoints available for {0} mode")]
    EmptyPool(DispatchMode),

    #[error("No usable local address for direct delivery")]
    NoLocalAddress,
}

/// Source of the host addresses used by direct delivery
pub trait LocalAddressSource: Send + Sync {
    fn local_addresses(&self) -> Vec<IpAddr>;
}

fn is_usable(addr: &IpAddr) -> bool {
    !addr.is_loopback() && !addr.is_unspecified() && !addr.is_multicast()
}

/// A fixed address list
#[derive(Debug, Clone, Default)]
pub struct StaticAddresses(Vec<IpAddr>);

impl StaticAddresses {
    pub fn new(addresses: Vec<IpAddr>) -> Self {
        Self(addresses)
    }
}

impl LocalAddressSource for StaticAddresses {
    fn local_addresses(&self) -> Vec<IpAddr> {
        self.0.iter().copied().filter(is_usable).collect()
    }
}

/// Configured addresses, or the host's outbound addresses when none are
/// configured
#[derive(Debug, Default)]
pub struct SystemAddresses {
    configured: Vec<IpAddr>,
    probed: OnceLock<Vec<IpAddr>>,
}

impl SystemAddresses {
    pub fn new(configured: Vec<IpAddr>) -> Self {
        Self {
            configured,
            probed: OnceLock::new(),
        }
    }

    /// The source address the kernel would pick for each family. A UDP
    /// connect sends nothing.
    fn probe() -> Vec<IpAddr> {
        let targets: [(&str, &str); 2] = [("0.0.0.0:0", "192.0.2.1:25"), ("[::]:0", "[2001:db8::1]:25")];
        let mut found = Vec::new();
        for (bind, target) in targets {
            let (Ok(bind), Ok(target)) = (bind.parse::<SocketAddr>(), target.parse::<SocketAddr>())
            else {
                continue;
            };
            let probe = UdpSocket::bind(bind)
                .and_then(|socket| socket.connect(target).map(|_| socket))
                .and_then(|socket| socket.local_addr());
            match probe {
                Ok(local) if is_usable(&local.ip()) => found.push(local.ip()),
                Ok(_) => {}
                Err(e) => debug!(target = %target, "Local address probe failed: {}", e),
            }
        }
        found
    }
}

impl LocalAddressSource for SystemAddresses {
    fn local_addresses(&self) -> Vec<IpAddr> {
        if !self.configured.is_empty() {
            return self.configured.iter().copied().filter(is_usable).collect();
        }
        self.probed
            .get_or_init(|| {
                let found = Self::probe();
                if found.is_empty() {
                    warn!("No usable local address found for direct delivery");
                }
                found
            })
            .clone()
    }
}

/// Picks an endpoint for each task and hands out its transport
pub struct TransportRouter {
    factory: Arc<dyn TransportFactory>,
    local: Arc<dyn LocalAddressSource>,
    rng: Arc<SharedRng>,
    direct_port: u16,
}

impl TransportRouter {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        local: Arc<dyn LocalAddressSource>,
        rng: Arc<SharedRng>,
        direct_port: u16,
    ) -> Self {
        Self {
            factory,
            local,
            rng,
            direct_port,
        }
    }

    /// Uniform selection with replacement. A failed endpoint stays eligible.
    pub fn select_endpoint(
        &self,
        mode: DispatchMode,
        pool: &[TransportEndpoint],
    ) -> Result<TransportEndpoint, NotAvailable> {
        match mode {
            DispatchMode::DirectOrigin => {
                let addresses = self.local.local_addresses();
                self.rng
                    .choose(&addresses)
                    .map(|address| TransportEndpoint::Origin {
                        address: *address,
                        port: self.direct_port,
                    })
                    .ok_or(NotAvailable::NoLocalAddress)
            }
            _ => {
                let eligible: Vec<&TransportEndpoint> =
                    pool.iter().filter(|e| e.serves(mode)).collect();
                self.rng
                    .choose(&eligible)
                    .map(|endpoint| (*endpoint).clone())
                    .ok_or(NotAvailable::EmptyPool(mode))
            }
        }
    }

    /// Whether any endpoint could ever be selected for `mode`
    pub fn check_available(
        &self,
        mode: DispatchMode,
        pool: &[TransportEndpoint],
    ) -> Result<(), NotAvailable> {
        match mode {
            DispatchMode::DirectOrigin if self.local.local_addresses().is_empty() => {
                Err(NotAvailable::NoLocalAddress)
            }
            DispatchMode::DirectOrigin => Ok(()),
            _ if pool.iter().any(|e| e.serves(mode)) => Ok(()),
            _ => Err(NotAvailable::EmptyPool(mode)),
        }
    }

    pub fn transport_for(
        &self,
        endpoint: &TransportEndpoint,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        self.factory.transport_for(endpoint)
    }
}
