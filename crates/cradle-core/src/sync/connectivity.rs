//! Network reachability signal.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::watch;

/// Reports whether the remote side is currently reachable
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Reachability set explicitly by the host environment
#[derive(Debug)]
pub struct ManualConnectivity {
    state: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        Self { state }
    }

    pub fn set_online(&self, online: bool) {
        self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
                *current = online;
                true
            }
        });
    }

    /// Receive every online/offline change
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
    async fn is_online(&self) -> bool {
        *self.state.borrow()
    }
}

/// Online when a TCP connection to `addr` opens within `timeout`
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                tracing::debug!("Probe {} unreachable: {error}", self.addr);
                false
            }
            Err(_) => {
                tracing::debug!("Probe {} timed out after {:?}", self.addr, self.timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_connectivity_notifies_changes() {
        let connectivity = ManualConnectivity::new(true);
        let mut changes = connectivity.subscribe();
        assert!(connectivity.is_online().await);

        connectivity.set_online(false);
        changes.changed().await.unwrap();
        assert!(!*changes.borrow());
        assert!(!connectivity.is_online().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tcp_probe_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let probe = TcpProbe::new(addr, Duration::from_secs(2));
        assert!(probe.is_online().await);

        drop(listener);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tcp_probe_reports_closed_port_offline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = TcpProbe::new(addr, Duration::from_millis(500));
        assert!(!probe.is_online().await);
    }
}
