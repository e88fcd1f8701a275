//! Connectivity signals.

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::watch, task::JoinHandle, time};

use super::ConnectivitySignal;

/// Connectivity flipped by hand; used by the console's `online`/`offline`
/// commands and by tests
pub struct ManualConnectivity {
    sender: watch::Sender<bool>,
}

impl ManualConnectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender }
    }

    /// Publish a transition; repeated values are not re-announced
    pub fn set_online(&self, online: bool) {
        self.sender.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }
}

impl ConnectivitySignal for ManualConnectivity {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Connectivity derived from periodically opening a TCP connection
///
/// The probe task stops when the value is dropped.
pub struct ProbeConnectivity {
    sender: Arc<watch::Sender<bool>>,
    task: JoinHandle<()>,
}

impl ProbeConnectivity {
    /// Start probing `addr` every `interval`.
    ///
    /// Starts out online and flips on the first failed probe.
    pub fn spawn(addr: SocketAddr, interval: Duration, timeout: Duration) -> Self {
        let (sender, _) = watch::channel(true);
        let sender = Arc::new(sender);

        let task = {
            let sender = Arc::clone(&sender);
            tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                loop {
                    ticker.tick().await;
                    let reachable = matches!(
                        time::timeout(timeout, TcpStream::connect(addr)).await,
                        Ok(Ok(_))
                    );
                    let changed = sender.send_if_modified(|online| {
                        let changed = *online != reachable;
                        *online = reachable;
                        changed
                    });
                    if changed {
                        log::info!(
                            "Connectivity probe to {} reports {}",
                            addr,
                            if reachable { "online" } else { "offline" }
                        );
                    }
                }
            })
        };

        Self { sender, task }
    }
}

impl ConnectivitySignal for ProbeConnectivity {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Drop for ProbeConnectivity {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_manual_connectivity_announces_transitions_only() {
        let signal = ManualConnectivity::new(true);
        let mut rx = signal.subscribe();
        rx.borrow_and_update();

        signal.set_online(true);
        assert!(!rx.has_changed().unwrap());

        signal.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!signal.is_online());
    }

    #[tokio::test]
    async fn test_probe_goes_offline_when_listener_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = ProbeConnectivity::spawn(
            addr,
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        let mut rx = probe.subscribe();
        let went_offline = time::timeout(Duration::from_secs(2), rx.wait_for(|online| !online))
            .await
            .map(|seen| seen.is_ok())
            .unwrap_or(false);

        assert!(went_offline);
        assert!(!probe.is_online());
    }
}
