//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use comet_bridge::net::ConnectionTracker;
use comet_bridge::{BridgeConfig, CometPipeline, CometServer};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running bridge; dropping it stops the server.
pub struct RunningBridge {
    pub addr: SocketAddr,
    tracker: ConnectionTracker,
    stop: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl RunningBridge {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn open_streams(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Poll until exactly `expected` streams are open.
    pub async fn wait_for_open_streams(&self, expected: u64) {
        let waited = tokio::time::timeout(Duration::from_secs(5), async {
            while self.open_streams() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(
            waited.is_ok(),
            "expected {expected} open streams, still {}",
            self.open_streams()
        );
    }

    /// Trigger graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), &mut self.server)
            .await
            .expect("server should stop within the drain window")
            .unwrap();
    }
}

/// Start a bridge on an ephemeral local port.
pub async fn start_bridge<P: CometPipeline>(config: BridgeConfig, pipeline: P) -> RunningBridge {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = CometServer::new(config, pipeline).unwrap();
    let tracker = server.connection_tracker();

    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let _ = server
            .run_until(listener, async {
                let _ = stopped.await;
            })
            .await;
    });

    RunningBridge {
        addr,
        tracker,
        stop: Some(stop),
        server,
    }
}
