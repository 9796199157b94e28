//! HTTP server lifecycle: bind, serve, stop.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PeerConfig;

use super::routes::{PeerState, routes};

#[derive(Debug, Error)]
pub enum ServeError {
    /// Every candidate port refused to bind. Individual bind errors are
    /// logged at debug level as they happen.
    #[error("no free port in range {start}..{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// A running peer server.
///
/// Dropping the handle leaves the server running until the process exits;
/// call [`ServerHandle::stop`] for an orderly teardown.
#[derive(Debug)]
pub struct ServerHandle {
    port: u16,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound port. Stable for the life of the server.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Signal shutdown and wait for the serve task to drain.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "serve task terminated abnormally");
        }
        info!(port = self.port, "peer stopped");
    }
}

/// Bind the first free candidate port and serve on a background task.
///
/// The listener accepts from the moment this returns; requests queue in
/// the kernel backlog until the serve task picks them up, so a subject
/// spawned immediately afterwards cannot race the server.
pub async fn start(config: &PeerConfig) -> Result<ServerHandle, ServeError> {
    let (listener, port) = bind_first_free(config).await?;
    let state = Arc::new(PeerState {
        echo_requests: config.echo_requests,
    });
    let app = routes(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_rx))
            .await
        {
            warn!(error = %e, "serve loop ended with error");
        }
    });

    info!(host = %config.host, port, "peer listening");

    Ok(ServerHandle {
        port,
        shutdown_tx,
        task,
    })
}

async fn bind_first_free(config: &PeerConfig) -> Result<(TcpListener, u16), ServeError> {
    let range = config.port_range();
    let (start, end) = (range.start, range.end);
    for port in range {
        match TcpListener::bind((config.host.as_str(), port)).await {
            Ok(listener) => {
                debug!(port, "bound");
                return Ok((listener, port));
            }
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(ServeError::NoAvailablePort { start, end })
}

async fn shutdown_signal(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            // handle dropped without signaling; serve until process exit
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(port_base: u16, port_span: u16) -> PeerConfig {
        PeerConfig {
            port_base,
            port_span,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn binds_the_first_free_port_in_order() {
        // occupy the first candidate so start has to move on
        let holder = std::net::TcpListener::bind(("127.0.0.1", 18350)).unwrap();
        let handle = start(&config(18350, 4)).await.unwrap();
        assert_eq!(handle.port(), 18351);
        handle.stop().await;
        drop(holder);
    }

    #[tokio::test]
    async fn reports_exhaustion_when_nothing_binds() {
        let _h1 = std::net::TcpListener::bind(("127.0.0.1", 18360)).unwrap();
        let _h2 = std::net::TcpListener::bind(("127.0.0.1", 18361)).unwrap();
        let err = start(&config(18360, 2)).await.unwrap_err();
        assert!(matches!(
            err,
            ServeError::NoAvailablePort {
                start: 18360,
                end: 18362
            }
        ));
    }

    #[tokio::test]
    async fn answers_requests_until_stopped() {
        let handle = start(&config(18370, 4)).await.unwrap();
        let port = handle.port();

        let response = reqwest::get(format!("http://127.0.0.1:{port}/ping"))
            .await
            .unwrap();
        assert_eq!(response.status(), 500);

        handle.stop().await;
        assert!(
            reqwest::get(format!("http://127.0.0.1:{port}/ping"))
                .await
                .is_err()
        );
    }
}
