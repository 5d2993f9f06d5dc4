//! sealink HTTP server

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use sealink_core::Responder;

use crate::api::{create_router, ApiState};
use crate::config::ServerConfig;

/// Responder behind the HTTP API, with a background sweep for idle sessions.
pub struct SealinkServer {
    config: ServerConfig,
    responder: Arc<Responder>,
    shutdown_tx: watch::Sender<bool>,
}

impl SealinkServer {
    /// Create a server with a fresh signing identity.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let responder_config = config.responder_config()?;
        // RSA key generation is slow
        let responder = tokio::task::spawn_blocking(move || Responder::new(responder_config)).await??;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            responder: Arc::new(responder),
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn responder(&self) -> &Arc<Responder> {
        &self.responder
    }

    /// Router with tracing and, if configured, permissive CORS.
    pub fn router(&self) -> Router {
        let app = create_router(ApiState {
            responder: Arc::clone(&self.responder),
        })
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

        if self.config.cors_permissive {
            app.layer(CorsLayer::permissive())
        } else {
            app
        }
    }

    /// Ask a running server to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM or
    /// [`SealinkServer::shutdown`].
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.serve(listener, Self::shutdown_signal(shutdown_rx)).await
    }

    /// Serve on an already bound listener until `shutdown` completes.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        info!(
            addr = %addr,
            suite = %self.responder.suite(),
            "sealink server listening"
        );

        let sweeper = Self::spawn_sweeper(Arc::clone(&self.responder), self.config.sweep_interval());
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await;
        sweeper.abort();
        served?;

        info!("sealink server stopped");
        Ok(())
    }

    /// Periodically drop sessions whose clients went away without closing.
    pub fn spawn_sweeper(responder: Arc<Responder>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let expired = responder.cleanup_expired().await;
                let live = responder.session_count().await;
                debug!(expired, live, "session sweep");
            }
        })
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    } else {
                        std::future::pending::<()>().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, starting graceful shutdown");
            }
            _ = async {
                loop {
                    if *shutdown.borrow_and_update() {
                        return;
                    }
                    if shutdown.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            } => {
                info!("Shutdown requested");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealink_core::messages::RegisterRequest;
    use sealink_core::transcript::registration_payload;
    use sealink_core::ResponderConfig;
    use sealink_crypto::{codec, CipherSuite, KeyManager};

    fn registration(suite: CipherSuite) -> RegisterRequest {
        let keys = KeyManager::new(suite);
        let signing = keys.generate_signing_keypair().unwrap();
        let box_public = keys.generate_agreement_keypair().unwrap().export_public();
        RegisterRequest {
            suite,
            sign_public_key: codec::encode(&signing.export_public()),
            box_public_key: codec::encode(&box_public),
            signature: codec::encode(
                &signing
                    .sign(registration_payload(&box_public).as_bytes())
                    .unwrap(),
            ),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_abandoned_sessions() {
        let responder = Arc::new(
            Responder::new(ResponderConfig {
                session_ttl: Duration::from_secs(1),
                ..ResponderConfig::default()
            })
            .unwrap(),
        );
        for _ in 0..3 {
            responder.register(&registration(responder.suite())).await.unwrap();
        }
        assert_eq!(responder.session_count().await, 3);

        let sweeper = SealinkServer::spawn_sweeper(Arc::clone(&responder), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(responder.session_count().await, 0);
        sweeper.abort();
    }
}
