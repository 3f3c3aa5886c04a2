//! TCP endpoints
//!
//! Two listeners run for the whole experiment:
//! - distribution: hands every connecting runner the full job list
//! - collection: receives measurement updates and completion sentinels
//!
//! Each accepted connection is served by its own task. Stopping the
//! endpoints closes both listeners and waits for in-flight handlers.

pub mod collection;
pub mod distribution;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::context::ExperimentContext;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Distribution,
    Collection,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Role::Distribution => "benchmark-list",
            Role::Collection => "measurement-report",
        }
    }
}

/// Handle to the running endpoints
pub struct Endpoints {
    stop: watch::Sender<bool>,
    loops: JoinSet<()>,
    list_addr: SocketAddr,
    report_addr: SocketAddr,
}

impl Endpoints {
    /// Binds both listeners on `host` and starts their accept loops
    pub async fn start(
        ctx: Arc<ExperimentContext>,
        host: &str,
        list_port: u16,
        report_port: u16,
    ) -> std::io::Result<Self> {
        let list = TcpListener::bind((host, list_port)).await?;
        let report = TcpListener::bind((host, report_port)).await?;
        let list_addr = list.local_addr()?;
        let report_addr = report.local_addr()?;

        let (stop, _) = watch::channel(false);
        let mut loops = JoinSet::new();
        loops.spawn(serve(
            Role::Distribution,
            list,
            Arc::clone(&ctx),
            stop.subscribe(),
        ));
        loops.spawn(serve(Role::Collection, report, ctx, stop.subscribe()));

        info!(
            "Listening for benchmark-list requests on {} and measurement reports on {}",
            list_addr, report_addr
        );

        Ok(Self {
            stop,
            loops,
            list_addr,
            report_addr,
        })
    }

    pub fn list_addr(&self) -> SocketAddr {
        self.list_addr
    }

    pub fn report_addr(&self) -> SocketAddr {
        self.report_addr
    }

    /// Stops accepting, closes the listeners and drains in-flight handlers
    pub async fn shutdown(mut self) {
        self.stop.send_replace(true);
        while let Some(joined) = self.loops.join_next().await {
            if let Err(e) = joined {
                error!("Endpoint task failed: {}", e);
            }
        }
        info!("Endpoints stopped");
    }
}

async fn serve(
    role: Role,
    listener: TcpListener,
    ctx: Arc<ExperimentContext>,
    mut stop: watch::Receiver<bool>,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted {} connection from {}", role.name(), peer);
                    let ctx = Arc::clone(&ctx);
                    handlers.spawn(async move {
                        let result = match role {
                            Role::Distribution => distribution::handle(&ctx, stream)
                                .await
                                .map(|_| ())
                                .map_err(anyhow::Error::from),
                            Role::Collection => collection::handle(&ctx, stream).await,
                        };
                        if let Err(e) = result {
                            error!("{} handler for {} failed: {:#}", role.name(), peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept {} connection: {}", role.name(), e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    error!("{} handler panicked: {}", role.name(), e);
                }
            }
        }
    }

    drop(listener);
    debug!(
        "Closed {} listener, draining {} handlers",
        role.name(),
        handlers.len()
    );

    // in-flight handlers run to completion
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!("{} handler panicked: {}", role.name(), e);
        }
    }
    debug!("Drained {} handlers", role.name());
}
