//! Orchestrator control listener

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::OrchestratorConfig;
use crate::error::Result;

use super::{ClusterOrchestrator, MigrationCoordinator};

const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Accepts node control connections, one coordinator thread each
pub struct OrchestratorServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    orchestrator: Arc<ClusterOrchestrator>,
}

impl OrchestratorServer {
    pub fn bind(config: OrchestratorConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Orchestrator listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            orchestrator: Arc::new(ClusterOrchestrator::new(config)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn orchestrator(&self) -> Arc<ClusterOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Accept until the orchestrator shuts down; the socket closes on return
    pub fn run(self) -> Result<()> {
        self.listener.set_nonblocking(true)?;

        while !self.orchestrator.is_shut_down() {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    let orchestrator = Arc::clone(&self.orchestrator);
                    let spawned = thread::Builder::new()
                        .name("coordinator".to_string())
                        .spawn(move || match MigrationCoordinator::new(stream, orchestrator) {
                            Ok(mut coordinator) => coordinator.run(),
                            Err(e) => tracing::warn!("Failed to set up control connection: {}", e),
                        });
                    if let Err(e) = spawned {
                        tracing::warn!("Failed to spawn coordinator thread: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Orchestrator listener on {} closed", self.local_addr);
        Ok(())
    }
}
