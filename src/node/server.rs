//! Storage node TCP server
//!
//! Accepts client connections and serves each on its own thread.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::storage::{FileStore, PersistentStore};

use super::{ClientConnection, KvService, OrchestratorLink, ServingState};

/// How often the accept loop checks for shutdown
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// One storage node: client listener, service, and optional orchestrator link
pub struct NodeServer {
    config: NodeConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    service: Arc<KvService>,
    link: Mutex<Option<OrchestratorLink>>,
    shutdown: AtomicBool,
    active_connections: Arc<AtomicUsize>,
}

impl NodeServer {
    /// Open the configured data directory and bind
    pub fn open(config: NodeConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open(&config.data_dir)?);
        Self::bind(config, store)
    }

    /// Bind the client listener over an existing store
    ///
    /// The bound address (port 0 resolved) becomes the node's identity.
    pub fn bind(config: NodeConfig, store: Arc<dyn PersistentStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        let local_addr = listener.local_addr()?;

        let state = if config.orchestrator_addr.is_some() {
            ServingState::Awaiting
        } else {
            ServingState::Standalone
        };
        let service = Arc::new(KvService::new(
            local_addr.to_string(),
            store,
            config.cache,
            state,
        ));

        tracing::info!("Node {} bound", local_addr);

        Ok(Self {
            config,
            listener,
            local_addr,
            service,
            link: Mutex::new(None),
            shutdown: AtomicBool::new(false),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Register with the configured orchestrator (no-op when standalone or
    /// already connected)
    pub fn connect_orchestrator(&self) -> Result<()> {
        let addr = match &self.config.orchestrator_addr {
            Some(addr) => addr,
            None => return Ok(()),
        };
        let mut link = self.link.lock();
        if link.is_none() {
            *link = Some(OrchestratorLink::connect(addr, Arc::clone(&self.service))?);
        }
        Ok(())
    }

    /// Accept clients until `shutdown` is called or the orchestrator removes
    /// the node (blocking)
    pub fn run(&self) -> Result<()> {
        self.connect_orchestrator()?;
        self.listener.set_nonblocking(true)?;
        tracing::info!("Node {} accepting clients", self.local_addr);

        while !self.shutdown.load(Ordering::SeqCst) {
            if matches!(self.service.state(), ServingState::Stopped) {
                tracing::info!("Node {} removed from the cluster", self.local_addr);
                break;
            }
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    if self.active_connections.load(Ordering::SeqCst) >= self.config.max_connections
                    {
                        tracing::warn!("Connection limit reached, rejecting {}", peer);
                        continue;
                    }
                    self.spawn_connection(stream);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Node {} stopped accepting clients", self.local_addr);
        Ok(())
    }

    fn spawn_connection(&self, stream: std::net::TcpStream) {
        let service = Arc::clone(&self.service);
        let active = Arc::clone(&self.active_connections);
        let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

        active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("client".to_string())
            .spawn(move || {
                match ClientConnection::new(stream, service) {
                    Ok(mut conn) => {
                        if let Err(e) = conn.set_timeouts(read_ms, write_ms) {
                            tracing::warn!("Failed to set timeouts for {}: {}", conn.peer_addr(), e);
                        }
                        if let Err(e) = conn.handle() {
                            tracing::debug!("Connection {} ended: {}", conn.peer_addr(), e);
                        }
                    }
                    Err(e) => tracing::warn!("Failed to set up connection: {}", e),
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            tracing::warn!("Failed to spawn connection thread: {}", e);
            self.active_connections.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Stop accepting clients and leave the cluster, handing off all data
    ///
    /// Safe to call from any thread while `run` is blocking. A second caller
    /// waits until the first has finished leaving.
    pub fn shutdown(&self) {
        let mut link = self.link.lock();
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        match link.take() {
            Some(link) => {
                if let Err(e) = link.leave() {
                    tracing::warn!("Node {} failed to leave cleanly: {}", self.local_addr, e);
                }
            }
            None => self.service.mark_stopped(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Ring identity (`host:port` as bound)
    pub fn name(&self) -> &str {
        self.service.name()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn service(&self) -> Arc<KvService> {
        Arc::clone(&self.service)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }
}
