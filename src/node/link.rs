//! Orchestrator link
//!
//! A storage node's control connection: registers with `INIT`, then feeds
//! incoming control messages through a `NodeMigrator` on a reader thread.

use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::Result;
use crate::protocol::{read_message, write_control, ControlKind, ControlMessage, Message};

use super::{KvService, NodeMigrator, ServingState};

/// Control connection to the orchestrator
pub struct OrchestratorLink {
    stream: TcpStream,
    writer: Arc<Mutex<BufWriter<TcpStream>>>,
    service: Arc<KvService>,
    reader_handle: Option<JoinHandle<()>>,
}

impl OrchestratorLink {
    /// Connect, announce the node, and start processing control messages
    pub fn connect(addr: &str, service: Arc<KvService>) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;

        let writer = Arc::new(Mutex::new(BufWriter::new(stream.try_clone()?)));
        write_control(
            &mut *writer.lock(),
            &ControlMessage::Init {
                node: service.name().to_string(),
            },
        )?;
        tracing::info!("{} registered with orchestrator {}", service.name(), addr);

        let reader = BufReader::new(stream.try_clone()?);
        let migrator = NodeMigrator::new(Arc::clone(&service));
        let loop_writer = Arc::clone(&writer);
        let reader_handle = thread::Builder::new()
            .name(format!("control-{}", service.name()))
            .spawn(move || run_control_loop(reader, loop_writer, migrator))?;

        Ok(Self {
            stream,
            writer,
            service,
            reader_handle: Some(reader_handle),
        })
    }

    /// Leave voluntarily: stop serving and hand every pair to the orchestrator
    ///
    /// A node the orchestrator already removed just closes the connection.
    pub fn leave(mut self) -> Result<()> {
        if matches!(self.service.state(), ServingState::Stopped) {
            let _ = self.stream.shutdown(Shutdown::Both);
            if let Some(handle) = self.reader_handle.take() {
                let _ = handle.join();
            }
            return Ok(());
        }

        let pairs = self.service.drain_all()?;
        self.service.mark_stopped();
        tracing::info!(
            "{} leaving with {} buffered pairs",
            self.service.name(),
            pairs.len()
        );

        {
            let mut writer = self.writer.lock();
            for chunk in ControlMessage::shutdown_chunks(pairs) {
                write_control(&mut *writer, &chunk)?;
            }
        }
        self.stream.shutdown(Shutdown::Write)?;

        if let Some(handle) = self.reader_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn run_control_loop(
    mut reader: BufReader<TcpStream>,
    writer: Arc<Mutex<BufWriter<TcpStream>>>,
    mut migrator: NodeMigrator,
) {
    let name = migrator.service().name().to_string();

    loop {
        let message = match read_message(&mut reader) {
            Ok(Message::Control(message)) => message,
            Ok(other) => {
                tracing::warn!("{} ignoring non-control frame: {:?}", name, other);
                continue;
            }
            Err(e) if e.is_disconnect() => {
                tracing::info!("{} orchestrator connection closed", name);
                return;
            }
            Err(e) => {
                // Framing is lost; close so the orchestrator notices
                tracing::warn!("{} control connection failed: {}", name, e);
                let _ = reader.get_ref().shutdown(Shutdown::Both);
                return;
            }
        };

        let kind = message.kind();
        tracing::debug!("{} received {}", name, kind);

        match migrator.handle(message) {
            Ok(replies) => {
                let mut writer = writer.lock();
                for reply in replies {
                    if let Err(e) = write_control(&mut *writer, &reply) {
                        tracing::warn!("{} failed to send {}: {}", name, reply.kind(), e);
                        return;
                    }
                }
            }
            Err(e) => tracing::warn!("{} failed to apply {}: {}", name, kind, e),
        }

        if kind == ControlKind::Shutdown {
            return;
        }
    }
}
