//! The forwarding node and its async command loop.
//!
//! A [`Node`] owns one [`ForwardingEngine`] and is the only writer to it.
//! Callers hold a [`NodeHandle`] and send commands over an mpsc channel;
//! each command carries a oneshot sender for its reply. The loop also drives
//! the periodic reassembly sweep, and on shutdown flushes whatever is still
//! queued or buffered.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ipfwd_core::{Datagram, DatagramId, InterfaceId};
use ipfwd_engine::{
    Collaborators, DeliverySink, Disposition, EngineError, EngineStats, ErrorReporter,
    FlushSummary, ForwardingEngine, Hook, HookId, QueuedDatagram, SendRequest, TransmitSink,
};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::sinks::{TracingDelivery, TracingErrorReporter, TracingTransmit};

/// Capacity of the command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;

type Reply<T> = oneshot::Sender<T>;
type QueuedEdit = Box<dyn FnOnce(&mut QueuedDatagram) + Send>;

enum Command {
    Receive {
        datagram: Datagram,
        in_if: InterfaceId,
        reply: Reply<Disposition>,
    },
    Send {
        request: SendRequest,
        payload: Vec<u8>,
        reply: Reply<Result<Disposition, EngineError>>,
    },
    LocalOut {
        datagram: Datagram,
        out_if: Option<InterfaceId>,
        reply: Reply<Disposition>,
    },
    Queued {
        id: DatagramId,
        reply: Reply<Result<QueuedDatagram, EngineError>>,
    },
    EditQueued {
        id: DatagramId,
        edit: QueuedEdit,
        reply: Reply<Result<(), EngineError>>,
    },
    QueuedIds {
        reply: Reply<Vec<DatagramId>>,
    },
    Reinject {
        id: DatagramId,
        reply: Reply<Result<Disposition, EngineError>>,
    },
    DropQueued {
        id: DatagramId,
        reply: Reply<Result<(), EngineError>>,
    },
    RegisterHook {
        priority: i32,
        hook: Box<dyn Hook>,
        reply: Reply<HookId>,
    },
    UnregisterHook {
        priority: i32,
        id: HookId,
        reply: Reply<Result<Box<dyn Hook>, EngineError>>,
    },
    Sweep {
        reply: Reply<usize>,
    },
    Flush {
        reply: Reply<FlushSummary>,
    },
    Stats {
        reply: Reply<EngineStats>,
    },
}

/// The outward-facing collaborators a node is wired to. Routing and
/// interface tables come from the configuration.
pub struct Sinks {
    pub errors: Box<dyn ErrorReporter>,
    pub delivery: Box<dyn DeliverySink>,
    pub transmit: Box<dyn TransmitSink>,
}

impl Sinks {
    pub fn new(
        errors: impl ErrorReporter + 'static,
        delivery: impl DeliverySink + 'static,
        transmit: impl TransmitSink + 'static,
    ) -> Self {
        Self {
            errors: Box::new(errors),
            delivery: Box::new(delivery),
            transmit: Box::new(transmit),
        }
    }

    /// Sinks that only log. No protocol is bound for local delivery, so
    /// everything addressed to the node draws a protocol-unreachable report.
    pub fn tracing() -> Self {
        Self::new(TracingErrorReporter, TracingDelivery::default(), TracingTransmit)
    }
}

/// A forwarding engine running on the tokio runtime.
pub struct Node {
    engine: ForwardingEngine,
    started: Instant,
    sweep_period: Duration,
    command_tx: mpsc::Sender<Command>,
    command_rx: mpsc::Receiver<Command>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    /// Create a node from configuration.
    pub fn new(config: &NodeConfig, sinks: Sinks) -> Result<Self, NodeError> {
        let engine_config = config.engine_config()?;
        let (routes, interfaces) = config.build_tables()?;
        tracing::info!(
            interfaces = interfaces.len(),
            routes = routes.len(),
            multicast_routes = routes.multicast_routes().len(),
            forwarding = engine_config.forwarding,
            "node configured"
        );
        let collab = Collaborators {
            routes: Box::new(routes),
            interfaces: Box::new(interfaces),
            errors: sinks.errors,
            delivery: sinks.delivery,
            transmit: sinks.transmit,
        };
        Ok(Self::with_engine(ForwardingEngine::new(engine_config, collab)))
    }

    /// Wrap an engine built by the caller.
    pub fn with_engine(engine: ForwardingEngine) -> Self {
        let sweep_period = Duration::from_millis(engine.config().sweep_interval_ms.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            engine,
            started: Instant::now(),
            sweep_period,
            command_tx,
            command_rx,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            commands: self.command_tx.clone(),
            shutdown: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn engine(&self) -> &ForwardingEngine {
        &self.engine
    }

    /// Milliseconds since the node was created; the engine's clock.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Run the node on its own task until shutdown, then flush.
    pub fn spawn(mut self) -> (NodeHandle, JoinHandle<FlushSummary>) {
        let handle = self.handle();
        let task = tokio::spawn(async move {
            self.run().await;
            self.shutdown()
        });
        (handle, task)
    }

    /// Process commands and sweep timers until shutdown is signalled.
    pub async fn run(&mut self) {
        let mut sweep_interval = tokio::time::interval(self.sweep_period);

        // Don't fire immediately
        sweep_interval.tick().await;

        tracing::info!(sweep_ms = self.sweep_period.as_millis() as u64, "entering event loop");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    tracing::info!("shutdown signal received");
                    break;
                }

                _ = sweep_interval.tick() => {
                    let now = self.now_ms();
                    let expired = self.engine.sweep(now);
                    if expired > 0 {
                        tracing::debug!(expired, "reassembly sweep");
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            tracing::info!("command channel closed, exiting");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Signal the node to shut down.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop accepting commands and discard all queued and buffered datagrams.
    pub fn shutdown(mut self) -> FlushSummary {
        tracing::info!("shutting down node");
        self.trigger_shutdown();
        self.command_rx.close();

        let summary = self.engine.flush();
        let stats = self.engine.stats();
        tracing::info!(
            queued = summary.queued,
            reassembly_groups = summary.reassembly_groups,
            forwarded = stats.forwarded,
            delivered = stats.local_deliver,
            dropped = stats.dropped,
            "node shutdown complete"
        );
        summary
    }

    fn handle_command(&mut self, command: Command) {
        let now = self.now_ms();
        // A send error means the caller stopped waiting.
        match command {
            Command::Receive {
                datagram,
                in_if,
                reply,
            } => {
                let _ = reply.send(self.engine.receive(datagram, in_if, now));
            }
            Command::Send {
                request,
                payload,
                reply,
            } => {
                let _ = reply.send(self.engine.send(request, payload, now));
            }
            Command::LocalOut {
                datagram,
                out_if,
                reply,
            } => {
                let _ = reply.send(self.engine.local_out(datagram, out_if, now));
            }
            Command::Queued { id, reply } => {
                let _ = reply.send(self.engine.queued(id).cloned());
            }
            Command::EditQueued { id, edit, reply } => {
                let _ = reply.send(self.engine.queued_mut(id).map(edit));
            }
            Command::QueuedIds { reply } => {
                let _ = reply.send(self.engine.queued_ids());
            }
            Command::Reinject { id, reply } => {
                let _ = reply.send(self.engine.reinject(id, now));
            }
            Command::DropQueued { id, reply } => {
                let _ = reply.send(self.engine.drop_queued(id));
            }
            Command::RegisterHook {
                priority,
                hook,
                reply,
            } => {
                let _ = reply.send(self.engine.register_hook(priority, hook));
            }
            Command::UnregisterHook {
                priority,
                id,
                reply,
            } => {
                let _ = reply.send(self.engine.unregister_hook(priority, id));
            }
            Command::Sweep { reply } => {
                let _ = reply.send(self.engine.sweep(now));
            }
            Command::Flush { reply } => {
                let _ = reply.send(self.engine.flush());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.engine.stats());
            }
        }
    }
}

/// Cloneable access to a running [`Node`].
///
/// Every method fails with [`NodeError::Closed`] once the node has shut down.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl NodeHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| NodeError::Closed)?;
        rx.await.map_err(|_| NodeError::Closed)
    }

    /// Hand a datagram that arrived on `in_if` to the engine.
    pub async fn receive(
        &self,
        datagram: Datagram,
        in_if: InterfaceId,
    ) -> Result<Disposition, NodeError> {
        self.request(|reply| Command::Receive {
            datagram,
            in_if,
            reply,
        })
        .await
    }

    /// Build and send a datagram on behalf of a local protocol.
    pub async fn send(
        &self,
        request: SendRequest,
        payload: Vec<u8>,
    ) -> Result<Disposition, NodeError> {
        Ok(self
            .request(|reply| Command::Send {
                request,
                payload,
                reply,
            })
            .await??)
    }

    pub async fn local_out(
        &self,
        datagram: Datagram,
        out_if: Option<InterfaceId>,
    ) -> Result<Disposition, NodeError> {
        self.request(|reply| Command::LocalOut {
            datagram,
            out_if,
            reply,
        })
        .await
    }

    /// A snapshot of a queued datagram.
    pub async fn queued(&self, id: DatagramId) -> Result<QueuedDatagram, NodeError> {
        Ok(self.request(|reply| Command::Queued { id, reply }).await??)
    }

    /// Modify a queued datagram in place; changes apply on reinjection.
    pub async fn edit_queued(
        &self,
        id: DatagramId,
        edit: impl FnOnce(&mut QueuedDatagram) + Send + 'static,
    ) -> Result<(), NodeError> {
        Ok(self
            .request(|reply| Command::EditQueued {
                id,
                edit: Box::new(edit),
                reply,
            })
            .await??)
    }

    pub async fn queued_ids(&self) -> Result<Vec<DatagramId>, NodeError> {
        self.request(|reply| Command::QueuedIds { reply }).await
    }

    /// Resume a queued datagram at the stage after the one that queued it.
    pub async fn reinject(&self, id: DatagramId) -> Result<Disposition, NodeError> {
        Ok(self.request(|reply| Command::Reinject { id, reply }).await??)
    }

    pub async fn drop_queued(&self, id: DatagramId) -> Result<(), NodeError> {
        Ok(self.request(|reply| Command::DropQueued { id, reply }).await??)
    }

    pub async fn register_hook(
        &self,
        priority: i32,
        hook: Box<dyn Hook>,
    ) -> Result<HookId, NodeError> {
        self.request(|reply| Command::RegisterHook {
            priority,
            hook,
            reply,
        })
        .await
    }

    /// Remove a hook and hand it back.
    pub async fn unregister_hook(
        &self,
        priority: i32,
        id: HookId,
    ) -> Result<Box<dyn Hook>, NodeError> {
        Ok(self
            .request(|reply| Command::UnregisterHook {
                priority,
                id,
                reply,
            })
            .await??)
    }

    /// Expire reassembly groups now instead of waiting for the timer.
    pub async fn sweep(&self) -> Result<usize, NodeError> {
        self.request(|reply| Command::Sweep { reply }).await
    }

    pub async fn flush(&self) -> Result<FlushSummary, NodeError> {
        self.request(|reply| Command::Flush { reply }).await
    }

    pub async fn stats(&self) -> Result<EngineStats, NodeError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Ask the node to stop. Returns immediately.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
