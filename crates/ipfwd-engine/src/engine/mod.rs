//! The forwarding engine.
//!
//! [`ForwardingEngine`] takes each datagram from entry to a terminal
//! [`Disposition`] synchronously. Received datagrams enter through
//! [`ForwardingEngine::receive`], locally originated ones through
//! [`ForwardingEngine::send`] or [`ForwardingEngine::local_out`]. The only
//! suspension point is a hook returning `Queue`; such datagrams wait in the
//! engine until the caller reinjects or drops them.
//!
//! Time is supplied by the caller as milliseconds on any monotonic clock.

pub mod config;
mod inbound;
mod outbound;
pub mod stats;
pub mod types;

use std::ops::ControlFlow;

use ipfwd_core::address::Ipv4AddrExt;
use ipfwd_core::datagram::Datagram;
use ipfwd_core::icmp::ErrorKind;
use ipfwd_core::types::{DatagramId, InterfaceId};

use crate::collab::Collaborators;
use crate::error::EngineError;
use crate::hook::{Egress, Hook, HookId, HookRegistry, HookResult, HookStage};
use crate::queue::{QueuedDatagram, QueuedMap};
use crate::reassembly::ReassemblyBuffer;

pub use config::EngineConfig;
pub use stats::EngineStats;
pub use types::{Disposition, DropReason, FlushSummary, SendRequest};

pub struct ForwardingEngine {
    config: EngineConfig,
    collab: Collaborators,
    hooks: HookRegistry,
    reassembly: ReassemblyBuffer,
    queued: QueuedMap,
    stats: EngineStats,
    /// Next pipeline identity to stamp.
    next_uid: u64,
    /// Identification for the next locally originated datagram.
    next_identification: u16,
    last_sweep_ms: u64,
}

impl ForwardingEngine {
    pub fn new(config: EngineConfig, collab: Collaborators) -> Self {
        let reassembly =
            ReassemblyBuffer::new(config.fragment_timeout_ms, config.max_reassembly_entries);
        Self {
            config,
            collab,
            hooks: HookRegistry::new(),
            reassembly,
            queued: QueuedMap::new(),
            stats: EngineStats::default(),
            next_uid: 1,
            next_identification: 0,
            last_sweep_ms: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn collaborators_mut(&mut self) -> &mut Collaborators {
        &mut self.collab
    }

    pub fn reassembly(&self) -> &ReassemblyBuffer {
        &self.reassembly
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    // ---- hooks ----

    /// Register a hook at `priority`. Lower priorities run first.
    pub fn register_hook(&mut self, priority: i32, hook: Box<dyn Hook>) -> HookId {
        let id = self.hooks.register(priority, hook);
        tracing::debug!(hook = id.0, priority, "registered hook");
        id
    }

    /// Remove a hook, handing it back.
    pub fn unregister_hook(
        &mut self,
        priority: i32,
        id: HookId,
    ) -> Result<Box<dyn Hook>, EngineError> {
        match self.hooks.unregister(priority, id) {
            Some(hook) => {
                tracing::debug!(hook = id.0, priority, "unregistered hook");
                Ok(hook)
            }
            None => {
                tracing::warn!(hook = id.0, priority, "unregister of unknown hook");
                Err(EngineError::HookNotRegistered { id, priority })
            }
        }
    }

    // ---- queued datagrams ----

    pub fn queued(&self, id: DatagramId) -> Result<&QueuedDatagram, EngineError> {
        self.queued.get(id).ok_or(EngineError::NotQueued(id))
    }

    /// Mutable access; edits to the datagram, `out_if` and `next_hop` are
    /// honoured on reinjection.
    pub fn queued_mut(&mut self, id: DatagramId) -> Result<&mut QueuedDatagram, EngineError> {
        self.queued.get_mut(id).ok_or(EngineError::NotQueued(id))
    }

    pub fn queued_ids(&self) -> Vec<DatagramId> {
        self.queued.ids()
    }

    /// Discard a queued datagram.
    pub fn drop_queued(&mut self, id: DatagramId) -> Result<(), EngineError> {
        match self.queued.remove(id) {
            Some(entry) => {
                self.stats.dropped += 1;
                tracing::debug!(datagram = %id, stage = %entry.stage, "dropped queued datagram");
                Ok(())
            }
            None => {
                tracing::warn!(datagram = %id, "drop of datagram that is not queued");
                Err(EngineError::NotQueued(id))
            }
        }
    }

    /// Resume a queued datagram right after the stage that queued it, using
    /// the entry's current outgoing interface and next hop.
    pub fn reinject(&mut self, id: DatagramId, now_ms: u64) -> Result<Disposition, EngineError> {
        let Some(entry) = self.queued.get(id) else {
            tracing::warn!(datagram = %id, "reinject of datagram that is not queued");
            return Err(EngineError::NotQueued(id));
        };
        if entry.stage == HookStage::PostRouting && entry.out_if.is_none() {
            return Err(EngineError::MissingEgress {
                id,
                stage: entry.stage,
            });
        }
        let Some(entry) = self.queued.remove(id) else {
            return Err(EngineError::NotQueued(id));
        };

        self.maybe_sweep(now_ms);
        self.stats.reinjected += 1;
        tracing::debug!(datagram = %id, stage = %entry.stage, "reinjecting datagram");

        let egress = entry.egress();
        let QueuedDatagram {
            datagram,
            in_if,
            stage,
            multicast_loop,
            ..
        } = entry;

        let disposition = match stage {
            HookStage::PreRouting => self.route_received(datagram, in_if, now_ms),
            HookStage::LocalIn => self.reassemble_and_deliver(datagram, in_if, now_ms),
            HookStage::Forward => self.finish_forward(datagram, in_if, egress),
            HookStage::PostRouting => match egress.interface {
                Some(out_if) => self.fragment_and_send(datagram, in_if, out_if, egress.next_hop),
                None => self.discard(DropReason::NoRoute, id),
            },
            HookStage::LocalOut => self.route_local(datagram, egress, multicast_loop),
        };
        Ok(disposition)
    }

    // ---- timers ----

    /// Purge expired reassembly groups now, reporting each one once.
    /// Returns how many groups expired.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        self.last_sweep_ms = now_ms;
        let expired = self.reassembly.purge_expired(now_ms);
        for group in &expired {
            tracing::debug!(
                key = %group.key,
                fragments = group.fragments,
                held_bytes = group.held_bytes,
                "reassembly timed out"
            );
            self.report_error(&group.datagram, ErrorKind::ReassemblyTimeout);
        }
        self.stats.reassembly_timeouts += expired.len() as u64;
        expired.len()
    }

    pub(crate) fn maybe_sweep(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.last_sweep_ms) >= self.config.sweep_interval_ms {
            self.sweep(now_ms);
        }
    }

    /// Discard every queued datagram and reassembly group without reporting.
    pub fn flush(&mut self) -> FlushSummary {
        let summary = FlushSummary {
            queued: self.queued.clear(),
            reassembly_groups: self.reassembly.clear(),
        };
        tracing::debug!(
            queued = summary.queued,
            reassembly_groups = summary.reassembly_groups,
            "flushed engine state"
        );
        summary
    }

    // ---- shared pipeline helpers ----

    fn stamp(&mut self, datagram: &mut Datagram) {
        datagram.set_id(DatagramId(self.next_uid));
        self.next_uid += 1;
    }

    fn next_identification(&mut self) -> u16 {
        let id = self.next_identification;
        self.next_identification = self.next_identification.wrapping_add(1);
        id
    }

    /// Pass an ICMP error to the reporter. Datagrams sent to a group or a
    /// broadcast address, or from one, never draw an error.
    fn report_error(&mut self, datagram: &Datagram, kind: ErrorKind) {
        let (src, dst) = (datagram.source, datagram.destination);
        let interfaces = &self.collab.interfaces;
        if dst.is_multicast()
            || dst.is_limited_broadcast()
            || interfaces.is_local_broadcast(dst)
            || src.is_multicast()
            || src.is_limited_broadcast()
        {
            tracing::trace!(datagram = %datagram.id(), %src, %dst, %kind, "icmp error suppressed");
            return;
        }
        self.collab.errors.report(datagram, kind);
    }

    fn discard(&mut self, reason: DropReason, id: DatagramId) -> Disposition {
        self.stats.dropped += 1;
        tracing::debug!(datagram = %id, %reason, "dropped datagram");
        Disposition::Dropped(reason)
    }

    /// Run one hook stage. `Continue` carries the accepted datagram; `Break`
    /// carries the terminal disposition for drop, queue and steal.
    fn run_hooks(
        &mut self,
        stage: HookStage,
        datagram: Datagram,
        in_if: Option<InterfaceId>,
        egress: &mut Egress,
    ) -> ControlFlow<Disposition, Datagram> {
        let hooks = &mut self.hooks;
        let verdict = match stage {
            HookStage::PreRouting => hooks.run(stage, datagram, |h, d| h.pre_routing(d, in_if)),
            HookStage::LocalIn => hooks.run(stage, datagram, |h, d| h.local_in(d, in_if)),
            HookStage::Forward => hooks.run(stage, datagram, |h, d| h.forward(d, in_if, egress)),
            HookStage::PostRouting => {
                hooks.run(stage, datagram, |h, d| h.post_routing(d, in_if, egress))
            }
            HookStage::LocalOut => {
                let mut out_if = egress.interface;
                let verdict = hooks.run(stage, datagram, |h, d| h.local_out(d, &mut out_if));
                egress.interface = out_if;
                verdict
            }
        };

        match verdict {
            HookResult::Accept(datagram) => ControlFlow::Continue(datagram),
            HookResult::Drop => {
                self.stats.dropped += 1;
                tracing::debug!(%stage, "hook dropped datagram");
                ControlFlow::Break(Disposition::Dropped(DropReason::Hook(stage)))
            }
            HookResult::Queue(mut datagram) => {
                if self.queued.get(datagram.id()).is_some() {
                    self.stamp(&mut datagram);
                }
                let entry = QueuedDatagram::new(datagram, in_if, stage).with_egress(*egress);
                let id = self.queued.insert(entry);
                self.stats.queued += 1;
                tracing::debug!(datagram = %id, %stage, "hook queued datagram");
                ControlFlow::Break(Disposition::Queued(id))
            }
            HookResult::Stolen => {
                self.stats.stolen += 1;
                tracing::debug!(%stage, "hook stole datagram");
                ControlFlow::Break(Disposition::Stolen)
            }
        }
    }
}
