//! Priority-ordered hook registrations.

use ipfwd_core::datagram::Datagram;

use super::types::{Hook, HookId, HookResult, HookStage};

struct Registration {
    priority: i32,
    id: HookId,
    hook: Box<dyn Hook>,
}

/// Registered hooks, kept sorted by ascending priority.
///
/// Equal priorities keep registration order.
pub struct HookRegistry {
    entries: Vec<Registration>,
    next_id: u64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a hook and return the id used to unregister it.
    pub fn register(&mut self, priority: i32, hook: Box<dyn Hook>) -> HookId {
        let id = HookId(self.next_id);
        self.next_id += 1;
        let pos = self.entries.partition_point(|r| r.priority <= priority);
        self.entries.insert(pos, Registration { priority, id, hook });
        id
    }

    /// Remove a registration, handing the hook back to the caller.
    pub fn unregister(&mut self, priority: i32, id: HookId) -> Option<Box<dyn Hook>> {
        let pos = self
            .entries
            .iter()
            .position(|r| r.priority == priority && r.id == id)?;
        Some(self.entries.remove(pos).hook)
    }

    #[must_use]
    pub fn contains(&self, id: HookId) -> bool {
        self.entries.iter().any(|r| r.id == id)
    }

    /// Registration ids in invocation order.
    pub fn order(&self) -> Vec<(i32, HookId)> {
        self.entries.iter().map(|r| (r.priority, r.id)).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Run every hook for one stage until one of them does not accept.
    pub(crate) fn run<F>(&mut self, stage: HookStage, mut datagram: Datagram, mut call: F) -> HookResult
    where
        F: FnMut(&mut dyn Hook, Datagram) -> HookResult,
    {
        for reg in &mut self.entries {
            match call(reg.hook.as_mut(), datagram) {
                HookResult::Accept(d) => datagram = d,
                verdict => {
                    tracing::trace!(
                        %stage,
                        hook = reg.id.0,
                        priority = reg.priority,
                        verdict = verdict.name(),
                        "hook did not accept"
                    );
                    return verdict;
                }
            }
        }
        HookResult::Accept(datagram)
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
