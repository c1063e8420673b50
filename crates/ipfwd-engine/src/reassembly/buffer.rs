//! The reassembly buffer: every in-flight fragment group, keyed by
//! (source, destination, protocol, identification).

use std::collections::BTreeMap;

use ipfwd_core::datagram::Datagram;
use ipfwd_core::types::FragmentKey;

use super::constants::{DEFAULT_FRAGMENT_TIMEOUT_MS, DEFAULT_MAX_REASSEMBLY_ENTRIES};
use super::entry::{ReassemblyEntry, Stored};
use crate::error::ReassemblyError;

/// Outcome of offering one datagram to the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Stored; the group is still missing pieces.
    Incomplete,
    /// The datagram is whole, either reassembled or never fragmented.
    Completed(Datagram),
    /// Byte-identical copy of a fragment already held.
    DuplicateDiscarded,
}

/// A fragment group removed by [`ReassemblyBuffer::purge_expired`].
#[derive(Debug, Clone)]
pub struct ExpiredGroup {
    pub key: FragmentKey,
    /// The offset-0 fragment if it arrived, else the first fragment's header.
    pub datagram: Datagram,
    pub fragments: usize,
    pub held_bytes: usize,
}

pub struct ReassemblyBuffer {
    entries: BTreeMap<FragmentKey, ReassemblyEntry>,
    timeout_ms: u64,
    max_entries: usize,
}

impl ReassemblyBuffer {
    pub fn new(timeout_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            timeout_ms,
            max_entries,
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Offer a datagram received for local delivery.
    ///
    /// Unfragmented datagrams pass straight through as `Completed`.
    /// A malformed fragment is rejected and the group it targets is left as
    /// it was.
    pub fn add_fragment(
        &mut self,
        fragment: Datagram,
        now: u64,
    ) -> Result<FragmentOutcome, ReassemblyError> {
        if !fragment.is_fragment() {
            return Ok(FragmentOutcome::Completed(fragment));
        }
        let key = fragment.fragment_key();

        let stored = match self.entries.get_mut(&key) {
            Some(entry) => entry.insert(fragment)?,
            None => {
                if self.entries.len() >= self.max_entries {
                    return Err(ReassemblyError::BufferFull(self.entries.len()));
                }
                let mut entry = ReassemblyEntry::new(&fragment, now);
                let stored = entry.insert(fragment)?;
                tracing::debug!(%key, "opened reassembly group");
                self.entries.insert(key, entry);
                stored
            }
        };

        if stored == Stored::Duplicate {
            return Ok(FragmentOutcome::DuplicateDiscarded);
        }

        let complete = self
            .entries
            .get(&key)
            .is_some_and(ReassemblyEntry::is_complete);
        if !complete {
            return Ok(FragmentOutcome::Incomplete);
        }

        match self.entries.remove(&key) {
            Some(entry) => {
                let fragments = entry.fragment_count();
                let datagram = entry.assemble();
                tracing::debug!(%key, fragments, len = datagram.payload.len(), "reassembled datagram");
                Ok(FragmentOutcome::Completed(datagram))
            }
            None => Ok(FragmentOutcome::Incomplete),
        }
    }

    /// Remove every group whose first fragment is at least the timeout old.
    ///
    /// Each group is returned exactly once; it no longer exists afterwards.
    pub fn purge_expired(&mut self, now: u64) -> Vec<ExpiredGroup> {
        let timeout = self.timeout_ms;
        let expired: Vec<FragmentKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, timeout))
            .map(|(key, _)| *key)
            .collect();

        let mut groups = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(entry) = self.entries.remove(&key) {
                let fragments = entry.fragment_count();
                let held_bytes = entry.held_bytes();
                groups.push(ExpiredGroup {
                    key,
                    datagram: entry.into_report_datagram(),
                    fragments,
                    held_bytes,
                });
            }
        }
        if !groups.is_empty() {
            tracing::debug!(count = groups.len(), "purged expired reassembly groups");
        }
        groups
    }

    pub fn get(&self, key: &FragmentKey) -> Option<&ReassemblyEntry> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &FragmentKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard every group without reporting. Returns how many were held.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAGMENT_TIMEOUT_MS, DEFAULT_MAX_REASSEMBLY_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    fn frag(id: u16, offset: usize, payload: Vec<u8>, more: bool) -> Datagram {
        let mut d = Datagram::new(SRC, DST, 17, payload)
            .with_identification(id)
            .with_fragment_offset_bytes(offset)
            .unwrap();
        d.flags.more_fragments = more;
        d
    }

    #[test]
    fn test_unfragmented_bypasses_buffer() {
        let mut buf = ReassemblyBuffer::default();
        let d = Datagram::new(SRC, DST, 17, vec![1, 2, 3]);
        let out = buf.add_fragment(d.clone(), 0).unwrap();
        assert_eq!(out, FragmentOutcome::Completed(d));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut buf = ReassemblyBuffer::default();
        assert_eq!(
            buf.add_fragment(frag(7, 16, vec![3; 4], false), 0).unwrap(),
            FragmentOutcome::Incomplete
        );
        assert_eq!(
            buf.add_fragment(frag(7, 0, vec![1; 8], true), 1).unwrap(),
            FragmentOutcome::Incomplete
        );
        let out = buf.add_fragment(frag(7, 8, vec![2; 8], true), 2).unwrap();
        let FragmentOutcome::Completed(d) = out else {
            panic!("expected completion, got {out:?}");
        };
        assert_eq!(d.payload, [vec![1; 8], vec![2; 8], vec![3; 4]].concat());
        assert_eq!(d.fragment_offset, 0);
        assert!(!d.flags.more_fragments);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_groups_are_independent() {
        let mut buf = ReassemblyBuffer::default();
        buf.add_fragment(frag(1, 0, vec![1; 8], true), 0).unwrap();
        buf.add_fragment(frag(2, 0, vec![2; 8], true), 0).unwrap();
        assert_eq!(buf.len(), 2);
        let out = buf.add_fragment(frag(2, 8, vec![2; 2], false), 0).unwrap();
        assert!(matches!(out, FragmentOutcome::Completed(_)));
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_duplicate_discarded() {
        let mut buf = ReassemblyBuffer::default();
        buf.add_fragment(frag(1, 0, vec![1; 8], true), 0).unwrap();
        assert_eq!(
            buf.add_fragment(frag(1, 0, vec![1; 8], true), 5).unwrap(),
            FragmentOutcome::DuplicateDiscarded
        );
    }

    #[test]
    fn test_malformed_first_fragment_creates_no_group() {
        let mut buf = ReassemblyBuffer::default();
        let err = buf.add_fragment(frag(1, 0, vec![1; 5], true), 0).unwrap_err();
        assert_eq!(err, ReassemblyError::Misaligned(5));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_capacity_limit() {
        let mut buf = ReassemblyBuffer::new(1_000, 2);
        buf.add_fragment(frag(1, 0, vec![0; 8], true), 0).unwrap();
        buf.add_fragment(frag(2, 0, vec![0; 8], true), 0).unwrap();
        assert_eq!(
            buf.add_fragment(frag(3, 0, vec![0; 8], true), 0).unwrap_err(),
            ReassemblyError::BufferFull(2)
        );
        // Existing groups still accept fragments.
        assert!(buf.add_fragment(frag(1, 8, vec![0; 1], false), 0).is_ok());
    }

    #[test]
    fn test_purge_expired_reports_once() {
        let mut buf = ReassemblyBuffer::new(1_000, 16);
        buf.add_fragment(frag(1, 8, vec![2; 8], true), 0).unwrap();
        buf.add_fragment(frag(1, 0, vec![1; 8], true), 500).unwrap();
        buf.add_fragment(frag(2, 0, vec![1; 8], true), 600).unwrap();

        assert!(buf.purge_expired(999).is_empty());
        let expired = buf.purge_expired(1_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].key.identification, 1);
        assert_eq!(expired[0].fragments, 2);
        assert_eq!(expired[0].held_bytes, 16);
        assert_eq!(expired[0].datagram.fragment_offset, 0);

        assert!(buf.purge_expired(1_000).is_empty());
        assert_eq!(buf.purge_expired(1_600).len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_clear_discards_all() {
        let mut buf = ReassemblyBuffer::default();
        buf.add_fragment(frag(1, 0, vec![1; 8], true), 0).unwrap();
        buf.add_fragment(frag(2, 0, vec![1; 8], true), 0).unwrap();
        assert_eq!(buf.clear(), 2);
        assert!(buf.is_empty());
    }
}
