//! A single in-flight fragment group.

use std::collections::BTreeMap;

use ipfwd_core::constants::{FRAGMENT_UNIT, MAX_PAYLOAD_SIZE};
use ipfwd_core::datagram::Datagram;
use ipfwd_core::types::FragmentKey;

use crate::error::ReassemblyError;

/// Result of storing one fragment in an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stored {
    Inserted,
    Replaced,
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct ReassemblyEntry {
    key: FragmentKey,
    /// Payload spans keyed by byte offset. Spans never overlap.
    spans: BTreeMap<usize, Vec<u8>>,
    /// Header of the offset-0 fragment, once seen.
    head: Option<Datagram>,
    /// Header of whichever fragment arrived first.
    first_header: Datagram,
    first_seen: u64,
    total_len: Option<usize>,
}

impl ReassemblyEntry {
    pub(crate) fn new(fragment: &Datagram, now: u64) -> Self {
        Self {
            key: fragment.fragment_key(),
            spans: BTreeMap::new(),
            head: None,
            first_header: fragment.with_same_header(Vec::new()),
            first_seen: now,
            total_len: None,
        }
    }

    pub fn key(&self) -> FragmentKey {
        self.key
    }

    pub fn first_seen(&self) -> u64 {
        self.first_seen
    }

    /// Total payload length, known once the terminal fragment arrived.
    pub fn total_len(&self) -> Option<usize> {
        self.total_len
    }

    pub fn fragment_count(&self) -> usize {
        self.spans.len()
    }

    pub fn held_bytes(&self) -> usize {
        self.spans.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_expired(&self, now: u64, timeout: u64) -> bool {
        now.saturating_sub(self.first_seen) >= timeout
    }

    fn held_end(&self) -> usize {
        self.spans
            .iter()
            .map(|(off, data)| off + data.len())
            .max()
            .unwrap_or(0)
    }

    /// Validate and store one fragment. Rejected fragments leave the entry unchanged.
    pub(crate) fn insert(&mut self, fragment: Datagram) -> Result<Stored, ReassemblyError> {
        let start = fragment.fragment_offset_bytes();
        let len = fragment.payload.len();
        let end = start + len;
        let terminal = !fragment.flags.more_fragments;

        if end > MAX_PAYLOAD_SIZE {
            return Err(ReassemblyError::TooLarge {
                end,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if !terminal {
            if len == 0 {
                return Err(ReassemblyError::Empty(start));
            }
            if len % FRAGMENT_UNIT != 0 {
                return Err(ReassemblyError::Misaligned(len));
            }
        }

        match self.total_len {
            Some(total) => {
                if terminal && end != total {
                    return Err(ReassemblyError::ConflictingTotal {
                        existing: total,
                        new: end,
                    });
                }
                if end > total {
                    return Err(ReassemblyError::BeyondTotal { start, end, total });
                }
            }
            None if terminal => {
                let held_end = self.held_end();
                if held_end > end {
                    return Err(ReassemblyError::BeyondTotal {
                        start,
                        end: held_end,
                        total: end,
                    });
                }
            }
            None => {}
        }

        let replacing = match self.spans.get(&start) {
            Some(existing) if *existing == fragment.payload => {
                if !terminal || self.total_len == Some(end) {
                    return Ok(Stored::Duplicate);
                }
                true
            }
            Some(_) => true,
            None => false,
        };

        if let Some((&prev_off, prev)) = self.spans.range(..start).next_back() {
            if prev_off + prev.len() > start {
                return Err(ReassemblyError::Overlap { start, end });
            }
        }
        if let Some((&next_off, _)) = self.spans.range(start + 1..).next() {
            if end > next_off {
                return Err(ReassemblyError::Overlap { start, end });
            }
        }

        if start == 0 {
            self.head = Some(fragment.with_same_header(Vec::new()));
        }
        if terminal {
            self.total_len = Some(end);
        }
        tracing::trace!(key = %self.key, start, end, terminal, replacing, "stored fragment span");
        self.spans.insert(start, fragment.payload);

        Ok(if replacing {
            Stored::Replaced
        } else {
            Stored::Inserted
        })
    }

    /// One contiguous run of spans covering `[0, total)`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let Some(total) = self.total_len else {
            return false;
        };
        let mut cursor = 0;
        for (&off, data) in &self.spans {
            if off != cursor {
                return false;
            }
            cursor += data.len();
        }
        cursor == total
    }

    /// Concatenate all spans under the original header.
    pub(crate) fn assemble(self) -> Datagram {
        let mut payload = Vec::with_capacity(self.total_len.unwrap_or(0));
        for data in self.spans.values() {
            payload.extend_from_slice(data);
        }
        let mut datagram = self.head.unwrap_or(self.first_header);
        datagram.payload = payload;
        datagram.fragment_offset = 0;
        datagram.flags.more_fragments = false;
        datagram
    }

    /// The datagram an expiry is reported against: the offset-0 fragment if
    /// it arrived, otherwise the header of the first fragment received.
    pub(crate) fn into_report_datagram(mut self) -> Datagram {
        match self.head.take() {
            Some(mut head) => {
                head.payload = self.spans.remove(&0).unwrap_or_default();
                head
            }
            None => self.first_header,
        }
    }
}
