//! Splitting datagrams to fit an interface MTU.

use ipfwd_core::constants::{FRAGMENT_UNIT, IPV4_HEADER_SIZE};
use ipfwd_core::datagram::Datagram;

/// Largest payload per fragment for `mtu`: the room left after the header,
/// rounded down to a multiple of 8. Zero means the MTU cannot carry a fragment.
pub fn fragment_payload_len(mtu: usize) -> usize {
    mtu.saturating_sub(IPV4_HEADER_SIZE) / FRAGMENT_UNIT * FRAGMENT_UNIT
}

/// Split `datagram` into fragments that each fit `mtu`.
///
/// Offsets are relative to the datagram's own offset, so an already
/// fragmented datagram is split further correctly. Every piece but the last
/// has more-fragments set; the last keeps the original flag. Returns `None`
/// when the MTU is too small to carry any payload.
pub fn split(datagram: &Datagram, mtu: usize) -> Option<Vec<Datagram>> {
    let chunk = fragment_payload_len(mtu);
    if chunk == 0 {
        return None;
    }
    if datagram.payload.is_empty() {
        return Some(vec![datagram.clone()]);
    }

    let base = datagram.fragment_offset_bytes();
    let count = datagram.payload.len().div_ceil(chunk);
    let mut fragments = Vec::with_capacity(count);
    for (index, piece) in datagram.payload.chunks(chunk).enumerate() {
        let mut fragment = datagram.with_same_header(piece.to_vec());
        let offset = base + index * chunk;
        fragment.fragment_offset = (offset / FRAGMENT_UNIT) as u16;
        if index + 1 < count {
            fragment.flags.more_fragments = true;
        }
        fragments.push(fragment);
    }
    Some(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn datagram(len: usize) -> Datagram {
        let payload = (0..len).map(|i| (i % 251) as u8).collect();
        Datagram::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 1, 1),
            17,
            payload,
        )
        .with_identification(0x1234)
    }

    #[test]
    fn test_payload_len() {
        assert_eq!(fragment_payload_len(1500), 1480);
        assert_eq!(fragment_payload_len(576), 552);
        assert_eq!(fragment_payload_len(35), 8);
        assert_eq!(fragment_payload_len(27), 0);
        assert_eq!(fragment_payload_len(10), 0);
    }

    #[test]
    fn test_split_partitions_payload() {
        let d = datagram(4000);
        let frags = split(&d, 1500).unwrap();
        assert_eq!(frags.len(), 3);
        assert_eq!(
            frags.iter().map(|f| f.payload.len()).collect::<Vec<_>>(),
            vec![1480, 1480, 1040]
        );
        assert_eq!(
            frags.iter().map(Datagram::fragment_offset_bytes).collect::<Vec<_>>(),
            vec![0, 1480, 2960]
        );
        assert!(frags[0].flags.more_fragments);
        assert!(frags[1].flags.more_fragments);
        assert!(!frags[2].flags.more_fragments);
        assert!(frags.iter().all(|f| f.identification == 0x1234));
        assert!(frags.iter().all(|f| f.total_length() <= 1500));

        let joined: Vec<u8> = frags.iter().flat_map(|f| f.payload.clone()).collect();
        assert_eq!(joined, d.payload);
    }

    #[test]
    fn test_split_of_fragment_keeps_more_fragments() {
        let mut d = datagram(3000).with_fragment_offset_bytes(2960).unwrap();
        d.flags.more_fragments = true;
        let frags = split(&d, 1500).unwrap();
        assert_eq!(frags[0].fragment_offset_bytes(), 2960);
        assert_eq!(frags[2].fragment_offset_bytes(), 2960 + 2 * 1480);
        assert!(frags.iter().all(|f| f.flags.more_fragments));
    }

    #[test]
    fn test_mtu_too_small() {
        assert!(split(&datagram(100), 24).is_none());
    }
}
