//! Fragmentation flag bits.
//!
//! The three-bit flag field of the IPv4 header:
//! ```text
//! Bit 2: reserved, must be zero
//! Bit 1: DF (don't fragment)
//! Bit 0: MF (more fragments)
//! ```

use crate::error::DatagramError;

const RESERVED: u8 = 0b100;
const DONT_FRAGMENT: u8 = 0b010;
const MORE_FRAGMENTS: u8 = 0b001;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FragmentFlags {
    pub dont_fragment: bool,
    pub more_fragments: bool,
}

impl FragmentFlags {
    pub const fn new(dont_fragment: bool, more_fragments: bool) -> Self {
        Self {
            dont_fragment,
            more_fragments,
        }
    }

    pub fn from_bits(bits: u8) -> Result<Self, DatagramError> {
        if bits & RESERVED != 0 || bits > 0b111 {
            return Err(DatagramError::ReservedFlag(bits));
        }
        Ok(FragmentFlags {
            dont_fragment: bits & DONT_FRAGMENT != 0,
            more_fragments: bits & MORE_FRAGMENTS != 0,
        })
    }

    pub fn to_bits(self) -> u8 {
        ((self.dont_fragment as u8) << 1) | (self.more_fragments as u8)
    }
}
