use std::fmt;

pub(crate) const HALF_MASK: u32 = 0o777777;

/// One 36-bit PDP-10 machine word, held as two 18-bit halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Word {
    left: u32,
    right: u32,
}

impl Word {
    pub const ZERO: Word = Word { left: 0, right: 0 };

    /// Build a word from its halves. Anything above 18 bits is discarded.
    pub fn new(left: u32, right: u32) -> Word {
        Word {
            left: left & HALF_MASK,
            right: right & HALF_MASK,
        }
    }

    pub fn left(self) -> u32 {
        self.left
    }

    pub fn right(self) -> u32 {
        self.right
    }

    /// Bit 35 set marks the word as binary data for the evacuated codec.
    pub fn is_opaque(self) -> bool {
        self.right & 1 != 0
    }

    /// An AOBJN pointer `-len,,0`, the length word of DUMP records.
    pub fn aobjn(len: u32) -> Word {
        Word::new(len.wrapping_neg(), 0)
    }

    /// Length encoded by an AOBJN pointer in the left half.
    pub fn aobjn_len(self) -> u32 {
        self.left.wrapping_neg() & HALF_MASK
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06o},,{:06o}", self.left, self.right)
    }
}
