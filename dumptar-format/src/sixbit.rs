//! SIXBIT, the six-bits-per-character packing used for ITS file names: one
//! word holds six characters, each an ASCII code minus `0o40`.

use crate::word::Word;

/// Pack up to six characters into one word, space padded on the right.
/// Characters outside the SIXBIT range are assumed not to occur.
pub fn pack(s: &str) -> Word {
    let mut six = [0u32; 6];
    for (slot, b) in six.iter_mut().zip(s.bytes()) {
        *slot = (u32::from(b).wrapping_sub(0o40)) & 0o77;
    }
    Word::new(
        (six[0] << 12) | (six[1] << 6) | six[2],
        (six[3] << 12) | (six[4] << 6) | six[5],
    )
}

/// Unpack a SIXBIT word, dropping trailing spaces.
pub fn unpack(word: Word) -> String {
    let (l, r) = (word.left(), word.right());
    let codes = [
        (l >> 12) & 0o77,
        (l >> 6) & 0o77,
        l & 0o77,
        (r >> 12) & 0o77,
        (r >> 6) & 0o77,
        r & 0o77,
    ];
    let mut s: String = codes.iter().map(|&c| ((c + 0o40) as u8) as char).collect();
    while s.ends_with(' ') {
        s.pop();
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for name in &["SYSENG", "TS", "@", "LOSER.", ""] {
            assert_eq!(unpack(pack(name)), *name);
        }
    }

    #[test]
    fn known_packing() {
        // 'A' is SIXBIT 41.
        assert_eq!(pack("A"), Word::new(0o410000, 0));
        assert_eq!(pack("AAAAAA"), Word::new(0o414141, 0o414141));
    }

    #[test]
    fn interior_spaces_survive() {
        assert_eq!(unpack(pack("A B")), "A B");
    }
}
