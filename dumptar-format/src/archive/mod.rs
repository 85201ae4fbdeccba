//! The DUMP archive layout: a volume header record, then for each file a
//! label, its evacuated contents and a tape mark, with two consecutive tape
//! marks closing the tape.

mod reader;
mod writer;

pub use reader::DumpScanner;
pub use writer::DumpWriter;

use crate::path::ItsName;
use crate::word::Word;

/// Words in a full file label.
const LABEL_WORDS: u32 = 7;

/// Words in the volume header after its length word.
const VOLUME_WORDS: u32 = 4;

/// A timestamp as DUMP stores it: date fields in the left half, seconds
/// since midnight doubled in the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpDate {
    /// Years since 1900.
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl DumpDate {
    /// The year field is officially 7 bits, but the two bits to its left
    /// are unused in UFD entries, so years past 2027 borrow them.
    pub(crate) fn to_word(self) -> Word {
        Word::new(
            (self.year << 9) | (self.month << 5) | self.day,
            ((self.hour * 60 + self.minute) * 60 + self.second) * 2,
        )
    }

    /// `None` for an all-zero date, which DUMP uses for "unknown".
    pub(crate) fn from_word(word: Word) -> Option<DumpDate> {
        let (l, r) = (word.left(), word.right());
        if l >> 9 == 0 {
            return None;
        }
        Some(DumpDate {
            year: l >> 9,
            month: (l >> 5) & 0o17,
            day: l & 0o37,
            hour: r / (60 * 60 * 2),
            minute: (r / (60 * 2)) % 60,
            second: (r / 2) % 60,
        })
    }
}

/// What kind of dump a tape claims to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    Random,
    Full,
    Incremental,
}

impl DumpKind {
    fn to_word(self) -> Word {
        match self {
            DumpKind::Random => Word::ZERO,
            DumpKind::Full => Word::new(1, 0),
            DumpKind::Incremental => Word::new(0o400000, 0),
        }
    }

    fn from_word(word: Word) -> DumpKind {
        if word.left() | word.right() == 0 {
            DumpKind::Random
        } else if word.left() & 0o400000 != 0 {
            DumpKind::Incremental
        } else {
            DumpKind::Full
        }
    }
}

impl std::fmt::Display for DumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DumpKind::Random => "random",
            DumpKind::Full => "full",
            DumpKind::Incremental => "incremental",
        };
        f.write_str(s)
    }
}

/// The record at the very start of a DUMP tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeHeader {
    pub tape: u32,
    pub reel: u32,
    /// Creation date as SIXBIT `YYMMDD`.
    pub created: String,
    pub kind: DumpKind,
}

/// One archive member's label. The contents follow in the same and
/// subsequent records, up to a tape mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLabel {
    pub name: ItsName,
    pub is_link: bool,
    pub creation: Option<DumpDate>,
    pub reference: Option<DumpDate>,
}
