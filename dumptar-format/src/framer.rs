//! Framing of 36-bit words into physical tape records.
//!
//! The TM03 formatter stores each word as 5 tape frames: the leftmost 32
//! bits in the first four, the remaining four bits in the low half of the
//! fifth. Seven-track drives store a word as six 6-bit frames, each with an
//! odd parity bit in bit 6. Records are 1024 words; tape hardware refuses
//! records under 12 bytes, so short final records are padded with zero
//! words.

use crate::error::{Error, Result};
use crate::transport::{TapeRead, TapeSession};
use crate::word::Word;

/// Words per full tape record.
pub const RECORD_WORDS: usize = 1024;

/// Shortest record real tape hardware will accept.
const MIN_RECORD_BYTES: usize = 12;

const MAX_RECORD_BYTES: usize = 6 * RECORD_WORDS;

/// How words are laid out as tape frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalFormat {
    /// TM03 "core dump" packing, 5 frames per word.
    CoreDump,
    /// 7-track packing, 6 frames per word with parity.
    SevenTrack,
}

impl PhysicalFormat {
    pub fn bytes_per_word(self) -> usize {
        match self {
            PhysicalFormat::CoreDump => 5,
            PhysicalFormat::SevenTrack => 6,
        }
    }

    fn encode_into(self, word: Word, out: &mut Vec<u8>) {
        let (l, r) = (word.left(), word.right());
        match self {
            PhysicalFormat::CoreDump => {
                out.push(((l >> 10) & 0o377) as u8);
                out.push(((l >> 2) & 0o377) as u8);
                out.push((((l << 6) & 0o300) | ((r >> 12) & 0o77)) as u8);
                out.push(((r >> 4) & 0o377) as u8);
                out.push((r & 0o17) as u8);
            }
            PhysicalFormat::SevenTrack => {
                for half in &[l, r] {
                    let mut h = *half;
                    for _ in 0..3 {
                        out.push(with_parity(((h >> 12) & 0o77) as u8));
                        h <<= 6;
                    }
                }
            }
        }
    }

    fn decode(self, frames: &[u8]) -> Word {
        match self {
            PhysicalFormat::CoreDump => {
                let (a, b, c) = (
                    u32::from(frames[0]),
                    u32::from(frames[1]),
                    u32::from(frames[2]),
                );
                let left = ((a << 10) & 0o776000) | ((b << 2) & 0o001774) | ((c >> 6) & 0o3);
                let (d, e) = (u32::from(frames[3]), u32::from(frames[4]));
                let right = ((c << 12) & 0o770000) | ((d << 4) & 0o007760) | (e & 0o17);
                Word::new(left, right)
            }
            PhysicalFormat::SevenTrack => {
                // Parity bits are don't-care on read.
                let half = |f: &[u8]| {
                    ((u32::from(f[0]) << 12) & 0o770000)
                        | ((u32::from(f[1]) << 6) & 0o007700)
                        | (u32::from(f[2]) & 0o77)
                };
                Word::new(half(&frames[..3]), half(&frames[3..6]))
            }
        }
    }
}

/// Odd parity over the six data bits, folded into bit 6.
fn with_parity(c: u8) -> u8 {
    let c = u32::from(c);
    let p = 0o100 ^ (c << 1) ^ (c << 2) ^ (c << 3) ^ (c << 4) ^ (c << 5) ^ (c << 6);
    (c | (p & 0o100)) as u8
}

/// Streams 36-bit words over a tape session, one record at a time.
///
/// The framer owns the session; take it back with [`WordFramer::into_session`]
/// when record-level access is needed again.
pub struct WordFramer {
    session: TapeSession,
    format: PhysicalFormat,
    wbuf: Vec<u8>,
    rbuf: Vec<u8>,
    rlen: usize,
    rpos: usize,
}

impl WordFramer {
    pub fn new(session: TapeSession, format: PhysicalFormat) -> WordFramer {
        WordFramer {
            session,
            format,
            wbuf: Vec::with_capacity(MAX_RECORD_BYTES),
            rbuf: vec![0; MAX_RECORD_BYTES],
            rlen: 0,
            rpos: 0,
        }
    }

    pub fn format(&self) -> PhysicalFormat {
        self.format
    }

    pub fn session(&self) -> &TapeSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TapeSession {
        &mut self.session
    }

    pub fn into_session(self) -> TapeSession {
        self.session
    }

    /// Discard unflushed write bytes and the rest of the current read
    /// record, as after repositioning the tape underneath the framer.
    pub fn reset(&mut self) {
        self.wbuf.clear();
        self.rlen = 0;
        self.rpos = 0;
    }

    /// Append one word, flushing automatically when the record fills.
    pub fn write_word(&mut self, word: Word) -> Result<()> {
        self.format.encode_into(word, &mut self.wbuf);
        if self.wbuf.len() >= RECORD_WORDS * self.format.bytes_per_word() {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out a partial record, padded with zero words up to the hardware
    /// minimum. A no-op when nothing is buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        while self.wbuf.len() < MIN_RECORD_BYTES {
            self.format.encode_into(Word::ZERO, &mut self.wbuf);
        }
        self.session.write_record(&self.wbuf)?;
        self.wbuf.clear();
        Ok(())
    }

    /// Flush any partial record and write a tape mark.
    pub fn write_tape_mark(&mut self) -> Result<()> {
        self.flush()?;
        self.session.write_tape_mark()
    }

    /// Pull the next record off the tape. Validates that the record holds a
    /// whole number of words.
    pub fn read_record(&mut self) -> Result<TapeRead> {
        let outcome = self.session.read_record(&mut self.rbuf)?;
        if let TapeRead::Record(len) = outcome {
            let bpw = self.format.bytes_per_word();
            if len % bpw != 0 {
                return Err(Error::RecordLength {
                    length: len,
                    bytes_per_word: bpw,
                });
            }
            self.rlen = len;
            self.rpos = 0;
        } else {
            self.rlen = 0;
            self.rpos = 0;
        }
        Ok(outcome)
    }

    /// Words not yet consumed from the current record.
    pub fn words_remaining(&self) -> usize {
        (self.rlen - self.rpos) / self.format.bytes_per_word()
    }

    /// Take one word from the current record. The record must not be
    /// exhausted.
    pub fn read_word(&mut self) -> Result<Word> {
        if self.rpos >= self.rlen {
            return Err(Error::RecordExhausted);
        }
        let bpw = self.format.bytes_per_word();
        let word = self.format.decode(&self.rbuf[self.rpos..self.rpos + bpw]);
        self.rpos += bpw;
        Ok(word)
    }

    /// Take one word, crossing into the next record as needed. `None` at a
    /// tape mark or at the end of the medium.
    pub fn next_word(&mut self) -> Result<Option<Word>> {
        if self.rpos >= self.rlen {
            match self.read_record()? {
                TapeRead::Record(_) => {}
                TapeRead::TapeMark | TapeRead::EndOfMedium => return Ok(None),
            }
        }
        self.read_word().map(Some)
    }
}
