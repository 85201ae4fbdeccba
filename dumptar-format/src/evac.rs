//! Alan Bawden's "evacuated file" encoding between 36-bit words and 8-bit
//! bytes.
//!
//! Words holding packed PDP-10 ASCII come out as ordinary Unix text: each
//! word splits into five 7-bit bytes, CRLF becomes a plain newline, and the
//! Lisp Machine rubout sequences fold into single high-half bytes. A word
//! with bit 35 set cannot be ASCII and is quoted instead as five bytes whose
//! first lies in `0o360..=0o377`. The mapping is reversible byte for byte.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::framer::WordFramer;
use crate::word::Word;

const CR: u8 = 0o15;
const LF: u8 = 0o12;
const RUBOUT: u8 = 0o177;
const QUOTE: u8 = 0o360;
/// Encodes an isolated CR that never found its LF.
const LONE_CR: u8 = 0o356;
/// Encodes an isolated rubout that starts no known sequence.
const LONE_RUBOUT: u8 = 0o357;
/// Control-C, the classic ITS end-of-file padding.
const PAD: u8 = 0o3;

/// Single-byte encoding for a 7-bit character, or `None` when the character
/// may begin a two-character sequence and must be held back.
fn base(c: u8) -> Option<u8> {
    match c {
        CR | RUBOUT => None,
        LF => Some(CR),
        other => Some(other),
    }
}

/// Single-byte encoding for the pair `177,c`, or `None` when the pair has
/// no code of its own.
fn after_rubout(c: u8) -> Option<u8> {
    match c {
        0o0..=0o6 => Some(0o200 + c),
        0o7 => Some(RUBOUT),
        0o10..=0o11 => Some(0o200 + c),
        LF => Some(0o215),
        0o13..=0o14 => Some(0o200 + c),
        CR => Some(0o212),
        0o16..=0o155 => Some(0o200 + c),
        RUBOUT => Some(0o207),
        _ => None,
    }
}

/// The 7-bit characters an encoded byte in `0..=0o357` stands for.
fn expand(b: u8) -> (u8, Option<u8>) {
    match b {
        LF => (CR, Some(LF)),
        CR => (LF, None),
        RUBOUT => (RUBOUT, Some(0o7)),
        0o207 => (RUBOUT, Some(RUBOUT)),
        0o212 => (RUBOUT, Some(CR)),
        0o215 => (RUBOUT, Some(LF)),
        0o200..=0o355 => (RUBOUT, Some(b - 0o200)),
        LONE_CR => (CR, None),
        LONE_RUBOUT => (RUBOUT, None),
        other => (other, None),
    }
}

/// A character seen but not yet committed to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    None,
    Cr,
    Rubout,
}

/// Turns a stream of words into evacuated bytes.
///
/// Bytes are held until the following word boundary so that the trailing
/// control-C padding of the final word can be trimmed without touching any
/// earlier word.
pub struct Encoder {
    pending: Pending,
    group: Vec<u8>,
}

impl Default for Encoder {
    fn default() -> Self {
        Encoder::new()
    }
}

impl Encoder {
    pub fn new() -> Encoder {
        Encoder {
            pending: Pending::None,
            group: Vec::with_capacity(6),
        }
    }

    fn spill_pending(&mut self) {
        match self.pending {
            Pending::Cr => self.group.push(LONE_CR),
            Pending::Rubout => self.group.push(LONE_RUBOUT),
            Pending::None => {}
        }
        self.pending = Pending::None;
    }

    /// Encode one word, appending finished bytes to `out`.
    pub fn push_word(&mut self, word: Word, out: &mut Vec<u8>) {
        // A new word begins, so the previous word's bytes are final.
        out.append(&mut self.group);

        let (l, r) = (word.left(), word.right());
        if word.is_opaque() {
            self.spill_pending();
            self.group.push((u32::from(QUOTE) | ((l >> 14) & 0o17)) as u8);
            self.group.push(((l >> 6) & 0o377) as u8);
            self.group.push((((l << 2) & 0o374) | ((r >> 16) & 0o3)) as u8);
            self.group.push(((r >> 8) & 0o377) as u8);
            self.group.push((r & 0o377) as u8);
            return;
        }

        let chars = [
            ((l >> 11) & 0o177) as u8,
            ((l >> 4) & 0o177) as u8,
            (((l << 3) & 0o170) | ((r >> 15) & 0o7)) as u8,
            ((r >> 8) & 0o177) as u8,
            ((r >> 1) & 0o177) as u8,
        ];
        for &c in &chars {
            match self.pending {
                Pending::Cr if c == LF => {
                    self.group.push(LF);
                    self.pending = Pending::None;
                    continue;
                }
                Pending::Rubout => {
                    if let Some(d) = after_rubout(c) {
                        self.group.push(d);
                        self.pending = Pending::None;
                        continue;
                    }
                    self.spill_pending();
                }
                _ => self.spill_pending(),
            }
            match base(c) {
                Some(d) => self.group.push(d),
                None => {
                    self.pending = if c == CR { Pending::Cr } else { Pending::Rubout };
                }
            }
        }
    }

    /// Flush held state, trimming the control-C padding off the final word.
    ///
    /// Only the final word's bytes are candidates for trimming; a pending CR
    /// or rubout inherited from it cannot be control-C, so spilling it first
    /// is safe even when the file ends in a run of padding.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        self.spill_pending();
        while self.group.last() == Some(&PAD) {
            self.group.pop();
        }
        out.append(&mut self.group);
    }
}

/// Turns evacuated bytes back into words.
pub struct Decoder {
    seven: [u8; 5],
    nseven: usize,
    quoted: [u8; 5],
    nquoted: usize,
    in_quote: bool,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new()
    }
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder {
            seven: [0; 5],
            nseven: 0,
            quoted: [0; 5],
            nquoted: 0,
            in_quote: false,
        }
    }

    fn take_seven(&mut self, c: u8) -> Option<Word> {
        self.seven[self.nseven] = c;
        self.nseven += 1;
        if self.nseven < 5 {
            return None;
        }
        self.nseven = 0;
        let s = &self.seven;
        let l = (u32::from(s[0]) << 11) | (u32::from(s[1]) << 4) | (u32::from(s[2]) >> 3);
        let r = ((u32::from(s[2]) & 0o7) << 15) | (u32::from(s[3]) << 8) | (u32::from(s[4]) << 1);
        Some(Word::new(l, r))
    }

    /// Feed one encoded byte; a completed word comes back when one fills.
    pub fn push_byte(&mut self, b: u8) -> Result<Option<Word>> {
        if self.in_quote {
            self.quoted[self.nquoted] = b;
            self.nquoted += 1;
            if self.nquoted < 5 {
                return Ok(None);
            }
            self.in_quote = false;
            self.nquoted = 0;
            let q = &self.quoted;
            let l = ((u32::from(q[0]) & 0o17) << 14)
                | (u32::from(q[1]) << 6)
                | ((u32::from(q[2]) >> 2) & 0o77);
            let r = ((u32::from(q[2]) & 0o3) << 16) | (u32::from(q[3]) << 8) | u32::from(q[4]);
            return Ok(Some(Word::new(l, r)));
        }

        if b >= QUOTE {
            if self.nseven != 0 {
                return Err(Error::QuoteMidWord);
            }
            self.in_quote = true;
            self.quoted[0] = b;
            self.nquoted = 1;
            return Ok(None);
        }

        let (first, second) = expand(b);
        if let Some(word) = self.take_seven(first) {
            // The second character of a pair starts the next word.
            if let Some(c) = second {
                let spill = self.take_seven(c);
                debug_assert!(spill.is_none());
            }
            return Ok(Some(word));
        }
        if let Some(c) = second {
            return Ok(self.take_seven(c));
        }
        Ok(None)
    }

    /// End of input: pad any partial word with control-C.
    pub fn finish(&mut self) -> Result<Option<Word>> {
        if self.in_quote {
            return Err(Error::TruncatedQuote);
        }
        if self.nseven == 0 {
            return Ok(None);
        }
        loop {
            if let Some(word) = self.take_seven(PAD) {
                return Ok(Some(word));
            }
        }
    }
}

/// Decode a tape file's words into an evacuated byte stream, up to the next
/// tape mark.
pub fn pack<W: Write>(framer: &mut WordFramer, out: &mut W) -> Result<()> {
    let mut encoder = Encoder::new();
    let mut buf = Vec::with_capacity(8192);
    while let Some(word) = framer.next_word()? {
        encoder.push_word(word, &mut buf);
        if buf.len() >= 4096 {
            out.write_all(&buf)?;
            buf.clear();
        }
    }
    encoder.finish(&mut buf);
    out.write_all(&buf)?;
    Ok(())
}

/// Encode an evacuated byte stream into tape words. The framer's partial
/// record is left buffered for the caller to flush.
pub fn unpack<R: Read>(input: &mut R, framer: &mut WordFramer) -> Result<()> {
    let mut decoder = Decoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            if let Some(word) = decoder.push_byte(b)? {
                framer.write_word(word)?;
            }
        }
    }
    if let Some(word) = decoder.finish()? {
        framer.write_word(word)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_words(words: &[Word]) -> Vec<u8> {
        let mut encoder = Encoder::new();
        let mut out = Vec::new();
        for &w in words {
            encoder.push_word(w, &mut out);
        }
        encoder.finish(&mut out);
        out
    }

    fn decode_bytes(bytes: &[u8]) -> Vec<Word> {
        let mut decoder = Decoder::new();
        let mut words = Vec::new();
        for &b in bytes {
            if let Some(w) = decoder.push_byte(b).unwrap() {
                words.push(w);
            }
        }
        if let Some(w) = decoder.finish().unwrap() {
            words.push(w);
        }
        words
    }

    /// Pack 7-bit characters into words the PDP-10 way, five per word.
    fn ascii_words(text: &[u8]) -> Vec<Word> {
        let mut words = Vec::new();
        let mut chars = text.to_vec();
        while chars.len() % 5 != 0 {
            chars.push(PAD);
        }
        for chunk in chars.chunks(5) {
            let l = (u32::from(chunk[0]) << 11)
                | (u32::from(chunk[1]) << 4)
                | (u32::from(chunk[2]) >> 3);
            let r = ((u32::from(chunk[2]) & 0o7) << 15)
                | (u32::from(chunk[3]) << 8)
                | (u32::from(chunk[4]) << 1);
            words.push(Word::new(l, r));
        }
        words
    }

    #[test]
    fn ascii_text_stays_readable() {
        let words = ascii_words(b"Hello, world!");
        assert_eq!(encode_words(&words), b"Hello, world!".to_vec());
    }

    #[test]
    fn crlf_becomes_newline() {
        let words = ascii_words(b"one\r\ntwo\r\n");
        assert_eq!(encode_words(&words), b"one\ntwo\n".to_vec());
    }

    #[test]
    fn crlf_across_word_boundary() {
        // Fifth character of the first word is the CR.
        let words = ascii_words(b"1234\r\n6789");
        assert_eq!(encode_words(&words), b"1234\n6789".to_vec());
    }

    #[test]
    fn lone_cr_uses_fallback() {
        let words = ascii_words(b"ab\rcd");
        let encoded = encode_words(&words);
        assert_eq!(encoded, vec![b'a', b'b', LONE_CR, b'c', b'd']);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn lone_lf_is_a_bare_cr_byte() {
        let words = ascii_words(b"ab\ncd");
        let encoded = encode_words(&words);
        assert_eq!(encoded, vec![b'a', b'b', CR, b'c', b'd']);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn rubout_pairs_fold_to_one_byte() {
        let words = ascii_words(&[b'x', RUBOUT, 0o101, b'y', b'z']);
        let encoded = encode_words(&words);
        assert_eq!(encoded, vec![b'x', 0o301, b'y', b'z']);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn double_rubout() {
        let words = ascii_words(&[RUBOUT, RUBOUT, b'a', b'b', b'c']);
        let encoded = encode_words(&words);
        assert_eq!(encoded, vec![0o207, b'a', b'b', b'c']);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn rubout_with_no_sequence_uses_fallback() {
        let words = ascii_words(&[RUBOUT, b'q', b'a', b'b', b'c']);
        let encoded = encode_words(&words);
        assert_eq!(encoded, vec![LONE_RUBOUT, b'q', b'a', b'b', b'c']);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn opaque_word_is_quoted() {
        let word = Word::new(0o123456, 0o000001);
        let encoded = encode_words(&[word]);
        assert_eq!(encoded, vec![0o362, 0x9C, 0xB8, 0x00, 0x01]);
        assert_eq!(decode_bytes(&encoded), vec![word]);
    }

    #[test]
    fn opaque_word_flushes_a_pending_cr_first() {
        let mut words = ascii_words(&[b'a', b'b', b'c', b'd', CR]);
        let binary = Word::new(0, 1);
        words.push(binary);
        let encoded = encode_words(&words);
        assert_eq!(encoded[..5], [b'a', b'b', b'c', b'd', LONE_CR]);
        assert_eq!(encoded[5], 0o360);
        assert_eq!(decode_bytes(&encoded), words);
    }

    #[test]
    fn trailing_control_c_padding_is_trimmed() {
        let words = ascii_words(b"ab"); // padded to abCCC internally
        assert_eq!(encode_words(&words), b"ab".to_vec());
    }

    #[test]
    fn control_c_inside_the_body_survives() {
        let text = [b'a', PAD, PAD, PAD, PAD, b'z', b'z', b'z', b'z', b'z'];
        let words = ascii_words(&text);
        assert_eq!(encode_words(&words), text.to_vec());
    }

    #[test]
    fn decoder_pads_partial_final_word() {
        let words = decode_bytes(b"ab");
        assert_eq!(words, ascii_words(b"ab"));
    }

    #[test]
    fn quote_mid_word_is_an_error() {
        let mut decoder = Decoder::new();
        decoder.push_byte(b'a').unwrap();
        match decoder.push_byte(0o360) {
            Err(Error::QuoteMidWord) => {}
            other => panic!("expected quote-mid-word error, got {:?}", other),
        }
    }

    #[test]
    fn truncated_quote_is_an_error() {
        let mut decoder = Decoder::new();
        decoder.push_byte(0o370).unwrap();
        decoder.push_byte(1).unwrap();
        match decoder.finish() {
            Err(Error::TruncatedQuote) => {}
            other => panic!("expected truncated-quote error, got {:?}", other),
        }
    }

    /// Every decodable byte value re-encodes to itself once its expansion is
    /// embedded in a word of unambiguous filler.
    #[test]
    fn every_byte_survives_a_round_trip() {
        for b in 0u8..=LONE_RUBOUT {
            let (first, second) = expand(b);
            let mut chars = vec![first];
            chars.extend(second);
            while chars.len() < 5 {
                chars.push(b'q'); // starts no sequence
            }
            let words = ascii_words(&chars);
            let encoded = encode_words(&words);
            assert_eq!(encoded[0], b, "byte {:#o} changed identity", b);
            assert_eq!(decode_bytes(&encoded), words, "byte {:#o}", b);
        }
    }
}
