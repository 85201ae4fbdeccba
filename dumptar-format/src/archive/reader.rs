use std::io::Write;

use crate::archive::{DumpDate, DumpKind, FileLabel, VolumeHeader};
use crate::error::{Error, Result};
use crate::evac;
use crate::framer::{PhysicalFormat, WordFramer};
use crate::path::ItsName;
use crate::sixbit;
use crate::transport::{TapeRead, TapeSession};

/// Walks a DUMP tape member by member.
///
/// Call [`DumpScanner::next_entry`] for each label; between calls, consume
/// the member with [`DumpScanner::extract_to`] or [`DumpScanner::read_link`],
/// or let the scanner skip it.
pub struct DumpScanner {
    framer: WordFramer,
    header: VolumeHeader,
    /// The first file label shares the volume header's record.
    label_pending: bool,
    /// The current member's contents and tape mark have been consumed.
    consumed: bool,
}

impl DumpScanner {
    /// Rewind and read the volume header.
    pub fn open(session: TapeSession, format: PhysicalFormat) -> Result<DumpScanner> {
        let mut framer = WordFramer::new(session, format);
        framer.session_mut().rewind()?;
        match framer.read_record()? {
            TapeRead::Record(_) => {}
            TapeRead::TapeMark | TapeRead::EndOfMedium => return Err(Error::NullTape),
        }

        let mut len = framer.read_word()?.aobjn_len();
        let header = if len >= 4 {
            let reel_word = framer.read_word()?;
            let created = sixbit::unpack(framer.read_word()?);
            let kind = DumpKind::from_word(framer.read_word()?);
            len -= 4;
            VolumeHeader {
                tape: reel_word.left(),
                reel: reel_word.right(),
                created,
                kind,
            }
        } else {
            VolumeHeader {
                tape: 0,
                reel: 0,
                created: String::new(),
                kind: DumpKind::Random,
            }
        };
        for _ in 0..len {
            framer.read_word()?;
        }
        tracing::debug!(tape = header.tape, reel = header.reel, kind = %header.kind, "volume header read");

        let label_pending = framer.words_remaining() != 0;
        Ok(DumpScanner {
            framer,
            header,
            label_pending,
            consumed: true,
        })
    }

    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Advance to the next member's label. `None` at the double tape mark
    /// that closes the tape.
    pub fn next_entry(&mut self) -> Result<Option<FileLabel>> {
        if !self.consumed {
            self.skip_entry()?;
        }
        if !self.label_pending {
            match self.framer.read_record()? {
                TapeRead::Record(_) => {}
                TapeRead::TapeMark | TapeRead::EndOfMedium => return Ok(None),
            }
        }
        self.label_pending = false;

        let mut len = self.framer.read_word()?.aobjn_len();
        if len < 4 {
            return Err(Error::InvalidLabel);
        }
        let ufd = sixbit::unpack(self.framer.read_word()?);
        let fn1 = sixbit::unpack(self.framer.read_word()?);
        let fn2 = sixbit::unpack(self.framer.read_word()?);
        len -= 4;

        // Trailing label words are optional; a bare name means a file.
        let mut is_link = false;
        let mut creation = None;
        let mut reference = None;
        if len > 0 {
            is_link = self.framer.read_word()?.left() != 0;
            len -= 1;
        }
        if len > 0 {
            creation = DumpDate::from_word(self.framer.read_word()?);
            len -= 1;
        }
        if len > 0 {
            reference = DumpDate::from_word(self.framer.read_word()?);
            len -= 1;
        }
        for _ in 0..len {
            self.framer.read_word()?;
        }

        self.consumed = false;
        Ok(Some(FileLabel {
            name: ItsName::new(&ufd, &fn1, &fn2),
            is_link,
            creation,
            reference,
        }))
    }

    /// Decode the current member's contents into `out`, through its tape
    /// mark.
    pub fn extract_to<W: Write>(&mut self, out: &mut W) -> Result<()> {
        evac::pack(&mut self.framer, out)?;
        self.consumed = true;
        Ok(())
    }

    /// Read the current member's link target, in the order it is stored.
    pub fn read_link(&mut self) -> Result<ItsName> {
        let mut word = || -> Result<String> {
            match self.framer.next_word()? {
                Some(w) => Ok(sixbit::unpack(w)),
                None => Err(Error::UnexpectedEof),
            }
        };
        let fn1 = word()?;
        let fn2 = word()?;
        let ufd = word()?;
        self.skip_entry()?;
        Ok(ItsName::new(&ufd, &fn1, &fn2))
    }

    /// Discard the rest of the current member, through its tape mark.
    pub fn skip_entry(&mut self) -> Result<()> {
        loop {
            match self.framer.read_record()? {
                TapeRead::Record(_) => continue,
                TapeRead::TapeMark | TapeRead::EndOfMedium => break,
            }
        }
        self.consumed = true;
        Ok(())
    }

    pub fn finish(self) -> TapeSession {
        self.framer.into_session()
    }

    pub fn format(&self) -> PhysicalFormat {
        self.framer.format()
    }
}
