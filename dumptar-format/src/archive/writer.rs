use std::io::Read;

use crate::archive::{DumpDate, FileLabel, VolumeHeader, LABEL_WORDS, VOLUME_WORDS};
use crate::error::Result;
use crate::evac;
use crate::framer::{PhysicalFormat, WordFramer};
use crate::path::ItsName;
use crate::sixbit;
use crate::transport::TapeSession;
use crate::word::Word;

/// Writes DUMP archive members to a tape.
pub struct DumpWriter {
    framer: WordFramer,
}

impl DumpWriter {
    /// Start a fresh tape: rewind and write the volume header. The header
    /// record is left open so the first file label shares it.
    pub fn create(
        session: TapeSession,
        format: PhysicalFormat,
        header: &VolumeHeader,
    ) -> Result<DumpWriter> {
        let mut framer = WordFramer::new(session, format);
        framer.session_mut().rewind()?;
        framer.write_word(Word::aobjn(VOLUME_WORDS))?;
        framer.write_word(Word::new(header.tape, header.reel))?;
        framer.write_word(sixbit::pack(&header.created))?;
        framer.write_word(header.kind.to_word())?;
        tracing::info!(tape = header.tape, reel = header.reel, kind = %header.kind, "volume header written");
        Ok(DumpWriter { framer })
    }

    /// Continue an existing tape: position between the closing tape marks.
    pub fn append(session: TapeSession, format: PhysicalFormat) -> Result<DumpWriter> {
        let mut framer = WordFramer::new(session, format);
        framer.session_mut().seek_to_eot()?;
        framer.reset();
        Ok(DumpWriter { framer })
    }

    fn write_label(&mut self, label: &FileLabel) -> Result<()> {
        let zero_date = |d: Option<DumpDate>| d.map_or(Word::ZERO, DumpDate::to_word);
        self.framer.write_word(Word::aobjn(LABEL_WORDS))?;
        self.framer.write_word(sixbit::pack(&label.name.ufd))?;
        self.framer.write_word(sixbit::pack(&label.name.fn1))?;
        self.framer.write_word(sixbit::pack(&label.name.fn2))?;
        self.framer
            .write_word(Word::new(label.is_link as u32, 0))?;
        self.framer.write_word(zero_date(label.creation))?;
        self.framer.write_word(zero_date(label.reference))?;
        Ok(())
    }

    /// Add one regular file: label, evacuated contents, tape mark.
    pub fn append_file<R: Read>(&mut self, label: &FileLabel, contents: &mut R) -> Result<()> {
        self.write_label(label)?;
        evac::unpack(contents, &mut self.framer)?;
        self.framer.write_tape_mark()?;
        tracing::info!(name = %label.name, "file written");
        Ok(())
    }

    /// Add a link. The target's name words follow the label, second and
    /// third name first, the directory last.
    pub fn append_link(&mut self, label: &FileLabel, target: &ItsName) -> Result<()> {
        self.write_label(label)?;
        self.framer.write_word(sixbit::pack(&target.fn1))?;
        self.framer.write_word(sixbit::pack(&target.fn2))?;
        self.framer.write_word(sixbit::pack(&target.ufd))?;
        self.framer.write_tape_mark()?;
        tracing::info!(name = %label.name, target = %target, "link written");
        Ok(())
    }

    /// Give the tape back. Closing the session adds the second tape mark of
    /// the end-of-tape pair.
    pub fn finish(self) -> Result<TapeSession> {
        Ok(self.framer.into_session())
    }
}
