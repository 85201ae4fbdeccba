//! Record-level access to a tape drive, a tape image, or a remote tape
//! server, behind one interface.
//!
//! Exactly one [`TapeSession`] may be live per process. The session owns the
//! underlying handle and all position state; a second open blocks until the
//! first session is dropped.

mod drive;
mod image;
mod rmt;
mod tapesrv;

use std::env;
use std::io::{self, Read};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::decompress::Decompressor;
use crate::error::{Error, Result};

pub use image::ImageStyle;

/// Default drive when neither the caller nor `$TAPE` names one.
const DEFAULT_TAPE: &str = "/dev/nrmt0";

/// Default density, in bits per inch.
const DEFAULT_DENSITY: u64 = 1600;

static SESSION: Mutex<()> = Mutex::new(());

/// Outcome of a record-level read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeRead {
    /// A data record of this many bytes.
    Record(usize),
    /// A zero-length record: a logical end-of-file boundary.
    TapeMark,
    /// No further records on the medium.
    EndOfMedium,
}

/// Magtape control operations, shared by the local-drive and rmt backends.
/// Codes are the Linux `mtio` values; the rmt protocol sends them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MtOp {
    WriteTapeMark,
    Rewind,
    ForwardSpaceFile,
    ForwardSpaceRecord,
    BackSpaceRecord,
    SetBlockSize,
    SetDensity,
}

impl MtOp {
    pub(crate) fn code(self) -> i16 {
        match self {
            MtOp::ForwardSpaceFile => 1,
            MtOp::ForwardSpaceRecord => 3,
            MtOp::BackSpaceRecord => 4,
            MtOp::WriteTapeMark => 5,
            MtOp::Rewind => 6,
            MtOp::SetBlockSize => 20,
            MtOp::SetDensity => 21,
        }
    }
}

/// `read_exact` with end-of-file mapped to a tape error instead of an
/// `io::ErrorKind`.
pub(crate) fn read_all<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::UnexpectedEof),
        Err(e) => Err(Error::Io(e)),
    }
}

enum Backend {
    Image(image::ImageTape),
    Drive(drive::DriveTape),
    Rmt(rmt::RmtTape),
    Srv(tapesrv::SrvTape),
}

/// Options for attaching a tape, in the manner of `std::fs::OpenOptions`.
pub struct TapeOpen<'a> {
    create: bool,
    writable: bool,
    style: ImageStyle,
    density: u64,
    decompressor: Option<&'a dyn Decompressor>,
}

impl Default for TapeOpen<'_> {
    fn default() -> Self {
        TapeOpen {
            create: false,
            writable: false,
            style: ImageStyle::Simh,
            density: DEFAULT_DENSITY,
            decompressor: None,
        }
    }
}

impl<'a> TapeOpen<'a> {
    pub fn new() -> TapeOpen<'a> {
        TapeOpen::default()
    }

    /// Create (truncating) rather than open, for image files.
    pub fn create(mut self, yes: bool) -> Self {
        self.create = yes;
        self
    }

    pub fn writable(mut self, yes: bool) -> Self {
        self.writable = yes;
        self
    }

    /// Image flavor to write and expect on read.
    pub fn style(mut self, style: ImageStyle) -> Self {
        self.style = style;
        self
    }

    /// Density in bits per inch, used only for the usage estimate.
    pub fn density(mut self, bpi: u64) -> Self {
        self.density = bpi;
        self
    }

    /// Decompressor to try when an image file turns out to be a `.Z`.
    pub fn decompressor(mut self, d: &'a dyn Decompressor) -> Self {
        self.decompressor = Some(d);
        self
    }

    /// Attach the named tape, or `$TAPE`, or the built-in default drive.
    pub fn open(&self, name: Option<&str>) -> Result<TapeSession> {
        TapeSession::open(name, self)
    }
}

/// The single active attachment to a tape drive, image, or remote server.
pub struct TapeSession {
    backend: Backend,
    writable: bool,
    density: u64,
    frames: u64,
    name: String,
    _guard: MutexGuard<'static, ()>,
}

impl TapeSession {
    fn open(name: Option<&str>, opts: &TapeOpen<'_>) -> Result<TapeSession> {
        let guard = SESSION.lock().unwrap_or_else(PoisonError::into_inner);

        let name = match name {
            Some(n) => n.to_string(),
            None => env::var("TAPE").unwrap_or_else(|_| DEFAULT_TAPE.to_string()),
        };

        let backend = if let Some(colon) = name.find(':') {
            let (front, devspec) = (&name[..colon], &name[colon + 1..]);
            let (user, host) = match front.find('@') {
                Some(at) if at > 0 => (Some(&front[..at]), &front[at + 1..]),
                Some(at) => (None, &front[at + 1..]),
                None => (None, front),
            };
            if !devspec.is_empty() && devspec.bytes().all(|b| b.is_ascii_digit()) {
                // host:port is the legacy binary tape server
                let port: u16 = devspec.parse().map_err(|_| Error::Open {
                    name: name.clone(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "port out of range"),
                })?;
                Backend::Srv(tapesrv::SrvTape::connect(host, port)?)
            } else {
                Backend::Rmt(rmt::RmtTape::open(host, user, devspec, opts.writable)?)
            }
        } else if name.starts_with("/dev/") {
            Backend::Drive(drive::DriveTape::open(&name, opts.writable)?)
        } else if name == "-" {
            Backend::Image(image::ImageTape::stdio(opts.writable, opts.style)?)
        } else {
            Backend::Image(image::ImageTape::open(
                &name,
                opts.create,
                opts.writable,
                opts.style,
                opts.decompressor,
            )?)
        };

        let mut session = TapeSession {
            backend,
            writable: opts.writable,
            density: opts.density,
            frames: 0,
            name,
            _guard: guard,
        };

        // Best-effort SCSI setup; failure tolerated, not every drive is one.
        if let Backend::Drive(_) | Backend::Rmt(_) = session.backend {
            let _ = session.control(MtOp::SetBlockSize, 0)?; // variable record length
            let _ = session.control(MtOp::SetDensity, 0x02)?; // 1600 bpi
        }

        tracing::debug!(name = %session.name, writable = session.writable, "tape opened");
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn density(&self) -> u64 {
        self.density
    }

    /// Frames written so far, inter-record gaps included. Only an estimate
    /// for the usage report.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Position at beginning of tape.
    pub fn rewind(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Image(t) => return t.rewind(),
            Backend::Srv(t) => return t.rewind(),
            _ => {}
        }
        if self.control(MtOp::Rewind, 1)? {
            Ok(())
        } else {
            Err(Error::ControlFailed)
        }
    }

    /// Position between the two tape marks at logical end of tape.
    pub fn seek_to_eot(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Image(t) => return t.seek_to_eot(),
            Backend::Srv(t) => return t.seek_to_eot(),
            _ => {}
        }
        // Speculatively back up in case we are already parked at LEOT.
        let _ = self.control(MtOp::BackSpaceRecord, 1)?;
        loop {
            if !self.control(MtOp::ForwardSpaceFile, 1)? {
                return Err(Error::ControlFailed);
            }
            // Probe one record; failing means two consecutive tape marks.
            if !self.control(MtOp::ForwardSpaceRecord, 1)? {
                break;
            }
        }
        if self.control(MtOp::BackSpaceRecord, 1)? {
            Ok(())
        } else {
            Err(Error::ControlFailed)
        }
    }

    /// Read the next record into `buf`. A record longer than `buf` is fatal.
    pub fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        let outcome = match &mut self.backend {
            Backend::Image(t) => t.read_record(buf)?,
            Backend::Drive(t) => t.read_record(buf)?,
            Backend::Rmt(t) => t.read_record(buf)?,
            Backend::Srv(t) => t.read_record(buf)?,
        };
        tracing::trace!(?outcome, "read record");
        Ok(outcome)
    }

    pub fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.backend {
            Backend::Image(t) => t.write_record(buf)?,
            Backend::Drive(t) => t.write_record(buf)?,
            Backend::Rmt(t) => t.write_record(buf)?,
            Backend::Srv(t) => t.write_record(buf)?,
        }
        tracing::trace!(len = buf.len(), "wrote record");
        // record plus a 0.6" inter-record gap
        self.frames += buf.len() as u64 + self.density * 3 / 5;
        Ok(())
    }

    pub fn write_tape_mark(&mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Image(t) => t.write_tape_mark()?,
            Backend::Srv(t) => t.write_tape_mark()?,
            _ => {
                if !self.control(MtOp::WriteTapeMark, 1)? {
                    return Err(Error::ControlFailed);
                }
            }
        }
        self.frames += 3 * self.density; // 3" of tape
        Ok(())
    }

    /// Detach. A session opened for writing gets one more trailing tape
    /// mark first, closing the double-mark at logical EOT.
    pub fn close(mut self) -> Result<()> {
        if self.writable {
            self.write_tape_mark()?;
        }
        match &mut self.backend {
            Backend::Rmt(t) => t.close()?,
            Backend::Srv(t) => t.close()?,
            _ => {}
        }
        tracing::debug!(name = %self.name, "tape closed");
        Ok(())
    }

    /// Device control for the drive-like backends. `Ok(false)` is a
    /// device-level refusal the caller may ignore; `Err` is a wire or I/O
    /// failure and is always fatal.
    fn control(&mut self, op: MtOp, count: i32) -> Result<bool> {
        match &mut self.backend {
            Backend::Drive(t) => Ok(t.control(op, count)),
            Backend::Rmt(t) => t.control(op, count),
            _ => Ok(false),
        }
    }
}
