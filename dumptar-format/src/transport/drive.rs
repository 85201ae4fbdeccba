//! Local magtape drives, driven through `read(2)`, `write(2)` and the
//! `MTIOCTOP` ioctl.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;

use crate::error::{Error, Result};
use crate::transport::{MtOp, TapeRead};

const MTIOCTOP: libc::c_ulong = 0x4008_6d01;

#[repr(C)]
struct Mtop {
    mt_op: libc::c_short,
    mt_count: libc::c_int,
}

pub(crate) struct DriveTape {
    file: File,
}

impl DriveTape {
    pub(crate) fn open(name: &str, writable: bool) -> Result<DriveTape> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(name)
            .map_err(|source| Error::Open {
                name: name.to_string(),
                source,
            })?;
        Ok(DriveTape { file })
    }

    /// A variable-block read returns one whole record; zero bytes at a tape
    /// mark, and again at the second mark of the end-of-tape pair.
    pub(crate) fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        let n = self.file.read(buf)?;
        if n == 0 {
            // The driver cannot distinguish the two; callers track marks.
            Ok(TapeRead::TapeMark)
        } else {
            Ok(TapeRead::Record(n))
        }
    }

    pub(crate) fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.file.write(buf)?;
        if n != buf.len() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "short tape write",
            )));
        }
        Ok(())
    }

    /// Returns whether the drive accepted the operation.
    pub(crate) fn control(&mut self, op: MtOp, count: i32) -> bool {
        let arg = Mtop {
            mt_op: op.code(),
            mt_count: count,
        };
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), MTIOCTOP, &arg) };
        if rc != 0 {
            tracing::debug!(?op, count, errno = ?io::Error::last_os_error(), "mt ioctl refused");
        }
        rc == 0
    }
}
