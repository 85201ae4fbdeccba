//! Tape image files: each record is its payload bracketed by two 32-bit
//! little-endian length words, and a tape mark is a single zero length.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::unix::io::FromRawFd;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::decompress::Decompressor;
use crate::error::{Error, Result};
use crate::transport::{read_all, TapeRead};

/// Image framing flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStyle {
    /// Odd-length payloads carry one pad byte before the trailing length.
    Simh,
    /// No padding; payload bytes are written back to back.
    E11,
}

pub(crate) struct ImageTape {
    file: File,
    style: ImageStyle,
    /// Stdin/stdout never seeks, so EOT and rewind are unavailable.
    seekable: bool,
}

impl ImageTape {
    pub(crate) fn open(
        name: &str,
        create: bool,
        writable: bool,
        style: ImageStyle,
        decompressor: Option<&dyn Decompressor>,
    ) -> Result<ImageTape> {
        let path = resolve(Path::new(name), decompressor)?;
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(create)
            .truncate(create)
            .open(&path)
            .map_err(|source| Error::Open {
                name: name.to_string(),
                source,
            })?;
        Ok(ImageTape {
            file,
            style,
            seekable: true,
        })
    }

    /// Attach standard input (reading) or standard output (writing).
    pub(crate) fn stdio(writable: bool, style: ImageStyle) -> Result<ImageTape> {
        let fd = unsafe { libc::dup(if writable { 1 } else { 0 }) };
        if fd < 0 {
            return Err(Error::Open {
                name: "-".to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(ImageTape {
            file,
            style,
            seekable: false,
        })
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        if !self.seekable {
            return Err(Error::ControlFailed);
        }
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Seek between the final tape mark pair: just before the last zero
    /// length word in the file.
    pub(crate) fn seek_to_eot(&mut self) -> Result<()> {
        if !self.seekable {
            return Err(Error::ControlFailed);
        }
        self.file.seek(SeekFrom::End(-4))?;
        Ok(())
    }

    pub(crate) fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        let leading = match self.file.read_u32::<LittleEndian>() {
            Ok(n) => n,
            // EOF on a length boundary is the end of the medium.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(TapeRead::EndOfMedium)
            }
            Err(e) => return Err(Error::Io(e)),
        };
        if leading == 0 {
            return Ok(TapeRead::TapeMark);
        }
        let len = leading as usize;
        if len > buf.len() {
            return Err(Error::RecordTooLong {
                length: leading as u64,
                capacity: buf.len(),
            });
        }
        read_all(&mut self.file, &mut buf[..len])?;
        if self.style == ImageStyle::Simh && len % 2 == 1 {
            let mut pad = [0u8; 1];
            read_all(&mut self.file, &mut pad)?;
        }
        let mut trailer = [0u8; 4];
        read_all(&mut self.file, &mut trailer)?;
        let trailing = u32::from_le_bytes(trailer);
        if trailing != leading {
            return Err(Error::CorruptImage { leading, trailing });
        }
        Ok(TapeRead::Record(len))
    }

    pub(crate) fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        let len = buf.len() as u32;
        self.file.write_u32::<LittleEndian>(len)?;
        self.file.write_all(buf)?;
        if self.style == ImageStyle::Simh && buf.len() % 2 == 1 {
            self.file.write_all(&[0])?;
        }
        self.file.write_u32::<LittleEndian>(len)?;
        Ok(())
    }

    pub(crate) fn write_tape_mark(&mut self) -> Result<()> {
        self.file.write_u32::<LittleEndian>(0)?;
        Ok(())
    }
}

/// Pick the file to open. A name that is itself a `.Z` gets uncompressed to
/// its trimmed name; a missing file with a `.Z` sibling gets the sibling
/// uncompressed on the fly. Both need a supplied decompressor.
fn resolve(path: &Path, decompressor: Option<&dyn Decompressor>) -> Result<std::path::PathBuf> {
    if let (Some(trimmed), Some(d)) = (strip_z(path), decompressor) {
        if path.exists() {
            d.decompress(path, &trimmed)?;
        }
        return Ok(trimmed);
    }
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let compressed = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".Z");
        std::path::PathBuf::from(name)
    };
    if let Some(d) = decompressor {
        if compressed.exists() {
            d.decompress(&compressed, path)?;
            return Ok(path.to_path_buf());
        }
    }
    // Let the open fail with the original name.
    Ok(path.to_path_buf())
}

/// The name with a `.Z` suffix removed, when it has one.
fn strip_z(path: &Path) -> Option<std::path::PathBuf> {
    let name = path.as_os_str().to_str()?;
    let trimmed = name.strip_suffix(".Z")?;
    if trimmed.is_empty() {
        return None;
    }
    Some(std::path::PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;
    use std::fs;

    fn scratch(name: &str) -> std::path::PathBuf {
        let path = temp_dir().join(name);
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn simh_record_layout() {
        let path = scratch("dumptar-image-simh.tap");
        let name = path.to_str().unwrap();
        {
            let mut tape = ImageTape::open(name, true, true, ImageStyle::Simh, None).unwrap();
            tape.write_record(&[1, 2, 3]).unwrap();
            tape.write_tape_mark().unwrap();
        }
        let raw = fs::read(&path).unwrap();
        assert_eq!(
            raw,
            vec![3, 0, 0, 0, 1, 2, 3, 0, 3, 0, 0, 0, 0, 0, 0, 0],
            "odd payload gets one pad byte"
        );
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn e11_record_layout() {
        let path = scratch("dumptar-image-e11.tap");
        let name = path.to_str().unwrap();
        {
            let mut tape = ImageTape::open(name, true, true, ImageStyle::E11, None).unwrap();
            tape.write_record(&[1, 2, 3]).unwrap();
        }
        let raw = fs::read(&path).unwrap();
        assert_eq!(raw, vec![3, 0, 0, 0, 1, 2, 3, 3, 0, 0, 0]);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn read_back_marks_and_records() {
        let path = scratch("dumptar-image-read.tap");
        let name = path.to_str().unwrap();
        {
            let mut tape = ImageTape::open(name, true, true, ImageStyle::Simh, None).unwrap();
            tape.write_record(&[9; 10]).unwrap();
            tape.write_tape_mark().unwrap();
            tape.write_tape_mark().unwrap();
        }
        let mut tape = ImageTape::open(name, false, false, ImageStyle::Simh, None).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::Record(10));
        assert_eq!(&buf[..10], &[9; 10]);
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::TapeMark);
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::TapeMark);
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::EndOfMedium);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mismatched_trailer_is_corrupt() {
        let path = scratch("dumptar-image-corrupt.tap");
        fs::write(&path, [2, 0, 0, 0, 7, 7, 9, 0, 0, 0]).unwrap();
        let mut tape =
            ImageTape::open(path.to_str().unwrap(), false, false, ImageStyle::E11, None).unwrap();
        let mut buf = [0u8; 16];
        match tape.read_record(&mut buf) {
            Err(Error::CorruptImage { leading: 2, trailing: 9 }) => {}
            other => panic!("expected corrupt image, got {:?}", other),
        }
        fs::remove_file(&path).unwrap();
    }

    /// Stands in for zcat: copies the file and remembers being called.
    struct CopySpy(std::cell::Cell<bool>);

    impl Decompressor for CopySpy {
        fn decompress(&self, compressed: &Path, output: &Path) -> Result<()> {
            self.0.set(true);
            fs::copy(compressed, output)?;
            Ok(())
        }
    }

    #[test]
    fn z_suffixed_name_is_uncompressed_before_opening() {
        let trimmed = scratch("dumptar-image-zname.tap");
        let compressed = scratch("dumptar-image-zname.tap.Z");
        {
            let name = compressed.to_str().unwrap();
            let mut tape = ImageTape::open(name, true, true, ImageStyle::Simh, None).unwrap();
            tape.write_record(&[5; 6]).unwrap();
        }

        let spy = CopySpy(std::cell::Cell::new(false));
        let mut tape = ImageTape::open(
            compressed.to_str().unwrap(),
            false,
            false,
            ImageStyle::Simh,
            Some(&spy),
        )
        .unwrap();
        assert!(spy.0.get(), "the .Z name must go through the decompressor");
        let mut buf = [0u8; 16];
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::Record(6));

        fs::remove_file(&trimmed).unwrap();
        fs::remove_file(&compressed).unwrap();
    }

    #[test]
    fn missing_image_falls_back_to_z_sibling() {
        let trimmed = scratch("dumptar-image-zsib.tap");
        let compressed = scratch("dumptar-image-zsib.tap.Z");
        {
            let name = compressed.to_str().unwrap();
            let mut tape = ImageTape::open(name, true, true, ImageStyle::Simh, None).unwrap();
            tape.write_record(&[8; 4]).unwrap();
        }

        let spy = CopySpy(std::cell::Cell::new(false));
        let mut tape = ImageTape::open(
            trimmed.to_str().unwrap(),
            false,
            false,
            ImageStyle::Simh,
            Some(&spy),
        )
        .unwrap();
        assert!(spy.0.get());
        let mut buf = [0u8; 16];
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::Record(4));

        fs::remove_file(&trimmed).unwrap();
        fs::remove_file(&compressed).unwrap();
    }

    #[test]
    fn seek_to_eot_lands_before_last_mark() {
        let path = scratch("dumptar-image-eot.tap");
        let name = path.to_str().unwrap();
        {
            let mut tape = ImageTape::open(name, true, true, ImageStyle::Simh, None).unwrap();
            tape.write_record(&[4, 4]).unwrap();
            tape.write_tape_mark().unwrap();
            tape.write_tape_mark().unwrap();
        }
        let mut tape = ImageTape::open(name, false, true, ImageStyle::Simh, None).unwrap();
        tape.seek_to_eot().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::TapeMark);
        assert_eq!(tape.read_record(&mut buf).unwrap(), TapeRead::EndOfMedium);
        fs::remove_file(&path).unwrap();
    }
}
