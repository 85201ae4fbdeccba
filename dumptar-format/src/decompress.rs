//! Uncompressing `.Z` tape images before use.
//!
//! Old tape image archives are usually stored `compress(1)`ed. The codec is
//! injected so that callers without the external tool, or with a different
//! one, can supply their own.

use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// Expands a compressed tape image into a plain file.
pub trait Decompressor {
    fn decompress(&self, compressed: &Path, output: &Path) -> Result<()>;
}

/// Runs `zcat`, then removes the compressed original so the expanded image
/// is found directly next time.
pub struct ZcatDecompressor;

impl Decompressor for ZcatDecompressor {
    fn decompress(&self, compressed: &Path, output: &Path) -> Result<()> {
        tracing::info!(from = %compressed.display(), to = %output.display(), "uncompressing");
        let outfile = File::create(output)?;
        let status = Command::new("zcat")
            .arg(compressed)
            .stdin(Stdio::null())
            .stdout(outfile)
            .status()?;
        if !status.success() {
            let _ = fs::remove_file(output);
            return Err(Error::Decompress {
                path: compressed.to_path_buf(),
            });
        }
        fs::remove_file(compressed)?;
        Ok(())
    }
}
