pub mod archive;
mod decompress;
mod error;
mod evac;
mod framer;
pub mod path;
pub mod sixbit;
mod transport;
mod word;

pub use decompress::{Decompressor, ZcatDecompressor};
pub use error::{Error, Result};
pub use evac::{pack, unpack, Decoder, Encoder};
pub use framer::{PhysicalFormat, WordFramer};
pub use path::ItsName;
pub use transport::{ImageStyle, TapeOpen, TapeRead, TapeSession};
pub use word::Word;
