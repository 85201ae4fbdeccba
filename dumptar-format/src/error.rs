use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong between the tape medium and a word stream.
///
/// Tape position is never trustworthy after a failure, so none of these are
/// recoverable: callers are expected to report and give up, not retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot open tape `{name}`")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("tape I/O error")]
    Io(#[from] io::Error),

    #[error("unexpected end of file on tape")]
    UnexpectedEof,

    #[error("{length} byte tape record too long for {capacity} byte buffer")]
    RecordTooLong { length: u64, capacity: usize },

    #[error("corrupt tape image: record length {leading} followed by trailer {trailing}")]
    CorruptImage { leading: u32, trailing: u32 },

    #[error("invalid rmt response code {code:#04x}")]
    RmtResponse { code: u8 },

    #[error("invalid rmt response terminator {byte:#05o}")]
    RmtTerminator { byte: u8 },

    #[error("remote tape error (code {code})")]
    Remote { code: u32 },

    #[error("rexec login refused: {0}")]
    RexecRefused(String),

    #[error("remote tape server reported failure")]
    ServerFailure,

    #[error("{length} byte record would alias a tape server opcode")]
    RecordAliasesOpcode { length: usize },

    #[error("tape drive control operation failed")]
    ControlFailed,

    #[error("record length {length} is not a multiple of {bytes_per_word} bytes per word")]
    RecordLength {
        length: usize,
        bytes_per_word: usize,
    },

    #[error("tape record too short")]
    RecordExhausted,

    #[error("quoted word marker inside a partially assembled word")]
    QuoteMidWord,

    #[error("truncated quoted word at end of input")]
    TruncatedQuote,

    #[error("null tape")]
    NullTape,

    #[error("invalid tape format")]
    InvalidLabel,

    #[error("error uncompressing `{}`", .path.display())]
    Decompress { path: PathBuf },
}
