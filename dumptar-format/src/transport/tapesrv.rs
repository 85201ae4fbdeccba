//! The legacy binary tape server protocol. Every command is a 16-bit
//! little-endian value: small values are opcodes, anything at or above
//! [`WRITE_THRESHOLD`] means "write a record of this many bytes" and is
//! followed by the payload. The server answers each command with a single
//! status byte.

use std::io::{Read, Write};
use std::net::TcpStream;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::transport::{read_all, TapeRead};

const TS_WTM: u16 = 0;
const TS_RDR: u16 = 1;
const TS_CLS: u16 = 2;
const TS_REW: u16 = 3;
const TS_EOT: u16 = 6;

/// Smallest record length that cannot be confused with an opcode. The word
/// framer never emits a record below 12 bytes, so this costs nothing.
const WRITE_THRESHOLD: u16 = 18;

const STATUS_OK: u8 = 0x00;

pub(crate) struct SrvTape {
    client: SrvClient<TcpStream>,
}

impl SrvTape {
    pub(crate) fn connect(host: &str, port: u16) -> Result<SrvTape> {
        let stream = TcpStream::connect((host, port)).map_err(|source| Error::Open {
            name: format!("{}:{}", host, port),
            source,
        })?;
        Ok(SrvTape {
            client: SrvClient::new(stream),
        })
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.client.command(TS_REW)
    }

    pub(crate) fn seek_to_eot(&mut self) -> Result<()> {
        self.client.command(TS_EOT)
    }

    pub(crate) fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        self.client.read_record(buf)
    }

    pub(crate) fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        self.client.write_record(buf)
    }

    pub(crate) fn write_tape_mark(&mut self) -> Result<()> {
        self.client.command(TS_WTM)
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.client.command(TS_CLS)
    }
}

struct SrvClient<S> {
    stream: S,
}

impl<S: Read + Write> SrvClient<S> {
    fn new(stream: S) -> SrvClient<S> {
        SrvClient { stream }
    }

    fn status(&mut self) -> Result<()> {
        let mut status = [0u8; 1];
        read_all(&mut self.stream, &mut status)?;
        if status[0] == STATUS_OK {
            Ok(())
        } else {
            Err(Error::ServerFailure)
        }
    }

    fn command(&mut self, op: u16) -> Result<()> {
        self.stream.write_u16::<LittleEndian>(op)?;
        self.stream.flush()?;
        self.status()
    }

    fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        self.stream.write_u16::<LittleEndian>(TS_RDR)?;
        self.stream.flush()?;
        self.status()?;
        let len = self.stream.read_u16::<LittleEndian>()? as usize;
        if len == 0 {
            return Ok(TapeRead::TapeMark);
        }
        if len > buf.len() {
            return Err(Error::RecordTooLong {
                length: len as u64,
                capacity: buf.len(),
            });
        }
        read_all(&mut self.stream, &mut buf[..len])?;
        Ok(TapeRead::Record(len))
    }

    fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        // A shorter record would be taken for an opcode on the wire.
        if buf.len() < WRITE_THRESHOLD as usize || buf.len() > u16::MAX as usize {
            return Err(Error::RecordAliasesOpcode { length: buf.len() });
        }
        self.stream.write_u16::<LittleEndian>(buf.len() as u16)?;
        self.stream.write_all(buf)?;
        self.stream.flush()?;
        self.status()
    }
}
