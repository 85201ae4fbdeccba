//! Remote drives through the BSD `rmt` protocol: an `rexec` login on the
//! remote host runs `/etc/rmt`, which then speaks a textual command set over
//! the same connection.

use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;

use crate::error::{Error, Result};
use crate::transport::{read_all, MtOp, TapeRead};

const REXEC_PORT: u16 = 512;
const RMT_COMMAND: &str = "/etc/rmt";

pub(crate) struct RmtTape {
    client: RmtClient<TcpStream>,
}

impl RmtTape {
    pub(crate) fn open(
        host: &str,
        user: Option<&str>,
        device: &str,
        writable: bool,
    ) -> Result<RmtTape> {
        let stream = rexec(host, user)?;
        let mut client = RmtClient::new(stream);
        let device = if device.is_empty() {
            crate::transport::DEFAULT_TAPE
        } else {
            device
        };
        let mode = if writable { libc::O_RDWR } else { libc::O_RDONLY };
        client.send(&format!("O{}\n{}\n", device, mode))?;
        client.response()?;
        Ok(RmtTape { client })
    }

    pub(crate) fn read_record(&mut self, buf: &mut [u8]) -> Result<TapeRead> {
        self.client.send(&format!("R{}\n", buf.len()))?;
        let n = self.client.response()? as usize;
        if n == 0 {
            return Ok(TapeRead::TapeMark);
        }
        if n > buf.len() {
            return Err(Error::RecordTooLong {
                length: n as u64,
                capacity: buf.len(),
            });
        }
        read_all(&mut self.client.stream, &mut buf[..n])?;
        Ok(TapeRead::Record(n))
    }

    /// No reply is read here; the server's acknowledgements are consumed by
    /// whichever command follows. Historic rmt clients all work this way.
    pub(crate) fn write_record(&mut self, buf: &[u8]) -> Result<()> {
        self.client.send(&format!("W{}\n", buf.len()))?;
        self.client.stream.write_all(buf)?;
        self.client.stream.flush()?;
        Ok(())
    }

    /// `Ok(false)` when the remote drive refused the operation.
    pub(crate) fn control(&mut self, op: MtOp, count: i32) -> Result<bool> {
        self.client.send(&format!("I{}\n{}\n", op.code(), count))?;
        match self.client.result()? {
            Ok(_) => Ok(true),
            Err(code) => {
                tracing::debug!(?op, count, code, "remote mt operation refused");
                Ok(false)
            }
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.client.send("C\n")?;
        self.client.response()?;
        Ok(())
    }
}

/// The textual exchange itself, over any byte stream.
struct RmtClient<S> {
    stream: S,
}

impl<S: Read + Write> RmtClient<S> {
    fn new(stream: S) -> RmtClient<S> {
        RmtClient { stream }
    }

    fn send(&mut self, command: &str) -> Result<()> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read one `A<num>` or `E<num>` reply line.
    fn result(&mut self) -> Result<std::result::Result<u32, u32>> {
        let mut code = [0u8; 1];
        read_all(&mut self.stream, &mut code)?;
        let ok = match code[0] {
            b'A' => true,
            b'E' => false,
            other => return Err(Error::RmtResponse { code: other }),
        };
        let mut num = 0u32;
        loop {
            let mut byte = [0u8; 1];
            read_all(&mut self.stream, &mut byte)?;
            match byte[0] {
                b'0'..=b'9' => num = num * 10 + u32::from(byte[0] - b'0'),
                b'\n' => break,
                other => return Err(Error::RmtTerminator { byte: other }),
            }
        }
        if !ok {
            // The error reply carries a message line after the errno.
            let mut byte = [0u8; 1];
            while byte[0] != b'\n' {
                read_all(&mut self.stream, &mut byte)?;
            }
        }
        Ok(if ok { Ok(num) } else { Err(num) })
    }

    /// A reply where `E` is fatal.
    fn response(&mut self) -> Result<u32> {
        match self.result()? {
            Ok(n) => Ok(n),
            Err(code) => Err(Error::Remote { code }),
        }
    }
}

/// Log into `host` with the 4.2BSD rexec protocol and start `/etc/rmt`.
/// The password comes from `$RMT_PASSWORD`; most rmt hosts accept an empty
/// one for trusted clients.
fn rexec(host: &str, user: Option<&str>) -> Result<TcpStream> {
    let user = match user {
        Some(u) => u.to_string(),
        None => env::var("USER")
            .or_else(|_| env::var("LOGNAME"))
            .unwrap_or_else(|_| "root".to_string()),
    };
    let password = env::var("RMT_PASSWORD").unwrap_or_default();

    let mut stream = TcpStream::connect((host, REXEC_PORT)).map_err(|source| Error::Open {
        name: host.to_string(),
        source,
    })?;

    // No separate stderr connection, then user, password and command, each
    // NUL terminated.
    stream.write_all(b"0\0")?;
    stream.write_all(user.as_bytes())?;
    stream.write_all(b"\0")?;
    stream.write_all(password.as_bytes())?;
    stream.write_all(b"\0")?;
    stream.write_all(RMT_COMMAND.as_bytes())?;
    stream.write_all(b"\0")?;

    let mut status = [0u8; 1];
    read_all(&mut stream, &mut status)?;
    if status[0] != 0 {
        let mut message = String::new();
        let mut byte = [0u8; 1];
        while stream.read(&mut byte)? == 1 && byte[0] != b'\n' {
            message.push(byte[0] as char);
        }
        return Err(Error::RexecRefused(message));
    }
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::RmtClient;
    use crate::error::Error;
    use crate::transport::testutil::Duplex;

    #[test]
    fn ack_carries_a_count() {
        let mut client = RmtClient::new(Duplex::new(b"A1024\n"));
        assert_eq!(client.response().unwrap(), 1024);
    }

    #[test]
    fn error_reply_is_remote_errno() {
        let mut client = RmtClient::new(Duplex::new(b"E5\nI/O error\n"));
        match client.response() {
            Err(Error::Remote { code: 5 }) => {}
            other => panic!("expected remote errno 5, got {:?}", other),
        }
    }

    #[test]
    fn garbage_reply_is_rejected() {
        let mut client = RmtClient::new(Duplex::new(b"X0\n"));
        match client.response() {
            Err(Error::RmtResponse { code: b'X' }) => {}
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn commands_go_out_verbatim() {
        let mut client = RmtClient::new(Duplex::new(b"A0\n"));
        client.send("I6\n1\n").unwrap();
        client.response().unwrap();
        assert_eq!(client.stream.output, b"I6\n1\n");
    }
}
