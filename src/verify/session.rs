//! One SMTP conversation with one server, over a plain or STARTTLS-upgraded
//! stream. Every client/server line is traced to the diagnostic channel.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::trace;

use crate::verify::error::VerifyError;

/// A parsed (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn accepted(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn transient(&self) -> bool {
        (400..500).contains(&self.code)
    }

    pub fn advertises(&self, extension: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|token| token.eq_ignore_ascii_case(extension))
        })
    }
}

/// Split one raw reply line into (code, more-lines-follow, text).
fn parse_reply_line(raw: &str) -> Result<(u16, bool, String), VerifyError> {
    // get() keeps multi-byte garbage from panicking on the slice
    let code = raw
        .get(..3)
        .and_then(|prefix| prefix.parse::<u16>().ok())
        .ok_or_else(|| VerifyError::Protocol(format!("unparseable reply line: {raw:?}")))?;
    let more = raw.as_bytes().get(3).copied() == Some(b'-');
    let text = raw.get(4..).unwrap_or("").to_string();
    Ok((code, more, text))
}

enum Transport {
    Clear(TcpStream),
    Secured(TlsStream<TcpStream>),
    Poisoned,
}

impl Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Clear(stream) => stream.read(buf),
            Self::Secured(stream) => stream.read(buf),
            Self::Poisoned => Err(io::Error::other("transport poisoned")),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Self::Clear(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            Self::Secured(stream) => {
                stream.write_all(data)?;
                stream.flush()
            }
            Self::Poisoned => Err(io::Error::other("transport poisoned")),
        }
    }
}

pub(crate) struct Session {
    host: String,
    transport: Transport,
    pending: Vec<u8>,
}

impl Session {
    /// Connect to the first reachable address of `host`.
    pub fn connect(
        host: &str,
        addresses: &[SocketAddr],
        timeout: Option<Duration>,
    ) -> Result<Self, VerifyError> {
        let mut last_err = None;
        for addr in addresses {
            let attempt = match timeout {
                Some(deadline) => TcpStream::connect_timeout(addr, deadline),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_read_timeout(timeout).map_err(VerifyError::io)?;
                    stream.set_write_timeout(timeout).map_err(VerifyError::io)?;
                    trace!(host, %addr, "connected");
                    return Ok(Self {
                        host: host.to_string(),
                        transport: Transport::Clear(stream),
                        pending: Vec::new(),
                    });
                }
                Err(source) => {
                    last_err = Some(VerifyError::Connect {
                        host: host.to_string(),
                        source,
                    });
                }
            }
        }
        Err(last_err.unwrap_or(VerifyError::NoSmtpServers))
    }

    /// Read the server greeting without sending anything.
    pub fn banner(&mut self) -> Result<Reply, VerifyError> {
        self.read_reply()
    }

    pub fn command(&mut self, command: &str) -> Result<Reply, VerifyError> {
        trace!(host = %self.host, "C: {command}");
        let mut wire = command.as_bytes().to_vec();
        wire.extend_from_slice(b"\r\n");
        self.transport.write_all(&wire).map_err(VerifyError::io)?;
        self.read_reply()
    }

    /// Send STARTTLS and, on acceptance, upgrade the transport in place.
    pub fn starttls(
        &mut self,
        connector: &TlsConnector,
        timeout: Option<Duration>,
    ) -> Result<Reply, VerifyError> {
        let reply = self.command("STARTTLS")?;
        if !reply.accepted() {
            return Ok(reply);
        }
        let transport = std::mem::replace(&mut self.transport, Transport::Poisoned);
        let plain = match transport {
            Transport::Clear(stream) => stream,
            other => {
                self.transport = other;
                return Ok(reply);
            }
        };
        let tls = handshake(connector, &self.host, plain)?;
        if let Some(deadline) = timeout {
            tls.get_ref()
                .set_read_timeout(Some(deadline))
                .map_err(VerifyError::io)?;
            tls.get_ref()
                .set_write_timeout(Some(deadline))
                .map_err(VerifyError::io)?;
        }
        self.transport = Transport::Secured(tls);
        trace!(host = %self.host, "transport upgraded to TLS");
        Ok(reply)
    }

    /// Best-effort QUIT; the probe result is already decided at this point.
    pub fn quit(&mut self) {
        trace!(host = %self.host, "C: QUIT");
        let _ = self.transport.write_all(b"QUIT\r\n");
        let _ = self.read_reply();
    }

    fn read_reply(&mut self) -> Result<Reply, VerifyError> {
        let mut code = None;
        let mut lines = Vec::new();
        loop {
            let raw = self.read_line()?;
            trace!(host = %self.host, "S: {raw}");
            let (parsed, more, text) = parse_reply_line(&raw)?;
            match code {
                None => code = Some(parsed),
                Some(existing) if existing != parsed => {
                    return Err(VerifyError::Protocol(format!(
                        "inconsistent reply codes {existing} vs {parsed}"
                    )));
                }
                Some(_) => {}
            }
            lines.push(text);
            if !more {
                break;
            }
        }
        Ok(Reply {
            code: code.unwrap_or(0),
            lines,
        })
    }

    fn read_line(&mut self) -> Result<String, VerifyError> {
        loop {
            if let Some(line) = take_pending_line(&mut self.pending)? {
                return Ok(line);
            }
            let mut buf = [0u8; 512];
            let read = self.transport.read(&mut buf).map_err(VerifyError::io)?;
            if read == 0 {
                return Err(VerifyError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-reply",
                )));
            }
            self.pending.extend_from_slice(&buf[..read]);
        }
    }
}

/// A reply line has no business being this long; past it the server is
/// either broken or hostile, and with the deadline disabled the buffer
/// would otherwise grow without bound.
const MAX_REPLY_LINE: usize = 8 * 1024;

/// Pop one complete line off the buffered bytes, or report that more
/// input is needed (`Ok(None)`).
fn take_pending_line(pending: &mut Vec<u8>) -> Result<Option<String>, VerifyError> {
    if let Some(pos) = pending.iter().position(|byte| *byte == b'\n') {
        let mut line: Vec<u8> = pending.drain(..=pos).collect();
        while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
            line.pop();
        }
        return String::from_utf8(line)
            .map(Some)
            .map_err(|err| VerifyError::Protocol(format!("non-UTF-8 reply: {err}")));
    }
    if pending.len() > MAX_REPLY_LINE {
        return Err(VerifyError::Protocol(format!(
            "reply line longer than {MAX_REPLY_LINE} bytes"
        )));
    }
    Ok(None)
}

fn handshake(
    connector: &TlsConnector,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, VerifyError> {
    match connector.connect(host, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(source)) => Err(VerifyError::Tls { source }),
        Err(HandshakeError::WouldBlock(mut mid)) => loop {
            match mid.handshake() {
                Ok(tls) => break Ok(tls),
                Err(HandshakeError::Failure(source)) => break Err(VerifyError::Tls { source }),
                Err(HandshakeError::WouldBlock(next)) => mid = next,
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_final_reply_line() {
        let (code, more, text) = parse_reply_line("250 OK").expect("parse");
        assert_eq!(code, 250);
        assert!(!more);
        assert_eq!(text, "OK");
    }

    #[test]
    fn parses_continuation_marker() {
        let (code, more, text) = parse_reply_line("250-STARTTLS").expect("parse");
        assert_eq!(code, 250);
        assert!(more);
        assert_eq!(text, "STARTTLS");
    }

    #[test]
    fn bare_code_is_a_final_line() {
        let (code, more, text) = parse_reply_line("421").expect("parse");
        assert_eq!(code, 421);
        assert!(!more);
        assert_eq!(text, "");
    }

    #[test]
    fn rejects_garbage_lines() {
        assert!(parse_reply_line("xy").is_err());
        assert!(parse_reply_line("abc hello").is_err());
    }

    #[test]
    fn multibyte_garbage_is_a_protocol_error() {
        // byte 3 falls inside the multi-byte character
        assert!(matches!(
            parse_reply_line("25€5"),
            Err(VerifyError::Protocol(_))
        ));
        assert!(parse_reply_line("€€€").is_err());
    }

    #[test]
    fn multibyte_reply_text_is_kept() {
        let (code, more, text) = parse_reply_line("250 déjà vu").expect("parse");
        assert_eq!(code, 250);
        assert!(!more);
        assert_eq!(text, "déjà vu");
    }

    #[test]
    fn pending_line_is_drained_and_trimmed() {
        let mut pending = b"220 mx.example.com ready\r\n250 next".to_vec();
        let line = take_pending_line(&mut pending).expect("ok").expect("line");
        assert_eq!(line, "220 mx.example.com ready");
        assert_eq!(pending, b"250 next");
    }

    #[test]
    fn incomplete_line_waits_for_more_input() {
        let mut pending = b"220 partial".to_vec();
        assert_eq!(take_pending_line(&mut pending).expect("ok"), None);
        assert_eq!(pending, b"220 partial");
    }

    #[test]
    fn newline_free_stream_is_cut_off() {
        let mut pending = vec![b'x'; MAX_REPLY_LINE + 1];
        assert!(matches!(
            take_pending_line(&mut pending),
            Err(VerifyError::Protocol(_))
        ));
    }

    #[test]
    fn reply_classification() {
        let ok = Reply {
            code: 250,
            lines: vec!["OK".into()],
        };
        assert!(ok.accepted() && !ok.transient());
        let busy = Reply {
            code: 451,
            lines: vec![],
        };
        assert!(busy.transient() && !busy.accepted());
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        let ehlo = Reply {
            code: 250,
            lines: vec![
                "mx.example.com".into(),
                "starttls".into(),
                "SIZE 35882577".into(),
            ],
        };
        assert!(ehlo.advertises("STARTTLS"));
        assert!(ehlo.advertises("size"));
        assert!(!ehlo.advertises("PIPELINING"));
    }
}
