//! Per-transfer state machine.
//!
//! Each [`Transfer`] owns exactly one socket and drives it directly through
//! the reactor; there is no intermediate multiplexing engine to wrap.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Instant;

use mio::net::TcpStream as MioTcpStream;
use rustls::{ClientConnection, StreamOwned};
use rustls_pki_types::ServerName;

use crate::error::TransportCode;
use crate::http::parse::{encode_request, framing_for, try_parse_headers, BodyFraming, ChunkedDecoder};
use crate::http::request::Request;
use crate::http::tls;

/// What the socket connection for a transfer looks like: plaintext, or TLS
/// terminated over the same TCP stream.
pub(crate) enum Conn {
    Plain(MioTcpStream),
    Tls(Box<StreamOwned<ClientConnection, MioTcpStream>>),
}

impl Conn {
    fn socket(&self) -> &MioTcpStream {
        match self {
            Conn::Plain(s) => s,
            Conn::Tls(s) => &s.sock,
        }
    }
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(s) => s.read(buf),
            Conn::Tls(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Plain(s) => s.write(buf),
            Conn::Tls(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Plain(s) => s.flush(),
            Conn::Tls(s) => s.flush(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Connecting,
    Writing,
    ReadingHeaders,
    ReadingBody,
    Done,
}

/// The outcome handed back to [`super::client::HttpClient`] once a transfer
/// leaves `Done`.
pub(crate) struct Outcome {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
    pub(crate) transport: TransportCode,
    pub(crate) error: Option<String>,
}

pub(crate) struct Transfer {
    pub(crate) request: Request,
    pub(crate) redirects_followed: u32,
    conn: Conn,
    state: State,
    out_buf: Vec<u8>,
    out_pos: usize,
    in_buf: Vec<u8>,
    status: u16,
    response_headers: Vec<(String, String)>,
    body: Vec<u8>,
    framing: Option<BodyFraming>,
    chunk_decoder: Option<ChunkedDecoder>,
    content_length_remaining: Option<usize>,
    deadline: Option<Instant>,
    pub(crate) header_cb: Option<Rc<dyn Fn(&str)>>,
    pub(crate) data_cb: Option<Rc<dyn Fn(&[u8])>>,
    error: Option<String>,
    transport: TransportCode,
}

impl Transfer {
    pub(crate) fn connect(
        addr: SocketAddr,
        host: &str,
        is_https: bool,
        request: Request,
        cookie_header: Option<&str>,
    ) -> io::Result<Self> {
        let stream = MioTcpStream::connect(addr)?;
        let conn = if is_https {
            let config = tls::client_config().map_err(to_io_error)?;
            let name: ServerName<'static> = tls::server_name(host).map_err(to_io_error)?;
            let client =
                ClientConnection::new(config, name).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            Conn::Tls(Box::new(StreamOwned::new(client, stream)))
        } else {
            Conn::Plain(stream)
        };

        let out_buf = encode_request(&request, cookie_header);
        let deadline = request.timeout.map(|d| Instant::now() + d);

        Ok(Transfer {
            request,
            redirects_followed: 0,
            conn,
            state: State::Connecting,
            out_buf,
            out_pos: 0,
            in_buf: Vec::new(),
            status: 0,
            response_headers: Vec::new(),
            body: Vec::new(),
            framing: None,
            chunk_decoder: None,
            content_length_remaining: None,
            deadline,
            header_cb: None,
            data_cb: None,
            error: None,
            transport: TransportCode::OK,
        })
    }

    pub(crate) fn raw_fd(&self) -> std::os::unix::io::RawFd {
        use std::os::unix::io::AsRawFd;
        self.conn.socket().as_raw_fd()
    }

    /// The readiness direction the socket should currently be registered
    /// for.
    pub(crate) fn desired_io_flags(&self) -> crate::reactor::IoFlags {
        use crate::reactor::IoFlags;
        match self.state {
            State::Connecting | State::Writing => IoFlags::WRITE,
            State::ReadingHeaders | State::ReadingBody => IoFlags::READ,
            State::Done => IoFlags::empty(),
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drives the transfer in response to readiness on its socket. Returns
    /// `Some(outcome)` once the transfer has left its active state and moved
    /// to completion, `None` if more I/O is needed.
    pub(crate) fn on_ready(&mut self) -> Option<Outcome> {
        loop {
            match self.state {
                State::Connecting | State::Writing => {
                    if let Err(e) = self.pump_write() {
                        if would_block(&e) {
                            return None;
                        }
                        return Some(self.fail(TransportCode::CONNECT, e.to_string()));
                    }
                    if self.out_pos >= self.out_buf.len() {
                        self.state = State::ReadingHeaders;
                        continue;
                    }
                    return None;
                }
                State::ReadingHeaders | State::ReadingBody => match self.pump_read() {
                    Ok(Some(())) => {
                        if self.state == State::Done {
                            return Some(self.take_outcome());
                        }
                        continue;
                    }
                    Ok(None) => return None,
                    Err(outcome) => return Some(outcome),
                },
                State::Done => return None,
            }
        }
    }

    pub(crate) fn on_timeout(&mut self) -> Outcome {
        self.fail(TransportCode::TIMEOUT, "request timed out".to_string())
    }

    fn pump_write(&mut self) -> io::Result<()> {
        while self.out_pos < self.out_buf.len() {
            match self.conn.write(&self.out_buf[self.out_pos..]) {
                Ok(0) => return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed")),
                Ok(n) => self.out_pos += n,
                Err(e) if would_block(&e) => return Err(e),
                Err(e) => return Err(e),
            }
        }
        let _ = self.conn.flush();
        Ok(())
    }

    /// Reads as much as is currently available, advancing the header/body
    /// state machine. `Ok(Some(()))` means progress was made and the caller
    /// should re-check `self.state`; `Ok(None)` means the socket would
    /// block; `Err` carries a terminal outcome.
    fn pump_read(&mut self) -> std::result::Result<Option<()>, Outcome> {
        let mut chunk = [0u8; 16 * 1024];
        let n = match self.conn.read(&mut chunk) {
            Ok(0) => {
                if self.state == State::ReadingBody && self.framing == Some(BodyFraming::UntilClose) {
                    self.finish_body();
                    return Ok(Some(()));
                }
                return Err(self.fail(TransportCode::IO, "connection closed unexpectedly".to_string()));
            }
            Ok(n) => n,
            Err(e) if would_block(&e) => return Ok(None),
            Err(e) => return Err(self.fail(TransportCode::IO, e.to_string())),
        };
        self.in_buf.extend_from_slice(&chunk[..n]);

        if self.state == State::ReadingHeaders {
            match try_parse_headers(&self.in_buf) {
                Ok(Some((status, headers, consumed))) => {
                    self.status = status;
                    if let Some(cb) = &self.header_cb {
                        for (name, value) in &headers {
                            cb(&format!("{name}: {value}"));
                        }
                    }
                    self.response_headers = headers;
                    self.in_buf.drain(..consumed);
                    let framing = framing_for(self.status, self.request.method, &self.response_headers);
                    self.framing = Some(framing);
                    if framing == BodyFraming::Chunked {
                        self.chunk_decoder = Some(ChunkedDecoder::new());
                    }
                    if let BodyFraming::ContentLength(len) = framing {
                        self.content_length_remaining = Some(len);
                    }
                    self.state = State::ReadingBody;
                    if framing == BodyFraming::None {
                        self.finish_body();
                    }
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(self.fail(TransportCode::PROTOCOL, e)),
            }
            return Ok(Some(()));
        }

        // ReadingBody
        match self.framing {
            Some(BodyFraming::Chunked) => {
                let decoder = self.chunk_decoder.as_mut().expect("chunked decoder set with framing");
                let mut decoded = Vec::new();
                let consumed = decoder.feed(&self.in_buf, &mut decoded);
                self.in_buf.drain(..consumed);
                if let Some(cb) = &self.data_cb {
                    if !decoded.is_empty() {
                        cb(&decoded);
                    }
                }
                self.body.extend_from_slice(&decoded);
                if decoder.is_finished() {
                    self.finish_body();
                }
            }
            Some(BodyFraming::ContentLength(_)) => {
                let remaining = self.content_length_remaining.unwrap_or(0);
                let take = remaining.min(self.in_buf.len());
                let chunk: Vec<u8> = self.in_buf.drain(..take).collect();
                if let Some(cb) = &self.data_cb {
                    if !chunk.is_empty() {
                        cb(&chunk);
                    }
                }
                self.body.extend_from_slice(&chunk);
                self.content_length_remaining = Some(remaining - take);
                if self.content_length_remaining == Some(0) {
                    self.finish_body();
                }
            }
            Some(BodyFraming::UntilClose) => {
                let chunk: Vec<u8> = self.in_buf.drain(..).collect();
                if let Some(cb) = &self.data_cb {
                    if !chunk.is_empty() {
                        cb(&chunk);
                    }
                }
                self.body.extend_from_slice(&chunk);
            }
            Some(BodyFraming::None) | None => self.finish_body(),
        }
        Ok(Some(()))
    }

    fn finish_body(&mut self) {
        self.state = State::Done;
    }

    fn fail(&mut self, transport: TransportCode, message: String) -> Outcome {
        self.state = State::Done;
        self.transport = transport;
        self.error = Some(message.clone());
        Outcome {
            status: self.status,
            headers: std::mem::take(&mut self.response_headers),
            body: std::mem::take(&mut self.body),
            transport,
            error: Some(message),
        }
    }

    fn take_outcome(&mut self) -> Outcome {
        Outcome {
            status: self.status,
            headers: std::mem::take(&mut self.response_headers),
            body: std::mem::take(&mut self.body),
            transport: self.transport,
            error: self.error.take(),
        }
    }
}

fn would_block(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
}

fn to_io_error(e: crate::error::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}
