//! Conversation with a remote coverage agent
//!
//! The client announces its format version, checks the agent's reply, sends a
//! single dump command and then collects SESSION and UNIT blocks until the
//! agent terminates the dump with an ACK.

use crate::error::{RetrievalError, TransportError};
use bytes::BytesMut;
use covfetch_shared::protocol::codec::{encode_command, encode_header};
use covfetch_shared::protocol::{Block, BlockCodec, Command, Header, ProtocolError};
use covfetch_shared::types::coverage::CoverageDataset;
use covfetch_shared::utils::time::format_millis;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Decoder;
use tracing::{debug, info};

const READ_CHUNK: usize = 8 * 1024;

/// Open a TCP connection to an agent within `limit`
pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<TcpStream, TransportError> {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let addr = format!("{host}:{port}");

    let stream = match timeout(limit, TcpStream::connect((bare, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransportError::ConnectFailed { addr, source }),
        Err(_) => {
            return Err(TransportError::ConnectFailed {
                addr,
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {limit:?}"),
                ),
            })
        }
    };
    if let Err(e) = stream.set_nodelay(true) {
        debug!("failed to set TCP_NODELAY: {}", e);
    }
    debug!(addr = %addr, "connected to coverage agent");
    Ok(stream)
}

/// Run the whole dump exchange on `stream`, bounded by `limit`.
///
/// The stream is dropped, and so closed, when this returns, whether the
/// exchange completed or not.
pub async fn fetch_with_deadline<S>(
    stream: S,
    reset: bool,
    limit: Duration,
) -> Result<CoverageDataset, RetrievalError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    timeout(limit, AgentConnection::new(stream).fetch(reset))
        .await
        .map_err(|_| TransportError::Timeout(limit))?
}

/// Protocol state over one agent connection
#[derive(Debug)]
pub struct AgentConnection<S> {
    stream: S,
    buf: BytesMut,
    codec: BlockCodec,
    units_received: usize,
}

impl<S> AgentConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            codec: BlockCodec::new(),
            units_received: 0,
        }
    }

    /// Handshake, request a dump and read it to the end
    pub async fn fetch(mut self, reset: bool) -> Result<CoverageDataset, RetrievalError> {
        self.handshake().await?;
        self.request_dump(reset).await?;
        let dataset = self.receive_dump().await?;
        if let Err(e) = self.stream.shutdown().await {
            debug!("error closing agent connection: {}", e);
        }
        Ok(dataset)
    }

    /// Exchange HEADER blocks. Nothing else is sent unless the agent speaks a
    /// supported version.
    pub async fn handshake(&mut self) -> Result<Header, RetrievalError> {
        let mut out = BytesMut::with_capacity(5);
        encode_header(&Header::current(), &mut out);
        self.send(&out).await?;

        match self.next_block().await? {
            Some(Block::Header(header)) => {
                header.check()?;
                debug!(version = header.version, "agent handshake complete");
                Ok(header)
            }
            Some(other) => Err(ProtocolError::UnexpectedBlock {
                expected: "HEADER",
                found: other.kind(),
            }
            .into()),
            None => Err(self.truncated()),
        }
    }

    pub async fn request_dump(&mut self, reset: bool) -> Result<(), RetrievalError> {
        let mut out = BytesMut::with_capacity(3);
        encode_command(&Command::dump(reset), &mut out);
        self.send(&out).await?;
        debug!(reset, "dump requested");
        Ok(())
    }

    /// Collect blocks up to the terminating ACK
    pub async fn receive_dump(&mut self) -> Result<CoverageDataset, RetrievalError> {
        let mut dataset = CoverageDataset::new();
        loop {
            match self.next_block().await? {
                Some(Block::Session(session)) => {
                    debug!(
                        session = %session.id,
                        start = %format_millis(session.start_millis),
                        dump = %format_millis(session.dump_millis),
                        window_ms = session.duration_millis(),
                        "session received"
                    );
                    dataset.add_session(session);
                }
                Some(Block::Unit(unit)) => {
                    self.units_received += 1;
                    dataset.add_unit(unit).map_err(ProtocolError::from)?;
                }
                Some(Block::Ack) => break,
                Some(other) => {
                    return Err(ProtocolError::UnexpectedBlock {
                        expected: "SESSION, UNIT or ACK",
                        found: other.kind(),
                    }
                    .into())
                }
                None => return Err(self.truncated()),
            }
        }
        info!(
            units = dataset.unit_count(),
            sessions = dataset.session_count(),
            unit_blocks = self.units_received,
            "coverage dump received"
        );
        Ok(dataset)
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), RetrievalError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| self.io_error(e))?;
        self.stream.flush().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Next complete block, or `None` once the agent has closed the stream
    async fn next_block(&mut self) -> Result<Option<Block>, RetrievalError> {
        loop {
            if let Some(block) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(block));
            }
            self.buf.reserve(READ_CHUNK);
            let read = self
                .stream
                .read_buf(&mut self.buf)
                .await
                .map_err(|e| self.io_error(e))?;
            if read == 0 {
                if !self.buf.is_empty() {
                    debug!(pending = self.buf.len(), "stream closed inside a block");
                }
                return Ok(None);
            }
        }
    }

    fn truncated(&self) -> RetrievalError {
        TransportError::StreamTruncated {
            units: self.units_received,
        }
        .into()
    }

    fn io_error(&self, err: io::Error) -> RetrievalError {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => self.truncated(),
            _ => TransportError::Io(err).into(),
        }
    }
}
