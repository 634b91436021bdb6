//! HTTP/1.x message framing on raw byte streams.
//!
//! The framer delimits exactly one message (start line, header section,
//! blank line and `Content-Length` body) and keeps every byte it consumed,
//! terminators included, so the proxy can retransmit the message verbatim
//! instead of re-serializing a parsed structure.

use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Default upper bound for the start line plus header section.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 64 * 1024;

const INITIAL_CAPACITY: usize = 1024;
const MAX_BODY_PREALLOC: usize = 64 * 1024;

/// Why a message could not be framed.
#[derive(Debug, Error)]
pub enum FrameErrorKind {
    #[error("connection closed before a message started")]
    ConnectionClosed,

    #[error("malformed start line: {0:?}")]
    MalformedStartLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeaderLine(String),

    #[error("stream ended before the end of the header section")]
    TruncatedHeaders,

    #[error("header section exceeds {0} bytes")]
    HeadersTooLarge(usize),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("body truncated: expected {expected} bytes, received {received}")]
    TruncatedBody { expected: usize, received: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A framing failure together with every byte consumed before it.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct FrameError {
    kind: FrameErrorKind,
    partial: Bytes,
}

impl FrameError {
    fn new(kind: FrameErrorKind, partial: BytesMut) -> Self {
        Self {
            kind,
            partial: partial.freeze(),
        }
    }

    pub fn kind(&self) -> &FrameErrorKind {
        &self.kind
    }

    /// Raw bytes read from the stream before the failure.
    pub fn partial(&self) -> &[u8] {
        &self.partial
    }

    pub fn into_partial(self) -> Bytes {
        self.partial
    }
}

/// Header fields in arrival order.
///
/// Names compare case-insensitively. A repeated name keeps the position of
/// its first occurrence and the value of its last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One framed HTTP message.
#[derive(Debug, Clone)]
pub struct HttpMessage {
    start_line: String,
    headers: Headers,
    raw: Bytes,
    header_len: usize,
}

impl HttpMessage {
    /// Request line or status line, without its terminator.
    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Declared body length; `None` when the header is absent.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("Content-Length")?.parse().ok()
    }

    /// Start line and header section, blank line included, exactly as received.
    pub fn raw_headers(&self) -> &[u8] {
        &self.raw[..self.header_len]
    }

    pub fn body(&self) -> &[u8] {
        &self.raw[self.header_len..]
    }

    /// The whole message exactly as received.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Reads single HTTP messages off a buffered byte stream.
#[derive(Debug, Clone, Copy)]
pub struct MessageFramer {
    max_header_bytes: usize,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_BYTES)
    }
}

impl MessageFramer {
    pub fn new(max_header_bytes: usize) -> Self {
        Self { max_header_bytes }
    }

    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    /// Read exactly one message from `reader`.
    ///
    /// Nothing past the declared body is consumed from the stream. On error
    /// the bytes consumed so far are returned inside the [`FrameError`].
    pub async fn read_message<R>(&self, reader: &mut R) -> Result<HttpMessage, FrameError>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let mut raw = BytesMut::with_capacity(INITIAL_CAPACITY);

        let (start_line, headers) = match self.read_head(reader, &mut raw).await {
            Ok(head) => head,
            Err(kind) => return Err(FrameError::new(kind, raw)),
        };
        let header_len = raw.len();

        let body_len = match headers.get("Content-Length") {
            Some(value) => match value.parse::<usize>() {
                Ok(len) => len,
                Err(_) => {
                    return Err(FrameError::new(
                        FrameErrorKind::InvalidContentLength(value.to_string()),
                        raw,
                    ));
                }
            },
            None => 0,
        };

        if body_len > 0 {
            if let Err(kind) = read_body(reader, &mut raw, body_len).await {
                return Err(FrameError::new(kind, raw));
            }
        }

        Ok(HttpMessage {
            start_line,
            headers,
            raw: raw.freeze(),
            header_len,
        })
    }

    /// Read the start line and header fields up to and including the blank line.
    async fn read_head<R>(
        &self,
        reader: &mut R,
        raw: &mut BytesMut,
    ) -> Result<(String, Headers), FrameErrorKind>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        let mut start_line: Option<String> = None;
        let mut headers = Headers::default();
        let mut line = Vec::with_capacity(128);

        loop {
            let remaining = self.max_header_bytes.saturating_sub(raw.len());
            if remaining == 0 {
                return Err(FrameErrorKind::HeadersTooLarge(self.max_header_bytes));
            }

            line.clear();
            let n = (&mut *reader)
                .take(remaining as u64)
                .read_until(b'\n', &mut line)
                .await?;
            raw.extend_from_slice(&line);

            if n == 0 {
                return Err(if raw.is_empty() {
                    FrameErrorKind::ConnectionClosed
                } else {
                    FrameErrorKind::TruncatedHeaders
                });
            }
            if line.last() != Some(&b'\n') {
                return Err(if n >= remaining {
                    FrameErrorKind::HeadersTooLarge(self.max_header_bytes)
                } else {
                    FrameErrorKind::TruncatedHeaders
                });
            }

            let content = String::from_utf8_lossy(strip_terminator(&line));

            if start_line.is_none() {
                if content.split(' ').count() < 3 {
                    return Err(FrameErrorKind::MalformedStartLine(content.into_owned()));
                }
                start_line = Some(content.into_owned());
                continue;
            }

            if content.is_empty() {
                return Ok((start_line.take().unwrap_or_default(), headers));
            }

            let Some((name, value)) = content.split_once(':') else {
                return Err(FrameErrorKind::MalformedHeaderLine(content.into_owned()));
            };
            headers.insert(name, value.trim());
        }
    }
}

/// Read exactly `len` body bytes, never past them.
async fn read_body<R>(reader: &mut R, raw: &mut BytesMut, len: usize) -> Result<(), FrameErrorKind>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let start = raw.len();
    raw.reserve(len.min(MAX_BODY_PREALLOC));

    let mut body = (&mut *reader).take(len as u64);
    while raw.len() - start < len {
        let n = body.read_buf(raw).await?;
        if n == 0 {
            return Err(FrameErrorKind::TruncatedBody {
                expected: len,
                received: raw.len() - start,
            });
        }
    }

    Ok(())
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Read one message with the default limits.
pub async fn read_message<R>(reader: &mut R) -> Result<HttpMessage, FrameError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    MessageFramer::default().read_message(reader).await
}
