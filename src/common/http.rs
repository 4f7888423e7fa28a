//! HTTP/1.1 head parsing and framing-aware body relay
//!
//! The gateway speaks raw HTTP/1.1 on every socket it touches: the public
//! port, the tunnel endpoints, and (on the agent) the loopback target. This
//! module parses one message head at a time out of a caller-owned residue
//! buffer and relays bodies according to their framing, consuming exactly the
//! body bytes so that pipeline residue survives for the next exchange on the
//! same socket.

use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum message head size (32KB)
const MAX_HEAD_SIZE: usize = 32 * 1024;

/// Maximum length of a single chunk-size or trailer line
const MAX_LINE: usize = 8 * 1024;

/// Parsed HTTP request head.
///
/// `raw_headers` keeps the header block byte-for-byte (every header line with
/// its CRLF, without the blank line) so the request can be re-serialised
/// verbatim; `headers` is the lowercased view used for lookups.
#[derive(Debug)]
pub struct RequestHead {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub raw_headers: Vec<u8>,
}

/// Parsed HTTP response head. `raw_head` is the full head including the
/// status line and the terminating blank line, ready to forward verbatim.
#[derive(Debug)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub raw_head: Vec<u8>,
}

impl RequestHead {
    /// First value of a header, by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connection_close(&self) -> bool {
        has_connection_token(self.header("connection"), "close")
    }

    /// `Upgrade: websocket` request, per the upgrade-proxy path.
    pub fn wants_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }
}

impl ResponseHead {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn connection_close(&self) -> bool {
        has_connection_token(self.header("connection"), "close")
    }
}

fn has_connection_token(value: Option<&str>, token: &str) -> bool {
    value
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
        .unwrap_or(false)
}

/// Body framing of an HTTP/1.1 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// No body bytes follow the head.
    None,
    /// Exactly this many body bytes follow.
    Fixed(u64),
    /// Transfer-Encoding: chunked.
    Chunked,
    /// Body is delimited by connection close (responses only).
    UntilClose,
}

impl BodyFraming {
    /// A delimited body leaves the connection reusable after the relay.
    pub fn is_delimited(&self) -> bool {
        !matches!(self, BodyFraming::UntilClose)
    }
}

/// Framing of a request body. Chunked wins over Content-Length per RFC 9112.
pub fn request_framing(head: &RequestHead) -> Result<BodyFraming> {
    if let Some(te) = head.header("transfer-encoding") {
        if te.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")) {
            return Ok(BodyFraming::Chunked);
        }
    }
    match head.header("content-length") {
        Some(cl) => {
            let n: u64 = cl
                .trim()
                .parse()
                .map_err(|_| Error::parse(format!("invalid Content-Length: {}", cl)))?;
            Ok(BodyFraming::Fixed(n))
        }
        None => Ok(BodyFraming::None),
    }
}

/// Framing of a response body, given the request method it answers.
pub fn response_framing(req_method: &str, head: &ResponseHead) -> BodyFraming {
    // Responses without body: HEAD answers, 1xx, 204, 304
    if req_method.eq_ignore_ascii_case("HEAD")
        || head.status < 200
        || head.status == 204
        || head.status == 304
    {
        return BodyFraming::None;
    }
    if let Some(te) = head.header("transfer-encoding") {
        if te.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")) {
            return BodyFraming::Chunked;
        }
    }
    if let Some(cl) = head.header("content-length") {
        if let Ok(n) = cl.trim().parse() {
            return BodyFraming::Fixed(n);
        }
    }
    BodyFraming::UntilClose
}

/// Find \r\n\r\n in buffer, returns index of the first \r
fn find_header_end(buf: &[u8]) -> Option<usize> {
    if buf.len() < 4 {
        return None;
    }
    for i in 0..buf.len() - 3 {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' && buf[i + 2] == b'\r' && buf[i + 3] == b'\n' {
            return Some(i);
        }
    }
    None
}

/// Read one request head out of `buf`, filling from `reader` as needed.
///
/// Returns `Ok(None)` when the peer closed cleanly before sending anything
/// (normal end of a keep-alive connection). Body bytes that arrived with the
/// head stay in `buf`.
pub async fn read_request_head<R>(reader: &mut R, buf: &mut BytesMut) -> Result<Option<RequestHead>>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_header_end(&buf[..]) {
            let head_bytes = buf.split_to(end + 4);
            return parse_request_head(&head_bytes).map(Some);
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(Error::parse("request head too large"));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::protocol("connection closed mid request head"));
        }
    }
}

/// Read one response head out of `buf`, filling from `reader` as needed.
/// EOF at any point is an error: a framed endpoint owes us a response.
pub async fn read_response_head<R>(reader: &mut R, buf: &mut BytesMut) -> Result<ResponseHead>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_header_end(&buf[..]) {
            let head_bytes = buf.split_to(end + 4);
            return parse_response_head(&head_bytes);
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(Error::parse("response head too large"));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::protocol("connection closed mid response head"));
        }
    }
}

fn parse_request_head(head: &[u8]) -> Result<RequestHead> {
    let line_end = find_crlf(head).ok_or_else(|| Error::parse("missing request line"))?;
    let line = std::str::from_utf8(&head[..line_end])
        .map_err(|_| Error::parse("request line is not UTF-8"))?;

    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::parse("empty request line"))?;
    let target = parts
        .next()
        .ok_or_else(|| Error::parse("request line missing target"))?;
    let version = parts
        .next()
        .ok_or_else(|| Error::parse("request line missing version"))?;

    // Header block without the request line and the final blank line
    let raw_headers = head[line_end + 2..head.len() - 2].to_vec();
    let headers = parse_header_lines(&raw_headers)?;

    Ok(RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        raw_headers,
    })
}

fn parse_response_head(head: &[u8]) -> Result<ResponseHead> {
    let line_end = find_crlf(head).ok_or_else(|| Error::parse("missing status line"))?;
    let line = std::str::from_utf8(&head[..line_end])
        .map_err(|_| Error::parse("status line is not UTF-8"))?;

    let mut parts = line.splitn(3, ' ');
    let version = parts
        .next()
        .filter(|v| v.starts_with("HTTP/"))
        .ok_or_else(|| Error::parse("status line missing version"))?;
    let status: u16 = parts
        .next()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| Error::parse("status line missing code"))?;
    let reason = parts.next().unwrap_or("").to_string();

    let header_block = &head[line_end + 2..head.len() - 2];
    let headers = parse_header_lines(header_block)?;

    Ok(ResponseHead {
        version: version.to_string(),
        status,
        reason,
        headers,
        raw_head: head.to_vec(),
    })
}

fn parse_header_lines(block: &[u8]) -> Result<Vec<(String, String)>> {
    let text =
        std::str::from_utf8(block).map_err(|_| Error::parse("header block is not UTF-8"))?;
    let mut headers = Vec::new();
    for line in text.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        if let Some(colon_idx) = line.find(':') {
            let key = line[..colon_idx].trim().to_lowercase();
            let value = line[colon_idx + 1..].trim().to_string();
            headers.push((key, value));
        }
    }
    Ok(headers)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Serialise a request head onto `writer`.
///
/// `target` rewrites the request line; `host` replaces the `Host` header
/// (the agent points it at the loopback target). Everything else is
/// forwarded byte-for-byte.
pub async fn write_request_head<W>(
    writer: &mut W,
    head: &RequestHead,
    target: Option<&str>,
    host: Option<&str>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let target = target.unwrap_or(&head.target);
    let mut out = Vec::with_capacity(head.raw_headers.len() + 64);
    out.extend_from_slice(head.method.as_bytes());
    out.push(b' ');
    out.extend_from_slice(target.as_bytes());
    out.push(b' ');
    out.extend_from_slice(head.version.as_bytes());
    out.extend_from_slice(b"\r\n");
    match host {
        None => out.extend_from_slice(&head.raw_headers),
        Some(host) => {
            // the block was UTF-8 checked at parse time
            let block = std::str::from_utf8(&head.raw_headers)
                .map_err(|_| Error::parse("header block is not UTF-8"))?;
            let mut replaced = false;
            for line in block.split("\r\n").filter(|l| !l.is_empty()) {
                let name = line.split(':').next().unwrap_or("").trim();
                if name.eq_ignore_ascii_case("host") {
                    out.extend_from_slice(format!("Host: {}\r\n", host).as_bytes());
                    replaced = true;
                } else {
                    out.extend_from_slice(line.as_bytes());
                    out.extend_from_slice(b"\r\n");
                }
            }
            if !replaced {
                out.extend_from_slice(format!("Host: {}\r\n", host).as_bytes());
            }
        }
    }
    out.extend_from_slice(b"\r\n");
    writer.write_all(&out).await?;
    Ok(())
}

/// Relay exactly one message body from (`buf` + `reader`) to `writer`.
///
/// Consumes precisely the body bytes; anything beyond them stays in `buf`
/// for the next head parse on the same connection.
pub async fn relay_body<R, W>(
    framing: BodyFraming,
    reader: &mut R,
    buf: &mut BytesMut,
    writer: &mut W,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = match framing {
        BodyFraming::None => 0,
        BodyFraming::Fixed(n) => copy_exact(reader, buf, writer, n).await?,
        BodyFraming::Chunked => relay_chunked(reader, buf, writer).await?,
        BodyFraming::UntilClose => relay_until_close(reader, buf, writer).await?,
    };
    writer.flush().await?;
    Ok(copied)
}

async fn copy_exact<R, W>(
    reader: &mut R,
    buf: &mut BytesMut,
    writer: &mut W,
    n: u64,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = n;
    while remaining > 0 {
        if buf.is_empty() {
            let got = reader.read_buf(buf).await?;
            if got == 0 {
                return Err(Error::protocol("connection closed mid body"));
            }
        }
        let take = std::cmp::min(buf.len() as u64, remaining) as usize;
        writer.write_all(&buf[..take]).await?;
        buf.advance(take);
        remaining -= take as u64;
    }
    Ok(n)
}

async fn relay_chunked<R, W>(reader: &mut R, buf: &mut BytesMut, writer: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    loop {
        let line = read_line(reader, buf).await?;
        writer.write_all(&line).await?;
        total += line.len() as u64;

        let size = parse_chunk_size(&line)?;
        if size == 0 {
            // Trailer section: lines up to and including the blank line
            loop {
                let trailer = read_line(reader, buf).await?;
                writer.write_all(&trailer).await?;
                total += trailer.len() as u64;
                if trailer.len() <= 2 {
                    break;
                }
            }
            return Ok(total);
        }

        // Chunk data plus its trailing CRLF
        total += copy_exact(reader, buf, writer, size + 2).await?;
    }
}

async fn relay_until_close<R, W>(reader: &mut R, buf: &mut BytesMut, writer: &mut W) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    if !buf.is_empty() {
        writer.write_all(&buf[..]).await?;
        total += buf.len() as u64;
        buf.clear();
    }
    let mut tmp = [0u8; 8192];
    loop {
        let n = reader.read(&mut tmp).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&tmp[..n]).await?;
        total += n as u64;
    }
}

/// Read one line (through the \n) out of `buf`, filling from `reader`.
pub(crate) async fn read_line<R>(reader: &mut R, buf: &mut BytesMut) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    loop {
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            return Ok(buf.split_to(pos + 1));
        }
        if buf.len() >= MAX_LINE {
            return Err(Error::parse("line too long"));
        }
        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(Error::protocol("connection closed mid line"));
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(line).map_err(|_| Error::parse("chunk header not UTF-8"))?;
    let size_str = text
        .trim_end_matches(['\r', '\n'])
        .split(';')
        .next()
        .unwrap_or("")
        .trim();
    u64::from_str_radix(size_str, 16)
        .map_err(|_| Error::parse(format!("invalid chunk size: {}", size_str)))
}

/// Write a complete small HTTP/1.1 response with Content-Length framing.
pub async fn write_simple_response<W>(
    writer: &mut W,
    status: u16,
    reason: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = Vec::with_capacity(body.len() + 128);
    out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", status, reason).as_bytes());
    for (name, value) in extra_headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    writer.write_all(&out).await?;
    writer.flush().await?;
    Ok(())
}

/// True when the target's query string carries `key` (with or without value).
pub fn has_query_key(target: &str, key: &str) -> bool {
    query_pairs(target).any(|(k, _)| k == key)
}

/// First value of a query parameter, percent-decoded.
pub fn query_param(target: &str, key: &str) -> Option<String> {
    query_pairs(target)
        .find(|(k, _)| *k == key)
        .map(|(_, v)| urlencoding::decode(v).map(|c| c.into_owned()).unwrap_or_else(|_| v.to_string()))
}

fn query_pairs<'a>(target: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
    query.split('&').filter(|p| !p.is_empty()).map(|pair| {
        match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_request_head_leaves_body_in_buf() {
        let raw: &[u8] = b"POST /x HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhello";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let head = read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "/x");
        assert_eq!(head.version, "HTTP/1.1");
        assert_eq!(head.header("host"), Some("a"));
        assert_eq!(&buf[..], b"hello");
        assert_eq!(request_framing(&head).unwrap(), BodyFraming::Fixed(5));
    }

    #[tokio::test]
    async fn test_read_request_head_eof_is_none() {
        let mut reader: &[u8] = b"";
        let mut buf = BytesMut::new();
        assert!(read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_read_response_head() {
        let raw: &[u8] = b"HTTP/1.1 204 No Content\r\nX-Test: 1\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let head = read_response_head(&mut reader, &mut buf).await.unwrap();
        assert_eq!(head.status, 204);
        assert_eq!(head.reason, "No Content");
        assert_eq!(head.header("x-test"), Some("1"));
        assert_eq!(head.raw_head, raw.to_vec());
        assert_eq!(response_framing("GET", &head), BodyFraming::None);
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_response_framing_variants() {
        let raw: &[u8] = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let chunked = read_response_head(&mut reader, &mut buf).await.unwrap();
        assert_eq!(response_framing("GET", &chunked), BodyFraming::Chunked);
        assert_eq!(response_framing("HEAD", &chunked), BodyFraming::None);

        let raw: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let bare = read_response_head(&mut reader, &mut buf).await.unwrap();
        assert_eq!(response_framing("GET", &bare), BodyFraming::UntilClose);
    }

    #[tokio::test]
    async fn test_relay_fixed_body_preserves_residue() {
        // Body "hello" followed by pipelined bytes that must stay buffered
        let mut reader: &[u8] = b"lo NEXT";
        let mut buf = BytesMut::from(&b"hel"[..]);
        let mut out = Cursor::new(Vec::new());
        let n = relay_body(BodyFraming::Fixed(5), &mut reader, &mut buf, &mut out)
            .await
            .unwrap();
        assert_eq!(n, 5);
        assert_eq!(out.into_inner(), b"hello");
        // " NEXT" was read in the same chunk as "lo" and must remain
        assert_eq!(&buf[..], b" NEXT");
    }

    #[tokio::test]
    async fn test_relay_chunked_body() {
        let raw: &[u8] = b"5\r\nhello\r\n0\r\n\r\nRESIDUE";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let mut out = Cursor::new(Vec::new());
        relay_body(BodyFraming::Chunked, &mut reader, &mut buf, &mut out)
            .await
            .unwrap();
        assert_eq!(out.into_inner(), b"5\r\nhello\r\n0\r\n\r\n");
        assert_eq!(&buf[..], b"RESIDUE");
    }

    #[tokio::test]
    async fn test_relay_chunked_with_trailers() {
        let raw: &[u8] = b"3\r\nabc\r\n0\r\nX-Sum: 9\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let mut out = Cursor::new(Vec::new());
        relay_body(BodyFraming::Chunked, &mut reader, &mut buf, &mut out)
            .await
            .unwrap();
        assert_eq!(out.into_inner(), raw.to_vec());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_write_request_head_rewrites_target() {
        let raw: &[u8] = b"GET /beta/x/y?q=1 HTTP/1.1\r\nHost: gw\r\nAccept: */*\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let head = read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .unwrap();
        let mut out = Cursor::new(Vec::new());
        write_request_head(&mut out, &head, Some("/x/y?q=1"), None)
            .await
            .unwrap();
        assert_eq!(
            out.into_inner(),
            b"GET /x/y?q=1 HTTP/1.1\r\nHost: gw\r\nAccept: */*\r\n\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_write_request_head_rewrites_host() {
        let raw: &[u8] =
            b"GET / HTTP/1.1\r\nHost: alpha.t.example\r\nAccept: */*\r\nX-Seq: 2\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let head = read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .unwrap();
        let mut out = Cursor::new(Vec::new());
        write_request_head(&mut out, &head, None, Some("127.0.0.1:3000"))
            .await
            .unwrap();
        assert_eq!(
            out.into_inner(),
            b"GET / HTTP/1.1\r\nHost: 127.0.0.1:3000\r\nAccept: */*\r\nX-Seq: 2\r\n\r\n".to_vec()
        );

        // a head without a Host header gains one
        let raw: &[u8] = b"GET / HTTP/1.1\r\nAccept: */*\r\n\r\n";
        let mut reader = raw;
        let mut buf = BytesMut::new();
        let head = read_request_head(&mut reader, &mut buf)
            .await
            .unwrap()
            .unwrap();
        let mut out = Cursor::new(Vec::new());
        write_request_head(&mut out, &head, None, Some("127.0.0.1:3000"))
            .await
            .unwrap();
        assert_eq!(
            out.into_inner(),
            b"GET / HTTP/1.1\r\nAccept: */*\r\nHost: 127.0.0.1:3000\r\n\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_relay_fixed_body_split_reads() {
        // body arrives in two separate reads off the socket
        let mut reader = tokio_test::io::Builder::new()
            .read(b"par")
            .read(b"tial")
            .build();
        let mut buf = BytesMut::new();
        let mut out = Cursor::new(Vec::new());
        let n = relay_body(BodyFraming::Fixed(7), &mut reader, &mut buf, &mut out)
            .await
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(out.into_inner(), b"partial");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_write_simple_response() {
        let mut out = Cursor::new(Vec::new());
        write_simple_response(
            &mut out,
            502,
            "Bad Gateway",
            &[("Content-Type", "text/plain")],
            b"Proxy error",
        )
        .await
        .unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\nProxy error"));
    }

    #[test]
    fn test_query_helpers() {
        assert!(has_query_key("/?new", "new"));
        assert!(has_query_key("/?a=1&new=", "new"));
        assert!(!has_query_key("/?newer", "new"));
        assert!(!has_query_key("/", "new"));
        assert_eq!(query_param("/?api_key=k-1", "api_key"), Some("k-1".into()));
        assert_eq!(
            query_param("/?api_key=a%2Fb", "api_key"),
            Some("a/b".into())
        );
        assert_eq!(query_param("/x?a=1", "b"), None);
    }

    #[test]
    fn test_connection_close_tokens() {
        assert!(has_connection_token(Some("close"), "close"));
        assert!(has_connection_token(Some("Upgrade, Close"), "close"));
        assert!(!has_connection_token(Some("keep-alive"), "close"));
        assert!(!has_connection_token(None, "close"));
    }
}
