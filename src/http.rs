//! Minimal HTTP/1.1 wire codec used by both halves of the pair.
//!
//! Only the subset the comic protocol needs is implemented: a start
//! line, a handful of headers (Host, Content-Length, Connection), and a
//! length-delimited body. Keep-alive preferences are computed here so
//! the session state machines only consult a boolean.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Peers do not get to pick our allocation sizes: a message declaring or
/// streaming a body past this bound is rejected as invalid data.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_HEADERS: usize = 64;
const MAX_LINE_BYTES: usize = 8 * 1024;

pub const USER_AGENT: &str = concat!("comics-http/", env!("CARGO_PKG_VERSION"));
pub const SERVER_NAME: &str = USER_AGENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "HTTP/1.0" => Some(Self::Http10),
            "HTTP/1.1" => Some(Self::Http11),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http10 => "HTTP/1.0",
            Self::Http11 => "HTTP/1.1",
        }
    }

    fn default_keep_alive(self) -> bool {
        matches!(self, Self::Http11)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: Version,
    /// Peer preference, computed from the protocol version and the
    /// Connection header.
    pub keep_alive: bool,
    pub body: String,
}

impl Request {
    pub fn new(method: &str, target: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            target: target.into(),
            version: Version::Http11,
            keep_alive: true,
            body: body.into(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target, "")
    }

    pub fn put(target: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new("PUT", target, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub reason: String,
    pub version: Version,
    pub keep_alive: bool,
    pub content_type: String,
    pub body: String,
}

impl Response {
    /// Starts an empty response mirroring the request's protocol version
    /// and keep-alive preference.
    pub fn new(status: Status, request: &Request) -> Self {
        Self {
            code: status.code(),
            reason: status.reason().to_string(),
            version: request.version,
            keep_alive: request.keep_alive,
            content_type: "text/plain".to_string(),
            body: String::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// The single must-close condition: the session stops looping when
    /// the response does not carry keep-alive.
    pub fn must_close(&self) -> bool {
        !self.keep_alive
    }
}

/// Reads one request off the connection. Returns `Ok(None)` on a clean
/// end-of-stream before any request bytes arrive.
pub async fn read_request<R>(reader: &mut R) -> io::Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
{
    let line = match read_start_line(reader).await? {
        Some(line) => line,
        None => return Ok(None),
    };

    let mut parts = line.split_whitespace();
    let (method, target, version_token) = match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version)) => (method, target, version),
        _ => return Err(invalid_data(format!("malformed request line: {line}"))),
    };
    let version = Version::from_token(version_token)
        .ok_or_else(|| invalid_data(format!("unsupported protocol version: {version_token}")))?;

    let headers = read_headers(reader).await?;
    let body = read_body(reader, headers.content_length()?).await?;
    let keep_alive = headers.keep_alive(version.default_keep_alive());

    Ok(Some(Request {
        method: method.to_string(),
        target: target.to_string(),
        version,
        keep_alive,
        body,
    }))
}

pub async fn write_request<W>(writer: &mut W, request: &Request, host: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut message = format!(
        "{} {} {}\r\n",
        request.method,
        request.target,
        request.version.as_str()
    );
    message.push_str(&format!("Host: {host}\r\n"));
    message.push_str(&format!("User-Agent: {USER_AGENT}\r\n"));
    if !request.keep_alive {
        message.push_str("Connection: close\r\n");
    }
    message.push_str(&format!("Content-Length: {}\r\n\r\n", request.body.len()));
    message.push_str(&request.body);

    writer.write_all(message.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one response off the connection. Returns `Ok(None)` on a clean
/// end-of-stream before any response bytes arrive.
pub async fn read_response<R>(reader: &mut R) -> io::Result<Option<Response>>
where
    R: AsyncBufRead + Unpin,
{
    let line = match read_start_line(reader).await? {
        Some(line) => line,
        None => return Ok(None),
    };

    let mut parts = line.splitn(3, ' ');
    let (version_token, code_token) = match (parts.next(), parts.next()) {
        (Some(version), Some(code)) => (version, code),
        _ => return Err(invalid_data(format!("malformed status line: {line}"))),
    };
    let version = Version::from_token(version_token)
        .ok_or_else(|| invalid_data(format!("unsupported protocol version: {version_token}")))?;
    let code: u16 = code_token
        .parse()
        .map_err(|_| invalid_data(format!("malformed status code: {code_token}")))?;
    let reason = parts.next().unwrap_or("").to_string();

    let headers = read_headers(reader).await?;
    let content_type = headers.get("content-type").unwrap_or("").to_string();
    let keep_alive = headers.keep_alive(version.default_keep_alive());
    let body = match headers.content_length()? {
        Some(length) => read_body(reader, Some(length)).await?,
        None => read_remaining(reader).await?,
    };

    Ok(Some(Response {
        code,
        reason,
        version,
        keep_alive,
        content_type,
        body,
    }))
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut message = format!(
        "{} {} {}\r\n",
        response.version.as_str(),
        response.code,
        response.reason
    );
    message.push_str(&format!("Server: {SERVER_NAME}\r\n"));
    message.push_str(&format!("Content-Type: {}\r\n", response.content_type));
    if !response.keep_alive {
        message.push_str("Connection: close\r\n");
    }
    message.push_str(&format!("Content-Length: {}\r\n\r\n", response.body.len()));
    message.push_str(&response.body);

    writer.write_all(message.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[derive(Debug, Default)]
struct Headers(Vec<(String, String)>);

impl Headers {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn content_length(&self) -> io::Result<Option<usize>> {
        let value = match self.get("content-length") {
            Some(value) => value,
            None => return Ok(None),
        };
        let length: usize = value
            .trim()
            .parse()
            .map_err(|_| invalid_data(format!("malformed content-length: {value}")))?;
        if length > MAX_BODY_BYTES {
            return Err(invalid_data(format!(
                "declared body of {length} bytes exceeds the {MAX_BODY_BYTES} byte limit"
            )));
        }
        Ok(Some(length))
    }

    fn keep_alive(&self, default: bool) -> bool {
        match self.get("connection") {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => default,
        }
    }
}

/// Reads the start line, skipping any stray blank lines left between
/// keep-alive messages. `None` means the peer closed the stream cleanly.
async fn read_start_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        match read_line_bounded(reader).await? {
            None => return Ok(None),
            Some(line) if line.is_empty() => continue,
            Some(line) => return Ok(Some(line)),
        }
    }
}

async fn read_headers<R>(reader: &mut R) -> io::Result<Headers>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = Headers::default();
    loop {
        let line = read_line_bounded(reader)
            .await?
            .ok_or_else(|| invalid_data("connection closed inside headers".to_string()))?;
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.0.len() == MAX_HEADERS {
            return Err(invalid_data(format!("more than {MAX_HEADERS} headers")));
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid_data(format!("malformed header line: {line}")))?;
        headers
            .0
            .push((name.trim().to_string(), value.trim().to_string()));
    }
}

/// Reads one newline-terminated line, trimmed of line endings, refusing
/// to buffer more than [`MAX_LINE_BYTES`]. `None` means the stream ended
/// before any line bytes arrived.
async fn read_line_bounded<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    loop {
        let (complete, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                if line.is_empty() {
                    return Ok(None);
                }
                (true, 0)
            } else {
                match available.iter().position(|&byte| byte == b'\n') {
                    Some(pos) => {
                        line.extend_from_slice(&available[..=pos]);
                        (true, pos + 1)
                    }
                    None => {
                        line.extend_from_slice(available);
                        (false, available.len())
                    }
                }
            }
        };
        reader.consume(used);

        if line.len() > MAX_LINE_BYTES {
            return Err(invalid_data(format!(
                "line exceeds the {MAX_LINE_BYTES} byte limit"
            )));
        }
        if complete {
            let text = String::from_utf8(line)
                .map_err(|err| invalid_data(format!("line is not valid utf-8: {err}")))?;
            return Ok(Some(text.trim_end_matches(LINE_ENDINGS).to_string()));
        }
    }
}

async fn read_body<R>(reader: &mut R, length: Option<usize>) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let length = match length {
        Some(length) if length > 0 => length,
        _ => return Ok(String::new()),
    };

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    String::from_utf8(body).map_err(|err| invalid_data(format!("body is not valid utf-8: {err}")))
}

/// Fallback for responses without Content-Length: the body runs until
/// the peer closes the stream, bounded by [`MAX_BODY_BYTES`].
async fn read_remaining<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut body: Vec<u8> = Vec::new();
    loop {
        let used = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            body.extend_from_slice(available);
            available.len()
        };
        reader.consume(used);

        if body.len() > MAX_BODY_BYTES {
            return Err(invalid_data(format!(
                "body exceeds the {MAX_BODY_BYTES} byte limit"
            )));
        }
    }
    String::from_utf8(body).map_err(|err| invalid_data(format!("body is not valid utf-8: {err}")))
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn request_round_trip() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        let request = Request::put("/comic/3", r#"{"title":"X"}"#);

        write_request(&mut writer, &request, "localhost")
            .await
            .expect("write request");
        let parsed = read_request(&mut reader)
            .await
            .expect("read request")
            .expect("expected request");

        assert_eq!(parsed.method, "PUT");
        assert_eq!(parsed.target, "/comic/3");
        assert_eq!(parsed.body, r#"{"title":"X"}"#);
        assert!(parsed.keep_alive);
    }

    #[tokio::test]
    async fn response_round_trip_with_close() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        let mut request = Request::get("/comic/0");
        request.keep_alive = false;
        let response = Response::new(Status::NotFound, &request)
            .with_content_type("text/html")
            .with_body("The resource '/comic/0' was not found.");

        write_response(&mut writer, &response).await.expect("write response");
        let parsed = read_response(&mut reader)
            .await
            .expect("read response")
            .expect("expected response");

        assert_eq!(parsed.code, 404);
        assert_eq!(parsed.reason, "Not Found");
        assert_eq!(parsed.content_type, "text/html");
        assert_eq!(parsed.body, "The resource '/comic/0' was not found.");
        assert!(parsed.must_close());
    }

    #[tokio::test]
    async fn two_pipelined_requests_parse_independently() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        write_request(&mut writer, &Request::get("/comic/0"), "localhost")
            .await
            .expect("write first");
        write_request(&mut writer, &Request::get("/comic/1"), "localhost")
            .await
            .expect("write second");

        let first = read_request(&mut reader)
            .await
            .expect("read first")
            .expect("first present");
        let second = read_request(&mut reader)
            .await
            .expect("read second")
            .expect("second present");
        assert_eq!(first.target, "/comic/0");
        assert_eq!(second.target, "/comic/1");
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(writer);
        let mut reader = BufReader::new(reader);
        let parsed = read_request(&mut reader).await.expect("read at eof");
        assert!(parsed.is_none());
    }

    #[tokio::test]
    async fn http10_defaults_to_close_unless_keep_alive_header() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);

        writer
            .write_all(b"GET /comic/0 HTTP/1.0\r\n\r\nGET /comic/0 HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
            .await
            .expect("write raw requests");

        let bare = read_request(&mut reader)
            .await
            .expect("read bare")
            .expect("bare present");
        assert!(!bare.keep_alive);

        let pinned = read_request(&mut reader)
            .await
            .expect("read keep-alive")
            .expect("keep-alive present");
        assert!(pinned.keep_alive);
    }

    #[tokio::test]
    async fn huge_declared_body_is_rejected_without_allocating() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"POST /comic HTTP/1.1\r\nContent-Length: 1125899906842624\r\n\r\n")
            .await
            .expect("write raw request");

        let err = read_request(&mut reader).await.expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn header_count_is_bounded() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let mut reader = BufReader::new(reader);

        let mut raw = String::from("GET /comic/0 HTTP/1.1\r\n");
        for n in 0..(MAX_HEADERS + 1) {
            raw.push_str(&format!("X-Filler-{n}: x\r\n"));
        }
        raw.push_str("\r\n");
        writer
            .write_all(raw.as_bytes())
            .await
            .expect("write raw request");

        let err = read_request(&mut reader).await.expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn oversized_header_line_is_rejected() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let mut reader = BufReader::new(reader);

        let raw = format!(
            "GET /comic/0 HTTP/1.1\r\nX-Filler: {}\r\n\r\n",
            "x".repeat(MAX_LINE_BYTES + 1)
        );
        writer
            .write_all(raw.as_bytes())
            .await
            .expect("write raw request");

        let err = read_request(&mut reader).await.expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn eof_delimited_response_body_is_capped() {
        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let mut reader = BufReader::new(reader);

        let writer_task = tokio::spawn(async move {
            writer
                .write_all(b"HTTP/1.1 200 OK\r\n\r\n")
                .await
                .expect("write status line");
            let chunk = vec![b'x'; 64 * 1024];
            for _ in 0..=(MAX_BODY_BYTES / chunk.len()) {
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
        });

        let err = read_response(&mut reader).await.expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        drop(reader);
        let _ = writer_task.await;
    }

    #[tokio::test]
    async fn truncated_headers_are_an_error() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(reader);
        writer
            .write_all(b"GET /comic/0 HTTP/1.1\r\nHost: localhost\r\n")
            .await
            .expect("write truncated request");
        drop(writer);

        let err = read_request(&mut reader).await.expect_err("must fail");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
