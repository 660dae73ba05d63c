//! Scripted SMTP server for driving the client in tests.
#![allow(dead_code)] // Not every test uses every helper

use std::{
    io,
    net::SocketAddr,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use campmail_smtp::client::{ClientError, Result, TlsUpgrade};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf},
    net::TcpListener,
    task::JoinHandle,
};

/// What the server saw during one conversation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Command lines without CRLF. The message body is recorded as `<message>`.
    pub commands: Vec<String>,
    /// The DATA payload up to, not including, the terminating `.` line.
    pub message: Option<String>,
    /// A command arrived before the reply to the previous one was written.
    pub pipelined: bool,
}

impl Transcript {
    /// Command verbs, e.g. `MAIL` for `MAIL FROM:<x>`.
    pub fn verbs(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|command| match command.as_str() {
                "AUTH LOGIN" | "<message>" => command.clone(),
                other if other.starts_with("MAIL FROM") => "MAIL FROM".to_string(),
                other if other.starts_with("RCPT TO") => "RCPT TO".to_string(),
                other => other.split(' ').next().unwrap_or_default().to_string(),
            })
            .collect()
    }
}

/// Writes `replies[0]` as the greeting, then answers each command with the
/// next reply. Each reply is written as given plus CRLF, so multi-line
/// replies are written as `"250-a\r\n250 b"`.
///
/// Once the replies run out the server keeps reading without answering until
/// the client closes the connection.
pub async fn serve<S>(stream: S, replies: Vec<String>) -> Transcript
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut transcript = Transcript::default();
    let mut reader = BufReader::new(stream);
    let mut replies = replies.into_iter();
    let mut in_data = false;

    let Some(greeting) = replies.next() else {
        return transcript;
    };
    if write_reply(&mut reader, &greeting).await.is_err() {
        return transcript;
    }

    loop {
        let command = if in_data {
            match read_message(&mut reader).await {
                Some(message) => {
                    transcript.message = Some(message);
                    "<message>".to_string()
                }
                None => break,
            }
        } else {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => line.trim_end_matches(['\r', '\n']).to_string(),
            }
        };

        if !reader.buffer().is_empty() {
            transcript.pipelined = true;
        }

        let Some(reply) = replies.next() else {
            transcript.commands.push(command);
            continue;
        };

        in_data = command == "DATA" && reply.starts_with("354");
        transcript.commands.push(command);

        if write_reply(&mut reader, &reply).await.is_err() {
            break;
        }
    }

    transcript
}

async fn write_reply<S>(reader: &mut BufReader<S>, reply: &str) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stream = reader.get_mut();
    stream.write_all(format!("{reply}\r\n").as_bytes()).await?;
    stream.flush().await
}

/// Reads DATA lines until the lone `.`, undoing dot-stuffing.
async fn read_message<S>(reader: &mut BufReader<S>) -> Option<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line == "." {
            return Some(lines.join("\r\n"));
        }
        lines.push(line.strip_prefix('.').unwrap_or(line).to_string());
    }
}

pub fn script(replies: &[&str]) -> Vec<String> {
    replies.iter().map(ToString::to_string).collect()
}

/// Accepts one loopback connection and serves `replies` on it.
pub async fn spawn_tcp(replies: Vec<String>) -> (SocketAddr, JoinHandle<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        serve(stream, replies).await
    });

    (addr, handle)
}

/// How often a [`SpyStream`] was shut down and dropped.
#[derive(Debug, Default, Clone)]
pub struct CloseCounter {
    shutdowns: Arc<AtomicUsize>,
    drops: Arc<AtomicUsize>,
}

impl CloseCounter {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// A duplex stream half that counts how it was closed.
pub struct SpyStream {
    inner: DuplexStream,
    counter: CloseCounter,
    /// Makes every shutdown attempt fail after counting it.
    broken_shutdown: bool,
}

impl SpyStream {
    /// Returns the client side, the server side and the counter.
    pub fn pair() -> (Self, DuplexStream, CloseCounter) {
        Self::build(false)
    }

    /// Like [`SpyStream::pair`], but shutting the client side down fails.
    pub fn with_broken_shutdown() -> (Self, DuplexStream, CloseCounter) {
        Self::build(true)
    }

    fn build(broken_shutdown: bool) -> (Self, DuplexStream, CloseCounter) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let counter = CloseCounter::default();
        let spy = Self {
            inner: client,
            counter: counter.clone(),
            broken_shutdown,
        };
        (spy, server, counter)
    }
}

impl Drop for SpyStream {
    fn drop(&mut self) {
        self.counter.drops.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for SpyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SpyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.broken_shutdown {
            self.counter.shutdowns.fetch_add(1, Ordering::SeqCst);
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "peer already gone",
            )));
        }

        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.counter.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Pretends the handshake succeeded and keeps talking over the same stream.
pub struct Passthrough;

#[async_trait]
impl<S> TlsUpgrade<S> for Passthrough
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn upgrade(&self, stream: S, _server_name: &str) -> Result<S> {
        Ok(stream)
    }
}

/// A handshake that always fails, dropping the stream.
pub struct FailingUpgrade;

#[async_trait]
impl<S> TlsUpgrade<S> for FailingUpgrade
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn upgrade(&self, stream: S, _server_name: &str) -> Result<S> {
        drop(stream);
        Err(ClientError::Tls("handshake failure".to_string()))
    }
}

/// A handshake that never finishes. The stream is held until the upgrade is
/// abandoned.
pub struct StalledUpgrade;

#[async_trait]
impl<S> TlsUpgrade<S> for StalledUpgrade
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = S;

    async fn upgrade(&self, stream: S, _server_name: &str) -> Result<S> {
        let _held = stream;
        std::future::pending().await
    }
}
