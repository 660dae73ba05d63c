//! The byte stream a conversation runs over.
//!
//! A [`Connection`] is generic over its stream. `STARTTLS` is a change of
//! type: [`Connection::upgrade`] consumes the plaintext connection and returns
//! one over the encrypted stream, so the stale plaintext half cannot be used
//! afterwards.

use campmail_common::{incoming, internal, outgoing};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{
    command::Command,
    error::{ClientError, Result},
    reply::Reply,
    tls::TlsUpgrade,
};

/// Initial size of the read buffer.
const BUFFER_SIZE: usize = 4096;

/// Largest reply accepted before the server is assumed to be misbehaving.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

pub struct Connection<S> {
    stream: S,
    buffer: Vec<u8>,
    /// Bytes of `buffer` holding data not yet parsed.
    filled: usize,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: vec![0; BUFFER_SIZE],
            filled: 0,
        }
    }

    /// Writes `command` followed by CRLF as a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the stream fails.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        outgoing!("{}", command.redacted());

        let mut line = command.to_string().into_bytes();
        line.extend_from_slice(b"\r\n");

        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Reads the next complete reply.
    ///
    /// Bytes following the reply stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream fails or closes before a complete reply
    /// arrived, or if the reply is malformed or too large.
    pub async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;

                incoming!("{}", reply);
                return Ok(reply);
            }

            if self.filled == self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::Parse(format!(
                        "reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let read = self.stream.read(&mut self.buffer[self.filled..]).await?;
            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.filled += read;
        }
    }

    /// Whether the server sent bytes that no reply has consumed yet.
    pub const fn has_buffered_input(&self) -> bool {
        self.filled > 0
    }

    /// Performs the TLS handshake over this connection's stream.
    ///
    /// Must only be called once the `220` answer to `STARTTLS` was read. Any
    /// plaintext the server already sent past that reply would otherwise be
    /// treated as if it had arrived encrypted, so it fails the upgrade.
    ///
    /// The plaintext connection is consumed either way; on failure its stream
    /// is dropped, which closes the socket.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Tls`] if unread plaintext is pending or the
    /// handshake fails.
    pub async fn upgrade<U>(self, upgrader: &U, server_name: &str) -> Result<Connection<U::Stream>>
    where
        U: TlsUpgrade<S> + ?Sized,
    {
        if self.has_buffered_input() {
            return Err(ClientError::Tls(
                "server sent data before the TLS handshake".to_string(),
            ));
        }

        internal!(level = DEBUG, "Upgrading connection to {server_name} ...");
        let stream = upgrader.upgrade(self.stream, server_name).await?;

        Ok(Connection {
            stream,
            buffer: self.buffer,
            filled: 0,
        })
    }

    /// Shuts the stream down and drops it. Errors are logged and ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            internal!(level = DEBUG, "Ignoring error while closing connection: {e}");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    use super::*;

    struct Passthrough;

    #[async_trait]
    impl TlsUpgrade<DuplexStream> for Passthrough {
        type Stream = DuplexStream;

        async fn upgrade(&self, stream: DuplexStream, _: &str) -> Result<DuplexStream> {
            Ok(stream)
        }
    }

    #[tokio::test]
    async fn test_send_appends_crlf() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        connection.send(&Command::Ehlo("smtp.test".into())).await.unwrap();
        drop(connection);

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "EHLO smtp.test\r\n");
    }

    #[tokio::test]
    async fn test_reply_split_across_reads() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        let writer = tokio::spawn(async move {
            server.write_all(b"250-smtp.test\r\n250-SIZE").await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(b" 1000\r\n250 OK\r\n").await.unwrap();
            server
        });

        let reply = connection.read_reply().await.unwrap();
        assert_eq!(reply.code, Some(250));
        assert_eq!(reply.lines, vec!["smtp.test", "SIZE 1000", "OK"]);
        assert!(!connection.has_buffered_input());
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_pipelined_replies_are_read_one_at_a_time() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        server.write_all(b"250 first\r\n221 second\r\n").await.unwrap();

        assert_eq!(connection.read_reply().await.unwrap().code, Some(250));
        assert!(connection.has_buffered_input());
        assert_eq!(connection.read_reply().await.unwrap().code, Some(221));
    }

    #[tokio::test]
    async fn test_closed_before_reply() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        server.write_all(b"220 partial").await.unwrap();
        drop(server);

        assert!(matches!(
            connection.read_reply().await,
            Err(ClientError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_upgrade_rejects_buffered_plaintext() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        server
            .write_all(b"220 Go ahead\r\n250 injected\r\n")
            .await
            .unwrap();
        assert_eq!(connection.read_reply().await.unwrap().code, Some(220));

        let result = connection.upgrade(&Passthrough, "smtp.test").await;
        assert!(matches!(result, Err(ClientError::Tls(_))));
    }

    #[tokio::test]
    async fn test_upgrade_keeps_talking_over_new_stream() {
        let (client, mut server) = duplex(1024);
        let mut connection = Connection::new(client);

        server.write_all(b"220 Go ahead\r\n").await.unwrap();
        assert_eq!(connection.read_reply().await.unwrap().code, Some(220));

        let mut secure = connection.upgrade(&Passthrough, "smtp.test").await.unwrap();
        server.write_all(b"250 secure\r\n").await.unwrap();
        assert_eq!(secure.read_reply().await.unwrap().text(), "secure");
    }

    #[tokio::test]
    async fn test_oversized_reply() {
        let (client, mut server) = duplex(64 * 1024);
        let mut connection = Connection::new(client);

        let writer = tokio::spawn(async move {
            let line = format!("250-{}\r\n", "x".repeat(1000));
            for _ in 0..2000 {
                if server.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        assert!(matches!(
            connection.read_reply().await,
            Err(ClientError::Parse(_))
        ));
        drop(connection);
        writer.await.unwrap();
    }
}
