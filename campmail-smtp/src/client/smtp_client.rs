use std::{sync::Arc, time::Duration};

use campmail_common::{
    config::{ClientTimeouts, ReplyPolicy, TimeoutConfig},
    internal,
    traits::fsm::FiniteStateMachine,
    tracing,
};
use campmail_tracing::traced;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use super::{
    command::Command,
    connection::Connection,
    error::{ClientError, Result},
    fsm::{Action, Conversation, Event, Plan, State, TlsState},
    message::EmailMessage,
    reply::Reply,
    result::DeliveryResult,
    settings::SmtpSettings,
    tls::{RustlsUpgrade, TlsUpgrade},
};

/// Why [`SmtpClient::drive`] handed control back.
enum Pause {
    /// `STARTTLS` was accepted; the caller must upgrade the connection.
    Upgrade,
    Finished,
}

/// Delivers one message per call over a fresh connection.
///
/// Holds no per-delivery state, so one client can be cloned into many
/// concurrent deliveries.
#[derive(Clone, Default)]
pub struct SmtpClient {
    upgrader: Arc<RustlsUpgrade>,
    timeouts: ClientTimeouts,
    policy: ReplyPolicy,
    helo_name: Option<String>,
}

impl SmtpClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub const fn with_reply_policy(mut self, policy: ReplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Name announced in `EHLO`. Defaults to the server's host name.
    #[must_use]
    pub fn with_helo_name(mut self, helo_name: impl Into<String>) -> Self {
        self.helo_name = Some(helo_name.into());
        self
    }

    /// Delivers `message`, reporting any failure in the result instead of
    /// returning it.
    pub async fn deliver(&self, settings: &SmtpSettings, message: &EmailMessage) -> DeliveryResult {
        let result = self.send(settings, message).await;
        if let Err(e) = &result {
            tracing::warn!(host = %settings.host, to = %message.to, "Delivery failed: {e}");
        }

        result.into()
    }

    /// Connects to the configured server and delivers `message`.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] that ended the conversation. The connection
    /// has been closed by the time this returns.
    #[traced(
        instrument(
            level = tracing::Level::DEBUG,
            skip_all,
            fields(host = %settings.host, port = settings.port)
        ),
        timing(precision = "ms")
    )]
    pub async fn send(&self, settings: &SmtpSettings, message: &EmailMessage) -> Result<()> {
        let address = (settings.host.as_str(), settings.port);
        let stream = with_timeout("Connect", self.timeouts.connect_timeout(), async {
            TcpStream::connect(address).await.map_err(ClientError::from)
        })
        .await?;

        self.send_over(stream, self.upgrader.as_ref(), settings, message)
            .await
    }

    /// Runs the whole conversation over an already connected `stream`.
    ///
    /// `upgrader` performs the handshake if the server accepts `STARTTLS`.
    /// The stream is closed exactly once before this returns, whatever the
    /// outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`ClientError`] that ended the conversation.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "ms"))]
    pub async fn send_over<S, U>(
        &self,
        stream: S,
        upgrader: &U,
        settings: &SmtpSettings,
        message: &EmailMessage,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        U: TlsUpgrade<S> + ?Sized,
    {
        let mut conversation = Conversation::new(self.plan(settings, message));
        let mut plain = Connection::new(stream);

        match self.drive(&mut plain, &mut conversation, None).await {
            Ok(Pause::Upgrade) => {}
            outcome => {
                plain.close().await;
                return outcome.map(|_| ());
            }
        }

        // A failed or timed out handshake drops the plaintext stream.
        let mut secure = with_timeout(
            State::TlsNegotiating.awaiting(),
            self.timeouts.starttls_timeout(),
            plain.upgrade(upgrader, &settings.host),
        )
        .await?;

        let outcome = self
            .drive(&mut secure, &mut conversation, Some(Event::TlsEstablished))
            .await;
        secure.close().await;

        match outcome? {
            Pause::Finished => Ok(()),
            Pause::Upgrade => Err(ClientError::OutOfSequence {
                state: conversation.state(),
                event: "second STARTTLS",
            }),
        }
    }

    fn plan(&self, settings: &SmtpSettings, message: &EmailMessage) -> Plan {
        let helo_name = self
            .helo_name
            .clone()
            .unwrap_or_else(|| settings.host.clone());
        let payload = message.render(&settings.from_address, &chrono::Local::now());

        Plan::new(
            helo_name,
            settings.port,
            &settings.username,
            &settings.password,
            settings.from_address.as_str(),
            message.to.as_str(),
            payload,
            self.policy,
        )
    }

    /// Alternates reading replies and acting on them until the conversation
    /// finishes, fails, or needs a TLS upgrade.
    ///
    /// `first` is fed instead of reading a reply on the first iteration. A
    /// conversation already in a terminal state returns at once.
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing)]
    async fn drive<T>(
        &self,
        connection: &mut Connection<T>,
        conversation: &mut Conversation,
        mut first: Option<Event>,
    ) -> Result<Pause>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        while !conversation.state().is_terminal() {
            let state = conversation.state();
            let event = match first.take() {
                Some(event) => event,
                None => match self.read(connection, state).await {
                    Ok(reply) => Event::Reply(reply),
                    Err(e) if state == State::QuitSent => {
                        tracing::warn!("Ignoring failure after delivery: {e}");
                        return Ok(Pause::Finished);
                    }
                    Err(e) => return Err(e),
                },
            };

            let action = conversation.step(event);
            if state == State::StartTlsSent && conversation.tls() == TlsState::Declined {
                tracing::warn!("Server declined STARTTLS, continuing without encryption");
            }

            match action {
                Action::Send(command) => {
                    let quitting = command == Command::Quit;
                    if let Err(e) = self.write(connection, &command).await {
                        if quitting {
                            tracing::warn!("Ignoring failure after delivery: {e}");
                            return Ok(Pause::Finished);
                        }
                        return Err(e);
                    }
                }
                Action::UpgradeTls => return Ok(Pause::Upgrade),
                Action::Finish => internal!(level = DEBUG, "Conversation finished"),
                Action::Fail(e) => return Err(e),
            }
        }

        Ok(Pause::Finished)
    }

    async fn read<T>(&self, connection: &mut Connection<T>, state: State) -> Result<Reply>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let after = match state {
            State::MessageSent => self.timeouts.data_timeout(),
            State::QuitSent => self.timeouts.quit_timeout(),
            _ => self.timeouts.command_timeout(),
        };

        with_timeout(state.awaiting(), after, connection.read_reply()).await
    }

    async fn write<T>(&self, connection: &mut Connection<T>, command: &Command) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let after = match command {
            Command::Message(_) => self.timeouts.data_timeout(),
            Command::Quit => self.timeouts.quit_timeout(),
            _ => self.timeouts.command_timeout(),
        };

        with_timeout(command.name(), after, connection.send(command)).await
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, future)
        .await
        .map_err(|_| ClientError::Timeout { operation, after })?
}
