//! The delivery conversation as a pure state machine.
//!
//! [`State`] names what the client is waiting for. Each [`Event`] (a server
//! reply, or the news that TLS is up) moves it forward and yields exactly one
//! [`Action`] for the driver to perform. No I/O happens here, so the whole
//! conversation can be exercised without a socket.

use base64::{Engine, engine::general_purpose::STANDARD};
use campmail_common::{config::ReplyPolicy, traits::fsm::FiniteStateMachine};

use super::{command::Command, error::ClientError, reply::Reply};

/// Port on which `STARTTLS` is attempted.
pub const SUBMISSION_PORT: u16 = 587;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Connected, waiting for the greeting.
    #[default]
    Connecting,
    EhloSent,
    StartTlsSent,
    /// `STARTTLS` accepted, waiting for the handshake to complete.
    TlsNegotiating,
    /// Second `EHLO`, sent over TLS.
    EhloResent,
    AuthLoginSent,
    UsernameSent,
    PasswordSent,
    MailFromSent,
    RcptToSent,
    DataSent,
    MessageSent,
    QuitSent,
    Closed,
    Failed,
}

impl State {
    /// What a timeout in this state was waiting for.
    #[must_use]
    pub const fn awaiting(self) -> &'static str {
        match self {
            Self::Connecting => "Greeting",
            Self::EhloSent | Self::EhloResent => "EHLO",
            Self::StartTlsSent => "STARTTLS",
            Self::TlsNegotiating => "TLS handshake",
            Self::AuthLoginSent => "AUTH LOGIN",
            Self::UsernameSent => "AUTH username",
            Self::PasswordSent => "AUTH password",
            Self::MailFromSent => "MAIL FROM",
            Self::RcptToSent => "RCPT TO",
            Self::DataSent => "DATA",
            Self::MessageSent => "Message data",
            Self::QuitSent => "QUIT",
            Self::Closed | Self::Failed => "nothing",
        }
    }

    fn next(self, event: Event, plan: &Plan) -> (Self, Action) {
        let strict = plan.policy.is_strict();

        match (self, event) {
            (Self::Connecting, Event::Reply(reply)) if reply.has_code(220) => {
                (Self::EhloSent, Action::Send(Command::Ehlo(plan.helo_name.clone())))
            }
            (Self::Connecting, Event::Reply(reply)) => fail(ClientError::InvalidGreeting(reply)),

            (Self::EhloSent, Event::Reply(_)) if plan.starttls => {
                (Self::StartTlsSent, Action::Send(Command::StartTls))
            }
            (Self::EhloSent | Self::EhloResent, Event::Reply(_)) => {
                (Self::AuthLoginSent, Action::Send(Command::AuthLogin))
            }

            (Self::StartTlsSent, Event::Reply(reply)) if reply.has_code(220) => {
                (Self::TlsNegotiating, Action::UpgradeTls)
            }
            (Self::StartTlsSent, Event::Reply(_)) => {
                (Self::AuthLoginSent, Action::Send(Command::AuthLogin))
            }
            (Self::TlsNegotiating, Event::TlsEstablished) => {
                (Self::EhloResent, Action::Send(Command::Ehlo(plan.helo_name.clone())))
            }

            (Self::AuthLoginSent, Event::Reply(reply)) if reply.has_code(334) => (
                Self::UsernameSent,
                Action::Send(Command::Credential(plan.username.clone())),
            ),
            (Self::AuthLoginSent, Event::Reply(reply)) => {
                fail(ClientError::AuthLoginRejected(reply))
            }

            (Self::UsernameSent, Event::Reply(reply)) if strict && !reply.has_code(334) => {
                fail(ClientError::UsernameRejected(reply))
            }
            (Self::UsernameSent, Event::Reply(_)) => (
                Self::PasswordSent,
                Action::Send(Command::Credential(plan.password.clone())),
            ),

            (Self::PasswordSent, Event::Reply(reply)) if reply.has_code(235) => (
                Self::MailFromSent,
                Action::Send(Command::MailFrom(plan.from.clone())),
            ),
            (Self::PasswordSent, Event::Reply(reply)) => {
                fail(ClientError::AuthenticationFailed(reply))
            }

            (Self::MailFromSent, Event::Reply(reply)) if strict && !reply.has_code(250) => {
                fail(ClientError::SenderRejected(reply))
            }
            (Self::MailFromSent, Event::Reply(_)) => {
                (Self::RcptToSent, Action::Send(Command::RcptTo(plan.to.clone())))
            }

            (Self::RcptToSent, Event::Reply(reply)) if reply.has_code(250) => {
                (Self::DataSent, Action::Send(Command::Data))
            }
            (Self::RcptToSent, Event::Reply(reply)) => {
                fail(ClientError::RecipientRejected(reply))
            }

            (Self::DataSent, Event::Reply(reply)) if reply.has_code(354) => (
                Self::MessageSent,
                Action::Send(Command::Message(plan.message.clone())),
            ),
            (Self::DataSent, Event::Reply(reply)) => fail(ClientError::DataRejected(reply)),

            (Self::MessageSent, Event::Reply(reply)) if reply.has_code(250) => {
                (Self::QuitSent, Action::Send(Command::Quit))
            }
            (Self::MessageSent, Event::Reply(reply)) => {
                fail(ClientError::MessageRejected(reply))
            }

            (Self::QuitSent, Event::Reply(_)) => (Self::Closed, Action::Finish),

            (state, event) => fail(ClientError::OutOfSequence {
                state,
                event: event.name(),
            }),
        }
    }
}

const fn fail(error: ClientError) -> (State, Action) {
    (State::Failed, Action::Fail(error))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Reply(Reply),
    TlsEstablished,
}

impl Event {
    const fn name(&self) -> &'static str {
        match self {
            Self::Reply(_) => "reply",
            Self::TlsEstablished => "TLS handshake",
        }
    }
}

/// The one thing the driver must do after a transition.
#[derive(Debug)]
pub enum Action {
    /// Write the command, then read its reply.
    Send(Command),
    /// Run the TLS handshake, then report [`Event::TlsEstablished`].
    UpgradeTls,
    /// The message was accepted; close the connection.
    Finish,
    /// Close the connection and report the error.
    Fail(ClientError),
}

/// Whether the conversation is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsState {
    #[default]
    Plaintext,
    /// The server answered `STARTTLS` with something other than `220`.
    Declined,
    Upgraded,
}

/// Everything the conversation sends, fixed before connecting.
#[derive(Clone)]
pub struct Plan {
    pub(crate) helo_name: String,
    pub(crate) starttls: bool,
    pub(crate) username: String,
    pub(crate) password: String,
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) message: String,
    pub(crate) policy: ReplyPolicy,
}

impl Plan {
    /// `username` and `password` are given in the clear and encoded here.
    /// `message` is the DATA payload as produced by
    /// [`EmailMessage::render`](super::message::EmailMessage::render).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        helo_name: impl Into<String>,
        port: u16,
        username: &str,
        password: &str,
        from: impl Into<String>,
        to: impl Into<String>,
        message: String,
        policy: ReplyPolicy,
    ) -> Self {
        Self {
            helo_name: helo_name.into(),
            starttls: port == SUBMISSION_PORT,
            username: STANDARD.encode(username),
            password: STANDARD.encode(password),
            from: from.into(),
            to: to.into(),
            message,
            policy,
        }
    }
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("helo_name", &self.helo_name)
            .field("starttls", &self.starttls)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Mutable context threaded through transitions.
#[derive(Debug)]
pub struct Dialogue {
    plan: Plan,
    pending: Option<Action>,
    tls: TlsState,
}

impl FiniteStateMachine for State {
    type Input = Event;
    type Context = Dialogue;

    fn transition(self, input: Self::Input, context: &mut Self::Context) -> Self {
        let tls_event = matches!(input, Event::TlsEstablished);
        let (next, action) = self.next(input, &context.plan);

        match (self, next) {
            (Self::StartTlsSent, Self::AuthLoginSent) => context.tls = TlsState::Declined,
            (Self::TlsNegotiating, Self::EhloResent) if tls_event => {
                context.tls = TlsState::Upgraded;
            }
            _ => {}
        }

        context.pending = Some(action);
        next
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// A [`State`] together with its [`Dialogue`].
#[derive(Debug)]
pub struct Conversation {
    state: State,
    dialogue: Dialogue,
}

impl Conversation {
    #[must_use]
    pub const fn new(plan: Plan) -> Self {
        Self {
            state: State::Connecting,
            dialogue: Dialogue {
                plan,
                pending: None,
                tls: TlsState::Plaintext,
            },
        }
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub const fn tls(&self) -> TlsState {
        self.dialogue.tls
    }

    /// Feeds one event and returns what to do next.
    pub fn step(&mut self, event: Event) -> Action {
        let before = self.state;
        self.state = self.state.transition(event, &mut self.dialogue);

        self.dialogue.pending.take().unwrap_or_else(|| {
            self.state = State::Failed;
            Action::Fail(ClientError::OutOfSequence {
                state: before,
                event: "transition without action",
            })
        })
    }
}
