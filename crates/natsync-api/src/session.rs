// RouterOS API session
//
// Owns one transport connection and drives the strictly sequential
// request/response exchange. One command is in flight at a time; the
// `Busy` state guards against reuse of a session whose exchange was
// abandoned halfway (dropped future, deadline, framing error).

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::{DEFAULT_MAX_WORD_LEN, WordCodec};
use crate::command::{Command, CommandResult, ReplyCollector};
use crate::error::Error;
use crate::sentence::SentenceFramer;

/// Plaintext API port.
pub const DEFAULT_PORT: u16 = 8728;

// ── Options ──────────────────────────────────────────────────────────

/// How to log in after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LoginMethod {
    /// Bare `/login` first, then challenge-response or plaintext
    /// depending on whether the router hands out a challenge.
    #[default]
    Auto,
    /// `name` + `password` in the first `/login`.
    Plain,
    /// Require the MD5 challenge; fail if the router doesn't offer one.
    Challenge,
}

/// Transport and handshake tuning for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Deadline for every individual read and write once connected.
    pub read_timeout: Duration,
    /// Largest word accepted from the router.
    pub max_word_len: usize,
    pub login_method: LoginMethod,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            max_word_len: DEFAULT_MAX_WORD_LEN,
            login_method: LoginMethod::Auto,
        }
    }
}

// ── State ────────────────────────────────────────────────────────────

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Transport is up; login has not completed.
    Authenticating,
    Ready,
    /// A command exchange is in progress.
    Busy,
}

// ── Session ──────────────────────────────────────────────────────────

/// One authenticated conversation with a router.
///
/// Generic over the transport so tests (and a TLS wrapper) can stand in
/// for the plain TCP stream.
pub struct Session<T = TcpStream> {
    address: String,
    options: SessionOptions,
    state: SessionState,
    framed: Option<Framed<T, WordCodec>>,
    next_tag: u32,
}

impl Session<TcpStream> {
    /// Create a disconnected session for `address` (`host:port`).
    pub fn new(address: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            address: address.into(),
            options,
            state: SessionState::Disconnected,
            framed: None,
            next_tag: 1,
        }
    }

    /// Establish the TCP connection, bounded by the connect deadline.
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Disconnected {
            return Err(Error::NotReady { state: self.state });
        }
        self.state = SessionState::Connecting;
        debug!(address = %self.address, "connecting to router");

        let attempt = timeout(
            self.options.connect_timeout,
            TcpStream::connect(self.address.as_str()),
        )
        .await;

        let stream = match attempt {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                self.state = SessionState::Disconnected;
                return Err(Error::Connect {
                    address: self.address.clone(),
                    source,
                });
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                return Err(Error::ConnectTimeout {
                    address: self.address.clone(),
                    timeout_ms: millis(self.options.connect_timeout),
                });
            }
        };

        // Small request words; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            trace!(error = %e, "could not disable Nagle (ignored)");
        }
        self.framed = Some(Framed::new(
            stream,
            WordCodec::new(self.options.max_word_len),
        ));
        self.state = SessionState::Authenticating;
        Ok(())
    }

    /// Connect and log in, returning a `Ready` session.
    pub async fn open(
        address: impl Into<String>,
        options: SessionOptions,
        username: &str,
        password: &secrecy::SecretString,
    ) -> Result<Self, Error> {
        let mut session = Self::new(address, options);
        session.connect().await?;
        session.login(username, password).await?;
        Ok(session)
    }
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-connected transport. The session starts out
    /// waiting for login.
    pub fn with_transport(address: impl Into<String>, transport: T, options: SessionOptions) -> Self {
        let codec = WordCodec::new(options.max_word_len);
        Self {
            address: address.into(),
            options,
            state: SessionState::Authenticating,
            framed: Some(Framed::new(transport, codec)),
            next_tag: 1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Run one command and wait for its terminal status.
    ///
    /// A `!trap` comes back as an `Ok` result with [`Status::Trap`];
    /// only transport and framing failures are errors, and those leave
    /// the session `Disconnected`.
    ///
    /// [`Status::Trap`]: crate::command::Status::Trap
    pub async fn execute(&mut self, command: &Command) -> Result<CommandResult, Error> {
        if self.state != SessionState::Ready {
            return Err(Error::NotReady { state: self.state });
        }
        self.exchange(command).await
    }

    /// Shared by `execute` and the login handshake. Returns the session to
    /// the state it started in on success.
    pub(crate) async fn exchange(&mut self, command: &Command) -> Result<CommandResult, Error> {
        let resume = self.state;
        let login = resume == SessionState::Authenticating;
        self.state = SessionState::Busy;

        let tag = self.next_tag.to_string();
        self.next_tag = self.next_tag.wrapping_add(1);

        match self.round_trip(command, tag, login).await {
            Ok(result) => {
                self.state = resume;
                Ok(result)
            }
            Err(err) => {
                debug!(command = command.path(), error = %err, "exchange failed; dropping connection");
                self.framed = None;
                self.state = SessionState::Disconnected;
                Err(err)
            }
        }
    }

    async fn round_trip(
        &mut self,
        command: &Command,
        tag: String,
        login: bool,
    ) -> Result<CommandResult, Error> {
        let deadline = self.options.read_timeout;
        let timeout_ms = millis(deadline);
        let framed = self.framed.as_mut().ok_or(Error::NotReady {
            state: SessionState::Disconnected,
        })?;

        let words = command.to_words(&tag);
        trace!(command = command.path(), words = words.len(), tag = %tag, "sending");
        // A feed may flush once the write buffer fills, so the whole send
        // phase shares one deadline.
        let send = async {
            for word in &words {
                framed.feed(word.as_bytes()).await?;
            }
            framed.feed(&b""[..]).await?;
            SinkExt::<&[u8]>::flush(&mut *framed).await
        };
        timeout(deadline, send)
            .await
            .map_err(|_| Error::ReadTimeout { timeout_ms })??;

        let mut framer = SentenceFramer::new();
        let mut collector = ReplyCollector::new(Some(tag));
        if login {
            collector = collector.for_login();
        }
        loop {
            let next = timeout(deadline, framed.next())
                .await
                .map_err(|_| Error::ReadTimeout { timeout_ms })?;

            let Some(word) = next else {
                if framer.is_mid_sentence() {
                    return Err(Error::ConnectionClosed);
                }
                return collector.finish_at_eof().ok_or(Error::ConnectionClosed);
            };

            if let Some(sentence) = framer.push(&word?) {
                trace!(reply = ?sentence.reply, "received sentence");
                if let Some(result) = collector.accept(sentence)? {
                    debug!(
                        command = command.path(),
                        rows = result.rows.len(),
                        success = result.is_success(),
                        "command complete"
                    );
                    return Ok(result);
                }
            }
        }
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(framed) = self.framed.take() {
            let mut transport = framed.into_inner();
            if let Err(e) = transport.shutdown().await {
                trace!(error = %e, "transport shutdown failed (ignored)");
            }
            debug!(address = %self.address, "session closed");
        }
        self.state = SessionState::Disconnected;
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fake {
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::DuplexStream;
    use tokio_util::codec::Framed;

    use super::{Session, SessionOptions};
    use crate::codec::WordCodec;
    use crate::sentence::{Sentence, SentenceFramer};

    /// Router end of an in-memory session.
    pub(crate) struct FakeRouter {
        pub(crate) framed: Framed<DuplexStream, WordCodec>,
    }

    impl FakeRouter {
        /// Read one request sentence.
        pub(crate) async fn recv(&mut self) -> Sentence {
            let mut framer = SentenceFramer::new();
            loop {
                let word = self.framed.next().await.unwrap().unwrap();
                if let Some(s) = framer.push(&word) {
                    return s;
                }
            }
        }

        /// Send one reply sentence built from `words`.
        pub(crate) async fn reply(&mut self, words: &[&str]) {
            for word in words {
                self.framed.feed(*word).await.unwrap();
            }
            self.framed.send("").await.unwrap();
        }

        /// Reply echoing the request's tag.
        pub(crate) async fn reply_to(&mut self, request: &Sentence, words: &[&str]) {
            let tag = format!(".tag={}", request.tag.clone().unwrap_or_default());
            let mut all: Vec<&str> = words.to_vec();
            all.push(&tag);
            self.reply(&all).await;
        }
    }

    pub(crate) fn pair(options: SessionOptions) -> (Session<DuplexStream>, FakeRouter) {
        let (client, server) = tokio::io::duplex(4096);
        let session = Session::with_transport("test", client, options);
        let router = FakeRouter {
            framed: Framed::new(server, WordCodec::default()),
        };
        (session, router)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::fake::pair;
    use super::*;

    use crate::command::Status;

    #[tokio::test]
    async fn execute_requires_ready_state() {
        let (mut session, _router) = pair(SessionOptions::default());
        let err = session.execute(&Command::new("/system/identity/print")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotReady {
                state: SessionState::Authenticating
            }
        ));
    }

    #[tokio::test]
    async fn execute_collects_rows_and_echoes_tag() {
        let (mut session, mut router) = pair(SessionOptions::default());
        session.set_state(SessionState::Ready);

        let server = tokio::spawn(async move {
            let req = router.recv().await;
            assert_eq!(req.flags, vec!["/ip/firewall/nat/print"]);
            let tag = format!(".tag={}", req.tag.unwrap());
            router.reply(&["!re", "=.id=*1", &tag]).await;
            router.reply(&["!re", "=.id=*2", &tag]).await;
            router.reply(&["!done", &tag]).await;
            router
        });

        let result = session
            .execute(&Command::new("/ip/firewall/nat/print").proplist(&[".id"]))
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1].get(".id").unwrap(), "*2");
        assert!(matches!(result.status, Status::Done(_)));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn trap_keeps_session_ready() {
        let (mut session, mut router) = pair(SessionOptions::default());
        session.set_state(SessionState::Ready);

        let server = tokio::spawn(async move {
            let req = router.recv().await;
            let tag = format!(".tag={}", req.tag.unwrap());
            router.reply(&["!trap", "=message=no such item", &tag]).await;
            router.reply(&["!done", &tag]).await;
            router
        });

        let result = session
            .execute(&Command::new("/ip/firewall/nat/remove").attr(".id", "*9"))
            .await
            .unwrap();
        server.await.unwrap();

        assert_eq!(result.trap_message(), Some("no such item"));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_router_hits_read_deadline() {
        let options = SessionOptions {
            read_timeout: Duration::from_millis(250),
            ..SessionOptions::default()
        };
        let (mut session, _router) = pair(options);
        session.set_state(SessionState::Ready);

        let err = session.execute(&Command::new("/ip/firewall/nat/print")).await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout { timeout_ms: 250 }));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_writer_hits_the_same_deadline() {
        let options = SessionOptions {
            read_timeout: Duration::from_millis(250),
            ..SessionOptions::default()
        };
        // The router never reads, so the duplex buffer fills while the
        // command is still being fed.
        let (mut session, _router) = pair(options);
        session.set_state(SessionState::Ready);

        let bulky = Command::new("/ip/firewall/nat/add").attr("comment", "x".repeat(64 * 1024));
        let err = session.execute(&bulky).await.unwrap_err();
        assert!(matches!(err, Error::ReadTimeout { timeout_ms: 250 }));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn framing_error_disconnects() {
        let (mut session, mut router) = pair(SessionOptions::default());
        session.set_state(SessionState::Ready);

        let server = tokio::spawn(async move {
            let _ = router.recv().await;
            // 0xF8 is a reserved control byte, never a valid prefix.
            let raw = router.framed.get_mut();
            raw.write_all(&[0xF8, 0x00]).await.unwrap();
            router
        });

        let err = session.execute(&Command::new("/ip/firewall/nat/print")).await.unwrap_err();
        let _router = server.await.unwrap();
        assert!(err.is_framing());
        assert_eq!(session.state(), SessionState::Disconnected);

        let again = session.execute(&Command::new("/ip/firewall/nat/print")).await.unwrap_err();
        assert!(matches!(again, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut session, _router) = pair(SessionOptions::default());
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_refused_returns_to_disconnected() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut session = Session::new(address, SessionOptions::default());
        let err = session.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
