// Login handshake
//
// Routers before 6.43 answer a bare `/login` with a hex `ret` challenge
// and expect `name` + `response` back. Newer firmware answers without a
// challenge and takes `name` + `password` in plaintext. Both paths end
// with `!done` on success or `!trap` on rejection.

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::command::{Command, CommandResult};
use crate::error::Error;
use crate::session::{LoginMethod, Session, SessionState};

const LOGIN: &str = "/login";

/// Compute the legacy challenge response:
/// `"00" + hex(md5(0x00 ++ password ++ unhex(challenge)))`.
pub fn challenge_response(password: &str, challenge_hex: &str) -> Result<String, Error> {
    let challenge = hex::decode(challenge_hex).map_err(|e| Error::Authentication {
        message: format!("malformed login challenge: {e}"),
    })?;

    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    Ok(format!("00{}", hex::encode(hasher.finalize())))
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Authenticate a freshly connected session.
    ///
    /// On success the session is `Ready`. A rejected login closes the
    /// transport and returns [`Error::Authentication`]; transport failures
    /// keep their own error kind.
    pub async fn login(&mut self, username: &str, password: &SecretString) -> Result<(), Error> {
        if self.state() != SessionState::Authenticating {
            return Err(Error::NotReady {
                state: self.state(),
            });
        }

        let method = self.options().login_method;
        debug!(%method, username, "logging in");

        let outcome = match method {
            LoginMethod::Plain => self.login_plain(username, password).await,
            LoginMethod::Auto | LoginMethod::Challenge => {
                self.login_negotiated(username, password, method).await
            }
        };

        match outcome {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                debug!("login successful");
                Ok(())
            }
            Err(err) => {
                self.close().await;
                Err(err)
            }
        }
    }

    async fn login_plain(&mut self, username: &str, password: &SecretString) -> Result<(), Error> {
        let cmd = Command::new(LOGIN)
            .attr("name", username)
            .attr("password", password.expose_secret());
        accepted(self.exchange(&cmd).await?).map(drop)
    }

    async fn login_negotiated(
        &mut self,
        username: &str,
        password: &SecretString,
        method: LoginMethod,
    ) -> Result<(), Error> {
        let reply = accepted(self.exchange(&Command::new(LOGIN)).await?)?;

        match reply.ret() {
            Some(challenge) => {
                debug!("router issued a login challenge");
                let response = challenge_response(password.expose_secret(), challenge)?;
                let cmd = Command::new(LOGIN)
                    .attr("name", username)
                    .attr("response", response);
                accepted(self.exchange(&cmd).await?).map(drop)
            }
            None if method == LoginMethod::Challenge => Err(Error::Authentication {
                message: "router did not offer a login challenge".into(),
            }),
            None => {
                debug!("no challenge offered; falling back to plaintext login");
                self.login_plain(username, password).await
            }
        }
    }
}

/// Any trap during the handshake is a rejected login.
fn accepted(reply: CommandResult) -> Result<CommandResult, Error> {
    match reply.trap_message() {
        Some(message) => Err(Error::Authentication {
            message: message.to_owned(),
        }),
        None => Ok(reply),
    }
}
