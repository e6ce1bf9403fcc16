use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use super::terminal::Terminal;
use crate::configuration::service_config::TelnetConfig;
use crate::configuration::types::accounts_accept;
use crate::error_handling::types::SessionError;
use crate::event::{EventBuilder, EventEmitter};
use crate::services::simulator::{CommandSimulator, LINE_ENDING};
use crate::session_management::Session;

pub const USERNAME_PROMPT: &str = "Username: ";
pub const PASSWORD_PROMPT: &str = "Password: ";
pub const LOGIN_FAILED: &str = "login failed";
pub const GOODBYE: &str = "Goodbye!";
pub const QUIT: &str = "quit";
pub const COMMAND_NOT_FOUND: &str = "command not found";

/// Login progress of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    AwaitUsername,
    AwaitPassword { username: String },
    Authenticated,
    Exhausted,
}

/// Drives one Telnet connection: login prompts with a bounded number of attempts, then
/// the simulated shell.
pub struct TelnetSession<S> {
    terminal: Terminal<S>,
    session: Session,
    config: Arc<TelnetConfig>,
    simulator: CommandSimulator,
    emitter: EventEmitter,
    failed_attempts: usize,
}

impl<S> TelnetSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        session: Session,
        config: Arc<TelnetConfig>,
        simulator: CommandSimulator,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            terminal: Terminal::new(stream),
            session,
            config,
            simulator,
            emitter,
            failed_attempts: 0,
        }
    }

    fn event(&self, event_type: &str) -> EventBuilder {
        self.session
            .app_event(event_type)
            .detail("telnet.session-id", self.session.id_string())
    }

    async fn closed(&self) {
        self.emitter.emit_logged(self.event("telnet-close").build()).await;
    }

    pub async fn run(mut self) -> Result<(), SessionError> {
        self.emitter.emit_logged(self.event("telnet-connect").build()).await;

        let mut state = LoginState::AwaitUsername;
        loop {
            state = match state {
                LoginState::AwaitUsername => match self.terminal.read_line(USERNAME_PROMPT).await? {
                    Some(username) => LoginState::AwaitPassword { username },
                    None => {
                        self.closed().await;
                        return Ok(());
                    }
                },
                LoginState::AwaitPassword { username } => {
                    let Some(password) = self.terminal.read_password(PASSWORD_PROMPT).await? else {
                        self.closed().await;
                        return Ok(());
                    };
                    self.login(&username, &password).await?
                }
                LoginState::Authenticated => break,
                LoginState::Exhausted => {
                    debug!(
                        "telnet {}: {} failed login(s), closing",
                        self.session.id, self.failed_attempts
                    );
                    self.terminal.shutdown().await?;
                    return Ok(());
                }
            };
        }

        self.shell().await
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<LoginState, SessionError> {
        let event = self
            .event("telnet-password-authentication")
            .detail("telnet.username", username)
            .detail("telnet.password", password)
            .build();
        self.emitter.emit_logged(event).await;

        if accounts_accept(&self.config.accounts, username, password) {
            debug!("telnet {} authenticated as {}", self.session.id, username);
            return Ok(LoginState::Authenticated);
        }

        self.terminal
            .write_str(&format!("{}{}", LOGIN_FAILED, LINE_ENDING))
            .await?;
        self.failed_attempts += 1;
        if self.failed_attempts >= self.config.max_auth_tries {
            Ok(LoginState::Exhausted)
        } else {
            Ok(LoginState::AwaitUsername)
        }
    }

    async fn shell(&mut self) -> Result<(), SessionError> {
        if !self.config.motd.is_empty() {
            self.terminal
                .write_str(&format!("{}{}", self.config.motd, LINE_ENDING))
                .await?;
        }

        let prompt = self.config.prompt.clone();
        loop {
            let Some(command) = self.terminal.read_line(&prompt).await? else {
                self.closed().await;
                return Ok(());
            };

            let event = self
                .event("telnet-command")
                .detail("command", command.as_str())
                .build();
            self.emitter.emit_logged(event).await;

            let response = match self.simulator.lookup(&command) {
                Some(_) => self.simulator.respond(&command),
                None if command.is_empty() => continue,
                None if command == QUIT => break,
                None => format!("{}{}", COMMAND_NOT_FOUND, LINE_ENDING),
            };
            self.terminal.write_str(&response).await?;
        }

        self.terminal
            .write_str(&format!("{}{}", GOODBYE, LINE_ENDING))
            .await?;
        self.terminal.shutdown().await?;
        Ok(())
    }
}
