use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use russh::keys::{PublicKey, PublicKeyBase64};
use russh::server::{Auth, ChannelOpenHandle, Handler, Msg, Session as Connection};
use russh::{Channel, ChannelId, ChannelOpenFailure, Pty};

use super::shell::{to_terminal, LineEditor, ShellStep};
use super::wire;
use crate::configuration::service_config::SshConfig;
use crate::configuration::types::accounts_accept;
use crate::error_handling::types::SessionError;
use crate::event::{DetailValue, EventBuilder, EventEmitter};
use crate::services::simulator::CommandSimulator;
use crate::session_management::Session;

/// Shown after login when the service configures no MOTD.
pub const DEFAULT_MOTD: &str = "Last login: Wed Sep 14 14:11:49 2024 from 172.31.60.24\n";

/// Detail key holding the session id. Authentication, connection failures and TCP
/// forwarding channels spell it `ssh.session-id`; other channels and requests use
/// `ssh.sessionid`.
pub fn session_id_key(event_type: &str, channel_type: Option<&str>) -> &'static str {
    match (event_type, channel_type) {
        ("ssh-channel", Some("direct-tcpip" | "forwarded-tcpip")) => "ssh.session-id",
        ("ssh-channel" | "ssh-request" | "ssh-shell" | "ssh-exec", _) => "ssh.sessionid",
        _ => "ssh.session-id",
    }
}

/// Connection-level state of one SSH client.
pub struct SshHandler {
    session: Session,
    config: Arc<SshConfig>,
    simulator: CommandSimulator,
    emitter: EventEmitter,
    username: Option<String>,
    authenticated: Arc<AtomicBool>,
    last_offered_key: Option<Vec<u8>>,
    shells: HashMap<ChannelId, LineEditor>,
}

impl SshHandler {
    pub fn new(
        session: Session,
        config: Arc<SshConfig>,
        simulator: CommandSimulator,
        emitter: EventEmitter,
    ) -> Self {
        Self {
            session,
            config,
            simulator,
            emitter,
            username: None,
            authenticated: Arc::new(AtomicBool::new(false)),
            last_offered_key: None,
            shells: HashMap::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Set once a password login succeeds; readable after the handler was moved into russh.
    pub fn authenticated_flag(&self) -> Arc<AtomicBool> {
        self.authenticated.clone()
    }

    fn event(&self, event_type: &str) -> EventBuilder {
        self.channel_event(event_type, None)
    }

    fn channel_event(&self, event_type: &str, channel_type: Option<&str>) -> EventBuilder {
        self.session
            .event(event_type)
            .detail(session_id_key(event_type, channel_type), self.session.id_string())
    }

    fn request_event(&self, request_type: &str, payload: Vec<u8>) -> EventBuilder {
        self.event("ssh-request")
            .detail("ssh.request-type", request_type)
            .detail("payload", payload)
    }

    fn prompt(&self) -> String {
        format!(
            "{}@{}:~$ ",
            self.username.as_deref().unwrap_or_default(),
            self.config.hostname
        )
    }

    fn motd(&self) -> &str {
        if self.config.motd.is_empty() {
            DEFAULT_MOTD
        } else {
            &self.config.motd
        }
    }

    async fn record_publickey(&mut self, public_key: &PublicKey) {
        let key_bytes = public_key.public_key_bytes();
        let event = self
            .event("ssh-publickey-authentication")
            .detail("ssh.publickey-type", public_key.algorithm().as_str())
            .detail("ssh.publickey", hex::encode(&key_bytes))
            .build();
        self.last_offered_key = Some(key_bytes);
        self.emitter.emit_logged(event).await;
    }

    /// Logs a channel-open this honeypot never grants, then refuses it as an unknown type.
    async fn reject_channel(
        &self,
        reply: ChannelOpenHandle,
        channel_type: &str,
        fields: Vec<(&str, DetailValue)>,
        payload: Vec<u8>,
    ) {
        let mut event = self
            .channel_event("ssh-channel", Some(channel_type))
            .detail("ssh.channel-type", channel_type);
        for (key, value) in fields {
            event = event.detail(key, value);
        }
        self.emitter
            .emit_logged(event.detail("payload", payload).build())
            .await;
        reply.reject(ChannelOpenFailure::UnknownChannelType).await;
    }

    async fn run_line(
        &mut self,
        channel: ChannelId,
        line: String,
        connection: &mut Connection,
    ) -> Result<(), SessionError> {
        if line == "exit" {
            self.shells.remove(&channel);
            return finish(connection, channel);
        }

        if !line.is_empty() {
            let event = self.event("ssh-shell").detail("ssh.shell", line.as_str()).build();
            self.emitter.emit_logged(event).await;
            let response = self.simulator.respond(&line);
            send(connection, channel, to_terminal(&response))?;
        }
        send(connection, channel, self.prompt().into_bytes())
    }
}

fn send(connection: &mut Connection, channel: ChannelId, data: Vec<u8>) -> Result<(), SessionError> {
    connection.data(channel, data)?;
    Ok(())
}

/// Zero exit status, then EOF and close.
fn finish(connection: &mut Connection, channel: ChannelId) -> Result<(), SessionError> {
    connection.exit_status_request(channel, 0)?;
    connection.eof(channel)?;
    connection.close(channel)?;
    Ok(())
}

impl Handler for SshHandler {
    type Error = SessionError;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        debug!("ssh {} offered {} key for {}", self.session.id, public_key.algorithm().as_str(), user);
        self.record_publickey(public_key).await;
        Ok(Auth::reject())
    }

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        // signed attempts sent without a prior offer still get recorded once
        if self.last_offered_key.as_deref() != Some(public_key.public_key_bytes().as_slice()) {
            self.record_publickey(public_key).await;
        }
        Ok(Auth::reject())
    }

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        let event = self
            .event("ssh-password-authentication")
            .detail("ssh.username", user)
            .detail("ssh.password", password)
            .build();
        self.emitter.emit_logged(event).await;

        if accounts_accept(&self.config.accounts, user, password) {
            debug!("ssh {} authenticated as {}", self.session.id, user);
            self.username = Some(user.to_string());
            self.authenticated.store(true, Ordering::SeqCst);
            return Ok(Auth::Accept);
        }
        debug!("ssh {}: password rejected for {:?}", self.session.id, user);
        Ok(Auth::reject())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        reply: ChannelOpenHandle,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        debug!("ssh {} opened session channel {:?}", self.session.id, channel.id());
        reply.accept().await;
        Ok(())
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        reply: ChannelOpenHandle,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::tcpip_channel(host_to_connect, port_to_connect, originator_address, originator_port);
        self.reject_channel(
            reply,
            "direct-tcpip",
            vec![
                ("ssh.direct-tcpip.host-to-connect", host_to_connect.into()),
                ("ssh.direct-tcpip.port-to-connect", port_to_connect.to_string().into()),
                ("ssh.direct-tcpip.originator-host", originator_address.into()),
                ("ssh.direct-tcpip.originator-port", originator_port.to_string().into()),
            ],
            payload,
        )
        .await;
        Ok(())
    }

    async fn channel_open_forwarded_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        reply: ChannelOpenHandle,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::tcpip_channel(host_to_connect, port_to_connect, originator_address, originator_port);
        self.reject_channel(
            reply,
            "forwarded-tcpip",
            vec![
                ("ssh.forwarded-tcpip.address-that-was-connected", host_to_connect.into()),
                ("ssh.forwarded-tcpip.port-that-was-connected", port_to_connect.to_string().into()),
                ("ssh.forwarded-tcpip.originator-host", originator_address.into()),
                ("ssh.forwarded-tcpip.originator-port", originator_port.to_string().into()),
            ],
            payload,
        )
        .await;
        Ok(())
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        reply: ChannelOpenHandle,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::x11_channel(originator_address, originator_port);
        self.reject_channel(reply, "x11", Vec::new(), payload).await;
        Ok(())
    }

    async fn channel_open_direct_streamlocal(
        &mut self,
        _channel: Channel<Msg>,
        socket_path: &str,
        reply: ChannelOpenHandle,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::streamlocal_channel(socket_path);
        self.reject_channel(
            reply,
            "direct-streamlocal@openssh.com",
            vec![("ssh.direct-streamlocal.socket-path", socket_path.into())],
            payload,
        )
        .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let modes: Vec<(u8, u32)> = modes.iter().map(|(pty, arg)| (*pty as u8, *arg)).collect();
        let payload = wire::pty_request(term, col_width, row_height, pix_width, pix_height, &modes);
        let event = self
            .request_event("pty-req", payload)
            .detail("ssh.pty-req.term", term)
            .detail("ssh.pty-req.columns", col_width)
            .detail("ssh.pty-req.rows", row_height)
            .build();
        self.emitter.emit_logged(event).await;
        connection.channel_success(channel)?;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::strings(&[variable_name.as_bytes(), variable_value.as_bytes()]);
        let event = self
            .request_event("env", payload)
            .detail(
                "ssh.env",
                vec![variable_name.to_string(), variable_value.to_string()],
            )
            .build();
        self.emitter.emit_logged(event).await;
        connection.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        connection.channel_success(channel)?;
        self.shells.insert(channel, LineEditor::new());
        let mut banner = to_terminal(self.motd());
        banner.extend_from_slice(self.prompt().as_bytes());
        send(connection, channel, banner)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        connection.channel_success(channel)?;
        let command = String::from_utf8_lossy(data).into_owned();
        let event = self
            .event("ssh-exec")
            .detail("ssh.request-type", "exec")
            .detail("payload", wire::strings(&[data]))
            .detail("ssh.exec", vec![command.clone()])
            .build();
        self.emitter.emit_logged(event).await;

        let response = format!("-bash: {}: command not found\n", command);
        send(connection, channel, response.into_bytes())?;
        finish(connection, channel)
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let payload = wire::strings(&[name.as_bytes()]);
        let event = self
            .request_event("subsystem", payload)
            .detail("ssh.subsystem", name)
            .build();
        self.emitter.emit_logged(event).await;
        connection.channel_success(channel)?;
        connection.eof(channel)?;
        connection.close(channel)?;
        Ok(())
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _connection: &mut Connection,
    ) -> Result<bool, Self::Error> {
        let event = self
            .request_event("tcpip-forward", wire::tcpip_forward(address, *port))
            .detail("ssh.tcpip-forward.address-to-bind", address)
            .detail("ssh.tcpip-forward.port-to-bind", port.to_string())
            .build();
        self.emitter.emit_logged(event).await;
        Ok(false)
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        let Some(editor) = self.shells.get_mut(&channel) else {
            warn!("ssh {}: data on channel {:?} without a shell", self.session.id, channel);
            return Ok(());
        };
        let steps = editor.feed(data);

        for step in steps {
            match step {
                ShellStep::Echo(bytes) => send(connection, channel, bytes)?,
                ShellStep::Line(line) => {
                    self.run_line(channel, line, connection).await?;
                    if !self.shells.contains_key(&channel) {
                        break;
                    }
                }
                ShellStep::Interrupt => {
                    send(connection, channel, self.prompt().into_bytes())?;
                }
                ShellStep::Hangup => {
                    self.shells.remove(&channel);
                    finish(connection, channel)?;
                    break;
                }
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        self.shells.remove(&channel);
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _connection: &mut Connection,
    ) -> Result<(), Self::Error> {
        self.shells.remove(&channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Endpoint;

    fn handler(motd: &str) -> SshHandler {
        let config = SshConfig {
            version: "SSH-2.0-OpenSSH_8.9p1".to_string(),
            hostname: "web01".to_string(),
            motd: motd.to_string(),
            accounts: Vec::new(),
            max_auth_tries: 3,
            simulator: HashMap::new(),
        };
        SshHandler::new(
            Session::new("ssh", "openssh", Endpoint::default(), Endpoint::default()),
            Arc::new(config),
            CommandSimulator::default(),
            EventEmitter::disabled(),
        )
    }

    #[test]
    fn test_prompt_uses_login_name() {
        let mut h = handler("");
        h.username = Some("root".to_string());
        assert_eq!(h.prompt(), "root@web01:~$ ");
    }

    #[test]
    fn test_motd_default_and_override() {
        assert_eq!(handler("").motd(), DEFAULT_MOTD);
        assert_eq!(handler("hi\n").motd(), "hi\n");
    }

    #[test]
    fn test_events_carry_session_id() {
        let h = handler("");
        let event = h.request_event("env", vec![1]).build();
        assert_eq!(event.event_type(), "ssh-request");
        assert_eq!(
            event.detail_text("ssh.sessionid"),
            Some(h.session().id_string().as_str())
        );
        assert_eq!(event.detail_text("ssh.request-type"), Some("env"));
        assert_eq!(event.detail_text("ssh.session-id"), None);

        let login = h.event("ssh-password-authentication").build();
        assert!(login.detail_text("ssh.session-id").is_some());
        assert_eq!(login.detail_text("ssh.sessionid"), None);
    }

    #[test]
    fn test_session_id_key_spelling() {
        assert_eq!(session_id_key("ssh-publickey-authentication", None), "ssh.session-id");
        assert_eq!(session_id_key("ssh-connect-failed", None), "ssh.session-id");
        assert_eq!(session_id_key("ssh-channel", Some("direct-tcpip")), "ssh.session-id");
        assert_eq!(session_id_key("ssh-channel", Some("forwarded-tcpip")), "ssh.session-id");
        assert_eq!(session_id_key("ssh-channel", Some("x11")), "ssh.sessionid");
        assert_eq!(session_id_key("ssh-shell", None), "ssh.sessionid");
        assert_eq!(session_id_key("ssh-exec", None), "ssh.sessionid");
    }
}
