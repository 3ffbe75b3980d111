use std::sync::Arc;

use async_trait::async_trait;
use russh::keys::{decode_secret_key, ssh_key, PrivateKeyWithHashAlg};
use russh::{client, Channel, ChannelMsg, Disconnect};

use super::transport::{ChannelEvent, ShellChannel, ShellRequest, Transport, WindowSize};
use super::AuthMethod;
use crate::config::SessionSettings;
use crate::error::SessionError;

/// Minimal SSH client handler.
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // TODO: check against a known_hosts store once profiles carry one
        log::warn!(
            "Accepting server key {} without verification",
            server_public_key.fingerprint(ssh_key::HashAlg::Sha256)
        );
        Ok(true)
    }
}

/// [`Transport`] over russh.
pub struct RusshTransport {
    config: Arc<client::Config>,
    handle: Option<client::Handle<ClientHandler>>,
    target: (String, u16),
}

impl RusshTransport {
    pub fn new(settings: &SessionSettings) -> Self {
        let config = client::Config {
            keepalive_interval: settings.keepalive_interval(),
            ..Default::default()
        };
        Self {
            config: Arc::new(config),
            handle: None,
            target: (String::new(), 0),
        }
    }

    fn handle(&mut self) -> Result<&mut client::Handle<ClientHandler>, SessionError> {
        let (host, port) = self.target.clone();
        self.handle.as_mut().ok_or(SessionError::Connection {
            host,
            port,
            reason: "not connected".to_string(),
        })
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError> {
        self.target = (host.to_string(), port);
        let handle = client::connect(Arc::clone(&self.config), (host, port), ClientHandler)
            .await
            .map_err(|e| SessionError::Connection {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?;
        self.handle = Some(handle);
        log::info!("SSH handshake with {}:{} complete", host, port);
        Ok(())
    }

    async fn authenticate(&mut self, auth: &AuthMethod) -> Result<(), SessionError> {
        let (host, port) = self.target.clone();
        let username = auth.username().to_string();
        let rejected = |reason: String| SessionError::Authentication {
            username: username.clone(),
            reason,
        };
        let dropped = |e: russh::Error| SessionError::Connection {
            host: host.clone(),
            port,
            reason: e.to_string(),
        };

        let handle = self.handle()?;
        let result = match auth {
            AuthMethod::Password { username, password } => handle
                .authenticate_password(username.as_str(), password.as_str())
                .await
                .map_err(dropped)?,
            AuthMethod::Key {
                username,
                private_key,
                passphrase,
            } => {
                let key_pair = decode_secret_key(private_key, passphrase.as_deref())
                    .map_err(|e| rejected(format!("unusable private key: {}", e)))?;
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(dropped)?
                    .flatten();
                let pk = PrivateKeyWithHashAlg::new(Arc::new(key_pair), hash_alg);
                handle
                    .authenticate_publickey(username.as_str(), pk)
                    .await
                    .map_err(dropped)?
            }
        };

        match result {
            client::AuthResult::Success => Ok(()),
            client::AuthResult::Failure { .. } => {
                Err(rejected("credentials rejected by server".to_string()))
            }
        }
    }

    async fn open_shell(
        &mut self,
        request: &ShellRequest,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| SessionError::Channel("not connected".to_string()))?;
        let channel_err = |e: russh::Error| SessionError::Channel(e.to_string());

        let channel = handle.channel_open_session().await.map_err(channel_err)?;
        let window = request.window;
        channel
            .request_pty(
                false,
                &request.term,
                window.cols,
                window.rows,
                window.pixel_width,
                window.pixel_height,
                &[],
            )
            .await
            .map_err(channel_err)?;
        channel.request_shell(false).await.map_err(channel_err)?;

        Ok(Box::new(RusshChannel { channel }))
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "User disconnect", "en")
                .await
            {
                log::debug!("SSH disconnect error: {}", e);
            }
        }
    }
}

/// Interactive shell channel.
struct RusshChannel {
    channel: Channel<client::Msg>,
}

#[async_trait]
impl ShellChannel for RusshChannel {
    async fn recv(&mut self) -> ChannelEvent {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { ref data }) => return ChannelEvent::Data(data.to_vec()),
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    return ChannelEvent::Stderr(data.to_vec())
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    log::debug!("Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Close) | None => return ChannelEvent::Closed,
                // EOF is followed by Close
                Some(_) => {}
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    async fn window_change(&mut self, window: WindowSize) -> Result<(), SessionError> {
        self.channel
            .window_change(
                window.cols,
                window.rows,
                window.pixel_width,
                window.pixel_height,
            )
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.channel.close().await {
            log::debug!("Closing shell channel failed: {}", e);
        }
    }
}
