//! Privileged shell channel.
//!
//! Classification falls back to reading an on-device file when the
//! management API cannot name the hardware. The channel is a trait so the
//! classifier can run without SSH support compiled in.

use std::net::IpAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Reads files from a device over a privileged channel.
#[async_trait]
pub trait ShellChannel: Send + Sync {
    /// Contents of `path`, or `None` when the channel is unavailable.
    async fn read_file(&self, ip: IpAddr, path: &str) -> Result<Option<String>>;
}

/// Channel that never connects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoShell;

#[async_trait]
impl ShellChannel for NoShell {
    async fn read_file(&self, _ip: IpAddr, _path: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(feature = "ssh")]
pub use ssh::SshShell;

#[cfg(feature = "ssh")]
mod ssh {
    use std::net::IpAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use russh::client;
    use russh::ChannelMsg;
    use russh_keys::key::PublicKey;
    use tokio::time::timeout;

    use super::ShellChannel;
    use crate::config::ShellConfig;
    use crate::error::{DiscoverError, Result};

    struct AcceptAnyHost;

    #[async_trait]
    impl client::Handler for AcceptAnyHost {
        type Error = russh::Error;

        // Host keys are not pinned.
        async fn check_server_key(
            &mut self,
            _server_public_key: &PublicKey,
        ) -> std::result::Result<bool, Self::Error> {
            Ok(true)
        }
    }

    /// Password-authenticated SSH channel.
    #[derive(Clone)]
    pub struct SshShell {
        user: String,
        password: String,
        port: u16,
        timeout: Duration,
    }

    impl std::fmt::Debug for SshShell {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SshShell")
                .field("user", &self.user)
                .field("port", &self.port)
                .field("timeout", &self.timeout)
                .finish_non_exhaustive()
        }
    }

    impl SshShell {
        pub fn new(config: &ShellConfig, timeout: Duration) -> Self {
            Self {
                user: config.user.clone(),
                password: config.password.clone(),
                port: config.port,
                timeout,
            }
        }

        async fn run(&self, ip: IpAddr, command: &str) -> Result<Option<String>> {
            let config = Arc::new(client::Config::default());
            let mut session = client::connect(config, (ip, self.port), AcceptAnyHost)
                .await
                .map_err(shell_err)?;

            let authenticated = session
                .authenticate_password(self.user.as_str(), self.password.as_str())
                .await
                .map_err(shell_err)?;
            if !authenticated {
                tracing::warn!(ip = %ip, user = %self.user, "SSH authentication rejected");
                return Ok(None);
            }

            let mut channel = session.channel_open_session().await.map_err(shell_err)?;
            channel.exec(true, command).await.map_err(shell_err)?;

            let mut output = Vec::new();
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                    ChannelMsg::Eof | ChannelMsg::Close => break,
                    _ => {}
                }
            }
            let _ = session
                .disconnect(russh::Disconnect::ByApplication, "", "en")
                .await;

            Ok(Some(String::from_utf8_lossy(&output).into_owned()))
        }
    }

    fn shell_err(e: russh::Error) -> DiscoverError {
        DiscoverError::Shell(e.to_string())
    }

    #[async_trait]
    impl ShellChannel for SshShell {
        async fn read_file(&self, ip: IpAddr, path: &str) -> Result<Option<String>> {
            let command = format!("cat {path}");
            match timeout(self.timeout, self.run(ip, &command)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(ip = %ip, path, "SSH read timed out");
                    Ok(None)
                }
            }
        }
    }
}
