//! Shared management API client.

use std::net::IpAddr;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::codec::{self, CommandEnvelope, Parameter};
use crate::error::{ApiError, Result};
use crate::transport;
use crate::validate::validate;
use crate::DEFAULT_PORT;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client bound to one device address.
///
/// Holds no connection state; every request opens its own socket, so
/// clones are cheap and may be used concurrently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiClient {
    ip: IpAddr,
    port: u16,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Write raw bytes and decode the reply. No reply decodes to `{}`.
    pub async fn exchange(&self, payload: &[u8]) -> Result<Value> {
        let raw = transport::send(self.ip, self.port, payload, self.timeout).await;
        if raw.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        codec::decode(&raw)
    }

    /// Send one command and return the decoded response.
    ///
    /// With `ignore_errors` the payload is returned even when the device
    /// reports a failure status.
    pub async fn send_command(
        &self,
        command: &str,
        parameter: Option<Parameter>,
        ignore_errors: bool,
    ) -> Result<Value> {
        let envelope = CommandEnvelope {
            command: command.to_string(),
            parameter,
        };
        self.request(&envelope, ignore_errors, true).await
    }

    /// Send several commands as one `+`-joined batch.
    ///
    /// Some firmware rejects batches outright; any device-side rejection is
    /// answered by sending each command on its own and assembling the
    /// results as `{command: [response]}`.
    pub async fn multicommand<S: AsRef<str>>(&self, commands: &[S]) -> Result<Value> {
        let envelope = CommandEnvelope::batch(commands);
        tracing::debug!(ip = %self.ip, command = %envelope.command, "Sending multicommand");

        match self.request(&envelope, false, false).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_rejection() => {
                tracing::debug!(ip = %self.ip, error = %e, "Batch rejected, sending commands individually");
                self.send_individually(commands).await
            }
            Err(e) => Err(e),
        }
    }

    async fn send_individually<S: AsRef<str>>(&self, commands: &[S]) -> Result<Value> {
        let mut data = Map::new();
        for command in commands {
            let command = command.as_ref();
            let reply = self
                .request(&CommandEnvelope::new(command), false, false)
                .await?;
            data.insert(command.to_string(), Value::Array(vec![reply]));
        }
        Ok(Value::Object(data))
    }

    async fn request(
        &self,
        envelope: &CommandEnvelope,
        ignore_errors: bool,
        log_failure: bool,
    ) -> Result<Value> {
        let payload = envelope.encode()?;
        let data = self.exchange(&payload).await?;
        if ignore_errors {
            return Ok(data);
        }
        self.check(data, log_failure)
    }

    /// Validate a decoded response, turning a device failure into an error.
    ///
    /// An empty response (no data received) passes through untouched.
    pub(crate) fn check(&self, data: Value, log_failure: bool) -> Result<Value> {
        if data.as_object().is_some_and(Map::is_empty) {
            return Ok(data);
        }
        let validation = validate(&data);
        if validation.ok {
            return Ok(data);
        }
        let message = validation.message.unwrap_or_default();
        if log_failure {
            tracing::warn!(ip = %self.ip, error = %message, "API command error");
        }
        Err(ApiError::Command(message))
    }
}
