//! JSON-over-TCP client for the cgminer-family socket API.
//!
//! Every supported vendor exposes this channel on port 4028: one request
//! per connection, a JSON command object in, a JSON document out. Response
//! framing is unreliable across firmwares (some close the socket, some go
//! quiet, some NUL-terminate), so reads run until close or until a short
//! silence window after the first chunk, and the payload is passed through
//! [`normalize`] before decoding.

pub mod normalize;
pub mod status;

use std::net::IpAddr;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

pub use normalize::{load_rpc_payload, normalize_payload};
pub use status::check_status;

/// Conventional cgminer API port.
pub const RPC_PORT: u16 = 4028;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRIES: u32 = 1;

/// How long to wait for further chunks once part of a response has arrived.
const QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Socket API client for a single device.
#[derive(Debug, Clone)]
pub struct RpcApiClient {
    ip: IpAddr,
    port: u16,
    timeout: Duration,
    retries: u32,
    command_key: &'static str,
}

impl RpcApiClient {
    pub fn new(ip: IpAddr) -> Self {
        Self {
            ip,
            port: RPC_PORT,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            command_key: "command",
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

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// BTMiner builds expect `{"cmd": ...}` rather than `{"command": ...}`.
    pub fn with_command_key(mut self, key: &'static str) -> Self {
        self.command_key = key;
        self
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Send a command and decode the reply, surfacing an error STATUS as
    /// [`Error::Command`].
    pub async fn send_command(&self, command: &str) -> Result<Value> {
        let value = self.send_raw_command(command).await?;
        check_status(self.ip, command, value)
    }

    /// Send a command with a `parameter` field, as the LUXminer and vnish
    /// control surfaces expect.
    pub async fn send_command_with_parameter(
        &self,
        command: &str,
        parameter: &str,
    ) -> Result<Value> {
        let request = json!({self.command_key: command, "parameter": parameter});
        let value = self.exchange(&request).await?;
        check_status(self.ip, command, value)
    }

    /// Send a fully-formed request object, for write commands that carry
    /// extra fields alongside the command name.
    pub async fn send_request(&self, command: &str, request: Value) -> Result<Value> {
        let value = self.exchange(&request).await?;
        check_status(self.ip, command, value)
    }

    /// Send a command and decode the reply without STATUS checking.
    ///
    /// Identification wants this: several firmwares reject unknown commands
    /// with an error reply whose text still names the vendor.
    pub async fn send_raw_command(&self, command: &str) -> Result<Value> {
        let request = json!({self.command_key: command});
        self.exchange(&request).await
    }

    async fn exchange(&self, request: &Value) -> Result<Value> {
        let payload = serde_json::to_vec(request)?;
        let mut last_err = None;
        for _ in 0..=self.retries {
            match self.roundtrip(&payload).await {
                Ok(data) => return Ok(load_rpc_payload(&data)),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::timeout("rpc exchange")))
    }

    /// One connect/send/drain cycle against the device.
    async fn roundtrip(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = timeout(self.timeout, TcpStream::connect((self.ip, self.port)))
            .await
            .map_err(|_| Error::timeout("rpc connect"))??;

        timeout(self.timeout, stream.write_all(payload))
            .await
            .map_err(|_| Error::timeout("rpc send"))??;

        let mut data = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let window = if data.is_empty() {
                self.timeout
            } else {
                QUIET_WINDOW
            };
            match timeout(window, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => data.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) if data.is_empty() => return Err(err.into()),
                // Some firmwares reset the connection after responding.
                Ok(Err(_)) => break,
                Err(_) if data.is_empty() => return Err(Error::timeout("rpc receive")),
                Err(_) => break,
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    /// Serve one canned response on a local socket and return the port.
    async fn serve_once(response: &'static [u8]) -> u16 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(response).await.unwrap();
        });
        port
    }

    fn client(port: u16) -> RpcApiClient {
        RpcApiClient::new(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(port)
            .with_timeout(Duration::from_secs(2))
            .with_retries(0)
    }

    #[tokio::test]
    async fn decodes_well_formed_response() {
        let port = serve_once(b"{\"STATUS\":[{\"STATUS\":\"S\"}],\"SUMMARY\":[{\"MHS av\":1.5}]}").await;
        let value = client(port).send_command("summary").await.unwrap();
        assert_eq!(value.pointer("/SUMMARY/0/MHS av"), Some(&json!(1.5)));
    }

    #[tokio::test]
    async fn repairs_nul_terminated_response() {
        let port = serve_once(b"{\"VERSION\":[{\"Type\":\"Antminer S19\"}],}\0").await;
        let value = client(port).send_command("version").await.unwrap();
        assert_eq!(
            value.pointer("/VERSION/0/Type"),
            Some(&json!("Antminer S19"))
        );
    }

    #[tokio::test]
    async fn error_status_becomes_command_error() {
        let port = serve_once(b"{\"STATUS\":[{\"STATUS\":\"E\",\"Msg\":\"Invalid command\"}]}").await;
        let err = client(port).send_command("bogus").await.unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }

    #[tokio::test]
    async fn raw_send_keeps_error_replies() {
        let port = serve_once(b"{\"STATUS\":[{\"STATUS\":\"E\",\"Description\":\"bmminer\"}]}").await;
        let value = client(port).send_raw_command("bogus").await.unwrap();
        assert_eq!(
            value.pointer("/STATUS/0/Description"),
            Some(&json!("bmminer"))
        );
    }

    #[tokio::test]
    async fn closed_port_is_an_error() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = client(port).send_command("summary").await;
        assert!(result.is_err());
    }
}
