use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use diqwest::WithDigestAuth;
use reqwest::Client;
use serde_json::Value;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::miners::api::web::traits::WebApiClient;

/// Web client for stock Antminer control boards and their rebrands.
///
/// Every CGI endpoint sits behind HTTP digest auth; the factory credentials
/// are `root`/`root` unless the operator changed them.
pub struct AntminerWebApi {
    client: Client,
    ip: IpAddr,
    username: String,
    password: String,
    timeout: Duration,
    retries: u32,
}

impl AntminerWebApi {
    /// Create a new Antminer web client with factory credentials
    pub fn new(ip: IpAddr) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            ip,
            username: "root".to_string(),
            password: "root".to_string(),
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }

    /// Override the digest auth credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
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

    fn url(&self, command: &str) -> String {
        format!("http://{}/cgi-bin/{}.cgi", self.ip, command)
    }

    async fn get(&self, command: &str) -> Result<Value> {
        let url = self.url(command);
        let mut last_err = None;
        for _ in 0..=self.retries {
            let result = timeout(
                self.timeout,
                self.client
                    .get(&url)
                    .send_with_digest_auth(&self.username, &self.password),
            )
            .await
            .map_err(|_| Error::timeout("web request"));

            match result {
                Ok(Ok(response)) => match Self::decode(response).await {
                    Ok(value) => return Ok(value),
                    Err(err) => last_err = Some(err),
                },
                Ok(Err(err)) => last_err = Some(err.into()),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::timeout("web exchange")))
    }

    /// POST a JSON payload to a CGI endpoint.
    pub async fn post(&self, command: &str, payload: &Value) -> Result<Value> {
        let url = self.url(command);
        let mut last_err = None;
        for _ in 0..=self.retries {
            let result = timeout(
                self.timeout,
                self.client
                    .post(&url)
                    .json(payload)
                    .send_with_digest_auth(&self.username, &self.password),
            )
            .await
            .map_err(|_| Error::timeout("web request"));

            match result {
                Ok(Ok(response)) => match Self::decode(response).await {
                    Ok(value) => return Ok(value),
                    Err(err) => last_err = Some(err),
                },
                Ok(Err(err)) => last_err = Some(err.into()),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::timeout("web exchange")))
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let response = response.error_for_status()?;
        let body = response.bytes().await?;
        // Some CGI endpoints acknowledge with an empty body.
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Get the identity block: network settings, versions, model string.
    pub async fn get_system_info(&self) -> Result<Value> {
        self.get("get_system_info").await
    }

    /// Get the current fault light state
    pub async fn get_blink_status(&self) -> Result<Value> {
        self.get("get_blink_status").await
    }

    /// Get the active miner configuration
    pub async fn get_miner_conf(&self) -> Result<Value> {
        self.get("get_miner_conf").await
    }

    /// Write a miner configuration
    pub async fn set_miner_conf(&self, conf: &Value) -> Result<Value> {
        self.post("set_miner_conf", conf).await
    }

    /// Turn the fault light on or off
    pub async fn blink(&self, blink: bool) -> Result<Value> {
        self.post("blink", &serde_json::json!({ "blink": blink })).await
    }

    /// Reboot the control board
    pub async fn reboot(&self) -> Result<Value> {
        self.get("reboot").await
    }
}

#[async_trait]
impl WebApiClient for AntminerWebApi {
    async fn send_command(&self, command: &'static str) -> Result<Value> {
        self.get(command).await
    }
}
