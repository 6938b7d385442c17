use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::miners::api::web::traits::WebApiClient;

/// Web client for ESPMiner firmware (BitAxe and similar open boards).
///
/// The firmware speaks plain unauthenticated JSON under `/api/`.
pub struct EspWebApi {
    client: Client,
    ip: IpAddr,
    port: u16,
    timeout: Duration,
    retries: u32,
}

impl EspWebApi {
    /// Create a new ESPMiner web client
    pub fn new(ip: IpAddr, port: u16) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            ip,
            port,
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    async fn request(
        &self,
        command: &str,
        method: Method,
        parameters: Option<Value>,
    ) -> Result<Value> {
        let url = format!("http://{}:{}/api/{}", self.ip, self.port, command);

        let mut last_err = None;
        for _ in 0..=self.retries {
            match self
                .execute_request(&url, method.clone(), parameters.as_ref())
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::timeout("web exchange")))
    }

    async fn execute_request(
        &self,
        url: &str,
        method: Method,
        parameters: Option<&Value>,
    ) -> Result<Value> {
        let mut builder = self.client.request(method, url);
        if let Some(params) = parameters {
            builder = builder.json(params);
        }

        let response = timeout(self.timeout, builder.send())
            .await
            .map_err(|_| Error::timeout("web request"))??;
        let response = response.error_for_status()?;

        // Mutating endpoints answer with an empty body.
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// One-shot overview: identity, versions, fans, hashrate.
    pub async fn system_info(&self) -> Result<Value> {
        self.request("system/info", Method::GET, None).await
    }

    /// Chip model and core counts.
    pub async fn asic_info(&self) -> Result<Value> {
        self.request("system/asic", Method::GET, None).await
    }

    /// Reboot the control board.
    pub async fn restart(&self) -> Result<Value> {
        self.request("system/restart", Method::POST, None).await
    }

    /// Patch persistent settings with the given overrides.
    pub async fn update_settings(&self, config: Value) -> Result<Value> {
        self.request("system", Method::PATCH, Some(config)).await
    }
}

#[async_trait]
impl WebApiClient for EspWebApi {
    async fn send_command(&self, command: &'static str) -> Result<Value> {
        // Every readable endpoint is a GET; the mutating ones have
        // dedicated methods above.
        self.request(command, Method::GET, None).await
    }
}
