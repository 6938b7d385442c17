use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::miners::api::web::traits::WebApiClient;

/// Web client for the Braiins OS management API under `/api/v1/`.
///
/// Requests carry a session token obtained from the login endpoint; the
/// token is fetched lazily and refreshed once on a 401.
pub struct BraiinsWebApi {
    client: Client,
    ip: IpAddr,
    username: String,
    password: String,
    timeout: Duration,
    token: Mutex<Option<String>>,
}

impl BraiinsWebApi {
    /// Create a new Braiins OS web client with factory credentials
    pub fn new(ip: IpAddr) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            ip,
            username: "root".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(5),
            token: Mutex::new(None),
        }
    }

    /// Override the login credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1/{}", self.ip, path)
    }

    async fn login(&self) -> Result<String> {
        let body = json!({
            "username": self.username,
            "password": self.password,
        });
        let response = timeout(
            self.timeout,
            self.client.post(self.url("auth/login")).json(&body).send(),
        )
        .await
        .map_err(|_| Error::timeout("web login"))??;

        let value: Value = response.error_for_status()?.json().await?;
        value
            .get("token")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Error::auth("login response carried no token"))
    }

    async fn ensure_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn request(&self, method: Method, path: &str, payload: Option<&Value>) -> Result<Value> {
        let token = self.ensure_token().await?;
        match self.execute(method.clone(), path, payload, &token).await {
            // Sessions expire server side; log in again and retry once.
            Err(Error::Auth { .. }) => {
                *self.token.lock().await = None;
                let token = self.ensure_token().await?;
                self.execute(method, path, payload, &token).await
            }
            other => other,
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
        token: &str,
    ) -> Result<Value> {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header("Authorization", token);
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }

        let response = timeout(self.timeout, builder.send())
            .await
            .map_err(|_| Error::timeout("web request"))??;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::auth("session token rejected"));
        }
        let response = response.error_for_status()?;
        let body = response.bytes().await?;
        // Action endpoints acknowledge with an empty body.
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Pause mining without powering the control board down
    pub async fn pause_mining(&self) -> Result<Value> {
        self.request(Method::POST, "actions/pause", None).await
    }

    /// Resume mining after a pause
    pub async fn resume_mining(&self) -> Result<Value> {
        self.request(Method::POST, "actions/resume", None).await
    }

    /// Restart the mining daemon
    pub async fn restart(&self) -> Result<Value> {
        self.request(Method::POST, "actions/restart", None).await
    }

    /// Set the tuner's power target in watts
    pub async fn set_power_target(&self, watts: u64) -> Result<Value> {
        let payload = json!({ "watt": watts });
        self.request(Method::PUT, "performance/power-target", Some(&payload))
            .await
    }

    /// Turn the locate light on or off
    pub async fn set_locate_device(&self, enable: bool) -> Result<Value> {
        let payload = json!({ "enable": enable });
        self.request(Method::PUT, "actions/locate-device", Some(&payload))
            .await
    }
}

#[async_trait]
impl WebApiClient for BraiinsWebApi {
    async fn send_command(&self, command: &'static str) -> Result<Value> {
        self.request(Method::GET, command, None).await
    }
}
