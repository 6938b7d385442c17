use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Command execution over a firmware's HTTP surface.
///
/// Implementations map a command name onto whatever path, method and auth
/// scheme their firmware uses, so backends can route web commands without
/// caring which vendor they talk to.
#[async_trait]
pub trait WebApiClient: Send + Sync {
    async fn send_command(&self, command: &'static str) -> Result<Value>;
}
