use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::miners::commands::MinerCommand;

pub mod rpc;
pub mod web;

/// A transport capable of executing raw device commands.
///
/// Backends implement this by routing each command to the channel it names:
/// socket commands to their [`rpc::RpcApiClient`], web commands to whatever
/// HTTP surface the firmware exposes. The collector in
/// [`crate::miners::data`] only ever talks to this trait.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send_command(&self, command: MinerCommand) -> Result<Value>;
}
