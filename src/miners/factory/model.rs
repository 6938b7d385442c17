//! Model resolution.
//!
//! Once a device's type is known, ask it what it is in the way that type
//! expects. Every strategy is best-effort: any transport or shape failure
//! yields `None` and the device falls back to its family default.

use std::net::IpAddr;
use std::time::Duration;

use diqwest::WithDigestAuth;
use reqwest::Client;
use serde_json::{Value, json};

use crate::miners::api::rpc::RpcApiClient;
use crate::miners::factory::MinerType;

/// Ask a typed device for its model string, raw as reported.
pub(crate) async fn get_model(
    miner_type: MinerType,
    ip: IpAddr,
    timeout: Duration,
) -> Option<String> {
    match miner_type {
        MinerType::Antminer | MinerType::Hammer | MinerType::Hiveon => {
            digest_system_info(ip, timeout).await
        }
        MinerType::Whatsminer => rpc_field(ip, timeout, "devdetails", "/DEVDETAILS/0/Model").await,
        MinerType::BraiinsOs => rpc_field(ip, timeout, "devdetails", "/DEVDETAILS/0/Model").await,
        MinerType::LuxOs => rpc_field(ip, timeout, "version", "/VERSION/0/Type").await,
        MinerType::AvalonMiner => {
            // Avalon reports "AVALONminer 1246-85" style product strings.
            let prod = rpc_field(ip, timeout, "version", "/VERSION/0/PROD").await?;
            prod.split('-').next().map(str::to_owned)
        }
        MinerType::Vnish => {
            json_field(ip, timeout, &format!("http://{ip}/api/v1/info"), "model").await
        }
        MinerType::Epic => {
            json_field(ip, timeout, &format!("http://{ip}:4028/capabilities"), "Model").await
        }
        MinerType::Bitaxe => {
            json_field(
                ip,
                timeout,
                &format!("http://{ip}/api/system/info"),
                "ASICModel",
            )
            .await
        }
        MinerType::Goldshell => {
            json_field(ip, timeout, &format!("http://{ip}/mcb/status"), "model").await
        }
        MinerType::VolcMiner | MinerType::ElphaPex => {
            json_field(ip, timeout, &format!("http://{ip}/user/system_info"), "model").await
        }
        MinerType::Marathon => {
            json_field(ip, timeout, &format!("http://{ip}/kaonsu/v1/brief"), "model").await
        }
        MinerType::IceRiver => iceriver_panel_model(ip, timeout).await,
        MinerType::Innosilicon => innosilicon_model(ip, timeout).await,
        // Auradine only reports its model through the authenticated gRPC
        // surface, which identification does not carry credentials for.
        MinerType::Auradine => None,
    }
}

/// Stock Antminer families report the model as `minertype` behind digest
/// auth with factory credentials.
async fn digest_system_info(ip: IpAddr, timeout: Duration) -> Option<String> {
    let client = Client::builder().timeout(timeout).build().ok()?;
    let url = format!("http://{ip}/cgi-bin/get_system_info.cgi");
    let response = client
        .get(&url)
        .send_with_digest_auth("root", "root")
        .await
        .ok()?;
    let value: Value = response.json().await.ok()?;
    value
        .get("minertype")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

async fn rpc_field(
    ip: IpAddr,
    timeout: Duration,
    command: &'static str,
    pointer: &str,
) -> Option<String> {
    let rpc = RpcApiClient::new(ip).with_timeout(timeout).with_retries(0);
    let value = rpc.send_raw_command(command).await.ok()?;
    value.pointer(pointer).and_then(Value::as_str).map(str::to_owned)
}

async fn json_field(ip: IpAddr, timeout: Duration, url: &str, key: &str) -> Option<String> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .ok()?;
    let response = client.get(url).send().await.ok()?;
    let value: Value = response.json().await.ok()?;
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// IceRiver panels answer an unauthenticated POST with the board model
/// nested under `data`.
async fn iceriver_panel_model(ip: IpAddr, timeout: Duration) -> Option<String> {
    let client = Client::builder().timeout(timeout).build().ok()?;
    let url = format!("http://{ip}/user/userpanel");
    let response = client.post(&url).json(&json!({})).send().await.ok()?;
    let value: Value = response.json().await.ok()?;
    value
        .pointer("/data/model")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Innosilicon wants a login first; the factory credentials are fixed.
async fn innosilicon_model(ip: IpAddr, timeout: Duration) -> Option<String> {
    let client = Client::builder().timeout(timeout).build().ok()?;
    let auth_url = format!("http://{ip}/api/auth");
    let response = client
        .post(&auth_url)
        .json(&json!({ "username": "admin", "password": "t1t2t3a5" }))
        .send()
        .await
        .ok()?;
    let value: Value = response.json().await.ok()?;
    let token = value.get("jwt").and_then(Value::as_str)?;

    let type_url = format!("http://{ip}/api/type?token={token}");
    let response = client.get(&type_url).send().await.ok()?;
    let value: Value = response.json().await.ok()?;
    value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_owned)
}
