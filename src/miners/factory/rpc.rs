//! Identification over the socket API.
//!
//! One combined `devdetails+version` request draws out a vendor token from
//! almost every firmware, including the ones that answer it with an error.
//! BTMiner builds ignore it entirely, so a `get_version` follow-up covers
//! them.

use std::net::IpAddr;
use std::time::Duration;

use serde_json::Value;

use crate::miners::api::rpc::RpcApiClient;
use crate::miners::factory::{MinerType, ProbeHit};

/// Probe the socket channel. `None` means nothing answered on the port;
/// an untyped hit means something spoke JSON but carried no known token.
pub(crate) async fn probe(ip: IpAddr, timeout: Duration) -> Option<ProbeHit> {
    let client = RpcApiClient::new(ip).with_timeout(timeout).with_retries(0);

    let first = client.send_raw_command("devdetails+version").await.ok()?;
    if let Some(miner_type) = classify_response(&first) {
        return Some(ProbeHit {
            miner_type: Some(miner_type),
        });
    }

    if let Ok(second) = client.send_raw_command("get_version").await {
        if let Some(miner_type) = classify_response(&second) {
            return Some(ProbeHit {
                miner_type: Some(miner_type),
            });
        }
    }

    Some(ProbeHit { miner_type: None })
}

/// Whether the reply carries an actual DEVDETAILS section, as opposed to
/// merely erroring on the command. Stock Antminer firmware is the family
/// that reports its name but cannot answer devdetails.
fn devdetails_present(value: &Value) -> bool {
    value.pointer("/devdetails/0/DEVDETAILS").is_some() || value.get("DEVDETAILS").is_some()
}

/// Token scan over a decoded identification reply.
///
/// Order matters: aftermarket firmware keeps the hardware vendor's strings
/// in version output, so firmware tokens are checked before vendor tokens.
pub(crate) fn classify_response(value: &Value) -> Option<MinerType> {
    let text = value.to_string().to_uppercase();

    if text.contains("BOSMINER") || text.contains("BOSER") {
        return Some(MinerType::BraiinsOs);
    }
    if text.contains("BTMINER") || text.contains("MICROBT") || text.contains("WHATSMINER") {
        return Some(MinerType::Whatsminer);
    }
    if text.contains("VNISH") {
        return Some(MinerType::Vnish);
    }
    if text.contains("HIVEON") {
        return Some(MinerType::Hiveon);
    }
    if text.contains("LUXMINER") || text.contains("LUXOS") {
        return Some(MinerType::LuxOs);
    }
    if text.contains("ANTMINER") && !devdetails_present(value) {
        return Some(MinerType::Antminer);
    }
    if text.contains("AVALON") {
        return Some(MinerType::AvalonMiner);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_bosminer_version() {
        let reply = json!({
            "devdetails": [{"STATUS": [{"STATUS": "S"}], "DEVDETAILS": [{"Model": "Antminer S19"}]}],
            "version": [{"VERSION": [{"BOSminer": "0.2.0-d360818", "API": "3.7"}]}]
        });
        assert_eq!(classify_response(&reply), Some(MinerType::BraiinsOs));
    }

    #[test]
    fn recognizes_btminer_from_error_description() {
        let reply = json!({"STATUS": "E", "Code": 14, "Msg": "invalid cmd", "Description": "btminer"});
        assert_eq!(classify_response(&reply), Some(MinerType::Whatsminer));
    }

    #[test]
    fn stock_antminer_names_itself_but_lacks_devdetails() {
        let reply = json!({
            "devdetails": [{"STATUS": [{"STATUS": "E", "Msg": "invalid cmd"}], "id": 1}],
            "version": [{"VERSION": [{"Type": "Antminer S19", "API": "3.1", "CompileTime": "..."}], "id": 1}]
        });
        assert_eq!(classify_response(&reply), Some(MinerType::Antminer));
    }

    #[test]
    fn working_devdetails_rules_out_stock_antminer() {
        // Hiveon keeps the Antminer model strings but answers devdetails.
        let reply = json!({
            "devdetails": [{"DEVDETAILS": [{"Model": "Antminer S19 Hiveon"}]}],
            "version": [{"VERSION": [{"Type": "Antminer S19 Hiveon"}]}]
        });
        assert_eq!(classify_response(&reply), Some(MinerType::Hiveon));
    }

    #[test]
    fn recognizes_avalon_and_luxos() {
        let avalon = json!({"version": [{"VERSION": [{"PROD": "AvalonMiner 1246-90"}]}]});
        assert_eq!(classify_response(&avalon), Some(MinerType::AvalonMiner));

        let luxos = json!({"version": [{"VERSION": [{"LUXminer": "2023.5.10", "Type": "Antminer S19"}]}]});
        assert_eq!(classify_response(&luxos), Some(MinerType::LuxOs));
    }

    #[test]
    fn unrecognized_reply_stays_untyped() {
        let reply = json!({"STATUS": [{"STATUS": "S", "Msg": "cgminer 4.10"}]});
        assert_eq!(classify_response(&reply), None);
    }
}
