//! Identification over the web channel.
//!
//! Fetch the landing page, fingerprint what came back and run a token
//! ladder over it. Two cases need an extra request: Antminer realms hide
//! Hammer rebadges, and the DG-series vendors ship the same OEM login
//! panel.

use std::net::IpAddr;
use std::time::Duration;

use diqwest::WithDigestAuth;
use reqwest::Client;
use reqwest::header::WWW_AUTHENTICATE;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::miners::factory::{MinerType, ProbeHit};

/// What one landing-page fetch tells us about a device.
#[derive(Debug, Clone)]
pub(crate) struct WebFingerprint {
    /// Final HTTP status after redirects.
    pub status: u16,
    /// WWW-Authenticate header, when the page is behind HTTP auth.
    pub realm: Option<String>,
    /// URL the request landed on after redirects.
    pub final_url: Url,
    /// Response body.
    pub body: String,
}

/// A fingerprint match, possibly needing a follow-up request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WebDetection {
    Typed(MinerType),
    /// Shared DG-series OEM panel; the vendors behind it are told apart by
    /// their reported model prefix.
    DgFamily,
}

/// Probe the web channel. `None` means no HTTP server answered on either
/// scheme; an untyped hit means a server answered but nothing matched.
pub(crate) async fn probe(ip: IpAddr, timeout: Duration) -> Option<ProbeHit> {
    let client = Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(timeout)
        .build()
        .ok()?;

    // Most firmwares serve plain HTTP; a few only answer TLS.
    let fingerprint = match fetch(&client, &format!("http://{ip}/")).await {
        Some(fp) => fp,
        None => fetch(&client, &format!("https://{ip}/")).await?,
    };
    debug!(%ip, status = fingerprint.status, "web probe fingerprint");

    match classify_fingerprint(&fingerprint) {
        Some(WebDetection::Typed(MinerType::Antminer)) => Some(ProbeHit {
            miner_type: Some(antminer_or_hammer(&client, ip).await),
        }),
        Some(WebDetection::Typed(miner_type)) => Some(ProbeHit {
            miner_type: Some(miner_type),
        }),
        Some(WebDetection::DgFamily) => Some(ProbeHit {
            miner_type: Some(dg_family(&client, ip).await),
        }),
        None => Some(ProbeHit { miner_type: None }),
    }
}

async fn fetch(client: &Client, url: &str) -> Option<WebFingerprint> {
    let response = client.get(url).send().await.ok()?;
    let status = response.status().as_u16();
    let realm = response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let final_url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    Some(WebFingerprint {
        status,
        realm,
        final_url,
        body,
    })
}

/// Pure token ladder over one fingerprint. Firmware tokens run before
/// vendor tokens for the same reason the socket ladder orders them: forks
/// keep the original vendor's strings around.
pub(crate) fn classify_fingerprint(fp: &WebFingerprint) -> Option<WebDetection> {
    let realm = fp.realm.as_deref().unwrap_or("").to_uppercase();
    let body = fp.body.to_uppercase();
    let path = fp.final_url.path().to_uppercase();

    if realm.contains("ANTMINER") {
        return Some(WebDetection::Typed(MinerType::Antminer));
    }
    if body.contains("HIVEON") {
        return Some(WebDetection::Typed(MinerType::Hiveon));
    }
    if body.contains("BRAIINS") || body.contains("BOSMINER") {
        return Some(WebDetection::Typed(MinerType::BraiinsOs));
    }
    if body.contains("VNISH") || body.contains("ANTHILL") {
        return Some(WebDetection::Typed(MinerType::Vnish));
    }
    if body.contains("AXEOS") {
        return Some(WebDetection::Typed(MinerType::Bitaxe));
    }
    if body.contains("EPIC") {
        return Some(WebDetection::Typed(MinerType::Epic));
    }
    if body.contains("WHATSMINER") || body.contains("BTMINER") {
        return Some(WebDetection::Typed(MinerType::Whatsminer));
    }
    if body.contains("LUXOS") {
        return Some(WebDetection::Typed(MinerType::LuxOs));
    }
    if body.contains("AVALON") {
        return Some(WebDetection::Typed(MinerType::AvalonMiner));
    }
    if body.contains("GOLDSHELL") {
        return Some(WebDetection::Typed(MinerType::Goldshell));
    }
    if body.contains("AURADINE") {
        return Some(WebDetection::Typed(MinerType::Auradine));
    }
    if body.contains("MARATHON") || body.contains("MARAFW") {
        return Some(WebDetection::Typed(MinerType::Marathon));
    }
    if body.contains("ICERIVER") {
        return Some(WebDetection::Typed(MinerType::IceRiver));
    }
    if body.contains("INNOSILICON") {
        return Some(WebDetection::Typed(MinerType::Innosilicon));
    }
    if body.contains("VOLCMINER") {
        return Some(WebDetection::Typed(MinerType::VolcMiner));
    }
    if body.contains("ELPHAPEX") {
        return Some(WebDetection::Typed(MinerType::ElphaPex));
    }
    if path.ends_with("/USER/LOGIN") {
        return Some(WebDetection::DgFamily);
    }
    None
}

/// Hammer machines answer with the Antminer digest realm; only the system
/// info tells them apart.
async fn antminer_or_hammer(client: &Client, ip: IpAddr) -> MinerType {
    let url = format!("http://{ip}/cgi-bin/get_system_info.cgi");
    let minertype = async {
        let response = client
            .get(&url)
            .send_with_digest_auth("root", "root")
            .await
            .ok()?;
        let value: Value = response.json().await.ok()?;
        value
            .get("minertype")
            .and_then(Value::as_str)
            .map(str::to_uppercase)
    }
    .await;

    match minertype {
        Some(model) if model.contains("HAMMER") => MinerType::Hammer,
        _ => MinerType::Antminer,
    }
}

/// Both DG-series vendors serve the same panel; ElphaPex machines report
/// DG-prefixed models, the rest are VolcMiner.
async fn dg_family(client: &Client, ip: IpAddr) -> MinerType {
    let url = format!("http://{ip}/user/system_info");
    let model = async {
        let response = client.get(&url).send().await.ok()?;
        let value: Value = response.json().await.ok()?;
        value
            .get("model")
            .and_then(Value::as_str)
            .map(str::to_uppercase)
    }
    .await;

    match model {
        Some(model) if model.starts_with("DG") => MinerType::ElphaPex,
        _ => MinerType::VolcMiner,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(realm: Option<&str>, final_url: &str, body: &str) -> WebFingerprint {
        WebFingerprint {
            status: 200,
            realm: realm.map(str::to_owned),
            final_url: final_url.parse().unwrap(),
            body: body.to_owned(),
        }
    }

    #[test]
    fn antminer_realm_wins_over_body() {
        let fp = fingerprint(
            Some("Digest realm=\"antMiner Configuration\""),
            "http://10.0.0.2/",
            "<html></html>",
        );
        assert_eq!(
            classify_fingerprint(&fp),
            Some(WebDetection::Typed(MinerType::Antminer))
        );
    }

    #[test]
    fn firmware_tokens_beat_vendor_tokens() {
        // A Braiins OS dashboard still mentions the Antminer hardware.
        let fp = fingerprint(
            None,
            "http://10.0.0.2/",
            "<title>Braiins OS</title> running on Antminer S19",
        );
        assert_eq!(
            classify_fingerprint(&fp),
            Some(WebDetection::Typed(MinerType::BraiinsOs))
        );
    }

    #[test]
    fn axeos_dashboard_is_a_bitaxe() {
        let fp = fingerprint(None, "http://10.0.0.3/", "<title>AxeOS</title>");
        assert_eq!(
            classify_fingerprint(&fp),
            Some(WebDetection::Typed(MinerType::Bitaxe))
        );
    }

    #[test]
    fn shared_dg_login_panel_needs_a_recheck() {
        let fp = fingerprint(None, "http://10.0.0.4/user/login", "<html>sign in</html>");
        assert_eq!(classify_fingerprint(&fp), Some(WebDetection::DgFamily));
    }

    #[test]
    fn unmatched_page_is_untyped() {
        let fp = fingerprint(None, "http://10.0.0.5/", "<html>hello world</html>");
        assert_eq!(classify_fingerprint(&fp), None);
    }
}
