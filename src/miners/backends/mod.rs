pub mod antminer;
pub mod braiins;
pub mod btminer;
pub mod espminer;
pub mod luxos;
pub mod traits;
pub mod unknown;

pub use traits::{GetMinerData, Miner, PowerControl};

use std::collections::HashMap;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use macaddr::MacAddr;
use serde_json::Value;

use crate::data::hashrate::HashRate;
use crate::data::pool::PoolData;
use crate::miners::data::DataField;

/// Seconds since the epoch, stamped onto every assembled report.
pub(crate) fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Failed to get system time")
        .as_secs()
}

/// Numeric coercion that tolerates firmwares which quote their numbers,
/// e.g. `"GHS 5s": "13501.23"`.
pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn string_field(data: &HashMap<DataField, &Value>, field: DataField) -> Option<String> {
    data.get(&field).and_then(|v| v.as_str()).map(str::to_owned)
}

pub(crate) fn f64_field(data: &HashMap<DataField, &Value>, field: DataField) -> Option<f64> {
    data.get(&field).and_then(|v| value_as_f64(v))
}

pub(crate) fn u64_field(data: &HashMap<DataField, &Value>, field: DataField) -> Option<u64> {
    data.get(&field).and_then(|v| v.as_u64())
}

pub(crate) fn bool_field(data: &HashMap<DataField, &Value>, field: DataField) -> Option<bool> {
    data.get(&field).and_then(|v| v.as_bool())
}

pub(crate) fn mac_field(data: &HashMap<DataField, &Value>, field: DataField) -> Option<MacAddr> {
    string_field(data, field).and_then(|s| MacAddr::from_str(s.trim()).ok())
}

/// Normalize a cgminer-style POOLS array into pool entries.
pub(crate) fn pools_from_value(value: &Value) -> Vec<PoolData> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .map(|entry| PoolData {
            position: entry.get("POOL").and_then(Value::as_u64).map(|v| v as u16),
            url: entry.get("URL").and_then(Value::as_str).map(str::to_owned),
            user: entry.get("User").and_then(Value::as_str).map(str::to_owned),
            alive: entry
                .get("Status")
                .and_then(Value::as_str)
                .map(|s| s == "Alive"),
            active: entry.get("Stratum Active").and_then(Value::as_bool),
            accepted_shares: entry.get("Accepted").and_then(Value::as_u64),
            rejected_shares: entry.get("Rejected").and_then(Value::as_u64),
        })
        .collect()
}

/// Efficiency in joules per terahash, from a device-native hashrate.
pub(crate) fn efficiency_j_per_th(watts: f64, hashrate: &HashRate) -> Option<f64> {
    let terahash = hashrate.as_terahashes();
    (terahash > 0.0).then(|| watts / terahash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::hashrate::HashRateUnit;
    use serde_json::json;

    #[test]
    fn coerces_quoted_numbers() {
        assert_eq!(value_as_f64(&json!(13.5)), Some(13.5));
        assert_eq!(value_as_f64(&json!("13501.23")), Some(13501.23));
        assert_eq!(value_as_f64(&json!(" 42 ")), Some(42.0));
        assert_eq!(value_as_f64(&json!("fast")), None);
    }

    #[test]
    fn parses_cgminer_pools() {
        let value = json!([
            {
                "POOL": 0,
                "URL": "stratum+tcp://pool.example:3333",
                "User": "worker.1",
                "Status": "Alive",
                "Stratum Active": true,
                "Accepted": 1200,
                "Rejected": 3
            },
            {"POOL": 1, "URL": "stratum+tcp://backup.example:3333", "Status": "Dead"}
        ]);

        let pools = pools_from_value(&value);
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].position, Some(0));
        assert_eq!(pools[0].alive, Some(true));
        assert_eq!(pools[0].accepted_shares, Some(1200));
        assert_eq!(pools[1].alive, Some(false));
        assert_eq!(pools[1].user, None);
    }

    #[test]
    fn efficiency_normalizes_units() {
        let mhs = HashRate {
            value: 100_000_000.0,
            unit: HashRateUnit::MegaHash,
            algo: String::from("SHA256"),
        };
        // 100 TH/s at 3400 W is 34 J/TH.
        assert_eq!(efficiency_j_per_th(3400.0, &mhs), Some(34.0));

        let idle = HashRate {
            value: 0.0,
            unit: HashRateUnit::TeraHash,
            algo: String::from("SHA256"),
        };
        assert_eq!(efficiency_j_per_th(3400.0, &idle), None);
    }
}
