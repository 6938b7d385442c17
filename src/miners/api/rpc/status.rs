//! Result-code checking for cgminer-family responses.

use std::net::IpAddr;

use serde_json::Value;

use crate::error::{Error, Result};

/// Inspect the STATUS section of a decoded response and surface an error
/// reply as [`Error::Command`].
///
/// Two layouts are in the wild: the classic cgminer
/// `{"STATUS":[{"STATUS":"E","Msg":...}]}` and the flattened
/// `{"STATUS":"E","Msg":...}` some BTMiner builds use. A response with no
/// STATUS section at all is passed through untouched, since several web
/// firmwares proxy the socket commands without one.
pub fn check_status(ip: IpAddr, command: &str, value: Value) -> Result<Value> {
    let flag = value
        .pointer("/STATUS/0/STATUS")
        .and_then(Value::as_str)
        .or_else(|| value.get("STATUS").and_then(Value::as_str));

    match flag {
        Some(flag) if flag.eq_ignore_ascii_case("E") => {
            let msg = value
                .pointer("/STATUS/0/Msg")
                .and_then(Value::as_str)
                .or_else(|| value.get("Msg").and_then(Value::as_str))
                .unwrap_or("device reported an error");
            Err(Error::command(ip, command, msg))
        }
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ip() -> IpAddr {
        "10.0.0.7".parse().unwrap()
    }

    #[test]
    fn passes_successful_response_through() {
        let value = json!({"STATUS": [{"STATUS": "S", "Msg": "Summary"}], "SUMMARY": []});
        let out = check_status(ip(), "summary", value.clone()).unwrap();
        assert_eq!(out, value);
    }

    #[test]
    fn surfaces_cgminer_error_reply() {
        let value = json!({"STATUS": [{"STATUS": "E", "Msg": "Invalid command"}]});
        let err = check_status(ip(), "bogus", value).unwrap_err();
        assert!(err.to_string().contains("Invalid command"));
    }

    #[test]
    fn surfaces_flattened_error_reply() {
        let value = json!({"STATUS": "E", "Code": 14, "Msg": "invalid cmd"});
        let err = check_status(ip(), "summary", value).unwrap_err();
        assert!(err.to_string().contains("invalid cmd"));
    }

    #[test]
    fn tolerates_missing_status_section() {
        let value = json!({"model": "DG1+"});
        assert!(check_status(ip(), "system_info", value).is_ok());
    }
}
