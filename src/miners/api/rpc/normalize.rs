//! Repairs for the known classes of malformed JSON the socket channel
//! returns.
//!
//! Firmware forks of the cgminer API ship with distinct, well documented
//! encoding bugs. The repairs below run in a fixed order and are safe to
//! apply to a payload that does not exhibit the bug they target, so every
//! payload goes through all of them before decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

/// Bare `inf`/`nan` tokens, as emitted for overflowed rate fields. Word
/// boundaries keep substrings like "info" or "nonce" intact.
static NON_FINITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:inf|nan)\b").unwrap());

/// An `error_code` dict written with list brackets, e.g.
/// `"error_code":["2010":"fan lost"]`. Matched only when the bracketed body
/// holds key/value pairs; a genuine list of codes is left alone.
static LIST_SHAPED_ERROR_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""error_code":\[([^\[\]]*:[^\[\]]*)\]"#).unwrap());

/// Normalize a raw socket payload into best-effort parseable JSON text.
pub fn normalize_payload(data: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(data).into_owned();

    // Some firmware NUL-terminates the response.
    if text.ends_with('\0') {
        text.truncate(text.len() - 1);
    }

    // Trailing comma before a closing brace.
    text = text.replace(",}", "}");

    // Stray newlines in the middle of the document.
    text = text.replace('\n', "");

    // Missing comma between adjacent objects or arrays.
    text = text.replace("}{", "},{");
    text = text.replace("][", "],[");
    text = text.replace("]{", "],{");
    text = text.replace("}[", "},[");

    // 2023-era BTMiner summaries drop the comma ahead of this field.
    text = text.replace("]\"factory_ghs\"", "],\"factory_ghs\"");

    // Overflowed rate fields come back as bare inf/nan tokens.
    text = NON_FINITE.replace_all(&text, "0").into_owned();

    // A leading stray comma where the opening brace should be.
    if text.starts_with(',') {
        text = format!("{{{}", &text[1..]);
    }

    // A response truncated mid-record: drop the unfinished fragment and
    // re-close the document.
    if !text.is_empty() && !text.ends_with('}') {
        if let Some((head, _)) = text.rsplit_once(',') {
            text = head.to_owned();
        }
        text.push('}');
    }

    // One vendor writes the error_code dict with list brackets.
    text = LIST_SHAPED_ERROR_CODE
        .replace_all(&text, "\"error_code\":{$1}")
        .into_owned();

    text
}

/// Normalize and decode a raw socket payload.
///
/// A payload that still fails to parse after every repair decodes to an
/// empty object: downstream extraction then reports every field as absent,
/// which is the contract for unreadable devices.
pub fn load_rpc_payload(data: &[u8]) -> Value {
    let text = normalize_payload(data);
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, bytes = data.len(), "socket payload unreadable after repair");
            Value::Object(serde_json::Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(raw: &[u8]) -> Value {
        let text = normalize_payload(raw);
        serde_json::from_str(&text).expect("normalized payload should parse")
    }

    #[test]
    fn strips_trailing_nul_terminator() {
        let value = parsed(b"{\"STATUS\":\"S\"}\0");
        assert_eq!(value, json!({"STATUS": "S"}));
    }

    #[test]
    fn collapses_trailing_comma() {
        let value = parsed(br#"{"Elapsed":123,}"#);
        assert_eq!(value, json!({"Elapsed": 123}));
    }

    #[test]
    fn strips_embedded_newlines() {
        let value = parsed(b"{\"Type\":\n\"Antminer S19\"}");
        assert_eq!(value, json!({"Type": "Antminer S19"}));
    }

    #[test]
    fn inserts_comma_between_adjacent_objects() {
        let value = parsed(br#"{"POOLS":[{"POOL":0}{"POOL":1}]}"#);
        assert_eq!(value, json!({"POOLS": [{"POOL": 0}, {"POOL": 1}]}));
    }

    #[test]
    fn repairs_factory_ghs_missing_comma() {
        let value = parsed(br#"{"ghs":[1,2]"factory_ghs":[3,4]}"#);
        assert_eq!(value, json!({"ghs": [1, 2], "factory_ghs": [3, 4]}));
    }

    #[test]
    fn replaces_non_finite_tokens_without_touching_words() {
        let value = parsed(br#"{"MHS av":inf,"info":"x","Temp":nan}"#);
        assert_eq!(value, json!({"MHS av": 0, "info": "x", "Temp": 0}));
    }

    #[test]
    fn rewraps_leading_stray_comma() {
        let value = parsed(br#","Elapsed":5}"#);
        assert_eq!(value, json!({"Elapsed": 5}));
    }

    #[test]
    fn recloses_truncated_payload() {
        let value = parsed(br#"{"Elapsed":5,"MHS av":13.2,"Temp"#);
        assert_eq!(value, json!({"Elapsed": 5, "MHS av": 13.2}));
    }

    #[test]
    fn rewrites_list_shaped_error_code_dict() {
        let value = parsed(br#"{"error_code":["2010":"fan lost"]}"#);
        assert_eq!(value, json!({"error_code": {"2010": "fan lost"}}));
    }

    #[test]
    fn leaves_genuine_error_code_lists_alone() {
        let value = parsed(br#"{"error_code":[2010,2030]}"#);
        assert_eq!(value, json!({"error_code": [2010, 2030]}));
    }

    #[test]
    fn repairs_stack() {
        let raw = b"{\"SUMMARY\":[{\"MHS av\":nan}{\"MHS av\":12.0,}],\n\"id\":1}\0";
        let value = parsed(raw);
        assert_eq!(
            value,
            json!({"SUMMARY": [{"MHS av": 0}, {"MHS av": 12.0}], "id": 1})
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = br#"{"POOLS":[{"POOL":0}{"POOL":1}],"rate":inf,"#;
        let once = normalize_payload(raw);
        let twice = normalize_payload(once.as_bytes());
        assert_eq!(once, twice);
    }

    #[test]
    fn unreadable_payload_degrades_to_empty_object() {
        let value = load_rpc_payload(b"\x01\x02 not json at all");
        assert_eq!(value, Value::Object(serde_json::Map::new()));
    }
}
