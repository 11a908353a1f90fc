//! Shared URL/form parsing and JSON response helpers for route handlers.

use serde::Serialize;
use serde_json::json;

/// Parse URL-encoded form body into key-value pairs.
/// Handles `key=value&key2=value2` format (from POST bodies).
pub fn parse_form_body(body: &str) -> Vec<(String, String)> {
    if body.is_empty() {
        return Vec::new();
    }
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            let val = parts.next().unwrap_or("");
            Some((percent_decode(key), percent_decode(val)))
        })
        .collect()
}

/// Percent-decode a URL-encoded value. Multi-byte UTF-8 sequences are
/// reassembled; invalid sequences become U+FFFD.
pub fn percent_decode(input: &str) -> String {
    let mut bytes = Vec::with_capacity(input.len());
    let mut iter = input.bytes();
    while let Some(b) = iter.next() {
        match b {
            b'%' => {
                let hi = iter.next();
                let lo = iter.next();
                match (hi, lo) {
                    (Some(hi), Some(lo)) => match (hex_value(hi), hex_value(lo)) {
                        (Some(h), Some(l)) => bytes.push(h << 4 | l),
                        _ => bytes.extend_from_slice(&[b'%', hi, lo]),
                    },
                    (Some(hi), None) => bytes.extend_from_slice(&[b'%', hi]),
                    _ => bytes.push(b'%'),
                }
            }
            b'+' => bytes.push(b' '),
            _ => bytes.push(b),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// Parse a query string into key-value pairs.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    let q = query.strip_prefix('?').unwrap_or(query);
    parse_form_body(q)
}

/// Helper to get a value by key from a list of key-value pairs.
pub fn get_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

pub fn get_usize(params: &[(String, String)], key: &str) -> Option<usize> {
    get_param(params, key)?.trim().parse().ok()
}

/// Serialize a response body.
pub fn json_ok<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| json_error(&e.to_string()))
}

pub fn json_error(message: &str) -> String {
    json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_form_body_works() {
        let pairs = parse_form_body("action=swap&trainer=0&slot=2&to=4");
        assert_eq!(pairs.len(), 4);
        assert_eq!(get_param(&pairs, "action"), Some("swap"));
        assert_eq!(get_usize(&pairs, "slot"), Some(2));
        assert_eq!(get_usize(&pairs, "action"), None);
    }

    #[test]
    fn parse_form_body_empty() {
        let pairs = parse_form_body("");
        assert!(pairs.is_empty());
    }

    #[test]
    fn percent_decode_plus_as_space() {
        assert_eq!(percent_decode("Team+Rocket"), "Team Rocket");
    }

    #[test]
    fn percent_decode_hex() {
        assert_eq!(percent_decode("%7B%22hp%22%3A5%7D"), r#"{"hp":5}"#);
    }

    #[test]
    fn percent_decode_utf8() {
        assert_eq!(percent_decode("Flab%C3%A9b%C3%A9"), "Flabébé");
    }

    #[test]
    fn percent_decode_keeps_bad_escapes() {
        assert_eq!(percent_decode("100%zz"), "100%zz");
        assert_eq!(percent_decode("50%"), "50%");
    }

    #[test]
    fn parse_query_strips_prefix() {
        let pairs = parse_query("?trainer=1");
        assert_eq!(get_usize(&pairs, "trainer"), Some(1));
    }

    #[test]
    fn error_body_is_json() {
        let body: serde_json::Value = serde_json::from_str(&json_error("nope")).unwrap();
        assert_eq!(body["error"], "nope");
    }
}
