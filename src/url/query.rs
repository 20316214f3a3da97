use std::borrow::Cow;
use std::collections::BTreeMap;

/// Query keys that carry per-visitor session identifiers
const SESSION_ID_KEYS: &[&str] = &["jsessionid", "phpsessid", "aspsessionid"];

/// Canonicalizes a raw query string
///
/// Pairs are split on `&` and `=`, percent-decoded, sorted by key and
/// re-encoded per RFC 3986: only `A-Z a-z 0-9 - . _ ~` stay literal, so a
/// literal `+` becomes `%2B`, `*` becomes `%2A` and `~` is never escaped.
/// When a key repeats, its last value wins. Keys without a value are
/// written without `=`.
///
/// # Arguments
///
/// * `query` - The raw query string, without the leading `?`
/// * `strip_session_ids` - Drop `jsessionid`, `phpsessid` and `aspsessionid` keys
///
/// # Returns
///
/// * `Some(String)` - The canonical query
/// * `None` - Nothing remains after canonicalization
pub fn canonicalize_query(query: &str, strip_session_ids: bool) -> Option<String> {
    let mut params: BTreeMap<String, String> = BTreeMap::new();

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);

        if key.is_empty() && value.is_empty() {
            continue;
        }

        if strip_session_ids && is_session_id(&key) {
            continue;
        }

        params.insert(key, value);
    }

    if params.is_empty() {
        return None;
    }

    let encoded: Vec<String> = params
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                urlencoding::encode(key).into_owned()
            } else {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            }
        })
        .collect();

    Some(encoded.join("&"))
}

/// Percent-decodes one query component, leaving `+` untouched
fn decode_component(raw: &str) -> String {
    match urlencoding::decode(raw) {
        Ok(decoded) => decoded.into_owned(),
        // Not UTF-8 once decoded; keep what we can
        Err(_) => match urlencoding::decode_binary(raw.as_bytes()) {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        },
    }
}

fn is_session_id(key: &str) -> bool {
    SESSION_ID_KEYS
        .iter()
        .any(|session| key.eq_ignore_ascii_case(session))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorts_and_skips_empty_pairs() {
        assert_eq!(
            canonicalize_query("&c=d&e=f&a=b", true),
            Some("a=b&c=d&e=f".to_string())
        );
    }

    #[test]
    fn test_rfc3986_special_characters() {
        assert_eq!(
            canonicalize_query("q=a+b*c~d", true),
            Some("q=a%2Bb%2Ac~d".to_string())
        );
        assert_eq!(
            canonicalize_query("q=hello%20world", true),
            Some("q=hello%20world".to_string())
        );
    }

    #[test]
    fn test_last_duplicate_wins() {
        assert_eq!(canonicalize_query("a=1&a=2", true), Some("a=2".to_string()));
    }

    #[test]
    fn test_key_without_value() {
        assert_eq!(
            canonicalize_query("flag&b=2&empty=", true),
            Some("b=2&empty&flag".to_string())
        );
    }

    #[test]
    fn test_session_ids_stripped_case_insensitively() {
        assert_eq!(
            canonicalize_query("JSESSIONID=abc&page=2&PhpSessId=x&aspsessionid=y", true),
            Some("page=2".to_string())
        );
        assert_eq!(
            canonicalize_query("jsessionid=abc&page=2", false),
            Some("jsessionid=abc&page=2".to_string())
        );
    }

    #[test]
    fn test_only_session_ids_yields_none() {
        assert_eq!(canonicalize_query("jsessionid=abc", true), None);
        assert_eq!(canonicalize_query("&&", true), None);
    }

    #[test]
    fn test_canonical_form_is_stable() {
        let once = canonicalize_query("z=%7e&y=a b&x=%zz", true).unwrap();
        let twice = canonicalize_query(&once, true).unwrap();
        assert_eq!(once, twice);
    }
}
