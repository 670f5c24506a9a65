/// Identity normalization.
///
/// Identities reach the service in several shapes: a bare UUID string, a
/// wrapped form such as `ObjectId("…")` or `Uuid('…')`, a JSON object string,
/// or an object carrying the value under `$oid`, `$uuid`, `_id` or `id`.
/// Every comparison of two identities goes through [`canonical_id`] first.
use serde_json::Value;
use uuid::Uuid;

/// Keys checked, in order, when the identity arrives as an object.
const ID_KEYS: &[&str] = &["$oid", "$uuid", "_id", "id"];

/// Strings that some clients emit in place of a missing identity.
const PLACEHOLDERS: &[&str] = &["[object Object]", "null", "undefined"];

/// Maximum wrapper/object nesting followed before giving up.
const MAX_DEPTH: usize = 4;

/// Canonical string form of a native identity.
pub fn canonical_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

/// Normalize any supported identity representation.
///
/// Returns `None` for empty, falsy or otherwise unresolvable input; callers
/// must treat `None` as "matches nothing".
pub fn canonical_id(value: &Value) -> Option<String> {
    canonical_value(value, 0)
}

/// Normalize an identity that arrived as a string.
pub fn canonical_id_str(raw: &str) -> Option<String> {
    canonical_str(raw, 0)
}

/// True only when both sides resolve and resolve to the same identity.
pub fn same_identity(a: &str, b: &str) -> bool {
    match (canonical_id_str(a), canonical_id_str(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn canonical_value(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::String(s) => canonical_str(s, depth),
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::Object(map) => ID_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|inner| canonical_value(inner, depth + 1)),
        Value::Null | Value::Bool(_) | Value::Array(_) => None,
    }
}

fn canonical_str(raw: &str, depth: usize) -> Option<String> {
    if depth > MAX_DEPTH {
        return None;
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() || PLACEHOLDERS.contains(&trimmed) {
        return None;
    }

    if let Some(inner) = unwrap_call_syntax(trimmed) {
        return canonical_str(inner, depth + 1);
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
            return canonical_value(&parsed, depth + 1);
        }
    }

    if let Ok(id) = Uuid::parse_str(trimmed) {
        return Some(canonical_uuid(id));
    }

    if trimmed.len() == 24 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(trimmed.to_ascii_lowercase());
    }

    Some(trimmed.to_string())
}

/// `Name("x")`, `Name('x')` or `Name(x)` -> `x`.
fn unwrap_call_syntax(s: &str) -> Option<&str> {
    let open = s.find('(')?;
    if !s.ends_with(')') || open == 0 {
        return None;
    }
    let name = &s[..open];
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let inner = s[open + 1..s.len() - 1].trim();
    let inner = inner
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(inner);
    Some(inner)
}
