//! Validation Utilities
//!
//! Pure validation logic for item identity and input bindings.
//! No IO dependencies.

use crate::error::{ModelError, Result};

/// Maximum length of a derived output id
pub const MAX_OUTPUT_ID_LEN: usize = 200;

/// Identifiers that must never be used as keys or path segments
pub const FORBIDDEN_KEYS: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// Check whether a key is one of [`FORBIDDEN_KEYS`]
pub fn is_forbidden_key(key: &str) -> bool {
    FORBIDDEN_KEYS.contains(&key)
}

/// Validate a relative, dot-separated path such as `power.total_kw`
///
/// Rules:
/// - Non-empty, at most 200 characters
/// - Segments separated by `.`, none of them empty
/// - Segment characters: alphanumeric, underscore (_), hyphen (-)
/// - No forbidden segment names
///
/// # Examples
/// ```
/// use voltage_model::validate_output_id;
///
/// assert!(validate_output_id("power.total").is_ok());
/// assert!(validate_output_id("grid-01.import_kw").is_ok());
/// assert!(validate_output_id("").is_err());
/// assert!(validate_output_id("a..b").is_err());
/// assert!(validate_output_id("../etc").is_err());
/// assert!(validate_output_id("a.__proto__").is_err());
/// ```
pub fn validate_output_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(ModelError::output_id(id, "output id cannot be empty"));
    }
    if id.len() > MAX_OUTPUT_ID_LEN {
        return Err(ModelError::output_id(
            id,
            format!(
                "too long ({} characters, maximum {})",
                id.len(),
                MAX_OUTPUT_ID_LEN
            ),
        ));
    }

    for segment in id.split('.') {
        validate_path_token(segment).map_err(|reason| ModelError::output_id(id, reason))?;
    }

    Ok(())
}

fn validate_path_token(segment: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err("empty path segment".to_string());
    }
    if is_forbidden_key(segment) {
        return Err(format!("segment '{}' is not allowed", segment));
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(format!(
            "segment '{}' may only contain letters, numbers, underscores and hyphens",
            segment
        ));
    }
    Ok(())
}

/// Build the output id from `group` and `targetId`
///
/// Both parts are trimmed. An empty group yields the bare target id.
pub fn build_output_id(group: &str, target_id: &str) -> Result<String> {
    let group = group.trim();
    let target = target_id.trim();
    if target.is_empty() {
        return Err(ModelError::output_id(
            format!("{}.", group),
            "targetId cannot be empty",
        ));
    }

    let id = if group.is_empty() {
        target.to_string()
    } else {
        format!("{}.{}", group, target)
    };
    validate_output_id(&id)?;
    Ok(id)
}

/// Reduce an input key to `[A-Za-z0-9_]` and reject forbidden names
///
/// # Examples
/// ```
/// use voltage_model::sanitize_input_key;
///
/// assert_eq!(sanitize_input_key("grid power").unwrap(), "gridpower");
/// assert_eq!(sanitize_input_key("soc_1").unwrap(), "soc_1");
/// assert!(sanitize_input_key("__proto__").is_err());
/// assert!(sanitize_input_key("-+-").is_err());
/// ```
pub fn sanitize_input_key(raw: &str) -> Result<String> {
    let key: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if key.is_empty() {
        return Err(ModelError::input_key(
            raw,
            "key is empty after removing unsupported characters",
        ));
    }
    if is_forbidden_key(&key) {
        return Err(ModelError::input_key(raw, "reserved identifier"));
    }
    Ok(key)
}
