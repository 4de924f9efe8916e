//! Field-contract accessors over parsed JSON responses.
//!
//! The query service returns semi-structured JSON; every field this crate
//! consumes goes through one of these accessors so that absent, null, and
//! wrongly-typed values stay distinguishable at the call site.

use serde_json::Value;
use tracing::debug;

use crate::GlacierDbError;

/// Field values that must never appear literally in logs.
const REDACTED_KEYS: [&str; 3] = ["token", "masterToken", "sessionToken"];

/// Outcome of a field access that did not produce a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldError {
    /// Key absent from the object.
    Missing,
    /// Key present, value is JSON null.
    Null,
    /// Key present, value has an unexpected type.
    WrongType,
    /// Allocation failed while growing the destination.
    Oom,
}

impl FieldError {
    /// Human-readable description, prefixed with what was being read.
    pub fn describe(self, what: &str) -> String {
        let reason = match self {
            Self::Missing => "item missing from response",
            Self::Null => "item is null",
            Self::WrongType => "item has unexpected type",
            Self::Oom => "ran out of memory copying item",
        };
        format!("{what}: {reason}")
    }

    pub(crate) fn into_error(self, what: &str) -> GlacierDbError {
        match self {
            Self::Oom => GlacierDbError::OutOfMemory(self.describe(what)),
            _ => GlacierDbError::BadJson(self.describe(what)),
        }
    }
}

fn log_copied(key: &str, value: &str) {
    if REDACTED_KEYS.contains(&key) {
        debug!("response field {key}: ******");
    } else {
        debug!("response field {key}: {value}");
    }
}

/// Copies a string field into a growable destination, replacing any prior
/// value.
pub fn copy_string(dest: &mut String, data: &Value, key: &str) -> Result<(), FieldError> {
    let text = string_field(data, key)?;
    dest.clear();
    dest.try_reserve(text.len()).map_err(|_| FieldError::Oom)?;
    dest.push_str(text);
    log_copied(key, dest);
    Ok(())
}

/// Copies a string field into a bounded destination. A source longer than
/// `max_len` bytes is truncated silently at a character boundary; truncation
/// is not an error.
pub fn copy_string_bounded(
    dest: &mut String,
    data: &Value,
    key: &str,
    max_len: usize,
) -> Result<(), FieldError> {
    let text = string_field(data, key)?;
    let mut end = text.len().min(max_len);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    dest.clear();
    dest.try_reserve(end).map_err(|_| FieldError::Oom)?;
    dest.push_str(&text[..end]);
    log_copied(key, dest);
    Ok(())
}

/// Reads a boolean field.
pub fn copy_bool(data: &Value, key: &str) -> Result<bool, FieldError> {
    let item = item(data, key)?;
    let value = item.as_bool().ok_or(FieldError::WrongType)?;
    debug!("response field {key}: {value}");
    Ok(value)
}

/// Reads a numeric field, narrowed to a 64-bit integer.
pub fn copy_int(data: &Value, key: &str) -> Result<i64, FieldError> {
    let item = item(data, key)?;
    let number = item.as_number().ok_or(FieldError::WrongType)?;
    let value = match number.as_i64() {
        Some(value) => value,
        None => number.as_f64().ok_or(FieldError::WrongType)? as i64,
    };
    debug!("response field {key}: {value}");
    Ok(value)
}

/// Detaches an array field from an object, transferring ownership to the
/// caller. The parent keeps the field on any contract violation.
pub fn detach_array(data: &mut Value, key: &str) -> Result<Value, FieldError> {
    let item = item(data, key)?;
    if !item.is_array() {
        return Err(FieldError::WrongType);
    }
    debug!("detached array {key}");
    let object = data.as_object_mut().ok_or(FieldError::WrongType)?;
    object.remove(key).ok_or(FieldError::Missing)
}

/// Detaches the element at `index` from an array, transferring ownership to
/// the caller. The element must itself be an array or an object.
pub fn detach_from_array(data: &mut Value, index: usize) -> Result<Value, FieldError> {
    let items = data.as_array_mut().ok_or(FieldError::WrongType)?;
    let element = items.get(index).ok_or(FieldError::Missing)?;
    if element.is_null() {
        return Err(FieldError::Null);
    }
    if !element.is_array() && !element.is_object() {
        return Err(FieldError::WrongType);
    }
    debug!("detached element at index {index}");
    Ok(items.remove(index))
}

/// Returns an object's keys in original JSON encounter order, or `None` when
/// the value is not an object.
pub fn object_keys(data: &Value) -> Option<Vec<String>> {
    data.as_object()
        .map(|object| object.keys().cloned().collect())
}

fn item<'a>(data: &'a Value, key: &str) -> Result<&'a Value, FieldError> {
    let item = data.get(key).ok_or(FieldError::Missing)?;
    if item.is_null() {
        return Err(FieldError::Null);
    }
    Ok(item)
}

fn string_field<'a>(data: &'a Value, key: &str) -> Result<&'a str, FieldError> {
    item(data, key)?.as_str().ok_or(FieldError::WrongType)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        copy_bool, copy_int, copy_string, copy_string_bounded, detach_array, detach_from_array,
        object_keys, FieldError,
    };

    #[test]
    fn null_field_is_null_not_missing() {
        let data = json!({ "code": null });
        let mut dest = String::new();
        assert_eq!(
            copy_string(&mut dest, &data, "code"),
            Err(FieldError::Null)
        );
    }

    #[test]
    fn absent_field_is_missing() {
        let data = json!({});
        let mut dest = String::new();
        assert_eq!(
            copy_string(&mut dest, &data, "code"),
            Err(FieldError::Missing)
        );
    }

    #[test]
    fn bool_accessor_on_string_is_wrong_type() {
        let data = json!({ "success": "true" });
        assert_eq!(copy_bool(&data, "success"), Err(FieldError::WrongType));
    }

    #[test]
    fn copy_string_replaces_prior_value() {
        let data = json!({ "token": "new-token" });
        let mut dest = "old-token".to_owned();
        copy_string(&mut dest, &data, "token").expect("must copy");
        assert_eq!(dest, "new-token");
    }

    #[test]
    fn bounded_copy_truncates_silently() {
        let data = json!({ "code": "390112EXTRA" });
        let mut dest = String::new();
        copy_string_bounded(&mut dest, &data, "code", 6).expect("must copy");
        assert_eq!(dest, "390112");
    }

    #[test]
    fn bounded_copy_respects_char_boundaries() {
        let data = json!({ "name": "héllo" });
        let mut dest = String::new();
        copy_string_bounded(&mut dest, &data, "name", 2).expect("must copy");
        assert_eq!(dest, "h");
    }

    #[test]
    fn copy_int_narrows_fractional_numbers() {
        let data = json!({ "total": 41.9 });
        assert_eq!(copy_int(&data, "total"), Ok(41));
    }

    #[test]
    fn detach_array_transfers_ownership() {
        let mut data = json!({ "rowset": [1, 2, 3], "other": true });
        let detached = detach_array(&mut data, "rowset").expect("must detach");
        assert_eq!(detached, json!([1, 2, 3]));
        assert!(data.get("rowset").is_none());
        assert!(data.get("other").is_some());
    }

    #[test]
    fn detach_array_rejects_non_array_without_removing() {
        let mut data = json!({ "rowset": "not-an-array" });
        assert_eq!(
            detach_array(&mut data, "rowset"),
            Err(FieldError::WrongType)
        );
        assert!(data.get("rowset").is_some());
    }

    #[test]
    fn detach_from_array_by_index() {
        let mut data = json!([["a"], { "b": 1 }, "scalar"]);
        let first = detach_from_array(&mut data, 0).expect("must detach array");
        assert_eq!(first, json!(["a"]));
        // After removal the object shifts to index 0.
        let object = detach_from_array(&mut data, 0).expect("must detach object");
        assert_eq!(object, json!({ "b": 1 }));
        assert_eq!(detach_from_array(&mut data, 0), Err(FieldError::WrongType));
        assert_eq!(detach_from_array(&mut data, 9), Err(FieldError::Missing));
    }

    #[test]
    fn object_keys_preserve_encounter_order() {
        let data = serde_json::from_str::<serde_json::Value>(
            r#"{ "zeta": 1, "alpha": 2, "mid": 3 }"#,
        )
        .expect("must parse");
        assert_eq!(
            object_keys(&data),
            Some(vec![
                "zeta".to_owned(),
                "alpha".to_owned(),
                "mid".to_owned()
            ])
        );
        assert_eq!(object_keys(&serde_json::json!([1])), None);
    }

    #[test]
    fn describe_names_the_field() {
        assert_eq!(
            FieldError::Missing.describe("query code"),
            "query code: item missing from response"
        );
    }
}
