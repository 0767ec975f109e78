//! Type-tagged values.
//!
//! A tagged value is an object carrying its variant name in a `type` field.
//! `Null` has the implicit tag [`NULL`].

use crate::error::{Error, Result};
use crate::tree::Value;

/// Tag matched by a `Null` value.
pub const NULL: &str = "NULL";

/// Field that carries the tag.
pub const TYPE_FIELD: &str = "type";

/// Copy of `payload` with its `type` field set to `tag`.
pub fn tag_type(tag: &Value, payload: &Value) -> Result<Value> {
    let tag = tag
        .as_str()
        .ok_or_else(|| Error::Declaration("First argument must be a string".into()))?;
    if !payload.is_object() {
        return Err(Error::Declaration("Second argument must be an object".into()));
    }
    Ok(payload.with_field(TYPE_FIELD, Value::from(tag)))
}

/// Whether `value` is tagged with `tag`.
pub fn check_type(tag: &Value, value: &Value) -> Result<bool> {
    let tag = tag
        .as_str()
        .ok_or_else(|| Error::Declaration("First argument must be a string".into()))?;
    if value.is_null() {
        return Err(Error::Declaration("Bad second argument".into()));
    }
    Ok(value.field(TYPE_FIELD).as_str() == Some(tag))
}

/// Tag of `value`: [`NULL`] for `Null`, the `type` field otherwise.
pub fn type_of(value: &Value) -> Option<String> {
    if value.is_null() {
        return Some(NULL.to_string());
    }
    value.field(TYPE_FIELD).as_str().map(str::to_string)
}

/// Dispatch on the tag of `value`.
///
/// Falls back to `default` when no arm matches.
pub fn match_type<R>(
    value: &Value,
    arms: &[(&str, &dyn Fn(&Value) -> R)],
    default: Option<&dyn Fn(&Value) -> R>,
) -> Result<R> {
    let tag = type_of(value);
    let arm = arms
        .iter()
        .find(|(name, _)| tag.as_deref() == Some(*name))
        .map(|(_, arm)| *arm);
    match arm.or(default) {
        Some(arm) => Ok(arm(value)),
        None => Err(Error::PatternMatch(tag.unwrap_or_else(|| "untagged value".into()))),
    }
}
