//! Reading and asserting module outputs.
//!
//! Assertion helpers are plain checks: they are never retried and a failure
//! is a test failure, not a reason to run the lifecycle again.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};
use crate::lifecycle::LifecycleResult;

/// A scalar output by name, as text. Numbers and booleans use their JSON form.
pub fn get_scalar(result: &LifecycleResult, name: &str) -> HarnessResult<String> {
    let value = lookup(result, name)?;
    scalar_text(value).ok_or_else(|| {
        HarnessError::unexpected(format!("output `{name}` is not a scalar: {value}"))
    })
}

/// A list output by name, each element as text.
pub fn get_list(result: &LifecycleResult, name: &str) -> HarnessResult<Vec<String>> {
    match lookup(result, name)? {
        Value::Array(items) => Ok(items.iter().map(element_text).collect()),
        other => Err(HarnessError::unexpected(format!(
            "output `{name}` is not a list: {other}"
        ))),
    }
}

/// A map output by name, each value as text.
pub fn get_map(result: &LifecycleResult, name: &str) -> HarnessResult<BTreeMap<String, String>> {
    match lookup(result, name)? {
        Value::Object(entries) => Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), element_text(v)))
            .collect()),
        other => Err(HarnessError::unexpected(format!(
            "output `{name}` is not a map: {other}"
        ))),
    }
}

fn lookup<'a>(result: &'a LifecycleResult, name: &str) -> HarnessResult<&'a Value> {
    result
        .outputs
        .get(name)
        .ok_or_else(|| HarnessError::MissingOutput {
            name: name.to_string(),
            available: result.outputs.keys().cloned().collect(),
        })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => Some(String::new()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn element_text(value: &Value) -> String {
    scalar_text(value).unwrap_or_else(|| value.to_string())
}

/// Values that can be checked for emptiness.
pub trait IsEmpty {
    fn is_empty_value(&self) -> bool;
}

impl IsEmpty for str {
    fn is_empty_value(&self) -> bool {
        self.trim().is_empty()
    }
}

impl IsEmpty for String {
    fn is_empty_value(&self) -> bool {
        self.as_str().is_empty_value()
    }
}

impl<T> IsEmpty for [T] {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty_value(&self) -> bool {
        self.is_empty()
    }
}

/// Fails unless `value` is non-empty (whitespace-only strings count as empty).
pub fn assert_non_empty<V: IsEmpty + Debug + ?Sized>(value: &V, what: &str) -> HarnessResult<()> {
    if value.is_empty_value() {
        return Err(HarnessError::unexpected(format!(
            "{what} should not be empty, got {value:?}"
        )));
    }
    Ok(())
}

/// Fails unless `items` has exactly `expected` elements.
pub fn assert_count<T: Debug>(items: &[T], expected: usize, what: &str) -> HarnessResult<()> {
    if items.len() != expected {
        return Err(HarnessError::unexpected(format!(
            "{what}: expected {expected} item(s), got {}: {items:?}",
            items.len()
        )));
    }
    Ok(())
}

impl LifecycleResult {
    /// See [`get_scalar`].
    pub fn scalar(&self, name: &str) -> HarnessResult<String> {
        get_scalar(self, name)
    }

    /// See [`get_list`].
    pub fn list(&self, name: &str) -> HarnessResult<Vec<String>> {
        get_list(self, name)
    }

    /// See [`get_map`].
    pub fn map(&self, name: &str) -> HarnessResult<BTreeMap<String, String>> {
        get_map(self, name)
    }
}
