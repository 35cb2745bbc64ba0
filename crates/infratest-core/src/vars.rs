//! Typed input variables and their command-line encoding.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A module input variable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    StringList(Vec<String>),
}

/// Variables keyed by name. Ordered, so the generated argument list is stable.
pub type Variables = BTreeMap<String, VarValue>;

impl VarValue {
    /// Render as the literal the tool expects on the right-hand side of `-var name=...`.
    ///
    /// Primitives are passed bare; lists use HCL tuple syntax with quoted,
    /// escaped elements.
    pub fn to_hcl(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            VarValue::Integer(n) => n.to_string(),
            VarValue::Boolean(b) => b.to_string(),
            VarValue::StringList(items) => {
                let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
                format!("[{}]", quoted.join(", "))
            }
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hcl())
    }
}

fn quote(s: &str) -> String {
    // JSON string escaping is a subset of what HCL accepts.
    serde_json::Value::String(s.to_string()).to_string()
}

/// `-var name=value` pairs for every variable, in name order.
pub fn var_args(vars: &Variables) -> Vec<String> {
    let mut args = Vec::with_capacity(vars.len() * 2);
    for (name, value) in vars {
        args.push("-var".to_string());
        args.push(format!("{}={}", name, value.to_hcl()));
    }
    args
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::String(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::String(s)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        VarValue::Integer(n)
    }
}

impl From<i32> for VarValue {
    fn from(n: i32) -> Self {
        VarValue::Integer(n.into())
    }
}

impl From<u32> for VarValue {
    fn from(n: u32) -> Self {
        VarValue::Integer(n.into())
    }
}

impl From<bool> for VarValue {
    fn from(b: bool) -> Self {
        VarValue::Boolean(b)
    }
}

impl From<Vec<String>> for VarValue {
    fn from(items: Vec<String>) -> Self {
        VarValue::StringList(items)
    }
}

impl From<Vec<&str>> for VarValue {
    fn from(items: Vec<&str>) -> Self {
        VarValue::StringList(items.into_iter().map(str::to_string).collect())
    }
}
