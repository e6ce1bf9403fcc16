use serde::Deserialize;

/// Username that accepts any credential pair.
pub const WILDCARD_USERNAME: &str = "*";

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub username: String,
    pub password: String,
}

/// Returns true when `username`/`password` is allowed by `accounts`.
///
/// A wildcard (`*`) account admits every pair, otherwise both fields must match exactly.
pub fn accounts_accept(accounts: &[Account], username: &str, password: &str) -> bool {
    accounts.iter().any(|account| {
        account.username == WILDCARD_USERNAME
            || (account.username == username && account.password == password)
    })
}

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    File,
    Json,
    String,
}

/// Canned HTTP response. `value` is a path for `file`, the body otherwise; a TOML table
/// given for `json` is re-encoded as JSON.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ResponseSpec {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub value: Option<toml::Value>,
}

impl ResponseSpec {
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            None => None,
            Some(toml::Value::String(s)) => Some(s.clone()),
            Some(other) => serde_json::to_string(other).ok(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct RequestSimulator {
    pub uri: String,
    #[serde(default)]
    pub method: Option<String>,
    pub response: ResponseSpec,
}
