//! Request target description

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// HTTP method of the request under test
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            other => Err(format!("unsupported HTTP method: {}", other)),
        }
    }
}

/// Everything an executor needs to issue one request.
///
/// GET parameters are appended to the query string; for every other method
/// they travel as a JSON object body.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Absolute target URL (http or https)
    pub url: String,

    /// Request method
    #[serde(default)]
    pub method: HttpMethod,

    /// Query parameters (GET) or JSON body fields (other methods)
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RequestSpec {
    /// GET request without parameters or headers
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// URL actually requested, with GET parameters folded into the query
    pub fn target_url(&self) -> String {
        if self.method != HttpMethod::Get || self.params.is_empty() {
            return self.url.clone();
        }

        let query = self
            .params
            .iter()
            .map(|(key, value)| format!("{}={}", key, render_param(value)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }

    /// JSON body for non-GET methods, if any parameters were given
    pub fn json_body(&self) -> Option<serde_json::Value> {
        if self.method == HttpMethod::Get || self.params.is_empty() {
            return None;
        }
        let object = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        Some(serde_json::Value::Object(object))
    }
}

fn render_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
