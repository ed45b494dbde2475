//! # Core Request/Response Types
//!
//! Data structures that flow through the request pipeline: the verb, the
//! caller-facing request options, and the wire-level request/response pair
//! exchanged with the transport.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::{ClientError, ClientResult};

/// HTTP verbs understood by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
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

    /// Whether responses to this verb are cached unless the caller says otherwise
    pub fn caches_by_default(&self) -> bool {
        matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            _ => Err(ClientError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl TryFrom<&str> for Method {
    type Error = ClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// What the caller wants sent: verb, extra headers and an optional JSON body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
}

impl Default for Method {
    fn default() -> Self {
        Self::Get
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A fully resolved request handed to interceptors and then to the transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingRequest {
    /// Endpoint as given by the caller, used for metrics and logging
    pub endpoint: String,
    pub method: Method,
    /// Absolute URL (endpoint joined with the configured base URL)
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// 1-based attempt number, bumped on every retry
    pub attempt: u32,
}

impl OutgoingRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status, headers and body returned by one transport exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Convenience constructor for a JSON response
    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert("content-type".to_string(), "application/json".to_string());
        response
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON. Empty bodies decode as `null`.
    pub fn json_value(&self) -> ClientResult<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
        assert_eq!(
            "BREW".parse::<Method>().unwrap_err(),
            ClientError::UnsupportedMethod { method: "BREW".to_string() }
        );
    }

    #[test]
    fn test_default_caching_by_verb() {
        assert!(Method::Get.caches_by_default());
        assert!(!Method::Post.caches_by_default());
        assert!(!Method::Delete.caches_by_default());
    }

    #[test]
    fn test_response_json_decoding() {
        let response = TransportResponse::json(200, &json!({"id": 7}));
        assert!(response.is_success());
        assert_eq!(response.json_value().unwrap(), json!({"id": 7}));

        let empty = TransportResponse::new(204, Bytes::new());
        assert_eq!(empty.json_value().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let request = OutgoingRequest {
            endpoint: "/a".into(),
            method: Method::Get,
            url: "http://localhost/a".into(),
            headers: HashMap::from([("Authorization".to_string(), "Bearer x".to_string())]),
            body: None,
            attempt: 1,
        };
        assert_eq!(request.header("authorization"), Some("Bearer x"));
        assert_eq!(request.header("x-missing"), None);
    }
}
