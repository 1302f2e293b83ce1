use std::collections::BTreeMap;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header snapshot persisted with each log entry: lowercase name to the list
/// of values in arrival order.
pub type HeaderSnapshot = BTreeMap<String, Vec<String>>;

/// Append-only record of one forwarded attempt. `credential_id` is 0 when the
/// attempt failed before a credential was selected; `status` is 0 on transport
/// failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLogEntry {
    #[serde(default)]
    pub id: i64,
    pub time: DateTime<Utc>,
    pub credential_id: i64,
    pub method: String,
    /// URL as received from the client, not the rewritten upstream URL.
    pub url: String,
    #[serde(default)]
    pub req_headers: HeaderSnapshot,
    #[serde(default, with = "body_bytes")]
    pub req_body: Vec<u8>,
    #[serde(default)]
    pub req_size: i64,
    #[serde(default)]
    pub resp_headers: HeaderSnapshot,
    #[serde(default, with = "body_bytes")]
    pub resp_body: Vec<u8>,
    #[serde(default)]
    pub resp_size: i64,
    pub status: i64,
    pub duration_ms: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Collapse a `HeaderMap` into the persisted snapshot shape. Values that are
/// not valid UTF-8 are replaced lossily; bodies carry the exact bytes, header
/// values in practice never do.
pub fn snapshot_headers(headers: &HeaderMap) -> HeaderSnapshot {
    let mut snap = HeaderSnapshot::new();
    for (name, value) in headers {
        snap.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    snap
}

/// Bodies are stored as raw bytes in the database but rendered as (lossy)
/// strings in admin JSON, matching what log browsers expect.
mod body_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(de)?.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn snapshot_preserves_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", HeaderValue::from_static("a"));
        headers.append("x-tag", HeaderValue::from_static("b"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let snap = snapshot_headers(&headers);
        assert_eq!(snap["x-tag"], vec!["a", "b"]);
        assert_eq!(snap["content-type"], vec!["application/json"]);
    }
}
