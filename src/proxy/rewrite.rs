//! Per-credential-kind request rewriting: upstream base, path, auth and
//! tenant headers, and the `store`/`include` body fields.

use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::{Credential, CredentialKind};

pub const TENANT_HEADER: &str = "chatgpt-account-id";

/// Everything the attempt loop needs to send one upstream request.
pub struct RewritePlan {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Build the outgoing request for one attempt. `default_api_base` backs
/// `static_key` credentials without a `base_url`; `chatgpt_base` is the fixed
/// upstream for `interactive_login`.
pub fn plan(
    cred: &Credential,
    default_api_base: &str,
    chatgpt_base: &str,
    path: &str,
    query: Option<&str>,
    client_headers: &HeaderMap,
    body: &[u8],
) -> Result<RewritePlan, AppError> {
    let mut headers = client_headers.clone();
    // The client addressed us; reqwest derives host and length from the
    // rewritten URL and body.
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);

    let (base, path, body) = match &cred.kind {
        CredentialKind::StaticKey { secret, base_url } => {
            headers.insert(AUTHORIZATION, bearer(secret)?);
            headers.remove(TENANT_HEADER);
            let base = base_url.as_deref().unwrap_or(default_api_base);
            (base, path.to_string(), rewrite_body(body, &cred.kind))
        }
        CredentialKind::InteractiveLogin {
            access_token,
            tenant_id,
            ..
        } => {
            headers.insert(AUTHORIZATION, bearer(access_token)?);
            match tenant_id.as_deref().filter(|t| !t.is_empty()) {
                Some(tenant) => {
                    let value = HeaderValue::from_str(tenant)
                        .map_err(|e| AppError::BadInput(e.to_string()))?;
                    headers.insert(TENANT_HEADER, value);
                }
                None => {
                    headers.remove(TENANT_HEADER);
                }
            }
            let path = path.strip_prefix("/v1").unwrap_or(path).to_string();
            (chatgpt_base, path, rewrite_body(body, &cred.kind))
        }
    };

    let mut url = format!("{}{}", base.trim_end_matches('/'), path);
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }

    Ok(RewritePlan { url, headers, body })
}

fn bearer(token: &str) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AppError::BadInput(e.to_string()))
}

/// Normalize the `store` and `include` fields for the credential kind. Only
/// bodies that parse as a JSON object are touched; anything else is forwarded
/// verbatim, a parse failure is not an error.
fn rewrite_body(body: &[u8], kind: &CredentialKind) -> Bytes {
    if body.is_empty() {
        return Bytes::copy_from_slice(body);
    }
    let Ok(Value::Object(mut map)) = serde_json::from_slice::<Value>(body) else {
        return Bytes::copy_from_slice(body);
    };

    match kind {
        CredentialKind::StaticKey { .. } => {
            map.insert("store".into(), Value::Bool(true));
            map.remove("include");
        }
        CredentialKind::InteractiveLogin { .. } => {
            map.insert("store".into(), Value::Bool(false));
            map.insert(
                "include".into(),
                Value::Array(vec![Value::String("reasoning.encrypted_content".into())]),
            );
        }
    }

    serde_json::to_vec(&Value::Object(map))
        .map(Bytes::from)
        .unwrap_or_else(|_| Bytes::copy_from_slice(body))
}
