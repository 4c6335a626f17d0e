//! Bearer token acquisition for the API backend.
//!
//! The site ships its API client id and secret, base64-encoded, inside a
//! public script bundle. We pull both literals out, decode them, and trade
//! them for a session token. Any mismatch means the bundle format changed, so
//! failures here are reported as [`ChatError::Credential`] and not retried.

use super::ChatError;
use crate::config::ApiConfig;
use crate::http::{self, RequestOptions};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Client id and secret recovered from the script bundle.
#[derive(Debug)]
pub struct ClientCredentials {
    pub key: String,
    pub secret: SecretString,
}

#[derive(Serialize)]
struct AuthRequest<'a> {
    data: AuthRequestData<'a>,
}

#[derive(Serialize)]
struct AuthRequestData<'a> {
    key: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    data: Option<AuthResponseData>,
}

#[derive(Deserialize)]
struct AuthResponseData {
    token: Option<String>,
}

/// Finds `apiClientId:"..",apiClientSecret:".."` in the bundle and decodes both.
pub fn extract_client_credentials(script: &str) -> Result<ClientCredentials, ChatError> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let marker = MARKER.get_or_init(|| {
        Regex::new(r#"apiClientId:"([^"]+)",apiClientSecret:"([^"]+)""#).expect("static regex")
    });

    let captures = marker.captures(script).ok_or_else(|| {
        ChatError::Credential("client id/secret literals not found in script asset".into())
    })?;

    let key = decode_literal(&captures[1], "client id")?;
    let secret = decode_literal(&captures[2], "client secret")?;

    Ok(ClientCredentials {
        key,
        secret: SecretString::from(secret),
    })
}

fn decode_literal(encoded: &str, what: &str) -> Result<String, ChatError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| ChatError::Credential(format!("{what} is not valid base64: {e}")))?;
    String::from_utf8(bytes).map_err(|_| ChatError::Credential(format!("{what} is not UTF-8")))
}

/// Fetches the script asset, extracts the client credentials and exchanges
/// them for a bearer token.
pub async fn obtain_token(
    client: &reqwest::Client,
    api: &ApiConfig,
    timeout: Duration,
) -> Result<SecretString, ChatError> {
    let opts = RequestOptions::new(timeout);

    let script = http::get_text(client, &api.script_asset_url, opts)
        .await
        .map_err(|e| ChatError::Credential(format!("failed to fetch script asset: {e}")))?;
    let credentials = extract_client_credentials(&script)?;
    tracing::debug!(asset = %api.script_asset_url, "Extracted API client credentials");

    let request = AuthRequest {
        data: AuthRequestData {
            key: &credentials.key,
            secret: credentials.secret.expose_secret(),
        },
    };
    let auth_url = format!("{}/auth", api.base_url.trim_end_matches('/'));
    let response: AuthResponse = http::post_json(client, &auth_url, &request, opts)
        .await
        .map_err(|e| ChatError::Credential(format!("token exchange failed: {e}")))?;

    let token = response
        .data
        .and_then(|d| d.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ChatError::Credential("token exchange returned no token".into()))?;

    tracing::info!("Obtained API access token");
    Ok(SecretString::from(token))
}
