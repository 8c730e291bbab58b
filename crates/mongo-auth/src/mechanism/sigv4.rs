//! AWS Signature Version 4 for the STS `GetCallerIdentity` request MONGODB-AWS presents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::credential::Password;
use crate::digest::hex;
use crate::error::AuthErrorKind;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "sts";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_HOST: &str = "sts.amazonaws.com";
const BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The two values the server forwards to STS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedRequest {
    /// `Authorization` header value.
    pub authorization: String,
    /// `X-Amz-Date` header value.
    pub timestamp: String,
}

/// Signing inputs for one request.
pub(crate) struct SigningInput<'a> {
    pub now: DateTime<Utc>,
    pub access_key_id: &'a str,
    pub secret_access_key: &'a Password,
    pub session_token: Option<&'a str>,
    pub server_nonce: &'a [u8],
    pub host: &'a str,
}

/// Region encoded in an STS host name.
pub(crate) fn region(host: &str) -> &str {
    if host == DEFAULT_HOST {
        return DEFAULT_REGION;
    }
    match host.split('.').nth(1) {
        Some(label) if !label.is_empty() => label,
        _ => DEFAULT_REGION,
    }
}

/// Sign `POST /` with the `GetCallerIdentity` body.
pub(crate) fn sign(input: &SigningInput<'_>) -> Result<SignedRequest, AuthErrorKind> {
    let timestamp = input.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = input.now.format("%Y%m%d").to_string();
    let region = region(input.host);

    let mut headers: Vec<(&str, String)> = vec![
        ("content-length", BODY.len().to_string()),
        ("content-type", CONTENT_TYPE.to_owned()),
        ("host", input.host.to_owned()),
        ("x-amz-date", timestamp.clone()),
        ("x-mongodb-gs2-cb-flag", "n".to_owned()),
        ("x-mongodb-server-nonce", BASE64.encode(input.server_nonce)),
    ];
    if let Some(token) = input.session_token {
        headers.push(("x-amz-security-token", token.to_owned()));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let canonical_request = format!(
        "POST\n/\n\n{canonical_headers}\n{signed_headers}\n{}",
        hex(&Sha256::digest(BODY.as_bytes()))
    );

    let scope = format!("{date}/{region}/{SERVICE}/aws4_request");
    let string_to_sign = format!(
        "{ALGORITHM}\n{timestamp}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(input.secret_access_key, &date, region, SERVICE)?;
    let signature = hex(&hmac(&key, string_to_sign.as_bytes())?);

    Ok(SignedRequest {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            input.access_key_id
        ),
        timestamp,
    })
}

/// `kSigning`: the secret key chained through date, region and service.
pub(crate) fn signing_key(
    secret: &Password,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Zeroizing<Vec<u8>>, AuthErrorKind> {
    let seed = secret.expose(|plain| Zeroizing::new(format!("AWS4{plain}")));
    let k_date = Zeroizing::new(hmac(seed.as_bytes(), date.as_bytes())?);
    let k_region = Zeroizing::new(hmac(&k_date, region.as_bytes())?);
    let k_service = Zeroizing::new(hmac(&k_region, service.as_bytes())?);
    Ok(Zeroizing::new(hmac(&k_service, b"aws4_request")?))
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AuthErrorKind> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| AuthErrorKind::Credentials(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
