//! The two secret spaces of the window protocol.
//!
//! ## Host token, v1
//! ```text
//! v1.<32 lowercase hex chars>     (16 random bytes)
//! ```
//! Minted by the host when a window registers. The window presents it in the
//! `token` field of every request it sends to the host.
//!
//! ## Child token
//! ```text
//! <session prefix>.<connect secret>
//! ```
//! Issued by the window process (`NL_TOKEN` in the announce message). The host
//! presents the whole token as `accessToken` on every call into the window,
//! and the connect secret alone as `?connectToken=` when opening its socket.
//! A token without a `.` is all secret.
//!
//! The two spaces are never compared against each other: a `HostToken` only
//! ever authenticates inbound requests, a `ChildToken` only outbound calls.

use std::fmt;

use data_encoding::HEXLOWER;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

const HOST_TOKEN_V1: &str = "v1";
const HOST_TOKEN_BYTES: usize = 16;

/// Host-issued secret that authenticates requests coming from a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostToken(String);

impl HostToken {
    /// Mint a fresh random v1 token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; HOST_TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        Self(format!("{HOST_TOKEN_V1}.{}", HEXLOWER.encode(&bytes)))
    }

    /// Parse a token presented by a window. Only v1 is understood.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        let (version, body) = s
            .split_once('.')
            .ok_or_else(|| ProtoError::InvalidToken("missing version".into()))?;
        if version != HOST_TOKEN_V1 {
            return Err(ProtoError::InvalidToken(format!(
                "unsupported host token version: {version}"
            )));
        }
        let bytes = HEXLOWER
            .decode(body.as_bytes())
            .map_err(|e| ProtoError::InvalidToken(format!("bad host token body: {e}")))?;
        if bytes.len() != HOST_TOKEN_BYTES {
            return Err(ProtoError::InvalidToken(format!(
                "host token body is {} bytes (expected {HOST_TOKEN_BYTES})",
                bytes.len()
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for HostToken {
    type Error = ProtoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<HostToken> for String {
    fn from(token: HostToken) -> Self {
        token.0
    }
}

/// Window-issued secret the host must present when calling into the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildToken {
    raw: String,
    secret_start: usize,
}

impl ChildToken {
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        if raw.is_empty() {
            return Err(ProtoError::InvalidToken("empty child token".into()));
        }
        let secret_start = raw.rfind('.').map(|i| i + 1).unwrap_or(0);
        if secret_start == raw.len() {
            return Err(ProtoError::InvalidToken(
                "child token has an empty connect secret".into(),
            ));
        }
        Ok(Self {
            raw: raw.to_string(),
            secret_start,
        })
    }

    /// The full token, sent as `accessToken`.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The part after the last `.`, sent as `connectToken` when connecting.
    pub fn connect_secret(&self) -> &str {
        &self.raw[self.secret_start..]
    }
}

impl fmt::Display for ChildToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_host_token_parses() {
        let token = HostToken::generate();
        assert!(token.as_str().starts_with("v1."));
        assert_eq!(token.as_str().len(), 3 + 32);
        assert_eq!(HostToken::parse(token.as_str()).unwrap(), token);
    }

    #[test]
    fn generated_host_tokens_differ() {
        let a = HostToken::generate();
        let b = HostToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn host_token_rejects_other_versions() {
        let err = HostToken::parse("v2.00112233445566778899aabbccddeeff").unwrap_err();
        assert!(err.to_string().contains("unsupported host token version"));
    }

    #[test]
    fn host_token_rejects_garbage() {
        assert!(HostToken::parse("bogus").is_err());
        assert!(HostToken::parse("v1.zz").is_err());
        assert!(HostToken::parse("v1.0011").is_err());
        assert!(HostToken::parse("").is_err());
    }

    #[test]
    fn host_token_serde_is_a_plain_string() {
        let token = HostToken::generate();
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json, serde_json::Value::String(token.to_string()));
        let rt: HostToken = serde_json::from_value(json).unwrap();
        assert_eq!(rt, token);
        assert!(serde_json::from_str::<HostToken>("\"nope\"").is_err());
    }

    #[test]
    fn child_token_secret_is_last_segment() {
        let token = ChildToken::parse("abc.def.ghi").unwrap();
        assert_eq!(token.as_str(), "abc.def.ghi");
        assert_eq!(token.connect_secret(), "ghi");
    }

    #[test]
    fn child_token_without_dot_is_all_secret() {
        let token = ChildToken::parse("s3cret").unwrap();
        assert_eq!(token.connect_secret(), "s3cret");
    }

    #[test]
    fn child_token_rejects_empty_parts() {
        assert!(ChildToken::parse("").is_err());
        assert!(ChildToken::parse("prefix.").is_err());
    }
}
