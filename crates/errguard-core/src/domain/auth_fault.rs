//! Authentication / token fault classification
//!
//! Token handling fails in a small number of recognisable ways. This
//! classifier buckets those faults, in order:
//!
//! 1. token validation phrases
//! 2. expiration (`expired`, `exp claim`)
//! 3. decode / base64 failures
//! 4. refresh failures (`refresh`, `401`, `unauthorized`)
//! 5. network (`network`, `fetch`, `timeout`)
//! 6. anything else
//!
//! The order matters: "refresh token expired" is an expiration, not a
//! refresh failure.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use super::classification::Severity;

/// Bucket of an authentication fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFaultKind {
    Validation,
    Expiration,
    Decode,
    RefreshFailure,
    Network,
    Unknown,
}

impl AuthFaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFaultKind::Validation => "validation",
            AuthFaultKind::Expiration => "expiration",
            AuthFaultKind::Decode => "decode",
            AuthFaultKind::RefreshFailure => "refresh_failure",
            AuthFaultKind::Network => "network",
            AuthFaultKind::Unknown => "unknown",
        }
    }

    /// Severity lookup keyed by bucket
    pub fn severity(&self) -> Severity {
        match self {
            AuthFaultKind::RefreshFailure => Severity::Critical,
            AuthFaultKind::Validation | AuthFaultKind::Decode => Severity::High,
            AuthFaultKind::Expiration | AuthFaultKind::Network => Severity::Medium,
            AuthFaultKind::Unknown => Severity::Medium,
        }
    }

    /// Whether the session can recover without signing in again
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AuthFaultKind::Expiration | AuthFaultKind::Network)
    }

    /// Short user-facing hint for the recovery screen
    pub fn user_hint(&self) -> &'static str {
        match self {
            AuthFaultKind::Validation => "Your session could not be verified. Please sign in again.",
            AuthFaultKind::Expiration => "Your session has expired. Refreshing your session...",
            AuthFaultKind::Decode => "Your session data is corrupted. Please sign in again.",
            AuthFaultKind::RefreshFailure => "We could not renew your session. Please sign in again.",
            AuthFaultKind::Network => "Connection problem. Check your network and try again.",
            AuthFaultKind::Unknown => "An authentication error occurred. Please try again.",
        }
    }
}

impl Display for AuthFaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`classify_auth_fault`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClassification {
    pub kind: AuthFaultKind,
    pub severity: Severity,
    pub recoverable: bool,
}

const AUTH_RULES: &[(AuthFaultKind, &[&str])] = &[
    (
        AuthFaultKind::Validation,
        &[
            "invalid token",
            "token validation",
            "invalid signature",
            "signature verification",
            "malformed token",
            "jwt malformed",
        ],
    ),
    (AuthFaultKind::Expiration, &["expired", "exp claim"]),
    (
        AuthFaultKind::Decode,
        &["decode", "base64", "invalid character", "parse token"],
    ),
    (
        AuthFaultKind::RefreshFailure,
        &["refresh", "401", "unauthorized"],
    ),
    (AuthFaultKind::Network, &["network", "fetch", "timeout"]),
];

/// Classifies an authentication/token fault message
pub fn classify_auth_fault(message: &str) -> AuthClassification {
    let lowered = message.to_lowercase();
    let kind = AUTH_RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lowered.contains(p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(AuthFaultKind::Unknown);

    AuthClassification {
        kind,
        severity: kind.severity(),
        recoverable: kind.is_recoverable(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_in_order() {
        assert_eq!(
            classify_auth_fault("Invalid token signature").kind,
            AuthFaultKind::Validation
        );
        assert_eq!(
            classify_auth_fault("jwt expired").kind,
            AuthFaultKind::Expiration
        );
        assert_eq!(
            classify_auth_fault("Failed to decode base64 payload").kind,
            AuthFaultKind::Decode
        );
        assert_eq!(
            classify_auth_fault("Request failed with status 401").kind,
            AuthFaultKind::RefreshFailure
        );
        assert_eq!(
            classify_auth_fault("Network request timeout").kind,
            AuthFaultKind::Network
        );
        assert_eq!(classify_auth_fault("???").kind, AuthFaultKind::Unknown);
    }

    #[test]
    fn test_expiration_precedes_refresh() {
        let c = classify_auth_fault("Refresh token expired");
        assert_eq!(c.kind, AuthFaultKind::Expiration);
        assert!(c.recoverable);
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(
            classify_auth_fault("unauthorized").severity,
            Severity::Critical
        );
        assert_eq!(classify_auth_fault("invalid token").severity, Severity::High);
        assert_eq!(classify_auth_fault("exp claim failed").severity, Severity::Medium);
        assert_eq!(classify_auth_fault("fetch failed").severity, Severity::Medium);
    }

    #[test]
    fn test_refresh_failure_not_recoverable() {
        let c = classify_auth_fault("token refresh rejected");
        assert_eq!(c.kind, AuthFaultKind::RefreshFailure);
        assert!(!c.recoverable);
        assert!(c.kind.user_hint().contains("sign in"));
    }
}
