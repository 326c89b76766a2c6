//! Redaction of sensitive data
//!
//! [`Sanitizer`] removes personal and secret data from free text, nested
//! JSON context and URLs before anything is persisted or transported.
//!
//! Text patterns are applied in a fixed order: email, credit card, SSN,
//! phone, IP address, credential key/value pairs, long opaque tokens and
//! filesystem paths. Each pattern leaves a placeholder that no later
//! pattern matches, so sanitizing twice yields the same result.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use url::Url;

use errguard_core::config::PrivacyConfig;
use errguard_core::domain::ReportRecord;

pub const EMAIL_PLACEHOLDER: &str = "[EMAIL_REDACTED]";
pub const CARD_PLACEHOLDER: &str = "[CARD_REDACTED]";
pub const SSN_PLACEHOLDER: &str = "[SSN_REDACTED]";
pub const PHONE_PLACEHOLDER: &str = "[PHONE_REDACTED]";
pub const IP_PLACEHOLDER: &str = "[IP_REDACTED]";
pub const TOKEN_PLACEHOLDER: &str = "[TOKEN_REDACTED]";
pub const PATH_PLACEHOLDER: &str = "[PATH_REDACTED]";
pub const URL_PLACEHOLDER: &str = "[URL_REDACTED]";
/// Replacement for values under sensitive keys
pub const REDACTED: &str = "[REDACTED]";
/// Replacement for containers nested deeper than the depth cap
pub const MAX_DEPTH_SENTINEL: &str = "[MAX_DEPTH_EXCEEDED]";

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static CARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{4}[ -]?){3}\d{4}\b|\b\d{15,16}\b").unwrap());

static SSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+\d{1,3}[ -]?)?(?:\(\d{3}\)|\b\d{3})[ -]?\d{3}[ -]\d{4}\b").unwrap()
});

static IPV4: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap());

static BEARER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").unwrap());

static CREDENTIAL_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?P<key>\w*(?:password|passwd|pwd|token|secret|api[_-]?key|auth|authorization|session[_-]?id|cookie))(?P<sep>["']?\s*=\s*["']?|["']?\s*:\s*["'])[^\s"'&,;]+"#,
    )
    .unwrap()
});

static LONG_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z0-9_-]{32,}\b").unwrap());

static WINDOWS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b[A-Za-z]:\\(?:[^\\\s:*?"<>|]+\\)*[^\\\s:*?"<>|]*"#).unwrap()
});

static POSIX_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"/(?:home|Users|usr|var|etc|tmp|opt|root|mnt|private)/[^\s:'",)]*"#).unwrap()
});

/// Words that mark a key as holding a secret
const SENSITIVE_KEY_WORDS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "secret",
    "key",
    "apikey",
    "auth",
    "authorization",
    "session",
    "sessionid",
    "cookie",
    "csrf",
    "xsrf",
    "jwt",
    "bearer",
    "credential",
    "credentials",
    "ssn",
];

/// Query parameters that are always stripped from URLs
const SENSITIVE_QUERY_PARAMS: &[&str] = &["code", "state", "email", "sig", "signature"];

/// Schemes whose host is checked against the allow-list
const NETWORK_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Splits a key into lowercase words on case changes and separators
fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in key.chars() {
        if !ch.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        current.push(ch.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Whether a field name denotes sensitive data (`password`, `apiKey`,
/// `csrf_token`, `X-Auth`...)
pub fn is_sensitive_key(key: &str) -> bool {
    let lowered = key.to_ascii_lowercase();
    if lowered.ends_with("token") {
        return true;
    }
    key_words(key)
        .iter()
        .any(|word| SENSITIVE_KEY_WORDS.contains(&word.as_str()))
}

/// Sanitizer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerConfig {
    /// Hosts (and their subdomains) whose URLs are kept
    pub allowed_hosts: Vec<String>,
    pub redact_paths: bool,
    pub max_depth: usize,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self::from(&PrivacyConfig::default())
    }
}

impl From<&PrivacyConfig> for SanitizerConfig {
    fn from(config: &PrivacyConfig) -> Self {
        Self {
            allowed_hosts: config
                .allowed_hosts
                .iter()
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            redact_paths: config.redact_paths,
            max_depth: config.max_depth,
        }
    }
}

/// Redacts sensitive substrings, fields and URLs
#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
    home_dir: String,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        let home_dir = dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|h| h.len() > 1)
            .unwrap_or_default();
        Self { config, home_dir }
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    /// Redacts sensitive substrings, keeping the surrounding text
    pub fn sanitize_string(&self, input: &str) -> String {
        let mut text = EMAIL.replace_all(input, EMAIL_PLACEHOLDER).into_owned();
        text = CARD.replace_all(&text, CARD_PLACEHOLDER).into_owned();
        text = SSN.replace_all(&text, SSN_PLACEHOLDER).into_owned();
        text = PHONE.replace_all(&text, PHONE_PLACEHOLDER).into_owned();
        text = IPV4.replace_all(&text, IP_PLACEHOLDER).into_owned();
        text = BEARER
            .replace_all(&text, format!("Bearer {TOKEN_PLACEHOLDER}").as_str())
            .into_owned();
        text = CREDENTIAL_PAIR
            .replace_all(&text, |caps: &Captures| {
                format!("{}{}{}", &caps["key"], &caps["sep"], REDACTED)
            })
            .into_owned();
        text = LONG_TOKEN
            .replace_all(&text, |caps: &Captures| {
                let candidate = &caps[0];
                let has_digit = candidate.chars().any(|c| c.is_ascii_digit());
                let has_alpha = candidate.chars().any(|c| c.is_ascii_alphabetic());
                if has_digit && has_alpha {
                    TOKEN_PLACEHOLDER.to_string()
                } else {
                    candidate.to_string()
                }
            })
            .into_owned();

        if self.config.redact_paths {
            if !self.home_dir.is_empty() {
                text = text.replace(&self.home_dir, PATH_PLACEHOLDER);
            }
            text = WINDOWS_PATH.replace_all(&text, PATH_PLACEHOLDER).into_owned();
            text = POSIX_PATH.replace_all(&text, PATH_PLACEHOLDER).into_owned();
        }

        text
    }

    /// Sanitizes a JSON value: strings are scrubbed, values under sensitive
    /// keys are blanked and containers beyond the depth cap are replaced
    /// with a sentinel
    ///
    /// `serde_json::Value` is an owned tree, so reference cycles cannot
    /// occur here; the depth cap bounds the traversal of deep input.
    pub fn sanitize_value(&self, value: &Value) -> Value {
        self.sanitize_at_depth(value, 0)
    }

    /// Sanitizes a string-keyed map (diagnostic context)
    pub fn sanitize_map(&self, map: &Map<String, Value>) -> Map<String, Value> {
        self.sanitize_entries(map, 0)
    }

    fn sanitize_at_depth(&self, value: &Value, depth: usize) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_string(s)),
            Value::Array(items) => {
                if depth >= self.config.max_depth {
                    return Value::String(MAX_DEPTH_SENTINEL.to_string());
                }
                Value::Array(
                    items
                        .iter()
                        .map(|item| self.sanitize_at_depth(item, depth + 1))
                        .collect(),
                )
            }
            Value::Object(map) => {
                if depth >= self.config.max_depth {
                    return Value::String(MAX_DEPTH_SENTINEL.to_string());
                }
                Value::Object(self.sanitize_entries(map, depth))
            }
            other => other.clone(),
        }
    }

    fn sanitize_entries(&self, map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
        map.iter()
            .map(|(key, value)| {
                let sanitized = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    self.sanitize_at_depth(value, depth + 1)
                };
                (key.clone(), sanitized)
            })
            .collect()
    }

    /// Strips credentials, fragments and sensitive query parameters from a
    /// URL; URLs pointing at hosts outside the allow-list become a
    /// placeholder
    pub fn sanitize_url(&self, input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == URL_PLACEHOLDER {
            return trimmed.to_string();
        }

        if trimmed.starts_with('/') && !trimmed.starts_with("//") {
            return match Url::parse("http://localhost").and_then(|base| base.join(trimmed)) {
                Ok(url) => {
                    let cleaned = self.scrub_url(url);
                    let mut relative = cleaned.path().to_string();
                    if let Some(query) = cleaned.query() {
                        relative.push('?');
                        relative.push_str(query);
                    }
                    relative
                }
                Err(_) => URL_PLACEHOLDER.to_string(),
            };
        }

        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(_) => return URL_PLACEHOLDER.to_string(),
        };

        let scheme = url.scheme().to_ascii_lowercase();
        if scheme == "file" || scheme == "data" || scheme == "blob" {
            return URL_PLACEHOLDER.to_string();
        }
        if NETWORK_SCHEMES.contains(&scheme.as_str()) && !self.is_allowed_host(&url) {
            return URL_PLACEHOLDER.to_string();
        }

        self.scrub_url(url).to_string()
    }

    fn is_allowed_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.config
            .allowed_hosts
            .iter()
            .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
    }

    fn scrub_url(&self, mut url: Url) -> Url {
        let _ = url.set_username("");
        let _ = url.set_password(None);
        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| {
                !is_sensitive_key(name)
                    && !SENSITIVE_QUERY_PARAMS.contains(&name.to_ascii_lowercase().as_str())
            })
            .map(|(name, value)| (name.into_owned(), self.sanitize_string(&value)))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        url
    }

    /// Sanitizes every free-form field of a report in place
    pub fn sanitize_report(&self, record: &mut ReportRecord) {
        record.message = self.sanitize_string(&record.message);
        record.stack = record.stack.as_deref().map(|s| self.sanitize_string(s));
        record.component_stack = record
            .component_stack
            .as_deref()
            .map(|s| self.sanitize_string(s));
        record.url = self.sanitize_url(&record.url);
        record.user_description = record
            .user_description
            .as_deref()
            .map(|s| self.sanitize_string(s));
        record.additional_context = self.sanitize_map(&record.additional_context);
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(SanitizerConfig::default())
    }
}
