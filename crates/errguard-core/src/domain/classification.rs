//! Fault classification
//!
//! [`classify`] maps a fault's message and stack trace to a
//! [`Classification`] of category and severity. Rules are ordered: the
//! first rule with a matching phrase wins, so more specific categories are
//! listed before broader ones. Severity is a lookup keyed by category.
//!
//! Classification is pure and total. Input that matches no rule is
//! classified as `runtime` / `medium`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Category / severity
// ============================================================================

/// Broad kind of a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    /// Malformed code or data (parse errors)
    Syntax,
    /// Generic runtime failure; the default bucket
    Runtime,
    /// Connectivity, fetch and chunk loading failures
    Network,
    /// Invalid user input or expired user state
    User,
    /// Resource exhaustion and platform failures
    System,
}

impl FaultCategory {
    pub const ALL: [FaultCategory; 5] = [
        FaultCategory::Syntax,
        FaultCategory::Runtime,
        FaultCategory::Network,
        FaultCategory::User,
        FaultCategory::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCategory::Syntax => "syntax",
            FaultCategory::Runtime => "runtime",
            FaultCategory::Network => "network",
            FaultCategory::User => "user",
            FaultCategory::System => "system",
        }
    }

    /// Severity assigned to faults of this category
    pub fn default_severity(&self) -> Severity {
        match self {
            FaultCategory::Syntax => Severity::High,
            FaultCategory::Network => Severity::High,
            FaultCategory::User => Severity::Low,
            FaultCategory::System => Severity::Critical,
            FaultCategory::Runtime => Severity::Medium,
        }
    }

    /// Whether faults of this category are expected to clear on their own
    pub fn is_transient(&self) -> bool {
        matches!(self, FaultCategory::Network | FaultCategory::User)
    }
}

impl Display for FaultCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "syntax" => Ok(FaultCategory::Syntax),
            "runtime" => Ok(FaultCategory::Runtime),
            "network" => Ok(FaultCategory::Network),
            "user" => Ok(FaultCategory::User),
            "system" => Ok(FaultCategory::System),
            other => Err(DomainError::InvalidCategory(other.to_string())),
        }
    }
}

/// How serious a fault is; ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(DomainError::InvalidSeverity(other.to_string())),
        }
    }
}

/// Result of classifying a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
    pub category: FaultCategory,
    pub severity: Severity,
}

impl Classification {
    pub fn new(category: FaultCategory, severity: Severity) -> Self {
        Self { category, severity }
    }
}

impl Default for Classification {
    fn default() -> Self {
        Self::new(FaultCategory::Runtime, Severity::Medium)
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.severity)
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Ordered classification rules; earlier entries take precedence
const RULES: &[(FaultCategory, &[&str])] = &[
    (
        FaultCategory::Syntax,
        &[
            "syntaxerror",
            "syntax error",
            "unexpected token",
            "unexpected end of json",
            "unexpected end of input",
        ],
    ),
    (
        FaultCategory::Network,
        &[
            "chunkloaderror",
            "loading chunk",
            "network",
            "fetch",
            "timeout",
            "timed out",
            "econnrefused",
            "econnreset",
            "cors",
            "connection",
        ],
    ),
    (
        FaultCategory::User,
        &[
            "validation",
            "invalid input",
            "is required",
            "invalid format",
            "expired",
        ],
    ),
    (
        FaultCategory::System,
        &[
            "out of memory",
            "quota",
            "maximum call stack",
            "stack overflow",
            "securityerror",
            "storage",
        ],
    ),
];

/// Classifies a fault from its message and optional stack trace
pub fn classify(message: &str, stack_trace: Option<&str>) -> Classification {
    let haystack = match stack_trace {
        Some(stack) => format!("{}\n{}", message, stack).to_lowercase(),
        None => message.to_lowercase(),
    };

    RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| haystack.contains(p)))
        .map(|(category, _)| Classification::new(*category, category.default_severity()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_failure_is_network_high() {
        let c = classify("Failed to fetch data from server", None);
        assert_eq!(c, Classification::new(FaultCategory::Network, Severity::High));
    }

    #[test]
    fn test_unmatched_defaults_to_runtime_medium() {
        let c = classify("Cannot read properties of undefined", None);
        assert_eq!(c, Classification::default());
        assert_eq!(classify("", None), Classification::default());
    }

    #[test]
    fn test_syntax_wins_over_network() {
        // "Unexpected token" appears with a fetch in the stack
        let c = classify("Unexpected token < in JSON", Some("at fetchJson (api.js:10)"));
        assert_eq!(c.category, FaultCategory::Syntax);
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn test_stack_is_consulted() {
        let c = classify("Something failed", Some("ChunkLoadError: Loading chunk 4 failed"));
        assert_eq!(c.category, FaultCategory::Network);
    }

    #[test]
    fn test_user_and_system_buckets() {
        assert_eq!(
            classify("Email is required", None),
            Classification::new(FaultCategory::User, Severity::Low)
        );
        assert_eq!(
            classify("QuotaExceededError: the quota has been exceeded", None),
            Classification::new(FaultCategory::System, Severity::Critical)
        );
        assert_eq!(
            classify("RangeError: Maximum call stack size exceeded", None).category,
            FaultCategory::System
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let inputs = [
            ("Failed to fetch", None),
            ("SyntaxError: bad", Some("at x")),
            ("weird", None),
        ];
        for (message, stack) in inputs {
            assert_eq!(classify(message, stack), classify(message, stack));
        }
    }

    #[test]
    fn test_category_parse_and_display() {
        for category in FaultCategory::ALL {
            assert_eq!(category.as_str().parse::<FaultCategory>().unwrap(), category);
        }
        assert!("hardware".parse::<FaultCategory>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
    }
}
