//! Consent levels and configuration
//!
//! Consent is a table keyed by [`ConsentLevel`]. Every flag of a
//! [`ConsentConfig`] is derived from the level unless overridden through
//! [`merge_overrides`]. A configuration expires 365 days after it was
//! given or as soon as the consent version it was given for is stale.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Current version of the consent text; bump to re-prompt every user
pub const CURRENT_CONSENT_VERSION: &str = "1.0";

/// Days after which any consent must be renewed
pub const CONSENT_VALIDITY_DAYS: i64 = 365;

/// How much diagnostic data the user agreed to share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentLevel {
    None,
    Basic,
    Detailed,
    Full,
}

impl ConsentLevel {
    pub const ALL: [ConsentLevel; 4] = [
        ConsentLevel::None,
        ConsentLevel::Basic,
        ConsentLevel::Detailed,
        ConsentLevel::Full,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentLevel::None => "none",
            ConsentLevel::Basic => "basic",
            ConsentLevel::Detailed => "detailed",
            ConsentLevel::Full => "full",
        }
    }

    /// Flags granted by this level
    pub fn flags(&self) -> ConsentFlags {
        match self {
            ConsentLevel::None => ConsentFlags {
                include_personal_info: false,
                include_user_actions: false,
                include_system_info: false,
                include_stack_traces: false,
                allow_external_reporting: false,
                data_retention_days: 0,
            },
            ConsentLevel::Basic => ConsentFlags {
                include_personal_info: false,
                include_user_actions: false,
                include_system_info: true,
                include_stack_traces: true,
                allow_external_reporting: false,
                data_retention_days: 7,
            },
            ConsentLevel::Detailed => ConsentFlags {
                include_personal_info: false,
                include_user_actions: true,
                include_system_info: true,
                include_stack_traces: true,
                allow_external_reporting: true,
                data_retention_days: 30,
            },
            ConsentLevel::Full => ConsentFlags {
                include_personal_info: true,
                include_user_actions: true,
                include_system_info: true,
                include_stack_traces: true,
                allow_external_reporting: true,
                data_retention_days: 90,
            },
        }
    }
}

impl Display for ConsentLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsentLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ConsentLevel::None),
            "basic" => Ok(ConsentLevel::Basic),
            "detailed" => Ok(ConsentLevel::Detailed),
            "full" => Ok(ConsentLevel::Full),
            other => Err(DomainError::InvalidConsentLevel(other.to_string())),
        }
    }
}

/// The level-derived part of a consent configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentFlags {
    pub include_personal_info: bool,
    pub include_user_actions: bool,
    pub include_system_info: bool,
    pub include_stack_traces: bool,
    pub allow_external_reporting: bool,
    pub data_retention_days: u32,
}

// ============================================================================
// Consent configuration
// ============================================================================

/// Persisted consent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentConfig {
    pub level: ConsentLevel,
    pub include_personal_info: bool,
    pub include_user_actions: bool,
    pub include_system_info: bool,
    pub include_stack_traces: bool,
    pub allow_external_reporting: bool,
    pub data_retention_days: u32,
    pub consent_timestamp: DateTime<Utc>,
    pub consent_version: String,
}

impl ConsentConfig {
    /// Builds the table configuration for `level`, given at `now`
    pub fn for_level(level: ConsentLevel, now: DateTime<Utc>, version: &str) -> Self {
        let flags = level.flags();
        Self {
            level,
            include_personal_info: flags.include_personal_info,
            include_user_actions: flags.include_user_actions,
            include_system_info: flags.include_system_info,
            include_stack_traces: flags.include_stack_traces,
            allow_external_reporting: flags.allow_external_reporting,
            data_retention_days: flags.data_retention_days,
            consent_timestamp: now,
            consent_version: version.to_string(),
        }
    }

    /// Instant after which this consent is no longer valid
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.consent_timestamp + Duration::days(CONSENT_VALIDITY_DAYS)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// True when the user must be asked again before collecting anything
    pub fn needs_update_at(&self, now: DateTime<Utc>, current_version: &str) -> bool {
        self.consent_version != current_version || self.is_expired_at(now)
    }

    /// Whether the given data type may be collected under this configuration
    pub fn allows(&self, data_type: DataType) -> bool {
        match data_type {
            DataType::PersonalInfo => self.include_personal_info,
            DataType::UserActions => self.include_user_actions,
            DataType::SystemInfo => self.include_system_info,
            DataType::StackTraces => self.include_stack_traces,
        }
    }
}

/// Partial update of a consent configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_personal_info: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_user_actions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_system_info: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_stack_traces: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_external_reporting: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_retention_days: Option<u32>,
}

impl ConsentOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Applies `overrides` on top of `base`; level, timestamp and version are kept
pub fn merge_overrides(base: &ConsentConfig, overrides: &ConsentOverrides) -> ConsentConfig {
    ConsentConfig {
        level: base.level,
        include_personal_info: overrides
            .include_personal_info
            .unwrap_or(base.include_personal_info),
        include_user_actions: overrides
            .include_user_actions
            .unwrap_or(base.include_user_actions),
        include_system_info: overrides
            .include_system_info
            .unwrap_or(base.include_system_info),
        include_stack_traces: overrides
            .include_stack_traces
            .unwrap_or(base.include_stack_traces),
        allow_external_reporting: overrides
            .allow_external_reporting
            .unwrap_or(base.allow_external_reporting),
        data_retention_days: overrides
            .data_retention_days
            .unwrap_or(base.data_retention_days),
        consent_timestamp: base.consent_timestamp,
        consent_version: base.consent_version.clone(),
    }
}

// ============================================================================
// Data types
// ============================================================================

/// Consent-gated categories of collected data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    PersonalInfo,
    UserActions,
    SystemInfo,
    StackTraces,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::PersonalInfo,
        DataType::UserActions,
        DataType::SystemInfo,
        DataType::StackTraces,
    ];

    /// Name of the consent flag gating this data type
    pub fn flag_name(&self) -> &'static str {
        match self {
            DataType::PersonalInfo => "includePersonalInfo",
            DataType::UserActions => "includeUserActions",
            DataType::SystemInfo => "includeSystemInfo",
            DataType::StackTraces => "includeStackTraces",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag_name())
    }
}

impl FromStr for DataType {
    type Err = DomainError;

    /// Accepts the flag name (`includePersonalInfo`) or the bare data
    /// type in camel or snake case (`personalInfo`, `personal_info`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        let bare = normalized.strip_prefix("include").unwrap_or(&normalized);
        match bare {
            "personalinfo" => Ok(DataType::PersonalInfo),
            "useractions" => Ok(DataType::UserActions),
            "systeminfo" => Ok(DataType::SystemInfo),
            "stacktraces" => Ok(DataType::StackTraces),
            _ => Err(DomainError::InvalidDataType(s.to_string())),
        }
    }
}
