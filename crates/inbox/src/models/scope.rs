//! Scope model: a named group of notification rules (maps to a Focus mode)

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use super::Reason;

/// A single glob/reason predicate belonging to a scope
///
/// Absent predicates are vacuously true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeRule {
    /// Glob matched against the repository's "owner/name"
    #[serde(default)]
    pub repository_pattern: Option<String>,
    /// Glob matched against the repository owner login
    #[serde(default)]
    pub organization_pattern: Option<String>,
    /// Allowed reasons; empty means all reasons
    #[serde(default)]
    pub reasons: Vec<Reason>,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub priority: bool,
    #[serde(default = "default_true")]
    pub push_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScopeRule {
    fn default() -> Self {
        Self {
            repository_pattern: None,
            organization_pattern: None,
            reasons: Vec::new(),
            mute: false,
            priority: false,
            push_enabled: default_true(),
        }
    }
}

impl ScopeRule {
    pub fn for_repository(pattern: impl Into<String>) -> Self {
        Self {
            repository_pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn for_organization(pattern: impl Into<String>) -> Self {
        Self {
            organization_pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn with_reasons(mut self, reasons: impl IntoIterator<Item = Reason>) -> Self {
        self.reasons = reasons.into_iter().collect();
        self
    }

    pub fn muted(mut self) -> Self {
        self.mute = true;
        self
    }

    pub fn prioritized(mut self) -> Self {
        self.priority = true;
        self
    }
}

/// Recurring local-time window during which a scope stays silent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    pub enabled: bool,
    /// Hour of day (0-23) the window opens
    pub start_hour: u32,
    /// Hour of day (0-23) the window closes, exclusive
    pub end_hour: u32,
    pub weekdays: Vec<Weekday>,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_hour: 22,
            end_hour: 8,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }
}

/// A named, user-defined filter group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    /// The default scope matches everything and is never pattern-filtered
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub rules: Vec<ScopeRule>,
    #[serde(default)]
    pub quiet_hours: QuietHours,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            emoji: None,
            color: None,
            is_default: false,
            rules: Vec::new(),
            quiet_hours: QuietHours::default(),
        }
    }

    /// The catch-all scope
    pub fn default_scope(name: impl Into<String>) -> Self {
        Self {
            is_default: true,
            ..Self::new(name)
        }
    }

    pub fn with_rule(mut self, rule: ScopeRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }
}
