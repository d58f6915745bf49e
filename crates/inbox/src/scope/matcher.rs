//! Scope evaluation: rule matching, quiet hours and delivery decisions

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use super::pattern::Pattern;
use crate::models::{Notification, Scope, ScopeRule};

/// How a notification should be surfaced under a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Outside the scope: do not show it
    Hidden,
    /// Matched a muted rule: visible in lists, never alerts
    Muted,
    /// Visible, delivered without sound or banner
    Silent,
    Normal,
    /// Breaks through as a time-sensitive alert
    Priority,
}

impl Delivery {
    pub fn is_visible(&self) -> bool {
        !matches!(self, Delivery::Hidden)
    }

    pub fn alerts(&self) -> bool {
        matches!(self, Delivery::Normal | Delivery::Priority)
    }
}

/// A rule with its patterns compiled
#[derive(Debug, Clone)]
struct CompiledRule {
    repository: Option<Pattern>,
    organization: Option<Pattern>,
    rule: ScopeRule,
}

impl CompiledRule {
    fn new(rule: &ScopeRule) -> Self {
        Self {
            repository: rule.repository_pattern.as_deref().map(Pattern::compile),
            organization: rule.organization_pattern.as_deref().map(Pattern::compile),
            rule: rule.clone(),
        }
    }

    fn matches(&self, notification: &Notification) -> bool {
        self.repository
            .as_ref()
            .is_none_or(|p| p.matches(&notification.repository.full_name))
            && self
                .organization
                .as_ref()
                .is_none_or(|p| p.matches(&notification.repository.owner_login))
            && (self.rule.reasons.is_empty() || self.rule.reasons.contains(&notification.reason))
    }
}

/// A scope prepared for evaluating many notifications
///
/// Patterns are compiled once here instead of on every match.
#[derive(Debug, Clone)]
pub struct CompiledScope {
    scope: Scope,
    rules: Vec<CompiledRule>,
}

impl CompiledScope {
    pub fn new(scope: Scope) -> Self {
        let rules = scope.rules.iter().map(CompiledRule::new).collect();
        Self { scope, rules }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether the notification belongs to this scope
    pub fn matches(&self, notification: &Notification) -> bool {
        self.scope.is_default || self.matching_rule(notification).is_some()
    }

    /// First rule (in order) the notification matches
    pub fn matching_rule(&self, notification: &Notification) -> Option<&ScopeRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(notification))
            .map(|compiled| &compiled.rule)
    }

    /// Decide delivery at `now` (evaluated in `now`'s time zone)
    pub fn delivery_for<Tz: TimeZone>(&self, notification: &Notification, now: &DateTime<Tz>) -> Delivery {
        let rule = self.matching_rule(notification);
        if rule.is_none() && !self.scope.is_default {
            return Delivery::Hidden;
        }

        if rule.is_some_and(|r| r.mute) {
            return Delivery::Muted;
        }
        if is_in_quiet_hours(&self.scope, now) {
            return Delivery::Silent;
        }

        match rule {
            Some(r) if r.priority => Delivery::Priority,
            Some(r) if !r.push_enabled => Delivery::Silent,
            _ => Delivery::Normal,
        }
    }
}

/// Whether a notification matches a single rule
pub fn rule_matches(notification: &Notification, rule: &ScopeRule) -> bool {
    CompiledRule::new(rule).matches(notification)
}

/// Whether a notification belongs to a scope
///
/// The default scope matches everything; any other scope needs at least
/// one matching rule.
pub fn matches(notification: &Notification, scope: &Scope) -> bool {
    scope.is_default || scope.rules.iter().any(|rule| rule_matches(notification, rule))
}

/// Delivery decision for a one-off evaluation in local time
pub fn delivery_for(notification: &Notification, scope: &Scope) -> Delivery {
    CompiledScope::new(scope.clone()).delivery_for(notification, &Local::now())
}

/// Whether the scope's quiet-hours window is active at `now`
///
/// Hours and weekdays are read in `now`'s time zone; pass local time.
pub fn is_in_quiet_hours<Tz: TimeZone>(scope: &Scope, now: &DateTime<Tz>) -> bool {
    let quiet = &scope.quiet_hours;
    if !quiet.enabled || !quiet.weekdays.contains(&now.weekday()) {
        return false;
    }

    let hour = now.hour();
    if quiet.start_hour < quiet.end_hour {
        hour >= quiet.start_hour && hour < quiet.end_hour
    } else {
        // Window spans midnight
        hour >= quiet.start_hour || hour < quiet.end_hour
    }
}

/// Quiet-hours check against the current local time
pub fn is_quiet_now(scope: &Scope) -> bool {
    is_in_quiet_hours(scope, &Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuietHours, Reason};
    use chrono::{FixedOffset, Utc, Weekday};

    fn notification(repo: &str, reason: Reason) -> Notification {
        Notification::builder("1").repo(repo).reason(reason).build()
    }

    fn scope_with(rules: Vec<ScopeRule>) -> Scope {
        rules
            .into_iter()
            .fold(Scope::new("Work"), |scope, rule| scope.with_rule(rule))
    }

    fn night_scope(weekdays: Vec<Weekday>) -> Scope {
        Scope::new("Sleep").with_quiet_hours(QuietHours {
            enabled: true,
            start_hour: 22,
            end_hour: 8,
            weekdays,
        })
    }

    /// 2024-05-01 is a Wednesday
    fn wednesday_at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_repository_pattern() {
        let scope = scope_with(vec![ScopeRule::for_repository("myorg/*")]);
        assert!(matches(&notification("myorg/backend", Reason::Mention), &scope));
        assert!(!matches(&notification("otherorg/backend", Reason::Mention), &scope));
    }

    #[test]
    fn test_star_and_case_insensitive_exact() {
        let any = scope_with(vec![ScopeRule::for_repository("*")]);
        assert!(matches(&notification("whoever/whatever", Reason::Comment), &any));

        let exact = scope_with(vec![ScopeRule::for_repository("MyOrg/Repo")]);
        assert!(matches(&notification("myorg/repo", Reason::Comment), &exact));
    }

    #[test]
    fn test_rule_predicates_are_conjunctive() {
        let rule = ScopeRule::for_organization("myorg").with_reasons([Reason::ReviewRequested]);
        assert!(rule_matches(&notification("myorg/api", Reason::ReviewRequested), &rule));
        assert!(!rule_matches(&notification("myorg/api", Reason::Subscribed), &rule));
        assert!(!rule_matches(&notification("other/api", Reason::ReviewRequested), &rule));

        // No predicates at all is vacuously true
        assert!(rule_matches(&notification("x/y", Reason::Other), &ScopeRule::default()));
    }

    #[test]
    fn test_rules_are_disjunctive() {
        let scope = scope_with(vec![
            ScopeRule::for_repository("a/*"),
            ScopeRule::for_repository("b/*"),
        ]);
        assert!(matches(&notification("b/x", Reason::Mention), &scope));
        assert!(!matches(&notification("c/x", Reason::Mention), &scope));
    }

    #[test]
    fn test_empty_scope_matches_nothing_unless_default() {
        let n = notification("myorg/backend", Reason::Mention);
        assert!(!matches(&n, &Scope::new("Empty")));
        assert!(matches(&n, &Scope::default_scope("Everything")));
    }

    #[test]
    fn test_quiet_hours_spanning_midnight() {
        let scope = night_scope(vec![Weekday::Wed]);
        assert!(is_in_quiet_hours(&scope, &wednesday_at(23)));
        assert!(is_in_quiet_hours(&scope, &wednesday_at(5)));
        assert!(!is_in_quiet_hours(&scope, &wednesday_at(12)));
        assert!(is_in_quiet_hours(&scope, &wednesday_at(22)));
        assert!(!is_in_quiet_hours(&scope, &wednesday_at(8)));
    }

    #[test]
    fn test_quiet_hours_inactive_weekday() {
        let scope = night_scope(vec![Weekday::Sat, Weekday::Sun]);
        for hour in [0, 5, 12, 23] {
            assert!(!is_in_quiet_hours(&scope, &wednesday_at(hour)));
        }
    }

    #[test]
    fn test_quiet_hours_same_day_window_and_disabled() {
        let mut scope = Scope::new("Work").with_quiet_hours(QuietHours {
            enabled: true,
            start_hour: 9,
            end_hour: 17,
            weekdays: vec![Weekday::Wed],
        });
        assert!(is_in_quiet_hours(&scope, &wednesday_at(9)));
        assert!(!is_in_quiet_hours(&scope, &wednesday_at(17)));
        assert!(!is_in_quiet_hours(&scope, &wednesday_at(20)));

        scope.quiet_hours.enabled = false;
        assert!(!is_in_quiet_hours(&scope, &wednesday_at(10)));
    }

    #[test]
    fn test_quiet_hours_use_the_given_zone() {
        let scope = night_scope(vec![Weekday::Wed]);
        // 21:00 UTC is 23:00 at +02:00
        let utc = Utc.with_ymd_and_hms(2024, 5, 1, 21, 0, 0).unwrap();
        assert!(!is_in_quiet_hours(&scope, &utc));
        assert!(is_in_quiet_hours(&scope, &utc.with_timezone(&wednesday_at(0).timezone())));
    }

    #[test]
    fn test_delivery_for() {
        let scope = CompiledScope::new(scope_with(vec![
            ScopeRule::for_repository("myorg/noisy").muted(),
            ScopeRule::for_organization("myorg")
                .with_reasons([Reason::ReviewRequested])
                .prioritized(),
            ScopeRule::for_organization("myorg"),
        ]));
        let noon = wednesday_at(12);

        assert_eq!(
            scope.delivery_for(&notification("other/x", Reason::Mention), &noon),
            Delivery::Hidden
        );
        assert_eq!(
            scope.delivery_for(&notification("myorg/noisy", Reason::ReviewRequested), &noon),
            Delivery::Muted
        );
        assert_eq!(
            scope.delivery_for(&notification("myorg/api", Reason::ReviewRequested), &noon),
            Delivery::Priority
        );
        assert_eq!(
            scope.delivery_for(&notification("myorg/api", Reason::Comment), &noon),
            Delivery::Normal
        );
    }

    #[test]
    fn test_delivery_silent_during_quiet_hours() {
        let scope = CompiledScope::new(
            Scope::default_scope("All").with_quiet_hours(QuietHours {
                enabled: true,
                start_hour: 22,
                end_hour: 8,
                weekdays: vec![Weekday::Wed],
            }),
        );
        let n = notification("any/repo", Reason::Mention);
        assert_eq!(scope.delivery_for(&n, &wednesday_at(23)), Delivery::Silent);
        assert_eq!(scope.delivery_for(&n, &wednesday_at(12)), Delivery::Normal);
        assert!(Delivery::Silent.is_visible() && !Delivery::Silent.alerts());
    }
}
