//! Schedule rules.
//!
//! A rule couples a five-field cron expression with scaling settings:
//! `"0 22 * * * replicas=0 state=save triggers=notify"`. Rules are parsed
//! eagerly so the scale loop never has to deal with malformed input, and
//! are immutable afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Local};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::errors::ScheduleError;

/// State transition requested by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Snapshot the current replica count before scaling.
    Save,
    /// Scale back to the previously snapshotted replica count.
    Restore,
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
            Self::Restore => write!(f, "restore"),
        }
    }
}

/// A single parsed schedule rule.
///
/// The cron expression is interpreted in the controller's local time zone.
/// Day-of-week accepts `1-7` (1 = Sunday) or names, per the `cron` crate.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The five cron fields, normalized to single spaces.
    expression: String,
    cron: cron::Schedule,
    replicas: Option<u32>,
    state: Option<StateTransition>,
    triggers: Vec<String>,
}

impl Schedule {
    /// Smallest firing time strictly after `after`.
    ///
    /// Fails when the expression yields nothing within a one-year horizon
    /// (e.g. a February 30th rule).
    pub fn next_fire_after(
        &self,
        after: DateTime<Local>,
    ) -> Result<DateTime<Local>, ScheduleError> {
        let horizon = after + Duration::days(366);
        self.cron
            .after(&after)
            .next()
            .filter(|next| *next <= horizon)
            .ok_or(ScheduleError::NoNextTime(after))
    }

    /// Target replica count, when the rule carries one.
    pub fn replicas(&self) -> Result<u32, ScheduleError> {
        self.replicas.ok_or(ScheduleError::MissingReplicas)
    }

    /// Requested state transition; `None` for plain scaling rules.
    pub fn state(&self) -> Option<StateTransition> {
        self.state
    }

    /// Trigger ids named by this rule, possibly empty.
    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// The normalized cron expression (without settings).
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ScheduleError::InvalidRule {
            rule: rule.to_string(),
            reason,
        };

        let tokens: Vec<&str> = rule.split_whitespace().collect();
        if tokens.len() < 5 {
            return Err(invalid("expected five cron fields".to_string()));
        }

        let expression = tokens[..5].join(" ");
        // The cron crate wants a seconds field; rules are minute-granular.
        let cron = cron::Schedule::from_str(&format!("0 {expression}"))
            .map_err(|err| invalid(err.to_string()))?;

        let mut replicas = None;
        let mut state = None;
        let mut triggers = Vec::new();
        for setting in &tokens[5..] {
            let (key, value) = setting.split_once('=').ok_or_else(|| {
                invalid(format!("malformed setting '{setting}', expected key=value"))
            })?;
            match key {
                "replicas" => {
                    replicas = Some(value.parse::<u32>().map_err(|_| {
                        invalid(format!("replicas must be a non-negative integer, got '{value}'"))
                    })?);
                }
                "state" => {
                    state = Some(match value.to_ascii_lowercase().as_str() {
                        "save" => StateTransition::Save,
                        "restore" => StateTransition::Restore,
                        _ => return Err(ScheduleError::InvalidState(value.to_string())),
                    });
                }
                "triggers" => {
                    triggers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .collect();
                }
                _ => return Err(invalid(format!("unknown setting '{key}'"))),
            }
        }

        if replicas.is_none() && state.is_none() && triggers.is_empty() {
            return Err(invalid(
                "rule must set at least one of replicas, state or triggers".to_string(),
            ));
        }

        Ok(Self {
            expression,
            cron,
            replicas,
            state,
            triggers,
        })
    }
}

impl fmt::Display for Schedule {
    /// Canonical form; re-parsing it yields an equal rule.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)?;
        if let Some(replicas) = self.replicas {
            write!(f, " replicas={replicas}")?;
        }
        if let Some(state) = self.state {
            write!(f, " state={state}")?;
        }
        if !self.triggers.is_empty() {
            write!(f, " triggers={}", self.triggers.join(","))?;
        }
        Ok(())
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
            && self.replicas == other.replicas
            && self.state == other.state
            && self.triggers == other.triggers
    }
}

impl Eq for Schedule {}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rule = String::deserialize(deserializer)?;
        rule.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_parse_full_rule() {
        let sched: Schedule = "0 22 * * * replicas=0 state=save triggers=notify,page"
            .parse()
            .unwrap();
        assert_eq!(sched.replicas().unwrap(), 0);
        assert_eq!(sched.state(), Some(StateTransition::Save));
        assert_eq!(sched.triggers(), ["notify", "page"]);
    }

    #[test]
    fn test_parse_pure_state_rule() {
        let sched: Schedule = "0 6 * * * state=restore".parse().unwrap();
        assert_eq!(sched.state(), Some(StateTransition::Restore));
        assert!(matches!(
            sched.replicas(),
            Err(ScheduleError::MissingReplicas)
        ));
    }

    #[test]
    fn test_parse_pure_trigger_rule() {
        let sched: Schedule = "30 8 * * * triggers=notify".parse().unwrap();
        assert_eq!(sched.state(), None);
        assert_eq!(sched.triggers(), ["notify"]);
    }

    #[test]
    fn test_parse_state_case_insensitive() {
        let sched: Schedule = "0 6 * * * state=rEstOre".parse().unwrap();
        assert_eq!(sched.state(), Some(StateTransition::Restore));
    }

    #[test]
    fn test_parse_rejects_unknown_state() {
        let err = "0 6 * * * state=blabla".parse::<Schedule>().unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidState(v) if v == "blabla"));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        assert!("0 6 * * * foo=bar".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_parse_rejects_negative_replicas() {
        assert!("0 6 * * * replicas=-1".parse::<Schedule>().is_err());
        assert!("0 6 * * * replicas=d".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_parse_rejects_empty_settings() {
        assert!("0 6 * * *".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_parse_rejects_short_expression() {
        assert!("0 6 * replicas=1".parse::<Schedule>().is_err());
    }

    #[test]
    fn test_next_fire_after_picks_following_day() {
        let sched: Schedule = "0 22 * * * replicas=0".parse().unwrap();
        let after = local(2024, 5, 1, 22, 30);
        let next = sched.next_fire_after(after).unwrap();
        assert_eq!(next, local(2024, 5, 2, 22, 0));
    }

    #[test]
    fn test_next_fire_after_is_strict() {
        let sched: Schedule = "0 22 * * * replicas=0".parse().unwrap();
        let exactly = local(2024, 5, 1, 22, 0);
        let next = sched.next_fire_after(exactly).unwrap();
        assert!(next > exactly);
        assert_eq!(next, local(2024, 5, 2, 22, 0));
    }

    #[test]
    fn test_next_fire_after_no_next_time() {
        // February 30th never exists.
        let sched: Schedule = "0 0 30 2 * replicas=1".parse().unwrap();
        let err = sched.next_fire_after(local(2024, 1, 1, 0, 0)).unwrap_err();
        assert!(matches!(err, ScheduleError::NoNextTime(_)));
    }

    #[test]
    fn test_canonical_roundtrip() {
        let rules = [
            "0 22 * * * replicas=0",
            "0 6 * * * state=restore",
            "15 7 1 * * replicas=3 state=save triggers=a,b",
        ];
        for rule in rules {
            let sched: Schedule = rule.parse().unwrap();
            let reparsed: Schedule = sched.to_string().parse().unwrap();
            assert_eq!(sched, reparsed, "canonical form of '{rule}' must reparse");
        }
    }

    #[test]
    fn test_canonical_normalizes_whitespace() {
        let sched: Schedule = "0  22 *  * *   replicas=2".parse().unwrap();
        assert_eq!(sched.expression(), "0 22 * * *");
        assert_eq!(sched.to_string(), "0 22 * * * replicas=2");
    }

    #[test]
    fn test_serde_as_string() {
        let sched: Schedule = "0 22 * * * replicas=0".parse().unwrap();
        let json = serde_json::to_string(&sched).unwrap();
        assert_eq!(json, "\"0 22 * * * replicas=0\"");
        let back: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(sched, back);
    }

    proptest! {
        #[test]
        fn prop_next_fire_strictly_advances(
            minute in 0u32..60,
            hour in 0u32..24,
            from_hour in 0u32..24,
        ) {
            let sched: Schedule = format!("{minute} {hour} * * * replicas=1").parse().unwrap();
            let after = local(2024, 1, 15, from_hour, 30);
            let next = sched.next_fire_after(after).unwrap();
            prop_assert!(next > after);
        }

        #[test]
        fn prop_canonical_roundtrip(
            replicas in proptest::option::of(0u32..1000),
            state in 0u8..3,
            minute in 0u32..60,
            hour in 0u32..24,
        ) {
            let mut rule = format!("{minute} {hour} * * *");
            if let Some(n) = replicas {
                rule.push_str(&format!(" replicas={n}"));
            }
            match state {
                1 => rule.push_str(" state=save"),
                2 => rule.push_str(" state=restore"),
                _ => {}
            }
            if replicas.is_none() && state == 0 {
                rule.push_str(" triggers=notify");
            }
            let sched: Schedule = rule.parse().unwrap();
            let reparsed: Schedule = sched.to_string().parse().unwrap();
            prop_assert_eq!(sched, reparsed);
        }
    }
}
