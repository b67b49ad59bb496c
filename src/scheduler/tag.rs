//! Priority-ordered tag matcher.
//!
//! Resolves today's active 24-hour schedule from a resource's schedule tags
//! and decodes the token at the current hour into an [`Action`]. The ruleset
//! follows the AnykeyNL tag vocabulary and is intended to run once an hour.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::Value;

use crate::action::Action;

use super::error::ScheduleError;
use super::ScheduleInput;

const ANYDAY: &str = "AnyDay";
const WEEKDAY: &str = "WeekDay";
const WEEKEND: &str = "Weekend";
const DAY_OF_MONTH: &str = "DayOfMonth";

/// Tokens per schedule string, one per hour of day.
pub const HOURS_PER_DAY: usize = 24;

/// Evaluates schedule tags against a fixed "now".
///
/// The current hour, weekday, day-of-month and nth-occurrence index are
/// captured once at construction from the configured time-zone, so a whole
/// run sees a consistent instant. The matcher itself is an immutable value;
/// re-parameterising the zone returns a new one.
#[derive(Debug, Clone)]
pub struct TagScheduler {
    zone: Option<Tz>,
    hour: usize,
    day_of_week: Weekday,
    day_of_month: u32,
    nth_in_month: u32,
}

impl TagScheduler {
    /// Creates a scheduler pinned to the host-local clock.
    #[must_use]
    pub fn local() -> Self {
        Self::at(Local::now())
    }

    /// Creates a scheduler pinned to the wall clock in the given zone.
    #[must_use]
    pub fn in_zone(zone: Tz) -> Self {
        let mut sch = Self::at(Utc::now().with_timezone(&zone));
        sch.zone = Some(zone);
        sch
    }

    /// Creates a scheduler for a named IANA zone.
    pub fn from_zone_name(name: &str) -> Result<Self, ScheduleError> {
        let zone: Tz = name
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone { name: name.to_string() })?;
        Ok(Self::in_zone(zone))
    }

    /// Creates a scheduler pinned to an explicit instant.
    ///
    /// This is the clock-injection seam: tests drive `now` through it.
    #[must_use]
    pub fn at<Z: TimeZone>(now: DateTime<Z>) -> Self {
        Self {
            zone: None,
            hour: now.hour() as usize,
            day_of_week: now.weekday(),
            day_of_month: now.day(),
            nth_in_month: nth_in_month(now.day()),
        }
    }

    /// Returns a new scheduler recalculated for `zone`.
    #[must_use]
    pub fn with_timezone(&self, zone: Tz) -> Self {
        Self::in_zone(zone)
    }

    /// Hour-of-day index this scheduler decodes (0..=23).
    #[must_use]
    pub fn hour(&self) -> usize {
        self.hour
    }

    /// The zone this scheduler was built for, when one was named.
    #[must_use]
    pub fn zone(&self) -> Option<Tz> {
        self.zone
    }

    /// Decides the action for `input` at the captured hour.
    ///
    /// Raw schedule strings are parsed directly. Tag maps are resolved
    /// through [`Self::active_schedule`] first; a day with no matching rule
    /// yields [`Action::NULL`] without an error.
    pub fn evaluate(&self, input: ScheduleInput<'_>) -> Result<Action, ScheduleError> {
        match input {
            ScheduleInput::Schedule(raw) => self.parse_schedule(raw),
            ScheduleInput::Tags(tags) => {
                let active = self.active_schedule(tags)?;
                if active.trim().is_empty() {
                    return Ok(Action::NULL);
                }
                self.parse_schedule(&active)
            }
        }
    }

    /// Resolves today's active schedule string.
    ///
    /// Rules apply least-specific first so later matches override:
    /// `AnyDay` → `WeekDay`/`Weekend` class → named weekday → nth weekday
    /// of the month (`Monday2`) → `DayOfMonth`. Blank values never match.
    /// Returns an empty string when no rule applies today.
    pub fn active_schedule(&self, tags: &HashMap<String, Value>) -> Result<String, ScheduleError> {
        let tags = coerce_tags(tags)?;
        let dow = weekday_name(self.day_of_week);

        let mut active = "";

        if let Some(v) = non_blank(&tags, ANYDAY) {
            active = v;
        }
        let class = if is_weekend(self.day_of_week) { WEEKEND } else { WEEKDAY };
        if let Some(v) = non_blank(&tags, class) {
            active = v;
        }
        if let Some(v) = non_blank(&tags, dow) {
            active = v;
        }
        let nth_key = format!("{dow}{}", self.nth_in_month);
        if let Some(v) = non_blank(&tags, &nth_key) {
            active = v;
        }

        let mut active = active.to_string();
        if let Some(v) = non_blank(&tags, DAY_OF_MONTH) {
            if let Some(expanded) = day_of_month_override(v, self.day_of_month) {
                active = expanded;
            }
        }

        Ok(active)
    }

    /// Decodes the token at the captured hour of a schedule string.
    fn parse_schedule(&self, schedule: &str) -> Result<Action, ScheduleError> {
        // Inline "# ..." comments are stripped before splitting.
        let schedule = match schedule.find('#') {
            Some(idx) => &schedule[..idx],
            None => schedule,
        };

        let schedule = schedule.trim();
        if schedule.is_empty() {
            return Ok(Action::NULL);
        }

        let tokens: Vec<&str> = schedule.split(',').map(str::trim).collect();
        if tokens.len() != HOURS_PER_DAY {
            return Err(ScheduleError::InvalidTokenCount {
                expected: HOURS_PER_DAY,
                got: tokens.len(),
            });
        }

        let token = tokens[self.hour];
        if token.is_empty() || token == "*" {
            return Ok(Action::NULL);
        }

        if token.starts_with('(') && token.ends_with(')') {
            return Err(ScheduleError::UnsupportedToken { token: token.to_string() });
        }

        let value: i64 = token.parse().map_err(|e: std::num::ParseIntError| {
            ScheduleError::InvalidToken {
                token: token.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(match value {
            v if v <= 0 => Action::OFF,
            1 => Action::ON,
            v => Action::custom(v.min(127)),
        })
    }
}

/// 1-based occurrence of the current weekday within the month.
fn nth_in_month(day_of_month: u32) -> u32 {
    (day_of_month - 1) / 7 + 1
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn non_blank<'a>(tags: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Coerces provider tag values (typed as "any" on the wire) into trimmed
/// strings. Null values are dropped; structured values are rejected.
fn coerce_tags(tags: &HashMap<String, Value>) -> Result<HashMap<String, String>, ScheduleError> {
    let mut out = HashMap::with_capacity(tags.len());
    for (key, value) in tags {
        let coerced = match value {
            Value::Null => continue,
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(ScheduleError::InvalidInput { input: other.to_string() });
            }
        };
        out.insert(key.clone(), coerced);
    }
    Ok(out)
}

/// Parses a `DayOfMonth` value like `1:0,15:1`. When one of the `<day>`
/// entries matches today, returns the 24-repetition of its token.
fn day_of_month_override(value: &str, today: u32) -> Option<String> {
    for pair in value.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((day, token)) = pair.split_once(':') else {
            continue;
        };
        let Ok(day) = day.trim().parse::<u32>() else {
            continue;
        };
        if day != today {
            continue;
        }
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        return Some(vec![token; HOURS_PER_DAY].join(","));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Monday 2024-03-11 (day 11, 2nd Monday) at the given UTC hour.
    fn monday_at(hour: u32) -> TagScheduler {
        TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 11, hour, 0, 0).unwrap())
    }

    fn tags(entries: &[(&str, &str)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn repeat24(token: &str) -> String {
        vec![token; HOURS_PER_DAY].join(",")
    }

    #[test]
    fn no_recognized_key_is_null() {
        let sch = monday_at(10);
        let t = tags(&[("SomeOther", &repeat24("1"))]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::NULL);
    }

    #[test]
    fn anyday_decodes_at_current_hour() {
        let sch = monday_at(10);
        let t = tags(&[(ANYDAY, &repeat24("1"))]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);
    }

    #[test]
    fn named_day_overrides_class_and_anyday() {
        let sch = monday_at(10);
        let monday = "0,0,0,0,0,0,0,0,1,1,1,1,1,1,1,1,1,1,1,0,0,0,0,0";
        let t = tags(&[
            (ANYDAY, &repeat24("0")),
            (WEEKDAY, &repeat24("1")),
            ("Monday", monday),
        ]);
        assert_eq!(sch.active_schedule(&t).unwrap(), monday);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);

        let evening = monday_at(19);
        assert_eq!(evening.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::OFF);
    }

    #[test]
    fn weekday_class_applies_monday_through_friday() {
        let sch = monday_at(10);
        let t = tags(&[(WEEKDAY, &repeat24("1")), (WEEKEND, &repeat24("0"))]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);

        // Saturday 2024-03-16.
        let sat = TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap());
        assert_eq!(sat.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::OFF);
    }

    #[test]
    fn nth_weekday_overrides_named_day() {
        // 2024-03-11 is the 2nd Monday of the month.
        let sch = monday_at(10);
        let t = tags(&[("Monday", &repeat24("1")), ("Monday2", &repeat24("0"))]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::OFF);

        // The 1st Monday keeps the named-day rule.
        let first = TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap());
        assert_eq!(first.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);
    }

    #[test]
    fn day_of_month_wins_over_everything() {
        // Day 15 of the month.
        let sch = TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
        let t = tags(&[(ANYDAY, &repeat24("1")), (DAY_OF_MONTH, "15:0")]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::OFF);

        // Non-matching day falls through to the earlier rule.
        let other = TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap());
        assert_eq!(other.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);
    }

    #[test]
    fn day_of_month_ignores_malformed_pairs() {
        let sch = TagScheduler::at(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
        let t = tags(&[(DAY_OF_MONTH, "nope,x:1,15:0")]);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::OFF);
    }

    #[test]
    fn token_count_is_enforced() {
        let sch = monday_at(10);
        let t = tags(&[(ANYDAY, "1,1,1")]);
        assert_eq!(
            sch.evaluate(ScheduleInput::Tags(&t)),
            Err(ScheduleError::InvalidTokenCount { expected: 24, got: 3 })
        );

        let too_many = format!("{},1", repeat24("1"));
        let t = tags(&[(ANYDAY, &too_many)]);
        assert_eq!(
            sch.evaluate(ScheduleInput::Tags(&t)),
            Err(ScheduleError::InvalidTokenCount { expected: 24, got: 25 })
        );
    }

    #[test]
    fn star_and_empty_tokens_are_noops() {
        let sch = monday_at(10);
        assert_eq!(
            sch.evaluate(ScheduleInput::Schedule(&repeat24("*"))).unwrap(),
            Action::NULL
        );

        let mut tokens = vec!["1"; HOURS_PER_DAY];
        tokens[10] = "";
        assert_eq!(
            sch.evaluate(ScheduleInput::Schedule(&tokens.join(","))).unwrap(),
            Action::NULL
        );
    }

    #[test]
    fn parenthesized_tokens_are_unsupported() {
        let sch = monday_at(10);
        let err = sch.evaluate(ScheduleInput::Schedule(&repeat24("(1:2)"))).unwrap_err();
        assert_eq!(err, ScheduleError::UnsupportedToken { token: "(1:2)".to_string() });
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let sch = monday_at(10);
        assert!(matches!(
            sch.evaluate(ScheduleInput::Schedule(&repeat24("up"))),
            Err(ScheduleError::InvalidToken { .. })
        ));
    }

    #[test]
    fn numeric_mapping() {
        let sch = monday_at(10);
        let eval = |tok: &str| sch.evaluate(ScheduleInput::Schedule(&repeat24(tok))).unwrap();

        assert_eq!(eval("0"), Action::OFF);
        assert_eq!(eval("-3"), Action::OFF);
        assert_eq!(eval("1"), Action::ON);
        assert_eq!(eval("3"), Action::custom(3));
        assert_eq!(eval("300"), Action::custom(127));
    }

    #[test]
    fn inline_comments_are_stripped() {
        let sch = monday_at(10);
        let schedule = format!("{} # weekday baseline", repeat24("1"));
        assert_eq!(sch.evaluate(ScheduleInput::Schedule(&schedule)).unwrap(), Action::ON);
    }

    #[test]
    fn hour_boundaries_read_first_and_last_token() {
        let mut tokens = vec!["0"; HOURS_PER_DAY];
        tokens[0] = "1";
        let schedule = tokens.join(",");
        assert_eq!(
            monday_at(0).evaluate(ScheduleInput::Schedule(&schedule)).unwrap(),
            Action::ON
        );

        let mut tokens = vec!["0"; HOURS_PER_DAY];
        tokens[23] = "1";
        let schedule = tokens.join(",");
        assert_eq!(
            monday_at(23).evaluate(ScheduleInput::Schedule(&schedule)).unwrap(),
            Action::ON
        );
    }

    #[test]
    fn nth_in_month_tops_out_at_five() {
        for day in [29, 30, 31] {
            assert_eq!(nth_in_month(day), 5);
        }
        assert_eq!(nth_in_month(1), 1);
        assert_eq!(nth_in_month(7), 1);
        assert_eq!(nth_in_month(8), 2);
    }

    #[test]
    fn full_length_schedules_never_report_a_token_count_error() {
        // Whatever the token at the current hour decodes to, a 24-token
        // schedule is past count validation.
        for token in ["1", "0", "-7", "42", "*", "", "(1:2)", "up"] {
            for hour in [0, 7, 23] {
                let result = monday_at(hour).evaluate(ScheduleInput::Schedule(&repeat24(token)));
                assert!(
                    !matches!(result, Err(ScheduleError::InvalidTokenCount { .. })),
                    "token {token:?} at hour {hour}"
                );
            }
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let sch = monday_at(10);
        let t = tags(&[(ANYDAY, &repeat24("1")), ("Monday", &repeat24("0"))]);
        let first = sch.evaluate(ScheduleInput::Tags(&t)).unwrap();
        let second = sch.evaluate(ScheduleInput::Tags(&t)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn numeric_tag_values_coerce_to_strings() {
        let sch = monday_at(10);
        let mut t = HashMap::new();
        t.insert(DAY_OF_MONTH.to_string(), json!("11:1"));
        t.insert("Comment".to_string(), Value::Null);
        assert_eq!(sch.evaluate(ScheduleInput::Tags(&t)).unwrap(), Action::ON);
    }

    #[test]
    fn structured_tag_values_are_rejected() {
        let sch = monday_at(10);
        let mut t = HashMap::new();
        t.insert(ANYDAY.to_string(), json!({ "nested": true }));
        assert!(matches!(
            sch.evaluate(ScheduleInput::Tags(&t)),
            Err(ScheduleError::InvalidInput { .. })
        ));
    }

    #[test]
    fn unknown_zone_name_is_an_error() {
        assert!(matches!(
            TagScheduler::from_zone_name("Mars/Olympus_Mons"),
            Err(ScheduleError::InvalidTimezone { .. })
        ));
        assert!(TagScheduler::from_zone_name("America/New_York").is_ok());
    }
}
