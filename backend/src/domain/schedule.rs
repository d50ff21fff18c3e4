//! Cadences for scheduled jobs.
//!
//! Cadences are written the way the hosting platform spells them
//! (`every 1 minute`, `every 24 hours`, `0 2 * * *`, `every monday 09:00`) and
//! evaluated in UTC.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Days, NaiveTime, TimeDelta, Utc, Weekday};
use thiserror::Error;

/// Errors raised while parsing a cadence expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceParseError {
    /// Expression does not follow any supported form.
    #[error("unsupported cadence `{0}`")]
    Unsupported(String),
    /// Interval amount is zero or not a number.
    #[error("invalid cadence interval in `{0}`")]
    InvalidInterval(String),
    /// Clock time is out of range.
    #[error("invalid cadence time in `{0}`")]
    InvalidTime(String),
}

/// When a scheduled job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval measured from the previous tick.
    Every(Duration),
    /// Once per day at a wall-clock time.
    DailyAt(NaiveTime),
    /// Once per week on a weekday at a wall-clock time.
    WeeklyAt(Weekday, NaiveTime),
}

impl Cadence {
    /// First fire instant strictly after `now`.
    ///
    /// # Examples
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use reactors::domain::Cadence;
    ///
    /// let cadence: Cadence = "0 2 * * *".parse().expect("daily cron");
    /// let now = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 0).single().expect("valid time");
    /// let next = cadence.next_after(now);
    /// assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 2, 2, 0, 0).single().expect("valid time"));
    /// ```
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::Every(interval) => {
                let step = TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX);
                now.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
            Self::DailyAt(time) => {
                let today = now.date_naive().and_time(time).and_utc();
                if today > now {
                    today
                } else {
                    today
                        .checked_add_days(Days::new(1))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                }
            }
            Self::WeeklyAt(weekday, time) => {
                let current = now.weekday().num_days_from_monday();
                let target = weekday.num_days_from_monday();
                let ahead = if target >= current {
                    target - current
                } else {
                    target + 7 - current
                };
                let candidate = now
                    .date_naive()
                    .and_time(time)
                    .and_utc()
                    .checked_add_days(Days::new(u64::from(ahead)))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                if candidate > now {
                    candidate
                } else {
                    candidate
                        .checked_add_days(Days::new(7))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                }
            }
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Every(interval) => write!(f, "every {} seconds", interval.as_secs()),
            Self::DailyAt(time) => write!(f, "{} {} * * *", time.format("%-M"), time.format("%-H")),
            Self::WeeklyAt(weekday, time) => {
                write!(f, "every {weekday} {}", time.format("%H:%M"))
            }
        }
    }
}

impl FromStr for Cadence {
    type Err = CadenceParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let expression = raw.trim().to_ascii_lowercase();
        let words: Vec<&str> = expression.split_whitespace().collect();
        match words.as_slice() {
            ["every", "day", time] => Ok(Self::DailyAt(parse_clock(raw, time)?)),
            ["every", day_name, time] if time.contains(':') => {
                let weekday = day_name
                    .parse::<Weekday>()
                    .map_err(|_| CadenceParseError::Unsupported(raw.to_owned()))?;
                Ok(Self::WeeklyAt(weekday, parse_clock(raw, time)?))
            }
            ["every", amount, unit] => parse_interval(raw, amount, unit),
            [minute_field, hour_field, "*", "*", "*"] => {
                let minute = minute_field
                    .parse::<u32>()
                    .map_err(|_| CadenceParseError::InvalidTime(raw.to_owned()))?;
                let hour = hour_field
                    .parse::<u32>()
                    .map_err(|_| CadenceParseError::InvalidTime(raw.to_owned()))?;
                NaiveTime::from_hms_opt(hour, minute, 0)
                    .map(Self::DailyAt)
                    .ok_or_else(|| CadenceParseError::InvalidTime(raw.to_owned()))
            }
            _ => Err(CadenceParseError::Unsupported(raw.to_owned())),
        }
    }
}

fn parse_interval(raw: &str, amount: &str, unit: &str) -> Result<Cadence, CadenceParseError> {
    let count = amount
        .parse::<u64>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| CadenceParseError::InvalidInterval(raw.to_owned()))?;
    let seconds_per_unit = match unit {
        "minute" | "minutes" => 60,
        "hour" | "hours" => 3600,
        _ => return Err(CadenceParseError::Unsupported(raw.to_owned())),
    };
    Ok(Cadence::Every(Duration::from_secs(
        count.saturating_mul(seconds_per_unit),
    )))
}

fn parse_clock(raw: &str, time: &str) -> Result<NaiveTime, CadenceParseError> {
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| CadenceParseError::InvalidTime(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    //! Unit tests for cadence parsing and next-fire computation.

    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        // January 2025: the 6th is a Monday.
        Utc.with_ymd_and_hms(2025, 1, day, hour, minute, 0)
            .single()
            .expect("valid time")
    }

    #[rstest]
    #[case("every 1 minute", Duration::from_secs(60))]
    #[case("every 60 minutes", Duration::from_secs(3600))]
    #[case("every 24 hours", Duration::from_secs(86_400))]
    #[case("Every 2 Hours", Duration::from_secs(7200))]
    fn parses_intervals(#[case] raw: &str, #[case] expected: Duration) {
        assert_eq!(raw.parse::<Cadence>(), Ok(Cadence::Every(expected)));
    }

    #[rstest]
    fn parses_daily_cron() {
        let expected = NaiveTime::from_hms_opt(2, 0, 0).expect("valid time");
        assert_eq!("0 2 * * *".parse::<Cadence>(), Ok(Cadence::DailyAt(expected)));
    }

    #[rstest]
    fn parses_weekly_expression() {
        let expected = NaiveTime::from_hms_opt(9, 0, 0).expect("valid time");
        assert_eq!(
            "every monday 09:00".parse::<Cadence>(),
            Ok(Cadence::WeeklyAt(Weekday::Mon, expected))
        );
    }

    #[rstest]
    #[case("every 0 minutes")]
    #[case("every week")]
    #[case("0 25 * * *")]
    #[case("*/5 * * * *")]
    #[case("every funday 09:00")]
    fn rejects_unsupported_expressions(#[case] raw: &str) {
        assert!(raw.parse::<Cadence>().is_err());
    }

    #[rstest]
    #[case(at(1, 1, 0), at(1, 2, 0))]
    #[case(at(1, 2, 0), at(2, 2, 0))]
    #[case(at(1, 23, 59), at(2, 2, 0))]
    fn daily_fires_on_next_occurrence(#[case] now: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
        let cadence: Cadence = "0 2 * * *".parse().expect("cadence");
        assert_eq!(cadence.next_after(now), expected);
    }

    #[rstest]
    #[case(at(1, 12, 0), at(6, 9, 0))]
    #[case(at(6, 8, 59), at(6, 9, 0))]
    #[case(at(6, 9, 0), at(13, 9, 0))]
    fn weekly_fires_on_next_weekday(#[case] now: DateTime<Utc>, #[case] expected: DateTime<Utc>) {
        let cadence: Cadence = "every monday 09:00".parse().expect("cadence");
        assert_eq!(cadence.next_after(now), expected);
    }

    #[rstest]
    fn interval_adds_to_now() {
        let cadence = Cadence::Every(Duration::from_secs(60));
        assert_eq!(cadence.next_after(at(1, 0, 0)), at(1, 0, 1));
    }
}
