//! schedule.rs — wall-clock side of the animation.
//!
//! A `Schedule` turns "now" into a progress fraction and a countdown;
//! a `Scheduler` decides when the marker and countdown should next be
//! refreshed.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

/// Default seconds between marker updates once the trip is under way.
pub const DEFAULT_UPDATE_SECS: i64 = 5;

const COUNTDOWN_PERIOD_SECS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Schedule {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Move the start to `begin`, keeping the scheduled duration.
    pub fn with_begin(self, begin: DateTime<Utc>) -> Self {
        Self { start: begin, end: begin + self.duration() }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Fraction of the scheduled duration elapsed at `now`, in `[0, 1]`.
    pub fn progress(&self, now: DateTime<Utc>) -> f64 {
        let total = self.duration().num_milliseconds();
        let elapsed = (now - self.start).num_milliseconds();
        if total <= 0 {
            return if elapsed >= 0 { 1.0 } else { 0.0 };
        }
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        let until = self.start - now;
        if until > Duration::zero() {
            Countdown::Pending(Span::from(until))
        } else {
            Countdown::Started(Span::from(now - self.start))
        }
    }
}

/// A whole-second time span split for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl From<Duration> for Span {
    fn from(d: Duration) -> Self {
        let total = d.num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: total / 3_600 % 24,
            minutes: total / 60 % 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d {}h {}m {}s", self.days, self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Pending(Span),
    Started(Span),
}

impl Countdown {
    pub fn is_pending(&self) -> bool {
        matches!(self, Countdown::Pending(_))
    }

    /// Map caption: the countdown, plus how far along the trip is once it
    /// has started.
    pub fn caption(&self, progress: f64) -> String {
        match self {
            Countdown::Pending(_) => self.to_string(),
            Countdown::Started(_) => format!("{self} · {:.1}% of the route travelled", progress * 100.0),
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Pending(span) => write!(f, "Starts in {span}"),
            Countdown::Started(span) => write!(f, "Started {span} ago"),
        }
    }
}

/// Parse an ISO-8601 timestamp. Accepts RFC 3339 with an offset, a naive
/// date-time or a bare date (both taken as UTC), or epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Some(t) = raw.parse().ok().and_then(|ms| Utc.timestamp_millis_opt(ms).single()) {
            return Ok(t);
        }
    }
    Err(Error::Time(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Recompute the tracker position.
    Marker,
    /// Refresh the countdown caption.
    Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Immediate,
    AtStart,
    Polling,
}

/// Timer plan for one loaded route: an immediate marker update, one at the
/// start timestamp if that is still ahead, then one every `interval`; the
/// countdown ticks every second until the start has passed.
#[derive(Debug, Clone)]
pub struct Scheduler {
    start: DateTime<Utc>,
    interval: Duration,
    phase: Phase,
    next_marker: DateTime<Utc>,
    next_countdown: Option<DateTime<Utc>>,
}

impl Scheduler {
    pub fn new(start: DateTime<Utc>, now: DateTime<Utc>, interval: Duration) -> Self {
        Self {
            start,
            interval,
            phase: Phase::Immediate,
            next_marker: now,
            next_countdown: Some(now),
        }
    }
}

/// Never ends: marker updates keep coming for as long as the route is loaded.
impl Iterator for Scheduler {
    type Item = (DateTime<Utc>, Tick);

    /// When the next tick is due and what it is. Ties go to the countdown.
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(at) = self.next_countdown {
            if at <= self.next_marker {
                self.next_countdown = (at < self.start).then(|| at + Duration::seconds(COUNTDOWN_PERIOD_SECS));
                return Some((at, Tick::Countdown));
            }
        }

        let at = self.next_marker;
        (self.phase, self.next_marker) = match self.phase {
            Phase::Immediate if self.start > at => (Phase::AtStart, self.start),
            _ => (Phase::Polling, at + self.interval),
        };
        Some((at, Tick::Marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 10, h, m, s).unwrap()
    }

    #[test]
    fn progress_is_clamped() {
        let schedule = Schedule::new(t(10, 0, 0), t(12, 0, 0));
        assert_eq!(schedule.progress(t(9, 0, 0)), 0.0);
        assert_relative_eq!(schedule.progress(t(11, 0, 0)), 0.5);
        assert_eq!(schedule.progress(t(13, 0, 0)), 1.0);
    }

    #[test]
    fn degenerate_window_jumps_at_start() {
        let schedule = Schedule::new(t(10, 0, 0), t(10, 0, 0));
        assert_eq!(schedule.progress(t(9, 59, 59)), 0.0);
        assert_eq!(schedule.progress(t(10, 0, 0)), 1.0);
    }

    #[test]
    fn begin_override_keeps_duration() {
        let schedule = Schedule::new(t(10, 0, 0), t(12, 0, 0)).with_begin(t(1, 0, 0));
        assert_eq!(schedule.start(), t(1, 0, 0));
        assert_eq!(schedule.end(), t(3, 0, 0));
    }

    #[test]
    fn countdown_before_and_after_start() {
        let start = Utc.with_ymd_and_hms(2024, 8, 12, 3, 4, 5).unwrap();
        let schedule = Schedule::new(start, start + Duration::days(1));

        let pending = schedule.countdown(t(0, 0, 0));
        assert!(pending.is_pending());
        assert_eq!(pending.to_string(), "Starts in 2d 3h 4m 5s");

        let started = schedule.countdown(start + Duration::seconds(61));
        assert_eq!(started.to_string(), "Started 0d 0h 1m 1s ago");

        assert!(!schedule.countdown(start).is_pending());
    }

    #[test]
    fn caption_keeps_the_countdown_after_the_start() {
        let start = t(10, 0, 0);
        let schedule = Schedule::new(start, t(20, 0, 0));

        assert_eq!(schedule.countdown(t(9, 0, 0)).caption(0.0), "Starts in 0d 1h 0m 0s");
        assert_eq!(
            schedule.countdown(t(11, 0, 0)).caption(0.1),
            "Started 0d 1h 0m 0s ago · 10.0% of the route travelled"
        );
    }

    #[test]
    fn countdown_floors_partial_seconds() {
        let schedule = Schedule::new(t(0, 0, 10), t(1, 0, 0));
        let now = t(0, 0, 0) + Duration::milliseconds(500);
        assert_eq!(schedule.countdown(now), Countdown::Pending(Span { days: 0, hours: 0, minutes: 0, seconds: 9 }));
    }

    #[test]
    fn parses_timestamp_flavours() {
        let want = t(0, 0, 0);
        assert_eq!(parse_timestamp("2024-08-10T00:00:00+00:00").unwrap(), want);
        assert_eq!(parse_timestamp("2024-08-10T02:00:00+02:00").unwrap(), want);
        assert_eq!(parse_timestamp("2024-08-10T00:00:00Z").unwrap(), want);
        assert_eq!(parse_timestamp("2024-08-10T00:00:00").unwrap(), want);
        assert_eq!(parse_timestamp("2024-08-10").unwrap(), want);
        assert_eq!(parse_timestamp(&want.timestamp_millis().to_string()).unwrap(), want);
        assert!(matches!(parse_timestamp("tomorrow"), Err(Error::Time(_))));
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn scheduler_waits_for_start_then_polls() {
        let now = t(10, 0, 0);
        let start = t(10, 0, 3);
        let scheduler = Scheduler::new(start, now, Duration::seconds(DEFAULT_UPDATE_SECS));

        let ticks: Vec<_> = scheduler.take(9).collect();
        assert_eq!(
            ticks,
            vec![
                (t(10, 0, 0), Tick::Countdown),
                (t(10, 0, 0), Tick::Marker),
                (t(10, 0, 1), Tick::Countdown),
                (t(10, 0, 2), Tick::Countdown),
                (t(10, 0, 3), Tick::Countdown),
                (t(10, 0, 3), Tick::Marker),
                (t(10, 0, 8), Tick::Marker),
                (t(10, 0, 13), Tick::Marker),
                (t(10, 0, 18), Tick::Marker),
            ]
        );
    }

    #[test]
    fn scheduler_polls_straight_away_when_already_started() {
        let now = t(10, 0, 0);
        let mut scheduler = Scheduler::new(t(9, 0, 0), now, Duration::seconds(10));

        assert_eq!(scheduler.next(), Some((now, Tick::Countdown)));
        assert_eq!(scheduler.next(), Some((now, Tick::Marker)));
        assert_eq!(scheduler.next(), Some((t(10, 0, 10), Tick::Marker)));
        assert_eq!(scheduler.next(), Some((t(10, 0, 20), Tick::Marker)));
    }

    #[test]
    fn scheduler_is_an_endless_iterator() {
        let now = t(10, 0, 0);
        let scheduler = Scheduler::new(t(9, 0, 0), now, Duration::seconds(1));

        let markers: Vec<_> = scheduler
            .filter(|(_, tick)| *tick == Tick::Marker)
            .map(|(at, _)| at)
            .skip(1000)
            .take(2)
            .collect();
        assert_eq!(markers, vec![now + Duration::seconds(1000), now + Duration::seconds(1001)]);
    }
}
