//! Lifecycle clock: display status and timing derived from timestamps.
//!
//! Nothing here talks to the backend. A `pending` track whose
//! `available_at` has passed since the last fetch is upgraded locally by
//! [`refresh`]; the upgrade is monotonic and idempotent.

use chrono::{DateTime, Utc};

use crate::track::{Track, TrackStatus};

const MS_PER_MINUTE: i64 = 60_000;
const MS_PER_HOUR: i64 = 3_600_000;
const MS_PER_DAY: i64 = 86_400_000;

/// True iff the track is still `pending` but its maturation date has passed.
pub fn is_now_available(track: &Track, now: DateTime<Utc>) -> bool {
    track.status == TrackStatus::Pending && track.available_at.is_some_and(|at| at <= now)
}

/// Countdown until a sealed track matures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRemaining {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl TimeRemaining {
    fn from_millis(diff: i64) -> Self {
        Self {
            days: diff / MS_PER_DAY,
            hours: (diff / MS_PER_HOUR) % 24,
            minutes: (diff / MS_PER_MINUTE) % 60,
        }
    }
}

impl std::fmt::Display for TimeRemaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.days > 0 {
            write!(f, "{}d ", self.days)?;
        }
        if self.hours > 0 {
            write!(f, "{}h ", self.hours)?;
        }
        write!(f, "{}m remaining", self.minutes)
    }
}

/// `None` unless the track is `pending` and `available_at` is in the future.
pub fn time_remaining(track: &Track, now: DateTime<Utc>) -> Option<TimeRemaining> {
    if track.status != TrackStatus::Pending {
        return None;
    }
    let available = track.available_at?;
    let diff = (available - now).num_milliseconds();
    if diff <= 0 {
        return None;
    }
    Some(TimeRemaining::from_millis(diff))
}

/// Share of the maturation period elapsed, in `[0, 100]`.
///
/// Returns 0 when either timestamp is missing or the period is empty, so the
/// result is never NaN or infinite.
pub fn progress(track: &Track, now: DateTime<Utc>) -> f64 {
    let (Some(locked), Some(available)) = (track.locked_at, track.available_at) else {
        return 0.0;
    };
    let total = (available - locked).num_milliseconds();
    if total <= 0 {
        return 0.0;
    }
    let elapsed = (now - locked).num_milliseconds();
    (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Upgrade every matured `pending` track to `available`. Returns how many
/// changed.
pub fn refresh(tracks: &mut [Track], now: DateTime<Utc>) -> usize {
    let mut upgraded = 0;
    for track in tracks.iter_mut() {
        if is_now_available(track, now) {
            track.status = TrackStatus::Available;
            upgraded += 1;
        }
    }
    upgraded
}

/// Whole days the track has spent sealed (or has been sealed for).
pub fn days_sealed(track: &Track, now: DateTime<Utc>) -> Option<i64> {
    let locked = track.locked_at?;
    Some((now - locked).num_milliseconds().max(0) / MS_PER_DAY)
}

/// Short status line: how long the track has been sealed, or how long ago
/// it was added if it never was.
pub fn seal_summary(track: &Track, now: DateTime<Utc>) -> String {
    match days_sealed(track, now) {
        Some(days) => match track.status {
            TrackStatus::Revealed => format!("sealed for {}d", days),
            TrackStatus::Available => format!("ready after {}d", days),
            TrackStatus::Pending | TrackStatus::Active => format!("{}d sealed", days),
        },
        None => format!("added {}", ago(track.created_at, now)),
    }
}

/// Coarse relative time, e.g. "3 days ago".
pub fn ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    let minutes = secs / 60;
    let hours = minutes / 60;
    let days = hours / 24;
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {} ago", unit)
        } else {
            format!("{} {}s ago", n, unit)
        }
    };
    if minutes < 1 {
        "just now".to_string()
    } else if hours < 1 {
        plural(minutes, "minute")
    } else if days < 1 {
        plural(hours, "hour")
    } else if days < 30 {
        plural(days, "day")
    } else if days < 365 {
        plural(days / 30, "month")
    } else {
        plural(days / 365, "year")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::fixtures::sealed;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_twenty_nine_of_thirty_days() {
        let track = sealed(1, "Song", now() - Duration::days(29));
        assert_eq!(
            time_remaining(&track, now()),
            Some(TimeRemaining {
                days: 1,
                hours: 0,
                minutes: 0
            })
        );
        assert!(!is_now_available(&track, now()));
        assert_eq!(time_remaining(&track, now()).unwrap().to_string(), "1d 0m remaining");
    }

    #[test]
    fn test_time_remaining_decomposition() {
        let mut track = sealed(1, "Song", now() - Duration::days(1));
        track.available_at = Some(
            now() + Duration::days(2) + Duration::hours(5) + Duration::minutes(7)
                + Duration::seconds(59),
        );
        let left = time_remaining(&track, now()).unwrap();
        assert_eq!((left.days, left.hours, left.minutes), (2, 5, 7));
        assert_eq!(left.to_string(), "2d 5h 7m remaining");
    }

    #[test]
    fn test_time_remaining_gone_at_maturity() {
        let track = sealed(1, "Song", now() - Duration::days(30));
        assert_eq!(time_remaining(&track, now()), None);
        assert!(is_now_available(&track, now()));
    }

    #[test]
    fn test_is_now_available_is_monotonic() {
        let track = sealed(1, "Song", now() - Duration::days(30));
        assert!(is_now_available(&track, now()));
        for later in [1, 60, 86_400, 10_000_000] {
            assert!(is_now_available(&track, now() + Duration::seconds(later)));
        }
    }

    #[test]
    fn test_only_pending_can_become_available() {
        let mut track = sealed(1, "Song", now() - Duration::days(40));
        track.status = TrackStatus::Revealed;
        track.revealed_at = Some(now());
        assert!(!is_now_available(&track, now()));
        assert_eq!(time_remaining(&track, now()), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        let locked = now();
        let track = sealed(1, "Song", locked);
        assert_eq!(progress(&track, locked - Duration::days(365)), 0.0);
        assert_eq!(progress(&track, locked + Duration::days(15)), 50.0);
        assert_eq!(progress(&track, locked + Duration::days(3650)), 100.0);
    }

    #[test]
    fn test_progress_degenerate_period() {
        let mut track = sealed(1, "Song", now());
        track.available_at = track.locked_at;
        let p = progress(&track, now() + Duration::days(1));
        assert_eq!(p, 0.0);
        assert!(p.is_finite());

        track.available_at = None;
        assert_eq!(progress(&track, now()), 0.0);
    }

    #[test]
    fn test_refresh_upgrades_once() {
        let mut tracks = vec![
            sealed(1, "matured", now() - Duration::days(31)),
            sealed(2, "young", now() - Duration::days(3)),
        ];
        assert_eq!(refresh(&mut tracks, now()), 1);
        assert_eq!(tracks[0].status, TrackStatus::Available);
        assert_eq!(tracks[1].status, TrackStatus::Pending);
        assert_eq!(refresh(&mut tracks, now()), 0);
    }

    #[test]
    fn test_seal_summary_per_status() {
        let mut track = sealed(1, "Song", now() - Duration::days(12));
        assert_eq!(seal_summary(&track, now()), "12d sealed");
        track.status = TrackStatus::Available;
        assert_eq!(seal_summary(&track, now()), "ready after 12d");
        track.status = TrackStatus::Revealed;
        assert_eq!(seal_summary(&track, now()), "sealed for 12d");

        track.status = TrackStatus::Active;
        track.locked_at = None;
        track.created_at = now() - Duration::hours(3);
        assert_eq!(seal_summary(&track, now()), "added 3 hours ago");
    }

    #[test]
    fn test_ago_buckets() {
        assert_eq!(ago(now(), now()), "just now");
        assert_eq!(ago(now() - Duration::minutes(1), now()), "1 minute ago");
        assert_eq!(ago(now() - Duration::days(2), now()), "2 days ago");
        assert_eq!(ago(now() - Duration::days(400), now()), "1 year ago");
    }
}
