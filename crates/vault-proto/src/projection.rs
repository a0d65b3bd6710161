//! List projection: tab filter, date filter, sort, and time grouping.
//!
//! Everything is a pure function over a slice, re-run on every change.
//! Items only need to expose a `Track` through `AsRef`, so views can project
//! their own row types (e.g. an undo placeholder wrapping a track).
//!
//! Dates are compared in the time zone of the supplied `now`, with weeks
//! starting on Sunday.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::track::{Track, TrackStatus};

/// Vault tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    All,
    Sealed,
    Ready,
    Unearthed,
}

impl Tab {
    pub fn matches(&self, status: TrackStatus) -> bool {
        match self {
            Tab::All => true,
            Tab::Sealed => status == TrackStatus::Pending,
            Tab::Ready => status == TrackStatus::Available,
            Tab::Unearthed => status == TrackStatus::Revealed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::All => "all",
            Tab::Sealed => "sealed",
            Tab::Ready => "ready",
            Tab::Unearthed => "unearthed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "all" => Some(Tab::All),
            "sealed" => Some(Tab::Sealed),
            "ready" => Some(Tab::Ready),
            "unearthed" => Some(Tab::Unearthed),
            _ => None,
        }
    }
}

/// Date window over the seal timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateFilter {
    #[default]
    All,
    /// Tracks sealed this week. Unsealed tracks never match.
    ThisWeek,
    /// Tracks sealed this calendar month. Unsealed tracks never match.
    ThisMonth,
    /// Inclusive day range. Unsealed tracks are dated `now`.
    Range { from: NaiveDate, to: NaiveDate },
}

/// Sort order for track lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    Title,
    Artist,
}

impl SortOrder {
    pub fn label(&self) -> &'static str {
        match self {
            SortOrder::Newest => "newest",
            SortOrder::Oldest => "oldest",
            SortOrder::Title => "title",
            SortOrder::Artist => "artist",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "newest" => Some(SortOrder::Newest),
            "oldest" => Some(SortOrder::Oldest),
            "title" => Some(SortOrder::Title),
            "artist" => Some(SortOrder::Artist),
            _ => None,
        }
    }

    /// Next order in the cycle.
    pub fn next(&self) -> Self {
        match self {
            SortOrder::Newest => SortOrder::Oldest,
            SortOrder::Oldest => SortOrder::Title,
            SortOrder::Title => SortOrder::Artist,
            SortOrder::Artist => SortOrder::Newest,
        }
    }
}

/// Time bucket used to group a projected list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Period {
    ThisWeek,
    ThisMonth,
    Older,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::ThisWeek, Period::ThisMonth, Period::Older];

    pub fn label(&self) -> &'static str {
        match self {
            Period::ThisWeek => "Recent Discoveries",
            Period::ThisMonth => "This Month's Finds",
            Period::Older => "Ancient History",
        }
    }
}

/// The user's current view settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Projection {
    pub tab: Tab,
    pub date_filter: DateFilter,
    pub sort: SortOrder,
}

impl Projection {
    /// Filter then sort.
    pub fn apply<T, Tz>(&self, items: Vec<T>, now: &DateTime<Tz>) -> Vec<T>
    where
        T: AsRef<Track>,
        Tz: TimeZone,
    {
        let mut items: Vec<T> = items
            .into_iter()
            .filter(|item| {
                let track = item.as_ref();
                self.tab.matches(track.status) && matches_date(track, &self.date_filter, now)
            })
            .collect();
        sort_tracks(&mut items, self.sort, now);
        items
    }

    /// Filter, sort, then group.
    pub fn grouped<T, Tz>(&self, items: Vec<T>, now: &DateTime<Tz>) -> Vec<(Period, Vec<T>)>
    where
        T: AsRef<Track>,
        Tz: TimeZone,
    {
        group_by_period(self.apply(items, now), now)
    }
}

fn local_date<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

fn start_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

/// Same Sunday-started week as `now`.
pub fn is_this_week<Tz: TimeZone>(at: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    let today = now.date_naive();
    let week_start = start_of_week(today);
    let date = local_date(at, &now.timezone());
    date >= week_start && date < week_start + Duration::days(7)
}

/// Same calendar month as `now`.
pub fn is_this_month<Tz: TimeZone>(at: DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    let today = now.date_naive();
    let date = local_date(at, &now.timezone());
    date.year() == today.year() && date.month() == today.month()
}

pub fn matches_date<Tz: TimeZone>(track: &Track, filter: &DateFilter, now: &DateTime<Tz>) -> bool {
    match filter {
        DateFilter::All => true,
        DateFilter::ThisWeek => track.locked_at.is_some_and(|at| is_this_week(at, now)),
        DateFilter::ThisMonth => track.locked_at.is_some_and(|at| is_this_month(at, now)),
        DateFilter::Range { from, to } => {
            let (from, to) = if to < from { (to, from) } else { (from, to) };
            let date = local_date(track.sealed_or(now.with_timezone(&Utc)), &now.timezone());
            date >= *from && date <= *to
        }
    }
}

/// Case-insensitive comparison with a case-sensitive tie-break, so that
/// the order is total.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Stable sort in place.
pub fn sort_tracks<T, Tz>(items: &mut [T], order: SortOrder, now: &DateTime<Tz>)
where
    T: AsRef<Track>,
    Tz: TimeZone,
{
    let now = now.with_timezone(&Utc);
    match order {
        SortOrder::Newest => items.sort_by(|a, b| {
            b.as_ref().sealed_or(now).cmp(&a.as_ref().sealed_or(now))
        }),
        SortOrder::Oldest => items.sort_by(|a, b| {
            a.as_ref().sealed_or(now).cmp(&b.as_ref().sealed_or(now))
        }),
        SortOrder::Title => items.sort_by(|a, b| {
            collate(&a.as_ref().metadata.title, &b.as_ref().metadata.title)
        }),
        SortOrder::Artist => items.sort_by(|a, b| {
            collate(&a.as_ref().metadata.artist, &b.as_ref().metadata.artist)
        }),
    }
}

pub fn period_of<Tz: TimeZone>(track: &Track, now: &DateTime<Tz>) -> Period {
    let at = track.sealed_or(now.with_timezone(&Utc));
    if is_this_week(at, now) {
        Period::ThisWeek
    } else if is_this_month(at, now) {
        Period::ThisMonth
    } else {
        Period::Older
    }
}

/// Partition into the three periods, keeping relative order inside each
/// bucket. Empty buckets are omitted.
pub fn group_by_period<T, Tz>(items: Vec<T>, now: &DateTime<Tz>) -> Vec<(Period, Vec<T>)>
where
    T: AsRef<Track>,
    Tz: TimeZone,
{
    let mut buckets: [(Period, Vec<T>); 3] = [
        (Period::ThisWeek, Vec::new()),
        (Period::ThisMonth, Vec::new()),
        (Period::Older, Vec::new()),
    ];
    for item in items {
        let slot = match period_of(item.as_ref(), now) {
            Period::ThisWeek => 0,
            Period::ThisMonth => 1,
            Period::Older => 2,
        };
        buckets[slot].1.push(item);
    }
    buckets
        .into_iter()
        .filter(|(_, tracks)| !tracks.is_empty())
        .collect()
}

/// Per-tab counts shown next to the tab labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub sealed: usize,
    pub ready: usize,
    pub unearthed: usize,
}

pub fn status_counts<T: AsRef<Track>>(items: &[T]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for item in items {
        match item.as_ref().status {
            TrackStatus::Pending => counts.sealed += 1,
            TrackStatus::Available => counts.ready += 1,
            TrackStatus::Revealed => counts.unearthed += 1,
            TrackStatus::Active => {}
        }
    }
    counts
}
