use serde::{Deserialize, Serialize};
use chrono::{DateTime, Days, NaiveDate, Utc};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Creation-date window, expressed in whole UTC days.
///
/// `from` is inclusive, `until` is exclusive (midnight after the end day).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    /// Build a range from calendar days.
    ///
    /// A start day alone opens the range to the future. An end day without a
    /// start day is ignored and yields no range.
    pub fn from_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        let start = start?;
        let from = start.and_hms_opt(0, 0, 0)?.and_utc();
        let until = match end {
            Some(day) => Some(day.checked_add_days(Days::new(1))?.and_hms_opt(0, 0, 0)?.and_utc()),
            None => None,
        };
        Some(Self { from, until })
    }

    /// Closed window over whole days. Both ends are required; with either one
    /// missing there is no range.
    pub fn between_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        if end.is_none() {
            return None;
        }
        Self::from_days(start, end)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && self.until.map_or(true, |until| at < until)
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.size))
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}
