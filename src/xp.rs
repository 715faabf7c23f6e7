//! Append-only XP ledger.
//!
//! A source's contribution on a date is the sum of its rows for that date.
//! Reversal deletes those rows outright; amounts are never edited in place.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{UserDataBlob, XpEntry, XpSource};
use crate::storage::DataCache;

/// XP gained (positive) or lost (negative) by one operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpChange {
    pub delta: i64,
    pub day_total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyXp {
    pub date: NaiveDate,
    pub total: i64,
    pub entries: Vec<XpEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub total: i64,
    pub peak: i64,
    pub average: i64,
    pub active_days: usize,
}

impl UserDataBlob {
    pub(crate) fn append_xp(
        &mut self,
        date: NaiveDate,
        amount: i64,
        source: XpSource,
        source_id: &str,
        source_name: &str,
    ) -> XpEntry {
        let entry = XpEntry {
            id: Uuid::new_v4().to_string(),
            date,
            amount,
            source,
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            timestamp: Utc::now(),
        };
        self.xp_history.push(entry.clone());
        entry
    }

    /// Delete every row for `(source_id, date)` and return the amount removed.
    pub(crate) fn revert_xp_source(&mut self, source_id: &str, date: NaiveDate) -> i64 {
        let mut removed = 0;
        self.xp_history.retain(|row| {
            if row.source_id == source_id && row.date == date {
                removed += row.amount;
                false
            } else {
                true
            }
        });
        removed
    }

    pub(crate) fn xp_for_source(&self, source_id: &str, date: NaiveDate) -> i64 {
        self.xp_history
            .iter()
            .filter(|row| row.source_id == source_id && row.date == date)
            .map(|row| row.amount)
            .sum()
    }

    pub(crate) fn xp_for_date(&self, date: NaiveDate) -> i64 {
        self.xp_history
            .iter()
            .filter(|row| row.date == date)
            .map(|row| row.amount)
            .sum()
    }

    /// Replace a source's contribution with a single row of `amount` (none when
    /// `amount <= 0`) and report the difference.
    pub(crate) fn reprice_xp_source(
        &mut self,
        date: NaiveDate,
        amount: i64,
        source: XpSource,
        source_id: &str,
        source_name: &str,
    ) -> XpChange {
        let removed = self.revert_xp_source(source_id, date);
        if amount > 0 {
            self.append_xp(date, amount, source, source_id, source_name);
        }
        XpChange {
            delta: amount.max(0) - removed,
            day_total: self.xp_for_date(date),
        }
    }

    pub(crate) fn xp_for_month(&self, year: i32, month: u32) -> Vec<DailyXp> {
        let mut days: BTreeMap<NaiveDate, Vec<XpEntry>> = BTreeMap::new();
        for row in &self.xp_history {
            if row.date.year() == year && row.date.month() == month {
                days.entry(row.date).or_default().push(row.clone());
            }
        }
        days.into_iter()
            .map(|(date, entries)| DailyXp {
                date,
                total: entries.iter().map(|e| e.amount).sum(),
                entries,
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct XpLedger {
    cache: DataCache,
}

impl XpLedger {
    pub fn with_cache(cache: DataCache) -> Self {
        Self { cache }
    }

    pub fn add_xp(
        &self,
        date: NaiveDate,
        amount: i64,
        source: XpSource,
        source_id: &str,
        source_name: &str,
    ) -> crate::Result<XpEntry> {
        self.cache
            .mutate(|data| data.append_xp(date, amount, source, source_id, source_name))
    }

    pub fn remove_xp_for_source(&self, source_id: &str, date: NaiveDate) -> crate::Result<i64> {
        self.cache
            .mutate(|data| data.revert_xp_source(source_id, date))
    }

    pub fn get_xp_for_source(&self, source_id: &str, date: NaiveDate) -> Vec<XpEntry> {
        self.cache.read(|data| {
            data.xp_history
                .iter()
                .filter(|row| row.source_id == source_id && row.date == date)
                .cloned()
                .collect()
        })
    }

    pub fn get_xp_for_date(&self, date: NaiveDate) -> i64 {
        self.cache.read(|data| data.xp_for_date(date))
    }

    pub fn get_total_xp(&self) -> i64 {
        self.cache
            .read(|data| data.xp_history.iter().map(|row| row.amount).sum())
    }

    pub fn get_xp_for_month(&self, year: i32, month: u32) -> Vec<DailyXp> {
        self.cache.read(|data| data.xp_for_month(year, month))
    }

    /// Peak day, rounded average over active days, and active day count.
    pub fn month_summary(&self, year: i32, month: u32) -> MonthSummary {
        let days = self.get_xp_for_month(year, month);
        let active: Vec<i64> = days.iter().map(|d| d.total).filter(|t| *t > 0).collect();
        let average = if active.is_empty() {
            0
        } else {
            (active.iter().sum::<i64>() as f64 / active.len() as f64).round() as i64
        };
        MonthSummary {
            total: days.iter().map(|d| d.total).sum(),
            peak: days.iter().map(|d| d.total).max().unwrap_or(0).max(0),
            average,
            active_days: active.len(),
        }
    }
}
