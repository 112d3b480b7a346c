//! Pure aggregation over ledger snapshots.
//!
//! All money amounts are `Cents`, integer minor units of the configured
//! display currency. Summation over `i64` is exact, so totals carry no
//! accumulated rounding error no matter how many entries are involved.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Local, Months, NaiveDate};

use crate::model::{EntryKind, LedgerEntry, Vehicle};

/// Integer minor units (e.g. cents). Sign is carried by [`EntryKind`], not
/// by the stored value.
pub type Cents = i64;

pub const UNKNOWN_VEHICLE_LABEL: &str = "Unknown vehicle";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthlyTotals {
    pub income: Cents,
    pub expense: Cents,
    pub net: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub income: Cents,
    pub expense: Cents,
    pub balance: Cents,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub income: Cents,
    pub expense: Cents,
    pub balance: Cents,
}

/// Local calendar day of an ISO-8601 date or date-time string. `None` for
/// strings that parse as neither; aggregations skip such entries.
pub fn entry_day(raw: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn month_start(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    month_start(date)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Income/expense/net for the calendar month containing `anchor`.
pub fn monthly_totals(entries: &[LedgerEntry], anchor: NaiveDate) -> MonthlyTotals {
    let (Some(start), Some(end)) = (month_start(anchor), month_end(anchor)) else {
        return MonthlyTotals::default();
    };
    let mut totals = MonthlyTotals::default();
    for entry in entries {
        let Some(day) = entry_day(&entry.date) else {
            continue;
        };
        if day < start || day > end {
            continue;
        }
        match entry.kind {
            EntryKind::Income => totals.income += entry.amount_cents,
            EntryKind::Expense => totals.expense += entry.amount_cents,
        }
    }
    totals.net = totals.income - totals.expense;
    totals
}

/// Per-day summaries over `[start, end]` inclusive, newest day first.
pub fn daily_breakdown(entries: &[LedgerEntry], start: NaiveDate, end: NaiveDate) -> Vec<DaySummary> {
    let mut days: BTreeMap<NaiveDate, DaySummary> = BTreeMap::new();
    for entry in entries {
        let Some(day) = entry_day(&entry.date) else {
            continue;
        };
        if day < start || day > end {
            continue;
        }
        let summary = days.entry(day).or_insert(DaySummary {
            day,
            income: 0,
            expense: 0,
            balance: 0,
        });
        match entry.kind {
            EntryKind::Income => {
                summary.income += entry.amount_cents;
                summary.balance += entry.amount_cents;
            }
            EntryKind::Expense => {
                summary.expense += entry.amount_cents;
                summary.balance -= entry.amount_cents;
            }
        }
    }
    days.into_values().rev().collect()
}

/// Totals over `[start, end]` inclusive whole days.
pub fn range_summary(entries: &[LedgerEntry], start: NaiveDate, end: NaiveDate) -> RangeSummary {
    let mut summary = RangeSummary::default();
    for entry in entries {
        let Some(day) = entry_day(&entry.date) else {
            continue;
        };
        if day < start || day > end {
            continue;
        }
        match entry.kind {
            EntryKind::Income => summary.income += entry.amount_cents,
            EntryKind::Expense => summary.expense += entry.amount_cents,
        }
    }
    summary.balance = summary.income - summary.expense;
    summary
}

/// Newest entries first, capped at `limit`. Ties on day keep the larger id
/// (most recently created) first.
pub fn recent_entries(entries: &[LedgerEntry], limit: usize) -> Vec<LedgerEntry> {
    let mut sorted: Vec<LedgerEntry> = entries.to_vec();
    sorted.sort_by(|a, b| {
        let da = entry_day(&a.date);
        let db = entry_day(&b.date);
        db.cmp(&da).then(b.id.cmp(&a.id))
    });
    sorted.truncate(limit);
    sorted
}

/// Alias of the referenced vehicle, or [`UNKNOWN_VEHICLE_LABEL`] when the
/// vehicle has been deleted since the entry was written.
pub fn vehicle_label(vehicles: &[Vehicle], vehicle_id: i64) -> String {
    vehicles
        .iter()
        .find(|v| v.id == vehicle_id)
        .map(|v| v.alias.clone())
        .unwrap_or_else(|| UNKNOWN_VEHICLE_LABEL.to_string())
}

/// Month navigation anchored to the first of a month. Moving forward is
/// clamped at the calendar month containing "today": the UI never shows a
/// future month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthCursor {
    anchor: NaiveDate,
}

impl MonthCursor {
    pub fn at(date: NaiveDate) -> Self {
        MonthCursor {
            anchor: month_start(date).unwrap_or(date),
        }
    }

    /// First day of the viewed month.
    pub fn anchor(self) -> NaiveDate {
        self.anchor
    }

    pub fn prev(self) -> Self {
        match self.anchor.checked_sub_months(Months::new(1)) {
            Some(anchor) => MonthCursor { anchor },
            None => self,
        }
    }

    /// Advance one month, unless that would pass the month containing
    /// `today`; returns the unchanged cursor in that case.
    pub fn next(self, today: NaiveDate) -> Self {
        let Some(next) = self.anchor.checked_add_months(Months::new(1)) else {
            return self;
        };
        match month_start(today) {
            Some(current) if next <= current => MonthCursor { anchor: next },
            _ => self,
        }
    }

    pub fn is_current(self, today: NaiveDate) -> bool {
        month_start(today) == Some(self.anchor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(id: i64, date: &str, kind: EntryKind, amount_cents: Cents) -> LedgerEntry {
        LedgerEntry {
            id,
            vehicle_id: 1,
            date: date.to_string(),
            kind,
            amount_cents,
            description: String::new(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    #[test]
    fn monthly_totals_filters_to_anchor_month() {
        let entries = vec![
            entry(1, "2024-03-15", EntryKind::Income, 5000),
            entry(2, "2024-03-20", EntryKind::Expense, 1200),
            entry(3, "2024-04-01", EntryKind::Income, 9999),
        ];
        let totals = monthly_totals(&entries, day(2024, 3, 1));
        assert_eq!(
            totals,
            MonthlyTotals {
                income: 5000,
                expense: 1200,
                net: 3800
            }
        );
    }

    #[test]
    fn monthly_totals_includes_month_boundaries() {
        let entries = vec![
            entry(1, "2024-02-01", EntryKind::Income, 100),
            entry(2, "2024-02-29", EntryKind::Income, 1),
            entry(3, "2024-01-31", EntryKind::Income, 7),
            entry(4, "2024-03-01", EntryKind::Income, 7),
        ];
        let totals = monthly_totals(&entries, day(2024, 2, 14));
        assert_eq!(totals.income, 101);
    }

    #[test]
    fn same_day_income_and_expense_balance() {
        let entries = vec![
            entry(1, "2024-05-10", EntryKind::Income, 10000),
            entry(2, "2024-05-10", EntryKind::Expense, 3000),
        ];
        let days = daily_breakdown(&entries, day(2024, 5, 1), day(2024, 5, 31));
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].income, 10000);
        assert_eq!(days[0].expense, 3000);
        assert_eq!(days[0].balance, 7000);
    }

    #[test]
    fn daily_breakdown_sorts_newest_first() {
        let entries = vec![
            entry(1, "2024-05-01", EntryKind::Income, 1),
            entry(2, "2024-05-03", EntryKind::Income, 2),
            entry(3, "2024-05-02", EntryKind::Income, 3),
        ];
        let days = daily_breakdown(&entries, day(2024, 5, 1), day(2024, 5, 31));
        let order: Vec<NaiveDate> = days.iter().map(|d| d.day).collect();
        assert_eq!(
            order,
            vec![day(2024, 5, 3), day(2024, 5, 2), day(2024, 5, 1)]
        );
    }

    #[test]
    fn date_time_strings_group_by_local_day_portion() {
        let entries = vec![
            entry(1, "2024-05-10T08:30:00", EntryKind::Income, 10),
            entry(2, "2024-05-10", EntryKind::Income, 5),
        ];
        let days = daily_breakdown(&entries, day(2024, 5, 1), day(2024, 5, 31));
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].income, 15);
    }

    #[test]
    fn unparseable_dates_are_skipped() {
        let entries = vec![
            entry(1, "not-a-date", EntryKind::Income, 100),
            entry(2, "2024-05-10", EntryKind::Income, 5),
        ];
        let summary = range_summary(&entries, day(2024, 1, 1), day(2024, 12, 31));
        assert_eq!(summary.income, 5);
    }

    #[test]
    fn range_summary_is_inclusive_of_both_ends() {
        let entries = vec![
            entry(1, "2024-05-01", EntryKind::Income, 1),
            entry(2, "2024-05-31", EntryKind::Expense, 2),
            entry(3, "2024-06-01", EntryKind::Income, 100),
        ];
        let summary = range_summary(&entries, day(2024, 5, 1), day(2024, 5, 31));
        assert_eq!(summary.income, 1);
        assert_eq!(summary.expense, 2);
        assert_eq!(summary.balance, -1);
    }

    #[test]
    fn recent_entries_caps_and_orders() {
        let entries = vec![
            entry(1, "2024-05-01", EntryKind::Income, 1),
            entry(2, "2024-05-03", EntryKind::Income, 2),
            entry(3, "2024-05-03", EntryKind::Income, 3),
        ];
        let recent = recent_entries(&entries, 2);
        let ids: Vec<i64> = recent.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn vehicle_label_falls_back_for_orphans() {
        let vehicles = vec![Vehicle {
            id: 1,
            alias: "Red Bike".into(),
            plate: "ABC123".into(),
        }];
        assert_eq!(vehicle_label(&vehicles, 1), "Red Bike");
        assert_eq!(vehicle_label(&vehicles, 42), UNKNOWN_VEHICLE_LABEL);
    }

    #[test]
    fn month_cursor_clamps_at_current_month() {
        let today = day(2024, 6, 15);
        let current = MonthCursor::at(today);
        assert!(current.is_current(today));
        assert_eq!(current.next(today), current);

        let back = current.prev();
        assert_eq!(back.anchor(), day(2024, 5, 1));
        assert_eq!(back.next(today).anchor(), day(2024, 6, 1));
    }

    proptest! {
        #[test]
        fn net_equals_income_minus_expense(
            amounts in proptest::collection::vec((0i64..1_000_000, any::<bool>(), 1u32..28), 0..200)
        ) {
            let entries: Vec<LedgerEntry> = amounts
                .iter()
                .enumerate()
                .map(|(i, (amount, is_income, dom))| entry(
                    i as i64,
                    &format!("2024-03-{dom:02}"),
                    if *is_income { EntryKind::Income } else { EntryKind::Expense },
                    *amount,
                ))
                .collect();

            let totals = monthly_totals(&entries, day(2024, 3, 1));
            prop_assert_eq!(totals.net, totals.income - totals.expense);

            // Idempotent on a fixed snapshot.
            prop_assert_eq!(totals, monthly_totals(&entries, day(2024, 3, 1)));
            let breakdown = daily_breakdown(&entries, day(2024, 3, 1), day(2024, 3, 31));
            prop_assert_eq!(&breakdown, &daily_breakdown(&entries, day(2024, 3, 1), day(2024, 3, 31)));

            // Daily balances sum to the monthly net.
            let daily_net: i64 = breakdown.iter().map(|d| d.balance).sum();
            prop_assert_eq!(daily_net, totals.net);
        }
    }
}
