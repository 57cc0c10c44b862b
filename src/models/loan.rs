//! Loan record model and related types

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

use super::item::ItemShort;
use super::patron::PatronShort;
use crate::error::{AppError, AppResult};

/// Open loans older than this many days are overdue
pub const OVERDUE_AFTER_DAYS: i64 = 30;

/// Loan record status. `Open -> Closed` is the only transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Open,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Open => "open",
            LoanStatus::Closed => "closed",
        }
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(LoanStatus::Open),
            "closed" => Ok(LoanStatus::Closed),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// One borrow transaction as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanRecord {
    pub id: i32,
    pub item_id: i32,
    pub patron_id: i32,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub issued_by: i32,
    pub returned_by: Option<i32>,
    pub status: LoanStatus,
}

impl LoanRecord {
    pub fn is_open(&self) -> bool {
        self.status == LoanStatus::Open
    }

    /// Whole days on loan, up to the return or up to `now` while open
    pub fn days_on_loan(&self, now: DateTime<Utc>) -> i64 {
        days_between(self.issued_at, self.returned_at.unwrap_or(now))
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && now - self.issued_at > Duration::days(OVERDUE_AFTER_DAYS)
    }
}

/// Insert request for a new open loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub item_id: i32,
    pub patron_id: i32,
    pub issued_by: i32,
    pub issued_at: DateTime<Utc>,
}

/// Whole days elapsed between two instants, truncated
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(0)
}

/// Ledger row joined with its item and patron, as returned by the store
#[derive(Debug, Clone)]
pub struct LoanEntry {
    pub record: LoanRecord,
    pub item: ItemShort,
    pub patron: PatronShort,
}

/// Loan with its item and patron for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    pub id: i32,
    pub item_id: i32,
    pub patron_id: i32,
    pub issued_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub issued_by: i32,
    pub returned_by: Option<i32>,
    pub status: LoanStatus,
    pub item: ItemShort,
    pub patron: PatronShort,
    pub days_on_loan: i64,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn from_entry(entry: LoanEntry, now: DateTime<Utc>) -> Self {
        let LoanEntry { record, item, patron } = entry;
        Self {
            days_on_loan: record.days_on_loan(now),
            is_overdue: record.is_overdue(now),
            id: record.id,
            item_id: record.item_id,
            patron_id: record.patron_id,
            issued_at: record.issued_at,
            returned_at: record.returned_at,
            issued_by: record.issued_by,
            returned_by: record.returned_by,
            status: record.status,
            item,
            patron,
        }
    }
}

/// Result of a successful return
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnReceipt {
    pub loan_id: i32,
    pub item: ItemShort,
    pub patron: PatronShort,
    pub issued_at: DateTime<Utc>,
    pub returned_at: DateTime<Utc>,
    pub days_on_loan: i64,
}

/// Ledger history filter, with date bounds already resolved to instants
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub item_id: Option<i32>,
    pub patron_id: Option<i32>,
    pub status: Option<LoanStatus>,
    /// Inclusive lower bound on `issued_at`
    pub issued_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `issued_at`
    pub issued_before: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    /// Whether a record passes this filter
    pub fn matches(&self, record: &LoanRecord) -> bool {
        self.item_id.map_or(true, |id| record.item_id == id)
            && self.patron_id.map_or(true, |id| record.patron_id == id)
            && self.status.map_or(true, |s| record.status == s)
            && self.issued_from.map_or(true, |from| record.issued_at >= from)
            && self.issued_before.map_or(true, |before| record.issued_at < before)
    }
}

/// History query as accepted from clients
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanHistoryQuery {
    pub item_id: Option<i32>,
    pub patron_id: Option<i32>,
    pub status: Option<LoanStatus>,
    /// First local calendar date of `issued_at`, inclusive
    pub date_from: Option<NaiveDate>,
    /// Last local calendar date of `issued_at`, inclusive
    pub date_to: Option<NaiveDate>,
}

impl LoanHistoryQuery {
    pub fn to_filter(&self) -> AppResult<HistoryFilter> {
        let (issued_from, issued_before) = DateRange {
            from: self.date_from,
            to: self.date_to,
        }
        .bounds()?;

        Ok(HistoryFilter {
            item_id: self.item_id,
            patron_id: self.patron_id,
            status: self.status,
            issued_from,
            issued_before,
        })
    }
}

/// Inclusive range of local calendar dates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// Resolve to `[start, end)` instants in UTC
    pub fn bounds(&self) -> AppResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(AppError::Validation(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }

        let start = self.from.map(local_day_start).transpose()?;
        let end = self
            .to
            .map(|d| {
                d.succ_opt()
                    .ok_or_else(|| AppError::Validation(format!("date_to {} is out of range", d)))
                    .and_then(local_day_start)
            })
            .transpose()?;

        Ok((start, end))
    }
}

/// UTC instant of local midnight starting `date`
pub fn local_day_start(date: NaiveDate) -> AppResult<DateTime<Utc>> {
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| AppError::Validation(format!("Invalid date {}", date)))?;
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::Validation(format!("No local midnight on {}", date)))
}

/// `[start, end)` of the local calendar day containing `now`
pub fn local_today_bounds(now: DateTime<Utc>) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let today = now.with_timezone(&Local).date_naive();
    let (start, end) = DateRange {
        from: Some(today),
        to: Some(today),
    }
    .bounds()?;
    match (start, end) {
        (Some(start), Some(end)) => Ok((start, end)),
        _ => Err(AppError::Internal("Unresolved day bounds".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(issued_at: DateTime<Utc>, returned_at: Option<DateTime<Utc>>) -> LoanRecord {
        LoanRecord {
            id: 1,
            item_id: 10,
            patron_id: 20,
            issued_at,
            returned_at,
            issued_by: 1,
            returned_by: returned_at.map(|_| 1),
            status: if returned_at.is_some() {
                LoanStatus::Closed
            } else {
                LoanStatus::Open
            },
        }
    }

    #[test]
    fn test_days_on_loan_truncates() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let returned = issued + Duration::days(3) + Duration::hours(23);
        assert_eq!(record(issued, Some(returned)).days_on_loan(Utc::now()), 3);
        assert_eq!(record(issued, None).days_on_loan(issued + Duration::hours(5)), 0);
    }

    #[test]
    fn test_overdue_only_when_open_past_threshold() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = issued + Duration::days(31);
        assert!(record(issued, None).is_overdue(now));
        assert!(!record(issued, None).is_overdue(issued + Duration::days(30)));
        assert!(!record(issued, Some(now)).is_overdue(now));
    }

    #[test]
    fn test_history_filter_matches() {
        let issued = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let rec = record(issued, None);

        assert!(HistoryFilter::default().matches(&rec));
        assert!(HistoryFilter {
            item_id: Some(10),
            status: Some(LoanStatus::Open),
            ..Default::default()
        }
        .matches(&rec));
        assert!(!HistoryFilter {
            patron_id: Some(99),
            ..Default::default()
        }
        .matches(&rec));
        assert!(!HistoryFilter {
            issued_before: Some(issued),
            ..Default::default()
        }
        .matches(&rec));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let (start, end) = DateRange {
            from: Some(day),
            to: Some(day),
        }
        .bounds()
        .unwrap();
        let (start, end) = (start.unwrap(), end.unwrap());
        assert!(end > start);
        assert!(end - start >= Duration::hours(23));

        let noon = Local
            .from_local_datetime(&day.and_hms_opt(12, 0, 0).unwrap())
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert!(noon >= start && noon < end);
    }

    #[test]
    fn test_date_range_rejects_inverted() {
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 11),
            to: NaiveDate::from_ymd_opt(2024, 5, 10),
        };
        assert!(matches!(range.bounds(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_history_query_to_filter() {
        let query = LoanHistoryQuery {
            item_id: Some(3),
            date_from: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.item_id, Some(3));
        assert!(filter.issued_from.is_some());
        assert!(filter.issued_before.is_none());

        let inverted = LoanHistoryQuery {
            date_from: NaiveDate::from_ymd_opt(2024, 5, 2),
            date_to: NaiveDate::from_ymd_opt(2024, 5, 1),
            ..Default::default()
        };
        assert!(inverted.to_filter().is_err());
    }

    #[test]
    fn test_today_bounds_contain_now() {
        let now = Utc::now();
        let (start, end) = local_today_bounds(now).unwrap();
        assert!(start <= now && now < end);
    }
}
