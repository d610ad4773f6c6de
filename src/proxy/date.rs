use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use crate::error::{Result, StateError};
use crate::observe::PropKey;
use crate::value::{Container, ContainerKind};
use super::Observed;

const MS_PER_DAY: f64 = 86_400_000.0;
const MAX_TIME: f64 = 8.64e15;
/// `num_days_from_ce` of 1970-01-01.
const DAYS_FROM_CE_TO_EPOCH: i32 = 719_163;

/// Calendar access to an observed `Date`, in UTC.
///
/// Every getter depends on the date as a whole; every setter that changes the instant
/// fires it. Setters normalize out-of-range fields the way `Date` does (month 12 is
/// January of the next year, day 0 is the last day of the previous month).
#[derive(Debug, Clone)]
pub struct DateProxy {
    observed: Observed,
}

/// `[year, month (0-based), day, hours, minutes, seconds, milliseconds]`
type Fields = [f64; 7];

impl DateProxy {
    pub(crate) fn new(observed: Observed) -> Self {
        DateProxy { observed }
    }

    pub fn observed(&self) -> &Observed {
        &self.observed
    }

    fn raw_time(&self) -> Result<f64> {
        match &*self.observed.target().borrow() {
            Container::Date(ms) => Ok(*ms),
            other => Err(StateError::WrongContainer { expected: ContainerKind::Date, found: other.kind() }),
        }
    }

    fn field(&self, index: usize) -> Result<f64> {
        let time = self.get_time()?;
        Ok(fields_of(time).map_or(f64::NAN, |fields| fields[index]))
    }

    fn update(&self, index: usize, value: f64) -> Result<f64> {
        let time = self.raw_time()?;
        let new_time = match fields_of(time) {
            Some(mut fields) => {
                fields[index] = value;
                make_time(&fields)
            }
            None => f64::NAN,
        };
        self.store(new_time)
    }

    fn store(&self, time: f64) -> Result<f64> {
        let time = time_clip(time);
        let changed = match &mut *self.observed.target().borrow_mut() {
            Container::Date(ms) => {
                let changed = !(*ms == time || (ms.is_nan() && time.is_nan()));
                *ms = time;
                changed
            }
            other => return Err(StateError::WrongContainer { expected: ContainerKind::Date, found: other.kind() }),
        };
        if changed {
            self.observed.fire(PropKey::Date)?;
        }
        Ok(time)
    }

    /// Milliseconds since the epoch, `NaN` for an invalid date.
    pub fn get_time(&self) -> Result<f64> {
        let time = self.raw_time()?;
        self.observed.read(PropKey::Date)?;
        Ok(time)
    }

    pub fn get_full_year(&self) -> Result<f64> {
        self.field(0)
    }

    /// 0-based.
    pub fn get_month(&self) -> Result<f64> {
        self.field(1)
    }

    /// Day of the month, 1-based.
    pub fn get_date(&self) -> Result<f64> {
        self.field(2)
    }

    pub fn get_hours(&self) -> Result<f64> {
        self.field(3)
    }

    pub fn get_minutes(&self) -> Result<f64> {
        self.field(4)
    }

    pub fn get_seconds(&self) -> Result<f64> {
        self.field(5)
    }

    pub fn get_milliseconds(&self) -> Result<f64> {
        self.field(6)
    }

    pub fn set_time(&self, time: f64) -> Result<f64> {
        self.store(time)
    }

    pub fn set_full_year(&self, year: f64) -> Result<f64> {
        self.update(0, year)
    }

    pub fn set_month(&self, month: f64) -> Result<f64> {
        self.update(1, month)
    }

    pub fn set_date(&self, day: f64) -> Result<f64> {
        self.update(2, day)
    }

    pub fn set_hours(&self, hours: f64) -> Result<f64> {
        self.update(3, hours)
    }

    pub fn set_minutes(&self, minutes: f64) -> Result<f64> {
        self.update(4, minutes)
    }

    pub fn set_seconds(&self, seconds: f64) -> Result<f64> {
        self.update(5, seconds)
    }

    pub fn set_milliseconds(&self, ms: f64) -> Result<f64> {
        self.update(6, ms)
    }
}

fn fields_of(time: f64) -> Option<Fields> {
    if !time.is_finite() {
        return None;
    }
    let date = DateTime::from_timestamp_millis(time as i64)?;
    Some([
        date.year() as f64,
        date.month0() as f64,
        date.day() as f64,
        date.hour() as f64,
        date.minute() as f64,
        date.second() as f64,
        date.timestamp_subsec_millis() as f64,
    ])
}

fn make_time(fields: &Fields) -> f64 {
    if fields.iter().any(|f| !f.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, ms] = fields.map(f64::trunc);
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);
    let Some(first) = NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1) else {
        return f64::NAN;
    };
    let days = (first.num_days_from_ce() - DAYS_FROM_CE_TO_EPOCH) as f64 + day - 1.0;
    days * MS_PER_DAY + hours * 3_600_000.0 + minutes * 60_000.0 + seconds * 1000.0 + ms
}

fn time_clip(time: f64) -> f64 {
    if !time.is_finite() || time.abs() > MAX_TIME {
        f64::NAN
    } else {
        time.trunc()
    }
}
