use chrono::{Days, NaiveDate};

/// Days on either side of today that a board may be opened for
pub const WINDOW_DAYS: u64 = 10;

/// The rolling `[today - 10, today + 10]` range of usable dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    today: NaiveDate,
}

impl DateWindow {
    pub fn new(today: NaiveDate) -> Self {
        DateWindow { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn first(&self) -> NaiveDate {
        self.today.checked_sub_days(Days::new(WINDOW_DAYS)).unwrap_or(NaiveDate::MIN)
    }

    pub fn last(&self) -> NaiveDate {
        self.today.checked_add_days(Days::new(WINDOW_DAYS)).unwrap_or(NaiveDate::MAX)
    }

    /// Moves a date onto the nearer window boundary if it falls outside
    pub fn clamp(&self, date: NaiveDate) -> NaiveDate {
        date.clamp(self.first(), self.last())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first() && date <= self.last()
    }

    /// Shifts a date by whole days and clamps the result
    pub fn shift(&self, date: NaiveDate, delta: i64) -> NaiveDate {
        let shifted = if delta >= 0 {
            date.checked_add_days(Days::new(delta as u64))
        } else {
            date.checked_sub_days(Days::new(delta.unsigned_abs()))
        };
        self.clamp(shifted.unwrap_or(date))
    }

    /// All 21 dates of the window, oldest first
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.first().iter_days().take_while(|d| *d <= self.last()).collect()
    }
}

/// Parses `YYYY-MM-DD` or `YYYY/MM/DD`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y/%m/%d"))
        .ok()
}

/// Formats a date as the ISO key used everywhere in the board
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> DateWindow {
        DateWindow::new(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap())
    }

    #[test]
    fn test_clamp_to_nearer_boundary() {
        let w = window();
        assert_eq!(format_date(w.clamp(parse_date("2099-01-01").unwrap())), "2025-06-25");
        assert_eq!(format_date(w.clamp(parse_date("2000-01-01").unwrap())), "2025-06-05");
        let inside = parse_date("2025-06-20").unwrap();
        assert_eq!(w.clamp(inside), inside);
    }

    #[test]
    fn test_shift_stays_in_window() {
        let w = window();
        let last = w.last();
        assert_eq!(w.shift(last, 1), last);
        assert_eq!(format_date(w.shift(w.today(), -3)), "2025-06-12");
    }

    #[test]
    fn test_window_has_21_days() {
        let dates = window().dates();
        assert_eq!(dates.len(), 21);
        assert_eq!(format_date(dates[10]), "2025-06-15");
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025/01/10"), parse_date("2025-01-10"));
        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
    }
}
