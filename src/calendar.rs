//! Month grid over todo creation dates.

use std::collections::BTreeMap;

use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month, UtcOffset};

use crate::models::Todo;

pub const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// `YYYY-MM-DD`, the form used in calendar links.
const ISO_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn format_iso(date: Date) -> String {
    date.format(ISO_DATE).unwrap_or_default()
}

pub fn parse_iso(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), ISO_DATE).ok()
}

/// Todos grouped by the local calendar day they were created on.
#[derive(Debug, Default)]
pub struct DayBuckets {
    days: BTreeMap<Date, Vec<Todo>>,
}

impl DayBuckets {
    pub fn todos_on(&self, date: Date) -> &[Todo] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count_on(&self, date: Date) -> usize {
        self.todos_on(date).len()
    }
}

/// Todos without a creation timestamp are left out.
pub fn bucket_by_day(todos: &[Todo], offset: UtcOffset) -> DayBuckets {
    let mut days: BTreeMap<Date, Vec<Todo>> = BTreeMap::new();
    for todo in todos {
        if let Some(created_at) = todo.created_at {
            days.entry(created_at.to_offset(offset).date())
                .or_default()
                .push(todo.clone());
        }
    }
    DayBuckets { days }
}

/// Emitted for a click on a day cell; `todos` is empty for quiet days.
#[derive(Debug, Clone, Serialize)]
pub struct DayClick {
    pub date: Date,
    pub todos: Vec<Todo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarNav {
    Prev,
    Next,
    Today,
}

impl CalendarNav {
    /// Reads the `nav` query value; anything unrecognized is no move at all.
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prev" => Some(Self::Prev),
            "next" => Some(Self::Next),
            "today" => Some(Self::Today),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    cursor: Date,
    today: Date,
}

impl Calendar {
    /// Opens on today's month.
    pub fn new(today: Date) -> Self {
        Self {
            cursor: today,
            today,
        }
    }

    pub fn with_cursor(cursor: Date, today: Date) -> Self {
        Self { cursor, today }
    }

    pub fn cursor(&self) -> Date {
        self.cursor
    }

    pub fn today(&self) -> Date {
        self.today
    }

    pub fn year(&self) -> i32 {
        self.cursor.year()
    }

    pub fn month(&self) -> Month {
        self.cursor.month()
    }

    pub fn title(&self) -> String {
        format!("{} {}", self.month(), self.year())
    }

    pub fn previous_month(&mut self) {
        self.cursor = previous_month_start(self.cursor);
    }

    pub fn next_month(&mut self) {
        self.cursor = next_month_start(self.cursor);
    }

    /// Back to today's exact date, not the first of the month.
    pub fn go_to_today(&mut self) {
        self.cursor = self.today;
    }

    pub fn navigate(&mut self, nav: CalendarNav) {
        match nav {
            CalendarNav::Prev => self.previous_month(),
            CalendarNav::Next => self.next_month(),
            CalendarNav::Today => self.go_to_today(),
        }
    }

    /// Rebuilds the calendar a link points at: its `cursor` (today when
    /// missing or malformed) with the requested move applied. Unknown moves
    /// are ignored.
    pub fn from_link(cursor: Option<&str>, nav: Option<&str>, today: Date) -> Self {
        let cursor = cursor.and_then(parse_iso).unwrap_or(today);
        let mut calendar = Self::with_cursor(cursor, today);
        if let Some(nav) = nav.and_then(CalendarNav::from_param) {
            calendar.navigate(nav);
        }
        calendar
    }

    pub fn first_day(&self) -> Date {
        month_start(self.cursor)
    }

    pub fn days_in_month(&self) -> u8 {
        next_month_start(self.cursor)
            .previous_day()
            .map(|last| last.day())
            .unwrap_or(28)
    }

    pub fn date_for(&self, day: u8) -> Option<Date> {
        Date::from_calendar_date(self.year(), self.month(), day).ok()
    }

    pub fn is_today(&self, day: u8) -> bool {
        self.date_for(day) == Some(self.today)
    }

    /// Day numbers in display order, with `None` padding before the 1st so it
    /// lands on its weekday column (weeks start on Sunday).
    pub fn cells(&self) -> Vec<Option<u8>> {
        let leading = self.first_day().weekday().number_days_from_sunday() as usize;
        std::iter::repeat(None)
            .take(leading)
            .chain((1..=self.days_in_month()).map(Some))
            .collect()
    }

    /// `cells` cut into rows of seven; the last row is padded with `None`.
    pub fn weeks(&self) -> Vec<[Option<u8>; 7]> {
        self.cells()
            .chunks(7)
            .map(|chunk| {
                let mut week = [None; 7];
                week[..chunk.len()].copy_from_slice(chunk);
                week
            })
            .collect()
    }

    pub fn click(&self, day: u8, buckets: &DayBuckets) -> Option<DayClick> {
        let date = self.date_for(day)?;
        Some(DayClick {
            date,
            todos: buckets.todos_on(date).to_vec(),
        })
    }
}

fn month_start(date: Date) -> Date {
    date.replace_day(1).unwrap_or(date)
}

fn previous_month_start(date: Date) -> Date {
    let first = month_start(date);
    first.previous_day().map(month_start).unwrap_or(first)
}

fn next_month_start(date: Date) -> Date {
    let first = month_start(date);
    let (year, month) = match first.month() {
        Month::December => (first.year() + 1, Month::January),
        month => (first.year(), month.next()),
    };
    Date::from_calendar_date(year, month, 1).unwrap_or(first)
}
