use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::debug;

use crate::cell::CellValue;
use crate::datetime::to_calendar_date;

/// Days on which task occurrences may
/// land, in the order the sheet lists
/// them.
#[derive(Debug, Clone, Default)]
pub struct WorkingDateSet {
  dates: Vec<NaiveDate>,
  index: BTreeSet<NaiveDate>
}

/// The valid occurrence window for one
/// computation pass.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct UpcomingWindow {
  pub last_working_date:
    Option<NaiveDate>,
  pub dates_in_range: Vec<NaiveDate>
}

impl WorkingDateSet {
  pub fn new(
    dates: Vec<NaiveDate>
  ) -> Self {
    let index =
      dates.iter().copied().collect();
    Self {
      dates,
      index
    }
  }

  /// Builds the set from raw cells,
  /// skipping the ones that do not
  /// normalize.
  #[tracing::instrument(skip_all, fields(cells = cells.len()))]
  pub fn from_cells(
    cells: &[CellValue]
  ) -> Self {
    let mut dates =
      Vec::with_capacity(cells.len());
    for (idx, cell) in
      cells.iter().enumerate()
    {
      match to_calendar_date(cell) {
        | Some(date) => dates.push(date),
        | None => {
          debug!(
            position = idx + 1,
            value = ?cell,
            "skipping unparseable working day"
          );
        }
      }
    }
    Self::new(dates)
  }

  pub fn contains(
    &self,
    date: NaiveDate
  ) -> bool {
    self.index.contains(&date)
  }

  /// The LastWorkingDate.
  pub fn last(
    &self
  ) -> Option<NaiveDate> {
    self.index.last().copied()
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = NaiveDate> + '_
  {
    self.dates.iter().copied()
  }
}

impl FromIterator<NaiveDate>
  for WorkingDateSet
{
  fn from_iter<
    I: IntoIterator<Item = NaiveDate>
  >(
    iter: I
  ) -> Self {
    Self::new(iter.into_iter().collect())
  }
}

/// Picks the last working date and the
/// working dates in `(today, last]`.
#[must_use]
pub fn select_upcoming_working_dates(
  working_days: &WorkingDateSet,
  today: NaiveDate
) -> UpcomingWindow {
  let Some(last) = working_days.last()
  else {
    return UpcomingWindow::default();
  };

  let dates_in_range = working_days
    .iter()
    .filter(|date| {
      *date > today && *date <= last
    })
    .collect();

  UpcomingWindow {
    last_working_date: Some(last),
    dates_in_range
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::{
    UpcomingWindow,
    WorkingDateSet,
    select_upcoming_working_dates
  };
  use crate::cell::CellValue;

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn empty_set_has_no_window() {
    let window =
      select_upcoming_working_dates(
        &WorkingDateSet::default(),
        ymd(2024, 6, 10)
      );
    assert_eq!(
      window,
      UpcomingWindow {
        last_working_date: None,
        dates_in_range:    vec![]
      }
    );
  }

  #[test]
  fn window_excludes_today_and_keeps_order()
  {
    let set: WorkingDateSet = [
      ymd(2024, 6, 12),
      ymd(2024, 6, 10),
      ymd(2024, 6, 20),
      ymd(2024, 6, 7),
      ymd(2024, 6, 11)
    ]
    .into_iter()
    .collect();

    let window =
      select_upcoming_working_dates(
        &set,
        ymd(2024, 6, 10)
      );
    assert_eq!(
      window.last_working_date,
      Some(ymd(2024, 6, 20))
    );
    assert_eq!(
      window.dates_in_range,
      vec![
        ymd(2024, 6, 12),
        ymd(2024, 6, 20),
        ymd(2024, 6, 11)
      ]
    );
  }

  #[test]
  fn bad_cells_are_skipped() {
    let set = WorkingDateSet::from_cells(&[
      CellValue::from("10/06/2024"),
      CellValue::from("not a day"),
      CellValue::Empty,
      CellValue::from("2024-06-12")
    ]);
    assert_eq!(set.len(), 2);
    assert!(set.contains(ymd(2024, 6, 10)));
    assert!(!set.contains(ymd(2024, 6, 11)));
    assert_eq!(
      set.last(),
      Some(ymd(2024, 6, 12))
    );
  }
}
