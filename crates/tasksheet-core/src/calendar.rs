use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::occurrence::Occurrence;
use crate::task::Frequency;

/// What the calendar shows for one task
/// on one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEntry {
  pub task_id:     String,
  pub description: String,
  pub assignee:    Option<String>,
  pub time_label:  Option<String>,
  pub frequency:   Frequency
}

impl From<&Occurrence<'_>>
  for CalendarEntry
{
  fn from(occ: &Occurrence<'_>) -> Self {
    Self {
      task_id:     occ.task.id.clone(),
      description: occ
        .task
        .description
        .clone(),
      assignee:    occ.task.assignee.clone(),
      time_label:  occ
        .task
        .time_label
        .clone(),
      frequency:   occ.task.frequency
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalendarStats {
  pub days_with_tasks: usize,
  pub entries:         usize,
  pub by_frequency:
    BTreeMap<Frequency, usize>
}

/// Per-day task lists, ascending by day.
#[derive(Debug, Clone, Default)]
pub struct CalendarMap {
  days: BTreeMap<
    NaiveDate,
    Vec<CalendarEntry>
  >
}

impl CalendarMap {
  #[tracing::instrument(skip_all, fields(occurrences = occurrences.len()))]
  pub fn build(
    occurrences: &[Occurrence<'_>]
  ) -> Self {
    let mut days: BTreeMap<
      NaiveDate,
      Vec<CalendarEntry>
    > = BTreeMap::new();
    for occ in occurrences {
      days
        .entry(occ.date)
        .or_default()
        .push(CalendarEntry::from(occ));
    }

    tracing::debug!(
      days = days.len(),
      "calendar map built"
    );
    Self {
      days
    }
  }

  pub fn entries_on(
    &self,
    day: NaiveDate
  ) -> &[CalendarEntry] {
    self
      .days
      .get(&day)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn days(
    &self
  ) -> impl Iterator<
    Item = (NaiveDate, &[CalendarEntry])
  > + '_ {
    self.days.iter().map(
      |(day, entries)| {
        (*day, entries.as_slice())
      }
    )
  }

  /// One row per window day, in window
  /// order, including days with nothing
  /// scheduled.
  pub fn for_window(
    &self,
    window: &[NaiveDate]
  ) -> Vec<(NaiveDate, &[CalendarEntry])>
  {
    window
      .iter()
      .map(|day| {
        (*day, self.entries_on(*day))
      })
      .collect()
  }

  pub fn stats(&self) -> CalendarStats {
    let mut stats =
      CalendarStats::default();
    for entries in self.days.values() {
      if entries.is_empty() {
        continue;
      }
      stats.days_with_tasks += 1;
      stats.entries += entries.len();
      for entry in entries {
        *stats
          .by_frequency
          .entry(entry.frequency)
          .or_default() += 1;
      }
    }
    stats
  }
}
