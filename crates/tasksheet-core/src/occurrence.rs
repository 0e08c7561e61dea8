use chrono::{
  Datelike,
  Days,
  Months,
  NaiveDate
};
use tracing::{
  trace,
  warn
};

use crate::task::{
  Frequency,
  RecurringTask
};
use crate::workdays::WorkingDateSet;

/// Upper bound on stepping iterations
/// for a single task.
pub const DEFAULT_MAX_STEPS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
  pub max_steps: usize,
  /// Apply working-day membership to
  /// one-time tasks as well. Off by
  /// default: one-time tasks land on
  /// their start date whatever it is.
  pub one_time_requires_working_day:
    bool
}

impl Default for ExpandOptions {
  fn default() -> Self {
    Self {
      max_steps: DEFAULT_MAX_STEPS,
      one_time_requires_working_day:
        false
    }
  }
}

/// Dates produced for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
  Complete(Vec<NaiveDate>),
  /// The step cap was reached before
  /// the window was exhausted.
  Truncated(Vec<NaiveDate>)
}

impl Expansion {
  pub fn dates(&self) -> &[NaiveDate] {
    match self {
      | Self::Complete(dates)
      | Self::Truncated(dates) => dates
    }
  }

  pub fn into_dates(
    self
  ) -> Vec<NaiveDate> {
    match self {
      | Self::Complete(dates)
      | Self::Truncated(dates) => dates
    }
  }

  pub fn is_truncated(&self) -> bool {
    matches!(self, Self::Truncated(_))
  }
}

/// One `(task, date)` pair for the
/// calendar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence<'a> {
  pub task: &'a RecurringTask,
  pub date: NaiveDate
}

/// Computes the future instances of
/// `task` in `(today, last_working_date]`.
///
/// Pure: the caller captures `today`
/// once per pass. Output is in
/// generation order, which is
/// ascending.
#[tracing::instrument(skip(task, working_days, options), fields(task = %task.id, frequency = %task.frequency))]
pub fn expand(
  task: &RecurringTask,
  working_days: &WorkingDateSet,
  today: NaiveDate,
  last_working_date: Option<NaiveDate>,
  options: &ExpandOptions
) -> Expansion {
  let (Some(start), Some(last)) =
    (task.start_date, last_working_date)
  else {
    trace!(
      "missing start or last working \
       date; no occurrences"
    );
    return Expansion::Complete(vec![]);
  };

  if start > last {
    return Expansion::Complete(vec![]);
  }

  if !task.frequency.is_recurring() {
    let keep = start > today
      && (!options
        .one_time_requires_working_day
        || working_days.contains(start));
    return Expansion::Complete(
      if keep { vec![start] } else { vec![] }
    );
  }

  let mut collected = Vec::new();
  let mut cursor = Some(start);
  let mut steps = 0_usize;

  while let Some(day) = cursor {
    if day > last
      || steps >= options.max_steps
    {
      break;
    }
    if day > today {
      collected.push(day);
    }
    steps += 1;
    cursor =
      step_forward(day, task.frequency);
  }

  let truncated = cursor
    .is_some_and(|day| day <= last);

  collected.retain(|day| {
    working_days.contains(*day)
  });

  if truncated {
    warn!(
      steps,
      collected = collected.len(),
      "recurrence step cap reached; \
       occurrences truncated"
    );
    Expansion::Truncated(collected)
  } else {
    Expansion::Complete(collected)
  }
}

/// Result of expanding a whole task
/// list.
#[derive(Debug, Clone, Default)]
pub struct ExpandedTasks<'a> {
  pub occurrences: Vec<Occurrence<'a>>,
  /// Ids of tasks whose expansion hit
  /// the step cap.
  pub truncated:   Vec<&'a str>
}

/// Expands every task against the
/// working set's last date, in task
/// order then date order.
#[tracing::instrument(skip_all, fields(tasks = tasks.len(), today = %today))]
pub fn expand_all<'a>(
  tasks: &'a [RecurringTask],
  working_days: &WorkingDateSet,
  today: NaiveDate,
  options: &ExpandOptions
) -> ExpandedTasks<'a> {
  let last = working_days.last();
  let mut expanded =
    ExpandedTasks::default();

  for task in tasks {
    let expansion = expand(
      task,
      working_days,
      today,
      last,
      options
    );
    if expansion.is_truncated() {
      expanded
        .truncated
        .push(task.id.as_str());
    }
    expanded.occurrences.extend(
      expansion.into_dates().into_iter().map(
        |date| Occurrence {
          task,
          date
        }
      )
    );
  }

  tracing::debug!(
    occurrences =
      expanded.occurrences.len(),
    truncated = expanded.truncated.len(),
    "expanded recurring tasks"
  );
  expanded
}

fn step_forward(
  day: NaiveDate,
  frequency: Frequency
) -> Option<NaiveDate> {
  match frequency {
    | Frequency::Daily => {
      day.checked_add_days(Days::new(1))
    }
    | Frequency::Weekly => {
      day.checked_add_days(Days::new(7))
    }
    | Frequency::Monthly => {
      add_month_overflowing(day)
    }
    | Frequency::OneTime => None
  }
}

// Month arithmetic without clamping:
// the day-of-month spills into the
// following month, so 31 Jan becomes
// 2 or 3 Mar and the drift carries on.
fn add_month_overflowing(
  day: NaiveDate
) -> Option<NaiveDate> {
  let first_of_next = day
    .with_day(1)?
    .checked_add_months(Months::new(1))?;
  first_of_next.checked_add_days(
    Days::new(u64::from(day.day() - 1))
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    Days,
    NaiveDate
  };

  use super::{
    ExpandOptions,
    Expansion,
    add_month_overflowing,
    expand,
    expand_all
  };
  use crate::task::{
    Frequency,
    RecurringTask
  };
  use crate::workdays::WorkingDateSet;

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn every_day(
    from: NaiveDate,
    to: NaiveDate
  ) -> WorkingDateSet {
    from
      .iter_days()
      .take_while(|day| *day <= to)
      .collect()
  }

  fn task(
    start: Option<NaiveDate>,
    frequency: Frequency
  ) -> RecurringTask {
    RecurringTask::new(
      "TK-1",
      "Check compressor oil",
      start,
      frequency
    )
  }

  #[test]
  fn one_time_inside_window() {
    let today = ymd(2024, 6, 10);
    let start = ymd(2024, 6, 13);
    let last = ymd(2024, 6, 20);
    let result = expand(
      &task(
        Some(start),
        Frequency::OneTime
      ),
      &WorkingDateSet::default(),
      today,
      Some(last),
      &ExpandOptions::default()
    );
    assert_eq!(
      result,
      Expansion::Complete(vec![start])
    );
  }

  #[test]
  fn one_time_due_today_is_not_upcoming()
  {
    let today = ymd(2024, 6, 10);
    let result = expand(
      &task(
        Some(today),
        Frequency::OneTime
      ),
      &every_day(
        today,
        ymd(2024, 6, 20)
      ),
      today,
      Some(ymd(2024, 6, 20)),
      &ExpandOptions::default()
    );
    assert!(result.dates().is_empty());
  }

  #[test]
  fn one_time_membership_is_opt_in() {
    let today = ymd(2024, 6, 10);
    let start = ymd(2024, 6, 15);
    let working =
      WorkingDateSet::new(vec![ymd(
        2024, 6, 14
      )]);
    let one_time =
      task(Some(start), Frequency::OneTime);

    let lenient = expand(
      &one_time,
      &working,
      today,
      Some(ymd(2024, 6, 20)),
      &ExpandOptions::default()
    );
    assert_eq!(lenient.dates(), &[start]);

    let strict = expand(
      &one_time,
      &working,
      today,
      Some(ymd(2024, 6, 20)),
      &ExpandOptions {
        one_time_requires_working_day:
          true,
        ..ExpandOptions::default()
      }
    );
    assert!(strict.dates().is_empty());
  }

  #[test]
  fn daily_includes_start_after_today() {
    let today = ymd(2024, 6, 10);
    let result = expand(
      &task(
        Some(ymd(2024, 6, 11)),
        Frequency::Daily
      ),
      &every_day(
        ymd(2024, 6, 11),
        ymd(2024, 6, 15)
      ),
      today,
      Some(ymd(2024, 6, 15)),
      &ExpandOptions::default()
    );
    assert_eq!(
      result,
      Expansion::Complete(vec![
        ymd(2024, 6, 11),
        ymd(2024, 6, 12),
        ymd(2024, 6, 13),
        ymd(2024, 6, 14),
        ymd(2024, 6, 15)
      ])
    );
  }

  #[test]
  fn weekly_skips_past_steps() {
    let result = expand(
      &task(
        Some(ymd(2024, 6, 1)),
        Frequency::Weekly
      ),
      &every_day(
        ymd(2024, 6, 1),
        ymd(2024, 6, 30)
      ),
      ymd(2024, 6, 10),
      Some(ymd(2024, 6, 30)),
      &ExpandOptions::default()
    );
    assert_eq!(
      result.dates(),
      &[
        ymd(2024, 6, 15),
        ymd(2024, 6, 22),
        ymd(2024, 6, 29)
      ]
    );
  }

  #[test]
  fn recurring_dates_must_be_working_days()
  {
    let working = WorkingDateSet::new(
      vec![
        ymd(2024, 6, 11),
        ymd(2024, 6, 13),
        ymd(2024, 6, 14)
      ]
    );
    let result = expand(
      &task(
        Some(ymd(2024, 6, 11)),
        Frequency::Daily
      ),
      &working,
      ymd(2024, 6, 10),
      working.last(),
      &ExpandOptions::default()
    );
    assert_eq!(
      result.dates(),
      &[
        ymd(2024, 6, 11),
        ymd(2024, 6, 13),
        ymd(2024, 6, 14)
      ]
    );
  }

  #[test]
  fn monthly_overflows_like_native_dates()
  {
    assert_eq!(
      add_month_overflowing(ymd(
        2024, 1, 31
      )),
      Some(ymd(2024, 3, 2))
    );
    assert_eq!(
      add_month_overflowing(ymd(
        2023, 1, 31
      )),
      Some(ymd(2023, 3, 3))
    );
    assert_eq!(
      add_month_overflowing(ymd(
        2024, 12, 15
      )),
      Some(ymd(2025, 1, 15))
    );

    let result = expand(
      &task(
        Some(ymd(2024, 1, 31)),
        Frequency::Monthly
      ),
      &every_day(
        ymd(2024, 1, 1),
        ymd(2024, 6, 30)
      ),
      ymd(2024, 1, 1),
      Some(ymd(2024, 6, 30)),
      &ExpandOptions::default()
    );
    assert_eq!(
      result.dates(),
      &[
        ymd(2024, 1, 31),
        ymd(2024, 3, 2),
        ymd(2024, 4, 2),
        ymd(2024, 5, 2),
        ymd(2024, 6, 2)
      ]
    );
  }

  #[test]
  fn missing_inputs_yield_nothing() {
    let today = ymd(2024, 6, 10);
    let working = every_day(
      today,
      ymd(2024, 6, 30)
    );
    let options = ExpandOptions::default();

    assert_eq!(
      expand(
        &task(None, Frequency::Daily),
        &working,
        today,
        working.last(),
        &options
      ),
      Expansion::Complete(vec![])
    );
    assert_eq!(
      expand(
        &task(
          Some(ymd(2024, 6, 11)),
          Frequency::Daily
        ),
        &working,
        today,
        None,
        &options
      ),
      Expansion::Complete(vec![])
    );
    assert_eq!(
      expand(
        &task(
          Some(ymd(2024, 7, 1)),
          Frequency::Weekly
        ),
        &working,
        today,
        working.last(),
        &options
      ),
      Expansion::Complete(vec![])
    );
  }

  #[test]
  fn step_cap_bounds_runaway_ranges() {
    let result = expand(
      &task(
        Some(ymd(2000, 1, 1)),
        Frequency::Daily
      ),
      &every_day(
        ymd(2024, 6, 11),
        ymd(2030, 12, 31)
      ),
      ymd(2024, 6, 10),
      Some(ymd(2030, 12, 31)),
      &ExpandOptions::default()
    );
    assert!(result.is_truncated());
    assert!(result.dates().len() <= 1000);
  }

  #[test]
  fn step_cap_counts_collected_steps() {
    let start = ymd(2024, 1, 1);
    let last = ymd(2030, 12, 31);
    let result = expand(
      &task(Some(start), Frequency::Daily),
      &every_day(start, last),
      ymd(2023, 12, 31),
      Some(last),
      &ExpandOptions::default()
    );
    assert!(result.is_truncated());
    assert_eq!(result.dates().len(), 1000);
    assert_eq!(
      result.dates().last().copied(),
      start.checked_add_days(Days::new(999))
    );
  }

  #[test]
  fn cap_landing_on_window_end_is_complete()
  {
    let start = ymd(2024, 6, 11);
    let last = ymd(2024, 6, 15);
    let result = expand(
      &task(Some(start), Frequency::Daily),
      &every_day(start, last),
      ymd(2024, 6, 10),
      Some(last),
      &ExpandOptions {
        max_steps: 5,
        ..ExpandOptions::default()
      }
    );
    assert_eq!(
      result,
      Expansion::Complete(
        every_day(start, last)
          .iter()
          .collect()
      )
    );
  }

  #[test]
  fn expand_all_pairs_tasks_with_dates() {
    let today = ymd(2024, 6, 10);
    let working = every_day(
      ymd(2024, 6, 11),
      ymd(2024, 6, 14)
    );
    let tasks = vec![
      task(
        Some(ymd(2024, 6, 12)),
        Frequency::OneTime
      ),
      RecurringTask::new(
        "TK-2",
        "Sweep floor",
        Some(ymd(2024, 6, 11)),
        Frequency::Daily
      ),
    ];

    let expanded = expand_all(
      &tasks,
      &working,
      today,
      &ExpandOptions::default()
    );
    assert!(expanded.truncated.is_empty());
    let pairs: Vec<(&str, NaiveDate)> =
      expanded
        .occurrences
        .iter()
        .map(|occ| {
          (occ.task.id.as_str(), occ.date)
        })
        .collect();
    assert_eq!(
      pairs,
      vec![
        ("TK-1", ymd(2024, 6, 12)),
        ("TK-2", ymd(2024, 6, 11)),
        ("TK-2", ymd(2024, 6, 12)),
        ("TK-2", ymd(2024, 6, 13)),
        ("TK-2", ymd(2024, 6, 14))
      ]
    );
  }

  #[test]
  fn repeated_calls_are_identical() {
    let today = ymd(2024, 6, 10);
    let working = every_day(
      today,
      ymd(2024, 8, 31)
    );
    let weekly = task(
      Some(ymd(2024, 5, 3)),
      Frequency::Weekly
    );
    let first = expand(
      &weekly,
      &working,
      today,
      working.last(),
      &ExpandOptions::default()
    );
    let second = expand(
      &weekly,
      &working,
      today,
      working.last(),
      &ExpandOptions::default()
    );
    assert_eq!(first, second);
    assert!(
      first
        .dates()
        .windows(2)
        .all(|pair| pair[0] < pair[1])
    );
  }
}
