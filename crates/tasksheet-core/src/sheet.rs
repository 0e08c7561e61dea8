use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cell::CellValue;
use crate::config::{Config, keys};
use crate::datetime::to_calendar_date;
use crate::task::{Frequency, RecurringTask};
use crate::workdays::WorkingDateSet;

/// Zero-based column positions of the task sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub header_rows: usize,
    pub id: usize,
    pub description: usize,
    pub assignee: Option<usize>,
    pub start: usize,
    pub frequency: usize,
    pub time: Option<usize>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            header_rows: 1,
            id: 0,
            description: 1,
            assignee: Some(2),
            start: 3,
            frequency: 4,
            time: Some(5),
        }
    }
}

impl ColumnMap {
    #[tracing::instrument(skip(cfg))]
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let required = |key: &str, fallback: usize| -> anyhow::Result<usize> {
            Ok(cfg.get_usize(key)?.unwrap_or(fallback))
        };

        Ok(Self {
            header_rows: required(keys::HEADER_ROWS, defaults.header_rows)?,
            id: required(keys::COLUMN_ID, defaults.id)?,
            description: required(keys::COLUMN_DESCRIPTION, defaults.description)?,
            assignee: cfg.get_column(keys::COLUMN_ASSIGNEE, defaults.assignee)?,
            start: required(keys::COLUMN_START, defaults.start)?,
            frequency: required(keys::COLUMN_FREQUENCY, defaults.frequency)?,
            time: cfg.get_column(keys::COLUMN_TIME, defaults.time)?,
        })
    }

    fn is_mapped(&self, idx: usize) -> bool {
        idx == self.id
            || idx == self.description
            || idx == self.start
            || idx == self.frequency
            || self.assignee == Some(idx)
            || self.time == Some(idx)
    }
}

/// Turns sheet rows into task definitions.
///
/// Rows with neither id nor description are dropped. Rows whose start date
/// does not normalize are kept without a date and simply never produce an
/// occurrence.
#[tracing::instrument(skip(rows, columns), fields(rows = rows.len()))]
pub fn parse_task_rows(rows: &[Vec<Value>], columns: &ColumnMap) -> Vec<RecurringTask> {
    let headers: Vec<String> = if columns.header_rows > 0 {
        rows.first()
            .map(|row| {
                row.iter()
                    .map(|cell| CellValue::from(cell).as_text().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        vec![]
    };

    let mut tasks = Vec::new();
    for (idx, row) in rows.iter().enumerate().skip(columns.header_rows) {
        let row_number = idx + 1;
        let cell = |col: usize| row.get(col).map(CellValue::from).unwrap_or_default();
        let optional_text = |col: Option<usize>| col.and_then(|c| cell(c).as_text());

        let id = cell(columns.id).as_text();
        let description = cell(columns.description).as_text();
        if id.is_none() && description.is_none() {
            debug!(row = row_number, "skipping blank task row");
            continue;
        }

        let start_cell = cell(columns.start);
        let start_date = to_calendar_date(&start_cell);
        if start_date.is_none() && !start_cell.is_empty() {
            warn!(
                row = row_number,
                value = %start_cell,
                "unparseable start date; task will have no occurrences"
            );
        }

        let frequency = Frequency::classify(
            &cell(columns.frequency).as_text().unwrap_or_default(),
        );

        let mut extra = BTreeMap::new();
        for (col, value) in row.iter().enumerate() {
            if columns.is_mapped(col) || value.is_null() {
                continue;
            }
            if let Some(name) = headers.get(col).filter(|name| !name.is_empty()) {
                extra.insert(name.clone(), value.clone());
            }
        }

        tasks.push(RecurringTask {
            id: id.unwrap_or_else(|| format!("row-{row_number}")),
            description: description.unwrap_or_default(),
            assignee: optional_text(columns.assignee),
            time_label: optional_text(columns.time),
            start_date,
            frequency,
            extra,
        });
    }

    debug!(tasks = tasks.len(), "parsed task rows");
    tasks
}

/// Working days arrive either as a flat list of cells or as single-column
/// rows; the first cell of each row is used.
#[tracing::instrument(skip(values), fields(values = values.len()))]
pub fn parse_working_days(values: &[Value]) -> WorkingDateSet {
    let cells: Vec<CellValue> = values
        .iter()
        .map(|value| match value {
            Value::Array(row) => row.first().map(CellValue::from).unwrap_or_default(),
            other => CellValue::from(other),
        })
        .collect();
    WorkingDateSet::from_cells(&cells)
}
