use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarEntry, CalendarStats};
use crate::config::{Config, keys};
use crate::datetime::format_date;
use crate::occurrence::Occurrence;
use crate::workdays::UpcomingWindow;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.get_flag(keys::COLOR, true)?,
        })
    }

    #[tracing::instrument(skip(self, occurrences, today))]
    pub fn print_occurrence_table(
        &mut self,
        occurrences: &[Occurrence<'_>],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "Date".to_string(),
            "Time".to_string(),
            "Freq".to_string(),
            "ID".to_string(),
            "Description".to_string(),
            "Assignee".to_string(),
        ];

        let mut rows = Vec::with_capacity(occurrences.len());
        for occ in occurrences {
            let date = format_date(occ.date);
            let date = if today.succ_opt() == Some(occ.date) {
                self.paint(&date, "1")
            } else {
                date
            };

            rows.push(vec![
                date,
                occ.task.time_label.clone().unwrap_or_default(),
                occ.task.frequency.to_string(),
                self.paint(&occ.task.id, "33"),
                occ.task.description.clone(),
                occ.task.assignee.clone().unwrap_or_default(),
            ]);
        }

        write_table(&mut out, headers, rows)?;
        writeln!(out)?;
        writeln!(out, "{} occurrence(s)", occurrences.len())?;
        Ok(())
    }

    #[tracing::instrument(skip(self, days, stats))]
    pub fn print_calendar(
        &mut self,
        days: &[(NaiveDate, &[CalendarEntry])],
        stats: &CalendarStats,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        for (day, entries) in days {
            let heading = format!("{} {}", format_date(*day), day.format("%a"));
            writeln!(out, "{}", self.paint(&heading, "36"))?;
            if entries.is_empty() {
                writeln!(out, "  -")?;
                continue;
            }
            for entry in *entries {
                let time = entry
                    .time_label
                    .as_deref()
                    .map(|t| format!("{t} "))
                    .unwrap_or_default();
                let assignee = entry
                    .assignee
                    .as_deref()
                    .map(|a| format!(" ({a})"))
                    .unwrap_or_default();
                writeln!(
                    out,
                    "  {time}[{}] {} {}{assignee}",
                    entry.frequency,
                    self.paint(&entry.task_id, "33"),
                    entry.description
                )?;
            }
        }

        writeln!(out)?;
        let breakdown = stats
            .by_frequency
            .iter()
            .map(|(freq, count)| format!("{freq}={count}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            out,
            "{} entries on {} day(s) {}",
            stats.entries, stats.days_with_tasks, breakdown
        )?;
        Ok(())
    }

    #[tracing::instrument(skip(self, window))]
    pub fn print_window(&mut self, window: &UpcomingWindow) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let last = window
            .last_working_date
            .map(format_date)
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "last working date  {last}")?;
        writeln!(out, "upcoming days      {}", window.dates_in_range.len())?;
        for day in &window.dates_in_range {
            writeln!(out, "  {} {}", format_date(*day), day.format("%a"))?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::{strip_ansi, write_table};

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["Date".to_string(), "Description".to_string()],
            vec![
                vec!["\x1b[1m12/06/2024\x1b[0m".to_string(), "Läuft".to_string()],
                vec!["13/06/2024".to_string(), "Sweep".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Date       Description ");
        assert_eq!(lines[1], "---------- ----------- ");
        assert_eq!(strip_ansi(lines[2]), "12/06/2024 Läuft       ");
        assert_eq!(lines[3], "13/06/2024 Sweep       ");
    }
}
