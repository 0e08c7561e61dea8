use std::io::{self, Read};

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::calendar::CalendarMap;
use crate::cell::CellValue;
use crate::cli::Invocation;
use crate::config::{Config, keys};
use crate::datastore::SheetStore;
use crate::datetime::{format_display_date, project_today};
use crate::filter::Filter;
use crate::occurrence::{DEFAULT_MAX_STEPS, ExpandOptions, ExpandedTasks, Occurrence, expand_all};
use crate::render::Renderer;
use crate::sheet::{ColumnMap, parse_task_rows, parse_working_days};
use crate::task::RecurringTask;
use crate::workdays::{WorkingDateSet, select_upcoming_working_dates};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "upcoming",
        "calendar",
        "workdays",
        "normalize",
        "import",
        "show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

/// Everything one computation pass needs, loaded once with a single `today`.
struct Snapshot {
    tasks: Vec<RecurringTask>,
    working_days: WorkingDateSet,
    today: NaiveDate,
    options: ExpandOptions,
}

impl Snapshot {
    fn load(store: &SheetStore, cfg: &Config, today: NaiveDate) -> anyhow::Result<Self> {
        let columns = ColumnMap::from_config(cfg)?;
        let tasks = parse_task_rows(&store.load_task_rows()?, &columns);
        let working_days = parse_working_days(&store.load_working_day_cells()?);
        let options = expand_options(cfg)?;

        debug!(
            tasks = tasks.len(),
            working_days = working_days.len(),
            %today,
            "loaded snapshot"
        );
        Ok(Self {
            tasks,
            working_days,
            today,
            options,
        })
    }

    fn expand(&self) -> ExpandedTasks<'_> {
        let expanded = expand_all(&self.tasks, &self.working_days, self.today, &self.options);
        if !expanded.truncated.is_empty() {
            eprintln!(
                "note: {} task(s) hit the {}-step recurrence cap; later dates are missing: {}",
                expanded.truncated.len(),
                self.options.max_steps,
                expanded.truncated.join(", ")
            );
        }
        expanded
    }
}

pub fn expand_options(cfg: &Config) -> anyhow::Result<ExpandOptions> {
    let max_steps = cfg.get_usize(keys::MAX_STEPS)?.unwrap_or(DEFAULT_MAX_STEPS);
    if max_steps == 0 {
        return Err(anyhow!("{} must be at least 1", keys::MAX_STEPS));
    }
    Ok(ExpandOptions {
        max_steps,
        one_time_requires_working_day: cfg.get_flag(keys::ONETIME_WORKDAYS_ONLY, false)?,
    })
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &SheetStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let today = project_today(Utc::now());
    let command = inv.command.as_str();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?inv.command_args,
        %today,
        "dispatching command"
    );

    match command {
        "upcoming" => cmd_upcoming(store, cfg, renderer, &inv.filter_terms, today),
        "calendar" => cmd_calendar(store, cfg, renderer, &inv.filter_terms, today),
        "workdays" => cmd_workdays(store, renderer, today),
        "normalize" => cmd_normalize(&inv.command_args),
        "import" => cmd_import(store, &inv.command_args),
        "show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[instrument(skip(store, cfg, renderer, filter_terms, today))]
fn cmd_upcoming(
    store: &SheetStore,
    cfg: &Config,
    renderer: &mut Renderer,
    filter_terms: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command upcoming");

    let snapshot = Snapshot::load(store, cfg, today)?;
    let filter = Filter::parse(filter_terms, today)?;

    let mut rows: Vec<Occurrence<'_>> = snapshot
        .expand()
        .occurrences
        .into_iter()
        .filter(|occ| filter.matches(occ))
        .collect();
    rows.sort_by(|a, b| {
        (a.date, &a.task.time_label, &a.task.id).cmp(&(b.date, &b.task.time_label, &b.task.id))
    });

    renderer.print_occurrence_table(&rows, today)?;
    Ok(())
}

#[instrument(skip(store, cfg, renderer, filter_terms, today))]
fn cmd_calendar(
    store: &SheetStore,
    cfg: &Config,
    renderer: &mut Renderer,
    filter_terms: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command calendar");

    let snapshot = Snapshot::load(store, cfg, today)?;
    let filter = Filter::parse(filter_terms, today)?;
    let window = select_upcoming_working_dates(&snapshot.working_days, today);

    let occurrences: Vec<Occurrence<'_>> = snapshot
        .expand()
        .occurrences
        .into_iter()
        .filter(|occ| filter.matches(occ))
        .collect();
    let map = CalendarMap::build(&occurrences);

    // One-time tasks may land off the working list; keep their days visible.
    let mut days = window.dates_in_range.clone();
    for (day, _) in map.days() {
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort();

    renderer.print_calendar(&map.for_window(&days), &map.stats())?;
    Ok(())
}

#[instrument(skip(store, renderer, today))]
fn cmd_workdays(
    store: &SheetStore,
    renderer: &mut Renderer,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command workdays");

    let working_days = parse_working_days(&store.load_working_day_cells()?);
    let window = select_upcoming_working_dates(&working_days, today);
    renderer.print_window(&window)?;
    Ok(())
}

#[instrument(skip(args))]
fn cmd_normalize(args: &[String]) -> anyhow::Result<()> {
    if args.is_empty() {
        return Err(anyhow!("normalize requires at least one value"));
    }

    for raw in args {
        let formatted = format_display_date(&CellValue::from(raw.as_str()));
        if formatted.is_empty() {
            warn!(value = %raw, "value did not normalize to a date");
        }
        println!("{formatted}");
    }
    Ok(())
}

#[instrument(skip(store, args))]
fn cmd_import(store: &SheetStore, args: &[String]) -> anyhow::Result<()> {
    let target = args
        .first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("import requires a target: tasks or workdays"))?;

    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .context("failed reading import payload from stdin")?;
    let values = parse_import_payload(&raw)?;

    match target {
        "tasks" => {
            let rows = values
                .into_iter()
                .enumerate()
                .map(|(idx, value)| match value {
                    Value::Array(row) => Ok(row),
                    other => Err(anyhow!("task row {} is not an array: {other}", idx + 1)),
                })
                .collect::<anyhow::Result<Vec<Vec<Value>>>>()?;
            store.save_task_rows(&rows)?;
            info!(rows = rows.len(), "imported task rows");
            println!("Imported {} task row(s).", rows.len());
        }
        "workdays" => {
            let imported = parse_working_days(&values).len();
            store.save_working_day_cells(&values)?;
            info!(cells = values.len(), imported, "imported working days");
            println!("Imported {imported} working day(s).");
        }
        other => return Err(anyhow!("unknown import target: {other}")),
    }
    Ok(())
}

/// Accepts a bare JSON array or the endpoint's `{"data": [...]}` /
/// `{"values": [...]}` envelope.
pub fn parse_import_payload(raw: &str) -> anyhow::Result<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import payload is empty"));
    }

    let parsed: Value = serde_json::from_str(trimmed).context("import payload is not valid JSON")?;
    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => ["data", "values"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| anyhow!("import payload object has no data or values array")),
        other => Err(anyhow!("unsupported import payload: {other}")),
    }
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    let mut entries: Vec<(&String, &String)> = cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("tasksheet [filter] <command> [args]");
    println!();
    println!("commands:");
    println!("  upcoming               occurrences after today, one row per task and day");
    println!("  calendar               upcoming working days with their tasks");
    println!("  workdays               last working date and the days still ahead");
    println!("  normalize <value>...   print values as DD/MM/YYYY");
    println!("  import tasks|workdays  store a sheet export read from stdin");
    println!("  show                   effective configuration");
    println!("  help | version");
    println!();
    println!("filter terms: id:<id> freq:<label> assignee:<name> before:<date>");
    println!("              after:<date> on:<date> <word>, combined with and/or/( )");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{expand_command_abbrev, expand_options, known_command_names, parse_import_payload};
    use crate::config::Config;
    use crate::occurrence::ExpandOptions;

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("up", &known), Some("upcoming"));
        assert_eq!(expand_command_abbrev("w", &known), Some("workdays"));
        assert_eq!(expand_command_abbrev("pump", &known), None);
    }

    #[test]
    fn import_payload_envelopes() {
        assert_eq!(
            parse_import_payload(r#"[["CL-1"]]"#).expect("bare array"),
            vec![json!(["CL-1"])]
        );
        assert_eq!(
            parse_import_payload(r#"{"success": true, "data": ["10/06/2024"]}"#)
                .expect("data envelope"),
            vec![json!("10/06/2024")]
        );
        assert!(parse_import_payload(r#"{"error": "quota"}"#).is_err());
        assert!(parse_import_payload("   ").is_err());
        assert!(parse_import_payload("42").is_err());
    }

    #[test]
    fn options_follow_config() {
        let mut cfg = Config::with_defaults();
        assert_eq!(expand_options(&cfg).expect("defaults"), ExpandOptions::default());

        cfg.apply_overrides(vec![
            ("calendar.onetime.workdays_only".to_string(), "yes".to_string()),
            ("recurrence.max_steps".to_string(), "50".to_string()),
        ]);
        let options = expand_options(&cfg).expect("overrides");
        assert_eq!(options.max_steps, 50);
        assert!(options.one_time_requires_working_day);

        cfg.apply_overrides(vec![("recurrence.max_steps".to_string(), "0".to_string())]);
        assert!(expand_options(&cfg).is_err());
    }
}
