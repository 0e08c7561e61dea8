use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  NaiveDate,
  NaiveDateTime,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

use crate::cell::CellValue;

const TIMEZONE_CONFIG_FILE: &str =
  "tasksheet-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKSHEET_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKSHEET_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Asia/Kolkata";

const DISPLAY_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

/// The calendar day that counts as
/// "today" for one computation pass.
#[must_use]
pub fn project_today(
  now: DateTime<Utc>
) -> NaiveDate {
  to_project_date(now)
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "DEFAULT_PROJECT_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Normalizes a spreadsheet cell to a
/// calendar day.
///
/// Malformed input yields `None`; this
/// never panics and never errors, so
/// callers can skip bad rows.
#[must_use]
pub fn to_calendar_date(
  value: &CellValue
) -> Option<NaiveDate> {
  match value {
    | CellValue::Empty => None,
    | CellValue::Date(date) => {
      Some(*date)
    }
    | CellValue::Timestamp(ts) => {
      Some(to_project_date(*ts))
    }
    | CellValue::Number(ms) => {
      date_from_epoch_millis(*ms)
    }
    | CellValue::Text(raw) => {
      parse_date_text(raw)
    }
  }
}

/// Renders a cell as zero-padded
/// `DD/MM/YYYY`, or an empty string when
/// it does not normalize.
#[must_use]
pub fn format_display_date(
  value: &CellValue
) -> String {
  to_calendar_date(value)
    .map(format_date)
    .unwrap_or_default()
}

#[must_use]
pub fn format_date(
  date: NaiveDate
) -> String {
  date.format(DISPLAY_FORMAT).to_string()
}

#[must_use]
pub fn is_same_day(
  a: &CellValue,
  b: &CellValue
) -> bool {
  match (
    to_calendar_date(a),
    to_calendar_date(b)
  ) {
    | (Some(left), Some(right)) => {
      left == right
    }
    | _ => false
  }
}

fn date_from_epoch_millis(
  ms: f64
) -> Option<NaiveDate> {
  if !ms.is_finite() {
    return None;
  }
  DateTime::<Utc>::from_timestamp_millis(
    ms.trunc() as i64
  )
  .map(to_project_date)
}

fn parse_date_text(
  raw: &str
) -> Option<NaiveDate> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  parse_day_month_year(token)
    .or_else(|| {
      parse_sheet_date_token(token)
    })
    .or_else(|| parse_iso_like(token))
    .or_else(|| {
      parse_month_name(token)
    })
    .or_else(|| {
      parse_js_date_string(token)
    })
}

fn day_month_year_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"^(?P<day>\d{1,2})/(?P<month>\d{1,2})/(?P<year>\d{4})(?:\s+\d{1,2}:\d{2}(?::\d{2})?)?$",
    )
    .ok()
  })
  .as_ref()
}

fn sheet_date_token_re()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(
      r"^Date\(\s*(?P<year>\d{4})\s*,\s*(?P<month>\d{1,2})\s*,\s*(?P<day>\d{1,2})\s*(?:,\s*\d{1,3}\s*){0,4}\)$",
    )
    .ok()
  })
  .as_ref()
}

fn parse_day_month_year(
  token: &str
) -> Option<NaiveDate> {
  let caps = day_month_year_re()?
    .captures(token)?;
  let day = caps
    .name("day")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let month = caps
    .name("month")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let year = caps
    .name("year")?
    .as_str()
    .parse::<i32>()
    .ok()?;
  NaiveDate::from_ymd_opt(
    year, month, day
  )
}

// Visualization API tokens use a
// zero-based month: Date(2024,5,11) is
// 11 June 2024.
fn parse_sheet_date_token(
  token: &str
) -> Option<NaiveDate> {
  let caps = sheet_date_token_re()?
    .captures(token)?;
  let year = caps
    .name("year")?
    .as_str()
    .parse::<i32>()
    .ok()?;
  let month = caps
    .name("month")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let day = caps
    .name("day")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  NaiveDate::from_ymd_opt(
    year,
    month.checked_add(1)?,
    day
  )
}

fn parse_iso_like(
  token: &str
) -> Option<NaiveDate> {
  let year_first = token
    .get(..4)
    .is_some_and(|head| {
      head
        .chars()
        .all(|c| c.is_ascii_digit())
    });
  if !year_first {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(to_project_date(
      dt.with_timezone(&Utc)
    ));
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Some(ndt.date());
    }
  }

  for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        token, fmt
      )
    {
      return Some(date);
    }
  }

  None
}

// Typed text cells such as
// "June 11, 2024" or "11-Jun-2024".
// `%B` accepts full and abbreviated
// names alike.
fn parse_month_name(
  token: &str
) -> Option<NaiveDate> {
  if !token
    .chars()
    .any(|c| c.is_ascii_alphabetic())
  {
    return None;
  }

  let normalized = token
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ");
  [
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
    "%d-%B-%Y",
    "%A, %B %d, %Y"
  ]
  .into_iter()
  .find_map(|fmt| {
    NaiveDate::parse_from_str(
      &normalized,
      fmt
    )
    .ok()
  })
}

// Script runtimes stringify dates as
// "Tue Jun 11 2024 00:00:00 GMT+0530
// (India Standard Time)".
fn parse_js_date_string(
  token: &str
) -> Option<NaiveDate> {
  let without_zone_name = token
    .split_once(" (")
    .map(|(head, _)| head)
    .unwrap_or(token)
    .trim();

  if let Ok(dt) =
    DateTime::parse_from_str(
      without_zone_name,
      "%a %b %d %Y %H:%M:%S GMT%z"
    )
  {
    return Some(to_project_date(
      dt.with_timezone(&Utc)
    ));
  }

  DateTime::parse_from_rfc2822(
    without_zone_name
  )
  .ok()
  .map(|dt| {
    to_project_date(
      dt.with_timezone(&Utc)
    )
  })
}
