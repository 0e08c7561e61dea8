use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

/// Keys read by the rest of the
/// crate.
pub mod keys {
  pub const DATA_LOCATION: &str =
    "data.location";
  pub const DEFAULT_COMMAND: &str =
    "default.command";
  pub const COLOR: &str = "color";
  pub const HEADER_ROWS: &str =
    "sheet.header.rows";
  pub const COLUMN_ID: &str =
    "sheet.column.id";
  pub const COLUMN_DESCRIPTION: &str =
    "sheet.column.description";
  pub const COLUMN_ASSIGNEE: &str =
    "sheet.column.assignee";
  pub const COLUMN_START: &str =
    "sheet.column.start";
  pub const COLUMN_FREQUENCY: &str =
    "sheet.column.frequency";
  pub const COLUMN_TIME: &str =
    "sheet.column.time";
  pub const ONETIME_WORKDAYS_ONLY:
    &str =
    "calendar.onetime.workdays_only";
  pub const MAX_STEPS: &str =
    "recurrence.max_steps";
}

const RC_ENV: &str = "TASKSHEETRC";
const RC_FILE_NAME: &str =
  ".tasksheetrc";
const DATA_DIR_NAME: &str =
  ".tasksheet";

#[derive(Debug, Clone)]
pub struct Config {
  map: HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

/// Where the rc file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcSource {
  Flag(PathBuf),
  Env(PathBuf),
  Home(PathBuf),
  Disabled,
  Absent
}

/// One meaningful rc line.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

impl Config {
  /// Built-in values, before any rc
  /// file or override.
  pub fn with_defaults() -> Self {
    let map = [
      (
        keys::DATA_LOCATION,
        "~/.tasksheet"
      ),
      (
        keys::DEFAULT_COMMAND,
        "upcoming"
      ),
      (keys::COLOR, "on")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();

    Config {
      map,
      loaded_files: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::with_defaults();

    match locate_rc(rc_override) {
      | RcSource::Flag(path)
      | RcSource::Env(path)
      | RcSource::Home(path) => {
        info!(rc = %path.display(), "loading rc file");
        let mut loader = RcLoader {
          cfg:    &mut cfg,
          active: vec![]
        };
        loader.load(&path)?;
      }
      | RcSource::Disabled => {
        debug!(
          "rc file disabled by \
           environment"
        );
      }
      | RcSource::Absent => {
        warn!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  /// Later pairs win. A leading `rc.`
  /// on the key is dropped.
  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = match k
        .strip_prefix("rc.")
      {
        | Some(bare) => bare.to_string(),
        | None => k
      };
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `Ok(None)` when the key is unset;
  /// an error names the key when the
  /// value is not a count.
  pub fn get_usize(
    &self,
    key: &str
  ) -> anyhow::Result<Option<usize>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(None);
    };
    raw
      .trim()
      .parse::<usize>()
      .map(Some)
      .with_context(|| {
        format!(
          "invalid value for {key}: \
           {raw}"
        )
      })
  }

  /// On/off switch with a fallback
  /// for unset keys. Anything that is
  /// not a recognizable switch value
  /// is an error.
  pub fn get_flag(
    &self,
    key: &str,
    default: bool
  ) -> anyhow::Result<bool> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(default);
    };
    parse_flag(raw).ok_or_else(|| {
      anyhow!(
        "invalid on/off value for \
         {key}: {raw}"
      )
    })
  }

  /// Column index for an optional
  /// sheet column. `none` or an empty
  /// value switches the column off.
  pub fn get_column(
    &self,
    key: &str,
    default: Option<usize>
  ) -> anyhow::Result<Option<usize>> {
    let Some(raw) = self.map.get(key)
    else {
      return Ok(default);
    };
    let raw = raw.trim();
    if raw.is_empty()
      || raw.eq_ignore_ascii_case("none")
    {
      return Ok(None);
    }
    raw
      .parse::<usize>()
      .map(Some)
      .with_context(|| {
        format!(
          "invalid column index for \
           {key}: {raw}"
        )
      })
  }

  pub fn default_command(
    &self
  ) -> String {
    self
      .get(keys::DEFAULT_COMMAND)
      .unwrap_or_else(|| {
        "upcoming".to_string()
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }
}

/// Walks an rc file and its includes.
/// `active` is the chain of files
/// currently open, canonicalized.
struct RcLoader<'c> {
  cfg:    &'c mut Config,
  active: Vec<PathBuf>
}

impl RcLoader<'_> {
  #[tracing::instrument(skip(self))]
  fn load(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    let identity =
      fs::canonicalize(&path)
        .unwrap_or_else(|_| {
          path.clone()
        });
    if self.active.contains(&identity) {
      let chain = self
        .active
        .iter()
        .chain(std::iter::once(
          &identity
        ))
        .map(|p| {
          p.display().to_string()
        })
        .collect::<Vec<_>>()
        .join(" -> ");
      return Err(anyhow!(
        "include cycle: {chain}"
      ));
    }

    self.active.push(identity);
    self
      .cfg
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (idx, raw_line) in
      text.lines().enumerate()
    {
      let line =
        parse_rc_line(raw_line)
          .with_context(|| {
            format!(
              "invalid config line \
               {}:{}",
              path.display(),
              idx + 1
            )
          })?;

      match line {
        | None => {}
        | Some(RcLine::Include(
          target
        )) => {
          let include = base_dir
            .join(expand_tilde(
              Path::new(target)
            ));
          debug!(
            file = %path.display(),
            include = %include.display(),
            line = idx + 1,
            "processing include"
          );
          if include.exists() {
            self.load(&include)?;
          } else {
            warn!(include = %include.display(), "include file does not exist; skipping");
          }
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "loaded config key");
          self.cfg.map.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    self.active.pop();
    Ok(())
  }
}

// `#` starts a comment anywhere on
// the line.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(head, _)| head)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err(anyhow!(
        "include path cannot be empty"
      ));
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected key = value, got: \
         {raw}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    return Err(anyhow!(
      "missing key before '='"
    ));
  }
  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

fn locate_rc(
  flag: Option<&Path>
) -> RcSource {
  if let Some(path) = flag {
    return RcSource::Flag(
      path.to_path_buf()
    );
  }

  match std::env::var(RC_ENV) {
    | Ok(value)
      if value == "/dev/null" =>
    {
      return RcSource::Disabled;
    }
    | Ok(value)
      if !value.trim().is_empty() =>
    {
      return RcSource::Env(
        PathBuf::from(value)
      );
    }
    | _ => {}
  }

  dirs::home_dir()
    .map(|home| home.join(RC_FILE_NAME))
    .filter(|candidate| {
      candidate.exists()
    })
    .map_or(
      RcSource::Absent,
      RcSource::Home
    )
}

/// Picks the snapshot directory:
/// `--data`, then `data.location`,
/// then `~/.tasksheet`. The directory
/// is created when missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let configured = override_dir
    .map(Path::to_path_buf)
    .or_else(|| {
      cfg
        .get(keys::DATA_LOCATION)
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
          expand_tilde(Path::new(
            v.trim()
          ))
        })
    });

  let dir = match configured {
    | Some(dir) => dir,
    | None => dirs::home_dir()
      .map(|home| {
        home.join(DATA_DIR_NAME)
      })
      .ok_or_else(|| {
        anyhow!(
          "cannot determine home \
           directory"
        )
      })?
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
  }
  fs::create_dir_all(&dir)
    .with_context(|| {
      format!(
        "failed to create {}",
        dir.display()
      )
    })?;

  Ok(dir)
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  if let Ok(rest) =
    path.strip_prefix("~")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_flag(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
