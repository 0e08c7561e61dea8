pub mod calendar;
pub mod cell;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod occurrence;
pub mod render;
pub mod sheet;
pub mod task;
pub mod workdays;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::cli::{
  GlobalCli,
  Invocation
};
use crate::config::Config;
use crate::datastore::SheetStore;
use crate::render::Renderer;

/// Entry point behind the `tasksheet`
/// binary.
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let args =
    GlobalCli::parse_from(pre.cleaned_args);
  cli::init_tracing(
    args.verbose,
    args.quiet
  )?;
  info!(
    verbose = args.verbose,
    quiet = args.quiet,
    "starting tasksheet CLI"
  );

  let cfg = effective_config(
    &args,
    pre.rc_overrides
  )?;
  let store = open_store(&args, &cfg)?;
  let mut renderer = Renderer::new(&cfg)?;
  let inv =
    Invocation::parse(&cfg, args.rest)?;

  commands::dispatch(
    &store,
    &cfg,
    &mut renderer,
    inv
  )?;

  info!("done");
  Ok(())
}

// rc file first, then overrides from
// the command line.
fn effective_config(
  args: &GlobalCli,
  positional: Vec<(String, String)>
) -> anyhow::Result<Config> {
  let mut cfg =
    Config::load(args.rc_file.as_deref())
      .context(
        "failed to load configuration"
      )?;
  let overrides =
    args.all_overrides(positional);
  debug!(
    count = overrides.len(),
    "applying command-line overrides"
  );
  cfg.apply_overrides(overrides);
  Ok(cfg)
}

fn open_store(
  args: &GlobalCli,
  cfg: &Config
) -> anyhow::Result<SheetStore> {
  let data_dir =
    config::resolve_data_dir(
      cfg,
      args.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  SheetStore::open(&data_dir)
    .with_context(|| {
      format!(
        "failed to open sheet store at \
         {}",
        data_dir.display()
      )
    })
}
