//! Command implementations.

mod check;
mod dump;
mod env;
mod select;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use rescat::{HookConfig, HookPipeline, Loader, ResourceCollection};
use tracing::debug;

use crate::cli::{Cli, Command, LoadArgs};

/// Global options every command sees.
#[derive(Debug)]
pub struct Context {
    pub verbose: bool,
    config: Option<PathBuf>,
    environment_hooks: bool,
}

impl Context {
    /// Hook pipeline from `--config` followed by the environment.
    pub fn hooks(&self) -> Result<HookPipeline> {
        let mut config = match &self.config {
            Some(path) => HookConfig::from_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => HookConfig::default(),
        };
        if self.environment_hooks {
            config = config.merge(HookConfig::from_env());
        }
        debug!(?config, "hook configuration");
        Ok(HookPipeline::from_config(&config)?)
    }

    /// Loads the location, running `hooks`' transforms, then applies the
    /// `--filter` options in order.
    pub fn load(&self, args: &LoadArgs, hooks: HookPipeline) -> Result<ResourceCollection> {
        let mut collection = Loader::new()
            .with_hooks(hooks)
            .load(&args.location)
            .with_context(|| format!("loading {}", args.location))?;
        for filter in &args.filters {
            collection = collection
                .filter(filter.as_str())
                .with_context(|| format!("filter '{}'", filter))?;
        }
        Ok(collection)
    }
}

/// Stdout, or the `--out` file.
pub fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = Context {
        verbose: cli.verbose,
        config: cli.config,
        environment_hooks: !cli.no_environment_hooks,
    };
    match cli.command {
        Command::Select(args) => select::run(&ctx, &args),
        Command::Dump(args) => dump::run(&ctx, &args),
        Command::Check(args) => check::run(&ctx, &args),
        Command::Env => env::run(),
    }
}
