pub mod cache;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod model;
pub mod remote;
pub mod render;
pub mod stores;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use crate::remote::RemoteStore;

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let cli = cli::GlobalCli::parse_from(raw_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting shiki CLI");

    let mut cfg = config::Config::load(cli.shikirc.as_deref())?;
    cfg.apply_overrides(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value)));

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store: Arc<dyn RemoteStore> = Arc::new(
        datastore::JsonStore::open(&data_dir)
            .with_context(|| format!("failed to open datastore at {}", data_dir.display()))?,
    );

    let mut app = commands::App::new(store);

    if cfg.get_bool("seed.categories").unwrap_or(true) {
        let seeded = app
            .categories
            .seed_defaults()
            .context("failed to seed default categories")?;
        if seeded > 0 {
            debug!(seeded, "seeded default categories");
        }
    }

    app.start()?;

    let renderer = Arc::new(render::Renderer::new(&cfg)?);
    commands::dispatch(&mut app, &renderer, cli.command)?;

    app.stop();
    info!("done");
    Ok(())
}
