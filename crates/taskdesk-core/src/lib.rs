pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod filter;
pub mod org;
pub mod render;
pub mod session;
pub mod status;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting desk CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.deskrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let session_dir = config::resolve_session_dir(&cfg, cli.session.as_deref())
        .context("failed to resolve session directory")?;

    let store = session::SessionStore::open(&session_dir).with_context(|| {
        format!("failed to open session store at {}", session_dir.display())
    })?;
    let token = store.load()?.map(|session| session.token);

    let mut api = api::ApiClient::new(&cfg.api_url(), token)
        .context("failed to construct API client")?;

    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&mut api, &store, &cfg, &mut renderer, inv)?;

    info!("done");
    Ok(())
}
