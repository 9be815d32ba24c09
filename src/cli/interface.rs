use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use indicatif::ProgressBar;
use log::{error, info};
use std::io;

use crate::adapters::mongo::MongoJobStore;
use crate::adapters::output::{emit_status_line, StatusLine};
use crate::adapters::store::JobStore;
use crate::core::job::TrainingRequest;
use crate::core::pipeline::PIPELINE_STEPS;
use crate::core::runner::TrainingRunner;
use crate::utils::config::parse_job_request;
use crate::utils::lib::*;

pub async fn run_cli_interface() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let line = execute(&args).await;
    let mut stdout = io::stdout().lock();
    emit_status_line(&mut stdout, &line)
        .context("Failed to report job status")?;
    Ok(())
}

/// Resolve arguments, train, and persist; always yields a status line.
pub async fn execute(args: &Args) -> StatusLine {
    let request = match parse_job_request(args.model_id.as_deref(), args.config.as_deref()) {
        Ok(request) => request,
        Err(e) => {
            error!("Rejected job arguments: {}", e);
            return StatusLine::error(e.to_string());
        }
    };

    let settings = StoreSettings::resolve(args);
    let store = match MongoJobStore::connect(&settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open job store: {:#}", e);
            return StatusLine::error(format!("{:#}", e));
        }
    };

    let progress = if args.progress {
        create_progress_bar(PIPELINE_STEPS).unwrap_or_else(|_| ProgressBar::hidden())
    } else {
        ProgressBar::hidden()
    };
    run_job(store, &request, progress).await
}

/// Run one job against an open store, closing the store whatever the outcome.
pub async fn run_job<S: JobStore>(store: S, request: &TrainingRequest, progress: ProgressBar) -> StatusLine {
    let runner = TrainingRunner::new(store).with_progress(progress);
    let line = runner.run(request).await;
    runner.store().close().await;
    info!("Training job {} finished", request.job_id);
    line
}
