// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Upload local files as the tasks of one job
//!
//! ```text
//! cargo run --example upload_files -- gcsout.toml part-0.csv part-1.csv
//! ```
//!
//! File `i` on the command line becomes task `i`. Settings can be overridden
//! with `GCSOUT_*` environment variables.

use gcsout_config::ConfigLoader;
use gcsout_core::{JobCoordinator, UploadTask};
use gcsout_observability::{init_tracing_with_config, LogConfig};
use gcsout_storage::{GcsConnector, RetryPolicy};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: upload_files <config> <file>...");
        std::process::exit(2);
    };
    let files: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let config = ConfigLoader::new().load_with_overrides(&config_path).await?;
    init_tracing_with_config(&LogConfig::from_settings(
        &config.observability.log_level,
        &config.observability.log_format,
    )?)?;

    let retry = &config.retry;
    let connector = Arc::new(GcsConnector::new(RetryPolicy::new(
        retry.max_retries,
        retry.initial_retry_interval_ms,
        retry.max_retry_interval_ms,
    )));
    let job = JobCoordinator::init(&config, connector).await?;

    let shutdown = job.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            println!("{}", serde_json::to_string(&report).unwrap_or_default());
        }
    });

    let tasks = files
        .into_iter()
        .enumerate()
        .map(|(index, path)| UploadTask::new(index, path))
        .collect();
    let outcome = job.run(tasks, &tx).await;
    drop(tx);
    progress.await?;

    let summary = job.finalize(outcome)?;
    info!(
        job_id = %summary.job_id,
        objects = summary.objects.len(),
        bytes = summary.bytes_committed,
        "Upload finished"
    );
    Ok(())
}
