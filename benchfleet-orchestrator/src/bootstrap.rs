//! Worker bootstrap
//!
//! Every worker boots from a small launcher script published next to the
//! runner binary. The launcher downloads the runner, prepares a checkout of
//! the project under test and starts the runner with the experiment's
//! parameters.

use anyhow::{Context, Result, bail};
use benchfleet_client::storage::ObjectStore;
use benchfleet_core::domain::Setup;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

const WORK_DIR: &str = "/tmp";

/// Everything the launcher passes on to the runner
#[derive(Debug, Clone)]
pub struct LaunchParams<'a> {
    pub proj_uri: &'a str,
    pub tags: &'a [String],
    pub setup: Setup,
    pub orchestrator_ip: &'a str,
    pub list_port: u16,
    pub report_port: u16,
    pub project: &'a str,
    pub bucket: &'a str,
    pub experiment_tag: &'a str,
    pub generate_pprof: bool,
    pub envs: &'a [String],
    pub commands: &'a [String],
}

/// Object keys of the two bootstrap artifacts
pub fn launcher_key(instance_name: &str) -> String {
    format!("{}/startup.sh", instance_name)
}

pub fn runner_key(instance_name: &str) -> String {
    format!("{}/runner", instance_name)
}

/// Quotes `value` for a POSIX shell
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Renders the launcher script
///
/// # Arguments
/// * `params` - Experiment parameters handed to the runner
/// * `runner_source` - `gs://` location the runner binary is copied from
pub fn render_launcher(params: &LaunchParams<'_>, runner_source: &str) -> Result<String> {
    let Some(first_tag) = params.tags.first() else {
        bail!("at least one revision tag is required");
    };

    let mut runner = format!(
        "./runner --path {work}/proj --tags {tags} --bed {bed} --iterations {it} --sr {sr} \
         --orchestrator-ip {ip} --benchmark-list-port {list} --measurement-report-port {report} \
         --project-name {project} --bucket-name {bucket} --experiment-tag {tag} \
         --log-file {work}/log.txt",
        work = WORK_DIR,
        tags = shell_quote(&params.tags.join(",")),
        bed = params.setup.duration_per_job,
        it = params.setup.iterations,
        sr = params.setup.suite_runs,
        ip = shell_quote(params.orchestrator_ip),
        list = params.list_port,
        report = params.report_port,
        project = shell_quote(params.project),
        bucket = shell_quote(params.bucket),
        tag = shell_quote(params.experiment_tag),
    );
    if params.generate_pprof {
        runner.push_str(" --generate-pprof");
    }
    for env in params.envs {
        write!(runner, " --env {}", shell_quote(env))?;
    }
    for command in params.commands {
        write!(runner, " --command {}", shell_quote(command))?;
    }

    Ok(format!(
        r#"#!/bin/bash

echo "Running startup script ..."
export HOME={work}
export PATH=$PATH:/usr/local/go/bin
LOGFILE={work}/startup.log

run_benchmark_runner() {{
    cd {work}
    gsutil cp {source} ./runner
    chmod +x runner
    git clone {uri} proj
    git config --global --add safe.directory '*'
    cd proj
    git fetch --all --tags
    git checkout {checkout}
    cd ..
    {runner}
}}

run_benchmark_runner >& $LOGFILE

exit 0
"#,
        work = WORK_DIR,
        source = shell_quote(runner_source),
        uri = shell_quote(params.proj_uri),
        checkout = shell_quote(&format!("tags/{}", first_tag)),
        runner = runner,
    ))
}

/// Publishes the launcher and the runner binary under `<instance_name>/`
///
/// A missing runner binary is an error unless `require_runner` is false, in
/// which case only the launcher is published.
///
/// # Returns
/// The URL of the published launcher, used as the workers' startup script
pub async fn publish(
    store: &dyn ObjectStore,
    instance_name: &str,
    launcher: String,
    runner_binary: &Path,
    require_runner: bool,
) -> Result<String> {
    match tokio::fs::read(runner_binary).await {
        Ok(bytes) => {
            info!(
                "Uploading runner binary {} ({} bytes)",
                runner_binary.display(),
                bytes.len()
            );
            store
                .upload(bytes, &runner_key(instance_name))
                .await
                .context("Failed to upload runner binary")?;
        }
        Err(e) if !require_runner => {
            warn!(
                "Runner binary {} not published: {}",
                runner_binary.display(),
                e
            );
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to read runner binary {}", runner_binary.display())
            });
        }
    }

    let key = launcher_key(instance_name);
    store
        .upload(launcher.into_bytes(), &key)
        .await
        .context("Failed to upload startup script")?;

    let url = store.url(&key);
    info!("Published startup script at {}", url);
    Ok(url)
}
