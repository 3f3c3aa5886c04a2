//! Pre-run environment
//!
//! Experiments may declare environment variables (`KEY=VALUE`) and shell
//! commands that prepare the project before anything is discovered or
//! measured. Variables are handed to every child process spawned for the
//! experiment; the process's own environment is left untouched.

use std::path::Path;
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    Failed {
        command: String,
        status: ExitStatus,
        output: String,
    },
}

/// Parses `KEY=VALUE` entries, skipping malformed ones
pub fn parse_env_pairs(entries: &[String]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.is_empty() => Some((key.to_string(), value.to_string())),
            _ => {
                warn!("Ignoring malformed environment entry '{}'", entry);
                None
            }
        })
        .collect()
}

/// Runs each command through `sh -c` in `dir`, stopping at the first failure
pub async fn run_commands(
    commands: &[String],
    dir: &Path,
    envs: &[(String, String)],
) -> Result<(), CommandError> {
    for command in commands.iter().filter(|c| !c.trim().is_empty()) {
        debug!("Running command: {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(CommandError::Failed {
                command: command.clone(),
                status: output.status,
                output: combined.trim().to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_pairs() {
        let entries = vec![
            "GOMAXPROCS=2".to_string(),
            "GOFLAGS=-mod=vendor".to_string(),
            "broken".to_string(),
            "=nokey".to_string(),
            String::new(),
        ];
        let pairs = parse_env_pairs(&entries);
        assert_eq!(
            pairs,
            vec![
                ("GOMAXPROCS".to_string(), "2".to_string()),
                ("GOFLAGS".to_string(), "-mod=vendor".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_commands_passes_env() {
        let dir = std::env::temp_dir();
        let envs = vec![("BENCHFLEET_PROBE".to_string(), "on".to_string())];
        let commands = vec!["test \"$BENCHFLEET_PROBE\" = on".to_string(), String::new()];
        assert!(run_commands(&commands, &dir, &envs).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_commands_stops_on_failure() {
        let dir = std::env::temp_dir();
        let commands = vec!["echo broken >&2; exit 3".to_string()];
        match run_commands(&commands, &dir, &[]).await {
            Err(CommandError::Failed { output, .. }) => assert_eq!(output, "broken"),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
