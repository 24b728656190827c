use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::BuildConfig;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[async_trait]
pub trait BuildStep: Send + Sync {
    async fn build(&self) -> Result<(), BuildError>;

    /// Hands the new element to the build and rebuilds the stylesheet.
    async fn publish(&self, element: &str) -> Result<(), BuildError>;
}

/// Runs the utility-CSS build command through the platform shell.
pub struct ShellBuildStep {
    command: String,
    working_dir: PathBuf,
    output_html: PathBuf,
}

impl ShellBuildStep {
    pub fn new(command: String, working_dir: PathBuf, output_html: PathBuf) -> Self {
        ShellBuildStep {
            command,
            working_dir,
            output_html,
        }
    }

    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new(
            config.command.clone(),
            config.working_dir(),
            config.output_html_path(),
        )
    }

    fn shell_command(&self) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c");
            cmd
        };
        cmd.arg(&self.command).current_dir(&self.working_dir);
        cmd
    }
}

#[async_trait]
impl BuildStep for ShellBuildStep {
    async fn build(&self) -> Result<(), BuildError> {
        info!(command = %self.command, dir = %self.working_dir.display(), "running CSS build");

        let output = self
            .shell_command()
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(status = %output.status, "CSS build failed");
            return Err(BuildError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr,
            });
        }

        Ok(())
    }

    async fn publish(&self, element: &str) -> Result<(), BuildError> {
        let io_err = |source| BuildError::Io {
            path: self.output_html.clone(),
            source,
        };
        if let Some(parent) = self.output_html.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.output_html, element)
            .await
            .map_err(io_err)?;

        self.build().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let step = ShellBuildStep::new(
            "echo built > marker.txt".to_string(),
            dir.path().to_path_buf(),
            dir.path().join("output.html"),
        );

        step.build().await.unwrap();
        let marker = std::fs::read_to_string(dir.path().join("marker.txt")).unwrap();
        assert_eq!(marker.trim(), "built");
    }

    #[tokio::test]
    async fn test_failed_build_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let step = ShellBuildStep::new(
            "echo 'tailwindcss: not found' >&2; exit 3".to_string(),
            dir.path().to_path_buf(),
            dir.path().join("output.html"),
        );

        match step.build().await.unwrap_err() {
            BuildError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "tailwindcss: not found");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_content_file_first() {
        let dir = tempfile::tempdir().unwrap();
        let output_html = dir.path().join("src/html/output.html");
        let step = ShellBuildStep::new(
            "cp src/html/output.html copied.html".to_string(),
            dir.path().to_path_buf(),
            output_html.clone(),
        );

        step.publish("<div class=\"p-4\">hi</div>").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&output_html).unwrap(),
            "<div class=\"p-4\">hi</div>"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("copied.html")).unwrap(),
            "<div class=\"p-4\">hi</div>"
        );
    }
}
