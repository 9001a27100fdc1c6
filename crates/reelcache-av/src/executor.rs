//! Runs transcode plans.
//!
//! The executor owns nothing but the ffmpeg location and a timeout. It runs
//! each pass of a [`TranscodePlan`] in order, always removes two-pass
//! statistics files afterwards, and refuses to report success for an empty
//! output.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reelcache_common::{Error, Result};
use tracing::{debug, info, warn};

use crate::assembler::TranscodePlan;
use crate::command::ToolCommand;

/// Default per-pass timeout: 6 hours.
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Executes ffmpeg argument vectors.
#[derive(Debug, Clone)]
pub struct TranscodeExecutor {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl TranscodeExecutor {
    /// Executor using the given ffmpeg binary.
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }

    /// Override the per-pass timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The ffmpeg binary in use.
    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    /// Run one ffmpeg invocation.
    pub async fn run_args(&self, args: &[String]) -> Result<()> {
        ToolCommand::new(self.ffmpeg.clone())
            .args(args.iter().cloned())
            .timeout(self.timeout)
            .execute()
            .await?;
        Ok(())
    }

    /// Run every pass of `plan`, then check that `output` is non-empty.
    ///
    /// Passes run strictly in order and a failing pass stops the plan.
    /// Two-pass statistics files are removed whether or not the plan
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - [`Error::Tool`] if any pass fails or the output is missing or empty.
    pub async fn execute(&self, plan: &TranscodePlan, output: &Path) -> Result<()> {
        let started = Instant::now();
        let result = self.run_passes(plan).await;
        cleanup_files(&plan.passlog_artifacts()).await;
        result?;

        verify_output(output).await?;
        info!(
            output = %output.display(),
            passes = plan.passes(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Transcode finished"
        );
        Ok(())
    }

    async fn run_passes(&self, plan: &TranscodePlan) -> Result<()> {
        let runs = plan.runs();
        let total = runs.len();
        for (i, args) in runs.into_iter().enumerate() {
            debug!(pass = i + 1, total, "Starting ffmpeg pass");
            self.run_args(args).await?;
        }
        Ok(())
    }
}

/// Fail unless `path` exists with non-zero length.
pub async fn verify_output(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(Error::tool(
            "ffmpeg",
            format!("produced an empty file: {}", path.display()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::tool(
            "ffmpeg",
            format!("produced no output: {}", path.display()),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal. Missing files are fine; anything else is logged.
pub async fn cleanup_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(verify_output(&path).await, Err(Error::Tool { .. })));

        std::fs::write(&path, b"data").unwrap();
        assert!(verify_output(&path).await.is_ok());

        let missing = dir.path().join("missing.mp4");
        assert!(verify_output(&missing).await.is_err());
    }

    #[tokio::test]
    async fn cleanup_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("p-0.log");
        std::fs::write(&present, b"stats").unwrap();
        cleanup_files(&[present.clone(), dir.path().join("p-0.log.mbtree")]).await;
        assert!(!present.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn passlog_removed_after_failed_pass() {
        let dir = tempfile::tempdir().unwrap();
        let passlog = dir.path().join("key");
        for artifact in crate::assembler::passlog_artifacts(&passlog) {
            std::fs::write(artifact, b"stats").unwrap();
        }

        let plan = TranscodePlan::TwoPass {
            first: vec!["-c".into(), "exit 0".into()],
            second: vec!["-c".into(), "exit 3".into()],
            passlog: passlog.clone(),
        };
        let executor = TranscodeExecutor::new("sh");
        let err = executor
            .execute(&plan, &dir.path().join("out.webm"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Tool { .. }));
        for artifact in plan.passlog_artifacts() {
            assert!(!artifact.exists(), "{} left behind", artifact.display());
        }
    }
}
