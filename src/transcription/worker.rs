//! # Conversion Orchestrator
//!
//! Turns an uploaded audio file into a MusicXML file by running the configured
//! transcriber command. The output lands next to the input with the
//! `musicxml` extension.

use crate::transcription::runner::{CommandRunner, ProcessRunner, RunError};
use crate::transcription::template::CommandTemplate;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Extension of the files the transcriber produces.
pub const OUTPUT_EXTENSION: &str = "musicxml";

/// Failure of a single conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Rejected by the tool. The message is meant for the caller.
    #[error("{message}")]
    Transcribe { message: String },

    /// Anything else. Log it, don't show it.
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Converts an audio file and returns the path of the result.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn convert(&self, input: &Path, instrument: &str) -> Result<PathBuf, ConvertError>;
}

/// Where the transcriber writes its result for `input`.
pub fn output_path_for(input: &Path) -> PathBuf {
    input.with_extension(OUTPUT_EXTENSION)
}

/// Runs the transcriber command for each conversion.
#[derive(Debug, Clone)]
pub struct Worker<R = ProcessRunner> {
    template: CommandTemplate,
    timeout: Duration,
    runner: R,
}

impl Worker<ProcessRunner> {
    pub fn new(template: &str, timeout: Duration) -> Result<Self> {
        Self::with_runner(template, timeout, ProcessRunner)
    }
}

impl<R: CommandRunner> Worker<R> {
    pub fn with_runner(template: &str, timeout: Duration, runner: R) -> Result<Self> {
        let template = CommandTemplate::new(template).context("no transcriber command configured")?;
        info!(command = %template.as_str(), timeout_secs = %timeout.as_secs(), "Transcriber configured");
        Ok(Self {
            template,
            timeout,
            runner,
        })
    }
}

#[async_trait]
impl<R: CommandRunner> Transcriber for Worker<R> {
    async fn convert(&self, input: &Path, instrument: &str) -> Result<PathBuf, ConvertError> {
        let output = output_path_for(input);
        let argv = self.template.resolve(
            &input.to_string_lossy(),
            &output.to_string_lossy(),
            instrument,
        );
        if argv.is_empty() {
            return Err(anyhow!("command template '{}' resolved to nothing", self.template.as_str()).into());
        }

        match self.runner.run(&argv, self.timeout).await {
            Ok(()) => Ok(output),
            Err(RunError::Transcribe(message)) => Err(ConvertError::Transcribe { message }),
            Err(e) => Err(ConvertError::Internal(anyhow::Error::new(e).context("can't run transcriber"))),
        }
    }
}
