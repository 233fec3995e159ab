//! Rendering and writing command results.
//!
//! Documents go to stdout or `--out`; logs go to stderr, so stdout stays
//! machine readable.

use crate::commands::status::{render_text, StatusReport};
use crate::config::OutputOptions;
use crate::error::ProverError;
use crate::submitter::{SimulatedTransaction, SubmissionReport};
use pod_proofs::ProofDocument;
use std::io::Write;
use tracing::{info, instrument};

/// What a command produced
#[derive(Debug)]
pub enum CommandOutput {
    /// Nothing to prove or submit
    Nothing(String),
    /// Proofs built without a submission mode
    Proofs(ProofDocument),
    /// Call data that would have been sent
    Simulated(Vec<SimulatedTransaction>),
    /// Per batch outcome of a sending run
    Submitted(SubmissionReport),
    Status(StatusReport),
}

impl CommandOutput {
    /// Render for printing. `None` when there is no document to print.
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn render(&self, json: bool) -> Result<Option<String>, serde_json::Error> {
        let rendered = match self {
            Self::Nothing(_) => return Ok(None),
            Self::Proofs(document) => serde_json::to_string_pretty(document)?,
            Self::Simulated(transactions) => serde_json::to_string_pretty(transactions)?,
            Self::Submitted(report) => serde_json::to_string_pretty(report)?,
            Self::Status(report) if json => serde_json::to_string_pretty(report)?,
            Self::Status(report) => render_text(report),
        };
        Ok(Some(rendered))
    }

    /// The error a partially successful run still has to report.
    #[must_use]
    pub fn take_error(&mut self) -> Option<ProverError> {
        let Self::Submitted(report) = self else {
            return None;
        };
        if let Some(failure) = report.take_failure() {
            return Some(failure.into());
        }
        report.cancelled.then_some(ProverError::Cancelled)
    }
}

/// Write `output` to the configured destination.
///
/// # Errors
/// Fails if the output cannot be serialized or written.
#[instrument(skip_all, fields(out = ?options.out))]
pub fn write_output(output: &CommandOutput, options: &OutputOptions) -> Result<(), ProverError> {
    let Some(mut rendered) = output.render(options.json)? else {
        if let CommandOutput::Nothing(message) = output {
            info!("{message}");
        }
        return Ok(());
    };
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }

    match &options.out {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!(path = %path.display(), "Wrote output");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}
