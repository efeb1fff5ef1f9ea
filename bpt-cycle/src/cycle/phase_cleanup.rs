//! CLEANING_UP: discard the consumed trace and restart the parsing service

use super::TrainingCycle;
use crate::session::StepOutcome;
use bpt_common::{Error, Result};
use std::path::Path;

impl TrainingCycle {
    pub(super) async fn phase_cleanup(&mut self) -> Result<StepOutcome> {
        if let Some(ctx) = self.current.take() {
            discard_trace(&ctx.paths.trace).await?;
        }

        let grace = self.settings.shutdown_grace;
        let kind = self.collaborators.service.shutdown(grace).await?;
        tracing::debug!(?kind, "Parsing service shut down");

        if !self.session.is_final_iteration() {
            let model = self.settings.model_path();
            self.collaborators.service.start(&model).await?;
        }

        Ok(StepOutcome::Advance)
    }
}

/// Remove a raw trace; one that is already gone is fine
pub(super) async fn discard_trace(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(trace = %path.display(), "Raw trace discarded");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, "remove", e)),
    }
}
