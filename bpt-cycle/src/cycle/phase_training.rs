//! TRAINING and TESTING
//!
//! The trainer writes to a staging file that replaces the model by rename,
//! so an aborted iteration leaves the last committed model in place.
//! Testing is diagnostic: its failures are logged and the cycle carries on.

use super::phase_initializing::commit_model;
use super::{staging_path, TrainingCycle};
use crate::session::StepOutcome;
use bpt_common::Result;

impl TrainingCycle {
    pub(super) async fn phase_training(&mut self) -> Result<StepOutcome> {
        self.reclaim_history();

        let model = self.settings.model_path();
        let staging = staging_path(&model);
        let examples = self.context()?.paths.examples.clone();

        tracing::info!(
            iteration = self.session.iteration,
            examples = %examples.display(),
            "Training model"
        );

        if let Err(e) = self
            .collaborators
            .trainer
            .train(&examples, &model, &staging)
            .await
        {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        commit_model(&staging, &model).await?;

        Ok(StepOutcome::Advance)
    }

    pub(super) async fn phase_testing(&mut self) -> Result<StepOutcome> {
        let Some(test_set) = self.settings.test_set.clone() else {
            tracing::debug!("No test set configured, skipping evaluation");
            return Ok(StepOutcome::Advance);
        };

        let model = self.settings.model_path();
        let output = self.context()?.paths.test_output.clone();

        match self
            .collaborators
            .parser
            .evaluate(&model, &test_set, &output)
            .await
        {
            Ok(()) => tracing::info!(
                iteration = self.session.iteration,
                output = %output.display(),
                "Evaluation finished"
            ),
            Err(e) => tracing::warn!(
                iteration = self.session.iteration,
                error = %e,
                "Evaluation failed, continuing"
            ),
        }

        Ok(StepOutcome::Advance)
    }
}
