//! INITIALIZING: make sure a base model exists and start the service

use super::{staging_path, TrainingCycle};
use crate::session::StepOutcome;
use bpt_common::{Error, Result};
use std::path::Path;

impl TrainingCycle {
    pub(super) async fn phase_initializing(&mut self) -> Result<StepOutcome> {
        let working_dir = &self.settings.working_dir;
        tokio::fs::create_dir_all(working_dir)
            .await
            .map_err(|e| Error::io(working_dir, "create_dir", e))?;

        let model = self.settings.model_path();
        if tokio::fs::try_exists(&model)
            .await
            .map_err(|e| Error::io(&model, "stat", e))?
        {
            tracing::info!(model = %model.display(), "Using existing model");
        } else {
            let Some(treebank) = self.settings.seed_treebank.clone() else {
                return Err(Error::Config(format!(
                    "No model at {} and no cycle.seed_treebank configured",
                    model.display()
                )));
            };

            tracing::info!(
                treebank = %treebank.display(),
                model = %model.display(),
                "Training base model from seed treebank"
            );
            let staging = staging_path(&model);
            if let Err(e) = self
                .collaborators
                .trainer
                .train_seed(&treebank, &staging)
                .await
            {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
            commit_model(&staging, &model).await?;
        }

        if self.session.max_iterations == Some(0) {
            tracing::info!("Iteration cap is zero, not starting the parsing service");
            return Ok(StepOutcome::Advance);
        }

        self.collaborators.service.start(&model).await?;
        Ok(StepOutcome::Advance)
    }
}

/// Replace `model` with the freshly written `staging` file
///
/// The rename is the only write to `model`, so a failure before it leaves
/// the previous model intact.
pub(super) async fn commit_model(staging: &Path, model: &Path) -> Result<()> {
    let exists = tokio::fs::try_exists(staging)
        .await
        .map_err(|e| Error::io(staging, "stat", e))?;
    if !exists {
        return Err(Error::External {
            stage: "train",
            message: format!("trainer did not write {}", staging.display()),
        });
    }

    tokio::fs::rename(staging, model).await.map_err(|e| {
        tracing::error!(
            staging = %staging.display(),
            model = %model.display(),
            error = %e,
            "Failed to commit model"
        );
        Error::io(model, "rename", e)
    })?;

    tracing::info!(model = %model.display(), "Model committed");
    Ok(())
}
