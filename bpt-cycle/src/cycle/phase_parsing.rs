//! PARSING_CORPUS: run the corpus through the parser with the current model

use super::{IterationContext, IterationPaths, TrainingCycle};
use crate::external::ParseRequest;
use crate::session::StepOutcome;
use bpt_common::{CycleEvent, Error, Result};
use bpt_curriculum::BigramTable;
use chrono::Utc;

impl TrainingCycle {
    pub(super) async fn phase_parsing(&mut self) -> Result<StepOutcome> {
        let iteration = self.session.iteration;
        tracing::info!(run_id = %self.session.run_id, iteration, "Starting iteration");
        self.event_bus.emit_lossy(CycleEvent::IterationStarted {
            run_id: self.session.run_id,
            iteration,
            timestamp: Utc::now(),
        });

        let paths = IterationPaths::new(&self.settings.working_dir, iteration);
        tokio::fs::create_dir_all(&paths.dir)
            .await
            .map_err(|e| Error::io(&paths.dir, "create_dir", e))?;

        let request = ParseRequest {
            model: self.settings.model_path(),
            corpus: self.settings.corpus.clone(),
            trace: paths.trace.clone(),
            output: paths.parse_output.clone(),
        };
        self.collaborators.parser.parse_corpus(&request).await?;

        tracing::debug!(trace = %paths.trace.display(), "Corpus parsed");

        self.current = Some(IterationContext {
            paths,
            entries: Vec::new(),
            table: BigramTable::new(),
            scheduler: None,
            matches: Vec::new(),
        });

        Ok(StepOutcome::Advance)
    }
}
