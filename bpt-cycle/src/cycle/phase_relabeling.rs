//! RELABELING: resolve matched entries and persist what the trainer consumes

use super::TrainingCycle;
use crate::session::StepOutcome;
use bpt_common::config::ExamplesScope;
use bpt_common::{Error, Result};
use bpt_curriculum::histogram::write_histogram;
use bpt_curriculum::store::{save_entries, RecordWriter};

impl TrainingCycle {
    pub(super) async fn phase_relabeling(&mut self) -> Result<StepOutcome> {
        let iteration = self.session.iteration;
        let first_pass = self.session.passes == 0;
        let scope = self.settings.curriculum.examples_scope;

        let ctx = self.context()?;
        let Some(scheduler) = ctx.scheduler.as_ref() else {
            return Err(Error::InvalidInput("relabel without a selected target".to_string()));
        };

        let relabeled = scheduler.relabel(&mut ctx.entries, &ctx.matches);
        tracing::info!(iteration, relabeled, "Entries relabelled");

        save_entries(&ctx.entries, &ctx.paths.relabeled, false)?;
        write_histogram(&ctx.table.ranked(), &ctx.paths.histogram)?;

        match scope {
            ExamplesScope::Full => save_entries(&ctx.entries, &ctx.paths.examples, false)?,
            ExamplesScope::Matched => {
                let mut writer = RecordWriter::open(&ctx.paths.examples, !first_pass)?;
                for &index in &ctx.matches {
                    if let Some(entry) = ctx.entries.get(index) {
                        writer.write(entry)?;
                    }
                }
                writer.finish()?;
            }
        }

        Ok(StepOutcome::AnotherPass)
    }
}
