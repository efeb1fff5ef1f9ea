//! ANALYZING_TRACE: aggregate bigrams, select a target, find its entries
//!
//! The first pass of an iteration loads the trace and builds the scheduler;
//! later passes reuse both so relabelled entries stay relabelled.

use super::TrainingCycle;
use crate::session::StepOutcome;
use bpt_common::{CycleEvent, Error, Result};
use bpt_curriculum::store::load_entries;
use bpt_curriculum::{BigramTable, CurriculumScheduler, RoundOutcome};
use chrono::Utc;

impl TrainingCycle {
    pub(super) async fn phase_analyzing(&mut self) -> Result<StepOutcome> {
        let run_id = self.session.run_id;
        let iteration = self.session.iteration;
        let passes = self.session.passes;

        let corpus = match &self.settings.tagged_corpus {
            Some(path) if passes == 0 => Some(
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| Error::io(path, "read", e))?,
            ),
            _ => None,
        };

        let curriculum = self.settings.curriculum.clone();
        let history = &mut self.history;
        let ctx = self
            .current
            .as_mut()
            .ok_or_else(|| Error::InvalidInput("trace analysis without a parsed corpus".to_string()))?;

        if ctx.scheduler.is_none() {
            ctx.entries = load_entries(&ctx.paths.trace)?;
            ctx.table = BigramTable::aggregate(corpus.as_deref(), &ctx.entries);
            tracing::info!(
                iteration,
                entries = ctx.entries.len(),
                bigrams = ctx.table.len(),
                total = ctx.table.total(),
                "Trace aggregated"
            );
            ctx.scheduler = Some(CurriculumScheduler::new(
                &ctx.table,
                std::mem::take(history),
                &curriculum,
            ));
        }

        let Some(scheduler) = ctx.scheduler.as_mut() else {
            return Err(Error::InvalidInput("scheduler missing after analysis".to_string()));
        };
        let outcome = scheduler.next_round(&ctx.entries);
        let retired = scheduler.take_retired();

        for key in retired {
            self.event_bus.emit_lossy(CycleEvent::BigramRetired {
                run_id,
                iteration,
                first: key.first,
                second: key.second,
                timestamp: Utc::now(),
            });
        }

        match outcome {
            RoundOutcome::Target { bigram, matches } => {
                self.event_bus.emit_lossy(CycleEvent::TargetSelected {
                    run_id,
                    iteration,
                    first: bigram.first().to_string(),
                    second: bigram.second().to_string(),
                    frequency: bigram.frequency(),
                    matches: matches.len(),
                    timestamp: Utc::now(),
                });
                self.targets.push(bigram.key);
                ctx.matches = matches;
                Ok(StepOutcome::Advance)
            }
            RoundOutcome::Exhausted => {
                tracing::info!(iteration, passes, "Curriculum exhausted");
                self.event_bus.emit_lossy(CycleEvent::CurriculumExhausted {
                    run_id,
                    iteration,
                    passes,
                    timestamp: Utc::now(),
                });
                ctx.matches.clear();
                self.reclaim_history();
                Ok(StepOutcome::Exhausted)
            }
        }
    }
}
