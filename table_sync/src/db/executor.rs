//! Phased DDL executor
//!
//! Steps are grouped by phase and the phases run strictly in order. Inside a
//! phase every step is dispatched at once and the phase only ends when all of
//! them have finished.

use futures::future::join_all;
use std::sync::Arc;

use crate::db::connection::StatementRunner;
use crate::error::Result;
use crate::schema::planner::{ChangeStep, Phase};

/// Runs change steps phase by phase
#[derive(Clone)]
pub struct PhaseExecutor {
    runner: Arc<dyn StatementRunner>,
}

impl PhaseExecutor {
    /// Create a new phase executor
    pub fn new(runner: Arc<dyn StatementRunner>) -> Self {
        Self { runner }
    }

    /// Execute a single SQL statement
    pub async fn execute(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql = %sql, "Executing statement");
        self.runner.execute(sql).await
    }

    /// Execute all steps, returning how many were dispatched
    ///
    /// The first failure stops the run once its phase has settled; later phases
    /// never start.
    pub async fn execute_steps(&self, steps: &[ChangeStep]) -> Result<usize> {
        let mut dispatched = 0;

        for phase in Phase::ORDERED {
            let batch: Vec<&ChangeStep> = steps
                .iter()
                .filter(|step| step.phase == phase && !step.is_noop())
                .collect();
            if batch.is_empty() {
                continue;
            }

            tracing::debug!(phase = %phase, steps = batch.len(), "Running phase");
            dispatched += batch.len();

            let results = join_all(batch.iter().map(|step| self.run_step(step))).await;
            if let Some(error) = results.into_iter().find_map(|r| r.err()) {
                tracing::error!(phase = %phase, error = %error, "Phase failed");
                return Err(error);
            }
        }

        Ok(dispatched)
    }

    /// Statements of one step, in order
    async fn run_step(&self, step: &ChangeStep) -> Result<()> {
        for sql in &step.statements {
            tracing::debug!(phase = %step.phase, table = %step.table, sql = %sql, "Executing statement");
            self.runner.execute(sql).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(phase: Phase, table: &str, statements: &[&str]) -> ChangeStep {
        ChangeStep {
            phase,
            table: table.to_string(),
            description: format!("{} {}", phase, table),
            statements: statements.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let runner = Arc::new(RecordingRunner::default());
        let executor = PhaseExecutor::new(runner.clone());

        let steps = vec![
            step(Phase::Drop, "a", &["drop a"]),
            step(Phase::Foreign, "a", &["foreign a"]),
            step(Phase::Create, "a", &["create a"]),
            step(Phase::Constraint, "a", &["constraint a"]),
            step(Phase::Copy, "a", &["copy a"]),
            step(Phase::Backup, "a", &["backup a"]),
        ];

        assert_eq!(executor.execute_steps(&steps).await.unwrap(), 6);
        assert_eq!(
            runner.recorded(),
            vec!["backup a", "copy a", "create a", "constraint a", "foreign a", "drop a"]
        );
    }

    #[tokio::test]
    async fn test_phase_barrier_waits_for_slow_steps() {
        let runner = Arc::new(RecordingRunner {
            slow_on: Some("slow".to_string()),
            ..RecordingRunner::default()
        });
        let executor = PhaseExecutor::new(runner.clone());

        let steps = vec![
            step(Phase::Create, "a", &["create slow a"]),
            step(Phase::Create, "b", &["create b"]),
            step(Phase::Constraint, "b", &["constraint b"]),
        ];
        executor.execute_steps(&steps).await.unwrap();

        let recorded = runner.recorded();
        assert_eq!(recorded.len(), 3);
        assert_eq!(recorded[2], "constraint b");
    }

    #[tokio::test]
    async fn test_statements_within_a_step_stay_ordered() {
        let runner = Arc::new(RecordingRunner {
            slow_on: Some("first".to_string()),
            ..RecordingRunner::default()
        });
        let executor = PhaseExecutor::new(runner.clone());

        executor
            .execute_steps(&[step(Phase::Drop, "a", &["first", "second"])])
            .await
            .unwrap();

        assert_eq!(runner.recorded(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_noops_are_skipped() {
        let runner = Arc::new(RecordingRunner::default());
        let executor = PhaseExecutor::new(runner.clone());

        let steps = vec![step(Phase::Create, "a", &["create a"]), step(Phase::Foreign, "a", &[])];

        assert_eq!(executor.execute_steps(&steps).await.unwrap(), 1);
        assert_eq!(runner.recorded(), vec!["create a"]);
    }

    #[tokio::test]
    async fn test_failure_settles_phase_and_stops() {
        let runner = Arc::new(RecordingRunner {
            fail_on: Some("bad".to_string()),
            slow_on: Some("slow".to_string()),
            ..RecordingRunner::default()
        });
        let executor = PhaseExecutor::new(runner.clone());

        let steps = vec![
            step(Phase::Create, "a", &["create bad a"]),
            step(Phase::Create, "b", &["create slow b"]),
            step(Phase::Drop, "c", &["drop c"]),
        ];

        let result = executor.execute_steps(&steps).await;

        assert!(matches!(result, Err(crate::error::Error::SqlxError(_))));
        assert_eq!(runner.recorded(), vec!["create slow b"]);
    }
}
