//! Database synchronizer
//!
//! Drives one sync pass: picks the pending associations, plans each one against
//! the live database and hands the combined steps to the [`PhaseExecutor`].

use serde::Serialize;
use std::sync::Arc;

use crate::config::{AlterationPolicy, SyncOptions};
use crate::db::connection::StatementRunner;
use crate::db::dialect::Dialect;
use crate::db::executor::PhaseExecutor;
use crate::error::{Error, Result};
use crate::schema::adapt::to_dialect_schema;
use crate::schema::builder::SchemaBuilder;
use crate::schema::inspector::DatabaseInspector;
use crate::schema::planner::{ChangePlanner, ChangeStep};
use crate::schema::types::{Associations, SchemaCatalog};

/// An alteration left for manual review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeferredAlteration {
    pub reference: String,
    pub table: String,
    pub changes: Vec<String>,
}

/// Planning result of one pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncPlan {
    pub steps: Vec<ChangeStep>,
    /// References whose steps are in `steps`
    pub planned: Vec<String>,
    pub deferred: Vec<DeferredAlteration>,
    /// Readonly references
    pub skipped: Vec<String>,
}

/// What a sync pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub steps: Vec<ChangeStep>,
    /// Steps that carried DDL and were executed
    pub executed: usize,
    pub deferred: Vec<DeferredAlteration>,
    pub skipped: Vec<String>,
    pub dry_run: bool,
}

impl SyncReport {
    /// Nothing planned, deferred or skipped
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.deferred.is_empty() && self.skipped.is_empty()
    }
}

/// Synchronizes tracked schemas with one database
pub struct DatabaseSynchronizer {
    inspector: DatabaseInspector,
    executor: PhaseExecutor,
    options: SyncOptions,
}

impl DatabaseSynchronizer {
    pub fn new(inspector: DatabaseInspector, runner: Arc<dyn StatementRunner>, options: SyncOptions) -> Self {
        Self {
            inspector,
            executor: PhaseExecutor::new(runner),
            options,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.inspector.dialect()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Plan every pending association without touching the database
    pub async fn plan(&self, associations: &Associations) -> Result<SyncPlan> {
        let mut plan = SyncPlan::default();

        let pending = associations.pending();
        if pending.is_empty() {
            return Ok(plan);
        }

        let live_tables = self.inspector.tables().await?;
        let mut planner = ChangePlanner::new(&self.inspector, self.options.backup_before_drop);

        for reference in pending {
            let schema = associations.get_schema(&reference).ok_or_else(|| {
                Error::InvalidSchema(format!("association `{}` has no schema", reference))
            })?;

            if schema.is_readonly() {
                tracing::debug!(reference = %reference, "Skipping readonly schema");
                plan.skipped.push(reference);
                continue;
            }

            let adapted = to_dialect_schema(schema, self.dialect());
            match planner.plan_schema(&adapted, associations, &live_tables).await {
                Ok(steps) => {
                    tracing::debug!(reference = %reference, steps = steps.len(), "Planned schema");
                    plan.steps.extend(steps);
                    plan.planned.push(reference);
                }
                Err(Error::UnhandledAlteration { table, changes })
                    if self.options.on_unhandled_alteration == AlterationPolicy::Defer =>
                {
                    tracing::warn!(
                        reference = %reference,
                        table = %table,
                        changes = %changes.join("; "),
                        "Deferring unhandled alteration"
                    );
                    plan.deferred.push(DeferredAlteration {
                        reference,
                        table,
                        changes,
                    });
                }
                Err(error) => return Err(error),
            }
        }

        Ok(plan)
    }

    /// Bring every pending association in line with the database
    ///
    /// Associations are marked in sync only after all steps ran. Deferred ones
    /// stay pending.
    pub async fn sync(&self, associations: &mut Associations) -> Result<SyncReport> {
        let plan = self.plan(associations).await?;

        let mut report = SyncReport {
            steps: plan.steps,
            executed: 0,
            deferred: plan.deferred,
            skipped: plan.skipped,
            dry_run: self.options.dry_run,
        };

        if self.options.dry_run {
            for (i, step) in report.steps.iter().enumerate() {
                tracing::info!(
                    step_number = i + 1,
                    phase = %step.phase,
                    table = %step.table,
                    sql = %step.statements.join(";\n"),
                    "{} (dry run)",
                    step.description
                );
            }
            return Ok(report);
        }

        report.executed = self.executor.execute_steps(&report.steps).await?;

        for reference in plan.planned.iter().chain(report.skipped.iter()) {
            associations.mark_synced(reference);
        }

        if report.executed > 0 {
            tracing::info!(
                steps = report.executed,
                schemas = plan.planned.len(),
                "Database schema synchronized"
            );
        }

        Ok(report)
    }

    /// Drop a table outside the diff pipeline
    pub async fn delete_table(&self, table: &str) -> Result<()> {
        let sql = SchemaBuilder::new(self.dialect()).drop_table_if_exists(table);
        self.executor.execute(&sql).await
    }
}
