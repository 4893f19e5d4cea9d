//! Run catalog: the fixed list of tables a single `load` invocation
//! processes, and the per-table transaction loop that drives extraction and
//! staging for each one.

use std::path::Path;

use crate::config::RunConfig;
use crate::db::DbConn;
use crate::errors::Result;
use crate::extract::Extractor;
use crate::staging::{ColumnSpec, TableStager};

/// One entry from the run's YAML `tables` list: where a table's data comes
/// from, before any load attempt has been made.
#[derive(Debug, Clone)]
pub struct TableOrigin {
    pub table_name: String,
    pub module_name: String,
    pub source_path: String,
}

/// The load unit threaded through pass 1, pass 2, and publish. Enters the
/// core with no columns; pass 1 populates them.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table_name: String,
    pub module_name: String,
    pub source_path: String,
    pub skip: bool,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn from_origin(origin: &TableOrigin) -> Self {
        Self {
            table_name: origin.table_name.clone(),
            module_name: origin.module_name.clone(),
            source_path: origin.source_path.clone(),
            skip: false,
            columns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Loaded,
    Skipped,
    Failed(String),
}

#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<(String, TableOutcome)>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TableOutcome::Failed(_)))
            .count()
    }
}

/// Run-scoped knobs that don't belong on `RunConfig` itself because they
/// come from CLI flags, not the YAML file.
pub struct RunOptions<'a> {
    pub staging_dir: &'a Path,
    pub roles: &'a [String],
    pub include_test_file: bool,
    pub extract: bool,
}

/// Drive the fixed catalog: for each configured table, extract (unless
/// `options.extract` is false, i.e. `--sourcedir` mode), then stage inside
/// its own transaction. A table that fails extraction or staging is logged
/// and skipped; the run continues with the remaining tables.
pub async fn run_catalog(
    config: &RunConfig,
    db: &mut DbConn,
    options: &RunOptions<'_>,
    extractor: Option<&Extractor>,
) -> Result<RunSummary> {
    let mut outcomes = Vec::with_capacity(config.tables.len());

    for entry in &config.tables {
        let origin = TableOrigin {
            table_name: entry.table_name.clone(),
            module_name: entry.module_name.clone(),
            source_path: entry.source_path.clone(),
        };
        let mut spec = TableSpec::from_origin(&origin);

        if options.extract {
            if let Some(extractor) = extractor {
                if let Err(e) = extractor
                    .extract_table(&spec.table_name, &spec.source_path, options.staging_dir)
                    .await
                {
                    tracing::error!(table = %spec.table_name, error = %e, "extraction failed, skipping table");
                    outcomes.push((spec.table_name.clone(), TableOutcome::Failed(e.to_string())));
                    continue;
                }
            }
        }

        db.begin_table().await?;
        let stager = TableStager::new(options.staging_dir, options.roles, options.include_test_file);
        match stager.stage(&mut spec, db).await {
            Ok(()) => {
                db.commit_table().await?;
                tracing::info!(table = %spec.table_name, columns = spec.columns.len(), "table loaded");
                outcomes.push((spec.table_name.clone(), TableOutcome::Loaded));
            }
            Err(e) => {
                tracing::error!(table = %spec.table_name, error = %e, "table load failed, rolling back");
                db.rollback_table().await?;
                outcomes.push((spec.table_name.clone(), TableOutcome::Failed(e.to_string())));
            }
        }
    }

    Ok(RunSummary { outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_spec_starts_with_no_columns() {
        let origin = TableOrigin {
            table_name: "employees".into(),
            module_name: "mod-hr".into(),
            source_path: "/hr/employees".into(),
        };
        let spec = TableSpec::from_origin(&origin);
        assert!(spec.columns.is_empty());
        assert!(!spec.skip);
    }

    #[test]
    fn run_summary_counts_failures() {
        let summary = RunSummary {
            outcomes: vec![
                ("a".into(), TableOutcome::Loaded),
                ("b".into(), TableOutcome::Failed("boom".into())),
            ],
        };
        assert_eq!(summary.failures(), 1);
    }
}
