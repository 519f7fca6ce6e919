use crate::config::{OutputFormat, OutputNames};
use crate::error::{ProcessingError, Result};
use crate::types::{PipelineResult, RowIssue, RunReport};
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scratch directory, inside the output directory, a run is written to
/// before its files are moved into place.
const STAGING_DIR: &str = ".staging";

/// Persists derived tables, the rejected-row list and the run report.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    output_dir: PathBuf,
    format: OutputFormat,
    names: OutputNames,
}

impl ReportGenerator {
    pub fn new(output_dir: PathBuf, format: OutputFormat, names: OutputNames) -> Self {
        Self {
            output_dir,
            format,
            names,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every output of a run.
    ///
    /// Files are written to a staging directory inside the output directory
    /// and moved into place only once all of them succeeded. Returns the
    /// written file names and fills `result.report.outputs` with them.
    pub fn write_all(&self, result: &mut PipelineResult) -> Result<Vec<String>> {
        let staging = self.output_dir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let stage = Self {
            output_dir: staging.clone(),
            ..self.clone()
        };
        let outcome = stage
            .write_files(result)
            .and_then(|written| {
                self.publish(&staging, &written)?;
                Ok(written)
            });

        // The staging directory is scratch space whatever the outcome.
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!("Could not remove {}: {}", staging.display(), e);
        }

        let written = outcome?;
        info!(
            "Wrote {} files to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    fn write_files(&self, result: &mut PipelineResult) -> Result<Vec<String>> {
        let mut written = vec![
            self.write_table(&mut result.unified, &self.names.clean)?,
            self.write_table(&mut result.brand_enriched, &self.names.brand)?,
            self.write_table(&mut result.age_normalized, &self.names.processed)?,
            self.write_table(&mut result.exploded, &self.names.exploded)?,
            self.write_rejected_rows(&result.rejected_rows)?,
        ];
        if !result.symptom_counts.is_empty() {
            written.push(self.write_term_counts(&result.symptom_counts)?);
        }

        let report_name = self.report_file_name();
        written.push(report_name.clone());
        result.report.outputs = written.clone();
        self.write_run_report(&result.report, &report_name)?;
        Ok(written)
    }

    /// Replace the previous run's outputs with the staged ones.
    ///
    /// The old run report is removed first and the new one moved last, so
    /// the directory never holds a run report next to a mixed set of tables.
    fn publish(&self, staging: &Path, written: &[String]) -> Result<()> {
        let report_name = self.report_file_name();
        remove_if_present(&self.output_dir.join(&report_name))?;
        for name in self.known_outputs() {
            remove_if_present(&self.output_dir.join(name))?;
        }

        for name in written {
            fs::rename(staging.join(name), self.output_dir.join(name))?;
        }
        Ok(())
    }

    /// Every file name a run can write, in either table format.
    fn known_outputs(&self) -> Vec<String> {
        let tables = [
            &self.names.clean,
            &self.names.brand,
            &self.names.processed,
            &self.names.exploded,
        ];
        let mut names: Vec<String> = tables
            .iter()
            .flat_map(|base| {
                [OutputFormat::Csv, OutputFormat::Parquet]
                    .map(|format| format!("{}.{}", base, format.extension()))
            })
            .collect();
        names.push(format!("{}.csv", self.names.rejected));
        names.push(format!("{}.csv", self.names.symptom_counts));
        names.push(self.report_file_name());
        names
    }

    fn report_file_name(&self) -> String {
        format!("{}.json", self.names.report)
    }

    /// Write one table in the configured format. Returns the file name.
    pub fn write_table(&self, df: &mut DataFrame, base_name: &str) -> Result<String> {
        let file_name = format!("{}.{}", base_name, self.format.extension());
        let path = self.output_dir.join(&file_name);

        match self.format {
            OutputFormat::Csv => write_csv(df, &path)?,
            OutputFormat::Parquet => {
                let file = File::create(&path)?;
                ParquetWriter::new(file)
                    .finish(df)
                    .map_err(|e| write_failed(&path, e))?;
            }
        }

        debug!("Saved {} rows to {}", df.height(), path.display());
        Ok(file_name)
    }

    /// Write the per-row issues as CSV, header included even when empty.
    pub fn write_rejected_rows(&self, issues: &[RowIssue]) -> Result<String> {
        let mut df = issues_frame(issues)?;
        let file_name = format!("{}.csv", self.names.rejected);
        write_csv(&mut df, &self.output_dir.join(&file_name))?;
        Ok(file_name)
    }

    /// Write `(term, count)` pairs as CSV.
    pub fn write_term_counts(&self, counts: &[(String, usize)]) -> Result<String> {
        let terms: Vec<&str> = counts.iter().map(|(t, _)| t.as_str()).collect();
        let values: Vec<u64> = counts.iter().map(|(_, c)| *c as u64).collect();
        let mut df = df!["term" => terms, "count" => values]?;

        let file_name = format!("{}.csv", self.names.symptom_counts);
        write_csv(&mut df, &self.output_dir.join(&file_name))?;
        Ok(file_name)
    }

    /// Write the run report as pretty JSON.
    pub fn write_run_report(&self, report: &RunReport, file_name: &str) -> Result<()> {
        let path = self.output_dir.join(file_name);
        let mut file = File::create(&path)?;
        let json = serde_json::to_string_pretty(report)?;
        writeln!(file, "{}", json)?;
        debug!("Run report saved: {}", path.display());
        Ok(())
    }
}

/// Build a table from per-row issues.
pub fn issues_frame(issues: &[RowIssue]) -> Result<DataFrame> {
    let report_ids: Vec<Option<&str>> = issues.iter().map(|i| i.report_id.as_deref()).collect();
    let rows: Vec<u64> = issues.iter().map(|i| i.row as u64).collect();
    let source_files: Vec<Option<&str>> =
        issues.iter().map(|i| i.source_file.as_deref()).collect();
    let source_rows: Vec<Option<u64>> =
        issues.iter().map(|i| i.source_row.map(|r| r as u64)).collect();
    let columns: Vec<&str> = issues.iter().map(|i| i.column.as_str()).collect();
    let kinds: Vec<&str> = issues.iter().map(|i| i.kind.as_str()).collect();
    let raw_values: Vec<Option<&str>> = issues.iter().map(|i| i.raw_value.as_deref()).collect();
    let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();

    Ok(df![
        "report_id" => report_ids,
        "row" => rows,
        "source_file" => source_files,
        "source_row" => source_rows,
        "column" => columns,
        "kind" => kinds,
        "raw_value" => raw_values,
        "message" => messages,
    ]?)
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .with_quote_char(b'"')
        .finish(df)
        .map_err(|e| write_failed(path, e))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProcessingError::WriteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn write_failed(path: &Path, error: PolarsError) -> ProcessingError {
    ProcessingError::WriteFailed {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RowIssueKind, TableShape};

    fn small_result(symptom_counts: Vec<(String, usize)>) -> PipelineResult {
        let table = df!["report_id" => ["1"], "outcomes" => ["Death"]].unwrap();
        PipelineResult {
            unified: table.clone(),
            brand_enriched: table.clone(),
            age_normalized: table.clone(),
            exploded: table.clone(),
            rejected_rows: Vec::new(),
            symptom_counts,
            report: RunReport {
                exploded: TableShape::of(&table),
                ..RunReport::default()
            },
        }
    }

    fn generator(dir: &Path, format: OutputFormat) -> ReportGenerator {
        ReportGenerator::new(dir.to_path_buf(), format, OutputNames::default())
    }

    #[test]
    fn test_write_table_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = df!["report_id" => ["1", "2"], "brand" => ["KIND", "QUORN"]].unwrap();

        let name = generator(dir.path(), OutputFormat::Csv)
            .write_table(&mut df, "brand_data")
            .unwrap();

        assert_eq!(name, "brand_data.csv");
        let content = fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(content, "report_id,brand\n1,KIND\n2,QUORN\n");
    }

    #[test]
    fn test_write_table_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let mut df = df!["report_id" => ["1"]].unwrap();

        let name = generator(dir.path(), OutputFormat::Parquet)
            .write_table(&mut df, "clean_data")
            .unwrap();

        assert_eq!(name, "clean_data.parquet");
        assert!(dir.path().join(name).metadata().unwrap().len() > 0);
    }

    #[test]
    fn test_write_rejected_rows() {
        let dir = tempfile::tempdir().unwrap();
        let issues = vec![
            RowIssue::new(
                Some("77".to_string()),
                4,
                "age_units",
                RowIssueKind::UnknownAgeUnit,
                Some("hour(s)".to_string()),
                "unknown age unit 'hour(s)'",
            )
            .at_source(Some(("2017.csv".to_string(), 9))),
        ];

        let name = generator(dir.path(), OutputFormat::Csv)
            .write_rejected_rows(&issues)
            .unwrap();

        let content = fs::read_to_string(dir.path().join(name)).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("report_id,row,source_file,source_row,column,kind,raw_value,message")
        );
        assert_eq!(
            lines.next(),
            Some("77,4,2017.csv,9,age_units,unknown_age_unit,hour(s),unknown age unit 'hour(s)'")
        );
    }

    #[test]
    fn test_write_rejected_rows_empty() {
        let dir = tempfile::tempdir().unwrap();
        let name = generator(dir.path(), OutputFormat::Csv)
            .write_rejected_rows(&[])
            .unwrap();
        let content = fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(content.starts_with("report_id,row,source_file,source_row,column,kind"));
    }

    #[test]
    fn test_write_term_counts() {
        let dir = tempfile::tempdir().unwrap();
        let counts = vec![("NAUSEA".to_string(), 3), ("RASH".to_string(), 1)];
        let name = generator(dir.path(), OutputFormat::Csv)
            .write_term_counts(&counts)
            .unwrap();

        let content = fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(content, "term,count\nNAUSEA,3\nRASH,1\n");
    }

    #[test]
    fn test_write_all_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator(dir.path(), OutputFormat::Csv);

        let mut first = small_result(vec![("NAUSEA".to_string(), 1)]);
        generator.write_all(&mut first).unwrap();
        assert!(dir.path().join("symptom_counts.csv").exists());

        let mut second = small_result(Vec::new());
        let written = generator.write_all(&mut second).unwrap();

        assert!(!written.contains(&"symptom_counts.csv".to_string()));
        assert!(!dir.path().join("symptom_counts.csv").exists());
        assert!(!dir.path().join(STAGING_DIR).exists());
        assert_eq!(second.report.outputs, written);
        for name in &written {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
    }

    #[test]
    fn test_failed_publish_leaves_no_run_report() {
        let dir = tempfile::tempdir().unwrap();
        let generator = generator(dir.path(), OutputFormat::Csv);
        generator.write_all(&mut small_result(Vec::new())).unwrap();

        // A directory where a table should go cannot be replaced.
        fs::remove_file(dir.path().join("exploded_data.csv")).unwrap();
        fs::create_dir(dir.path().join("exploded_data.csv")).unwrap();

        let err = generator
            .write_all(&mut small_result(Vec::new()))
            .unwrap_err();

        assert_eq!(err.error_code(), "WRITE_FAILED");
        assert!(!dir.path().join("run_report.json").exists());
        assert!(!dir.path().join(STAGING_DIR).exists());
    }

    #[test]
    fn test_switching_format_removes_old_tables() {
        let dir = tempfile::tempdir().unwrap();
        generator(dir.path(), OutputFormat::Csv)
            .write_all(&mut small_result(Vec::new()))
            .unwrap();
        generator(dir.path(), OutputFormat::Parquet)
            .write_all(&mut small_result(Vec::new()))
            .unwrap();

        assert!(dir.path().join("clean_data.parquet").exists());
        assert!(!dir.path().join("clean_data.csv").exists());
    }
}
