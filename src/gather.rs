use std::ffi::OsStr;
use std::path::Path;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{DatasetRecord, Row, TranslationTriple};
use crate::error::{HarvestError, RowError};
use crate::metadata::MetadataSource;
use crate::queue::{HarvestJob, Queue};
use crate::record::DatasetRecordBuilder;
use crate::resources::ResourceLister;
use crate::s3::ObjectStore;
use crate::stage::Stage;
use crate::translation::{AlignedSheet, TranslationDeriver};

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    pub row: usize,
    pub natural_key: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatherReport {
    pub job_id: String,
    pub object_ids: Vec<String>,
    pub skipped: Vec<SkippedRow>,
    pub unstable: usize,
}

/// Reads the workbook, builds one record per base row and enqueues it.
pub struct GatherStage<'a, M: MetadataSource, S: ObjectStore> {
    config: &'a ResolvedConfig,
    source: &'a M,
    store: &'a S,
    queue: &'a Queue,
    workbook: Option<&'a Path>,
}

impl<'a, M: MetadataSource, S: ObjectStore> GatherStage<'a, M, S> {
    pub fn new(config: &'a ResolvedConfig, source: &'a M, store: &'a S, queue: &'a Queue) -> Self {
        Self {
            config,
            source,
            store,
            queue,
            workbook: None,
        }
    }

    /// Read this local workbook instead of downloading `metadata_file`.
    pub fn with_workbook(mut self, workbook: Option<&'a Path>) -> Self {
        self.workbook = workbook;
        self
    }

    /// One row list per configured language, in language order.
    pub fn read_sheets(&self) -> Result<Vec<Vec<Row>>, HarvestError> {
        if let Some(path) = self.workbook {
            return self.read_all(path);
        }

        let dir = tempfile::tempdir().map_err(|err| {
            HarvestError::SourceUnavailable(format!("create temp dir: {err}"))
        })?;
        let file_name = Path::new(&self.config.metadata_file)
            .file_name()
            .unwrap_or_else(|| OsStr::new("metadata.xlsx"));
        let destination = dir.path().join(file_name);
        tracing::info!(key = %self.config.metadata_file, "downloading metadata workbook");
        self.store
            .download(&self.config.metadata_file, &destination)
            .map_err(|err| {
                HarvestError::SourceUnavailable(format!(
                    "download {}: {err}",
                    self.config.metadata_file
                ))
            })?;
        self.read_all(&destination)
    }

    fn read_all(&self, path: &Path) -> Result<Vec<Vec<Row>>, HarvestError> {
        self.config
            .languages
            .iter()
            .enumerate()
            .map(|(index, lang)| {
                let rows = self.source.rows(index, path).map_err(|err| match err {
                    HarvestError::SourceUnavailable(_) => err,
                    other => HarvestError::SourceUnavailable(other.to_string()),
                })?;
                tracing::debug!(%lang, rows = rows.len(), "read sheet");
                Ok(rows)
            })
            .collect()
    }

    fn build_record(
        &self,
        position: usize,
        base: &Row,
        sheets: &[AlignedSheet<'_>],
        deriver: &TranslationDeriver<'_>,
        organization: &[TranslationTriple],
    ) -> Result<DatasetRecord, RowError> {
        let resources = match base.natural_key() {
            Some(key) => {
                ResourceLister::new(self.store, &self.config.department_prefix, &self.config.base_url)
                    .list(key)?
            }
            None => {
                tracing::warn!(row = base.index(), "row has no id; resources not listed");
                Vec::new()
            }
        };

        let mut translations = Vec::new();
        for sheet in sheets {
            let other = sheet.counterpart(position, base)?;
            translations.extend(deriver.derive(
                std::slice::from_ref(base),
                std::slice::from_ref(other),
                sheet.lang(),
            )?);
        }
        translations.extend_from_slice(organization);

        DatasetRecordBuilder::build(base, resources, translations)
    }
}

impl<M: MetadataSource, S: ObjectStore> Stage for GatherStage<'_, M, S> {
    type Input = HarvestJob;
    type Output = GatherReport;

    fn name(&self) -> &'static str {
        "gather"
    }

    fn run(&self, job: HarvestJob) -> Result<GatherReport, HarvestError> {
        let sheets = self.read_sheets()?;
        let Some((base_rows, other_rows)) = sheets.split_first() else {
            return Err(HarvestError::SourceUnavailable("workbook has no sheets".to_string()));
        };

        let aligned = self.config.languages[1..]
            .iter()
            .zip(other_rows)
            .map(|(lang, rows)| AlignedSheet::new(lang.clone(), rows, self.config.alignment))
            .collect::<Vec<_>>();
        let deriver =
            TranslationDeriver::new(self.config.base_language(), &self.config.organization);
        let organization = deriver.organization_triples(&self.config.languages);

        let mut report = GatherReport {
            job_id: job.id.clone(),
            object_ids: Vec::new(),
            skipped: Vec::new(),
            unstable: 0,
        };

        for (position, base) in base_rows.iter().enumerate() {
            let record =
                match self.build_record(position, base, &aligned, &deriver, &organization) {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::warn!(row = base.index(), error = %err, "skipping row");
                        report.skipped.push(SkippedRow {
                            row: base.index(),
                            natural_key: base.natural_key().map(str::to_string),
                            reason: err.to_string(),
                        });
                        continue;
                    }
                };

            if !record.is_stable() {
                tracing::warn!(row = base.index(), id = %record.id, "unstable dataset id");
                report.unstable += 1;
            }

            let content = serde_json::to_string(&record).map_err(|err| {
                HarvestError::InvalidObject {
                    id: record.id.to_string(),
                    message: err.to_string(),
                }
            })?;
            let object = self
                .queue
                .enqueue(&job, &record.id.to_string(), position, content)?;
            report.object_ids.push(object.id);
        }

        tracing::info!(
            job = %job.id,
            enqueued = report.object_ids.len(),
            skipped = report.skipped.len(),
            unstable = report.unstable,
            "gather finished"
        );
        Ok(report)
    }
}
