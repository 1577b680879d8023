use std::path::Path;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::ResolvedConfig;
use crate::error::HarvestError;
use crate::gather::{GatherReport, GatherStage};
use crate::import::{ImportOutcome, ImportStage};
use crate::metadata::MetadataSource;
use crate::queue::{HarvestJob, JobStatus, ObjectState, Queue};
use crate::s3::ObjectStore;
use crate::stage::{FetchStage, run_stage};

pub const HARVESTER_NAME: &str = "sfa";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HarvesterInfo {
    pub name: String,
    pub title: String,
    pub description: String,
}

pub fn info() -> HarvesterInfo {
    HarvesterInfo {
        name: HARVESTER_NAME.to_string(),
        title: "SFA".to_string(),
        description: "Harvests the SFA data".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub job_id: String,
    pub fetched: usize,
    pub failed: Vec<FailedObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub job_id: String,
    pub imported: Vec<ImportOutcome>,
    pub failed: Vec<FailedObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedObject {
    pub object_id: String,
    pub guid: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub job: HarvestJob,
    pub gather: GatherReport,
    pub fetch: FetchReport,
    pub import: ImportReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsReport {
    pub jobs: Vec<HarvestJob>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<M: MetadataSource, S: ObjectStore, C: Catalog> {
    config: ResolvedConfig,
    queue: Queue,
    source: M,
    store: S,
    catalog: C,
}

impl<M: MetadataSource, S: ObjectStore, C: Catalog> App<M, S, C> {
    pub fn new(
        config: ResolvedConfig,
        source: M,
        store: S,
        catalog: C,
    ) -> Result<Self, HarvestError> {
        let root = Utf8PathBuf::from_path_buf(config.queue_dir.clone()).map_err(|path| {
            HarvestError::InvalidConfig(format!("queue_dir is not UTF-8: {}", path.display()))
        })?;
        Ok(Self {
            config,
            queue: Queue::new(root),
            source,
            store,
            catalog,
        })
    }

    pub fn info(&self) -> HarvesterInfo {
        info()
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn create_job(&self) -> Result<HarvestJob, HarvestError> {
        let job = self.queue.create_job(HARVESTER_NAME)?;
        tracing::info!(job = %job.id, "created harvest job");
        Ok(job)
    }

    pub fn jobs(&self) -> Result<JobsReport, HarvestError> {
        Ok(JobsReport {
            jobs: self.queue.list_jobs()?,
        })
    }

    /// Runs the gather stage for `job_id`. A fatal gather error marks the job failed.
    pub fn gather(
        &self,
        job_id: &str,
        workbook: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> Result<GatherReport, HarvestError> {
        let mut job = self.queue.load_job(job_id)?;
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("gather: job {job_id}"),
            elapsed: None,
        });

        let stage = GatherStage::new(&self.config, &self.source, &self.store, &self.queue)
            .with_workbook(workbook);
        let result = run_stage(&stage, job.clone());
        match &result {
            Ok(report) => {
                job.status = JobStatus::Gathered;
                sink.event(ProgressEvent {
                    message: format!(
                        "gather: {} enqueued, {} skipped",
                        report.object_ids.len(),
                        report.skipped.len()
                    ),
                    elapsed: Some(start.elapsed()),
                });
            }
            Err(err) => {
                tracing::error!(job = %job_id, error = %err, "gather failed");
                job.status = JobStatus::Failed;
                job.gather_errors.push(err.to_string());
                job.finished_at = Some(Utc::now());
            }
        }
        self.queue.save_job(&job)?;
        result
    }

    /// Fetches the gathered objects of `job_id`. A job whose gather failed is refused.
    pub fn fetch(&self, job_id: &str, sink: &dyn ProgressSink) -> Result<FetchReport, HarvestError> {
        self.load_open_job(job_id)?;
        let start = Instant::now();
        let mut report = FetchReport {
            job_id: job_id.to_string(),
            fetched: 0,
            failed: Vec::new(),
        };

        let pending = self
            .queue
            .objects(job_id)?
            .into_iter()
            .filter(|object| object.state == ObjectState::Gathered);
        for object in pending {
            let mut fallback = object.clone();
            match run_stage(&FetchStage, object) {
                Ok(fetched) => {
                    self.queue.save_object(&fetched)?;
                    report.fetched += 1;
                }
                Err(err) => {
                    fallback.fail(err.to_string());
                    self.queue.save_object(&fallback)?;
                    report.failed.push(FailedObject {
                        object_id: fallback.id,
                        guid: fallback.guid,
                        message: err.to_string(),
                    });
                }
            }
        }

        sink.event(ProgressEvent {
            message: format!("fetch: {} fetched, {} failed", report.fetched, report.failed.len()),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    /// Imports every fetched object of the job. One failing object never stops the others.
    pub fn import(&self, job_id: &str, sink: &dyn ProgressSink) -> Result<ImportReport, HarvestError> {
        let mut job = self.load_open_job(job_id)?;
        let start = Instant::now();
        let stage = ImportStage::new(&self.config, &self.catalog);
        let mut report = ImportReport {
            job_id: job_id.to_string(),
            imported: Vec::new(),
            failed: Vec::new(),
        };

        let pending = self
            .queue
            .objects(job_id)?
            .into_iter()
            .filter(|object| object.state == ObjectState::Fetched);
        for mut object in pending {
            match run_stage(&stage, object.clone()) {
                Ok(outcome) => {
                    object.advance(ObjectState::Imported);
                    self.queue.save_object(&object)?;
                    sink.event(ProgressEvent {
                        message: format!("import: {} ({})", outcome.name, outcome.guid),
                        elapsed: None,
                    });
                    report.imported.push(outcome);
                }
                Err(err) => {
                    object.fail(err.to_string());
                    self.queue.save_object(&object)?;
                    report.failed.push(FailedObject {
                        object_id: object.id,
                        guid: object.guid,
                        message: err.to_string(),
                    });
                }
            }
        }

        job.status = JobStatus::Finished;
        job.finished_at = Some(Utc::now());
        self.queue.save_job(&job)?;

        tracing::info!(
            job = %job_id,
            imported = report.imported.len(),
            failed = report.failed.len(),
            "import finished"
        );
        sink.event(ProgressEvent {
            message: format!(
                "import: {} imported, {} failed",
                report.imported.len(),
                report.failed.len()
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(report)
    }

    /// Objects enqueued before a gather failure stay `Gathered`, so the job status gates them.
    fn load_open_job(&self, job_id: &str) -> Result<HarvestJob, HarvestError> {
        let job = self.queue.load_job(job_id)?;
        if job.status == JobStatus::Failed {
            return Err(HarvestError::JobFailed(job_id.to_string()));
        }
        Ok(job)
    }

    /// Creates a job and runs gather, fetch and import on it.
    pub fn run(
        &self,
        workbook: Option<&Path>,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, HarvestError> {
        let job = self.create_job()?;
        let gather = self.gather(&job.id, workbook, sink)?;
        let fetch = self.fetch(&job.id, sink)?;
        let import = self.import(&job.id, sink)?;
        Ok(RunReport {
            job: self.queue.load_job(&job.id)?,
            gather,
            fetch,
            import,
        })
    }
}
