use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    New,
    Gathered,
    Failed,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestJob {
    pub id: String,
    pub source: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub gather_errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    Gathered,
    Fetched,
    Imported,
    Error,
}

/// One persisted harvest unit. `content` is the serialized dataset record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestObject {
    pub id: String,
    pub guid: String,
    pub job_id: String,
    pub sequence: usize,
    pub content: String,
    pub state: ObjectState,
    #[serde(default)]
    pub errors: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl HarvestObject {
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = ObjectState::Error;
        self.errors.push(message.into());
        self.updated_at = Utc::now();
    }

    pub fn advance(&mut self, state: ObjectState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

/// Job and object files under a single root directory.
#[derive(Debug, Clone)]
pub struct Queue {
    root: Utf8PathBuf,
}

impl Queue {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn job_path(&self, job_id: &str) -> Utf8PathBuf {
        self.root.join("jobs").join(format!("{job_id}.json"))
    }

    pub fn objects_dir(&self, job_id: &str) -> Utf8PathBuf {
        self.root.join("objects").join(job_id)
    }

    pub fn object_path(&self, job_id: &str, object_id: &str) -> Utf8PathBuf {
        self.objects_dir(job_id).join(format!("{object_id}.json"))
    }

    pub fn create_job(&self, source: &str) -> Result<HarvestJob, HarvestError> {
        let job = HarvestJob {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            status: JobStatus::New,
            created_at: Utc::now(),
            finished_at: None,
            gather_errors: Vec::new(),
        };
        self.save_job(&job)?;
        Ok(job)
    }

    pub fn save_job(&self, job: &HarvestJob) -> Result<(), HarvestError> {
        write_json_atomic(&self.job_path(&job.id), job)
    }

    pub fn load_job(&self, job_id: &str) -> Result<HarvestJob, HarvestError> {
        let path = self.job_path(job_id);
        if !path.as_std_path().exists() {
            return Err(HarvestError::JobNotFound(job_id.to_string()));
        }
        read_json(&path)
    }

    pub fn list_jobs(&self) -> Result<Vec<HarvestJob>, HarvestError> {
        let mut jobs = read_json_dir::<HarvestJob>(&self.root.join("jobs"))?;
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    pub fn enqueue(
        &self,
        job: &HarvestJob,
        guid: &str,
        sequence: usize,
        content: String,
    ) -> Result<HarvestObject, HarvestError> {
        let object = HarvestObject {
            id: Uuid::new_v4().to_string(),
            guid: guid.to_string(),
            job_id: job.id.clone(),
            sequence,
            content,
            state: ObjectState::Gathered,
            errors: Vec::new(),
            updated_at: Utc::now(),
        };
        self.save_object(&object)?;
        Ok(object)
    }

    pub fn save_object(&self, object: &HarvestObject) -> Result<(), HarvestError> {
        write_json_atomic(&self.object_path(&object.job_id, &object.id), object)
    }

    /// Objects of a job in gather order.
    pub fn objects(&self, job_id: &str) -> Result<Vec<HarvestObject>, HarvestError> {
        let mut objects = read_json_dir::<HarvestObject>(&self.objects_dir(job_id))?;
        objects.sort_by_key(|object| object.sequence);
        Ok(objects)
    }
}

fn write_json_atomic<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), HarvestError> {
    let parent = path
        .parent()
        .ok_or_else(|| HarvestError::Filesystem(format!("invalid queue path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".sfa-queue")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.write_all(&content)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<T, HarvestError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("read {path}: {err}")))?;
    serde_json::from_str(&content)
        .map_err(|err| HarvestError::Filesystem(format!("parse {path}: {err}")))
}

fn read_json_dir<T: DeserializeOwned>(dir: &Utf8Path) -> Result<Vec<T>, HarvestError> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|_| HarvestError::Filesystem("non-utf8 path in queue".to_string()))?;
        if path.is_file() && path.extension() == Some("json") {
            items.push(read_json(&path)?);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let queue = Queue::new(Utf8PathBuf::from(".sfa-harvest"));
        assert!(queue.job_path("j1").ends_with("jobs/j1.json"));
        assert!(queue.object_path("j1", "o1").ends_with("objects/j1/o1.json"));
    }
}
