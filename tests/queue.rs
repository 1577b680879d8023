use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::TempDir;

use sfa_harvester::error::HarvestError;
use sfa_harvester::queue::{JobStatus, ObjectState, Queue};

fn queue(dir: &TempDir) -> Queue {
    Queue::new(Utf8PathBuf::from_path_buf(dir.path().join("queue")).unwrap())
}

#[test]
fn jobs_round_trip_through_files() {
    let dir = TempDir::new().unwrap();
    let queue = queue(&dir);

    let mut job = queue.create_job("sfa").unwrap();
    assert_eq!(job.status, JobStatus::New);
    assert!(queue.job_path(&job.id).as_std_path().exists());

    job.status = JobStatus::Gathered;
    queue.save_job(&job).unwrap();
    let loaded = queue.load_job(&job.id).unwrap();
    assert_eq!(loaded.status, JobStatus::Gathered);
    assert_eq!(loaded.source, "sfa");
    assert_eq!(queue.list_jobs().unwrap().len(), 1);
}

#[test]
fn unknown_job_is_reported() {
    let dir = TempDir::new().unwrap();
    assert_matches!(
        queue(&dir).load_job("nope"),
        Err(HarvestError::JobNotFound(id)) if id == "nope"
    );
}

#[test]
fn objects_come_back_in_gather_order() {
    let dir = TempDir::new().unwrap();
    let queue = queue(&dir);
    let job = queue.create_job("sfa").unwrap();

    for (sequence, guid) in ["g2", "g0", "g1"].iter().enumerate().rev() {
        queue
            .enqueue(&job, guid, sequence, format!("{{\"n\":{sequence}}}"))
            .unwrap();
    }

    let objects = queue.objects(&job.id).unwrap();
    let guids = objects
        .iter()
        .map(|object| object.guid.as_str())
        .collect::<Vec<_>>();
    assert_eq!(guids, vec!["g2", "g0", "g1"]);
    assert!(objects.iter().all(|object| object.state == ObjectState::Gathered));
}

#[test]
fn failed_object_keeps_its_errors() {
    let dir = TempDir::new().unwrap();
    let queue = queue(&dir);
    let job = queue.create_job("sfa").unwrap();
    let mut object = queue.enqueue(&job, "g", 0, "{}".to_string()).unwrap();

    object.fail("catalog returned status 500");
    queue.save_object(&object).unwrap();

    let stored = &queue.objects(&job.id).unwrap()[0];
    assert_eq!(stored.state, ObjectState::Error);
    assert_eq!(stored.errors, vec!["catalog returned status 500"]);
}

#[test]
fn jobs_of_other_runs_do_not_share_objects() {
    let dir = TempDir::new().unwrap();
    let queue = queue(&dir);
    let first = queue.create_job("sfa").unwrap();
    let second = queue.create_job("sfa").unwrap();
    queue.enqueue(&first, "g", 0, "{}".to_string()).unwrap();

    assert_eq!(queue.objects(&first.id).unwrap().len(), 1);
    assert!(queue.objects(&second.id).unwrap().is_empty());
}
