// ---------------------------------------------------------------------------
// save_jobs – disk work on the IoTaskPool
// ---------------------------------------------------------------------------
//
// Jobs only see byte buffers and plain data: encoding happens on the main
// thread before a save job starts, and a load job hands back a decoded bundle
// that the main thread applies. There is no cancellation; a started job runs
// to completion and is collected by `poll`.

use std::path::PathBuf;

use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task};
use futures_lite::future::{block_on, poll_once};

use crate::bundle_io::{read_bundle, write_bundle_files, EncodedBundle, SaveBundle};
use crate::records::SceneName;
use crate::save_config::SaveConfig;
use crate::save_error::SaveError;
use crate::save_metadata::{write_metadata_file, MetadataFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Save { name: String, autosave: bool },
    Load { name: String },
}

impl JobKind {
    pub fn name(&self) -> &str {
        match self {
            JobKind::Save { name, .. } | JobKind::Load { name } => name,
        }
    }
}

#[derive(Debug)]
pub enum JobOutput {
    /// Bundle and metadata are on disk.
    Saved(MetadataFile),
    /// `None` when no bundle exists under that name.
    Loaded(Option<SaveBundle>),
}

#[derive(Debug)]
pub struct JobResult {
    pub kind: JobKind,
    pub result: Result<JobOutput, SaveError>,
}

struct RunningJob {
    kind: JobKind,
    task: Task<Result<JobOutput, SaveError>>,
}

#[derive(Resource, Default)]
pub struct SaveJobs {
    running: Vec<RunningJob>,
}

impl SaveJobs {
    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    pub fn is_saving(&self) -> bool {
        self.running
            .iter()
            .any(|j| matches!(j.kind, JobKind::Save { .. }))
    }

    pub fn is_loading(&self) -> bool {
        self.running
            .iter()
            .any(|j| matches!(j.kind, JobKind::Load { .. }))
    }

    /// Write an already encoded bundle plus its metadata file.
    pub fn spawn_save(
        &mut self,
        name: &str,
        autosave: bool,
        config: &SaveConfig,
        encoded: EncodedBundle,
        metadata: MetadataFile,
    ) {
        let dir = config.bundle_dir(name);
        let metadata_path = config.metadata_path(name);
        let atomic = config.atomic_writes;
        let task = IoTaskPool::get().spawn(async move {
            write_bundle_files(&dir, &encoded, atomic)?;
            write_metadata_file(&metadata_path, &metadata, atomic)?;
            Ok(JobOutput::Saved(metadata))
        });
        self.running.push(RunningJob {
            kind: JobKind::Save {
                name: name.to_string(),
                autosave,
            },
            task,
        });
    }

    /// Read and decode a bundle.
    pub fn spawn_load(&mut self, name: &str, config: &SaveConfig, tracked_scenes: Vec<SceneName>) {
        let dir: PathBuf = config.bundle_dir(name);
        let version = config.version.clone();
        let task = IoTaskPool::get().spawn(async move {
            read_bundle(&dir, &tracked_scenes, &version).map(JobOutput::Loaded)
        });
        self.running.push(RunningJob {
            kind: JobKind::Load {
                name: name.to_string(),
            },
            task,
        });
    }

    /// Collect finished jobs, in the order they were started.
    pub fn poll(&mut self) -> Vec<JobResult> {
        let mut finished = Vec::new();
        self.running.retain_mut(|job| match block_on(poll_once(&mut job.task)) {
            Some(result) => {
                finished.push(JobResult {
                    kind: job.kind.clone(),
                    result,
                });
                false
            }
            None => true,
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle_io::encode_bundle;
    use crate::save_metadata::SaveMetadata;
    use bevy::tasks::TaskPool;
    use std::fs;
    use std::time::{Duration, Instant};

    fn wait(jobs: &mut SaveJobs) -> Vec<JobResult> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut done = Vec::new();
        while !jobs.is_empty() && Instant::now() < deadline {
            done.extend(jobs.poll());
            std::thread::sleep(Duration::from_millis(5));
        }
        done
    }

    #[test]
    fn test_save_then_load_through_pool() {
        IoTaskPool::get_or_init(TaskPool::new);
        let root = std::env::temp_dir().join("scene_save_jobs_test_roundtrip");
        let _ = fs::remove_dir_all(&root);
        let config = SaveConfig::with_root(&root);

        let encoded = encode_bundle(&SaveBundle::default(), &config.version, true).unwrap();
        let metadata = MetadataFile {
            metadata: SaveMetadata::new("Save_job", "Job", "Harbor", &config.version),
            screenshot_png: Vec::new(),
        };
        let mut jobs = SaveJobs::default();
        jobs.spawn_save("Save_job", false, &config, encoded, metadata);
        assert!(jobs.is_saving());

        let done = wait(&mut jobs);
        assert_eq!(done.len(), 1);
        assert!(matches!(done[0].result, Ok(JobOutput::Saved(_))));
        assert!(config.metadata_path("Save_job").is_file());

        jobs.spawn_load("Save_job", &config, Vec::new());
        assert!(jobs.is_loading());
        let done = wait(&mut jobs);
        match &done[0].result {
            Ok(JobOutput::Loaded(Some(bundle))) => assert_eq!(bundle.record_count(), 0),
            other => panic!("unexpected job result: {other:?}"),
        }

        jobs.spawn_load("Save_missing", &config, Vec::new());
        let done = wait(&mut jobs);
        assert_eq!(done[0].kind.name(), "Save_missing");
        assert!(matches!(done[0].result, Ok(JobOutput::Loaded(None))));
        let _ = fs::remove_dir_all(&root);
    }
}
