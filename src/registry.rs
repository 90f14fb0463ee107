//! Shared status of every run known to the process.

use crate::pipeline::{ConversionResult, ProgressSink, RunOutcome};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// Eight lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let mut hasher = DefaultHasher::new();
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .hash(&mut hasher);
        COUNTER.fetch_add(1, Ordering::Relaxed).hash(&mut hasher);
        std::process::id().hash(&mut hasher);
        RunId(format!("{:08x}", hasher.finish() as u32))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub id: RunId,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub state: JobState,
    pub progress: f32,
    pub message: String,
    pub frames_processed: u64,
    pub total_frames: u64,
    pub error: Option<String>,
    pub result: Option<ConversionResult>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

impl RunStatus {
    fn new(id: RunId, input: &Path, output_dir: &Path) -> Self {
        Self {
            id,
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            state: JobState::Pending,
            progress: 0.0,
            message: "Queued".to_string(),
            frames_processed: 0,
            total_frames: 0,
            error: None,
            result: None,
            created_at: SystemTime::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Processing time so far, or in total once finished.
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or_else(SystemTime::now);
        Some(end.duration_since(started).unwrap_or_default())
    }

    pub fn mark_processing(&mut self) {
        self.state = JobState::Processing;
        self.message = "Initializing converter".to_string();
        self.started_at = Some(SystemTime::now());
    }

    pub fn record_progress(&mut self, progress: f32, processed: u64, total: u64) {
        self.progress = progress.max(self.progress).min(1.0);
        self.frames_processed = processed;
        self.total_frames = total;
        self.message = format!("Processed {}/{} frames", processed, total);
    }

    pub fn apply_outcome(&mut self, outcome: &RunOutcome, quiet: bool) {
        self.finished_at = Some(SystemTime::now());
        match outcome {
            RunOutcome::Done(result) => {
                self.state = JobState::Completed;
                self.progress = 1.0;
                self.message = if result.warnings.is_empty() {
                    "Conversion completed successfully".to_string()
                } else {
                    format!("Completed with {} warning(s)", result.warnings.len())
                };
                self.result = Some(result.clone());
            }
            RunOutcome::Failed(err) => {
                self.state = JobState::Failed;
                let text = err.user_message(quiet);
                self.message = text.clone();
                self.error = Some(text);
            }
            RunOutcome::Cancelled(result) => {
                self.state = JobState::Cancelled;
                self.message = "Cancelled".to_string();
                self.result = Some(result.clone());
            }
        }
    }

    /// Terminal failure that did not come from the pipeline itself.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.state = JobState::Failed;
        self.message = error.clone();
        self.error = Some(error);
        self.finished_at = Some(SystemTime::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.state = JobState::Cancelled;
        self.message = "Cancelled before start".to_string();
        self.finished_at = Some(SystemTime::now());
    }
}

fn lock(status: &Mutex<RunStatus>) -> MutexGuard<'_, RunStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map lock guards insert and lookup only; each entry carries its own mutex.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<RunId, Arc<Mutex<RunStatus>>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pending run whose artifacts go to `results_dir/<id>`.
    pub fn create(&self, input: &Path, results_dir: &Path) -> RunId {
        let mut runs = self.runs.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let id = RunId::generate();
            if !runs.contains_key(&id) {
                break id;
            }
        };
        let status = RunStatus::new(id.clone(), input, &results_dir.join(id.as_str()));
        runs.insert(id.clone(), Arc::new(Mutex::new(status)));
        id
    }

    pub fn handle(&self, id: &RunId) -> Option<Arc<Mutex<RunStatus>>> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Snapshot of one run.
    pub fn get(&self, id: &RunId) -> Option<RunStatus> {
        self.handle(id).map(|status| lock(&status).clone())
    }

    /// Applies `f` to the run's status. Returns false for unknown ids.
    pub fn update<F: FnOnce(&mut RunStatus)>(&self, id: &RunId, f: F) -> bool {
        match self.handle(id) {
            Some(status) => {
                f(&mut lock(&status));
                true
            }
            None => false,
        }
    }

    /// Snapshots of all runs, oldest first.
    pub fn list(&self) -> Vec<RunStatus> {
        let handles: Vec<_> = self
            .runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut all: Vec<RunStatus> = handles.iter().map(|s| lock(s).clone()).collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        all
    }

    pub fn remove(&self, id: &RunId) -> Option<RunStatus> {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|status| lock(&status).clone())
    }

    pub fn len(&self) -> usize {
        self.runs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.list().iter().filter(|s| !s.state.is_terminal()).count()
    }

    pub fn progress_sink(&self, id: &RunId) -> Option<RegistryProgress> {
        self.handle(id).map(|status| RegistryProgress { status })
    }
}

/// Mirrors pipeline progress into a registry entry.
pub struct RegistryProgress {
    status: Arc<Mutex<RunStatus>>,
}

impl ProgressSink for RegistryProgress {
    fn report(&self, progress: f32, processed: u64, total: u64) {
        lock(&self.status).record_progress(progress, processed, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use std::thread;

    #[test]
    fn ids_are_unique_eight_hex_chars() {
        let registry = RunRegistry::new();
        let ids: Vec<RunId> = (0..200)
            .map(|_| registry.create(Path::new("in.mp4"), Path::new("results")))
            .collect();
        assert_eq!(registry.len(), 200);
        for id in &ids {
            assert_eq!(id.as_str().len(), 8);
            assert!(id.as_str().bytes().all(|b| b.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn run_directory_is_named_after_id() {
        let registry = RunRegistry::new();
        let id = registry.create(Path::new("in.mp4"), Path::new("/srv/results"));
        let status = registry.get(&id).unwrap();
        assert_eq!(status.output_dir, Path::new("/srv/results").join(id.as_str()));
        assert_eq!(status.state, JobState::Pending);
        assert!(status.elapsed().is_none());
    }

    #[test]
    fn progress_sink_updates_entry() {
        let registry = RunRegistry::new();
        let id = registry.create(Path::new("in.mp4"), Path::new("out"));
        let sink = registry.progress_sink(&id).unwrap();
        sink.report(0.5, 5, 10);
        sink.report(0.4, 4, 10);
        let status = registry.get(&id).unwrap();
        assert_eq!(status.progress, 0.5);
        assert_eq!(status.frames_processed, 4);
        assert_eq!(status.message, "Processed 4/10 frames");
    }

    #[test]
    fn outcomes_set_terminal_states() {
        let registry = RunRegistry::new();
        let done = registry.create(Path::new("a.mp4"), Path::new("out"));
        let failed = registry.create(Path::new("b.mp4"), Path::new("out"));
        registry.update(&done, |s| {
            s.mark_processing();
            s.apply_outcome(&RunOutcome::Done(ConversionResult::default()), false);
        });
        registry.update(&failed, |s| {
            s.mark_processing();
            s.apply_outcome(
                &RunOutcome::Failed(ConvertError::source_unreadable("/x/b.mp4", "missing")),
                true,
            );
        });
        let done = registry.get(&done).unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.progress, 1.0);
        assert!(done.elapsed().is_some());
        let failed = registry.get(&failed).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert!(!failed.error.unwrap().contains("/x/"));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn concurrent_updates_do_not_block_each_other() {
        let registry = Arc::new(RunRegistry::new());
        let ids: Vec<RunId> = (0..8)
            .map(|_| registry.create(Path::new("in.mp4"), Path::new("out")))
            .collect();
        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let sink = registry.progress_sink(&id).unwrap();
                    for i in 1..=100u64 {
                        sink.report(i as f32 / 100.0, i, 100);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.list().iter().all(|s| s.frames_processed == 100));
    }

    #[test]
    fn unknown_id_is_not_updated() {
        let registry = RunRegistry::new();
        assert!(!registry.update(&RunId::from("deadbeef"), |_| {}));
        assert!(registry.get(&RunId::from("deadbeef")).is_none());
    }
}
