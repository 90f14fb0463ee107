//! Bounded pool of conversion workers fed from a bounded queue.

use crate::config::ConversionConfig;
use crate::decoder::FrameSource;
use crate::pipeline::{
    write_details, CancelToken, ConversionPipeline, NoProgress, PipelineSettings, ProgressSink,
    RunOutcome,
};
use crate::registry::{RunId, RunRegistry};
use flume::{Receiver, Sender, TrySendError};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("job queue is full ({0} waiting)")]
    QueueFull(usize),

    #[error("scheduler is shut down")]
    ShutDown,
}

/// Where a job's frames come from.
pub enum JobInput {
    Path(PathBuf),
    Source(Box<dyn FrameSource + Send>),
}

struct Job {
    id: RunId,
    input: JobInput,
    config: ConversionConfig,
    cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of runs converting at once.
    pub workers: usize,
    /// Runs allowed to wait for a worker.
    pub queue_capacity: usize,
    pub results_dir: PathBuf,
    pub pipeline: PipelineSettings,
}

type CancelMap = Arc<Mutex<HashMap<RunId, CancelToken>>>;

pub struct RunScheduler {
    registry: Arc<RunRegistry>,
    results_dir: PathBuf,
    capacity: usize,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    cancels: CancelMap,
}

impl RunScheduler {
    pub fn new(registry: Arc<RunRegistry>, config: SchedulerConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = flume::bounded::<Job>(capacity);
        let cancels: CancelMap = Arc::default();
        let settings = Arc::new(config.pipeline);

        let workers = (0..config.workers.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                let registry = Arc::clone(&registry);
                let settings = Arc::clone(&settings);
                let cancels = Arc::clone(&cancels);
                thread::Builder::new()
                    .name(format!("asciivid-worker-{}", n))
                    .spawn(move || worker_loop(receiver, registry, settings, cancels))
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Cannot start worker thread: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();
        log::debug!("Started {} workers, queue capacity {}", workers.len(), capacity);

        Self {
            registry,
            results_dir: config.results_dir,
            capacity,
            sender: Some(sender),
            workers,
            cancels,
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Queues a conversion of the video at `input`.
    pub fn submit(&self, input: &Path, config: ConversionConfig) -> Result<RunId, SchedulerError> {
        self.enqueue(input, JobInput::Path(input.to_path_buf()), config)
    }

    /// Queues a conversion of an already opened source; `label` names it in the registry.
    pub fn submit_source(
        &self,
        label: &Path,
        source: Box<dyn FrameSource + Send>,
        config: ConversionConfig,
    ) -> Result<RunId, SchedulerError> {
        self.enqueue(label, JobInput::Source(source), config)
    }

    fn enqueue(
        &self,
        label: &Path,
        input: JobInput,
        config: ConversionConfig,
    ) -> Result<RunId, SchedulerError> {
        let sender = self.sender.as_ref().ok_or(SchedulerError::ShutDown)?;
        let id = self.registry.create(label, &self.results_dir);
        let cancel = CancelToken::new();
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), cancel.clone());

        let job = Job {
            id: id.clone(),
            input,
            config,
            cancel,
        };
        match sender.try_send(job) {
            Ok(()) => {
                log::info!("Queued run {} for {}", id, label.display());
                Ok(id)
            }
            Err(e) => {
                self.forget(&id);
                match e {
                    TrySendError::Full(_) => {
                        log::warn!("Rejected {}: queue is full", label.display());
                        Err(SchedulerError::QueueFull(self.capacity))
                    }
                    TrySendError::Disconnected(_) => Err(SchedulerError::ShutDown),
                }
            }
        }
    }

    fn forget(&self, id: &RunId) {
        self.registry.remove(id);
        self.cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Requests cancellation. Returns false if the run is unknown or already finished.
    pub fn cancel(&self, id: &RunId) -> bool {
        let token = self
            .cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        match token {
            Some(token) => {
                log::info!("Cancelling run {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let tokens: Vec<CancelToken> = self
            .cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for token in tokens {
            token.cancel();
        }
    }

    /// Stops accepting jobs, lets queued ones finish, and joins the workers.
    pub fn shutdown(&mut self) {
        drop(self.sender.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("A worker thread panicked");
            }
        }
    }
}

impl Drop for RunScheduler {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.cancel_all();
            self.shutdown();
        }
    }
}

fn worker_loop(
    receiver: Receiver<Job>,
    registry: Arc<RunRegistry>,
    settings: Arc<PipelineSettings>,
    cancels: CancelMap,
) {
    while let Ok(job) = receiver.recv() {
        let id = job.id.clone();
        let ran = panic::catch_unwind(AssertUnwindSafe(|| run_job(job, &registry, &settings)));
        if let Err(payload) = ran {
            let detail = panic_message(payload.as_ref());
            log::error!("Run {} panicked: {}", id, detail);
            let error = if settings.quiet_errors {
                "convert failed: internal error".to_string()
            } else {
                format!("convert failed: internal error: {}", detail)
            };
            registry.update(&id, |s| s.mark_failed(error));
        }
        cancels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn run_job(job: Job, registry: &RunRegistry, settings: &PipelineSettings) {
    let Job {
        id,
        input,
        config,
        cancel,
    } = job;

    if cancel.is_cancelled() {
        registry.update(&id, |s| s.mark_cancelled());
        return;
    }
    let Some(output_dir) = registry.get(&id).map(|s| s.output_dir) else {
        log::warn!("Run {} vanished from the registry", id);
        return;
    };
    registry.update(&id, |s| s.mark_processing());
    log::info!("Run {} started in {}", id, output_dir.display());

    let outcome = match ConversionPipeline::new(&output_dir, config, settings.clone()) {
        Ok(mut pipeline) => {
            let sink: Box<dyn ProgressSink> = match registry.progress_sink(&id) {
                Some(sink) => Box::new(sink),
                None => Box::new(NoProgress),
            };
            match input {
                JobInput::Path(path) => pipeline.run_path(&path, sink.as_ref(), &cancel),
                JobInput::Source(mut source) => {
                    pipeline.run(source.as_mut(), sink.as_ref(), &cancel)
                }
            }
        }
        Err(e) => RunOutcome::Failed(e),
    };

    if let RunOutcome::Done(result) = &outcome {
        if let Err(e) = write_details(result, &output_dir) {
            log::warn!("{}", e.user_message(settings.quiet_errors));
        }
    }
    match &outcome {
        RunOutcome::Done(_) => log::info!("Run {} completed", id),
        RunOutcome::Cancelled(_) => log::info!("Run {} cancelled", id),
        RunOutcome::Failed(_) => log::warn!("Run {} failed", id),
    }
    registry.update(&id, |s| s.apply_outcome(&outcome, settings.quiet_errors));
}
