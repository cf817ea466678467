use super::InferenceBackend;
use crate::preprocessing::CropTensor;
use lifecycle::{AdapterError, BatchHandle, InferenceAdapter};
use ndarray::{Array4, ArrayView3, Axis};
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{
    self, Receiver, RecvTimeoutError, SyncSender, TryRecvError, TrySendError,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct Job {
    id: u64,
    batch: Array4<f32>,
}

struct Completion {
    id: u64,
    outputs: Result<Vec<Vec<f32>>, String>,
}

/// Runs an [`InferenceBackend`] on a dedicated worker thread.
///
/// The job channel has a single slot: a batch can wait while another one is
/// computing, and any further submission is rejected until the worker takes
/// the queued job. Completions travel back over a channel and are matched to
/// handles on the caller's thread, so the worker never touches caller state.
pub struct ThreadedAdapter {
    jobs: Option<SyncSender<Job>>,
    completions: Receiver<Completion>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    submitted: HashSet<u64>,
    finished: HashMap<u64, Result<Vec<Vec<f32>>, String>>,
    cancelled: HashSet<u64>,
}

impl ThreadedAdapter {
    pub fn spawn<B>(backend: B) -> anyhow::Result<Self>
    where
        B: InferenceBackend + Send + 'static,
    {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let backend_name = backend.name();

        let worker = thread::Builder::new()
            .name(format!("inference-{backend_name}"))
            .spawn(move || run_worker(backend, job_rx, done_tx))?;

        tracing::info!(backend = backend_name, "Inference worker started");

        Ok(Self {
            jobs: Some(job_tx),
            completions: done_rx,
            worker: Some(worker),
            next_id: 0,
            submitted: HashSet::new(),
            finished: HashMap::new(),
            cancelled: HashSet::new(),
        })
    }

    fn store(&mut self, completion: Completion) {
        self.submitted.remove(&completion.id);
        if self.cancelled.remove(&completion.id) {
            tracing::debug!(batch = completion.id, "Discarding output of cancelled batch");
            return;
        }
        self.finished.insert(completion.id, completion.outputs);
    }

    fn drain_completions(&mut self) {
        loop {
            match self.completions.try_recv() {
                Ok(completion) => self.store(completion),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn take_finished(&mut self, id: u64) -> Option<Result<Vec<Vec<f32>>, AdapterError>> {
        self.finished
            .remove(&id)
            .map(|outputs| outputs.map_err(AdapterError::Backend))
    }
}

fn run_worker<B: InferenceBackend>(
    mut backend: B,
    jobs: Receiver<Job>,
    completions: mpsc::Sender<Completion>,
) {
    while let Ok(Job { id, batch }) = jobs.recv() {
        let _s = common::span!("model_inference", batch = id);
        let started = Instant::now();

        let outputs = backend
            .infer(&batch)
            .map(|scores| scores.outer_iter().map(|row| row.to_vec()).collect())
            .map_err(|e| format!("{e:#}"));

        tracing::trace!(
            batch = id,
            items = batch.len_of(Axis(0)),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            ok = outputs.is_ok(),
            "Batch computed"
        );

        if completions.send(Completion { id, outputs }).is_err() {
            break;
        }
    }
    tracing::debug!("Inference worker stopped");
}

impl InferenceAdapter for ThreadedAdapter {
    type Input = CropTensor;
    type Output = Vec<f32>;

    fn submit_batch(&mut self, items: Vec<CropTensor>) -> Result<BatchHandle, AdapterError> {
        let views: Vec<ArrayView3<f32>> = items.iter().map(|c| c.tensor.view()).collect();
        let batch = ndarray::stack(Axis(0), &views)
            .map_err(|e| AdapterError::Rejected(format!("crops do not share a shape: {e}")))?;

        let jobs = self.jobs.as_ref().ok_or(AdapterError::Disconnected)?;
        let id = self.next_id + 1;

        match jobs.try_send(Job { id, batch }) {
            Ok(()) => {
                self.next_id = id;
                self.submitted.insert(id);
                Ok(BatchHandle::new(id))
            }
            Err(TrySendError::Full(_)) => Err(AdapterError::Rejected(
                "inference worker job slot is occupied".to_string(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(AdapterError::Disconnected),
        }
    }

    fn is_ready(&mut self, handle: BatchHandle) -> bool {
        self.drain_completions();
        self.finished.contains_key(&handle.id())
    }

    fn collect(
        &mut self,
        handle: BatchHandle,
        timeout: Duration,
    ) -> Result<Vec<Vec<f32>>, AdapterError> {
        let id = handle.id();
        self.drain_completions();
        if let Some(result) = self.take_finished(id) {
            return result;
        }
        if !self.submitted.contains(&id) {
            return Err(AdapterError::UnknownHandle(id));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completions.recv_timeout(remaining) {
                Ok(completion) => {
                    self.store(completion);
                    if let Some(result) = self.take_finished(id) {
                        return result;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.cancel(handle);
                    return Err(AdapterError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.submitted.remove(&id);
                    return Err(AdapterError::Disconnected);
                }
            }
        }
    }

    fn cancel(&mut self, handle: BatchHandle) {
        let id = handle.id();
        if self.finished.remove(&id).is_none() && self.submitted.contains(&id) {
            self.cancelled.insert(id);
        }
    }
}

impl Drop for ThreadedAdapter {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Inference worker panicked");
            }
        }
    }
}
