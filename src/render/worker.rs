//! Render workers - rasterize pages on background threads

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{debug, trace, warn};

use super::request::{RenderJob, RenderRequest, RenderResponse, RenderResult};
use crate::document::DocumentHandle;

/// Signals the pool when a worker thread leaves its loop, however it leaves
struct ExitSignal(Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Worker loop: pull jobs until shutdown or until the pool goes away.
///
/// Jobs submitted under an older generation than the pool's current one are
/// skipped. A failed or panicking rasterization is reported as
/// [`RenderResponse::Failed`] and the loop carries on with the next job.
pub fn render_worker(
    doc: Arc<dyn DocumentHandle>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    generation: Arc<AtomicU64>,
) {
    for request in requests {
        match request {
            RenderRequest::Render(job) => {
                let current = generation.load(Ordering::Acquire);
                if job.generation < current {
                    trace!(
                        "Skipping page {} from generation {} (now {current})",
                        job.page, job.generation
                    );
                    continue;
                }

                let response = rasterize_job(doc.as_ref(), job);
                if responses.send(response).is_err() {
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

fn rasterize_job(doc: &dyn DocumentHandle, job: RenderJob) -> RenderResponse {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        doc.rasterize(job.page, job.tag.scale, job.tag.rotation)
    }));

    let reason = match outcome {
        Ok(Ok(image)) => {
            return RenderResponse::Rendered(RenderResult {
                page: job.page,
                tag: job.tag,
                generation: job.generation,
                image: Arc::new(image),
            });
        }
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("rasterizer panicked: {}", panic_message(payload.as_ref())),
    };

    warn!("Failed to render page {}: {reason}", job.page);
    RenderResponse::Failed {
        page: job.page,
        tag: job.tag,
        reason,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Fixed set of render threads sharing one job queue
pub struct WorkerPool {
    request_tx: Sender<RenderRequest>,
    // Kept so queued jobs can be drained on invalidation
    request_rx: Receiver<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    exit_rx: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
    stopped: bool,
}

impl WorkerPool {
    /// Spawn `workers` threads (at least one) rendering from `doc`
    pub fn spawn(doc: Arc<dyn DocumentHandle>, workers: usize) -> io::Result<Self> {
        // flume channels are MPMC, so every worker pulls from the same queue
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let (exit_tx, exit_rx) = flume::unbounded();

        let mut pool = Self {
            request_tx,
            request_rx: request_rx.clone(),
            response_rx,
            exit_rx,
            handles: Vec::with_capacity(workers.max(1)),
            generation: Arc::new(AtomicU64::new(0)),
            stopped: false,
        };

        for index in 0..workers.max(1) {
            let doc = Arc::clone(&doc);
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            let generation = Arc::clone(&pool.generation);
            let exit = ExitSignal(exit_tx.clone());

            let handle = thread::Builder::new()
                .name(format!("folio-render-{index}"))
                .spawn(move || {
                    let _exit = exit;
                    render_worker(doc, rx, tx, generation);
                })?;
            pool.handles.push(handle);
        }

        debug!("Started {} render worker(s)", pool.handles.len());
        Ok(pool)
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Generation new jobs should carry
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Queue jobs for the workers. Returns how many were queued.
    pub fn submit(&self, jobs: impl IntoIterator<Item = RenderJob>) -> usize {
        if self.stopped {
            return 0;
        }
        let mut queued = 0;
        for job in jobs {
            if self.request_tx.send(RenderRequest::Render(job)).is_ok() {
                queued += 1;
            }
        }
        queued
    }

    /// Jobs waiting in the queue, not counting ones being rasterized
    #[must_use]
    pub fn queued(&self) -> usize {
        self.request_tx.len()
    }

    /// Start a new generation: queued jobs are dropped and any older job a
    /// worker still dequeues is skipped. Jobs already being rasterized run to
    /// completion. Returns the new generation.
    pub fn invalidate(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.stopped {
            let dropped = self.request_rx.drain().count();
            debug!("Render generation {generation}, dropped {dropped} queued job(s)");
        }
        generation
    }

    #[must_use]
    pub fn response_receiver(&self) -> &Receiver<RenderResponse> {
        &self.response_rx
    }

    /// Everything the workers delivered so far, without blocking
    pub fn poll_responses(&self) -> Vec<RenderResponse> {
        self.response_rx.try_iter().collect()
    }

    /// Ask every worker to exit once its current job is done. Idempotent.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.request_rx.drain().count();
        for _ in 0..self.handles.len() {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
    }

    /// Stop the workers and wait up to `timeout` for them to exit. Threads
    /// still busy at the deadline are detached. Returns whether every worker
    /// exited in time.
    pub fn join(&mut self, timeout: Duration) -> bool {
        self.stop();
        if self.handles.is_empty() {
            return true;
        }

        let deadline = Instant::now() + timeout;
        let mut exited = 0;
        while exited < self.handles.len() {
            match self.exit_rx.recv_deadline(deadline) {
                Ok(()) => exited += 1,
                Err(_) => break,
            }
        }

        let all_exited = exited >= self.handles.len();
        for handle in self.handles.drain(..) {
            if !all_exited && !handle.is_finished() {
                let name = handle.thread().name().unwrap_or("render worker").to_string();
                warn!("{name} did not stop within {timeout:?}, detaching it");
                continue;
            }
            if handle.join().is_err() {
                warn!("Render worker panicked while shutting down");
            }
        }
        all_exited
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{PageSize, Rotation};
    use crate::render::request::RenderTag;
    use crate::test_utils::{FakeDocument, RenderGate};

    const WAIT: Duration = Duration::from_secs(5);

    fn job(page: usize, scale: f32, generation: u64) -> RenderJob {
        RenderJob {
            page,
            tag: RenderTag::new(scale, Rotation::Deg0),
            generation,
        }
    }

    fn pool_for(doc: FakeDocument) -> WorkerPool {
        WorkerPool::spawn(Arc::new(doc), 1).unwrap()
    }

    #[test]
    fn renders_jobs_at_the_requested_scale() {
        let pool = pool_for(FakeDocument::uniform(3, PageSize::new(100.0, 200.0)));

        assert_eq!(pool.submit([job(1, 0.5, 0)]), 1);
        let response = pool.response_receiver().recv_timeout(WAIT).unwrap();

        let RenderResponse::Rendered(result) = response else {
            panic!("expected a rendered page, got {response:?}");
        };
        assert_eq!(result.page, 1);
        assert_eq!(result.image.dimensions(), (50, 100));
    }

    #[test]
    fn failure_is_reported_and_worker_keeps_going() {
        let doc = FakeDocument::uniform(3, PageSize::new(100.0, 100.0)).with_failing_pages([0]);
        let pool = pool_for(doc);

        pool.submit([job(0, 1.0, 0), job(1, 1.0, 0)]);
        let first = pool.response_receiver().recv_timeout(WAIT).unwrap();
        let second = pool.response_receiver().recv_timeout(WAIT).unwrap();

        assert!(matches!(first, RenderResponse::Failed { page: 0, .. }));
        assert!(matches!(second, RenderResponse::Rendered(ref r) if r.page == 1));
    }

    #[test]
    fn panicking_rasterizer_does_not_kill_the_worker() {
        let doc = FakeDocument::uniform(2, PageSize::new(100.0, 100.0)).with_panicking_pages([0]);
        let pool = pool_for(doc);

        pool.submit([job(0, 1.0, 0), job(1, 1.0, 0)]);
        let first = pool.response_receiver().recv_timeout(WAIT).unwrap();
        let second = pool.response_receiver().recv_timeout(WAIT).unwrap();

        match first {
            RenderResponse::Failed { reason, .. } => assert!(reason.contains("panicked")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(second.page(), 1);
    }

    #[test]
    fn jobs_from_an_old_generation_are_skipped() {
        let pool = pool_for(FakeDocument::uniform(3, PageSize::new(10.0, 10.0)));

        let generation = pool.invalidate();
        assert_eq!(generation, 1);
        pool.submit([job(0, 1.0, 0), job(2, 1.0, generation)]);

        let response = pool.response_receiver().recv_timeout(WAIT).unwrap();
        assert_eq!(response.page(), 2);
        assert!(
            pool.response_receiver()
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );
    }

    #[test]
    fn invalidate_drops_queued_jobs() {
        let gate = RenderGate::closed();
        let doc = FakeDocument::uniform(4, PageSize::new(10.0, 10.0)).with_gate(gate.clone());
        let pool = pool_for(doc);

        pool.submit([job(0, 1.0, 0)]);
        assert!(gate.wait_until_blocked(1, WAIT));
        pool.submit([job(1, 1.0, 0), job(2, 1.0, 0)]);
        assert_eq!(pool.queued(), 2);

        let generation = pool.invalidate();
        assert_eq!(pool.queued(), 0);
        pool.submit([job(3, 1.0, generation)]);
        gate.open();

        let pages: Vec<usize> = (0..2)
            .map(|_| pool.response_receiver().recv_timeout(WAIT).unwrap().page())
            .collect();
        assert_eq!(pages, vec![0, 3]);
    }

    #[test]
    fn stop_is_idempotent_and_join_waits_for_exit() {
        let mut pool = WorkerPool::spawn(
            Arc::new(FakeDocument::uniform(1, PageSize::new(10.0, 10.0))),
            3,
        )
        .unwrap();
        assert_eq!(pool.worker_count(), 3);

        pool.stop();
        pool.stop();
        assert!(pool.join(WAIT));
        assert_eq!(pool.submit([job(0, 1.0, 0)]), 0);
    }

    #[test]
    fn join_gives_up_on_a_stuck_worker() {
        let gate = RenderGate::closed();
        let doc = FakeDocument::uniform(1, PageSize::new(10.0, 10.0)).with_gate(gate.clone());
        let mut pool = pool_for(doc);

        pool.submit([job(0, 1.0, 0)]);
        assert!(gate.wait_until_blocked(1, WAIT));

        assert!(!pool.join(Duration::from_millis(50)));
        gate.open();
    }
}
