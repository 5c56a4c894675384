use crate::{
    camera::SessionState,
    decode::Decoder,
    engine::{EngineConfig, EngineFactory, InferenceEngine, Timing},
    error::Error,
    frame::Frame,
    overlay::Size,
    pose::Pose,
    preprocess::{Preprocessor, ScaleMode},
};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError, Weak},
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};

/// Output of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    /// Sequence number of the frame this result was computed from.
    pub sequence: u64,
    pub frame_size: Size,
    /// Keypoints in normalized frame coordinates.
    pub pose: Pose,
    pub timing: Timing,
}

impl InferenceResult {
    /// The pose, if it is confident enough to display.
    pub fn person(&self) -> Option<&Pose> {
        if self.pose.is_person() {
            Some(&self.pose)
        } else {
            None
        }
    }

    pub fn score_text(&self) -> String {
        format!("{:.3}", self.pose.score)
    }

    pub fn time_text(&self) -> String {
        format!("{:.2}ms", self.timing.total().as_secs_f64() * 1000.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoseStatus {
    /// No engine has been loaded yet.
    Loading,
    Ready,
    /// The engine could not be built or failed; the camera feed continues.
    Unavailable(String),
}

/// What the display shows right now.
#[derive(Debug, Clone)]
pub struct DisplayState {
    pub frame: Option<Arc<Frame>>,
    pub result: Option<Arc<InferenceResult>>,
    pub camera: SessionState,
    pub pose: PoseStatus,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            frame: None,
            result: None,
            camera: SessionState::Idle,
            pose: PoseStatus::Loading,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Cycles that produced a result.
    pub processed: u64,
    /// Frames replaced while waiting for the engine.
    pub dropped: u64,
    /// Cycles that ended in an error.
    pub failed: u64,
}

/// The newest published result for one consumer.
///
/// Holds at most one result: a result nobody read yet is replaced by the
/// next one instead of queueing behind it.
pub struct Subscription {
    rx: Receiver<Arc<InferenceResult>>,
    _alive: Arc<()>,
}

impl Subscription {
    /// Wait up to `timeout` for a result newer than the last one received.
    /// `None` on timeout or after shutdown.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<InferenceResult>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Arc<InferenceResult>> {
        self.rx.try_recv().ok()
    }
}

struct Subscriber {
    tx: Sender<Arc<InferenceResult>>,
    // used to evict an unread result
    rx: Receiver<Arc<InferenceResult>>,
    alive: Weak<()>,
}

impl Subscriber {
    /// Hand `result` over, replacing any unread one. `false` once the
    /// subscription was dropped.
    fn offer(&self, result: &Arc<InferenceResult>) -> bool {
        if self.alive.upgrade().is_none() {
            return false;
        }
        if let Err(TrySendError::Full(result)) = self.tx.try_send(Arc::clone(result)) {
            let _stale = self.rx.try_recv();
            let _ = self.tx.try_send(result);
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one preprocess, infer, decode cycle at a time.
pub struct Processor<E> {
    engine: Mutex<E>,
    preprocessor: Preprocessor,
    decoder: Decoder,
}

impl<E> Processor<E>
where
    E: InferenceEngine,
{
    pub fn new(engine: E, mode: ScaleMode) -> Result<Self, Error> {
        let preprocessor = Preprocessor::new(engine.input_spec(), mode)?;
        Ok(Self {
            engine: Mutex::new(engine),
            preprocessor,
            decoder: Decoder,
        })
    }

    /// Run a full cycle on `frame`.
    ///
    /// Returns `Ok(None)` without touching the frame when another cycle is
    /// already in flight.
    pub fn process(&self, frame: &Frame) -> Result<Option<InferenceResult>, Error> {
        let mut engine = match self.engine.try_lock() {
            Ok(engine) => engine,
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let start = Instant::now();
        let (input, letterbox) = self.preprocessor.prepare(frame)?;
        let spec = engine.input_spec();
        if !input.matches(&spec) {
            return Err(Error::InputMismatch {
                expected: spec,
                actual: input.shape().to_vec(),
            });
        }
        let preprocess = start.elapsed();

        let start = Instant::now();
        let output = engine.infer(&input)?;
        let inference = start.elapsed();
        drop(engine);

        let start = Instant::now();
        let keypoints = self.decoder.decode(output.view())?;
        let pose = Pose::new(keypoints).map_points(|point| letterbox.to_frame(point));
        let decode = start.elapsed();

        Ok(Some(InferenceResult {
            sequence: frame.sequence(),
            frame_size: Size::of_frame(frame),
            pose,
            timing: Timing {
                preprocess,
                inference,
                decode,
            },
        }))
    }
}

struct Mailbox<E> {
    pending: Option<Arc<Frame>>,
    processor: Option<Arc<Processor<E>>>,
    generation: u64,
    shutdown: bool,
}

struct Shared<E> {
    mailbox: Mutex<Mailbox<E>>,
    ready: Condvar,
    display: Mutex<DisplayState>,
    stats: Mutex<Stats>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl<E> Shared<E>
where
    E: InferenceEngine,
{
    /// Block until there is a frame and an engine to run it on.
    fn next_job(&self) -> Option<(Arc<Frame>, Arc<Processor<E>>, u64)> {
        let mut mailbox = lock(&self.mailbox);
        loop {
            if mailbox.shutdown {
                return None;
            }
            if let Some(processor) = mailbox.processor.clone() {
                if let Some(frame) = mailbox.pending.take() {
                    return Some((frame, processor, mailbox.generation));
                }
            }
            mailbox = self
                .ready
                .wait(mailbox)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Record the outcome of a cycle run on engine `generation`.
    ///
    /// The mailbox stays locked throughout, so a concurrent `reconfigure`
    /// either happens before (and the outcome is discarded) or after.
    fn finish(
        &self,
        generation: u64,
        sequence: u64,
        outcome: Result<Option<InferenceResult>, Error>,
    ) {
        let mut mailbox = lock(&self.mailbox);
        if mailbox.generation != generation {
            debug!(message = "discarding cycle from replaced engine", sequence);
            return;
        }

        // held until the outcome is fully published
        let mut stats = lock(&self.stats);
        match outcome {
            Ok(Some(result)) => {
                let result = Arc::new(result);
                lock(&self.display).result = Some(Arc::clone(&result));
                lock(&self.subscribers).retain(|subscriber| subscriber.offer(&result));
                stats.processed += 1;
            }
            Ok(None) => stats.dropped += 1,
            Err(error) if error.is_transient() => {
                warn!(message = "skipping frame", sequence, %error);
                stats.failed += 1;
            }
            Err(error) => {
                error!(message = "pose estimation unavailable", %error);
                mailbox.processor = None;
                mailbox.pending = None;
                let mut display = lock(&self.display);
                display.result = None;
                display.pose = PoseStatus::Unavailable(error.to_string());
                stats.failed += 1;
            }
        }
    }

    fn run(&self) {
        while let Some((frame, processor, generation)) = self.next_job() {
            let outcome = processor.process(&frame);
            drop(processor);
            self.finish(generation, frame.sequence(), outcome);
        }
        debug!(message = "pose worker exiting");
    }
}

/// Single-flight pose estimation on a background worker.
///
/// At most one frame is in flight. While it runs, the newest submitted frame
/// waits in a one-slot mailbox; older waiting frames are dropped.
pub struct Coordinator<F>
where
    F: EngineFactory,
{
    factory: F,
    mode: ScaleMode,
    shared: Arc<Shared<F::Engine>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl<F> Coordinator<F>
where
    F: EngineFactory,
{
    /// Start the worker. No frames are processed until an engine is loaded
    /// with [`Coordinator::reconfigure`].
    pub fn new(factory: F, mode: ScaleMode) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            mailbox: Mutex::new(Mailbox {
                pending: None,
                processor: None,
                generation: 0,
                shutdown: false,
            }),
            ready: Condvar::new(),
            display: Mutex::new(DisplayState::default()),
            stats: Mutex::new(Stats::default()),
            subscribers: Mutex::new(Vec::new()),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("pose-worker".to_owned())
                .spawn(move || shared.run())
                .map_err(Error::SpawnWorker)?
        };
        Ok(Self {
            factory,
            mode,
            shared,
            worker: Some(worker),
        })
    }

    /// Build a fresh engine for `config` and swap it in.
    ///
    /// A cycle already running on the old engine finishes, but its result is
    /// discarded. On failure no engine is loaded and the display reports pose
    /// estimation as unavailable.
    #[instrument(skip(self), fields(variant = %config.variant, backend = %config.backend))]
    pub fn reconfigure(&self, config: &EngineConfig) -> Result<(), Error> {
        let built = config
            .validate()
            .and_then(|_| self.factory.build(config))
            .and_then(|engine| Processor::new(engine, self.mode));

        let (processor, status, outcome) = match built {
            Ok(processor) => {
                info!(message = "pose engine ready");
                (Some(Arc::new(processor)), PoseStatus::Ready, Ok(()))
            }
            Err(error) => {
                error!(message = "failed to load pose engine", %error);
                let status = PoseStatus::Unavailable(error.to_string());
                (None, status, Err(error))
            }
        };

        {
            let mut mailbox = lock(&self.shared.mailbox);
            mailbox.generation += 1;
            if processor.is_none() {
                mailbox.pending = None;
            }
            mailbox.processor = processor;
            let mut display = lock(&self.shared.display);
            display.pose = status;
            display.result = None;
        }
        self.shared.ready.notify_one();

        outcome
    }

    /// Hand a frame to the pipeline. The frame is always shown; it is only
    /// inferred on if it is still the newest frame when the engine is free.
    pub fn submit(&self, frame: Frame) {
        let frame = Arc::new(frame);
        lock(&self.shared.display).frame = Some(Arc::clone(&frame));

        let replaced = {
            let mut mailbox = lock(&self.shared.mailbox);
            if mailbox.shutdown || mailbox.processor.is_none() {
                return;
            }
            mailbox.pending.replace(frame)
        };
        if let Some(replaced) = replaced {
            lock(&self.shared.stats).dropped += 1;
            debug!(message = "dropped frame", sequence = replaced.sequence());
        }
        self.shared.ready.notify_one();
    }

    /// Follow published results. Results arrive in frame order, but a slow
    /// consumer only ever sees the newest one.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = channel::bounded(1);
        let alive = Arc::new(());
        lock(&self.shared.subscribers).push(Subscriber {
            tx,
            rx: rx.clone(),
            alive: Arc::downgrade(&alive),
        });
        Subscription { rx, _alive: alive }
    }

    pub fn display(&self) -> DisplayState {
        lock(&self.shared.display).clone()
    }

    pub fn set_camera_state(&self, state: SessionState) {
        lock(&self.shared.display).camera = state;
    }

    pub fn stats(&self) -> Stats {
        *lock(&self.shared.stats)
    }

    /// Stop the worker. A cycle in flight completes; a pending frame is
    /// discarded.
    pub fn shutdown(&mut self) {
        {
            let mut mailbox = lock(&self.shared.mailbox);
            mailbox.shutdown = true;
            mailbox.pending = None;
        }
        self.shared.ready.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(message = "pose worker panicked");
            }
        }
        lock(&self.shared.subscribers).clear();
    }
}

impl<F> Drop for Coordinator<F>
where
    F: EngineFactory,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
