use crate::clock::{Clock, MonotonicClock};
use crate::config::CaptureConfig;
use crate::error::{CaptureError, Result};
use crate::pipeline::FramePipeline;
use crate::types::CaptureResultRecord;
use mp_encoder::{CodecFactory, ImageCodec, RawFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const RESULT_CHANNEL_SIZE: usize = 16;

type SnapshotReply = oneshot::Sender<Result<CaptureResultRecord>>;

/// Owns at most one capture session at a time.
///
/// Frames enter through a bounded channel ([`FrameSender`]), are converted by a
/// single pipeline task, and are handed to a separate emission task that feeds
/// the [`ResultStream`]. The stream is unbounded: the sink gives no
/// backpressure, so consumers have to keep pace. Once the stream is dropped,
/// continuous conversion stops and frames only serve snapshot requests.
pub struct CaptureEngine {
    config: Arc<RwLock<CaptureConfig>>,
    codec: Option<Arc<dyn ImageCodec>>,
    clock: Arc<dyn Clock>,
    session: Option<ActiveSession>,
}

struct ActiveSession {
    frame_tx: mpsc::Sender<RawFrame>,
    snapshot_tx: mpsc::UnboundedSender<SnapshotReply>,
    shutdown_tx: broadcast::Sender<()>,
    stopped: Arc<AtomicBool>,
    counters: Arc<SessionCounters>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct SessionCounters {
    frames_delivered: AtomicU64,
    frames_rejected_full: AtomicU64,
    frames_accepted: AtomicU64,
    frames_dropped: AtomicU64,
    frames_skipped: AtomicU64,
    frames_failed: AtomicU64,
    records_emitted: AtomicU64,
    snapshots: AtomicU64,
}

impl SessionCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_rejected_full: self.frames_rejected_full.load(Ordering::Relaxed),
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            frames_failed: self.frames_failed.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            snapshots: self.snapshots.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_delivered: u64,
    /// Frames refused by [`FrameSender::offer`] because the queue was full.
    pub frames_rejected_full: u64,
    pub frames_accepted: u64,
    /// Frames discarded by the rate gate.
    pub frames_dropped: u64,
    /// Frames left unconverted because nobody holds the result stream.
    pub frames_skipped: u64,
    pub frames_failed: u64,
    pub records_emitted: u64,
    pub snapshots: u64,
}

/// Entry point for the external frame source.
#[derive(Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<RawFrame>,
    counters: Arc<SessionCounters>,
}

impl FrameSender {
    /// Queues a frame without waiting. Returns false if the frame was refused
    /// because the queue is full or the session has stopped.
    pub fn offer(&self, frame: RawFrame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                SessionCounters::bump(&self.counters.frames_delivered);
                true
            }
            Err(TrySendError::Full(_)) => {
                SessionCounters::bump(&self.counters.frames_rejected_full);
                debug!("Frame queue full, frame refused");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queues a frame, waiting for room.
    pub async fn send(&self, frame: RawFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| CaptureError::SessionNotActive)?;
        SessionCounters::bump(&self.counters.frames_delivered);
        Ok(())
    }
}

/// Records and per-frame errors of a session, in frame arrival order.
pub struct ResultStream {
    rx: mpsc::UnboundedReceiver<Result<CaptureResultRecord>>,
}

impl ResultStream {
    /// Next record or error; `None` once the session has stopped and drained.
    pub async fn next(&mut self) -> Option<Result<CaptureResultRecord>> {
        self.rx.recv().await
    }
}

impl CaptureEngine {
    pub fn new(config: CaptureConfig) -> Self {
        info!("Created capture engine with config: {:?}", config);

        Self {
            config: Arc::new(RwLock::new(config)),
            codec: None,
            clock: Arc::new(MonotonicClock::new()),
            session: None,
        }
    }

    /// Uses `codec` instead of building one from the configured output format.
    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Replaces the configuration used by the next session.
    pub async fn update_config(&mut self, new_config: CaptureConfig) -> Result<()> {
        new_config.validate()?;
        let mut config = self.config.write().await;
        info!("Updating configuration");
        if self.session.is_some() {
            warn!("Capture session active, configuration applies from the next start");
        }
        *config = new_config;
        Ok(())
    }

    pub async fn config(&self) -> CaptureConfig {
        self.config.read().await.clone()
    }

    /// Starts a session and returns the stream its results are pushed to.
    pub async fn start(&mut self) -> Result<ResultStream> {
        if self.session.is_some() {
            return Err(CaptureError::AlreadyActive);
        }

        let config = self.config.read().await.clone();
        config.validate()?;

        let codec: Arc<dyn ImageCodec> = match &self.codec {
            Some(codec) => codec.clone(),
            None => Arc::from(CodecFactory::create(config.output)?),
        };

        info!(
            "Starting capture session: target {} fps, crop {:?}, output {}",
            config.target_fps,
            config.crop,
            codec.format()
        );

        let (frame_tx, frame_rx) = mpsc::channel(config.frame_queue_depth);
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (emit_tx, emit_rx) = mpsc::channel(RESULT_CHANNEL_SIZE);
        let (sink_tx, sink_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);

        let stopped = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(SessionCounters::default());

        let pipeline_task = PipelineTask {
            pipeline: Some(FramePipeline::new(&config, codec)),
            clock: self.clock.clone(),
            frame_rx,
            snapshot_rx,
            emit_tx,
            sink_tx: sink_tx.clone(),
            shutdown_rx: shutdown_tx.subscribe(),
            stopped: stopped.clone(),
            counters: counters.clone(),
        };

        let emission_task = EmissionTask {
            emit_rx,
            sink_tx,
            shutdown_rx: shutdown_tx.subscribe(),
            stopped: stopped.clone(),
            counters: counters.clone(),
        };

        let tasks = vec![
            tokio::spawn(pipeline_task.run()),
            tokio::spawn(emission_task.run()),
        ];

        self.session = Some(ActiveSession {
            frame_tx,
            snapshot_tx,
            shutdown_tx,
            stopped,
            counters,
            tasks,
        });

        info!("Capture session started");
        Ok(ResultStream { rx: sink_rx })
    }

    /// Stops the active session. No record is emitted once this returns, and
    /// frames still queued or mid-conversion are discarded.
    pub async fn stop(&mut self) -> Result<SessionStats> {
        let session = self.session.take().ok_or(CaptureError::SessionNotActive)?;

        info!("Stopping capture session");

        session.stopped.store(true, Ordering::SeqCst);
        let _ = session.shutdown_tx.send(());

        Ok(Self::join_session(session.tasks, &session.counters).await)
    }

    /// Ends the active session once every queued frame has been converted and
    /// its result emitted.
    ///
    /// The queue closes when the last [`FrameSender`] is dropped, so callers
    /// must drop theirs first. Snapshot requests still pending when the queue
    /// runs dry resolve with [`CaptureError::SessionNotActive`].
    pub async fn finish(&mut self) -> Result<SessionStats> {
        let ActiveSession {
            frame_tx,
            snapshot_tx,
            shutdown_tx,
            counters,
            tasks,
            ..
        } = self.session.take().ok_or(CaptureError::SessionNotActive)?;

        info!("Draining capture session");

        drop(frame_tx);
        drop(snapshot_tx);
        let stats = Self::join_session(tasks, &counters).await;

        // A closed shutdown channel reads as a shutdown, so it outlives the tasks.
        drop(shutdown_tx);
        Ok(stats)
    }

    async fn join_session(tasks: Vec<JoinHandle<()>>, counters: &SessionCounters) -> SessionStats {
        for task in tasks {
            if let Err(e) = task.await {
                error!("Capture task failed: {}", e);
            }
        }

        let stats = counters.snapshot();
        info!(
            "Capture session ended: {} delivered, {} accepted, {} dropped, {} skipped, {} failed, {} emitted",
            stats.frames_delivered,
            stats.frames_accepted,
            stats.frames_dropped,
            stats.frames_skipped,
            stats.frames_failed,
            stats.records_emitted
        );
        stats
    }

    pub fn frame_sender(&self) -> Result<FrameSender> {
        let session = self.session.as_ref().ok_or(CaptureError::SessionNotActive)?;
        Ok(FrameSender {
            tx: session.frame_tx.clone(),
            counters: session.counters.clone(),
        })
    }

    /// Waits for the next delivered frame and returns it converted.
    ///
    /// The snapshot bypasses the rate gate and leaves the session's sequence
    /// numbers alone.
    pub async fn take_snapshot(&self) -> Result<CaptureResultRecord> {
        let session = self.session.as_ref().ok_or(CaptureError::SessionNotActive)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        session
            .snapshot_tx
            .send(reply_tx)
            .map_err(|_| CaptureError::SessionNotActive)?;

        reply_rx.await.map_err(|_| CaptureError::SessionNotActive)?
    }

    /// Counters of the active session, `None` when idle.
    pub fn stats(&self) -> Option<SessionStats> {
        self.session.as_ref().map(|s| s.counters.snapshot())
    }
}

struct PipelineTask {
    /// Lent to the blocking pool for each conversion.
    pipeline: Option<FramePipeline>,
    clock: Arc<dyn Clock>,
    frame_rx: mpsc::Receiver<RawFrame>,
    snapshot_rx: mpsc::UnboundedReceiver<SnapshotReply>,
    emit_tx: mpsc::Sender<Result<CaptureResultRecord>>,
    /// Only consulted to see whether the consumer is still there.
    sink_tx: mpsc::UnboundedSender<Result<CaptureResultRecord>>,
    shutdown_rx: broadcast::Receiver<()>,
    stopped: Arc<AtomicBool>,
    counters: Arc<SessionCounters>,
}

impl PipelineTask {
    async fn run(mut self) {
        info!("Pipeline loop started");
        let mut pending: Vec<SnapshotReply> = Vec::new();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Pipeline loop shutting down");
                    break;
                }
                Some(reply) = self.snapshot_rx.recv() => {
                    pending.push(reply);
                }
                frame = self.frame_rx.recv() => {
                    let Some(frame) = frame else {
                        info!("Frame queue closed and drained");
                        break;
                    };
                    if !self.handle_frame(frame, &mut pending).await {
                        break;
                    }
                }
            }
        }

        // Dropping the pending replies resolves their callers with SessionNotActive.
        info!("Pipeline loop stopped ({} snapshot request(s) abandoned)", pending.len());
    }

    /// Returns false when the loop should end.
    async fn handle_frame(&mut self, frame: RawFrame, pending: &mut Vec<SnapshotReply>) -> bool {
        let now = self.clock.now_millis();
        let reply = (!pending.is_empty()).then(|| pending.remove(0));
        let wants_snapshot = reply.is_some();
        let continuous = !self.sink_tx.is_closed();

        if !wants_snapshot && !continuous {
            SessionCounters::bump(&self.counters.frames_skipped);
            return true;
        }

        let Some(mut pipeline) = self.pipeline.take() else {
            return false;
        };

        // Compression and YUV encoding are CPU-bound; keep them off the runtime.
        let converted = tokio::task::spawn_blocking(move || {
            let snapshot = wants_snapshot.then(|| pipeline.snapshot(&frame, now));
            let outcome = continuous.then(|| pipeline.process(&frame, now));
            (pipeline, snapshot, outcome)
        })
        .await;

        let (pipeline, snapshot, outcome) = match converted {
            Ok(parts) => parts,
            Err(e) => {
                error!("Frame conversion task failed: {}", e);
                return false;
            }
        };
        self.pipeline = Some(pipeline);

        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }

        if let (Some(reply), Some(result)) = (reply, snapshot) {
            SessionCounters::bump(&self.counters.snapshots);
            let _ = reply.send(result);
        }

        let outcome = match outcome {
            None => {
                SessionCounters::bump(&self.counters.frames_skipped);
                return true;
            }
            Some(Ok(Some(record))) => {
                SessionCounters::bump(&self.counters.frames_accepted);
                if record.sequence_number % 60 == 0 {
                    debug!("Accepted {} frames", record.sequence_number);
                }
                Ok(record)
            }
            Some(Ok(None)) => {
                SessionCounters::bump(&self.counters.frames_dropped);
                return true;
            }
            Some(Err(e)) => {
                SessionCounters::bump(&self.counters.frames_failed);
                warn!("Frame rejected: {}", e);
                Err(e)
            }
        };

        if self.emit_tx.send(outcome).await.is_err() {
            error!("Emission channel closed");
            return false;
        }
        true
    }
}

struct EmissionTask {
    emit_rx: mpsc::Receiver<Result<CaptureResultRecord>>,
    sink_tx: mpsc::UnboundedSender<Result<CaptureResultRecord>>,
    shutdown_rx: broadcast::Receiver<()>,
    stopped: Arc<AtomicBool>,
    counters: Arc<SessionCounters>,
}

impl EmissionTask {
    async fn run(mut self) {
        info!("Emission loop started");
        let mut sink_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Emission loop shutting down");
                    break;
                }
                item = self.emit_rx.recv() => {
                    let Some(item) = item else { break };

                    if self.stopped.load(Ordering::SeqCst) {
                        break;
                    }

                    // Keep draining after the consumer goes away so the
                    // pipeline never stalls on a dead sink.
                    if sink_open {
                        let is_record = item.is_ok();
                        if self.sink_tx.send(item).is_err() {
                            warn!("Result stream dropped by consumer");
                            sink_open = false;
                        } else if is_record {
                            SessionCounters::bump(&self.counters.records_emitted);
                        }
                    }
                }
            }
        }

        info!("Emission loop stopped");
    }
}
