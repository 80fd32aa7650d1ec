use crate::config::Config;
use crate::metrics::MetricsCollector;
use crate::sink::FileSink;
use crate::source::TestPatternSource;
use anyhow::Result;
use mp_core::{CaptureEngine, ResultStream};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

const METRICS_INTERVAL_SECS: u64 = 5;

/// Drives a capture session from the synthetic source to the file sink.
pub struct CaptureRunner {
    config: Config,
    engine: CaptureEngine,
    metrics: Arc<RwLock<MetricsCollector>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl CaptureRunner {
    pub fn new(config: Config) -> Result<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let engine = CaptureEngine::new(config.capture.clone());

        Ok(Self {
            config,
            engine,
            metrics: Arc::new(RwLock::new(MetricsCollector::new())),
            shutdown_tx,
            tasks: Vec::new(),
        })
    }

    /// Captures until the source runs out of frames or Ctrl+C arrives.
    ///
    /// When the source finishes, every frame it delivered is still converted
    /// and written before this returns. Ctrl+C discards whatever is in flight.
    pub async fn run_continuous(&mut self) -> Result<()> {
        let stream = self.engine.start().await?;

        let mut source = self.start_source_loop(self.config.source.frame_count)?;
        self.start_sink_loop(stream)?;

        info!("Capture running, press Ctrl+C to stop");

        let mut ticker = interval(Duration::from_secs(METRICS_INTERVAL_SECS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        let mut window = RateWindow::default();

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let source_finished = loop {
            tokio::select! {
                joined = &mut source => {
                    if let Err(e) = joined {
                        error!("Source task failed: {}", e);
                    }
                    info!("Frame source finished");
                    break true;
                }
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, shutting down...");
                    break false;
                }
                _ = ticker.tick() => {
                    self.report_metrics(&mut window).await;
                }
            }
        };

        if source_finished {
            self.shutdown(true).await
        } else {
            self.shutdown(false).await?;
            if let Err(e) = source.await {
                error!("Source task failed: {}", e);
            }
            Ok(())
        }
    }

    /// Takes one snapshot and returns where it was written, if anywhere.
    pub async fn run_snapshot(&mut self) -> Result<Option<PathBuf>> {
        // Without a result stream the engine only converts frames for snapshots.
        drop(self.engine.start().await?);
        // Unbounded delivery: the source must outlive the request.
        let source = self.start_source_loop(0)?;

        let result = self.engine.take_snapshot().await;
        self.shutdown(false).await?;
        if let Err(e) = source.await {
            error!("Source task failed: {}", e);
        }

        let record = result?;
        info!(
            "Snapshot: {}x{}, {} bytes {}, {} bytes YUV",
            record.width,
            record.height,
            record.encoded_bytes.len(),
            record.encoded_format,
            record.yuv_planar.size()
        );

        if !self.config.output.write_files {
            return Ok(None);
        }

        let mut sink = FileSink::create(&self.config.output.directory)?;
        Ok(Some(sink.write(&record, "snapshot-")?))
    }

    /// Delivers frames until `frame_count` is reached (0 means no limit) or shutdown.
    fn start_source_loop(&mut self, frame_count: u64) -> Result<JoinHandle<()>> {
        let sender = self.engine.frame_sender()?;
        let mut source = TestPatternSource::new(&self.config.source);
        let fps = self.config.source.delivery_fps;
        let metrics = self.metrics.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            "Frame source: {}x{} (row stride {} bytes) @ {} fps",
            self.config.source.width,
            self.config.source.height,
            source.row_stride(),
            fps
        );

        Ok(tokio::spawn(async move {
            let mut interval = interval(Duration::from_micros(1_000_000 / fps as u64));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            info!("Source loop started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if frame_count > 0 && source.frames_generated() >= frame_count {
                            break;
                        }

                        let accepted = sender.offer(source.next_frame());

                        let mut m = metrics.write().await;
                        m.frames_offered += 1;
                        if !accepted {
                            m.frames_refused += 1;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Source loop shutting down");
                        break;
                    }
                }
            }

            info!("Source loop stopped after {} frames", source.frames_generated());
        }))
    }

    fn start_sink_loop(&mut self, mut stream: ResultStream) -> Result<()> {
        let mut sink = if self.config.output.write_files {
            info!("Writing captures to {}", self.config.output.directory.display());
            Some(FileSink::create(&self.config.output.directory)?)
        } else {
            None
        };
        let metrics = self.metrics.clone();

        self.tasks.push(tokio::spawn(async move {
            info!("Sink loop started");

            // Ends when the engine stops and the stream drains.
            while let Some(item) = stream.next().await {
                match item {
                    Ok(record) => {
                        metrics.write().await.record(&record);

                        if let Some(sink) = sink.as_mut() {
                            if let Err(e) = sink.write(&record, "") {
                                error!("Failed to write record {}: {:#}", record.sequence_number, e);
                            }
                        }

                        if record.sequence_number % 60 == 0 {
                            debug!("Received {} records", record.sequence_number);
                        }
                    }
                    Err(e) if e.is_per_frame() => {
                        metrics.write().await.frame_errors += 1;
                        warn!("Frame error: {}", e);
                    }
                    Err(e) => {
                        error!("Capture error: {}", e);
                    }
                }
            }

            info!("Sink loop stopped");
        }));

        Ok(())
    }

    async fn report_metrics(&self, window: &mut RateWindow) {
        let m = self.metrics.read().await;
        let stats = self.engine.stats().unwrap_or_default();
        let secs = METRICS_INTERVAL_SECS as f64;

        let record_fps = (m.records_received - window.records) as f64 / secs;
        let offer_fps = (m.frames_offered - window.offered) as f64 / secs;

        info!("📊 Metrics: source={:.1} fps, emitted={:.1} fps, gate {}/{} accepted, refused={}, errors={}, last seq={}, avg image={:.1} KiB",
              offer_fps, record_fps, stats.frames_accepted, stats.frames_accepted + stats.frames_dropped,
              m.frames_refused, m.frame_errors, m.last_sequence, m.average_encoded_kib());

        window.records = m.records_received;
        window.offered = m.frames_offered;
    }

    /// Ends the session. With `drain`, frames already delivered are converted
    /// and written first; otherwise they are discarded.
    async fn shutdown(&mut self, drain: bool) -> Result<()> {
        let _ = self.shutdown_tx.send(());

        let stats = if drain {
            info!("Draining remaining frames...");
            self.engine.finish().await?
        } else {
            info!("Stopping capture...");
            self.engine.stop().await?
        };

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Task failed: {}", e);
            }
        }

        let metrics = self.metrics.read().await;
        info!("Final statistics:");
        info!("  Frames offered: {} ({} refused, queue full)", metrics.frames_offered, metrics.frames_refused);
        info!("  Frames accepted: {}, dropped by rate gate: {}", stats.frames_accepted, stats.frames_dropped);
        info!("  Records written: {}, frame errors: {}", metrics.records_received, metrics.frame_errors);
        info!("  Encoded: {} KiB, YUV: {} KiB", metrics.bytes_encoded / 1024, metrics.bytes_yuv / 1024);
        info!("  Average rate: {:.1} fps over {:.1} s", metrics.average_fps(), metrics.uptime_secs());

        Ok(())
    }
}

/// Counter values at the previous metrics report.
#[derive(Debug, Default)]
struct RateWindow {
    records: u64,
    offered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputConfig, SourceConfig};
    use mp_core::{CaptureConfig, OutputFormat, RecordMetadata};

    fn config(dir: &std::path::Path, target_fps: u32, frame_count: u64) -> Config {
        Config {
            capture: CaptureConfig {
                target_fps,
                output: OutputFormat::Png,
                frame_queue_depth: 64,
                ..Default::default()
            },
            source: SourceConfig {
                width: 32,
                height: 16,
                row_padding_pixels: 5,
                delivery_fps: 200,
                frame_count,
            },
            output: OutputConfig {
                directory: dir.to_path_buf(),
                write_files: true,
            },
        }
    }

    #[tokio::test]
    async fn test_continuous_run_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = CaptureRunner::new(config(dir.path(), 0, 10)).unwrap();

        runner.run_continuous().await.unwrap();

        let index = std::fs::read_to_string(dir.path().join("records.jsonl")).unwrap();
        let records: Vec<RecordMetadata> = index
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 10);
        for (i, meta) in records.iter().enumerate() {
            assert_eq!(meta.sequence_number, i as u64 + 1);
            assert_eq!((meta.width, meta.height), (32, 16));
            assert_eq!(meta.row_stride, 37 * 4);
            assert_eq!(meta.yuv_len, 32 * 16 * 3 / 2);
        }
        assert!(dir.path().join("000001.png").exists());
        assert!(dir.path().join("000001.yuv").exists());
    }

    #[tokio::test]
    async fn test_finished_source_keeps_queued_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), 0, 8);
        config.source.width = 320;
        config.source.height = 240;
        config.source.delivery_fps = 240;
        let mut runner = CaptureRunner::new(config).unwrap();

        runner.run_continuous().await.unwrap();

        let index = std::fs::read_to_string(dir.path().join("records.jsonl")).unwrap();
        assert_eq!(index.lines().count(), 8);
        assert!(dir.path().join("000008.png").exists());
        assert_eq!(runner.metrics.read().await.last_sequence, 8);
    }

    #[tokio::test]
    async fn test_snapshot_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = CaptureRunner::new(config(dir.path(), 15, 0)).unwrap();

        let path = runner.run_snapshot().await.unwrap().unwrap();

        assert_eq!(path.file_name().unwrap(), "snapshot-000001.png");
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}
