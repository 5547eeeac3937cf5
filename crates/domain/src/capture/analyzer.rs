//! Face-stability analyzer driving automatic capture of biometric slots.
//!
//! Each tick reads one frame, runs the detector and updates a stability
//! counter. A single face for `stability_threshold` consecutive ticks fires
//! one capture trigger; anything else resets the counter. The loop is awaited
//! by its owner and stops on cancellation, on trigger, or on the first device
//! error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AnalyzerConfig;
use crate::errors::{DeviceFault, Result};

use super::aggregate::Frame;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub bounds: BoundingBox,
    pub landmarks: Vec<Landmark>,
}

/// Live camera feed.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the device. Permission denial surfaces here.
    async fn open(&mut self) -> std::result::Result<(), DeviceFault>;

    async fn next_frame(&mut self) -> std::result::Result<Frame, DeviceFault>;
}

/// Black-box face detector.
#[async_trait]
pub trait FaceDetector: Send {
    /// Load models; called once before the first tick.
    async fn load(&mut self) -> std::result::Result<(), DeviceFault>;

    async fn detect(&mut self, frame: &Frame) -> std::result::Result<Vec<Detection>, DeviceFault>;
}

/// Per-tick detection summary; never stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionTick {
    pub face_count: usize,
    pub bounding_boxes: Vec<BoundingBox>,
    pub landmarks: Vec<Vec<Landmark>>,
}

impl From<Vec<Detection>> for DetectionTick {
    fn from(detections: Vec<Detection>) -> Self {
        let face_count = detections.len();
        let (bounding_boxes, landmarks) =
            detections.into_iter().map(|d| (d.bounds, d.landmarks)).unzip();
        Self { face_count, bounding_boxes, landmarks }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    /// More than one face in frame
    AmbiguousSubjects,
}

/// What one tick produced, published for progress UIs.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub face_count: usize,
    pub detected: bool,
    /// Stability progress in `0.0..=1.0`
    pub progress: f32,
    pub hint: Option<Hint>,
    pub capture: bool,
}

/// Consecutive single-face ticks.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StabilityCounter(u32);

impl StabilityCounter {
    pub fn value(self) -> u32 {
        self.0
    }

    fn increment(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    fn reset(&mut self) {
        self.0 = 0;
    }
}

pub struct FrameAnalyzer<D> {
    detector: D,
    tick_interval: Duration,
    threshold: u32,
    counter: StabilityCounter,
    capture_in_flight: bool,
    loaded: bool,
}

impl<D> FrameAnalyzer<D>
where
    D: FaceDetector,
{
    pub fn new(detector: D, config: &AnalyzerConfig) -> Self {
        Self {
            detector,
            tick_interval: if config.tick_interval.is_zero() {
                AnalyzerConfig::default().tick_interval
            } else {
                config.tick_interval
            },
            threshold: config.stability_threshold.max(1),
            counter: StabilityCounter::default(),
            capture_in_flight: false,
            loaded: false,
        }
    }

    pub fn counter(&self) -> u32 {
        self.counter.value()
    }

    pub fn capture_in_flight(&self) -> bool {
        self.capture_in_flight
    }

    /// Applies one detection result to the stability state.
    ///
    /// The trigger fires when the counter reaches the threshold and no
    /// capture is in flight; the counter then restarts from zero and the
    /// in-flight guard stays set until [`release_capture`](Self::release_capture)
    /// or [`reset`](Self::reset).
    pub fn observe(&mut self, tick: &DetectionTick) -> TickReport {
        let mut hint = None;
        let detected = tick.face_count == 1;

        match tick.face_count {
            0 => self.counter.reset(),
            1 => self.counter.increment(),
            _ => {
                self.counter.reset();
                hint = Some(Hint::AmbiguousSubjects);
            }
        }

        let progress = (self.counter.value() as f32 / self.threshold as f32).min(1.0);
        let capture = detected && self.counter.value() >= self.threshold && !self.capture_in_flight;
        if capture {
            self.capture_in_flight = true;
            self.counter.reset();
        }

        TickReport { face_count: tick.face_count, detected, progress, hint, capture }
    }

    /// Runs the detector on one frame and observes the result.
    pub async fn analyze(&mut self, frame: &Frame) -> Result<TickReport> {
        let detections = self.detector.detect(frame).await?;
        Ok(self.observe(&DetectionTick::from(detections)))
    }

    /// Clears the in-flight guard after a capture attempt failed.
    pub fn release_capture(&mut self) {
        self.capture_in_flight = false;
    }

    /// Fresh state for a new or reopened slot.
    pub fn reset(&mut self) {
        self.counter.reset();
        self.capture_in_flight = false;
    }

    /// Ticks until a capture trigger fires and returns the triggering frame.
    ///
    /// Returns `Ok(None)` once `token` is cancelled. Detector loading and
    /// camera acquisition happen before the first tick, so a device failure
    /// means the loop never starts.
    pub async fn run_until_capture<S>(
        &mut self,
        source: &mut S,
        token: &CancellationToken,
        progress: Option<&UnboundedSender<TickReport>>,
    ) -> Result<Option<Frame>>
    where
        S: FrameSource + ?Sized,
    {
        if token.is_cancelled() {
            return Ok(None);
        }
        if !self.loaded {
            self.detector.load().await.map_err(|e| {
                tracing::error!("Face detector unavailable: {}", e);
                e
            })?;
            self.loaded = true;
        }
        source.open().await.map_err(|e| {
            tracing::error!("Camera unavailable: {}", e);
            e
        })?;

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: u64 = 0;

        loop {
            let (frame, report) = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::debug!(ticks, "Analyzer loop cancelled");
                    return Ok(None);
                }
                tick = async {
                    ticker.tick().await;
                    let frame = source.next_frame().await?;
                    let report = self.analyze(&frame).await?;
                    Ok::<_, crate::errors::Error>((frame, report))
                } => tick?,
            };
            ticks += 1;

            if let Some(tx) = progress {
                // A closed receiver only means nobody is watching.
                let _ = tx.send(report.clone());
            }
            if report.hint == Some(Hint::AmbiguousSubjects) {
                tracing::debug!(ticks, faces = report.face_count, "Ambiguous subjects in frame");
            }
            if report.capture {
                tracing::info!(ticks, "Stable face detected, capturing");
                return Ok(Some(frame));
            }
        }
    }
}
