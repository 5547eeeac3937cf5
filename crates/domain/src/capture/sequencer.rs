use cqrs_es::{Aggregate, DomainEvent};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::config::AnalyzerConfig;
use crate::errors::{Error, Result};

use super::analyzer::{FaceDetector, FrameAnalyzer, FrameSource, TickReport};
use super::{CaptureSession, CaptureSlot, Command, Frame, Services, SlotKind, SlotSpec};

/// Walks a capture session slot by slot, auto-capturing biometric slots
/// through the frame analyzer and taking document slots manually.
pub struct CaptureSequencer<D, S> {
    session: CaptureSession,
    services: Services,
    analyzer: FrameAnalyzer<D>,
    source: S,
    view_token: CancellationToken,
    progress: Option<UnboundedSender<TickReport>>,
}

impl<D, S> CaptureSequencer<D, S>
where
    D: FaceDetector,
    S: FrameSource,
{
    pub fn new(detector: D, source: S, config: &AnalyzerConfig, services: Services) -> Self {
        Self {
            session: CaptureSession::default(),
            services,
            analyzer: FrameAnalyzer::new(detector, config),
            source,
            view_token: CancellationToken::new(),
            progress: None,
        }
    }

    /// Publish every analyzer tick to `tx`.
    pub fn with_progress(mut self, tx: UnboundedSender<TickReport>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Token cancelled when the capture view goes away; cancelling it from
    /// outside tears down a running analyzer loop.
    pub fn view_token(&self) -> CancellationToken {
        self.view_token.clone()
    }

    pub async fn start(&mut self, slots: Vec<SlotSpec>) -> Result<String> {
        let id = Ulid::new().to_string();
        self.execute(Command::StartSession { id: id.clone(), slots }).await?;
        tracing::info!(
            session_id = %id,
            slots = self.session.slots.len(),
            "Capture session started"
        );
        Ok(id)
    }

    /// Stores `image` in the slot at the pointer.
    pub async fn capture(&mut self, slot_id: &str, image: Frame) -> Result<()> {
        self.execute(Command::CaptureImage { slot_id: slot_id.to_string(), image }).await?;
        tracing::info!(slot_id, pointer = self.session.pointer, "Slot captured");
        Ok(())
    }

    /// Reopens a filled slot. Biometric slots get a fresh analyzer state so
    /// the next [`auto_capture`](Self::auto_capture) starts counting from zero.
    pub async fn retake(&mut self, slot_id: &str) -> Result<()> {
        self.execute(Command::RetakeSlot { slot_id: slot_id.to_string() }).await?;
        if self.current_slot().map(|s| s.kind) == Some(SlotKind::Biometric) {
            self.analyzer.reset();
            tracing::info!(slot_id, "Slot reopened, analyzer restarted");
        } else {
            tracing::info!(slot_id, "Slot reopened for manual capture");
        }
        Ok(())
    }

    /// Runs the analyzer for the biometric slot at the pointer and captures
    /// the frame that triggered. Returns the filled slot id, or `None` if the
    /// view was dismissed first.
    pub async fn auto_capture(&mut self) -> Result<Option<String>> {
        let slot = self
            .current_slot()
            .cloned()
            .ok_or_else(|| Error::validation("no slot awaiting capture"))?;
        if slot.kind != SlotKind::Biometric {
            return Err(Error::validation(format!(
                "slot {} is a {} slot and needs a manual capture",
                slot.id, slot.kind
            )));
        }

        let slot_token = self.view_token.child_token();
        let outcome = self
            .analyzer
            .run_until_capture(&mut self.source, &slot_token, self.progress.as_ref())
            .await;
        slot_token.cancel();

        let frame = match outcome {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.analyzer.reset();
                return Err(err);
            }
        };

        match self.capture(&slot.id, frame).await {
            Ok(()) => {
                self.analyzer.reset();
                Ok(Some(slot.id))
            }
            Err(err) => {
                tracing::warn!(slot_id = %slot.id, "Auto capture rejected: {}", err);
                self.analyzer.release_capture();
                Err(err)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.session.is_complete()
    }

    pub fn current_slot(&self) -> Option<&CaptureSlot> {
        self.session.current_slot()
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    pub fn analyzer(&self) -> &FrameAnalyzer<D> {
        &self.analyzer
    }

    /// Hands the finished session over for submission.
    pub fn finish(self) -> Result<CaptureSession> {
        if !self.session.is_complete() {
            return Err(Error::validation("capture session is not complete"));
        }
        self.view_token.cancel();
        Ok(self.session)
    }

    /// Tears down any analyzer loop and drops the session unsaved.
    pub fn dismiss(self) {
        self.view_token.cancel();
        tracing::info!(session_id = %self.session.id, "Capture session discarded");
    }

    async fn execute(&mut self, command: Command) -> Result<()> {
        let events = self.session.handle(command, &self.services).await?;
        for event in events {
            tracing::debug!(event_type = %event.event_type(), "Applying capture event");
            self.session.apply(event);
        }
        Ok(())
    }
}
