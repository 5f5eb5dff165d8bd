//! The acquire, convert and fan-out loop.
//!
//! [`Pipeline`] owns the capture source, the converter and every sink. It
//! opens them in order on `start`, relays one frame per `step`, and tears
//! everything down in reverse order exactly once, whichever path asks first.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::capture::{CaptureDevice, CaptureSource, TestPatternDevice};
use crate::convert::{FrameConverter, FrameTarget, PixelBuffer};
use crate::diagnostics::RelayStats;
use crate::error::{RelayError, Result};
use crate::settings::{RelayConfig, SourceKind};
use crate::sink::{
    negotiate_format, OutputFormat, PreviewSink, Sink, SinkDescriptor, VirtualDeviceSink,
};

use super::shutdown::{ShutdownController, ShutdownReason};
use super::state::{PipelineState, StateCell, StateHandle};

/// What the loop should do after one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Drain,
}

#[derive(Debug, Default, Clone, Copy)]
struct SinkStatus {
    open: bool,
    degraded: bool,
}

pub struct Pipeline {
    source: CaptureSource,
    sinks: Vec<Box<dyn Sink>>,
    status: Vec<SinkStatus>,
    converter: Option<FrameConverter>,
    capture_timeout: Duration,
    controller: Arc<ShutdownController>,
    state: StateCell,
    stats: RelayStats,
}

impl Pipeline {
    /// Assemble a pipeline. Nothing is opened until [`Pipeline::start`].
    pub fn new(
        device: Box<dyn CaptureDevice>,
        sinks: Vec<Box<dyn Sink>>,
        capture_timeout: Duration,
        controller: Arc<ShutdownController>,
    ) -> Self {
        let status = vec![SinkStatus::default(); sinks.len()];
        Self {
            source: CaptureSource::new(device),
            sinks,
            status,
            converter: None,
            capture_timeout,
            controller,
            state: StateCell::new(),
            stats: RelayStats::new(),
        }
    }

    /// Build the capture device and sinks described by `config`.
    pub fn from_config(config: &RelayConfig, controller: Arc<ShutdownController>) -> Result<Self> {
        let device = capture_device(config.source)?;
        let sinks = config.sinks.iter().cloned().map(build_sink).collect();
        Ok(Self::new(device, sinks, config.capture_timeout, controller))
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Read-only view of the state for other threads.
    pub fn state_handle(&self) -> StateHandle {
        self.state.handle()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn controller(&self) -> &Arc<ShutdownController> {
        &self.controller
    }

    /// Open the capture device and every sink, then start grabbing.
    ///
    /// On failure everything opened so far is closed again in reverse order
    /// and the pipeline ends up `Closed`.
    pub fn start(&mut self) -> Result<()> {
        self.require("start", PipelineState::Uninitialized)?;
        if let Err(e) = self.open_all() {
            error!("{e}");
            self.shutdown();
            return Err(e);
        }
        self.state.advance(PipelineState::Opened);
        self.state.advance(PipelineState::Grabbing);
        Ok(())
    }

    fn open_all(&mut self) -> Result<()> {
        let format = negotiate_format(&self.sinks)
            .map_err(|e| RelayError::init_failed("format negotiation", e))?;
        let size = self.required_size()?;

        let device = format!("capture device {}", self.source.name());
        self.source
            .open()
            .map_err(|e| RelayError::init_failed(device.as_str(), e))?;
        let actual = self
            .source
            .configure_format(format)
            .map_err(|e| RelayError::init_failed(device.as_str(), e))?;

        let output = OutputFormat {
            pixel_format: format,
            size: size.or(actual.size()),
        };
        debug!(
            "canonical output {} {:?}, capture {:?} {}",
            output.pixel_format, output.size, actual.stream, actual.layout
        );
        self.converter = Some(FrameConverter::new(FrameTarget {
            format: output.pixel_format,
            size: output.size,
        }));

        for (index, (sink, status)) in self.sinks.iter_mut().zip(&mut self.status).enumerate() {
            sink.open(&output).map_err(|e| {
                RelayError::init_failed(format!("sink #{} ({})", index + 1, sink.name()), e)
            })?;
            status.open = true;
            info!("opened sink #{} ({})", index + 1, sink.name());
        }

        self.source
            .start()
            .map_err(|e| RelayError::init_failed(device.as_str(), e))
    }

    /// The single explicit output size the sinks ask for, if any.
    fn required_size(&self) -> Result<Option<(u32, u32)>> {
        let mut sizes = self.sinks.iter().filter_map(|s| s.required_size());
        let Some(first) = sizes.next() else {
            return Ok(None);
        };
        if let Some(other) = sizes.find(|size| *size != first) {
            return Err(RelayError::init_failed(
                "output size",
                RelayError::Config(format!(
                    "sinks disagree on output size: {}x{} vs {}x{}",
                    first.0, first.1, other.0, other.1
                )),
            ));
        }
        Ok(Some(first))
    }

    /// Relay one frame.
    ///
    /// Returns [`StepOutcome::Drain`] once shutdown has been requested, be it
    /// by a quit key, a fatal capture error, every sink failing, or an
    /// external trigger on the controller.
    pub fn step(&mut self) -> Result<StepOutcome> {
        self.require("step", PipelineState::Grabbing)?;
        if self.controller.is_requested() {
            return Ok(StepOutcome::Drain);
        }

        let raw = match self.source.retrieve_frame(self.capture_timeout) {
            Ok(raw) => raw,
            Err(e @ RelayError::CaptureTimeout { .. }) => {
                self.stats.record_timeout();
                debug!("{}: {e}", self.source.name());
                return Ok(StepOutcome::Continue);
            }
            Err(e) if e.is_frame_recoverable() => {
                self.stats.record_skip();
                debug!("{}: skipping frame: {e}", self.source.name());
                return Ok(StepOutcome::Continue);
            }
            Err(e) => {
                error!("{}: {e}", self.source.name());
                self.controller
                    .trigger(ShutdownReason::CaptureFailed(e.to_string()));
                return Ok(StepOutcome::Drain);
            }
        };
        self.stats.record_capture();

        let Some(converter) = self.converter.as_ref() else {
            return Err(self.invalid("step"));
        };
        let sequence = raw.sequence;
        let buffer = match converter.convert(raw) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.record_skip();
                debug!("skipping frame {sequence}: {e}");
                return Ok(StepOutcome::Continue);
            }
        };

        self.fan_out(&buffer);

        if self.controller.is_requested() {
            Ok(StepOutcome::Drain)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    /// Push to every healthy sink in order. A quit key only takes effect
    /// after the remaining sinks have had the frame.
    fn fan_out(&mut self, buffer: &PixelBuffer) {
        let mut quit = false;
        let mut delivered = false;
        for (index, (sink, status)) in self.sinks.iter_mut().zip(&mut self.status).enumerate() {
            if !status.open || status.degraded {
                continue;
            }
            match sink.push(buffer) {
                Ok(outcome) => {
                    delivered = true;
                    if outcome.quit_requested() {
                        info!("sink #{} ({}) requested quit", index + 1, sink.name());
                        quit = true;
                    }
                }
                Err(e) => {
                    warn!("sink #{} ({}) degraded: {e}", index + 1, sink.name());
                    status.degraded = true;
                    self.stats.record_sink_failure();
                }
            }
        }
        if delivered {
            self.stats.record_relay();
        }

        if quit {
            self.controller.trigger(ShutdownReason::QuitKey);
        }
        if self.status.iter().all(|s| s.degraded) {
            error!("every sink has failed");
            self.controller.trigger(ShutdownReason::SinksExhausted);
        }
    }

    /// Start if needed, relay until shutdown is requested, then tear down.
    pub fn run(&mut self) -> Result<ShutdownReason> {
        if self.state.get() == PipelineState::Uninitialized {
            self.start()?;
        }
        self.require("run", PipelineState::Grabbing)?;
        while self.step()? == StepOutcome::Continue {}
        self.shutdown();
        Ok(self
            .controller
            .reason()
            .unwrap_or(ShutdownReason::Terminated))
    }

    /// Close every sink in reverse order, then the capture device.
    ///
    /// Runs at most once per controller; later calls do nothing.
    pub fn shutdown(&mut self) {
        if !self.controller.claim_teardown() {
            return;
        }
        self.state.advance(PipelineState::Draining);

        for (index, (sink, status)) in self
            .sinks
            .iter_mut()
            .zip(&mut self.status)
            .enumerate()
            .rev()
        {
            if !status.open {
                continue;
            }
            status.open = false;
            match sink.close() {
                Ok(()) => debug!("closed sink #{} ({})", index + 1, sink.name()),
                Err(e) => warn!("failed to close sink #{} ({}): {e}", index + 1, sink.name()),
            }
        }
        self.source.close();
        self.converter = None;
        self.state.advance(PipelineState::Closed);

        match serde_json::to_string(&self.stats.snapshot()) {
            Ok(json) => info!("relay stats: {json}"),
            Err(e) => debug!("failed to serialise stats: {e}"),
        }
    }

    fn require(&self, operation: &'static str, expected: PipelineState) -> Result<()> {
        match self.state.get() {
            PipelineState::Closed => Err(RelayError::PipelineClosed),
            state if state == expected => Ok(()),
            _ => Err(self.invalid(operation)),
        }
    }

    fn invalid(&self, operation: &'static str) -> RelayError {
        RelayError::InvalidState {
            operation,
            state: self.state.get().as_str(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_device(source: SourceKind) -> Result<Box<dyn CaptureDevice>> {
    if TestPatternDevice::is_enabled() {
        return Ok(Box::new(TestPatternDevice::new()));
    }
    match source {
        SourceKind::TestPattern => Ok(Box::new(TestPatternDevice::new())),
        SourceKind::Canon => canon_device(),
    }
}

#[cfg(feature = "canon")]
fn canon_device() -> Result<Box<dyn CaptureDevice>> {
    use crate::capture::canon::sdk::EdsSdk;
    use crate::capture::canon::CanonCapture;

    let sdk = EdsSdk::new().map_err(|e| {
        RelayError::init_failed("capture device canon", RelayError::DeviceUnavailable(e.to_string()))
    })?;
    Ok(Box::new(CanonCapture::new(Arc::new(sdk))))
}

#[cfg(not(feature = "canon"))]
fn canon_device() -> Result<Box<dyn CaptureDevice>> {
    Err(RelayError::init_failed(
        "capture device canon",
        RelayError::DeviceUnavailable("built without the canon feature".to_string()),
    ))
}

fn build_sink(descriptor: SinkDescriptor) -> Box<dyn Sink> {
    match descriptor {
        SinkDescriptor::Virtual(config) => Box::new(VirtualDeviceSink::from_config(config)),
        SinkDescriptor::Preview(config) => Box::new(PreviewSink::from_config(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mock::MockCaptureDevice;
    use crate::sink::mock::MockSink;
    use crate::testing::{init_test_tracing, CallLog};

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn pipeline(device: MockCaptureDevice, sinks: Vec<MockSink>) -> Pipeline {
        init_test_tracing();
        Pipeline::new(
            Box::new(device),
            sinks
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn Sink>)
                .collect(),
            TIMEOUT,
            Arc::new(ShutdownController::new()),
        )
    }

    #[test]
    fn start_enters_grabbing() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![MockSink::new("a", &log)],
        );
        assert_eq!(p.state(), PipelineState::Uninitialized);
        p.start().unwrap();
        assert_eq!(p.state(), PipelineState::Grabbing);
        assert_eq!(log.opens("cam"), 1);
        assert_eq!(log.opens("a"), 1);
    }

    #[test]
    fn start_twice_is_invalid() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![MockSink::new("a", &log)],
        );
        p.start().unwrap();
        assert!(matches!(
            p.start(),
            Err(RelayError::InvalidState {
                operation: "start",
                state: "grabbing"
            })
        ));
    }

    #[test]
    fn step_before_start_is_invalid() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![MockSink::new("a", &log)],
        );
        assert!(matches!(p.step(), Err(RelayError::InvalidState { .. })));
    }

    #[test]
    fn negotiation_failure_opens_nothing() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![
                MockSink::new("rgb", &log).accepting(&[crate::convert::PixelFormat::Rgb8]),
                MockSink::new("bgr", &log).accepting(&[crate::convert::PixelFormat::Bgr8]),
            ],
        );
        let err = p.start().unwrap_err();
        match err {
            RelayError::PipelineInitFailed { source, .. } => {
                assert!(matches!(*source, RelayError::UnsupportedFormat(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(log.calls().is_empty());
        assert_eq!(p.state(), PipelineState::Closed);
    }

    #[test]
    fn conflicting_sizes_fail_before_opening() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![
                MockSink::new("a", &log).requiring_size(640, 480),
                MockSink::new("b", &log).requiring_size(320, 240),
            ],
        );
        assert!(matches!(
            p.start(),
            Err(RelayError::PipelineInitFailed { .. })
        ));
        assert_eq!(log.opens("cam"), 0);
    }

    #[test]
    fn capture_open_failure_names_the_device() {
        let log = CallLog::new();
        let device = MockCaptureDevice::new("cam", &log)
            .with_open_error(RelayError::DeviceUnavailable("no cameras".to_string()));
        let mut p = pipeline(device, vec![MockSink::new("a", &log)]);
        let msg = p.start().unwrap_err().to_string();
        assert!(msg.contains("capture device cam"), "{msg}");
        assert_eq!(log.opens("a"), 0);
    }

    #[test]
    fn frames_are_resized_to_required_size() {
        let log = CallLog::new();
        let sink = MockSink::new("a", &log).requiring_size(8, 4);
        let probe = sink.probe();
        let mut p = pipeline(MockCaptureDevice::new("cam", &log).with_frames(1), vec![sink]);
        p.start().unwrap();
        assert_eq!(p.step().unwrap(), StepOutcome::Continue);
        assert_eq!(probe.opened_with().unwrap().size, Some((8, 4)));
        assert_eq!(
            probe.frames(),
            vec![(8, 4, crate::convert::PixelFormat::Rgb8)]
        );
    }

    #[test]
    fn degraded_sink_is_skipped_but_still_closed() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log).with_frames(3),
            vec![
                MockSink::new("flaky", &log).failing_push_from(1),
                MockSink::new("steady", &log),
            ],
        );
        p.start().unwrap();
        for _ in 0..3 {
            assert_eq!(p.step().unwrap(), StepOutcome::Continue);
        }
        assert_eq!(log.pushes("flaky"), 1);
        assert_eq!(log.pushes("steady"), 3);
        assert_eq!(p.stats().sink_failures(), 1);

        p.shutdown();
        assert_eq!(log.closes("flaky"), 1);
        assert_eq!(log.closes("steady"), 1);
    }

    #[test]
    fn all_sinks_failing_drains() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log).with_frames(5),
            vec![MockSink::new("a", &log).failing_push_from(2)],
        );
        let reason = p.run().unwrap();
        assert_eq!(reason, ShutdownReason::SinksExhausted);
        assert_eq!(log.pushes("a"), 2);
        assert_eq!(p.state(), PipelineState::Closed);
    }

    #[test]
    fn external_trigger_drains_at_next_boundary() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log).with_frames(10),
            vec![MockSink::new("a", &log)],
        );
        p.start().unwrap();
        p.step().unwrap();
        p.controller().trigger(ShutdownReason::Terminated);
        assert_eq!(p.step().unwrap(), StepOutcome::Drain);
        assert_eq!(log.pushes("a"), 1);
    }

    #[test]
    fn operations_after_close_fail() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![MockSink::new("a", &log)],
        );
        p.start().unwrap();
        p.shutdown();
        assert!(matches!(p.step(), Err(RelayError::PipelineClosed)));
        assert!(matches!(p.start(), Err(RelayError::PipelineClosed)));
        assert!(matches!(p.run(), Err(RelayError::PipelineClosed)));
    }

    #[test]
    fn drop_tears_down_once() {
        let log = CallLog::new();
        {
            let mut p = pipeline(
                MockCaptureDevice::new("cam", &log),
                vec![MockSink::new("a", &log), MockSink::new("b", &log)],
            );
            p.start().unwrap();
            p.shutdown();
        }
        assert_eq!(log.close_order(), vec!["b", "a", "cam"]);
    }

    #[test]
    fn close_errors_do_not_stop_teardown() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log),
            vec![
                MockSink::new("a", &log),
                MockSink::new("b", &log).failing_close("stuck"),
            ],
        );
        p.start().unwrap();
        p.shutdown();
        assert_eq!(log.close_order(), vec!["b", "a", "cam"]);
    }

    #[test]
    fn state_handle_sees_closed() {
        let log = CallLog::new();
        let mut p = pipeline(
            MockCaptureDevice::new("cam", &log).with_frames(1),
            vec![MockSink::new("a", &log).quitting_on_push(1)],
        );
        let handle = p.state_handle();
        assert_eq!(p.run().unwrap(), ShutdownReason::QuitKey);
        assert_eq!(handle.get(), PipelineState::Closed);
    }
}
