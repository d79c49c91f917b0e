use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Preprocess = 0,
    PitchTracking = 1,
    Alignment = 2,
    Comparison = 3,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    /// 0.0..=1.0 within the stage.
    pub progress: f32,
}

/// Receives periodic progress events from the long-running loops.
///
/// Hosts with a cooperative scheduler yield from here; batch callers pass
/// [`NoopProgress`].
pub trait ProgressSink {
    fn on_progress(&mut self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressEvent),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event);
    }
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&mut self, _event: ProgressEvent) {}
}

pub(crate) fn emit(sink: &mut dyn ProgressSink, stage: ProgressStage, progress: f32) {
    sink.on_progress(ProgressEvent {
        stage,
        progress: progress.clamp(0.0, 1.0),
    });
}
