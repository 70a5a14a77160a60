use tracing::info;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stage {
    Vectorize,
    Upload,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vectorize => "vectorize",
            Self::Upload => "upload",
        }
    }
}

/// Batch counters emitted after each completed batch of a stage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub completed_batches: usize,
    pub total_batches: usize,
    pub completed_items: usize,
    pub total_items: usize,
}

pub trait ProgressObserver {
    fn on_progress(&mut self, event: ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: FnMut(ProgressEvent),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Default observer used by the CLI; one log line per batch.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl ProgressObserver for TracingProgress {
    fn on_progress(&mut self, event: ProgressEvent) {
        info!(
            stage = event.stage.as_str(),
            batch = event.completed_batches,
            total_batches = event.total_batches,
            items = event.completed_items,
            total_items = event.total_items,
            "batch completed"
        );
    }
}

pub(crate) fn batch_count(items: usize, batch_size: usize) -> usize {
    items.div_ceil(batch_size.max(1))
}
