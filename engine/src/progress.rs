//! Progress delivery to the presentation layer.

use tokio::sync::mpsc;

use crate::AggregateState;

/// Receives a snapshot after every processed possession, in collection order.
pub trait ProgressSink {
    fn on_progress(&mut self, snapshot: AggregateState);
}

impl<F> ProgressSink for F
where
    F: FnMut(AggregateState),
{
    fn on_progress(&mut self, snapshot: AggregateState) {
        self(snapshot);
    }
}

/// Forwards snapshots over a channel, for renderers living in another task.
///
/// A closed receiver is not an error: the run carries on without an audience.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<AggregateState>);

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<AggregateState>) -> Self {
        Self(tx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&mut self, snapshot: AggregateState) {
        if self.0.send(snapshot).is_err() {
            tracing::trace!("Progress receiver dropped");
        }
    }
}
