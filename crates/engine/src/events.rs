//! Step notifications for tracing and UIs.

use crate::state::RunState;
use crate::step::Step;
use tokio::sync::mpsc;

/// Emitted after a step completes.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub run_id: String,
    pub step: Step,
    /// Snapshot of the state the step produced
    pub state: RunState,
}

/// Receives step events. Observers cannot influence the run.
pub trait RunObserver: Send + Sync {
    fn on_step(&self, event: &StepEvent);
}

/// Forwards events into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StepEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RunObserver for ChannelObserver {
    fn on_step(&self, event: &StepEvent) {
        // A dropped receiver just means nobody is listening
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_step(&StepEvent {
            run_id: "r1".to_string(),
            step: Step::Retrieve,
            state: RunState::new("q"),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.step, Step::Retrieve);
        assert_eq!(event.run_id, "r1");
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_step(&StepEvent {
            run_id: "r1".to_string(),
            step: Step::Generate,
            state: RunState::new("q"),
        });
    }
}
