//! In-process event bus for run progress.

use std::sync::mpsc::{channel, Receiver, SendError, Sender};

use tracing::trace;

use crate::progress::event::RunEvent;

#[derive(Clone)]
pub struct ProgressBus {
    sender: Sender<RunEvent>,
}

impl ProgressBus {
    pub fn new_pair() -> (Self, Receiver<RunEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) -> Result<(), SendError<RunEvent>> {
        self.sender.send(event)
    }

    /// Emit without failing the caller when nobody is listening.
    pub fn emit_best_effort(&self, event: RunEvent) {
        if let Err(SendError(event)) = self.emit(event) {
            trace!(event_type = event.event_type(), "Progress receiver dropped");
        }
    }
}
