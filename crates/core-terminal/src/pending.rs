use std::time::Duration;

use core_events::CancelSignal;
use crossterm::event::{self, Event, KeyEventKind};
use tracing::{debug, warn};

/// Cancel signal raised by a key press waiting in the terminal input queue.
///
/// The key that interrupts is consumed. Other queued events (resize, mouse,
/// key releases) are drained and ignored; the driver re-reads the terminal
/// size after every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingInput;

impl CancelSignal for PendingInput {
    fn is_cancelled(&self) -> bool {
        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    warn!(target: "runtime", error = %e, "input_poll_failed");
                    return false;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    debug!(target: "runtime", code = ?key.code, "cancel_key");
                    return true;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(target: "runtime", error = %e, "input_read_failed");
                    return false;
                }
            }
        }
    }
}
