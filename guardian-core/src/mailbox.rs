use crate::Command;

/// Single-slot holder of the next relay command for the device.
///
/// Enqueueing overwrites whatever is still unread; the device polls often
/// enough that delivery is at-most-once per intent rather than queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mailbox {
    slot: Option<Command>,
}

impl Mailbox {
    /// Store `command`, returning the unread command it replaced.
    pub fn enqueue(&mut self, command: Command) -> Option<Command> {
        self.slot.replace(command)
    }

    /// Take the pending command, leaving the slot empty.
    pub fn drain(&mut self) -> Option<Command> {
        self.slot.take()
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn peek(&self) -> Option<Command> {
        self.slot
    }
}
