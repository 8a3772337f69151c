//! Precedence of manual decisions over the automatic countdown.
//!
//! A recognized decision always cancels any running countdown, so the last
//! operator action wins over whatever the timer was about to do.

use crate::{Command, Decision, DecisionKind, DeviceStatus, Event};

impl DeviceStatus {
    /// Apply an operator decision. Unknown kinds leave the record untouched
    /// and return `None`.
    pub fn apply(&mut self, decision: &Decision) -> Option<Event> {
        match decision.kind {
            DecisionKind::KeepPower => {
                self.countdown.cancel();
                self.relay_active = true;
                self.mailbox.enqueue(Command::RelayOn);
                Some(Event::KeepPower)
            }
            DecisionKind::PowerOff => {
                self.countdown.cancel();
                self.relay_active = false;
                self.mailbox.enqueue(Command::RelayOff);
                Some(Event::PowerOff)
            }
            DecisionKind::Reset => {
                self.countdown.cancel();
                self.motion_detected = false;
                self.relay_active = false;
                self.mailbox.clear();
                Some(Event::Reset)
            }
            DecisionKind::Unknown(_) => None,
        }
    }
}
