// Delivery tracking for outbound chat messages.
//
// Each message moves through Pending -> Sending -> Delivered, or drops to
// Failed from either non-terminal state. Delivered and Failed are terminal:
// a late or duplicate ack must never regress a message that already reached
// a terminal state.

use std::collections::HashMap;

use log::{debug, info};

use crate::models::{ChatMessage, DeliveryStatus};
use super::SessionEvent;

/// Ordered in-memory message log for the active conversation, indexed by
/// client-generated message id. Entries are never removed while the
/// conversation is alive.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    log: Vec<ChatMessage>,
    index: HashMap<String, usize>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        DeliveryTracker::default()
    }

    /// Record a locally-created outbound message before transmission.
    pub fn track(&mut self, message: ChatMessage) {
        self.index.insert(message.id.clone(), self.log.len());
        self.log.push(message);
    }

    /// Merge an inbound session event into the tracked statuses.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::NewMessage(message) => {
                // Peer messages arrive already delivered.
                self.index.insert(message.id.clone(), self.log.len());
                self.log.push(message.clone());
            }
            SessionEvent::MessageSentAck { local_id } => {
                self.transition(local_id, DeliveryStatus::Sending);
            }
            SessionEvent::DeliveryAck { local_id } => {
                self.transition(local_id, DeliveryStatus::Delivered);
            }
            SessionEvent::DeliveryFailed { local_id } => {
                self.transition(local_id, DeliveryStatus::Failed);
            }
        }
    }

    pub fn status(&self, id: &str) -> Option<DeliveryStatus> {
        self.index.get(id).map(|&i| self.log[i].delivery_status)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    fn transition(&mut self, id: &str, proposed: DeliveryStatus) {
        let Some(&slot) = self.index.get(id) else {
            debug!("Status update for unknown message id: {}", id);
            return;
        };
        let current = self.log[slot].delivery_status;
        match next_status(current, proposed) {
            Some(next) => {
                info!("Message {} status {:?} -> {:?}", id, current, next);
                self.log[slot].delivery_status = next;
            }
            None => {
                debug!(
                    "Ignoring {:?} for message {} already in {:?}",
                    proposed, id, current
                );
            }
        }
    }
}

/// Decide whether a proposed status may replace the current one.
/// Returns `None` when the update must be dropped.
fn next_status(current: DeliveryStatus, proposed: DeliveryStatus) -> Option<DeliveryStatus> {
    if current.is_terminal() {
        return None;
    }
    match proposed {
        // A server ack only moves a freshly created message forward; a
        // duplicate ack for a message already in flight is a no-op.
        DeliveryStatus::Sending if current == DeliveryStatus::Pending => Some(proposed),
        DeliveryStatus::Delivered | DeliveryStatus::Failed => Some(proposed),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    fn tracked(id: &str) -> DeliveryTracker {
        let mut tracker = DeliveryTracker::new();
        let mut message = ChatMessage::outbound("me", "b@x.com", "hi");
        message.id = id.to_string();
        tracker.track(message);
        tracker
    }

    #[test]
    fn ack_moves_pending_to_sending() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::MessageSentAck {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Sending));
    }

    #[test]
    fn delivered_is_terminal_against_late_ack() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::DeliveryAck {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Delivered));

        // Out-of-order ack arrives after delivery confirmation.
        tracker.apply(&SessionEvent::MessageSentAck {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Delivered));
    }

    #[test]
    fn delivered_is_terminal_against_failure_signal() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::DeliveryAck {
            local_id: "id1".to_string(),
        });
        tracker.apply(&SessionEvent::DeliveryFailed {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Delivered));
    }

    #[test]
    fn pending_and_sending_can_fail() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::DeliveryFailed {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Failed));

        let mut tracker = tracked("id2");
        tracker.apply(&SessionEvent::MessageSentAck {
            local_id: "id2".to_string(),
        });
        tracker.apply(&SessionEvent::DeliveryFailed {
            local_id: "id2".to_string(),
        });
        assert_eq!(tracker.status("id2"), Some(DeliveryStatus::Failed));
    }

    #[test]
    fn failed_is_terminal_against_delivery_ack() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::DeliveryFailed {
            local_id: "id1".to_string(),
        });
        tracker.apply(&SessionEvent::DeliveryAck {
            local_id: "id1".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Failed));
    }

    #[test]
    fn events_for_unknown_ids_are_ignored() {
        let mut tracker = tracked("id1");
        tracker.apply(&SessionEvent::DeliveryAck {
            local_id: "other".to_string(),
        });
        assert_eq!(tracker.status("id1"), Some(DeliveryStatus::Pending));
        assert_eq!(tracker.status("other"), None);
    }

    #[test]
    fn inbound_messages_join_the_log_as_delivered() {
        let mut tracker = tracked("id1");
        let mut inbound = ChatMessage::outbound("b@x.com", "me", "hey");
        inbound.delivery_status = DeliveryStatus::Delivered;
        tracker.apply(&SessionEvent::NewMessage(inbound.clone()));
        assert_eq!(tracker.messages().len(), 2);
        assert_eq!(tracker.status(&inbound.id), Some(DeliveryStatus::Delivered));
    }
}
