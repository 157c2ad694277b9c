// FaceCube — Notification Dispatcher
//
// Decides, per event, where a packet goes:
//   - Face switches prefer the dedicated face characteristic (single value,
//     cheap for clients that only care about the latest face) and fall back
//     to the generic event characteristic so a client that connects later
//     still observes the transition.  At most once per transition — a
//     disconnected peer simply misses it; the state sync compensates.
//   - One state sync per connection, fired after a grace delay so the peer
//     has time to finish subscribing.
//   - Everything else goes straight to the generic event characteristic.

use crate::config::SYNC_GRACE_MS;
use crate::events::Face;
use crate::protocol::{EventPacket, EVENT_FACE_SWITCH, EVENT_STATE_SYNC};

/// Transport seam.  Implemented by the BLE layer; `false` means the packet
/// was not delivered (no connection or no subscriber) — never an error the
/// caller reacts to beyond choosing a fallback.
pub trait EventLink {
    /// Notify the dedicated face characteristic.
    fn notify_face(&self, packet: &EventPacket) -> bool;
    /// Notify the generic event characteristic.
    fn notify_event(&self, packet: &EventPacket) -> bool;
    /// Refresh the standard battery-service level.
    fn set_battery_level(&self, pct: u8);
}

pub struct Dispatcher<L: EventLink> {
    link: L,
    /// Uptime at which a pending state sync becomes due.
    sync_due_ms: Option<i64>,
}

impl<L: EventLink> Dispatcher<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            sync_due_ms: None,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Connect callback: arm (or re-arm, superseding any pending) state sync.
    pub fn on_connected(&mut self, now_ms: i64) {
        self.sync_due_ms = Some(now_ms + SYNC_GRACE_MS);
    }

    /// Disconnect callback: a sync that never fired is abandoned.
    pub fn on_disconnected(&mut self) {
        self.sync_due_ms = None;
    }

    /// Generic emit path for boot/battery/session events.
    pub fn emit(&self, packet: EventPacket) {
        if !self.link.notify_event(&packet) {
            log::debug!("event 0x{:02x} dropped (no peer)", packet.event_type);
        }
    }

    /// Emit a committed face switch, preferring the dedicated characteristic.
    pub fn emit_face_switch(&self, face: Face) {
        let packet = EventPacket::new(EVENT_FACE_SWITCH, 0, face.id());
        if !self.link.notify_face(&packet) {
            self.emit(packet);
        }
    }

    /// Fire the pending state sync once its grace delay has elapsed.
    /// `session_delta_s` lets the peer reconstruct when the session began
    /// even though it missed the original face-switch event.
    pub fn service_sync(&mut self, now_ms: i64, face: Face, session_delta_s: u32) {
        match self.sync_due_ms {
            Some(due) if now_ms >= due => {}
            _ => return,
        }
        self.sync_due_ms = None;
        log::info!("state sync: face={} session={}s", face.id(), session_delta_s);
        self.emit(EventPacket::new(EVENT_STATE_SYNC, session_delta_s, face.id()));
    }

    pub fn set_battery_level(&self, pct: u8) {
        self.link.set_battery_level(pct);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Recording link with a switchable face-characteristic subscriber.
    struct MockLink {
        face_subscribed: bool,
        connected: bool,
        face_sent: RefCell<Vec<EventPacket>>,
        event_sent: RefCell<Vec<EventPacket>>,
    }

    impl MockLink {
        fn new(connected: bool, face_subscribed: bool) -> Self {
            Self {
                face_subscribed,
                connected,
                face_sent: RefCell::new(Vec::new()),
                event_sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl EventLink for MockLink {
        fn notify_face(&self, packet: &EventPacket) -> bool {
            if self.connected && self.face_subscribed {
                self.face_sent.borrow_mut().push(*packet);
                return true;
            }
            false
        }

        fn notify_event(&self, packet: &EventPacket) -> bool {
            if self.connected {
                self.event_sent.borrow_mut().push(*packet);
                return true;
            }
            false
        }

        fn set_battery_level(&self, _pct: u8) {}
    }

    #[test]
    fn face_switch_uses_dedicated_characteristic_when_subscribed() {
        let d = Dispatcher::new(MockLink::new(true, true));
        d.emit_face_switch(Face::Two);
        assert_eq!(d.link().face_sent.borrow().len(), 1);
        assert!(d.link().event_sent.borrow().is_empty());
        let sent = d.link().face_sent.borrow()[0];
        assert_eq!(sent, EventPacket::new(EVENT_FACE_SWITCH, 0, 2));
    }

    #[test]
    fn face_switch_falls_back_to_generic_characteristic() {
        let d = Dispatcher::new(MockLink::new(true, false));
        d.emit_face_switch(Face::Five);
        assert!(d.link().face_sent.borrow().is_empty());
        assert_eq!(d.link().event_sent.borrow().len(), 1);
    }

    #[test]
    fn face_switch_is_a_noop_without_a_peer() {
        let d = Dispatcher::new(MockLink::new(false, false));
        d.emit_face_switch(Face::One);
        assert!(d.link().face_sent.borrow().is_empty());
        assert!(d.link().event_sent.borrow().is_empty());
    }

    #[test]
    fn state_sync_fires_once_after_grace() {
        let mut d = Dispatcher::new(MockLink::new(true, true));
        d.on_connected(1000);

        // Before the grace delay: nothing.
        d.service_sync(1000 + SYNC_GRACE_MS - 1, Face::Three, 41);
        assert!(d.link().event_sent.borrow().is_empty());

        // At the deadline: exactly one sync with the session age.
        d.service_sync(1000 + SYNC_GRACE_MS, Face::Three, 42);
        assert_eq!(
            *d.link().event_sent.borrow(),
            vec![EventPacket::new(EVENT_STATE_SYNC, 42, 3)]
        );

        // Never a second one for the same connection.
        d.service_sync(1000 + SYNC_GRACE_MS + 60_000, Face::Three, 102);
        assert_eq!(d.link().event_sent.borrow().len(), 1);
    }

    #[test]
    fn reconnect_supersedes_pending_sync() {
        let mut d = Dispatcher::new(MockLink::new(true, true));
        d.on_connected(0);
        // Peer drops and reconnects before the first sync was due.
        d.on_connected(500);
        d.service_sync(SYNC_GRACE_MS, Face::One, 1); // old deadline — not yet
        assert!(d.link().event_sent.borrow().is_empty());
        d.service_sync(500 + SYNC_GRACE_MS, Face::One, 1);
        assert_eq!(d.link().event_sent.borrow().len(), 1);
    }

    #[test]
    fn disconnect_clears_pending_sync() {
        let mut d = Dispatcher::new(MockLink::new(true, true));
        d.on_connected(0);
        d.on_disconnected();
        d.service_sync(SYNC_GRACE_MS * 2, Face::One, 1);
        assert!(d.link().event_sent.borrow().is_empty());
    }
}
