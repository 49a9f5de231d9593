//! Half-duplex audio stream controller
//!
//! The device may transmit or receive voice audio at any instant, never
//! both. The controller holds one direction value under a single lock;
//! an illegal "both directions" state cannot be represented at all.

use parking_lot::Mutex;
use tracing::debug;

/// Which way audio is currently flowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamDirection {
    Idle,
    Sending,
    Receiving,
}

/// Enforces half-duplex exclusion between the send and receive streams
#[derive(Debug)]
pub struct StreamController {
    direction: Mutex<StreamDirection>,
}

impl StreamController {
    pub fn new() -> Self {
        Self {
            direction: Mutex::new(StreamDirection::Idle),
        }
    }

    /// Claim the send direction. Succeeds iff the receive stream is not
    /// active; returns false without side effect otherwise.
    pub fn try_start_sending(&self) -> bool {
        let mut direction = self.direction.lock();
        match *direction {
            StreamDirection::Receiving => {
                debug!("send stream refused: receive stream active");
                false
            }
            _ => {
                *direction = StreamDirection::Sending;
                true
            }
        }
    }

    /// Release the send direction. Idempotent.
    pub fn stop_sending(&self) {
        let mut direction = self.direction.lock();
        if *direction == StreamDirection::Sending {
            *direction = StreamDirection::Idle;
        }
    }

    /// Claim the receive direction. Succeeds iff the send stream is not
    /// active; returns false without side effect otherwise.
    pub fn try_start_receiving(&self) -> bool {
        let mut direction = self.direction.lock();
        match *direction {
            StreamDirection::Sending => {
                debug!("receive stream refused: send stream active");
                false
            }
            _ => {
                *direction = StreamDirection::Receiving;
                true
            }
        }
    }

    /// Release the receive direction. Idempotent.
    pub fn stop_receiving(&self) {
        let mut direction = self.direction.lock();
        if *direction == StreamDirection::Receiving {
            *direction = StreamDirection::Idle;
        }
    }

    pub fn is_sending(&self) -> bool {
        *self.direction.lock() == StreamDirection::Sending
    }

    pub fn is_receiving(&self) -> bool {
        *self.direction.lock() == StreamDirection::Receiving
    }
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_send_excludes_receive() {
        let streams = StreamController::new();
        assert!(streams.try_start_sending());
        assert!(streams.is_sending());
        assert!(!streams.try_start_receiving());
        assert!(!streams.is_receiving());
        assert!(streams.is_sending());
    }

    #[test]
    fn test_receive_excludes_send() {
        let streams = StreamController::new();
        assert!(streams.try_start_receiving());
        assert!(!streams.try_start_sending());
        assert!(streams.is_receiving());
        assert!(!streams.is_sending());
    }

    #[test]
    fn test_direction_can_flip_after_stop() {
        let streams = StreamController::new();
        assert!(streams.try_start_sending());
        streams.stop_sending();
        assert!(streams.try_start_receiving());
        streams.stop_receiving();
        assert!(streams.try_start_sending());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let streams = StreamController::new();
        streams.stop_sending();
        streams.stop_receiving();
        assert!(!streams.is_sending());
        assert!(!streams.is_receiving());

        assert!(streams.try_start_sending());
        streams.stop_sending();
        streams.stop_sending();
        assert!(!streams.is_sending());
    }

    #[test]
    fn test_stop_of_opposite_direction_is_a_no_op() {
        let streams = StreamController::new();
        assert!(streams.try_start_sending());
        streams.stop_receiving();
        assert!(streams.is_sending());
    }

    #[test]
    fn test_restart_while_active_is_allowed() {
        let streams = StreamController::new();
        assert!(streams.try_start_sending());
        assert!(streams.try_start_sending());
        assert!(streams.is_sending());
    }

    #[test]
    fn test_never_both_directions_under_contention() {
        let streams = Arc::new(StreamController::new());

        for _ in 0..200 {
            let sender = {
                let streams = Arc::clone(&streams);
                std::thread::spawn(move || streams.try_start_sending())
            };
            let receiver = {
                let streams = Arc::clone(&streams);
                std::thread::spawn(move || streams.try_start_receiving())
            };

            let send_ok = sender.join().unwrap();
            let recv_ok = receiver.join().unwrap();

            // At most one direction may win a race for an idle controller.
            assert!(!(send_ok && recv_ok));
            assert!(!(streams.is_sending() && streams.is_receiving()));

            streams.stop_sending();
            streams.stop_receiving();
        }
    }
}
