//! Bounded per-session outbound queue.
//!
//! The hub pushes into it synchronously from its control loop; the
//! session's write loop is the single consumer. When the queue is full the
//! oldest *event* frame is dropped to make room. Control frames are never
//! dropped; instead the producer of replies waits on [`OutboundQueue::control_room`]
//! so that at most `capacity` of them are ever queued.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

/// A frame waiting to be written to the socket.
///
/// Text is reference counted so one serialized broadcast is shared by all
/// of its recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Handshake acks, pongs, errors. Exempt from rate limiting and never
    /// dropped on overflow.
    Control(Arc<str>),
    /// Broadcast event. Rate limited and droppable on overflow.
    Event(Arc<str>),
}

impl OutboundFrame {
    /// Returns `true` for control frames.
    #[must_use]
    pub const fn is_control(&self) -> bool {
        matches!(self, Self::Control(_))
    }

    /// Returns the serialized text of the frame.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Control(text) | Self::Event(text) => text,
        }
    }
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued without loss.
    Queued,
    /// Frame queued after dropping the oldest queued event.
    DroppedOldest,
    /// Queue is closed; the frame was discarded.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<OutboundFrame>,
    controls: usize,
    closed: bool,
    dropped: u64,
}

/// Bounded FIFO with drop-oldest-event overflow.
#[derive(Debug)]
pub struct OutboundQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    room: Notify,
    capacity: usize,
}

impl OutboundQueue {
    /// Creates an open queue holding at most `capacity` event frames.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            room: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The lock is never held across a panic point that leaves the
        // state inconsistent, so a poisoned guard is still usable.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends a frame without blocking.
    pub fn push(&self, frame: OutboundFrame) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let mut outcome = PushOutcome::Queued;
            if state.frames.len() >= self.capacity {
                let oldest_event = state.frames.iter().position(|f| !f.is_control());
                match oldest_event {
                    Some(index) => {
                        state.frames.remove(index);
                        state.dropped += 1;
                        outcome = PushOutcome::DroppedOldest;
                    }
                    None if !frame.is_control() => {
                        // Full of control frames: the incoming event is the
                        // oldest droppable frame.
                        state.dropped += 1;
                        return PushOutcome::DroppedOldest;
                    }
                    None => {}
                }
            }
            if frame.is_control() {
                state.controls += 1;
            }
            state.frames.push_back(frame);
            outcome
        };
        self.notify.notify_one();
        outcome
    }

    /// Waits for the next frame. Returns `None` once the queue is closed;
    /// frames still queued at close time are discarded.
    pub async fn pop(&self) -> Option<OutboundFrame> {
        loop {
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                if let Some(frame) = state.frames.pop_front() {
                    if frame.is_control() {
                        state.controls -= 1;
                        drop(state);
                        self.room.notify_one();
                    }
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Closes the queue, discards pending frames and wakes the consumer.
    /// Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.frames.clear();
            state.controls = 0;
        }
        self.notify.notify_one();
        self.room.notify_one();
    }

    /// Waits until fewer than `capacity` control frames are queued, or the
    /// queue is closed.
    ///
    /// Intended for the single task that produces replies to the peer. The
    /// hub's own control pushes are not gated.
    pub async fn control_room(&self) {
        loop {
            {
                let state = self.lock();
                if state.closed || state.controls < self.capacity {
                    return;
                }
            }
            self.room.notified().await;
        }
    }

    /// Number of control frames waiting.
    #[must_use]
    pub fn control_len(&self) -> usize {
        self.lock().controls
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of frames waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Returns `true` if no frames are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Total number of event frames dropped on overflow.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
