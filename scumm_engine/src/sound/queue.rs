use log::warn;
use serde::Serialize;

use super::channel::EndReason;
use super::SoundRequest;

/// Start requests deferred to the end of the frame. Drained newest first.
#[derive(Debug, Clone, Default)]
pub struct SoundQueue {
    pending: Vec<SoundRequest>,
    limit: usize,
}

impl SoundQueue {
    pub fn new(limit: usize) -> Self {
        SoundQueue {
            pending: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Returns false if the queue was full and the request dropped.
    pub fn push(&mut self, request: SoundRequest) -> bool {
        if self.pending.len() >= self.limit {
            warn!(
                "sound queue full ({} entries), dropping sound {}",
                self.limit, request.sound
            );
            return false;
        }
        self.pending.push(request);
        true
    }

    pub fn drain_lifo(&mut self) -> Vec<SoundRequest> {
        let mut drained: Vec<_> = self.pending.drain(..).collect();
        drained.reverse();
        drained
    }

    pub fn contains(&self, sound: i32) -> bool {
        self.pending.iter().any(|request| request.sound == sound)
    }

    pub fn remove(&mut self, sound: i32) {
        self.pending.retain(|request| request.sound != sound);
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One-shot notification that a channel finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundCallback {
    pub sound: i32,
    pub channel: usize,
    pub reason: EndReason,
}

/// Callbacks waiting for the next drain. Duplicate (sound, channel) pairs
/// collapse into one entry; the collapsed count is kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CallbackQueue {
    pending: Vec<SoundCallback>,
    coalesced: u32,
}

impl CallbackQueue {
    pub fn push(&mut self, callback: SoundCallback) {
        let duplicate = self
            .pending
            .iter()
            .any(|queued| queued.sound == callback.sound && queued.channel == callback.channel);
        if duplicate {
            self.coalesced += 1;
            return;
        }
        self.pending.push(callback);
    }

    /// Everything queued so far, in arrival order. Callbacks pushed while
    /// the batch is being handled wait for the next drain.
    pub fn take(&mut self) -> Vec<SoundCallback> {
        std::mem::take(&mut self.pending)
    }

    pub fn coalesced(&self) -> u32 {
        self.coalesced
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_newest_first_and_caps() {
        let mut queue = SoundQueue::new(2);
        assert!(queue.push(SoundRequest::new(1)));
        assert!(queue.push(SoundRequest::new(2)));
        assert!(!queue.push(SoundRequest::new(3)));
        let order: Vec<i32> = queue.drain_lifo().iter().map(|r| r.sound).collect();
        assert_eq!(order, vec![2, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicate_callbacks_coalesce() {
        let mut callbacks = CallbackQueue::default();
        let first = SoundCallback {
            sound: 4,
            channel: 2,
            reason: EndReason::Ended,
        };
        callbacks.push(first);
        callbacks.push(SoundCallback {
            reason: EndReason::TimedOut,
            ..first
        });
        callbacks.push(SoundCallback {
            channel: 3,
            ..first
        });
        assert_eq!(callbacks.len(), 2);
        assert_eq!(callbacks.coalesced(), 1);
        assert_eq!(callbacks.take()[0], first);
        assert!(callbacks.is_empty());
    }
}
