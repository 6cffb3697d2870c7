use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use serde::Serialize;

use super::channel::ChannelMix;

/// PCM handed to the mixer for one channel.
#[derive(Debug, Clone)]
pub struct PcmStream {
    pub sound: i32,
    pub data: Rc<[u8]>,
    /// Byte range of the PCM inside `data`, already advanced past any start
    /// offset.
    pub range: Range<usize>,
    pub rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub looping: bool,
    /// Report the stream finished once this many bytes or fewer remain.
    pub early_margin: u32,
    pub mix: ChannelMix,
}

impl PcmStream {
    pub fn bytes_per_frame(&self) -> usize {
        (self.bits_per_sample as usize / 8).max(1) * self.channels.max(1) as usize
    }

    pub fn frame_count(&self) -> usize {
        self.range.len() / self.bytes_per_frame()
    }
}

/// Audio output. The engine decides what plays where; the backend only
/// renders and reports when streams run dry.
pub trait MixerBackend {
    fn start(&mut self, channel: usize, stream: PcmStream);
    fn modify(&mut self, channel: usize, mix: ChannelMix);
    fn stop(&mut self, channel: usize);
    /// Advance output time by `micros`.
    fn advance(&mut self, micros: u64);
    /// Channels whose stream ended since the previous call.
    fn take_finished(&mut self) -> Vec<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MixerEvent {
    Start {
        channel: usize,
        sound: i32,
        rate: u32,
        bytes: usize,
        looping: bool,
    },
    Modify {
        channel: usize,
        mix: ChannelMix,
    },
    Stop {
        channel: usize,
    },
}

#[derive(Default)]
struct Recording {
    events: Vec<MixerEvent>,
    finished: Vec<usize>,
}

/// Backend that renders nothing and logs every call. Streams only end when
/// [`RecordingBackend::finish`] is called.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MixerEvent> {
        self.inner.borrow().events.clone()
    }

    /// Pretend the stream on `channel` drained.
    pub fn finish(&self, channel: usize) {
        self.inner.borrow_mut().finished.push(channel);
    }
}

impl MixerBackend for RecordingBackend {
    fn start(&mut self, channel: usize, stream: PcmStream) {
        self.inner.borrow_mut().events.push(MixerEvent::Start {
            channel,
            sound: stream.sound,
            rate: stream.rate,
            bytes: stream.range.len(),
            looping: stream.looping,
        });
    }

    fn modify(&mut self, channel: usize, mix: ChannelMix) {
        self.inner
            .borrow_mut()
            .events
            .push(MixerEvent::Modify { channel, mix });
    }

    fn stop(&mut self, channel: usize) {
        self.inner
            .borrow_mut()
            .events
            .push(MixerEvent::Stop { channel });
    }

    fn advance(&mut self, _micros: u64) {}

    fn take_finished(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.inner.borrow_mut().finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::FREQUENCY_BASE;

    #[test]
    fn recording_backend_tracks_calls() {
        let backend = RecordingBackend::new();
        let mut handle: Box<dyn MixerBackend> = Box::new(backend.clone());
        let mix = ChannelMix {
            volume: 255,
            pan: 64,
            frequency_shift: FREQUENCY_BASE,
        };
        handle.start(
            3,
            PcmStream {
                sound: 12,
                data: Rc::from(vec![0u8; 8]),
                range: 2..8,
                rate: 11025,
                bits_per_sample: 8,
                channels: 1,
                looping: false,
                early_margin: 0,
                mix,
            },
        );
        handle.stop(3);
        backend.finish(3);

        assert_eq!(
            backend.events(),
            vec![
                MixerEvent::Start {
                    channel: 3,
                    sound: 12,
                    rate: 11025,
                    bytes: 6,
                    looping: false
                },
                MixerEvent::Stop { channel: 3 },
            ]
        );
        assert_eq!(handle.take_finished(), vec![3]);
        assert!(handle.take_finished().is_empty());
    }
}
