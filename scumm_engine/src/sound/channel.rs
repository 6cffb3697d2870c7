use std::collections::VecDeque;
use std::rc::Rc;

use scumm_formats::SoundHeader;
use serde::Serialize;

use super::{SoundFlags, FREQUENCY_BASE, NUM_SOUND_VARS};

/// Why a channel stopped playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The mixer drained the stream or reached the early-callback margin.
    /// The backend voice is left to play out.
    Ended,
    /// Wall-clock estimate ran out before the mixer reported an end.
    TimedOut,
    /// A script stopped it.
    Stopped,
    /// Another sound took the channel.
    Preempted,
}

impl EndReason {
    pub fn code(self) -> i32 {
        match self {
            EndReason::Ended => 0,
            EndReason::TimedOut => 1,
            EndReason::Stopped => 2,
            EndReason::Preempted => 3,
        }
    }
}

/// A parsed sound ready to hand to the mixer.
#[derive(Debug, Clone)]
pub struct PreparedSound {
    pub sound: i32,
    pub header: SoundHeader,
    pub data: Rc<[u8]>,
    pub priority: u8,
    pub talkie: bool,
    pub from_spool: bool,
}

/// Mixer parameters that can change while a sound plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelMix {
    pub volume: i32,
    pub pan: i32,
    pub frequency_shift: i32,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub sound: i32,
    pub priority: u8,
    pub talkie: bool,
    pub age: u64,
    pub flags: SoundFlags,
    pub rate: u32,
    pub mix: ChannelMix,
    pub sample_count: u32,
    pub offset_frames: u32,
    pub started_us: u64,
    pub timeout_us: Option<u64>,
    pub code: Vec<scumm_formats::SoundCodeEvent>,
    pub code_index: usize,
    pub vars: [i32; NUM_SOUND_VARS],
    pub appended: VecDeque<PreparedSound>,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            sound: 0,
            priority: 0,
            talkie: false,
            age: 0,
            flags: SoundFlags::default(),
            rate: 0,
            mix: ChannelMix {
                volume: 0,
                pan: 0,
                frequency_shift: FREQUENCY_BASE,
            },
            sample_count: 0,
            offset_frames: 0,
            started_us: 0,
            timeout_us: None,
            code: Vec::new(),
            code_index: 0,
            vars: [0; NUM_SOUND_VARS],
            appended: VecDeque::new(),
        }
    }
}

impl Channel {
    pub fn is_free(&self) -> bool {
        self.sound == 0
    }

    pub fn clear(&mut self) {
        *self = Channel::default();
    }

    /// Sample rate after the frequency shift is applied.
    pub fn effective_rate(&self) -> u64 {
        effective_rate(self.rate, self.mix.frequency_shift)
    }

    /// Sample position reached `now_us` into playback.
    pub fn position(&self, now_us: u64) -> u64 {
        let elapsed = now_us.saturating_sub(self.started_us);
        let played = elapsed * self.effective_rate() / 1_000_000;
        let position = self.offset_frames as u64 + played;
        if self.flags.contains(SoundFlags::LOOP) && self.sample_count > 0 {
            position % self.sample_count as u64
        } else {
            position.min(self.sample_count as u64)
        }
    }

    pub fn has_pending_code(&self) -> bool {
        self.code_index < self.code.len()
    }
}

pub fn effective_rate(rate: u32, frequency_shift: i32) -> u64 {
    if frequency_shift > 0 {
        (rate as u64 * frequency_shift as u64 / FREQUENCY_BASE as u64).max(1)
    } else {
        rate.max(1) as u64
    }
}

/// Microseconds needed to play `frames` at `rate`.
pub fn playback_micros(frames: u32, rate: u64) -> u64 {
    frames as u64 * 1_000_000 / rate.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_time_follows_frequency_shift() {
        assert_eq!(playback_micros(11025, effective_rate(11025, FREQUENCY_BASE)), 1_000_000);
        assert_eq!(
            playback_micros(11025, effective_rate(11025, FREQUENCY_BASE * 2)),
            500_000
        );
    }

    #[test]
    fn position_wraps_when_looping() {
        let mut channel = Channel {
            sound: 4,
            rate: 1000,
            sample_count: 500,
            ..Channel::default()
        };
        assert_eq!(channel.position(750_000), 500);
        channel.flags.insert(SoundFlags::LOOP);
        assert_eq!(channel.position(750_000), 250);
    }
}
