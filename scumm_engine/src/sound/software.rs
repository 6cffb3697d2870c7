use log::trace;
use serde::Serialize;

use super::backend::{MixerBackend, PcmStream};
use super::channel::{effective_rate, ChannelMix};
use super::{MAX_VOLUME, PAN_CENTER};

struct Voice {
    stream: PcmStream,
    /// Position in source frames, 16.16 fixed point.
    cursor: u64,
    step: u64,
    notified: bool,
}

impl Voice {
    fn new(stream: PcmStream, output_rate: u32) -> Self {
        let step = step_for(&stream, output_rate);
        Voice {
            stream,
            cursor: 0,
            step,
            notified: false,
        }
    }

    fn sample(&self, frame: usize, lane: usize) -> i32 {
        let stream = &self.stream;
        let bytes = stream.bytes_per_frame();
        let lane = lane.min(stream.channels.max(1) as usize - 1);
        let at = stream.range.start + frame * bytes;
        if stream.bits_per_sample == 8 {
            (stream.data[at + lane] as i32 - 128) << 8
        } else {
            let at = at + lane * 2;
            i16::from_le_bytes([stream.data[at], stream.data[at + 1]]) as i32
        }
    }

    fn remaining_bytes(&self) -> usize {
        let frames = self.stream.frame_count();
        let played = (self.cursor >> 16) as usize;
        frames.saturating_sub(played) * self.stream.bytes_per_frame()
    }
}

fn step_for(stream: &PcmStream, output_rate: u32) -> u64 {
    let rate = effective_rate(stream.rate, stream.mix.frequency_shift);
    (rate << 16) / output_rate.max(1) as u64
}

fn gains(mix: &ChannelMix) -> (i32, i32) {
    let volume = mix.volume.clamp(0, MAX_VOLUME);
    let pan = mix.pan.clamp(0, PAN_CENTER * 2);
    let left = ((PAN_CENTER * 2 - pan) * 256 / PAN_CENTER).min(256);
    let right = (pan * 256 / PAN_CENTER).min(256);
    (volume * left / 256, volume * right / 256)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MixStats {
    pub rendered_frames: u64,
    pub peak: i32,
    pub clipped: u64,
}

/// Mixes every active channel into interleaved stereo 16-bit output.
pub struct SoftwareMixer {
    output_rate: u32,
    voices: Vec<Option<Voice>>,
    output: Vec<i16>,
    finished: Vec<usize>,
    carry_micros: u64,
    stats: MixStats,
}

impl SoftwareMixer {
    pub fn new(channels: usize, output_rate: u32) -> Self {
        SoftwareMixer {
            output_rate,
            voices: (0..channels).map(|_| None).collect(),
            output: Vec::new(),
            finished: Vec::new(),
            carry_micros: 0,
            stats: MixStats::default(),
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Rendered samples since the last call, interleaved left/right.
    pub fn take_output(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.output)
    }

    pub fn stats(&self) -> MixStats {
        self.stats
    }

    fn render_frame(&mut self) {
        let mut left = 0i32;
        let mut right = 0i32;
        for (channel, slot) in self.voices.iter_mut().enumerate() {
            let Some(voice) = slot else { continue };
            let frames = voice.stream.frame_count();
            if frames == 0 {
                *slot = None;
                self.finished.push(channel);
                continue;
            }
            let mut frame = (voice.cursor >> 16) as usize;
            if frame >= frames {
                if voice.stream.looping {
                    voice.cursor %= (frames as u64) << 16;
                    frame = (voice.cursor >> 16) as usize;
                } else {
                    if !voice.notified {
                        self.finished.push(channel);
                    }
                    *slot = None;
                    continue;
                }
            }

            let (gain_left, gain_right) = gains(&voice.stream.mix);
            left += voice.sample(frame, 0) * gain_left / MAX_VOLUME;
            right += voice.sample(frame, 1) * gain_right / MAX_VOLUME;
            voice.cursor += voice.step;

            let margin = voice.stream.early_margin as usize;
            if margin > 0 && !voice.notified && !voice.stream.looping && voice.remaining_bytes() <= margin {
                voice.notified = true;
                self.finished.push(channel);
            }
        }

        for value in [left, right] {
            let clamped = value.clamp(i16::MIN as i32, i16::MAX as i32);
            if clamped != value {
                self.stats.clipped += 1;
            }
            self.stats.peak = self.stats.peak.max(clamped.abs());
            self.output.push(clamped as i16);
        }
        self.stats.rendered_frames += 1;
    }
}

impl MixerBackend for SoftwareMixer {
    fn start(&mut self, channel: usize, stream: PcmStream) {
        if channel >= self.voices.len() {
            self.voices.resize_with(channel + 1, || None);
        }
        trace!("mixer: channel {channel} <- sound {}", stream.sound);
        self.voices[channel] = Some(Voice::new(stream, self.output_rate));
    }

    fn modify(&mut self, channel: usize, mix: ChannelMix) {
        let output_rate = self.output_rate;
        if let Some(Some(voice)) = self.voices.get_mut(channel) {
            voice.stream.mix = mix;
            voice.step = step_for(&voice.stream, output_rate);
        }
    }

    fn stop(&mut self, channel: usize) {
        if let Some(slot) = self.voices.get_mut(channel) {
            *slot = None;
        }
    }

    fn advance(&mut self, micros: u64) {
        let total = self.carry_micros + micros * self.output_rate as u64;
        let frames = total / 1_000_000;
        self.carry_micros = total % 1_000_000;
        for _ in 0..frames {
            self.render_frame();
        }
    }

    fn take_finished(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.finished)
    }
}
