//! Digital sound channels: allocation, priority contention, timeouts,
//! embedded sound code and end-of-sound callbacks.

pub mod backend;
pub mod channel;
pub mod code;
pub mod queue;
pub mod software;

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scumm_formats::sound::build;
use scumm_formats::{parse_sound, SpoolFile};
use serde::{Deserialize, Serialize};

use crate::error::{VmError, VmResult};
use crate::resource::{ResourceManager, ResourceType};

use self::backend::{MixerBackend, PcmStream};
use self::channel::{playback_micros, Channel, ChannelMix, EndReason, PreparedSound};
use self::code::{run_ops, CodeEffect, TALK_STATE_VAR};
use self::queue::{CallbackQueue, SoundCallback, SoundQueue};

pub const NUM_SOUND_VARS: usize = 27;
pub const FREQUENCY_BASE: i32 = 1024;
pub const MAX_VOLUME: i32 = 255;
pub const PAN_CENTER: i32 = 64;
/// Channel request meaning "pick one for me".
pub const DYNAMIC_CHANNEL: i32 = -1;

/// Start-request modifier bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SoundFlags(u32);

impl SoundFlags {
    pub const LOOP: SoundFlags = SoundFlags(1);
    pub const APPEND: SoundFlags = SoundFlags(2);
    pub const SOFT: SoundFlags = SoundFlags(4);
    pub const QUICK_START: SoundFlags = SoundFlags(8);
    pub const OFFSET: SoundFlags = SoundFlags(16);
    pub const VOL: SoundFlags = SoundFlags(32);
    pub const FREQUENCY: SoundFlags = SoundFlags(64);
    pub const PAN: SoundFlags = SoundFlags(128);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: SoundFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SoundFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for SoundFlags {
    type Output = SoundFlags;

    fn bitor(self, rhs: SoundFlags) -> SoundFlags {
        SoundFlags(self.0 | rhs.0)
    }
}

/// Parameters accumulated by the sound opcodes before a start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundRequest {
    pub sound: i32,
    /// Byte offset into the PCM data.
    pub offset: i32,
    pub channel: i32,
    pub flags: SoundFlags,
    pub frequency_shift: i32,
    pub pan: i32,
    pub volume: i32,
}

impl SoundRequest {
    pub fn new(sound: i32) -> Self {
        SoundRequest {
            sound,
            offset: 0,
            channel: DYNAMIC_CHANNEL,
            flags: SoundFlags::default(),
            frequency_shift: FREQUENCY_BASE,
            pan: PAN_CENTER,
            volume: MAX_VOLUME,
        }
    }

    fn mix(&self) -> ChannelMix {
        ChannelMix {
            volume: self.volume.clamp(0, MAX_VOLUME),
            pan: self.pan.clamp(0, PAN_CENTER * 2),
            frequency_shift: if self.frequency_shift > 0 {
                self.frequency_shift
            } else {
                FREQUENCY_BASE
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SoundConfig {
    pub channels: usize,
    /// First channel handed out for dynamic requests.
    pub dynamic_start: usize,
    pub talkie_channel: usize,
    pub music_channel: usize,
    pub talkie_sound_id: i32,
    pub default_priority: u8,
    /// Added to the estimated playback time before a channel is forced off.
    pub timeout_slack_us: u64,
    /// Report streams as finished once this many bytes remain. 0 disables.
    pub early_callback_bytes: u32,
    pub queue_limit: usize,
    pub output_rate: u32,
    /// Script run for each end-of-sound callback, 0 for none.
    pub callback_script: i32,
}

impl Default for SoundConfig {
    fn default() -> Self {
        SoundConfig {
            channels: 8,
            dynamic_start: 2,
            talkie_channel: 1,
            music_channel: 0,
            talkie_sound_id: 10000,
            default_priority: 128,
            timeout_slack_us: 250_000,
            early_callback_bytes: 0,
            queue_limit: 10,
            output_rate: 22050,
            callback_script: 0,
        }
    }
}

/// What a start request turned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started { channel: usize },
    Modified { channel: usize },
    Appended { channel: usize },
    Rejected { channel: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundEvent {
    Started {
        at_us: u64,
        sound: i32,
        channel: usize,
        priority: u8,
        looping: bool,
    },
    Rejected {
        at_us: u64,
        sound: i32,
        channel: usize,
        holder: i32,
    },
    Ended {
        at_us: u64,
        sound: i32,
        channel: usize,
        reason: EndReason,
    },
    Failed {
        at_us: u64,
        sound: i32,
        reason: String,
    },
    TalkState {
        at_us: u64,
        sound: i32,
        state: i32,
    },
}

#[derive(Debug, Clone, Default)]
struct CreatedSound {
    format: Option<(u32, u16, u16)>,
    pcm: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub channel: usize,
    pub sound: i32,
    pub priority: u8,
    pub talkie: bool,
    pub looping: bool,
    pub position: u64,
}

pub struct SoundEngine {
    config: SoundConfig,
    channels: Vec<Channel>,
    queue: SoundQueue,
    callbacks: CallbackQueue,
    backend: Box<dyn MixerBackend>,
    spool: Option<SpoolFile>,
    created: BTreeMap<i32, CreatedSound>,
    rng: StdRng,
    next_age: u64,
    last_frame_us: u64,
    events: Vec<SoundEvent>,
}

impl SoundEngine {
    pub fn new(config: SoundConfig, backend: Box<dyn MixerBackend>, seed: u64) -> Self {
        let channels = (0..config.channels).map(|_| Channel::default()).collect();
        SoundEngine {
            queue: SoundQueue::new(config.queue_limit),
            config,
            channels,
            callbacks: CallbackQueue::default(),
            backend,
            spool: None,
            created: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            next_age: 1,
            last_frame_us: 0,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SoundConfig {
        &self.config
    }

    pub fn attach_spool(&mut self, spool: SpoolFile) {
        info!(
            "music spool {} with {} songs",
            spool.path().display(),
            spool.index().entries().len()
        );
        self.spool = Some(spool);
    }

    pub fn events(&self) -> &[SoundEvent] {
        &self.events
    }

    pub fn callbacks_coalesced(&self) -> u32 {
        self.callbacks.coalesced()
    }

    pub fn snapshot(&self, now_us: u64) -> Vec<ChannelSnapshot> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| !channel.is_free())
            .map(|(index, channel)| ChannelSnapshot {
                channel: index,
                sound: channel.sound,
                priority: channel.priority,
                talkie: channel.talkie,
                looping: channel.flags.contains(SoundFlags::LOOP),
                position: channel.position(now_us),
            })
            .collect()
    }

    /// Queue a start for the end of the frame, or trigger it right away
    /// when `QUICK_START` is set. A full queue fails the request.
    pub fn start(
        &mut self,
        resources: &mut dyn ResourceManager,
        request: SoundRequest,
        now_us: u64,
    ) -> VmResult<Option<TriggerOutcome>> {
        if request.flags.contains(SoundFlags::QUICK_START) {
            return self.trigger(resources, request, now_us).map(Some);
        }
        if self.queue.push(request) {
            return Ok(None);
        }
        let reason = format!("sound queue full ({} entries)", self.config.queue_limit);
        self.events.push(SoundEvent::Failed {
            at_us: now_us,
            sound: request.sound,
            reason: reason.clone(),
        });
        Ok(Some(TriggerOutcome::Failed { reason }))
    }

    /// Trigger every queued request, newest first.
    pub fn process_queue(
        &mut self,
        resources: &mut dyn ResourceManager,
        now_us: u64,
    ) -> VmResult<Vec<(i32, TriggerOutcome)>> {
        let mut outcomes = Vec::new();
        for request in self.queue.drain_lifo() {
            let outcome = self.trigger(resources, request, now_us)?;
            outcomes.push((request.sound, outcome));
        }
        Ok(outcomes)
    }

    pub fn trigger(
        &mut self,
        resources: &mut dyn ResourceManager,
        request: SoundRequest,
        now_us: u64,
    ) -> VmResult<TriggerOutcome> {
        if request.channel >= self.channels.len() as i32 {
            return Err(VmError::InvalidChannel(request.channel));
        }

        if request.flags.contains(SoundFlags::SOFT) {
            if let Some(channel) = self.channel_of(request.sound) {
                self.modify_channel(channel, &request);
                return Ok(TriggerOutcome::Modified { channel });
            }
        }

        let prepared = match self.prepare(resources, request.sound) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!("sound {} failed to start: {err:#}", request.sound);
                let reason = format!("{err:#}");
                self.events.push(SoundEvent::Failed {
                    at_us: now_us,
                    sound: request.sound,
                    reason: reason.clone(),
                });
                return Ok(TriggerOutcome::Failed { reason });
            }
        };

        let channel = if prepared.talkie {
            self.config.talkie_channel
        } else if request.channel >= 0 {
            request.channel as usize
        } else if prepared.from_spool {
            self.config.music_channel
        } else {
            self.pick_dynamic()
        };

        let occupant = &self.channels[channel];
        if !occupant.is_free() {
            if request.flags.contains(SoundFlags::APPEND) && !prepared.talkie {
                debug!("sound {} appended behind {} on channel {channel}", request.sound, occupant.sound);
                self.channels[channel].appended.push_back(prepared);
                return Ok(TriggerOutcome::Appended { channel });
            }
            let immune = occupant.talkie && !prepared.talkie;
            let outranked = !prepared.talkie && prepared.priority < occupant.priority;
            if immune || outranked {
                debug!(
                    "sound {} (priority {}) rejected by {} (priority {}) on channel {channel}",
                    request.sound, prepared.priority, occupant.sound, occupant.priority
                );
                self.events.push(SoundEvent::Rejected {
                    at_us: now_us,
                    sound: request.sound,
                    channel,
                    holder: occupant.sound,
                });
                return Ok(TriggerOutcome::Rejected { channel });
            }
            self.end_channel(channel, EndReason::Preempted, now_us);
        }

        self.start_on(channel, prepared, &request, now_us);
        Ok(TriggerOutcome::Started { channel })
    }

    fn prepare(&mut self, resources: &mut dyn ResourceManager, sound: i32) -> Result<PreparedSound> {
        let spooled = match self.spool.as_mut() {
            Some(spool) if sound > 0 && spool.index().find(sound as u32).is_some() => {
                Some(spool.read_song(sound as u32)?)
            }
            _ => None,
        };
        let from_spool = spooled.is_some();
        let data: Rc<[u8]> = match spooled {
            Some(bytes) => Rc::from(bytes),
            None => resources.get(ResourceType::Sound, sound)?,
        };
        let header = parse_sound(&data).with_context(|| format!("parsing sound {sound}"))?;
        let priority = header.priority.unwrap_or(self.config.default_priority);
        Ok(PreparedSound {
            sound,
            header,
            data,
            priority,
            talkie: sound == self.config.talkie_sound_id,
            from_spool,
        })
    }

    fn pick_dynamic(&self) -> usize {
        let candidates = || {
            (self.config.dynamic_start..self.channels.len())
                .filter(|&index| index != self.config.talkie_channel)
        };
        if let Some(free) = candidates().find(|&index| self.channels[index].is_free()) {
            return free;
        }
        candidates()
            .min_by_key(|&index| self.channels[index].age)
            .unwrap_or(self.config.dynamic_start.min(self.channels.len().saturating_sub(1)))
    }

    fn start_on(&mut self, index: usize, prepared: PreparedSound, request: &SoundRequest, now_us: u64) {
        let header = &prepared.header;
        let frame = header.bytes_per_frame().max(1);
        let offset_bytes = if request.flags.contains(SoundFlags::OFFSET) || request.offset != 0 {
            (request.offset.max(0) as usize).min(header.data.len) / frame * frame
        } else {
            0
        };
        let offset_frames = (offset_bytes / frame) as u32;
        let looping = request.flags.contains(SoundFlags::LOOP);
        let mix = request.mix();
        let age = self.next_age;
        self.next_age += 1;

        let mut channel = Channel {
            sound: prepared.sound,
            priority: prepared.priority,
            talkie: prepared.talkie,
            age,
            flags: request.flags,
            rate: header.frequency,
            mix,
            sample_count: header.sample_count,
            offset_frames,
            started_us: now_us,
            timeout_us: None,
            code: header.code.clone(),
            code_index: 0,
            vars: [0; NUM_SOUND_VARS],
            appended: std::mem::take(&mut self.channels[index].appended),
        };
        if !looping {
            let remaining = header.sample_count.saturating_sub(offset_frames);
            channel.timeout_us =
                Some(now_us + playback_micros(remaining, channel.effective_rate()) + self.config.timeout_slack_us);
        }

        let range = header.data.range();
        self.backend.start(
            index,
            PcmStream {
                sound: prepared.sound,
                data: Rc::clone(&prepared.data),
                range: range.start + offset_bytes..range.end,
                rate: header.frequency,
                bits_per_sample: header.bits_per_sample,
                channels: header.channels,
                looping,
                early_margin: self.config.early_callback_bytes,
                mix,
            },
        );
        debug!(
            "sound {} on channel {index} at {} Hz, priority {}",
            prepared.sound, header.frequency, prepared.priority
        );
        self.events.push(SoundEvent::Started {
            at_us: now_us,
            sound: prepared.sound,
            channel: index,
            priority: prepared.priority,
            looping,
        });
        self.channels[index] = channel;
    }

    fn modify_channel(&mut self, index: usize, request: &SoundRequest) {
        let channel = &mut self.channels[index];
        if request.flags.contains(SoundFlags::VOL) {
            channel.mix.volume = request.volume.clamp(0, MAX_VOLUME);
        }
        if request.flags.contains(SoundFlags::PAN) {
            channel.mix.pan = request.pan.clamp(0, PAN_CENTER * 2);
        }
        if request.flags.contains(SoundFlags::FREQUENCY) && request.frequency_shift > 0 {
            channel.mix.frequency_shift = request.frequency_shift;
        }
        self.backend.modify(index, channel.mix);
    }

    /// Change volume, pan or pitch of a playing sound without restarting it.
    pub fn modify_sound(&mut self, request: &SoundRequest) -> bool {
        match self.channel_of(request.sound) {
            Some(channel) => {
                self.modify_channel(channel, request);
                true
            }
            None => false,
        }
    }

    fn end_channel(&mut self, index: usize, reason: EndReason, now_us: u64) {
        let sound = self.channels[index].sound;
        if sound == 0 {
            return;
        }
        // An ended stream is either gone from the mixer already or inside its
        // early-callback margin, where the tail must keep playing.
        if reason != EndReason::Ended {
            self.backend.stop(index);
        }
        self.callbacks.push(SoundCallback {
            sound,
            channel: index,
            reason,
        });
        self.events.push(SoundEvent::Ended {
            at_us: now_us,
            sound,
            channel: index,
            reason,
        });
        debug!("sound {sound} on channel {index} ended: {reason:?}");

        let next = match reason {
            EndReason::Ended | EndReason::TimedOut => self.channels[index].appended.pop_front(),
            EndReason::Stopped | EndReason::Preempted => None,
        };
        match next {
            Some(prepared) => {
                let mix = self.channels[index].mix;
                let request = SoundRequest {
                    channel: index as i32,
                    volume: mix.volume,
                    pan: mix.pan,
                    frequency_shift: mix.frequency_shift,
                    ..SoundRequest::new(prepared.sound)
                };
                self.start_on(index, prepared, &request, now_us);
            }
            None => self.channels[index].clear(),
        }
    }

    fn channel_of(&self, sound: i32) -> Option<usize> {
        if sound == 0 {
            return None;
        }
        self.channels.iter().position(|channel| channel.sound == sound)
    }

    pub fn is_running(&self, sound: i32) -> bool {
        self.channel_of(sound).is_some() || self.queue.contains(sound)
    }

    /// Playback position of `sound` in sample frames, 0 if it is not playing.
    pub fn position(&self, sound: i32, now_us: u64) -> i32 {
        self.channel_of(sound)
            .map(|index| self.channels[index].position(now_us) as i32)
            .unwrap_or(0)
    }

    pub fn stop(&mut self, sound: i32, now_us: u64) {
        self.queue.remove(sound);
        let playing: Vec<usize> = (0..self.channels.len())
            .filter(|&index| self.channels[index].sound == sound && sound != 0)
            .collect();
        for index in playing {
            self.end_channel(index, EndReason::Stopped, now_us);
        }
    }

    pub fn stop_all(&mut self, now_us: u64) {
        self.queue.clear();
        for index in 0..self.channels.len() {
            self.end_channel(index, EndReason::Stopped, now_us);
        }
    }

    pub fn set_var(&mut self, sound: i32, var: i32, value: i32) -> VmResult<()> {
        if !(0..NUM_SOUND_VARS as i32).contains(&var) {
            return Err(VmError::InvalidSoundVar(var));
        }
        let mut found = false;
        for channel in self.channels.iter_mut().filter(|channel| channel.sound == sound && sound != 0) {
            channel.vars[var as usize] = value;
            found = true;
        }
        if !found {
            debug!("setSoundVar: sound {sound} is not playing");
        }
        Ok(())
    }

    pub fn var(&self, sound: i32, var: i32) -> VmResult<i32> {
        if !(0..NUM_SOUND_VARS as i32).contains(&var) {
            return Err(VmError::InvalidSoundVar(var));
        }
        Ok(self
            .channel_of(sound)
            .map(|index| self.channels[index].vars[var as usize])
            .unwrap_or(0))
    }

    /// Current lip-sync state of the talkie channel, 0 when silent.
    pub fn talk_state(&self) -> i32 {
        self.channels
            .get(self.config.talkie_channel)
            .filter(|channel| channel.talkie)
            .map(|channel| channel.vars[TALK_STATE_VAR])
            .unwrap_or(0)
    }

    /// Begin (`src == -1`) or extend a sound assembled at runtime.
    pub fn create_sound(
        &mut self,
        resources: &mut dyn ResourceManager,
        dst: i32,
        src: i32,
    ) -> Result<()> {
        if src == -1 {
            self.created.insert(dst, CreatedSound::default());
            return Ok(());
        }
        let data = resources.get(ResourceType::Sound, src)?;
        let header = parse_sound(&data).with_context(|| format!("parsing sound {src}"))?;
        let format = (header.frequency, header.bits_per_sample, header.channels);

        let entry = self.created.entry(dst).or_default();
        match entry.format {
            None => entry.format = Some(format),
            Some(existing) if existing != format => {
                anyhow::bail!(
                    "sound {src} format {format:?} does not match sound {dst} {existing:?}"
                );
            }
            Some(_) => {}
        }
        entry.pcm.extend_from_slice(header.pcm(&data));
        let (rate, bits, channels) = format;
        let blob = build::xsou(rate, bits, channels, &entry.pcm, None);
        resources.insert(ResourceType::Sound, dst, blob);
        Ok(())
    }

    /// Per-frame upkeep: advance the mixer, run due sound code, retire
    /// channels that ended or timed out. Returns callbacks to dispatch.
    pub fn handle_frame(&mut self, now_us: u64) -> Vec<SoundCallback> {
        let elapsed = now_us.saturating_sub(self.last_frame_us);
        self.last_frame_us = now_us;
        self.backend.advance(elapsed);
        let finished: BTreeSet<usize> = self.backend.take_finished().into_iter().collect();

        for index in 0..self.channels.len() {
            if self.channels[index].is_free() {
                continue;
            }
            self.run_sound_code(index, now_us);

            let looping = self.channels[index].flags.contains(SoundFlags::LOOP);
            let deadline = self.channels[index].timeout_us;
            if finished.contains(&index) && !looping {
                self.end_channel(index, EndReason::Ended, now_us);
            } else if deadline.is_some_and(|deadline| now_us >= deadline) {
                self.end_channel(index, EndReason::TimedOut, now_us);
            }
        }

        self.callbacks.take()
    }

    fn run_sound_code(&mut self, index: usize, now_us: u64) {
        let channel = &mut self.channels[index];
        if !channel.has_pending_code() {
            return;
        }
        let position = channel.position(now_us);
        let sound = channel.sound;
        while channel.code_index < channel.code.len() {
            let event = &channel.code[channel.code_index];
            if event.timestamp as u64 > position {
                break;
            }
            let effects = run_ops(sound, &event.ops, &mut channel.vars, &mut self.rng);
            channel.code_index += 1;
            for effect in effects {
                let CodeEffect::TalkState(state) = effect;
                self.events.push(SoundEvent::TalkState {
                    at_us: now_us,
                    sound,
                    state,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::backend::{MixerEvent, RecordingBackend};
    use super::software::SoftwareMixer;
    use super::*;
    use crate::resource::{HeapLimits, MemoryLoader, ResourceCache};
    use scumm_formats::{SoundCodeEvent, SoundCodeOp};

    fn setup(sounds: Vec<(i32, Vec<u8>)>) -> (SoundEngine, ResourceCache, RecordingBackend) {
        let mut loader = MemoryLoader::new();
        for (id, blob) in sounds {
            loader.insert(ResourceType::Sound, id, blob);
        }
        let backend = RecordingBackend::new();
        let engine = SoundEngine::new(SoundConfig::default(), Box::new(backend.clone()), 1);
        let cache = ResourceCache::new(Box::new(loader), HeapLimits::default());
        (engine, cache, backend)
    }

    fn pcm(frames: usize) -> Vec<u8> {
        vec![0x80; frames]
    }

    fn on_channel(request: SoundRequest, channel: i32) -> SoundRequest {
        SoundRequest { channel, ..request }
    }

    #[test]
    fn lower_priority_is_rejected_higher_preempts() {
        let (mut engine, mut res, _) = setup(vec![
            (1, build::digi(11025, 100, &pcm(1000), &[])),
            (2, build::digi(11025, 50, &pcm(1000), &[])),
            (3, build::digi(11025, 150, &pcm(1000), &[])),
        ]);
        let first = engine.trigger(&mut res, on_channel(SoundRequest::new(1), 3), 0).unwrap();
        assert_eq!(first, TriggerOutcome::Started { channel: 3 });
        let low = engine.trigger(&mut res, on_channel(SoundRequest::new(2), 3), 0).unwrap();
        assert_eq!(low, TriggerOutcome::Rejected { channel: 3 });
        assert!(engine.is_running(1));

        let high = engine.trigger(&mut res, on_channel(SoundRequest::new(3), 3), 0).unwrap();
        assert_eq!(high, TriggerOutcome::Started { channel: 3 });
        assert!(!engine.is_running(1));
        let callbacks = engine.handle_frame(1);
        assert_eq!(
            callbacks,
            vec![SoundCallback {
                sound: 1,
                channel: 3,
                reason: EndReason::Preempted
            }]
        );
    }

    #[test]
    fn talkie_owns_its_channel() {
        let (mut engine, mut res, _) = setup(vec![
            (10000, build::talk(11025, &pcm(2000), &[])),
            (5, build::digi(11025, 255, &pcm(100), &[])),
        ]);
        let talk = engine.trigger(&mut res, SoundRequest::new(10000), 0).unwrap();
        assert_eq!(talk, TriggerOutcome::Started { channel: 1 });
        let sfx = engine.trigger(&mut res, on_channel(SoundRequest::new(5), 1), 0).unwrap();
        assert_eq!(sfx, TriggerOutcome::Rejected { channel: 1 });
    }

    #[test]
    fn talkie_evicts_anything_on_its_channel() {
        let (mut engine, mut res, _) = setup(vec![
            (10000, build::talk(11025, &pcm(2000), &[])),
            (5, build::digi(11025, 255, &pcm(100), &[])),
        ]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(5), 1), 0).unwrap();
        let talk = engine.trigger(&mut res, SoundRequest::new(10000), 0).unwrap();
        assert_eq!(talk, TriggerOutcome::Started { channel: 1 });
        assert!(!engine.is_running(5));
    }

    #[test]
    fn dynamic_requests_reuse_the_oldest_channel() {
        let sounds = (1..=7).map(|id| (id, build::digi(11025, 100, &pcm(100), &[]))).collect();
        let (mut engine, mut res, _) = setup(sounds);
        let mut used = Vec::new();
        for id in 1..=6 {
            match engine.trigger(&mut res, SoundRequest::new(id), id as u64).unwrap() {
                TriggerOutcome::Started { channel } => used.push(channel),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(used, vec![2, 3, 4, 5, 6, 7]);
        let seventh = engine.trigger(&mut res, SoundRequest::new(7), 10).unwrap();
        assert_eq!(seventh, TriggerOutcome::Started { channel: 2 });
        assert!(!engine.is_running(1));
    }

    #[test]
    fn channels_time_out_without_mixer_signal() {
        let (mut engine, mut res, _) = setup(vec![(1, build::digi(1000, 0, &pcm(500), &[]))]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 2), 0).unwrap();
        let slack = engine.config().timeout_slack_us;
        assert!(engine.handle_frame(500_000 + slack - 1).is_empty());
        let callbacks = engine.handle_frame(500_000 + slack);
        assert_eq!(callbacks[0].reason, EndReason::TimedOut);
        assert!(!engine.is_running(1));
    }

    #[test]
    fn looping_sounds_never_time_out() {
        let (mut engine, mut res, backend) = setup(vec![(1, build::digi(1000, 0, &pcm(10), &[]))]);
        let mut request = on_channel(SoundRequest::new(1), 2);
        request.flags.insert(SoundFlags::LOOP);
        engine.trigger(&mut res, request, 0).unwrap();
        backend.finish(2);
        assert!(engine.handle_frame(60_000_000).is_empty());
        assert!(engine.is_running(1));
    }

    #[test]
    fn mixer_end_retires_channel_and_starts_appended_sound() {
        let (mut engine, mut res, backend) = setup(vec![
            (1, build::digi(11025, 0, &pcm(100), &[])),
            (2, build::digi(11025, 0, &pcm(100), &[])),
        ]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 4), 0).unwrap();
        let mut append = on_channel(SoundRequest::new(2), 4);
        append.flags.insert(SoundFlags::APPEND);
        assert_eq!(
            engine.trigger(&mut res, append, 0).unwrap(),
            TriggerOutcome::Appended { channel: 4 }
        );
        backend.finish(4);
        let callbacks = engine.handle_frame(1000);
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].sound, 1);
        assert!(engine.is_running(2));
    }

    #[test]
    fn soft_start_modifies_in_place() {
        let (mut engine, mut res, backend) = setup(vec![(1, build::digi(11025, 0, &pcm(100), &[]))]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 2), 0).unwrap();
        let mut soft = SoundRequest::new(1);
        soft.flags = SoundFlags::SOFT | SoundFlags::VOL;
        soft.volume = 40;
        assert_eq!(
            engine.trigger(&mut res, soft, 0).unwrap(),
            TriggerOutcome::Modified { channel: 2 }
        );
        assert!(matches!(
            backend.events().last(),
            Some(MixerEvent::Modify { channel: 2, mix }) if mix.volume == 40
        ));
    }

    #[test]
    fn queue_is_deferred_until_processed() {
        let (mut engine, mut res, _) = setup(vec![
            (1, build::digi(11025, 0, &pcm(100), &[])),
            (2, build::digi(11025, 0, &pcm(100), &[])),
        ]);
        assert_eq!(engine.start(&mut res, SoundRequest::new(1), 0).unwrap(), None);
        assert_eq!(engine.start(&mut res, SoundRequest::new(2), 0).unwrap(), None);
        assert!(engine.is_running(1));
        let outcomes = engine.process_queue(&mut res, 0).unwrap();
        let order: Vec<i32> = outcomes.iter().map(|(sound, _)| *sound).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn missing_or_corrupt_sounds_fail_softly() {
        let (mut engine, mut res, _) = setup(vec![(2, b"JUNKJUNK".to_vec())]);
        assert!(matches!(
            engine.trigger(&mut res, SoundRequest::new(1), 0).unwrap(),
            TriggerOutcome::Failed { .. }
        ));
        assert!(matches!(
            engine.trigger(&mut res, SoundRequest::new(2), 0).unwrap(),
            TriggerOutcome::Failed { .. }
        ));
    }

    #[test]
    fn sound_code_runs_as_playback_advances() {
        let code = vec![
            SoundCodeEvent {
                timestamp: 0,
                ops: vec![SoundCodeOp {
                    opcode: code::OP_SET,
                    var: 4,
                    value: 7,
                }],
            },
            SoundCodeEvent {
                timestamp: 500,
                ops: vec![SoundCodeOp {
                    opcode: code::OP_TALK_STATE,
                    var: 0,
                    value: 3,
                }],
            },
        ];
        let (mut engine, mut res, _) = setup(vec![(10000, build::talk(1000, &pcm(1000), &code))]);
        engine.trigger(&mut res, SoundRequest::new(10000), 0).unwrap();
        engine.handle_frame(100_000);
        assert_eq!(engine.var(10000, 4).unwrap(), 7);
        assert_eq!(engine.talk_state(), 0);
        engine.handle_frame(600_000);
        assert_eq!(engine.talk_state(), 3);
        assert_eq!(engine.var(10000, 40), Err(VmError::InvalidSoundVar(40)));
    }

    #[test]
    fn created_sounds_concatenate_pcm() {
        let (mut engine, mut res, _) = setup(vec![
            (1, build::digi(11025, 0, &pcm(100), &[])),
            (2, build::digi(11025, 0, &pcm(50), &[])),
            (3, build::xsou(22050, 16, 2, &[0; 16], None)),
        ]);
        engine.create_sound(&mut res, 40, -1).unwrap();
        engine.create_sound(&mut res, 40, 1).unwrap();
        engine.create_sound(&mut res, 40, 2).unwrap();
        assert!(engine.create_sound(&mut res, 40, 3).is_err());
        let header = parse_sound(&res.get(ResourceType::Sound, 40).unwrap()).unwrap();
        assert_eq!(header.sample_count, 150);
    }

    #[test]
    fn full_queue_reports_the_dropped_start() {
        let (mut engine, mut res, _) = setup(vec![]);
        let limit = engine.config().queue_limit as i32;
        for sound in 1..=limit {
            assert_eq!(engine.start(&mut res, SoundRequest::new(sound), 0).unwrap(), None);
        }
        let overflow = engine.start(&mut res, SoundRequest::new(99), 5).unwrap();
        assert!(matches!(overflow, Some(TriggerOutcome::Failed { .. })));
        assert!(!engine.is_running(99));
        assert!(matches!(
            engine.events().last(),
            Some(SoundEvent::Failed { at_us: 5, sound: 99, .. })
        ));
    }

    #[test]
    fn one_second_sound_times_out_after_its_grace_period() {
        let (mut engine, mut res, _) = setup(vec![(1, build::digi(44100, 0, &pcm(44100), &[]))]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 2), 0).unwrap();
        let slack = engine.config().timeout_slack_us;
        assert!(engine.handle_frame(1_000_000).is_empty());
        assert!(engine.is_running(1));
        assert!(engine.handle_frame(1_000_000 + slack - 1).is_empty());
        let callbacks = engine.handle_frame(1_000_000 + slack);
        assert_eq!(
            callbacks,
            vec![SoundCallback {
                sound: 1,
                channel: 2,
                reason: EndReason::TimedOut
            }]
        );
        assert!(!engine.is_running(1));
    }

    /// Mixer handle the test can keep inspecting after the engine owns it.
    #[derive(Clone)]
    struct SharedMixer(Rc<std::cell::RefCell<SoftwareMixer>>);

    impl MixerBackend for SharedMixer {
        fn start(&mut self, channel: usize, stream: PcmStream) {
            self.0.borrow_mut().start(channel, stream);
        }

        fn modify(&mut self, channel: usize, mix: ChannelMix) {
            self.0.borrow_mut().modify(channel, mix);
        }

        fn stop(&mut self, channel: usize) {
            self.0.borrow_mut().stop(channel);
        }

        fn advance(&mut self, micros: u64) {
            self.0.borrow_mut().advance(micros);
        }

        fn take_finished(&mut self) -> Vec<usize> {
            self.0.borrow_mut().take_finished()
        }
    }

    #[test]
    fn early_callback_fires_before_the_tail_plays_out() {
        let mixer = SharedMixer(Rc::new(std::cell::RefCell::new(SoftwareMixer::new(8, 1000))));
        let config = SoundConfig {
            early_callback_bytes: 500,
            ..SoundConfig::default()
        };
        let mut engine = SoundEngine::new(config, Box::new(mixer.clone()), 1);
        let mut loader = MemoryLoader::new();
        loader.insert(ResourceType::Sound, 1, build::digi(1000, 0, &[0xff; 1000], &[]));
        let mut res = ResourceCache::new(Box::new(loader), HeapLimits::default());
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 2), 0).unwrap();

        assert!(engine.handle_frame(400_000).is_empty());
        assert!(engine.is_running(1));
        let callbacks = engine.handle_frame(600_000);
        assert_eq!(
            callbacks,
            vec![SoundCallback {
                sound: 1,
                channel: 2,
                reason: EndReason::Ended
            }]
        );
        assert!(!engine.is_running(1));
        mixer.0.borrow_mut().take_output();

        assert!(engine.handle_frame(900_000).is_empty());
        let tail = mixer.0.borrow_mut().take_output();
        assert_eq!(tail.len(), 600);
        assert!(tail.iter().all(|&sample| sample > 0));
    }

    #[test]
    fn ended_streams_are_not_stopped_but_preempted_ones_are() {
        let (mut engine, mut res, backend) = setup(vec![
            (1, build::digi(11025, 0, &pcm(100), &[])),
            (2, build::digi(11025, 0, &pcm(100), &[])),
        ]);
        engine.trigger(&mut res, on_channel(SoundRequest::new(1), 3), 0).unwrap();
        backend.finish(3);
        engine.handle_frame(1000);
        assert!(!backend.events().contains(&MixerEvent::Stop { channel: 3 }));

        engine.trigger(&mut res, on_channel(SoundRequest::new(2), 3), 2000).unwrap();
        engine.stop(2, 3000);
        assert_eq!(backend.events().last(), Some(&MixerEvent::Stop { channel: 3 }));
    }
}
