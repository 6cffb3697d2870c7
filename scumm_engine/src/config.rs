use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::opcodes::SUPPORTED_VERSIONS;
use crate::resource::HeapLimits;
use crate::sound::SoundConfig;
use crate::vars::{well_known, NUM_LOCALS};

/// Interpreter sizing and tuning. Every field has a default, so a JSON file
/// only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub version: u16,
    pub global_vars: usize,
    pub room_vars: usize,
    pub bit_vars: usize,
    pub local_vars: usize,
    pub script_slots: usize,
    /// Scripts numbered below this are global; the rest are room scripts.
    pub global_scripts: i32,
    pub array_slots: usize,
    pub stack_depth: usize,
    pub frame_us: u64,
    /// Instructions one slot may execute per frame before it is declared
    /// runaway.
    pub instruction_budget: u32,
    pub nesting_limit: usize,
    pub seed: u64,
    pub heap: HeapLimits,
    pub sound: SoundConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            version: 90,
            global_vars: 512,
            room_vars: 64,
            bit_vars: 2048,
            local_vars: NUM_LOCALS,
            script_slots: 80,
            global_scripts: 200,
            array_slots: 256,
            stack_depth: 150,
            frame_us: 16_667,
            instruction_budget: 100_000,
            nesting_limit: 15,
            seed: 0x5eed,
            heap: HeapLimits::default(),
            sound: SoundConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            SUPPORTED_VERSIONS.contains(&self.version),
            "unsupported HE version {} (expected one of {SUPPORTED_VERSIONS:?})",
            self.version
        );
        ensure!(
            self.global_vars > well_known::OPERATION_FAILURE as usize,
            "need at least {} global variables, got {}",
            well_known::OPERATION_FAILURE as usize + 1,
            self.global_vars
        );
        ensure!(
            (1..=NUM_LOCALS).contains(&self.local_vars),
            "local variables per slot must be 1..={NUM_LOCALS}, got {}",
            self.local_vars
        );
        ensure!(self.script_slots > 0, "no script slots configured");
        ensure!(self.array_slots > 0, "no array slots configured");
        ensure!(self.array_slots < 0x1000, "array slots must fit a 12-bit handle");
        ensure!(self.stack_depth > 0, "operand stack depth must be positive");
        ensure!(self.frame_us > 0, "frame duration must be positive");
        ensure!(self.instruction_budget > 0, "instruction budget must be positive");
        ensure!(
            self.heap.min <= self.heap.max,
            "resource heap min {} exceeds max {}",
            self.heap.min,
            self.heap.max
        );

        let sound = &self.sound;
        ensure!(sound.channels > 0, "sound channel bank is empty");
        ensure!(
            sound.dynamic_start < sound.channels,
            "dynamic channel start {} is beyond the {} channel bank",
            sound.dynamic_start,
            sound.channels
        );
        ensure!(
            sound.talkie_channel < sound.channels && sound.music_channel < sound.channels,
            "talkie/music channels must be inside the {} channel bank",
            sound.channels
        );
        ensure!(sound.queue_limit > 0, "sound queue limit must be positive");
        ensure!(sound.output_rate > 0, "mixer output rate must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": 72, "sound": {{"channels": 4, "dynamic_start": 3}}}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.version, 72);
        assert_eq!(config.sound.channels, 4);
        assert_eq!(config.sound.talkie_channel, SoundConfig::default().talkie_channel);
        assert_eq!(config.script_slots, EngineConfig::default().script_slots);
    }

    #[test]
    fn rejects_nonsense() {
        let mut config = EngineConfig {
            version: 73,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        config.version = 100;
        config.sound.channels = 0;
        assert!(config.validate().is_err());

        config.sound.channels = 4;
        config.sound.dynamic_start = 4;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dynamic channel start"));
    }
}
