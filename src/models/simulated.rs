//! A stand-in TTS model with realistic residency behavior.
//!
//! Holds a weight buffer of configurable size, sleeps to emulate load and
//! transfer latency, and refuses to generate unless it is on the
//! accelerator. Output is a deterministic tone whose length scales with the
//! input text, so callers can exercise the full pipeline without a GPU.

use std::f32::consts::TAU;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::residency::{Device, ModelError, ModelLoader, ResidentModel};
use crate::synthesis::{AudioBuffer, SynthesisParams, Synthesizer};

pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Samples emitted per input character.
const SAMPLES_PER_CHAR: usize = 1_200;

/// Simulated model parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedModelConfig {
    pub name: String,
    pub weights_bytes: usize,
    /// Time to construct the model on the accelerator.
    pub load_delay: Duration,
    /// Time for one accelerator/host transfer.
    pub transfer_delay: Duration,
    pub sample_rate: u32,
}

impl Default for SimulatedModelConfig {
    fn default() -> Self {
        Self {
            name: "simulated-tts".to_string(),
            weights_bytes: 64 * 1024 * 1024,
            load_delay: Duration::from_millis(500),
            transfer_delay: Duration::from_millis(100),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// A loaded simulated model.
pub struct SimulatedVoice {
    weights: Vec<u8>,
    device: Device,
    transfer_delay: Duration,
    sample_rate: u32,
}

impl SimulatedVoice {
    pub fn device(&self) -> Device {
        self.device
    }

    pub fn weights_bytes(&self) -> usize {
        self.weights.len()
    }
}

impl ResidentModel for SimulatedVoice {
    fn migrate(mut self, target: Device) -> Result<Self, ModelError> {
        if self.device != target {
            std::thread::sleep(self.transfer_delay);
            self.device = target;
        }
        Ok(self)
    }
}

impl Synthesizer for SimulatedVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn generate(&self, text: &str, params: &SynthesisParams) -> Result<AudioBuffer, ModelError> {
        if self.device != Device::Accelerator {
            return Err(ModelError::NotResident {
                expected: Device::Accelerator,
                actual: self.device,
            });
        }

        let len = text.chars().count() * SAMPLES_PER_CHAR;
        // Pitch follows the first weight byte so two instances are
        // distinguishable; amplitude follows exaggeration.
        let seed = self.weights.first().copied().unwrap_or(0) as f32;
        let freq = 180.0 + seed + params.temperature * 20.0;
        let amplitude = 0.3 + 0.5 * params.exaggeration.clamp(0.0, 1.0);
        let rate = self.sample_rate as f32;

        let samples = (0..len)
            .map(|i| amplitude * (TAU * freq * i as f32 / rate).sin())
            .collect();

        Ok(AudioBuffer {
            sample_rate: self.sample_rate,
            samples,
        })
    }
}

/// Constructs [`SimulatedVoice`] instances on the accelerator.
pub struct SimulatedLoader {
    config: SimulatedModelConfig,
}

impl SimulatedLoader {
    pub fn new(config: SimulatedModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatedModelConfig {
        &self.config
    }
}

impl ModelLoader<SimulatedVoice> for SimulatedLoader {
    fn load(&self) -> Result<SimulatedVoice, ModelError> {
        if self.config.sample_rate == 0 {
            return Err(ModelError::backend("sample rate must be non-zero"));
        }
        std::thread::sleep(self.config.load_delay);

        let seed = self.config.name.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
        Ok(SimulatedVoice {
            weights: vec![seed; self.config.weights_bytes],
            device: Device::Accelerator,
            transfer_delay: self.config.transfer_delay,
            sample_rate: self.config.sample_rate,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> SimulatedModelConfig {
        SimulatedModelConfig {
            name: "unit".to_string(),
            weights_bytes: 1024,
            load_delay: Duration::ZERO,
            transfer_delay: Duration::ZERO,
            sample_rate: 16_000,
        }
    }

    #[test]
    fn test_load_lands_on_accelerator() {
        let voice = SimulatedLoader::new(fast_config()).load().unwrap();
        assert_eq!(voice.device(), Device::Accelerator);
        assert_eq!(voice.weights_bytes(), 1024);
    }

    #[test]
    fn test_generate_scales_with_text() {
        let voice = SimulatedLoader::new(fast_config()).load().unwrap();
        let params = SynthesisParams::default();

        let short = voice.generate("hi", &params).unwrap();
        let long = voice.generate("hello there", &params).unwrap();
        assert_eq!(short.sample_rate, 16_000);
        assert_eq!(short.samples.len(), 2 * SAMPLES_PER_CHAR);
        assert!(long.samples.len() > short.samples.len());
        assert!(long.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_generate_refused_on_host() {
        let voice = SimulatedLoader::new(fast_config()).load().unwrap();
        let voice = voice.migrate(Device::Host).unwrap();

        match voice.generate("hi", &SynthesisParams::default()) {
            Err(ModelError::NotResident { actual, .. }) => assert_eq!(actual, Device::Host),
            other => panic!("expected NotResident, got {:?}", other.map(|a| a.samples.len())),
        }

        let voice = voice.migrate(Device::Accelerator).unwrap();
        assert!(voice.generate("hi", &SynthesisParams::default()).is_ok());
    }

    #[test]
    fn test_zero_sample_rate_fails_load() {
        let config = SimulatedModelConfig { sample_rate: 0, ..fast_config() };
        assert!(SimulatedLoader::new(config).load().is_err());
    }
}
