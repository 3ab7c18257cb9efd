//! Engine configuration.
//!
//! Every field has a default matching the reference instrument: a 13-fret
//! neck with 4.5 cm spacing, a single E string, a 1 s arbitration clock, a
//! 30 ms sampling clock and a 5 s sustain before an idle note pauses.
//! The application crate deserializes this from TOML.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::resolver::GatingPolicy;
use crate::spatial::Band;
use crate::strum::EdgeMemory;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timing:    TimingConfig,
    pub fretboard: FretboardConfig,
    pub strum:     StrumConfig,
    pub audio:     AudioConfig,
    pub strings:   Vec<StringConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timing:    TimingConfig::default(),
            fretboard: FretboardConfig::default(),
            strum:     StrumConfig::default(),
            audio:     AudioConfig::default(),
            strings:   vec![StringConfig::default()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub arbitration_period_ms: u64,
    pub sample_period_ms:      u64,
    pub sustain_timeout_ms:    u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            arbitration_period_ms: 1000,
            sample_period_ms:      30,
            sustain_timeout_ms:    5000,
        }
    }
}

impl TimingConfig {
    pub fn arbitration_period(&self) -> Duration { Duration::from_millis(self.arbitration_period_ms) }
    pub fn sample_period(&self)      -> Duration { Duration::from_millis(self.sample_period_ms) }
    pub fn sustain_timeout(&self)    -> Duration { Duration::from_millis(self.sustain_timeout_ms) }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct FretboardConfig {
    /// Number of notes per string including the open note 0.
    pub frets:       usize,
    /// Distance between neighbouring fret centres along x.
    pub spacing:     f32,
    /// Allowed |y| of the fretting hand.
    pub half_height: f32,
    /// Allowed |z| of the fretting hand.
    pub half_depth:  f32,
    pub gating:      GatingPolicy,
}

impl Default for FretboardConfig {
    fn default() -> Self {
        FretboardConfig {
            frets:       13,
            spacing:     0.045,
            half_height: 0.05,
            half_depth:  0.05,
            gating:      GatingPolicy::Position,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StrumConfig {
    pub edge_memory: EdgeMemory,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub base_url: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig { base_url: "sounds".to_string() }
    }
}

/// One physical string: its sound set and its strum zone.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StringConfig {
    pub name:         String,
    /// Added to the note index when building sound file names.
    pub sound_offset: u32,
    /// Height of the string at rest; a pluck is a crossing of this line.
    pub rest_line:    f32,
    pub capture_x:    Band,
    pub capture_z:    Band,
}

impl Default for StringConfig {
    fn default() -> Self {
        StringConfig {
            name:         "E".to_string(),
            sound_offset: 0,
            rest_line:    0.0,
            capture_x:    Band::new(-0.30, -0.05),
            capture_z:    Band::new(-0.06, 0.06),
        }
    }
}

impl EngineConfig {
    /// Reference configuration with `strings` in place of the default list.
    pub fn with_strings(strings: Vec<StringConfig>) -> Self {
        EngineConfig { strings, ..EngineConfig::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fb = &self.fretboard;
        if !(2..=128).contains(&fb.frets) {
            return Err(ConfigError::InvalidFretCount(fb.frets));
        }
        if !(fb.spacing.is_finite() && fb.spacing > 0.0) {
            return Err(ConfigError::InvalidSpacing(fb.spacing));
        }
        if !(fb.half_height >= 0.0 && fb.half_depth >= 0.0) {
            return Err(ConfigError::InvalidBounds {
                half_height: fb.half_height,
                half_depth:  fb.half_depth,
            });
        }

        let t = &self.timing;
        if t.arbitration_period_ms == 0 { return Err(ConfigError::ZeroPeriod("arbitration_period_ms")); }
        if t.sample_period_ms == 0      { return Err(ConfigError::ZeroPeriod("sample_period_ms")); }
        if t.sustain_timeout_ms == 0    { return Err(ConfigError::ZeroPeriod("sustain_timeout_ms")); }

        if self.strings.is_empty() {
            return Err(ConfigError::NoStrings);
        }
        let mut seen = HashSet::new();
        for s in &self.strings {
            if !seen.insert(s.name.as_str()) {
                return Err(ConfigError::DuplicateString(s.name.clone()));
            }
            for (axis, band) in [('x', s.capture_x), ('z', s.capture_z)] {
                if !band.is_valid() {
                    return Err(ConfigError::InvalidCaptureBand {
                        name: s.name.clone(),
                        axis,
                        min: band.min,
                        max: band.max,
                    });
                }
            }
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
