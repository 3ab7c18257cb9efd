//! Per-string sound channels.
//!
//! A channel owns the pre-loaded sounds of one string (one per fret) and at
//! most one live sound instance:
//!
//! ```text
//!            play(n)                 play(m != n): stop, start m
//!   Idle ───────────────► Playing(n) ◄──────────────────────────┐
//!                          │    ▲  play(n): rewind              │
//!          sustain elapsed │    │                               │
//!                          ▼    │ play(n): rewind + unpause     │
//!                        Paused(n) ─────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::AudioError;
use crate::fretboard::Note;

// ════════════════════════════════════════════════════════════════════════════
// AudioBackend — the audio collaborator
// ════════════════════════════════════════════════════════════════════════════

/// Handle to a loaded sound resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SoundId(pub u32);

/// Handle to one playing (or held) instance of a sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

/// Playback parameters applied when starting or updating an instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackOptions {
    pub pitch:   f32,
    pub doppler: f32,
    /// Playback position in seconds.
    pub time:    f32,
    pub paused:  bool,
    pub looping: bool,
    pub volume:  f32,
}

impl PlaybackOptions {
    /// Unshifted, unlooped, full volume, from the top.
    pub const FROM_START: PlaybackOptions = PlaybackOptions {
        pitch:   0.0,
        doppler: 0.0,
        time:    0.0,
        paused:  false,
        looping: false,
        volume:  1.0,
    };

    /// Held silent at the top.
    pub const HOLD: PlaybackOptions = PlaybackOptions { paused: true, ..Self::FROM_START };
}

pub trait AudioBackend {
    fn load_sound(&mut self, uri: &str) -> Result<SoundId, AudioError>;
    fn start_instance(&mut self, sound: SoundId, options: &PlaybackOptions) -> InstanceId;
    fn set_state(&mut self, instance: InstanceId, options: &PlaybackOptions);
    fn stop(&mut self, instance: InstanceId);
}

/// `<base_url>/Guitar_<name>_<index>.wav`
pub fn sound_uri(base_url: &str, string_name: &str, index: u32) -> String {
    format!("{}/Guitar_{}_{}.wav", base_url.trim_end_matches('/'), string_name, index)
}

// ════════════════════════════════════════════════════════════════════════════
// StringChannel
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Playing { note: Note, instance: InstanceId, started_at: Instant },
    Paused  { note: Note, instance: InstanceId },
}

/// What a [`StringChannel::play_string`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayAction {
    /// Nothing was sounding; a new instance started.
    Started,
    /// A different note was sounding; it was stopped and a new one started.
    Switched,
    /// The same note was sounding or held; it was rewound.
    Restarted,
    /// The note's sound never loaded; nothing changed.
    Unavailable,
}

#[derive(Debug)]
pub struct StringChannel {
    name:    String,
    sounds:  Vec<Option<SoundId>>,
    sustain: Duration,
    state:   ChannelState,
}

impl StringChannel {
    /// Load `frets` sounds for string `name`.
    ///
    /// Sound `i` comes from file index `i + sound_offset`.  Sounds that fail
    /// to load are remembered as missing and stay silent for the session.
    pub fn load(
        name:         &str,
        base_url:     &str,
        sound_offset: u32,
        frets:        usize,
        sustain:      Duration,
        audio:        &mut dyn AudioBackend,
    ) -> Self {
        let sounds = (0..frets as u32)
            .map(|i| {
                let uri = sound_uri(base_url, name, i + sound_offset);
                debug!("loading sound {}", uri);
                match audio.load_sound(&uri) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        warn!("string {}: note {} unavailable: {}", name, i, e);
                        None
                    }
                }
            })
            .collect();

        StringChannel { name: name.to_string(), sounds, sustain, state: ChannelState::Idle }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn state(&self) -> ChannelState { self.state }

    pub fn note_count(&self) -> usize { self.sounds.len() }

    pub fn is_loaded(&self, note: Note) -> bool {
        self.sounds.get(note.index()).is_some_and(Option::is_some)
    }

    /// The note currently sounding or held, if any.
    pub fn current_note(&self) -> Option<Note> {
        match self.state {
            ChannelState::Idle                  => None,
            ChannelState::Playing { note, .. }  => Some(note),
            ChannelState::Paused  { note, .. }  => Some(note),
        }
    }

    /// Sound `note` from the top, keeping exactly one instance alive.
    pub fn play_string(&mut self, note: Note, now: Instant, audio: &mut dyn AudioBackend) -> PlayAction {
        assert!(
            note.index() < self.sounds.len(),
            "string {}: {} outside {} loaded notes", self.name, note, self.sounds.len()
        );
        let Some(sound) = self.sounds[note.index()] else {
            debug!("string {}: {} has no sound, ignoring pluck", self.name, note);
            return PlayAction::Unavailable;
        };

        let (instance, action) = match self.state {
            ChannelState::Playing { note: playing, instance, .. }
            | ChannelState::Paused { note: playing, instance } if playing == note => {
                debug!("string {}: {} already sounding, restarting", self.name, note);
                audio.set_state(instance, &PlaybackOptions::FROM_START);
                (instance, PlayAction::Restarted)
            }
            ChannelState::Playing { instance, .. } | ChannelState::Paused { instance, .. } => {
                info!("string {}: switching to {}", self.name, note);
                audio.stop(instance);
                (audio.start_instance(sound, &PlaybackOptions::FROM_START), PlayAction::Switched)
            }
            ChannelState::Idle => {
                info!("string {}: first note {}", self.name, note);
                (audio.start_instance(sound, &PlaybackOptions::FROM_START), PlayAction::Started)
            }
        };

        self.state = ChannelState::Playing { note, instance, started_at: now };
        action
    }

    /// Hold a note that has been sounding for the sustain timeout.
    ///
    /// Returns `true` on the tick the channel pauses.
    pub fn pause_if_needed(&mut self, now: Instant, audio: &mut dyn AudioBackend) -> bool {
        let ChannelState::Playing { note, instance, started_at } = self.state else {
            return false;
        };
        if now.saturating_duration_since(started_at) < self.sustain {
            return false;
        }
        info!("string {}: {:?} elapsed, pausing {}", self.name, self.sustain, note);
        audio.set_state(instance, &PlaybackOptions::HOLD);
        self.state = ChannelState::Paused { note, instance };
        true
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
