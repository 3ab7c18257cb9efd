//! Real-time MIDI audio backend.
//!
//! Each string's per-fret samples are stood in for by MIDI pitches: the app
//! registers every sound URI the engine will ask for against a pitch
//! (`open_pitch + fret`), and instances become note-on / note-off pairs on
//! that string's own channel.
//!
//! | Engine request | MIDI |
//! |---|---|
//! | start instance | note-on |
//! | set state, paused | note-off |
//! | set state, unpaused | note-off, note-on (retrigger) |
//! | stop | note-off |

use std::collections::HashMap;

use log::{debug, info, warn};
use string_engine::{sound_uri, AudioBackend, AudioError, EngineConfig, InstanceId, PlaybackOptions, SoundId};

// ════════════════════════════════════════════════════════════════════════════
// MidiOut — abstraction over midir / null (for testing)
// ════════════════════════════════════════════════════════════════════════════

pub trait MidiOut {
    fn program_change(&mut self, channel: u8, program: u8);
    fn note_on(&mut self,  channel: u8, note: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, note: u8);
}

// ── midir backend ─────────────────────────────────────────────────────────

pub struct MidirOut {
    conn: midir::MidiOutputConnection,
}

impl MidiOut for MidirOut {
    fn program_change(&mut self, channel: u8, program: u8) {
        let _ = self.conn.send(&[0xC0 | (channel & 0x0F), program & 0x7F]);
    }
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        let _ = self.conn.send(&[0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]);
    }
    fn note_off(&mut self, channel: u8, note: u8) {
        let _ = self.conn.send(&[0x80 | (channel & 0x0F), note & 0x7F, 0]);
    }
}

// ── null backend (used when no MIDI port is available) ────────────────────

pub struct NullOut;
impl MidiOut for NullOut {
    fn program_change(&mut self, _ch: u8, _p: u8)   {}
    fn note_on(&mut self, _ch: u8, _n: u8, _v: u8)  {}
    fn note_off(&mut self, _ch: u8, _n: u8)          {}
}

// ════════════════════════════════════════════════════════════════════════════
// open_midi_output — enumerate ports and pick first available
// ════════════════════════════════════════════════════════════════════════════

/// Try to open a MIDI output port, preferring a software synthesiser.
/// Falls back to `NullOut` with a warning if none found.
pub fn open_midi_output(client_name: &str) -> Box<dyn MidiOut> {
    let midi_out = match midir::MidiOutput::new(client_name) {
        Ok(m)  => m,
        Err(e) => {
            warn!("MIDI init error: {}, using null output", e);
            return Box::new(NullOut);
        }
    };

    let ports = midi_out.ports();
    if ports.is_empty() {
        warn!("no MIDI output ports found, using null output");
        warn!("install a MIDI synthesiser such as `fluidsynth` or `timidity -iA`");
        return Box::new(NullOut);
    }

    let port_idx = ports.iter()
        .position(|p| {
            midi_out.port_name(p).map(|n| {
                let n = n.to_lowercase();
                n.contains("fluid") || n.contains("timidity") ||
                n.contains("microsoft") || n.contains("synth")
            }).unwrap_or(false)
        })
        .unwrap_or(0);

    let port = &ports[port_idx];
    let name = midi_out.port_name(port)
        .unwrap_or_else(|_| "Unknown".to_string());
    info!("opening MIDI port: {}", name);

    match midi_out.connect(port, "leap-guitar") {
        Ok(conn) => Box::new(MidirOut { conn }),
        Err(e) => {
            warn!("failed to connect to {}: {}, using null output", name, e);
            Box::new(NullOut)
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// MidiAudio — AudioBackend over a MidiOut
// ════════════════════════════════════════════════════════════════════════════

/// MIDI channel reserved for percussion by General MIDI.
const DRUM_CHANNEL: u8 = 9;

/// The `k`-th melodic channel counting from `base`, skipping percussion.
fn string_channel(base: u8, k: usize) -> u8 {
    let melodic: Vec<u8> = (0..16).filter(|&c| c != DRUM_CHANNEL).collect();
    let start = melodic.iter().position(|&c| c == base).unwrap_or(0);
    melodic[(start + k) % melodic.len()]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Tone {
    channel: u8,
    pitch:   u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Voice {
    tone:     Tone,
    sounding: bool,
}

pub struct MidiAudio {
    out:        Box<dyn MidiOut>,
    channel:    u8,
    program:    u8,
    velocity:   u8,
    /// Channels that have received the program change.
    programmed: Vec<u8>,
    /// URI → tone, filled before the engine loads its sounds.
    catalogue:  HashMap<String, Tone>,
    /// Tone of each loaded sound, indexed by `SoundId`.
    loaded:     Vec<Tone>,
    voices:     HashMap<InstanceId, Voice>,
    next_id:    u32,
}

impl MidiAudio {
    pub fn new(out: Box<dyn MidiOut>, channel: u8, program: u8, velocity: u8) -> Self {
        let mut audio = MidiAudio {
            out,
            channel,
            program,
            velocity,
            programmed: Vec::new(),
            catalogue:  HashMap::new(),
            loaded:     Vec::new(),
            voices:     HashMap::new(),
            next_id:    1,
        };
        audio.ensure_program(channel);
        audio
    }

    fn ensure_program(&mut self, channel: u8) {
        if !self.programmed.contains(&channel) {
            self.out.program_change(channel, self.program);
            self.programmed.push(channel);
        }
    }

    /// Make `uri` loadable as `pitch` on the base channel.
    pub fn register(&mut self, uri: &str, pitch: u8) {
        self.register_on(uri, self.channel, pitch);
    }

    /// Make `uri` loadable as `pitch` on `channel`.
    pub fn register_on(&mut self, uri: &str, channel: u8, pitch: u8) {
        self.ensure_program(channel);
        self.catalogue.insert(uri.to_string(), Tone { channel, pitch });
    }

    /// Register every sound `config` will ask for, one semitone per fret from
    /// each string's open pitch.  Each string plays on its own channel so
    /// equal pitches on different strings release independently.  Strings
    /// with no open pitch are skipped and will fail to load.
    pub fn register_strings(&mut self, config: &EngineConfig, open_pitch: impl Fn(&str) -> Option<u8>) {
        for (k, s) in config.strings.iter().enumerate() {
            let Some(open) = open_pitch(&s.name) else {
                warn!("no open pitch for string {}, it will stay silent", s.name);
                continue;
            };
            let channel = string_channel(self.channel, k);
            debug!("string {} on MIDI channel {}", s.name, channel);
            for i in 0..config.fretboard.frets as u32 {
                let uri = sound_uri(&config.audio.base_url, &s.name, i + s.sound_offset);
                let pitch = (open as u32 + i).min(127) as u8;
                self.register_on(&uri, channel, pitch);
            }
        }
    }

    /// Number of instances currently sounding.
    pub fn sounding(&self) -> usize {
        self.voices.values().filter(|v| v.sounding).count()
    }

    fn velocity_for(&self, options: &PlaybackOptions) -> u8 {
        (self.velocity as f32 * options.volume.clamp(0.0, 1.0)).round() as u8
    }

    fn silence(&mut self, instance: InstanceId) {
        if let Some(v) = self.voices.get_mut(&instance) {
            if v.sounding {
                self.out.note_off(v.tone.channel, v.tone.pitch);
                v.sounding = false;
            }
        }
    }
}

impl AudioBackend for MidiAudio {
    fn load_sound(&mut self, uri: &str) -> Result<SoundId, AudioError> {
        let tone = *self.catalogue.get(uri).ok_or_else(|| AudioError::NotFound(uri.to_string()))?;
        self.loaded.push(tone);
        Ok(SoundId(self.loaded.len() as u32 - 1))
    }

    fn start_instance(&mut self, sound: SoundId, options: &PlaybackOptions) -> InstanceId {
        let id = InstanceId(self.next_id);
        self.next_id += 1;

        let Some(&tone) = self.loaded.get(sound.0 as usize) else {
            warn!("start of unknown sound {:?} ignored", sound);
            return id;
        };
        let sounding = !options.paused;
        if sounding {
            let vel = self.velocity_for(options);
            self.out.note_on(tone.channel, tone.pitch, vel);
        }
        debug!("instance {} pitch {} on channel {} started", id.0, tone.pitch, tone.channel);
        self.voices.insert(id, Voice { tone, sounding });
        id
    }

    fn set_state(&mut self, instance: InstanceId, options: &PlaybackOptions) {
        self.silence(instance);
        if options.paused {
            return;
        }
        let vel = self.velocity_for(options);
        if let Some(v) = self.voices.get_mut(&instance) {
            self.out.note_on(v.tone.channel, v.tone.pitch, vel);
            v.sounding = true;
        }
    }

    fn stop(&mut self, instance: InstanceId) {
        self.silence(instance);
        self.voices.remove(&instance);
    }
}

impl Drop for MidiAudio {
    fn drop(&mut self) {
        let ids: Vec<InstanceId> = self.voices.keys().copied().collect();
        for id in ids {
            self.silence(id);
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
