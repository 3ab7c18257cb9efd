//! # string_engine
//!
//! Real-time interaction engine for a shared virtual stringed instrument.
//! Many remote users each contribute tracked hands; the engine decides whose
//! hands are in control, maps the controlling left hand to a fret, turns the
//! controlling right hand's motion into plucks, and drives one sound channel
//! per string.
//!
//! ## Components
//!
//! | Module | Role |
//! |---|---|
//! | [`spatial`] | floor-plane distance, axis bands |
//! | [`hand`] | per-side registry of users' hands and nearest-hand arbitration |
//! | [`fretboard`] | fret geometry, [`Note`], touch bookkeeping |
//! | [`resolver`] | controlling left hand → current note + fret highlight |
//! | [`strum`] | rest-line crossing detector per string zone |
//! | [`channel`] | per-string sound state machine with idle pause |
//! | [`engine`] | event queue and the two periodic clocks |
//!
//! The scene, tracking and audio layers stay outside: they appear only as the
//! [`HandTracker`], [`FretVisuals`] and [`AudioBackend`] traits.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::time::Instant;
//! use string_engine::{EngineConfig, EngineEvent, InteractionEngine, UserId};
//!
//! let mut engine = InteractionEngine::new(EngineConfig::default(), tracker, frets, audio)?;
//! engine.push_event(EngineEvent::SessionStarted);
//! engine.push_event(EngineEvent::UserJoined(UserId(1)));
//! loop {
//!     // feed HandMoved events from the tracking layer, then:
//!     let report = engine.advance(Instant::now());
//! }
//! ```

pub mod channel;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fretboard;
pub mod hand;
pub mod resolver;
pub mod spatial;
pub mod strum;

pub use channel::{
    sound_uri, AudioBackend, ChannelState, InstanceId, PlayAction, PlaybackOptions, SoundId,
    StringChannel,
};
pub use config::{AudioConfig, EngineConfig, FretboardConfig, StringConfig, StrumConfig, TimingConfig};
pub use engine::{EngineEvent, HandTracker, InteractionEngine, TickReport, TickSnapshot};
pub use error::{AudioError, ConfigError, EngineError, EngineResult, TrackingError};
pub use fretboard::{FretboardGeometry, Note, TouchSet};
pub use hand::{HandArbiter, Side, TrackedHand, UserId};
pub use resolver::{Contact, FretVisuals, GatingPolicy, NoteResolver};
pub use spatial::{flat_distance, Band, Vec3};
pub use strum::{EdgeMemory, Pluck, Stroke, StrumDetector, StrumZone};
