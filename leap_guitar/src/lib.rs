//! # leap_guitar
//!
//! A shared air-guitar.  Every connected player contributes two tracked
//! hands; the [`string_engine`] picks the nearest left hand to fret and the
//! nearest right hand to strum, and the result is played over real-time MIDI
//! and drawn in a fretboard window.
//!
//! ## Hand → Action mapping
//!
//! | Hand | Motion | Action |
//! |---|---|---|
//! | Left | Slide along the neck (x) | Select the fret under the palm |
//! | Left | Leave the neck | Open string |
//! | Right | Cross a string's rest line downward | Down-stroke pluck |
//! | Right | Cross a string's rest line upward | Up-stroke pluck |
//! | Either | Step closer than everyone else | Take control at the next arbitration |
//!
//! ## Feature flags
//!
//! * (default) — **Simulation mode**: the keyboard drives the local player,
//!   scripted remote players orbit the instrument.
//! * `leap` — **Hardware mode**: the local player's palms come from a real
//!   LeapMotion controller via LeapC.
//!
//! ### Simulation keyboard shortcuts
//!
//! | Key | Action |
//! |---|---|
//! | `←` / `→` (hold) | Slide left hand toward the body / the nut |
//! | `↑` / `↓` (hold) | Step toward / away from the instrument |
//! | `W` / `S` (hold) | Raise / lower right hand |
//! | `Space` | Flick the right hand across the string |
//! | `J` / `K` | Add / remove a remote player |
//! | `Q` | Quit |

use std::path::PathBuf;

use string_engine::EngineError;
use thiserror::Error;

pub mod app;
pub mod config;
pub mod player;
pub mod tracking;
pub mod visualizer;

/// Everything that can abort startup.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("Malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Could not read {}: {source}", .path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Window error: {0}")]
    Window(String),
}
