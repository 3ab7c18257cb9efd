//! Software-rendered visualizer using `minifb`.
//!
//! Layout:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ NECK (side view, x → right, y ↑)                                     │
//! │   strum zone │ fret 12 ... fret 1 │ nut        ● hands (active ring) │
//! │              • dots at 3 5 7 9, double at 12                         │
//! ├────────────────────┬─────────────────────────────────────────────────┤
//! │ FLOOR (top view)   │ players, distances, channel states              │
//! │   + instrument     │                                                 │
//! ├────────────────────┴─────────────────────────────────────────────────┤
//! │ status line / key legend                                             │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::mpsc::Sender;

use minifb::{Key, KeyRepeat, Window, WindowOptions};
use string_engine::{
    flat_distance, ChannelState, FretVisuals, FretboardGeometry, HandArbiter, Note, StringChannel,
    StrumZone, TrackedHand, UserId, Vec3,
};

use crate::tracking::{SimInput, SimKey};
use crate::AppError;

// ════════════════════════════════════════════════════════════════════════════
// FretHighlights — the engine's view of the fret meshes
// ════════════════════════════════════════════════════════════════════════════

/// Highlight flag per fret, driven by the engine through [`FretVisuals`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FretHighlights {
    lit: Vec<bool>,
}

impl FretHighlights {
    pub fn new(frets: usize) -> Self {
        FretHighlights { lit: vec![false; frets] }
    }

    pub fn is_lit(&self, fret: Note) -> bool {
        self.lit.get(fret.index()).copied().unwrap_or(false)
    }

    pub fn lit(&self) -> impl Iterator<Item = Note> + '_ {
        self.lit.iter().enumerate().filter(|&(_, &on)| on).map(|(i, _)| Note(i as u8))
    }
}

impl FretVisuals for FretHighlights {
    fn set_highlighted(&mut self, fret: Note, highlighted: bool) {
        if let Some(slot) = self.lit.get_mut(fret.index()) {
            *slot = highlighted;
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Layout constants
// ════════════════════════════════════════════════════════════════════════════

pub const WIN_W:     usize = 1000;
pub const WIN_H:     usize = 560;
const NECK_Y:        usize = 40;
const NECK_H:        usize = 220;
const FLOOR_Y:       usize = 280;
const FLOOR_W:       usize = 300;
const FLOOR_H:       usize = 220;
const INFO_X:        usize = FLOOR_W + 20;
const STATUS_Y:      usize = WIN_H - 44;
const MARGIN:        usize = 30;

/// Instrument-space window shown in the neck panel, metres.
const VIEW_X:        (f32, f32) = (-0.35, 0.65);
const VIEW_Y:        (f32, f32) = (-0.15, 0.15);
/// Floor panel scale, pixels per metre.
const FLOOR_SCALE:   f32   = 60.0;

const GLYPH_SCALE:   usize = 2;
const GLYPH_ADVANCE: usize = 4 * GLYPH_SCALE;

const BG_COLOR:      u32 = 0xFF14151F;
const PANEL_BG:      u32 = 0xFF1C2033;
const FRET_COLOR:    u32 = 0xFF5A4632;
const FRET_LIT:      u32 = 0xFFFFC04D;
const WIRE_COLOR:    u32 = 0xFFB8B8B8;
const DOT_COLOR:     u32 = 0xFFEDE6D6;
const ZONE_COLOR:    u32 = 0xFF2D4D3A;
const REST_COLOR:    u32 = 0xFF7CFC9A;
const LEFT_COLOR:    u32 = 0xFF4DD2FF;
const RIGHT_COLOR:   u32 = 0xFFFF8C42;
const TEXT_COLOR:    u32 = 0xFFEEEEEE;
const DIM_TEXT:      u32 = 0xFF888888;
const STATUS_BG:     u32 = 0xFF0F3460;

// ════════════════════════════════════════════════════════════════════════════
// Scene — everything one frame shows
// ════════════════════════════════════════════════════════════════════════════

pub struct Scene<'a> {
    pub geometry:   &'a FretboardGeometry,
    pub highlights: &'a FretHighlights,
    pub zones:      &'a [StrumZone],
    pub left:       &'a HandArbiter,
    pub right:      &'a HandArbiter,
    pub channels:   &'a [StringChannel],
    pub note:       Note,
    pub status:     &'a str,
}

// ════════════════════════════════════════════════════════════════════════════
// Visualizer
// ════════════════════════════════════════════════════════════════════════════

pub struct Visualizer {
    window: Window,
    buf:    Vec<u32>,
    sim_tx: Sender<SimInput>,
}

impl Visualizer {
    pub fn new(sim_tx: Sender<SimInput>) -> Result<Self, AppError> {
        let mut window = Window::new(
            "Leap Guitar - shared air guitar",
            WIN_W, WIN_H,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        ).map_err(|e| AppError::Window(e.to_string()))?;

        window.limit_update_rate(Some(std::time::Duration::from_millis(16))); // ~60fps

        Ok(Visualizer {
            window,
            buf: vec![BG_COLOR; WIN_W * WIN_H],
            sim_tx,
        })
    }

    /// Returns false when the window should close.
    pub fn is_open(&self) -> bool { self.window.is_open() }

    /// Forward key presses and releases to the simulation.  Returns false on
    /// quit.
    pub fn poll_input(&mut self) -> bool {
        if !self.window.is_open() { return false; }

        for key in self.window.get_keys_pressed(KeyRepeat::No) {
            if let Some(k) = sim_key(key) {
                let _ = self.sim_tx.send(SimInput::KeyDown(k));
                if k == SimKey::Quit { return false; }
            }
        }
        for key in self.window.get_keys_released() {
            if let Some(k) = sim_key(key) {
                let _ = self.sim_tx.send(SimInput::KeyUp(k));
            }
        }
        true
    }

    /// Render one frame.
    pub fn render(&mut self, scene: &Scene) {
        self.buf.fill(BG_COLOR);

        self.draw_label("NECK", 10, NECK_Y - 16, DIM_TEXT);
        self.fill_rect(0, NECK_Y, WIN_W, NECK_H, PANEL_BG);
        self.draw_zones(scene.zones);
        self.draw_frets(scene.geometry, scene.highlights);
        self.draw_side_hands(scene.left, LEFT_COLOR);
        self.draw_side_hands(scene.right, RIGHT_COLOR);

        self.draw_label("FLOOR", 10, FLOOR_Y - 16, DIM_TEXT);
        self.fill_rect(0, FLOOR_Y, FLOOR_W, FLOOR_H, PANEL_BG);
        self.draw_floor(scene.left, scene.right);
        self.draw_info(scene);

        // ── Status bar ────────────────────────────────────────────────────
        self.fill_rect(0, STATUS_Y, WIN_W, WIN_H - STATUS_Y, STATUS_BG);
        self.draw_label(scene.status, 10, STATUS_Y + 8, TEXT_COLOR);
        self.draw_label(
            "arrows=fret/step  W/S=hand  space=flick  J/K=players  Q=quit",
            10, WIN_H - 16, DIM_TEXT,
        );

        self.window.update_with_buffer(&self.buf, WIN_W, WIN_H).ok();
    }

    // ── Neck panel ────────────────────────────────────────────────────────

    fn draw_frets(&mut self, geometry: &FretboardGeometry, lit: &FretHighlights) {
        let top    = neck_py(geometry.half_height());
        let bottom = neck_py(-geometry.half_height());
        let h      = (bottom - top).max(1) as usize;

        for i in 1..geometry.frets() {
            let band = geometry.fret_band(i);
            let x0 = neck_px(band.min);
            let x1 = neck_px(band.max);
            let color = if lit.is_lit(Note(i as u8)) { FRET_LIT } else { FRET_COLOR };
            self.fill_rect_i(x0 + 1, top, (x1 - x0 - 1).max(1) as usize, h, color);
            self.vline_i(x0, top, h, WIRE_COLOR);

            let marker_y = bottom + 10;
            let cx = neck_px(geometry.fret_centre(i));
            match i {
                3 | 5 | 7 | 9 => self.fill_rect_i(cx - 2, marker_y, 5, 5, DOT_COLOR),
                12 => {
                    self.fill_rect_i(cx - 7, marker_y, 5, 5, DOT_COLOR);
                    self.fill_rect_i(cx + 3, marker_y, 5, 5, DOT_COLOR);
                }
                _ => {}
            }
            let label = i.to_string();
            self.draw_label_i(&label, cx - (label.len() * GLYPH_ADVANCE / 2) as isize, top - 14, DIM_TEXT);
        }

        // The nut closes the neck past the first fret.
        let nut = neck_px(geometry.fret_band(1).max);
        self.fill_rect_i(nut, top, 3, h, DOT_COLOR);
    }

    fn draw_zones(&mut self, zones: &[StrumZone]) {
        let top    = neck_py(VIEW_Y.1);
        let bottom = neck_py(VIEW_Y.0);
        for z in zones {
            let x0 = neck_px(z.capture_x.min);
            let x1 = neck_px(z.capture_x.max);
            self.fill_rect_i(x0, top, (x1 - x0).max(1) as usize, (bottom - top) as usize, ZONE_COLOR);
            let ry = neck_py(z.rest_line);
            self.hline_i(x0, ry, (x1 - x0).max(1) as usize, REST_COLOR);
            self.draw_label_i(&z.name, x0 + 4, ry - 14, REST_COLOR);
        }
    }

    fn draw_side_hands(&mut self, arbiter: &HandArbiter, color: u32) {
        let active = arbiter.active_id();
        for hand in arbiter.hands() {
            let (x, y) = (neck_px(hand.position.x), neck_py(hand.position.y));
            if active == Some(hand.owner) {
                self.fill_rect_i(x - 4, y - 4, 9, 9, color);
                self.ring_i(x, y, 9, color);
            } else {
                self.fill_rect_i(x - 2, y - 2, 5, 5, blend(color, PANEL_BG, 0.55));
            }
        }
    }

    // ── Floor panel ───────────────────────────────────────────────────────

    fn draw_floor(&mut self, left: &HandArbiter, right: &HandArbiter) {
        let (cx, cy) = floor_px(Vec3::ZERO);
        self.hline_i(cx - 6, cy, 13, DOT_COLOR);
        self.vline_i(cx, cy - 6, 13, DOT_COLOR);
        for r in [0.5, 1.0, 1.5] {
            self.ring_i(cx, cy, (r * FLOOR_SCALE) as isize, blend(DIM_TEXT, PANEL_BG, 0.6));
        }

        for (arbiter, color) in [(left, LEFT_COLOR), (right, RIGHT_COLOR)] {
            let active = arbiter.active_id();
            for hand in arbiter.hands() {
                let (x, y) = floor_px(hand.position);
                if active == Some(hand.owner) {
                    self.fill_rect_i(x - 3, y - 3, 7, 7, color);
                } else {
                    self.fill_rect_i(x - 1, y - 1, 3, 3, blend(color, PANEL_BG, 0.4));
                }
            }
        }
    }

    fn draw_info(&mut self, scene: &Scene) {
        let mut y = FLOOR_Y;
        self.draw_label(&format!("NOTE {}", scene.note), INFO_X, y, FRET_LIT);
        y += 20;

        for ch in scene.channels {
            self.draw_label(&channel_line(ch), INFO_X, y, TEXT_COLOR);
            y += 16;
        }
        y += 8;

        for hand in scene.left.hands() {
            if y + 16 > STATUS_Y { break; }
            let right = scene.right.hand(hand.owner);
            let line = player_line(hand, right, scene.left.active_id(), scene.right.active_id());
            self.draw_label(&line, INFO_X, y, TEXT_COLOR);
            y += 16;
        }
    }

    // ── Primitive drawing helpers ─────────────────────────────────────────

    fn set_pixel_i(&mut self, x: isize, y: isize, color: u32) {
        if x >= 0 && y >= 0 && (x as usize) < WIN_W && (y as usize) < WIN_H {
            self.buf[y as usize * WIN_W + x as usize] = color;
        }
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        for row in y..(y + h).min(WIN_H) {
            for col in x..(x + w).min(WIN_W) {
                self.buf[row * WIN_W + col] = color;
            }
        }
    }

    fn fill_rect_i(&mut self, x: isize, y: isize, w: usize, h: usize, color: u32) {
        let (x0, y0) = (x.max(0) as usize, y.max(0) as usize);
        let x1 = (x + w as isize).max(0) as usize;
        let y1 = (y + h as isize).max(0) as usize;
        self.fill_rect(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0), color);
    }

    fn hline_i(&mut self, x: isize, y: isize, w: usize, color: u32) {
        for dx in 0..w as isize {
            self.set_pixel_i(x + dx, y, color);
        }
    }

    fn vline_i(&mut self, x: isize, y: isize, h: usize, color: u32) {
        for dy in 0..h as isize {
            self.set_pixel_i(x, y + dy, color);
        }
    }

    fn ring_i(&mut self, cx: isize, cy: isize, r: isize, color: u32) {
        let steps = (r.max(1) * 8) as usize;
        for s in 0..steps {
            let a = s as f32 / steps as f32 * std::f32::consts::TAU;
            let x = cx + (a.cos() * r as f32).round() as isize;
            let y = cy + (a.sin() * r as f32).round() as isize;
            self.set_pixel_i(x, y, color);
        }
    }

    fn draw_label(&mut self, text: &str, x: usize, y: usize, color: u32) {
        self.draw_label_i(text, x as isize, y as isize, color);
    }

    fn draw_label_i(&mut self, text: &str, x: isize, y: isize, color: u32) {
        let mut cx = x;
        for ch in text.chars() {
            let bits = glyph(ch);
            for row in 0..5 {
                let line = (bits >> (3 * (4 - row))) & 0o7;
                for col in 0..3 {
                    if line & (0b100 >> col) != 0 {
                        let px = cx + (col * GLYPH_SCALE) as isize;
                        let py = y + (row * GLYPH_SCALE) as isize;
                        self.fill_rect_i(px, py, GLYPH_SCALE, GLYPH_SCALE, color);
                    }
                }
            }
            cx += GLYPH_ADVANCE as isize;
            if cx >= WIN_W as isize { break; }
        }
    }
}

/// Map a minifb key to its simulation meaning.
fn sim_key(key: Key) -> Option<SimKey> {
    Some(match key {
        Key::Right  => SimKey::NeckUp,
        Key::Left   => SimKey::NeckDown,
        Key::Up     => SimKey::StepIn,
        Key::Down   => SimKey::StepOut,
        Key::W      => SimKey::RaiseHand,
        Key::S      => SimKey::LowerHand,
        Key::Space  => SimKey::Flick,
        Key::J      => SimKey::Join,
        Key::K      => SimKey::Leave,
        Key::Q | Key::Escape => SimKey::Quit,
        _ => return None,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Projection
// ────────────────────────────────────────────────────────────────────────────

fn lerp_px(v: f32, (lo, hi): (f32, f32), px0: usize, px_len: usize) -> isize {
    px0 as isize + ((v - lo) / (hi - lo) * px_len as f32).round() as isize
}

/// Neck panel column for instrument x.
fn neck_px(x: f32) -> isize {
    lerp_px(x, VIEW_X, MARGIN, WIN_W - 2 * MARGIN)
}

/// Neck panel row for instrument y (up is up).
fn neck_py(y: f32) -> isize {
    lerp_px(-y, (-VIEW_Y.1, -VIEW_Y.0), NECK_Y + 20, NECK_H - 50)
}

/// Floor panel pixel for a point seen from above.
fn floor_px(p: Vec3) -> (isize, isize) {
    let cx = (FLOOR_W / 2) as isize;
    let cy = (FLOOR_Y + FLOOR_H / 2) as isize;
    (cx + (p.x * FLOOR_SCALE).round() as isize, cy + (p.z * FLOOR_SCALE).round() as isize)
}

// ────────────────────────────────────────────────────────────────────────────
// Text lines
// ────────────────────────────────────────────────────────────────────────────

fn channel_line(ch: &StringChannel) -> String {
    let loaded = (0..ch.note_count()).filter(|&i| ch.is_loaded(Note(i as u8))).count();
    let state = match ch.state() {
        ChannelState::Idle                => "idle".to_string(),
        ChannelState::Playing { note, .. } => format!("playing {}", note),
        ChannelState::Paused  { note, .. } => format!("paused {}", note),
    };
    format!("{}: {}  ({}/{} loaded)", ch.name(), state, loaded, ch.note_count())
}

fn player_line(
    left:         &TrackedHand,
    right:        Option<&TrackedHand>,
    active_left:  Option<UserId>,
    active_right: Option<UserId>,
) -> String {
    let mark = |active: Option<UserId>| if active == Some(left.owner) { '>' } else { ' ' };
    let dist = |h: &TrackedHand| format!("{:.2}m", flat_distance(h.position, Vec3::ZERO));
    format!(
        "{}{} {}  L {}  R {}",
        mark(active_left),
        mark(active_right),
        left.owner,
        dist(left),
        right.map_or_else(|| "-".to_string(), dist),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// 3×5 bitmap font, one octal digit per row
// ────────────────────────────────────────────────────────────────────────────

const FONT: &[(char, u16)] = &[
    ('0', 0o75557), ('1', 0o26227), ('2', 0o71747), ('3', 0o71717), ('4', 0o55711),
    ('5', 0o74717), ('6', 0o74757), ('7', 0o71111), ('8', 0o75757), ('9', 0o75717),
    ('A', 0o25755), ('B', 0o65656), ('C', 0o34443), ('D', 0o65556), ('E', 0o74647),
    ('F', 0o74644), ('G', 0o34553), ('H', 0o55755), ('I', 0o72227), ('J', 0o11152),
    ('K', 0o55655), ('L', 0o44447), ('M', 0o57755), ('N', 0o65555), ('O', 0o25552),
    ('P', 0o65644), ('Q', 0o25563), ('R', 0o65655), ('S', 0o34216), ('T', 0o72222),
    ('U', 0o55557), ('V', 0o55552), ('W', 0o55775), ('X', 0o55255), ('Y', 0o55222),
    ('Z', 0o71247), (' ', 0o00000), ('.', 0o00002), (',', 0o00024), (':', 0o02020),
    ('=', 0o07070), ('+', 0o02720), ('-', 0o00700), ('/', 0o11244), ('#', 0o57575),
    ('(', 0o12221), (')', 0o42224), ('[', 0o32223), (']', 0o62226), ('>', 0o42124),
    ('<', 0o12421), ('|', 0o22222), ('%', 0o51245), ('!', 0o22202), ('?', 0o61202),
    ('\'', 0o22000),
];

fn glyph(c: char) -> u16 {
    let c = c.to_ascii_uppercase();
    FONT.iter()
        .find(|(g, _)| *g == c)
        .map_or(0o00200, |&(_, bits)| bits)
}

/// Alpha-blend two ARGB colors. `t` = 0.0 → all `a`, `t` = 1.0 → all `b`.
fn blend(a: u32, b: u32, t: f32) -> u32 {
    let t = t.clamp(0.0, 1.0);
    let mix = |shift: u32| {
        let ca = ((a >> shift) & 0xFF) as f32;
        let cb = ((b >> shift) & 0xFF) as f32;
        ((ca * (1.0 - t) + cb * t).round() as u32) << shift
    };
    0xFF000000 | mix(16) | mix(8) | mix(0)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use string_engine::{AudioBackend, AudioError, InstanceId, PlaybackOptions, Side, SoundId};

    #[test]
    fn highlights_follow_engine_calls() {
        let mut h = FretHighlights::new(13);
        h.set_highlighted(Note(5), true);
        assert!(h.is_lit(Note(5)));
        h.set_highlighted(Note(5), false);
        h.set_highlighted(Note(7), true);
        assert_eq!(h.lit().collect::<Vec<_>>(), vec![Note(7)]);
    }

    #[test]
    fn highlight_out_of_range_is_ignored() {
        let mut h = FretHighlights::new(3);
        h.set_highlighted(Note(40), true);
        assert_eq!(h.lit().count(), 0);
        assert!(!h.is_lit(Note(40)));
    }

    #[test]
    fn neck_projection_is_monotonic() {
        assert_eq!(neck_px(VIEW_X.0), MARGIN as isize);
        assert_eq!(neck_px(VIEW_X.1), (WIN_W - MARGIN) as isize);
        assert!(neck_px(0.1) < neck_px(0.2));
        // y up means smaller row
        assert!(neck_py(0.1) < neck_py(-0.1));
    }

    #[test]
    fn floor_projection_centres_instrument() {
        let (x, y) = floor_px(Vec3::new(1.0, 5.0, -0.5));
        assert_eq!(x, (FLOOR_W / 2) as isize + 60);
        assert_eq!(y, (FLOOR_Y + FLOOR_H / 2) as isize - 30);
    }

    #[test]
    fn glyph_lookup() {
        assert_eq!(glyph('a'), glyph('A'));
        assert_eq!(glyph('1'), 0o26227);
        assert_eq!(glyph('~'), 0o00200);
    }

    #[test]
    fn blend_endpoints() {
        assert_eq!(blend(0xFF102030, 0xFFFFFFFF, 0.0), 0xFF102030);
        assert_eq!(blend(0xFF102030, 0xFFFFFFFF, 1.0), 0xFFFFFFFF);
        assert_eq!(blend(0xFF000000, 0xFF0000FF, 0.5), 0xFF000080);
    }

    #[test]
    fn key_mapping() {
        assert_eq!(sim_key(Key::Right), Some(SimKey::NeckUp));
        assert_eq!(sim_key(Key::Escape), Some(SimKey::Quit));
        assert_eq!(sim_key(Key::Z), None);
    }

    #[derive(Default)]
    struct SilentAudio(u32);

    impl AudioBackend for SilentAudio {
        fn load_sound(&mut self, uri: &str) -> Result<SoundId, AudioError> {
            if uri.ends_with("_0.wav") {
                return Err(AudioError::NotFound(uri.to_string()));
            }
            self.0 += 1;
            Ok(SoundId(self.0))
        }
        fn start_instance(&mut self, _s: SoundId, _o: &PlaybackOptions) -> InstanceId { InstanceId(1) }
        fn set_state(&mut self, _i: InstanceId, _o: &PlaybackOptions) {}
        fn stop(&mut self, _i: InstanceId) {}
    }

    #[test]
    fn channel_line_reports_state_and_loads() {
        let mut audio = SilentAudio::default();
        let mut ch = StringChannel::load("E", "sounds", 0, 13, Duration::from_secs(5), &mut audio);
        assert_eq!(channel_line(&ch), "E: idle  (12/13 loaded)");
        ch.play_string(Note(3), Instant::now(), &mut audio);
        assert_eq!(channel_line(&ch), "E: playing fret 3  (12/13 loaded)");
    }

    #[test]
    fn player_line_marks_control() {
        let l = TrackedHand { owner: UserId(2), side: Side::Left, position: Vec3::new(0.3, 0.0, 0.4) };
        let r = TrackedHand { owner: UserId(2), side: Side::Right, position: Vec3::new(0.0, 1.0, 1.0) };
        let line = player_line(&l, Some(&r), Some(UserId(2)), Some(UserId(1)));
        assert_eq!(line, ">  #2  L 0.50m  R 1.00m");
        assert_eq!(player_line(&l, None, None, None), "   #2  L 0.50m  R -");
    }
}
