//! Core simulation engine for the word-bubble analytics view.
//!
//! Ranked word-frequency records become animated, collision-aware circles
//! inside a normalized `[0, 100]²` viewport. The engine owns the particle
//! store, advances it one synchronous tick at a time, and exposes read-only
//! queries (hit-testing, label search) for whatever layer renders it. No
//! rendering, fetching, or global window state lives here.

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

new_key_type! {
    /// Stable handle for particles backed by a generational slot map.
    pub struct ParticleId;
}

/// Upper edge of the normalized coordinate domain on both axes.
pub const COORD_MAX: f32 = 100.0;
/// Minimum centre-to-centre separation (in percent) restored by the
/// collision pass.
pub const MIN_SEPARATION: f32 = 8.0;
/// Particle count the quadratic collision pass is budgeted for at 60 Hz.
/// Larger stores still work; they just eat the frame budget.
pub const PARTICLE_CEILING: usize = 60;

/// Monotonic tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// 2D vector in normalized viewport percentage coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Pixel dimensions of the hosting viewport, pushed in by the caller on
/// resize. The core never reads window state itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Named animation speed steps exposed by the settings panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationSpeed {
    Slow,
    #[default]
    Normal,
    Fast,
}

impl AnimationSpeed {
    /// Velocity scale applied during integration and initial placement.
    #[must_use]
    pub const fn multiplier(self) -> f32 {
        match self {
            Self::Slow => 0.1,
            Self::Normal => 0.2,
            Self::Fast => 0.4,
        }
    }
}

/// Time ranges the surrounding dashboard can request word feeds for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    Day,
    Month,
    Year,
}

impl TimeRange {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    #[must_use]
    pub const fn cycled(self) -> Self {
        match self {
            Self::Day => Self::Month,
            Self::Month => Self::Year,
            Self::Year => Self::Day,
        }
    }
}

/// Process-wide simulation configuration.
///
/// Out-of-range values are clamped by [`SimulationSettings::sanitize`]
/// rather than rejected; a settings panel cannot take the view down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Named speed step; the integration multiplier derives from it.
    pub animation_speed: AnimationSpeed,
    /// Restitution coefficient in `[0, 1]` applied on wall and pair hits.
    pub bounciness: f32,
    /// Accessibility switch: physics ticks are skipped entirely while set.
    pub reduced_motion: bool,
    /// Percent margin reserved from every viewport edge, clamped to `[0, 45]`.
    pub wall_padding: f32,
    /// Minimum per-axis speed; slower components are re-kicked with a random
    /// sign so damping never stalls a bubble.
    pub min_velocity_floor: f32,
    /// Whether the pairwise collision pass runs at all.
    pub collisions_enabled: bool,
    /// Default fill color for particles without a category.
    pub bubble_color: String,
    /// Render-only: whether the host draws word labels.
    pub show_labels: bool,
    /// Render-only: dark theme flag carried for panel parity.
    pub dark_mode: bool,
    /// Optional RNG seed for reproducible placement and re-kicks.
    pub rng_seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            animation_speed: AnimationSpeed::Normal,
            bounciness: 1.0,
            reduced_motion: false,
            wall_padding: 5.0,
            min_velocity_floor: 0.01,
            collisions_enabled: true,
            bubble_color: "#4caf50".to_owned(),
            show_labels: true,
            dark_mode: true,
            rng_seed: None,
        }
    }
}

impl SimulationSettings {
    /// Current integration multiplier.
    #[must_use]
    pub const fn speed_multiplier(&self) -> f32 {
        self.animation_speed.multiplier()
    }

    /// Clamp every numeric field to its legal range, logging each repair.
    pub fn sanitize(&mut self) {
        if !(0.0..=1.0).contains(&self.bounciness) || !self.bounciness.is_finite() {
            let clamped = if self.bounciness.is_finite() {
                self.bounciness.clamp(0.0, 1.0)
            } else {
                1.0
            };
            warn!(
                bounciness = self.bounciness,
                clamped, "bounciness out of range, clamping"
            );
            self.bounciness = clamped;
        }
        if !(0.0..=45.0).contains(&self.wall_padding) || !self.wall_padding.is_finite() {
            let clamped = if self.wall_padding.is_finite() {
                self.wall_padding.clamp(0.0, 45.0)
            } else {
                5.0
            };
            warn!(
                wall_padding = self.wall_padding,
                clamped, "wall_padding out of range, clamping"
            );
            self.wall_padding = clamped;
        }
        if !(0.0..=1.0).contains(&self.min_velocity_floor) || !self.min_velocity_floor.is_finite() {
            let clamped = if self.min_velocity_floor.is_finite() {
                self.min_velocity_floor.clamp(0.0, 1.0)
            } else {
                0.0
            };
            warn!(
                min_velocity_floor = self.min_velocity_floor,
                clamped, "min_velocity_floor out of range, clamping"
            );
            self.min_velocity_floor = clamped;
        }
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Radius bounds (in px) for one viewport-width breakpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBounds {
    pub min: f32,
    pub max: f32,
}

/// Breakpoint table mapping viewport width to bubble radius bounds.
const SIZE_TABLE: [(f32, SizeBounds); 2] = [
    (480.0, SizeBounds { min: 24.0, max: 60.0 }),
    (900.0, SizeBounds { min: 32.0, max: 80.0 }),
];
const SIZE_WIDE: SizeBounds = SizeBounds { min: 40.0, max: 100.0 };

/// Resolve radius bounds for the given viewport width.
#[must_use]
pub fn size_bounds(viewport_width: f32) -> SizeBounds {
    for (breakpoint, bounds) in SIZE_TABLE {
        if viewport_width < breakpoint {
            return bounds;
        }
    }
    SIZE_WIDE
}

/// FNV-1a hash of the category name folded onto the hue circle.
fn category_hue(category: &str) -> f32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in category.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % 360) as f32
}

/// Convert HSL (`h` in degrees, `s`/`l` in percent) to a `#rrggbb` string.
#[must_use]
pub fn hsl_to_hex(h: f32, s: f32, l: f32) -> String {
    let h = h.rem_euclid(360.0);
    let s = (s / 100.0).clamp(0.0, 1.0);
    let l = (l / 100.0).clamp(0.0, 1.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let byte = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(r), byte(g), byte(b))
}

/// Resolve a particle fill color.
///
/// Categorized words get a hue derived from the category name; severity
/// pushes saturation up and lightness down inside a clamped visible band.
/// Uncategorized words fall back to the configured bubble color.
#[must_use]
pub fn resolve_color(category: Option<&str>, severity: Option<u8>, fallback: &str) -> String {
    let Some(category) = category else {
        return fallback.to_owned();
    };
    let severity = f32::from(severity.unwrap_or(0).min(10));
    let saturation = (62.0 + severity * 3.0).clamp(40.0, 92.0);
    let lightness = (58.0 - severity * 1.8).clamp(38.0, 65.0);
    hsl_to_hex(category_hue(category), saturation, lightness)
}

/// Errors emitted while decoding a word feed payload.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The payload was not valid JSON at all.
    #[error("feed payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One validated ranked-word record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub label: String,
    pub count: f64,
    pub category: Option<String>,
    pub severity: Option<u8>,
}

impl WordRecord {
    #[must_use]
    pub fn new(label: impl Into<String>, count: f64) -> Self {
        Self {
            label: label.into(),
            count,
            category: None,
            severity: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>, severity: u8) -> Self {
        self.category = Some(category.into());
        self.severity = Some(severity);
        self
    }
}

/// Decode a `{ "words": [...] }` payload into validated records.
///
/// Lenient per item: entries without a usable label or with a non-numeric,
/// negative, or non-finite count are dropped with a logged skip. A missing
/// or non-array `words` field is the empty-data condition, not an error.
pub fn parse_feed(payload: &str) -> Result<Vec<WordRecord>, FeedError> {
    let value: serde_json::Value = serde_json::from_str(payload)?;
    let Some(entries) = value.get("words").and_then(serde_json::Value::as_array) else {
        warn!("feed payload has no `words` array, treating as empty data");
        return Ok(Vec::new());
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        // The upstream API has used both `label` and `word` for this field.
        let label = entry
            .get("label")
            .or_else(|| entry.get("word"))
            .and_then(serde_json::Value::as_str);
        let Some(label) = label else {
            warn!(%entry, "skipping feed entry without a label");
            continue;
        };
        let Some(count) = entry.get("count").and_then(serde_json::Value::as_f64) else {
            warn!(label, "skipping feed entry with non-numeric count");
            continue;
        };
        if !count.is_finite() || count < 0.0 {
            warn!(label, count, "skipping feed entry with invalid count");
            continue;
        }
        let category = entry
            .get("category")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);
        let severity = entry
            .get("severity")
            .and_then(serde_json::Value::as_u64)
            .map(|s| s.min(10) as u8);
        records.push(WordRecord {
            label: label.to_owned(),
            count,
            category,
            severity,
        });
    }
    Ok(records)
}

/// One visual bubble.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Particle {
    /// Display word; unique (case-insensitively) within one store.
    pub label: String,
    /// Source magnitude. Drives radius only; physics never touches it.
    pub count: f64,
    pub category: Option<String>,
    pub severity: Option<u8>,
    /// Centre in normalized percentage coordinates.
    pub position: Vec2,
    /// Percent-per-tick velocity, pre-scaled by the speed multiplier.
    pub velocity: Vec2,
    /// Rendered radius in px, inside the responsive size bounds.
    pub radius: f32,
    /// Resolved `#rrggbb` fill.
    pub color: String,
}

/// Mutable collection of particle state; the single source of truth for one
/// simulation tick. Stores are swapped wholesale on a new data fetch, so
/// there is no per-particle removal.
#[derive(Debug, Clone, Default)]
pub struct ParticleStore {
    slots: SlotMap<ParticleId, usize>,
    handles: Vec<ParticleId>,
    particles: Vec<Particle>,
}

impl ParticleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Insert a particle at the back of the draw order, returning its handle.
    pub fn insert(&mut self, particle: Particle) -> ParticleId {
        let index = self.particles.len();
        self.particles.push(particle);
        let id = self.slots.insert(index);
        self.handles.push(id);
        id
    }

    #[must_use]
    pub fn contains(&self, id: ParticleId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: ParticleId) -> Option<&Particle> {
        self.slots.get(id).map(|&index| &self.particles[index])
    }

    #[must_use]
    pub fn get_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.slots
            .get(id)
            .copied()
            .map(move |index| &mut self.particles[index])
    }

    /// Handles in insertion (draw) order.
    pub fn iter_handles(&self) -> impl Iterator<Item = ParticleId> + '_ {
        self.handles.iter().copied()
    }

    /// Handle/particle pairs in insertion (draw) order.
    pub fn iter(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.handles.iter().copied().zip(self.particles.iter())
    }

    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    #[must_use]
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Copy of the scalar data for `id`.
    #[must_use]
    pub fn snapshot(&self, id: ParticleId) -> Option<Particle> {
        self.get(id).cloned()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.handles.clear();
        self.particles.clear();
    }

    /// Replace the contents wholesale with another store's particles.
    ///
    /// Clearing goes through the slot map, which bumps slot generations, so
    /// handles into the previous snapshot die instead of aliasing rows of
    /// the new one.
    pub fn replace_with(&mut self, other: ParticleStore) {
        self.clear();
        for particle in other.particles {
            self.insert(particle);
        }
    }
}

/// Largest count in the snapshot, guarded so size math never divides by zero.
fn max_count(words: &[WordRecord]) -> f64 {
    words
        .iter()
        .map(|w| OrderedFloat(w.count))
        .max()
        .map_or(1.0, |m| m.into_inner().max(1.0))
}

/// Radius for `count` against the snapshot maximum: square-root scaling
/// compresses the dynamic range so heavy outliers do not dwarf the rest.
fn radius_for(count: f64, max: f64, bounds: SizeBounds) -> f32 {
    let pct = (count / max).clamp(0.0, 1.0).sqrt() as f32;
    bounds.min + pct * (bounds.max - bounds.min)
}

/// Random velocity component scaled by the speed step, damped while
/// reduced motion is set.
fn random_velocity(settings: &SimulationSettings, rng: &mut SmallRng) -> Vec2 {
    let damp = if settings.reduced_motion { 0.5 } else { 1.0 };
    let scale = settings.speed_multiplier() * damp;
    Vec2::new(
        (rng.random::<f32>() - 0.5) * scale,
        (rng.random::<f32>() - 0.5) * scale,
    )
}

/// Random position inside the padded box.
fn random_position(wall_padding: f32, rng: &mut SmallRng) -> Vec2 {
    let lo = wall_padding;
    let hi = COORD_MAX - wall_padding;
    Vec2::new(rng.random_range(lo..=hi), rng.random_range(lo..=hi))
}

/// Map validated word records into a fresh particle store.
///
/// Duplicate labels (case-insensitive) are dropped with a logged skip so the
/// label is a unique external identity within the snapshot.
pub fn map_words(
    words: &[WordRecord],
    viewport: Viewport,
    settings: &SimulationSettings,
    rng: &mut SmallRng,
) -> ParticleStore {
    let mut store = ParticleStore::new();
    if words.is_empty() {
        return store;
    }

    let bounds = size_bounds(viewport.width);
    let max = max_count(words);
    let mut seen: HashSet<String> = HashSet::with_capacity(words.len());

    for word in words {
        if !seen.insert(word.label.to_lowercase()) {
            warn!(label = %word.label, "skipping duplicate label in feed snapshot");
            continue;
        }
        let particle = Particle {
            label: word.label.clone(),
            count: word.count,
            category: word.category.clone(),
            severity: word.severity,
            position: random_position(settings.wall_padding, rng),
            velocity: random_velocity(settings, rng),
            radius: radius_for(word.count, max, bounds),
            color: resolve_color(
                word.category.as_deref(),
                word.severity,
                &settings.bubble_color,
            ),
        };
        store.insert(particle);
    }
    store
}

/// Outcome of one physics tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Particles reset by the non-finite guard this tick.
    pub resets: usize,
}

/// Reflect one axis off the padded box, retaining `restitution` of the
/// incoming speed and always pointing the velocity back inside.
fn reflect_axis(position: &mut f32, velocity: &mut f32, lo: f32, hi: f32, restitution: f32) {
    if *position < lo {
        *position = lo;
        *velocity = velocity.abs() * restitution;
    } else if *position > hi {
        *position = hi;
        *velocity = -velocity.abs() * restitution;
    }
}

fn stage_integrate(particles: &mut [Particle], multiplier: f32) {
    for particle in particles.iter_mut() {
        particle.position.x += particle.velocity.x * multiplier;
        particle.position.y += particle.velocity.y * multiplier;
    }
}

fn stage_walls(particles: &mut [Particle], wall_padding: f32, restitution: f32) {
    let lo = wall_padding;
    let hi = COORD_MAX - wall_padding;
    for particle in particles.iter_mut() {
        reflect_axis(
            &mut particle.position.x,
            &mut particle.velocity.x,
            lo,
            hi,
            restitution,
        );
        reflect_axis(
            &mut particle.position.y,
            &mut particle.velocity.y,
            lo,
            hi,
            restitution,
        );
    }
}

/// Quadratic pairwise pass: overlapping pairs swap restitution-scaled
/// velocities and the later-indexed particle is pushed out along the contact
/// normal until the minimum separation is restored. When a wall blocks that
/// push, the first particle is moved inward by the remainder; the padded box
/// is always wider than the separation threshold, so the inward move never
/// clips. Coincident centres separate along +x so the outcome stays
/// deterministic.
fn stage_collisions(particles: &mut [Particle], wall_padding: f32, restitution: f32) {
    let lo = wall_padding;
    let hi = COORD_MAX - wall_padding;
    let n = particles.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let (head, tail) = particles.split_at_mut(j);
            let a = &mut head[i];
            let b = &mut tail[0];

            let dx = b.position.x - a.position.x;
            let dy = b.position.y - a.position.y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq >= MIN_SEPARATION * MIN_SEPARATION {
                continue;
            }

            let dist = dist_sq.sqrt();
            let (nx, ny) = if dist <= f32::EPSILON {
                (1.0, 0.0)
            } else {
                (dx / dist, dy / dist)
            };

            let va = a.velocity;
            a.velocity = Vec2::new(b.velocity.x * restitution, b.velocity.y * restitution);
            b.velocity = Vec2::new(va.x * restitution, va.y * restitution);

            b.position.x = (a.position.x + nx * MIN_SEPARATION).clamp(lo, hi);
            b.position.y = (a.position.y + ny * MIN_SEPARATION).clamp(lo, hi);

            let rx = b.position.x - a.position.x;
            let ry = b.position.y - a.position.y;
            if rx * rx + ry * ry < MIN_SEPARATION * MIN_SEPARATION {
                a.position.x = (b.position.x - nx * MIN_SEPARATION).clamp(lo, hi);
                a.position.y = (b.position.y - ny * MIN_SEPARATION).clamp(lo, hi);
            }
        }
    }
}

fn stage_speed_floor(particles: &mut [Particle], floor: f32, rng: &mut SmallRng) {
    if floor <= f32::EPSILON {
        return;
    }
    for particle in particles.iter_mut() {
        if particle.velocity.x.abs() < floor {
            particle.velocity.x = floor * if rng.random::<bool>() { 1.0 } else { -1.0 };
        }
        if particle.velocity.y.abs() < floor {
            particle.velocity.y = floor * if rng.random::<bool>() { 1.0 } else { -1.0 };
        }
    }
}

/// Defensive guard: a particle whose state went non-finite is reassigned a
/// fresh in-bounds position and velocity instead of propagating corruption.
fn stage_guard(particles: &mut [Particle], settings: &SimulationSettings, rng: &mut SmallRng) -> usize {
    let mut resets = 0;
    for particle in particles.iter_mut() {
        if particle.position.is_finite() && particle.velocity.is_finite() {
            continue;
        }
        warn!(
            label = %particle.label,
            "non-finite particle state detected, resetting in place"
        );
        particle.position = random_position(settings.wall_padding, rng);
        particle.velocity = random_velocity(settings, rng);
        resets += 1;
    }
    resets
}

/// Advance every particle by exactly one tick: integrate, reflect off walls,
/// resolve pair overlaps, enforce the speed floor, then guard invariants.
/// Synchronous and atomic; finite inputs always produce finite, in-bounds
/// outputs.
pub fn step_particles(
    particles: &mut [Particle],
    settings: &SimulationSettings,
    rng: &mut SmallRng,
) -> StepReport {
    stage_integrate(particles, settings.speed_multiplier());
    stage_walls(particles, settings.wall_padding, settings.bounciness);
    if settings.collisions_enabled && particles.len() > 1 {
        stage_collisions(particles, settings.wall_padding, settings.bounciness);
    }
    stage_speed_floor(particles, settings.min_velocity_floor, rng);
    let resets = stage_guard(particles, settings, rng);
    StepReport { resets }
}

/// Events emitted by one engine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickEvents {
    pub tick: Tick,
    /// False when reduced motion froze the tick.
    pub ticked: bool,
    /// Particles reset by the invariant guard.
    pub resets: usize,
}

/// Root owner of the simulation: settings, viewport, particle store, RNG,
/// and the tick counter.
pub struct BubbleEngine {
    settings: SimulationSettings,
    viewport: Viewport,
    store: ParticleStore,
    rng: SmallRng,
    tick: Tick,
}

impl fmt::Debug for BubbleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BubbleEngine")
            .field("settings", &self.settings)
            .field("viewport", &self.viewport)
            .field("tick", &self.tick)
            .field("particle_count", &self.store.len())
            .finish()
    }
}

impl BubbleEngine {
    /// Build an engine with an empty store. Settings are sanitized up front.
    #[must_use]
    pub fn new(mut settings: SimulationSettings, viewport: Viewport) -> Self {
        settings.sanitize();
        let rng = settings.seeded_rng();
        Self {
            settings,
            viewport,
            store: ParticleStore::new(),
            rng,
            tick: Tick::zero(),
        }
    }

    /// Replace the store wholesale from validated records. Old handles die;
    /// the tick counter keeps running.
    pub fn install_words(&mut self, words: &[WordRecord]) {
        let fresh = map_words(words, self.viewport, &self.settings, &mut self.rng);
        self.store.replace_with(fresh);
    }

    /// Replace the store from a raw JSON feed payload.
    ///
    /// Undecodable payloads degrade to an empty store (the caller renders an
    /// empty state); they never propagate.
    pub fn load_feed(&mut self, payload: &str) {
        match parse_feed(payload) {
            Ok(words) => self.install_words(&words),
            Err(err) => {
                warn!(error = %err, "feed rejected, substituting empty store");
                self.store.clear();
            }
        }
    }

    /// Run one physics tick. Reduced motion freezes the store: the pipeline
    /// is skipped entirely and the tick counter does not advance.
    pub fn step(&mut self) -> TickEvents {
        if self.settings.reduced_motion {
            return TickEvents {
                tick: self.tick,
                ticked: false,
                resets: 0,
            };
        }
        let report = step_particles(self.store.particles_mut(), &self.settings, &mut self.rng);
        self.tick = self.tick.next();
        TickEvents {
            tick: self.tick,
            ticked: true,
            resets: report.resets,
        }
    }

    /// Apply a viewport/settings change without losing particle identity.
    ///
    /// Radius and color are recomputed from the new size table and color
    /// inputs; velocity magnitude is rescaled by the speed-step ratio.
    /// Positions, labels, counts, and handles are untouched, and the RNG is
    /// never reseeded, so trajectories do not jump.
    pub fn reconfigure(&mut self, viewport: Viewport, mut settings: SimulationSettings) {
        settings.sanitize();
        let ratio = settings.speed_multiplier() / self.settings.speed_multiplier();
        let bounds = size_bounds(viewport.width);
        let max = self
            .store
            .particles()
            .iter()
            .map(|p| OrderedFloat(p.count))
            .max()
            .map_or(1.0, |m| m.into_inner().max(1.0));

        for particle in self.store.particles_mut() {
            particle.radius = radius_for(particle.count, max, bounds);
            particle.color = resolve_color(
                particle.category.as_deref(),
                particle.severity,
                &settings.bubble_color,
            );
            particle.velocity.x *= ratio;
            particle.velocity.y *= ratio;
        }
        self.viewport = viewport;
        self.settings = settings;
    }

    /// Topmost particle (last in draw order) whose rendered circle contains
    /// the percent-coordinate point. Pure read.
    #[must_use]
    pub fn hit_test(&self, px: f32, py: f32) -> Option<ParticleId> {
        let qx = px / COORD_MAX * self.viewport.width;
        let qy = py / COORD_MAX * self.viewport.height;
        for id in self.store.handles.iter().rev().copied() {
            let particle = self.store.get(id)?;
            let cx = particle.position.x / COORD_MAX * self.viewport.width;
            let cy = particle.position.y / COORD_MAX * self.viewport.height;
            let dx = qx - cx;
            let dy = qy - cy;
            if dx * dx + dy * dy <= particle.radius * particle.radius {
                return Some(id);
            }
        }
        None
    }

    /// Case-insensitive substring match over labels, preserving store order.
    /// An empty pattern matches everything.
    #[must_use]
    pub fn filter_by_label(&self, pattern: &str) -> Vec<ParticleId> {
        let needle = pattern.to_lowercase();
        self.store
            .iter()
            .filter(|(_, particle)| particle.label.to_lowercase().contains(&needle))
            .map(|(id, _)| id)
            .collect()
    }

    /// Cloned particle list in draw order, for rendering.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Particle> {
        self.store.particles().to_vec()
    }

    #[must_use]
    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    #[must_use]
    pub const fn viewport(&self) -> Viewport {
        self.viewport
    }

    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }
}

/// Default simulation rate, matching a common display refresh.
pub const TARGET_TICK_HZ: f32 = 60.0;
/// Cap on ticks executed per `advance` call so a long stall cannot spiral.
pub const MAX_STEPS_PER_ADVANCE: usize = 240;

/// Fixed-timestep driver for the engine.
///
/// Cooperative and single-threaded: the host calls [`SimulationLoop::advance`]
/// once per frame with the current instant, and elapsed time is converted
/// into whole ticks. `stop` guarantees no further mutation until the next
/// `start`; the store is preserved for resume.
pub struct SimulationLoop {
    engine: BubbleEngine,
    tick_interval: Duration,
    running: bool,
    accumulator: f32,
    last_advance: Option<Instant>,
}

impl fmt::Debug for SimulationLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("running", &self.running)
            .field("tick_interval", &self.tick_interval)
            .field("engine", &self.engine)
            .finish()
    }
}

impl SimulationLoop {
    #[must_use]
    pub fn new(engine: BubbleEngine, ticks_per_second: f32) -> Self {
        Self {
            engine,
            tick_interval: Duration::from_secs_f32(1.0 / ticks_per_second.max(1.0)),
            running: false,
            accumulator: 0.0,
            last_advance: None,
        }
    }

    /// Begin scheduling ticks. Idempotent while already running.
    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            self.accumulator = 0.0;
            self.last_advance = None;
        }
    }

    /// Stop scheduling. No tick runs after this returns; the store keeps its
    /// state for a later resume.
    pub fn stop(&mut self) {
        self.running = false;
        self.accumulator = 0.0;
        self.last_advance = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }

    /// Convert elapsed wall time into whole ticks and run them, returning
    /// how many were executed. Returns zero while stopped.
    pub fn advance(&mut self, now: Instant) -> usize {
        if !self.running {
            return 0;
        }
        let delta = match self.last_advance {
            Some(prev) => now.saturating_duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_advance = Some(now);

        let step_secs = self.tick_interval.as_secs_f32();
        if step_secs <= f32::EPSILON {
            return 0;
        }
        self.accumulator += delta.as_secs_f32();
        let cap = step_secs * MAX_STEPS_PER_ADVANCE as f32;
        if self.accumulator > cap {
            self.accumulator = cap;
        }
        let steps = ((self.accumulator / step_secs).floor() as usize).min(MAX_STEPS_PER_ADVANCE);
        self.accumulator -= step_secs * steps as f32;
        for _ in 0..steps {
            self.engine.step();
        }
        steps
    }

    /// Run exactly one tick regardless of schedule (single-step while paused).
    pub fn step_once(&mut self) -> TickEvents {
        self.engine.step()
    }

    #[must_use]
    pub fn engine(&self) -> &BubbleEngine {
        &self.engine
    }

    #[must_use]
    pub fn engine_mut(&mut self) -> &mut BubbleEngine {
        &mut self.engine
    }
}
