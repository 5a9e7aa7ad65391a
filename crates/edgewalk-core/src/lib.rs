//! Core simulation types for the Edgewalk workspace.
//!
//! A fixed-size cast of sprite actors patrols the perimeter of a rectangular
//! viewport: straight walks along each edge, circular arcs around rounded
//! corners. A scheduler periodically retires one actor with a fade-out and
//! replaces it, after a randomized delay, with a faded-in newcomer placed so
//! that no two actors overlap. The whole simulation advances one tick at a
//! time under an external frame clock; rendering and image loading stay on
//! the far side of the [`AssetProvider`] and snapshot boundaries.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

new_key_type! {
    /// Stable handle for actors backed by a generational slot map.
    pub struct ActorId;
}

/// Convenience alias for associating side data with actors.
pub type ActorMap<T> = SecondaryMap<ActorId, T>;

/// Reduce an angle to `[0, 2π)`.
#[must_use]
pub fn normalize_angle(angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    let mut wrapped = angle % TAU;
    if wrapped < 0.0 {
        wrapped += TAU;
    }
    wrapped
}

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// 2D point in viewport coordinates (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Construct a new point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One side of the rectangular perimeter, walked counter-clockwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Edge {
    Bottom,
    Right,
    Top,
    Left,
}

impl Edge {
    /// Numeric index used by the wire/debug representation: bottom = 0,
    /// right = 1, top = 2, left = 3.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Bottom => 0,
            Self::Right => 1,
            Self::Top => 2,
            Self::Left => 3,
        }
    }

    /// Inverse of [`Edge::index`]; indices wrap modulo 4.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Self::Bottom,
            1 => Self::Right,
            2 => Self::Top,
            _ => Self::Left,
        }
    }

    /// The edge entered after finishing this edge's far corner.
    #[must_use]
    pub const fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    /// Canonical walking heading along this edge, in radians.
    #[must_use]
    pub fn heading(self) -> f32 {
        match self {
            Self::Bottom => 0.0,
            Self::Right => FRAC_PI_2,
            Self::Top => PI,
            Self::Left => PI * 1.5,
        }
    }
}

/// Movement sub-state of one actor: straight edge walk, or the circular arc
/// connecting two edges at a rounded corner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MovementState {
    EdgeWalk,
    CornerArc {
        center: Point,
        start_angle: f32,
        end_angle: f32,
        current_angle: f32,
        angle_increment: f32,
    },
}

/// Opaque per-frame token minted by an [`AssetProvider`]; only the renderer
/// on the far side of the snapshot boundary knows what it refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

/// Ordered, never-empty sequence of frame handles for one character's walk
/// cycle. Shared between the provider and any actors animating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSet {
    frames: Vec<FrameHandle>,
}

impl FrameSet {
    /// Build a frame set, rejecting empty sequences.
    #[must_use]
    pub fn new(frames: Vec<FrameHandle>) -> Option<Self> {
        if frames.is_empty() { None } else { Some(Self { frames }) }
    }

    /// Number of frames in the cycle. Always at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false; retained for container-API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Handle for a specific frame index.
    #[must_use]
    pub fn handle(&self, index: usize) -> Option<FrameHandle> {
        self.frames.get(index).copied()
    }

    /// All handles in cycle order.
    #[must_use]
    pub fn handles(&self) -> &[FrameHandle] {
        &self.frames
    }
}

/// Errors raised by an [`AssetProvider`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("no frames registered for character `{0}`")]
    NotFound(String),
    #[error("character `{0}` resolved to an empty frame sequence")]
    EmptyFrames(String),
}

/// Boundary to the host's image store: resolves a character type to its walk
/// cycle. The core never touches pixel data.
pub trait AssetProvider {
    /// Resolve `character` to its ordered frame sequence.
    fn load_frames(&mut self, character: &str) -> Result<Arc<FrameSet>, AssetError>;
}

/// Memoizing wrapper around another provider. Successful loads are cached per
/// character; failures are not, so a type that fails once can still spawn on
/// a later attempt.
pub struct CachingAssets<P> {
    inner: P,
    cache: HashMap<String, Arc<FrameSet>>,
}

impl<P> CachingAssets<P> {
    /// Wrap a provider with a per-character cache.
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    /// Number of cached frame sets.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl<P: AssetProvider> AssetProvider for CachingAssets<P> {
    fn load_frames(&mut self, character: &str) -> Result<Arc<FrameSet>, AssetError> {
        if let Some(frames) = self.cache.get(character) {
            return Ok(Arc::clone(frames));
        }
        let frames = self.inner.load_frames(character)?;
        self.cache.insert(character.to_owned(), Arc::clone(&frames));
        Ok(frames)
    }
}

/// Indicates an invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldStateError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Rejection sampling gave up before finding a viable position.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    #[error("no viable position after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Static configuration for an edgewalk world. Length-like values are
/// fractions of the viewport's smaller dimension; durations are ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgewalkConfig {
    /// Initial viewport width in pixels.
    pub viewport_width: f32,
    /// Initial viewport height in pixels.
    pub viewport_height: f32,
    /// Rendered actor size as a fraction of the smaller dimension.
    pub actor_size_pct: f32,
    /// Corner turn radius as a fraction of the smaller dimension.
    pub corner_radius_pct: f32,
    /// Offset of the walking line from the viewport border (may be negative).
    pub edge_offset_pct: f32,
    /// Minimum pairwise distance between actors at placement time.
    pub min_distance_pct: f32,
    /// Distance covered per tick while walking an edge.
    pub edge_speed_pct: f32,
    /// Linear corner speed as a multiple of the edge speed.
    pub corner_speed_multiplier: f32,
    /// Ticks between sprite frame advances.
    pub frame_delay: u32,
    /// Target population size.
    pub max_active: usize,
    /// Ticks between rotation attempts; 0 disables rotation.
    pub rotation_interval_ticks: u32,
    /// Discrete steps per fade transaction.
    pub fade_steps: u32,
    /// Inclusive range of ticks between a retirement and its replacement.
    pub respawn_delay_ticks: (u32, u32),
    /// Extra fade-in delay per actor index during the initial fill.
    pub initial_fade_stagger_ticks: u32,
    /// Rejection sampling bound per placement.
    pub placement_max_attempts: u32,
    /// Target tick rate of the external frame clock.
    pub tick_hz: f32,
    /// Character types eligible for the rotation pool.
    pub roster: Vec<String>,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for EdgewalkConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1920.0,
            viewport_height: 1080.0,
            actor_size_pct: 0.275,
            corner_radius_pct: 0.225,
            edge_offset_pct: -0.0045,
            min_distance_pct: 0.45,
            edge_speed_pct: 0.0015,
            corner_speed_multiplier: 5.5,
            frame_delay: 7,
            max_active: 7,
            rotation_interval_ticks: 600,
            fade_steps: 30,
            respawn_delay_ticks: (60, 120),
            initial_fade_stagger_ticks: 22,
            placement_max_attempts: 200,
            tick_hz: 30.0,
            roster: default_roster(),
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

/// Default cast of character types.
#[must_use]
pub fn default_roster() -> Vec<String> {
    [
        "Apple",
        "Balloon",
        "Bat",
        "Bird",
        "Butterfly",
        "Can",
        "Cry",
        "Elephant",
        "Goo",
        "Horse",
        "Lip",
        "Man",
        "Paint",
        "Pant",
        "Paper",
        "Pea",
        "Peanut",
        "Roll",
        "Umbrella",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl EdgewalkConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), WorldStateError> {
        if !(self.viewport_width > 0.0 && self.viewport_height > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "viewport dimensions must be positive",
            ));
        }
        if !(self.actor_size_pct > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "actor_size_pct must be positive",
            ));
        }
        if !(self.corner_radius_pct > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "corner_radius_pct must be positive",
            ));
        }
        if !(self.corner_radius_pct + self.edge_offset_pct > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "corner inset (radius plus edge offset) must be positive",
            ));
        }
        if !(self.min_distance_pct >= 0.0 && self.min_distance_pct.is_finite()) {
            return Err(WorldStateError::InvalidConfig(
                "min_distance_pct must be non-negative",
            ));
        }
        if !(self.edge_speed_pct > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "edge_speed_pct must be positive",
            ));
        }
        if !(self.corner_speed_multiplier > 0.0) {
            return Err(WorldStateError::InvalidConfig(
                "corner_speed_multiplier must be positive",
            ));
        }
        if self.frame_delay == 0 {
            return Err(WorldStateError::InvalidConfig("frame_delay must be non-zero"));
        }
        if self.fade_steps == 0 {
            return Err(WorldStateError::InvalidConfig("fade_steps must be non-zero"));
        }
        if self.max_active == 0 {
            return Err(WorldStateError::InvalidConfig("max_active must be non-zero"));
        }
        if self.roster.is_empty() {
            return Err(WorldStateError::InvalidConfig("roster must not be empty"));
        }
        if self.max_active > self.roster.len() {
            return Err(WorldStateError::InvalidConfig(
                "max_active cannot exceed roster size",
            ));
        }
        let mut sorted = self.roster.clone();
        sorted.sort();
        if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(WorldStateError::InvalidConfig("roster entries must be unique"));
        }
        if self.respawn_delay_ticks.0 > self.respawn_delay_ticks.1 {
            return Err(WorldStateError::InvalidConfig(
                "respawn delay range is inverted",
            ));
        }
        if self.placement_max_attempts == 0 {
            return Err(WorldStateError::InvalidConfig(
                "placement_max_attempts must be non-zero",
            ));
        }
        if !(self.tick_hz > 0.0 && self.tick_hz.is_finite()) {
            return Err(WorldStateError::InvalidConfig("tick_hz must be positive"));
        }
        if self.history_capacity == 0 {
            return Err(WorldStateError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(())
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
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

/// Per-tick geometry derived from the current bounds and configuration.
/// Never cached across ticks, so viewport resizes take effect immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: f32,
    pub height: f32,
    pub smaller: f32,
    pub actor_size: f32,
    pub corner_radius: f32,
    pub edge_offset: f32,
    pub min_distance: f32,
    pub edge_speed: f32,
    pub corner_speed: f32,
}

impl Geometry {
    /// Derive the working geometry for a viewport of `width` by `height`.
    #[must_use]
    pub fn derive(config: &EdgewalkConfig, width: f32, height: f32) -> Self {
        let smaller = width.min(height);
        let edge_speed = smaller * config.edge_speed_pct;
        Self {
            width,
            height,
            smaller,
            actor_size: smaller * config.actor_size_pct,
            corner_radius: smaller * config.corner_radius_pct,
            edge_offset: smaller * config.edge_offset_pct,
            min_distance: smaller * config.min_distance_pct,
            edge_speed,
            corner_speed: edge_speed * config.corner_speed_multiplier,
        }
    }

    /// Length of the coordinate span actors can occupy along `edge`.
    #[must_use]
    pub fn edge_span(&self, edge: Edge) -> f32 {
        match edge {
            Edge::Bottom | Edge::Top => self.width,
            Edge::Right | Edge::Left => self.height,
        }
    }

    /// Viewport position for a coordinate `t` along `edge`, on the offset
    /// walking line.
    #[must_use]
    pub fn spawn_point(&self, edge: Edge, t: f32) -> Point {
        match edge {
            Edge::Bottom => Point::new(t, self.edge_offset),
            Edge::Right => Point::new(self.width - self.edge_offset, t),
            Edge::Top => Point::new(t, self.height - self.edge_offset),
            Edge::Left => Point::new(self.edge_offset, t),
        }
    }
}

/// One animated perimeter-walking entity.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Roster type; at most one live actor per type.
    pub character: String,
    /// Walk-cycle frames, owned by the asset provider.
    pub frames: Arc<FrameSet>,
    pub position: Point,
    /// Heading in radians, normalized to `[0, 2π)`.
    pub heading: f32,
    /// Perimeter segment the actor is on (or most recently left, mid-arc).
    pub edge: Edge,
    pub movement: MovementState,
    pub frame_index: usize,
    pub frame_delay_counter: u32,
    /// Draw alpha in `[0, 1]`, driven by fade transactions.
    pub opacity: f32,
    /// Inactive actors are neither advanced nor drawn.
    pub active: bool,
}

/// Advance an actor's sprite cycle by one tick, wrapping modulo the frame
/// count. Runs independently of locomotion so walk speed and sprite speed
/// stay decoupled.
pub fn advance_animation(actor: &mut Actor, frame_delay: u32) {
    actor.frame_delay_counter += 1;
    if actor.frame_delay_counter >= frame_delay {
        actor.frame_index = (actor.frame_index + 1) % actor.frames.len();
        actor.frame_delay_counter = 0;
    }
}

/// Advance an actor one tick along the perimeter: a straight step while edge
/// walking, or an angular step along the current corner arc.
pub fn advance_actor(actor: &mut Actor, geometry: &Geometry) {
    match actor.movement {
        MovementState::EdgeWalk => advance_edge_walk(actor, geometry),
        MovementState::CornerArc { .. } => advance_corner_arc(actor, geometry),
    }
}

fn enter_corner(geometry: &Geometry, center: Point, start_angle: f32, end_angle: f32) -> MovementState {
    let direction = if end_angle - start_angle >= 0.0 { 1.0 } else { -1.0 };
    MovementState::CornerArc {
        center,
        start_angle,
        end_angle,
        current_angle: start_angle,
        angle_increment: direction * geometry.corner_speed / geometry.corner_radius,
    }
}

fn advance_edge_walk(actor: &mut Actor, geometry: &Geometry) {
    let inset = geometry.corner_radius + geometry.edge_offset;
    match actor.edge {
        Edge::Bottom => {
            actor.position.x += geometry.edge_speed;
            actor.heading = 0.0;
            if actor.position.x >= geometry.width - inset {
                let center = Point::new(geometry.width - inset, inset);
                actor.movement = enter_corner(geometry, center, PI * 1.5, TAU);
            }
        }
        Edge::Right => {
            actor.position.y += geometry.edge_speed;
            actor.heading = FRAC_PI_2;
            if actor.position.y >= geometry.height - inset {
                let center = Point::new(geometry.width - inset, geometry.height - inset);
                actor.movement = enter_corner(geometry, center, 0.0, FRAC_PI_2);
            }
        }
        Edge::Top => {
            actor.position.x -= geometry.edge_speed;
            actor.heading = PI;
            if actor.position.x <= inset {
                let center = Point::new(inset, geometry.height - inset);
                actor.movement = enter_corner(geometry, center, FRAC_PI_2, PI);
            }
        }
        Edge::Left => {
            actor.position.y -= geometry.edge_speed;
            actor.heading = PI * 1.5;
            if actor.position.y <= inset {
                let center = Point::new(inset, inset);
                actor.movement = enter_corner(geometry, center, PI, PI * 1.5);
            }
        }
    }
}

fn arc_point(center: Point, radius: f32, angle: f32) -> Point {
    Point::new(
        center.x + radius * angle.cos(),
        center.y + radius * angle.sin(),
    )
}

fn advance_corner_arc(actor: &mut Actor, geometry: &Geometry) {
    let MovementState::CornerArc {
        center,
        start_angle,
        end_angle,
        current_angle,
        angle_increment,
    } = actor.movement
    else {
        return;
    };

    // The final step is clamped to the remaining sweep, so the arc lands on
    // end_angle exactly and can never overshoot or stall short of it.
    let remaining = end_angle - current_angle;
    let finished =
        remaining.abs() <= angle_increment.abs() || remaining.signum() != angle_increment.signum();

    if finished {
        actor.position = arc_point(center, geometry.corner_radius, end_angle);
        actor.edge = actor.edge.next();
        actor.heading = actor.edge.heading();
        actor.movement = MovementState::EdgeWalk;
    } else {
        let advanced = current_angle + angle_increment;
        actor.position = arc_point(center, geometry.corner_radius, advanced);
        actor.heading = normalize_angle(advanced + FRAC_PI_2);
        actor.movement = MovementState::CornerArc {
            center,
            start_angle,
            end_angle,
            current_angle: advanced,
            angle_increment,
        };
    }
}

/// Fade direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FadeDirection {
    In,
    Out,
}

/// A per-actor fade transaction: `steps` discrete opacity moves, optionally
/// preceded by a tick delay (used to stagger the initial fill's fade-ins).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fade {
    direction: FadeDirection,
    delay: u32,
    step: u32,
    steps: u32,
}

impl Fade {
    const fn fade_in(steps: u32, delay: u32) -> Self {
        Self {
            direction: FadeDirection::In,
            delay,
            step: 0,
            steps,
        }
    }

    const fn fade_out(steps: u32) -> Self {
        Self {
            direction: FadeDirection::Out,
            delay: 0,
            step: 0,
            steps,
        }
    }

    /// Advance one tick. Returns the new opacity, or `None` while the fade is
    /// still waiting out its start delay. The final step always yields
    /// exactly 1.0 (fade-in) or 0.0 (fade-out).
    fn advance(&mut self) -> Option<f32> {
        if self.delay > 0 {
            self.delay -= 1;
            return None;
        }
        self.step = (self.step + 1).min(self.steps);
        let progress = self.step as f32 / self.steps as f32;
        Some(match self.direction {
            FadeDirection::In => progress,
            FadeDirection::Out => 1.0 - progress,
        })
    }

    const fn finished(&self) -> bool {
        self.step >= self.steps
    }
}

/// Spawn placement produced by the rejection sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpawnPoint {
    position: Point,
    edge: Edge,
    heading: f32,
}

/// Rejection-sample a spawn placement at least `min_distance` away from every
/// occupied position. Gives up after `max_attempts` candidates rather than
/// accepting an overlapping one.
fn place_one(
    rng: &mut SmallRng,
    geometry: &Geometry,
    occupied: &[Point],
    max_attempts: u32,
) -> Result<SpawnPoint, PlacementError> {
    for _ in 0..max_attempts {
        let edge = Edge::from_index(rng.random_range(0..4u8));
        let t = rng.random_range(0.0..geometry.edge_span(edge));
        let position = geometry.spawn_point(edge, t);
        let clear = occupied
            .iter()
            .all(|other| position.distance_to(*other) >= geometry.min_distance);
        if clear {
            return Ok(SpawnPoint {
                position,
                edge,
                heading: edge.heading(),
            });
        }
    }
    Err(PlacementError::Exhausted {
        attempts: max_attempts,
    })
}

/// A replacement spawn scheduled for a future tick. The character type is
/// chosen at the due tick from the then-current available pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingSpawn {
    due: Tick,
}

/// Why a scheduled spawn was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnFailureReason {
    /// The asset provider could not supply frames for the chosen type.
    AssetLoadFailure,
    /// Rejection sampling ran out of attempts.
    PlacementExhausted,
}

/// A spawn attempt abandoned this tick; the type stays in the available pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnFailure {
    pub character: String,
    pub reason: SpawnFailureReason,
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    /// Character whose fade-out began this tick.
    pub rotation_started: Option<String>,
    /// Characters whose fade-out completed and were removed this tick.
    pub retired: Vec<String>,
    /// Characters spawned (fade-in begun) this tick.
    pub spawned: Vec<String>,
    /// Spawn attempts abandoned this tick.
    pub spawn_failures: Vec<SpawnFailure>,
}

/// Per-tick population summary retained in the rolling history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: Tick,
    pub active: usize,
    pub fading: usize,
    pub pending_spawns: usize,
}

/// Read-only view of one actor handed to renderers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActorSnapshot {
    pub position: Point,
    pub heading: f32,
    pub frame_index: usize,
    /// Handle of the frame to draw, resolved from the actor's frame set.
    pub frame: FrameHandle,
    pub opacity: f32,
    pub character: String,
}

/// The simulation driver. Owns the actor collection exclusively; hosts drive
/// it with [`WorldState::step`] once per accepted frame and read back
/// [`WorldState::snapshot`].
pub struct WorldState {
    config: EdgewalkConfig,
    bounds: (f32, f32),
    tick: Tick,
    rng: SmallRng,
    actors: SlotMap<ActorId, Actor>,
    fades: ActorMap<Fade>,
    /// Roster types without a live actor, sorted for deterministic sampling.
    available: Vec<String>,
    /// Roster types with a live actor, sorted.
    active: Vec<String>,
    pending_spawns: Vec<PendingSpawn>,
    assets: Box<dyn AssetProvider>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("config", &self.config)
            .field("bounds", &self.bounds)
            .field("tick", &self.tick)
            .field("actor_count", &self.actors.len())
            .field("pending_spawns", &self.pending_spawns.len())
            .finish()
    }
}

impl WorldState {
    /// Instantiate a new world from configuration and an asset provider.
    pub fn new(
        config: EdgewalkConfig,
        assets: Box<dyn AssetProvider>,
    ) -> Result<Self, WorldStateError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let mut available = config.roster.clone();
        available.sort();
        let bounds = (config.viewport_width, config.viewport_height);
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            bounds,
            tick: Tick::zero(),
            rng,
            actors: SlotMap::with_key(),
            fades: ActorMap::new(),
            available,
            active: Vec::new(),
            pending_spawns: Vec::new(),
            assets,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Fill the cast up to `max_active` with distinct random types, placed
    /// without overlap and faded in with a staggered delay per actor. Types
    /// whose assets fail to load or that cannot be placed are skipped; the
    /// per-tick backfill repairs any shortfall later. Returns the number of
    /// actors spawned.
    pub fn populate(&mut self) -> usize {
        let geometry = self.geometry();
        let mut occupied: Vec<Point> = self.actors.values().map(|actor| actor.position).collect();
        let mut candidates = self.available.clone();
        let target = self.config.max_active.saturating_sub(self.actors.len());
        let mut spawned = 0usize;
        while spawned < target && !candidates.is_empty() {
            let slot = self.rng.random_range(0..candidates.len());
            let character = candidates.swap_remove(slot);
            let Ok(frames) = self.assets.load_frames(&character) else {
                continue;
            };
            let Ok(spot) = place_one(
                &mut self.rng,
                &geometry,
                &occupied,
                self.config.placement_max_attempts,
            ) else {
                continue;
            };
            occupied.push(spot.position);
            let delay = spawned as u32 * self.config.initial_fade_stagger_ticks;
            self.insert_actor(character, frames, spot, delay);
            spawned += 1;
        }
        spawned
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();
        let geometry = self.geometry();
        let mut events = TickEvents {
            tick: next_tick,
            ..TickEvents::default()
        };

        self.stage_animation();
        self.stage_locomotion(&geometry);
        let faded_out = self.stage_fades();
        self.stage_retirement(faded_out, &mut events);
        self.stage_rotation(next_tick, &mut events);
        self.stage_respawn(next_tick, &geometry, &mut events);
        self.record_summary(next_tick);

        self.tick = next_tick;
        events
    }

    fn stage_animation(&mut self) {
        let frame_delay = self.config.frame_delay;
        for actor in self.actors.values_mut() {
            if actor.active {
                advance_animation(actor, frame_delay);
            }
        }
    }

    fn stage_locomotion(&mut self, geometry: &Geometry) {
        for actor in self.actors.values_mut() {
            if actor.active {
                advance_actor(actor, geometry);
            }
        }
    }

    /// Advance all fade transactions; returns actors whose fade-out finished
    /// this tick. Transactions whose target actor is gone cancel themselves.
    fn stage_fades(&mut self) -> Vec<ActorId> {
        let mut finished = Vec::new();
        let mut faded_out = Vec::new();
        for (id, fade) in self.fades.iter_mut() {
            let Some(actor) = self.actors.get_mut(id) else {
                finished.push(id);
                continue;
            };
            if let Some(opacity) = fade.advance() {
                actor.opacity = opacity;
            }
            if fade.finished() {
                finished.push(id);
                if fade.direction == FadeDirection::Out {
                    faded_out.push(id);
                }
            }
        }
        for id in finished {
            self.fades.remove(id);
        }
        faded_out
    }

    fn stage_retirement(&mut self, faded_out: Vec<ActorId>, events: &mut TickEvents) {
        for id in faded_out {
            if let Some(actor) = self.actors.remove(id) {
                remove_type(&mut self.active, &actor.character);
                insert_type(&mut self.available, actor.character.clone());
                events.retired.push(actor.character);
            }
        }
    }

    fn stage_rotation(&mut self, next_tick: Tick, events: &mut TickEvents) {
        let interval = self.config.rotation_interval_ticks;
        if interval == 0 || !next_tick.0.is_multiple_of(u64::from(interval)) {
            return;
        }
        if self.available.is_empty() {
            return;
        }
        let candidates: Vec<ActorId> = self
            .actors
            .iter()
            .filter(|(id, actor)| {
                actor.active
                    && (actor.opacity - 1.0).abs() < f32::EPSILON
                    && !self.fades.contains_key(*id)
            })
            .map(|(id, _)| id)
            .collect();
        if candidates.is_empty() {
            return;
        }
        let id = candidates[self.rng.random_range(0..candidates.len())];
        self.fades.insert(id, Fade::fade_out(self.config.fade_steps));
        if let Some(actor) = self.actors.get(id) {
            events.rotation_started = Some(actor.character.clone());
        }
    }

    fn stage_respawn(&mut self, next_tick: Tick, geometry: &Geometry, events: &mut TickEvents) {
        let mut due = 0usize;
        self.pending_spawns.retain(|pending| {
            if pending.due <= next_tick {
                due += 1;
                false
            } else {
                true
            }
        });

        for _ in 0..due {
            if self.available.is_empty() {
                continue;
            }
            let slot = self.rng.random_range(0..self.available.len());
            let character = self.available[slot].clone();
            let frames = match self.assets.load_frames(&character) {
                Ok(frames) => frames,
                Err(_) => {
                    events.spawn_failures.push(SpawnFailure {
                        character,
                        reason: SpawnFailureReason::AssetLoadFailure,
                    });
                    continue;
                }
            };
            let occupied: Vec<Point> = self.actors.values().map(|actor| actor.position).collect();
            match place_one(
                &mut self.rng,
                geometry,
                &occupied,
                self.config.placement_max_attempts,
            ) {
                Ok(spot) => {
                    self.insert_actor(character.clone(), frames, spot, 0);
                    events.spawned.push(character);
                }
                Err(PlacementError::Exhausted { .. }) => {
                    events.spawn_failures.push(SpawnFailure {
                        character,
                        reason: SpawnFailureReason::PlacementExhausted,
                    });
                }
            }
        }

        // Whatever the deficit's origin (retirement, abandoned placement,
        // asset failure), schedule replacements after a fresh random delay.
        let committed = self.actors.len() + self.pending_spawns.len();
        let deficit = self.config.max_active.saturating_sub(committed);
        for _ in 0..deficit {
            let (lo, hi) = self.config.respawn_delay_ticks;
            let delay = self.rng.random_range(lo..=hi);
            self.pending_spawns.push(PendingSpawn {
                due: Tick(next_tick.0 + u64::from(delay)),
            });
        }
    }

    fn record_summary(&mut self, next_tick: Tick) {
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TickSummary {
            tick: next_tick,
            active: self.actors.len(),
            fading: self.fades.len(),
            pending_spawns: self.pending_spawns.len(),
        });
    }

    fn insert_actor(
        &mut self,
        character: String,
        frames: Arc<FrameSet>,
        spot: SpawnPoint,
        fade_delay: u32,
    ) -> ActorId {
        let actor = Actor {
            character: character.clone(),
            frames,
            position: spot.position,
            heading: spot.heading,
            edge: spot.edge,
            movement: MovementState::EdgeWalk,
            frame_index: 0,
            frame_delay_counter: 0,
            opacity: 0.0,
            active: true,
        };
        let id = self.actors.insert(actor);
        self.fades
            .insert(id, Fade::fade_in(self.config.fade_steps, fade_delay));
        remove_type(&mut self.available, &character);
        insert_type(&mut self.active, character);
        id
    }

    /// Read-only actor snapshots for the renderer, in stable arena order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActorSnapshot> {
        self.actors
            .values()
            .filter(|actor| actor.active)
            .map(|actor| ActorSnapshot {
                position: actor.position,
                heading: actor.heading,
                frame_index: actor.frame_index,
                frame: actor
                    .frames
                    .handle(actor.frame_index)
                    .unwrap_or(FrameHandle(0)),
                opacity: actor.opacity,
                character: actor.character.clone(),
            })
            .collect()
    }

    /// Update the viewport bounds; geometry is re-derived next tick.
    pub fn set_bounds(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.bounds = (width, height);
        }
    }

    /// Current viewport bounds.
    #[must_use]
    pub const fn bounds(&self) -> (f32, f32) {
        self.bounds
    }

    /// Geometry derived from the current bounds.
    #[must_use]
    pub fn geometry(&self) -> Geometry {
        Geometry::derive(&self.config, self.bounds.0, self.bounds.1)
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &EdgewalkConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of live actors (including mid-fade ones).
    #[must_use]
    pub fn actor_count(&self) -> usize {
        self.actors.len()
    }

    /// Iterate over live actors and their handles.
    pub fn actors(&self) -> impl Iterator<Item = (ActorId, &Actor)> {
        self.actors.iter()
    }

    /// Borrow a specific actor.
    #[must_use]
    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id)
    }

    /// Roster types currently alive, sorted.
    #[must_use]
    pub fn active_types(&self) -> &[String] {
        &self.active
    }

    /// Roster types currently spawnable, sorted.
    #[must_use]
    pub fn available_types(&self) -> &[String] {
        &self.available
    }

    /// Number of replacement spawns waiting on their delay.
    #[must_use]
    pub fn pending_spawn_count(&self) -> usize {
        self.pending_spawns.len()
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// A frame pacer matching the configured tick rate.
    #[must_use]
    pub fn pacer(&self) -> FramePacer {
        FramePacer::new(self.config.tick_hz)
    }
}

fn insert_type(pool: &mut Vec<String>, character: String) {
    if let Err(slot) = pool.binary_search(&character) {
        pool.insert(slot, character);
    }
}

fn remove_type(pool: &mut Vec<String>, character: &str) {
    if let Ok(slot) = pool.binary_search_by(|entry| entry.as_str().cmp(character)) {
        pool.remove(slot);
    }
}

/// Fixed-rate frame gate: accepts a poll only when at least one target
/// interval has elapsed since the last accepted one, otherwise the frame is
/// skipped. Per-tick deltas stay constant; there is no wall-clock scaling.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl FramePacer {
    /// Build a pacer targeting `tick_hz` frames per second. `tick_hz` must be
    /// positive and finite (configuration validation guarantees this for
    /// pacers built through [`WorldState::pacer`]).
    #[must_use]
    pub fn new(tick_hz: f32) -> Self {
        Self {
            interval: Duration::from_secs_f32(1.0 / tick_hz),
            last: None,
        }
    }

    /// Target interval between accepted frames.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when the caller should run a tick for `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                true
            }
            Some(last) => {
                if now.saturating_duration_since(last) >= self.interval {
                    self.last = Some(now);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Test provider: three frames per character, with an optional set of
    /// types that always fail to load.
    #[derive(Default)]
    struct StubAssets {
        failing: HashSet<String>,
        minted: u64,
    }

    impl StubAssets {
        fn failing(types: &[&str]) -> Self {
            Self {
                failing: types.iter().map(|name| (*name).to_owned()).collect(),
                minted: 0,
            }
        }
    }

    impl AssetProvider for StubAssets {
        fn load_frames(&mut self, character: &str) -> Result<Arc<FrameSet>, AssetError> {
            if self.failing.contains(character) {
                return Err(AssetError::NotFound(character.to_owned()));
            }
            let frames = (0..3)
                .map(|_| {
                    self.minted += 1;
                    FrameHandle(self.minted)
                })
                .collect();
            FrameSet::new(frames)
                .map(Arc::new)
                .ok_or_else(|| AssetError::EmptyFrames(character.to_owned()))
        }
    }

    fn sample_config() -> EdgewalkConfig {
        EdgewalkConfig {
            viewport_width: 1000.0,
            viewport_height: 800.0,
            min_distance_pct: 0.125,
            rng_seed: Some(42),
            ..EdgewalkConfig::default()
        }
    }

    fn sample_world() -> WorldState {
        WorldState::new(sample_config(), Box::new(StubAssets::default())).expect("world")
    }

    fn walk_frames() -> Arc<FrameSet> {
        Arc::new(FrameSet::new(vec![FrameHandle(1), FrameHandle(2), FrameHandle(3)]).expect("frames"))
    }

    fn actor_at(position: Point, edge: Edge) -> Actor {
        Actor {
            character: "Apple".to_owned(),
            frames: walk_frames(),
            position,
            heading: edge.heading(),
            edge,
            movement: MovementState::EdgeWalk,
            frame_index: 0,
            frame_delay_counter: 0,
            opacity: 1.0,
            active: true,
        }
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let ok = sample_config();
        assert!(ok.validate().is_ok());

        let cases: Vec<EdgewalkConfig> = vec![
            EdgewalkConfig {
                viewport_width: 0.0,
                ..sample_config()
            },
            EdgewalkConfig {
                actor_size_pct: -0.1,
                ..sample_config()
            },
            EdgewalkConfig {
                corner_radius_pct: 0.0,
                ..sample_config()
            },
            EdgewalkConfig {
                edge_offset_pct: -0.3,
                ..sample_config()
            },
            EdgewalkConfig {
                edge_speed_pct: 0.0,
                ..sample_config()
            },
            EdgewalkConfig {
                frame_delay: 0,
                ..sample_config()
            },
            EdgewalkConfig {
                fade_steps: 0,
                ..sample_config()
            },
            EdgewalkConfig {
                max_active: 0,
                ..sample_config()
            },
            EdgewalkConfig {
                max_active: 20,
                ..sample_config()
            },
            EdgewalkConfig {
                roster: Vec::new(),
                ..sample_config()
            },
            EdgewalkConfig {
                roster: vec!["Apple".to_owned(), "Apple".to_owned()],
                max_active: 1,
                ..sample_config()
            },
            EdgewalkConfig {
                respawn_delay_ticks: (10, 5),
                ..sample_config()
            },
            EdgewalkConfig {
                placement_max_attempts: 0,
                ..sample_config()
            },
            EdgewalkConfig {
                tick_hz: 0.0,
                ..sample_config()
            },
            EdgewalkConfig {
                history_capacity: 0,
                ..sample_config()
            },
        ];
        for bad in cases {
            assert!(
                matches!(bad.validate(), Err(WorldStateError::InvalidConfig(_))),
                "expected rejection: {bad:?}"
            );
        }
    }

    #[test]
    fn geometry_derives_from_smaller_dimension() {
        let config = sample_config();
        let geometry = Geometry::derive(&config, 1000.0, 800.0);
        assert_eq!(geometry.smaller, 800.0);
        assert!((geometry.actor_size - 800.0 * 0.275).abs() < 1e-3);
        assert!((geometry.min_distance - 100.0).abs() < 1e-3);
        assert!((geometry.corner_speed - geometry.edge_speed * 5.5).abs() < 1e-4);
        assert_eq!(geometry.edge_span(Edge::Bottom), 1000.0);
        assert_eq!(geometry.edge_span(Edge::Left), 800.0);

        let spot = geometry.spawn_point(Edge::Right, 120.0);
        assert!((spot.x - (1000.0 - geometry.edge_offset)).abs() < 1e-3);
        assert_eq!(spot.y, 120.0);
    }

    #[test]
    fn edge_cycle_and_headings() {
        assert_eq!(Edge::Bottom.next(), Edge::Right);
        assert_eq!(Edge::Right.next(), Edge::Top);
        assert_eq!(Edge::Top.next(), Edge::Left);
        assert_eq!(Edge::Left.next(), Edge::Bottom);
        assert_eq!(Edge::from_index(7), Edge::Left);
        assert_eq!(Edge::Bottom.heading(), 0.0);
        assert_eq!(Edge::Right.heading(), FRAC_PI_2);
        assert_eq!(Edge::Top.heading(), PI);
        assert!((Edge::Left.heading() - PI * 1.5).abs() < 1e-6);
    }

    #[test]
    fn normalize_angle_wraps_into_turn() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert!((normalize_angle(-FRAC_PI_2) - PI * 1.5).abs() < 1e-6);
        assert!((normalize_angle(TAU + 0.25) - 0.25).abs() < 1e-6);
        assert_eq!(normalize_angle(f32::NAN), 0.0);
        let wrapped = normalize_angle(-1e-4);
        assert!((0.0..TAU).contains(&wrapped));
    }

    #[test]
    fn edge_walk_triggers_corner_at_threshold() {
        let config = EdgewalkConfig {
            viewport_width: 1000.0,
            viewport_height: 1000.0,
            corner_radius_pct: 0.2,
            edge_offset_pct: 0.0,
            edge_speed_pct: 0.002,
            ..sample_config()
        };
        let geometry = Geometry::derive(&config, 1000.0, 1000.0);
        assert!((geometry.edge_speed - 2.0).abs() < 1e-4);
        let threshold = geometry.width - geometry.corner_radius - geometry.edge_offset;

        let mut actor = actor_at(Point::new(threshold - 0.5, 0.0), Edge::Bottom);
        advance_actor(&mut actor, &geometry);

        match actor.movement {
            MovementState::CornerArc {
                start_angle,
                end_angle,
                current_angle,
                angle_increment,
                center,
            } => {
                assert!((start_angle - PI * 1.5).abs() < 1e-6);
                assert!((end_angle - TAU).abs() < 1e-6);
                assert_eq!(current_angle, start_angle);
                assert!(angle_increment > 0.0);
                assert!((center.x - threshold).abs() < 1e-3);
                assert!((center.y - geometry.corner_radius).abs() < 1e-3);
            }
            MovementState::EdgeWalk => panic!("expected corner transition"),
        }
    }

    #[test]
    fn corner_arc_terminates_exactly_in_both_directions() {
        let config = EdgewalkConfig {
            viewport_width: 1000.0,
            viewport_height: 1000.0,
            corner_radius_pct: 0.2,
            edge_offset_pct: 0.0,
            ..sample_config()
        };
        let geometry = Geometry::derive(&config, 1000.0, 1000.0);

        for (start, end) in [(PI * 1.5, TAU), (TAU, PI * 1.5)] {
            let center = Point::new(500.0, 500.0);
            let direction = if end - start >= 0.0 { 1.0 } else { -1.0 };
            let mut actor = actor_at(arc_point(center, geometry.corner_radius, start), Edge::Bottom);
            actor.movement = MovementState::CornerArc {
                center,
                start_angle: start,
                end_angle: end,
                current_angle: start,
                angle_increment: direction * geometry.corner_speed / geometry.corner_radius,
            };

            let mut ticks = 0u32;
            while matches!(actor.movement, MovementState::CornerArc { .. }) {
                if let MovementState::CornerArc { current_angle, .. } = actor.movement {
                    let sweep = (current_angle - start) * direction;
                    assert!(sweep >= 0.0, "arc ran backwards");
                    assert!(sweep <= (end - start).abs() + 1e-5, "arc overshot");
                }
                advance_actor(&mut actor, &geometry);
                ticks += 1;
                assert!(ticks < 10_000, "corner arc failed to terminate");
            }

            let expected = arc_point(center, geometry.corner_radius, end);
            assert!((actor.position.x - expected.x).abs() < 1e-3);
            assert!((actor.position.y - expected.y).abs() < 1e-3);
            assert_eq!(actor.edge, Edge::Right);
            assert_eq!(actor.heading, Edge::Right.heading());
        }
    }

    #[test]
    fn animation_clock_wraps_frames() {
        let mut actor = actor_at(Point::new(0.0, 0.0), Edge::Bottom);
        for _ in 0..2 {
            advance_animation(&mut actor, 2);
        }
        assert_eq!(actor.frame_index, 1);
        assert_eq!(actor.frame_delay_counter, 0);
        for _ in 0..4 {
            advance_animation(&mut actor, 2);
        }
        assert_eq!(actor.frame_index, 0, "frame index should wrap modulo 3");
        assert!(actor.frame_index < actor.frames.len());
    }

    #[test]
    fn fades_land_exactly_on_bounds() {
        for steps in [1u32, 7, 30, 113] {
            let mut fade = Fade::fade_in(steps, 0);
            let mut previous = 0.0f32;
            let mut last = 0.0f32;
            while !fade.finished() {
                let opacity = fade.advance().expect("no delay configured");
                assert!(opacity > previous, "fade-in must be strictly increasing");
                previous = opacity;
                last = opacity;
            }
            assert_eq!(last, 1.0);

            let mut fade = Fade::fade_out(steps);
            let mut previous = 1.0f32;
            let mut last = 1.0f32;
            while !fade.finished() {
                let opacity = fade.advance().expect("no delay configured");
                assert!(opacity < previous, "fade-out must be strictly decreasing");
                previous = opacity;
                last = opacity;
            }
            assert_eq!(last, 0.0);
        }
    }

    #[test]
    fn fade_delay_holds_opacity() {
        let mut fade = Fade::fade_in(10, 3);
        for _ in 0..3 {
            assert_eq!(fade.advance(), None);
        }
        assert!(fade.advance().is_some());
    }

    #[test]
    fn placement_respects_min_distance_for_seven_actors() {
        // 1000x800 viewport, min distance 100, seven actors, 200 attempts.
        let config = sample_config();
        let geometry = Geometry::derive(&config, 1000.0, 800.0);
        assert!((geometry.min_distance - 100.0).abs() < 1e-3);

        let mut rng = SmallRng::seed_from_u64(7);
        let mut occupied: Vec<Point> = Vec::new();
        for _ in 0..7 {
            let spot = place_one(&mut rng, &geometry, &occupied, 200).expect("placement");
            assert_eq!(spot.heading, spot.edge.heading());
            occupied.push(spot.position);
        }
        for (i, a) in occupied.iter().enumerate() {
            for b in occupied.iter().skip(i + 1) {
                assert!(a.distance_to(*b) >= 100.0);
            }
        }
    }

    #[test]
    fn placement_holds_over_random_viewports() {
        let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
        for _ in 0..25 {
            let width = rng.random_range(400.0..2000.0f32);
            let height = rng.random_range(400.0..2000.0f32);
            let config = EdgewalkConfig {
                viewport_width: width,
                viewport_height: height,
                min_distance_pct: 0.1,
                ..sample_config()
            };
            let geometry = Geometry::derive(&config, width, height);
            let count = rng.random_range(1..=7usize);
            let mut occupied: Vec<Point> = Vec::new();
            for _ in 0..count {
                let spot = place_one(&mut rng, &geometry, &occupied, 200).expect("placement");
                occupied.push(spot.position);
            }
            for (i, a) in occupied.iter().enumerate() {
                for b in occupied.iter().skip(i + 1) {
                    assert!(a.distance_to(*b) >= geometry.min_distance);
                }
            }
        }
    }

    #[test]
    fn placement_abandons_when_exhausted() {
        let config = EdgewalkConfig {
            min_distance_pct: 10.0,
            ..sample_config()
        };
        let geometry = Geometry::derive(&config, 1000.0, 800.0);
        let mut rng = SmallRng::seed_from_u64(3);
        let occupied = vec![Point::new(500.0, 400.0)];
        let result = place_one(&mut rng, &geometry, &occupied, 200);
        assert_eq!(result, Err(PlacementError::Exhausted { attempts: 200 }));
    }

    #[test]
    fn populate_fills_to_max_with_distinct_types() {
        let mut world = sample_world();
        let spawned = world.populate();
        assert_eq!(spawned, 7);
        assert_eq!(world.actor_count(), 7);
        assert_eq!(world.active_types().len(), 7);
        assert_eq!(world.available_types().len(), 12);

        let types: HashSet<&str> = world
            .actors()
            .map(|(_, actor)| actor.character.as_str())
            .collect();
        assert_eq!(types.len(), 7, "each live type must be unique");
        for (_, actor) in world.actors() {
            assert_eq!(actor.opacity, 0.0, "freshly placed actors start transparent");
            assert_eq!(actor.movement, MovementState::EdgeWalk);
        }
    }

    #[test]
    fn populate_skips_unloadable_types() {
        let config = EdgewalkConfig {
            roster: vec!["Apple".to_owned(), "Balloon".to_owned()],
            max_active: 2,
            ..sample_config()
        };
        let assets = StubAssets::failing(&["Balloon"]);
        let mut world = WorldState::new(config, Box::new(assets)).expect("world");
        assert_eq!(world.populate(), 1);
        assert_eq!(world.active_types(), ["Apple".to_owned()]);
        assert_eq!(world.available_types(), ["Balloon".to_owned()]);
    }

    #[test]
    fn rotation_skips_when_pool_is_empty() {
        let config = EdgewalkConfig {
            roster: vec!["Apple".to_owned()],
            max_active: 1,
            rotation_interval_ticks: 10,
            fade_steps: 2,
            initial_fade_stagger_ticks: 0,
            ..sample_config()
        };
        let mut world = WorldState::new(config, Box::new(StubAssets::default())).expect("world");
        assert_eq!(world.populate(), 1);

        for _ in 0..40 {
            let events = world.step();
            assert!(events.rotation_started.is_none());
            assert!(events.retired.is_empty());
        }
        assert_eq!(world.actor_count(), 1);
        let (_, actor) = world.actors().next().expect("actor");
        assert_eq!(actor.opacity, 1.0);
    }

    #[test]
    fn rotation_retires_and_replaces() {
        let config = EdgewalkConfig {
            rotation_interval_ticks: 50,
            fade_steps: 5,
            respawn_delay_ticks: (4, 8),
            initial_fade_stagger_ticks: 0,
            max_active: 3,
            roster: vec![
                "Apple".to_owned(),
                "Bird".to_owned(),
                "Can".to_owned(),
                "Goo".to_owned(),
            ],
            ..sample_config()
        };
        let mut world = WorldState::new(config, Box::new(StubAssets::default())).expect("world");
        world.populate();

        let mut rotated = None;
        let mut retired = None;
        let mut spawned = None;
        for _ in 0..200 {
            let events = world.step();
            if events.rotation_started.is_some() {
                rotated = events.rotation_started.clone();
            }
            if let Some(character) = events.retired.first() {
                retired = Some(character.clone());
            }
            if let Some(character) = events.spawned.first() {
                spawned = Some(character.clone());
                break;
            }
        }
        let rotated = rotated.expect("a rotation should have started");
        let retired = retired.expect("the rotated actor should retire");
        assert_eq!(rotated, retired);
        assert!(spawned.is_some(), "a replacement should spawn");
        assert_eq!(world.actor_count(), 3);
    }

    #[test]
    fn step_reports_summaries() {
        let mut world = sample_world();
        world.populate();
        world.step();
        world.step();
        let history: Vec<_> = world.history().cloned().collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].tick, Tick(1));
        assert_eq!(history[1].tick, Tick(2));
        assert_eq!(history[1].active, 7);
    }

    #[test]
    fn seeded_runs_are_deterministic() {
        let run = |seed: u64| {
            let config = EdgewalkConfig {
                rotation_interval_ticks: 40,
                fade_steps: 5,
                respawn_delay_ticks: (3, 9),
                rng_seed: Some(seed),
                ..sample_config()
            };
            let mut world = WorldState::new(config, Box::new(StubAssets::default())).expect("world");
            world.populate();
            let mut events = Vec::new();
            for _ in 0..300 {
                events.push(world.step());
            }
            (events, world.snapshot())
        };

        let (events_a, snapshot_a) = run(0xDEADBEEF);
        let (events_b, snapshot_b) = run(0xDEADBEEF);
        assert_eq!(events_a, events_b);
        assert_eq!(snapshot_a, snapshot_b);

        let (events_c, snapshot_c) = run(0xF00DF00D);
        assert!(
            events_a != events_c || snapshot_a != snapshot_c,
            "different seeds should diverge"
        );
    }

    #[test]
    fn snapshot_resolves_frame_handles() {
        let mut world = sample_world();
        world.populate();
        for snapshot in world.snapshot() {
            assert!(snapshot.opacity >= 0.0 && snapshot.opacity <= 1.0);
            assert!(snapshot.frame_index < 3);
            assert!(snapshot.frame.0 > 0, "handle should come from the provider");
        }
    }

    #[test]
    fn caching_assets_memoizes_successes_only() {
        let mut assets = CachingAssets::new(StubAssets::failing(&["Balloon"]));
        let first = assets.load_frames("Apple").expect("frames");
        let second = assets.load_frames("Apple").expect("frames");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(assets.cached(), 1);

        assert!(assets.load_frames("Balloon").is_err());
        assert_eq!(assets.cached(), 1, "failures must not be cached");
    }

    #[test]
    fn set_bounds_rederives_geometry() {
        let mut world = sample_world();
        let before = world.geometry();
        world.set_bounds(500.0, 500.0);
        let after = world.geometry();
        assert!(after.smaller < before.smaller);
        world.set_bounds(0.0, 10.0);
        assert_eq!(world.bounds(), (500.0, 500.0), "degenerate bounds ignored");
    }
}
