//! Headless shell for the edgewalk simulation: wires a caching asset
//! provider into the core, paces ticks at the configured rate, and renders
//! snapshots as a coarse text grid in place of a real drawing backend.

use anyhow::Result;
use edgewalk_core::{
    ActorSnapshot, AssetError, AssetProvider, CachingAssets, EdgewalkConfig, FrameHandle, FrameSet,
    Geometry, WorldState,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Accepted frames to run before exiting (30 seconds at the default rate).
const RUN_FRAMES: u64 = 900;

fn main() -> Result<()> {
    init_tracing();
    let mut world = bootstrap_world()?;
    info!("Starting edgewalk simulation shell");
    run_loop(&mut world);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_world() -> Result<WorldState> {
    let config = EdgewalkConfig::default();
    let assets = CachingAssets::new(WalkCycleAssets::with_default_roster(&config.roster));
    let mut world = WorldState::new(config, Box::new(assets))?;
    let spawned = world.populate();
    info!(spawned, "Seeded initial cast");
    Ok(world)
}

fn run_loop(world: &mut WorldState) {
    let mut pacer = world.pacer();
    let renderer = TextRenderer::new(96, 28);
    let mut frames = 0u64;

    while frames < RUN_FRAMES {
        if !pacer.poll(Instant::now()) {
            std::thread::sleep(Duration::from_millis(1));
            continue;
        }

        let events = world.step();
        if let Some(character) = &events.rotation_started {
            info!(tick = events.tick.0, character = %character, "rotation started");
        }
        for character in &events.retired {
            info!(tick = events.tick.0, character = %character, "actor retired");
        }
        for character in &events.spawned {
            info!(tick = events.tick.0, character = %character, "actor spawned");
        }
        for failure in &events.spawn_failures {
            warn!(
                tick = events.tick.0,
                character = %failure.character,
                reason = ?failure.reason,
                "spawn abandoned",
            );
        }

        frames += 1;
        if frames.is_multiple_of(30) {
            println!("{}", renderer.render(&world.snapshot(), &world.geometry()));
        }
    }

    if let Some(summary) = world.history().last() {
        info!(
            tick = summary.tick.0,
            active = summary.active,
            fading = summary.fading,
            pending = summary.pending_spawns,
            "Run complete",
        );
    }
}

/// Stand-in asset source: resolves each roster character to a fixed-length
/// walk cycle of opaque frame handles, mirroring a `Name_Walk-N` image
/// sequence. A real host would decode images here.
struct WalkCycleAssets {
    cycles: HashMap<String, usize>,
    minted: u64,
}

impl WalkCycleAssets {
    fn with_default_roster(roster: &[String]) -> Self {
        let mut cycles = HashMap::new();
        for name in roster {
            let frames = match name.as_str() {
                "Butterfly" => 8,
                "Bird" => 7,
                "Bat" => 6,
                "Paint" => 4,
                _ => 3,
            };
            cycles.insert(name.clone(), frames);
        }
        Self { cycles, minted: 0 }
    }
}

impl AssetProvider for WalkCycleAssets {
    fn load_frames(&mut self, character: &str) -> Result<Arc<FrameSet>, AssetError> {
        let count = *self
            .cycles
            .get(character)
            .ok_or_else(|| AssetError::NotFound(character.to_owned()))?;
        let frames = (0..count)
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

/// Coarse character-grid renderer: one glyph per actor, brightness stepped by
/// opacity. Viewport y points up, terminal rows point down.
struct TextRenderer {
    cols: usize,
    rows: usize,
}

impl TextRenderer {
    fn new(cols: usize, rows: usize) -> Self {
        Self { cols, rows }
    }

    fn render(&self, actors: &[ActorSnapshot], geometry: &Geometry) -> String {
        let mut grid = vec![vec![' '; self.cols]; self.rows];
        for snapshot in actors {
            let col = (snapshot.position.x / geometry.width * self.cols as f32)
                .clamp(0.0, (self.cols - 1) as f32) as usize;
            let row_up = (snapshot.position.y / geometry.height * self.rows as f32)
                .clamp(0.0, (self.rows - 1) as f32) as usize;
            grid[self.rows - 1 - row_up][col] = glyph(snapshot);
        }

        let border: String = std::iter::repeat_n('-', self.cols + 2).collect();
        let mut out = String::with_capacity((self.cols + 3) * (self.rows + 2));
        out.push_str(&border);
        for row in grid {
            out.push('\n');
            out.push('|');
            out.extend(row);
            out.push('|');
        }
        out.push('\n');
        out.push_str(&border);
        out
    }
}

fn glyph(snapshot: &ActorSnapshot) -> char {
    let initial = snapshot.character.chars().next().unwrap_or('?');
    if snapshot.opacity < 0.25 {
        '.'
    } else if snapshot.opacity < 0.75 {
        initial.to_ascii_lowercase()
    } else {
        initial.to_ascii_uppercase()
    }
}
