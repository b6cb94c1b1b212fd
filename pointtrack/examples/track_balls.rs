//! Track two simulated balls, one of which drops out of view for a while
//!
//! Usage: cargo run --example track_balls [config.json]

use anyhow::{Context, Result};
use pointtrack::{Observation, TrackManager, TrackerConfig};

const FRAME: f64 = 1.0 / 30.0;

fn load_config() -> Result<TrackerConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("Invalid config {path}"))
        }
        None => Ok(TrackerConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut tracker = TrackManager::new(load_config()?)?;

    for frame in 0..60 {
        let t = frame as f64 * FRAME;
        let mut observations = vec![Observation::at(0.5 * t, 0.0, 1.5, 0.9, t)];
        // second ball is hidden for frames 20..24
        if !(20..24).contains(&frame) {
            observations.push(Observation::at(-0.5, 0.3 * t, 2.0, 0.8, t));
        }

        let tracks = tracker.step(&observations, t);
        if frame % 10 == 0 || (19..25).contains(&frame) {
            for track in &tracks {
                log::info!(
                    "frame {frame:2} track {} {} pos=({:.3}, {:.3}, {:.3}) conf={:.2}",
                    track.id,
                    track.lifecycle_state,
                    track.position.x,
                    track.position.y,
                    track.position.z,
                    track.confidence
                );
            }
        }
    }

    let now = tracker.last_timestamp().unwrap_or_default();
    for (id, position) in tracker.predict_at(now + 0.5) {
        log::info!("track {id} in 0.5s: ({:.3}, {:.3}, {:.3})", position.x, position.y, position.z);
        for point in tracker.trajectory(id, 0.5, 5)? {
            log::info!("  +{:.3}s conf={:.2}", point.time_offset, point.confidence);
        }
    }

    log::info!("{:?}", tracker.stats());
    Ok(())
}
