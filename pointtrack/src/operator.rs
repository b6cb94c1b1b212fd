//! Tracking operator - a `TrackManager` driven by a command queue
//!
//! Provides:
//! - Command queue so producers never block on the tracking pipeline
//! - Single worker thread applying commands in submission order
//! - Fast query of the latest published snapshot
use crate::config::TrackerConfig;
use crate::error::{Result, TrackingError};
use crate::manager::{TrackManager, TrackSnapshot, TrackerStats};
use crate::observation::Observation;
use crate::track::TrackId;
use crate::trajectory::TrajectoryPoint;
use nalgebra::Point3;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

/// Commands processed by the worker thread
#[derive(Debug)]
pub enum TrackingCommand {
    /// Run one frame of the tracking pipeline
    Step {
        observations: Vec<Observation>,
        timestamp: f64,
    },
    /// Drop a track
    Remove(TrackId),
    /// Hint that a track is hidden, for the next step
    MarkOccluded(TrackId),
    /// Clear all tracks
    Reset,
    /// Acknowledge once every earlier command has been applied
    Flush(Sender<()>),
    /// Stop the worker thread
    Shutdown,
}

/// A poisoned lock still holds a consistent manager, a panic can only
/// interrupt a step between frames
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TrackingOperator {
    command_tx: Sender<TrackingCommand>,
    manager: Arc<Mutex<TrackManager>>,
    last_snapshot: Arc<Mutex<Vec<TrackSnapshot>>>,
    worker_handle: Option<thread::JoinHandle<()>>,
}

impl TrackingOperator {
    /// Validate the configuration and start the worker thread
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let manager = Arc::new(Mutex::new(TrackManager::new(config)?));
        let last_snapshot = Arc::new(Mutex::new(Vec::new()));
        let (command_tx, command_rx) = channel::<TrackingCommand>();

        let manager_clone = Arc::clone(&manager);
        let snapshot_clone = Arc::clone(&last_snapshot);
        let worker_handle = thread::spawn(move || {
            Self::command_processor(manager_clone, snapshot_clone, command_rx);
        });

        Ok(Self {
            command_tx,
            manager,
            last_snapshot,
            worker_handle: Some(worker_handle),
        })
    }

    fn send(&self, command: TrackingCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| TrackingError::OperatorStopped)
    }

    /// Queue a frame of observations (non-blocking)
    pub fn send_step(&self, observations: Vec<Observation>, timestamp: f64) -> Result<()> {
        self.send(TrackingCommand::Step {
            observations,
            timestamp,
        })
    }

    /// Queue removal of a track (non-blocking)
    pub fn send_remove(&self, id: TrackId) -> Result<()> {
        self.send(TrackingCommand::Remove(id))
    }

    /// Queue a reset (non-blocking)
    pub fn send_reset(&self) -> Result<()> {
        self.send(TrackingCommand::Reset)
    }

    /// Block until every command queued so far has been applied
    pub fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel();
        self.send(TrackingCommand::Flush(ack_tx))?;
        ack_rx.recv().map_err(|_| TrackingError::OperatorStopped)
    }

    /// Tracks published by the most recently applied command
    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        lock(&self.last_snapshot).clone()
    }

    pub fn predict_at(&self, timestamp: f64) -> Vec<(TrackId, Point3<f64>)> {
        lock(&self.manager).predict_at(timestamp)
    }

    pub fn trajectory(
        &self,
        id: TrackId,
        duration: f64,
        resolution: usize,
    ) -> Result<Vec<TrajectoryPoint>> {
        lock(&self.manager).trajectory(id, duration, resolution)
    }

    /// Queue an occlusion hint (non-blocking)
    ///
    /// Applies to the first step submitted after this call. Unknown ids are
    /// logged and ignored by the worker.
    pub fn send_mark_occluded(&self, id: TrackId) -> Result<()> {
        self.send(TrackingCommand::MarkOccluded(id))
    }

    pub fn stats(&self) -> TrackerStats {
        lock(&self.manager).stats()
    }

    /// Stop the worker after the commands already queued
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(TrackingCommand::Shutdown);
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("Tracking worker thread panicked");
            }
        }
    }

    fn command_processor(
        manager: Arc<Mutex<TrackManager>>,
        last_snapshot: Arc<Mutex<Vec<TrackSnapshot>>>,
        command_rx: Receiver<TrackingCommand>,
    ) {
        log::info!("Tracking command processor started");
        let mut frames_processed = 0_u64;

        loop {
            match command_rx.recv() {
                Ok(TrackingCommand::Step {
                    observations,
                    timestamp,
                }) => {
                    let mut manager = lock(&manager);
                    let snapshot = manager.step(&observations, timestamp);
                    *lock(&last_snapshot) = snapshot;
                    frames_processed += 1;

                    if frames_processed % 100 == 0 {
                        log::debug!(
                            "Tracking processed {} frames, {} live tracks",
                            frames_processed,
                            manager.len()
                        );
                    }
                }
                Ok(TrackingCommand::Remove(id)) => {
                    let mut manager = lock(&manager);
                    manager.remove(id);
                    *lock(&last_snapshot) = manager.snapshot();
                }
                Ok(TrackingCommand::MarkOccluded(id)) => {
                    if let Err(e) = lock(&manager).mark_occluded(id) {
                        log::warn!("Occlusion hint ignored: {e}");
                    }
                }
                Ok(TrackingCommand::Reset) => {
                    lock(&manager).reset();
                    lock(&last_snapshot).clear();
                }
                Ok(TrackingCommand::Flush(ack)) => {
                    // the caller may have given up waiting
                    let _ = ack.send(());
                }
                Ok(TrackingCommand::Shutdown) => {
                    log::info!(
                        "Tracking worker shutting down after {} frames",
                        frames_processed
                    );
                    break;
                }
                Err(_) => {
                    log::warn!("Tracking command channel disconnected");
                    break;
                }
            }
        }

        log::info!("Tracking command processor stopped");
    }
}

impl Drop for TrackingOperator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::LifecycleState;

    fn operator() -> TrackingOperator {
        TrackingOperator::new(TrackerConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = TrackingOperator::new(TrackerConfig {
            loss_threshold: 0,
            ..Default::default()
        });
        assert!(matches!(
            result,
            Err(TrackingError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_steps_are_applied_in_order() {
        let op = operator();
        op.send_step(vec![Observation::at(0.0, 0.0, 1.0, 0.9, 0.0)], 0.0)
            .unwrap();
        op.send_step(vec![Observation::at(0.01, 0.0, 1.0, 0.9, 0.033)], 0.033)
            .unwrap();
        op.flush().unwrap();

        let snapshot = op.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].total_detections, 2);
        assert_eq!(op.stats().frames, 2);
        assert_eq!(op.predict_at(0.033).len(), 1);
    }

    #[test]
    fn test_remove_and_reset() {
        let op = operator();
        op.send_step(
            vec![
                Observation::at(0.0, 0.0, 0.0, 0.9, 0.0),
                Observation::at(3.0, 0.0, 0.0, 0.9, 0.0),
            ],
            0.0,
        )
        .unwrap();
        op.flush().unwrap();
        let first = op.snapshot()[0].id;

        op.send_remove(first).unwrap();
        op.flush().unwrap();
        assert_eq!(op.snapshot().len(), 1);
        assert_eq!(
            op.trajectory(first, 1.0, 3),
            Err(TrackingError::TrackNotFound(first))
        );

        op.send_reset().unwrap();
        op.flush().unwrap();
        assert!(op.snapshot().is_empty());
    }

    #[test]
    fn test_occlusion_hint_applies_to_next_submitted_step() {
        let op = operator();
        op.send_step(vec![Observation::at(0.0, 0.0, 1.0, 0.9, 0.0)], 0.0)
            .unwrap();
        op.send_step(vec![Observation::at(0.0, 0.0, 1.0, 0.9, 0.033)], 0.033)
            .unwrap();
        // queued behind both steps, so the track already exists when applied
        op.send_mark_occluded(TrackId(1)).unwrap();
        op.send_step(Vec::new(), 0.066).unwrap();
        op.flush().unwrap();

        let snapshot = op.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].lifecycle_state, LifecycleState::Occluded);

        // unknown ids do not stop the worker
        op.send_mark_occluded(TrackId(42)).unwrap();
        op.flush().unwrap();
    }

    #[test]
    fn test_commands_fail_after_shutdown() {
        let mut op = operator();
        op.shutdown();

        assert_eq!(op.send_reset(), Err(TrackingError::OperatorStopped));
        assert_eq!(op.flush(), Err(TrackingError::OperatorStopped));
        // shutting down twice is harmless
        op.shutdown();
    }
}
