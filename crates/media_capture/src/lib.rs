use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use anyhow::anyhow;
use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub video: bool,
    pub audio: bool,
}

impl CaptureConstraints {
    pub fn camera_and_microphone() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// An acquired capture stream. Holding one holds the device lock.
pub trait CaptureStream: Send + Sync {
    fn tracks(&self) -> Vec<TrackKind>;
    fn stop_all_tracks(&self);
    fn is_live(&self) -> bool;
}

#[async_trait]
pub trait MediaCapability: Send + Sync {
    async fn acquire(
        &self,
        constraints: CaptureConstraints,
    ) -> anyhow::Result<Box<dyn CaptureStream>>;
}

pub trait PresenceSampler: Send + Sync {
    fn sample(&self) -> anyhow::Result<bool>;
}

pub struct MissingMediaCapability;

#[async_trait]
impl MediaCapability for MissingMediaCapability {
    async fn acquire(
        &self,
        _constraints: CaptureConstraints,
    ) -> anyhow::Result<Box<dyn CaptureStream>> {
        Err(anyhow!("media capture device is unavailable"))
    }
}

#[derive(Default)]
pub struct SyntheticMediaCapability {
    acquired: Arc<AtomicUsize>,
}

impl SyntheticMediaCapability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaCapability for SyntheticMediaCapability {
    async fn acquire(
        &self,
        constraints: CaptureConstraints,
    ) -> anyhow::Result<Box<dyn CaptureStream>> {
        if !constraints.video && !constraints.audio {
            return Err(anyhow!("capture requested without any track kind"));
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(TrackKind::Video);
        }
        if constraints.audio {
            tracks.push(TrackKind::Audio);
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        info!("capture: synthetic stream acquired tracks={}", tracks.len());
        Ok(Box::new(SyntheticStream {
            tracks,
            live: AtomicBool::new(true),
        }))
    }
}

struct SyntheticStream {
    tracks: Vec<TrackKind>,
    live: AtomicBool,
}

impl CaptureStream for SyntheticStream {
    fn tracks(&self) -> Vec<TrackKind> {
        self.tracks.clone()
    }

    fn stop_all_tracks(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("capture: synthetic stream stopped tracks={}", self.tracks.len());
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

pub struct AlwaysPresent;

impl PresenceSampler for AlwaysPresent {
    fn sample(&self) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Placeholder detector: reports presence with a fixed probability.
pub struct SimulatedPresence {
    probability: f64,
}

impl SimulatedPresence {
    pub const DEFAULT_PROBABILITY: f64 = 0.95;

    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_finite() {
            probability.clamp(0.0, 1.0)
        } else {
            Self::DEFAULT_PROBABILITY
        };
        Self { probability }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Default for SimulatedPresence {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROBABILITY)
    }
}

impl PresenceSampler for SimulatedPresence {
    fn sample(&self) -> anyhow::Result<bool> {
        Ok(rand::rng().random_bool(self.probability))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
