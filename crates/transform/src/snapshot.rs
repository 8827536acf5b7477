//! Lock-free publication of the last state the worker applied.
//!
//! The worker is the only writer. Readers on any thread copy the fields out
//! between two reads of a sequence counter and retry if a publication was in
//! progress, so a [`StateSnapshot::load`] never observes a torn mix of two
//! publications. A loaded state may still lag behind messages that are queued
//! but not yet applied.

use std::hint;
use std::sync::atomic::{fence, AtomicI32, AtomicU64, AtomicU8, Ordering};

use crate::types::{
    Extent, ImageOrientation, PipelineState, ResampleFilter, Surface, VideoGravity,
};

pub struct StateSnapshot {
    /// Odd while a publication is in progress.
    sequence: AtomicU64,
    surface: AtomicU64,
    orientation: AtomicU8,
    rotation: AtomicI32,
    video_gravity: AtomicU8,
    extent: AtomicU64,
    resample_filter: AtomicU8,
}

impl StateSnapshot {
    pub fn new(initial: PipelineState) -> Self {
        Self {
            sequence: AtomicU64::new(0),
            surface: AtomicU64::new(initial.surface.map_or(0, Surface::raw)),
            orientation: AtomicU8::new(initial.orientation.code()),
            rotation: AtomicI32::new(initial.rotation),
            video_gravity: AtomicU8::new(initial.video_gravity.code()),
            extent: AtomicU64::new(initial.extent.pack()),
            resample_filter: AtomicU8::new(initial.resample_filter.code()),
        }
    }

    /// Publishes `state`. Must only be called from a single writer thread.
    pub(crate) fn publish(&self, state: &PipelineState) {
        let start = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(start.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.surface
            .store(state.surface.map_or(0, Surface::raw), Ordering::Relaxed);
        self.orientation
            .store(state.orientation.code(), Ordering::Relaxed);
        self.rotation.store(state.rotation, Ordering::Relaxed);
        self.video_gravity
            .store(state.video_gravity.code(), Ordering::Relaxed);
        self.extent.store(state.extent.pack(), Ordering::Relaxed);
        self.resample_filter
            .store(state.resample_filter.code(), Ordering::Relaxed);

        self.sequence
            .store(start.wrapping_add(2), Ordering::Release);
    }

    pub fn load(&self) -> PipelineState {
        loop {
            let before = self.sequence.load(Ordering::Acquire);
            if before & 1 == 1 {
                hint::spin_loop();
                continue;
            }

            let surface = self.surface.load(Ordering::Relaxed);
            let orientation = self.orientation.load(Ordering::Relaxed);
            let rotation = self.rotation.load(Ordering::Relaxed);
            let video_gravity = self.video_gravity.load(Ordering::Relaxed);
            let extent = self.extent.load(Ordering::Relaxed);
            let resample_filter = self.resample_filter.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) != before {
                hint::spin_loop();
                continue;
            }

            // Codes only ever come from `publish`, so the fallbacks are unreachable.
            return PipelineState {
                surface: Surface::from_raw(surface),
                orientation: ImageOrientation::from_code(orientation).unwrap_or_default(),
                rotation,
                video_gravity: VideoGravity::from_code(video_gravity).unwrap_or_default(),
                extent: Extent::unpack(extent),
                resample_filter: ResampleFilter::from_code(resample_filter).unwrap_or_default(),
            };
        }
    }

    /// Number of completed publications.
    pub fn version(&self) -> u64 {
        self.sequence.load(Ordering::Acquire) / 2
    }
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self::new(PipelineState::default())
    }
}
