//! Deferred effect queue drained once per rendered frame.

use std::collections::VecDeque;

use portbridge_core::DomError;

use crate::autosize::Autosize;
use crate::document::Document;
use crate::effects::DomEffect;

/// Outcome of one frame.
#[derive(Debug, Default, PartialEq)]
pub struct FrameReport {
    pub applied: usize,
    pub failed: Vec<(&'static str, DomError)>,
}

impl FrameReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct FrameQueue {
    pending: VecDeque<DomEffect>,
    frames: u64,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, effect: DomEffect) {
        tracing::trace!(effect = effect.name(), "effect scheduled");
        self.pending.push_back(effect);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Frames taken so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Detach this frame's batch. Anything scheduled afterwards belongs to
    /// the next frame.
    pub fn take_frame(&mut self) -> Vec<DomEffect> {
        self.frames += 1;
        self.pending.drain(..).collect()
    }

    pub fn run_frame(&mut self, doc: &mut dyn Document, autosize: &mut Autosize) -> FrameReport {
        let batch = self.take_frame();
        run_effects(batch, doc, autosize)
    }
}

/// Apply `effects` in order. A failing effect is logged and skipped.
pub fn run_effects(
    effects: Vec<DomEffect>,
    doc: &mut dyn Document,
    autosize: &mut Autosize,
) -> FrameReport {
    let mut report = FrameReport::default();
    for effect in effects {
        match effect.apply(doc, autosize) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(
                    effect = effect.name(),
                    error_kind = e.error_kind(),
                    error = %e,
                    "dom effect failed"
                );
                report.failed.push((effect.name(), e));
            }
        }
    }
    report
}
