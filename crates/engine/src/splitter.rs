//! Chooses cut points in a rendered story so every chunk lasts between
//! `min_seconds` and `max_seconds` of real output time, cutting only at dialogue
//! boundaries.
//!
//! Boundaries are nested-timeline (or source) times; the rendered file already
//! reflects the outer speed, so each boundary is divided by [`OuterSpeed`] and by
//! nothing else.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::speed::OuterSpeed;
use crate::story::Story;
use crate::timecode::TimeValue;
use crate::timeline::SynthesizedTimeline;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitBounds {
    pub min_seconds: f64,
    pub max_seconds: f64,
}

impl SplitBounds {
    pub fn new(min_seconds: f64, max_seconds: f64) -> EngineResult<Self> {
        if !(min_seconds > 0.0) || !(min_seconds <= max_seconds) || !max_seconds.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "split bounds must satisfy 0 < min <= max, got [{min_seconds}, {max_seconds}]"
            )));
        }
        Ok(SplitBounds {
            min_seconds,
            max_seconds,
        })
    }

    pub fn contains(&self, duration: f64) -> bool {
        self.min_seconds <= duration && duration <= self.max_seconds
    }
}

/// Where a dialogue ends, before the outer speed is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogueBoundary {
    pub index: u32,
    pub end: TimeValue,
}

/// Ends of each dialogue's last source span, in story order. Dialogues without
/// spans have no boundary.
pub fn source_span_boundaries(story: &Story) -> Vec<DialogueBoundary> {
    story
        .dialogues
        .iter()
        .filter_map(|d| d.last_span_end().map(|end| DialogueBoundary { index: d.index, end }))
        .collect()
}

/// Ends of each placed dialogue on the nested timeline, in story order.
pub fn placed_boundaries(story: &Story, timeline: &SynthesizedTimeline) -> Vec<DialogueBoundary> {
    story
        .dialogues
        .iter()
        .filter_map(|d| {
            timeline.placement(d.index).map(|p| DialogueBoundary {
                index: d.index,
                end: p.end(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPoint {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub dialogue_indices: Vec<u32>,
}

impl SplitPoint {
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitPlan {
    pub points: Vec<SplitPoint>,
    /// Dialogues that alone exceed the maximum chunk length.
    pub unsplittable: Vec<u32>,
    /// Dialogues left in a head or tail remainder outside the bounds.
    pub discarded: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    Short,
    Fits,
    Overshoot,
}

#[derive(Debug, Default)]
struct Candidate {
    start: f64,
    members: Vec<(u32, f64)>,
}

impl Candidate {
    fn duration(&self) -> f64 {
        self.members
            .last()
            .map(|&(_, end)| end - self.start)
            .unwrap_or(0.0)
    }

    fn indices(&self) -> Vec<u32> {
        self.members.iter().map(|&(i, _)| i).collect()
    }

    fn take_point(&mut self) -> SplitPoint {
        let end = self.members.last().map(|&(_, end)| end).unwrap_or(self.start);
        let point = SplitPoint {
            start_seconds: self.start,
            end_seconds: end,
            dialogue_indices: self.indices(),
        };
        self.start = end;
        self.members.clear();
        point
    }
}

pub struct BoundedSplitter {
    bounds: SplitBounds,
}

impl BoundedSplitter {
    pub fn new(bounds: SplitBounds) -> Self {
        BoundedSplitter { bounds }
    }

    fn classify(&self, duration: f64) -> Window {
        if duration < self.bounds.min_seconds {
            Window::Short
        } else if duration <= self.bounds.max_seconds {
            Window::Fits
        } else {
            Window::Overshoot
        }
    }

    pub fn split(&self, boundaries: &[DialogueBoundary], outer_speed: OuterSpeed) -> SplitPlan {
        let mut plan = SplitPlan::default();
        let mut candidate = Candidate::default();

        for boundary in boundaries {
            let end = outer_speed.rendered_seconds(boundary.end);
            candidate.members.push((boundary.index, end));
            self.settle(&mut candidate, &mut plan);
        }

        if !candidate.members.is_empty() {
            let duration = candidate.duration();
            if self.bounds.contains(duration) {
                let point = candidate.take_point();
                info!(start = point.start_seconds, end = point.end_seconds, dialogues = ?point.dialogue_indices, "final chunk");
                plan.points.push(point);
            } else {
                warn!(duration, dialogues = ?candidate.indices(), "discarding trailing remainder outside bounds");
                plan.discarded.extend(candidate.indices());
            }
        }

        plan
    }

    /// Resolve the candidate after a dialogue was added. After an overshoot the
    /// overshooting dialogue seeds the next candidate and is judged together
    /// with the dialogues that follow it.
    fn settle(&self, candidate: &mut Candidate, plan: &mut SplitPlan) {
        let duration = candidate.duration();
        match self.classify(duration) {
            Window::Short => {}
            Window::Fits => {
                let point = candidate.take_point();
                info!(start = point.start_seconds, end = point.end_seconds, duration, dialogues = ?point.dialogue_indices, "chunk");
                plan.points.push(point);
            }
            Window::Overshoot if candidate.members.len() == 1 => {
                self.drop_unsplittable(candidate, plan);
            }
            Window::Overshoot => {
                let Some(overshooting) = candidate.members.pop() else {
                    return;
                };
                let head_duration = candidate.duration();
                if self.bounds.contains(head_duration) {
                    let point = candidate.take_point();
                    info!(start = point.start_seconds, end = point.end_seconds, duration = head_duration, dialogues = ?point.dialogue_indices, "chunk");
                    plan.points.push(point);
                } else {
                    warn!(duration = head_duration, dialogues = ?candidate.indices(), "discarding head remainder outside bounds");
                    plan.discarded.extend(candidate.indices());
                    let anchor = candidate
                        .members
                        .last()
                        .map(|&(_, end)| end)
                        .unwrap_or(candidate.start);
                    candidate.members.clear();
                    candidate.start = anchor;
                }
                candidate.members.push(overshooting);
                if self.classify(candidate.duration()) == Window::Overshoot {
                    self.drop_unsplittable(candidate, plan);
                }
            }
        }
    }

    /// A lone dialogue longer than the maximum has no legal cut; accumulation
    /// restarts at its end.
    fn drop_unsplittable(&self, candidate: &mut Candidate, plan: &mut SplitPlan) {
        let duration = candidate.duration();
        let Some(&(index, end)) = candidate.members.last() else {
            return;
        };
        let err = EngineError::UnsplittableSegment {
            index,
            duration_seconds: duration,
            max_seconds: self.bounds.max_seconds,
        };
        warn!(error = %err, "dropping dialogue");
        plan.unsplittable.push(index);
        candidate.members.clear();
        candidate.start = end;
    }
}
