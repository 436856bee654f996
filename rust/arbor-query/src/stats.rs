//! Evaluation step counters.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of the work an evaluation has done so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    /// Segments for which a query cursor was opened.
    pub segments: usize,
    /// Distinct documents the top-level cursor examined, rejected ones included.
    pub candidate_documents: usize,
    /// Root nodes examined by twig cursors, nested twigs included.
    pub root_candidates: usize,
    /// Twig child cursors created. Children are only opened once their twig's
    /// root produced a candidate.
    pub child_evaluations: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    segments: AtomicUsize,
    candidate_documents: AtomicUsize,
    root_candidates: AtomicUsize,
    child_evaluations: AtomicUsize,
}

impl StatsCounters {
    pub fn record_segment(&self) {
        self.segments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidate_document(&self) {
        self.candidate_documents.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_root_candidate(&self) {
        self.root_candidates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_child_evaluations(&self, count: usize) {
        self.child_evaluations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> EvaluationStats {
        EvaluationStats {
            segments: self.segments.load(Ordering::Relaxed),
            candidate_documents: self.candidate_documents.load(Ordering::Relaxed),
            root_candidates: self.root_candidates.load(Ordering::Relaxed),
            child_evaluations: self.child_evaluations.load(Ordering::Relaxed),
        }
    }
}
