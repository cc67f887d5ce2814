//! Proximity index - which free agents are close enough to interact
//!
//! Crowds here are tiny (a handful of agents), so a full pairwise scan is
//! both the simplest and the fastest option.

use crate::components::{AgentId, Vec2};
use crate::registry::AgentRecord;

/// Two free agents within the interaction radius of each other
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximatePair {
    /// Earlier-spawned agent of the pair
    pub first: AgentId,
    pub second: AgentId,
    pub distance: f32,
}

/// All pairs of non-engaged agents closer than `radius`.
///
/// Pairs come out in spawn order (`first` before `second`, lexicographic over
/// the input order), which keeps seeded runs reproducible.
pub fn find_proximate_pairs(records: &[AgentRecord], radius: f32) -> Vec<ProximatePair> {
    let free: Vec<(AgentId, Vec2)> = records
        .iter()
        .filter(|r| !r.behavior.state.is_engaged())
        .map(|r| (r.id, r.position))
        .collect();

    let radius_sq = radius * radius;
    let mut pairs = Vec::new();
    for i in 0..free.len() {
        for j in (i + 1)..free.len() {
            let (a, pos_a) = free[i];
            let (b, pos_b) = free[j];
            let dist_sq = pos_a.distance_squared(&pos_b);
            if dist_sq <= radius_sq {
                pairs.push(ProximatePair {
                    first: a,
                    second: b,
                    distance: dist_sq.sqrt(),
                });
            }
        }
    }
    pairs
}
