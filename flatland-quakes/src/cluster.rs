//! Spatial-temporal clustering of seismic events
//!
//! Two events are linked when they lie within `radius_km` of each other
//! (great-circle) and within `window` of each other in time. Clusters are
//! the connected components of that relation. Each cluster is represented by
//! its largest event; the rest become that event's `cluster_children`.

use crate::error::{Error, Result};
use crate::model::SeismicEvent;
use chrono::Duration;
use std::cmp::Ordering;
use tracing::debug;

/// Clustering thresholds
///
/// No built-in defaults: both values are deployment parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterSettings {
    radius_km: f64,
    window: Duration,
}

impl ClusterSettings {
    /// Validate and build settings
    ///
    /// `radius_km` must be finite and >= 0, `window` must not be negative.
    pub fn new(radius_km: f64, window: Duration) -> Result<Self> {
        if !radius_km.is_finite() || radius_km < 0.0 {
            return Err(Error::InvalidClusterSettings(format!(
                "radius must be a non-negative distance, got {}",
                radius_km
            )));
        }
        if window < Duration::zero() {
            return Err(Error::InvalidClusterSettings(format!(
                "time window must not be negative, got {}s",
                window.num_seconds()
            )));
        }
        Ok(Self { radius_km, window })
    }

    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn links(&self, a: &SeismicEvent, b: &SeismicEvent) -> bool {
        (a.time - b.time).abs() <= self.window
            && a.location.distance_km(&b.location) <= self.radius_km
    }
}

/// Groups related events into parent + children
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    settings: ClusterSettings,
}

impl ClusterEngine {
    pub fn new(settings: ClusterSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    /// Cluster a batch, returning parents only
    ///
    /// - Parent: greatest magnitude, ties to the most recent time, then to
    ///   the earliest input position.
    /// - Parents keep the relative order of the input element they came from.
    /// - Children are sorted ascending by time (then ID).
    /// - An event linked to nothing passes through unchanged, including any
    ///   children it already carries, so re-clustering output is a no-op.
    ///
    /// The input is not modified.
    pub fn cluster(&self, events: &[SeismicEvent]) -> Vec<SeismicEvent> {
        let n = events.len();
        if n == 0 {
            return Vec::new();
        }

        let mut sets = DisjointSet::new(n);

        // Sweep in time order; only pairs inside the window can link
        let mut by_time: Vec<usize> = (0..n).collect();
        by_time.sort_by(|&a, &b| events[a].time.cmp(&events[b].time).then(a.cmp(&b)));
        for (pos, &i) in by_time.iter().enumerate() {
            for &j in &by_time[pos + 1..] {
                if events[j].time - events[i].time > self.settings.window {
                    break;
                }
                if self.settings.links(&events[i], &events[j]) {
                    sets.union(i, j);
                }
            }
        }

        // Members per root, in input order
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n];
        for i in 0..n {
            groups[sets.find(i)].push(i);
        }

        let mut output: Vec<(usize, SeismicEvent)> = Vec::new();
        for members in groups.into_iter().filter(|g| !g.is_empty()) {
            if members.len() == 1 {
                let i = members[0];
                output.push((i, events[i].clone()));
                continue;
            }
            output.push(build_cluster(events, &members));
        }

        // Position of the member the parent came from
        output.sort_by_key(|(position, _)| *position);

        let merged = n - output.len();
        if merged > 0 {
            debug!(
                input = n,
                parents = output.len(),
                merged,
                "Clustered seismic events"
            );
        }

        output.into_iter().map(|(_, event)| event).collect()
    }
}

/// Flatten a multi-member group and select its parent
///
/// Returns the parent together with the input position of the top-level
/// member that contributed it.
fn build_cluster(events: &[SeismicEvent], members: &[usize]) -> (usize, SeismicEvent) {
    // (input position of top-level member, event with nested children stripped)
    let mut pool: Vec<(usize, SeismicEvent)> = Vec::new();
    for &i in members {
        let member = &events[i];
        let mut flat = member.clone();
        flat.cluster_children.clear();
        pool.push((i, flat));
        for child in &member.cluster_children {
            let mut flat_child = child.clone();
            flat_child.cluster_children.clear();
            pool.push((i, flat_child));
        }
    }

    let parent_idx = pool
        .iter()
        .enumerate()
        .max_by(|(ia, (pa, a)), (ib, (pb, b))| {
            a.magnitude
                .total_cmp(&b.magnitude)
                .then(a.time.cmp(&b.time))
                // Earlier position wins the final tie
                .then(pb.cmp(pa))
                .then(ib.cmp(ia))
        })
        .map(|(idx, _)| idx)
        .unwrap_or(0);

    let (position, mut parent) = pool.swap_remove(parent_idx);
    let mut children: Vec<SeismicEvent> = pool.into_iter().map(|(_, e)| e).collect();
    children.sort_by(compare_time_then_id);
    parent.cluster_children = children;

    (position, parent)
}

fn compare_time_then_id(a: &SeismicEvent, b: &SeismicEvent) -> Ordering {
    a.time.cmp(&b.time).then_with(|| a.id.cmp(&b.id))
}

/// Union-find over input indices
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}
