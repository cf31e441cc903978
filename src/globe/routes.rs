//! Arcs grouped by origin region

use super::arc::RouteArc;
use super::projection::Point3;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// Index of an arc inside one [`RouteGraph`]. Only meaningful together with
/// the generation of the graph that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ArcId(pub usize);

/// All arcs leaving one origin region
#[derive(Clone, Debug)]
pub struct OriginGroup {
    pub origin: String,
    pub arcs: Vec<ArcId>,
}

#[derive(Clone, Debug, Default)]
pub struct RouteGraph {
    arcs: Vec<RouteArc>,
    groups: Vec<OriginGroup>,
    group_index: HashMap<String, usize>,
}

impl RouteGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an arc to the group of its origin; groups keep first-seen order.
    pub fn insert(&mut self, arc: RouteArc) -> ArcId {
        let id = ArcId(self.arcs.len());
        let slot = match self.group_index.get(&arc.edge.origin).copied() {
            Some(slot) => slot,
            None => {
                self.groups.push(OriginGroup {
                    origin: arc.edge.origin.clone(),
                    arcs: Vec::new(),
                });
                self.group_index.insert(arc.edge.origin.clone(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        self.groups[slot].arcs.push(id);
        self.arcs.push(arc);
        id
    }

    /// Pick an origin uniformly, then an arc of that origin uniformly.
    ///
    /// The two-level draw weights by origin, not by arc count: a hub region
    /// with dozens of outgoing routes gets the same share of particles as a
    /// region with one.
    pub fn random_arc<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ArcId> {
        let group = self.groups.choose(rng)?;
        group.arcs.choose(rng).copied()
    }

    pub fn arc(&self, id: ArcId) -> Option<&RouteArc> {
        self.arcs.get(id.0)
    }

    pub fn path(&self, id: ArcId) -> Option<&[Point3]> {
        self.arc(id).map(RouteArc::path)
    }

    pub fn arcs(&self) -> &[RouteArc] {
        &self.arcs
    }

    pub fn groups(&self) -> &[OriginGroup] {
        &self.groups
    }

    pub fn group(&self, origin: &str) -> Option<&OriginGroup> {
        self.group_index.get(origin).map(|&i| &self.groups[i])
    }

    pub fn origin_count(&self) -> usize {
        self.groups.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }
}
