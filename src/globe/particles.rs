//! Fixed-size pool of dots that travel along route arcs
//!
//! Each particle is either idle or bound to one arc of a specific scene
//! generation. Idle particles activate through a per-tick Bernoulli trial, so
//! the wait before a particle picks up a route is geometrically distributed
//! and a fresh rebuild does not launch every dot on the same frame.

use super::projection::Point3;
use super::routes::{ArcId, RouteGraph};
use super::scene::Generation;
use rand::Rng;

/// A particle's claim on an arc: only valid while `generation` is current
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub generation: Generation,
    pub arc: ArcId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ParticleState {
    #[default]
    Idle,
    Bound { binding: Binding, index: usize },
}

#[derive(Clone, Debug, Default)]
pub struct Particle {
    state: ParticleState,
    visible: bool,
    position: Point3,
}

impl Particle {
    pub fn state(&self) -> ParticleState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn position(&self) -> Point3 {
        self.position
    }

    pub fn is_idle(&self) -> bool {
        self.state == ParticleState::Idle
    }

    fn release(&mut self) {
        self.state = ParticleState::Idle;
        self.visible = false;
    }
}

/// What happened during one [`ParticlePool::tick`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub bound: usize,
    pub completed: usize,
    pub stale: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ParticlePool {
    particles: Vec<Particle>,
}

impl ParticlePool {
    pub fn new(size: usize) -> Self {
        Self {
            particles: vec![Particle::default(); size],
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn active_count(&self) -> usize {
        self.particles.iter().filter(|p| !p.is_idle()).count()
    }

    /// Grow with idle particles or drop from the tail
    pub fn resize(&mut self, size: usize) {
        self.particles.resize_with(size, Particle::default);
    }

    /// Advance every particle by one step against the current generation.
    ///
    /// A particle whose binding was issued by an older generation goes idle
    /// here without its arc ever being looked up.
    pub fn tick<R: Rng + ?Sized>(
        &mut self,
        generation: Generation,
        graph: &RouteGraph,
        activation_probability: f64,
        rng: &mut R,
    ) -> TickStats {
        let mut stats = TickStats::default();
        let probability = activation_probability.clamp(0.0, 1.0);

        for particle in &mut self.particles {
            match particle.state {
                ParticleState::Bound { binding, .. } if binding.generation != generation => {
                    particle.release();
                    stats.stale += 1;
                }
                ParticleState::Idle => {
                    if !rng.gen_bool(probability) {
                        continue;
                    }
                    if let Some(arc) = graph.random_arc(rng) {
                        particle.state = ParticleState::Bound {
                            binding: Binding { generation, arc },
                            index: 0,
                        };
                        stats.bound += 1;
                    }
                }
                ParticleState::Bound { binding, index } => {
                    let Some(path) = graph.path(binding.arc) else {
                        particle.release();
                        stats.stale += 1;
                        continue;
                    };

                    if index + 1 < path.len() {
                        particle.visible = true;
                        particle.position = path[index];
                        particle.state = ParticleState::Bound {
                            binding,
                            index: index + 1,
                        };
                    } else {
                        particle.release();
                        stats.completed += 1;
                    }
                }
            }
        }

        if stats.stale > 0 {
            tracing::trace!(stale = stats.stale, %generation, "released particles from retired generation");
        }
        if stats.bound > 0 || stats.completed > 0 {
            tracing::trace!(bound = stats.bound, completed = stats.completed, "particle tick");
        }
        stats
    }
}
