//! Globe engine: projection, arcs, routes, particles and the scene that owns
//! them
//!
//! Nothing in here touches the terminal; `render` reads a [`SceneComposer`]
//! and draws it.

pub mod arc;
pub mod particles;
pub mod projection;
pub mod routes;
pub mod scene;

pub use projection::Point3;
pub use scene::{Dataset, RegionRecord, RouteRecord, SceneComposer};
