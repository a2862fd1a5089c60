//! Brick: a named node holding one or more water containers and zero or more
//! processes (§3 Brick, §4.5-§4.7).

use crate::arena::Id;
use crate::container::ContainerId;
use crate::graph::Graph;
use crate::process::ProcessId;

pub type BrickId = Id<Brick>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandCoverType {
    Ground,
    Glacier,
    Urban,
    Vegetation,
}

/// Brick variants (§4.5-§4.7). A sum type replaces the source's brick class
/// hierarchy (§9).
#[derive(Debug, Clone)]
pub enum BrickKind {
    /// Generic reservoir: one water container, no area fraction.
    Storage,
    /// Primary water container plus a mutable area fraction; may parent
    /// surface-component children (snowpack, glacier).
    LandCover { land_cover_type: LandCoverType, area_fraction: f64, children: Vec<BrickId> },
    /// Water + snow containers.
    Snowpack { snow_container: ContainerId },
    /// Water + ice containers, with the optional "no melt under snow" rule (§4.6).
    Glacier { ice_container: ContainerId, no_melt_when_snow_cover: bool, paired_snowpack: Option<BrickId> },
    /// Degenerate surface component with just a water container (urban, vegetation).
    GenericSurface,
}

#[derive(Debug, Clone)]
pub struct Brick {
    pub label: String,
    /// The primary (water) container.
    pub container: ContainerId,
    pub kind: BrickKind,
    pub processes: Vec<ProcessId>,
    /// Once true, every subsequent brick in the same HRU also becomes
    /// solver-handled (§4.9). Set by the processor at partition time.
    pub needs_solver: bool,
}

impl Brick {
    pub fn new(label: impl Into<String>, container: ContainerId, kind: BrickKind) -> Self {
        Self { label: label.into(), container, kind, processes: Vec::new(), needs_solver: false }
    }

    pub fn with_processes(mut self, processes: Vec<ProcessId>) -> Self {
        self.processes = processes;
        self
    }

    pub fn land_cover_fraction(&self) -> Option<f64> {
        match &self.kind {
            BrickKind::LandCover { area_fraction, .. } => Some(*area_fraction),
            _ => None,
        }
    }

    pub fn set_land_cover_fraction(&mut self, fraction: f64) -> Result<(), crate::error::EngineError> {
        match &mut self.kind {
            BrickKind::LandCover { area_fraction, .. } => {
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(crate::error::EngineError::InvalidArgument(format!(
                        "land cover fraction {fraction} is outside [0, 1]"
                    )));
                }
                *area_fraction = fraction;
                Ok(())
            }
            _ => Err(crate::error::EngineError::ConceptionIssue(format!(
                "brick '{}' is not a land cover",
                self.label
            ))),
        }
    }
}

/// `has_snow()` (§4.5): true iff the paired snow container's content exceeds
/// epsilon.
pub fn has_snow(graph: &Graph, brick_id: BrickId) -> bool {
    const EPSILON: f64 = 1e-9;
    match &graph.bricks.get(brick_id).kind {
        BrickKind::Snowpack { snow_container } => graph.containers.get(*snow_container).content() > EPSILON,
        _ => false,
    }
}
