//! Sub-basin: HRUs + lumped bricks + outlet flux collector (§3 Sub-basin).

use crate::brick::BrickId;
use crate::flux::FluxId;
use crate::graph::Graph;
use crate::hru::Hru;

#[derive(Debug, Clone)]
pub struct SubBasin {
    pub hrus: Vec<Hru>,
    /// Sub-basin-level lumped reservoirs (routing stores, etc.).
    pub bricks: Vec<BrickId>,
    pub outlet_fluxes: Vec<FluxId>,
    pub total_area: f64,
    outlet_total: f64,
}

impl SubBasin {
    pub fn new(hrus: Vec<Hru>) -> Self {
        let total_area = hrus.iter().map(|h| h.area).sum();
        Self { hrus, bricks: Vec::new(), outlet_fluxes: Vec::new(), total_area, outlet_total: 0.0 }
    }

    pub fn hru(&self, id: i32) -> Option<&Hru> {
        self.hrus.iter().find(|h| h.id == id)
    }

    pub fn hru_mut(&mut self, id: i32) -> Option<&mut Hru> {
        self.hrus.iter_mut().find(|h| h.id == id)
    }

    pub fn outlet_total(&self) -> f64 {
        self.outlet_total
    }

    /// `ComputeOutletDischarge` (§4.9 step 3, §8.6 "outlet identity"): sums every
    /// outlet-bound flux's delivered amount for this step.
    pub fn compute_outlet_discharge(&mut self, graph: &Graph) {
        self.outlet_total = self.outlet_fluxes.iter().map(|&id| graph.fluxes.get(id).amount()).sum();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::{Flux, FluxKind, FluxTarget, FluxType};
    use crate::hru::Hru;

    #[test]
    fn total_area_sums_hrus() {
        let basin = SubBasin::new(vec![Hru::new(1, 100.0), Hru::new(2, 50.0)]);
        assert_eq!(basin.total_area, 150.0);
    }

    #[test]
    fn outlet_identity_matches_sum_of_outlet_fluxes() {
        let mut graph = Graph::new();
        let f1 = graph.fluxes.push(Flux::new("o1", FluxKind::ToOutlet, FluxType::Water, FluxTarget::Outlet));
        let f2 = graph.fluxes.push(Flux::new("o2", FluxKind::ToOutlet, FluxType::Water, FluxTarget::Outlet));
        crate::flux::update(&mut graph, f1, 3.0);
        crate::flux::update(&mut graph, f2, 4.0);

        let mut basin = SubBasin::new(vec![Hru::new(1, 100.0)]);
        basin.outlet_fluxes = vec![f1, f2];
        basin.compute_outlet_discharge(&graph);
        assert_eq!(basin.outlet_total(), 7.0);
    }
}
