//! Flux: a directed edge carrying an amount (mm) and a rate (mm/day) (§4.2).

use crate::arena::Id;
use crate::container::ContainerId;
use crate::graph::Graph;

pub type FluxId = Id<Flux>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxType {
    Water,
    Snow,
    Ice,
}

/// What a flux delivers into. `None` is used by splitter-intermediate ("simple")
/// fluxes that only carry an amount between splitter stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxTarget {
    Container(ContainerId),
    Outlet,
    Atmosphere,
    None,
}

/// Flux variants by target (§4.2). `Forcing` fluxes read their amount straight from
/// the current step's forcing value rather than from an `update()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxKind {
    ToContainer,
    ToContainerInstantaneous,
    ToOutlet,
    ToAtmosphere,
    Simple,
    Forcing,
}

#[derive(Debug, Clone)]
pub struct Flux {
    pub label: String,
    pub kind: FluxKind,
    pub flux_type: FluxType,
    pub source: Option<ContainerId>,
    pub target: FluxTarget,
    pub is_static: bool,
    pub is_instantaneous: bool,
    pub needs_weighting: bool,
    /// Cached weighting fraction: `fraction_land_cover * fraction_unit_area`, times
    /// `HRU_area / basin_area` for HRU→sub-basin fluxes (§4.2).
    pub fraction: f64,
    rate: f64,
    amount: f64,
}

impl Flux {
    pub fn new(label: impl Into<String>, kind: FluxKind, flux_type: FluxType, target: FluxTarget) -> Self {
        let is_instantaneous = matches!(kind, FluxKind::ToContainerInstantaneous);
        let is_static = matches!(kind, FluxKind::Forcing) || is_instantaneous;
        Self {
            label: label.into(),
            kind,
            flux_type,
            source: None,
            target,
            is_static,
            is_instantaneous,
            needs_weighting: false,
            fraction: 1.0,
            rate: 0.0,
            amount: 0.0,
        }
    }

    pub fn with_source(mut self, source: ContainerId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_weighting(mut self, fraction: f64) -> Self {
        self.needs_weighting = true;
        self.fraction = fraction;
        self
    }

    /// Marks a flux whose amount is known before the solver runs (splitter
    /// outputs, forcing-derived deliveries) even though its `FluxKind` isn't
    /// `Forcing`/`ToContainerInstantaneous` — `apply_constraints` folds it into
    /// `inputs_static` rather than treating it as a rate (§4.1 step 2).
    pub fn mark_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    /// `get_amount()` (§4.2): the delivered amount for this step, zero for
    /// instantaneous fluxes once `update()` has routed it directly into the target.
    pub fn amount(&self) -> f64 {
        self.amount
    }
}

/// `update(amount)` (§4.2): multiplies by the cached fraction and stores, with the
/// instantaneous variant routing straight into the target container's static
/// accumulator instead (to avoid double counting through the solver).
pub fn update(graph: &mut Graph, flux_id: FluxId, raw_amount: f64) {
    let fraction = graph.fluxes.get(flux_id).fraction;
    let weighted = raw_amount * fraction;

    let (kind, target) = {
        let flux = graph.fluxes.get(flux_id);
        (flux.kind, flux.target)
    };

    match kind {
        FluxKind::ToContainerInstantaneous => {
            if let FluxTarget::Container(container_id) = target {
                graph.containers.get_mut(container_id).add_static(weighted);
            }
            graph.fluxes.get_mut(flux_id).amount = 0.0;
        }
        _ => {
            graph.fluxes.get_mut(flux_id).amount = weighted;
        }
    }
}
