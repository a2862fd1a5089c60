//! Splitter: a stateless fan-out node (§4.4).

use crate::arena::Id;
use crate::flux::{self, FluxId};
use crate::forcing::ForcingValues;
use crate::graph::Graph;

pub type SplitterId = Id<Splitter>;

#[derive(Debug, Clone)]
pub enum SplitterKind {
    /// Rain fraction = `clamp((T - T0)/(T1 - T0), 0, 1)`.
    SnowRain { transition_start: f64, transition_end: f64 },
    /// Broadcasts its one real input unchanged to every output (weighting is
    /// encoded per output flux).
    MultiFluxes,
    /// Degenerate single-input/single-output passthrough, used where no
    /// snow/rain separation is wired.
    RainPassthrough,
}

#[derive(Debug, Clone)]
pub struct Splitter {
    pub label: String,
    pub kind: SplitterKind,
    /// Outputs by role: for `SnowRain`, `[rain, snow]`; for `MultiFluxes` and
    /// `RainPassthrough`, one or more fluxes all fed the same amount.
    pub outputs: Vec<FluxId>,
}

impl Splitter {
    pub fn new(label: impl Into<String>, kind: SplitterKind, outputs: Vec<FluxId>) -> Self {
        Self { label: label.into(), kind, outputs }
    }
}

/// `compute()` (§4.4): writes every output flux's amount from the rule, once per
/// step, before the solver runs.
pub fn compute(graph: &mut Graph, splitter_id: SplitterId, forcing: &ForcingValues) {
    let splitter = graph.splitters.get(splitter_id).clone();
    match splitter.kind {
        SplitterKind::SnowRain { transition_start, transition_end } => {
            let span = transition_end - transition_start;
            let rain_fraction = if span.abs() <= 1e-12 {
                if forcing.temperature >= transition_end { 1.0 } else { 0.0 }
            } else {
                ((forcing.temperature - transition_start) / span).clamp(0.0, 1.0)
            };
            if let [rain, snow] = splitter.outputs[..] {
                flux::update(graph, rain, forcing.precipitation * rain_fraction);
                flux::update(graph, snow, forcing.precipitation * (1.0 - rain_fraction));
            }
        }
        SplitterKind::MultiFluxes | SplitterKind::RainPassthrough => {
            for &output in &splitter.outputs {
                flux::update(graph, output, forcing.precipitation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flux::{Flux, FluxKind, FluxTarget, FluxType};

    fn forcing(precip: f64, temp: f64) -> ForcingValues {
        ForcingValues { precipitation: precip, temperature: temp, pet: 0.0, radiation: None }
    }

    #[test]
    fn snow_rain_split_respects_transition_band() {
        let mut graph = Graph::new();
        let rain = graph.fluxes.push(Flux::new("rain", FluxKind::Simple, FluxType::Water, FluxTarget::None));
        let snow = graph.fluxes.push(Flux::new("snow", FluxKind::Simple, FluxType::Snow, FluxTarget::None));
        let splitter = graph.splitters.push(Splitter::new(
            "snow_rain",
            SplitterKind::SnowRain { transition_start: 0.0, transition_end: 2.0 },
            vec![rain, snow],
        ));

        compute(&mut graph, splitter, &forcing(10.0, 1.0));
        assert_eq!(graph.fluxes.get(rain).amount(), 5.0);
        assert_eq!(graph.fluxes.get(snow).amount(), 5.0);

        compute(&mut graph, splitter, &forcing(10.0, -5.0));
        assert_eq!(graph.fluxes.get(rain).amount(), 0.0);
        assert_eq!(graph.fluxes.get(snow).amount(), 10.0);
    }
}
