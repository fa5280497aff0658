//! Resolve the physical configuration of a microgrid from its project options.
//!
//! The [`Topology`] is computed once per model build and handed to the variable registry and to
//! every constraint builder, so they can never disagree about which branch is active.
use crate::id::RenewableID;
use crate::problem::Domain;
use crate::project::{BigMPolicy, GridConnectionType, ProjectConfig, ResConnection};

/// How technology sizes are represented
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sizing {
    /// Sizes are continuous multiples of the nominal capacity
    Continuous,
    /// Sizes are whole numbers of units
    Integer,
}

impl Sizing {
    /// The domain of sizing variables
    pub fn domain(self) -> Domain {
        match self {
            Sizing::Continuous => Domain::NonNegative,
            Sizing::Integer => Domain::NonNegativeInteger,
        }
    }
}

/// How the battery bank exchanges energy with the AC bus
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatteryCoupling {
    /// The battery has its own inverter and no renewable sources share it
    IndependentInverter,
    /// One or more renewable sources are DC-coupled to the battery and share its inverter
    SharedInverter {
        /// The DC-coupled sources
        dc_sources: Vec<RenewableID>,
    },
}

/// The battery bank's configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatteryTopology {
    /// How the bank reaches the AC bus
    pub coupling: BatteryCoupling,
    /// Whether a binary forbids charging and discharging in the same period
    pub single_flow_binary: bool,
}

/// The generators' configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorTopology {
    /// Whether generators can run below full load
    pub partial_load: bool,
}

/// The grid connection's configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GridTopology {
    /// Energy can only be bought from the grid
    PurchaseOnly,
    /// Energy can be bought and sold
    PurchaseSell {
        /// Whether a binary forbids buying and selling in the same period
        single_flow_binary: bool,
    },
}

/// Lost load settings, present only if some demand may go unmet
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LostLoad {
    /// Maximum fraction of demand that may go unmet
    pub fraction: f64,
    /// Penalty per unit of unmet demand
    pub specific_cost: f64,
}

/// The configuration decisions shared by every part of a model build
#[derive(Clone, Debug, PartialEq)]
pub struct Topology {
    /// Sizing representation
    pub sizing: Sizing,
    /// Whether existing devices contribute capacity until their lifetime runs out
    pub brownfield: bool,
    /// Renewable sources with their own inverter, in declaration order
    pub own_inverter_sources: Vec<RenewableID>,
    /// Battery configuration, if there is a battery
    pub battery: Option<BatteryTopology>,
    /// Generator configuration, if there are generators
    pub generator: Option<GeneratorTopology>,
    /// Grid configuration, if the microgrid is grid-connected
    pub grid: Option<GridTopology>,
    /// Lost load settings, if lost load is allowed
    pub lost_load: Option<LostLoad>,
    /// Minimum renewable penetration, if required
    pub min_renewable_penetration: Option<f64>,
    /// Land available for renewables, if limited
    pub land_availability: Option<f64>,
    /// Emission cost weight, if emissions are tracked
    pub emissions: Option<f64>,
    /// How big-M constants are chosen
    pub big_m: BigMPolicy,
}

impl Topology {
    /// Resolve the topology for a validated project configuration
    pub fn resolve(config: &ProjectConfig) -> Self {
        let advanced = &config.advanced;
        let project = &config.project;

        let (own_inverter_sources, dc_sources): (Vec<_>, Vec<_>) = config
            .renewables
            .iter()
            .partition(|r| r.connection == ResConnection::OwnInverter);
        let own_inverter_sources = own_inverter_sources.into_iter().map(|r| r.id.clone()).collect();
        let dc_sources: Vec<_> = dc_sources.into_iter().map(|r| r.id.clone()).collect();

        let battery = config.technologies.battery.then(|| BatteryTopology {
            coupling: if dc_sources.is_empty() {
                BatteryCoupling::IndependentInverter
            } else {
                BatteryCoupling::SharedInverter { dc_sources }
            },
            single_flow_binary: advanced.milp_formulation,
        });

        let grid = config
            .technologies
            .grid_connection
            .then(|| match advanced.grid_connection_type {
                GridConnectionType::PurchaseOnly => GridTopology::PurchaseOnly,
                GridConnectionType::PurchaseSell => GridTopology::PurchaseSell {
                    single_flow_binary: advanced.milp_formulation,
                },
            });

        Self {
            sizing: if advanced.unit_commitment {
                Sizing::Integer
            } else {
                Sizing::Continuous
            },
            brownfield: advanced.brownfield,
            own_inverter_sources,
            battery,
            generator: config.technologies.generator.then(|| GeneratorTopology {
                partial_load: advanced.partial_load,
            }),
            grid,
            lost_load: (project.lost_load_fraction > 0.0).then(|| LostLoad {
                fraction: project.lost_load_fraction,
                specific_cost: project.lost_load_specific_cost,
            }),
            min_renewable_penetration: (project.renewable_penetration > 0.0)
                .then_some(project.renewable_penetration),
            land_availability: (project.land_availability > 0.0)
                .then_some(project.land_availability),
            emissions: advanced
                .multiobjective_optimization
                .then_some(advanced.emission_cost_weight),
            big_m: advanced.big_m,
        }
    }

    /// The DC-coupled renewable sources, which is empty unless the battery shares its inverter
    pub fn dc_sources(&self) -> &[RenewableID] {
        match &self.battery {
            Some(BatteryTopology {
                coupling: BatteryCoupling::SharedInverter { dc_sources },
                ..
            }) => dc_sources,
            _ => &[],
        }
    }

    /// Whether the source has its own inverter
    pub fn has_own_inverter(&self, id: &RenewableID) -> bool {
        self.own_inverter_sources.contains(id)
    }
}
