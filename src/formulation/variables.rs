//! The variable registry.
//!
//! Every decision variable of a model is declared here, once per build, with its domain and
//! coordinates. Variables for optional technologies and features only exist when the
//! [`Topology`] enables them, and the registry's shape mirrors the topology (e.g. the battery's
//! conversion losses are an enum over the two inverter arrangements), so builders can only reach
//! variables which exist.
//!
//! Family names are stable: post-processing looks variables up by these exact strings.
use super::BuildError;
use crate::id::{GeneratorID, RenewableID};
use crate::problem::{Domain, LinExpr, Problem, VarArray};
use crate::sets::{IndexSets, Scenario, Step, StepTimeKey, TimeKey};
use crate::topology::{BatteryCoupling, GridTopology, Topology};
use itertools::iproduct;

/// Stable names of the variable families
#[allow(missing_docs)]
pub mod names {
    pub const RES_UNITS: &str = "Unit of Nominal Capacity for Renewables";
    pub const RES_INVERTER_UNITS: &str = "Units of Inverters for Renewables";
    pub const RES_PRODUCTION: &str = "Energy Production by Renewables";
    pub const RES_CURTAILMENT: &str = "Curtailment by Renewables";
    pub const RES_LOSSES: &str = "Transformation Losses - Renewable Sources";
    pub const RES_EMISSION: &str = "CO2 Emissions for Unit of Renewables Installed Capacity";
    pub const RES_LAND_USE: &str = "Land Use for Unit of Renewables Installed Capacity";

    pub const BATTERY_UNITS: &str = "Unit of Nominal Capacity for Batteries";
    pub const BATTERY_INVERTER_UNITS: &str = "Units of Inverters for Battery";
    pub const BATTERY_OUTFLOW: &str = "Battery Outflow";
    pub const BATTERY_INFLOW: &str = "Battery Inflow";
    pub const BATTERY_SOC: &str = "Battery State of Charge";
    pub const BATTERY_MAX_CHARGE_POWER: &str = "Battery Maximum Charge Power";
    pub const BATTERY_MAX_DISCHARGE_POWER: &str = "Battery Maximum Discharge Power";
    pub const BATTERY_SINGLE_FLOW: &str = "Binary for BESS Single Flow";
    pub const BATTERY_LOSSES: &str = "Transformation Losses - Battery";
    pub const BATTERY_EMISSION: &str = "Battery Emissions";
    pub const DC_SINGLE_FLOW: &str = "Binary for DC System Single Flow";
    pub const DC_ONES: &str = "Ones";
    pub const DC_FEED_IN_LOSSES: &str = "Feed In Losses - DC System";
    pub const DC_CHARGE_LOSSES: &str = "Charge Losses - DC System";
    pub const DC_ENERGY: &str = "DC System Energy";

    pub const GENERATOR_UNITS: &str = "Unit of Nominal Capacity for Generators";
    pub const GENERATOR_RECTIFIER_UNITS: &str = "Units of Rectifiers for Generators";
    pub const GENERATOR_PRODUCTION: &str = "Generator Energy Production";
    pub const GENERATOR_LOSSES: &str = "Transformation Losses - Generator";
    pub const GENERATOR_IN_PARTIAL_LOAD: &str = "Generator in Partial Load";
    pub const GENERATOR_FULL_LOAD_UNITS: &str = "Generators in Full Load";
    pub const GENERATOR_PARTIAL_LOAD_PRODUCTION: &str =
        "Generator Energy Production in Partial Load";
    pub const GENERATOR_EMISSION: &str = "Generator Emissions";
    pub const FUEL_EMISSION: &str = "Fuel Emissions";

    pub const GRID_IMPORT: &str = "Energy from Grid";
    pub const GRID_EXPORT: &str = "Energy to Grid";
    pub const GRID_LOSSES: &str = "Transformation Losses - Grid";
    pub const GRID_TRANSFORMER_UNITS: &str = "Units of Transformers for Grid";
    pub const GRID_SINGLE_FLOW: &str = "Binary for Grid Single Flow";
    pub const GRID_EMISSION: &str = "Electricity from Grid Emission";

    pub const LOST_LOAD: &str = "Lost Load";
    pub const TOTAL_EMISSIONS: &str = "Total CO2 Emissions";
    pub const SCENARIO_EMISSIONS: &str = "Scenario Total CO2 Emissions";
}

/// Variables indexed by step and renewable source
pub type RenewableStepVars = VarArray<(Step, RenewableID)>;
/// Variables indexed by step and generator type
pub type GeneratorStepVars = VarArray<(Step, GeneratorID)>;

/// Variables for renewable sources
#[derive(Debug)]
pub struct RenewableVariables {
    /// Units of nominal capacity
    pub units: RenewableStepVars,
    /// Units of inverters (own-inverter sources only)
    pub inverter_units: RenewableStepVars,
    /// Gross energy production
    pub production: VarArray<(StepTimeKey, RenewableID)>,
    /// Curtailed energy
    pub curtailment: VarArray<(TimeKey, RenewableID)>,
    /// Inverter losses (own-inverter sources only)
    pub losses: VarArray<(TimeKey, RenewableID)>,
    /// Embodied emissions of capacity installed in each step
    pub emission: Option<RenewableStepVars>,
    /// Land used
    pub land_use: Option<RenewableStepVars>,
}

impl RenewableVariables {
    /// Production net of curtailment for a source in a time slot
    pub fn net_production(
        &self,
        sets: &IndexSets,
        key: TimeKey,
        id: &RenewableID,
    ) -> Result<LinExpr, BuildError> {
        let step_key = StepTimeKey {
            scenario: key.scenario,
            step: sets.step_for_year(key.year),
            period: key.period,
        };
        let production = self.production.get(&(step_key, id.clone()))?;
        let curtailment = self.curtailment.get(&(key, id.clone()))?;

        Ok(production - curtailment)
    }
}

/// Variables for the shared DC bus of a DC-coupled battery
#[derive(Debug)]
pub struct DcSystemVariables {
    /// One if the DC system feeds energy to the AC bus, zero if it draws from it
    pub single_flow: VarArray<TimeKey>,
    /// A binary fixed to one, used to express the complement of `single_flow`
    pub ones: VarArray<TimeKey>,
    /// Inverter losses when feeding in
    pub feed_in_losses: VarArray<TimeKey>,
    /// Inverter losses when charging from the AC bus
    pub charge_losses: VarArray<TimeKey>,
    /// Net energy passing through the shared inverter (signed)
    pub energy: VarArray<TimeKey>,
}

/// Conversion-loss variables of the battery, by inverter arrangement
#[derive(Debug)]
pub enum BatteryConversion {
    /// The battery has its own inverter
    IndependentInverter {
        /// Inverter losses
        losses: VarArray<TimeKey>,
    },
    /// Renewable sources share the battery's inverter
    SharedInverter(DcSystemVariables),
}

/// Variables for the battery bank
#[derive(Debug)]
pub struct BatteryVariables {
    /// Units of nominal capacity
    pub units: VarArray<Step>,
    /// Units of inverters
    pub inverter_units: VarArray<Step>,
    /// Energy discharged
    pub outflow: VarArray<TimeKey>,
    /// Energy charged
    pub inflow: VarArray<TimeKey>,
    /// Stored energy at the end of each period
    pub state_of_charge: VarArray<TimeKey>,
    /// Maximum energy charged per period
    pub max_charge_power: VarArray<Step>,
    /// Maximum energy discharged per period
    pub max_discharge_power: VarArray<Step>,
    /// One if discharging, zero if charging
    pub single_flow: Option<VarArray<TimeKey>>,
    /// Conversion losses
    pub conversion: BatteryConversion,
    /// Embodied emissions of capacity installed in each step
    pub emission: Option<VarArray<Step>>,
}

/// Variables for generators running below full load
#[derive(Debug)]
pub struct PartialLoadVariables {
    /// One if a unit runs in partial load
    pub in_partial_load: VarArray<(TimeKey, GeneratorID)>,
    /// Units running at full load
    pub full_load_units: GeneratorStepVars,
    /// Energy produced by the unit in partial load
    pub production: VarArray<(TimeKey, GeneratorID)>,
}

/// Variables for generators
#[derive(Debug)]
pub struct GeneratorVariables {
    /// Units of nominal capacity
    pub units: GeneratorStepVars,
    /// Units of rectifiers
    pub rectifier_units: GeneratorStepVars,
    /// Energy produced
    pub production: VarArray<(TimeKey, GeneratorID)>,
    /// Rectifier losses
    pub losses: VarArray<(TimeKey, GeneratorID)>,
    /// Partial load operation
    pub partial_load: Option<PartialLoadVariables>,
    /// Embodied emissions of capacity installed in each step
    pub emission: Option<GeneratorStepVars>,
    /// Emissions from burning fuel
    pub fuel_emission: Option<VarArray<(TimeKey, GeneratorID)>>,
}

/// Variables for selling energy to the grid
#[derive(Debug)]
pub struct GridExportVariables {
    /// Energy sold
    pub to_grid: VarArray<TimeKey>,
    /// One if buying, zero if selling
    pub single_flow: Option<VarArray<TimeKey>>,
}

/// Variables for the grid connection
#[derive(Debug)]
pub struct GridVariables {
    /// Energy bought
    pub from_grid: VarArray<TimeKey>,
    /// Energy sold, in purchase/sell mode
    pub export: Option<GridExportVariables>,
    /// Transformer losses
    pub losses: VarArray<TimeKey>,
    /// Units of transformers
    pub transformer_units: VarArray<Step>,
    /// Emissions of bought electricity
    pub emission: Option<VarArray<TimeKey>>,
}

/// Project-wide emission totals
#[derive(Debug)]
pub struct EmissionVariables {
    /// Emissions of each scenario
    pub by_scenario: VarArray<Scenario>,
    /// Scenario-weighted total
    pub total: VarArray<()>,
}

/// Handles to every variable of a model
#[derive(Debug)]
pub struct VariableRegistry {
    /// Renewable sources
    pub renewables: RenewableVariables,
    /// Battery bank, if present
    pub battery: Option<BatteryVariables>,
    /// Generators, if present
    pub generators: Option<GeneratorVariables>,
    /// Grid connection, if present
    pub grid: Option<GridVariables>,
    /// Unmet demand, if allowed
    pub lost_load: Option<VarArray<TimeKey>>,
    /// Emission totals, if tracked
    pub emissions: Option<EmissionVariables>,
}

/// Declare a family only if `enabled`
fn declare_if<K: crate::sets::Key>(
    enabled: bool,
    problem: &mut Problem,
    name: &'static str,
    domain: Domain,
    keys: impl IntoIterator<Item = K>,
) -> Result<Option<VarArray<K>>, BuildError> {
    enabled
        .then(|| problem.add_variables(name, domain, keys))
        .transpose()
}

impl VariableRegistry {
    /// Declare every variable required by the topology.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to add variables to
    /// * `sets` - The index space
    /// * `topology` - The resolved configuration
    pub fn declare(
        problem: &mut Problem,
        sets: &IndexSets,
        topology: &Topology,
    ) -> Result<Self, BuildError> {
        let renewables = declare_renewables(problem, sets, topology)?;
        let battery = topology
            .battery
            .as_ref()
            .map(|battery| declare_battery(problem, sets, topology, &battery.coupling))
            .transpose()?;
        let generators = topology
            .generator
            .as_ref()
            .map(|generator| declare_generators(problem, sets, topology, generator.partial_load))
            .transpose()?;
        let grid = topology
            .grid
            .as_ref()
            .map(|grid| declare_grid(problem, sets, topology, grid))
            .transpose()?;
        let lost_load = declare_if(
            topology.lost_load.is_some(),
            problem,
            names::LOST_LOAD,
            Domain::NonNegative,
            sets.iter_time_keys(),
        )?;
        let emissions = topology
            .emissions
            .map(|_| -> Result<_, BuildError> {
                Ok(EmissionVariables {
                    total: problem.add_variables(
                        names::TOTAL_EMISSIONS,
                        Domain::NonNegative,
                        [()],
                    )?,
                    by_scenario: problem.add_variables(
                        names::SCENARIO_EMISSIONS,
                        Domain::NonNegative,
                        sets.scenarios.iter().copied(),
                    )?,
                })
            })
            .transpose()?;

        Ok(Self {
            renewables,
            battery,
            generators,
            grid,
            lost_load,
            emissions,
        })
    }

    /// The battery variables, which must exist if the topology has a battery
    pub fn battery(&self) -> Result<&BatteryVariables, BuildError> {
        self.battery
            .as_ref()
            .ok_or_else(|| BuildError::TopologyMismatch("battery variables not declared".into()))
    }

    /// The generator variables, which must exist if the topology has generators
    pub fn generators(&self) -> Result<&GeneratorVariables, BuildError> {
        self.generators
            .as_ref()
            .ok_or_else(|| BuildError::TopologyMismatch("generator variables not declared".into()))
    }

    /// The grid variables, which must exist if the topology has a grid connection
    pub fn grid(&self) -> Result<&GridVariables, BuildError> {
        self.grid
            .as_ref()
            .ok_or_else(|| BuildError::TopologyMismatch("grid variables not declared".into()))
    }

    /// The lost load variables, which must exist if lost load is allowed
    pub fn lost_load(&self) -> Result<&VarArray<TimeKey>, BuildError> {
        self.lost_load
            .as_ref()
            .ok_or_else(|| BuildError::TopologyMismatch("lost load variables not declared".into()))
    }

    /// The emission totals, which must exist if emissions are tracked
    pub fn emissions(&self) -> Result<&EmissionVariables, BuildError> {
        self.emissions
            .as_ref()
            .ok_or_else(|| BuildError::TopologyMismatch("emission variables not declared".into()))
    }
}

fn declare_renewables(
    problem: &mut Problem,
    sets: &IndexSets,
    topology: &Topology,
) -> Result<RenewableVariables, BuildError> {
    let sizing = topology.sizing.domain();
    let all_steps = || iproduct!(sets.steps.iter().copied(), sets.renewables.iter().cloned());
    let own_inverter = topology.own_inverter_sources.iter().cloned().collect::<Vec<_>>();

    Ok(RenewableVariables {
        units: problem.add_variables(names::RES_UNITS, sizing, all_steps())?,
        inverter_units: problem.add_variables(
            names::RES_INVERTER_UNITS,
            sizing,
            iproduct!(sets.steps.iter().copied(), own_inverter.iter().cloned()),
        )?,
        production: problem.add_variables(
            names::RES_PRODUCTION,
            Domain::NonNegative,
            iproduct!(sets.iter_step_time_keys(), sets.renewables.iter().cloned()),
        )?,
        curtailment: problem.add_variables(
            names::RES_CURTAILMENT,
            Domain::NonNegative,
            iproduct!(sets.iter_time_keys(), sets.renewables.iter().cloned()),
        )?,
        losses: problem.add_variables(
            names::RES_LOSSES,
            Domain::NonNegative,
            iproduct!(sets.iter_time_keys(), own_inverter.iter().cloned()),
        )?,
        emission: declare_if(
            topology.emissions.is_some(),
            problem,
            names::RES_EMISSION,
            Domain::NonNegative,
            all_steps(),
        )?,
        land_use: declare_if(
            topology.land_availability.is_some(),
            problem,
            names::RES_LAND_USE,
            Domain::NonNegative,
            all_steps(),
        )?,
    })
}

fn declare_battery(
    problem: &mut Problem,
    sets: &IndexSets,
    topology: &Topology,
    coupling: &BatteryCoupling,
) -> Result<BatteryVariables, BuildError> {
    let sizing = topology.sizing.domain();
    let steps = || sets.steps.iter().copied();
    let single_flow_binary = topology
        .battery
        .as_ref()
        .is_some_and(|battery| battery.single_flow_binary);

    let units = problem.add_variables(names::BATTERY_UNITS, sizing, steps())?;
    let inverter_units = problem.add_variables(names::BATTERY_INVERTER_UNITS, sizing, steps())?;
    let outflow = problem.add_variables(
        names::BATTERY_OUTFLOW,
        Domain::NonNegative,
        sets.iter_time_keys(),
    )?;
    let inflow = problem.add_variables(
        names::BATTERY_INFLOW,
        Domain::NonNegative,
        sets.iter_time_keys(),
    )?;
    let single_flow = declare_if(
        single_flow_binary,
        problem,
        names::BATTERY_SINGLE_FLOW,
        Domain::Binary,
        sets.iter_time_keys(),
    )?;

    let conversion = match coupling {
        BatteryCoupling::IndependentInverter => BatteryConversion::IndependentInverter {
            losses: problem.add_variables(
                names::BATTERY_LOSSES,
                Domain::NonNegative,
                sets.iter_time_keys(),
            )?,
        },
        BatteryCoupling::SharedInverter { .. } => {
            BatteryConversion::SharedInverter(DcSystemVariables {
                single_flow: problem.add_variables(
                    names::DC_SINGLE_FLOW,
                    Domain::Binary,
                    sets.iter_time_keys(),
                )?,
                ones: problem.add_variables(names::DC_ONES, Domain::Binary, sets.iter_time_keys())?,
                feed_in_losses: problem.add_variables(
                    names::DC_FEED_IN_LOSSES,
                    Domain::NonNegative,
                    sets.iter_time_keys(),
                )?,
                charge_losses: problem.add_variables(
                    names::DC_CHARGE_LOSSES,
                    Domain::NonNegative,
                    sets.iter_time_keys(),
                )?,
                energy: problem.add_variables(
                    names::DC_ENERGY,
                    Domain::Free,
                    sets.iter_time_keys(),
                )?,
            })
        }
    };

    Ok(BatteryVariables {
        units,
        inverter_units,
        outflow,
        inflow,
        state_of_charge: problem.add_variables(
            names::BATTERY_SOC,
            Domain::NonNegative,
            sets.iter_time_keys(),
        )?,
        max_charge_power: problem.add_variables(
            names::BATTERY_MAX_CHARGE_POWER,
            Domain::NonNegative,
            steps(),
        )?,
        max_discharge_power: problem.add_variables(
            names::BATTERY_MAX_DISCHARGE_POWER,
            Domain::NonNegative,
            steps(),
        )?,
        single_flow,
        conversion,
        emission: declare_if(
            topology.emissions.is_some(),
            problem,
            names::BATTERY_EMISSION,
            Domain::NonNegative,
            steps(),
        )?,
    })
}

fn declare_generators(
    problem: &mut Problem,
    sets: &IndexSets,
    topology: &Topology,
    partial_load: bool,
) -> Result<GeneratorVariables, BuildError> {
    let sizing = topology.sizing.domain();
    let step_keys = || iproduct!(sets.steps.iter().copied(), sets.generators.iter().cloned());
    let time_keys = || iproduct!(sets.iter_time_keys(), sets.generators.iter().cloned());

    let units = problem.add_variables(names::GENERATOR_UNITS, sizing, step_keys())?;
    let rectifier_units =
        problem.add_variables(names::GENERATOR_RECTIFIER_UNITS, sizing, step_keys())?;
    let production = problem.add_variables(
        names::GENERATOR_PRODUCTION,
        Domain::NonNegative,
        time_keys(),
    )?;
    let losses =
        problem.add_variables(names::GENERATOR_LOSSES, Domain::NonNegative, time_keys())?;
    let partial_load = if partial_load {
        Some(PartialLoadVariables {
            in_partial_load: problem.add_variables(
                names::GENERATOR_IN_PARTIAL_LOAD,
                Domain::Binary,
                time_keys(),
            )?,
            full_load_units: problem.add_variables(
                names::GENERATOR_FULL_LOAD_UNITS,
                Domain::NonNegativeInteger,
                step_keys(),
            )?,
            production: problem.add_variables(
                names::GENERATOR_PARTIAL_LOAD_PRODUCTION,
                Domain::NonNegative,
                time_keys(),
            )?,
        })
    } else {
        None
    };
    let tracked = topology.emissions.is_some();

    Ok(GeneratorVariables {
        units,
        rectifier_units,
        production,
        losses,
        partial_load,
        emission: declare_if(
            tracked,
            problem,
            names::GENERATOR_EMISSION,
            Domain::NonNegative,
            step_keys(),
        )?,
        fuel_emission: declare_if(
            tracked,
            problem,
            names::FUEL_EMISSION,
            Domain::NonNegative,
            time_keys(),
        )?,
    })
}

fn declare_grid(
    problem: &mut Problem,
    sets: &IndexSets,
    topology: &Topology,
    grid: &GridTopology,
) -> Result<GridVariables, BuildError> {
    let from_grid =
        problem.add_variables(names::GRID_IMPORT, Domain::NonNegative, sets.iter_time_keys())?;
    let export = match grid {
        GridTopology::PurchaseOnly => None,
        GridTopology::PurchaseSell { single_flow_binary } => Some(GridExportVariables {
            to_grid: problem.add_variables(
                names::GRID_EXPORT,
                Domain::NonNegative,
                sets.iter_time_keys(),
            )?,
            single_flow: declare_if(
                *single_flow_binary,
                problem,
                names::GRID_SINGLE_FLOW,
                Domain::Binary,
                sets.iter_time_keys(),
            )?,
        }),
    };

    Ok(GridVariables {
        from_grid,
        export,
        losses: problem.add_variables(
            names::GRID_LOSSES,
            Domain::NonNegative,
            sets.iter_time_keys(),
        )?,
        transformer_units: problem.add_variables(
            names::GRID_TRANSFORMER_UNITS,
            topology.sizing.domain(),
            sets.steps.iter().copied(),
        )?,
        emission: declare_if(
            topology.emissions.is_some(),
            problem,
            names::GRID_EMISSION,
            Domain::NonNegative,
            sets.iter_time_keys(),
        )?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::project;
    use crate::project::{GeneratorConfig, Project, ResConnection};
    use rstest::rstest;

    fn declare(project: &Project) -> (Problem, VariableRegistry) {
        let topology = Topology::resolve(&project.config);
        let mut problem = Problem::default();
        let vars = VariableRegistry::declare(&mut problem, &project.sets, &topology).unwrap();
        (problem, vars)
    }

    #[rstest]
    fn independent_battery_has_no_dc_variables(project: Project) {
        let (problem, vars) = declare(&project);
        assert!(matches!(
            vars.battery.unwrap().conversion,
            BatteryConversion::IndependentInverter { .. }
        ));
        assert!(problem.family(names::BATTERY_LOSSES).is_some());
        assert!(problem.family(names::DC_ENERGY).is_none());
        assert!(problem.family(names::BATTERY_SINGLE_FLOW).is_none());
        assert!(problem.family(names::LOST_LOAD).is_none());
    }

    #[rstest]
    fn dc_coupled_source_has_no_own_inverter(mut project: Project) {
        project.config.renewables[0].connection = ResConnection::SharedBatteryInverter;
        let (problem, vars) = declare(&project);

        assert!(problem.family(names::BATTERY_LOSSES).is_none());
        assert_eq!(
            problem.family(names::DC_ENERGY).unwrap().domain,
            Domain::Free
        );
        assert_eq!(
            problem.family(names::DC_SINGLE_FLOW).unwrap().domain,
            Domain::Binary
        );
        assert!(vars.renewables.inverter_units.is_empty());
        assert!(vars.renewables.losses.is_empty());
        assert_eq!(
            vars.renewables.units.len(),
            project.sets.steps.len() * project.sets.renewables.len()
        );
    }

    #[rstest]
    fn unit_commitment_uses_integer_sizing(mut project: Project) {
        project.config.advanced.unit_commitment = true;
        project.config.technologies.generator = true;
        project.config.generators = vec![GeneratorConfig { id: "Diesel".into() }];
        project.sets.generators = [GeneratorID::from("Diesel")].into();
        project.config.advanced.partial_load = true;
        let (problem, vars) = declare(&project);

        for name in [
            names::RES_UNITS,
            names::RES_INVERTER_UNITS,
            names::BATTERY_UNITS,
            names::GENERATOR_UNITS,
            names::GENERATOR_FULL_LOAD_UNITS,
        ] {
            assert_eq!(
                problem.family(name).unwrap().domain,
                Domain::NonNegativeInteger
            );
        }
        assert_eq!(
            problem.family(names::GENERATOR_IN_PARTIAL_LOAD).unwrap().domain,
            Domain::Binary
        );
        assert!(vars.generators.unwrap().partial_load.is_some());
    }

    #[rstest]
    fn lost_load_only_when_enabled(mut project: Project) {
        project.config.project.lost_load_fraction = 0.05;
        let (_, vars) = declare(&project);
        assert_eq!(
            vars.lost_load().unwrap().len(),
            project.sets.iter_time_keys().count()
        );
    }

    #[rstest]
    fn missing_optional_technology_is_a_mismatch(project: Project) {
        let (_, vars) = declare(&project);
        assert!(matches!(vars.grid(), Err(BuildError::TopologyMismatch(_))));
    }
}
