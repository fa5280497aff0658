//! Fixtures for tests

use crate::formulation::{BuildContext, VariableRegistry};
use crate::id::{GeneratorID, RenewableID};
use crate::parameter::{Param, ParameterTable};
use crate::problem::Problem;
use crate::project::{
    AdvancedOptions, GeneratorConfig, GridConnectionType, Project, ProjectConfig, ProjectInfo,
    RenewableConfig, ResConnection, Technologies,
};
use crate::sets::{Coord, Dim, IndexSets};
use crate::topology::Topology;
use indexmap::IndexSet;
use itertools::iproduct;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

/// Demand in each period of every year
const DEMAND: [f64; 3] = [10.0, 20.0, 15.0];

/// Availability of one unit of PV in each period
pub const PV_AVAILABILITY: [f64; 3] = [0.0, 0.6, 0.8];

/// Existing capacity of every conversion device in a brownfield project
pub const EXISTING_DEVICE_CAPACITY: f64 = 50.0;

/// Lifetime of every conversion device in a brownfield project
pub const DEVICE_LIFETIME: f64 = 10.0;

#[fixture]
pub fn project_config() -> ProjectConfig {
    ProjectConfig {
        project: ProjectInfo {
            name: "Test".into(),
            scenarios: 1,
            start_year: 2025,
            years: 1,
            step_duration: 1,
            periods: DEMAND.len() as u32,
            lost_load_fraction: 0.0,
            lost_load_specific_cost: 0.0,
            renewable_penetration: 0.0,
            land_availability: 0.0,
        },
        technologies: Technologies {
            battery: true,
            generator: false,
            grid_connection: false,
        },
        advanced: AdvancedOptions::default(),
        renewables: vec![RenewableConfig {
            id: "PV".into(),
            connection: ResConnection::OwnInverter,
        }],
        generators: Vec::new(),
    }
}

#[fixture]
pub fn index_sets() -> IndexSets {
    IndexSets::new(
        1,
        2025,
        1,
        1,
        DEMAND.len() as u32,
        [RenewableID::from("PV")].into(),
        IndexSet::new(),
    )
    .unwrap()
}

/// Insert a value for every (scenario, year, period) of the horizon
fn insert_time_series(params: &mut ParameterTable, sets: &IndexSets, param: Param, values: &[f64]) {
    for key in sets.iter_time_keys() {
        params
            .insert(
                param,
                Coord::default()
                    .with_scenario(key.scenario)
                    .with_year(key.year)
                    .with_period(key.period),
                values[key.period as usize],
            )
            .unwrap();
    }
}

/// Parameters for the PV source and the battery, without any optional technology
fn base_parameters(sets: &IndexSets) -> ParameterTable {
    let mut params = ParameterTable::default();
    insert_time_series(&mut params, sets, Param::Demand, &DEMAND);
    for &scenario in &sets.scenarios {
        params
            .insert(
                Param::ScenarioWeight,
                Coord::default().with_scenario(scenario),
                1.0 / sets.scenarios.len() as f64,
            )
            .unwrap();
    }

    let scalar = |params: &mut ParameterTable, param, value| {
        params.insert(param, Coord::default(), value).unwrap();
    };
    scalar(&mut params, Param::DiscountRate, 0.1);

    for id in &sets.renewables {
        let pv = Coord::default().with_renewable(id);
        for (param, value) in [
            (Param::ResNominalCapacity, 1.0),
            (Param::ResSpecificInvestmentCost, 1000.0),
            (Param::ResSpecificOmCost, 0.01),
            (Param::ResLifetime, 20.0),
            (Param::ResInverterEfficiency, 0.95),
            (Param::ResInverterNominalCapacity, 1.0),
            (Param::ResInverterCost, 100.0),
        ] {
            params.insert(param, pv.clone(), value).unwrap();
        }
        for (scenario, (period, &value)) in iproduct!(
            sets.scenarios.iter().copied(),
            PV_AVAILABILITY.iter().enumerate()
        ) {
            params
                .insert(
                    Param::ResUnitEnergyAvailability,
                    pv.clone()
                        .with_scenario(scenario)
                        .with_period(period as u32),
                    value,
                )
                .unwrap();
        }
    }

    for (param, value) in [
        (Param::BatteryNominalCapacity, 1.0),
        (Param::BatterySpecificInvestmentCost, 300.0),
        (Param::BatterySpecificElectronicInvestmentCost, 0.2),
        (Param::BatterySpecificOmCost, 0.02),
        (Param::BatteryCycles, 3000.0),
        (Param::BatteryExpectedLifetime, 10.0),
        (Param::BatteryChargeEfficiency, 0.95),
        (Param::BatteryDischargeEfficiency, 0.95),
        (Param::BatteryDepthOfDischarge, 0.2),
        (Param::BatteryMaximumChargeTime, 5.0),
        (Param::BatteryMaximumDischargeTime, 4.0),
        (Param::BatteryInverterEfficiencyDcAc, 0.95),
        (Param::BatteryInverterEfficiencyAcDc, 0.95),
        (Param::BatteryInverterNominalCapacity, 1.0),
        (Param::BatteryInverterCost, 150.0),
        (Param::BatteryInverterMaxUnits, 100.0),
        (Param::BatteryMaxUnits, 1000.0),
    ] {
        scalar(&mut params, param, value);
    }

    params
}

/// A one-year project with a PV source on its own inverter and a battery bank
#[fixture]
pub fn project(project_config: ProjectConfig, index_sets: IndexSets) -> Project {
    let parameters = base_parameters(&index_sets);
    Project {
        config: project_config,
        sets: index_sets,
        parameters,
    }
}

/// Connect the project to the grid
pub fn add_grid(project: &mut Project, connection_type: GridConnectionType) {
    project.config.technologies.grid_connection = true;
    project.config.advanced.grid_connection_type = connection_type;

    let params = &mut project.parameters;
    for (param, value) in [
        (Param::GridToMicrogridEfficiency, 0.98),
        (Param::MicrogridToGridEfficiency, 0.97),
        (Param::GridTransformerNominalCapacity, 1.0),
        (Param::GridTransformerCost, 50.0),
        (Param::GridMaximumPower, 50.0),
        (Param::GridPurchasePrice, 0.2),
        (Param::GridSellPrice, 0.05),
    ] {
        params.insert(param, Coord::default(), value).unwrap();
    }
    insert_time_series(
        params,
        &project.sets,
        Param::GridAvailability,
        &[1.0; DEMAND.len()],
    );
}

/// Add a generator type to the project
pub fn add_generator(project: &mut Project, id: &str) {
    let id = GeneratorID::from(id);
    project.config.technologies.generator = true;
    project.config.generators.push(GeneratorConfig { id: id.clone() });
    project.sets.generators.insert(id.clone());

    let coord = Coord::default().with_generator(&id);
    for (param, value) in [
        (Param::GeneratorNominalCapacity, 10.0),
        (Param::GeneratorSpecificInvestmentCost, 500.0),
        (Param::GeneratorSpecificOmCost, 0.03),
        (Param::GeneratorLifetime, 10.0),
        (Param::GeneratorFuelCost, 0.3),
        (Param::GeneratorMinimumLoad, 0.3),
        (Param::GeneratorRectifierEfficiency, 0.95),
        (Param::GeneratorRectifierNominalCapacity, 1.0),
        (Param::GeneratorRectifierCost, 40.0),
    ] {
        project
            .parameters
            .insert(param, coord.clone(), value)
            .unwrap();
    }
}

/// Make the project brownfield.
///
/// Every technology the project has gets `technology_capacity` of existing capacity and every
/// conversion device gets [`EXISTING_DEVICE_CAPACITY`], all installed `existing_years` ago.
/// Devices live for [`DEVICE_LIFETIME`] years; technologies keep their own lifetimes.
pub fn add_brownfield(project: &mut Project, technology_capacity: f64, existing_years: f64) {
    project.config.advanced.brownfield = true;

    let params = &mut project.parameters;
    let mut add = |capacity, years, lifetime: Option<Param>, coord: Coord, value| {
        params.insert(capacity, coord.clone(), value).unwrap();
        params
            .insert(years, coord.clone(), existing_years)
            .unwrap();
        if let Some(lifetime) = lifetime {
            params.insert(lifetime, coord, DEVICE_LIFETIME).unwrap();
        }
    };

    for id in &project.sets.renewables {
        let coord = Coord::default().with_renewable(id);
        add(
            Param::ResExistingCapacity,
            Param::ResExistingYears,
            None,
            coord.clone(),
            technology_capacity,
        );
        add(
            Param::ResInverterExistingCapacity,
            Param::ResInverterExistingYears,
            Some(Param::ResInverterLifetime),
            coord,
            EXISTING_DEVICE_CAPACITY,
        );
    }
    if project.config.technologies.battery {
        add(
            Param::BatteryExistingCapacity,
            Param::BatteryExistingYears,
            None,
            Coord::default(),
            technology_capacity,
        );
        add(
            Param::BatteryInverterExistingCapacity,
            Param::BatteryInverterExistingYears,
            Some(Param::BatteryInverterLifetime),
            Coord::default(),
            EXISTING_DEVICE_CAPACITY,
        );
    }
    for id in &project.sets.generators {
        let coord = Coord::default().with_generator(id);
        add(
            Param::GeneratorExistingCapacity,
            Param::GeneratorExistingYears,
            None,
            coord.clone(),
            technology_capacity,
        );
        add(
            Param::GeneratorRectifierExistingCapacity,
            Param::GeneratorRectifierExistingYears,
            Some(Param::GeneratorRectifierLifetime),
            coord,
            EXISTING_DEVICE_CAPACITY,
        );
    }
    if project.config.technologies.grid_connection {
        add(
            Param::GridTransformerExistingCapacity,
            Param::GridTransformerExistingYears,
            Some(Param::GridTransformerLifetime),
            Coord::default(),
            EXISTING_DEVICE_CAPACITY,
        );
    }
}

/// Run `f` with a build context for the project, with every variable declared
pub fn with_context<T>(project: &Project, f: impl FnOnce(&BuildContext) -> T) -> T {
    let topology = Topology::resolve(&project.config);
    let mut problem = Problem::default();
    let vars = VariableRegistry::declare(&mut problem, &project.sets, &topology).unwrap();
    f(&BuildContext {
        sets: &project.sets,
        params: &project.parameters,
        topology: &topology,
        vars: &vars,
    })
}

/// Add CO2 emission factors for every technology the project has
pub fn add_emission_factors(project: &mut Project) {
    let params = &mut project.parameters;
    for id in &project.sets.renewables {
        params
            .insert(
                Param::ResUnitCo2Emission,
                Coord::default().with_renewable(id),
                40.0,
            )
            .unwrap();
    }
    if project.config.technologies.battery {
        params
            .insert(Param::BatteryUnitCo2Emission, Coord::default(), 60.0)
            .unwrap();
    }
    for id in &project.sets.generators {
        let coord = Coord::default().with_generator(id);
        params
            .insert(Param::GeneratorUnitCo2Emission, coord.clone(), 20.0)
            .unwrap();
        params
            .insert(Param::GeneratorFuelCo2Emission, coord, 0.8)
            .unwrap();
    }
    if project.config.technologies.grid_connection {
        params
            .insert(Param::GridCo2Emission, Coord::default(), 0.5)
            .unwrap();
    }
}

/// Lengthen the horizon, keeping every parameter which doesn't depend on the year
pub fn extend_horizon(project: &mut Project, years: u32, step_duration: u32) {
    let info = &mut project.config.project;
    info.years = years;
    info.step_duration = step_duration;
    let sets = IndexSets::new(
        info.scenarios,
        info.start_year,
        years,
        step_duration,
        info.periods,
        project.sets.renewables.clone(),
        project.sets.generators.clone(),
    )
    .unwrap();

    let mut params = ParameterTable::default();
    let mut time_series = Vec::new();
    for (param, coord, value) in project.parameters.iter() {
        if param.dims().contains(&Dim::Year) {
            if !time_series.contains(&param) {
                time_series.push(param);
            }
        } else {
            params.insert(param, coord.clone(), value).unwrap();
        }
    }
    for param in time_series {
        let values = match param {
            Param::Demand => DEMAND,
            _ => [1.0; DEMAND.len()],
        };
        insert_time_series(&mut params, &sets, param, &values);
    }

    project.sets = sets;
    project.parameters = params;
}

/// A copy of `params` with the value at `coord` replaced
pub fn replace_parameter(
    params: &ParameterTable,
    param: Param,
    coord: &Coord,
    value: f64,
) -> ParameterTable {
    let mut replaced = ParameterTable::default();
    for (p, c, v) in params.iter() {
        let v = if p == param && c == coord { value } else { v };
        replaced.insert(p, c.clone(), v).unwrap();
    }

    replaced
}
