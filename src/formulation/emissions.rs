//! CO2 emissions, tracked when optimising for cost and emissions together.
//!
//! Installing capacity has embodied emissions, counted in the step the units are added. Burning
//! fuel and buying grid electricity emit in every period.
use super::capacity::new_units;
use super::{BuildContext, BuildError, build_rows};
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch, LinExpr};
use crate::sets::{Coord, Scenario};

/// Build the emission accounting constraints, if emissions are tracked
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    if ctx.topology.emissions.is_none() {
        return Ok(batch);
    }

    add_embodied(ctx, &mut batch)?;
    add_operational(ctx, &mut batch)?;

    let totals = ctx.vars.emissions()?;
    let rows = build_rows(ctx.sets.scenarios.iter().copied(), |scenario| {
        Ok(Constraint::equal(
            totals.by_scenario.get(scenario)?,
            scenario_emissions(ctx, *scenario)?,
        ))
    })?;
    batch.add("Scenario Total CO2 Emissions", rows);

    let weighted = ctx
        .sets
        .scenarios
        .iter()
        .map(|scenario| {
            let weight = ctx
                .params
                .get(Param::ScenarioWeight, &Coord::default().with_scenario(*scenario))?;
            Ok(weight * totals.by_scenario.get(scenario)?)
        })
        .sum::<Result<LinExpr, BuildError>>()?;
    let rows = build_rows([()], |_| {
        Ok(Constraint::equal(totals.total.get(&())?, weighted.clone()))
    })?;
    batch.add("Total CO2 Emissions", rows);

    Ok(batch)
}

/// Emissions of the units installed in each step
fn add_embodied(ctx: &BuildContext, batch: &mut ConstraintBatch) -> Result<(), BuildError> {
    let sets = ctx.sets;
    let vars = ctx.vars;

    if let Some(emission) = &vars.renewables.emission {
        for id in &sets.renewables {
            let coord = Coord::default().with_renewable(id);
            let per_unit = ctx.params.get(Param::ResNominalCapacity, &coord)?
                * ctx.params.get(Param::ResUnitCo2Emission, &coord)?;
            let keys = sets.steps.iter().map(|&step| (step, id.clone()));
            let rows = build_rows(keys, |(step, _)| {
                let added = new_units(sets, &vars.renewables.units, *step, |s| (s, id.clone()))?;
                Ok(Constraint::equal(
                    emission.get(&(*step, id.clone()))?,
                    per_unit * added,
                ))
            })?;
            batch.add(format!("Renewable Emissions - {id}"), rows);
        }
    }

    if let Some(battery) = &vars.battery
        && let Some(emission) = &battery.emission
    {
        let scalar = Coord::default();
        let per_unit = ctx.params.get(Param::BatteryNominalCapacity, &scalar)?
            * ctx.params.get(Param::BatteryUnitCo2Emission, &scalar)?;
        let rows = build_rows(sets.steps.iter().copied(), |step| {
            let added = new_units(sets, &battery.units, *step, |s| s)?;
            Ok(Constraint::equal(emission.get(step)?, per_unit * added))
        })?;
        batch.add("Battery Emissions", rows);
    }

    if let Some(generators) = &vars.generators
        && let Some(emission) = &generators.emission
    {
        for id in &sets.generators {
            let coord = Coord::default().with_generator(id);
            let per_unit = ctx.params.get(Param::GeneratorNominalCapacity, &coord)?
                * ctx.params.get(Param::GeneratorUnitCo2Emission, &coord)?;
            let keys = sets.steps.iter().map(|&step| (step, id.clone()));
            let rows = build_rows(keys, |(step, _)| {
                let added = new_units(sets, &generators.units, *step, |s| (s, id.clone()))?;
                Ok(Constraint::equal(
                    emission.get(&(*step, id.clone()))?,
                    per_unit * added,
                ))
            })?;
            batch.add(format!("Generator Emissions - {id}"), rows);
        }
    }

    Ok(())
}

/// Emissions from fuel and grid electricity in each period
fn add_operational(ctx: &BuildContext, batch: &mut ConstraintBatch) -> Result<(), BuildError> {
    let sets = ctx.sets;

    if let Some(generators) = &ctx.vars.generators
        && let Some(fuel_emission) = &generators.fuel_emission
    {
        for id in &sets.generators {
            let factor = ctx.params.get(
                Param::GeneratorFuelCo2Emission,
                &Coord::default().with_generator(id),
            )?;
            for &year in &sets.years {
                let keys = sets.iter_year_time_keys(year).map(|key| (key, id.clone()));
                let rows = build_rows(keys, |key| {
                    Ok(Constraint::equal(
                        fuel_emission.get(key)?,
                        factor * generators.production.get(key)?,
                    ))
                })?;
                batch.add(format!("Fuel Emissions - {id} - Year {year}"), rows);
            }
        }
    }

    if let Some(grid) = &ctx.vars.grid
        && let Some(emission) = &grid.emission
    {
        let factor = ctx.params.get(Param::GridCo2Emission, &Coord::default())?;
        for &year in &sets.years {
            let rows = build_rows(sets.iter_year_time_keys(year), |key| {
                Ok(Constraint::equal(
                    emission.get(key)?,
                    factor * grid.from_grid.get(key)?,
                ))
            })?;
            batch.add(format!("Grid Emissions - Year {year}"), rows);
        }
    }

    Ok(())
}

/// All emissions of a scenario over the horizon
fn scenario_emissions(ctx: &BuildContext, scenario: Scenario) -> Result<LinExpr, BuildError> {
    let sets = ctx.sets;
    let vars = ctx.vars;
    let mut total = LinExpr::default();

    for &step in &sets.steps {
        if let Some(emission) = &vars.renewables.emission {
            for id in &sets.renewables {
                total += emission.get(&(step, id.clone()))?;
            }
        }
        if let Some(emission) = vars.battery.as_ref().and_then(|b| b.emission.as_ref()) {
            total += emission.get(&step)?;
        }
        if let Some(emission) = vars.generators.as_ref().and_then(|g| g.emission.as_ref()) {
            for id in &sets.generators {
                total += emission.get(&(step, id.clone()))?;
            }
        }
    }

    let time_keys = sets
        .iter_time_keys()
        .filter(|key| key.scenario == scenario);
    for key in time_keys {
        if let Some(fuel) = vars.generators.as_ref().and_then(|g| g.fuel_emission.as_ref()) {
            for id in &sets.generators {
                total += fuel.get(&(key, id.clone()))?;
            }
        }
        if let Some(emission) = vars.grid.as_ref().and_then(|g| g.emission.as_ref()) {
            total += emission.get(&key)?;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{add_emission_factors, add_grid, project};
    use crate::formulation::build_model;
    use crate::formulation::variables::names;
    use crate::project::{GridConnectionType, Project};
    use crate::sets::Step;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn not_tracked_by_default(project: Project) {
        let model = build_model(&project).unwrap();
        assert!(model.problem.family(names::TOTAL_EMISSIONS).is_none());
        assert!(model.problem.constraint("Total CO2 Emissions").is_none());
    }

    #[rstest]
    fn totals(mut project: Project) {
        add_grid(&mut project, GridConnectionType::PurchaseOnly);
        add_emission_factors(&mut project);
        project.config.advanced.multiobjective_optimization = true;
        let model = build_model(&project).unwrap();

        let scenario = Coord::default().with_scenario(Scenario(0));
        let row = model
            .problem
            .constraint("Scenario Total CO2 Emissions")
            .unwrap()
            .row(&scenario)
            .unwrap();
        let grid = model.problem.family(names::GRID_EMISSION).unwrap();
        assert_eq!(grid.columns.len(), project.sets.periods.len());
        for (_, var) in &grid.columns {
            assert_eq!(row.coefficient(*var), -1.0);
        }
        let battery = model.problem.family(names::BATTERY_EMISSION).unwrap();
        assert_eq!(
            row.coefficient(battery.columns[&Coord::default().with_step(Step(1))]),
            -1.0
        );

        let total = model
            .problem
            .constraint("Total CO2 Emissions")
            .unwrap()
            .row(&Coord::default())
            .unwrap();
        let by_scenario = model.problem.family(names::SCENARIO_EMISSIONS).unwrap();
        let weight = project
            .parameters
            .get(Param::ScenarioWeight, &scenario)
            .unwrap();
        assert_approx_eq!(
            f64,
            total.coefficient(by_scenario.columns[&scenario]),
            -weight
        );
    }
}
