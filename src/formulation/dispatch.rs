//! Operation of installed technologies in each period.
use super::existing::ExistingCapacity;
use super::variables::{GeneratorVariables, PartialLoadVariables};
use super::{BuildContext, BuildError, big_m, build_rows};
use crate::id::RenewableID;
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch, LinExpr};
use crate::sets::{Coord, Key, StepTimeKey, TimeKey};
use log::debug;

/// Energy a source's existing capacity produces in a time slot
fn existing_renewable_energy(
    ctx: &BuildContext,
    key: &TimeKey,
    id: &RenewableID,
) -> Result<f64, BuildError> {
    let existing = ExistingCapacity::renewable(id).active(ctx, key.year)?;
    if existing == 0.0 {
        return Ok(0.0);
    }

    let availability = ctx.params.get(
        Param::ResUnitEnergyAvailability,
        &Coord::default()
            .with_scenario(key.scenario)
            .with_period(key.period)
            .with_renewable(id),
    )?;
    Ok(existing * availability)
}

/// Energy from a source in a time slot, from new and existing capacity, net of curtailment
pub(super) fn renewable_net_production(
    ctx: &BuildContext,
    key: TimeKey,
    id: &RenewableID,
) -> Result<LinExpr, BuildError> {
    let net = ctx.vars.renewables.net_production(ctx.sets, key, id)?;
    Ok(net + existing_renewable_energy(ctx, &key, id)?)
}

/// Build the dispatch constraints
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    add_renewable_production(ctx, &mut batch)?;
    if ctx.vars.battery.is_some() {
        add_battery_operation(ctx, &mut batch)?;
    }
    if let Some(generators) = &ctx.vars.generators
        && let Some(partial_load) = &generators.partial_load
    {
        add_partial_load(ctx, generators, partial_load, &mut batch)?;
    }
    if ctx.vars.grid.is_some() {
        add_grid_limits(ctx, &mut batch)?;
    }

    debug!("Built {} dispatch blocks", batch.len());
    Ok(batch)
}

/// Build the constraints forbidding simultaneous flows in both directions.
///
/// Only MILP formulations have the binaries these need; otherwise the batch is empty.
pub fn build_single_flow(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();

    if let Some(battery) = &ctx.vars.battery
        && let Some(binary) = &battery.single_flow
    {
        for &year in &ctx.sets.years {
            let big_m = big_m::battery_flow(ctx, year)?;
            let keys = || ctx.sets.iter_year_time_keys(year);
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    battery.outflow.get(key)?,
                    big_m * binary.get(key)?,
                ))
            })?;
            batch.add(format!("Battery Single Flow Discharge - Year {year}"), rows);
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    battery.inflow.get(key)? + big_m * binary.get(key)?,
                    big_m,
                ))
            })?;
            batch.add(format!("Battery Single Flow Charge - Year {year}"), rows);
        }
    }

    if let Some(grid) = &ctx.vars.grid
        && let Some(export) = &grid.export
        && let Some(binary) = &export.single_flow
    {
        let big_m = big_m::grid_flow(ctx)?;
        for &year in &ctx.sets.years {
            let keys = || ctx.sets.iter_year_time_keys(year);
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    grid.from_grid.get(key)?,
                    big_m * binary.get(key)?,
                ))
            })?;
            batch.add(format!("Grid Single Flow Import - Year {year}"), rows);
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    export.to_grid.get(key)? + big_m * binary.get(key)?,
                    big_m,
                ))
            })?;
            batch.add(format!("Grid Single Flow Export - Year {year}"), rows);
        }
    }

    Ok(batch)
}

/// Production follows installed units and availability, and curtailment can't exceed it
fn add_renewable_production(
    ctx: &BuildContext,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let renewables = &ctx.vars.renewables;
    for id in &ctx.sets.renewables {
        let nominal = ctx.params.get(
            Param::ResNominalCapacity,
            &Coord::default().with_renewable(id),
        )?;
        let keys = ctx.sets.iter_step_time_keys().map(|key| (key, id.clone()));
        let rows = build_rows(keys, |key| {
            let (StepTimeKey { scenario, step, period }, id) = key;
            let availability = ctx.params.get(
                Param::ResUnitEnergyAvailability,
                &Coord::default()
                    .with_scenario(*scenario)
                    .with_period(*period)
                    .with_renewable(id),
            )?;
            Ok(Constraint::equal(
                renewables.production.get(key)?,
                (nominal * availability) * renewables.units.get(&(*step, id.clone()))?,
            ))
        })?;
        batch.add(format!("Renewable Energy Production - {id}"), rows);

        for &year in &ctx.sets.years {
            let step = ctx.sets.step_for_year(year);
            let keys = ctx.sets.iter_year_time_keys(year).map(|key| (key, id.clone()));
            let rows = build_rows(keys, |key| {
                let (time, id) = key;
                let production = StepTimeKey {
                    scenario: time.scenario,
                    step,
                    period: time.period,
                };
                Ok(Constraint::leq(
                    renewables.curtailment.get(key)?,
                    renewables.production.get(&(production, id.clone()))?
                        + existing_renewable_energy(ctx, time, id)?,
                ))
            })?;
            batch.add(format!("Renewable Curtailment - {id} - Year {year}"), rows);
        }
    }

    Ok(())
}

/// State of charge dynamics and limits on charging and discharging
fn add_battery_operation(
    ctx: &BuildContext,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let battery = ctx.vars.battery()?;
    let scalar = Coord::default();
    let nominal = ctx.params.get(Param::BatteryNominalCapacity, &scalar)?;
    let charge_efficiency = ctx
        .params
        .efficiency(Param::BatteryChargeEfficiency, &scalar)?;
    let discharge_efficiency = ctx
        .params
        .efficiency(Param::BatteryDischargeEfficiency, &scalar)?;
    let depth_of_discharge = ctx.params.get(Param::BatteryDepthOfDischarge, &scalar)?;
    if !(0.0..1.0).contains(&depth_of_discharge) {
        return Err(BuildError::InvalidParameter {
            param: Param::BatteryDepthOfDischarge,
            coord: scalar,
            reason: "depth of discharge must be at least zero and less than one",
        });
    }

    let charge_time = ctx.params.positive(Param::BatteryMaximumChargeTime, &scalar)?;
    let discharge_time = ctx
        .params
        .positive(Param::BatteryMaximumDischargeTime, &scalar)?;

    let soc = &battery.state_of_charge;
    for &year in &ctx.sets.years {
        let step = ctx.sets.step_for_year(year);
        let existing = ExistingCapacity::battery().active(ctx, year)?;
        let capacity = nominal * battery.units.get(&step)? + existing;
        let keys = || ctx.sets.iter_year_time_keys(year);

        // The first period follows the last one of the same year
        let rows = build_rows(keys(), |key| {
            let previous = TimeKey {
                period: ctx.sets.previous_period(key.period),
                ..*key
            };
            Ok(Constraint::equal(
                soc.get(key)?,
                soc.get(&previous)? + charge_efficiency * battery.inflow.get(key)?
                    - (1.0 / discharge_efficiency) * battery.outflow.get(key)?,
            ))
        })?;
        batch.add(format!("Battery State of Charge - Year {year}"), rows);

        let rows = build_rows(keys(), |key| {
            Ok(Constraint::geq(
                soc.get(key)?,
                (1.0 - depth_of_discharge) * capacity.clone(),
            ))
        })?;
        batch.add(format!("Battery Minimum State of Charge - Year {year}"), rows);
        let rows = build_rows(keys(), |key| {
            Ok(Constraint::leq(soc.get(key)?, capacity.clone()))
        })?;
        batch.add(format!("Battery Maximum State of Charge - Year {year}"), rows);

        // The existing bank adds constant power on top of the sized power
        let max_charge = battery.max_charge_power.get(&step)? + existing / charge_time;
        let rows = build_rows(keys(), |key| {
            Ok(Constraint::leq(battery.inflow.get(key)?, max_charge.clone()))
        })?;
        batch.add(format!("Battery Maximum Charge - Year {year}"), rows);
        let max_discharge = battery.max_discharge_power.get(&step)? + existing / discharge_time;
        let rows = build_rows(keys(), |key| {
            Ok(Constraint::leq(
                battery.outflow.get(key)?,
                max_discharge.clone(),
            ))
        })?;
        batch.add(format!("Battery Maximum Discharge - Year {year}"), rows);
    }

    Ok(())
}

/// Generators run either at full load or, for at most one unit, in partial load
fn add_partial_load(
    ctx: &BuildContext,
    generators: &GeneratorVariables,
    partial_load: &PartialLoadVariables,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    for id in &ctx.sets.generators {
        let coord = Coord::default().with_generator(id);
        let nominal = ctx.params.positive(Param::GeneratorNominalCapacity, &coord)?;
        let minimum_load = ctx.params.get(Param::GeneratorMinimumLoad, &coord)?;

        for &year in &ctx.sets.years {
            let step_key = (ctx.sets.step_for_year(year), id.clone());
            let units = generators.units.get(&step_key)?;
            let existing_units = ExistingCapacity::generator(id).active(ctx, year)? / nominal;
            let full_load_units = partial_load.full_load_units.get(&step_key)?;
            let keys = || ctx.sets.iter_year_time_keys(year).map(|key| (key, id.clone()));

            let rows = build_rows(keys(), |key| {
                Ok(Constraint::equal(
                    generators.production.get(key)?,
                    nominal * full_load_units + partial_load.production.get(key)?,
                ))
            })?;
            batch.add(
                format!("Generator Partial Load Production - {id} - Year {year}"),
                rows,
            );
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::geq(
                    partial_load.production.get(key)?,
                    (minimum_load * nominal) * partial_load.in_partial_load.get(key)?,
                ))
            })?;
            batch.add(
                format!("Generator Partial Load Minimum - {id} - Year {year}"),
                rows,
            );
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    partial_load.production.get(key)?,
                    nominal * partial_load.in_partial_load.get(key)?,
                ))
            })?;
            batch.add(
                format!("Generator Partial Load Maximum - {id} - Year {year}"),
                rows,
            );
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(
                    full_load_units + partial_load.in_partial_load.get(key)?,
                    units + existing_units,
                ))
            })?;
            batch.add(
                format!("Generator Units in Operation - {id} - Year {year}"),
                rows,
            );
        }
    }

    Ok(())
}

/// Power exchanged with the grid is limited by the connection and its availability
fn add_grid_limits(ctx: &BuildContext, batch: &mut ConstraintBatch) -> Result<(), BuildError> {
    let grid = ctx.vars.grid()?;
    let max_power = ctx
        .params
        .get(Param::GridMaximumPower, &Coord::default())?;

    for &year in &ctx.sets.years {
        let keys = || ctx.sets.iter_year_time_keys(year);
        let limit = |key: &TimeKey| -> Result<f64, BuildError> {
            Ok(max_power * ctx.params.proportion(Param::GridAvailability, &key.coord())?)
        };

        let rows = build_rows(keys(), |key| {
            Ok(Constraint::leq(grid.from_grid.get(key)?, limit(key)?))
        })?;
        batch.add(format!("Grid Maximum Import - Year {year}"), rows);

        if let Some(export) = &grid.export {
            let rows = build_rows(keys(), |key| {
                Ok(Constraint::leq(export.to_grid.get(key)?, limit(key)?))
            })?;
            batch.add(format!("Grid Maximum Export - Year {year}"), rows);
        }
    }

    Ok(())
}
