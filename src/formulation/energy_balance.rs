//! The energy balance and the conversion losses of every technology.
//!
//! For every scenario, year and period, the energy reaching the AC bus (net of curtailment and
//! conversion losses) must equal demand exactly. Unmet demand is only allowed if lost load is
//! enabled.
use super::dispatch::renewable_net_production;
use super::variables::{BatteryConversion, BatteryVariables, DcSystemVariables};
use super::{BuildContext, BuildError, big_m, build_rows};
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch, LinExpr};
use crate::sets::{Coord, Key, TimeKey};
use log::debug;

/// Build the energy balance and loss constraints
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    for &year in &ctx.sets.years {
        add_renewable_losses(ctx, year, &mut batch)?;
        if let Some(battery) = &ctx.vars.battery {
            add_battery_losses(ctx, battery, year, &mut batch)?;
        }
        add_generator_losses(ctx, year, &mut batch)?;
        add_grid_losses(ctx, year, &mut batch)?;

        let rows = build_rows(ctx.sets.iter_year_time_keys(year), |key| {
            let demand = ctx.params.get(Param::Demand, &key.coord())?;
            Ok(Constraint::equal(supply(ctx, key)?, demand))
        })?;
        batch.add(format!("Energy Balance Constraint - Year {year}"), rows);
    }

    debug!("Built {} energy balance blocks", batch.len());
    Ok(batch)
}

/// Energy delivered to the AC bus in a time slot
fn supply(ctx: &BuildContext, key: &TimeKey) -> Result<LinExpr, BuildError> {
    let vars = ctx.vars;
    let mut supply = LinExpr::default();

    for id in &ctx.sets.renewables {
        supply += renewable_net_production(ctx, *key, id)?;
    }
    for id in &ctx.topology.own_inverter_sources {
        supply -= vars.renewables.losses.get(&(*key, id.clone()))?;
    }

    if let Some(battery) = &vars.battery {
        supply += battery.outflow.get(key)?;
        supply -= battery.inflow.get(key)?;
        supply -= battery_losses(battery, key)?;
    }

    if let Some(generators) = &vars.generators {
        for id in &ctx.sets.generators {
            let key = (*key, id.clone());
            supply += generators.production.get(&key)?;
            supply -= generators.losses.get(&key)?;
        }
    }

    if let Some(grid) = &vars.grid {
        supply += grid.from_grid.get(key)?;
        if let Some(export) = &grid.export {
            supply -= export.to_grid.get(key)?;
        }
        supply -= grid.losses.get(key)?;
    }

    if let Some(lost_load) = &vars.lost_load {
        supply += lost_load.get(key)?;
    }

    Ok(supply)
}

/// Total battery conversion losses in a time slot
fn battery_losses(battery: &BatteryVariables, key: &TimeKey) -> Result<LinExpr, BuildError> {
    Ok(match &battery.conversion {
        BatteryConversion::IndependentInverter { losses } => losses.get(key)?.into(),
        BatteryConversion::SharedInverter(dc) => {
            dc.feed_in_losses.get(key)? + dc.charge_losses.get(key)?
        }
    })
}

fn add_renewable_losses(
    ctx: &BuildContext,
    year: u32,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let renewables = &ctx.vars.renewables;
    for id in &ctx.topology.own_inverter_sources {
        let efficiency = ctx.params.efficiency(
            Param::ResInverterEfficiency,
            &Coord::default().with_renewable(id),
        )?;
        let keys = ctx.sets.iter_year_time_keys(year).map(|key| (key, id.clone()));
        let rows = build_rows(keys, |key| {
            let (time, id) = key;
            let net = renewable_net_production(ctx, *time, id)?;
            Ok(Constraint::equal(
                renewables.losses.get(key)?,
                (1.0 - efficiency) * net,
            ))
        })?;
        batch.add(format!("RES Transformation Losses - {id} - Year {year}"), rows);
    }

    Ok(())
}

fn add_battery_losses(
    ctx: &BuildContext,
    battery: &BatteryVariables,
    year: u32,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let scalar = Coord::default();
    let dc_ac = ctx
        .params
        .efficiency(Param::BatteryInverterEfficiencyDcAc, &scalar)?;
    let ac_dc = ctx
        .params
        .efficiency(Param::BatteryInverterEfficiencyAcDc, &scalar)?;
    let feed_in_loss = 1.0 - dc_ac;
    let charge_loss = 1.0 / ac_dc - 1.0;

    match &battery.conversion {
        BatteryConversion::IndependentInverter { losses } => {
            let rows = build_rows(ctx.sets.iter_year_time_keys(year), |key| {
                Ok(Constraint::equal(
                    losses.get(key)?,
                    feed_in_loss * battery.outflow.get(key)?
                        + charge_loss * battery.inflow.get(key)?,
                ))
            })?;
            batch.add(format!("Battery Transformation Losses - Year {year}"), rows);
        }
        BatteryConversion::SharedInverter(dc) => {
            add_dc_system(ctx, battery, dc, year, (feed_in_loss, charge_loss), batch)?;
        }
    }

    Ok(())
}

/// Add the constraints of a DC-coupled battery.
///
/// The single-flow binary `b` is one when the signed DC energy `e` flows to the AC bus. The
/// losses `a·e` (feeding in) and `-c·e` (charging) are products of `e` with `b` or its
/// complement `ones - b`, linearised with the same M as the sign constraints.
fn add_dc_system(
    ctx: &BuildContext,
    battery: &BatteryVariables,
    dc: &DcSystemVariables,
    year: u32,
    (a, c): (f64, f64),
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let big_m = big_m::dc_system(ctx, year)?;
    let dc_sources = ctx.topology.dc_sources();
    let keys = || ctx.sets.iter_year_time_keys(year);

    // Shorthands for the per-slot variables
    let b = |key: &TimeKey| dc.single_flow.get(key);
    let ones = |key: &TimeKey| dc.ones.get(key);
    let e = |key: &TimeKey| dc.energy.get(key);
    let complement = |key: &TimeKey| -> Result<LinExpr, BuildError> { Ok(ones(key)? - b(key)?) };

    let rows = build_rows(keys(), |key| Ok(Constraint::equal(ones(key)?, 1.0)))?;
    batch.add(format!("Fix ones to 1 - Year {year}"), rows);

    let rows = build_rows(keys(), |key| {
        let mut energy = battery.outflow.get(key)? - battery.inflow.get(key)?;
        for id in dc_sources {
            energy += renewable_net_production(ctx, *key, id)?;
        }
        Ok(Constraint::equal(e(key)?, energy))
    })?;
    batch.add(format!("DC System Energy - Year {year}"), rows);

    let rows = build_rows(keys(), |key| {
        Ok(Constraint::leq(e(key)?, big_m * b(key)?))
    })?;
    batch.add(format!("Battery Energy Positive - Year {year}"), rows);
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::geq(e(key)?, -big_m * complement(key)?))
    })?;
    batch.add(format!("Battery Energy Negative - Year {year}"), rows);

    let feed_in = |key: &TimeKey| dc.feed_in_losses.get(key);
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::leq(feed_in(key)?, a * big_m * b(key)?))
    })?;
    batch.add(format!("DC System Losses Positive - Year {year}"), rows);
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::geq(
            feed_in(key)?,
            a * e(key)? - a * big_m * complement(key)?,
        ))
    })?;
    batch.add(
        format!("DC System Losses Positive Lower Bound - Year {year}"),
        rows,
    );
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::leq(
            feed_in(key)?,
            a * e(key)? + a * big_m * complement(key)?,
        ))
    })?;
    batch.add(
        format!("DC System Losses Positive Upper Bound - Year {year}"),
        rows,
    );

    let charge = |key: &TimeKey| dc.charge_losses.get(key);
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::leq(charge(key)?, c * big_m * complement(key)?))
    })?;
    batch.add(format!("DC System Losses Negative - Year {year}"), rows);
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::geq(
            charge(key)?,
            -c * e(key)? - c * big_m * b(key)?,
        ))
    })?;
    batch.add(
        format!("DC System Losses Negative Lower Bound - Year {year}"),
        rows,
    );
    let rows = build_rows(keys(), |key| {
        Ok(Constraint::leq(
            charge(key)?,
            -c * e(key)? + c * big_m * b(key)?,
        ))
    })?;
    batch.add(
        format!("DC System Losses Negative Upper Bound - Year {year}"),
        rows,
    );

    Ok(())
}

fn add_generator_losses(
    ctx: &BuildContext,
    year: u32,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let Some(generators) = &ctx.vars.generators else {
        return Ok(());
    };

    for id in &ctx.sets.generators {
        let efficiency = ctx.params.efficiency(
            Param::GeneratorRectifierEfficiency,
            &Coord::default().with_generator(id),
        )?;
        let keys = ctx.sets.iter_year_time_keys(year).map(|key| (key, id.clone()));
        let rows = build_rows(keys, |key| {
            Ok(Constraint::equal(
                generators.losses.get(key)?,
                (1.0 - efficiency) * generators.production.get(key)?,
            ))
        })?;
        batch.add(
            format!("Generator Transformation Losses - {id} - Year {year}"),
            rows,
        );
    }

    Ok(())
}

fn add_grid_losses(
    ctx: &BuildContext,
    year: u32,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    let Some(grid) = &ctx.vars.grid else {
        return Ok(());
    };

    let scalar = Coord::default();
    let import_loss = 1.0
        - ctx
            .params
            .efficiency(Param::GridToMicrogridEfficiency, &scalar)?;
    let export_loss = grid
        .export
        .as_ref()
        .map(|_| -> Result<f64, BuildError> {
            let efficiency = ctx
                .params
                .efficiency(Param::MicrogridToGridEfficiency, &scalar)?;
            Ok(1.0 / efficiency - 1.0)
        })
        .transpose()?;

    let rows = build_rows(ctx.sets.iter_year_time_keys(year), |key| {
        let mut losses = import_loss * grid.from_grid.get(key)?;
        if let (Some(export), Some(export_loss)) = (&grid.export, export_loss) {
            losses += export_loss * export.to_grid.get(key)?;
        }
        Ok(Constraint::equal(grid.losses.get(key)?, losses))
    })?;
    batch.add(format!("Grid Transformation Losses - Year {year}"), rows);

    Ok(())
}
