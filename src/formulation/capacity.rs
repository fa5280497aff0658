//! Capacity expansion and limits on installed capacity.
use super::existing::ExistingCapacity;
use super::{BuildContext, BuildError, build_rows};
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch, LinExpr, VarArray};
use crate::project::BigMPolicy;
use crate::sets::{Coord, IndexSets, Key, Step};

/// Units added in `step`, relative to the previous step
pub(super) fn new_units<K: Key>(
    sets: &IndexSets,
    units: &VarArray<K>,
    step: Step,
    key: impl Fn(Step) -> K,
) -> Result<LinExpr, BuildError> {
    let mut added = LinExpr::from(units.get(&key(step))?);
    if let Some(previous) = sets.previous_step(step) {
        added -= units.get(&key(previous))?;
    }

    Ok(added)
}

/// Keys for a family indexed by step and technology ID
fn keyed_by_step<T: Clone>(ids: &[T]) -> impl Fn(Step) -> Vec<(Step, T)> + '_ {
    move |step| ids.iter().map(|id| (step, id.clone())).collect()
}

/// Installed units can only grow from one step to the next
fn add_expansion<K: Key>(
    batch: &mut ConstraintBatch,
    sets: &IndexSets,
    name: &str,
    units: &VarArray<K>,
    keys: impl Fn(Step) -> Vec<K>,
) -> Result<(), BuildError> {
    let pairs = sets.steps.iter().filter_map(|&step| {
        sets.previous_step(step)
            .map(|previous| keys(step).into_iter().zip(keys(previous)))
    });
    let rows = build_rows(pairs.flatten(), |(current, previous)| {
        Ok(Constraint::geq(units.get(current)?, units.get(previous)?))
    })?;
    if !rows.is_empty() {
        batch.add(name, rows);
    }

    Ok(())
}

/// Build the capacity constraints
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    let sets = ctx.sets;
    let vars = ctx.vars;

    let renewables = &vars.renewables;
    let all_sources = sets.renewables.iter().cloned().collect::<Vec<_>>();
    add_expansion(
        &mut batch,
        sets,
        "Renewable Capacity Expansion",
        &renewables.units,
        keyed_by_step(&all_sources),
    )?;
    add_expansion(
        &mut batch,
        sets,
        "Renewable Inverter Expansion",
        &renewables.inverter_units,
        keyed_by_step(&ctx.topology.own_inverter_sources),
    )?;
    add_land_use(ctx, &mut batch)?;

    if let Some(battery) = &vars.battery {
        add_expansion(
            &mut batch,
            sets,
            "Battery Capacity Expansion",
            &battery.units,
            |step| vec![step],
        )?;
        add_expansion(
            &mut batch,
            sets,
            "Battery Inverter Expansion",
            &battery.inverter_units,
            |step| vec![step],
        )?;
        add_battery_power(ctx, &mut batch)?;
        add_battery_max_units(ctx, &mut batch)?;
    }

    if let Some(generators) = &vars.generators {
        let types = sets.generators.iter().cloned().collect::<Vec<_>>();
        let generator_keys = keyed_by_step(&types);
        add_expansion(
            &mut batch,
            sets,
            "Generator Capacity Expansion",
            &generators.units,
            &generator_keys,
        )?;
        add_expansion(
            &mut batch,
            sets,
            "Generator Rectifier Expansion",
            &generators.rectifier_units,
            &generator_keys,
        )?;

        for id in &sets.generators {
            let nominal = ctx.params.get(
                Param::GeneratorNominalCapacity,
                &Coord::default().with_generator(id),
            )?;
            for &year in &sets.years {
                let units = generators.units.get(&(sets.step_for_year(year), id.clone()))?;
                let existing = ExistingCapacity::generator(id).active(ctx, year)?;
                let keys = sets.iter_year_time_keys(year).map(|key| (key, id.clone()));
                let rows = build_rows(keys, |key| {
                    Ok(Constraint::leq(
                        generators.production.get(key)?,
                        nominal * units + existing,
                    ))
                })?;
                batch.add(
                    format!("Generator Maximum Production - {id} - Year {year}"),
                    rows,
                );
            }
        }
    }

    if let Some(grid) = &vars.grid {
        add_expansion(
            &mut batch,
            sets,
            "Grid Transformer Expansion",
            &grid.transformer_units,
            |step| vec![step],
        )?;
    }

    Ok(batch)
}

/// Define maximum battery charge and discharge power from installed capacity
fn add_battery_power(ctx: &BuildContext, batch: &mut ConstraintBatch) -> Result<(), BuildError> {
    let battery = ctx.vars.battery()?;
    let scalar = Coord::default();
    let nominal = ctx.params.get(Param::BatteryNominalCapacity, &scalar)?;
    let charge_time = ctx.params.positive(Param::BatteryMaximumChargeTime, &scalar)?;
    let discharge_time = ctx
        .params
        .positive(Param::BatteryMaximumDischargeTime, &scalar)?;

    for (name, power, time) in [
        (
            "Battery Maximum Charge Power",
            &battery.max_charge_power,
            charge_time,
        ),
        (
            "Battery Maximum Discharge Power",
            &battery.max_discharge_power,
            discharge_time,
        ),
    ] {
        let rows = build_rows(ctx.sets.steps.iter().copied(), |step| {
            Ok(Constraint::equal(
                power.get(step)?,
                (nominal / time) * battery.units.get(step)?,
            ))
        })?;
        batch.add(name, rows);
    }

    Ok(())
}

/// Bound the unit counts which the capacity-derived big-M constants depend on
fn add_battery_max_units(
    ctx: &BuildContext,
    batch: &mut ConstraintBatch,
) -> Result<(), BuildError> {
    if !matches!(ctx.topology.big_m, BigMPolicy::CapacityDerived { .. }) {
        return Ok(());
    }

    let battery = ctx.vars.battery()?;
    let scalar = Coord::default();
    let steps = || ctx.sets.steps.iter().copied();

    if !ctx.topology.dc_sources().is_empty() {
        let max_units = ctx.params.positive(Param::BatteryInverterMaxUnits, &scalar)?;
        let rows = build_rows(steps(), |step| {
            Ok(Constraint::leq(battery.inverter_units.get(step)?, max_units))
        })?;
        batch.add("Battery Inverter Maximum Units", rows);
    }

    if battery.single_flow.is_some() {
        let max_units = ctx.params.positive(Param::BatteryMaxUnits, &scalar)?;
        let rows = build_rows(steps(), |step| {
            Ok(Constraint::leq(battery.units.get(step)?, max_units))
        })?;
        batch.add("Battery Maximum Units", rows);
    }

    Ok(())
}

/// Land used by renewables, and its limit
fn add_land_use(ctx: &BuildContext, batch: &mut ConstraintBatch) -> Result<(), BuildError> {
    let (Some(available), Some(land_use)) =
        (ctx.topology.land_availability, &ctx.vars.renewables.land_use)
    else {
        return Ok(());
    };

    let renewables = &ctx.vars.renewables;
    for id in &ctx.sets.renewables {
        let coord = Coord::default().with_renewable(id);
        let nominal = ctx.params.get(Param::ResNominalCapacity, &coord)?;
        let area = ctx.params.get(Param::ResSpecificArea, &coord)?;
        let keys = ctx.sets.steps.iter().map(|&step| (step, id.clone()));
        let rows = build_rows(keys, |key| {
            Ok(Constraint::equal(
                land_use.get(key)?,
                (nominal * area) * renewables.units.get(key)?,
            ))
        })?;
        batch.add(format!("Land Use - {id}"), rows);
    }

    let rows = build_rows(ctx.sets.steps.iter().copied(), |step| {
        let total = ctx
            .sets
            .renewables
            .iter()
            .map(|id| land_use.get(&(*step, id.clone())).map(LinExpr::from))
            .sum::<Result<LinExpr, BuildError>>()?;
        Ok(Constraint::leq(total, available))
    })?;
    batch.add("Land Availability", rows);

    Ok(())
}
