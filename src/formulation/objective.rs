//! The objective: discounted cost, optionally plus weighted emissions.
use super::capacity::new_units;
use super::transformation::ConversionDevice;
use super::{BuildContext, BuildError};
use crate::id::{GeneratorID, RenewableID};
use crate::parameter::Param;
use crate::problem::{LinExpr, VarArray};
use crate::sets::{Coord, Key, Step, TimeKey};
use log::debug;

/// Discount factor for costs incurred in `year`
fn discount_factor(ctx: &BuildContext, rate: f64, year: u32) -> f64 {
    let elapsed = ctx.sets.elapsed_years(year);
    1.0 / (1.0 + rate).powi(elapsed as i32)
}

/// Build the expression to be minimised
pub fn build(ctx: &BuildContext) -> Result<LinExpr, BuildError> {
    let rate = ctx.params.scalar(Param::DiscountRate)?;
    let mut objective = investment_cost(ctx, rate)?;
    objective += fixed_cost(ctx, rate)?;
    objective += operating_cost(ctx, rate)?;

    if let Some(weight) = ctx.topology.emissions {
        let total = ctx.vars.emissions()?.total.get(&())?;
        objective += weight * total;
    }

    debug!(
        "Objective has {} terms",
        objective.simplified_terms().len()
    );
    Ok(objective)
}

/// Cost figures of a technology, per unit
struct TechnologyCosts {
    /// Investment in one unit
    unit_cost: f64,
    /// Yearly O&M as a share of the investment
    om_share: f64,
    lifetime: f64,
}

impl TechnologyCosts {
    fn renewable(ctx: &BuildContext, id: &RenewableID) -> Result<Self, BuildError> {
        let coord = Coord::default().with_renewable(id);
        Ok(Self {
            unit_cost: ctx.params.get(Param::ResNominalCapacity, &coord)?
                * ctx.params.get(Param::ResSpecificInvestmentCost, &coord)?,
            om_share: ctx.params.get(Param::ResSpecificOmCost, &coord)?,
            lifetime: ctx.params.positive(Param::ResLifetime, &coord)?,
        })
    }

    fn battery(ctx: &BuildContext) -> Result<Self, BuildError> {
        let scalar = Coord::default();
        Ok(Self {
            unit_cost: ctx.params.get(Param::BatteryNominalCapacity, &scalar)?
                * ctx
                    .params
                    .get(Param::BatterySpecificInvestmentCost, &scalar)?,
            om_share: ctx.params.get(Param::BatterySpecificOmCost, &scalar)?,
            lifetime: ctx
                .params
                .positive(Param::BatteryExpectedLifetime, &scalar)?,
        })
    }

    fn generator(ctx: &BuildContext, id: &GeneratorID) -> Result<Self, BuildError> {
        let coord = Coord::default().with_generator(id);
        Ok(Self {
            unit_cost: ctx.params.get(Param::GeneratorNominalCapacity, &coord)?
                * ctx
                    .params
                    .get(Param::GeneratorSpecificInvestmentCost, &coord)?,
            om_share: ctx.params.get(Param::GeneratorSpecificOmCost, &coord)?,
            lifetime: ctx.params.positive(Param::GeneratorLifetime, &coord)?,
        })
    }
}

/// Cost of the units added in every step, discounted to the first year of the step
fn investment_cost(ctx: &BuildContext, rate: f64) -> Result<LinExpr, BuildError> {
    let sets = ctx.sets;
    let vars = ctx.vars;
    let mut cost = LinExpr::default();

    for &step in &sets.steps {
        let discount = discount_factor(ctx, rate, sets.first_year_of_step(step));
        let mut step_cost = LinExpr::default();

        for id in &sets.renewables {
            let coord = Coord::default().with_renewable(id);
            let key = |s: Step| (s, id.clone());
            let unit_cost = TechnologyCosts::renewable(ctx, id)?.unit_cost;
            step_cost += unit_cost * new_units(sets, &vars.renewables.units, step, key)?;

            if ctx.topology.has_own_inverter(id) {
                step_cost += device_cost(
                    ctx,
                    &ConversionDevice::renewable_inverter(id),
                    Param::ResInverterCost,
                    &coord,
                    &vars.renewables.inverter_units,
                    step,
                    key,
                )?;
            }
        }

        if let Some(battery) = &vars.battery {
            let scalar = Coord::default();
            let unit_cost = TechnologyCosts::battery(ctx)?.unit_cost;
            step_cost += unit_cost * new_units(sets, &battery.units, step, |s| s)?;
            step_cost += device_cost(
                ctx,
                &ConversionDevice::battery_inverter(),
                Param::BatteryInverterCost,
                &scalar,
                &battery.inverter_units,
                step,
                |s| s,
            )?;
        }

        if let Some(generators) = &vars.generators {
            for id in &sets.generators {
                let coord = Coord::default().with_generator(id);
                let key = |s: Step| (s, id.clone());
                let unit_cost = TechnologyCosts::generator(ctx, id)?.unit_cost;
                step_cost += unit_cost * new_units(sets, &generators.units, step, key)?;
                step_cost += device_cost(
                    ctx,
                    &ConversionDevice::generator_rectifier(id),
                    Param::GeneratorRectifierCost,
                    &coord,
                    &generators.rectifier_units,
                    step,
                    key,
                )?;
            }
        }

        if let Some(grid) = &vars.grid {
            step_cost += device_cost(
                ctx,
                &ConversionDevice::grid_transformer(),
                Param::GridTransformerCost,
                &Coord::default(),
                &grid.transformer_units,
                step,
                |s| s,
            )?;
        }

        cost += discount * step_cost;
    }

    Ok(cost)
}

/// Cost of the conversion devices added in `step`
fn device_cost<K: Key>(
    ctx: &BuildContext,
    device: &ConversionDevice,
    cost_param: Param,
    coord: &Coord,
    units: &VarArray<K>,
    step: Step,
    key: impl Fn(Step) -> K,
) -> Result<LinExpr, BuildError> {
    let unit_cost = device.nominal_capacity(ctx)? * ctx.params.get(cost_param, coord)?;
    Ok(unit_cost * new_units(ctx.sets, units, step, key)?)
}

/// Yearly O&M of the units built for the horizon, less their salvage value at its end.
///
/// Capacity installed before the horizon is a sunk cost and doesn't appear here.
fn fixed_cost(ctx: &BuildContext, rate: f64) -> Result<LinExpr, BuildError> {
    let sets = ctx.sets;
    let vars = ctx.vars;
    let mut cost = LinExpr::default();

    for id in &sets.renewables {
        cost += lifetime_cost(
            ctx,
            rate,
            &TechnologyCosts::renewable(ctx, id)?,
            &vars.renewables.units,
            |s| (s, id.clone()),
        )?;
    }
    if let Some(battery) = &vars.battery {
        cost += lifetime_cost(
            ctx,
            rate,
            &TechnologyCosts::battery(ctx)?,
            &battery.units,
            |s| s,
        )?;
    }
    if let Some(generators) = &vars.generators {
        for id in &sets.generators {
            cost += lifetime_cost(
                ctx,
                rate,
                &TechnologyCosts::generator(ctx, id)?,
                &generators.units,
                |s| (s, id.clone()),
            )?;
        }
    }

    Ok(cost)
}

/// Discounted O&M of one technology in every year, less the discounted residual value of its
/// units.
///
/// Units added in a step are credited for the share of their lifetime left when the horizon
/// ends, discounted from the end of the last year.
fn lifetime_cost<K: Key>(
    ctx: &BuildContext,
    rate: f64,
    costs: &TechnologyCosts,
    units: &VarArray<K>,
    key: impl Fn(Step) -> K,
) -> Result<LinExpr, BuildError> {
    let sets = ctx.sets;
    let mut cost = LinExpr::default();

    for &year in &sets.years {
        let installed = units.get(&key(sets.step_for_year(year)))?;
        let discount = discount_factor(ctx, rate, year);
        cost += (discount * costs.om_share * costs.unit_cost) * installed;
    }

    let horizon = sets.years.len() as i32;
    let end_discount = 1.0 / (1.0 + rate).powi(horizon);
    for &step in &sets.steps {
        let elapsed = f64::from(sets.elapsed_years(sets.first_year_of_step(step)));
        let used = f64::from(horizon) - elapsed;
        let residual = (costs.lifetime - used).max(0.0) / costs.lifetime;
        if residual > 0.0 {
            let salvage = end_discount * residual * costs.unit_cost;
            cost -= salvage * new_units(sets, units, step, &key)?;
        }
    }

    Ok(cost)
}

/// Cost of battery wear per unit of energy charged or discharged.
///
/// The storage share of the investment is spread over the energy the battery can cycle in its
/// life.
fn battery_wear_cost(ctx: &BuildContext) -> Result<f64, BuildError> {
    let scalar = Coord::default();
    let investment = ctx
        .params
        .get(Param::BatterySpecificInvestmentCost, &scalar)?;
    let electronic_share = ctx
        .params
        .proportion(Param::BatterySpecificElectronicInvestmentCost, &scalar)?;
    let cycles = ctx.params.positive(Param::BatteryCycles, &scalar)?;
    let depth_of_discharge = ctx.params.positive(Param::BatteryDepthOfDischarge, &scalar)?;

    Ok(investment * (1.0 - electronic_share) / (cycles * 2.0 * depth_of_discharge))
}

/// Scenario-weighted, discounted cost of operating in every period
fn operating_cost(ctx: &BuildContext, rate: f64) -> Result<LinExpr, BuildError> {
    let battery_wear = if ctx.vars.battery.is_some() {
        battery_wear_cost(ctx)?
    } else {
        0.0
    };
    let mut cost = LinExpr::default();
    for key in ctx.sets.iter_time_keys() {
        let weight = ctx.params.get(
            Param::ScenarioWeight,
            &Coord::default().with_scenario(key.scenario),
        )?;
        let discount = discount_factor(ctx, rate, key.year);
        cost += (weight * discount) * period_cost(ctx, &key, battery_wear)?;
    }

    Ok(cost)
}

/// Undiscounted cost of operating in a time slot
fn period_cost(
    ctx: &BuildContext,
    key: &TimeKey,
    battery_wear: f64,
) -> Result<LinExpr, BuildError> {
    let vars = ctx.vars;
    let scalar = Coord::default();
    let mut cost = LinExpr::default();

    if let Some(battery) = &vars.battery {
        cost += battery_wear * (battery.inflow.get(key)? + battery.outflow.get(key)?);
    }

    if let Some(generators) = &vars.generators {
        for id in &ctx.sets.generators {
            let fuel_cost = ctx.params.get(
                Param::GeneratorFuelCost,
                &Coord::default().with_generator(id),
            )?;
            cost += fuel_cost * generators.production.get(&(*key, id.clone()))?;
        }
    }

    if let Some(grid) = &vars.grid {
        let purchase_price = ctx.params.get(Param::GridPurchasePrice, &scalar)?;
        cost += purchase_price * grid.from_grid.get(key)?;
        if let Some(export) = &grid.export {
            let sell_price = ctx.params.get(Param::GridSellPrice, &scalar)?;
            cost -= sell_price * export.to_grid.get(key)?;
        }
    }

    if let (Some(lost_load), Some(settings)) = (&vars.lost_load, ctx.topology.lost_load) {
        cost += settings.specific_cost * lost_load.get(key)?;
    }

    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{add_grid, extend_horizon, project, replace_parameter};
    use crate::formulation::build_model;
    use crate::formulation::variables::names;
    use crate::project::{GridConnectionType, Project};
    use crate::sets::Scenario;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    /// Drop the battery's O&M and shorten its life so only investment reaches the objective
    fn without_battery_om_or_salvage(project: &mut Project, lifetime: f64) {
        let scalar = Coord::default();
        project.parameters =
            replace_parameter(&project.parameters, Param::BatterySpecificOmCost, &scalar, 0.0);
        project.parameters = replace_parameter(
            &project.parameters,
            Param::BatteryExpectedLifetime,
            &scalar,
            lifetime,
        );
    }

    #[rstest]
    fn investment_is_discounted_per_step(mut project: Project) {
        extend_horizon(&mut project, 4, 2);
        without_battery_om_or_salvage(&mut project, 2.0);
        let model = build_model(&project).unwrap();
        let objective = model.problem.objective();
        let units = &model.problem.family(names::BATTERY_UNITS).unwrap().columns;
        let step = |s| Coord::default().with_step(Step(s));

        let scalar = Coord::default();
        let get = |param| project.parameters.get(param, &scalar).unwrap();
        let unit_cost =
            get(Param::BatteryNominalCapacity) * get(Param::BatterySpecificInvestmentCost);
        let rate = get(Param::DiscountRate);
        let discount = 1.0 / (1.0 + rate).powi(2);

        // Step 2 only pays for the units added on top of those of step 1
        assert_approx_eq!(
            f64,
            objective.coefficient(units[&step(1)]),
            unit_cost * (1.0 - discount)
        );
        assert_approx_eq!(
            f64,
            objective.coefficient(units[&step(2)]),
            unit_cost * discount
        );
    }

    #[rstest]
    fn grid_trade_and_lost_load(mut project: Project) {
        add_grid(&mut project, GridConnectionType::PurchaseSell);
        project.config.project.lost_load_fraction = 0.1;
        project.config.project.lost_load_specific_cost = 10.0;
        let model = build_model(&project).unwrap();
        let objective = model.problem.objective();

        let slot = Coord::default()
            .with_scenario(Scenario(0))
            .with_year(2025)
            .with_period(0);
        let column = |name| model.problem.family(name).unwrap().columns[&slot];
        let scalar = Coord::default();
        let get = |param| project.parameters.get(param, &scalar).unwrap();

        assert_approx_eq!(
            f64,
            objective.coefficient(column(names::GRID_IMPORT)),
            get(Param::GridPurchasePrice)
        );
        assert_approx_eq!(
            f64,
            objective.coefficient(column(names::GRID_EXPORT)),
            -get(Param::GridSellPrice)
        );
        assert_approx_eq!(f64, objective.coefficient(column(names::LOST_LOAD)), 10.0);
    }

    #[rstest]
    fn om_and_salvage_over_single_year(project: Project) {
        let model = build_model(&project).unwrap();
        let objective = model.problem.objective();
        let step = Coord::default().with_step(Step(1));
        let rate = project.parameters.scalar(Param::DiscountRate).unwrap();

        let scalar = Coord::default();
        let get = |param, coord: &Coord| project.parameters.get(param, coord).unwrap();
        let battery = model.problem.family(names::BATTERY_UNITS).unwrap().columns[&step];
        let unit_cost = get(Param::BatteryNominalCapacity, &scalar)
            * get(Param::BatterySpecificInvestmentCost, &scalar);
        let om = get(Param::BatterySpecificOmCost, &scalar);
        let residual = (get(Param::BatteryExpectedLifetime, &scalar) - 1.0)
            / get(Param::BatteryExpectedLifetime, &scalar);
        assert_approx_eq!(
            f64,
            objective.coefficient(battery),
            unit_cost * (1.0 + om - residual / (1.0 + rate))
        );

        let pv = Coord::default().with_renewable(&"PV".into());
        let column = model.problem.family(names::RES_UNITS).unwrap().columns
            [&step.with_renewable(&"PV".into())];
        let unit_cost =
            get(Param::ResNominalCapacity, &pv) * get(Param::ResSpecificInvestmentCost, &pv);
        let om = get(Param::ResSpecificOmCost, &pv);
        let residual = (get(Param::ResLifetime, &pv) - 1.0) / get(Param::ResLifetime, &pv);
        assert_approx_eq!(
            f64,
            objective.coefficient(column),
            unit_cost * (1.0 + om - residual / (1.0 + rate))
        );
    }

    #[rstest]
    fn salvage_only_for_units_outliving_the_horizon(mut project: Project) {
        // Four years in two steps with a three-year life: only step 2 units outlive the horizon
        extend_horizon(&mut project, 4, 2);
        without_battery_om_or_salvage(&mut project, 3.0);
        let model = build_model(&project).unwrap();
        let objective = model.problem.objective();
        let units = &model.problem.family(names::BATTERY_UNITS).unwrap().columns;
        let step = |s| Coord::default().with_step(Step(s));

        let scalar = Coord::default();
        let get = |param| project.parameters.get(param, &scalar).unwrap();
        let unit_cost =
            get(Param::BatteryNominalCapacity) * get(Param::BatterySpecificInvestmentCost);
        let rate = get(Param::DiscountRate);
        let discount = 1.0 / (1.0 + rate).powi(2);
        let salvage = unit_cost / 3.0 / (1.0 + rate).powi(4);

        assert_approx_eq!(
            f64,
            objective.coefficient(units[&step(1)]),
            unit_cost * (1.0 - discount) + salvage
        );
        assert_approx_eq!(
            f64,
            objective.coefficient(units[&step(2)]),
            unit_cost * discount - salvage
        );
    }

    #[rstest]
    fn battery_wear_on_throughput(project: Project) {
        let model = build_model(&project).unwrap();
        let objective = model.problem.objective();
        let slot = Coord::default()
            .with_scenario(Scenario(0))
            .with_year(2025)
            .with_period(1);
        let column = |name| model.problem.family(name).unwrap().columns[&slot];

        let scalar = Coord::default();
        let get = |param| project.parameters.get(param, &scalar).unwrap();
        let weight = project
            .parameters
            .get(
                Param::ScenarioWeight,
                &Coord::default().with_scenario(Scenario(0)),
            )
            .unwrap();
        let wear = get(Param::BatterySpecificInvestmentCost)
            * (1.0 - get(Param::BatterySpecificElectronicInvestmentCost))
            / (get(Param::BatteryCycles) * 2.0 * get(Param::BatteryDepthOfDischarge));

        assert_approx_eq!(
            f64,
            objective.coefficient(column(names::BATTERY_INFLOW)),
            weight * wear
        );
        assert_approx_eq!(
            f64,
            objective.coefficient(column(names::BATTERY_OUTFLOW)),
            weight * wear
        );
    }

    #[rstest]
    fn electronic_share_above_one_is_rejected(mut project: Project) {
        project.parameters = replace_parameter(
            &project.parameters,
            Param::BatterySpecificElectronicInvestmentCost,
            &Coord::default(),
            1.5,
        );
        assert_eq!(
            build_model(&project).unwrap_err(),
            BuildError::InvalidParameter {
                param: Param::BatterySpecificElectronicInvestmentCost,
                coord: Coord::default(),
                reason: "value must be between zero and one",
            }
        );
    }
}
