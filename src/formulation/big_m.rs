//! Big-M constants for the flow exclusivity constraints.
//!
//! With the capacity-derived policy each constant is the largest flow the device can physically
//! carry, times a safety margin. The unit counts it depends on are bounded by constraints in the
//! capacity builder, so the constant never cuts off a feasible flow.
use super::existing::ExistingCapacity;
use super::transformation::ConversionDevice;
use super::{BuildContext, BuildError};
use crate::parameter::Param;
use crate::project::BigMPolicy;
use crate::sets::Coord;

/// Energy passing through the shared DC/AC inverter in `year`
pub fn dc_system(ctx: &BuildContext, year: u32) -> Result<f64, BuildError> {
    match ctx.topology.big_m {
        BigMPolicy::Fixed { value } => Ok(value),
        BigMPolicy::CapacityDerived { safety_margin } => {
            let inverter = ConversionDevice::battery_inverter();
            let max_units = ctx.params.positive(Param::BatteryInverterMaxUnits, &Coord::default())?;
            let max_capacity = inverter.active_existing_capacity(ctx, year)?
                + max_units * inverter.nominal_capacity(ctx)?;
            Ok(safety_margin * max_capacity)
        }
    }
}

/// Energy charged to or discharged from the battery in one period of `year`
pub fn battery_flow(ctx: &BuildContext, year: u32) -> Result<f64, BuildError> {
    match ctx.topology.big_m {
        BigMPolicy::Fixed { value } => Ok(value),
        BigMPolicy::CapacityDerived { safety_margin } => {
            let scalar = Coord::default();
            let max_units = ctx.params.positive(Param::BatteryMaxUnits, &scalar)?;
            let nominal = ctx.params.get(Param::BatteryNominalCapacity, &scalar)?;
            let charge_time = ctx.params.positive(Param::BatteryMaximumChargeTime, &scalar)?;
            let discharge_time =
                ctx.params.positive(Param::BatteryMaximumDischargeTime, &scalar)?;
            let max_capacity =
                max_units * nominal + ExistingCapacity::battery().active(ctx, year)?;
            Ok(safety_margin * max_capacity / charge_time.min(discharge_time))
        }
    }
}

/// Energy bought from or sold to the grid in one period
pub fn grid_flow(ctx: &BuildContext) -> Result<f64, BuildError> {
    match ctx.topology.big_m {
        BigMPolicy::Fixed { value } => Ok(value),
        BigMPolicy::CapacityDerived { safety_margin } => {
            let max_power = ctx.params.positive(Param::GridMaximumPower, &Coord::default())?;
            Ok(safety_margin * max_power)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{add_brownfield, project, with_context};
    use crate::project::Project;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn capacity_derived(project: Project) {
        let params = &project.parameters;
        let scalar = Coord::default();
        let get = |param| params.get(param, &scalar).unwrap();

        let expected_dc = 1.1
            * get(Param::BatteryInverterMaxUnits)
            * get(Param::BatteryInverterNominalCapacity);
        let expected_battery = 1.1 * get(Param::BatteryMaxUnits) * get(Param::BatteryNominalCapacity)
            / get(Param::BatteryMaximumChargeTime).min(get(Param::BatteryMaximumDischargeTime));

        with_context(&project, |ctx| {
            assert_approx_eq!(f64, dc_system(ctx, 2025).unwrap(), expected_dc);
            assert_approx_eq!(f64, battery_flow(ctx, 2025).unwrap(), expected_battery);
        });
    }

    #[rstest]
    fn battery_flow_covers_existing_bank(mut project: Project) {
        let greenfield = with_context(&project, |ctx| battery_flow(ctx, 2025).unwrap());
        add_brownfield(&mut project, 30.0, 0.0);
        let scalar = Coord::default();
        let get = |param| project.parameters.get(param, &scalar).unwrap();
        let extra = 1.1 * 30.0
            / get(Param::BatteryMaximumChargeTime).min(get(Param::BatteryMaximumDischargeTime));

        with_context(&project, |ctx| {
            assert_approx_eq!(f64, battery_flow(ctx, 2025).unwrap(), greenfield + extra);
        });
    }

    #[rstest]
    fn fixed(mut project: Project) {
        project.config.advanced.big_m = BigMPolicy::Fixed { value: 1e6 };
        with_context(&project, |ctx| {
            assert_eq!(dc_system(ctx, 2025).unwrap(), 1e6);
            assert_eq!(battery_flow(ctx, 2025).unwrap(), 1e6);
            assert_eq!(grid_flow(ctx).unwrap(), 1e6);
        });
    }

    #[rstest]
    fn grid_without_maximum_power(project: Project) {
        with_context(&project, |ctx| {
            assert_eq!(
                grid_flow(ctx),
                Err(BuildError::MissingParameter {
                    param: Param::GridMaximumPower,
                    coord: Coord::default()
                })
            );
        });
    }
}
