//! Capacity installed before the horizon starts.
//!
//! Existing capacity only counts in brownfield projects, and only in the years where
//! `existing_years + elapsed_years <= lifetime`. Expiry is decided separately for every
//! technology instance and year.
use super::{BuildContext, BuildError};
use crate::id::{GeneratorID, RenewableID};
use crate::parameter::Param;
use crate::sets::Coord;

/// The parameters describing one pre-installed asset
pub(super) struct ExistingCapacity {
    capacity: Param,
    years: Param,
    lifetime: Param,
    coord: Coord,
}

impl ExistingCapacity {
    /// A renewable source
    pub fn renewable(id: &RenewableID) -> Self {
        Self {
            capacity: Param::ResExistingCapacity,
            years: Param::ResExistingYears,
            lifetime: Param::ResLifetime,
            coord: Coord::default().with_renewable(id),
        }
    }

    /// The battery bank
    pub fn battery() -> Self {
        Self {
            capacity: Param::BatteryExistingCapacity,
            years: Param::BatteryExistingYears,
            lifetime: Param::BatteryExpectedLifetime,
            coord: Coord::default(),
        }
    }

    /// A generator type
    pub fn generator(id: &GeneratorID) -> Self {
        Self {
            capacity: Param::GeneratorExistingCapacity,
            years: Param::GeneratorExistingYears,
            lifetime: Param::GeneratorLifetime,
            coord: Coord::default().with_generator(id),
        }
    }

    /// The inverter of a renewable source
    pub fn renewable_inverter(id: &RenewableID) -> Self {
        Self {
            capacity: Param::ResInverterExistingCapacity,
            years: Param::ResInverterExistingYears,
            lifetime: Param::ResInverterLifetime,
            coord: Coord::default().with_renewable(id),
        }
    }

    /// The battery inverter
    pub fn battery_inverter() -> Self {
        Self {
            capacity: Param::BatteryInverterExistingCapacity,
            years: Param::BatteryInverterExistingYears,
            lifetime: Param::BatteryInverterLifetime,
            coord: Coord::default(),
        }
    }

    /// The rectifier of a generator type
    pub fn generator_rectifier(id: &GeneratorID) -> Self {
        Self {
            capacity: Param::GeneratorRectifierExistingCapacity,
            years: Param::GeneratorRectifierExistingYears,
            lifetime: Param::GeneratorRectifierLifetime,
            coord: Coord::default().with_generator(id),
        }
    }

    /// The grid transformer
    pub fn grid_transformer() -> Self {
        Self {
            capacity: Param::GridTransformerExistingCapacity,
            years: Param::GridTransformerExistingYears,
            lifetime: Param::GridTransformerLifetime,
            coord: Coord::default(),
        }
    }

    /// Existing capacity still within its lifetime in `year`.
    ///
    /// Always zero for greenfield projects, whose existing-capacity parameters are never read.
    pub fn active(&self, ctx: &BuildContext, year: u32) -> Result<f64, BuildError> {
        if !ctx.topology.brownfield {
            return Ok(0.0);
        }

        let existing_years = ctx.params.get(self.years, &self.coord)?;
        let lifetime = ctx.params.get(self.lifetime, &self.coord)?;
        if existing_years + f64::from(ctx.sets.elapsed_years(year)) <= lifetime {
            ctx.params.get(self.capacity, &self.coord)
        } else {
            Ok(0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{add_brownfield, extend_horizon, project, with_context};
    use crate::project::Project;
    use rstest::rstest;

    #[rstest]
    fn greenfield_has_no_existing_capacity(project: Project) {
        with_context(&project, |ctx| {
            assert_eq!(ExistingCapacity::battery().active(ctx, 2025).unwrap(), 0.0);
        });
    }

    #[rstest]
    fn technologies_expire_after_their_own_lifetime(mut project: Project) {
        // Installed 8 years ago: the battery lives 10 years and the PV array 20
        add_brownfield(&mut project, 30.0, 8.0);
        extend_horizon(&mut project, 5, 1);
        let pv = ExistingCapacity::renewable(&"PV".into());
        let battery = ExistingCapacity::battery();

        with_context(&project, |ctx| {
            for (year, battery_expected) in [(2025, 30.0), (2027, 30.0), (2028, 0.0), (2029, 0.0)] {
                assert_eq!(pv.active(ctx, year).unwrap(), 30.0);
                assert_eq!(battery.active(ctx, year).unwrap(), battery_expected);
            }
        });
    }

    #[rstest]
    fn brownfield_needs_existing_parameters(mut project: Project) {
        project.config.advanced.brownfield = true;
        with_context(&project, |ctx| {
            assert_eq!(
                ExistingCapacity::battery().active(ctx, 2025),
                Err(BuildError::MissingParameter {
                    param: Param::BatteryExistingYears,
                    coord: Coord::default()
                })
            );
        });
    }
}
