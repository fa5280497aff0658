//! Sizing of conversion devices: renewable inverters, the battery inverter, generator rectifiers
//! and the grid transformer.
//!
//! The energy passing through a device in any period cannot exceed its installed capacity, which
//! is the newly built units plus, for brownfield projects, the existing capacity for as long as it
//! is within its lifetime.
use super::dispatch::renewable_net_production;
use super::existing::ExistingCapacity;
use super::variables::{BatteryConversion, BatteryVariables};
use super::{BuildContext, BuildError, build_rows};
use crate::id::{GeneratorID, RenewableID};
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch, LinExpr, VarId};
use crate::sets::{Coord, TimeKey};
use log::debug;

/// A device converting energy between a technology and the AC bus
pub(super) struct ConversionDevice {
    nominal_capacity: Param,
    coord: Coord,
    existing: ExistingCapacity,
}

impl ConversionDevice {
    /// The inverter of a renewable source
    pub fn renewable_inverter(id: &RenewableID) -> Self {
        Self {
            nominal_capacity: Param::ResInverterNominalCapacity,
            coord: Coord::default().with_renewable(id),
            existing: ExistingCapacity::renewable_inverter(id),
        }
    }

    /// The battery inverter
    pub fn battery_inverter() -> Self {
        Self {
            nominal_capacity: Param::BatteryInverterNominalCapacity,
            coord: Coord::default(),
            existing: ExistingCapacity::battery_inverter(),
        }
    }

    /// The rectifier of a generator type
    pub fn generator_rectifier(id: &GeneratorID) -> Self {
        Self {
            nominal_capacity: Param::GeneratorRectifierNominalCapacity,
            coord: Coord::default().with_generator(id),
            existing: ExistingCapacity::generator_rectifier(id),
        }
    }

    /// The grid transformer
    pub fn grid_transformer() -> Self {
        Self {
            nominal_capacity: Param::GridTransformerNominalCapacity,
            coord: Coord::default(),
            existing: ExistingCapacity::grid_transformer(),
        }
    }

    /// The capacity of a single unit
    pub fn nominal_capacity(&self, ctx: &BuildContext) -> Result<f64, BuildError> {
        ctx.params.get(self.nominal_capacity, &self.coord)
    }

    /// Existing capacity still within its lifetime in `year`
    pub fn active_existing_capacity(
        &self,
        ctx: &BuildContext,
        year: u32,
    ) -> Result<f64, BuildError> {
        self.existing.active(ctx, year)
    }

    /// Installed capacity in `year`, given the units built by then
    pub fn installed_capacity(
        &self,
        ctx: &BuildContext,
        units: VarId,
        year: u32,
    ) -> Result<LinExpr, BuildError> {
        let nominal = self.nominal_capacity(ctx)?;
        Ok(nominal * units + self.active_existing_capacity(ctx, year)?)
    }
}

/// Energy leaving and entering the battery inverter's AC side.
///
/// With a shared inverter both directions come from the signed DC system energy.
fn battery_inverter_flows(
    battery: &BatteryVariables,
    key: &TimeKey,
) -> Result<(LinExpr, LinExpr), BuildError> {
    Ok(match &battery.conversion {
        BatteryConversion::IndependentInverter { .. } => (
            battery.outflow.get(key)?.into(),
            battery.inflow.get(key)?.into(),
        ),
        BatteryConversion::SharedInverter(dc) => {
            let energy = dc.energy.get(key)?;
            (energy.into(), -LinExpr::from(energy))
        }
    })
}

/// Build the sizing constraints for every conversion device
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    let sets = ctx.sets;
    let vars = ctx.vars;

    for &year in &sets.years {
        let step = sets.step_for_year(year);
        let time_keys = || sets.iter_year_time_keys(year);

        for id in &ctx.topology.own_inverter_sources {
            let inverter = ConversionDevice::renewable_inverter(id);
            let units = vars.renewables.inverter_units.get(&(step, id.clone()))?;
            let capacity = inverter.installed_capacity(ctx, units, year)?;
            let rows = build_rows(time_keys().map(|key| (key, id.clone())), |(key, id)| {
                Ok(Constraint::leq(
                    renewable_net_production(ctx, *key, id)?,
                    capacity.clone(),
                ))
            })?;
            batch.add(format!("Renewable Inverter Size - {id} - Year {year}"), rows);
        }

        if let Some(battery) = &vars.battery {
            let capacity = ConversionDevice::battery_inverter().installed_capacity(
                ctx,
                battery.inverter_units.get(&step)?,
                year,
            )?;
            let rows = build_rows(time_keys(), |key| {
                let (outflow, _) = battery_inverter_flows(battery, key)?;
                Ok(Constraint::leq(outflow, capacity.clone()))
            })?;
            batch.add(format!("Battery Inverter Size Outflow - Year {year}"), rows);
            let rows = build_rows(time_keys(), |key| {
                let (_, inflow) = battery_inverter_flows(battery, key)?;
                Ok(Constraint::leq(inflow, capacity.clone()))
            })?;
            batch.add(format!("Battery Inverter Size Inflow - Year {year}"), rows);
        }

        if let Some(generators) = &vars.generators {
            for id in &sets.generators {
                let rectifier = ConversionDevice::generator_rectifier(id);
                let capacity = rectifier.installed_capacity(
                    ctx,
                    generators.rectifier_units.get(&(step, id.clone()))?,
                    year,
                )?;
                let rows = build_rows(time_keys().map(|key| (key, id.clone())), |key| {
                    Ok(Constraint::leq(
                        generators.production.get(key)?,
                        capacity.clone(),
                    ))
                })?;
                batch.add(format!("Generator Rectifier Size - {id} - Year {year}"), rows);
            }
        }

        if let Some(grid) = &vars.grid {
            let capacity = ConversionDevice::grid_transformer().installed_capacity(
                ctx,
                grid.transformer_units.get(&step)?,
                year,
            )?;
            let rows = build_rows(time_keys(), |key| {
                Ok(Constraint::leq(grid.from_grid.get(key)?, capacity.clone()))
            })?;
            batch.add(format!("Grid Transformer Size Import - Year {year}"), rows);

            if let Some(export) = &grid.export {
                let rows = build_rows(time_keys(), |key| {
                    Ok(Constraint::leq(export.to_grid.get(key)?, capacity.clone()))
                })?;
                batch.add(format!("Grid Transformer Size Export - Year {year}"), rows);
            }
        }
    }

    debug!("Built {} transformation sizing blocks", batch.len());
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{
        DEVICE_LIFETIME, EXISTING_DEVICE_CAPACITY, add_brownfield, add_generator, add_grid,
        extend_horizon, project,
    };
    use crate::formulation::build_model;
    use crate::formulation::variables::names;
    use crate::project::{GridConnectionType, Project, ResConnection};
    use rstest::rstest;

    fn battery_inverter_rhs(project: &Project) -> f64 {
        let model = build_model(project).unwrap();
        let block = model
            .problem
            .constraint("Battery Inverter Size Outflow - Year 2025")
            .unwrap();
        let (_, constraint) = block.rows().next().unwrap();
        let units = model.problem.family(names::BATTERY_INVERTER_UNITS).unwrap();
        let (_, &units) = units.columns.first().unwrap();
        assert_eq!(
            constraint.coefficient(units),
            -project
                .parameters
                .get(Param::BatteryInverterNominalCapacity, &Coord::default())
                .unwrap()
        );
        constraint.rhs()
    }

    #[rstest]
    fn greenfield_ignores_existing_capacity(project: Project) {
        assert_eq!(battery_inverter_rhs(&project), 0.0);
    }

    #[rstest]
    #[case(5.0, EXISTING_DEVICE_CAPACITY)]
    #[case(DEVICE_LIFETIME, EXISTING_DEVICE_CAPACITY)]
    #[case(DEVICE_LIFETIME + 1.0, 0.0)]
    fn brownfield_existing_capacity_until_expiry(
        mut project: Project,
        #[case] existing_years: f64,
        #[case] expected: f64,
    ) {
        add_brownfield(&mut project, 0.0, existing_years);
        assert_eq!(battery_inverter_rhs(&project), expected);
    }

    #[rstest]
    fn every_device_drops_existing_capacity_in_the_year_it_expires(mut project: Project) {
        add_generator(&mut project, "Diesel");
        add_grid(&mut project, GridConnectionType::PurchaseSell);
        // Devices are 8 years into a 10 year life, so the last active year is 2027
        add_brownfield(&mut project, 0.0, DEVICE_LIFETIME - 2.0);
        extend_horizon(&mut project, 5, 1);
        let model = build_model(&project).unwrap();

        for year in 2025..=2029 {
            let expected = if year <= 2027 {
                EXISTING_DEVICE_CAPACITY
            } else {
                0.0
            };
            for device in [
                "Renewable Inverter Size - PV",
                "Battery Inverter Size Outflow",
                "Battery Inverter Size Inflow",
                "Generator Rectifier Size - Diesel",
                "Grid Transformer Size Import",
                "Grid Transformer Size Export",
            ] {
                let name = format!("{device} - Year {year}");
                let block = model.problem.constraint(&name).unwrap();
                assert!(!block.is_empty());
                for (_, constraint) in block.rows() {
                    assert_eq!(constraint.rhs(), expected, "{name}");
                }
            }
        }
    }

    #[rstest]
    fn dc_coupled_source_has_no_inverter_sizing(mut project: Project) {
        project.config.renewables[0].connection = ResConnection::SharedBatteryInverter;
        let model = build_model(&project).unwrap();
        assert!(
            model
                .problem
                .constraint("Renewable Inverter Size - PV - Year 2025")
                .is_none()
        );

        // The shared inverter bounds the signed DC energy in both directions
        let inflow = model
            .problem
            .constraint("Battery Inverter Size Inflow - Year 2025")
            .unwrap();
        let energy = model.problem.family(names::DC_ENERGY).unwrap();
        for (coord, constraint) in inflow.rows() {
            assert_eq!(constraint.coefficient(energy.columns[coord]), -1.0);
        }
    }
}
