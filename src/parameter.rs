//! The parameter table: numeric inputs keyed by parameter name and coordinate.
//!
//! Every parameter has a fixed set of dimensions. A value can only be stored at a coordinate with
//! exactly those dimensions, and looking up a coordinate which was never stored is an error rather
//! than a silent default.
use crate::formulation::BuildError;
use crate::sets::{Coord, Dim};
use anyhow::{Result, ensure};
use indexmap::IndexMap;

/// The name of a model parameter
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Param {
    Demand,
    ScenarioWeight,
    DiscountRate,

    ResNominalCapacity,
    ResUnitEnergyAvailability,
    ResSpecificInvestmentCost,
    ResSpecificOmCost,
    ResLifetime,
    ResExistingCapacity,
    ResExistingYears,
    ResInverterEfficiency,
    ResInverterNominalCapacity,
    ResInverterCost,
    ResInverterExistingCapacity,
    ResInverterExistingYears,
    ResInverterLifetime,
    #[strum(serialize = "RES_UNIT_CO2_EMISSION")]
    ResUnitCo2Emission,
    ResSpecificArea,

    BatteryNominalCapacity,
    BatterySpecificInvestmentCost,
    BatterySpecificElectronicInvestmentCost,
    BatterySpecificOmCost,
    BatteryCycles,
    BatteryExpectedLifetime,
    BatteryExistingCapacity,
    BatteryExistingYears,
    BatteryChargeEfficiency,
    BatteryDischargeEfficiency,
    BatteryDepthOfDischarge,
    BatteryMaximumChargeTime,
    BatteryMaximumDischargeTime,
    BatteryInverterEfficiencyDcAc,
    BatteryInverterEfficiencyAcDc,
    BatteryInverterNominalCapacity,
    BatteryInverterCost,
    BatteryInverterExistingCapacity,
    BatteryInverterExistingYears,
    BatteryInverterLifetime,
    BatteryInverterMaxUnits,
    BatteryMaxUnits,
    #[strum(serialize = "BATTERY_UNIT_CO2_EMISSION")]
    BatteryUnitCo2Emission,

    GeneratorNominalCapacity,
    GeneratorSpecificInvestmentCost,
    GeneratorSpecificOmCost,
    GeneratorLifetime,
    GeneratorExistingCapacity,
    GeneratorExistingYears,
    GeneratorFuelCost,
    GeneratorMinimumLoad,
    GeneratorRectifierEfficiency,
    GeneratorRectifierNominalCapacity,
    GeneratorRectifierCost,
    GeneratorRectifierExistingCapacity,
    GeneratorRectifierExistingYears,
    GeneratorRectifierLifetime,
    #[strum(serialize = "GENERATOR_UNIT_CO2_EMISSION")]
    GeneratorUnitCo2Emission,
    #[strum(serialize = "GENERATOR_FUEL_CO2_EMISSION")]
    GeneratorFuelCo2Emission,

    GridToMicrogridEfficiency,
    MicrogridToGridEfficiency,
    GridTransformerNominalCapacity,
    GridTransformerCost,
    GridTransformerExistingCapacity,
    GridTransformerExistingYears,
    GridTransformerLifetime,
    GridMaximumPower,
    GridAvailability,
    GridPurchasePrice,
    GridSellPrice,
    #[strum(serialize = "GRID_CO2_EMISSION")]
    GridCo2Emission,
}

impl Param {
    /// The dimensions a coordinate for this parameter must have
    pub fn dims(self) -> &'static [Dim] {
        use Param::*;
        match self {
            Demand | GridAvailability => &[Dim::Scenario, Dim::Year, Dim::Period],
            ScenarioWeight => &[Dim::Scenario],
            ResUnitEnergyAvailability => &[Dim::Scenario, Dim::Period, Dim::Renewable],
            ResNominalCapacity
            | ResSpecificInvestmentCost
            | ResSpecificOmCost
            | ResLifetime
            | ResExistingCapacity
            | ResExistingYears
            | ResInverterEfficiency
            | ResInverterNominalCapacity
            | ResInverterCost
            | ResInverterExistingCapacity
            | ResInverterExistingYears
            | ResInverterLifetime
            | ResUnitCo2Emission
            | ResSpecificArea => &[Dim::Renewable],
            GeneratorNominalCapacity
            | GeneratorSpecificInvestmentCost
            | GeneratorSpecificOmCost
            | GeneratorLifetime
            | GeneratorExistingCapacity
            | GeneratorExistingYears
            | GeneratorFuelCost
            | GeneratorMinimumLoad
            | GeneratorRectifierEfficiency
            | GeneratorRectifierNominalCapacity
            | GeneratorRectifierCost
            | GeneratorRectifierExistingCapacity
            | GeneratorRectifierExistingYears
            | GeneratorRectifierLifetime
            | GeneratorUnitCo2Emission
            | GeneratorFuelCo2Emission => &[Dim::Generator],
            _ => &[],
        }
    }
}

/// Parameter values for a project
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParameterTable(IndexMap<(Param, Coord), f64>);

impl ParameterTable {
    /// Store a value.
    ///
    /// Fails if the coordinate doesn't match the parameter's dimensions, the value isn't finite or
    /// a value is already stored for this coordinate.
    pub fn insert(&mut self, param: Param, coord: Coord, value: f64) -> Result<()> {
        ensure!(
            coord.dims() == param.dims(),
            "{param} must be indexed by [{}] but got ({coord})",
            param.dims().iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
        ensure!(value.is_finite(), "{param} ({coord}) must be a finite number");

        let existing = self.0.insert((param, coord.clone()), value);
        ensure!(
            existing.is_none(),
            "{param} ({coord}) is defined more than once"
        );

        Ok(())
    }

    /// Look up a value
    pub fn get(&self, param: Param, coord: &Coord) -> Result<f64, BuildError> {
        self.0
            .get(&(param, coord.clone()))
            .copied()
            .ok_or_else(|| BuildError::MissingParameter {
                param,
                coord: coord.clone(),
            })
    }

    /// Look up a parameter without dimensions
    pub fn scalar(&self, param: Param) -> Result<f64, BuildError> {
        self.get(param, &Coord::default())
    }

    /// Look up an efficiency, which must lie in (0, 1]
    pub fn efficiency(&self, param: Param, coord: &Coord) -> Result<f64, BuildError> {
        let value = self.get(param, coord)?;
        if value > 0.0 && value <= 1.0 {
            Ok(value)
        } else {
            Err(BuildError::InvalidParameter {
                param,
                coord: coord.clone(),
                reason: "efficiencies must be greater than zero and no more than one",
            })
        }
    }

    /// Look up a share or availability, which must lie in [0, 1]
    pub fn proportion(&self, param: Param, coord: &Coord) -> Result<f64, BuildError> {
        let value = self.get(param, coord)?;
        if (0.0..=1.0).contains(&value) {
            Ok(value)
        } else {
            Err(BuildError::InvalidParameter {
                param,
                coord: coord.clone(),
                reason: "value must be between zero and one",
            })
        }
    }

    /// Look up a value which must be strictly positive
    pub fn positive(&self, param: Param, coord: &Coord) -> Result<f64, BuildError> {
        let value = self.get(param, coord)?;
        if value > 0.0 {
            Ok(value)
        } else {
            Err(BuildError::InvalidParameter {
                param,
                coord: coord.clone(),
                reason: "value must be greater than zero",
            })
        }
    }

    /// Iterate over stored values in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (Param, &Coord, f64)> {
        self.0
            .iter()
            .map(|((param, coord), value)| (*param, coord, *value))
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use crate::id::RenewableID;
    use crate::sets::Scenario;
    use rstest::rstest;
    use std::str::FromStr;

    #[rstest]
    #[case("DEMAND", Param::Demand)]
    #[case("BATTERY_INVERTER_EFFICIENCY_DC_AC", Param::BatteryInverterEfficiencyDcAc)]
    #[case("RES_UNIT_CO2_EMISSION", Param::ResUnitCo2Emission)]
    #[case("MICROGRID_TO_GRID_EFFICIENCY", Param::MicrogridToGridEfficiency)]
    fn param_names(#[case] name: &str, #[case] param: Param) {
        assert_eq!(Param::from_str(name).unwrap(), param);
        assert_eq!(param.to_string(), name);
    }

    #[test]
    fn insert_checks_dims() {
        let mut table = ParameterTable::default();
        let coord = Coord::default().with_renewable(&RenewableID::from("PV"));
        table
            .insert(Param::ResInverterEfficiency, coord.clone(), 0.95)
            .unwrap();
        assert_error!(
            table.insert(Param::DiscountRate, coord.clone(), 0.05),
            "DISCOUNT_RATE must be indexed by [] but got (renewable=PV)"
        );
        assert_error!(
            table.insert(Param::ResInverterEfficiency, coord, 0.9),
            "RES_INVERTER_EFFICIENCY (renewable=PV) is defined more than once"
        );
    }

    #[test]
    fn missing_coordinate_is_an_error() {
        let mut table = ParameterTable::default();
        let coord = Coord::default().with_scenario(Scenario(0));
        table.insert(Param::ScenarioWeight, coord, 1.0).unwrap();

        let missing = Coord::default().with_scenario(Scenario(1));
        assert_eq!(
            table.get(Param::ScenarioWeight, &missing),
            Err(BuildError::MissingParameter {
                param: Param::ScenarioWeight,
                coord: missing
            })
        );
    }

    #[rstest]
    #[case(0.95, true)]
    #[case(1.0, true)]
    #[case(0.0, false)]
    #[case(1.2, false)]
    fn efficiency_range(#[case] value: f64, #[case] valid: bool) {
        let mut table = ParameterTable::default();
        table
            .insert(Param::GridToMicrogridEfficiency, Coord::default(), value)
            .unwrap();
        assert_eq!(
            table
                .efficiency(Param::GridToMicrogridEfficiency, &Coord::default())
                .is_ok(),
            valid
        );
    }

    #[rstest]
    #[case(0.0, true)]
    #[case(0.5, true)]
    #[case(1.0, true)]
    #[case(-0.1, false)]
    #[case(2.0, false)]
    fn proportion_range(#[case] value: f64, #[case] valid: bool) {
        let mut table = ParameterTable::default();
        let coord = Coord::default()
            .with_scenario(Scenario(0))
            .with_year(2025)
            .with_period(0);
        table
            .insert(Param::GridAvailability, coord.clone(), value)
            .unwrap();
        assert_eq!(
            table.proportion(Param::GridAvailability, &coord).is_ok(),
            valid
        );
    }
}
