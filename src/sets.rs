//! The index space of a project: scenarios, years, investment steps, periods and technology IDs.
//!
//! Everything that is indexed (parameters, variables, constraint rows) is addressed through
//! [`Coord`], which has one optional slot per dimension. The key types used by the variable
//! registry implement [`Key`] so they can always be turned back into a [`Coord`].
use crate::id::{GeneratorID, RenewableID};
use anyhow::{Result, ensure};
use indexmap::IndexSet;
use itertools::iproduct;
use std::fmt;
use std::hash::Hash;

/// A scenario index (scenarios are numbered from zero)
#[derive(Clone, Copy, Debug, derive_more::Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scenario(pub u32);

/// An investment step (steps are numbered from one)
#[derive(Clone, Copy, Debug, derive_more::Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Step(pub u32);

/// A dimension of the index space
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Dim {
    /// Scenario
    Scenario,
    /// Calendar year
    Year,
    /// Investment step
    Step,
    /// Intra-year period
    Period,
    /// Renewable source
    Renewable,
    /// Generator type
    Generator,
}

/// A position in the index space.
///
/// Unused dimensions are `None`, so a coordinate for a scalar is `Coord::default()`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    /// Scenario
    pub scenario: Option<Scenario>,
    /// Calendar year
    pub year: Option<u32>,
    /// Investment step
    pub step: Option<Step>,
    /// Intra-year period
    pub period: Option<u32>,
    /// Renewable source
    pub renewable: Option<RenewableID>,
    /// Generator type
    pub generator: Option<GeneratorID>,
}

impl Coord {
    /// Set the scenario
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenario = Some(scenario);
        self
    }

    /// Set the year
    pub fn with_year(mut self, year: u32) -> Self {
        self.year = Some(year);
        self
    }

    /// Set the step
    pub fn with_step(mut self, step: Step) -> Self {
        self.step = Some(step);
        self
    }

    /// Set the period
    pub fn with_period(mut self, period: u32) -> Self {
        self.period = Some(period);
        self
    }

    /// Set the renewable source
    pub fn with_renewable(mut self, id: &RenewableID) -> Self {
        self.renewable = Some(id.clone());
        self
    }

    /// Set the generator type
    pub fn with_generator(mut self, id: &GeneratorID) -> Self {
        self.generator = Some(id.clone());
        self
    }

    /// The dimensions which are set, in canonical order
    pub fn dims(&self) -> Vec<Dim> {
        [
            (self.scenario.is_some(), Dim::Scenario),
            (self.year.is_some(), Dim::Year),
            (self.step.is_some(), Dim::Step),
            (self.period.is_some(), Dim::Period),
            (self.renewable.is_some(), Dim::Renewable),
            (self.generator.is_some(), Dim::Generator),
        ]
        .into_iter()
        .filter_map(|(set, dim)| set.then_some(dim))
        .collect()
    }

    /// Combine two coordinates with disjoint dimensions
    fn merge(self, other: Coord) -> Coord {
        Coord {
            scenario: self.scenario.or(other.scenario),
            year: self.year.or(other.year),
            step: self.step.or(other.step),
            period: self.period.or(other.period),
            renewable: self.renewable.or(other.renewable),
            generator: self.generator.or(other.generator),
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(scenario) = self.scenario {
            parts.push(format!("scenario={scenario}"));
        }
        if let Some(year) = self.year {
            parts.push(format!("year={year}"));
        }
        if let Some(step) = self.step {
            parts.push(format!("step={step}"));
        }
        if let Some(period) = self.period {
            parts.push(format!("period={period}"));
        }
        if let Some(id) = &self.renewable {
            parts.push(format!("renewable={id}"));
        }
        if let Some(id) = &self.generator {
            parts.push(format!("generator={id}"));
        }

        if parts.is_empty() {
            write!(f, "()")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// A key for an indexed family of variables
pub trait Key: Clone + Eq + Hash + fmt::Debug {
    /// The coordinate this key refers to
    fn coord(&self) -> Coord;
}

impl Key for () {
    fn coord(&self) -> Coord {
        Coord::default()
    }
}

impl Key for Scenario {
    fn coord(&self) -> Coord {
        Coord::default().with_scenario(*self)
    }
}

impl Key for Step {
    fn coord(&self) -> Coord {
        Coord::default().with_step(*self)
    }
}

impl Key for RenewableID {
    fn coord(&self) -> Coord {
        Coord::default().with_renewable(self)
    }
}

impl Key for GeneratorID {
    fn coord(&self) -> Coord {
        Coord::default().with_generator(self)
    }
}

impl<A: Key, B: Key> Key for (A, B) {
    fn coord(&self) -> Coord {
        self.0.coord().merge(self.1.coord())
    }
}

/// An operational time slot: a period of a year in a scenario
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeKey {
    /// Scenario
    pub scenario: Scenario,
    /// Calendar year
    pub year: u32,
    /// Intra-year period
    pub period: u32,
}

impl Key for TimeKey {
    fn coord(&self) -> Coord {
        Coord::default()
            .with_scenario(self.scenario)
            .with_year(self.year)
            .with_period(self.period)
    }
}

/// A period of an investment step in a scenario.
///
/// Renewable production only depends on installed units, so it is indexed by step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepTimeKey {
    /// Scenario
    pub scenario: Scenario,
    /// Investment step
    pub step: Step,
    /// Intra-year period
    pub period: u32,
}

impl Key for StepTimeKey {
    fn coord(&self) -> Coord {
        Coord::default()
            .with_scenario(self.scenario)
            .with_step(self.step)
            .with_period(self.period)
    }
}

/// The finite sets spanning a project
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSets {
    /// Scenarios, numbered from zero
    pub scenarios: Vec<Scenario>,
    /// Contiguous calendar years
    pub years: Vec<u32>,
    /// Investment steps, numbered from one
    pub steps: Vec<Step>,
    /// Intra-year periods, numbered from zero
    pub periods: Vec<u32>,
    /// Renewable sources in declaration order
    pub renewables: IndexSet<RenewableID>,
    /// Generator types in declaration order
    pub generators: IndexSet<GeneratorID>,
    step_duration: u32,
}

impl IndexSets {
    /// Create the index sets for a project.
    ///
    /// # Arguments
    ///
    /// * `num_scenarios` - Number of scenarios
    /// * `start_year` - First year of the horizon
    /// * `num_years` - Number of years in the horizon
    /// * `step_duration` - Number of years in each investment step
    /// * `num_periods` - Number of periods in each year
    /// * `renewables` - Renewable source IDs
    /// * `generators` - Generator type IDs
    pub fn new(
        num_scenarios: u32,
        start_year: u32,
        num_years: u32,
        step_duration: u32,
        num_periods: u32,
        renewables: IndexSet<RenewableID>,
        generators: IndexSet<GeneratorID>,
    ) -> Result<Self> {
        ensure!(num_scenarios > 0, "There must be at least one scenario");
        ensure!(num_years > 0, "There must be at least one year");
        ensure!(step_duration > 0, "Step duration must be at least one year");
        ensure!(num_periods > 0, "There must be at least one period");
        ensure!(
            !renewables.is_empty(),
            "At least one renewable source must be defined"
        );

        let num_steps = num_years.div_ceil(step_duration);
        Ok(Self {
            scenarios: (0..num_scenarios).map(Scenario).collect(),
            years: (start_year..start_year + num_years).collect(),
            steps: (1..=num_steps).map(Step).collect(),
            periods: (0..num_periods).collect(),
            renewables,
            generators,
            step_duration,
        })
    }

    /// The first year of the horizon
    pub fn first_year(&self) -> u32 {
        self.years[0]
    }

    /// Years elapsed since the start of the horizon
    pub fn elapsed_years(&self, year: u32) -> u32 {
        assert!(self.years.contains(&year), "Year {year} out of range");
        year - self.first_year()
    }

    /// The investment step which contains `year`
    pub fn step_for_year(&self, year: u32) -> Step {
        self.steps[(self.elapsed_years(year) / self.step_duration) as usize]
    }

    /// The first calendar year of an investment step
    pub fn first_year_of_step(&self, step: Step) -> u32 {
        self.first_year() + (step.0 - 1) * self.step_duration
    }

    /// The step before `step`, if any
    pub fn previous_step(&self, step: Step) -> Option<Step> {
        (step.0 > 1).then(|| Step(step.0 - 1))
    }

    /// The period before `period` within the same year, wrapping around at the start
    pub fn previous_period(&self, period: u32) -> u32 {
        if period == 0 {
            *self.periods.last().expect("Periods cannot be empty")
        } else {
            period - 1
        }
    }

    /// Iterate over all (scenario, period) combinations
    pub fn iter_scenario_periods(&self) -> impl Iterator<Item = (Scenario, u32)> + '_ {
        iproduct!(self.scenarios.iter().copied(), self.periods.iter().copied())
    }

    /// Iterate over every operational time slot
    pub fn iter_time_keys(&self) -> impl Iterator<Item = TimeKey> + '_ {
        iproduct!(
            self.scenarios.iter().copied(),
            self.years.iter().copied(),
            self.periods.iter().copied()
        )
        .map(|(scenario, year, period)| TimeKey {
            scenario,
            year,
            period,
        })
    }

    /// Iterate over the time slots of a single year
    pub fn iter_year_time_keys(&self, year: u32) -> impl Iterator<Item = TimeKey> + '_ {
        self.iter_scenario_periods()
            .map(move |(scenario, period)| TimeKey {
                scenario,
                year,
                period,
            })
    }

    /// Iterate over every (scenario, step, period) combination
    pub fn iter_step_time_keys(&self) -> impl Iterator<Item = StepTimeKey> + '_ {
        iproduct!(
            self.scenarios.iter().copied(),
            self.steps.iter().copied(),
            self.periods.iter().copied()
        )
        .map(|(scenario, step, period)| StepTimeKey {
            scenario,
            step,
            period,
        })
    }
}
