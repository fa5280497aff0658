//! Minimum share of renewable energy.
//!
//! Over the whole horizon of each scenario, renewable energy (net of curtailment) must make up at
//! least the required share of the energy produced by renewables, generators and grid imports.
use super::dispatch::renewable_net_production;
use super::{BuildContext, BuildError, build_rows};
use crate::problem::{Constraint, ConstraintBatch, LinExpr};
use crate::sets::{Scenario, TimeKey};

/// Build the renewable penetration constraint, if a minimum share is required
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    let Some(share) = ctx.topology.min_renewable_penetration else {
        return Ok(batch);
    };

    let rows = build_rows(ctx.sets.scenarios.iter().copied(), |scenario| {
        let (renewable, other) = scenario_totals(ctx, *scenario)?;
        Ok(Constraint::geq((1.0 - share) * renewable, share * other))
    })?;
    batch.add("Renewable Penetration Constraint", rows);

    Ok(batch)
}

/// Renewable and non-renewable energy produced over a scenario's horizon
fn scenario_totals(
    ctx: &BuildContext,
    scenario: Scenario,
) -> Result<(LinExpr, LinExpr), BuildError> {
    let vars = ctx.vars;
    let mut renewable = LinExpr::default();
    let mut other = LinExpr::default();

    let keys = ctx
        .sets
        .iter_time_keys()
        .filter(|key| key.scenario == scenario);
    for key in keys {
        renewable += renewable_production(ctx, key)?;
        if let Some(generators) = &vars.generators {
            for id in &ctx.sets.generators {
                other += generators.production.get(&(key, id.clone()))?;
            }
        }
        if let Some(grid) = &vars.grid {
            other += grid.from_grid.get(&key)?;
        }
    }

    Ok((renewable, other))
}

fn renewable_production(ctx: &BuildContext, key: TimeKey) -> Result<LinExpr, BuildError> {
    ctx.sets
        .renewables
        .iter()
        .map(|id| renewable_net_production(ctx, key, id))
        .sum()
}
