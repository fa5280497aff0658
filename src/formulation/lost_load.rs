//! Limits on unmet demand.
use super::{BuildContext, BuildError, build_rows};
use crate::parameter::Param;
use crate::problem::{Constraint, ConstraintBatch};
use crate::sets::Key;

/// Build the lost load limits, if lost load is allowed.
///
/// In each period at most the configured fraction of demand may go unmet.
pub fn build(ctx: &BuildContext) -> Result<ConstraintBatch, BuildError> {
    let mut batch = ConstraintBatch::default();
    let Some(lost_load) = ctx.topology.lost_load else {
        return Ok(batch);
    };

    let vars = ctx.vars.lost_load()?;
    for &year in &ctx.sets.years {
        let rows = build_rows(ctx.sets.iter_year_time_keys(year), |key| {
            let demand = ctx.params.get(Param::Demand, &key.coord())?;
            Ok(Constraint::leq(vars.get(key)?, lost_load.fraction * demand))
        })?;
        batch.add(format!("Lost Load Constraint - Year {year}"), rows);
    }

    Ok(batch)
}
