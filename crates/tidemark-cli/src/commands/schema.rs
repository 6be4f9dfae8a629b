//! Schema command

use crate::output::print_json;
use crate::AppContext;

/// Print the target store's current schema and the step that produced it
pub async fn run(ctx: &AppContext) -> anyhow::Result<()> {
    let schema = ctx.target.load().await?;
    tracing::info!("Target schema has {} collection(s)", schema.collections.len());

    match ctx.target.last_step().await? {
        Some(step) => tracing::info!("Last committed step: {} {}", step.direction, step.key),
        None => tracing::info!("No step has been committed yet"),
    }

    print_json(&schema)
}
