//! `beadctl workflow show` — workflow execution state for a bead.
//! `bf_workflow::execution::WorkflowEngine` keeps execution state in memory
//! only, owned by whichever process is driving it, so this reads the same
//! `workflow_node`/`workflow_status`/`redispatch_requested` keys
//! `bf_workflow::execution::advance` writes back onto the bead's own
//! context via a `ContextPatch` effect.

use bf_core::types::context_keys;

use crate::context::AppContext;

use super::print_json;

pub async fn show(ctx: &AppContext, bead_id: &str, json: bool) -> anyhow::Result<()> {
    let bead = ctx.store.get(bead_id).await?.ok_or_else(|| anyhow::anyhow!("no bead with id {bead_id}"))?;

    let node = bead.context.get("workflow_node").cloned();
    let status = bead.context.get("workflow_status").cloned();
    let redispatch = bead.context.get(context_keys::REDISPATCH_REQUESTED).cloned();

    if json {
        print_json(&serde_json::json!({
            "bead_id": bead_id,
            "workflow_node": node,
            "workflow_status": status,
            "redispatch_requested": redispatch,
        }))?;
    } else if node.is_none() && status.is_none() {
        println!("{bead_id} has no recorded workflow state");
    } else {
        println!("workflow state for {bead_id}");
        println!("  node:               {}", node.as_deref().unwrap_or("-"));
        println!("  status:             {}", status.as_deref().unwrap_or("-"));
        println!("  redispatch pending: {}", redispatch.as_deref().unwrap_or("false"));
    }
    Ok(())
}
