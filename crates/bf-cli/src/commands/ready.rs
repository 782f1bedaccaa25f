//! `beadctl ready` — the bead store's ready set for a project (§4.D: no
//! open `blocked_by` edges and not already assigned), the same query the
//! dispatcher's tick uses to build its candidate list.

use crate::context::AppContext;

use super::print_json;

pub async fn run(ctx: &AppContext, project_id: &str, json: bool) -> anyhow::Result<()> {
    let ready = ctx.store.ready(project_id).await?;
    if json {
        print_json(&ready)?;
    } else if ready.is_empty() {
        println!("no ready beads in {project_id}");
    } else {
        for bead in &ready {
            println!("{:<10} p{} {:<22} {}", bead.id, bead.priority, format!("{:?}", bead.bead_type), bead.title);
        }
    }
    Ok(())
}
