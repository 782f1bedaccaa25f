//! `beadctl worker list` — worker status. `bf_agents::pool::WorkerPool` is
//! an in-memory structure owned by whichever process is running the
//! dispatcher loop; this binary opens no sockets to reach a live one, so it
//! derives a worker view from the bead store instead: every bead currently
//! `in_progress` and assigned to someone is one worker's current job.

use serde::Serialize;

use crate::context::AppContext;
use bf_core::bead_store::BeadFilter;
use bf_core::types::BeadStatus;

use super::print_json;

#[derive(Serialize)]
struct WorkerView {
    agent_id: String,
    current_bead: String,
    bead_title: String,
    project_id: String,
}

pub async fn list(ctx: &AppContext, project_id: Option<String>, json: bool) -> anyhow::Result<()> {
    let working = ctx
        .store
        .list(BeadFilter {
            project_id,
            status: Some(BeadStatus::InProgress),
            ..Default::default()
        })
        .await?;

    let views: Vec<WorkerView> = working
        .into_iter()
        .filter_map(|bead| {
            bead.assigned_to.clone().map(|agent_id| WorkerView {
                agent_id,
                current_bead: bead.id,
                bead_title: bead.title,
                project_id: bead.project_id,
            })
        })
        .collect();

    if json {
        print_json(&views)?;
    } else if views.is_empty() {
        println!("no workers currently assigned a bead");
    } else {
        println!("this is a derived view: it shows assigned in-progress beads, not live pool state from a running `beadctl run`");
        for w in &views {
            println!("{:<14} {:<10} {}", w.agent_id, w.current_bead, w.bead_title);
        }
    }
    Ok(())
}
