//! `beadctl lock list` — outstanding file locks for a project.

use crate::context::AppContext;

use super::print_json;

pub async fn list(ctx: &AppContext, project_id: &str, json: bool) -> anyhow::Result<()> {
    let locks = ctx.locks.list_for_project(project_id).await?;
    if json {
        print_json(&locks)?;
    } else if locks.is_empty() {
        println!("no locks held in {project_id}");
    } else {
        for lock in &locks {
            println!("{:<30} {:<14} {:<10} expires {}", lock.file_path, lock.agent_id, lock.bead_id, lock.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    Ok(())
}
