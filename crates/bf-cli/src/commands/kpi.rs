//! `beadctl kpi show` — a snapshot of a project's bead-store KPIs.
//! Grounded in `at-cli::commands::status::run`'s KPI printout.

use bf_core::kpi;

use crate::context::AppContext;

use super::print_json;

pub async fn show(ctx: &AppContext, project_id: &str, json: bool) -> anyhow::Result<()> {
    let snapshot = kpi::compute(&ctx.store, project_id).await?;
    if json {
        print_json(&snapshot)?;
    } else {
        println!("kpi snapshot for {project_id}");
        println!("{}", "-".repeat(40));
        println!("total beads:    {}", snapshot.total_beads);
        println!("  open:         {}", snapshot.open);
        println!("  in_progress:  {}", snapshot.in_progress);
        println!("  blocked:      {}", snapshot.blocked);
        println!("  closed:       {}", snapshot.closed);
        println!("  escalated:    {}", snapshot.escalated);
        println!("active workers: {}", snapshot.active_workers);
        println!("mean cycle time: {:.1}s", snapshot.mean_cycle_time_secs);
        println!("snapshot at:    {}", snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}
