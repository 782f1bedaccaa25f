//! `beadctl bead` — create, list, and show beads. Grounded in
//! `at-cli::commands::sling::run`'s create shape and `status::run`'s
//! plain-text table printing, adapted from an HTTP call to a direct
//! `BeadStore` call since this binary has no daemon to talk to.

use std::collections::HashSet;

use anyhow::Context;
use bf_core::bead_store::{BeadFilter, BeadPatch};
use bf_core::types::{BeadStatus, BeadType};

use crate::context::AppContext;

use super::print_json;

pub async fn create(ctx: &AppContext, project_id: &str, prefix: &str, title: String, bead_type: BeadType, tags: Vec<String>, priority: Option<u8>, json: bool) -> anyhow::Result<()> {
    let id = ctx.store.create(project_id, prefix, title, bead_type).await.context("failed to create bead")?;

    if !tags.is_empty() || priority.is_some() {
        ctx.store
            .update(
                &id,
                BeadPatch {
                    tags: (!tags.is_empty()).then(|| tags.into_iter().collect::<HashSet<_>>()),
                    priority,
                    ..Default::default()
                },
            )
            .await
            .context("failed to apply initial tags/priority")?;
    }

    let bead = ctx.store.get(&id).await?.ok_or_else(|| anyhow::anyhow!("bead {id} vanished immediately after creation"))?;
    if json {
        print_json(&bead)?;
    } else {
        println!("created {id}");
        println!("  title: {}", bead.title);
        println!("  type:  {:?}", bead.bead_type);
        println!("  tags:  {}", bead.tags.iter().cloned().collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

pub async fn show(ctx: &AppContext, id: &str, json: bool) -> anyhow::Result<()> {
    let bead = ctx.store.get(id).await?.ok_or_else(|| anyhow::anyhow!("no bead with id {id}"))?;
    if json {
        print_json(&bead)?;
    } else {
        println!("{}  {}", bead.id, bead.title);
        println!("  type:        {:?}", bead.bead_type);
        println!("  status:      {:?}", bead.status);
        println!("  priority:    {}", bead.priority);
        println!("  assigned_to: {}", bead.assigned_to.as_deref().unwrap_or("-"));
        println!("  blocked_by:  {}", fmt_set(&bead.blocked_by));
        println!("  tags:        {}", fmt_set(&bead.tags));
        if let Some(decision) = &bead.decision {
            println!("  decision:    {decision:?}");
        }
    }
    Ok(())
}

pub async fn list(ctx: &AppContext, project_id: Option<String>, status: Option<BeadStatus>, tag: Option<String>, json: bool) -> anyhow::Result<()> {
    let beads = ctx
        .store
        .list(BeadFilter {
            project_id,
            status,
            tag,
            ..Default::default()
        })
        .await?;

    if json {
        print_json(&beads)?;
    } else if beads.is_empty() {
        println!("no beads match");
    } else {
        for bead in &beads {
            println!(
                "{:<10} {:<9} {:<12} {:<22} {}",
                bead.id,
                format!("{:?}", bead.status),
                bead.assigned_to.as_deref().unwrap_or("-"),
                format!("{:?}", bead.bead_type),
                bead.title
            );
        }
    }
    Ok(())
}

fn fmt_set(set: &HashSet<String>) -> String {
    if set.is_empty() {
        "-".to_string()
    } else {
        let mut items: Vec<_> = set.iter().cloned().collect();
        items.sort();
        items.join(", ")
    }
}
