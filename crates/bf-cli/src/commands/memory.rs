//! `beadctl memory` — per-project key/value memory (§4.J): get/set entries
//! workers converge on across tasks (e.g. "this repo's test command").

use crate::context::AppContext;

use super::print_json;

pub async fn set(ctx: &AppContext, project_id: &str, category: &str, key: &str, value: &str, confidence: f64) -> anyhow::Result<()> {
    ctx.memory.set(project_id, category, key, value, confidence, None).await?;
    println!("memory set: {project_id}/{category}/{key}");
    Ok(())
}

pub async fn get(ctx: &AppContext, project_id: &str, category: &str, key: &str, json: bool) -> anyhow::Result<()> {
    match ctx.memory.get(project_id, category, key).await? {
        Some(entry) => {
            if json {
                print_json(&entry)?;
            } else {
                println!("{} = {} (confidence {:.2})", key, entry.value, entry.confidence);
            }
        }
        None => println!("no memory entry for {project_id}/{category}/{key}"),
    }
    Ok(())
}

pub async fn list(ctx: &AppContext, project_id: &str, category: &str, json: bool) -> anyhow::Result<()> {
    let entries = ctx.memory.list_by_category(project_id, category).await?;
    if json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("no memory entries for {project_id}/{category}");
    } else {
        for e in &entries {
            println!("{:<20} {}", e.key, e.value);
        }
    }
    Ok(())
}
