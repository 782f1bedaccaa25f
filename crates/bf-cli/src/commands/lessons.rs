//! `beadctl lessons` — tail the lessons journal, or record a manual entry.

use bf_core::types::LessonCategory;

use crate::context::AppContext;

use super::print_json;

pub async fn tail(ctx: &AppContext, max_chars: usize, json: bool) -> anyhow::Result<()> {
    if json {
        let entries = ctx.lessons.all().await?;
        print_json(&entries)?;
    } else {
        let markdown = ctx.lessons.get_lessons_for_prompt(max_chars).await?;
        if markdown.is_empty() {
            println!("no lessons recorded yet");
        } else {
            print!("{markdown}");
        }
    }
    Ok(())
}

pub async fn record(ctx: &AppContext, category: LessonCategory, title: String, detail: String, bead_id: Option<String>) -> anyhow::Result<()> {
    ctx.lessons.record_lesson(category, title, detail, bead_id, None).await?;
    println!("lesson recorded");
    Ok(())
}
