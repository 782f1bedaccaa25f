pub mod bead;
pub mod kpi;
pub mod lessons;
pub mod locks;
pub mod memory;
pub mod ready;
pub mod run;
pub mod workers;
pub mod workflow;

/// Pretty-prints `value` as JSON when `json` is set, otherwise leaves
/// rendering to the caller's own plain-text branch.
pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
