//! Parses an LLM response into an [`ActionEnvelope`] (§4.A, §6).
//!
//! Two encodings are accepted: strict tagged-JSON first, then a lenient
//! `ACTION: <VERB> <args>` text form as a fallback. `edit_code`'s old/new
//! text arrives as `OLD:`/`NEW:` blocks delimited by `<<<`/`>>>` rather than
//! as JSON strings, since models reliably produce those without needing to
//! escape newlines.

use bf_api_types::action::{Action, ActionEnvelope};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeParseError {
    #[error("neither strict JSON nor lenient text form parsed: {0}")]
    Unparseable(String),
}

/// Parse `raw`, trying strict JSON first and falling back to the lenient
/// text form. Returns the truncated raw text alongside the error on total
/// failure so the caller can file a `parse-failure` bead (§4.A).
pub fn parse_envelope(raw: &str) -> Result<ActionEnvelope, EnvelopeParseError> {
    if let Ok(envelope) = serde_json::from_str::<ActionEnvelope>(raw) {
        return Ok(envelope);
    }
    // Some models wrap the JSON object in a ```json fenced block.
    if let Some(json) = extract_fenced_json(raw) {
        if let Ok(envelope) = serde_json::from_str::<ActionEnvelope>(&json) {
            return Ok(envelope);
        }
    }
    parse_lenient(raw).ok_or_else(|| EnvelopeParseError::Unparseable(truncate(raw, 2000)))
}

pub fn truncate(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        raw.to_string()
    } else {
        let truncated: String = raw.chars().take(max_chars).collect();
        format!("{truncated}…")
    }
}

fn extract_fenced_json(raw: &str) -> Option<String> {
    let start = raw.find("```json")? + "```json".len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Lenient text form: zero or more `ACTION: <VERB> key=value ...` lines,
/// each optionally followed by `<<<`/`>>>`-delimited content blocks for
/// verbs that need one (`write_file`'s content, `edit_code`'s `OLD:`/`NEW:`
/// pair). Free prose between action lines is ignored. Returns `None` if no
/// `ACTION:` line is found at all.
fn parse_lenient(raw: &str) -> Option<ActionEnvelope> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut actions = Vec::new();
    let mut i = 0;
    let mut saw_action_line = false;

    while i < lines.len() {
        let line = lines[i].trim_start();
        if let Some(rest) = line.strip_prefix("ACTION:") {
            saw_action_line = true;
            let rest = rest.trim();
            let (verb, arg_str) = rest.split_once(' ').unwrap_or((rest, ""));
            let verb = verb.trim().to_ascii_uppercase();
            let args = parse_kv_args(arg_str);
            i += 1;

            let action = match verb.as_str() {
                "EDIT_CODE" | "EDIT" => {
                    let (old_text, new_i) = consume_labelled_block(&lines, i, "OLD:").unwrap_or((String::new(), i));
                    let (new_text, new_i2) = consume_labelled_block(&lines, new_i, "NEW:").unwrap_or((String::new(), new_i));
                    i = new_i2;
                    Action::EditCode { path: args.get("path").cloned().unwrap_or_default(), old_text, new_text }
                }
                "WRITE_FILE" => {
                    let (content, new_i) = consume_block(&lines, i).unwrap_or((String::new(), i));
                    i = new_i;
                    Action::WriteFile { path: args.get("path").cloned().unwrap_or_default(), content }
                }
                "READ_FILE" => Action::ReadFile { path: args.get("path").cloned().unwrap_or_default() },
                "READ_TREE" => Action::ReadTree {
                    path: args.get("path").cloned().unwrap_or_default(),
                    max_depth: args.get("max_depth").and_then(|v| v.parse().ok()).unwrap_or(4),
                },
                "SEARCH_TEXT" => Action::SearchText {
                    query: args.get("query").cloned().unwrap_or_default(),
                    path: args.get("path").cloned().unwrap_or_default(),
                },
                "RUN_COMMAND" => Action::RunCommand {
                    command: args.get("command").cloned().unwrap_or_default(),
                    timeout_ms: args.get("timeout_ms").and_then(|v| v.parse().ok()).unwrap_or(30_000),
                },
                "RUN_TESTS" => Action::RunTests { pattern: args.get("pattern").cloned() },
                "RUN_LINTER" => Action::RunLinter { pattern: args.get("pattern").cloned() },
                "BUILD_PROJECT" => Action::BuildProject { pattern: args.get("pattern").cloned() },
                "GIT_COMMIT" => Action::GitCommit {
                    message: args.get("message").cloned().unwrap_or_default(),
                    files: args
                        .get("files")
                        .map(|f| f.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                        .unwrap_or_default(),
                    allow_all: args.get("allow_all").map(|v| v == "true").unwrap_or(false),
                },
                "GIT_PUSH" => Action::GitPush {
                    branch: args.get("branch").cloned().unwrap_or_default(),
                    set_upstream: args.get("set_upstream").map(|v| v == "true").unwrap_or(false),
                },
                "CREATE_PR" => Action::CreatePr {
                    title: args.get("title").cloned().unwrap_or_default(),
                    body: args.get("body").cloned().unwrap_or_default(),
                    base: args.get("base").cloned().unwrap_or_default(),
                    branch: args.get("branch").cloned().unwrap_or_default(),
                    reviewers: args
                        .get("reviewers")
                        .map(|f| f.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                        .unwrap_or_default(),
                    draft: args.get("draft").map(|v| v == "true").unwrap_or(false),
                },
                "CREATE_BEAD" => Action::CreateBead {
                    title: args.get("title").cloned().unwrap_or_default(),
                    description: args.get("description").cloned(),
                    bead_type: args.get("bead_type").cloned().unwrap_or_else(|| "task".to_string()),
                    priority: args.get("priority").and_then(|v| v.parse().ok()).unwrap_or(2),
                    parent: args.get("parent").cloned(),
                },
                "CLOSE_BEAD" => Action::CloseBead { bead_id: args.get("bead_id").cloned().unwrap_or_default() },
                "ESCALATE_CEO" => Action::EscalateCeo { reason: args.get("reason").cloned().unwrap_or_default() },
                "SEND_AGENT_MESSAGE" => Action::SendAgentMessage {
                    to_agent_id: args.get("to_agent_id").cloned().unwrap_or_default(),
                    subject: args.get("subject").cloned().unwrap_or_default(),
                    body: args.get("body").cloned().unwrap_or_default(),
                    requires_response: args.get("requires_response").map(|v| v == "true").unwrap_or(false),
                    context: Value::Null,
                },
                "PROCEED_TO_PHASE" => Action::ProceedToPhase { phase: args.get("phase").cloned().unwrap_or_default() },
                "START_DEVELOPMENT" => Action::StartDevelopment { args: Value::Null },
                "WHATS_NEXT" => Action::WhatsNext { args: Value::Null },
                "CONDUCT_REVIEW" => Action::ConductReview { args: Value::Null },
                "RESUME_WORKFLOW" => Action::ResumeWorkflow { args: Value::Null },
                "DONE" => Action::Done { reason: args.get("reason").cloned().unwrap_or_default() },
                _ => continue,
            };
            actions.push(action);
            continue;
        }
        i += 1;
    }

    if !saw_action_line {
        return None;
    }
    Some(ActionEnvelope { actions, notes: String::new() })
}

/// Parse `key=value key2="quoted value"` into a map. Unquoted values run to
/// the next whitespace; quoted values run to the matching closing quote.
fn parse_kv_args(s: &str) -> std::collections::HashMap<String, String> {
    let mut out = std::collections::HashMap::new();
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let key_start = i;
        while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
            i += 1;
        }
        if i >= chars.len() || chars[i] != '=' {
            break;
        }
        let key: String = chars[key_start..i].iter().collect();
        i += 1; // skip '='
        let value = if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
            let quote = chars[i];
            i += 1;
            let val_start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            let value: String = chars[val_start..i].iter().collect();
            i += 1; // skip closing quote
            value
        } else {
            let val_start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            chars[val_start..i].iter().collect()
        };
        out.insert(key, value);
    }
    out
}

/// Consume a `<<<` ... `>>>` block starting at or after `from`, returning
/// its content and the index of the line after the closing delimiter.
fn consume_block(lines: &[&str], from: usize) -> Option<(String, usize)> {
    let mut i = from;
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }
    if i >= lines.len() || lines[i].trim() != "<<<" {
        return None;
    }
    i += 1;
    let start = i;
    while i < lines.len() && lines[i].trim() != ">>>" {
        i += 1;
    }
    let content = lines[start..i].join("\n");
    Some((content, (i + 1).min(lines.len())))
}

/// Consume a `LABEL:` line followed by a `<<<`/`>>>` block.
fn consume_labelled_block(lines: &[&str], from: usize, label: &str) -> Option<(String, usize)> {
    let mut i = from;
    while i < lines.len() && lines[i].trim().is_empty() {
        i += 1;
    }
    if i >= lines.len() || lines[i].trim() != label {
        return None;
    }
    consume_block(lines, i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_json() {
        let raw = r#"{"actions":[{"type":"done","reason":"ok"}],"notes":"n"}"#;
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.actions.len(), 1);
        assert!(matches!(env.actions[0], Action::Done { .. }));
    }

    #[test]
    fn parses_json_inside_fenced_block() {
        let raw = "here you go\n```json\n{\"actions\":[{\"type\":\"done\",\"reason\":\"ok\"}],\"notes\":\"\"}\n```\n";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.actions.len(), 1);
    }

    #[test]
    fn parses_lenient_read_file() {
        let raw = "Let me check that file.\nACTION: READ_FILE path=src/main.rs\n";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.actions.len(), 1);
        assert!(matches!(&env.actions[0], Action::ReadFile { path } if path == "src/main.rs"));
    }

    #[test]
    fn parses_lenient_write_file_with_block() {
        let raw = "ACTION: WRITE_FILE path=README.md\n<<<\n# Hello\nworld\n>>>\n";
        let env = parse_envelope(raw).unwrap();
        match &env.actions[0] {
            Action::WriteFile { path, content } => {
                assert_eq!(path, "README.md");
                assert_eq!(content, "# Hello\nworld");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn parses_lenient_edit_code_with_old_new_blocks() {
        let raw = "ACTION: EDIT_CODE path=src/lib.rs\nOLD:\n<<<\nfn a() {}\n>>>\nNEW:\n<<<\nfn a() { 1 }\n>>>\n";
        let env = parse_envelope(raw).unwrap();
        match &env.actions[0] {
            Action::EditCode { path, old_text, new_text } => {
                assert_eq!(path, "src/lib.rs");
                assert_eq!(old_text, "fn a() {}");
                assert_eq!(new_text, "fn a() { 1 }");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn parses_multiple_actions_in_one_envelope() {
        let raw = "ACTION: RUN_TESTS\nACTION: DONE reason=\"all green\"\n";
        let env = parse_envelope(raw).unwrap();
        assert_eq!(env.actions.len(), 2);
    }

    #[test]
    fn unparseable_text_is_an_error() {
        let raw = "I looked at the file but didn't do anything specific.";
        let err = parse_envelope(raw).unwrap_err();
        assert!(matches!(err, EnvelopeParseError::Unparseable(_)));
    }

    #[test]
    fn truncate_adds_ellipsis_when_over_limit() {
        let long = "a".repeat(100);
        let t = truncate(&long, 10);
        assert_eq!(t.chars().count(), 11);
        assert!(t.ends_with('…'));
    }
}
