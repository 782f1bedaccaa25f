//! Worker matching (§4.H): which idle worker, if any, should claim a ready
//! bead. Required capabilities come from the bead's own tags plus a type
//! derived hint; candidates are scored by persona capability overlap (with
//! an auto-bug routing hint breaking ties) and the longest-idle worker wins
//! among equal scores.

use std::collections::HashSet;

use bf_agents::persona::{capability_score, PersonaRegistry};
use bf_core::types::{Bead, BeadType, Worker};

/// Capabilities a bead's work is expected to require, derived from its tags
/// plus a coarse hint from its type. Tags already named as capabilities
/// (e.g. "rust", "frontend") pass through unchanged.
pub fn required_capabilities(bead: &Bead) -> HashSet<String> {
    let mut caps: HashSet<String> = bead.tags.iter().map(|t| t.to_lowercase()).collect();
    match bead.bead_type {
        BeadType::Bug => {
            caps.insert("debugging".to_string());
        }
        BeadType::Chore => {
            caps.insert("maintenance".to_string());
        }
        _ => {}
    }
    caps
}

/// Picks the best-matching idle worker for a bead out of `candidates`
/// (already filtered to the bead's project and idle status by the caller).
/// Scoring: capability overlap first, a persona-hint match second, then the
/// worker that has been idle longest (oldest `last_heartbeat`) as a
/// fairness tiebreak.
pub fn select_worker(candidates: &[Worker], personas: &PersonaRegistry, required: &HashSet<String>, persona_hint: Option<&str>) -> Option<Worker> {
    let mut scored: Vec<(f64, &Worker)> = candidates
        .iter()
        .filter_map(|worker| {
            let persona = personas.get(&worker.persona_name)?;
            let mut score = capability_score(&persona, required);
            if persona_hint == Some(worker.persona_name.as_str()) {
                score += 1.0;
            }
            Some((score, worker))
        })
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.last_heartbeat.cmp(&b.1.last_heartbeat)));
    scored.into_iter().next().map(|(_, w)| w.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::AutonomyLevel;
    use bf_core::types::Persona;

    fn persona(name: &str, caps: &[&str]) -> Persona {
        Persona {
            name: name.to_string(),
            character: "tester".into(),
            tone: "plain".into(),
            mission: "ship".into(),
            focus_areas: vec![],
            capabilities: caps.iter().map(|c| c.to_string()).collect(),
            autonomy_level: AutonomyLevel::Semi,
            collaboration: "".into(),
            standards: vec![],
        }
    }

    fn worker(id: &str, persona_name: &str) -> Worker {
        Worker::new(id.into(), id.into(), persona_name.into(), "provider-a".into(), "proj".into())
    }

    #[test]
    fn required_capabilities_adds_bug_hint() {
        let bead = Bead::new("bf-1".into(), "proj".into(), "fix it".into(), BeadType::Bug);
        let caps = required_capabilities(&bead);
        assert!(caps.contains("debugging"));
    }

    #[test]
    fn select_worker_prefers_higher_capability_overlap() {
        let registry = PersonaRegistry::new();
        registry.register(persona("backend-engineer", &["rust", "sql"]));
        registry.register(persona("web-designer", &["css", "js"]));

        let candidates = vec![worker("w1", "backend-engineer"), worker("w2", "web-designer")];
        let required: HashSet<String> = HashSet::from(["rust".to_string()]);

        let chosen = select_worker(&candidates, &registry, &required, None).unwrap();
        assert_eq!(chosen.persona_name, "backend-engineer");
    }

    #[test]
    fn select_worker_breaks_ties_with_persona_hint() {
        let registry = PersonaRegistry::new();
        registry.register(persona("devops-engineer", &[]));
        registry.register(persona("qa-triage", &[]));

        let candidates = vec![worker("w1", "qa-triage"), worker("w2", "devops-engineer")];
        let required = HashSet::new();

        let chosen = select_worker(&candidates, &registry, &required, Some("devops-engineer")).unwrap();
        assert_eq!(chosen.persona_name, "devops-engineer");
    }

    #[test]
    fn select_worker_returns_none_when_no_candidate_has_a_registered_persona() {
        let registry = PersonaRegistry::new();
        let candidates = vec![worker("w1", "ghost")];
        assert!(select_worker(&candidates, &registry, &HashSet::new(), None).is_none());
    }
}
