//! System-prompt composition (§3, §4.F): a persona's identity plus the tail
//! of the project lessons journal, the message every worker sends as the
//! system turn ahead of the task-specific user content.

use dashmap::DashMap;

use bf_core::types::Persona;

/// Declarative persona configuration, keyed by name (§3's Persona entity).
/// Grounded in `at-agents::registry`'s role lookup shape, simplified from a
/// markdown-definition loader to the in-memory map the dispatcher's
/// matching pass (§4.H) needs: persona name on a `Worker` record in, full
/// `Persona` (capabilities, autonomy level) out.
#[derive(Default)]
pub struct PersonaRegistry {
    personas: DashMap<String, Persona>,
}

impl PersonaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, persona: Persona) {
        self.personas.insert(persona.name.clone(), persona);
    }

    pub fn get(&self, name: &str) -> Option<Persona> {
        self.personas.get(name).map(|p| p.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.personas.iter().map(|e| e.key().clone()).collect()
    }
}

pub fn compose_system_prompt(persona: &Persona, lessons_tail: &str) -> String {
    let standards = persona.standards.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");
    let mut prompt = format!(
        "You are {name}, {character}\n\nTone: {tone}\nMission: {mission}\nFocus areas: {focus}\n\n{collaboration}\n\nStandards:\n{standards}\n",
        name = persona.name,
        character = persona.character,
        tone = persona.tone,
        mission = persona.mission,
        focus = persona.focus_areas.join(", "),
        collaboration = persona.collaboration,
    );
    if !lessons_tail.is_empty() {
        prompt.push_str("\n## Lessons learned on this project\n");
        prompt.push_str(lessons_tail);
        prompt.push('\n');
    }
    prompt
}

/// Jaccard-style overlap between a persona's declared capabilities and a
/// task's required tags, used by the dispatcher's matching pass (§4.H).
pub fn capability_score(persona: &Persona, required: &std::collections::HashSet<String>) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let hits = required.iter().filter(|tag| persona.capabilities.contains(*tag)).count();
    hits as f64 / required.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::AutonomyLevel;
    use std::collections::HashSet;

    fn sample_persona() -> Persona {
        Persona {
            name: "Dana".into(),
            character: "a meticulous backend engineer".into(),
            tone: "direct, precise".into(),
            mission: "ship correct code".into(),
            focus_areas: vec!["rust".into(), "apis".into()],
            capabilities: HashSet::from(["rust".to_string(), "sql".to_string()]),
            autonomy_level: AutonomyLevel::Semi,
            collaboration: "asks before large refactors".into(),
            standards: vec!["tests accompany every change".into()],
        }
    }

    #[test]
    fn compose_system_prompt_includes_persona_fields_and_lessons() {
        let persona = sample_persona();
        let prompt = compose_system_prompt(&persona, "build failed: missing semicolon");
        assert!(prompt.contains("Dana"));
        assert!(prompt.contains("Lessons learned"));
        assert!(prompt.contains("missing semicolon"));
    }

    #[test]
    fn compose_system_prompt_omits_lessons_section_when_empty() {
        let persona = sample_persona();
        let prompt = compose_system_prompt(&persona, "");
        assert!(!prompt.contains("Lessons learned"));
    }

    #[test]
    fn capability_score_is_fraction_of_required_tags_covered() {
        let persona = sample_persona();
        let required = HashSet::from(["rust".to_string(), "frontend".to_string()]);
        assert_eq!(capability_score(&persona, &required), 0.5);
    }
}
