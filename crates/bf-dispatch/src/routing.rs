//! Auto-bug routing (§4.H): an auto-filed bug's title/description/tags are
//! matched against a fixed keyword table to suggest a persona before normal
//! capability scoring runs. Ambiguous or unmatched bugs fall through to
//! triage rather than blocking on a perfect match.

use bf_core::types::Bead;

/// Persona name used when an auto-filed bug matches no keyword rule.
pub const QA_TRIAGE_PERSONA: &str = "qa-triage";

const RULES: &[(&[&str], &str)] = &[
    (&["build", "compile", "cargo", "ci"], "devops-engineer"),
    (&["frontend", "react", "javascript", "js", "typescript", "css"], "web-designer"),
    (&["backend", "go", "golang", "service"], "backend-engineer"),
    (&["api", "database", "db", "sql", "migration"], "backend-engineer"),
];

/// Suggests a persona name for an auto-filed bug, or `None` for a bead that
/// was not auto-filed — normal capability matching applies unchanged in
/// that case.
pub fn auto_bug_persona_hint(bead: &Bead) -> Option<&'static str> {
    if !bead.is_auto_filed() {
        return None;
    }

    let haystack = format!("{} {}", bead.title, bead.description).to_lowercase();
    let tags: Vec<String> = bead.tags.iter().map(|t| t.to_lowercase()).collect();

    for (keywords, persona) in RULES {
        let hit = keywords.iter().any(|k| haystack.contains(k) || tags.iter().any(|t| t == k));
        if hit {
            return Some(persona);
        }
    }

    Some(QA_TRIAGE_PERSONA)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bf_core::types::BeadType;

    fn auto_filed(title: &str) -> Bead {
        Bead::new("bf-1".into(), "proj".into(), format!("[auto-filed] {title}"), BeadType::Bug)
    }

    #[test]
    fn non_auto_filed_bead_gets_no_hint() {
        let bead = Bead::new("bf-1".into(), "proj".into(), "ordinary bug".into(), BeadType::Bug);
        assert_eq!(auto_bug_persona_hint(&bead), None);
    }

    #[test]
    fn build_keyword_routes_to_devops() {
        let bead = auto_filed("cargo build fails on main");
        assert_eq!(auto_bug_persona_hint(&bead), Some("devops-engineer"));
    }

    #[test]
    fn frontend_keyword_routes_to_web_designer() {
        let bead = auto_filed("react component throws on mount");
        assert_eq!(auto_bug_persona_hint(&bead), Some("web-designer"));
    }

    #[test]
    fn unmatched_auto_filed_bug_falls_through_to_triage() {
        let bead = auto_filed("something broke, unclear where");
        assert_eq!(auto_bug_persona_hint(&bead), Some(QA_TRIAGE_PERSONA));
    }
}
