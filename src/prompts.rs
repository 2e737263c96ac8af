//! Prompt text: instruction files, archetype tables and scenario templates.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Prefix agent-relative paths are written with; it resolves to the prompt
/// base directory itself.
pub const AGENT_PATH_PREFIX: &str = "multi-persona-agent/";

/// Placeholders every scenario template must carry.
pub const SCENARIO_PLACEHOLDERS: [&str; 4] = [
    "{EMERGENCY_PLAN}",
    "{ARCHETYPE_DESC}",
    "{PHASE_NAME}",
    "{PHASE_CONTENT}",
];

/// Ordered archetype name → description pairs.
pub type Archetypes = Vec<(String, String)>;

pub fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let rel = path.strip_prefix(AGENT_PATH_PREFIX).unwrap_or(path);
    base_dir.join(rel)
}

pub fn load_instructions(base_dir: &Path, path: &str) -> Result<String> {
    let full = resolve(base_dir, path);
    std::fs::read_to_string(&full).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("instruction file {}: {e}", full.display()),
        ))
    })
}

pub fn load_archetypes(base_dir: &Path, path: &str) -> Result<Archetypes> {
    let text = load_instructions(base_dir, path)?;
    parse_archetypes(&text)
}

pub fn parse_archetypes(text: &str) -> Result<Archetypes> {
    let map: Map<String, Value> = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("archetypes must be a JSON object: {e}")))?;
    if map.is_empty() {
        return Err(Error::parse("archetypes file is empty"));
    }
    map.into_iter()
        .map(|(name, desc)| match desc {
            Value::String(d) => Ok((name, d)),
            _ => Err(Error::parse(format!("archetype '{name}' must map to a string"))),
        })
        .collect()
}

pub fn default_archetypes() -> Archetypes {
    [
        ("lowincome", "low-income, high risk, socially connected"),
        ("middleclass", "middle-class, low risk, socially average"),
        ("retired", "retired, high risk, socially limited"),
        ("underemployed", "under-employed, medium risk, socially connected"),
        ("highincome", "high-income, medium risk, socially active"),
        ("student", "student, low risk, socially connected"),
    ]
    .into_iter()
    .map(|(n, d)| (n.to_string(), d.to_string()))
    .collect()
}

pub fn persona_instruction(archetype_desc: &str) -> String {
    format!(
        "Generate a persona who is experiencing a hurricane using this archetype: {archetype_desc}
STRICT OUTPUT RULES:
Return ONLY this JSON object (no prose, no markdown, no extra keys):
{{
    \"race\": str
    \"age\": int
    \"sex\": str
    \"response\": str
}}
Numbers must be numbers (no quotes). Booleans must be true/false (lowercase).
Do not print long analyses; keep reasoning internal.
"
    )
}

pub const MERGER_INSTRUCTION: &str = "Input: json objects from Summarize the overall sentiment of all the population subsets";

/// Literal `{NAME}` substitution; unknown placeholders are left alone.
pub fn render_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |acc, (placeholder, value)| {
        acc.replace(placeholder, value)
    })
}

pub fn missing_placeholders(template: &str) -> Vec<&'static str> {
    SCENARIO_PLACEHOLDERS
        .into_iter()
        .filter(|p| !template.contains(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn agent_prefix_is_stripped() {
        let base = Path::new("/srv/prompts");
        assert_eq!(
            resolve(base, "multi-persona-agent/prompts/plan.txt"),
            PathBuf::from("/srv/prompts/prompts/plan.txt")
        );
        assert_eq!(resolve(base, "plan.txt"), PathBuf::from("/srv/prompts/plan.txt"));
    }

    #[test]
    fn loads_files_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("synthesis.txt"), "Merge the personas.").unwrap();
        fs::write(
            dir.path().join("archetypes.json"),
            r#"{"themeparkworker": "hourly, high risk", "nurse": "essential, medium risk"}"#,
        )
        .unwrap();

        let text = load_instructions(dir.path(), "multi-persona-agent/synthesis.txt").unwrap();
        assert_eq!(text, "Merge the personas.");

        let archetypes = load_archetypes(dir.path(), "archetypes.json").unwrap();
        assert_eq!(archetypes[0].0, "themeparkworker");
        assert_eq!(archetypes[1].1, "essential, medium risk");
    }

    #[test]
    fn missing_file_names_full_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_instructions(dir.path(), "nope.txt").unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
    }

    #[test]
    fn archetypes_must_be_string_map() {
        assert!(parse_archetypes(r#"{"a": 1}"#).is_err());
        assert!(parse_archetypes("[]").is_err());
        assert!(parse_archetypes("{}").is_err());
    }

    #[test]
    fn scenario_template_is_filled() {
        let template = "Plan: {EMERGENCY_PLAN}\nYou are {ARCHETYPE_DESC}.\n{PHASE_NAME}: {PHASE_CONTENT}\n\"archetype_influence\": str";
        assert!(missing_placeholders(template).is_empty());

        let out = render_placeholders(
            template,
            &[
                ("{EMERGENCY_PLAN}", "Evacuate zone A"),
                ("{ARCHETYPE_DESC}", "theme park worker"),
                ("{PHASE_NAME}", "T-48 HOURS: Tuesday 6:00 AM"),
                ("{PHASE_CONTENT}", "HURRICANE WARNING ISSUED"),
            ],
        );
        assert_eq!(missing_placeholders(&out).len(), SCENARIO_PLACEHOLDERS.len());
        assert!(out.contains("T-48 HOURS: Tuesday 6:00 AM: HURRICANE WARNING ISSUED"));
    }

    #[test]
    fn missing_placeholders_are_reported() {
        assert_eq!(
            missing_placeholders("{EMERGENCY_PLAN} {PHASE_NAME}"),
            vec!["{ARCHETYPE_DESC}", "{PHASE_CONTENT}"]
        );
    }

    #[test]
    fn persona_prompt_embeds_archetype() {
        let text = persona_instruction("student, low risk, socially connected");
        assert!(text.contains("archetype: student, low risk"));
        assert!(text.contains("\"age\": int"));
    }
}
