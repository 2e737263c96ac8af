//! The multi-persona hurricane pipeline: archetype personas fanned out in
//! parallel waves, then a merger that summarises their sentiment.

use crate::agents::{Agent, FieldType, LlmAgent, OutputSchema, ParallelAgent, SequentialAgent};
use crate::error::{Error, Result};
use crate::model::LanguageModel;
use crate::prompts::{self, Archetypes};
use std::sync::Arc;

pub const PIPELINE_NAME: &str = "FinalAnalysisAgent";
pub const MERGER_NAME: &str = "merger_agent";
pub const FINAL_SUMMARY_KEY: &str = "final_summary";

/// Fills a scenario template per archetype instead of the built-in prompt.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub template: String,
    pub emergency_plan: String,
    pub phase_name: String,
    pub phase_content: String,
}

impl Scenario {
    pub fn instruction(&self, archetype_desc: &str) -> String {
        prompts::render_placeholders(
            &self.template,
            &[
                ("{EMERGENCY_PLAN}", self.emergency_plan.as_str()),
                ("{ARCHETYPE_DESC}", archetype_desc),
                ("{PHASE_NAME}", self.phase_name.as_str()),
                ("{PHASE_CONTENT}", self.phase_content.as_str()),
            ],
        )
    }
}

pub struct PipelineOptions {
    pub archetypes: Archetypes,
    pub wave_size: usize,
    pub scenario: Option<Scenario>,
    pub merger_instruction: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            archetypes: prompts::default_archetypes(),
            wave_size: 6,
            scenario: None,
            merger_instruction: prompts::MERGER_INSTRUCTION.to_string(),
        }
    }
}

pub fn persona_schema(with_influence: bool) -> OutputSchema {
    let schema = OutputSchema::new("PersonaMiniSchema")
        .field("race", FieldType::String)
        .field("age", FieldType::Integer)
        .field("sex", FieldType::String)
        .field("response", FieldType::String);
    if with_influence {
        schema.field("archetype_influence", FieldType::String)
    } else {
        schema
    }
}

pub fn merger_schema() -> OutputSchema {
    OutputSchema::new("outputSchema").field("output", FieldType::String)
}

pub fn output_key(archetype: &str) -> String {
    format!("{archetype}_key")
}

pub fn persona_agent(
    archetype: &str,
    description: &str,
    model: Arc<dyn LanguageModel>,
    scenario: Option<&Scenario>,
) -> LlmAgent {
    let (instruction, schema) = match scenario {
        Some(s) => (s.instruction(description), persona_schema(true)),
        None => (prompts::persona_instruction(description), persona_schema(false)),
    };
    LlmAgent::new(archetype, model)
        .with_instruction(instruction)
        .with_description(format!("{archetype} population subset description"))
        .with_output_key(output_key(archetype))
        .with_output_schema(schema)
}

/// Group persona agents into parallel waves of at most `wave_size`.
pub fn waves(agents: Vec<Arc<dyn Agent>>, wave_size: usize) -> Vec<ParallelAgent> {
    agents
        .chunks(wave_size.max(1))
        .enumerate()
        .map(|(i, chunk)| {
            let n = i + 1;
            ParallelAgent::new(format!("subset_wave_{n}"), chunk.to_vec())
                .with_description(format!("subset wave #{n} (size={})", chunk.len()))
        })
        .collect()
}

pub fn build_pipeline(
    options: &PipelineOptions,
    persona_model: Arc<dyn LanguageModel>,
    merger_model: Arc<dyn LanguageModel>,
) -> Result<SequentialAgent> {
    if options.archetypes.is_empty() {
        return Err(Error::config("at least one archetype is required"));
    }
    if options.wave_size == 0 {
        return Err(Error::config("wave size must be at least 1"));
    }

    let personas: Vec<Arc<dyn Agent>> = options
        .archetypes
        .iter()
        .map(|(name, desc)| {
            Arc::new(persona_agent(
                name,
                desc,
                persona_model.clone(),
                options.scenario.as_ref(),
            )) as Arc<dyn Agent>
        })
        .collect();

    let mut stages: Vec<Arc<dyn Agent>> = waves(personas, options.wave_size)
        .into_iter()
        .map(|w| Arc::new(w) as Arc<dyn Agent>)
        .collect();

    let merger = LlmAgent::new(MERGER_NAME, merger_model)
        .with_instruction(options.merger_instruction.clone())
        .with_description("Summarizes the entire sentiment of all population subsets")
        .with_output_schema(merger_schema())
        .with_output_key(FINAL_SUMMARY_KEY);
    stages.push(Arc::new(merger));

    Ok(SequentialAgent::new(PIPELINE_NAME, stages).with_description(
        "Coordinates the creation of agents and summarization of reactions to hurricane",
    ))
}
