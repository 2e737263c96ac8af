//! Named agent apps the service can run.

use crate::agents::{Agent, LlmAgent};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{GeminiModel, LanguageModel};
use crate::persona::{self, PipelineOptions, Scenario};
use crate::prompts;
use crate::tools;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const WELLNESS_APP: &str = "wellness_assistant";

#[derive(Clone)]
pub struct AgentRegistry {
    apps: BTreeMap<String, Arc<dyn Agent>>,
    default_app: String,
}

impl AgentRegistry {
    pub fn new(default_app: impl Into<String>, root: Arc<dyn Agent>) -> Self {
        let default_app = default_app.into();
        let mut apps = BTreeMap::new();
        apps.insert(default_app.clone(), root);
        Self { apps, default_app }
    }

    pub fn with_app(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.apps.insert(name.into(), agent);
        self
    }

    pub fn get(&self, app_name: &str) -> Option<Arc<dyn Agent>> {
        self.apps.get(app_name).cloned()
    }

    pub fn default_app(&self) -> &str {
        &self.default_app
    }

    pub fn default_agent(&self) -> Arc<dyn Agent> {
        // The default app is inserted in `new` and never removed.
        self.apps[&self.default_app].clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.keys().cloned().collect()
    }
}

pub fn wellness_assistant(model: Arc<dyn LanguageModel>) -> LlmAgent {
    LlmAgent::new(WELLNESS_APP, model)
        .with_description("Answers body-mass and weight conversion questions using tools")
        .with_instruction(
            "You help with BMI and weight questions. Use calculate_bmi and convert_weight \
             instead of doing arithmetic yourself. If a tool returns an error, explain it in \
             one short sentence.",
        )
        .with_tool(Arc::new(tools::bmi_tool()))
        .with_tool(Arc::new(tools::weight_tool()))
}

/// Pipeline options from configured prompt files, falling back to built-ins.
pub fn pipeline_options(config: &Config) -> Result<PipelineOptions> {
    let base = config.prompts_dir.as_path();
    let archetypes = match &config.archetypes_path {
        Some(path) => prompts::load_archetypes(base, path)?,
        None => prompts::default_archetypes(),
    };

    let scenario = match (&config.persona_template_path, &config.emergency_plan_path) {
        (Some(template_path), Some(plan_path)) => {
            let template = prompts::load_instructions(base, template_path)?;
            let missing = prompts::missing_placeholders(&template);
            if !missing.is_empty() {
                return Err(Error::config(format!(
                    "persona template is missing placeholders: {}",
                    missing.join(", ")
                )));
            }
            Some(Scenario {
                template,
                emergency_plan: prompts::load_instructions(base, plan_path)?,
                phase_name: config.phase_name.clone().unwrap_or_default(),
                phase_content: config.phase_content.clone().unwrap_or_default(),
            })
        }
        _ => None,
    };

    let merger_instruction = match &config.merger_instruction_path {
        Some(path) => prompts::load_instructions(base, path)?,
        None => prompts::MERGER_INSTRUCTION.to_string(),
    };

    Ok(PipelineOptions {
        archetypes,
        wave_size: config.wave_size,
        scenario,
        merger_instruction,
    })
}

pub fn build_registry(
    config: &Config,
    persona_model: Arc<dyn LanguageModel>,
    merger_model: Arc<dyn LanguageModel>,
) -> Result<AgentRegistry> {
    let options = pipeline_options(config)?;
    info!(
        archetypes = options.archetypes.len(),
        wave_size = options.wave_size,
        scenario = options.scenario.is_some(),
        "building persona pipeline"
    );
    let pipeline = persona::build_pipeline(&options, persona_model.clone(), merger_model)?;

    Ok(AgentRegistry::new(config.app_name.clone(), Arc::new(pipeline))
        .with_app(WELLNESS_APP, Arc::new(wellness_assistant(persona_model))))
}

/// Registry backed by Gemini models named in the config.
pub fn from_config(config: &Config) -> Result<AgentRegistry> {
    if config.google_api_key.is_empty() {
        warn!("GOOGLE_API_KEY is not set; model calls will be rejected upstream");
    }
    let persona_model = GeminiModel::new(
        config.model_name.clone(),
        config.google_api_key.clone(),
        config.gemini_base_url.clone(),
    )?;
    let merger_model = GeminiModel::new(
        config.merger_model_name.clone(),
        config.google_api_key.clone(),
        config.gemini_base_url.clone(),
    )?;
    build_registry(config, Arc::new(persona_model), Arc::new(merger_model))
}
