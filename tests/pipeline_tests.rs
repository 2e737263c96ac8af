mod common;

use async_trait::async_trait;
use common::{RuleModel, test_config};
use futures::TryStreamExt;
use persona_agent_backend::agents::{
    Agent, Event, InvocationContext, SessionView, describe, find_agent,
};
use persona_agent_backend::apps::{self, WELLNESS_APP};
use persona_agent_backend::error::Result;
use persona_agent_backend::model::{
    FunctionCall, LanguageModel, LlmRequest, LlmResponse, Part, TextStream,
};
use persona_agent_backend::persona::{self, PipelineOptions, Scenario};
use persona_agent_backend::prompts;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn ctx(input: &str) -> Arc<InvocationContext> {
    Arc::new(InvocationContext::new(
        "multi-persona-agent",
        "user",
        "s1",
        input,
        SessionView::default(),
    ))
}

#[test]
fn test_waves_split_by_size() {
    let model = RuleModel::new();
    let agents: Vec<Arc<dyn Agent>> = prompts::default_archetypes()
        .iter()
        .map(|(n, d)| Arc::new(persona::persona_agent(n, d, model.clone(), None)) as Arc<dyn Agent>)
        .collect();

    let waves = persona::waves(agents, 4);
    assert_eq!(waves.len(), 2);
    assert_eq!(waves[0].name(), "subset_wave_1");
    assert_eq!(waves[0].description(), "subset wave #1 (size=4)");
    assert_eq!(waves[1].sub_agents().len(), 2);
    assert_eq!(waves[1].description(), "subset wave #2 (size=2)");
}

#[test]
fn test_pipeline_tree() {
    let model = RuleModel::new();
    let pipeline =
        persona::build_pipeline(&PipelineOptions::default(), model.clone(), model).unwrap();
    let tree = describe(&pipeline);

    assert_eq!(tree["name"], persona::PIPELINE_NAME);
    let stages = tree["sub_agents"].as_array().unwrap();
    assert_eq!(stages.len(), 2);
    assert_eq!(stages[0]["name"], "subset_wave_1");
    assert_eq!(stages[0]["sub_agents"].as_array().unwrap().len(), 6);
    assert_eq!(stages[1]["name"], persona::MERGER_NAME);

    let root: Arc<dyn Agent> = Arc::new(pipeline);
    assert!(find_agent(&root, "retired").is_some());
    assert!(find_agent(&root, "astronaut").is_none());
}

#[test]
fn test_pipeline_rejects_empty_archetypes() {
    let model = RuleModel::new();
    let options = PipelineOptions {
        archetypes: vec![],
        ..PipelineOptions::default()
    };
    assert!(persona::build_pipeline(&options, model.clone(), model).is_err());
}

#[tokio::test]
async fn test_pipeline_fills_every_output_key() {
    let model = RuleModel::new();
    let options = PipelineOptions {
        wave_size: 2,
        ..PipelineOptions::default()
    };
    let pipeline = persona::build_pipeline(&options, model.clone(), model).unwrap();
    let ctx = ctx("A hurricane is two days out");

    let events: Vec<Event> = pipeline.run(ctx.clone()).await.unwrap().try_collect().await.unwrap();
    assert_eq!(events.len(), 7);
    assert_eq!(events.last().unwrap().author, persona::MERGER_NAME);

    let state = ctx.state().await;
    for (name, _) in prompts::default_archetypes() {
        assert_eq!(state[&persona::output_key(&name)]["sex"], "female");
    }
    assert_eq!(state[persona::FINAL_SUMMARY_KEY]["output"], "Mostly anxious but prepared");
}

#[tokio::test]
async fn test_scenario_personas_report_influence() {
    let model = RuleModel::new();
    let options = PipelineOptions {
        archetypes: vec![("retired".into(), "retired, high risk".into())],
        scenario: Some(Scenario {
            template: "Plan: {EMERGENCY_PLAN}\nYou are {ARCHETYPE_DESC}.\n{PHASE_NAME}: {PHASE_CONTENT}"
                .into(),
            emergency_plan: "Evacuate zone A".into(),
            phase_name: "Warning".into(),
            phase_content: "Landfall in 36 hours".into(),
        }),
        ..PipelineOptions::default()
    };
    let pipeline = persona::build_pipeline(&options, model.clone(), model).unwrap();
    let ctx = ctx("What do you do?");
    let _: Vec<Event> = pipeline.run(ctx.clone()).await.unwrap().try_collect().await.unwrap();

    let state = ctx.state().await;
    assert_eq!(state["retired_key"]["archetype_influence"], "limited mobility");
}

#[test]
fn test_pipeline_options_from_prompt_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("archetypes.json"),
        r#"{"fisher": "coastal fisher, high risk", "nurse": "night-shift nurse, medium risk"}"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("template.txt"), "{ARCHETYPE_DESC} only").unwrap();
    std::fs::write(dir.path().join("plan.txt"), "Shelter in place").unwrap();

    let mut config = test_config();
    config.prompts_dir = dir.path().to_path_buf();
    config.archetypes_path = Some("archetypes.json".into());
    let options = apps::pipeline_options(&config).unwrap();
    assert_eq!(options.archetypes.len(), 2);
    assert!(options.scenario.is_none());

    config.persona_template_path = Some("template.txt".into());
    config.emergency_plan_path = Some("plan.txt".into());
    // the template lacks the plan and phase placeholders
    assert!(apps::pipeline_options(&config).is_err());
}

/// Asks for a BMI tool call, then answers from the function response.
struct ToolCaller {
    seen: Mutex<Vec<LlmRequest>>,
}

#[async_trait]
impl LanguageModel for ToolCaller {
    fn name(&self) -> &str {
        "tool-caller"
    }

    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        let answered = request.contents.iter().flat_map(|c| &c.parts).find_map(|p| match p {
            Part::FunctionResponse { response, .. } => Some(response.clone()),
            _ => None,
        });
        self.seen.lock().unwrap().push(request);
        Ok(match answered {
            Some(response) => LlmResponse {
                text: format!("Your BMI is {}", response["bmi"]),
                function_calls: vec![],
            },
            None => LlmResponse {
                text: String::new(),
                function_calls: vec![FunctionCall {
                    name: "calculate_bmi".into(),
                    args: json!({"weight_kg": 70, "height_m": 1.75}),
                }],
            },
        })
    }

    async fn generate_stream(&self, request: LlmRequest) -> Result<TextStream> {
        let text = self.generate(request).await?.text;
        Ok(Box::pin(futures::stream::iter(vec![Ok(text)])))
    }
}

#[tokio::test]
async fn test_wellness_assistant_uses_tools() {
    let model = Arc::new(ToolCaller {
        seen: Mutex::new(Vec::new()),
    });
    let agent = apps::wellness_assistant(model.clone());
    assert_eq!(agent.name(), WELLNESS_APP);

    // streaming is ignored for agents with tools
    let ctx = Arc::new(
        InvocationContext::new(WELLNESS_APP, "u", "s", "I weigh 70kg at 1.75m", SessionView::default())
            .with_streaming(true),
    );
    let events: Vec<Event> = agent.run(ctx).await.unwrap().try_collect().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "Your BMI is 22.9");

    let seen = model.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].tools.len(), 2);
}
