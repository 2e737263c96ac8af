use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration, read from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: String,
    pub model_name: String,
    pub merger_model_name: String,
    pub gemini_base_url: String,
    pub port: u16,
    pub app_name: String,
    pub wave_size: usize,
    pub archetypes_path: Option<String>,
    pub persona_template_path: Option<String>,
    pub emergency_plan_path: Option<String>,
    pub phase_name: Option<String>,
    pub phase_content: Option<String>,
    pub merger_instruction_path: Option<String>,
    pub prompts_dir: PathBuf,
    pub eval_dir: PathBuf,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
    pub admin_key: Option<String>,
    pub backend_url: Option<String>,
    pub stream_url: Option<String>,
}

fn default_model() -> String {
    "gemini-2.0-flash-lite".into()
}
fn default_merger_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_app_name() -> String {
    "multi-persona-agent".into()
}
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_WAVE_SIZE: usize = 6;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: String::new(),
            model_name: default_model(),
            merger_model_name: default_merger_model(),
            gemini_base_url: default_base_url(),
            port: DEFAULT_PORT,
            app_name: default_app_name(),
            wave_size: DEFAULT_WAVE_SIZE,
            archetypes_path: None,
            persona_template_path: None,
            emergency_plan_path: None,
            phase_name: None,
            phase_content: None,
            merger_instruction_path: None,
            prompts_dir: PathBuf::from("prompts"),
            eval_dir: PathBuf::from("eval"),
            static_dir: PathBuf::from("public"),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            admin_key: None,
            backend_url: None,
            stream_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let session_ttl_secs = parse_var(&get, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?;

        let config = Self {
            google_api_key: get("GOOGLE_API_KEY").unwrap_or_default(),
            model_name: get("MODEL_NAME").unwrap_or(defaults.model_name),
            merger_model_name: get("MERGER_MODEL_NAME").unwrap_or(defaults.merger_model_name),
            gemini_base_url: get("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            port: parse_var(&get, "PORT", DEFAULT_PORT)?,
            app_name: get("APP_NAME").unwrap_or(defaults.app_name),
            wave_size: parse_var(&get, "WAVE_SIZE", DEFAULT_WAVE_SIZE)?,
            archetypes_path: get("ARCHETYPES_PATH"),
            persona_template_path: get("PERSONA_TEMPLATE_PATH"),
            emergency_plan_path: get("EMERGENCY_PLAN_PATH"),
            phase_name: get("PHASE_NAME"),
            phase_content: get("PHASE_CONTENT"),
            merger_instruction_path: get("MERGER_INSTRUCTION_PATH"),
            prompts_dir: get("PROMPTS_DIR").map(PathBuf::from).unwrap_or(defaults.prompts_dir),
            eval_dir: get("EVAL_DIR").map(PathBuf::from).unwrap_or(defaults.eval_dir),
            static_dir: get("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
            session_ttl: Duration::from_secs(session_ttl_secs),
            admin_key: get("ADMIN_KEY"),
            backend_url: get("ADK_BACKEND_URL"),
            stream_url: get("NEXT_PUBLIC_ADK_STREAM_URL"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.wave_size == 0 {
            return Err(Error::config("WAVE_SIZE must be at least 1"));
        }
        if self.port == 0 {
            return Err(Error::config("PORT must be non-zero"));
        }
        if self.app_name == crate::apps::WELLNESS_APP {
            return Err(Error::config(format!(
                "APP_NAME '{}' is reserved for the wellness app",
                self.app_name
            )));
        }
        if self.persona_template_path.is_some() && self.emergency_plan_path.is_none() {
            return Err(Error::config(
                "PERSONA_TEMPLATE_PATH requires EMERGENCY_PLAN_PATH",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("invalid {key} '{raw}': {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_env_uses_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.wave_size, 6);
        assert_eq!(config.model_name, "gemini-2.0-flash-lite");
        assert_eq!(config.app_name, "multi-persona-agent");
        assert!(config.admin_key.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("MODEL_NAME", "gemini-2.5-pro"),
            ("WAVE_SIZE", "8"),
            ("GEMINI_BASE_URL", "http://localhost:1234/v1beta/"),
            ("ADMIN_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.model_name, "gemini-2.5-pro");
        assert_eq!(config.wave_size, 8);
        assert_eq!(config.gemini_base_url, "http://localhost:1234/v1beta");
        assert_eq!(config.admin_key.as_deref(), Some("k"));
    }

    #[test]
    fn rejects_bad_numbers_and_zero_wave() {
        assert!(Config::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WAVE_SIZE", "0")])).is_err());
    }

    #[test]
    fn app_name_cannot_shadow_wellness_app() {
        let err = Config::from_lookup(lookup(&[("APP_NAME", "wellness_assistant")])).unwrap_err();
        assert!(err.to_string().contains("reserved"));
        assert!(Config::from_lookup(lookup(&[("APP_NAME", "hurricane-panel")])).is_ok());
    }

    #[test]
    fn scenario_template_needs_a_plan() {
        assert!(Config::from_lookup(lookup(&[("PERSONA_TEMPLATE_PATH", "t.txt")])).is_err());
        let config = Config::from_lookup(lookup(&[
            ("PERSONA_TEMPLATE_PATH", "t.txt"),
            ("EMERGENCY_PLAN_PATH", "plan.txt"),
            ("PHASE_NAME", "T-48 HOURS"),
        ]))
        .unwrap();
        assert_eq!(config.phase_name.as_deref(), Some("T-48 HOURS"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = Config::from_lookup(lookup(&[("MODEL_NAME", "  ")])).unwrap();
        assert_eq!(config.model_name, "gemini-2.0-flash-lite");
    }
}
