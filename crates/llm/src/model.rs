use crate::persona::MEDICAL_ASSISTANT_PREAMBLE;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Low enough for stable, professional answers.
pub const DEFAULT_TEMPERATURE: f64 = 0.5;

/// Per-session generation parameters sent with every turn.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model_id: String,
    pub preamble: String,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            preamble: MEDICAL_ASSISTANT_PREAMBLE.trim().to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

impl GenerationSettings {
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
