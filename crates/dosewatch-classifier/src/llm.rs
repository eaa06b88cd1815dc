//! LLM-backed classifier.
//!
//! [`LlmClassifier`] turns a pair into a prompt, hands it to an
//! [`LlmBackend`] and parses the verdict out of the reply. With the `ollama`
//! feature, [`OllamaBackend`] talks to a local Ollama server.

use crate::prompts::{make_classification_prompt, system_prompt_with_examples, SYSTEM_PROMPT};
use crate::{parse_verdict, ClassifierResult, DrugRef, InteractionClassifier, Verdict};

/// Text generation service behind the classifier.
pub trait LlmBackend: Send + Sync {
    fn generate(&self, system: &str, prompt: &str) -> ClassifierResult<String>;
}

/// Classifier that asks a language model for each pair.
pub struct LlmClassifier<B> {
    backend: B,
    system: String,
}

impl<B: LlmBackend> LlmClassifier<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            system: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Include the few-shot examples in the system prompt.
    pub fn with_examples(mut self) -> Self {
        self.system = system_prompt_with_examples();
        self
    }
}

impl<B: LlmBackend> InteractionClassifier for LlmClassifier<B> {
    fn classify(&self, a: &DrugRef, b: &DrugRef) -> ClassifierResult<Verdict> {
        let reply = self
            .backend
            .generate(&self.system, &make_classification_prompt(a, b))?;
        parse_verdict(&reply)
    }
}

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(feature = "ollama")]
mod ollama {
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use super::LlmBackend;
    use crate::{ClassifierError, ClassifierResult};

    /// Ollama HTTP backend (`/api/generate`, non-streaming, JSON mode).
    pub struct OllamaBackend {
        base_url: String,
        model: String,
        client: reqwest::blocking::Client,
    }

    #[derive(Serialize)]
    struct GenerateRequest<'a> {
        model: &'a str,
        prompt: &'a str,
        system: &'a str,
        format: &'a str,
        stream: bool,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        response: String,
    }

    impl OllamaBackend {
        pub fn new(base_url: &str, model: &str, timeout: Duration) -> ClassifierResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ClassifierError::Unavailable(e.to_string()))?;
            Ok(Self {
                base_url: base_url.trim_end_matches('/').to_string(),
                model: model.to_string(),
                client,
            })
        }
    }

    impl LlmBackend for OllamaBackend {
        fn generate(&self, system: &str, prompt: &str) -> ClassifierResult<String> {
            let url = format!("{}/api/generate", self.base_url);
            let body = GenerateRequest {
                model: &self.model,
                prompt,
                system,
                format: "json",
                stream: false,
            };

            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| ClassifierError::Unavailable(format!("{}: {e}", self.base_url)))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(ClassifierError::Unavailable(format!(
                    "ollama returned {}: {body}",
                    status.as_u16()
                )));
            }

            let parsed: GenerateResponse = response
                .json()
                .map_err(|e| ClassifierError::InvalidFormat(e.to_string()))?;
            Ok(parsed.response)
        }
    }
}
