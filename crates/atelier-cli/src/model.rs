//! Adapter between the core's `ModelProvider` seam and rig's provider
//! clients, plus provider client construction from config.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use atelier_config::{Config, ProviderConfig};
use atelier_core::agent::{ModelProvider, ModelReply};
use atelier_core::storage::{Message as StoredMessage, Role, ToolCall as StoredToolCall};
use atelier_core::tools::ToolRegistry;
#[allow(deprecated)]
use rig::client::completion::CompletionModelHandle;
use rig::client::{CompletionClient, Nothing};
use rig::completion::{CompletionModel, CompletionRequest, Message, ToolDefinition};
use rig::message::{
    AssistantContent, Text, ToolCall, ToolFunction, ToolResult, ToolResultContent, UserContent,
};
use rig::providers::{anthropic, deepseek, gemini, groq, mistral, ollama, openai, openrouter};
use rig::OneOrMany;

/// Tool definitions in the shape rig expects, built once per profile.
pub fn tool_definitions(registry: &ToolRegistry) -> Vec<ToolDefinition> {
    registry
        .list()
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            parameters: t.parameters_schema(),
        })
        .collect()
}

/// Drives a rig completion model behind the core's `ModelProvider` seam.
///
/// The persisted history maps onto rig's message shapes: system messages
/// become the preamble, assistant tool-call requests are re-encoded as
/// tool-call content, and tool results ride in user messages linked by
/// their originating call id.
#[allow(deprecated)]
pub struct RigModel {
    model: CompletionModelHandle<'static>,
    tool_defs: Vec<ToolDefinition>,
    temperature: f64,
    max_tokens: u64,
}

#[allow(deprecated)]
impl RigModel {
    pub fn new(
        model: CompletionModelHandle<'static>,
        tool_defs: Vec<ToolDefinition>,
        temperature: f64,
        max_tokens: u64,
    ) -> Self {
        Self {
            model,
            tool_defs,
            temperature,
            max_tokens,
        }
    }

    fn convert_history(messages: &[StoredMessage]) -> (Option<String>, Vec<Message>) {
        let mut preamble: Option<String> = None;
        let mut history: Vec<Message> = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => match preamble {
                    None => preamble = Some(msg.content.clone()),
                    Some(ref mut p) => {
                        p.push_str("\n\n");
                        p.push_str(&msg.content);
                    }
                },
                Role::User => {
                    history.push(Message::User {
                        content: OneOrMany::one(UserContent::Text(Text {
                            text: msg.content.clone(),
                        })),
                    });
                }
                Role::Assistant => {
                    let mut parts: Vec<AssistantContent> = Vec::new();
                    if !msg.content.is_empty() {
                        parts.push(AssistantContent::Text(Text {
                            text: msg.content.clone(),
                        }));
                    }
                    for call in msg.tool_calls.iter().flatten() {
                        parts.push(AssistantContent::ToolCall(ToolCall {
                            id: call.id.clone(),
                            call_id: None,
                            function: ToolFunction {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            },
                            signature: None,
                            additional_params: None,
                        }));
                    }
                    if parts.is_empty() {
                        parts.push(AssistantContent::Text(Text {
                            text: String::new(),
                        }));
                    }
                    history.push(Message::Assistant {
                        id: None,
                        content: OneOrMany::many(parts.clone()).unwrap_or_else(|_| {
                            OneOrMany::one(parts.remove(0))
                        }),
                    });
                }
                Role::Tool => {
                    let call_id = msg
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get("tool_call_id"))
                        .and_then(|id| id.as_str())
                        .unwrap_or_default()
                        .to_string();
                    history.push(Message::User {
                        content: OneOrMany::one(UserContent::ToolResult(ToolResult {
                            id: call_id,
                            call_id: None,
                            content: OneOrMany::one(ToolResultContent::Text(Text {
                                text: msg.content.clone(),
                            })),
                        })),
                    });
                }
            }
        }

        (preamble, history)
    }
}

#[allow(deprecated)]
#[async_trait]
impl ModelProvider for RigModel {
    async fn invoke(&self, messages: &[StoredMessage]) -> Result<ModelReply> {
        let (preamble, history) = Self::convert_history(messages);
        let chat_history = OneOrMany::many(history).unwrap_or_else(|_| {
            OneOrMany::one(Message::User {
                content: OneOrMany::one(UserContent::Text(Text {
                    text: String::new(),
                })),
            })
        });

        let request = CompletionRequest {
            preamble,
            chat_history,
            documents: Vec::new(),
            tools: self.tool_defs.clone(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            tool_choice: None,
            additional_params: None,
        };

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|e| anyhow::anyhow!("completion error: {e}"))?;

        let mut content = String::new();
        let mut tool_calls: Vec<StoredToolCall> = Vec::new();
        for choice in response.choice.iter() {
            match choice {
                AssistantContent::Text(t) => content.push_str(&t.text),
                AssistantContent::ToolCall(tc) => tool_calls.push(StoredToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                }),
                _ => {}
            }
        }

        Ok(ModelReply {
            content,
            tool_calls,
        })
    }
}

fn resolve_api_key(provider: &Option<ProviderConfig>, env_var: &str) -> Option<String> {
    provider
        .as_ref()
        .and_then(|c| c.api_key.clone())
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
}

fn api_base(provider: &Option<ProviderConfig>) -> Option<String> {
    provider
        .as_ref()
        .and_then(|c| c.api_base.clone())
        .filter(|b| !b.is_empty())
}

fn require_key(provider: &Option<ProviderConfig>, name: &str, env_var: &str) -> Result<String> {
    resolve_api_key(provider, env_var).ok_or_else(|| {
        anyhow::anyhow!(
            "provider '{name}' selected but no API key found; \
             set providers.{name}.apiKey in config.json or the {env_var} env var"
        )
    })
}

/// Build a completion model handle for the configured provider.
#[allow(deprecated)]
pub fn create_model_for(
    provider: &str,
    model_name: &str,
    config: &Config,
) -> Result<CompletionModelHandle<'static>> {
    if model_name.is_empty() {
        anyhow::bail!("no model configured for provider '{provider}'");
    }

    match provider {
        "anthropic" => {
            let key = require_key(&config.providers.anthropic, "anthropic", "ANTHROPIC_API_KEY")?;
            let client: anthropic::Client = anthropic::Client::builder()
                .api_key(&key)
                .build()
                .map_err(|e| anyhow::anyhow!("failed to create Anthropic client: {e}"))?;
            let model = client.completion_model(model_name).with_prompt_caching();
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "openai" => {
            let key = require_key(&config.providers.openai, "openai", "OPENAI_API_KEY")?;
            let mut builder = openai::CompletionsClient::builder().api_key(&key);
            if let Some(base) = api_base(&config.providers.openai) {
                builder = builder.base_url(&base);
            }
            let client: openai::CompletionsClient = builder
                .build()
                .map_err(|e| anyhow::anyhow!("failed to create OpenAI client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "ollama" => {
            let mut builder = ollama::Client::builder().api_key(Nothing);
            if let Some(base) = api_base(&config.providers.ollama) {
                builder = builder.base_url(&base);
            }
            let client: ollama::Client = builder
                .build()
                .map_err(|e| anyhow::anyhow!("failed to create Ollama client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "openrouter" => {
            let key = require_key(&config.providers.openrouter, "openrouter", "OPENROUTER_API_KEY")?;
            let client: openrouter::Client = openrouter::Client::new(&key)
                .map_err(|e| anyhow::anyhow!("failed to create OpenRouter client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "deepseek" => {
            let key = require_key(&config.providers.deepseek, "deepseek", "DEEPSEEK_API_KEY")?;
            let client: deepseek::Client = deepseek::Client::new(&key)
                .map_err(|e| anyhow::anyhow!("failed to create DeepSeek client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "groq" => {
            let key = require_key(&config.providers.groq, "groq", "GROQ_API_KEY")?;
            let client: groq::Client = groq::Client::new(&key)
                .map_err(|e| anyhow::anyhow!("failed to create Groq client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "gemini" => {
            let key = require_key(&config.providers.gemini, "gemini", "GEMINI_API_KEY")?;
            let client: gemini::Client = gemini::Client::new(key)
                .map_err(|e| anyhow::anyhow!("failed to create Gemini client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        "mistral" => {
            let key = require_key(&config.providers.mistral, "mistral", "MISTRAL_API_KEY")?;
            let client: mistral::Client = mistral::Client::new(&key)
                .map_err(|e| anyhow::anyhow!("failed to create Mistral client: {e}"))?;
            let model = client.completion_model(model_name);
            Ok(CompletionModelHandle::new(Arc::new(model)))
        }

        other => {
            anyhow::bail!(
                "unknown provider '{other}'; valid providers: \
                 anthropic, openai, ollama, openrouter, deepseek, groq, gemini, mistral"
            );
        }
    }
}
