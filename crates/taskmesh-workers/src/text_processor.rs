use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskmesh_agent::{worker_agent, Agent, AgentBehavior, LogLevel};
use taskmesh_core::{AgentConfig, Message, Task, TaskmeshError, TaskmeshResult};
use tracing::debug;

/// Factory key of the text processor.
pub const TEXT_PROCESSOR_TYPE: &str = "text-processor";

/// Capabilities a text processor declares by default.
pub const TEXT_PROCESSOR_CAPABILITIES: [&str; 3] =
    ["text-extraction", "text-summarization", "text-analysis"];

/// Default concurrency limit of a text processor.
pub const TEXT_PROCESSOR_MAX_CONCURRENT: usize = 3;

const DEFAULT_SUMMARY_WORDS: usize = 100;

#[derive(Debug, Deserialize)]
struct TextJob {
    action: String,
    text: String,
    #[serde(default)]
    options: TextOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextOptions {
    extract_pattern: Option<String>,
    max_length: Option<usize>,
}

/// Word, sentence and character statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnalysis {
    /// Whitespace separated words.
    pub word_count: usize,
    /// Non-empty runs between `.`, `!` and `?`.
    pub sentence_count: usize,
    /// Unicode scalar values.
    pub character_count: usize,
    /// Mean word length in characters, 0 for empty text.
    pub average_word_length: f64,
}

fn sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Every match of `pattern`, or the sentences of `text` when no pattern is given.
pub fn extract(text: &str, pattern: Option<&str>) -> TaskmeshResult<Vec<String>> {
    match pattern {
        Some(pattern) => {
            let regex = Regex::new(pattern)
                .map_err(|e| TaskmeshError::InvalidPayload(format!("Invalid extract pattern: {e}")))?;
            Ok(regex.find_iter(text).map(|m| m.as_str().to_string()).collect())
        }
        None => Ok(sentences(text)),
    }
}

/// The first `max_words` words followed by `...`, or the text unchanged
/// when it is already short enough.
pub fn summarize(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    format!("{}...", words[..max_words].join(" "))
}

/// Count words, sentences and characters.
pub fn analyze(text: &str) -> TextAnalysis {
    let words: Vec<&str> = text.split_whitespace().collect();
    let total_word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let average_word_length = if words.is_empty() {
        0.0
    } else {
        total_word_chars as f64 / words.len() as f64
    };
    TextAnalysis {
        word_count: words.len(),
        sentence_count: sentences(text).len(),
        character_count: text.chars().count(),
        average_word_length,
    }
}

/// Extracts, summarizes and analyzes text payloads.
///
/// Task payload: `{"action": "extract" | "summarize" | "analyze", "text": ...,
/// "options": {"extractPattern"?, "maxLength"?}}`.
#[derive(Debug, Default)]
pub struct TextProcessor;

#[async_trait]
impl AgentBehavior for TextProcessor {
    async fn on_initialize(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        agent.log(LogLevel::Info, "Text processor agent initialized");
        Ok(())
    }

    async fn on_terminate(&self, agent: &Arc<Agent>) -> TaskmeshResult<()> {
        agent.log(LogLevel::Info, "Text processor agent terminated");
        Ok(())
    }

    async fn on_execute(&self, _agent: &Arc<Agent>, task: &Task) -> TaskmeshResult<serde_json::Value> {
        let job: TextJob = serde_json::from_value(task.payload.clone())
            .map_err(|e| TaskmeshError::InvalidPayload(format!("text job: {e}")))?;

        let output = match job.action.as_str() {
            "extract" => {
                let extracted = extract(&job.text, job.options.extract_pattern.as_deref())?;
                serde_json::json!({ "extracted": extracted })
            }
            "summarize" => {
                let max = job.options.max_length.unwrap_or(DEFAULT_SUMMARY_WORDS);
                serde_json::json!({ "summary": summarize(&job.text, max) })
            }
            "analyze" => serde_json::to_value(analyze(&job.text))?,
            other => {
                return Err(TaskmeshError::Agent(format!(
                    "Unknown text processing action: {other}"
                )))
            }
        };
        Ok(output)
    }

    async fn on_message(&self, agent: &Arc<Agent>, message: Message) -> TaskmeshResult<()> {
        debug!(agent_id = %agent.id(), from = %message.from(), kind = %message.kind(), "Ignoring message");
        Ok(())
    }
}

/// Build a text processor agent.
pub fn text_processor(config: AgentConfig) -> Arc<Agent> {
    worker_agent(config, TextProcessor)
}
