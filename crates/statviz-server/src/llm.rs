//! Natural language to SQL + chart spec interpretation
//!
//! The interpreter is a capability: one production implementation backed by
//! OpenAI chat completions, one deterministic fixture implementation for
//! tests and offline use. Both return a complete [`Interpretation`] or a
//! typed error, never partial state. Model output is untrusted text; it is
//! parsed here but only admitted to the store after the SQL guard.

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use statviz_catalog::SchemaCatalog;
use statviz_model::Interpretation;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::hints::PromptHints;

#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("{0}")]
    Ambiguous(String),

    #[error("Inference call exceeded {0:?}")]
    Timeout(Duration),

    #[error("Inference transport failure: {0}")]
    Transport(String),
}

/// Converts a free-text question (+ entity hints) into SQL and a chart spec.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        prompt: &str,
        hints: &PromptHints,
        catalog: &SchemaCatalog,
    ) -> Result<Interpretation, InterpretError>;
}

/// System prompt: the JSON contract plus SQL and chart construction rules.
/// The store catalog is appended per call as grounding context.
const SYSTEM_PROMPT: &str = r#"You convert analytical questions about sports data into a strict JSON payload for a chart rendering pipeline.

Respond ONLY with compact JSON, no markdown, no commentary. Expected payload:
{"sql": "<single SQL query, no trailing semicolon>", "params": {...}, "chart": {"type": "line|bar", "x": "<column>", "y": "<column>", "title": "<title>", "options": {}}, "league": "<league name>"}

SQL rules:
- A single SELECT statement; at most one CTE; never any DDL or DML.
- Never prefix tables with a schema name: the pipeline selects the league schema for you.
- Parameterize every literal filter value as :name and put the value in params (e.g. teamName ILIKE :team_pattern). Never inline user-supplied strings.
- Alias every projected column with a simple snake_case name (season, wins, goals) and reuse EXACTLY those names in chart.x and chart.y.
- Points and goals live in statTeamMatch joined to statName with sn.statNameLib = 'SCORE'.
- LEFT JOIN season s ON m.seasonId = s.seasonId before using s.seasonLabel.
- Use consistent aliases (m=match, stm=statTeamMatch, sn=statName, s=season, t=team) and never invent columns.

Chart rules:
- Ranking questions ("top", "best", "most") -> type "bar" with options.top_n.
- Over-time questions ("per season", "evolution", "trend") -> type "line"; add options.rolling only when the question asks for smoothing.
- chart.x is the label column (usually season), chart.y the measure.

League rules:
- HINT lines in the user message are authoritative: never contradict a hinted league.
- If the question names a club, filter that club (teamName ILIKE :team_pattern) and infer its league when not hinted.
- If no club is mentioned, aggregate at league level and do not add any team filter.

If the league or the statistic cannot be determined from the question and the catalog, respond with {"decline": "<what is missing>"} instead of guessing."#;

/// A declined interpretation, the model's content-level refusal.
#[derive(Debug, Deserialize)]
struct Decline {
    decline: String,
}

#[derive(Debug)]
enum Reply {
    Parsed(Interpretation),
    Declined(String),
    Malformed(String),
}

/// Parse a model reply into an interpretation, a decline, or a parse
/// failure (which is fed back for one more attempt).
fn parse_reply(content: &str) -> Reply {
    let stripped = strip_code_fences(content);

    if let Ok(decline) = serde_json::from_str::<Decline>(stripped) {
        return Reply::Declined(decline.decline);
    }

    match serde_json::from_str::<Interpretation>(stripped) {
        Ok(interpretation) => {
            if interpretation.sql.trim().is_empty() {
                Reply::Malformed("the sql field is empty".to_string())
            } else if interpretation.chart.x.trim().is_empty()
                || interpretation.chart.y.trim().is_empty()
            {
                Reply::Malformed("chart.x and chart.y must name projected columns".to_string())
            } else {
                Reply::Parsed(interpretation)
            }
        }
        Err(e) => Reply::Malformed(e.to_string()),
    }
}

/// Replies sometimes arrive fenced in markdown despite the contract.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Production interpreter backed by OpenAI chat completions.
pub struct OpenAiInterpreter {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
    max_retries: usize,
}

impl OpenAiInterpreter {
    pub fn new(
        client: Client<OpenAIConfig>,
        model: impl Into<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
            max_retries,
        }
    }

    async fn run(
        &self,
        prompt: &str,
        hints: &PromptHints,
        catalog: &SchemaCatalog,
    ) -> Result<Interpretation, InterpretError> {
        let system_prompt = format!(
            "{}\n\n## Store catalog\n\n{}",
            SYSTEM_PROMPT,
            catalog.prompt_context()
        );

        let mut user_prompt = prompt.to_string();
        if hints.league.is_some() || hints.club.is_some() {
            user_prompt.push_str(&format!(
                "\nHINT: league={}; club={}",
                hints.league.as_deref().unwrap_or(""),
                hints.club.as_deref().unwrap_or("")
            ));
        }

        let mut messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(|e| InterpretError::Transport(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(user_prompt)
                    .build()
                    .map_err(|e| InterpretError::Transport(e.to_string()))?,
            ),
        ];

        let mut last_failure = String::new();

        for attempt in 0..=self.max_retries {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .messages(messages.clone())
                .temperature(0.1)
                .build()
                .map_err(|e| InterpretError::Transport(e.to_string()))?;

            let response = match self.client.chat().create(request).await {
                Ok(response) => response,
                Err(e) => {
                    // Network-class failure: retry within the bound
                    warn!("inference call failed (attempt {}): {}", attempt + 1, e);
                    last_failure = e.to_string();
                    continue;
                }
            };

            let Some(content) = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
            else {
                last_failure = "empty completion".to_string();
                continue;
            };

            info!("interpreter reply (attempt {}): {}", attempt + 1, content);

            match parse_reply(&content) {
                Reply::Parsed(interpretation) => return Ok(interpretation),
                Reply::Declined(reason) => {
                    // Content-level refusal is final, never retried
                    return Err(InterpretError::Ambiguous(reason));
                }
                Reply::Malformed(reason) => {
                    if attempt == self.max_retries {
                        return Err(InterpretError::Ambiguous(format!(
                            "model reply could not be used after {} attempts: {}",
                            attempt + 1,
                            reason
                        )));
                    }
                    // Feed the failure back and let the model repair its reply
                    messages.push(ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(content.clone())
                            .build()
                            .map_err(|e| InterpretError::Transport(e.to_string()))?,
                    ));
                    messages.push(ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(format!(
                                "Error: {reason}. Respond again with ONLY the expected compact JSON payload."
                            ))
                            .build()
                            .map_err(|e| InterpretError::Transport(e.to_string()))?,
                    ));
                }
            }
        }

        Err(InterpretError::Transport(format!(
            "inference failed after {} attempts: {}",
            self.max_retries + 1,
            last_failure
        )))
    }
}

#[async_trait]
impl Interpreter for OpenAiInterpreter {
    async fn interpret(
        &self,
        prompt: &str,
        hints: &PromptHints,
        catalog: &SchemaCatalog,
    ) -> Result<Interpretation, InterpretError> {
        // One deadline over the whole retry loop; the request must never
        // hold a store connection while waiting on this.
        tokio::time::timeout(self.timeout, self.run(prompt, hints, catalog))
            .await
            .map_err(|_| InterpretError::Timeout(self.timeout))?
    }
}

/// Deterministic interpreter for tests and offline runs: a fixed
/// prompt -> interpretation table, ambiguous for anything else.
#[derive(Debug, Default)]
pub struct FixtureInterpreter {
    fixtures: HashMap<String, Interpretation>,
}

impl FixtureInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, prompt: impl Into<String>, interpretation: Interpretation) -> Self {
        self.fixtures.insert(prompt.into(), interpretation);
        self
    }
}

#[async_trait]
impl Interpreter for FixtureInterpreter {
    async fn interpret(
        &self,
        prompt: &str,
        _hints: &PromptHints,
        _catalog: &SchemaCatalog,
    ) -> Result<Interpretation, InterpretError> {
        self.fixtures.get(prompt).cloned().ok_or_else(|| {
            InterpretError::Ambiguous(format!("no interpretation for prompt: {prompt}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statviz_model::{ChartKind, ChartSpec};

    #[test]
    fn test_system_prompt_carries_contract() {
        assert!(SYSTEM_PROMPT.contains("\"sql\""));
        assert!(SYSTEM_PROMPT.contains("line|bar"));
        assert!(SYSTEM_PROMPT.contains("statNameLib = 'SCORE'"));
        assert!(SYSTEM_PROMPT.contains("decline"));
    }

    #[test]
    fn test_parse_reply_accepts_payload() {
        let content = r#"{"sql": "SELECT 1 AS x, 2 AS y", "params": {}, "chart": {"type": "line", "x": "x", "y": "y"}, "league": "NBA"}"#;
        match parse_reply(content) {
            Reply::Parsed(i) => {
                assert_eq!(i.league.as_deref(), Some("NBA"));
                assert_eq!(i.chart.kind, ChartKind::Line);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reply_strips_fences() {
        let content = "```json\n{\"sql\": \"SELECT 1 AS x\", \"chart\": {\"type\": \"bar\", \"x\": \"x\", \"y\": \"x\"}}\n```";
        assert!(matches!(parse_reply(content), Reply::Parsed(_)));
    }

    #[test]
    fn test_parse_reply_decline() {
        match parse_reply(r#"{"decline": "no statistic named"}"#) {
            Reply::Declined(reason) => assert!(reason.contains("statistic")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[test]
    fn test_parse_reply_rejects_empty_axes() {
        let content = r#"{"sql": "SELECT 1 AS x", "chart": {"type": "bar", "x": "", "y": "x"}}"#;
        assert!(matches!(parse_reply(content), Reply::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fixture_interpreter_round_trip() {
        let interpretation = Interpretation {
            sql: "SELECT seasonLabel AS season FROM season".to_string(),
            params: serde_json::Map::new(),
            chart: ChartSpec {
                kind: ChartKind::Line,
                x: "season".to_string(),
                y: "season".to_string(),
                title: None,
                x_label: None,
                y_label: None,
                options: Default::default(),
            },
            league: Some("Bundesliga".to_string()),
        };
        let interpreter =
            FixtureInterpreter::new().with("goals per season", interpretation.clone());

        let catalog = SchemaCatalog::builtin();
        let hints = PromptHints::default();
        let out = interpreter
            .interpret("goals per season", &hints, &catalog)
            .await
            .unwrap();
        assert_eq!(out.sql, interpretation.sql);

        let err = interpreter
            .interpret("something else", &hints, &catalog)
            .await
            .unwrap_err();
        assert!(matches!(err, InterpretError::Ambiguous(_)));
    }
}
