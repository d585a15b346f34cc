//! Goal-to-plan generation.
//!
//! A [`PlanGenerator`] turns a free-text goal into a short list of
//! `{title, daysOffset}` steps. `mock` works offline; `gemini` calls the
//! Generative Language API with a JSON response schema. [`apply_plan`] turns
//! the steps into tasks in one batch.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::batch::WriteBatch;
use crate::calendar;
use crate::config::AiConfig;
use crate::error::{Error, Result};
use crate::events::{Event, EventKind};
use crate::model::NewTask;
use crate::store::Store;

/// Environment variable holding the provider credential
pub const AI_KEY_ENV: &str = "PLANR_AI_KEY";

/// One generated step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub title: String,
    #[serde(rename = "daysOffset")]
    pub days_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Mock,
    Gemini,
    OpenAi,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mock => "mock",
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Claude => "claude",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mock" | "demo" => Ok(Provider::Mock),
            "gemini" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "claude" => Ok(Provider::Claude),
            other => Err(Error::ExternalProvider(format!("unknown provider '{other}'"))),
        }
    }
}

#[async_trait]
pub trait PlanGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(&self, goal: &str) -> Result<Vec<PlanEntry>>;
}

fn validate_goal(goal: &str) -> Result<&str> {
    let goal = goal.trim();
    if goal.is_empty() {
        return Err(Error::Validation("goal cannot be empty".to_string()));
    }
    Ok(goal)
}

/// Pick the generator for `provider`. Every provider except `mock` needs a
/// credential.
pub fn generator_for(
    provider: Provider,
    credential: Option<&str>,
    config: &AiConfig,
) -> Result<Box<dyn PlanGenerator>> {
    if provider == Provider::Mock {
        return Ok(Box::new(MockPlanner));
    }

    let credential = credential
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            Error::ExternalProvider(format!(
                "no API key for {provider} (use --key or {AI_KEY_ENV})"
            ))
        })?;

    match provider {
        Provider::Gemini => Ok(Box::new(GeminiPlanner::new(credential, config)?)),
        Provider::OpenAi | Provider::Claude => Err(Error::ExternalProvider(format!(
            "{provider} is not supported yet; use mock or gemini"
        ))),
        Provider::Mock => Ok(Box::new(MockPlanner)),
    }
}

/// Offline generator producing a fixed six-step plan around the goal.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockPlanner;

#[async_trait]
impl PlanGenerator for MockPlanner {
    fn provider(&self) -> Provider {
        Provider::Mock
    }

    async fn generate(&self, goal: &str) -> Result<Vec<PlanEntry>> {
        let goal = validate_goal(goal)?;
        let words: Vec<&str> = goal.split_whitespace().collect();
        let topic = if words.len() > 2 {
            format!("{} {}...", words[0].to_lowercase(), words[1].to_lowercase())
        } else {
            goal.to_string()
        };

        let steps = [
            (format!("Research {topic} (basics)"), 0),
            ("Set up tools and dependencies".to_string(), 1),
            ("Outline the project structure".to_string(), 2),
            (format!("First hands-on attempt at {topic}"), 4),
            ("Review progress and adjust the plan".to_string(), 6),
            ("Final review and launch".to_string(), 8),
        ];
        Ok(steps
            .into_iter()
            .map(|(title, days_offset)| PlanEntry { title, days_offset })
            .collect())
    }
}

/// Gemini `generateContent` client
#[derive(Debug, Clone)]
pub struct GeminiPlanner {
    http: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    title: String,
    #[serde(rename = "daysOffset")]
    days_offset: f64,
}

impl GeminiPlanner {
    pub fn new(api_key: &str, config: &AiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("planr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::ExternalProvider(format!("http client: {err}")))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: config.gemini_endpoint.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.endpoint, self.model
        )
    }

    fn request_body(goal: &str) -> serde_json::Value {
        let prompt = format!(
            "I want to reach this goal: \"{goal}\". You are a professional task planner. \
             Break the goal into 5-8 concrete, short, sequential tasks. Each task has a \
             title and an offset in days from today (daysOffset)."
        );
        serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "description": "JSON array of task objects.",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "title": { "type": "STRING", "description": "Task title." },
                            "daysOffset": {
                                "type": "NUMBER",
                                "description": "Days from today (0 = today, 1 = tomorrow)."
                            }
                        },
                        "required": ["title", "daysOffset"]
                    }
                }
            }
        })
    }
}

/// Parse the JSON array the model returned as text.
pub fn parse_entries(text: &str) -> Result<Vec<PlanEntry>> {
    let raw: Vec<RawEntry> = serde_json::from_str(text)
        .map_err(|err| Error::ExternalProvider(format!("malformed plan: {err}")))?;
    if raw.is_empty() {
        return Err(Error::ExternalProvider("provider returned an empty plan".to_string()));
    }

    raw.into_iter()
        .map(|entry| {
            let title = entry.title.trim();
            if title.is_empty() {
                return Err(Error::ExternalProvider(
                    "plan entry with empty title".to_string(),
                ));
            }
            let offset = entry.days_offset;
            if !offset.is_finite() || offset < 0.0 || offset.fract() != 0.0 || offset > 366.0 {
                return Err(Error::ExternalProvider(format!(
                    "plan entry '{title}' has invalid daysOffset {offset}"
                )));
            }
            Ok(PlanEntry {
                title: title.to_string(),
                days_offset: offset as u32,
            })
        })
        .collect()
}

#[async_trait]
impl PlanGenerator for GeminiPlanner {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, goal: &str) -> Result<Vec<PlanEntry>> {
        let goal = validate_goal(goal)?;
        debug!(model = %self.model, "requesting plan from gemini");

        let res = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(goal))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    Error::ExternalProvider("gemini request timed out".to_string())
                } else {
                    Error::ExternalProvider(format!("gemini request failed: {err}"))
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    Error::ExternalProvider(format!("gemini rejected the API key: {message}"))
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    Error::ExternalProvider(format!("gemini quota exceeded: {message}"))
                }
                _ => Error::ExternalProvider(format!("gemini http {}: {message}", status.as_u16())),
            });
        }

        let response: GeminiResponse = res
            .json()
            .await
            .map_err(|err| Error::ExternalProvider(format!("malformed gemini response: {err}")))?;
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| {
                Error::ExternalProvider("gemini returned no structured plan".to_string())
            })?;

        parse_entries(&text)
    }
}

/// Tasks created from a plan
#[derive(Debug, Clone, Serialize)]
pub struct AppliedPlan {
    pub task_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
}

/// Due date of an entry relative to `today`.
pub fn entry_due_date(entry: &PlanEntry, today: NaiveDate) -> Result<NaiveDate> {
    calendar::add_days(today, i64::from(entry.days_offset)).ok_or_else(|| {
        Error::Validation(format!("daysOffset {} out of range", entry.days_offset))
    })
}

/// Create one task per entry, all in a single batch, titled
/// `title_prefix + title` and due `today + daysOffset`.
pub fn apply_plan(
    store: &Store,
    entries: &[PlanEntry],
    today: NaiveDate,
    title_prefix: &str,
) -> Result<AppliedPlan> {
    store.ensure_ready()?;

    let mut batch = WriteBatch::new();
    for entry in entries {
        let due = entry_due_date(entry, today)?;
        batch.create_task(NewTask::manual(format!("{title_prefix}{}", entry.title), due));
    }
    let committed = store.commit(batch)?;

    let applied = AppliedPlan {
        task_ids: committed.created_task_ids(),
        batch_id: committed.batch_id,
    };
    info!(tasks = applied.task_ids.len(), "plan applied");
    if let Ok(event) = Event::new(EventKind::PlanApplied, None).with_data(&applied) {
        store.emit(&event);
    }
    Ok(applied)
}
