/// OpenAI chat-completions assistant
///
/// Implements [`EntryParser`] (JSON mode) and [`Answerer`] (plain text) on
/// top of the shared HTTP client. Transport failures, timeouts, 429 and 5xx
/// responses are retried with exponential backoff up to
/// [`RetryPolicy::max_retries`] times; other failures are returned as is.

use super::{entry_from_json, AnswerContext, Answerer, AssistantError, EntryParser, ParseContext};
use crate::ledger::entry::{format_amount, CATEGORIES};
use crate::ledger::{LedgerEntry, MonthlyStats};
use crate::provider::{check_status, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

const CHAT_COMPLETIONS_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Retry schedule for model calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-indexed), doubling each time
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// OpenAI client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub retry: RetryPolicy,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: CHAT_COMPLETIONS_ENDPOINT.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

fn is_retryable(err: &ProviderError) -> bool {
    match err {
        ProviderError::Timeout | ProviderError::Http(_) => true,
        ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
        ProviderError::Decode(_) | ProviderError::NotFound(_) => false,
    }
}

fn parser_prompt() -> String {
    format!(
        "你是我的記帳小助手，我會給你一串訊息，根據訊息幫我整理出以下資訊：\n\
         - \"time\"：花費時間（格式：YYYY-MM-DD HH:MM），未提及時用 current_time\n\
         - \"name\"：花費內容名稱\n\
         - \"category\"：屬於哪一種類（{}）\n\
         - \"amount\"：金額（數字）\n\
         - \"currency\"：哪一種貨幣，若未提供用 default_currency\n\
         - \"payment_method\"：支付方式（現金、信用卡、悠遊卡等），若未提供為 null\n\
         請用 JSON 格式回答，不要包含其他說明文字。",
        CATEGORIES.join("、")
    )
}

const ANSWER_PROMPT: &str = "你是我的記帳小助手。根據提供的本月統計與近期紀錄回答問題，\
回答簡短、使用繁體中文，金額不要自行捏造。";

/// Renders the stats and extras as the answerer's context message
fn answer_context(stats: &MonthlyStats, extras: &AnswerContext) -> String {
    let mut lines = vec![
        format!("month: {}", stats.month),
        format!("total: {}", format_amount(stats.total)),
        format!("record_count: {}", stats.record_count),
    ];

    for (category, total) in &stats.totals_by_category {
        let count = stats.counts_by_category.get(category).copied().unwrap_or(0);
        lines.push(format!("category {}: {} ({} records)", category, format_amount(*total), count));
    }

    if let Some(budget) = extras.monthly_budget {
        lines.push(format!("monthly_budget: {}", budget));
        if let Some(usage) = stats.budget_usage(Some(budget)) {
            lines.push(format!("budget_used: {:.0}%", usage * 100.0));
        }
    }
    if let Some(tz) = &extras.timezone {
        lines.push(format!("timezone: {}", tz));
    }

    for record in &extras.recent_records {
        lines.push(format!(
            "recent: {} {} {} {}",
            record.time(),
            record.name(),
            record.category(),
            record.get("amount")
        ));
    }

    lines.join("\n")
}

/// OpenAI-backed [`EntryParser`] and [`Answerer`]
#[derive(Debug, Clone)]
pub struct OpenAiAssistant {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiAssistant {
    pub fn new(http: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { http, config }
    }

    /// Sends one chat request, retrying transient failures
    async fn complete(&self, body: Value) -> Result<String, ProviderError> {
        let mut retry = 0;
        loop {
            match self.complete_once(&body).await {
                Ok(content) => return Ok(content),
                Err(e) if is_retryable(&e) && retry < self.config.retry.max_retries => {
                    let delay = self.config.retry.backoff_for(retry);
                    warn!(
                        error = %e,
                        retry = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Assistant call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn complete_once(&self, body: &Value) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let chat: ChatResponse = check_status(response).await?.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("response has no message content".to_string()))
    }
}

#[async_trait]
impl EntryParser for OpenAiAssistant {
    async fn parse(&self, text: &str, context: &ParseContext) -> Result<LedgerEntry, AssistantError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": parser_prompt() },
                {
                    "role": "user",
                    "content": format!(
                        "current_time: {}, default_currency: {}, user_content: {}",
                        context.now.format("%Y-%m-%d %H:%M"),
                        context.default_currency,
                        text
                    )
                }
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.2,
            "max_tokens": 256
        });

        let content = self.complete(body).await?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| AssistantError::Parse(format!("model returned invalid JSON: {}", e)))?;

        let entry = entry_from_json(&value, context)?;
        debug!(category = %entry.category, "Text parsed into entry");
        Ok(entry)
    }
}

#[async_trait]
impl Answerer for OpenAiAssistant {
    async fn answer(
        &self,
        question: &str,
        stats: &MonthlyStats,
        extras: &AnswerContext,
    ) -> Result<String, AssistantError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": ANSWER_PROMPT },
                { "role": "system", "content": answer_context(stats, extras) },
                { "role": "user", "content": question }
            ],
            "temperature": 0.7,
            "max_tokens": 300
        });

        Ok(self.complete(body).await?.trim().to_string())
    }
}
