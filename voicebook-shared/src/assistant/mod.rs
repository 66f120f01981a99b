/// Language-model collaborators
///
/// Two contracts are consumed by the request handlers:
///
/// - [`EntryParser`] turns free text ("中午吃排骨便當120元") into a
///   [`LedgerEntry`], failing with [`AssistantError::Parse`] when the model
///   output cannot be coerced into an entry.
/// - [`Answerer`] answers a question about the user's spending given the
///   month's stats and some extra context.
///
/// [`OpenAiAssistant`] implements both. It is the only component allowed to
/// retry a provider call, with a bounded exponential backoff.

pub mod openai;

pub use openai::{OpenAiAssistant, OpenAiConfig, RetryPolicy};

use crate::error::{Classify, ErrorKind};
use crate::ledger::entry::{is_known_category, FALLBACK_CATEGORY, TIME_FORMAT};
use crate::ledger::{LedgerEntry, LedgerRecord, MonthlyStats};
use crate::provider::ProviderError;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use serde_json::{Map, Value};
use tracing::warn;

/// Error type for assistant operations
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Model output could not be turned into the requested shape
    #[error("Could not understand the input: {0}")]
    Parse(String),

    /// The model provider failed after all retries
    #[error("Assistant provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl Classify for AssistantError {
    fn kind(&self) -> ErrorKind {
        match self {
            AssistantError::Parse(_) => ErrorKind::Validation,
            AssistantError::Provider(_) => ErrorKind::ExternalService,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AssistantError::Parse(_) => "PARSE_FAILED",
            AssistantError::Provider(_) => "ASSISTANT_ERROR",
        }
    }
}

/// What the parser needs to know besides the text itself
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Current time in the user's timezone, used for relative expressions
    pub now: DateTime<Tz>,

    /// Currency assumed when the text names none
    pub default_currency: String,
}

/// Extra context handed to the answerer
#[derive(Debug, Clone, Default)]
pub struct AnswerContext {
    pub monthly_budget: Option<i64>,
    pub recent_records: Vec<LedgerRecord>,
    pub timezone: Option<String>,
}

/// Text-structuring collaborator
#[async_trait]
pub trait EntryParser: Send + Sync {
    async fn parse(&self, text: &str, context: &ParseContext) -> Result<LedgerEntry, AssistantError>;
}

/// Natural-language answering collaborator
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        stats: &MonthlyStats,
        extras: &AnswerContext,
    ) -> Result<String, AssistantError>;
}

/// Short comment on a freshly recorded entry, or None if the answerer fails
///
/// Never fails; the caller's write has already succeeded.
pub async fn record_feedback(
    answerer: &dyn Answerer,
    entry: &LedgerEntry,
    stats: &MonthlyStats,
    extras: &AnswerContext,
) -> Option<String> {
    let question = format!(
        "我剛記了一筆「{}」{} {}（{}）。請用一兩句話給我這個月花費的回饋。",
        entry.name,
        crate::ledger::entry::format_amount(entry.amount),
        entry.currency,
        entry.category,
    );

    match answerer.answer(&question, stats, extras).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Feedback generation failed, omitting");
            None
        }
    }
}

fn field<'a>(object: &'a Map<String, Value>, canonical: &str, legacy: &str) -> Option<&'a Value> {
    object
        .get(canonical)
        .or_else(|| object.get(legacy))
        .filter(|v| !v.is_null())
}

fn text(object: &Map<String, Value>, canonical: &str, legacy: &str) -> Option<String> {
    field(object, canonical, legacy).map(|v| match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

/// Coerces a model's JSON object into an entry
///
/// Accepts canonical or localized keys and numeric strings for the amount.
/// A missing time becomes `context.now`, a missing currency the default, and
/// an unknown category falls back to [`FALLBACK_CATEGORY`].
pub fn entry_from_json(value: &Value, context: &ParseContext) -> Result<LedgerEntry, AssistantError> {
    let object = value
        .as_object()
        .ok_or_else(|| AssistantError::Parse("expected a JSON object".to_string()))?;

    let name = text(object, "name", "名稱")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AssistantError::Parse("missing name".to_string()))?;

    let amount = match field(object, "amount", "花費") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.replace(',', "").trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AssistantError::Parse("missing or non-numeric amount".to_string()))?;

    let category = text(object, "category", "類別")
        .filter(|c| is_known_category(c))
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());

    let time = text(object, "time", "時間")
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| context.now.format(TIME_FORMAT).to_string());

    let currency = text(object, "currency", "幣別")
        .filter(|c| !c.is_empty())
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| context.default_currency.clone());

    let payment_method = text(object, "payment_method", "支付方式").filter(|p| !p.is_empty());

    let entry = LedgerEntry {
        time,
        name,
        category,
        amount,
        currency,
        payment_method,
    };
    entry.validate().map_err(AssistantError::Parse)?;
    Ok(entry)
}
