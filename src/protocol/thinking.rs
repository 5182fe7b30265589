//! Thinking-mode policy: normalizes the loose `thinking` request field and renders
//! the textual hint used by upstreams without a native thinking switch.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use super::canonical::{CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, MessageContent};

pub const DEFAULT_THINKING_BUDGET: u64 = 200_000;

const THINKING_MODE_MARKER: &str = "<thinking_mode>";
const MAX_THINKING_LENGTH_MARKER: &str = "<max_thinking_length>";

/// The `thinking` field as clients send it.
///
/// Accepted shapes: a boolean, a mode string (`"enabled"`), an object with
/// `type` and/or `budget_tokens`, or anything else (treated as disabled).
#[derive(Debug, Clone, PartialEq)]
pub enum ThinkingConfig {
    Flag(bool),
    Mode(String),
    Options {
        kind: Option<String>,
        budget_tokens: Option<f64>,
    },
    Other(Value),
}

/// Normalized thinking settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingSettings {
    pub enabled: bool,
    pub budget_tokens: u64,
}

impl ThinkingSettings {
    pub const DISABLED: Self = Self {
        enabled: false,
        budget_tokens: DEFAULT_THINKING_BUDGET,
    };
}

impl ThinkingConfig {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Bool(flag) => ThinkingConfig::Flag(flag),
            Value::String(mode) => ThinkingConfig::Mode(mode),
            Value::Object(map) => {
                let kind = map.get("type").and_then(Value::as_str).map(str::to_owned);
                let budget_tokens = map.get("budget_tokens").and_then(Value::as_f64);
                ThinkingConfig::Options {
                    kind,
                    budget_tokens,
                }
            }
            other => ThinkingConfig::Other(other),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            ThinkingConfig::Flag(flag) => Value::Bool(*flag),
            ThinkingConfig::Mode(mode) => Value::String(mode.clone()),
            ThinkingConfig::Options {
                kind,
                budget_tokens,
            } => {
                let mut map = serde_json::Map::new();
                if let Some(kind) = kind {
                    map.insert("type".to_string(), Value::String(kind.clone()));
                }
                if let Some(budget) = budget_tokens.and_then(budget_number) {
                    map.insert("budget_tokens".to_string(), Value::Number(budget));
                }
                Value::Object(map)
            }
            ThinkingConfig::Other(value) => value.clone(),
        }
    }

    /// Normalize to `{enabled, budget_tokens}`.
    #[must_use]
    pub fn normalize(&self) -> ThinkingSettings {
        match self {
            ThinkingConfig::Flag(enabled) => ThinkingSettings {
                enabled: *enabled,
                budget_tokens: DEFAULT_THINKING_BUDGET,
            },
            ThinkingConfig::Mode(mode) => ThinkingSettings {
                enabled: mode.eq_ignore_ascii_case("enabled"),
                budget_tokens: DEFAULT_THINKING_BUDGET,
            },
            ThinkingConfig::Options {
                kind,
                budget_tokens,
            } => {
                let positive_budget = budget_tokens.filter(|budget| *budget > 0.0);
                let enabled_by_type = kind
                    .as_deref()
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("enabled"));
                // f64 -> u64 truncates toward zero and saturates.
                let budget_tokens = positive_budget
                    .map_or(DEFAULT_THINKING_BUDGET, |budget| budget as u64);
                ThinkingSettings {
                    enabled: enabled_by_type || positive_budget.is_some(),
                    budget_tokens,
                }
            }
            ThinkingConfig::Other(_) => ThinkingSettings::DISABLED,
        }
    }
}

fn budget_number(budget: f64) -> Option<serde_json::Number> {
    if budget.fract() == 0.0 && budget.abs() < 9.0e15 {
        Some(serde_json::Number::from(budget as i64))
    } else {
        serde_json::Number::from_f64(budget)
    }
}

impl<'de> Deserialize<'de> for ThinkingConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl Serialize for ThinkingConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

// ---------------------------------------------------------------------------
// Policy functions
// ---------------------------------------------------------------------------

#[must_use]
pub fn normalize(cfg: Option<&ThinkingConfig>) -> ThinkingSettings {
    cfg.map_or(ThinkingSettings::DISABLED, ThinkingConfig::normalize)
}

#[must_use]
pub fn is_enabled(cfg: Option<&ThinkingConfig>) -> bool {
    normalize(cfg).enabled
}

#[must_use]
pub fn budget(cfg: Option<&ThinkingConfig>) -> u64 {
    normalize(cfg).budget_tokens
}

#[must_use]
pub fn render_hint(cfg: Option<&ThinkingConfig>) -> String {
    render_hint_for_budget(budget(cfg))
}

#[must_use]
pub fn render_hint_for_budget(budget_tokens: u64) -> String {
    format!(
        "<thinking_mode>enabled</thinking_mode>\n<max_thinking_length>{budget_tokens}</max_thinking_length>"
    )
}

/// Inject the thinking hint into the system prompt when `cfg` enables thinking.
#[must_use]
pub fn apply(request: CanonicalRequest, cfg: Option<&ThinkingConfig>) -> CanonicalRequest {
    apply_settings(request, normalize(cfg))
}

/// Same as [`apply`] with already normalized settings. Idempotent: a system
/// message that already carries a hint marker is left alone.
#[must_use]
pub fn apply_settings(mut request: CanonicalRequest, settings: ThinkingSettings) -> CanonicalRequest {
    if !settings.enabled {
        return request;
    }
    let hint = render_hint_for_budget(settings.budget_tokens);

    match request
        .messages
        .iter_mut()
        .find(|message| message.role == CanonicalRole::System)
    {
        Some(system) => {
            if has_hint_marker(system) {
                debug!("thinking hint already present in system prompt");
            } else {
                prepend_hint(system, &hint);
            }
        }
        None => request
            .messages
            .insert(0, CanonicalMessage::text(CanonicalRole::System, hint)),
    }
    request
}

fn has_hint_marker(message: &CanonicalMessage) -> bool {
    let text = message.text_content();
    text.contains(THINKING_MODE_MARKER) || text.contains(MAX_THINKING_LENGTH_MARKER)
}

fn prefixed(hint: &str, text: &str) -> String {
    if text.is_empty() {
        hint.to_owned()
    } else {
        format!("{hint}\n\n{text}")
    }
}

fn prepend_hint(message: &mut CanonicalMessage, hint: &str) {
    match &mut message.content {
        None => message.content = Some(MessageContent::Text(hint.to_owned())),
        Some(MessageContent::Text(text)) => *text = prefixed(hint, text),
        Some(MessageContent::Blocks(blocks)) => {
            let first_text = blocks.iter_mut().find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::ImageUrl { .. } => None,
            });
            match first_text {
                Some(text) => *text = prefixed(hint, text),
                None => blocks.insert(0, ContentBlock::text(hint)),
            }
        }
    }
}
