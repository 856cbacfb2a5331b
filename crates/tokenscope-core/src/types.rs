// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session data model shared by every analysis component.
//!
//! All types here are read-only inputs owned by the host session store. Numeric
//! telemetry fields are optional on the wire; the accessor methods are the
//! documented zero-default contract, so consumers never coerce missing values
//! themselves.

use std::ops::AddAssign;

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Unique identifier for a conversation session.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SessionId(pub String);

impl SessionId {
    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

/// Author of a message in the transcript.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Reads a role leniently: an absent, unknown or non-string role is `None`.
fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(|role| role.parse().ok()))
}

/// Execution state of a tool invocation part.
///
/// Statuses the host adds later (`aborted`, ...) read as [`ToolStatus::Unknown`],
/// which never counts as completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Recorded state of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    #[serde(default)]
    pub status: ToolStatus,
    /// Arguments the model passed to the tool.
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
    /// Text output, present once the invocation completed.
    #[serde(default)]
    pub output: Option<String>,
}

impl ToolState {
    pub fn is_completed(&self) -> bool {
        self.status == ToolStatus::Completed
    }

    /// Returns a string argument by name, if present.
    pub fn string_arg(&self, name: &str) -> Option<&str> {
        self.input.get(name).and_then(|v| v.as_str())
    }
}

/// One content part of a message.
///
/// Unknown part kinds deserialize to [`Part::Other`] and are skipped by every
/// consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    Tool {
        #[serde(default)]
        tool: String,
        #[serde(default)]
        state: ToolState,
    },
    #[serde(other)]
    Other,
}

/// Provider-reported token counts for one assistant call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTelemetry {
    #[serde(default)]
    pub input: Option<u64>,
    #[serde(default)]
    pub output: Option<u64>,
    #[serde(default)]
    pub reasoning: Option<u64>,
    #[serde(default)]
    pub cache_read: Option<u64>,
    #[serde(default)]
    pub cache_write: Option<u64>,
}

impl TokenTelemetry {
    /// Fresh (non-cached) input tokens, 0 when absent.
    pub fn input(&self) -> u64 {
        self.input.unwrap_or(0)
    }

    pub fn output(&self) -> u64 {
        self.output.unwrap_or(0)
    }

    pub fn reasoning(&self) -> u64 {
        self.reasoning.unwrap_or(0)
    }

    pub fn cache_read(&self) -> u64 {
        self.cache_read.unwrap_or(0)
    }

    pub fn cache_write(&self) -> u64 {
        self.cache_write.unwrap_or(0)
    }

    /// Sum of all five token classes.
    pub fn total(&self) -> u64 {
        self.input()
            .saturating_add(self.output())
            .saturating_add(self.reasoning())
            .saturating_add(self.cache_read())
            .saturating_add(self.cache_write())
    }

    /// True when at least one class reports a nonzero count.
    pub fn has_usage(&self) -> bool {
        self.total() > 0
    }
}

/// One transcript message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: Option<String>,
    /// `None` when the host omitted the role or sent one we do not know;
    /// such messages are skipped.
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default, alias = "tokens")]
    pub telemetry: Option<TokenTelemetry>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default, rename = "modelID", alias = "modelId")]
    pub model_id: Option<String>,
    #[serde(default, rename = "providerID", alias = "providerId")]
    pub provider_id: Option<String>,
}

impl Message {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    /// Concatenated text of all `Text` parts, trimmed.
    pub fn text(&self) -> String {
        let joined = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::Reasoning { .. } | Part::Tool { .. } | Part::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        joined.trim().to_string()
    }

    /// Telemetry with absent fields treated as zero.
    pub fn telemetry(&self) -> TokenTelemetry {
        self.telemetry.unwrap_or_default()
    }

    /// Provider-reported cost, 0 when absent, negative or not finite.
    pub fn cost_usd(&self) -> f64 {
        match self.cost {
            Some(c) if c.is_finite() && c > 0.0 => c,
            _ => 0.0,
        }
    }

    /// The (provider, model) pair, when both identifiers are present and non-empty.
    pub fn model_pair(&self) -> Option<(&str, &str)> {
        let provider = self.provider_id.as_deref().filter(|p| !p.trim().is_empty())?;
        let model = self.model_id.as_deref().filter(|m| !m.trim().is_empty())?;
        Some((provider, model))
    }
}

/// Summed token classes and cost across any number of assistant calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input: u64,
    pub output: u64,
    pub reasoning: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    /// Provider-reported cost in USD.
    pub cost: f64,
}

impl UsageTotals {
    /// Sums telemetry and cost across the assistant messages of a transcript.
    pub fn from_assistant_messages(messages: &[Message]) -> Self {
        let mut totals = Self::default();
        for message in messages.iter().filter(|m| m.has_role(Role::Assistant)) {
            totals.add_message(message);
        }
        totals
    }

    pub fn add_message(&mut self, message: &Message) {
        let telemetry = message.telemetry();
        *self += UsageTotals {
            input: telemetry.input(),
            output: telemetry.output(),
            reasoning: telemetry.reasoning(),
            cache_read: telemetry.cache_read(),
            cache_write: telemetry.cache_write(),
            cost: message.cost_usd(),
        };
    }

    pub fn total_tokens(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.reasoning)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_write)
    }
}

impl AddAssign for UsageTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.input = self.input.saturating_add(rhs.input);
        self.output = self.output.saturating_add(rhs.output);
        self.reasoning = self.reasoning.saturating_add(rhs.reasoning);
        self.cache_read = self.cache_read.saturating_add(rhs.cache_read);
        self.cache_write = self.cache_write.saturating_add(rhs.cache_write);
        self.cost += rhs.cost;
    }
}

/// Child session descriptor returned by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSession {
    pub id: SessionId,
    #[serde(default)]
    pub title: String,
}

/// A tool as listed in the host's tool catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

/// Rich export of one session consumed by the context analyzer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Raw system prompt strings, when the host exposes them.
    #[serde(default)]
    pub system_prompts: Vec<String>,
    /// Tools enabled for the session; empty when the host does not report them.
    #[serde(default)]
    pub enabled_tools: Vec<String>,
}

impl SessionExport {
    pub fn has_raw_prompts(&self) -> bool {
        self.system_prompts.iter().any(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_part_kind_is_other() {
        let json = r#"{"role":"user","parts":[{"type":"step-start"},{"type":"text","text":"hi"}]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.parts[0], Part::Other);
        assert_eq!(msg.text(), "hi");
    }

    #[test]
    fn missing_telemetry_fields_default_to_zero() {
        let json = r#"{"role":"assistant","parts":[],"tokens":{"input":12}}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        let t = msg.telemetry();
        assert_eq!(t.input(), 12);
        assert_eq!(t.output(), 0);
        assert_eq!(t.cache_write(), 0);
        assert_eq!(t.total(), 12);
    }

    #[test]
    fn invalid_cost_reads_as_zero() {
        let msg = Message {
            cost: Some(-1.0),
            ..Default::default()
        };
        assert_eq!(msg.cost_usd(), 0.0);
        let msg = Message {
            cost: Some(f64::NAN),
            ..Default::default()
        };
        assert_eq!(msg.cost_usd(), 0.0);
    }

    #[test]
    fn message_without_role_is_not_any_role() {
        let json = r#"{"parts":[{"type":"text","text":"orphan"}]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.role.is_none());
        assert!(!msg.has_role(Role::User));
    }

    #[test]
    fn model_pair_requires_both_ids() {
        let mut msg = Message {
            model_id: Some("gpt-4o".into()),
            ..Default::default()
        };
        assert!(msg.model_pair().is_none());
        msg.provider_id = Some("openai".into());
        assert_eq!(msg.model_pair(), Some(("openai", "gpt-4o")));
        msg.provider_id = Some("  ".into());
        assert!(msg.model_pair().is_none());
    }

    #[test]
    fn usage_totals_only_count_assistant_messages() {
        let telemetry = TokenTelemetry {
            input: Some(10),
            output: Some(5),
            ..Default::default()
        };
        let messages = vec![
            Message {
                role: Some(Role::User),
                telemetry: Some(telemetry),
                cost: Some(1.0),
                ..Default::default()
            },
            Message {
                role: Some(Role::Assistant),
                telemetry: Some(telemetry),
                cost: Some(0.5),
                ..Default::default()
            },
        ];
        let totals = UsageTotals::from_assistant_messages(&messages);
        assert_eq!(totals.input, 10);
        assert_eq!(totals.output, 5);
        assert!((totals.cost - 0.5).abs() < f64::EPSILON);
        assert_eq!(totals.total_tokens(), 15);
    }

    #[test]
    fn unknown_role_reads_as_none() {
        let json = r#"{"role":"developer","parts":[{"type":"text","text":"hi"}]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(msg.role.is_none());
        assert_eq!(msg.text(), "hi");

        let msg: Message = serde_json::from_str(r#"{"role":7,"parts":[]}"#).unwrap();
        assert!(msg.role.is_none());
        let msg: Message = serde_json::from_str(r#"{"role":null}"#).unwrap();
        assert!(msg.role.is_none());
        let msg: Message = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(msg.role, Some(Role::Assistant));
    }

    #[test]
    fn unknown_tool_status_is_not_completed() {
        let json = r#"{"role":"assistant","parts":[
            {"type":"tool","tool":"bash","state":{"status":"aborted","output":"x"}}
        ]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        let Part::Tool { state, .. } = &msg.parts[0] else {
            panic!("expected a tool part");
        };
        assert_eq!(state.status, ToolStatus::Unknown);
        assert!(!state.is_completed());
    }

    #[test]
    fn part_payloads_default_when_missing() {
        let json = r#"{"role":"assistant","parts":[
            {"type":"text"},
            {"type":"reasoning"},
            {"type":"tool"}
        ]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.parts[0], Part::Text { text: String::new() });
        assert_eq!(
            msg.parts[2],
            Part::Tool {
                tool: String::new(),
                state: ToolState::default(),
            }
        );
    }

    #[test]
    fn extreme_counts_saturate() {
        let telemetry = TokenTelemetry {
            input: Some(u64::MAX),
            output: Some(1),
            ..Default::default()
        };
        assert_eq!(telemetry.total(), u64::MAX);

        let message = Message {
            role: Some(Role::Assistant),
            telemetry: Some(telemetry),
            ..Default::default()
        };
        let mut totals = UsageTotals::from_assistant_messages(&[message.clone(), message]);
        assert_eq!(totals.input, u64::MAX);
        assert_eq!(totals.total_tokens(), u64::MAX);

        totals += UsageTotals {
            output: u64::MAX,
            ..Default::default()
        };
        assert_eq!(totals.output, u64::MAX);
    }

    #[test]
    fn role_display_round_trip() {
        use std::str::FromStr;
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(Role::from_str(&role.to_string()).unwrap(), role);
        }
    }
}
