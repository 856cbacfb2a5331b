// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer strategy selection and the length-based approximation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokenscope_core::ScopeError;

/// Strategy used to turn text into a token count.
///
/// String form: `approx`, `tiktoken:<model-or-encoding>`, `hf:<hub-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenizerSpec {
    /// `ceil(chars / 4)`, no backend involved.
    Approx,
    /// BPE encoder from `tiktoken-rs`, keyed by model alias or encoding name.
    Tiktoken { model: String },
    /// `tokenizer.json` from a Hugging Face hub repository.
    HuggingFace { hub_id: String },
}

impl TokenizerSpec {
    pub fn tiktoken(model: impl Into<String>) -> Self {
        TokenizerSpec::Tiktoken {
            model: model.into(),
        }
    }

    pub fn hugging_face(hub_id: impl Into<String>) -> Self {
        TokenizerSpec::HuggingFace {
            hub_id: hub_id.into(),
        }
    }

    /// True for strategies that need a loaded backend.
    pub fn is_exact(&self) -> bool {
        !matches!(self, TokenizerSpec::Approx)
    }
}

impl fmt::Display for TokenizerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerSpec::Approx => f.write_str("approx"),
            TokenizerSpec::Tiktoken { model } => write!(f, "tiktoken:{model}"),
            TokenizerSpec::HuggingFace { hub_id } => write!(f, "hf:{hub_id}"),
        }
    }
}

impl FromStr for TokenizerSpec {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "approx" {
            return Ok(TokenizerSpec::Approx);
        }
        match s.split_once(':') {
            Some(("tiktoken", model)) if !model.trim().is_empty() => {
                Ok(TokenizerSpec::tiktoken(model.trim()))
            }
            Some(("hf", hub_id)) if !hub_id.trim().is_empty() => {
                Ok(TokenizerSpec::hugging_face(hub_id.trim()))
            }
            _ => Err(ScopeError::Config(format!(
                "invalid tokenizer spec `{s}`: expected `approx`, `tiktoken:<model>` or `hf:<hub-id>`"
            ))),
        }
    }
}

/// Length-based estimate: one token per four characters, rounded up.
pub fn approximate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_every_form() {
        assert_eq!("approx".parse::<TokenizerSpec>().unwrap(), TokenizerSpec::Approx);
        assert_eq!(
            "tiktoken:gpt-4o".parse::<TokenizerSpec>().unwrap(),
            TokenizerSpec::tiktoken("gpt-4o")
        );
        assert_eq!(
            " hf:Xenova/claude-tokenizer ".parse::<TokenizerSpec>().unwrap(),
            TokenizerSpec::hugging_face("Xenova/claude-tokenizer")
        );
    }

    #[test]
    fn rejects_malformed_specs() {
        for bad in ["", "exact", "tiktoken:", "hf:  ", "spm:foo"] {
            assert!(bad.parse::<TokenizerSpec>().is_err(), "accepted `{bad}`");
        }
    }

    #[test]
    fn display_matches_parse_syntax() {
        let spec = TokenizerSpec::hugging_face("meta-llama/Llama-3.1-8B-Instruct");
        assert_eq!(spec.to_string(), "hf:meta-llama/Llama-3.1-8B-Instruct");
        assert_eq!(spec.to_string().parse::<TokenizerSpec>().unwrap(), spec);
    }

    #[test]
    fn four_hundred_chars_is_one_hundred_tokens() {
        assert_eq!(approximate_tokens(&"a".repeat(400)), 100);
        assert_eq!(approximate_tokens("abcde"), 2);
        assert_eq!(approximate_tokens(""), 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(approximate_tokens("日本語です"), 2);
    }

    proptest! {
        #[test]
        fn approximation_is_ceil_of_quarter_length(s in ".{0,300}") {
            let len = s.chars().count();
            prop_assert_eq!(approximate_tokens(&s), (len + 3) / 4);
        }

        #[test]
        fn approximation_is_monotonic(s in ".{0,200}", extra in ".{0,50}") {
            let longer = format!("{s}{extra}");
            prop_assert!(approximate_tokens(&longer) >= approximate_tokens(&s));
        }
    }
}
