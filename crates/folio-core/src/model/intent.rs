//! Keyword-weight intent classification

use serde_json::Value;

use crate::error::{Error, Result};

/// Intent reported when no keyword scores above zero
pub const DEFAULT_INTENT: &str = "general_inquiry";

const FALLBACK_KEYWORD: &str = "help";

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub name: String,
    pub keywords: Vec<Keyword>,
}

impl Intent {
    /// Sum of the weights of every keyword contained in `text`.
    /// `text` must already be lowercased.
    fn score(&self, text: &str) -> f64 {
        self.keywords
            .iter()
            .filter(|k| text.contains(k.term.as_str()))
            .map(|k| k.weight)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intent: String,
    pub score: f64,
}

/// Ordered intent table. Order matters: on equal scores the earlier intent wins.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentModel {
    intents: Vec<Intent>,
}

impl IntentModel {
    pub fn new(intents: Vec<Intent>) -> Self {
        Self { intents }
    }

    /// Built-in model used whenever the configured resource cannot be loaded
    pub fn fallback() -> Self {
        Self::new(vec![Intent {
            name: DEFAULT_INTENT.to_string(),
            keywords: vec![Keyword {
                term: FALLBACK_KEYWORD.to_string(),
                weight: 1.0,
            }],
        }])
    }

    /// Parse `{ "<intent>": { "<keyword>": <weight>, ... }, ... }`.
    ///
    /// Keywords are kept as written. Input text is lowercased before matching,
    /// so a keyword containing uppercase letters never matches.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(entries) = value else {
            return Err(Error::IntentModelError(
                "expected an object of intents".to_string(),
            ));
        };

        let mut intents = Vec::with_capacity(entries.len());
        for (name, keywords) in entries {
            let Value::Object(keywords) = keywords else {
                return Err(Error::IntentModelError(format!(
                    "intent '{}' must map keywords to weights",
                    name
                )));
            };

            let mut parsed = Vec::with_capacity(keywords.len());
            for (term, weight) in keywords {
                let weight = weight.as_f64().ok_or_else(|| {
                    Error::IntentModelError(format!(
                        "weight for '{}' in intent '{}' is not a number",
                        term, name
                    ))
                })?;
                parsed.push(Keyword { term, weight });
            }

            intents.push(Intent {
                name,
                keywords: parsed,
            });
        }

        Ok(Self::new(intents))
    }

    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Pick the intent with the strictly highest cumulative keyword weight.
    pub fn classify(&self, text: &str) -> Classification {
        let text = text.to_lowercase();
        let mut best = Classification {
            intent: DEFAULT_INTENT.to_string(),
            score: 0.0,
        };

        for intent in &self.intents {
            let score = intent.score(&text);
            if score > best.score {
                best = Classification {
                    intent: intent.name.clone(),
                    score,
                };
            }
        }

        best
    }
}
