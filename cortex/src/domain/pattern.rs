// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Recurring behavioural patterns.
//!
//! A pattern is identified by the fingerprint of `(domain, input)`. The
//! fingerprint is a SHA-256 over a length-prefixed domain followed by the
//! canonical JSON encoding of the input (object keys sorted at every depth),
//! so two different `(domain, input)` pairs can never frame to the same byte
//! stream, and key order in the input never changes the identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::decision::Feedback;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub String);

impl PatternId {
    /// Deterministic fingerprint of a domain and an input document.
    pub fn fingerprint(domain: &str, input: &Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((domain.len() as u64).to_be_bytes());
        hasher.update(domain.as_bytes());
        let mut canonical = String::new();
        write_canonical(input, &mut canonical);
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // String encoding cannot fail.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

impl OutcomeCounts {
    pub fn record(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::Positive => self.positive += 1,
            Feedback::Negative => self.negative += 1,
            Feedback::Neutral => self.neutral += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.positive + self.negative + self.neutral
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPattern {
    pub id: PatternId,
    pub domain: String,
    /// Number of observations, always `>= 1`.
    pub frequency: u64,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub outcomes: OutcomeCounts,
}

impl LearningPattern {
    pub const INITIAL_CONFIDENCE: f64 = 0.5;

    pub fn new(id: PatternId, domain: impl Into<String>, feedback: Feedback, now: DateTime<Utc>) -> Self {
        let mut outcomes = OutcomeCounts::default();
        outcomes.record(feedback);
        Self {
            id,
            domain: domain.into(),
            frequency: 1,
            confidence: Self::INITIAL_CONFIDENCE,
            first_seen: now,
            last_seen: now,
            outcomes,
        }
    }

    /// Registers a repeat occurrence. Positive feedback raises confidence by
    /// `step`, negative lowers it, neutral leaves it; the result is clamped.
    pub fn reinforce(&mut self, feedback: Feedback, step: f64, now: DateTime<Utc>) {
        self.frequency += 1;
        self.last_seen = now;
        self.outcomes.record(feedback);
        let delta = match feedback {
            Feedback::Positive => step,
            Feedback::Negative => -step,
            Feedback::Neutral => 0.0,
        };
        self.confidence = (self.confidence + delta).clamp(0.0, 1.0);
    }

    /// Positive share of decided (non-neutral) outcomes, `None` when nothing
    /// has been decided yet.
    pub fn success_rate(&self) -> Option<f64> {
        let decided = self.outcomes.positive + self.outcomes.negative;
        if decided == 0 {
            None
        } else {
            Some(self.outcomes.positive as f64 / decided as f64)
        }
    }
}
