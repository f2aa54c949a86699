//! Classification of provider replies.
//!
//! VTU providers routinely answer `200 OK` with a body that says the purchase
//! failed, sometimes with `"status": "success"` next to an error sentence.
//! Every reply goes through [`interpret_reply`] before the purchase flow acts
//! on it; nothing else in the crate inspects provider payloads.

use regex::Regex;
use std::sync::OnceLock;

use super::types::{ProviderReply, ReplyStatus};
use super::VtuError;

/// What the purchase flow should do with a provider reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The product was delivered.
    Delivered {
        external_reference: Option<String>,
        token: Option<String>,
    },
    /// The provider refused or failed the purchase.
    Rejected { reason: String },
    /// The reply could not be read as either outcome.
    Ambiguous { reason: String },
    /// The request never reached the provider.
    Undelivered { reason: String },
    /// The provider may still complete it; reconcile later.
    Pending { reason: String },
}

impl Verdict {
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Verdict::Delivered { .. } => None,
            Verdict::Rejected { reason }
            | Verdict::Ambiguous { reason }
            | Verdict::Undelivered { reason }
            | Verdict::Pending { reason } => Some(reason),
        }
    }
}

fn embedded_error_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(error|errors|failed|failure|unsuccessful|not successful|insufficient|invalid|declined|rejected|unable to|denied|not allowed|reversed)\b",
            )
            .ok()
        })
        .as_ref()
}

/// First free-text value in the reply that carries an error phrase.
pub fn find_embedded_error(reply: &ProviderReply) -> Option<String> {
    let pattern = embedded_error_pattern()?;
    reply
        .free_text()
        .into_iter()
        .find(|text| pattern.is_match(text))
        .map(|text| text.to_string())
}

pub fn interpret_reply(outcome: Result<ProviderReply, VtuError>) -> Verdict {
    let reply = match outcome {
        Ok(reply) => reply,
        Err(VtuError::Connect { message, .. }) => {
            return Verdict::Undelivered { reason: message }
        }
        Err(VtuError::Unsupported { provider, service }) => {
            return Verdict::Undelivered {
                reason: format!("{} does not sell {}", provider, service),
            }
        }
        Err(VtuError::InvalidRequest { message, .. }) => {
            return Verdict::Rejected { reason: message }
        }
        Err(err @ VtuError::Timeout { .. }) | Err(err @ VtuError::Transport { .. }) => {
            return Verdict::Pending {
                reason: err.to_string(),
            }
        }
    };

    if (400..500).contains(&reply.http_status) {
        return Verdict::Rejected {
            reason: reply
                .message
                .clone()
                .unwrap_or_else(|| format!("provider returned HTTP {}", reply.http_status)),
        };
    }
    if reply.http_status >= 500 {
        return Verdict::Ambiguous {
            reason: format!("provider returned HTTP {}", reply.http_status),
        };
    }

    match &reply.status {
        ReplyStatus::Failed => Verdict::Rejected {
            reason: reply
                .message
                .clone()
                .or_else(|| find_embedded_error(&reply))
                .unwrap_or_else(|| "provider reported failure".to_string()),
        },
        ReplyStatus::Success => match find_embedded_error(&reply) {
            Some(reason) => Verdict::Rejected { reason },
            None => Verdict::Delivered {
                external_reference: reply.external_reference,
                token: reply.token,
            },
        },
        ReplyStatus::Processing => match find_embedded_error(&reply) {
            Some(reason) => Verdict::Rejected { reason },
            None => Verdict::Pending {
                reason: "provider is still processing".to_string(),
            },
        },
        ReplyStatus::Unrecognized(status) => Verdict::Ambiguous {
            reason: format!("unrecognized provider status: {}", status),
        },
    }
}
