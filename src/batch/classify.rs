//! Retryability of errors raised while building job context.

use super::context::ContextError;

/// Message fragments that mark an untyped error as transient
/// (case-insensitive substring match)
pub const RETRYABLE_VOCABULARY: [&str; 6] = [
    "timeout",
    "rate limited",
    "server error",
    "fetch",
    "network",
    "temporarily disabled",
];

/// Decides whether a failed job is worth retrying
pub trait ErrorClassifier: Send + Sync {
    fn is_retryable(&self, error: &ContextError) -> bool;
}

/// Uses the structured kind when present, the vocabulary otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct VocabularyClassifier;

impl ErrorClassifier for VocabularyClassifier {
    fn is_retryable(&self, error: &ContextError) -> bool {
        match error.kind {
            Some(kind) => kind.is_retryable(),
            None => message_is_retryable(&error.message),
        }
    }
}

pub fn message_is_retryable(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_VOCABULARY.iter().any(|term| message.contains(term))
}
