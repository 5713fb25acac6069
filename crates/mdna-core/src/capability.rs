//! External capabilities used by the pipeline: text embedding and
//! language-model generation.
//!
//! Both are injected as trait objects so that the pipeline can run against
//! any provider, or none. A [`Capability`] is either an available handle
//! or a record of why the capability is missing; callers branch on it and
//! fall back to deterministic behavior instead of failing the request.
//!
//! Concrete providers (OpenAI, Ollama) live in the `mdna-harness` app
//! crate.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Turns texts into vectors. One vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A system/user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Produces a completion for a prompt.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}

/// Why a capability call did not produce a result.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("capability call failed: {0}")]
    Failure(String),

    #[error("capability call timed out after {0}s")]
    Timeout(u64),
}

/// An optional capability handle.
pub enum Capability<T: ?Sized> {
    Available(Arc<T>),
    Unavailable { reason: String },
}

impl<T: ?Sized> Capability<T> {
    pub fn available(handle: Arc<T>) -> Self {
        Capability::Available(handle)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Capability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }

    /// The handle, or [`CapabilityError::Unavailable`] carrying the reason.
    pub fn get(&self) -> Result<&Arc<T>, CapabilityError> {
        match self {
            Capability::Available(handle) => Ok(handle),
            Capability::Unavailable { reason } => Err(CapabilityError::Unavailable(reason.clone())),
        }
    }
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Capability::Available(handle) => Capability::Available(Arc::clone(handle)),
            Capability::Unavailable { reason } => Capability::Unavailable {
                reason: reason.clone(),
            },
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Available(_) => f.write_str("Available"),
            Capability::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl LanguageModel for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            Ok("ok".to_string())
        }
    }

    #[test]
    fn test_unavailable_carries_reason() {
        let cap: Capability<dyn LanguageModel> = Capability::unavailable("no API key");
        assert!(!cap.is_available());
        let err = cap.get().err().unwrap();
        assert!(matches!(err, CapabilityError::Unavailable(ref r) if r == "no API key"));
        assert_eq!(err.to_string(), "capability unavailable: no API key");
    }

    #[tokio::test]
    async fn test_available_handle() {
        let handle: Arc<dyn LanguageModel> = Arc::new(Fixed);
        let cap = Capability::available(handle);
        let cloned = cap.clone();
        let llm = cloned.get().unwrap();
        assert_eq!(llm.model_name(), "fixed");
        let prompt = Prompt {
            system: String::new(),
            user: "hi".to_string(),
        };
        assert_eq!(llm.generate(&prompt).await.unwrap(), "ok");
    }
}
