//! Deadline decorators for capability handles.
//!
//! Each call is bounded by `tokio::time::timeout`; expiry surfaces as
//! [`CapabilityError::Timeout`], which the pipeline treats like any other
//! capability failure.

use anyhow::Result;
use async_trait::async_trait;
use mdna_core::capability::{CapabilityError, Embedder, LanguageModel, Prompt};
use std::sync::Arc;
use std::time::Duration;

pub struct TimeoutEmbedder {
    inner: Arc<dyn Embedder>,
    limit: Duration,
}

impl TimeoutEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Embedder for TimeoutEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match tokio::time::timeout(self.limit, self.inner.embed(texts)).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(self.limit.as_secs()).into()),
        }
    }
}

pub struct TimeoutLanguageModel {
    inner: Arc<dyn LanguageModel>,
    limit: Duration,
}

impl TimeoutLanguageModel {
    pub fn new(inner: Arc<dyn LanguageModel>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl LanguageModel for TimeoutLanguageModel {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        match tokio::time::timeout(self.limit, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout(self.limit.as_secs()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl LanguageModel for Slow {
        fn model_name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("late".to_string())
        }
    }

    #[tokio::test]
    async fn test_generate_times_out() {
        let llm = TimeoutLanguageModel::new(Arc::new(Slow), Duration::from_millis(50));
        let prompt = Prompt {
            system: String::new(),
            user: String::new(),
        };
        let err = llm.generate(&prompt).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CapabilityError>(),
            Some(CapabilityError::Timeout(_))
        ));
        assert_eq!(llm.model_name(), "slow");
    }
}
