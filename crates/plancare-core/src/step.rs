//! Timeouts and retries around calls to external collaborators.

use std::{future::Future, time::Duration};

use crate::error::Unavailable;

/// How long one call may take, and how often a failed read is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
  pub timeout:      Duration,
  /// Extra attempts after a failed read. Writes are never retried.
  pub read_retries: u32,
  /// Delay before the first retry; doubled for each further attempt.
  pub backoff:      Duration,
}

impl Default for StepPolicy {
  fn default() -> Self {
    Self {
      timeout:      Duration::from_secs(5),
      read_retries: 2,
      backoff:      Duration::from_millis(50),
    }
  }
}

impl StepPolicy {
  /// Run an idempotent call, retrying timeouts and backend errors.
  pub async fn read<T, E, F, Fut>(&self, step: &'static str, mut call: F) -> Result<T, Unavailable>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
  {
    let mut attempt = 0;
    loop {
      match self.once(call()).await {
        Ok(value) => return Ok(value),
        Err(e) if attempt < self.read_retries => {
          let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt));
          tracing::warn!(step, attempt, error = %e, "read failed, retrying in {delay:?}");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          tracing::error!(step, error = %e, "read failed");
          return Err(e);
        }
      }
    }
  }

  /// Run a call exactly once under the step timeout.
  pub async fn once<T, E, Fut>(&self, call: Fut) -> Result<T, Unavailable>
  where
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
  {
    match tokio::time::timeout(self.timeout, call).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(Unavailable::Backend(Box::new(e))),
      Err(_) => Err(Unavailable::Timeout(self.timeout)),
    }
  }
}
