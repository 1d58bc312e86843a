//! Lifecycle of the shared grader.
//!
//! ```text
//! UNINITIALIZED ──begin_loading──▶ LOADING ──publish(Ok)──▶ READY
//!                                     └──────publish(Err)──▶ FAILED
//! ```
//!
//! There is no way back to `LOADING`: `READY` and `FAILED` are terminal.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::grader::Grader;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Invalid model state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Clone, Default)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Loading,
    Ready(Arc<Grader>),
    Failed(String),
}

impl LoadState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
        }
    }
}

/// Cloneable handle to the grader's load state, shared by the loader and the server.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    inner: Arc<RwLock<LoadState>>,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state that is already `READY`
    pub fn ready(grader: Grader) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LoadState::Ready(Arc::new(grader)))),
        }
    }

    /// `UNINITIALIZED → LOADING`
    pub async fn begin_loading(&self) -> Result<(), StateError> {
        let mut state = self.inner.write().await;
        if !matches!(*state, LoadState::Uninitialized) {
            return Err(StateError::InvalidTransition {
                from: state.name(),
                to: "loading",
            });
        }
        *state = LoadState::Loading;
        Ok(())
    }

    /// `LOADING → READY` on `Ok`, `LOADING → FAILED` on `Err`
    pub async fn publish(&self, outcome: Result<Grader, String>) -> Result<(), StateError> {
        let mut state = self.inner.write().await;
        let next = match outcome {
            Ok(grader) => LoadState::Ready(Arc::new(grader)),
            Err(reason) => LoadState::Failed(reason),
        };
        if !matches!(*state, LoadState::Loading) {
            return Err(StateError::InvalidTransition {
                from: state.name(),
                to: next.name(),
            });
        }
        *state = next;
        Ok(())
    }

    pub async fn snapshot(&self) -> LoadState {
        self.inner.read().await.clone()
    }

    /// The grader, if loading has completed successfully
    pub async fn grader(&self) -> Option<Arc<Grader>> {
        match &*self.inner.read().await {
            LoadState::Ready(grader) => Some(Arc::clone(grader)),
            _ => None,
        }
    }
}
