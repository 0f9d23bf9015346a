//! Classifier interface and model readiness gate.
//!
//! The ML subsystem is an external collaborator: the repository invokes
//! it through this trait and caches the results by content hash. Models
//! load asynchronously; analysis is refused until the external loader
//! flips the readiness gate.

use async_trait::async_trait;
use nomen_common::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::ClassificationMatch;

/// Options for one analysis request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyzeOptions {
    /// Also run the captioner.
    pub with_caption: bool,
    /// Bypass the analysis cache.
    pub force: bool,
}

/// Raw classifier output for one file.
#[derive(Debug, Clone)]
pub struct ClassifierOutput {
    /// Ranked classification hits, best first.
    pub classification: Vec<ClassificationMatch>,
    pub caption: Option<String>,
    pub model_version: String,
}

/// Audio classifier + captioner abstraction.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, wav_path: &Path, options: &AnalyzeOptions) -> Result<ClassifierOutput>;
}

/// Readiness signal set by the external model loader.
#[derive(Debug, Default)]
pub struct ModelGate {
    ready: AtomicBool,
}

impl ModelGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gate that starts open, for tests.
    pub fn ready() -> Self {
        let gate = Self::default();
        gate.set_ready(true);
        gate
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
