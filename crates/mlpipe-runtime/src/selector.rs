//! Backend selection with ordered fallback.

use tracing::{debug, info, warn};

use crate::backend::{self, ComputeBackend};
use crate::context::RuntimeContext;
use crate::error::RuntimeError;
use crate::Result;

/// Outcome of a successful [`BackendSelector::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBackend {
    /// Name of the backend now active on the context.
    pub name: String,
    /// Candidates tried before it, with the reason each one failed.
    pub skipped: Vec<(String, String)>,
}

enum Candidate {
    Backend(Box<dyn ComputeBackend>),
    Missing { name: String, reason: String },
}

impl Candidate {
    fn name(&self) -> &str {
        match self {
            Candidate::Backend(b) => b.name(),
            Candidate::Missing { name, .. } => name,
        }
    }
}

/// Ordered list of backends to try when initializing a [`RuntimeContext`].
#[derive(Default)]
pub struct BackendSelector {
    candidates: Vec<Candidate>,
}

impl BackendSelector {
    /// Create an empty selector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate backend.
    pub fn with_backend(mut self, backend: Box<dyn ComputeBackend>) -> Self {
        self.candidates.push(Candidate::Backend(backend));
        self
    }

    /// Build a selector from backend names, most preferred first.
    ///
    /// Names that are not compiled into this build stay in the chain as
    /// candidates that always fail, so the fallback order is preserved.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let candidates = names
            .iter()
            .map(|name| match backend::create(name.as_ref()) {
                Ok(b) => Candidate::Backend(b),
                Err(e) => Candidate::Missing {
                    name: name.as_ref().to_string(),
                    reason: e.to_string(),
                },
            })
            .collect();
        Self { candidates }
    }

    /// Candidate names in the order they will be tried.
    pub fn candidates(&self) -> Vec<&str> {
        self.candidates.iter().map(Candidate::name).collect()
    }

    /// Activate the first candidate that comes up.
    ///
    /// Each candidate is activated and then asked to confirm readiness; the
    /// first one to pass both becomes the context's active backend and the
    /// rest are dropped. If the context already has an active backend this
    /// is a no-op returning it.
    ///
    /// # Errors
    /// `NoBackendAvailable` when every candidate fails.
    pub fn initialize(self, ctx: &mut RuntimeContext) -> Result<ActiveBackend> {
        if let Some(name) = ctx.active_backend() {
            debug!("Backend already initialized: {}", name);
            return Ok(ActiveBackend {
                name: name.to_string(),
                skipped: Vec::new(),
            });
        }

        let mut skipped = Vec::new();

        for candidate in self.candidates {
            let mut backend = match candidate {
                Candidate::Backend(b) => b,
                Candidate::Missing { name, reason } => {
                    warn!("Backend {} unavailable: {}", name, reason);
                    skipped.push((name, reason));
                    continue;
                }
            };

            let name = backend.name().to_string();
            debug!("Trying backend: {}", name);

            match backend.activate().and_then(|_| backend.ready()) {
                Ok(()) => {
                    ctx.set_active(backend)?;
                    if !skipped.is_empty() {
                        info!("Fell back to {} after {} failure(s)", name, skipped.len());
                    }
                    return Ok(ActiveBackend { name, skipped });
                }
                Err(e) => {
                    warn!("Backend {} failed to initialize: {}", name, e);
                    skipped.push((name, e.to_string()));
                }
            }
        }

        Err(RuntimeError::NoBackendAvailable { attempts: skipped })
    }
}
