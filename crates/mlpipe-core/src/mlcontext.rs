//! Hardware acceleration context with native-or-software fallback.
//!
//! The manager probes a native provider once, then creates a single context
//! from either the native provider or a separately loaded fallback layer.
//! States only move forward:
//!
//! ```text
//! Unprobed -> Supported | Unsupported -> ContextRequested -> ContextReady | ContextFailed
//! ```

use std::fmt;

use mlpipe_runtime::backend;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Something that can hand out an acceleration context.
#[allow(async_fn_in_trait)]
pub trait AccelerationProvider {
    /// Opaque context handle.
    type Context;

    fn name(&self) -> &str;

    /// Returns true if the provider's entry point exists.
    fn is_available(&self) -> bool;

    /// Request a context. Errors carry the provider's rejection reason.
    async fn create_context(&self) -> std::result::Result<Self::Context, String>;
}

/// Where a created context came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    Native,
    Fallback,
}

/// Lifecycle state of an [`MlContextManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextState {
    Unprobed,
    Supported,
    Unsupported,
    ContextRequested,
    ContextReady,
    ContextFailed(String),
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unprobed => write!(f, "unprobed"),
            Self::Supported => write!(f, "supported"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::ContextRequested => write!(f, "context requested"),
            Self::ContextReady => write!(f, "context ready"),
            Self::ContextFailed(reason) => write!(f, "context failed: {}", reason),
        }
    }
}

/// Drives probing and context creation for a native provider `N` with an
/// optional fallback `F` producing the same context type.
pub struct MlContextManager<N, F>
where
    N: AccelerationProvider,
    F: AccelerationProvider<Context = N::Context>,
{
    native: N,
    fallback: Option<F>,
    state: ContextState,
    context: Option<N::Context>,
    source: Option<ContextSource>,
}

impl<N, F> MlContextManager<N, F>
where
    N: AccelerationProvider,
    F: AccelerationProvider<Context = N::Context>,
{
    pub fn new(native: N) -> Self {
        Self {
            native,
            fallback: None,
            state: ContextState::Unprobed,
            context: None,
            source: None,
        }
    }

    pub fn state(&self) -> &ContextState {
        &self.state
    }

    /// Check for the native entry point. Only the first call probes; later
    /// calls return the current state unchanged.
    pub fn probe(&mut self) -> &ContextState {
        if self.state == ContextState::Unprobed {
            self.state = if self.native.is_available() {
                info!("Native acceleration detected ({})", self.native.name());
                ContextState::Supported
            } else {
                info!("Native acceleration unavailable ({})", self.native.name());
                ContextState::Unsupported
            };
        }
        &self.state
    }

    /// Register the software fallback layer, replacing any earlier one.
    pub fn load_fallback(&mut self, provider: F) {
        debug!("Fallback layer loaded: {}", provider.name());
        self.fallback = Some(provider);
    }

    pub fn fallback_loaded(&self) -> bool {
        self.fallback.is_some()
    }

    /// Create the context: natively when supported, otherwise through the
    /// fallback layer.
    ///
    /// # Errors
    /// `InvalidContextState` unless the manager has been probed and has not
    /// requested a context yet. `ContextFailed` if no fallback is loaded on an
    /// unsupported platform or the provider rejects the request; the manager
    /// then stays in `ContextFailed`.
    pub async fn create_context(&mut self) -> Result<&N::Context> {
        let source = match self.state {
            ContextState::Supported => ContextSource::Native,
            ContextState::Unsupported => ContextSource::Fallback,
            _ => {
                return Err(PipelineError::InvalidContextState {
                    action: "create context".to_string(),
                    state: self.state.to_string(),
                });
            }
        };

        self.state = ContextState::ContextRequested;
        let outcome = match source {
            ContextSource::Native => self.native.create_context().await,
            ContextSource::Fallback => match &self.fallback {
                Some(fallback) => fallback.create_context().await,
                None => Err("fallback layer not loaded".to_string()),
            },
        };

        match outcome {
            Ok(context) => {
                info!("Acceleration context created ({:?})", source);
                self.state = ContextState::ContextReady;
                self.source = Some(source);
                Ok(self.context.insert(context))
            }
            Err(reason) => {
                warn!("Acceleration context creation failed: {}", reason);
                self.state = ContextState::ContextFailed(reason.clone());
                Err(PipelineError::ContextFailed(reason))
            }
        }
    }

    /// Confirm the context is usable and return it. Performs no computation.
    pub fn run_noop(&self) -> Result<&N::Context> {
        match (&self.state, &self.context) {
            (ContextState::ContextReady, Some(context)) => {
                debug!("No-op computation completed");
                Ok(context)
            }
            _ => Err(PipelineError::InvalidContextState {
                action: "run".to_string(),
                state: self.state.to_string(),
            }),
        }
    }

    pub fn context(&self) -> Option<&N::Context> {
        self.context.as_ref()
    }

    pub fn source(&self) -> Option<ContextSource> {
        self.source
    }

    /// One-line description of the current state for display.
    pub fn status(&self) -> String {
        match (&self.state, self.source) {
            (ContextState::Unprobed, _) => "Not initialized".to_string(),
            (ContextState::Supported, _) => "Native acceleration support detected".to_string(),
            (ContextState::Unsupported, _) if self.fallback.is_some() => {
                "Using software fallback".to_string()
            }
            (ContextState::Unsupported, _) => {
                "Native acceleration unavailable, fallback not loaded".to_string()
            }
            (ContextState::ContextRequested, _) => "Creating context".to_string(),
            (ContextState::ContextReady, Some(ContextSource::Native)) => {
                "Native context created".to_string()
            }
            (ContextState::ContextReady, _) => "Fallback context created".to_string(),
            (ContextState::ContextFailed(reason), _) => {
                format!("Failed to create context: {}", reason)
            }
        }
    }
}

impl<N, F> fmt::Debug for MlContextManager<N, F>
where
    N: AccelerationProvider,
    F: AccelerationProvider<Context = N::Context>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MlContextManager")
            .field("native", &self.native.name())
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .field("state", &self.state)
            .field("source", &self.source)
            .finish()
    }
}

/// Context handed out by the host providers: the compute backend it is
/// bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    pub provider: String,
    pub backend: &'static str,
}

fn activate(name: &'static str) -> std::result::Result<(), String> {
    let mut backend = backend::create(name).map_err(|e| e.to_string())?;
    backend.activate().map_err(|e| e.to_string())?;
    backend.ready().map_err(|e| e.to_string())
}

/// Native acceleration on the host: the multi-threaded backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostAcceleration;

impl AccelerationProvider for HostAcceleration {
    type Context = HostContext;

    fn name(&self) -> &str {
        "host-parallel"
    }

    fn is_available(&self) -> bool {
        activate("parallel").is_ok()
    }

    async fn create_context(&self) -> std::result::Result<HostContext, String> {
        activate("parallel")?;
        Ok(HostContext {
            provider: self.name().to_string(),
            backend: "parallel",
        })
    }
}

/// Software emulation fallback: always available, single-threaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareEmulation;

impl AccelerationProvider for SoftwareEmulation {
    type Context = HostContext;

    fn name(&self) -> &str {
        "software-emulation"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn create_context(&self) -> std::result::Result<HostContext, String> {
        activate("cpu")?;
        Ok(HostContext {
            provider: self.name().to_string(),
            backend: "cpu",
        })
    }
}

/// Manager over the host providers.
pub type HostContextManager = MlContextManager<HostAcceleration, SoftwareEmulation>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Stub {
        name: &'static str,
        available: bool,
        reject: Option<&'static str>,
    }

    impl Stub {
        fn native(available: bool) -> Self {
            Self {
                name: "native",
                available,
                reject: None,
            }
        }

        fn fallback() -> Self {
            Self {
                name: "polyfill",
                available: true,
                reject: None,
            }
        }
    }

    impl AccelerationProvider for Stub {
        type Context = String;

        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn create_context(&self) -> std::result::Result<String, String> {
            match self.reject {
                Some(reason) => Err(reason.to_string()),
                None => Ok(format!("{}-context", self.name)),
            }
        }
    }

    type Manager = MlContextManager<Stub, Stub>;

    #[test]
    fn test_probe_is_idempotent() {
        let mut manager = Manager::new(Stub::native(true));
        assert_eq!(manager.state(), &ContextState::Unprobed);
        assert_eq!(manager.probe(), &ContextState::Supported);
        assert_eq!(manager.probe(), &ContextState::Supported);
    }

    #[test]
    fn test_probe_without_native_entry_point() {
        let mut manager = Manager::new(Stub::native(false));
        assert_eq!(manager.probe(), &ContextState::Unsupported);
    }

    #[tokio::test]
    async fn test_native_context() {
        let mut manager = Manager::new(Stub::native(true));
        manager.probe();
        let context = manager.create_context().await.unwrap().clone();
        assert_eq!(context, "native-context");
        assert_eq!(manager.state(), &ContextState::ContextReady);
        assert_eq!(manager.source(), Some(ContextSource::Native));
        assert_eq!(manager.run_noop().unwrap(), "native-context");
    }

    #[tokio::test]
    async fn test_fallback_context() {
        let mut manager = Manager::new(Stub::native(false));
        manager.probe();
        manager.load_fallback(Stub::fallback());
        assert_eq!(manager.status(), "Using software fallback");

        let context = manager.create_context().await.unwrap().clone();
        assert_eq!(context, "polyfill-context");
        assert_eq!(manager.source(), Some(ContextSource::Fallback));
        assert_eq!(manager.status(), "Fallback context created");
    }

    #[tokio::test]
    async fn test_unsupported_without_fallback_fails() {
        let mut manager = Manager::new(Stub::native(false));
        manager.probe();

        let err = manager.create_context().await.unwrap_err();
        assert!(matches!(err, PipelineError::ContextFailed(ref r) if r == "fallback layer not loaded"));
        assert_eq!(
            manager.state(),
            &ContextState::ContextFailed("fallback layer not loaded".to_string())
        );
        assert!(manager.context().is_none());
    }

    #[tokio::test]
    async fn test_provider_rejection() {
        let mut manager = Manager::new(Stub {
            name: "native",
            available: true,
            reject: Some("device lost"),
        });
        manager.probe();
        let err = manager.create_context().await.unwrap_err();
        assert!(matches!(err, PipelineError::ContextFailed(ref r) if r == "device lost"));
        assert_eq!(manager.status(), "Failed to create context: device lost");
    }

    #[tokio::test]
    async fn test_create_requires_probe() {
        let mut manager = Manager::new(Stub::native(true));
        let err = manager.create_context().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContextState { .. }));
        assert_eq!(manager.state(), &ContextState::Unprobed);
    }

    #[tokio::test]
    async fn test_context_created_at_most_once() {
        let mut manager = Manager::new(Stub::native(true));
        manager.probe();
        manager.create_context().await.unwrap();

        let err = manager.create_context().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContextState { .. }));
        assert_eq!(manager.state(), &ContextState::ContextReady);
    }

    #[tokio::test]
    async fn test_failed_context_is_terminal() {
        let mut manager = Manager::new(Stub::native(false));
        manager.probe();
        assert!(manager.create_context().await.is_err());
        let failed = ContextState::ContextFailed("fallback layer not loaded".to_string());

        // A fallback loaded after the failure does not reopen the manager.
        manager.load_fallback(Stub::fallback());
        assert_eq!(manager.probe(), &failed);

        let err = manager.create_context().await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContextState { .. }));
        assert_eq!(manager.state(), &failed);
        assert!(manager.context().is_none());
        assert!(manager.run_noop().is_err());
    }

    #[test]
    fn test_run_requires_ready_context() {
        let mut manager = Manager::new(Stub::native(true));
        manager.probe();
        assert!(matches!(
            manager.run_noop(),
            Err(PipelineError::InvalidContextState { .. })
        ));
    }

    #[tokio::test]
    async fn test_host_software_fallback() {
        let mut manager = HostContextManager::new(HostAcceleration);
        manager.load_fallback(SoftwareEmulation);
        manager.probe();

        let context = manager.create_context().await.unwrap().clone();
        let expected = if HostAcceleration.is_available() {
            "parallel"
        } else {
            "cpu"
        };
        assert_eq!(context.backend, expected);
    }
}
