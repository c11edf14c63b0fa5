//! Model session lifecycle
//!
//! The service owns exactly one model session. It is loaded once before
//! traffic is accepted and released when shutdown begins:
//!
//! ```text
//! Uninitialized --start--> Ready --release--> Released
//! ```
//!
//! There is no transition back to `Ready`. Requests that arrive outside the
//! `Ready` window get `ServiceUnavailable`; requests already holding a
//! session handle finish normally.

use crate::{
    backends::MockBackend,
    config::ServiceConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Lifecycle state of the model session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Uninitialized,
    Ready,
    Released,
}

/// Source of the model session
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model and return a shareable session
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>>;
}

/// Loader driven by the service configuration
///
/// Resolves (and if needed downloads) the configured model, then builds an
/// ONNX Runtime session on a blocking thread. With `mock_backend` set it
/// returns a `MockBackend` instead and touches neither disk nor network.
#[derive(Debug, Clone)]
pub struct DefaultModelLoader {
    config: ServiceConfig,
}

impl DefaultModelLoader {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    #[cfg(feature = "onnx")]
    async fn load_onnx(&self) -> Result<Arc<dyn InferenceBackend>> {
        use crate::{backends::OnnxBackend, download::ModelDownloader};

        let downloader = ModelDownloader::new(self.config.model_spec.cache_dir.clone())?;
        let model_path = downloader.ensure_model(&self.config.model_spec).await?;

        let kind = self.config.model_spec.kind;
        let config = self.config.clone();
        let backend = tokio::task::spawn_blocking(move || {
            OnnxBackend::load(&model_path, kind, &config)
        })
        .await
        .map_err(|e| BgRemovalError::internal(format!("Model loading task failed: {e}")))??;

        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "onnx"))]
    async fn load_onnx(&self) -> Result<Arc<dyn InferenceBackend>> {
        Err(BgRemovalError::invalid_config(
            "ONNX support is not compiled in. Rebuild with the `onnx` feature or run with --mock",
        ))
    }
}

#[async_trait]
impl ModelLoader for DefaultModelLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceBackend>> {
        if self.config.mock_backend {
            warn!("Using mock backend; results come from a synthetic mask, not a model");
            return Ok(Arc::new(MockBackend::with_kind(self.config.model_spec.kind)));
        }

        self.load_onnx().await
    }
}

#[derive(Debug)]
struct Slot {
    state: SessionState,
    session: Option<Arc<dyn InferenceBackend>>,
}

/// Owns the process-wide model session and its state machine
#[derive(Debug)]
pub struct LifecycleController {
    slot: RwLock<Slot>,
}

impl LifecycleController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot {
                state: SessionState::Uninitialized,
                session: None,
            }),
        }
    }

    /// Load the model session and move to `Ready`
    ///
    /// # Errors
    /// - `InvalidConfig` when not in `Uninitialized`
    /// - Any error returned by the loader
    pub async fn start(&self, loader: &dyn ModelLoader) -> Result<()> {
        self.ensure_uninitialized()?;

        let session = loader.load().await?;
        let model_name = session.model_info().name.clone();

        // The lock is not held across the load; re-check before committing
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.state != SessionState::Uninitialized {
            return Err(Self::already_started(slot.state));
        }
        slot.state = SessionState::Ready;
        slot.session = Some(session);
        drop(slot);

        info!(model = %model_name, "Model session ready");
        Ok(())
    }

    /// Drop the session and move to `Released`
    ///
    /// Safe to call more than once. In-flight requests keep their own handle.
    pub fn release(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.state == SessionState::Released {
            return;
        }
        let had_session = slot.session.take().is_some();
        slot.state = SessionState::Released;
        drop(slot);

        if had_session {
            info!("Model session released");
        }
    }

    /// Shared handle to the session
    ///
    /// # Errors
    /// - `ServiceUnavailable` unless the state is `Ready`
    pub fn session(&self) -> Result<Arc<dyn InferenceBackend>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        match (&slot.state, &slot.session) {
            (SessionState::Ready, Some(session)) => Ok(Arc::clone(session)),
            _ => Err(BgRemovalError::ServiceUnavailable),
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        match self.state() {
            SessionState::Uninitialized => Ok(()),
            state => Err(Self::already_started(state)),
        }
    }

    fn already_started(state: SessionState) -> BgRemovalError {
        BgRemovalError::invalid_config(format!(
            "Model session can only be started once (current state: {state:?})"
        ))
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticLoader(Arc<dyn InferenceBackend>);

    #[async_trait]
    impl ModelLoader for StaticLoader {
        async fn load(&self) -> Result<Arc<dyn InferenceBackend>> {
            Ok(Arc::clone(&self.0))
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl ModelLoader for FailingLoader {
        async fn load(&self) -> Result<Arc<dyn InferenceBackend>> {
            Err(BgRemovalError::model("weights corrupted"))
        }
    }

    fn mock_loader() -> StaticLoader {
        StaticLoader(Arc::new(MockBackend::new()))
    }

    #[tokio::test]
    async fn test_start_moves_to_ready() {
        let controller = LifecycleController::new();
        assert_eq!(controller.state(), SessionState::Uninitialized);
        assert!(matches!(
            controller.session(),
            Err(BgRemovalError::ServiceUnavailable)
        ));

        controller.start(&mock_loader()).await.unwrap();
        assert!(controller.is_ready());
        assert!(controller.session().is_ok());
    }

    #[tokio::test]
    async fn test_failed_load_stays_uninitialized() {
        let controller = LifecycleController::new();
        let err = controller.start(&FailingLoader).await.unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
        assert_eq!(controller.state(), SessionState::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let controller = LifecycleController::new();
        controller.start(&mock_loader()).await.unwrap();
        let err = controller.start(&mock_loader()).await.unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
        assert!(controller.is_ready());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_final() {
        let controller = LifecycleController::new();
        controller.start(&mock_loader()).await.unwrap();

        controller.release();
        controller.release();
        assert_eq!(controller.state(), SessionState::Released);
        assert!(matches!(
            controller.session(),
            Err(BgRemovalError::ServiceUnavailable)
        ));

        assert!(controller.start(&mock_loader()).await.is_err());
        assert_eq!(controller.state(), SessionState::Released);
    }

    #[tokio::test]
    async fn test_in_flight_handle_survives_release() {
        let backend = MockBackend::new();
        let controller = LifecycleController::new();
        controller
            .start(&StaticLoader(Arc::new(backend.clone())))
            .await
            .unwrap();

        let handle = controller.session().unwrap();
        controller.release();

        let input = ndarray::Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(handle.infer(&input).is_ok());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_default_loader_mock_backend() {
        let config = ServiceConfig::builder().mock_backend(true).build().unwrap();
        let session = DefaultModelLoader::new(config).load().await.unwrap();
        assert_eq!(session.model_info().name, "mock-u2netp");
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Ready).unwrap(),
            "\"ready\""
        );
    }
}
