//! Connect flow behind the PC cards' Connect button.
//!
//! Launching a session is a backend round trip, so two quick clicks on the
//! same PC would otherwise both pass the "already open?" check and launch
//! twice. Launches are serialised per instance id; the second caller waits
//! and then reuses the session the first one opened.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use sensepc_viewer::{OpenRequest, SessionInfo, SessionRegistryState};

use crate::cloud::api::CloudApi;
use crate::cloud::error::CloudError;
use crate::cloud::launcher::prepare_connection;

pub struct SessionConnector {
    api: Arc<dyn CloudApi>,
    registry: SessionRegistryState,
    launches: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionConnector {
    pub fn new(api: Arc<dyn CloudApi>, registry: SessionRegistryState) -> Self {
        Self {
            api,
            registry,
            launches: Mutex::new(HashMap::new()),
        }
    }

    /// Select the live session for `instance_id`, or launch one through the
    /// API and open it.
    pub async fn connect(&self, instance_id: &str, system_name: &str) -> Result<SessionInfo, CloudError> {
        let gate = {
            let mut launches = self.launches.lock().await;
            launches.entry(instance_id.to_string()).or_default().clone()
        };

        let result = {
            let _launching = gate.lock().await;
            self.connect_exclusive(instance_id, system_name).await
        };

        let mut launches = self.launches.lock().await;
        // Map entry plus `gate`: nobody else is waiting.
        if Arc::strong_count(&gate) == 2 {
            launches.remove(instance_id);
        }
        result
    }

    async fn connect_exclusive(&self, instance_id: &str, system_name: &str) -> Result<SessionInfo, CloudError> {
        if self.registry.contains(instance_id).await {
            log::debug!("[cloud-launch] {} already open, reusing", instance_id);
            return Ok(self.registry.open(OpenRequest::new(instance_id, "", "", "", "")).await?);
        }
        let params = prepare_connection(self.api.as_ref(), instance_id, system_name).await?;
        log::info!("[cloud-launch] opening viewer for {}", instance_id);
        Ok(self.registry.open(params.into()).await?)
    }

    #[cfg(test)]
    async fn pending_launches(&self) -> usize {
        self.launches.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::api::MockCloudApi;
    use crate::cloud::types::{Instance, LaunchSession};
    use async_trait::async_trait;
    use sensepc_viewer::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct IdleSurface;

    impl ViewerSurface for IdleSurface {
        fn navigate(&self, _url: &str) -> Result<(), ViewerError> {
            Ok(())
        }
        fn execute_script(&self, _script: &str) -> Result<(), ViewerError> {
            Ok(())
        }
        fn set_visible(&self, _visible: bool) -> Result<(), ViewerError> {
            Ok(())
        }
        fn dispose(&self) {}
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl SurfaceFactory for CountingFactory {
        fn create(&self, _context: SurfaceContext) -> Result<Box<dyn ViewerSurface>, ViewerError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(IdleSurface))
        }
    }

    /// Launches take a while, like the real backend.
    #[derive(Default)]
    struct SlowLaunchApi {
        launches: AtomicUsize,
    }

    #[async_trait]
    impl CloudApi for SlowLaunchApi {
        async fn list_instances(&self) -> Result<Vec<Instance>, CloudError> {
            Ok(Vec::new())
        }
        async fn start_instance(&self, _instance_id: &str) -> Result<(), CloudError> {
            Ok(())
        }
        async fn stop_instance(&self, _instance_id: &str) -> Result<(), CloudError> {
            Ok(())
        }
        async fn restart_instance(&self, _instance_id: &str) -> Result<(), CloudError> {
            Ok(())
        }
        async fn launch_session(&self, _instance_id: &str) -> Result<LaunchSession, CloudError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(LaunchSession {
                session_token: Some("tok".into()),
                host_name: Some("vm1.example.com".into()),
                ..LaunchSession::default()
            })
        }
    }

    fn registry(factory: Arc<CountingFactory>) -> SessionRegistryState {
        let (registry, _pump) = SessionRegistry::new(factory, RegistryOptions::default());
        registry
    }

    #[tokio::test(start_paused = true)]
    async fn double_click_launches_once() {
        let factory = Arc::new(CountingFactory::default());
        let api = Arc::new(SlowLaunchApi::default());
        let connector = SessionConnector::new(api.clone(), registry(factory.clone()));

        let (a, b) = tokio::join!(connector.connect("vm-1", "Dev Box"), connector.connect("vm-1", "Dev Box"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(api.launches.load(Ordering::SeqCst), 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(a.viewer_id, b.viewer_id);
        assert_eq!(connector.pending_launches().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn different_instances_launch_independently() {
        let factory = Arc::new(CountingFactory::default());
        let api = Arc::new(SlowLaunchApi::default());
        let registry = registry(factory.clone());
        let connector = SessionConnector::new(api.clone(), registry.clone());

        let (a, b) = tokio::join!(connector.connect("vm-1", ""), connector.connect("vm-2", ""));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(api.launches.load(Ordering::SeqCst), 2);
        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn open_session_is_reused_without_launching() {
        let factory = Arc::new(CountingFactory::default());
        let registry = registry(factory.clone());
        registry
            .open(OpenRequest::new("vm-1", "Dev Box", "vm1.example.com", "tok", "console"))
            .await
            .unwrap();

        let mut api = MockCloudApi::new();
        api.expect_launch_session().never();
        let connector = SessionConnector::new(Arc::new(api), registry.clone());

        let info = connector.connect("vm-1", "Dev Box").await.unwrap();
        assert_eq!(info.host_name, "vm1.example.com");
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.selected().await.as_deref(), Some("vm-1"));
    }

    #[tokio::test]
    async fn failed_launch_opens_nothing() {
        let factory = Arc::new(CountingFactory::default());
        let registry = registry(factory.clone());
        let mut api = MockCloudApi::new();
        api.expect_launch_session()
            .times(1)
            .returning(|_| Err(CloudError::Unauthorized));
        let connector = SessionConnector::new(Arc::new(api), registry.clone());

        let err = connector.connect("vm-1", "").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(registry.is_empty().await);
        assert_eq!(connector.pending_launches().await, 0);
    }
}
