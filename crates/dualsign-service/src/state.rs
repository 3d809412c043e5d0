//! Shared application state and collaborator wiring

use crate::config::{MailConfig, RenderEngine, ServiceConfig, StorageConfig};
use crate::error::{ServiceError, ServiceResult};
use dualsign_adapters::{
    CountersignerConfig, HttpMailRelay, HttpRenderer, LogNotifier, MtlsCountersigner,
    StaticRenderer,
};
use dualsign_core::{
    DocumentRenderer, DualsignStorage, FinalizationPipeline, FinalizationSettings, HandoffSettings,
    InMemoryDualsignStorage, NamingConventionClassifier, Notifier, SigningOrchestrator,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ServiceState {
    pub orchestrator: Arc<SigningOrchestrator>,
    pub storage_backend: &'static str,
    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl ServiceState {
    pub fn new(orchestrator: Arc<SigningOrchestrator>) -> Self {
        Self {
            storage_backend: orchestrator.storage().backend_label(),
            orchestrator,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn countersign_enabled(&self) -> bool {
        self.orchestrator.finalizer().countersign_enabled()
    }

    /// Build storage and collaborators from configuration.
    pub async fn bootstrap(config: &ServiceConfig) -> ServiceResult<Self> {
        config.validate()?;
        let storage = connect_storage(&config.storage).await?;

        let renderer: Arc<dyn DocumentRenderer> = match &config.renderer.engine {
            RenderEngine::Stub => Arc::new(StaticRenderer),
            RenderEngine::Http { endpoint } => Arc::new(HttpRenderer::new(
                endpoint.clone(),
                Duration::from_secs(config.renderer.timeout_secs),
            )?),
        };

        let notifier: Arc<dyn Notifier> = match &config.mail {
            MailConfig::Log => Arc::new(LogNotifier),
            MailConfig::Relay {
                endpoint,
                from,
                api_token,
                timeout_secs,
            } => {
                let relay = HttpMailRelay::new(
                    endpoint.clone(),
                    from.clone(),
                    Duration::from_secs(*timeout_secs),
                )?;
                Arc::new(match api_token {
                    Some(token) => relay.with_api_token(token.clone()),
                    None => relay,
                })
            }
        };

        let settings = FinalizationSettings {
            view_base_url: config.renderer.view_base_url.clone(),
            render_timeout: Duration::from_secs(config.renderer.timeout_secs),
            countersign_timeout: Duration::from_secs(config.countersign.timeout_secs),
            subject: config.finalize.subject.clone(),
            body: config.finalize.body.clone(),
        };
        let mut pipeline =
            FinalizationPipeline::new(storage.clone(), renderer, notifier.clone(), settings);

        if config.countersign.enabled {
            let countersign = &config.countersign;
            let (Some(endpoint), Some(cert), Some(key)) = (
                countersign.endpoint.clone(),
                countersign.client_cert_path.clone(),
                countersign.client_key_path.clone(),
            ) else {
                return Err(ServiceError::Config(
                    "countersigning requires endpoint and client credentials".to_string(),
                ));
            };
            let countersigner = MtlsCountersigner::from_files(&CountersignerConfig {
                endpoint,
                client_cert_path: cert,
                client_key_path: key,
                ca_cert_path: countersign.ca_cert_path.clone(),
                timeout: Duration::from_secs(countersign.timeout_secs),
            })?;
            pipeline = pipeline.with_countersigner(Arc::new(countersigner));
        }

        let orchestrator = SigningOrchestrator::new(
            storage,
            Arc::new(NamingConventionClassifier),
            notifier,
            Arc::new(pipeline),
        )
        .with_handoff(HandoffSettings {
            subject: config.finalize.handoff_subject.clone(),
            body: config.finalize.handoff_body.clone(),
        });

        let state = Self::new(Arc::new(orchestrator));
        tracing::info!(
            storage = state.storage_backend,
            countersign = state.countersign_enabled(),
            "dualsign state initialized"
        );
        Ok(state)
    }
}

async fn connect_storage(config: &StorageConfig) -> ServiceResult<Arc<dyn DualsignStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(InMemoryDualsignStorage::new())),
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = dualsign_core::storage::postgres::PostgresDualsignStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(ServiceError::Config(
            "postgres storage requested but dualsignd was built without the `postgres` feature"
                .to_string(),
        )),
    }
}
