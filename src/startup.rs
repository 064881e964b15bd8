//! Startup sequence for the flowsync engine
//!
//! Builds the shared pipeline, cache and validator, then runs every subsystem
//! under one cancellation token:
//! - synchronizer and (optionally) endpoint discovery start immediately
//! - REST fetch and admission servers start immediately so probes answer during warm-up;
//!   snapshot reads and `/readyz` answer 503 until the barrier passes
//! - the ADS server starts once the warm-up barrier passes

use crate::api::{start_admission_server, start_rest_server, ApiState};
use crate::config::AppConfig;
use crate::discovery::{wait_for_ready, DiscoverySubsystem, DnsMembershipSource, MembershipSource};
use crate::errors::{Error, Result};
use crate::syncer::{ConfigPipeline, ExtensionSet, Synchronizer};
use crate::translation::{DefaultTranslator, Translator};
use crate::validation::Validator;
use crate::xds::{start_xds_server, SnapshotCache};
use crate::store::ResourceStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct ControlPlane {
    config: AppConfig,
    store: Arc<dyn ResourceStore>,
    cache: Arc<SnapshotCache>,
    translator: Arc<dyn Translator>,
    pipeline: ConfigPipeline,
    validator: Arc<Validator>,
    membership: Arc<dyn MembershipSource>,
}

impl std::fmt::Debug for ControlPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlane")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl ControlPlane {
    pub fn new(config: AppConfig, store: Arc<dyn ResourceStore>) -> Self {
        let translator: Arc<dyn Translator> = Arc::new(DefaultTranslator::new());
        let pipeline =
            ConfigPipeline::new(translator.clone(), &config.sync.sanitize_policy(), ExtensionSet::empty());
        let validator = Arc::new(Validator::new(pipeline.clone(), config.validation.policy()));

        Self {
            config,
            store,
            cache: Arc::new(SnapshotCache::new()),
            translator,
            pipeline,
            validator,
            membership: Arc::new(DnsMembershipSource::default()),
        }
    }

    /// Replace the extension set; the validator is rebuilt so dry runs match live cycles
    pub fn with_extensions(mut self, extensions: ExtensionSet) -> Self {
        self.pipeline = ConfigPipeline::new(
            self.translator.clone(),
            &self.config.sync.sanitize_policy(),
            extensions,
        );
        self.validator = Arc::new(Validator::new(self.pipeline.clone(), self.config.validation.policy()));
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        let extensions = self.pipeline.extensions().clone();
        self.with_extensions(extensions)
    }

    pub fn with_membership_source(mut self, source: Arc<dyn MembershipSource>) -> Self {
        self.membership = source;
        self
    }

    pub fn cache(&self) -> Arc<SnapshotCache> {
        self.cache.clone()
    }

    pub fn validator(&self) -> Arc<Validator> {
        self.validator.clone()
    }

    /// Run until `cancel` fires or a subsystem fails
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let ControlPlane { config, store, cache, pipeline, validator, membership, .. } = self;
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        let synchronizer = Synchronizer::new(store.clone(), cache.clone(), pipeline, &config.sync)
            .with_validator(validator.clone());
        let sync_ready = synchronizer.readiness();
        let mut signals = vec![("synchronizer".to_string(), sync_ready)];
        tasks.spawn(synchronizer.run(cancel.clone()));

        if config.discovery.enabled {
            let discovery = DiscoverySubsystem::new(
                store.clone(),
                cache.clone(),
                membership,
                &config.discovery,
                config.sync.namespaces(),
            );
            signals.push(("discovery".to_string(), discovery.readiness()));
            tasks.spawn(discovery.run(cancel.clone()));
        } else {
            info!("endpoint discovery disabled");
        }

        let (warm_tx, warm_rx) = watch::channel(false);
        if let Some(rest_address) = config.xds.rest_bind_address.clone() {
            let state = ApiState::new(cache.clone(), warm_rx);
            let cancel = cancel.clone();
            tasks.spawn(async move { start_rest_server(&rest_address, state, cancel).await });
        }

        if config.validation.enabled {
            let webhook = config.validation.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { start_admission_server(&webhook, validator, cancel).await });
        } else {
            info!("admission webhook disabled");
        }

        if let Err(e) = wait_for_ready(&cancel, config.discovery.warming_timeout(), signals).await {
            cancel.cancel();
            drain(&mut tasks).await;
            return match e {
                Error::Cancelled { .. } => Ok(()),
                other => Err(other),
            };
        }
        info!("warm-up complete, serving xDS");
        warm_tx.send_replace(true);

        {
            let xds = config.xds.clone();
            let cache = cache.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { start_xds_server(&xds, cache, cancel).await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.unwrap_or_else(|e| Err(Error::internal(format!("task failed: {}", e))));
            if let Err(e) = outcome {
                error!(error = %e, "subsystem terminated with error, shutting down");
                cancel.cancel();
                first_error.get_or_insert(e);
            }
        }

        info!("control plane stopped");
        first_error.map_or(Ok(()), Err)
    }
}

async fn drain(tasks: &mut JoinSet<Result<()>>) {
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Err(e)) = joined {
            error!(error = %e, "subsystem failed during shutdown");
        }
    }
}
