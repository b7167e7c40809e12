//! Server runtime: builds the stores and services from configuration and
//! serves them over gRPC

use anyhow::{anyhow, Context, Result};
use db::Database;
use proto::auth_service_server::AuthServiceServer;
use proto::keeper_service_server::KeeperServiceServer;
use std::future::Future;
use std::sync::Arc;
use storage::{LocalObjectStore, ObjectStore, S3ObjectStore};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use crate::config::{Config, Environment, ObjectBackend};
use crate::handlers::{AuthServiceImpl, KeeperServiceImpl};
use crate::interceptor::AuthLayer;
use crate::password::PasswordHasher;
use crate::services::{AuthService, KeeperService};
use crate::token::TokenManager;
use crate::validation::MAX_CONTENT_LEN;

/// Room for protobuf framing around the largest chunk or inline content
const DECODE_HEADROOM: usize = 64 * 1024;

pub struct ServiceRunner {
    config: Config,
    database: Arc<Database>,
    tokens: Arc<TokenManager>,
    auth: Arc<AuthService>,
    keeper: Arc<KeeperService>,
}

impl ServiceRunner {
    pub async fn new(config: Config) -> Result<Self> {
        let hasher = PasswordHasher::production()
            .map_err(|e| anyhow!("Failed to configure password hashing: {}", e))?;
        Self::with_password_hasher(config, hasher).await
    }

    pub async fn with_password_hasher(config: Config, hasher: PasswordHasher) -> Result<Self> {
        let database = Arc::new(
            Database::connect(&config.storage_path, &config.database)
                .await
                .context("Failed to connect to database")?,
        );

        if config.env == Environment::Dev {
            database
                .bootstrap_schema()
                .await
                .context("Failed to bootstrap schema")?;
        }

        let objects = build_object_store(&config).await?;
        let tokens = Arc::new(TokenManager::new(
            config.token.secret.as_bytes(),
            config.token.ttl(),
        ));

        let auth = Arc::new(AuthService::new(database.clone(), hasher, tokens.clone()));
        let keeper = Arc::new(KeeperService::new(database.clone(), objects));

        Ok(Self {
            config,
            database,
            tokens,
            auth,
            keeper,
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.config.grpc.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        self.run_with_listener(listener, shutdown).await
    }

    pub async fn run_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        let grpc = &self.config.grpc;

        if let Some(metrics) = &self.config.metrics {
            monitoring::init_metrics()?;
            let addr = metrics.address;
            tokio::spawn(async move {
                if let Err(e) = monitoring::start_metrics_server(addr).await {
                    error!("Metrics server failed: {}", e);
                }
            });
        }

        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_serving::<AuthServiceServer<AuthServiceImpl>>()
            .await;
        health_reporter
            .set_serving::<KeeperServiceServer<KeeperServiceImpl>>()
            .await;

        let auth = AuthServiceServer::new(AuthServiceImpl::new(self.auth.clone()));
        let keeper = KeeperServiceServer::new(KeeperServiceImpl::new(
            self.keeper.clone(),
            grpc.max_chunk_size,
        ))
        .max_decoding_message_size(grpc.max_chunk_size.max(MAX_CONTENT_LEN) + DECODE_HEADROOM);

        let (reflection_v1, reflection_v1alpha) = if grpc.enable_reflection {
            let v1 = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
                .build_v1()?;
            let v1alpha = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
                .build_v1alpha()?;
            (Some(v1), Some(v1alpha))
        } else {
            (None, None)
        };

        info!(
            "Starting keeper server on {} (env {}, reflection {})",
            local_addr,
            self.config.env.as_str(),
            grpc.enable_reflection
        );

        Server::builder()
            .timeout(grpc.timeout())
            .layer(AuthLayer::new(self.tokens.clone()))
            .add_service(health_service)
            .add_service(auth)
            .add_service(keeper)
            .add_optional_service(reflection_v1)
            .add_optional_service(reflection_v1alpha)
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .map_err(|e| anyhow!("Server error: {}", e))?;

        info!("Keeper server stopped");
        Ok(())
    }
}

async fn build_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.objects.backend {
        ObjectBackend::Local => {
            info!("Using local object store at {}", config.objects.root.display());
            let store = LocalObjectStore::new(config.objects.root.clone())
                .await
                .context("Failed to open local object store")?;
            Ok(Arc::new(store))
        }
        ObjectBackend::Minio => {
            let minio = config
                .minio
                .as_ref()
                .ok_or_else(|| anyhow!("[minio] section is required for the minio backend"))?;
            info!(
                "Using object store {} bucket {}",
                minio.endpoint_url(),
                minio.bucket
            );
            let store = S3ObjectStore::new(minio).await;
            store
                .ensure_bucket()
                .await
                .context("Failed to prepare object bucket")?;
            Ok(Arc::new(store))
        }
    }
}
