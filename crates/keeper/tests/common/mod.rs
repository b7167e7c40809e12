#![allow(dead_code)]

use keeper::{Config, PasswordHasher, ServiceRunner};
use proto::auth_service_client::AuthServiceClient;
use proto::keeper_service_client::KeeperServiceClient;
use proto::{LoginRequest, RegisterRequest};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

pub const TOKEN_SECRET: &str = "e2e-token-secret";
pub const TOKEN_TTL: Duration = Duration::from_secs(3600);
pub const MAX_CHUNK_SIZE: usize = 1024;

pub type KeeperClient = KeeperServiceClient<InterceptedService<Channel, BearerAuth>>;

/// Attaches `authorization: Bearer <token>` to every call
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl Interceptor for BearerAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let value: MetadataValue<Ascii> = format!("Bearer {}", self.token)
            .parse()
            .map_err(|_| Status::invalid_argument("token is not valid metadata"))?;
        request.metadata_mut().insert("authorization", value);
        Ok(request)
    }
}

/// A keeper server on an ephemeral port backed by SQLite and a local object
/// store, both inside a temporary directory
pub struct TestServer {
    pub addr: SocketAddr,
    dir: TempDir,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!(
            r#"
            env = "dev"
            storage_path = "sqlite://{db}?mode=rwc"

            [grpc]
            server_address = "127.0.0.1:0"
            timeout_secs = 30
            max_chunk_size = {chunk}

            [token]
            ttl_secs = {ttl}
            secret = "{secret}"

            [database]
            max_connections = 1

            [objects]
            backend = "local"
            root = "{objects}"
            "#,
            db = dir.path().join("keeper.db").display(),
            chunk = MAX_CHUNK_SIZE,
            ttl = TOKEN_TTL.as_secs(),
            secret = TOKEN_SECRET,
            objects = dir.path().join("objects").display(),
        );

        let config = Config::from_toml_str(&raw).unwrap();
        config.validate().unwrap();

        let hasher = PasswordHasher::low_cost().unwrap();
        let runner = ServiceRunner::with_password_hasher(config, hasher)
            .await
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(runner.run_with_listener(listener, async {
            rx.await.ok();
        }));

        Self {
            addr,
            dir,
            shutdown: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn objects_root(&self) -> PathBuf {
        self.dir.path().join("objects")
    }

    /// Every file below the object root, unfinished uploads included
    pub fn object_files(&self) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, out);
                } else {
                    out.push(path);
                }
            }
        }

        let mut files = Vec::new();
        walk(&self.objects_root(), &mut files);
        files
    }

    pub async fn channel(&self) -> Channel {
        Channel::from_shared(format!("http://{}", self.addr))
            .unwrap()
            .connect()
            .await
            .unwrap()
    }

    pub async fn auth_client(&self) -> AuthServiceClient<Channel> {
        AuthServiceClient::new(self.channel().await)
    }

    pub async fn keeper_client(&self, token: &str) -> KeeperClient {
        KeeperServiceClient::with_interceptor(
            self.channel().await,
            BearerAuth {
                token: token.to_string(),
            },
        )
    }

    /// Register and log in, returning the user id and session token
    pub async fn sign_up(&self, email: &str, password: &str) -> (i64, String) {
        let mut auth = self.auth_client().await;
        let user_id = auth
            .register(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .unwrap()
            .into_inner()
            .user_id;
        let token = auth
            .login(LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await
            .unwrap()
            .into_inner()
            .token;
        (user_id, token)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Poll `condition` for up to five seconds
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
