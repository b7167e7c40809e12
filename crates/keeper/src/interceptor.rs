//! Bearer-token authentication for every gRPC route
//!
//! Installed as a tower layer on the tonic server so unary and streaming
//! calls go through the same check before any handler runs.

use futures::future::BoxFuture;
use http::{header, HeaderMap, HeaderValue, Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::token::TokenManager;

/// Methods reachable without a token
pub const PUBLIC_METHODS: &[&str] = &[
    "/keeper.v1.AuthService/Register",
    "/keeper.v1.AuthService/Login",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
];

/// Verification result carried in the request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub user_id: i64,
    pub email: String,
}

/// Authenticated caller of a handler, or Unauthenticated when the layer did
/// not attach one
pub fn caller<T>(request: &tonic::Request<T>) -> Result<AuthInfo, Status> {
    request
        .extensions()
        .get::<AuthInfo>()
        .cloned()
        .ok_or_else(|| Status::unauthenticated("missing credentials"))
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_METHODS.contains(&path)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, Status> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Status::unauthenticated("missing authorization metadata"))?
        .to_str()
        .map_err(|_| Status::unauthenticated("malformed authorization metadata"))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .unwrap_or(value)
        .trim();

    if token.is_empty() {
        return Err(Status::unauthenticated("empty bearer token"));
    }
    Ok(token)
}

/// Trailers-only gRPC response carrying `status`
fn status_response<B: Default>(status: Status) -> Response<B> {
    let mut response = Response::new(B::default());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    if let Err(e) = status.add_header(headers) {
        warn!("Failed to encode status into headers: {}", e);
    }
    response
}

#[derive(Clone)]
pub struct AuthLayer {
    tokens: Arc<TokenManager>,
}

impl AuthLayer {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            tokens: self.tokens.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    tokens: Arc<TokenManager>,
}

impl<S> AuthMiddleware<S> {
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthInfo, Status> {
        let token = bearer_token(headers)?;
        self.tokens.verify(token).map_err(|e| {
            warn!("Rejected token: {}", e);
            Status::unauthenticated("invalid or expired token")
        })
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for AuthMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        let path = request.uri().path().to_string();

        if !is_public(&path) {
            match self.authenticate(request.headers()) {
                Ok(info) => {
                    debug!("{} called by user {}", path, info.user_id);
                    request.extensions_mut().insert(info);
                }
                Err(status) => {
                    let response = status_response(status);
                    return Box::pin(async move { Ok(response) });
                }
            }
        }

        // the clone that was polled ready handles this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(request).await })
    }
}
