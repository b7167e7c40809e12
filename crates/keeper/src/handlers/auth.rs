use proto::auth_service_server::AuthService as AuthRpc;
use proto::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use std::sync::Arc;
use std::time::Instant;
use tonic::{Request, Response, Status};

use super::observe;
use crate::services::AuthService;

pub struct AuthServiceImpl {
    service: Arc<AuthService>,
}

impl AuthServiceImpl {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl AuthRpc for AuthServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let result = self
            .service
            .register(&req.email, &req.password)
            .await
            .map(|user_id| RegisterResponse { user_id });

        observe("Register", started, result)
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let started = Instant::now();
        let req = request.into_inner();

        let result = self
            .service
            .login(&req.email, &req.password)
            .await
            .map(|token| LoginResponse { token });

        observe("Login", started, result)
    }
}
