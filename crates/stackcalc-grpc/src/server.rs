//! gRPC server implementation for the Calculator service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stackcalc::{CalcError, CancellationToken, StackRegistry};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use crate::proto::{
    self, DelayPopRequest, Empty, IsEmptyRequest, IsEmptyResponse, PopRequest,
    PushOperationRequest, PushValueRequest, ValueResponse,
};

/// The Calculator gRPC service implementation.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Debug)]
pub struct CalculatorService {
    registry: Arc<StackRegistry>,
    /// Cancelled when the server shuts down; interrupts pending delayed pops.
    shutdown: CancellationToken,
}

impl CalculatorService {
    /// Create a service over `registry`.
    pub fn new(registry: Arc<StackRegistry>, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }

    /// The registry this service operates on.
    pub fn registry(&self) -> &Arc<StackRegistry> {
        &self.registry
    }
}

impl Default for CalculatorService {
    fn default() -> Self {
        Self::new(Arc::default(), CancellationToken::new())
    }
}

/// Map a registry error onto a gRPC status.
pub fn status_from(err: CalcError) -> Status {
    let message = err.to_string();
    match err {
        CalcError::EmptyStack { .. } => Status::failed_precondition(message),
        CalcError::InvalidOperator(_) => Status::invalid_argument(message),
        CalcError::Overflow { .. } => Status::out_of_range(message),
        CalcError::Cancelled => Status::cancelled(message),
    }
}

#[tonic::async_trait]
impl proto::calculator_server::Calculator for CalculatorService {
    async fn push_value(
        &self,
        request: Request<PushValueRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.registry.push_value(&req.client_id, req.value);
        Ok(Response::new(Empty {}))
    }

    async fn push_operation(
        &self,
        request: Request<PushOperationRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.registry
            .push_operation(&req.client_id, &req.operator)
            .map_err(status_from)?;
        Ok(Response::new(Empty {}))
    }

    async fn pop(&self, request: Request<PopRequest>) -> Result<Response<ValueResponse>, Status> {
        let req = request.into_inner();
        let value = self.registry.pop(&req.client_id).map_err(status_from)?;
        Ok(Response::new(ValueResponse { value }))
    }

    async fn is_empty(
        &self,
        request: Request<IsEmptyRequest>,
    ) -> Result<Response<IsEmptyResponse>, Status> {
        let req = request.into_inner();
        let empty = self.registry.is_empty(&req.client_id);
        Ok(Response::new(IsEmptyResponse { empty }))
    }

    async fn delay_pop(
        &self,
        request: Request<DelayPopRequest>,
    ) -> Result<Response<ValueResponse>, Status> {
        let req = request.into_inner();
        let millis = u64::try_from(req.millis).map_err(|_| {
            Status::invalid_argument(format!("delay must be non-negative, got {}ms", req.millis))
        })?;

        // If the client goes away, tonic drops this future and the pop
        // never happens.
        let value = self
            .registry
            .delay_pop(&req.client_id, Duration::from_millis(millis), &self.shutdown)
            .await
            .map_err(status_from)?;
        Ok(Response::new(ValueResponse { value }))
    }
}

/// Server configuration and runner.
#[derive(Debug)]
pub struct CalculatorServer {
    addr: SocketAddr,
    registry: Arc<StackRegistry>,
    shutdown: CancellationToken,
}

impl CalculatorServer {
    /// Create a new server bound to the given address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            registry: Arc::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Serve an existing registry instead of a fresh one.
    pub fn with_registry(mut self, registry: Arc<StackRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Token that stops the server when cancelled.
    ///
    /// Cancelling it also fails pending delayed pops with `CANCELLED`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn service(&self) -> CalculatorService {
        CalculatorService::new(Arc::clone(&self.registry), self.shutdown.clone())
    }

    /// Run the server until Ctrl+C, SIGTERM, or the shutdown token fires.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown_signal() => shutdown.cancel(),
                () = shutdown.cancelled() => {}
            }
        });

        self.serve(listener).await
    }

    /// Serve on an already-bound listener until the shutdown token fires.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        tracing::info!("Starting gRPC server on {}", listener.local_addr()?);

        let service = self.service();
        tonic::transport::Server::builder()
            .add_service(proto::calculator_server::CalculatorServer::new(service))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                self.shutdown.cancelled_owned(),
            )
            .await?;

        tracing::info!(
            clients = self.registry.client_count(),
            "gRPC server shut down"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                // Fall through to let ctrl_c handle shutdown
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
