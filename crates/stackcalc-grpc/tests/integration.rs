//! Integration tests for the Calculator gRPC service.
//!
//! These tests start a real server on an ephemeral port and drive it with
//! the generated client, simulating several independent callers.

#![allow(clippy::unwrap_used, clippy::expect_used)] // unwrap is acceptable in tests

use std::net::SocketAddr;
use std::sync::Once;
use std::time::{Duration, Instant};

use stackcalc::CancellationToken;
use tokio::task::JoinSet;
use tonic::Code;
use tonic::transport::Channel;

use stackcalc_grpc::CalculatorServer;
use stackcalc_grpc::proto::{
    DelayPopRequest, IsEmptyRequest, PopRequest, PushOperationRequest, PushValueRequest,
    calculator_client::CalculatorClient,
};

static INIT_TRACING: Once = Once::new();

fn init_tracing() {
    INIT_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("stackcalc_grpc=debug,stackcalc=debug")
            .with_test_writer()
            .init();
    });
}

/// Macro to log messages in tests (visible with --nocapture)
macro_rules! test_log {
    ($($arg:tt)*) => {
        eprintln!("[TEST] {}", format!($($arg)*));
    };
}

/// Number of simulated callers in the multi-client tests.
const NUM_CLIENTS: usize = 5;

/// A running test server.
struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Start the test server and return its address.
async fn start_test_server() -> TestServer {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    test_log!("Server bound to {}", addr);

    let server = CalculatorServer::new(addr);
    let shutdown = server.shutdown_token();

    tokio::spawn(async move {
        let result = server.serve(listener).await;
        test_log!("Server task ended: {:?}", result);
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, shutdown }
}

/// Connect a client to the server.
async fn connect_client(addr: SocketAddr) -> CalculatorClient<Channel> {
    CalculatorClient::connect(format!("http://{addr}")).await.unwrap()
}

async fn push(client: &mut CalculatorClient<Channel>, id: &str, value: i32) {
    client
        .push_value(PushValueRequest {
            client_id: id.to_string(),
            value,
        })
        .await
        .unwrap();
}

async fn push_op(
    client: &mut CalculatorClient<Channel>,
    id: &str,
    operator: &str,
) -> Result<(), tonic::Status> {
    client
        .push_operation(PushOperationRequest {
            client_id: id.to_string(),
            operator: operator.to_string(),
        })
        .await
        .map(|_| ())
}

async fn pop(client: &mut CalculatorClient<Channel>, id: &str) -> Result<i32, tonic::Status> {
    client
        .pop(PopRequest {
            client_id: id.to_string(),
        })
        .await
        .map(|r| r.into_inner().value)
}

async fn is_empty(client: &mut CalculatorClient<Channel>, id: &str) -> bool {
    client
        .is_empty(IsEmptyRequest {
            client_id: id.to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .empty
}

async fn delay_pop(
    client: &mut CalculatorClient<Channel>,
    id: &str,
    millis: i32,
) -> Result<i32, tonic::Status> {
    client
        .delay_pop(DelayPopRequest {
            client_id: id.to_string(),
            millis,
        })
        .await
        .map(|r| r.into_inner().value)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_operator_scenario() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "x", 10).await;
    push(&mut client, "x", 20).await;
    push_op(&mut client, "x", "max").await.unwrap();
    assert_eq!(pop(&mut client, "x").await.unwrap(), 20);

    push(&mut client, "y", 5).await;
    push(&mut client, "y", 15).await;
    push_op(&mut client, "y", "gcd").await.unwrap();
    assert_eq!(pop(&mut client, "y").await.unwrap(), 5);

    push(&mut client, "z", 14).await;
    push(&mut client, "z", 21).await;
    push_op(&mut client, "z", "lcm").await.unwrap();
    assert_eq!(pop(&mut client, "z").await.unwrap(), 42);

    for id in ["x", "y", "z"] {
        assert!(is_empty(&mut client, id).await);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_is_empty() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    assert!(is_empty(&mut client, "fresh").await);
    push(&mut client, "fresh", 1).await;
    assert!(!is_empty(&mut client, "fresh").await);
    pop(&mut client, "fresh").await.unwrap();
    assert!(is_empty(&mut client, "fresh").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_stack_errors() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    let status = pop(&mut client, "nobody").await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(
        status.message().contains("nobody"),
        "message: {}",
        status.message()
    );

    let status = push_op(&mut client, "nobody", "min").await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    let status = delay_pop(&mut client, "nobody", 10).await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_operator_preserves_stack() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    for v in [7, 8, 9] {
        push(&mut client, "c", v).await;
    }

    let status = push_op(&mut client, "c", "median").await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(status.message().contains("median"));

    assert_eq!(pop(&mut client, "c").await.unwrap(), 9);
    assert_eq!(pop(&mut client, "c").await.unwrap(), 8);
    assert_eq!(pop(&mut client, "c").await.unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overflow_is_out_of_range() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 65536).await;
    push(&mut client, "c", 65537).await;

    let status = push_op(&mut client, "c", "lcm").await.unwrap_err();
    assert_eq!(status.code(), Code::OutOfRange);
    assert_eq!(pop(&mut client, "c").await.unwrap(), 65537);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_isolation() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    for v in [1, 2, 3] {
        push(&mut client, "a", v).await;
    }
    push(&mut client, "b", 10).await;

    assert_eq!(pop(&mut client, "b").await.unwrap(), 10);
    assert!(is_empty(&mut client, "b").await);

    assert_eq!(pop(&mut client, "a").await.unwrap(), 3);
    assert_eq!(pop(&mut client, "a").await.unwrap(), 2);
    assert_eq!(pop(&mut client, "a").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delay_pop_waits() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 30).await;

    let start = Instant::now();
    let value = delay_pop(&mut client, "c", 2000).await.unwrap();
    let elapsed = start.elapsed();

    test_log!("delay_pop returned {} after {:?}", value, elapsed);
    assert_eq!(value, 30);
    assert!(elapsed >= Duration::from_millis(2000), "elapsed: {elapsed:?}");
    assert!(is_empty(&mut client, "c").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delay_pop_sees_interleaved_push() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 1).await;

    let mut delayed = client.clone();
    let handle = tokio::spawn(async move { delay_pop(&mut delayed, "c", 500).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    push(&mut client, "c", 2).await;

    assert_eq!(handle.await.unwrap().unwrap(), 2);
    assert_eq!(pop(&mut client, "c").await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delay_pop_does_not_block_same_client() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 1).await;
    push(&mut client, "c", 2).await;

    let mut delayed = client.clone();
    let handle = tokio::spawn(async move { delay_pop(&mut delayed, "c", 1000).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    assert_eq!(pop(&mut client, "c").await.unwrap(), 2);
    assert!(start.elapsed() < Duration::from_millis(500));

    assert_eq!(handle.await.unwrap().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_negative_delay_rejected() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 1).await;
    let status = delay_pop(&mut client, "c", -1).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert!(!is_empty(&mut client, "c").await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_cancels_delay_pop() {
    let server = start_test_server().await;
    let mut client = connect_client(server.addr).await;

    push(&mut client, "c", 1).await;

    let mut delayed = client.clone();
    let handle = tokio::spawn(async move { delay_pop(&mut delayed, "c", 60_000).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.shutdown.cancel();

    let status = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("delay_pop did not finish after shutdown")
        .unwrap()
        .unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_push_and_pop() {
    let server = start_test_server().await;
    let client = connect_client(server.addr).await;

    let mut tasks = JoinSet::new();
    for i in 0..NUM_CLIENTS * 10 {
        let mut client = client.clone();
        tasks.spawn(async move {
            let id = format!("client{i}");
            for v in 1..=5 {
                push(&mut client, &id, v).await;
            }
            for expected in (1..=5).rev() {
                assert_eq!(pop(&mut client, &id).await.unwrap(), expected, "{id}");
            }
            assert!(is_empty(&mut client, &id).await);
        });
    }

    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operators_and_delay_pop() {
    let server = start_test_server().await;
    let client = connect_client(server.addr).await;

    let mut tasks = JoinSet::new();
    for i in 0..NUM_CLIENTS {
        let mut client = client.clone();
        tasks.spawn(async move {
            let id = format!("client{i}");

            for v in 1..=5 {
                push(&mut client, &id, v).await;
            }
            push_op(&mut client, &id, "min").await.unwrap();
            assert_eq!(pop(&mut client, &id).await.unwrap(), 1);

            push(&mut client, &id, 10).await;
            push_op(&mut client, &id, "max").await.unwrap();
            assert_eq!(pop(&mut client, &id).await.unwrap(), 10);

            for v in 1..=5 {
                push(&mut client, &id, v).await;
            }
            assert_eq!(delay_pop(&mut client, &id, 200).await.unwrap(), 5);
        });
    }

    let start = Instant::now();
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }
    // Delayed pops for different clients run side by side.
    assert!(start.elapsed() < Duration::from_millis(200 * NUM_CLIENTS as u64));
}
