//! stackcalc gRPC Server
//!
//! A gRPC service that exposes a [`StackRegistry`](stackcalc::StackRegistry)
//! as five unary calls. Each call names the client whose stack it acts on;
//! the server owns one registry for its whole lifetime.
//!
//! # Error Mapping
//!
//! | Registry error    | gRPC status           |
//! |-------------------|-----------------------|
//! | `EmptyStack`      | `FAILED_PRECONDITION` |
//! | `InvalidOperator` | `INVALID_ARGUMENT`    |
//! | `Overflow`        | `OUT_OF_RANGE`        |
//! | `Cancelled`       | `CANCELLED`           |
//!
//! # Example Flow
//!
//! ```text
//! Client                                        Server
//! │                                               │
//! │  PushValue{client_id: "x", value: 10}         │
//! │ ─────────────────────────────────────────────>│
//! │  PushValue{client_id: "x", value: 20}         │
//! │ ─────────────────────────────────────────────>│
//! │  PushOperation{client_id: "x", operator: max} │
//! │ ─────────────────────────────────────────────>│
//! │  Pop{client_id: "x"}                          │
//! │ ─────────────────────────────────────────────>│
//! │                         ValueResponse{20}     │
//! │<───────────────────────────────────────────── │
//! ```

pub mod proto {
    #![allow(missing_docs)]
    #![allow(clippy::doc_markdown)]
    tonic::include_proto!("stackcalc.v1");
}

mod server;

pub use server::{CalculatorServer, CalculatorService, status_from};

// Re-export proto types for convenience
pub use proto::{
    calculator_client::CalculatorClient,
    calculator_server::CalculatorServer as CalculatorGrpcServer,
};
