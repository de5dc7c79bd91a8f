//! stackcalc CLI - client for the stackcalc gRPC server
//!
//! Usage:
//!   stackcalc push 10            Push a value onto this client's stack
//!   stackcalc op max             Collapse the stack with min/max/gcd/lcm
//!   stackcalc pop                Pop the top value
//!   stackcalc is-empty           Check whether the stack is empty
//!   stackcalc delay-pop 2000     Pop after waiting 2000ms
//!   stackcalc demo               Run the max / delay-pop / gcd / lcm walkthrough

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tonic::transport::Channel;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stackcalc::Operator;
use stackcalc_grpc::CalculatorClient;
use stackcalc_grpc::proto::{
    DelayPopRequest, IsEmptyRequest, PopRequest, PushOperationRequest, PushValueRequest,
};

/// Client id used when neither `--client` nor `STACKCALC_CLIENT` is given.
///
/// Fixed so that consecutive invocations share one stack.
const DEFAULT_CLIENT: &str = "default";

/// stackcalc - talk to a per-client stack calculator
#[derive(Parser, Debug)]
#[command(name = "stackcalc")]
#[command(about = "Client for the stackcalc gRPC server")]
struct Args {
    /// Server endpoint
    #[arg(
        long,
        global = true,
        env = "STACKCALC_SERVER",
        default_value = "http://[::1]:50051"
    )]
    addr: String,

    /// Client id whose stack to use
    #[arg(
        long,
        global = true,
        env = "STACKCALC_CLIENT",
        default_value = DEFAULT_CLIENT
    )]
    client: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push a value
    Push {
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Replace the stack with min, max, gcd or lcm of its values
    Op { operator: String },
    /// Pop the top value
    Pop,
    /// Check whether the stack is empty
    IsEmpty,
    /// Pop after a delay in milliseconds
    DelayPop {
        #[arg(allow_negative_numbers = true)]
        millis: i32,
    },
    /// Run the max / delay-pop / gcd / lcm walkthrough
    Demo,
}

/// Result of one command.
#[derive(Debug, Serialize)]
struct Report<'a> {
    client: &'a str,
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    empty: Option<bool>,
}

impl Report<'_> {
    fn print(&self, json: bool) -> anyhow::Result<()> {
        if json {
            println!("{}", serde_json::to_string(self)?);
        } else if let Some(value) = self.value {
            println!("{value}");
        } else if let Some(empty) = self.empty {
            println!("{empty}");
        }
        Ok(())
    }
}

/// Thin wrapper binding a gRPC client to one client id.
struct Session {
    inner: CalculatorClient<Channel>,
    client_id: String,
}

impl Session {
    async fn push(&mut self, value: i32) -> anyhow::Result<()> {
        self.inner
            .push_value(PushValueRequest {
                client_id: self.client_id.clone(),
                value,
            })
            .await
            .with_context(|| format!("push {value}"))?;
        Ok(())
    }

    async fn op(&mut self, operator: &str) -> anyhow::Result<()> {
        self.inner
            .push_operation(PushOperationRequest {
                client_id: self.client_id.clone(),
                operator: operator.to_string(),
            })
            .await
            .with_context(|| format!("operator {operator}"))?;
        Ok(())
    }

    async fn pop(&mut self) -> anyhow::Result<i32> {
        let resp = self
            .inner
            .pop(PopRequest {
                client_id: self.client_id.clone(),
            })
            .await
            .context("pop")?;
        Ok(resp.into_inner().value)
    }

    async fn is_empty(&mut self) -> anyhow::Result<bool> {
        let resp = self
            .inner
            .is_empty(IsEmptyRequest {
                client_id: self.client_id.clone(),
            })
            .await
            .context("is-empty")?;
        Ok(resp.into_inner().empty)
    }

    async fn delay_pop(&mut self, millis: i32) -> anyhow::Result<i32> {
        let resp = self
            .inner
            .delay_pop(DelayPopRequest {
                client_id: self.client_id.clone(),
                millis,
            })
            .await
            .with_context(|| format!("delay-pop {millis}ms"))?;
        Ok(resp.into_inner().value)
    }

    async fn reduce_and_pop(&mut self, values: &[i32], operator: Operator) -> anyhow::Result<i32> {
        for &v in values {
            self.push(v).await?;
        }
        self.op(operator.as_str()).await?;
        self.pop().await
    }

    fn step(
        &self,
        json: bool,
        command: &'static str,
        label: &str,
        value: i32,
    ) -> anyhow::Result<()> {
        if json {
            Report {
                client: &self.client_id,
                command,
                value: Some(value),
                empty: None,
            }
            .print(true)
        } else {
            println!("{label}: {value}");
            Ok(())
        }
    }
}

/// Run the walkthrough, printing one line (or one JSON report) per step.
///
/// Refuses to start on a non-empty stack, since leftover values would
/// change every result.
async fn demo(session: &mut Session, json: bool) -> anyhow::Result<()> {
    if !session.is_empty().await? {
        anyhow::bail!(
            "stack for client {} is not empty; pop it or pass another --client",
            session.client_id
        );
    }

    let max = session.reduce_and_pop(&[10, 20], Operator::Max).await?;
    session.step(json, "max", "Max", max)?;

    session.push(30).await?;
    let delayed = session.delay_pop(2000).await?;
    session.step(json, "delay-pop", "Delayed pop", delayed)?;

    let gcd = session.reduce_and_pop(&[5, 15], Operator::Gcd).await?;
    session.step(json, "gcd", "GCD", gcd)?;

    let lcm = session.reduce_and_pop(&[14, 21], Operator::Lcm).await?;
    session.step(json, "lcm", "LCM", lcm)?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't mix with results on stdout
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let args = Args::parse();

    tracing::debug!("Connecting to {} as {}", args.addr, args.client);
    let inner = CalculatorClient::connect(args.addr.clone())
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;
    let mut session = Session {
        inner,
        client_id: args.client.clone(),
    };

    let (command, value, empty) = match args.command {
        Command::Push { value } => {
            session.push(value).await?;
            ("push", None, None)
        }
        Command::Op { operator } => {
            session.op(&operator).await?;
            ("op", None, None)
        }
        Command::Pop => ("pop", Some(session.pop().await?), None),
        Command::IsEmpty => ("is-empty", None, Some(session.is_empty().await?)),
        Command::DelayPop { millis } => {
            ("delay-pop", Some(session.delay_pop(millis).await?), None)
        }
        Command::Demo => return demo(&mut session, args.json).await,
    };

    Report {
        client: &args.client,
        command,
        value,
        empty,
    }
    .print(args.json)
}
