//! Per-client stack registry

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::CalcError;
use crate::operator::Operator;

type Stack = Arc<Mutex<Vec<i32>>>;

/// In-memory collection of independent integer stacks keyed by client id.
///
/// The key table is a [`DashMap`], so looking up or creating a stack only
/// touches one shard. Each stack then has its own mutex, and the shard guard
/// is released before that mutex is taken. Two clients never contend with
/// each other; two calls for the same client are serialized.
///
/// Stacks are created on the first push for a key and live as long as the
/// registry. Read-only and failing calls never create a stack.
#[derive(Debug, Default)]
pub struct StackRegistry {
    stacks: DashMap<String, Stack>,
}

impl StackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `value` onto the client's stack, creating the stack if needed.
    pub fn push_value(&self, client: &str, value: i32) {
        let stack = self.stack_or_create(client);
        let depth = {
            let mut stack = stack.lock();
            stack.push(value);
            stack.len()
        };
        tracing::debug!(client, value, depth, "pushed value");
    }

    /// Parse `operator` and collapse the client's stack with it.
    ///
    /// The operator is validated before the stack is looked at, so an
    /// unknown operator fails with [`CalcError::InvalidOperator`] even when
    /// the stack is empty, and never touches stored values.
    pub fn push_operation(&self, client: &str, operator: &str) -> Result<i32, CalcError> {
        let operator = operator.parse::<Operator>().inspect_err(|_| {
            tracing::debug!(client, operator, "rejected operator");
        })?;
        self.apply(client, operator)
    }

    /// Replace the client's whole stack with `operator` folded over it.
    ///
    /// Afterwards the stack holds exactly one element, which is also
    /// returned. The result is computed before anything is removed, so on
    /// error the stack is unchanged.
    pub fn apply(&self, client: &str, operator: Operator) -> Result<i32, CalcError> {
        let stack = self.stack(client).ok_or_else(|| CalcError::empty(client))?;
        let mut stack = stack.lock();

        let result = operator
            .reduce(&stack)?
            .ok_or_else(|| CalcError::empty(client))?;
        let drained = stack.len();
        stack.clear();
        stack.push(result);
        drop(stack);

        tracing::debug!(client, %operator, drained, result, "applied operator");
        Ok(result)
    }

    /// Remove and return the top of the client's stack.
    pub fn pop(&self, client: &str) -> Result<i32, CalcError> {
        let stack = self.stack(client).ok_or_else(|| CalcError::empty(client))?;
        let value = stack.lock().pop().ok_or_else(|| CalcError::empty(client))?;
        tracing::debug!(client, value, "popped value");
        Ok(value)
    }

    /// Whether the client's stack is absent or has no elements.
    pub fn is_empty(&self, client: &str) -> bool {
        self.len(client) == 0
    }

    /// Number of values on the client's stack (0 when absent).
    pub fn len(&self, client: &str) -> usize {
        self.stack(client).map_or(0, |stack| stack.lock().len())
    }

    /// Number of clients that have a stack.
    pub fn client_count(&self) -> usize {
        self.stacks.len()
    }

    /// Wait for `delay`, then [`pop`](Self::pop).
    ///
    /// No lock is held while waiting: the stack is read when the wait ends,
    /// so values pushed or removed by other calls in the meantime are
    /// visible to the final pop. If `cancel` fires first this returns
    /// [`CalcError::Cancelled`] and nothing is popped. Dropping the future
    /// also abandons the pop.
    pub async fn delay_pop(
        &self,
        client: &str,
        delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<i32, CalcError> {
        tracing::debug!(client, ?delay, "delaying pop");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::warn!(client, "delayed pop cancelled");
                return Err(CalcError::Cancelled);
            }
            () = tokio::time::sleep(delay) => {}
        }

        self.pop(client)
    }

    fn stack(&self, client: &str) -> Option<Stack> {
        self.stacks.get(client).map(|entry| Arc::clone(entry.value()))
    }

    fn stack_or_create(&self, client: &str) -> Stack {
        if let Some(stack) = self.stack(client) {
            return stack;
        }
        // `entry` holds the shard write lock, so concurrent first pushes
        // agree on a single stack.
        Arc::clone(self.stacks.entry(client.to_owned()).or_default().value())
    }
}
