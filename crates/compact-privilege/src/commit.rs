//! # Batched Commit with Compensating Rollback
//!
//! The store's atomic transaction is bounded to a fixed item count, so a
//! large write is split into batches that commit one after another. There
//! is no coordinator across batches; instead every forward mutation
//! carries the mutation that undoes it, fixed before anything is written.
//!
//! ```text
//! Operation
//!   steps:   [m1/c1, m2/c2, m3/-, ...]   forward mutation / compensation
//!   finally: [f1, ...]                   run after all step compensations
//!
//! commit:   |batch 1| -> |batch 2| -> |batch 3 ✗|
//! rollback: comp(batch 2 reversed) ++ comp(batch 1 reversed) ++ finally
//!           chunked and committed in order
//! ```
//!
//! Only batches that committed are compensated; the failed batch was
//! atomic and left nothing behind. A compensation that fails to commit is
//! fatal: it is logged at `error!` with every key it did not restore and
//! surfaced as [`IssuanceError::RollbackFailed`]. It is never retried here.

use compact_core::ItemKey;
use compact_store::{Mutation, RecordStore, StoreError};

use crate::error::IssuanceError;

/// A forward mutation and the mutation that reverses it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Applied on commit.
    pub mutation: Mutation,
    /// Applied on rollback if `mutation` was committed.
    pub compensation: Option<Mutation>,
}

/// A fully planned multi-batch write.
///
/// Built without I/O, so the plan can be inspected before it runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operation {
    steps: Vec<Step>,
    final_compensations: Vec<Mutation>,
}

impl Operation {
    /// Empty operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a forward mutation with its compensation.
    pub fn push(&mut self, mutation: Mutation, compensation: Option<Mutation>) {
        self.steps.push(Step {
            mutation,
            compensation,
        });
    }

    /// Add a compensation that runs after every step compensation, whenever
    /// rollback happens.
    pub fn finally(&mut self, compensation: Mutation) {
        self.final_compensations.push(compensation);
    }

    /// Planned steps in commit order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Compensations that close every rollback.
    pub fn final_compensations(&self) -> &[Mutation] {
        &self.final_compensations
    }

    /// Forward mutations in commit order.
    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.steps.iter().map(|s| &s.mutation)
    }

    /// Number of forward mutations.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of batches at `batch_size` items each.
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.steps.len().div_ceil(batch_size.max(1))
    }

    /// The rollback plan after the first `committed_batches` batches
    /// succeeded: their compensations in reverse completion order, then the
    /// final compensations.
    pub fn rollback_plan(&self, committed_batches: usize, batch_size: usize) -> Vec<Mutation> {
        let batch_size = batch_size.max(1);
        let committed_steps = (committed_batches * batch_size).min(self.steps.len());
        self.steps[..committed_steps]
            .iter()
            .rev()
            .filter_map(|s| s.compensation.clone())
            .chain(self.final_compensations.iter().cloned())
            .collect()
    }
}

/// What a successful commit wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    /// Batches committed.
    pub batches: usize,
    /// Mutations committed.
    pub mutations: usize,
}

/// Commit `operation` in batches of at most `batch_size`, rolling back every
/// committed batch if a later one fails.
///
/// # Errors
///
/// - [`IssuanceError::TransactionFailed`] after a complete rollback.
/// - [`IssuanceError::RollbackFailed`] if a compensation did not commit.
pub fn commit_with_rollback(
    store: &dyn RecordStore,
    operation: &Operation,
    batch_size: usize,
) -> Result<CommitReport, IssuanceError> {
    let batch_size = batch_size.clamp(1, store.max_transaction_items().max(1));
    let batches: Vec<Vec<Mutation>> = operation
        .steps
        .chunks(batch_size)
        .map(|chunk| chunk.iter().map(|s| s.mutation.clone()).collect())
        .collect();
    let total = batches.len();

    for (index, batch) in batches.iter().enumerate() {
        let batch_no = index + 1;
        match store.transact_write(batch) {
            Ok(()) => {
                tracing::debug!(
                    batch_index = batch_no,
                    batches = total,
                    items = batch.len(),
                    "committed transaction batch"
                );
            }
            Err(cause) => {
                tracing::warn!(
                    batch_index = batch_no,
                    batches = total,
                    error = %cause,
                    "transaction batch failed, rolling back committed batches"
                );
                if index == 0 {
                    return Err(IssuanceError::TransactionFailed {
                        batch: batch_no,
                        batches: total,
                        source: cause,
                    });
                }
                let plan = operation.rollback_plan(index, batch_size);
                return match run_rollback(store, &plan, batch_size) {
                    Ok(()) => {
                        tracing::info!(
                            batch_index = batch_no,
                            compensations = plan.len(),
                            "rollback complete"
                        );
                        Err(IssuanceError::TransactionFailed {
                            batch: batch_no,
                            batches: total,
                            source: cause,
                        })
                    }
                    Err((source, unrestored)) => {
                        tracing::error!(
                            batch_index = batch_no,
                            error = %source,
                            unrestored = ?unrestored.iter().map(ToString::to_string).collect::<Vec<_>>(),
                            "ROLLBACK FAILED: aggregate left partially applied, manual reconciliation required"
                        );
                        Err(IssuanceError::RollbackFailed {
                            batch: batch_no,
                            cause,
                            source,
                            unrestored,
                        })
                    }
                };
            }
        }
    }

    Ok(CommitReport {
        batches: total,
        mutations: operation.len(),
    })
}

/// Commit compensations in order. On failure, returns the error and every
/// key from the failed chunk onwards.
fn run_rollback(
    store: &dyn RecordStore,
    plan: &[Mutation],
    batch_size: usize,
) -> Result<(), (StoreError, Vec<ItemKey>)> {
    for (index, chunk) in plan.chunks(batch_size).enumerate() {
        if let Err(e) = store.transact_write(chunk) {
            let unrestored = plan[index * batch_size..]
                .iter()
                .map(|m| m.key().clone())
                .collect();
            return Err((e, unrestored));
        }
    }
    Ok(())
}
