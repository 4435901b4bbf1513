//! Fault-injecting ledger wrapper.
//!
//! Wraps another ledger and fails operations with [`LedgerError::Io`], either
//! at a configured rate (seeded, so runs reproduce) or on demand via
//! [`ChaoticLedger::inject`]. Submissions can be lost before they reach the
//! inner ledger or after it applied them; the second case is what makes a
//! rotation outcome indeterminate.

#![allow(clippy::expect_used, reason = "poisoned chaos mutex means a test already panicked")]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use rekey_core::{Identity, Link, LinkId, TeamId, TeamSnapshot, UserId};

use crate::{GenerationBox, Ledger, LedgerError, SubmitOutcome};

/// Fault applied to one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Submission is dropped before reaching the ledger. Nothing is written.
    LostRequest,
    /// Ledger applies the submission but the reply is lost.
    LostAck,
}

/// Ledger wrapper that injects I/O failures.
#[derive(Clone)]
pub struct ChaoticLedger<L: Ledger> {
    inner: L,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    /// Faults consumed by the next submissions, ahead of random ones
    scripted: Arc<Mutex<VecDeque<Fault>>>,
    operation_count: Arc<AtomicUsize>,
    lost_acks: Arc<AtomicUsize>,
}

/// Deterministic LCG so chaos runs reproduce from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<L: Ledger> ChaoticLedger<L> {
    /// Wrap `inner`, failing operations at `failure_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0].
    pub fn new(inner: L, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Wrap `inner` with an explicit seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0].
    pub fn with_seed(inner: L, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            operation_count: Arc::new(AtomicUsize::new(0)),
            lost_acks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Apply `fault` to the next submission regardless of the failure rate.
    pub fn inject(&self, fault: Fault) {
        self.scripted.lock().expect("scripted faults mutex poisoned").push_back(fault);
    }

    /// Underlying ledger, for checking invariants after chaos.
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Total operations attempted through this wrapper.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Submissions that were applied but reported as failed.
    pub fn lost_ack_count(&self) -> usize {
        self.lost_acks.load(Ordering::Relaxed)
    }

    fn roll(&self) -> f64 {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
        self.rng.lock().expect("ChaoticRng mutex poisoned").next()
    }

    fn check(&self, operation: &'static str) -> Result<(), LedgerError> {
        if self.roll() < self.failure_rate {
            tracing::debug!(operation, "injected ledger failure");
            return Err(LedgerError::Io(format!("chaotic failure injection: {operation}")));
        }
        Ok(())
    }

    fn submit_fault(&self) -> Option<Fault> {
        let scripted = self.scripted.lock().expect("scripted faults mutex poisoned").pop_front();
        if let Some(fault) = scripted {
            self.operation_count.fetch_add(1, Ordering::Relaxed);
            return Some(fault);
        }

        let roll = self.roll();
        if roll >= self.failure_rate {
            return None;
        }
        // Split the failure band evenly between the two fault kinds.
        if roll < self.failure_rate / 2.0 { Some(Fault::LostRequest) } else { Some(Fault::LostAck) }
    }
}

impl<L: Ledger> Ledger for ChaoticLedger<L> {
    async fn register_user(&self, user_id: UserId, identity: Identity) -> Result<(), LedgerError> {
        self.check("register_user")?;
        self.inner.register_user(user_id, identity).await
    }

    async fn identity(&self, user_id: UserId) -> Result<Option<Identity>, LedgerError> {
        self.check("identity")?;
        self.inner.identity(user_id).await
    }

    async fn create_team(&self, genesis: Link) -> Result<LinkId, LedgerError> {
        self.check("create_team")?;
        self.inner.create_team(genesis).await
    }

    async fn reload(&self, team_id: TeamId) -> Result<TeamSnapshot, LedgerError> {
        self.check("reload")?;
        self.inner.reload(team_id).await
    }

    async fn submit_link(&self, link: Link) -> Result<SubmitOutcome, LedgerError> {
        match self.submit_fault() {
            None => self.inner.submit_link(link).await,
            Some(Fault::LostRequest) => {
                tracing::debug!(team_id = %link.team_id, seqno = link.seqno, "submission lost");
                Err(LedgerError::Io("chaotic failure injection: request lost".to_string()))
            },
            Some(Fault::LostAck) => {
                let team_id = link.team_id;
                let outcome = self.inner.submit_link(link).await?;
                self.lost_acks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(team_id = %team_id, ?outcome, "acknowledgement lost");
                Err(LedgerError::Io("chaotic failure injection: ack lost".to_string()))
            },
        }
    }

    async fn seed_boxes(
        &self,
        team_id: TeamId,
        recipient: UserId,
        after_generation: u64,
    ) -> Result<Vec<GenerationBox>, LedgerError> {
        self.check("seed_boxes")?;
        self.inner.seed_boxes(team_id, recipient, after_generation).await
    }

    async fn links(
        &self,
        team_id: TeamId,
        from_seqno: u64,
        limit: usize,
    ) -> Result<Vec<Link>, LedgerError> {
        self.check("links")?;
        self.inner.links(team_id, from_seqno, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryLedger;

    fn identity() -> Identity {
        Identity { eldest_seqno: 1, box_key: [1u8; 32] }
    }

    #[tokio::test]
    async fn zero_rate_never_fails() {
        let ledger = ChaoticLedger::new(MemoryLedger::new(), 0.0);
        for user in 0..100 {
            ledger.register_user(UserId(user), identity()).await.unwrap();
        }
        assert_eq!(ledger.operation_count(), 100);
    }

    #[tokio::test]
    async fn full_rate_always_fails() {
        let ledger = ChaoticLedger::new(MemoryLedger::new(), 1.0);
        for user in 0..20 {
            let err = ledger.register_user(UserId(user), identity()).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert_eq!(ledger.inner().identity(UserId(0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn same_seed_same_failures() {
        async fn pattern(seed: u64) -> Vec<bool> {
            let ledger = ChaoticLedger::with_seed(MemoryLedger::new(), 0.3, seed);
            let mut out = Vec::new();
            for user in 0..50 {
                out.push(ledger.identity(UserId(user)).await.is_err());
            }
            out
        }

        assert_eq!(pattern(7).await, pattern(7).await);
    }

    #[test]
    #[should_panic(expected = "failure_rate must be between")]
    fn rate_out_of_range_panics() {
        let _ = ChaoticLedger::new(MemoryLedger::new(), 1.5);
    }
}
