//! One `BudgetScopeActor` per budget scope (`global`, `provider:<p>`,
//! `user:<u>`), a kameo actor serializing admission the way a single-writer
//! cache actor serializes mailbox access. Its mailbox serializes
//! `Reserve`/`Commit`/`Release` so two concurrent calls against the same
//! scope can never both observe "room under the limit" and both admit —
//! bounding over-admission to one in-flight call per actor, without a
//! distributed lock.

use kameo::Actor;
use kameo::message::{Context, Message};

#[derive(Actor)]
pub struct BudgetScopeActor {
    scope_key: String,
    /// Sum of estimated costs for calls that have been admitted but not yet
    /// committed or released. The database remains the source of truth for
    /// historical totals; this is purely the in-flight hold.
    reserved: f64,
}

impl BudgetScopeActor {
    pub fn new(scope_key: impl Into<String>) -> Self {
        Self {
            scope_key: scope_key.into(),
            reserved: 0.0,
        }
    }
}

/// Attempts to admit `estimate` against `limit_remaining` (the caller's
/// precomputed `limit - committed_usage`). Reserved holds from other
/// in-flight calls in this scope are already accounted for in `self.reserved`.
pub struct Reserve {
    pub estimate: f64,
    pub limit_remaining: f64,
}

pub struct Commit {
    pub estimate: f64,
}

pub struct Release {
    pub estimate: f64,
}

/// Denial detail; the caller (crate::gate::BudgetGate) knows which scope
/// type this actor represents and turns this into the matching `GateError`
/// variant (daily/provider/user-budget-exceeded).
pub struct ReservationDenied {
    pub reserved: f64,
}

impl Message<Reserve> for BudgetScopeActor {
    type Reply = Result<(), ReservationDenied>;

    async fn handle(&mut self, msg: Reserve, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if self.reserved + msg.estimate > msg.limit_remaining {
            tracing::warn!(
                scope = %self.scope_key,
                reserved = self.reserved,
                estimate = msg.estimate,
                limit_remaining = msg.limit_remaining,
                "budget-reservation-denied"
            );
            return Err(ReservationDenied { reserved: self.reserved });
        }
        self.reserved += msg.estimate;
        Ok(())
    }
}

impl Message<Commit> for BudgetScopeActor {
    type Reply = ();

    async fn handle(&mut self, msg: Commit, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.reserved = (self.reserved - msg.estimate).max(0.0);
    }
}

impl Message<Release> for BudgetScopeActor {
    type Reply = ();

    async fn handle(&mut self, msg: Release, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.reserved = (self.reserved - msg.estimate).max(0.0);
    }
}
