//! Ordered middleware chain
//!
//! Each middleware gets the message and a [`Next`] continuation. Calling
//! [`Next::run`] hands control to the following middleware, or to the
//! command router once the chain is exhausted. Returning without calling it
//! short-circuits: no later middleware runs and nothing is dispatched.
//! Returning an error aborts processing of that message only.

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::MessageContext;
use crate::Result;

/// Interceptor run before command dispatch
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process `ctx`, calling `next.run(ctx)` to continue the chain
    async fn handle(&self, ctx: &mut MessageContext, next: Next<'_>) -> Result<()>;
}

/// Terminal step of the chain
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn dispatch(&self, ctx: &mut MessageContext) -> Result<()>;
}

/// Continuation over the remaining middleware
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    #[must_use]
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Middleware still to run after this point
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Run the rest of the chain
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a later middleware or the endpoint
    pub async fn run(self, ctx: &mut MessageContext) -> Result<()> {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next::new(rest, self.endpoint)).await,
            None => self.endpoint.dispatch(ctx).await,
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Run `chain` in order over `ctx`, ending at `endpoint`
///
/// # Errors
///
/// Returns the error of the middleware or endpoint that failed
pub async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    endpoint: &dyn Endpoint,
    ctx: &mut MessageContext,
) -> Result<()> {
    Next::new(chain, endpoint).run(ctx).await
}
