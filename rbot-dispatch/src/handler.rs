//! Handler traits for both calling conventions and the [`Callable`] that carries one of them.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rbot_core::Result;

use crate::context::Context;

/// Cooperative handler: runs as a task on the async runtime and must not block.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: Context) -> Result<()> {
        (self)(ctx).await
    }
}

/// Blocking handler: plain synchronous code, run on the blocking pool.
///
/// Use [`Context::blocking_bot`] to call outward APIs from inside it.
pub trait BlockingHandler: Send + Sync + 'static {
    fn handle(&self, ctx: Context) -> Result<()>;
}

impl<F> BlockingHandler for F
where
    F: Fn(Context) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, ctx: Context) -> Result<()> {
        (self)(ctx)
    }
}

/// A registered handler together with its calling convention.
#[derive(Clone)]
pub enum Callable {
    Cooperative(Arc<dyn Handler>),
    Blocking(Arc<dyn BlockingHandler>),
}

impl Callable {
    pub fn cooperative(handler: impl Handler + 'static) -> Self {
        Callable::Cooperative(Arc::new(handler))
    }

    pub fn blocking(handler: impl BlockingHandler) -> Self {
        Callable::Blocking(Arc::new(handler))
    }

    pub fn may_block(&self) -> bool {
        matches!(self, Callable::Blocking(_))
    }
}
