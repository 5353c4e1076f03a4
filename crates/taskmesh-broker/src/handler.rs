use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use taskmesh_core::{Message, TaskmeshResult};

/// A mailbox attached to the broker under an agent id.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivered message. An `Err` marks the delivery as failed.
    async fn handle(&self, message: Message) -> TaskmeshResult<()>;
}

/// Adapts an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Message) -> Fut + Send + Sync,
    Fut: Future<Output = TaskmeshResult<()>> + Send,
{
    async fn handle(&self, message: Message) -> TaskmeshResult<()> {
        (self.0)(message).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskmeshResult<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
