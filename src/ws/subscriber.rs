//! Typed subscriptions.
//!
//! Each helper subscribes to one event kind and runs the caller's handler for
//! every event of that kind. Handlers run concurrently in their own tasks, up
//! to `max_concurrent_handlers`: an error or a panic is logged and dispatch
//! carries on. Transaction events reach the handler already decoded.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::{SdkError, SdkResult};
use crate::query::TxQuery;
use crate::ws::client::{Subscription, WsClient};
use crate::ws::types::{
    queries, DecodedTx, EventData, EventDataNewBlock, EventDataNewBlockHeader, EventDataValidatorSetUpdates,
};

/// A running typed subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub id: String,
    pub query: String,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// True once the subscription channel has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the dispatcher and its running handlers to finish (after
    /// unsubscribe or close).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl WsClient {
    pub async fn subscribe_new_block<F, Fut>(&self, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(EventDataNewBlock) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        let sub = self.subscribe(queries::NEW_BLOCK).await?;
        Ok(dispatch(sub, self.handler_limit(), handler, |data| match data {
            EventData::NewBlock(block) => Some(Ok(block)),
            _ => None,
        }))
    }

    pub async fn subscribe_new_block_header<F, Fut>(&self, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(EventDataNewBlockHeader) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        let sub = self.subscribe(queries::NEW_BLOCK_HEADER).await?;
        Ok(dispatch(sub, self.handler_limit(), handler, |data| match data {
            EventData::NewBlockHeader(header) => Some(Ok(header)),
            _ => None,
        }))
    }

    /// Transactions matching `filter`; an empty filter receives every transaction.
    ///
    /// Events whose transaction bytes do not decode are logged and skipped.
    pub async fn subscribe_tx<F, Fut>(&self, filter: TxQuery, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(DecodedTx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        let query = if filter.is_empty() {
            queries::TX.to_string()
        } else {
            format!("{} AND {}", queries::TX, filter)
        };
        let sub = self.subscribe(&query).await?;
        Ok(dispatch(sub, self.handler_limit(), handler, |data| match data {
            EventData::Tx(tx) => Some(tx.decode_tx()),
            _ => None,
        }))
    }

    pub async fn subscribe_validator_set_updates<F, Fut>(&self, handler: F) -> SdkResult<SubscriptionHandle>
    where
        F: Fn(EventDataValidatorSetUpdates) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        let sub = self.subscribe(queries::VALIDATOR_SET_UPDATES).await?;
        Ok(dispatch(sub, self.handler_limit(), handler, |data| match data {
            EventData::ValidatorSetUpdates(updates) => Some(Ok(updates)),
            _ => None,
        }))
    }

    fn handler_limit(&self) -> usize {
        self.config().max_concurrent_handlers.max(1)
    }
}

/// `select` maps an event to the handler's input: `None` for another kind,
/// `Some(Err)` when the payload does not decode.
fn dispatch<T, F, Fut>(
    mut sub: Subscription,
    limit: usize,
    handler: F,
    select: fn(EventData) -> Option<SdkResult<T>>,
) -> SubscriptionHandle
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = SdkResult<()>> + Send + 'static,
{
    let id = sub.id.clone();
    let query = sub.query.clone();
    let task_query = query.clone();
    let permits = Arc::new(Semaphore::new(limit));

    let task = tokio::spawn(async move {
        while let Some(event) = sub.next().await {
            let kind = event.data.kind();
            let data = match select(event.data) {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    tracing::warn!(query = %task_query, kind = kind, error = %e, "Dropping undecodable event");
                    continue;
                }
                None => {
                    tracing::warn!(query = %task_query, kind = kind, "Unexpected event kind on typed subscription");
                    continue;
                }
            };

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let running = handler(data);
            let handler_query = task_query.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match AssertUnwindSafe(running).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log_handler_error(&handler_query, &e),
                    Err(_) => tracing::error!(query = %handler_query, "Event handler panicked"),
                }
            });
        }

        // Wait for handlers still running.
        let _ = permits.acquire_many(limit as u32).await;
        tracing::debug!(query = %task_query, "Typed subscription ended");
    });

    SubscriptionHandle { id, query, task }
}

fn log_handler_error(query: &str, error: &SdkError) {
    tracing::warn!(
        query = %query,
        codespace = %error.codespace(),
        code = error.code(),
        error = %error,
        "Event handler failed"
    );
}
