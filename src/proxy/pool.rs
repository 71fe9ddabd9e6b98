//! Bounded fan-out/fan-in over spawned tokio tasks

use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::error;

/// Run `task` for every item with at most `workers` tasks in flight.
///
/// Each unit of work is spawned on the runtime, so work runs in parallel
/// across worker threads. Results come back in completion order. A task that
/// panics is logged and left out of the results.
pub async fn fan_out<I, F, Fut>(items: I, workers: usize, mut task: F) -> Vec<Fut::Output>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    stream::iter(items)
        .map(|item| tokio::spawn(task(item)))
        .buffer_unordered(workers.max(1))
        .filter_map(|joined| async move {
            match joined {
                Ok(output) => Some(output),
                Err(err) => {
                    error!(error = %err, "worker task aborted");
                    None
                }
            }
        })
        .collect()
        .await
}
