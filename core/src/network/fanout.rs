use std::future::Future;
use std::sync::Arc;

use lanscope_common::debug;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs `task` for every item with at most `limit` tasks in flight.
///
/// `cancel` is checked before each spawn and again once a permit is held.
/// Tasks that already started are never aborted; they run to completion
/// (or their own timeout) and their outputs still reach `on_done`.
///
/// Returns `true` when every item was started.
pub async fn bounded_fan_out<I, T, F, Fut>(
    items: I,
    limit: usize,
    cancel: &CancellationToken,
    task: F,
    mut on_done: impl FnMut(T),
) -> bool
where
    I: IntoIterator,
    F: Fn(I::Item) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set: JoinSet<T> = JoinSet::new();
    let mut started_all = true;

    for item in items {
        if cancel.is_cancelled() {
            started_all = false;
            break;
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            started_all = false;
            break;
        };
        if cancel.is_cancelled() {
            started_all = false;
            break;
        }

        let fut = task(item);
        set.spawn(async move {
            let output = fut.await;
            drop(permit);
            output
        });

        while let Some(joined) = set.try_join_next() {
            collect(joined, &mut on_done);
        }
    }

    while let Some(joined) = set.join_next().await {
        collect(joined, &mut on_done);
    }

    started_all
}

fn collect<T>(joined: Result<T, tokio::task::JoinError>, on_done: &mut impl FnMut(T)) {
    match joined {
        Ok(output) => on_done(output),
        Err(e) => debug!("probe task failed: {e}"),
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
