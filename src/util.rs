//! Small async helpers shared by discovery and identification.

use std::future::Future;

use tokio::task::JoinSet;

/// Run a set of tasks concurrently and pick a winner.
///
/// The first task to yield a value satisfying `predicate` wins and the
/// remaining tasks are aborted. When every task completes without a
/// satisfying value, the last plain `Some` seen is returned as a fallback.
/// Tasks that yield `None`, panic or get cancelled are ignored.
///
/// Stragglers are drained after the abort, so no spawned task outlives the
/// call.
pub(crate) async fn race_first<T, F, P>(tasks: Vec<F>, predicate: P) -> Option<T>
where
    T: Send + 'static,
    F: Future<Output = Option<T>> + Send + 'static,
    P: Fn(&T) -> bool,
{
    let mut set = JoinSet::new();
    for task in tasks {
        set.spawn(task);
    }

    let mut winner = None;
    let mut fallback = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(Some(value)) if predicate(&value) => {
                winner = Some(value);
                break;
            }
            Ok(Some(value)) => fallback = Some(value),
            Ok(None) | Err(_) => {}
        }
    }

    set.abort_all();
    while set.join_next().await.is_some() {}

    winner.or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn first_satisfying_value_wins() {
        let tasks: Vec<futures::future::BoxFuture<'static, Option<i32>>> = vec![
            Box::pin(async {
                sleep(Duration::from_millis(50)).await;
                Some(1)
            }),
            Box::pin(async {
                sleep(Duration::from_millis(10)).await;
                Some(2)
            }),
            Box::pin(async {
                sleep(Duration::from_millis(30)).await;
                Some(3)
            }),
        ];

        let result = race_first(tasks, |v| *v == 3).await;
        assert_eq!(result, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_last_plain_value() {
        let tasks: Vec<futures::future::BoxFuture<'static, Option<i32>>> = vec![
            Box::pin(async {
                sleep(Duration::from_millis(5)).await;
                Some(1)
            }),
            Box::pin(async { None }),
            Box::pin(async {
                sleep(Duration::from_millis(20)).await;
                Some(2)
            }),
        ];

        let result = race_first(tasks, |v| *v == 99).await;
        assert_eq!(result, Some(2));
    }

    #[tokio::test]
    async fn empty_task_set_yields_none() {
        let tasks: Vec<futures::future::BoxFuture<'static, Option<i32>>> = vec![];
        assert_eq!(race_first(tasks, |_| true).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn losers_are_aborted_once_a_winner_lands() {
        let slow_finished = Arc::new(AtomicBool::new(false));
        let flag = slow_finished.clone();

        let tasks: Vec<futures::future::BoxFuture<'static, Option<i32>>> = vec![
            Box::pin(async move {
                sleep(Duration::from_secs(3600)).await;
                flag.store(true, Ordering::SeqCst);
                Some(1)
            }),
            Box::pin(async {
                sleep(Duration::from_millis(1)).await;
                Some(2)
            }),
        ];

        let result = race_first(tasks, |v| *v == 2).await;
        assert_eq!(result, Some(2));
        assert!(!slow_finished.load(Ordering::SeqCst));
    }
}
