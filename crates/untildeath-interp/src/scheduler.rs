//! Scheduler-level primitives: spawning concurrent tasks on the
//! single-threaded `tokio` runtime and tracking the current branch name for
//! the external step-hook observer.

use std::cell::RefCell;
use std::future::Future;
use tokio::task::JoinHandle;

tokio::task_local! {
    static CURRENT_BRANCH: RefCell<String>;
}

pub const MAIN_BRANCH: &str = "MAIN";

/// Current branch name, defaulting to `MAIN` outside any branch-scoped task.
pub fn current_branch() -> String {
    CURRENT_BRANCH
        .try_with(|b| b.borrow().clone())
        .unwrap_or_else(|_| MAIN_BRANCH.to_string())
}

/// Runs `fut` with `branch` installed as the current branch for the
/// duration, inherited by any task it spawns.
pub async fn with_branch<F: Future>(branch: String, fut: F) -> F::Output {
    CURRENT_BRANCH.scope(RefCell::new(branch), fut).await
}

/// Spawns `task` concurrently with the caller on the local task set and
/// returns its handle; used for branch bodies and `EXECUTE` re-dispatch.
pub fn spawn_local<F>(task: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
{
    tokio::task::spawn_local(task)
}

/// Releases the scheduler for exactly one turn.
pub async fn yield_now() {
    tokio::task::yield_now().await;
}

/// Suspends for a wall-clock duration, observing task cancellation.
pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}
