use futures_util::future::BoxFuture;
use tracing::debug;

/// One step in a degradation chain: yields `Some(value)` on success, `None`
/// to hand over to the next stage.
pub type Stage<'a, T> = BoxFuture<'a, Option<T>>;

/// Run stages in order, first success wins; the fallback closure supplies
/// the final static value once every stage has declined.
///
/// This is the shared shape behind "try the model, fall back to a
/// heuristic, fall back to a canned string" used by the classifier and the
/// handlers.
pub async fn chain<T>(stages: Vec<Stage<'_, T>>, fallback: impl FnOnce() -> T) -> T {
    for (index, stage) in stages.into_iter().enumerate() {
        if let Some(value) = stage.await {
            if index > 0 {
                debug!("degradation chain resolved at stage {}", index + 1);
            }
            return value;
        }
    }
    fallback()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    #[tokio::test]
    async fn first_successful_stage_wins() {
        let stages: Vec<Stage<'_, i32>> = vec![
            async { None }.boxed(),
            async { Some(2) }.boxed(),
            async { Some(3) }.boxed(),
        ];
        assert_eq!(chain(stages, || 0).await, 2);
    }

    #[tokio::test]
    async fn fallback_runs_when_all_stages_decline() {
        let stages: Vec<Stage<'_, i32>> = vec![async { None }.boxed(), async { None }.boxed()];
        assert_eq!(chain(stages, || 42).await, 42);
    }

    #[tokio::test]
    async fn empty_chain_is_just_the_fallback() {
        let stages: Vec<Stage<'_, &str>> = Vec::new();
        assert_eq!(chain(stages, || "static").await, "static");
    }
}
