//! Quest Dependency Evaluation
//!
//! A quest's dependencies are AND-combined status predicates over other
//! quests of the same character.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use super::definition::{Dependency, Quest};
use super::handler::QuestHandler;
use super::status::QuestStatusSet;

pub struct DependencyEvaluator {
    statuses: Arc<QuestStatusSet>,
}

impl DependencyEvaluator {
    pub fn new(statuses: Arc<QuestStatusSet>) -> Self {
        Self { statuses }
    }

    pub fn statuses(&self) -> &QuestStatusSet {
        &self.statuses
    }

    /// Whether every dependency of the quest holds for the handler's character
    pub async fn matches(&self, quests: &QuestHandler, quest: &Quest) -> bool {
        self.matches_all(quests, quest.dependencies()).await
    }

    /// Evaluate every dependency concurrently; all of them run before the results are combined
    pub async fn matches_all(&self, quests: &QuestHandler, dependencies: &[Dependency]) -> bool {
        if dependencies.is_empty() {
            return true;
        }

        let checks = dependencies.iter().map(|dependency| async move {
            match self.statuses.get(&dependency.kind) {
                Some(check) => check.matches(quests, &dependency.quest).await,
                None => {
                    warn!(
                        "Unknown dependency type '{}' on quest '{}'",
                        dependency.kind, dependency.quest
                    );
                    false
                }
            }
        });
        let results = join_all(checks).await;

        let matched = results.iter().all(|ok| *ok);
        debug!(
            "Dependencies for character {}: {:?} -> {}",
            quests.character_id(),
            results,
            matched
        );
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::status::QuestStatusCheck;
    use crate::test_support::harness;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counted {
        result: bool,
        delay_ms: u64,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QuestStatusCheck for Counted {
        async fn matches(&self, _quests: &QuestHandler, _quest_key: &str) -> bool {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
        }
    }

    fn dependency(kind: &str, quest: &str) -> Dependency {
        Dependency {
            kind: kind.to_string(),
            quest: quest.to_string(),
        }
    }

    fn evaluator(calls: &Arc<AtomicUsize>) -> DependencyEvaluator {
        let mut statuses = QuestStatusSet::empty();
        statuses.register(
            "FAST_NO",
            Arc::new(Counted { result: false, delay_ms: 1, calls: Arc::clone(calls) }),
        );
        statuses.register(
            "SLOW_YES",
            Arc::new(Counted { result: true, delay_ms: 30, calls: Arc::clone(calls) }),
        );
        DependencyEvaluator::new(Arc::new(statuses))
    }

    #[tokio::test]
    async fn test_empty_dependencies_match() {
        let harness = harness().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = evaluator(&calls);

        assert!(evaluator.matches_all(&harness.handler, &[]).await);
        let tutorial = harness.handler.get_quest("tutorial").await;
        assert!(evaluator.matches(&harness.handler, &tutorial).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dependencies_come_from_the_quest() {
        let harness = harness().await;
        let evaluator = DependencyEvaluator::new(Arc::new(QuestStatusSet::default()));

        let rats = harness.handler.get_quest("kill_10_rats").await;
        assert_eq!(
            rats.dependencies(),
            &[dependency("FINISHED", "tutorial")]
        );
        assert!(!evaluator.matches(&harness.handler, &rats).await);
    }

    #[tokio::test]
    async fn test_and_without_short_circuit() {
        let harness = harness().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = evaluator(&calls);

        let deps = vec![
            dependency("FAST_NO", "a"),
            dependency("SLOW_YES", "b"),
            dependency("SLOW_YES", "c"),
        ];
        assert!(!evaluator.matches_all(&harness.handler, &deps).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let reversed: Vec<_> = deps.into_iter().rev().collect();
        assert!(!evaluator.matches_all(&harness.handler, &reversed).await);

        let all_yes = vec![dependency("SLOW_YES", "b"), dependency("slow_yes", "c")];
        assert!(evaluator.matches_all(&harness.handler, &all_yes).await);
    }

    #[tokio::test]
    async fn test_predicates_run_concurrently() {
        let harness = harness().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = evaluator(&calls);

        let deps: Vec<_> = (0..5).map(|i| dependency("SLOW_YES", &format!("q{}", i))).collect();
        let started = tokio::time::Instant::now();
        assert!(evaluator.matches_all(&harness.handler, &deps).await);
        assert!(started.elapsed() < Duration::from_millis(140));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_no_match() {
        let harness = harness().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = evaluator(&calls);

        let deps = vec![dependency("SLOW_YES", "b"), dependency("HALF_DONE", "c")];
        assert!(!evaluator.matches_all(&harness.handler, &deps).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
