//! Quest Condition Gate
//!
//! Eligibility check backed by the quest's `condition` expression.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use super::definition::Quest;
use super::state::CharacterId;
use crate::error::EngineError;

pub const CONDITION_FIELD: &str = "condition";

/// Evaluates condition expressions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatementEvaluator: Send + Sync {
    async fn evaluate_condition(
        &self,
        expression: &str,
        actor: CharacterId,
        target: Option<CharacterId>,
    ) -> Result<bool, EngineError>;
}

pub struct ConditionGate {
    evaluator: Arc<dyn StatementEvaluator>,
}

impl ConditionGate {
    pub fn new(evaluator: Arc<dyn StatementEvaluator>) -> Self {
        Self { evaluator }
    }

    /// True when the quest has no condition or its condition holds; failures count as false
    pub async fn eligible(&self, character_id: CharacterId, quest: &Quest) -> bool {
        if !quest.element().is_stored() {
            error!("Cannot read condition of quest '{}': no quest record", quest.key());
            return false;
        }

        let Some(expression) = quest.condition() else {
            return true;
        };

        match self
            .evaluator
            .evaluate_condition(expression, character_id, None)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "Condition of quest '{}' failed for character {}: {}",
                    quest.key(),
                    character_id,
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::kind::QUEST;
    use crate::element::{ElementResolver, ElementTypeRegistry};
    use crate::store::MemoryWorldData;
    use crate::value::Value;

    async fn quest(key: &str) -> Quest {
        let world = Arc::new(MemoryWorldData::new());
        world.insert("quests", "open", [("name", Value::from("Open"))]);
        world.insert("quests", "blank", [(CONDITION_FIELD, Value::from("  "))]);
        world.insert(
            "quests",
            "gated",
            [(CONDITION_FIELD, Value::from("is_quest_finished('tutorial')"))],
        );
        let types = Arc::new(ElementTypeRegistry::load(world.as_ref()).await);
        let resolver = ElementResolver::new(types, world.clone(), world);
        Quest::new(resolver.resolve(QUEST, key, None).await, 1)
    }

    #[tokio::test]
    async fn test_no_condition_is_eligible() {
        let mut evaluator = MockStatementEvaluator::new();
        evaluator.expect_evaluate_condition().never();
        let gate = ConditionGate::new(Arc::new(evaluator));

        assert!(gate.eligible(1, &quest("open").await).await);
        assert!(gate.eligible(1, &quest("blank").await).await);
    }

    #[tokio::test]
    async fn test_condition_is_delegated() {
        let mut evaluator = MockStatementEvaluator::new();
        evaluator
            .expect_evaluate_condition()
            .withf(|expression, actor, target| {
                expression.starts_with("is_quest_finished") && *actor == 9 && target.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(false));
        let gate = ConditionGate::new(Arc::new(evaluator));

        assert!(!gate.eligible(9, &quest("gated").await).await);
    }

    #[tokio::test]
    async fn test_evaluator_failure_is_ineligible() {
        let mut evaluator = MockStatementEvaluator::new();
        evaluator
            .expect_evaluate_condition()
            .returning(|_, _, _| Err(EngineError::ConditionEval("syntax error".to_string())));
        let gate = ConditionGate::new(Arc::new(evaluator));

        assert!(!gate.eligible(1, &quest("gated").await).await);
    }

    #[tokio::test]
    async fn test_missing_quest_is_ineligible() {
        let mut evaluator = MockStatementEvaluator::new();
        evaluator.expect_evaluate_condition().never();
        let gate = ConditionGate::new(Arc::new(evaluator));

        assert!(!gate.eligible(1, &quest("missing").await).await);
    }
}
