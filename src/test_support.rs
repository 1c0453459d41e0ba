//! Shared fixtures for quest tests

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::GameSettings;
use crate::element::{ElementResolver, ElementTypeRegistry};
use crate::quest::condition::MockStatementEvaluator;
use crate::quest::definition::{DEPENDENCIES_TABLE, OBJECTIVES_TABLE};
use crate::quest::handler::{MockTurnInHook, TurnInHook};
use crate::quest::{
    ChannelNotifier, MemoryQuestStore, Notification, Notifier, QuestHandler, QuestServices,
    QuestStorage,
};
use crate::store::MemoryWorldData;
use crate::value::Value;

pub const TUTORIAL: &str = "tutorial";
pub const KILL_RATS: &str = "kill_10_rats";
pub const WELCOME: &str = "welcome";

/// Tutorial (talk to the elder), a 10-rat quest gated on the tutorial, and a one-rat quest
pub fn quest_world() -> Arc<MemoryWorldData> {
    let world = Arc::new(MemoryWorldData::new());

    world.insert("quests", TUTORIAL, [("name", Value::from("Tutorial"))]);
    world.insert(
        "quests",
        KILL_RATS,
        [
            ("name", Value::from("Kill 10 Rats")),
            ("desc", Value::from("The cellar is infested.")),
        ],
    );
    world.insert("quests", WELCOME, [("name", Value::from("Welcome"))]);

    let objective = |quest: &str, kind: &str, target: &str, count: i64| {
        [
            ("quest", Value::from(quest)),
            ("type", Value::from(kind)),
            ("target", Value::from(target)),
            ("count", Value::Int(count)),
        ]
    };
    world.insert(OBJECTIVES_TABLE, "tutorial_1", objective(TUTORIAL, "talk", "elder", 1));
    world.insert(OBJECTIVES_TABLE, "kill_10_rats_1", objective(KILL_RATS, "kill", "rat", 10));
    world.insert(OBJECTIVES_TABLE, "welcome_1", objective(WELCOME, "kill", "rat", 1));

    world.insert(
        DEPENDENCIES_TABLE,
        "kill_10_rats_after_tutorial",
        [
            ("quest", Value::from(KILL_RATS)),
            ("dependency", Value::from(TUTORIAL)),
            ("type", Value::from("FINISHED")),
        ],
    );

    world
}

#[derive(Default)]
pub struct HarnessOptions {
    pub settings: Option<GameSettings>,
    pub turn_in: Option<Arc<dyn TurnInHook>>,
    pub statements: Option<MockStatementEvaluator>,
}

/// A quest handler for character 1 over in-memory stores
pub struct Harness {
    pub world: Arc<MemoryWorldData>,
    pub storage: Arc<MemoryQuestStore>,
    pub services: Arc<QuestServices>,
    pub handler: QuestHandler,
    pub rx: UnboundedReceiver<Notification>,
}

pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let world = quest_world();
    let storage = Arc::new(MemoryQuestStore::new());
    let notifier = Arc::new(ChannelNotifier::new());
    let rx = notifier.register(1);

    let services = build_services(world.clone(), storage.clone(), notifier, options).await;
    let handler = QuestHandler::new(1, Arc::clone(&services));

    Harness {
        world,
        storage,
        services,
        handler,
        rx,
    }
}

pub async fn services_with(storage: Arc<dyn QuestStorage>, options: HarnessOptions) -> Arc<QuestServices> {
    build_services(quest_world(), storage, Arc::new(ChannelNotifier::new()), options).await
}

async fn build_services(
    world: Arc<MemoryWorldData>,
    storage: Arc<dyn QuestStorage>,
    notifier: Arc<dyn Notifier>,
    options: HarnessOptions,
) -> Arc<QuestServices> {
    let types = Arc::new(ElementTypeRegistry::load(world.as_ref()).await);
    let resolver = Arc::new(ElementResolver::new(types, world.clone(), world));

    let statements = options.statements.unwrap_or_else(|| {
        let mut evaluator = MockStatementEvaluator::new();
        evaluator
            .expect_evaluate_condition()
            .returning(|_, _, _| Ok(true));
        evaluator
    });
    let turn_in = options.turn_in.unwrap_or_else(|| {
        let mut hook = MockTurnInHook::new();
        hook.expect_on_turn_in().returning(|_, _| Ok(()));
        Arc::new(hook) as Arc<dyn TurnInHook>
    });

    Arc::new(QuestServices::new(
        resolver,
        storage,
        Arc::new(statements),
        notifier,
        turn_in,
        options.settings.unwrap_or_default(),
    ))
}

pub fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut sent = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        sent.push(notification);
    }
    sent
}

/// Text of every `Message` notification
pub fn messages(sent: &[Notification]) -> Vec<String> {
    sent.iter()
        .filter_map(|n| match n {
            Notification::Message { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
