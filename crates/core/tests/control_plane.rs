use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tributary_control::{ControlBus, ControlHandler};
use tributary_control_memory::MemoryControlBus;
use tributary_core::{
    ActionKind, ColumnNameTypeValue, Command, ControlPlane, ControlPlaneOptions, Operation, Reply,
    ReplyCode, SinkFactory, StatusDeserializeError, StatusSerializeError, StreamStatus,
};
use tributary_locks_memory::MemoryLockManager;
use tributary_query_engine::{Column, ColumnType, Event, QueryEngine, StreamDefinition, Value};
use tributary_query_engine_mock::MockQueryEngine;
use tributary_registry_memory::MemoryRegistry;
use tributary_sink_memory::MemorySinks;

type Plane = ControlPlane<
    MemoryRegistry<StreamStatus, StatusDeserializeError, StatusSerializeError>,
    MockQueryEngine,
    MemoryControlBus,
    MemoryLockManager,
>;

const HIGH_VALUE_QUERY: &str = "insert into highValue select * from orders[total>100]";

struct Harness {
    plane: Plane,
    engine: MockQueryEngine,
    control: MemoryControlBus,
    sinks: MemorySinks,
}

impl Harness {
    fn new() -> Self {
        Self::with_actions(&ActionKind::ALL)
    }

    fn with_actions(kinds: &[ActionKind]) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let engine = MockQueryEngine::default();
        let control = MemoryControlBus::new();
        let sinks = MemorySinks::new();

        let factories: HashMap<ActionKind, Arc<dyn SinkFactory>> = kinds
            .iter()
            .map(|kind| (*kind, Arc::new(sinks.clone()) as Arc<dyn SinkFactory>))
            .collect();

        let plane = ControlPlane::new(ControlPlaneOptions {
            registry: MemoryRegistry::new(),
            engine: engine.clone(),
            control: control.clone(),
            locks: MemoryLockManager::new(),
            reserved_streams: Plane::default_reserved_streams(),
            sinks: factories,
        });

        Self {
            plane,
            engine,
            control,
            sinks,
        }
    }

    async fn run(&self, command: Command) -> Reply {
        self.plane.handle(&command).await
    }

    async fn ok(&self, command: Command) -> Reply {
        let reply = self.run(command).await;
        assert_eq!(reply.code, ReplyCode::Ok, "{}", reply.message);
        reply
    }

    async fn status(&self, stream_name: &str) -> Option<StreamStatus> {
        self.plane.streams().get_status(stream_name).await.unwrap()
    }

    async fn listed(&self) -> Vec<String> {
        self.ok(Command::new(Operation::List, ""))
            .await
            .streams
            .into_iter()
            .map(|listing| listing.stream_name)
            .collect()
    }

    async fn with_orders() -> Self {
        let harness = Self::new();
        harness.ok(create_orders()).await;
        harness
    }
}

#[derive(Clone)]
struct ChannelProbe(mpsc::UnboundedSender<String>);

#[async_trait]
impl ControlHandler for ChannelProbe {
    type Error = Infallible;

    async fn handle(&self, _channel: String, payload: String) -> Result<(), Self::Error> {
        let _ = self.0.send(payload);
        Ok(())
    }
}

async fn probe(control: &MemoryControlBus, kind: ActionKind) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    control
        .subscribe(kind.channel(), ChannelProbe(tx), CancellationToken::new())
        .await
        .unwrap();
    rx
}

async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(2), async {
        while !check().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn create_orders() -> Command {
    create("orders")
}

fn create(stream_name: &str) -> Command {
    Command::new(Operation::Create, stream_name).with_columns(vec![
        ColumnNameTypeValue::definition("id", ColumnType::Integer),
        ColumnNameTypeValue::definition("total", ColumnType::Double),
    ])
}

fn insert(stream_name: &str, id: i64, total: f64) -> Command {
    Command::new(Operation::Insert, stream_name).with_columns(vec![
        ColumnNameTypeValue::value("id", serde_json::json!(id)),
        ColumnNameTypeValue::value("total", serde_json::json!(total)),
    ])
}

fn add_query(stream_name: &str, query: &str) -> Command {
    Command::new(Operation::AddQuery, stream_name).with_query(query)
}

fn remove_query(stream_name: &str, query: &str) -> Command {
    Command::new(Operation::RemoveQuery, stream_name).with_query(query)
}

#[tokio::test]
async fn test_create_makes_user_defined_stream() {
    let harness = Harness::with_orders().await;

    let status = harness.status("orders").await.unwrap();

    assert!(status.user_defined);
    assert!(status.actions_enabled.is_empty());
    assert!(status.added_queries.is_empty());
}

#[tokio::test]
async fn test_create_twice_is_rejected_without_change() {
    let harness = Harness::with_orders().await;
    let before = harness.status("orders").await;

    let reply = harness
        .run(
            Command::new(Operation::Create, "orders").with_columns(vec![
                ColumnNameTypeValue::definition("other", ColumnType::String),
            ]),
        )
        .await;

    assert_eq!(reply.code, ReplyCode::KoStreamAlreadyExists);
    assert_eq!(reply.message, "Stream orders already exists");
    assert_eq!(harness.status("orders").await, before);
    assert_eq!(
        harness.engine.get_definition("orders").await.unwrap().unwrap().columns.len(),
        2
    );
}

#[tokio::test]
async fn test_listen_twice_then_restart() {
    let harness = Harness::with_orders().await;

    harness.ok(Command::new(Operation::Listen, "orders")).await;
    let twice = harness.run(Command::new(Operation::Listen, "orders")).await;
    assert_eq!(twice.code, ReplyCode::KoListenerAlreadyExists);

    harness.ok(Command::new(Operation::StopListen, "orders")).await;
    assert!(harness.status("orders").await.unwrap().actions_enabled.is_empty());

    harness.ok(Command::new(Operation::Listen, "orders")).await;
    assert_eq!(
        harness.status("orders").await.unwrap().actions_enabled.len(),
        1
    );
    assert_eq!(
        harness.sinks.recording(ActionKind::Listen, "orders").await.opened,
        2
    );
}

#[tokio::test]
async fn test_stop_listen_without_listener() {
    let harness = Harness::with_orders().await;

    let reply = harness.run(Command::new(Operation::StopListen, "orders")).await;

    assert_eq!(reply.code, ReplyCode::KoListenerDoesNotExist);
}

#[tokio::test]
async fn test_disable_stops_only_the_named_stream() {
    let harness = Harness::with_orders().await;
    harness.ok(create("payments")).await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;
    harness.ok(Command::new(Operation::Listen, "payments")).await;
    let mut channel = probe(&harness.control, ActionKind::Listen).await;

    harness.ok(Command::new(Operation::StopListen, "orders")).await;

    assert_eq!(channel.recv().await.unwrap(), "orders");
    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move { sinks.released(ActionKind::Listen, "orders").await == 1 }
    })
    .await;

    harness.ok(insert("payments", 1, 10.0)).await;
    harness.ok(insert("orders", 2, 20.0)).await;

    assert_eq!(harness.sinks.released(ActionKind::Listen, "payments").await, 0);
    assert_eq!(
        harness.sinks.events(ActionKind::Listen, "payments").await,
        vec![Event::new(vec![Value::Integer(1), Value::Double(10.0)])]
    );
    assert!(harness.sinks.events(ActionKind::Listen, "orders").await.is_empty());
    assert!(channel.try_recv().is_err());
}

#[tokio::test]
async fn test_wildcard_stops_every_subscriber_of_the_kind() {
    let harness = Harness::with_orders().await;
    harness.ok(create("payments")).await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;
    harness.ok(Command::new(Operation::Listen, "payments")).await;
    harness.ok(Command::new(Operation::Index, "orders")).await;

    harness
        .control
        .publish(ActionKind::Listen.channel(), "*".to_string())
        .await
        .unwrap();

    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move {
            sinks.released(ActionKind::Listen, "orders").await == 1
                && sinks.released(ActionKind::Listen, "payments").await == 1
        }
    })
    .await;

    assert_eq!(harness.sinks.released(ActionKind::Indexed, "orders").await, 0);
}

#[tokio::test]
async fn test_repeated_teardown_releases_once() {
    let harness = Harness::with_orders().await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;

    for payload in ["orders", "orders", "*", "orders"] {
        harness
            .control
            .publish(ActionKind::Listen.channel(), payload.to_string())
            .await
            .unwrap();
    }

    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move { sinks.released(ActionKind::Listen, "orders").await == 1 }
    })
    .await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.sinks.released(ActionKind::Listen, "orders").await, 1);
}

#[tokio::test]
async fn test_stream_names_differing_in_case_are_distinct() {
    let harness = Harness::with_orders().await;
    harness.ok(create("ORDERS")).await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;
    harness.ok(Command::new(Operation::Listen, "ORDERS")).await;

    harness.ok(Command::new(Operation::StopListen, "ORDERS")).await;

    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move { sinks.released(ActionKind::Listen, "ORDERS").await == 1 }
    })
    .await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.sinks.released(ActionKind::Listen, "orders").await, 0);
    assert!(
        harness
            .status("orders")
            .await
            .unwrap()
            .is_enabled(ActionKind::Listen)
    );

    harness.ok(insert("orders", 1, 10.0)).await;
    assert_eq!(harness.sinks.events(ActionKind::Listen, "orders").await.len(), 1);

    harness.ok(Command::new(Operation::Listen, "ORDERS")).await;
}

#[tokio::test]
async fn test_high_value_scenario() {
    let harness = Harness::new();

    let created = harness.ok(create_orders()).await;
    assert_eq!(created.code.code(), 1);

    harness.ok(add_query("orders", HIGH_VALUE_QUERY)).await;
    let orders = harness.status("orders").await.unwrap();
    assert_eq!(orders.added_queries.len(), 1);
    let high_value = harness.status("highValue").await.unwrap();
    assert!(!high_value.user_defined);
    assert_eq!(harness.listed().await, vec!["highValue", "orders"]);

    harness.ok(Command::new(Operation::Listen, "highValue")).await;
    assert_eq!(
        harness
            .status("highValue")
            .await
            .unwrap()
            .actions_enabled
            .into_iter()
            .collect::<Vec<_>>(),
        vec![ActionKind::Listen]
    );

    harness.ok(insert("orders", 1, 150.0)).await;
    harness.ok(insert("orders", 2, 50.0)).await;
    assert_eq!(
        harness.sinks.events(ActionKind::Listen, "highValue").await,
        vec![Event::new(vec![Value::Integer(1), Value::Double(150.0)])]
    );

    let mut channel = probe(&harness.control, ActionKind::Listen).await;
    harness.ok(remove_query("orders", HIGH_VALUE_QUERY)).await;

    assert_eq!(harness.listed().await, vec!["orders"]);
    assert!(harness.status("highValue").await.is_none());
    assert_eq!(channel.recv().await.unwrap(), "highValue");

    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move { sinks.released(ActionKind::Listen, "highValue").await == 1 }
    })
    .await;
}

#[tokio::test]
async fn test_remove_missing_query() {
    let harness = Harness::with_orders().await;

    let reply = harness.run(remove_query("orders", HIGH_VALUE_QUERY)).await;

    assert_eq!(reply.code, ReplyCode::KoQueryDoesNotExist);
}

#[tokio::test]
async fn test_add_query_failures() {
    let harness = Harness::with_orders().await;

    let garbage = harness.run(add_query("orders", "select everything")).await;
    assert_eq!(garbage.code, ReplyCode::KoParserError);

    let unknown_column = harness
        .run(add_query("orders", "from orders[price > 1] select * insert into pricey"))
        .await;
    assert_eq!(unknown_column.code, ReplyCode::KoParserError);

    let missing_source = harness
        .run(add_query("orders", "from refunds select * insert into copy"))
        .await;
    assert_eq!(missing_source.code, ReplyCode::KoSourceStreamDoesNotExist);

    harness
        .ok(Command::new(Operation::Create, "ids").with_columns(vec![
            ColumnNameTypeValue::definition("id", ColumnType::String),
        ]))
        .await;
    let mismatch = harness
        .run(add_query("orders", "from orders select id insert into ids"))
        .await;
    assert_eq!(
        mismatch.code,
        ReplyCode::KoOutputstreamExistsAndDefinitionIsDifferent
    );

    harness.ok(add_query("orders", HIGH_VALUE_QUERY)).await;
    let duplicate = harness.run(add_query("orders", HIGH_VALUE_QUERY)).await;
    assert_eq!(duplicate.code, ReplyCode::KoQueryAlreadyExists);
    assert_eq!(harness.engine.query_count().await, 1);
}

#[tokio::test]
async fn test_timebatch_window_is_normalized() {
    let harness = Harness::with_orders().await;
    let query = "from orders#window.timebatch(1 sec) select * insert into batched";

    harness.ok(add_query("orders", query)).await;

    let listing = harness.ok(Command::new(Operation::List, "")).await;
    let orders = listing
        .streams
        .iter()
        .find(|listing| listing.stream_name == "orders")
        .unwrap();
    assert_eq!(orders.queries[0].query, query);

    harness.ok(remove_query("orders", query)).await;
    assert!(harness.engine.get_definition("batched").await.unwrap().is_none());
}

#[tokio::test]
async fn test_query_text_is_kept_verbatim() {
    let harness = Harness::with_orders().await;
    let padded = "  from orders select id insert into ids\n";
    let trimmed = padded.trim();

    harness.ok(add_query("orders", padded)).await;

    let status = harness.status("orders").await.unwrap();
    let record = status.added_queries.values().next().unwrap();
    assert_eq!(record.raw_query, padded);

    let duplicate = harness.run(add_query("orders", trimmed)).await;
    assert_eq!(duplicate.code, ReplyCode::KoQueryAlreadyExists);

    harness.ok(remove_query("orders", trimmed)).await;
    assert_eq!(harness.engine.query_count().await, 0);
}

#[tokio::test]
async fn test_query_record_names_the_stream_it_reads() {
    let harness = Harness::with_orders().await;
    harness.ok(create("payments")).await;

    harness
        .ok(add_query("payments", "from orders select * insert into audit"))
        .await;

    let status = harness.status("payments").await.unwrap();
    let record = status.added_queries.values().next().unwrap();
    assert_eq!(record.source_stream, "orders");
    assert!(harness.status("orders").await.unwrap().added_queries.is_empty());
}

#[tokio::test]
async fn test_drop_forgets_queries_writing_the_stream() {
    let harness = Harness::with_orders().await;
    let query = "from orders select * insert into payments";
    harness.ok(create("payments")).await;
    harness.ok(add_query("orders", query)).await;

    harness.ok(Command::new(Operation::Drop, "payments")).await;

    assert_eq!(harness.engine.query_count().await, 0);
    assert!(harness.status("orders").await.unwrap().added_queries.is_empty());

    harness.ok(create("payments")).await;
    harness.ok(add_query("orders", query)).await;

    let orders = harness.status("orders").await.unwrap();
    assert_eq!(orders.added_queries.len(), 1);
    assert_eq!(harness.engine.query_count().await, 1);

    harness.ok(remove_query("orders", query)).await;
    assert_eq!(harness.engine.query_count().await, 0);
}

#[tokio::test]
async fn test_alter_stream() {
    let harness = Harness::with_orders().await;

    harness
        .ok(Command::new(Operation::Alter, "orders").with_columns(vec![
            ColumnNameTypeValue::definition("customer", ColumnType::String),
        ]))
        .await;
    assert_eq!(harness.status("orders").await.unwrap().columns.len(), 3);

    let duplicate = harness
        .run(Command::new(Operation::Alter, "orders").with_columns(vec![
            ColumnNameTypeValue::definition("total", ColumnType::Double),
        ]))
        .await;
    assert_eq!(duplicate.code, ReplyCode::KoColumnAlreadyExists);

    harness.ok(add_query("orders", HIGH_VALUE_QUERY)).await;
    let inferred = harness
        .run(Command::new(Operation::Alter, "highValue").with_columns(vec![
            ColumnNameTypeValue::definition("note", ColumnType::String),
        ]))
        .await;
    assert_eq!(inferred.code, ReplyCode::KoStreamIsNotUserDefined);
}

#[tokio::test]
async fn test_insert_validation() {
    let harness = Harness::with_orders().await;

    let unknown = harness
        .run(Command::new(Operation::Insert, "orders").with_columns(vec![
            ColumnNameTypeValue::value("price", serde_json::json!(1)),
        ]))
        .await;
    assert_eq!(unknown.code, ReplyCode::KoColumnDoesNotExist);

    let mistyped = harness
        .run(Command::new(Operation::Insert, "orders").with_columns(vec![
            ColumnNameTypeValue::value("total", serde_json::json!("lots")),
        ]))
        .await;
    assert_eq!(mistyped.code, ReplyCode::KoParserError);

    let missing = harness.run(insert("refunds", 1, 1.0)).await;
    assert_eq!(missing.code, ReplyCode::KoStreamDoesNotExist);
}

#[tokio::test]
async fn test_drop_tears_everything_down() {
    let harness = Harness::with_orders().await;
    harness.ok(add_query("orders", HIGH_VALUE_QUERY)).await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;
    harness.ok(Command::new(Operation::SaveToMongo, "orders")).await;
    harness.ok(Command::new(Operation::Listen, "highValue")).await;

    let inferred = harness.run(Command::new(Operation::Drop, "highValue")).await;
    assert_eq!(inferred.code, ReplyCode::KoStreamIsNotUserDefined);

    harness.ok(Command::new(Operation::Drop, "orders")).await;

    assert!(harness.listed().await.is_empty());
    assert_eq!(harness.engine.query_count().await, 0);
    assert!(harness.plane.streams().keys().await.unwrap().is_empty());

    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move {
            sinks.released(ActionKind::Listen, "orders").await == 1
                && sinks.released(ActionKind::SaveToMongo, "orders").await == 1
                && sinks.released(ActionKind::Listen, "highValue").await == 1
        }
    })
    .await;

    let again = harness.run(Command::new(Operation::Drop, "orders")).await;
    assert_eq!(again.code, ReplyCode::KoStreamDoesNotExist);
}

#[tokio::test]
async fn test_save_actions() {
    let harness = Harness::with_orders().await;

    harness.ok(Command::new(Operation::SaveToCassandra, "orders")).await;
    let twice = harness
        .run(Command::new(Operation::SaveToCassandra, "orders"))
        .await;
    assert_eq!(twice.code, ReplyCode::KoSave2cassandraStreamAlreadyEnabled);

    harness.ok(insert("orders", 1, 5.0)).await;
    assert_eq!(
        harness
            .sinks
            .events(ActionKind::SaveToCassandra, "orders")
            .await
            .len(),
        1
    );

    harness
        .ok(Command::new(Operation::StopSaveToCassandra, "orders"))
        .await;
    assert!(harness.status("orders").await.unwrap().actions_enabled.is_empty());

    // Stopping what is not running is accepted as a no-op.
    let mut channel = probe(&harness.control, ActionKind::SaveToMongo).await;
    harness.ok(Command::new(Operation::StopSaveToMongo, "orders")).await;
    sleep(Duration::from_millis(20)).await;
    assert!(channel.try_recv().is_err());
}

#[tokio::test]
async fn test_unconfigured_action_is_rejected() {
    let harness = Harness::with_actions(&[ActionKind::Listen]);
    harness.ok(create_orders()).await;

    let reply = harness.run(Command::new(Operation::SaveToMongo, "orders")).await;

    assert_eq!(reply.code, ReplyCode::KoGeneralError);
    assert_eq!(reply.message, "action SAVE_TO_MONGO is not configured");
    assert!(harness.status("orders").await.unwrap().actions_enabled.is_empty());
}

#[tokio::test]
async fn test_reserved_streams() {
    let harness = Harness::with_orders().await;

    let create = harness.run(create("tributary_stats_base")).await;
    assert_eq!(create.code, ReplyCode::KoStreamOperationNotAllowed);

    harness
        .engine
        .define_stream(StreamDefinition::new(
            "tributary_stats_base",
            vec![Column::new("operation", ColumnType::String)],
        ))
        .await
        .unwrap();

    assert_eq!(harness.listed().await, vec!["orders"]);
    harness
        .ok(Command::new(Operation::Listen, "tributary_stats_base"))
        .await;

    let index = harness
        .run(Command::new(Operation::Index, "tributary_stats_base"))
        .await;
    assert_eq!(index.code, ReplyCode::KoStreamOperationNotAllowed);
}

#[tokio::test]
async fn test_batch_replies_in_input_order() {
    let harness = Harness::new();
    let batch = vec![
        Command::new(Operation::Drop, "orders").with_request_id("r-1"),
        add_query("orders", HIGH_VALUE_QUERY).with_request_id("r-2"),
        insert("orders", 1, 500.0).with_request_id("r-3"),
        create_orders().with_request_id("r-4"),
        Command::new(Operation::List, "").with_request_id("r-5"),
    ];

    let replies = harness.plane.process_batch(&batch).await;

    let ids: Vec<_> = replies
        .iter()
        .map(|reply| reply.request_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["r-1", "r-2", "r-3", "r-4", "r-5"]);
    assert!(replies.iter().all(|reply| reply.code == ReplyCode::Ok));
    assert_eq!(replies[4].streams.len(), 2);
    assert!(harness.listed().await.is_empty());
}

#[tokio::test]
async fn test_concurrent_listen_enables_once() {
    let harness = Harness::with_orders().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let plane = harness.plane.clone();
            tokio::spawn(async move {
                plane
                    .handle(&Command::new(Operation::Listen, "orders"))
                    .await
                    .code
            })
        })
        .collect();

    let mut codes = Vec::new();
    for handle in handles {
        codes.push(handle.await.unwrap());
    }

    assert_eq!(codes.iter().filter(|code| **code == ReplyCode::Ok).count(), 1);
    assert!(
        codes
            .iter()
            .all(|code| *code == ReplyCode::Ok || *code == ReplyCode::KoListenerAlreadyExists)
    );
    assert_eq!(
        harness.sinks.recording(ActionKind::Listen, "orders").await.opened,
        1
    );
}

#[tokio::test]
async fn test_shutdown_stops_every_sink() {
    let harness = Harness::with_orders().await;
    harness.ok(create("payments")).await;
    harness.ok(Command::new(Operation::Listen, "orders")).await;
    harness.ok(Command::new(Operation::Index, "payments")).await;
    let mut channel = probe(&harness.control, ActionKind::Indexed).await;

    harness.plane.shutdown().await;

    assert_eq!(channel.recv().await.unwrap(), "*");

    // The broadcast and the local stop race for each callback; one of them wins.
    let sinks = harness.sinks.clone();
    eventually(|| {
        let sinks = sinks.clone();
        async move {
            sinks.released(ActionKind::Listen, "orders").await == 1
                && sinks.released(ActionKind::Indexed, "payments").await == 1
        }
    })
    .await;

    let after = harness.run(insert("orders", 1, 1.0)).await;
    assert_eq!(after.code, ReplyCode::Ok);
    assert!(harness.sinks.events(ActionKind::Listen, "orders").await.is_empty());
}

#[tokio::test]
async fn test_status_report() {
    let harness = Harness::with_orders().await;
    harness.ok(add_query("orders", HIGH_VALUE_QUERY)).await;
    harness.ok(Command::new(Operation::Listen, "highValue")).await;

    let report = harness.plane.status_report().await.unwrap();

    assert!(report.contains("stream definitions: 2"));
    assert!(report.contains("registry entries: 2"));
    assert!(report.contains("orders [id:integer, total:double]"));
    assert!(report.contains("user_defined false listen true"));
}

#[tokio::test]
async fn test_malformed_commands() {
    let harness = Harness::new();

    let nameless = harness.run(Command::new(Operation::Listen, "")).await;
    assert_eq!(nameless.code, ReplyCode::KoParserError);

    let queryless = harness.run(Command::new(Operation::AddQuery, "orders")).await;
    assert_eq!(queryless.code, ReplyCode::KoParserError);
    assert_eq!(tributary_core::readable_reply(queryless.code.code()), "KO: PARSER ERROR");
}
