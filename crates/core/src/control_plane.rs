use crate::command::{ActionKind, Command, Operation};
use crate::error::Error;
use crate::lifecycle::ActionLifecycle;
use crate::registry::StreamRegistry;
use crate::reply::{Reply, StreamListing};
use crate::sink::SinkFactory;
use crate::status::{StatusDeserializeError, StatusSerializeError, StreamStatus};
use crate::validation::{self, Snapshot};

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::Arc;

use tracing::{error, warn};
use tributary_control::ControlBus;
use tributary_locks::LockManager;
use tributary_query_engine::{QueryEngine, QueryEngineError, QueryEngineErrorKind};
use tributary_registry::Registry;

/// Stream names reserved for internal statistics.
pub const RESERVED_STREAMS: [&str; 2] = ["tributary_stats_base", "tributary_stats_global_by_operation"];

/// Options for configuring a `ControlPlane`.
pub struct ControlPlaneOptions<R, Q, C, L> {
    /// Shared stream status registry.
    pub registry: R,

    /// The query engine commands are applied to.
    pub engine: Q,

    /// Control channels for sink teardown.
    pub control: C,

    /// Per-stream mutation locks.
    pub locks: L,

    /// Stream names hidden from listing and closed to most operations.
    pub reserved_streams: HashSet<String>,

    /// Sink factory per action kind. Kinds without one are rejected.
    pub sinks: HashMap<ActionKind, Arc<dyn SinkFactory>>,
}

/// Applies client commands to the engine, the registry, and sink subscriptions.
///
/// Each command is validated and applied while holding the lock for its stream
/// name, so commands on one stream never interleave. Commands on different
/// streams run concurrently.
#[derive(Clone, Debug)]
pub struct ControlPlane<R, Q, C, L> {
    pub(crate) engine: Q,
    pub(crate) lifecycle: ActionLifecycle<Q, C>,
    locks: L,
    reserved_streams: Arc<HashSet<String>>,
    pub(crate) streams: StreamRegistry<R, Q, C>,
}

impl<R, Q, C, L> ControlPlane<R, Q, C, L>
where
    R: Registry<StreamStatus, StatusDeserializeError, StatusSerializeError>,
    Q: QueryEngine,
    C: ControlBus,
    L: LockManager,
{
    /// Creates a new `ControlPlane`.
    pub fn new(
        ControlPlaneOptions {
            registry,
            engine,
            control,
            locks,
            reserved_streams,
            sinks,
        }: ControlPlaneOptions<R, Q, C, L>,
    ) -> Self {
        Self {
            lifecycle: ActionLifecycle::new(engine.clone(), control.clone(), sinks),
            streams: StreamRegistry::new(registry, engine.clone(), control),
            engine,
            locks,
            reserved_streams: Arc::new(reserved_streams),
        }
    }

    /// The default reserved stream names.
    #[must_use]
    pub fn default_reserved_streams() -> HashSet<String> {
        RESERVED_STREAMS.iter().map(ToString::to_string).collect()
    }

    /// The stream status registry.
    pub const fn streams(&self) -> &StreamRegistry<R, Q, C> {
        &self.streams
    }

    /// Applies one command and answers it.
    pub async fn handle(&self, command: &Command) -> Reply {
        match self.apply(command).await {
            Ok(streams) => Reply::ok(command, streams),
            Err(Error::Rejected(rejection)) => {
                warn!(stream = %command.stream_name, operation = %command.operation, code = rejection.code.code(), "{}", rejection.message);
                Reply::new(command, rejection.code, rejection.message)
            }
            Err(e) => {
                error!(
                    stream = %command.stream_name,
                    operation = %command.operation,
                    payload = command.raw_payload.as_deref().unwrap_or_default(),
                    error = %e,
                    "command failed"
                );
                Reply::new(command, e.reply_code(), e.to_string())
            }
        }
    }

    /// Applies a micro-batch and returns one reply per command, in input order.
    ///
    /// Commands are grouped by operation and the groups run in a fixed order:
    /// definitions first, then data, queries, actions, listing, and drops last.
    pub async fn process_batch(&self, commands: &[Command]) -> Vec<Reply> {
        let mut order: Vec<usize> = (0..commands.len()).collect();
        order.sort_by_key(|&index| commands[index].operation.batch_rank());

        let mut replies: Vec<Option<Reply>> = vec![None; commands.len()];
        for index in order {
            replies[index] = Some(self.handle(&commands[index]).await);
        }

        replies.into_iter().flatten().collect()
    }

    /// Broadcasts global teardown and stops every local sink subscription.
    pub async fn shutdown(&self) {
        self.lifecycle.teardown_all().await;
    }

    /// A multi-line summary of definitions and registry records.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine or the registry cannot be read.
    pub async fn status_report(&self) -> Result<String, Error> {
        let definitions = self
            .engine
            .list_definitions()
            .await
            .map_err(Error::query_engine)?;
        let entries = self.streams.keys().await?.len();
        let live = self.lifecycle.live_count().await;

        let mut report = String::new();
        let _ = writeln!(report, "stream definitions: {}", definitions.len());
        let _ = writeln!(report, "registry entries: {entries}");
        let _ = writeln!(report, "live sink subscriptions: {live}");

        for definition in definitions {
            let columns = definition
                .columns
                .iter()
                .map(|column| format!("{}:{}", column.name, column.column_type))
                .collect::<Vec<_>>()
                .join(", ");

            let _ = write!(report, "  {} [{columns}]", definition.name);

            if let Some(status) = self.streams.get_status(&definition.name).await? {
                let queries = status
                    .added_queries
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                let _ = write!(
                    report,
                    " queries [{queries}] user_defined {} listen {}",
                    status.user_defined,
                    status.is_enabled(ActionKind::Listen)
                );
            }

            report.push('\n');
        }

        Ok(report)
    }

    async fn apply(&self, command: &Command) -> Result<Vec<StreamListing>, Error> {
        command.check_shape()?;

        if command.operation == Operation::List {
            return self.list().await;
        }

        if let Some((kind, _)) = command.operation.action() {
            if !self.lifecycle.is_configured(kind) {
                return Err(Error::ActionNotConfigured(kind));
            }
        }

        let _guard = self
            .locks
            .lock(command.stream_name.as_str())
            .await
            .map_err(|e| Error::Locks(e.to_string()))?;

        let snapshot = self.snapshot(command).await?;
        validation::validate(&snapshot)?;

        match command.operation {
            Operation::Create => self.create(command).await?,
            Operation::Alter => self.alter(command).await?,
            Operation::Drop => self.drop_stream(command).await?,
            Operation::Insert => self.insert(command, snapshot.definition).await?,
            Operation::AddQuery => {
                self.add_query(command, snapshot.query_shape.and_then(Result::ok))
                    .await?;
            }
            Operation::RemoveQuery => self.remove_query(command, snapshot.status).await?,
            operation => {
                if let Some((kind, start)) = operation.action() {
                    if start {
                        self.start_action(command, kind).await?;
                    } else {
                        self.stop_action(command, kind, snapshot.status).await?;
                    }
                }
            }
        }

        Ok(Vec::new())
    }

    pub(crate) fn is_reserved(&self, stream_name: &str) -> bool {
        self.reserved_streams.contains(stream_name)
    }

    async fn snapshot<'a>(&self, command: &'a Command) -> Result<Snapshot<'a>, Error> {
        let stream_name = command.stream_name.as_str();

        let definition = self
            .engine
            .get_definition(stream_name)
            .await
            .map_err(Error::query_engine)?;

        let status = match definition {
            Some(_) => self.streams.get_status(stream_name).await?,
            None => None,
        };

        let mut query_shape = None;
        let mut missing_sources = Vec::new();

        if command.operation == Operation::AddQuery {
            match self
                .engine
                .inspect_query(&normalize_query(command.query_text()))
                .await
            {
                Ok(shape) => {
                    for input in &shape.inputs {
                        if self
                            .engine
                            .get_definition(input)
                            .await
                            .map_err(Error::query_engine)?
                            .is_none()
                        {
                            missing_sources.push(input.clone());
                        }
                    }
                    query_shape = Some(Ok(shape));
                }
                Err(e) if e.kind() == QueryEngineErrorKind::Parse => {
                    query_shape = Some(Err(e.to_string()));
                }
                Err(e) => return Err(Error::query_engine(e)),
            }
        }

        Ok(Snapshot {
            command,
            reserved: self.is_reserved(stream_name),
            definition,
            status,
            query_shape,
            missing_sources,
        })
    }
}

/// Rewrites the legacy `timebatch` window name to the engine's `timeBatch`.
pub(crate) fn normalize_query(query: &str) -> String {
    query.replace("timebatch", "timeBatch")
}
