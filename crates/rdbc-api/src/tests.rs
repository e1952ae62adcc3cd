#[cfg(test)]
mod tests {
    use crate::stream::ResultStream;
    use crate::{
        args, params, Arg, BoundParams, Connection, ConnectionFactory, ConnectionFactoryExt,
        ParametrizedSelect, PreparedStatement, RdbcError, Result, Row, RowMetadata, Select,
        SqlParam, SqlTemplate, SqlType, SqlValue, Statement, StatementExecutor, StatementKind,
        TypeConverterRegistry,
    };
    use crate::{ColumnMetadata, Decimal, SqlNumeric};
    use async_trait::async_trait;
    use futures::{FutureExt, StreamExt};
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Returns one row holding the bound values, one column per parameter.
    struct EchoExecutor {
        names: Vec<String>,
        registry: Arc<TypeConverterRegistry>,
    }

    #[async_trait]
    impl StatementExecutor for EchoExecutor {
        async fn execute_for_stream(&self, params: &BoundParams) -> Result<ResultStream> {
            let columns = self
                .names
                .iter()
                .zip(params.values())
                .map(|(name, bound)| {
                    let column = ColumnMetadata::new(name.clone(), "ECHO");
                    match bound.sql_type {
                        Some(ty) => column.with_native_type(ty),
                        None => column,
                    }
                })
                .collect();
            let metadata = Arc::new(RowMetadata::new(columns));
            let values = params.values().iter().map(|b| b.value.clone()).collect();
            let row = Row::new(metadata.clone(), values, self.registry.clone());
            let (stream, sink) = ResultStream::channel(metadata);
            tokio::spawn(async move {
                let delivered = sink.send(row).await;
                sink.complete(u64::from(delivered), Vec::new());
            });
            Ok(stream)
        }
    }

    /// Streams a fixed list of single-column rows after an optional delay.
    struct RowsExecutor {
        values: Vec<SqlValue>,
        delay: Option<Duration>,
        registry: Arc<TypeConverterRegistry>,
    }

    #[async_trait]
    impl StatementExecutor for RowsExecutor {
        async fn execute_for_stream(&self, _params: &BoundParams) -> Result<ResultStream> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let metadata = Arc::new(RowMetadata::new(vec![ColumnMetadata::new("v", "ANY")]));
            let rows: Vec<Row> = self
                .values
                .iter()
                .map(|v| Row::new(metadata.clone(), vec![v.clone()], self.registry.clone()))
                .collect();
            let (stream, sink) = ResultStream::channel(metadata);
            tokio::spawn(async move {
                let mut sent = 0;
                for row in rows {
                    if !sink.send(row).await {
                        break;
                    }
                    sent += 1;
                }
                sink.complete(sent, Vec::new());
            });
            Ok(stream)
        }
    }

    fn registry() -> Arc<TypeConverterRegistry> {
        Arc::new(TypeConverterRegistry::standard())
    }

    fn echo(sql: &str) -> Select {
        let template = SqlTemplate::parse(sql);
        let registry = registry();
        let executor = Arc::new(EchoExecutor {
            names: template.parameter_names().to_vec(),
            registry: registry.clone(),
        });
        Statement::new(PreparedStatement::new(
            template,
            StatementKind::Select,
            executor,
            registry,
        ))
    }

    fn rows(values: Vec<SqlValue>, delay: Option<Duration>) -> Select {
        let registry = registry();
        let executor = Arc::new(RowsExecutor {
            values,
            delay,
            registry: registry.clone(),
        });
        Statement::new(PreparedStatement::new(
            SqlTemplate::parse("select v from t"),
            StatementKind::Select,
            executor,
            registry,
        ))
    }

    #[test]
    fn bind_requires_exact_parameter_set() {
        let select = echo("select :a, :b");
        let err = select
            .bind(params! { "a" => 1i32 })
            .expect_err("missing b");
        assert_eq!(err, RdbcError::MissingParameterValue("b".into()));

        let err = select
            .bind(params! { "a" => 1i32, "b" => 2i32, "c" => 3i32 })
            .expect_err("extra c");
        assert_eq!(err, RdbcError::UnknownParameter("c".into()));

        select
            .bind(params! { "a" => 1i32, ":b" => 2i32 })
            .expect("exact set");

        let err = select.no_params().expect_err("has placeholders");
        assert_eq!(err, RdbcError::MissingParameterValue("a".into()));
        echo("select 1").no_params().expect("no placeholders");
    }

    #[test]
    fn bind_by_index_checks_length() {
        let select = echo("select :a, :b");
        let err = select.bind_by_index(args![1i32]).expect_err("too few");
        assert_eq!(err, RdbcError::MissingParameterValue("b".into()));
        let err = select
            .bind_by_index(args![1i32, 2i32, 3i32])
            .expect_err("too many");
        assert!(matches!(err, RdbcError::UnknownParameter(_)));
        let err = select.bind_by_index(args![]).expect_err("empty");
        assert_eq!(err, RdbcError::MissingParameterValue("a".into()));
    }

    #[test]
    fn bind_rejects_unknown_host_type() {
        struct Point;
        let select = echo("select :p");
        let err = select
            .bind(vec![("p", Arg::new(Point))])
            .expect_err("no encoder");
        assert!(matches!(err, RdbcError::NoSuitableConverter { ref param, .. } if param == "p"));
    }

    #[tokio::test]
    async fn bind_by_index_maps_positions_in_order() {
        let select = echo("select :first, :second, :first");
        let bound = select
            .bind_by_index(args!["x", 42i64])
            .expect("bind");
        assert_eq!(
            bound.bound().params().values()[1].value,
            SqlValue::Int64(42)
        );
        let row = bound
            .execute_for_first_row(TIMEOUT)
            .await
            .expect("execute")
            .expect("row");
        assert_eq!(row.get_str("first").expect("first"), "x");
        assert_eq!(row.get_i64("second").expect("second"), 42);
    }

    #[tokio::test]
    async fn binding_leaves_statement_reusable() {
        let select = echo("select :v");
        let one = select.bind(params! { "v" => 1i32 }).expect("bind one");
        let two = select.bind(params! { "v" => 2i32 }).expect("bind two");
        let async_bound = select
            .bind_async(params! { "v" => 3i32 })
            .await
            .expect("bind async");
        for (bound, expected) in [(one, 1), (two, 2), (async_bound, 3)] {
            let value = bound
                .execute_for_value(TIMEOUT, |row| row.get_i32_opt(0))
                .await
                .expect("execute");
            assert_eq!(value, Some(expected));
        }
        assert_eq!(select.parameter_names(), ["v"]);
    }

    #[tokio::test]
    async fn value_and_value_opt_differ_on_null() {
        let select = echo("select :v as v");
        let bound = select
            .bind(params! { "v" => None::<String> })
            .expect("bind");
        let value = bound
            .execute_for_value(TIMEOUT, |row| row.get_str_opt("v"))
            .await
            .expect("value");
        assert_eq!(value, None);
        let value = bound
            .execute_for_value_opt(TIMEOUT, |row| row.get_str_opt("v"))
            .await
            .expect("value opt");
        assert_eq!(value, Some(None));

        let empty = rows(Vec::new(), None).no_params().expect("bind");
        let value = empty
            .execute_for_value_opt(TIMEOUT, |row| row.get_str_opt(0))
            .await
            .expect("no rows");
        assert_eq!(value, None);
        assert!(empty
            .execute_for_first_row(TIMEOUT)
            .await
            .expect("no rows")
            .is_none());
    }

    async fn echo_value(arg: Arg) -> Row {
        echo("select :v as v")
            .bind(vec![("v", arg)])
            .expect("bind")
            .execute_for_first_row(TIMEOUT)
            .await
            .expect("execute")
            .expect("row")
    }

    #[tokio::test]
    async fn scalar_values_round_trip() {
        let uuid = Uuid::new_v4();
        let decimal: Decimal = "-12.5000".parse().expect("decimal");
        let date = chrono::NaiveDate::from_ymd_opt(2023, 12, 31).expect("date");
        let time = chrono::NaiveTime::from_hms_milli_opt(8, 15, 0, 250).expect("time");
        let instant = chrono::DateTime::from_timestamp(1_700_000_000, 0).expect("instant");

        assert!(echo_value(Arg::new(true)).await.get_bool("v").expect("bool"));
        assert_eq!(echo_value(Arg::new('q')).await.get_char("v").expect("char"), 'q');
        assert_eq!(echo_value(Arg::new(7i16)).await.get_i16("v").expect("i16"), 7);
        assert_eq!(echo_value(Arg::new(-8i32)).await.get_i32("v").expect("i32"), -8);
        assert_eq!(echo_value(Arg::new(9i64)).await.get_i64("v").expect("i64"), 9);
        assert_eq!(echo_value(Arg::new(0.5f32)).await.get_f32("v").expect("f32"), 0.5);
        assert_eq!(echo_value(Arg::new(0.25f64)).await.get_f64("v").expect("f64"), 0.25);
        assert_eq!(
            echo_value(Arg::new(decimal)).await.get_decimal("v").expect("decimal"),
            decimal
        );
        assert_eq!(
            echo_value(Arg::new("text")).await.get_str("v").expect("str"),
            "text"
        );
        assert_eq!(
            echo_value(Arg::new(vec![0u8, 255])).await.get_bytes("v").expect("bytes"),
            vec![0u8, 255]
        );
        assert_eq!(echo_value(Arg::new(uuid)).await.get_uuid("v").expect("uuid"), uuid);
        assert_eq!(echo_value(Arg::new(date)).await.get_date("v").expect("date"), date);
        assert_eq!(echo_value(Arg::new(time)).await.get_time("v").expect("time"), time);
        assert_eq!(
            echo_value(Arg::new(instant)).await.get_instant("v").expect("instant"),
            instant
        );
        assert_eq!(
            echo_value(Arg::new(instant.naive_utc()))
                .await
                .get_local_date_time("v")
                .expect("local date-time"),
            instant.naive_utc()
        );
    }

    #[tokio::test]
    async fn numeric_nan_and_finite() {
        let row = echo_value(Arg::new(SqlNumeric::NaN)).await;
        let nan = row.get_numeric("v").expect("numeric");
        assert!(nan.is_nan());
        assert!(matches!(nan.value(), Err(RdbcError::InvalidState(_))));

        let finite = SqlNumeric::Finite(Decimal::new(31_415, 4));
        let row = echo_value(Arg::new(finite)).await;
        let value = row.get_numeric("v").expect("numeric");
        assert_eq!(value.value().expect("finite"), Decimal::new(31_415, 4));
    }

    #[tokio::test]
    async fn typed_null_keeps_declared_type() {
        let row = echo_value(Arg::new(SqlParam::null(SqlType::Uuid))).await;
        assert_eq!(row.get_uuid_opt("v").expect("null uuid"), None);
        assert_eq!(row.metadata().columns[0].native_type, Some(SqlType::Uuid));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_execution_times_out() {
        let select = rows(vec![SqlValue::Int32(1)], Some(Duration::from_secs(10)));
        let err = select
            .no_params()
            .expect("bind")
            .execute_for_set(Duration::from_millis(100))
            .await
            .expect_err("timeout");
        assert_eq!(err, RdbcError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn stream_delivers_only_requested_rows() {
        let values = (0..10).map(SqlValue::Int32).collect();
        let bound: ParametrizedSelect = rows(values, None).no_params().expect("bind");
        let stream = bound.execute_for_stream(TIMEOUT).await.expect("stream");
        let mut subscription = stream.rows().subscribe().expect("subscribe");
        assert!(stream.rows().subscribe().is_err());

        subscription.request(2);
        for expected in 0..2 {
            let row = subscription.next().await.expect("row").expect("ok");
            assert_eq!(row.get_i32(0).expect("value"), expected);
        }
        let pending = tokio::time::timeout(Duration::from_millis(50), subscription.next()).await;
        assert!(pending.is_err(), "producer ran ahead of demand");

        subscription.cancel();
        assert!(subscription.next().await.is_none());
        assert_eq!(stream.rows_affected().await.expect("summary"), 2);
    }

    #[tokio::test]
    async fn subscription_as_stream_reads_everything() {
        let values = (0..25).map(SqlValue::Int32).collect();
        let bound = rows(values, None).no_params().expect("bind");
        let stream = bound.execute_for_stream(TIMEOUT).await.expect("stream");
        let collected: Vec<i32> = stream
            .rows()
            .subscribe()
            .expect("subscribe")
            .into_stream(4)
            .map(|row| row.and_then(|row| row.get_i32(0)).expect("row"))
            .collect()
            .await;
        assert_eq!(collected, (0..25).collect::<Vec<_>>());
        assert_eq!(stream.rows_affected().await.expect("summary"), 25);
    }

    #[tokio::test]
    async fn result_set_is_fully_buffered() {
        let values = vec![SqlValue::Int32(1), SqlValue::Null];
        let set = rows(values, None)
            .no_params()
            .expect("bind")
            .execute_for_set(TIMEOUT)
            .await
            .expect("set");
        assert_eq!(set.rows_affected, 2);
        assert_eq!(set.len(), 2);
        let values: Vec<Option<i32>> = set
            .iter()
            .map(|row| row.get_i32_opt("v").expect("value"))
            .collect();
        assert_eq!(values, vec![Some(1), None]);
    }

    type Events = Arc<Mutex<Vec<&'static str>>>;

    struct FakeConnection {
        events: Events,
        fail_commit: bool,
        registry: Arc<TypeConverterRegistry>,
    }

    impl FakeConnection {
        fn record(&self, event: &'static str) {
            self.events.lock().expect("events").push(event);
        }
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn begin_tx(&self, _timeout: Duration) -> Result<()> {
            self.record("begin");
            Ok(())
        }

        async fn commit_tx(&self, _timeout: Duration) -> Result<()> {
            self.record("commit");
            if self.fail_commit {
                return Err(RdbcError::Uncategorized("commit refused".into()));
            }
            Ok(())
        }

        async fn rollback_tx(&self, _timeout: Duration) -> Result<()> {
            self.record("rollback");
            Ok(())
        }

        async fn release(&self) -> Result<()> {
            self.record("release");
            Ok(())
        }

        async fn force_release(&self) {
            self.record("force_release");
        }

        async fn validate(&self, _timeout: Duration) -> bool {
            true
        }

        async fn watch_for_idle(&self) {}

        fn prepare(&self, sql: &str, kind: StatementKind) -> Result<PreparedStatement> {
            let template = SqlTemplate::parse(sql);
            let executor = Arc::new(EchoExecutor {
                names: template.parameter_names().to_vec(),
                registry: self.registry.clone(),
            });
            Ok(PreparedStatement::new(
                template,
                kind,
                executor,
                self.registry.clone(),
            ))
        }
    }

    struct FakeFactory {
        events: Events,
        fail_commit: bool,
        closed: AtomicBool,
    }

    impl FakeFactory {
        fn new(fail_commit: bool) -> Self {
            Self {
                events: Arc::new(Mutex::new(Vec::new())),
                fail_commit,
                closed: AtomicBool::new(false),
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().expect("events").clone()
        }
    }

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        type Connection = FakeConnection;

        async fn connection(&self) -> Result<FakeConnection> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(RdbcError::Connect("factory shut down".into()));
            }
            self.events.lock().expect("events").push("connect");
            Ok(FakeConnection {
                events: self.events.clone(),
                fail_commit: self.fail_commit,
                registry: registry(),
            })
        }

        async fn shutdown(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn with_transaction_rolls_back_before_release() {
        let factory = FakeFactory::new(false);
        let err = factory
            .with_transaction(TIMEOUT, |conn| {
                async move {
                    conn.select("select :x")?
                        .bind(params! { "x" => 1i32 })?
                        .execute_for_set(TIMEOUT)
                        .await?;
                    Err::<(), _>(RdbcError::InvalidQuery("boom".into()))
                }
                .boxed()
            })
            .await
            .expect_err("body failure");
        assert_eq!(err, RdbcError::InvalidQuery("boom".into()));
        assert_eq!(factory.events(), ["connect", "begin", "rollback", "release"]);
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success() {
        let factory = FakeFactory::new(false);
        let value = factory
            .with_transaction(TIMEOUT, |conn| {
                async move {
                    conn.select("select :x")?
                        .bind(params! { "x" => 5i64 })?
                        .execute_for_value(TIMEOUT, |row| row.get_i64_opt(0))
                        .await
                }
                .boxed()
            })
            .await
            .expect("transaction");
        assert_eq!(value, Some(5));
        assert_eq!(factory.events(), ["connect", "begin", "commit", "release"]);
    }

    #[tokio::test]
    async fn commit_failure_is_returned() {
        let factory = FakeFactory::new(true);
        let err = factory
            .with_transaction(TIMEOUT, |_conn| async { Ok(()) }.boxed())
            .await
            .expect_err("commit failure");
        assert!(matches!(err, RdbcError::Uncategorized(_)));
        assert_eq!(factory.events(), ["connect", "begin", "commit", "release"]);
    }

    #[tokio::test]
    async fn with_connection_releases_on_panic() {
        let factory = FakeFactory::new(false);
        let outcome = AssertUnwindSafe(factory.with_connection(|_conn| {
            async {
                let fail = true;
                if fail {
                    panic!("body panicked");
                }
                Ok(())
            }
            .boxed()
        }))
        .catch_unwind()
        .await;
        assert!(outcome.is_err());
        assert_eq!(factory.events(), ["connect", "release"]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_connections() {
        let factory = FakeFactory::new(false);
        factory.shutdown().await;
        factory.shutdown().await;
        let err = factory
            .with_connection(|_conn| async { Ok(()) }.boxed())
            .await
            .expect_err("closed");
        assert!(matches!(err, RdbcError::Connect(_)));
        assert!(factory.events().is_empty());
    }
}
