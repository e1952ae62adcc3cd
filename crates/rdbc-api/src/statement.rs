//! Bindable statements and the parametrized statement family.

use crate::stream::ResultStream;
use crate::template::SqlTemplate;
use crate::timeout::with_timeout;
use async_trait::async_trait;
use futures::future::{self, Ready};
use rdbc_core::{
    Arg, BoundValue, RdbcError, Result, ResultSet, Row, TypeConverterRegistry,
};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Encoded parameter values in template order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    values: Vec<BoundValue>,
}

impl BoundParams {
    pub fn new(values: Vec<BoundValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[BoundValue] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&BoundValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    /// Insert whose result rows are the generated `key_columns`.
    ReturningInsert { key_columns: Vec<String> },
    Update,
    Delete,
    Ddl,
    Any,
}

/// Driver side of a prepared statement.
///
/// Only `execute_for_stream` is required; the buffered variants drain it.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    async fn execute_for_stream(&self, params: &BoundParams) -> Result<ResultStream>;

    async fn execute_for_set(&self, params: &BoundParams) -> Result<ResultSet> {
        self.execute_for_stream(params).await?.into_result_set().await
    }

    async fn execute_for_rows_affected(&self, params: &BoundParams) -> Result<u64> {
        self.execute_for_stream(params).await?.rows_affected().await
    }
}

/// A template prepared on a connection, shared by every binding of it.
#[derive(Clone)]
pub struct PreparedStatement {
    template: Arc<SqlTemplate>,
    kind: StatementKind,
    executor: Arc<dyn StatementExecutor>,
    registry: Arc<TypeConverterRegistry>,
}

impl PreparedStatement {
    pub fn new(
        template: SqlTemplate,
        kind: StatementKind,
        executor: Arc<dyn StatementExecutor>,
        registry: Arc<TypeConverterRegistry>,
    ) -> Self {
        Self {
            template: Arc::new(template),
            kind,
            executor,
            registry,
        }
    }

    pub fn template(&self) -> &SqlTemplate {
        &self.template
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn registry(&self) -> &Arc<TypeConverterRegistry> {
        &self.registry
    }
}

impl fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.template.sql())
            .field("kind", &self.kind)
            .finish()
    }
}

/// A prepared statement together with a complete set of parameter values.
#[derive(Debug, Clone)]
pub struct BoundStatement {
    prepared: PreparedStatement,
    params: Arc<BoundParams>,
}

impl BoundStatement {
    pub fn sql(&self) -> &str {
        self.prepared.template.sql()
    }

    pub fn kind(&self) -> &StatementKind {
        &self.prepared.kind
    }

    pub fn params(&self) -> &BoundParams {
        &self.params
    }

    /// The timeout covers establishing the stream, not consuming it.
    async fn stream(&self, timeout: Duration) -> Result<ResultStream> {
        with_timeout(timeout, self.prepared.executor.execute_for_stream(&self.params)).await
    }

    async fn set(&self, timeout: Duration) -> Result<ResultSet> {
        with_timeout(timeout, self.prepared.executor.execute_for_set(&self.params)).await
    }

    async fn rows_affected(&self, timeout: Duration) -> Result<u64> {
        with_timeout(
            timeout,
            self.prepared.executor.execute_for_rows_affected(&self.params),
        )
        .await
    }

    async fn first_row(&self, timeout: Duration) -> Result<Option<Row>> {
        with_timeout(timeout, async {
            self.prepared
                .executor
                .execute_for_stream(&self.params)
                .await?
                .first_row()
                .await
        })
        .await
    }

    async fn value_opt<T, F>(&self, timeout: Duration, extractor: F) -> Result<Option<Option<T>>>
    where
        F: FnOnce(&Row) -> Result<Option<T>>,
    {
        match self.first_row(timeout).await? {
            Some(row) => extractor(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn key<T: 'static>(&self, timeout: Duration) -> Result<T> {
        let row = self
            .first_row(timeout)
            .await?
            .ok_or_else(|| RdbcError::InvalidState("statement generated no keys".into()))?;
        row.get::<T>(0)
    }
}

/// Built from a [`BoundStatement`] once all parameters are bound.
pub trait FromBound: Sized {
    fn from_bound(bound: BoundStatement) -> Self;
}

/// A statement template waiting for parameter values. Binding never changes
/// the statement; every bind yields a new parametrized value.
pub struct Statement<P> {
    prepared: PreparedStatement,
    _parametrized: PhantomData<fn() -> P>,
}

impl<P> Clone for Statement<P> {
    fn clone(&self) -> Self {
        Self {
            prepared: self.prepared.clone(),
            _parametrized: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Statement<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Statement").field(&self.prepared).finish()
    }
}

impl<P: FromBound> Statement<P> {
    pub fn new(prepared: PreparedStatement) -> Self {
        Self {
            prepared,
            _parametrized: PhantomData,
        }
    }

    pub fn sql(&self) -> &str {
        self.prepared.template.sql()
    }

    pub fn template(&self) -> &SqlTemplate {
        &self.prepared.template
    }

    pub fn parameter_names(&self) -> &[String] {
        self.prepared.template.parameter_names()
    }

    /// Binds values by parameter name; a leading `:` on a name is accepted.
    /// Every parameter needs a value and every name must exist. When a name
    /// repeats, the last value wins.
    pub fn bind<I, K>(&self, args: I) -> Result<P>
    where
        I: IntoIterator<Item = (K, Arg)>,
        K: AsRef<str>,
    {
        let template = &self.prepared.template;
        let mut by_name: HashMap<usize, Arg> = HashMap::new();
        for (name, arg) in args {
            let name = name.as_ref();
            let name = name.strip_prefix(':').unwrap_or(name);
            let index = template
                .index_of(name)
                .ok_or_else(|| RdbcError::UnknownParameter(name.to_string()))?;
            by_name.insert(index, arg);
        }
        let mut values = Vec::with_capacity(template.parameter_count());
        for (index, name) in template.parameter_names().iter().enumerate() {
            let arg = by_name
                .get(&index)
                .ok_or_else(|| RdbcError::MissingParameterValue(name.clone()))?;
            values.push(self.prepared.registry.encode(name, arg)?);
        }
        Ok(self.finish(values))
    }

    /// Binds values positionally, in template parameter order.
    pub fn bind_by_index<I>(&self, args: I) -> Result<P>
    where
        I: IntoIterator<Item = Arg>,
    {
        let names = self.prepared.template.parameter_names();
        let mut values = Vec::with_capacity(names.len());
        for (position, arg) in args.into_iter().enumerate() {
            let name = names
                .get(position)
                .ok_or_else(|| RdbcError::UnknownParameter(format!("#{}", position + 1)))?;
            values.push(self.prepared.registry.encode(name, &arg)?);
        }
        if let Some(unbound) = names.get(values.len()) {
            return Err(RdbcError::MissingParameterValue(unbound.clone()));
        }
        Ok(self.finish(values))
    }

    /// Only valid for templates without placeholders.
    pub fn no_params(&self) -> Result<P> {
        if let Some(first) = self.prepared.template.parameter_names().first() {
            return Err(RdbcError::MissingParameterValue(first.clone()));
        }
        Ok(self.finish(Vec::new()))
    }

    pub fn bind_async<I, K>(&self, args: I) -> Ready<Result<P>>
    where
        I: IntoIterator<Item = (K, Arg)>,
        K: AsRef<str>,
    {
        future::ready(self.bind(args))
    }

    pub fn bind_by_index_async<I>(&self, args: I) -> Ready<Result<P>>
    where
        I: IntoIterator<Item = Arg>,
    {
        future::ready(self.bind_by_index(args))
    }

    pub fn no_params_async(&self) -> Ready<Result<P>> {
        future::ready(self.no_params())
    }

    fn finish(&self, values: Vec<BoundValue>) -> P {
        P::from_bound(BoundStatement {
            prepared: self.prepared.clone(),
            params: Arc::new(BoundParams::new(values)),
        })
    }
}

/// Builds the `(name, Arg)` list taken by [`Statement::bind`].
///
/// ```ignore
/// let select = statement.bind(params! { "id" => 7i64, "name" => "bob" })?;
/// ```
#[macro_export]
macro_rules! params {
    ($($name:expr => $value:expr),+ $(,)?) => {
        vec![$(($name, $crate::Arg::new($value))),+]
    };
}

/// Builds the ordered `Arg` list taken by [`Statement::bind_by_index`].
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::Arg::new($value)),+]
    };
}

macro_rules! parametrized {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name(BoundStatement);

        impl FromBound for $name {
            fn from_bound(bound: BoundStatement) -> Self {
                Self(bound)
            }
        }

        impl $name {
            pub fn bound(&self) -> &BoundStatement {
                &self.0
            }
        }
    };
}

parametrized!(
    /// Bound `SELECT`.
    ParametrizedSelect
);
parametrized!(ParametrizedUpdate);
parametrized!(ParametrizedInsert);
parametrized!(
    /// Bound insert that yields the generated key columns as rows.
    ParametrizedReturningInsert
);
parametrized!(ParametrizedDelete);
parametrized!(ParametrizedDdl);
parametrized!(
    /// Bound statement of unknown shape; every execution flavour is available.
    ParametrizedAny
);

impl ParametrizedSelect {
    pub async fn execute_for_stream(&self, timeout: Duration) -> Result<ResultStream> {
        self.0.stream(timeout).await
    }

    pub async fn execute_for_set(&self, timeout: Duration) -> Result<ResultSet> {
        self.0.set(timeout).await
    }

    pub async fn execute_for_first_row(&self, timeout: Duration) -> Result<Option<Row>> {
        self.0.first_row(timeout).await
    }

    /// `None` when there is no row or the extractor yields `None`.
    pub async fn execute_for_value<T, F>(&self, timeout: Duration, extractor: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row) -> Result<Option<T>>,
    {
        Ok(self.0.value_opt(timeout, extractor).await?.flatten())
    }

    /// `None` when there is no row, `Some(None)` when the value is NULL.
    pub async fn execute_for_value_opt<T, F>(
        &self,
        timeout: Duration,
        extractor: F,
    ) -> Result<Option<Option<T>>>
    where
        F: FnOnce(&Row) -> Result<Option<T>>,
    {
        self.0.value_opt(timeout, extractor).await
    }
}

macro_rules! impl_dml {
    ($($name:ident),+) => {
        $(
            impl $name {
                pub async fn execute(&self, timeout: Duration) -> Result<()> {
                    self.0.rows_affected(timeout).await.map(|_| ())
                }

                pub async fn execute_for_rows_affected(&self, timeout: Duration) -> Result<u64> {
                    self.0.rows_affected(timeout).await
                }
            }
        )+
    };
}

impl_dml!(
    ParametrizedUpdate,
    ParametrizedInsert,
    ParametrizedDelete,
    ParametrizedReturningInsert
);

impl ParametrizedReturningInsert {
    pub async fn execute_for_keys_set(&self, timeout: Duration) -> Result<ResultSet> {
        self.0.set(timeout).await
    }

    pub async fn execute_for_keys_stream(&self, timeout: Duration) -> Result<ResultStream> {
        self.0.stream(timeout).await
    }

    /// First column of the first generated key row.
    pub async fn execute_for_key<T: 'static>(&self, timeout: Duration) -> Result<T> {
        self.0.key(timeout).await
    }

    pub async fn execute_for_int_key(&self, timeout: Duration) -> Result<i32> {
        self.0.key(timeout).await
    }

    pub async fn execute_for_long_key(&self, timeout: Duration) -> Result<i64> {
        self.0.key(timeout).await
    }

    pub async fn execute_for_uuid_key(&self, timeout: Duration) -> Result<Uuid> {
        self.0.key(timeout).await
    }
}

impl ParametrizedDdl {
    pub async fn execute(&self, timeout: Duration) -> Result<()> {
        self.0.rows_affected(timeout).await.map(|_| ())
    }
}

impl ParametrizedAny {
    pub async fn execute(&self, timeout: Duration) -> Result<()> {
        self.0.rows_affected(timeout).await.map(|_| ())
    }

    pub async fn execute_for_rows_affected(&self, timeout: Duration) -> Result<u64> {
        self.0.rows_affected(timeout).await
    }

    pub async fn execute_for_set(&self, timeout: Duration) -> Result<ResultSet> {
        self.0.set(timeout).await
    }

    pub async fn execute_for_stream(&self, timeout: Duration) -> Result<ResultStream> {
        self.0.stream(timeout).await
    }

    pub async fn execute_for_first_row(&self, timeout: Duration) -> Result<Option<Row>> {
        self.0.first_row(timeout).await
    }

    pub async fn execute_for_value<T, F>(&self, timeout: Duration, extractor: F) -> Result<Option<T>>
    where
        F: FnOnce(&Row) -> Result<Option<T>>,
    {
        Ok(self.0.value_opt(timeout, extractor).await?.flatten())
    }

    pub async fn execute_for_value_opt<T, F>(
        &self,
        timeout: Duration,
        extractor: F,
    ) -> Result<Option<Option<T>>>
    where
        F: FnOnce(&Row) -> Result<Option<T>>,
    {
        self.0.value_opt(timeout, extractor).await
    }
}

pub type Select = Statement<ParametrizedSelect>;
pub type Update = Statement<ParametrizedUpdate>;
pub type Insert = Statement<ParametrizedInsert>;
pub type ReturningInsert = Statement<ParametrizedReturningInsert>;
pub type Delete = Statement<ParametrizedDelete>;
pub type Ddl = Statement<ParametrizedDdl>;
pub type AnyStatement = Statement<ParametrizedAny>;
