pub mod connection;
pub mod factory;
pub mod statement;
pub mod stream;
pub mod template;
pub mod timeout;

pub use connection::Connection;
pub use factory::{with_connection, with_transaction, ConnectionFactory, ConnectionFactoryExt};
pub use rdbc_core::*;
pub use statement::{
    AnyStatement, BoundParams, BoundStatement, Ddl, Delete, FromBound, Insert,
    ParametrizedAny, ParametrizedDdl, ParametrizedDelete, ParametrizedInsert,
    ParametrizedReturningInsert, ParametrizedSelect, ParametrizedUpdate, PreparedStatement,
    ReturningInsert, Select, Statement, StatementExecutor, StatementKind, Update,
};
pub use stream::{ResultStream, RowPublisher, RowSink, Subscription, Summary};
pub use template::SqlTemplate;
pub use timeout::with_timeout;

#[cfg(test)]
mod tests;
