//! Runs plans against a [`Store`].
//!
//! Mutations work on a copy of the affected table which replaces the
//! original only when every row passed its constraints, so a failed
//! statement leaves the store untouched.

use crate::catalog::{type_name, ColumnDef, Store, Table, TableSchema, UniqueConstraint};
use crate::planner::{
    CompareOp, Condition, CreateTablePlan, DeletePlan, DropTablePlan, InsertPlan, OrderKey,
    OrderTarget, Plan, ProjectionItem, ScalarExpr, SelectPlan, UpdatePlan,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rdbc_core::{
    BoundValue, ColumnMetadata, Decimal, RdbcError, Result, RowMetadata, SqlNumeric, SqlType,
    SqlValue, TypeConverterRegistry, Warning,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub metadata: RowMetadata,
    pub rows: Vec<Vec<SqlValue>>,
    pub rows_affected: u64,
    pub warnings: Vec<Warning>,
}

impl QueryResult {
    fn count(rows_affected: u64) -> Self {
        Self {
            metadata: RowMetadata::new(Vec::new()),
            rows: Vec::new(),
            rows_affected,
            warnings: Vec::new(),
        }
    }
}

/// `key_columns` overrides the `RETURNING` list of an insert.
pub fn execute(
    store: &mut Store,
    plan: &Plan,
    params: &[BoundValue],
    registry: &TypeConverterRegistry,
    key_columns: Option<&[String]>,
) -> Result<QueryResult> {
    match plan {
        Plan::CreateTable(create) => create_table(store, create),
        Plan::DropTable(drop) => drop_tables(store, drop),
        Plan::Insert(insert) => insert_rows(store, insert, params, registry, key_columns),
        Plan::Select(select) => select_rows(store, select, params, registry),
        Plan::Update(update) => update_rows(store, update, params, registry),
        Plan::Delete(delete) => delete_rows(store, delete, params),
    }
}

fn create_table(store: &mut Store, plan: &CreateTablePlan) -> Result<QueryResult> {
    if store.contains_table(&plan.table) && plan.if_not_exists {
        let mut result = QueryResult::count(0);
        result.warnings.push(Warning::new(
            format!("relation \"{}\" already exists, skipping", plan.table),
            "42P07",
        ));
        return Ok(result);
    }
    let mut seen = HashSet::new();
    for column in &plan.columns {
        if !seen.insert(column.name.as_str()) {
            return Err(RdbcError::InvalidQuery(format!(
                "column \"{}\" specified more than once",
                column.name
            )));
        }
    }
    let mut schema = TableSchema {
        name: plan.table.clone(),
        columns: plan.columns.clone(),
        constraints: Vec::new(),
    };
    for (columns, primary) in &plan.unique_keys {
        let name = if *primary {
            format!("{}_pkey", plan.table)
        } else {
            format!("{}_{}_key", plan.table, columns.join("_"))
        };
        let columns = columns
            .iter()
            .map(|c| schema.column(c).map(|(idx, _)| idx))
            .collect::<Result<Vec<_>>>()?;
        schema.constraints.push(UniqueConstraint {
            name,
            columns,
            primary: *primary,
        });
    }
    store.create_table(schema)?;
    Ok(QueryResult::count(0))
}

fn drop_tables(store: &mut Store, plan: &DropTablePlan) -> Result<QueryResult> {
    let mut result = QueryResult::count(0);
    let mut existing = Vec::with_capacity(plan.tables.len());
    for table in &plan.tables {
        if store.contains_table(table) {
            existing.push(table);
        } else if plan.if_exists {
            result.warnings.push(Warning::new(
                format!("table \"{table}\" does not exist, skipping"),
                "00000",
            ));
        } else {
            return Err(RdbcError::InvalidQuery(format!(
                "table \"{table}\" does not exist"
            )));
        }
    }
    for table in existing {
        store.drop_table(table)?;
    }
    Ok(result)
}

fn insert_rows(
    store: &mut Store,
    plan: &InsertPlan,
    params: &[BoundValue],
    registry: &TypeConverterRegistry,
    key_columns: Option<&[String]>,
) -> Result<QueryResult> {
    let mut table = store.table(&plan.table)?.clone();
    let targets: Vec<usize> = if plan.columns.is_empty() {
        (0..table.schema.columns.len()).collect()
    } else {
        let mut targets = Vec::with_capacity(plan.columns.len());
        for name in &plan.columns {
            let (idx, _) = table.schema.column(name)?;
            if targets.contains(&idx) {
                return Err(RdbcError::InvalidQuery(format!(
                    "column \"{name}\" specified more than once"
                )));
            }
            targets.push(idx);
        }
        targets
    };

    let ctx = EvalContext {
        schema: None,
        params,
    };
    let mut changed = Vec::with_capacity(plan.rows.len());
    for exprs in &plan.rows {
        if exprs.len() > targets.len() {
            return Err(RdbcError::InvalidQuery(
                "INSERT has more expressions than target columns".into(),
            ));
        }
        let mut row = vec![SqlValue::Null; table.schema.columns.len()];
        let mut assigned = vec![false; row.len()];
        for (&idx, expr) in targets.iter().zip(exprs) {
            let value = ctx.eval(expr, &[])?;
            row[idx] = coerce(value, &table.schema.columns[idx], registry)?;
            assigned[idx] = true;
        }
        for idx in 0..row.len() {
            if assigned[idx] {
                continue;
            }
            let column = table.schema.columns[idx].clone();
            if column.serial {
                let next = table.next_serial(idx);
                row[idx] = coerce(SqlValue::Int64(next), &column, registry)?;
            } else if let Some(default) = &column.default {
                row[idx] = coerce(default.clone(), &column, registry)?;
            }
        }
        table.rows.push(row);
        changed.push(table.rows.len() - 1);
    }
    table.check_constraints(&changed)?;

    let returning: Vec<String> = match key_columns {
        Some(keys) if !keys.is_empty() => keys.iter().map(|k| k.to_lowercase()).collect(),
        _ => plan.returning.clone(),
    };
    let mut result = QueryResult::count(changed.len() as u64);
    if !returning.is_empty() {
        let mut indices = Vec::with_capacity(returning.len());
        let mut columns = Vec::with_capacity(returning.len());
        for name in &returning {
            let (idx, column) = table.schema.column(name)?;
            indices.push(idx);
            columns.push(column_metadata(column));
        }
        result.metadata = RowMetadata::new(columns);
        result.rows = changed
            .iter()
            .map(|&row| indices.iter().map(|&c| table.rows[row][c].clone()).collect())
            .collect();
    }
    store.replace_table(table);
    Ok(result)
}

fn select_rows(
    store: &Store,
    plan: &SelectPlan,
    params: &[BoundValue],
    registry: &TypeConverterRegistry,
) -> Result<QueryResult> {
    let table = plan.table.as_deref().map(|name| store.table(name)).transpose()?;
    let schema = table.map(|t| &t.schema);
    let ctx = EvalContext { schema, params };
    let empty_row: Vec<SqlValue> = Vec::new();
    let source: Vec<&Vec<SqlValue>> = match table {
        Some(table) => table.rows.iter().collect(),
        None => vec![&empty_row],
    };
    let mut matched = Vec::with_capacity(source.len());
    for row in source {
        if ctx.matches(plan.filter.as_ref(), row)? {
            matched.push(row);
        }
    }

    let counts = plan
        .projection
        .iter()
        .filter(|item| matches!(item, ProjectionItem::CountAll { .. }))
        .count();
    let (columns, mut rows) = if counts > 0 {
        if counts != plan.projection.len() {
            return Err(RdbcError::InvalidQuery(
                "COUNT(*) cannot be combined with other select items without GROUP BY".into(),
            ));
        }
        let columns = plan
            .projection
            .iter()
            .filter_map(|item| match item {
                ProjectionItem::CountAll { name } => Some(
                    ColumnMetadata::new(name.clone(), type_name(SqlType::Int64))
                        .with_native_type(SqlType::Int64),
                ),
                _ => None,
            })
            .collect::<Vec<_>>();
        let count = SqlValue::Int64(matched.len() as i64);
        let row = vec![count; columns.len()];
        (columns, vec![(row, Vec::new())])
    } else {
        let columns = ctx.output_columns(&plan.projection)?;
        let mut rows = Vec::with_capacity(matched.len());
        for source in matched {
            rows.push((ctx.project(&plan.projection, source)?, source.clone()));
        }
        (columns, rows)
    };

    if !plan.order_by.is_empty() {
        let keys = plan
            .order_by
            .iter()
            .map(|key| resolve_order_key(key, &columns, schema))
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by(|(out_a, src_a), (out_b, src_b)| {
            for (key, asc) in &keys {
                let (a, b) = match key {
                    SortColumn::Output(idx) => (&out_a[*idx], &out_b[*idx]),
                    SortColumn::Source(idx) => (&src_a[*idx], &src_b[*idx]),
                };
                let ordering = sort_order(a, b);
                let ordering = if *asc { ordering } else { ordering.reverse() };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let offset = ctx.row_count(plan.offset.as_ref(), registry, "OFFSET")?.unwrap_or(0);
    let limit = ctx.row_count(plan.limit.as_ref(), registry, "LIMIT")?;
    let rows: Vec<Vec<SqlValue>> = rows
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(out, _)| out)
        .collect();
    Ok(QueryResult {
        metadata: RowMetadata::new(columns),
        rows,
        rows_affected: 0,
        warnings: Vec::new(),
    })
}

fn update_rows(
    store: &mut Store,
    plan: &UpdatePlan,
    params: &[BoundValue],
    registry: &TypeConverterRegistry,
) -> Result<QueryResult> {
    let mut table = store.table(&plan.table)?.clone();
    let mut assignments = Vec::with_capacity(plan.assignments.len());
    for (name, expr) in &plan.assignments {
        let (idx, _) = table.schema.column(name)?;
        assignments.push((idx, expr));
    }
    let ctx = EvalContext {
        schema: Some(&table.schema),
        params,
    };
    let mut updates = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        if !ctx.matches(plan.filter.as_ref(), row)? {
            continue;
        }
        let mut updated = row.clone();
        for (column, expr) in &assignments {
            let value = ctx.eval(expr, row)?;
            updated[*column] = coerce(value, &table.schema.columns[*column], registry)?;
        }
        updates.push((idx, updated));
    }
    if updates.is_empty() {
        return Ok(QueryResult::count(0));
    }
    let changed: Vec<usize> = updates.iter().map(|(idx, _)| *idx).collect();
    for (idx, row) in updates {
        table.rows[idx] = row;
    }
    table.check_constraints(&changed)?;
    store.replace_table(table);
    Ok(QueryResult::count(changed.len() as u64))
}

fn delete_rows(store: &mut Store, plan: &DeletePlan, params: &[BoundValue]) -> Result<QueryResult> {
    let mut table: Table = store.table(&plan.table)?.clone();
    let ctx = EvalContext {
        schema: Some(&table.schema),
        params,
    };
    let mut keep = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        keep.push(!ctx.matches(plan.filter.as_ref(), row)?);
    }
    let removed = keep.iter().filter(|k| !**k).count();
    if removed == 0 {
        return Ok(QueryResult::count(0));
    }
    let mut keep = keep.into_iter();
    table.rows.retain(|_| keep.next().unwrap_or(true));
    store.replace_table(table);
    Ok(QueryResult::count(removed as u64))
}

enum SortColumn {
    Output(usize),
    Source(usize),
}

fn resolve_order_key(
    key: &OrderKey,
    columns: &[ColumnMetadata],
    schema: Option<&TableSchema>,
) -> Result<(SortColumn, bool)> {
    let column = match &key.target {
        OrderTarget::Position(position) if *position <= columns.len() => {
            SortColumn::Output(position - 1)
        }
        OrderTarget::Position(position) => {
            return Err(RdbcError::InvalidQuery(format!(
                "ORDER BY position {position} is not in select list"
            )))
        }
        OrderTarget::Name(name) => match columns.iter().position(|c| &c.name == name) {
            Some(idx) => SortColumn::Output(idx),
            None => match schema.and_then(|s| s.column_index(name)) {
                Some(idx) => SortColumn::Source(idx),
                None => {
                    return Err(RdbcError::InvalidQuery(format!(
                        "column \"{name}\" does not exist"
                    )))
                }
            },
        },
    };
    Ok((column, key.asc))
}

/// Ascending order with NULLs last.
fn sort_order(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare(a, b).ok().flatten().unwrap_or(Ordering::Equal),
    }
}

struct EvalContext<'a> {
    schema: Option<&'a TableSchema>,
    params: &'a [BoundValue],
}

impl EvalContext<'_> {
    fn eval(&self, expr: &ScalarExpr, row: &[SqlValue]) -> Result<SqlValue> {
        match expr {
            ScalarExpr::Literal(value) => Ok(value.clone()),
            ScalarExpr::Param(idx) => self
                .params
                .get(*idx)
                .map(|p| p.value.clone())
                .ok_or_else(|| {
                    RdbcError::InvalidQuery(format!("there is no parameter ${}", idx + 1))
                }),
            ScalarExpr::Column(name) => {
                let schema = self.schema.ok_or_else(|| {
                    RdbcError::InvalidQuery(format!("column \"{name}\" does not exist"))
                })?;
                let (idx, _) = schema.column(name)?;
                row.get(idx).cloned().ok_or_else(|| {
                    RdbcError::InvalidQuery(format!("column \"{name}\" does not exist"))
                })
            }
        }
    }

    fn matches(&self, filter: Option<&Condition>, row: &[SqlValue]) -> Result<bool> {
        match filter {
            Some(condition) => Ok(self.test(condition, row)? == Some(true)),
            None => Ok(true),
        }
    }

    /// Three-valued: `None` is SQL unknown.
    fn test(&self, condition: &Condition, row: &[SqlValue]) -> Result<Option<bool>> {
        match condition {
            Condition::Compare { left, op, right } => {
                let left = self.eval(left, row)?;
                let right = self.eval(right, row)?;
                Ok(compare(&left, &right)?.map(|ordering| match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::NotEq => ordering != Ordering::Equal,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::Gte => ordering != Ordering::Less,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::Lte => ordering != Ordering::Greater,
                }))
            }
            Condition::IsNull { operand, negated } => {
                Ok(Some(self.eval(operand, row)?.is_null() != *negated))
            }
            Condition::Not(inner) => Ok(self.test(inner, row)?.map(|v| !v)),
            Condition::And(left, right) => {
                match (self.test(left, row)?, self.test(right, row)?) {
                    (Some(false), _) | (_, Some(false)) => Ok(Some(false)),
                    (Some(true), Some(true)) => Ok(Some(true)),
                    _ => Ok(None),
                }
            }
            Condition::Or(left, right) => match (self.test(left, row)?, self.test(right, row)?) {
                (Some(true), _) | (_, Some(true)) => Ok(Some(true)),
                (Some(false), Some(false)) => Ok(Some(false)),
                _ => Ok(None),
            },
        }
    }

    fn output_columns(&self, projection: &[ProjectionItem]) -> Result<Vec<ColumnMetadata>> {
        let mut columns = Vec::new();
        for item in projection {
            match item {
                ProjectionItem::AllColumns => {
                    let schema = self.schema.ok_or_else(|| {
                        RdbcError::InvalidQuery("SELECT * with no tables specified is not valid".into())
                    })?;
                    columns.extend(schema.columns.iter().map(column_metadata));
                }
                ProjectionItem::Expr { expr, name } => {
                    let sql_type = match expr {
                        ScalarExpr::Column(column) => {
                            let schema = self.schema.ok_or_else(|| {
                                RdbcError::InvalidQuery(format!("column \"{column}\" does not exist"))
                            })?;
                            Some(schema.column(column)?.1.sql_type)
                        }
                        ScalarExpr::Literal(value) => value.sql_type(),
                        ScalarExpr::Param(idx) => self.params.get(*idx).and_then(|p| p.sql_type),
                    };
                    let column = match sql_type {
                        Some(sql_type) => ColumnMetadata::new(name.clone(), type_name(sql_type))
                            .with_native_type(sql_type),
                        None => ColumnMetadata::new(name.clone(), "UNKNOWN"),
                    };
                    columns.push(column);
                }
                ProjectionItem::CountAll { .. } => {}
            }
        }
        Ok(columns)
    }

    fn project(&self, projection: &[ProjectionItem], row: &[SqlValue]) -> Result<Vec<SqlValue>> {
        let mut out = Vec::new();
        for item in projection {
            match item {
                ProjectionItem::AllColumns => out.extend(row.iter().cloned()),
                ProjectionItem::Expr { expr, .. } => out.push(self.eval(expr, row)?),
                ProjectionItem::CountAll { .. } => {}
            }
        }
        Ok(out)
    }

    /// Evaluates a LIMIT or OFFSET argument; NULL means no bound.
    fn row_count(
        &self,
        expr: Option<&ScalarExpr>,
        registry: &TypeConverterRegistry,
        clause: &str,
    ) -> Result<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        let value = self.eval(expr, &[])?;
        if value.is_null() {
            return Ok(None);
        }
        let count = registry
            .convert::<i64>(&value)
            .map_err(|_| RdbcError::InvalidQuery(format!("{clause} must be an integer")))?;
        usize::try_from(count)
            .map(Some)
            .map_err(|_| RdbcError::InvalidQuery(format!("{clause} must not be negative")))
    }
}

fn column_metadata(column: &ColumnDef) -> ColumnMetadata {
    ColumnMetadata::new(column.name.clone(), column.db_type.clone()).with_native_type(column.sql_type)
}

/// Converts `value` to the column's native type through the registry.
fn coerce(value: SqlValue, column: &ColumnDef, registry: &TypeConverterRegistry) -> Result<SqlValue> {
    if value.is_null() || value.sql_type() == Some(column.sql_type) {
        return Ok(value);
    }
    let converted = match column.sql_type {
        SqlType::Bool => registry.convert::<bool>(&value).map(SqlValue::Bool),
        SqlType::Char => registry.convert::<char>(&value).map(SqlValue::Char),
        SqlType::Int16 => integer(&value, registry, i16::MIN.into(), i16::MAX.into())
            .and_then(|_| registry.convert::<i16>(&value))
            .map(SqlValue::Int16),
        SqlType::Int32 => integer(&value, registry, i32::MIN.into(), i32::MAX.into())
            .and_then(|_| registry.convert::<i32>(&value))
            .map(SqlValue::Int32),
        SqlType::Int64 => registry.convert::<i64>(&value).map(SqlValue::Int64),
        SqlType::Float32 => registry.convert::<f32>(&value).map(SqlValue::Float32),
        SqlType::Float64 => registry.convert::<f64>(&value).map(SqlValue::Float64),
        SqlType::Decimal => registry.convert::<Decimal>(&value).map(SqlValue::Decimal),
        SqlType::Numeric => registry.convert::<SqlNumeric>(&value).map(SqlValue::Numeric),
        SqlType::String => registry.convert::<String>(&value).map(SqlValue::String),
        SqlType::Bytes => registry.convert::<Vec<u8>>(&value).map(SqlValue::Bytes),
        SqlType::Uuid => registry.convert::<Uuid>(&value).map(SqlValue::Uuid),
        SqlType::Instant => registry
            .convert::<DateTime<Utc>>(&value)
            .map(SqlValue::Instant),
        SqlType::LocalDateTime => registry
            .convert::<NaiveDateTime>(&value)
            .map(SqlValue::LocalDateTime),
        SqlType::Date => registry.convert::<NaiveDate>(&value).map(SqlValue::Date),
        SqlType::Time => registry.convert::<NaiveTime>(&value).map(SqlValue::Time),
    };
    converted.map_err(|err| {
        RdbcError::InvalidQuery(format!(
            "invalid value {value} for column \"{}\" of type {}: {err}",
            column.name, column.db_type
        ))
    })
}

/// Range check ahead of the narrowing converters, which wrap.
fn integer(value: &SqlValue, registry: &TypeConverterRegistry, min: i64, max: i64) -> Result<()> {
    let wide = registry.convert::<i64>(value)?;
    if wide < min || wide > max {
        return Err(RdbcError::Conversion(format!("{wide} is out of range")));
    }
    Ok(())
}

/// Orders two values; `Ok(None)` when either is NULL, an error when the
/// types cannot be compared.
fn compare(a: &SqlValue, b: &SqlValue) -> Result<Option<Ordering>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    if let (Some(x), Some(y)) = (exact(a), exact(b)) {
        return Ok(Some(x.cmp(&y)));
    }
    if let (Some(x), Some(y)) = (approximate(a), approximate(b)) {
        return Ok(x.partial_cmp(&y));
    }
    let ordering = match (a, b) {
        (SqlValue::Bool(x), SqlValue::Bool(y)) => x.cmp(y),
        (SqlValue::String(x), SqlValue::String(y)) => x.cmp(y),
        (SqlValue::Char(x), SqlValue::Char(y)) => x.cmp(y),
        (SqlValue::Char(x), SqlValue::String(y)) => x.to_string().as_str().cmp(y.as_str()),
        (SqlValue::String(x), SqlValue::Char(y)) => x.as_str().cmp(y.to_string().as_str()),
        (SqlValue::Bytes(x), SqlValue::Bytes(y)) => x.cmp(y),
        (SqlValue::Uuid(x), SqlValue::Uuid(y)) => x.cmp(y),
        (SqlValue::Uuid(x), SqlValue::String(y)) => x.cmp(&parse_uuid(y)?),
        (SqlValue::String(x), SqlValue::Uuid(y)) => parse_uuid(x)?.cmp(y),
        (SqlValue::Instant(x), SqlValue::Instant(y)) => x.cmp(y),
        (SqlValue::LocalDateTime(x), SqlValue::LocalDateTime(y)) => x.cmp(y),
        (SqlValue::Date(x), SqlValue::Date(y)) => x.cmp(y),
        (SqlValue::Time(x), SqlValue::Time(y)) => x.cmp(y),
        _ => {
            return Err(RdbcError::InvalidQuery(format!(
                "cannot compare {} with {}",
                type_label(a),
                type_label(b)
            )))
        }
    };
    Ok(Some(ordering))
}

fn exact(value: &SqlValue) -> Option<Decimal> {
    match value {
        SqlValue::Int16(v) => Some(Decimal::from(*v)),
        SqlValue::Int32(v) => Some(Decimal::from(*v)),
        SqlValue::Int64(v) => Some(Decimal::from(*v)),
        SqlValue::Decimal(v) => Some(*v),
        SqlValue::Numeric(SqlNumeric::Finite(v)) => Some(*v),
        _ => None,
    }
}

fn approximate(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Float32(v) => Some(f64::from(*v)),
        SqlValue::Float64(v) => Some(*v),
        SqlValue::Numeric(v) => Some(v.to_f64()),
        other => exact(other).map(|d| d.to_f64()),
    }
}

fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text)
        .map_err(|_| RdbcError::InvalidQuery(format!("invalid input syntax for type uuid: \"{text}\"")))
}

fn type_label(value: &SqlValue) -> &'static str {
    value.sql_type().map(type_name).unwrap_or("NULL")
}

#[cfg(test)]
mod tests {
    use super::{execute, QueryResult};
    use crate::catalog::Store;
    use crate::planner::{parse_sql, plan_statement};
    use rdbc_core::{BoundValue, RdbcError, SqlValue, TypeConverterRegistry};

    fn run(store: &mut Store, sql: &str, params: &[SqlValue]) -> rdbc_core::Result<QueryResult> {
        let plan = plan_statement(&parse_sql(sql)?)?;
        let params: Vec<BoundValue> = params.iter().cloned().map(BoundValue::new).collect();
        execute(store, &plan, &params, &TypeConverterRegistry::standard(), None)
    }

    fn seeded() -> Store {
        let mut store = Store::new();
        run(
            &mut store,
            "CREATE TABLE items (id SERIAL PRIMARY KEY, name TEXT NOT NULL, qty INT, price NUMERIC)",
            &[],
        )
        .expect("create");
        run(
            &mut store,
            "INSERT INTO items (name, qty, price) VALUES ('bolt', 10, 0.25), ('nut', NULL, 0.1), ('gear', 3, 12.5)",
            &[],
        )
        .expect("insert");
        store
    }

    #[test]
    fn filters_with_three_valued_logic() {
        let mut store = seeded();
        let result = run(&mut store, "SELECT name FROM items WHERE qty > $1 OR qty IS NULL", &[
            SqlValue::Int32(5),
        ])
        .expect("select");
        let names: Vec<_> = result.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            names,
            vec![SqlValue::String("bolt".into()), SqlValue::String("nut".into())]
        );
        let result = run(&mut store, "SELECT name FROM items WHERE NOT qty > 5", &[]).expect("select");
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn orders_with_nulls_last_and_applies_limit() {
        let mut store = seeded();
        let result = run(
            &mut store,
            "SELECT id, qty FROM items ORDER BY qty LIMIT 2 OFFSET 1",
            &[],
        )
        .expect("select");
        assert_eq!(
            result.rows,
            vec![
                vec![SqlValue::Int32(1), SqlValue::Int32(10)],
                vec![SqlValue::Int32(2), SqlValue::Null],
            ]
        );
        let result = run(&mut store, "SELECT name FROM items ORDER BY price DESC", &[]).expect("select");
        assert_eq!(result.rows[0], vec![SqlValue::String("gear".into())]);
    }

    #[test]
    fn counts_rows() {
        let mut store = seeded();
        let result = run(&mut store, "SELECT COUNT(*) AS n FROM items WHERE qty IS NOT NULL", &[])
            .expect("count");
        assert_eq!(result.metadata.columns[0].name, "n");
        assert_eq!(result.rows, vec![vec![SqlValue::Int64(2)]]);
    }

    #[test]
    fn failed_update_leaves_table_untouched() {
        let mut store = seeded();
        let version = store.version();
        let err = run(&mut store, "UPDATE items SET name = NULL WHERE qty = 3", &[]).expect_err("not null");
        assert!(matches!(err, RdbcError::ConstraintViolation { .. }));
        assert_eq!(store.version(), version);
        let updated = run(&mut store, "UPDATE items SET qty = qty WHERE qty IS NULL", &[]).expect("update");
        assert_eq!(updated.rows_affected, 1);
        let deleted = run(&mut store, "DELETE FROM items WHERE price < 1", &[]).expect("delete");
        assert_eq!(deleted.rows_affected, 2);
    }

    #[test]
    fn rejects_incomparable_and_unknown_columns() {
        let mut store = seeded();
        assert!(matches!(
            run(&mut store, "SELECT * FROM items WHERE name = 1", &[]),
            Err(RdbcError::InvalidQuery(_))
        ));
        assert!(matches!(
            run(&mut store, "SELECT missing FROM items", &[]),
            Err(RdbcError::InvalidQuery(_))
        ));
        assert!(matches!(
            run(&mut store, "INSERT INTO items (qty) VALUES (99999999999)", &[]),
            Err(RdbcError::InvalidQuery(_))
        ));
    }
}
