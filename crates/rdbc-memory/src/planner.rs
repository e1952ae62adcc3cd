//! Turns parsed `sqlparser` statements into executable plans.
//!
//! Only the subset the in-memory store understands is planned; everything
//! else is rejected with `InvalidQuery`.

use crate::catalog::{parse_column_type, ColumnDef};
use rdbc_core::{Decimal, RdbcError, Result, SqlValue};
use sqlparser::ast::{
    BinaryOperator, ColumnOption, Expr, FromTable, Ident, ObjectName, ObjectType, OrderByExpr,
    SelectItem, SetExpr, Statement, TableFactor, TableWithJoins, UnaryOperator, Value,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Parses exactly one statement.
pub fn parse_sql(sql: &str) -> Result<Statement> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| RdbcError::InvalidQuery(e.to_string()))?;
    let mut statements = statements.into_iter();
    match (statements.next(), statements.next()) {
        (Some(statement), None) => Ok(statement),
        (None, _) => Err(invalid("empty statement")),
        (Some(_), Some(_)) => Err(invalid("only one statement per call is supported")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    CreateTable(CreateTablePlan),
    DropTable(DropTablePlan),
    Insert(InsertPlan),
    Select(SelectPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
}

/// Privilege a plan needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Admin,
}

impl Plan {
    pub fn access(&self) -> Access {
        match self {
            Plan::Select(_) => Access::Read,
            Plan::Insert(_) | Plan::Update(_) | Plan::Delete(_) => Access::Write,
            Plan::CreateTable(_) | Plan::DropTable(_) => Access::Admin,
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Plan::Select(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Plan::CreateTable(_) => "CREATE TABLE",
            Plan::DropTable(_) => "DROP TABLE",
            Plan::Insert(_) => "INSERT",
            Plan::Select(_) => "SELECT",
            Plan::Update(_) => "UPDATE",
            Plan::Delete(_) => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTablePlan {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
    /// Unique keys by column name, `true` for the primary key.
    pub unique_keys: Vec<(Vec<String>, bool)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTablePlan {
    pub tables: Vec<String>,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ScalarExpr>>,
    /// Columns listed in a `RETURNING` clause.
    pub returning: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Column(String),
    Literal(SqlValue),
    /// 0-based index into the bound parameters.
    Param(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        left: ScalarExpr,
        op: CompareOp,
        right: ScalarExpr,
    },
    IsNull {
        operand: ScalarExpr,
        negated: bool,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionItem {
    AllColumns,
    Expr { expr: ScalarExpr, name: String },
    CountAll { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Name(String),
    /// 1-based output column position.
    Position(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderKey {
    pub target: OrderTarget,
    pub asc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    /// `None` for a `SELECT` without `FROM`.
    pub table: Option<String>,
    pub projection: Vec<ProjectionItem>,
    pub filter: Option<Condition>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<ScalarExpr>,
    pub offset: Option<ScalarExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePlan {
    pub table: String,
    pub assignments: Vec<(String, ScalarExpr)>,
    pub filter: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeletePlan {
    pub table: String,
    pub filter: Option<Condition>,
}

pub fn plan_statement(stmt: &Statement) -> Result<Plan> {
    match stmt {
        Statement::CreateTable {
            name,
            columns,
            constraints,
            if_not_exists,
            ..
        } => {
            let mut cols = Vec::with_capacity(columns.len());
            let mut unique_keys = Vec::new();
            for column in columns {
                let name = ident_name(&column.name);
                let db_type = column.data_type.to_string().to_ascii_uppercase();
                let (sql_type, serial) = parse_column_type(&db_type)?;
                let mut def = ColumnDef {
                    name: name.clone(),
                    db_type,
                    sql_type,
                    not_null: serial,
                    serial,
                    default: None,
                };
                for option in &column.options {
                    match &option.option {
                        ColumnOption::Null => def.not_null = false,
                        ColumnOption::NotNull => def.not_null = true,
                        ColumnOption::Unique { is_primary, .. } => {
                            if *is_primary {
                                def.not_null = true;
                            }
                            unique_keys.push((vec![name.clone()], *is_primary));
                        }
                        ColumnOption::Default(expr) => match plan_scalar(expr)? {
                            ScalarExpr::Literal(value) => def.default = Some(value),
                            _ => return Err(invalid("column defaults must be literals")),
                        },
                        other => {
                            return Err(invalid(format!("column option {other} is not supported")))
                        }
                    }
                }
                cols.push(def);
            }
            for constraint in constraints {
                unique_keys.push(plan_table_constraint(&constraint.to_string())?);
            }
            if unique_keys.iter().filter(|(_, primary)| *primary).count() > 1 {
                return Err(invalid("multiple primary keys are not allowed"));
            }
            for (key, primary) in &unique_keys {
                for column in key {
                    let def = cols
                        .iter_mut()
                        .find(|c| c.name == *column)
                        .ok_or_else(|| invalid(format!("column \"{column}\" named in key does not exist")))?;
                    if *primary {
                        def.not_null = true;
                    }
                }
            }
            Ok(Plan::CreateTable(CreateTablePlan {
                table: object_name(name),
                if_not_exists: *if_not_exists,
                columns: cols,
                unique_keys,
            }))
        }
        Statement::Drop {
            object_type,
            if_exists,
            names,
            ..
        } => {
            if *object_type != ObjectType::Table {
                return Err(invalid(format!("DROP {object_type} is not supported")));
            }
            Ok(Plan::DropTable(DropTablePlan {
                tables: names.iter().map(object_name).collect(),
                if_exists: *if_exists,
            }))
        }
        Statement::Insert {
            table_name,
            columns,
            source,
            returning,
            ..
        } => {
            let source = source
                .as_ref()
                .ok_or_else(|| invalid("INSERT requires a VALUES list"))?;
            let values = match &*source.body {
                SetExpr::Values(values) => values,
                _ => return Err(invalid("only INSERT ... VALUES is supported")),
            };
            let mut rows = Vec::with_capacity(values.rows.len());
            for row in &values.rows {
                rows.push(row.iter().map(plan_scalar).collect::<Result<Vec<_>>>()?);
            }
            let returning = match returning {
                Some(items) => plan_returning(items)?,
                None => Vec::new(),
            };
            Ok(Plan::Insert(InsertPlan {
                table: object_name(table_name),
                columns: columns.iter().map(ident_name).collect(),
                rows,
                returning,
            }))
        }
        Statement::Query(query) => {
            let select = match &*query.body {
                SetExpr::Select(select) => select,
                _ => return Err(invalid("only simple SELECT queries are supported")),
            };
            if select.having.is_some() {
                return Err(invalid("HAVING is not supported"));
            }
            let table = match select.from.as_slice() {
                [] => None,
                [relation] => Some(single_table(relation)?),
                _ => return Err(invalid("selecting from several tables is not supported")),
            };
            Ok(Plan::Select(SelectPlan {
                table,
                projection: plan_projection(&select.projection)?,
                filter: plan_filter(select.selection.as_ref())?,
                order_by: plan_order_by(&query.order_by)?,
                limit: query.limit.as_ref().map(plan_scalar).transpose()?,
                offset: query
                    .offset
                    .as_ref()
                    .map(|offset| plan_scalar(&offset.value))
                    .transpose()?,
            }))
        }
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => {
            let mut assigns = Vec::with_capacity(assignments.len());
            for assignment in assignments {
                let column = assignment
                    .id
                    .last()
                    .map(ident_name)
                    .ok_or_else(|| invalid("empty assignment target"))?;
                assigns.push((column, plan_scalar(&assignment.value)?));
            }
            Ok(Plan::Update(UpdatePlan {
                table: single_table(table)?,
                assignments: assigns,
                filter: plan_filter(selection.as_ref())?,
            }))
        }
        Statement::Delete {
            from, selection, ..
        } => {
            let relation = match from {
                FromTable::WithFromKeyword(relations) | FromTable::WithoutKeyword(relations) => {
                    match relations.as_slice() {
                        [relation] => relation,
                        _ => return Err(invalid("DELETE needs exactly one table")),
                    }
                }
            };
            Ok(Plan::Delete(DeletePlan {
                table: single_table(relation)?,
                filter: plan_filter(selection.as_ref())?,
            }))
        }
        Statement::StartTransaction { .. } | Statement::Commit { .. } | Statement::Rollback { .. } => {
            Err(invalid(
                "transaction control statements are not allowed, use the connection's transaction methods",
            ))
        }
        other => Err(invalid(format!("unsupported statement: {other}"))),
    }
}

/// Parses the rendered form of a table constraint, e.g.
/// `CONSTRAINT users_pk PRIMARY KEY (id)` or `UNIQUE (a, b)`.
fn plan_table_constraint(rendered: &str) -> Result<(Vec<String>, bool)> {
    let upper = rendered.to_ascii_uppercase();
    let body_start = if upper.starts_with("CONSTRAINT ") {
        upper["CONSTRAINT ".len()..]
            .find(' ')
            .map(|idx| "CONSTRAINT ".len() + idx + 1)
            .unwrap_or(upper.len())
    } else {
        0
    };
    let body = &upper[body_start..];
    let primary = if body.starts_with("PRIMARY KEY") {
        true
    } else if body.starts_with("UNIQUE") {
        false
    } else {
        return Err(invalid(format!("constraint {rendered} is not supported")));
    };
    let open = rendered[body_start..]
        .find('(')
        .map(|idx| body_start + idx + 1)
        .ok_or_else(|| invalid(format!("constraint {rendered} has no column list")))?;
    let close = rendered[open..]
        .find(')')
        .map(|idx| open + idx)
        .ok_or_else(|| invalid(format!("constraint {rendered} has no column list")))?;
    let columns = rendered[open..close]
        .split(',')
        .map(|c| {
            let c = c.trim();
            match c.strip_prefix('"').and_then(|c| c.strip_suffix('"')) {
                Some(quoted) => quoted.to_string(),
                None => c.to_lowercase(),
            }
        })
        .filter(|c| !c.is_empty())
        .collect();
    Ok((columns, primary))
}

fn plan_projection(items: &[SelectItem]) -> Result<Vec<ProjectionItem>> {
    items
        .iter()
        .map(|item| match item {
            SelectItem::UnnamedExpr(expr) => plan_projection_expr(expr, None),
            SelectItem::ExprWithAlias { expr, alias } => {
                plan_projection_expr(expr, Some(ident_name(alias)))
            }
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                Ok(ProjectionItem::AllColumns)
            }
        })
        .collect()
}

fn plan_projection_expr(expr: &Expr, alias: Option<String>) -> Result<ProjectionItem> {
    if let Expr::Function(func) = expr {
        let rendered: String = func.to_string().split_whitespace().collect();
        if rendered.eq_ignore_ascii_case("COUNT(*)") {
            return Ok(ProjectionItem::CountAll {
                name: alias.unwrap_or_else(|| "count".into()),
            });
        }
        return Err(invalid(format!("function {func} is not supported")));
    }
    let expr = plan_scalar(expr)?;
    let name = alias.unwrap_or_else(|| match &expr {
        ScalarExpr::Column(column) => column.clone(),
        _ => "?column?".into(),
    });
    Ok(ProjectionItem::Expr { expr, name })
}

fn plan_returning(items: &[SelectItem]) -> Result<Vec<String>> {
    items
        .iter()
        .map(|item| match item {
            SelectItem::UnnamedExpr(Expr::Identifier(ident)) => Ok(ident_name(ident)),
            SelectItem::UnnamedExpr(Expr::CompoundIdentifier(parts)) => parts
                .last()
                .map(ident_name)
                .ok_or_else(|| invalid("empty RETURNING column")),
            other => Err(invalid(format!("RETURNING {other} is not supported"))),
        })
        .collect()
}

fn plan_filter(selection: Option<&Expr>) -> Result<Option<Condition>> {
    selection.map(plan_condition).transpose()
}

fn plan_condition(expr: &Expr) -> Result<Condition> {
    match expr {
        Expr::Nested(inner) => plan_condition(inner),
        Expr::IsNull(operand) => Ok(Condition::IsNull {
            operand: plan_scalar(operand)?,
            negated: false,
        }),
        Expr::IsNotNull(operand) => Ok(Condition::IsNull {
            operand: plan_scalar(operand)?,
            negated: true,
        }),
        Expr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Condition::Not(Box::new(plan_condition(expr)?))),
        Expr::BinaryOp { left, op, right } => {
            let op = match op {
                BinaryOperator::And => {
                    return Ok(Condition::And(
                        Box::new(plan_condition(left)?),
                        Box::new(plan_condition(right)?),
                    ))
                }
                BinaryOperator::Or => {
                    return Ok(Condition::Or(
                        Box::new(plan_condition(left)?),
                        Box::new(plan_condition(right)?),
                    ))
                }
                BinaryOperator::Eq => CompareOp::Eq,
                BinaryOperator::NotEq => CompareOp::NotEq,
                BinaryOperator::Gt => CompareOp::Gt,
                BinaryOperator::GtEq => CompareOp::Gte,
                BinaryOperator::Lt => CompareOp::Lt,
                BinaryOperator::LtEq => CompareOp::Lte,
                other => return Err(invalid(format!("operator {other} is not supported"))),
            };
            Ok(Condition::Compare {
                left: plan_scalar(left)?,
                op,
                right: plan_scalar(right)?,
            })
        }
        other => Err(invalid(format!("condition {other} is not supported"))),
    }
}

fn plan_scalar(expr: &Expr) -> Result<ScalarExpr> {
    match expr {
        Expr::Nested(inner) => plan_scalar(inner),
        Expr::Identifier(ident) => Ok(ScalarExpr::Column(ident_name(ident))),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|ident| ScalarExpr::Column(ident_name(ident)))
            .ok_or_else(|| invalid("empty identifier")),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match &**expr {
            Expr::Value(Value::Number(n, _)) => Ok(ScalarExpr::Literal(number(&format!("-{n}"))?)),
            other => Err(invalid(format!("expression -{other} is not supported"))),
        },
        Expr::Value(Value::Placeholder(p)) => p
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(|n| ScalarExpr::Param(n - 1))
            .ok_or_else(|| invalid(format!("placeholder {p} is not supported"))),
        Expr::Value(Value::Number(n, _)) => Ok(ScalarExpr::Literal(number(n)?)),
        Expr::Value(Value::SingleQuotedString(s)) => Ok(ScalarExpr::Literal(SqlValue::String(s.clone()))),
        Expr::Value(Value::Boolean(b)) => Ok(ScalarExpr::Literal(SqlValue::Bool(*b))),
        Expr::Value(Value::Null) => Ok(ScalarExpr::Literal(SqlValue::Null)),
        other => Err(invalid(format!("expression {other} is not supported"))),
    }
}

/// Integer literals become INT4 or INT8 by magnitude, anything else DECIMAL.
fn number(text: &str) -> Result<SqlValue> {
    if let Ok(v) = text.parse::<i32>() {
        return Ok(SqlValue::Int32(v));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Ok(SqlValue::Int64(v));
    }
    text.parse::<Decimal>()
        .map(SqlValue::Decimal)
        .map_err(|e| invalid(e.to_string()))
}

fn plan_order_by(order_by: &[OrderByExpr]) -> Result<Vec<OrderKey>> {
    order_by
        .iter()
        .map(|oe| {
            let target = match &oe.expr {
                Expr::Identifier(ident) => OrderTarget::Name(ident_name(ident)),
                Expr::CompoundIdentifier(parts) => parts
                    .last()
                    .map(|ident| OrderTarget::Name(ident_name(ident)))
                    .ok_or_else(|| invalid("empty ORDER BY column"))?,
                Expr::Value(Value::Number(n, _)) => match n.parse::<usize>() {
                    Ok(position) if position >= 1 => OrderTarget::Position(position),
                    _ => return Err(invalid(format!("ORDER BY position {n} is not valid"))),
                },
                other => return Err(invalid(format!("ORDER BY {other} is not supported"))),
            };
            Ok(OrderKey {
                target,
                asc: oe.asc.unwrap_or(true),
            })
        })
        .collect()
}

fn single_table(relation: &TableWithJoins) -> Result<String> {
    if !relation.joins.is_empty() {
        return Err(invalid("joins are not supported"));
    }
    match &relation.relation {
        TableFactor::Table { name, .. } => Ok(object_name(name)),
        other => Err(invalid(format!("relation {other} is not supported"))),
    }
}

/// Unquoted identifiers fold to lower case.
fn ident_name(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_lowercase(),
    }
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(ident_name)
        .collect::<Vec<_>>()
        .join(".")
}

fn invalid(message: impl Into<String>) -> RdbcError {
    RdbcError::InvalidQuery(message.into())
}
