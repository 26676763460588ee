//! Operation primitives: the vocabulary change units are built from.
//!
//! Every operation renders to one or more DuckDB-dialect SQL statements via
//! [`Operation::to_sql`]. Catalog operations (reference values, email
//! templates) are lowered to the same kind of statements by their own
//! modules.

use crate::email_template::EmailTemplateOp;
use crate::error::{CoreError, CoreResult};
use crate::reference_value::ReferenceValueOp;
use crate::sql_utils::{comma_list, quote_ident, quote_literal, quoted_columns};
use crate::table_name::TableName;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// A literal value in a data operation or column default.
///
/// Deserialized untagged: YAML scalars map to the obvious variant, a
/// `{sql: ...}` map is a raw SQL expression (`now()`, `uuid()`), any other
/// map or sequence is stored as JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Expr(SqlExpr),
    Json(serde_json::Value),
}

/// A raw SQL expression, written `{sql: "now()"}` in change-unit files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlExpr {
    pub sql: String,
}

impl SqlValue {
    /// Raw expression shorthand.
    pub fn expr(sql: impl Into<String>) -> Self {
        SqlValue::Expr(SqlExpr { sql: sql.into() })
    }

    pub fn text(s: impl Into<String>) -> Self {
        SqlValue::Text(s.into())
    }

    /// Render as a SQL literal or expression.
    pub fn to_sql(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(true) => "TRUE".to_string(),
            SqlValue::Bool(false) => "FALSE".to_string(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::Float(f) => {
                if f.is_finite() {
                    format!("{f:?}")
                } else {
                    "NULL".to_string()
                }
            }
            SqlValue::Text(s) => quote_literal(s),
            SqlValue::Expr(e) => e.sql.clone(),
            SqlValue::Json(v) => quote_literal(&v.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        SqlValue::Int(n.into())
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// Equality conjunction used by update/delete filters: `col = value AND ...`.
pub type Filter = BTreeMap<String, SqlValue>;

/// Render a filter as a `WHERE` body. `NULL` values compare with `IS NULL`.
pub(crate) fn render_filter(filter: &Filter) -> String {
    filter
        .iter()
        .map(|(col, value)| match value {
            SqlValue::Null => format!("{} IS NULL", quote_ident(col)),
            v => format!("{} = {}", quote_ident(col), v.to_sql()),
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

static DATA_TYPE_RE: OnceLock<Regex> = OnceLock::new();

fn data_type_pattern() -> &'static Regex {
    DATA_TYPE_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\(\s*\d+\s*(,\s*\d+\s*)?\))?(\[\])?$")
            .expect("valid regex")
    })
}

/// Validate a SQL type name such as `VARCHAR(255)`, `DECIMAL(10, 2)`, `UUID`.
pub fn validate_data_type(data_type: &str) -> CoreResult<()> {
    if data_type_pattern().is_match(data_type.trim()) {
        Ok(())
    } else {
        Err(CoreError::InvalidCatalogOp {
            message: format!("unsupported column type '{data_type}'"),
        })
    }
}

/// Column definition for `create_table` / `add_column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SqlValue>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<SqlValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// `"name" TYPE [DEFAULT v] [NOT NULL]`
    fn render(&self, with_not_null: bool) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.data_type.trim());
        if let Some(default) = &self.default {
            sql.push_str(&format!(" DEFAULT {}", default.to_sql()));
        }
        if with_not_null && !self.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FkAction {
    Restrict,
    Cascade,
    SetNull,
    NoAction,
}

impl fmt::Display for FkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FkAction::Restrict => write!(f, "RESTRICT"),
            FkAction::Cascade => write!(f, "CASCADE"),
            FkAction::SetNull => write!(f, "SET NULL"),
            FkAction::NoAction => write!(f, "NO ACTION"),
        }
    }
}

/// Foreign key constraint definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub name: String,
    pub columns: Vec<String>,
    pub references: TableName,
    pub referenced_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<FkAction>,
}

impl ForeignKeyDef {
    fn render_body(&self) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            quoted_columns(&self.columns),
            self.references.quoted(),
            quoted_columns(&self.referenced_columns)
        );
        if let Some(action) = self.on_delete {
            sql.push_str(&format!(" ON DELETE {action}"));
        }
        sql
    }
}

/// `create_table` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table: TableName,
    pub columns: Vec<ColumnDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    /// Each entry is one UNIQUE column group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKeyDef>,
    /// Raw CHECK expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<String>,
}

impl CreateTable {
    pub fn new(table: impl Into<TableName>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table: table.into(),
            columns,
            primary_key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
            checks: Vec::new(),
        }
    }

    fn render(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(|c| c.render(true)).collect();
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", quoted_columns(&self.primary_key)));
        }
        for group in &self.unique {
            parts.push(format!("UNIQUE ({})", quoted_columns(group)));
        }
        for fk in &self.foreign_keys {
            parts.push(fk.render_body());
        }
        for check in &self.checks {
            parts.push(format!("CHECK ({check})"));
        }
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.table.quoted(),
            parts.join(",\n    ")
        )
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: TableName,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// Change applied to a column default by `alter_column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultChange {
    Set(SqlValue),
    Drop,
}

/// A single schema or data operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateSchema {
        name: String,
        #[serde(default)]
        if_not_exists: bool,
    },
    DropSchema {
        name: String,
    },
    CreateTable(CreateTable),
    DropTable {
        table: TableName,
    },
    RenameTable {
        table: TableName,
        new_name: String,
    },
    AddColumn {
        table: TableName,
        column: ColumnDef,
    },
    DropColumn {
        table: TableName,
        column: String,
    },
    RenameColumn {
        table: TableName,
        column: String,
        new_name: String,
    },
    AlterColumn {
        table: TableName,
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nullable: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<DefaultChange>,
    },
    CreateIndex(IndexDef),
    DropIndex {
        table: TableName,
        name: String,
    },
    AddForeignKey {
        table: TableName,
        foreign_key: ForeignKeyDef,
    },
    DropForeignKey {
        table: TableName,
        name: String,
    },
    /// Insert rows. With a non-empty `key`, each row is inserted only if no
    /// row with the same key values exists.
    InsertRows {
        table: TableName,
        columns: Vec<String>,
        rows: Vec<Vec<SqlValue>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        key: Vec<String>,
    },
    UpdateRows {
        table: TableName,
        set: BTreeMap<String, SqlValue>,
        filter: Filter,
    },
    DeleteRows {
        table: TableName,
        filter: Filter,
    },
    /// Raw SQL. `affects` lists tables the statement mutates structurally so
    /// schema probes can skip them.
    Sql {
        sql: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        affects: Vec<TableName>,
    },
    ReferenceValues(ReferenceValueOp),
    EmailTemplates(EmailTemplateOp),
}

impl Operation {
    /// Short machine-friendly operation name.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::CreateSchema { .. } => "create_schema",
            Operation::DropSchema { .. } => "drop_schema",
            Operation::CreateTable(_) => "create_table",
            Operation::DropTable { .. } => "drop_table",
            Operation::RenameTable { .. } => "rename_table",
            Operation::AddColumn { .. } => "add_column",
            Operation::DropColumn { .. } => "drop_column",
            Operation::RenameColumn { .. } => "rename_column",
            Operation::AlterColumn { .. } => "alter_column",
            Operation::CreateIndex(_) => "create_index",
            Operation::DropIndex { .. } => "drop_index",
            Operation::AddForeignKey { .. } => "add_foreign_key",
            Operation::DropForeignKey { .. } => "drop_foreign_key",
            Operation::InsertRows { .. } => "insert_rows",
            Operation::UpdateRows { .. } => "update_rows",
            Operation::DeleteRows { .. } => "delete_rows",
            Operation::Sql { .. } => "sql",
            Operation::ReferenceValues(_) => "reference_values",
            Operation::EmailTemplates(_) => "email_templates",
        }
    }

    /// One-line human description used in logs and error reports.
    pub fn summary(&self) -> String {
        match self {
            Operation::CreateSchema { name, .. } | Operation::DropSchema { name } => {
                format!("{} {}", self.kind(), name)
            }
            Operation::CreateTable(ct) => format!("create_table {}", ct.table),
            Operation::DropTable { table } => format!("drop_table {table}"),
            Operation::RenameTable { table, new_name } => {
                format!("rename_table {table} -> {new_name}")
            }
            Operation::AddColumn { table, column } => {
                format!("add_column {}.{}", table, column.name)
            }
            Operation::DropColumn { table, column } | Operation::AlterColumn { table, column, .. } => {
                format!("{} {}.{}", self.kind(), table, column)
            }
            Operation::RenameColumn {
                table,
                column,
                new_name,
            } => format!("rename_column {table}.{column} -> {new_name}"),
            Operation::CreateIndex(idx) => format!("create_index {} on {}", idx.name, idx.table),
            Operation::DropIndex { table, name } => format!("drop_index {name} on {table}"),
            Operation::AddForeignKey { table, foreign_key } => {
                format!("add_foreign_key {} on {}", foreign_key.name, table)
            }
            Operation::DropForeignKey { table, name } => {
                format!("drop_foreign_key {name} on {table}")
            }
            Operation::InsertRows { table, rows, key, .. } => {
                let guard = if key.is_empty() { "" } else { " (if absent)" };
                format!("insert_rows {} x{}{}", table, rows.len(), guard)
            }
            Operation::UpdateRows { table, .. } => format!("update_rows {table}"),
            Operation::DeleteRows { table, .. } => format!("delete_rows {table}"),
            Operation::Sql { sql, .. } => {
                let first = sql.trim().lines().next().unwrap_or_default();
                let mut head: String = first.chars().take(60).collect();
                if first.chars().count() > 60 {
                    head.push_str("...");
                }
                format!("sql: {head}")
            }
            Operation::ReferenceValues(op) => format!("reference_values {}", op.summary()),
            Operation::EmailTemplates(op) => format!("email_templates {}", op.summary()),
        }
    }

    /// `true` for operations that change constraints on an existing table.
    pub fn alters_foreign_keys(&self) -> bool {
        matches!(
            self,
            Operation::AddForeignKey { .. } | Operation::DropForeignKey { .. }
        )
    }

    /// Structural validation that does not need a database.
    pub fn validate(&self) -> CoreResult<()> {
        match self {
            Operation::CreateTable(ct) => {
                if ct.columns.is_empty() {
                    return Err(invalid(format!("create_table {} has no columns", ct.table)));
                }
                for col in &ct.columns {
                    validate_data_type(&col.data_type)?;
                }
                Ok(())
            }
            Operation::AddColumn { column, .. } => validate_data_type(&column.data_type),
            Operation::AlterColumn {
                data_type,
                nullable,
                default,
                ..
            } => {
                if data_type.is_none() && nullable.is_none() && default.is_none() {
                    return Err(invalid("alter_column changes nothing".to_string()));
                }
                data_type.as_deref().map_or(Ok(()), validate_data_type)
            }
            Operation::CreateIndex(idx) if idx.columns.is_empty() => {
                Err(invalid(format!("index {} has no columns", idx.name)))
            }
            Operation::AddForeignKey { foreign_key, .. }
                if foreign_key.columns.len() != foreign_key.referenced_columns.len()
                    || foreign_key.columns.is_empty() =>
            {
                Err(invalid(format!(
                    "foreign key {} must pair columns with referenced columns",
                    foreign_key.name
                )))
            }
            Operation::InsertRows {
                columns, rows, key, ..
            } => {
                if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
                    return Err(invalid(format!(
                        "insert row {} has {} values for {} columns",
                        bad,
                        rows[bad].len(),
                        columns.len()
                    )));
                }
                if let Some(k) = key.iter().find(|k| !columns.contains(k)) {
                    return Err(invalid(format!("insert key column '{k}' is not inserted")));
                }
                Ok(())
            }
            Operation::UpdateRows { set, filter, .. } => {
                if set.is_empty() {
                    return Err(invalid("update_rows sets no columns".to_string()));
                }
                if filter.is_empty() {
                    return Err(invalid("update_rows requires a filter".to_string()));
                }
                Ok(())
            }
            Operation::DeleteRows { filter, .. } if filter.is_empty() => {
                Err(invalid("delete_rows requires a filter".to_string()))
            }
            Operation::Sql { sql, .. } if sql.trim().is_empty() => {
                Err(invalid("sql operation is empty".to_string()))
            }
            Operation::ReferenceValues(op) => op.validate(),
            Operation::EmailTemplates(op) => op.validate(),
            _ => Ok(()),
        }
    }

    /// Render the operation as SQL statements, executed in order.
    pub fn to_sql(&self) -> CoreResult<Vec<String>> {
        self.validate()?;
        let stmts = match self {
            Operation::CreateSchema {
                name,
                if_not_exists,
            } => {
                let guard = if *if_not_exists { "IF NOT EXISTS " } else { "" };
                vec![format!("CREATE SCHEMA {guard}{}", quote_ident(name))]
            }
            Operation::DropSchema { name } => vec![format!("DROP SCHEMA {}", quote_ident(name))],
            Operation::CreateTable(ct) => vec![ct.render()],
            Operation::DropTable { table } => vec![format!("DROP TABLE {}", table.quoted())],
            Operation::RenameTable { table, new_name } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                table.quoted(),
                quote_ident(new_name)
            )],
            Operation::AddColumn { table, column } => {
                // DuckDB rejects constraints in ADD COLUMN; NOT NULL follows separately.
                let mut stmts = vec![format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    table.quoted(),
                    column.render(false)
                )];
                if !column.nullable {
                    stmts.push(format!(
                        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
                        table.quoted(),
                        quote_ident(&column.name)
                    ));
                }
                stmts
            }
            Operation::DropColumn { table, column } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                table.quoted(),
                quote_ident(column)
            )],
            Operation::RenameColumn {
                table,
                column,
                new_name,
            } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                table.quoted(),
                quote_ident(column),
                quote_ident(new_name)
            )],
            Operation::AlterColumn {
                table,
                column,
                data_type,
                nullable,
                default,
            } => {
                let prefix = format!(
                    "ALTER TABLE {} ALTER COLUMN {}",
                    table.quoted(),
                    quote_ident(column)
                );
                let mut stmts = Vec::new();
                if let Some(ty) = data_type {
                    stmts.push(format!("{prefix} SET DATA TYPE {}", ty.trim()));
                }
                match default {
                    Some(DefaultChange::Set(v)) => {
                        stmts.push(format!("{prefix} SET DEFAULT {}", v.to_sql()))
                    }
                    Some(DefaultChange::Drop) => stmts.push(format!("{prefix} DROP DEFAULT")),
                    None => {}
                }
                match nullable {
                    Some(true) => stmts.push(format!("{prefix} DROP NOT NULL")),
                    Some(false) => stmts.push(format!("{prefix} SET NOT NULL")),
                    None => {}
                }
                stmts
            }
            Operation::CreateIndex(idx) => {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                vec![format!(
                    "CREATE {unique}INDEX {} ON {} ({})",
                    quote_ident(&idx.name),
                    idx.table.quoted(),
                    quoted_columns(&idx.columns)
                )]
            }
            Operation::DropIndex { table, name } => {
                let qualified = match table.schema() {
                    Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(name)),
                    None => quote_ident(name),
                };
                vec![format!("DROP INDEX {qualified}")]
            }
            Operation::AddForeignKey { table, foreign_key } => vec![format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {}",
                table.quoted(),
                quote_ident(&foreign_key.name),
                foreign_key.render_body()
            )],
            Operation::DropForeignKey { table, name } => vec![format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                table.quoted(),
                quote_ident(name)
            )],
            Operation::InsertRows {
                table,
                columns,
                rows,
                key,
            } => render_insert(table, columns, rows, key),
            Operation::UpdateRows { table, set, filter } => {
                let assignments = comma_list(
                    set.iter()
                        .map(|(col, v)| format!("{} = {}", quote_ident(col), v.to_sql())),
                );
                vec![format!(
                    "UPDATE {} SET {} WHERE {}",
                    table.quoted(),
                    assignments,
                    render_filter(filter)
                )]
            }
            Operation::DeleteRows { table, filter } => vec![format!(
                "DELETE FROM {} WHERE {}",
                table.quoted(),
                render_filter(filter)
            )],
            Operation::Sql { sql, .. } => vec![sql.trim().to_string()],
            Operation::ReferenceValues(op) => op.to_sql()?,
            Operation::EmailTemplates(op) => op.to_sql()?,
        };
        Ok(stmts)
    }
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidCatalogOp { message }
}

/// Render an insert. Guarded inserts become one
/// `INSERT ... SELECT ... WHERE NOT EXISTS (...)` per row so a replay of the
/// same seed batch is a no-op.
pub(crate) fn render_insert(
    table: &TableName,
    columns: &[String],
    rows: &[Vec<SqlValue>],
    key: &[String],
) -> Vec<String> {
    if rows.is_empty() {
        return Vec::new();
    }
    let cols = quoted_columns(columns);
    if key.is_empty() {
        let values = rows
            .iter()
            .map(|row| format!("({})", comma_list(row.iter().map(SqlValue::to_sql))))
            .collect::<Vec<_>>()
            .join(",\n    ");
        return vec![format!(
            "INSERT INTO {} ({})\nVALUES\n    {}",
            table.quoted(),
            cols,
            values
        )];
    }

    rows.iter()
        .map(|row| {
            let filter: Filter = key
                .iter()
                .filter_map(|k| {
                    columns
                        .iter()
                        .position(|c| c == k)
                        .map(|i| (k.clone(), row[i].clone()))
                })
                .collect();
            format!(
                "INSERT INTO {} ({})\nSELECT {}\nWHERE NOT EXISTS (SELECT 1 FROM {} WHERE {})",
                table.quoted(),
                cols,
                comma_list(row.iter().map(SqlValue::to_sql)),
                table.quoted(),
                render_filter(&filter)
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "operation_test.rs"]
mod tests;
