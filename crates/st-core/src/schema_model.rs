//! Symbolic schema model.
//!
//! Replays operations against an in-memory picture of schemas, tables,
//! columns, indexes and foreign keys. The model is open-world: a table or
//! column that an operation touches without the model having seen it created
//! is assumed to pre-date the replayed units and is materialized as a
//! *partial* entry, whose column list is known to be incomplete.
//!
//! Used by the round-trip lint (forward then inverse must restore the model)
//! and by the ledger's schema probes (what the applied units say must exist).

use crate::email_template::{self, EmailTemplateOp};
use crate::operation::{ColumnDef, CreateTable, DefaultChange, ForeignKeyDef, Operation};
use crate::reference_value::{self, ReferenceValueOp};
use crate::table_name::TableName;
use std::collections::{BTreeMap, BTreeSet};

/// One column as far as the model knows it. `None` means unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub name: String,
    pub data_type: Option<String>,
    pub nullable: Option<bool>,
    pub default: Option<String>,
}

impl ColumnModel {
    fn from_def(def: &ColumnDef) -> Self {
        Self {
            name: def.name.clone(),
            data_type: Some(normalize_type(&def.data_type)),
            nullable: Some(def.nullable),
            default: def.default.as_ref().map(|d| d.to_sql()),
        }
    }

    fn unknown(name: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: None,
            nullable: None,
            default: None,
        }
    }
}

fn normalize_type(data_type: &str) -> String {
    data_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    /// Empty when the index was only seen being dropped.
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableModel {
    pub columns: Vec<ColumnModel>,
    pub primary_key: Vec<String>,
    pub unique: Vec<Vec<String>>,
    pub foreign_keys: BTreeMap<String, ForeignKeyDef>,
    pub indexes: BTreeMap<String, IndexModel>,
    /// Pre-existing table whose full shape is not known.
    pub partial: bool,
}

impl TableModel {
    fn from_create(ct: &CreateTable) -> Self {
        Self {
            columns: ct.columns.iter().map(ColumnModel::from_def).collect(),
            primary_key: ct.primary_key.clone(),
            unique: ct.unique.clone(),
            foreign_keys: ct
                .foreign_keys
                .iter()
                .map(|fk| (fk.name.clone(), fk.clone()))
                .collect(),
            indexes: BTreeMap::new(),
            partial: false,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnModel> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnModel> {
        self.columns.iter_mut().find(|c| c.name == name)
    }
}

/// Something the model assumed existed before the replay touched it.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Table(TableName),
    Column(TableName, String),
    Index(TableName, String),
    ForeignKey(TableName, String),
}

/// An object the replayed units say must exist in the database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Probe {
    Table(TableName),
    Column(TableName, String),
    Index(TableName, String),
}

/// In-memory schema picture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaModel {
    schemas: BTreeSet<String>,
    tables: BTreeMap<TableName, TableModel>,
    /// Tables dropped during the replay. Touching one is an error rather than
    /// a reason to materialize it.
    dropped: BTreeSet<TableName>,
    /// Tables mutated by raw SQL; their shape is not tracked.
    opaque: BTreeSet<TableName>,
    materialized: Vec<Materialized>,
}

/// Normalized map key: always schema-qualified.
fn key(table: &TableName) -> TableName {
    TableName::new(Some(table.schema_or_default()), table.name())
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay the forward lists of `units` in order, ignoring issues.
    pub fn replay<'a>(units: impl IntoIterator<Item = &'a crate::change_unit::ChangeUnit>) -> Self {
        let mut model = Self::new();
        for unit in units {
            for op in &unit.forward {
                let issues = model.apply(op);
                for issue in issues {
                    log::debug!("replay {}: {}", unit.id, issue);
                }
            }
            model.materialized.clear();
        }
        model
    }

    pub fn table(&self, table: &TableName) -> Option<&TableModel> {
        self.tables.get(&key(table))
    }

    pub fn has_schema(&self, name: &str) -> bool {
        self.schemas.contains(name)
    }

    pub fn is_opaque(&self, table: &TableName) -> bool {
        self.opaque.contains(&key(table))
    }

    /// Drain the assumptions made since the last call.
    pub fn take_materialized(&mut self) -> Vec<Materialized> {
        std::mem::take(&mut self.materialized)
    }

    /// Record a pre-existing object without replaying anything. Used to seed
    /// a baseline with what a later replay assumed.
    pub fn assume(&mut self, m: &Materialized) {
        match m {
            Materialized::Table(t) => {
                self.tables.entry(key(t)).or_insert_with(|| TableModel {
                    partial: true,
                    ..TableModel::default()
                });
            }
            Materialized::Column(t, c) => {
                if let Some(tm) = self.tables.get_mut(&key(t)) {
                    if tm.column(c).is_none() {
                        tm.columns.push(ColumnModel::unknown(c));
                    }
                }
            }
            Materialized::Index(t, name) => {
                if let Some(tm) = self.tables.get_mut(&key(t)) {
                    tm.indexes.entry(name.clone()).or_insert(IndexModel {
                        columns: Vec::new(),
                        unique: false,
                    });
                }
            }
            Materialized::ForeignKey(t, name) => {
                if let Some(tm) = self.tables.get_mut(&key(t)) {
                    tm.foreign_keys
                        .entry(name.clone())
                        .or_insert_with(|| ForeignKeyDef {
                            name: name.clone(),
                            columns: Vec::new(),
                            references: t.clone(),
                            referenced_columns: Vec::new(),
                            on_delete: None,
                        });
                }
            }
        }
    }

    /// Look up a table for modification, materializing it when unknown.
    fn touch(&mut self, table: &TableName, issues: &mut Vec<String>) -> Option<&mut TableModel> {
        let k = key(table);
        if !self.tables.contains_key(&k) {
            if self.dropped.contains(&k) {
                issues.push(format!("table {table} was dropped earlier"));
                return None;
            }
            let m = Materialized::Table(k.clone());
            self.assume(&m);
            self.materialized.push(m);
        }
        self.tables.get_mut(&k)
    }

    /// Ensure `column` exists on `table`; partial tables grow it.
    fn touch_column(&mut self, table: &TableName, column: &str, issues: &mut Vec<String>) {
        let Some(tm) = self.touch(table, issues) else {
            return;
        };
        if tm.column(column).is_some() {
            return;
        }
        if tm.partial {
            tm.columns.push(ColumnModel::unknown(column));
            self.materialized
                .push(Materialized::Column(key(table), column.to_string()));
        } else {
            issues.push(format!("column {table}.{column} does not exist"));
        }
    }

    fn create_table(&mut self, ct: &CreateTable, issues: &mut Vec<String>) {
        let k = key(&ct.table);
        if self.tables.get(&k).is_some_and(|t| !t.partial) {
            issues.push(format!("table {} already exists", ct.table));
        }
        for fk in &ct.foreign_keys {
            if self.dropped.contains(&key(&fk.references)) {
                issues.push(format!(
                    "foreign key {} references dropped table {}",
                    fk.name, fk.references
                ));
            }
        }
        self.dropped.remove(&k);
        self.tables.insert(k, TableModel::from_create(ct));
    }

    fn drop_table(&mut self, table: &TableName, issues: &mut Vec<String>) {
        let k = key(table);
        if self.touch(table, issues).is_none() {
            return;
        }
        for (other, tm) in &self.tables {
            if *other == k {
                continue;
            }
            for fk in tm.foreign_keys.values() {
                if key(&fk.references) == k {
                    issues.push(format!(
                        "table {} is still referenced by foreign key {} on {}",
                        table, fk.name, other
                    ));
                }
            }
        }
        self.tables.remove(&k);
        self.dropped.insert(k);
    }

    /// Apply one operation, returning problems found along the way. The model
    /// is updated even when problems are reported.
    pub fn apply(&mut self, op: &Operation) -> Vec<String> {
        let mut issues = Vec::new();
        match op {
            Operation::CreateSchema {
                name,
                if_not_exists,
            } => {
                if !self.schemas.insert(name.clone()) && !if_not_exists {
                    issues.push(format!("schema {name} already exists"));
                }
            }
            Operation::DropSchema { name } => {
                if let Some(t) = self.tables.keys().find(|t| t.schema() == Some(name.as_str())) {
                    issues.push(format!("schema {name} still contains table {t}"));
                }
                self.schemas.remove(name);
            }
            Operation::CreateTable(ct) => self.create_table(ct, &mut issues),
            Operation::DropTable { table } => self.drop_table(table, &mut issues),
            Operation::RenameTable { table, new_name } => {
                let from = key(table);
                let to = from.with_name(new_name);
                if self.touch(table, &mut issues).is_none() {
                    return issues;
                }
                if self.tables.contains_key(&to) {
                    issues.push(format!("table {to} already exists"));
                }
                if let Some(tm) = self.tables.remove(&from) {
                    self.tables.insert(to.clone(), tm);
                }
                for tm in self.tables.values_mut() {
                    for fk in tm.foreign_keys.values_mut() {
                        if key(&fk.references) == from {
                            fk.references = to.clone();
                        }
                    }
                }
                self.dropped.insert(from);
                self.dropped.remove(&to);
            }
            Operation::AddColumn { table, column } => {
                if let Some(tm) = self.touch(table, &mut issues) {
                    if tm.column(&column.name).is_some() {
                        issues.push(format!("column {}.{} already exists", table, column.name));
                    } else {
                        tm.columns.push(ColumnModel::from_def(column));
                    }
                }
            }
            Operation::DropColumn { table, column } => {
                self.touch_column(table, column, &mut issues);
                if let Some(tm) = self.tables.get_mut(&key(table)) {
                    if tm.indexes.values().any(|i| i.columns.contains(column)) {
                        issues.push(format!("column {table}.{column} is still indexed"));
                    }
                    tm.columns.retain(|c| c.name != *column);
                }
            }
            Operation::RenameColumn {
                table,
                column,
                new_name,
            } => {
                self.touch_column(table, column, &mut issues);
                if let Some(tm) = self.tables.get_mut(&key(table)) {
                    if tm.column(new_name).is_some() {
                        issues.push(format!("column {table}.{new_name} already exists"));
                    }
                    if let Some(c) = tm.column_mut(column) {
                        c.name = new_name.clone();
                    }
                }
            }
            Operation::AlterColumn {
                table,
                column,
                data_type,
                nullable,
                default,
            } => {
                self.touch_column(table, column, &mut issues);
                if let Some(c) = self
                    .tables
                    .get_mut(&key(table))
                    .and_then(|tm| tm.column_mut(column))
                {
                    if let Some(ty) = data_type {
                        c.data_type = Some(normalize_type(ty));
                    }
                    if let Some(n) = nullable {
                        c.nullable = Some(*n);
                    }
                    match default {
                        Some(DefaultChange::Set(v)) => c.default = Some(v.to_sql()),
                        Some(DefaultChange::Drop) => c.default = None,
                        None => {}
                    }
                }
            }
            Operation::CreateIndex(idx) => {
                for col in &idx.columns {
                    self.touch_column(&idx.table, col, &mut issues);
                }
                if let Some(tm) = self.tables.get_mut(&key(&idx.table)) {
                    if tm.indexes.contains_key(&idx.name) {
                        issues.push(format!("index {} already exists", idx.name));
                    }
                    tm.indexes.insert(
                        idx.name.clone(),
                        IndexModel {
                            columns: idx.columns.clone(),
                            unique: idx.unique,
                        },
                    );
                }
            }
            Operation::DropIndex { table, name } => {
                if let Some(tm) = self.touch(table, &mut issues) {
                    if tm.indexes.remove(name).is_none() {
                        if tm.partial {
                            self.materialized
                                .push(Materialized::Index(key(table), name.clone()));
                        } else {
                            issues.push(format!("index {name} does not exist on {table}"));
                        }
                    }
                }
            }
            Operation::AddForeignKey { table, foreign_key } => {
                for col in &foreign_key.columns {
                    self.touch_column(table, col, &mut issues);
                }
                if self.dropped.contains(&key(&foreign_key.references)) {
                    issues.push(format!(
                        "foreign key {} references dropped table {}",
                        foreign_key.name, foreign_key.references
                    ));
                }
                if let Some(tm) = self.tables.get_mut(&key(table)) {
                    tm.foreign_keys
                        .insert(foreign_key.name.clone(), foreign_key.clone());
                }
            }
            Operation::DropForeignKey { table, name } => {
                if let Some(tm) = self.touch(table, &mut issues) {
                    if tm.foreign_keys.remove(name).is_none() {
                        if tm.partial {
                            self.materialized
                                .push(Materialized::ForeignKey(key(table), name.clone()));
                        } else {
                            issues.push(format!("foreign key {name} does not exist on {table}"));
                        }
                    }
                }
            }
            Operation::InsertRows { table, columns, .. } => {
                for col in columns {
                    self.touch_column(table, col, &mut issues);
                }
            }
            Operation::UpdateRows { table, set, filter } => {
                for col in set.keys().chain(filter.keys()) {
                    self.touch_column(table, col, &mut issues);
                }
            }
            Operation::DeleteRows { table, filter } => {
                for col in filter.keys() {
                    self.touch_column(table, col, &mut issues);
                }
            }
            Operation::Sql { affects, .. } => {
                for t in affects {
                    self.opaque.insert(key(t));
                }
            }
            Operation::ReferenceValues(op) => self.apply_reference_values(op, &mut issues),
            Operation::EmailTemplates(op) => self.apply_email_templates(op, &mut issues),
        }
        issues
    }

    fn apply_reference_values(&mut self, op: &ReferenceValueOp, issues: &mut Vec<String>) {
        match op {
            ReferenceValueOp::CreateStore { table } => {
                self.create_table(&reference_value::store_definition(table), issues)
            }
            ReferenceValueOp::DropStore { table } => self.drop_table(table, issues),
            ReferenceValueOp::FoldLegacyTable {
                legacy_table,
                metadata_columns,
                table,
                ..
            } => {
                self.touch(table, issues);
                for col in reference_value::LEGACY_STANDARD_COLUMNS {
                    self.touch_column(legacy_table, col, issues);
                }
                for folded in metadata_columns {
                    self.touch_column(legacy_table, &folded.column, issues);
                }
                self.drop_table(legacy_table, issues);
            }
            ReferenceValueOp::RestoreLegacyTable { legacy, table, .. } => {
                self.touch(table, issues);
                self.create_table(legacy, issues);
            }
            other => {
                self.touch(other.store(), issues);
            }
        }
    }

    fn apply_email_templates(&mut self, op: &EmailTemplateOp, issues: &mut Vec<String>) {
        match op {
            EmailTemplateOp::CreateStore { table } => {
                self.create_table(&email_template::store_definition(table), issues)
            }
            EmailTemplateOp::DropStore { table } => self.drop_table(table, issues),
            other => {
                self.touch(other.store(), issues);
            }
        }
    }

    /// Differences between `self` (expected) and `actual`. Opaque tables on
    /// either side are skipped; partial tables only require their known
    /// parts to be present.
    pub fn diff(&self, actual: &SchemaModel) -> Vec<String> {
        let mut out = Vec::new();
        for s in self.schemas.difference(&actual.schemas) {
            out.push(format!("schema {s} is missing"));
        }
        for s in actual.schemas.difference(&self.schemas) {
            out.push(format!("schema {s} was left behind"));
        }

        let skip = |t: &TableName| self.opaque.contains(t) || actual.opaque.contains(t);
        for (name, expected) in &self.tables {
            if skip(name) {
                continue;
            }
            match actual.tables.get(name) {
                None => out.push(format!("table {name} is missing")),
                Some(found) => diff_table(name, expected, found, &mut out),
            }
        }
        for name in actual.tables.keys() {
            if !skip(name) && !self.tables.contains_key(name) {
                out.push(format!("table {name} was left behind"));
            }
        }
        out
    }

    /// Objects that must exist if every replayed unit was applied.
    pub fn probes(&self) -> Vec<Probe> {
        let mut probes = Vec::new();
        for (name, tm) in &self.tables {
            if self.opaque.contains(name) {
                continue;
            }
            probes.push(Probe::Table(name.clone()));
            for c in &tm.columns {
                probes.push(Probe::Column(name.clone(), c.name.clone()));
            }
            for idx in tm.indexes.keys() {
                probes.push(Probe::Index(name.clone(), idx.clone()));
            }
        }
        probes
    }
}

fn diff_table(name: &TableName, expected: &TableModel, found: &TableModel, out: &mut Vec<String>) {
    for col in &expected.columns {
        match found.column(&col.name) {
            None => out.push(format!("column {}.{} is missing", name, col.name)),
            Some(f) => {
                let known_differs = |a: &Option<String>, b: &Option<String>| {
                    a.is_some() && b.is_some() && a != b
                };
                if known_differs(&col.data_type, &f.data_type) {
                    out.push(format!(
                        "column {}.{} type {} became {}",
                        name,
                        col.name,
                        col.data_type.as_deref().unwrap_or("?"),
                        f.data_type.as_deref().unwrap_or("?")
                    ));
                }
                if col.nullable.is_some() && f.nullable.is_some() && col.nullable != f.nullable {
                    out.push(format!("column {}.{} nullability changed", name, col.name));
                }
                if !expected.partial && col.default != f.default {
                    out.push(format!("column {}.{} default changed", name, col.name));
                }
            }
        }
    }
    if !expected.partial {
        for col in &found.columns {
            if expected.column(&col.name).is_none() {
                out.push(format!("column {}.{} was left behind", name, col.name));
            }
        }
        if expected.primary_key != found.primary_key || expected.unique != found.unique {
            out.push(format!("constraints of {name} changed"));
        }
    }

    for (idx, model) in &expected.indexes {
        match found.indexes.get(idx) {
            None => out.push(format!("index {idx} on {name} is missing")),
            Some(f) if !model.columns.is_empty() && f != model => {
                out.push(format!("index {idx} on {name} changed"))
            }
            _ => {}
        }
    }
    for idx in found.indexes.keys() {
        if !expected.indexes.contains_key(idx) {
            out.push(format!("index {idx} on {name} was left behind"));
        }
    }

    for (fk, def) in &expected.foreign_keys {
        match found.foreign_keys.get(fk) {
            None => out.push(format!("foreign key {fk} on {name} is missing")),
            Some(f) if !def.columns.is_empty() && key(&f.references) != key(&def.references) => {
                out.push(format!("foreign key {fk} on {name} changed"))
            }
            _ => {}
        }
    }
    for fk in found.foreign_keys.keys() {
        if !expected.foreign_keys.contains_key(fk) {
            out.push(format!("foreign key {fk} on {name} was left behind"));
        }
    }
}

#[cfg(test)]
#[path = "schema_model_test.rs"]
mod tests;
