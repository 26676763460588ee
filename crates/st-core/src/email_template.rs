//! Email template catalog operations.
//!
//! A template's `name` is the contract application code looks it up by, so
//! every operation here addresses rows by name and renames are validated as
//! bijections before anything runs.

use crate::checksum::derive_id;
use crate::error::{CoreError, CoreResult};
use crate::newtype_string::define_catalog_key;
use crate::operation::{render_filter, ColumnDef, CreateTable, Filter, SqlValue};
use crate::sql_utils::{comma_list, quote_ident, quote_literal};
use crate::table_name::TableName;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;
use uuid::Uuid;

/// Default location of the email template store.
pub const EMAIL_TEMPLATES_TABLE: &str = "communications.email_templates";

define_catalog_key! {
    /// Lookup name of an email template, e.g. `template-event-approval`.
    pub struct TemplateName;
}

fn default_store() -> TableName {
    TableName::from(EMAIL_TEMPLATES_TABLE)
}

fn default_true() -> bool {
    true
}

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_pattern() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("valid regex")
    })
}

/// Extract the `{{Token}}` placeholder names referenced by a template body.
///
/// Block helpers such as `{{#if X}}` are not placeholders and are skipped.
pub fn placeholders(body: &str) -> BTreeSet<String> {
    placeholder_pattern()
        .captures_iter(body)
        .map(|c| c[1].to_string())
        .collect()
}

/// Tokens present in only one of the two bodies of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderMismatch {
    pub only_in_text: BTreeSet<String>,
    pub only_in_html: BTreeSet<String>,
}

/// A template row as authored in a change unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Stable id; derived from the name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: TemplateName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub subject_template: String,
    pub text_template: String,
    pub html_template: String,
    #[serde(rename = "type")]
    pub template_type: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl EmailTemplate {
    /// A transactional `System` template.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not a valid [`TemplateName`]; use
    /// [`try_new`](Self::try_new) for names that are not literals.
    pub fn new(name: &str, subject: &str, text: &str, html: &str) -> Self {
        Self::with_name(TemplateName::new(name), subject, text, html)
    }

    /// Like [`new`](Self::new), returning `None` for an invalid name.
    pub fn try_new(name: &str, subject: &str, text: &str, html: &str) -> Option<Self> {
        TemplateName::try_new(name).map(|name| Self::with_name(name, subject, text, html))
    }

    fn with_name(name: TemplateName, subject: &str, text: &str, html: &str) -> Self {
        Self {
            id: None,
            name,
            description: None,
            subject_template: subject.to_string(),
            text_template: text.to_string(),
            html_template: html.to_string(),
            template_type: "Transactional".to_string(),
            category: "System".to_string(),
            is_active: true,
        }
    }

    pub fn resolved_id(&self) -> Uuid {
        self.id
            .unwrap_or_else(|| derive_id(&["email_template", self.name.as_str()]))
    }

    /// Compare the tokens used by the text and html bodies. The subject is
    /// not part of the comparison.
    pub fn placeholder_mismatch(&self) -> Option<PlaceholderMismatch> {
        let text = placeholders(&self.text_template);
        let html = placeholders(&self.html_template);
        if text == html {
            return None;
        }
        Some(PlaceholderMismatch {
            only_in_text: text.difference(&html).cloned().collect(),
            only_in_html: html.difference(&text).cloned().collect(),
        })
    }
}

/// One `from -> to` pair in a rename batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRename {
    pub from: TemplateName,
    pub to: TemplateName,
}

/// Email template store operations, tagged by `action` in change-unit files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EmailTemplateOp {
    CreateStore {
        #[serde(default = "default_store")]
        table: TableName,
    },
    DropStore {
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Insert a template unless one with the same name exists.
    Create {
        template: EmailTemplate,
        #[serde(default = "default_store")]
        table: TableName,
    },
    Remove {
        names: Vec<TemplateName>,
        #[serde(default = "default_store")]
        table: TableName,
    },
    Rename {
        from: TemplateName,
        to: TemplateName,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Several renames in one step; must be a bijection without chains.
    RenameAll {
        renames: Vec<TemplateRename>,
        #[serde(default = "default_store")]
        table: TableName,
    },
    /// Replace body text of an existing template in place.
    UpdateContent {
        name: TemplateName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subject_template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_template: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html_template: Option<String>,
        #[serde(default = "default_store")]
        table: TableName,
    },
}

/// Canonical DDL of the email template store.
pub fn store_definition(table: &TableName) -> CreateTable {
    let mut ct = CreateTable::new(
        table.clone(),
        vec![
            ColumnDef::new("id", "UUID").not_null(),
            ColumnDef::new("name", "VARCHAR(200)").not_null(),
            ColumnDef::new("description", "VARCHAR"),
            ColumnDef::new("subject_template", "VARCHAR").not_null(),
            ColumnDef::new("text_template", "VARCHAR").not_null(),
            ColumnDef::new("html_template", "VARCHAR").not_null(),
            ColumnDef::new("type", "VARCHAR(50)").not_null(),
            ColumnDef::new("category", "VARCHAR(50)").not_null(),
            ColumnDef::new("is_active", "BOOLEAN")
                .not_null()
                .default_value(true),
            ColumnDef::new("created_at", "TIMESTAMP")
                .not_null()
                .default_value(SqlValue::expr("now()")),
            ColumnDef::new("updated_at", "TIMESTAMP"),
        ],
    );
    ct.primary_key = vec!["id".to_string()];
    ct.unique = vec![vec!["name".to_string()]];
    ct
}

/// Check that a rename batch is a bijection with no chains.
///
/// Sources and targets must each be distinct, no pair may be a no-op, and no
/// target may also be a source in the same batch (that would make the result
/// depend on statement order).
pub fn validate_renames(renames: &[TemplateRename]) -> CoreResult<()> {
    if renames.is_empty() {
        return Err(invalid("rename_all has no renames".to_string()));
    }
    let mut sources = HashSet::new();
    let mut targets = HashSet::new();
    for r in renames {
        if r.from == r.to {
            return Err(invalid(format!("rename of '{}' to itself", r.from)));
        }
        if !sources.insert(r.from.as_str()) {
            return Err(invalid(format!("'{}' renamed twice", r.from)));
        }
        if !targets.insert(r.to.as_str()) {
            return Err(invalid(format!("two templates renamed to '{}'", r.to)));
        }
    }
    if let Some(chained) = targets.iter().find(|t| sources.contains(*t)) {
        return Err(invalid(format!(
            "'{chained}' is both a rename source and a rename target"
        )));
    }
    Ok(())
}

fn invalid(message: String) -> CoreError {
    CoreError::InvalidCatalogOp { message }
}

fn name_filter(name: &TemplateName) -> Filter {
    let mut filter = Filter::new();
    filter.insert("name".to_string(), SqlValue::text(name.as_str()));
    filter
}

fn render_rename(table: &TableName, from: &TemplateName, to: &TemplateName) -> String {
    format!(
        "UPDATE {} SET \"name\" = {} WHERE {}",
        table.quoted(),
        quote_literal(to),
        render_filter(&name_filter(from))
    )
}

impl EmailTemplateOp {
    pub fn summary(&self) -> String {
        match self {
            EmailTemplateOp::CreateStore { table } => format!("create_store {table}"),
            EmailTemplateOp::DropStore { table } => format!("drop_store {table}"),
            EmailTemplateOp::Create { template, .. } => format!("create {}", template.name),
            EmailTemplateOp::Remove { names, .. } => match names.as_slice() {
                [one] => format!("remove {one}"),
                many => format!("remove x{}", many.len()),
            },
            EmailTemplateOp::Rename { from, to, .. } => format!("rename {from} -> {to}"),
            EmailTemplateOp::RenameAll { renames, .. } => format!("rename_all x{}", renames.len()),
            EmailTemplateOp::UpdateContent { name, .. } => format!("update_content {name}"),
        }
    }

    pub fn store(&self) -> &TableName {
        match self {
            EmailTemplateOp::CreateStore { table }
            | EmailTemplateOp::DropStore { table }
            | EmailTemplateOp::Create { table, .. }
            | EmailTemplateOp::Remove { table, .. }
            | EmailTemplateOp::Rename { table, .. }
            | EmailTemplateOp::RenameAll { table, .. }
            | EmailTemplateOp::UpdateContent { table, .. } => table,
        }
    }

    /// `(from, to)` pairs this operation renames.
    pub fn renames(&self) -> Vec<(&TemplateName, &TemplateName)> {
        match self {
            EmailTemplateOp::Rename { from, to, .. } => vec![(from, to)],
            EmailTemplateOp::RenameAll { renames, .. } => {
                renames.iter().map(|r| (&r.from, &r.to)).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        match self {
            EmailTemplateOp::Remove { names, .. } if names.is_empty() => {
                Err(invalid("remove needs at least one template name".to_string()))
            }
            EmailTemplateOp::Rename { from, to, .. } if from == to => {
                Err(invalid(format!("rename of '{from}' to itself")))
            }
            EmailTemplateOp::RenameAll { renames, .. } => validate_renames(renames),
            EmailTemplateOp::UpdateContent {
                name,
                subject_template: None,
                text_template: None,
                html_template: None,
                ..
            } => Err(invalid(format!("update_content of '{name}' changes nothing"))),
            _ => Ok(()),
        }
    }

    pub fn to_sql(&self) -> CoreResult<Vec<String>> {
        self.validate()?;
        let stmts = match self {
            EmailTemplateOp::CreateStore { table } => {
                crate::operation::Operation::CreateTable(store_definition(table)).to_sql()?
            }
            EmailTemplateOp::DropStore { table } => {
                vec![format!("DROP TABLE {}", table.quoted())]
            }
            EmailTemplateOp::Create { template, table } => {
                let values = [
                    SqlValue::Text(template.resolved_id().to_string()),
                    SqlValue::text(template.name.as_str()),
                    SqlValue::from(template.description.clone()),
                    SqlValue::text(template.subject_template.as_str()),
                    SqlValue::text(template.text_template.as_str()),
                    SqlValue::text(template.html_template.as_str()),
                    SqlValue::text(template.template_type.as_str()),
                    SqlValue::text(template.category.as_str()),
                    SqlValue::from(template.is_active),
                ];
                vec![format!(
                    "INSERT INTO {t} (\"id\", \"name\", \"description\", \"subject_template\", \"text_template\", \"html_template\", \"type\", \"category\", \"is_active\")\nSELECT {values}\nWHERE NOT EXISTS (SELECT 1 FROM {t} WHERE {filter})",
                    t = table.quoted(),
                    values = comma_list(values.iter().map(SqlValue::to_sql)),
                    filter = render_filter(&name_filter(&template.name)),
                )]
            }
            EmailTemplateOp::Remove { names, table } => vec![format!(
                "DELETE FROM {} WHERE \"name\" IN ({})",
                table.quoted(),
                comma_list(names.iter().map(|n| quote_literal(n)))
            )],
            EmailTemplateOp::Rename { from, to, table } => vec![render_rename(table, from, to)],
            EmailTemplateOp::RenameAll { renames, table } => renames
                .iter()
                .map(|r| render_rename(table, &r.from, &r.to))
                .collect(),
            EmailTemplateOp::UpdateContent {
                name,
                subject_template,
                text_template,
                html_template,
                table,
            } => {
                let set = [
                    ("subject_template", subject_template),
                    ("text_template", text_template),
                    ("html_template", html_template),
                ]
                .into_iter()
                .filter_map(|(col, body)| {
                    body.as_ref()
                        .map(|b| format!("{} = {}", quote_ident(col), quote_literal(b)))
                });
                vec![format!(
                    "UPDATE {} SET {} WHERE {}",
                    table.quoted(),
                    comma_list(set),
                    render_filter(&name_filter(name))
                )]
            }
        };
        Ok(stmts)
    }
}

#[cfg(test)]
#[path = "email_template_test.rs"]
mod tests;
