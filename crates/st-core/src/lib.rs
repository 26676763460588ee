//! st-core - Core library for Strata
//!
//! This crate provides configuration parsing, change-unit identifiers and
//! loading, the operation primitives change units are built from, the
//! reference value and email template catalog conventions, and the symbolic
//! schema model behind the round-trip lint.

pub mod change_unit;
pub mod checksum;
pub mod config;
pub mod email_template;
pub mod error;
pub mod lint;
pub mod metadata;
mod newtype_string;
pub mod operation;
pub mod project;
pub mod reference_value;
pub mod schema_model;
pub mod sql_utils;
pub mod table_name;
pub mod unit_id;

pub use change_unit::{ChangeUnit, Direction, Reversibility};
pub use checksum::{compute_checksum, derive_id};
pub use config::{Config, DatabaseConfig, DbType, LockConfig};
pub use email_template::{EmailTemplate, EmailTemplateOp, TemplateName, TemplateRename};
pub use error::{CoreError, CoreResult};
pub use lint::{lint_units, Finding, Severity};
pub use metadata::Metadata;
pub use operation::{ColumnDef, CreateTable, Operation, SqlValue};
pub use project::Project;
pub use reference_value::{EnumType, ReferenceValue, ReferenceValueOp};
pub use schema_model::{Probe, SchemaModel};
pub use table_name::TableName;
pub use unit_id::ChangeUnitId;
