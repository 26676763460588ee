//! SQL identifier and literal quoting utilities
//!
//! Every statement Strata renders goes through these helpers so that names
//! and values coming from change-unit files never splice raw text into SQL.

/// Quote a SQL identifier.
///
/// Wraps the identifier in double quotes and doubles embedded double quotes,
/// following the SQL standard.
///
/// # Examples
/// ```
/// use st_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("reference_values"), r#""reference_values""#);
/// assert_eq!(quote_ident(r#"odd"name"#), r#""odd""name""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a SQL string literal value by doubling single quotes.
///
/// This is for use inside single-quoted SQL string literals, not identifiers.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render a single-quoted SQL string literal.
///
/// # Examples
/// ```
/// use st_core::sql_utils::quote_literal;
/// assert_eq!(quote_literal("it's"), "'it''s'");
/// ```
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", escape_sql_string(value))
}

/// Join already-quoted fragments with `, `.
pub(crate) fn comma_list<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Quote a list of column names and join them with `, `.
pub(crate) fn quoted_columns(columns: &[String]) -> String {
    comma_list(columns.iter().map(|c| quote_ident(c)))
}
