//! Read-only SQL guard
//!
//! Generated statements come from an untrusted text generator, so admission
//! is an allow-list over the parsed AST rather than a denial-list of
//! substrings: the statement must be a single `SELECT` query (read-only CTEs
//! permitted) whose every relation is either a CTE defined in the statement
//! or a table known to the schema catalog. A token-level keyword scan runs
//! first so mutation verbs are rejected wherever they appear outside string
//! literals and quoted identifiers.
//!
//! Pure function of (sql, catalog): no network, no store access.

use sqlparser::ast::{ObjectName, SetExpr, Statement, Visit, Visitor};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use statviz_catalog::SchemaCatalog;
use std::collections::HashSet;
use std::ops::ControlFlow;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("SQL parse error: {0}")]
    Parse(String),

    #[error("Forbidden keyword in statement: {0}")]
    ForbiddenKeyword(String),

    #[error("Expected a single statement, found {0}")]
    MultipleStatements(usize),

    #[error("Not a read-only query: {0}")]
    NotReadOnly(String),

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),
}

/// Verbs that mutate data, change schema, or reach outside the store.
/// Rejected as bare word tokens anywhere in the statement.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "CALL", "EXECUTE", "EXEC", "COMMENT", "VACUUM", "ANALYZE", "COPY", "ATTACH",
    "DETACH", "INSTALL", "LOAD", "PRAGMA", "SET",
];

/// Validate a statement against the read-only grammar and the catalog.
///
/// Returns the statement re-serialized from its AST: a canonical single
/// statement with comments and any trailing semicolon stripped.
pub fn validate(sql: &str, catalog: &SchemaCatalog) -> Result<String, GuardError> {
    let dialect = DuckDbDialect {};

    // Keyword scan on raw tokens. String literals tokenize as literals and
    // quoted identifiers carry a quote style, so neither can trip this.
    let tokens = Tokenizer::new(&dialect, sql)
        .tokenize()
        .map_err(|e| GuardError::Parse(e.to_string()))?;
    for token in &tokens {
        if let Token::Word(word) = token {
            if word.quote_style.is_none() {
                let upper = word.value.to_uppercase();
                if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                    return Err(GuardError::ForbiddenKeyword(upper));
                }
            }
        }
    }

    let statements = Parser::parse_sql(&dialect, sql).map_err(|e| GuardError::Parse(e.to_string()))?;
    if statements.len() != 1 {
        return Err(GuardError::MultipleStatements(statements.len()));
    }

    let statement = &statements[0];
    match statement {
        Statement::Query(_) => {}
        other => {
            return Err(GuardError::NotReadOnly(format!(
                "statement must be a SELECT query, found: {}",
                summarize(other)
            )))
        }
    }

    let mut visitor = ReadOnlyVisitor {
        catalog,
        ctes: HashSet::new(),
    };
    if let ControlFlow::Break(err) = statement.visit(&mut visitor) {
        return Err(err);
    }

    Ok(statement.to_string())
}

fn summarize(statement: &Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace().take(3).collect::<Vec<_>>().join(" ")
}

/// Walks every query node and relation in the statement: collects CTE
/// names, rejects non-SELECT bodies, locking clauses, `SELECT INTO`, and
/// relations outside the catalog. Table-valued functions (read_csv and
/// friends) fall out as unknown relations since the catalog holds none.
struct ReadOnlyVisitor<'a> {
    catalog: &'a SchemaCatalog,
    ctes: HashSet<String>,
}

impl Visitor for ReadOnlyVisitor<'_> {
    type Break = GuardError;

    fn pre_visit_query(&mut self, query: &sqlparser::ast::Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.insert(cte.alias.name.value.to_lowercase());
            }
        }

        if !query.locks.is_empty() {
            return ControlFlow::Break(GuardError::NotReadOnly(
                "locking clause is not allowed".to_string(),
            ));
        }

        match query.body.as_ref() {
            SetExpr::Select(select) => {
                if select.into.is_some() {
                    return ControlFlow::Break(GuardError::NotReadOnly(
                        "SELECT INTO is not allowed".to_string(),
                    ));
                }
            }
            SetExpr::Query(_) | SetExpr::SetOperation { .. } | SetExpr::Values(_) => {}
            other => {
                return ControlFlow::Break(GuardError::NotReadOnly(format!(
                    "unsupported query body: {}",
                    other
                )))
            }
        }

        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts: Vec<&str> = relation.0.iter().map(|ident| ident.value.as_str()).collect();
        let known = match parts.as_slice() {
            [table] => self.ctes.contains(&table.to_lowercase()) || self.catalog.has_table(table),
            [schema, table] => self.catalog.has_schema(schema) && self.catalog.has_table(table),
            _ => false,
        };
        if !known {
            return ControlFlow::Break(GuardError::UnknownRelation(relation.to_string()));
        }
        ControlFlow::Continue(())
    }
}
