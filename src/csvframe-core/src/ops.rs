//! Recorded transformation steps
//!
//! Every chained call on a [`DataFrame`](crate::DataFrame) appends one
//! [`Operation`]. Nothing runs at that point; the operations are folded into a
//! [`QueryState`] in order when results are requested. An operation only ever
//! looks at the state, never at the other operations, so folding is strictly
//! order dependent: the same operations in a different order may produce a
//! different state.

use std::collections::HashSet;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::state::{
    normalize_column_name, CastSpec, FillSpec, JoinClause, JoinKind, JoinOn, Mutation,
    QueryState, RenameEntry, SortKey, Suffixes,
};
use crate::value::Value;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("identifier pattern is valid")
});

/// A join recorded against the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOp {
    /// Alias of the joined relation
    pub alias: String,
    /// The joined pipeline compiled into a subquery
    pub subquery: Option<String>,
    /// Files the joined pipeline reads
    pub files: Vec<PathBuf>,
    /// Join condition
    pub on: JoinOn,
    /// Join kind
    pub kind: JoinKind,
    /// Suffix pair for colliding columns
    pub suffixes: Suffixes,
    /// Output names of the subquery's computed expressions
    pub computed: Vec<String>,
}

/// One recorded, not yet executed, transformation step
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Append a WHERE predicate
    Filter {
        /// Predicate text, passed through verbatim
        expr: String,
    },
    /// Replace the projection
    Select {
        /// Requested columns
        columns: Vec<String>,
    },
    /// Remove columns from the result
    Drop {
        /// Columns to drop
        columns: Vec<String>,
    },
    /// Rename columns
    Rename {
        /// `(old, new)` pairs in caller order
        mapping: Vec<(String, String)>,
    },
    /// Add or replace a derived column
    Mutate {
        /// Output column
        column: String,
        /// Expression text written against current column names
        expr: String,
    },
    /// Order the result
    Sort {
        /// Sort column
        column: String,
        /// Ascending when true
        ascending: bool,
    },
    /// Cast a column to a SQL type
    Cast {
        /// Column to cast
        column: String,
        /// Target SQL type
        dtype: String,
    },
    /// Keep only rows where every listed column is non-null
    DropNa {
        /// Columns that must be non-null
        columns: Vec<String>,
    },
    /// Replace nulls in a column
    FillNa {
        /// Column to fill
        column: String,
        /// Replacement value
        value: Value,
    },
    /// Join another pipeline
    Join(JoinOp),
}

impl Operation {
    /// Files this operation needs in addition to the pipeline's own source
    #[must_use]
    pub fn required_files(&self) -> &[PathBuf] {
        match self {
            Operation::Join(join) => &join.files,
            _ => &[],
        }
    }

    /// Fold this operation into the query state
    pub fn apply(&self, state: &mut QueryState) {
        match self {
            Operation::Filter { expr } => state.filters.push(expr.clone()),
            Operation::Select { columns } => apply_select(state, columns),
            Operation::Drop { columns } => apply_drop(state, columns),
            Operation::Rename { mapping } => apply_rename(state, mapping),
            Operation::Mutate { column, expr } => apply_mutate(state, column, expr),
            Operation::Sort { column, ascending } => state.sorts.push(SortKey {
                column: normalize_column_name(column),
                ascending: *ascending,
            }),
            Operation::Cast { column, dtype } => apply_cast(state, column, dtype),
            Operation::DropNa { columns } => {
                for column in columns {
                    let original = state.resolve_original_column(column);
                    state.filters.push(format!("{original} IS NOT NULL"));
                }
            }
            Operation::FillNa { column, value } => apply_fill_na(state, column, value),
            Operation::Join(join) => apply_join(state, join),
        }
    }

    /// Short human readable description, used in debug logging
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Operation::Filter { expr } => format!("filter({expr})"),
            Operation::Select { columns } => format!("select({})", columns.join(", ")),
            Operation::Drop { columns } => format!("drop({})", columns.join(", ")),
            Operation::Rename { mapping } => {
                let pairs: Vec<String> = mapping.iter().map(|(o, n)| format!("{o}->{n}")).collect();
                format!("rename({})", pairs.join(", "))
            }
            Operation::Mutate { column, expr } => format!("mutate({column} = {expr})"),
            Operation::Sort { column, ascending } => {
                format!("sort({column} {})", if *ascending { "asc" } else { "desc" })
            }
            Operation::Cast { column, dtype } => format!("cast({column} as {dtype})"),
            Operation::DropNa { columns } => format!("dropna({})", columns.join(", ")),
            Operation::FillNa { column, value } => format!("fillna({column} = {value})"),
            Operation::Join(join) => format!("{} join {}", join.kind.as_str(), join.alias),
        }
    }
}

fn apply_select(state: &mut QueryState, columns: &[String]) {
    let mut seen = HashSet::new();
    let mut cols = Vec::with_capacity(columns.len());
    for column in columns {
        let name = normalize_column_name(column);
        if seen.insert(name.to_lowercase()) {
            cols.push(name);
        }
    }
    state.select_cols = cols;
}

fn apply_drop(state: &mut QueryState, columns: &[String]) {
    for column in columns {
        let mut name = normalize_column_name(column);
        if let Some(dest) = state.renames.get(&name) {
            name = dest.clone();
        }
        if state.excluded_by_selection(&name) {
            state.warn(format!("drop skipped for column {name}: not selected"));
            continue;
        }
        state.drops.insert(name);
    }
    if !state.select_cols.is_empty() {
        let drops = &state.drops;
        state.select_cols.retain(|col| !drops.contains(col));
    }
}

fn apply_rename(state: &mut QueryState, mapping: &[(String, String)]) {
    for (old, new) in mapping {
        let requested_old = normalize_column_name(old);
        let new_col = normalize_column_name(new);
        if state.drops.contains(&new_col) {
            continue;
        }
        let original = state.resolve_original_column(&requested_old);
        let current = state.resolve_current_column(&original);
        if state.excluded_by_selection(&current) {
            state.warn(format!(
                "rename skipped for column {requested_old}: not selected"
            ));
            continue;
        }
        if current == new_col {
            continue;
        }

        state.renames.insert(original.clone(), new_col.clone());
        match state
            .rename_order
            .iter_mut()
            .find(|entry| entry.original == original)
        {
            Some(entry) => entry.current = new_col.clone(),
            None => state.rename_order.push(RenameEntry {
                original,
                current: new_col.clone(),
            }),
        }
        for col in &mut state.select_cols {
            if *col == current {
                *col = new_col.clone();
            }
        }
    }
}

fn apply_mutate(state: &mut QueryState, column: &str, expr: &str) {
    let target = normalize_column_name(&state.resolve_current_column(column));
    let expr = rewrite_expression_with_original_names(expr, &state.rename_order);
    state.mutations.push(Mutation {
        column: target.clone(),
        expr,
    });
    if !state.select_cols.is_empty() && !state.select_cols.contains(&target) {
        state.select_cols.push(target);
    }
}

fn apply_cast(state: &mut QueryState, column: &str, dtype: &str) {
    let original = state.resolve_original_column(column);
    if !state.column_in_selection(&original) && !state.column_in_selection(column) {
        state.warn(format!("cast ignored for column {column}: not selected"));
        return;
    }
    state.casts.push(CastSpec {
        column: original,
        dtype: dtype.to_string(),
    });
}

fn apply_fill_na(state: &mut QueryState, column: &str, value: &Value) {
    let original = state.resolve_original_column(column);
    if !state.column_in_selection(&original) && !state.column_in_selection(column) {
        state.warn(format!("fillna ignored for column {column}: not selected"));
        return;
    }
    state.fill_nas.push(FillSpec {
        column: original,
        value: value.clone(),
    });
}

fn apply_join(state: &mut QueryState, join: &JoinOp) {
    // Last join wins for the active pair.
    if !join.suffixes.is_empty() {
        state.suffixes = join.suffixes.clone();
    }
    state.joins.push(JoinClause {
        alias: join.alias.clone(),
        on: join.on.clone(),
        kind: join.kind,
        subquery: join.subquery.clone(),
        suffixes: join.suffixes.clone(),
        computed: join.computed.clone(),
    });
}

/// Rewrite identifiers that name a renamed column back to the source name
///
/// Only whole identifiers are replaced: renaming `rate` to `rateLimit` turns
/// `rateLimit + rateLimiter` into `rate + rateLimiter`.
#[must_use]
pub fn rewrite_expression_with_original_names(expr: &str, entries: &[RenameEntry]) -> String {
    let mut result = expr.to_string();
    for entry in entries {
        if entry.current.is_empty() || entry.current == entry.original {
            continue;
        }
        result = IDENTIFIER
            .replace_all(&result, |caps: &Captures<'_>| {
                if caps[0] == entry.current {
                    entry.original.clone()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
    }
    result
}
