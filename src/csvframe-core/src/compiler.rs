//! Query compiler
//!
//! Turns a folded [`QueryState`] into one SQL statement. Compilation is pure:
//! the same state and limit always produce the same text.
//!
//! Projection order is fixed. Wildcards come first, then casts, fills,
//! mutations and (for join subqueries) inline renames. Later expressions may
//! carry the same output name as a wildcard column; the reconciler relies on
//! that order to let the last expression win.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::{JoinClause, JoinOn, QueryState, RenameEntry};
use crate::value::Value;

static SIMPLE_JOIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+(\.\w+)?\s*=\s*\w+(\.\w+)?$").expect("join pattern is valid")
});

/// Compile the state into a single SELECT statement
#[must_use]
pub fn compile(state: &QueryState, limit: Option<usize>) -> String {
    let mut sql = String::from("SELECT ");
    sql.push_str(&build_select_expressions(state).join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&state.base_table);

    for join in &state.joins {
        sql.push(' ');
        sql.push_str(join.kind.keyword());
        match &join.subquery {
            Some(subquery) if !subquery.is_empty() => {
                sql.push_str(" (");
                sql.push_str(subquery);
                sql.push_str(") AS ");
            }
            _ => sql.push(' '),
        }
        sql.push_str(&join.alias);
        sql.push_str(" ON ");
        sql.push_str(&join_condition(&state.base_table, join));
    }

    if !state.filters.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&state.filters.join(" AND "));
    }

    if !state.sorts.is_empty() {
        let keys: Vec<String> = state
            .sorts
            .iter()
            .map(|key| {
                let column = resolve_sort_column(state, &key.column);
                if key.ascending {
                    column
                } else {
                    format!("{column} DESC")
                }
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    sql
}

/// Projection list in emission order
#[must_use]
pub fn build_select_expressions(state: &QueryState) -> Vec<String> {
    let mut exprs = Vec::with_capacity(1 + state.joins.len() + expression_aliases(state).len());
    exprs.push(format!("{}.*", state.base_table));
    for join in &state.joins {
        exprs.push(format!("{}.*", join.alias));
    }
    for cast in &state.casts {
        exprs.push(format!(
            "CAST({col} AS {ty}) AS {alias}",
            col = cast.column,
            ty = cast.dtype,
            alias = output_name(state, &cast.column)
        ));
    }
    for fill in &state.fill_nas {
        exprs.push(format!(
            "IFNULL({col}, {lit}) AS {alias}",
            col = fill.column,
            lit = literal(&fill.value),
            alias = output_name(state, &fill.column)
        ));
    }
    for mutation in &state.mutations {
        exprs.push(format!(
            "({}) AS {}",
            mutation.expr,
            output_name(state, &mutation.column)
        ));
    }
    for entry in inline_renames(state) {
        exprs.push(format!("{} AS {}", entry.original, entry.current));
    }
    exprs
}

/// Output names of every computed projection expression, in emission order
///
/// These are the columns that follow the wildcards in a result row.
#[must_use]
pub fn expression_aliases(state: &QueryState) -> Vec<String> {
    let mut aliases = computed_outputs(state);
    aliases.extend(inline_renames(state).map(|e| e.current.clone()));
    aliases
}

/// Name a computed expression is emitted under
///
/// Join subqueries carry their renames inline, and a SELECT list cannot refer
/// to its own aliases, so a renamed computed column is emitted directly under
/// its new name.
fn output_name<'a>(state: &'a QueryState, column: &'a str) -> &'a str {
    if state.inline_renames {
        if let Some(entry) = state.rename_order.iter().find(|e| e.original == column) {
            return &entry.current;
        }
    }
    column
}

fn computed_outputs(state: &QueryState) -> Vec<String> {
    state
        .casts
        .iter()
        .map(|c| c.column.as_str())
        .chain(state.fill_nas.iter().map(|f| f.column.as_str()))
        .chain(state.mutations.iter().map(|m| m.column.as_str()))
        .map(|column| output_name(state, column).to_string())
        .collect()
}

/// Inline `old AS new` renames, skipping names a computed expression already
/// provides
fn inline_renames(state: &QueryState) -> impl Iterator<Item = &RenameEntry> {
    let computed = if state.inline_renames {
        computed_outputs(state)
    } else {
        Vec::new()
    };
    state
        .rename_order
        .iter()
        .filter(move |entry| state.inline_renames && !computed.contains(&entry.current))
}

/// Render the ON condition of a join against the base table
#[must_use]
pub fn join_condition(base: &str, join: &JoinClause) -> String {
    match &join.on {
        JoinOn::Keys(keys) => keys
            .iter()
            .map(|key| format!("{base}.{key} = {alias}.{key}", alias = join.alias))
            .collect::<Vec<_>>()
            .join(" AND "),
        JoinOn::Condition(text) => {
            let cond = text.trim();
            if cond.is_empty() || is_explicit_join_condition(cond) {
                cond.to_string()
            } else {
                format!("{base}.{cond} = {alias}.{cond}", alias = join.alias)
            }
        }
    }
}

/// Whether `cond` already is a complete `ident[.ident] = ident[.ident]` equality
#[must_use]
pub fn is_explicit_join_condition(cond: &str) -> bool {
    SIMPLE_JOIN.is_match(cond)
}

/// Render a value as a SQL literal
#[must_use]
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn resolve_sort_column(state: &QueryState, name: &str) -> String {
    let column = state.resolve_original_column(name);
    if column.is_empty() {
        name.to_string()
    } else {
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        CastSpec, FillSpec, JoinKind, Mutation, RenameEntry, SortKey, Suffixes, WarningBag,
    };
    use pretty_assertions::assert_eq;

    fn state() -> QueryState {
        QueryState::new("users", WarningBag::new())
    }

    fn join(alias: &str, on: JoinOn, kind: JoinKind, subquery: Option<&str>) -> JoinClause {
        JoinClause {
            alias: alias.to_string(),
            on,
            kind,
            subquery: subquery.map(str::to_string),
            suffixes: Suffixes::default(),
            computed: Vec::new(),
        }
    }

    #[test]
    fn test_compile_plain_table() {
        assert_eq!(compile(&state(), None), "SELECT users.* FROM users");
        assert_eq!(compile(&state(), Some(5)), "SELECT users.* FROM users LIMIT 5");
    }

    #[test]
    fn test_compile_clause_order() {
        let mut state = state();
        state.filters = vec!["age > 20".to_string(), "age IS NOT NULL".to_string()];
        state.sorts = vec![
            SortKey {
                column: "age".to_string(),
                ascending: false,
            },
            SortKey {
                column: "name".to_string(),
                ascending: true,
            },
        ];
        state.casts.push(CastSpec {
            column: "age".to_string(),
            dtype: "INTEGER".to_string(),
        });
        state.fill_nas.push(FillSpec {
            column: "name".to_string(),
            value: Value::string("unknown"),
        });
        state.mutations.push(Mutation {
            column: "age_next".to_string(),
            expr: "age + 1".to_string(),
        });
        assert_eq!(
            compile(&state, Some(3)),
            "SELECT users.*, CAST(age AS INTEGER) AS age, IFNULL(name, 'unknown') AS name, \
             (age + 1) AS age_next FROM users WHERE age > 20 AND age IS NOT NULL \
             ORDER BY age DESC, name LIMIT 3"
        );
        assert_eq!(expression_aliases(&state), vec!["age", "name", "age_next"]);
    }

    #[test]
    fn test_sort_resolves_renamed_column() {
        let mut state = state();
        state.rename_order.push(RenameEntry {
            original: "age".to_string(),
            current: "years".to_string(),
        });
        state.sorts.push(SortKey {
            column: "years".to_string(),
            ascending: true,
        });
        assert!(compile(&state, None).ends_with("ORDER BY age"));
    }

    #[test]
    fn test_mutation_precedes_inline_renames() {
        let mut state = QueryState::subquery("orders", WarningBag::new());
        state.rename_order.push(RenameEntry {
            original: "amount".to_string(),
            current: "total".to_string(),
        });
        state.mutations.push(Mutation {
            column: "doubled".to_string(),
            expr: "amount * 2".to_string(),
        });
        let exprs = build_select_expressions(&state);
        assert_eq!(
            exprs,
            vec!["orders.*", "(amount * 2) AS doubled", "amount AS total"]
        );
        assert_eq!(expression_aliases(&state), vec!["doubled", "total"]);
    }

    #[test]
    fn test_subquery_emits_renamed_mutation_under_new_name() {
        let mut state = QueryState::subquery("orders", WarningBag::new());
        state.mutations.push(Mutation {
            column: "doubled".to_string(),
            expr: "amount * 2".to_string(),
        });
        state.rename_order.push(RenameEntry {
            original: "doubled".to_string(),
            current: "twice".to_string(),
        });
        assert_eq!(
            compile(&state, None),
            "SELECT orders.*, (amount * 2) AS twice FROM orders"
        );
        assert_eq!(expression_aliases(&state), vec!["twice"]);
    }

    #[test]
    fn test_subquery_cast_of_renamed_column_replaces_inline_rename() {
        let mut state = QueryState::subquery("orders", WarningBag::new());
        state.rename_order.push(RenameEntry {
            original: "amount".to_string(),
            current: "total".to_string(),
        });
        state.casts.push(CastSpec {
            column: "amount".to_string(),
            dtype: "REAL".to_string(),
        });
        assert_eq!(
            build_select_expressions(&state),
            vec!["orders.*", "CAST(amount AS REAL) AS total"]
        );

        // Top-level queries keep the source name; renames happen on the rows.
        let mut top = state.clone();
        top.inline_renames = false;
        assert_eq!(
            build_select_expressions(&top),
            vec!["orders.*", "CAST(amount AS REAL) AS amount"]
        );
        assert_eq!(expression_aliases(&top), vec!["amount"]);
    }

    #[test]
    fn test_join_rendering() {
        let mut state = state();
        state.joins.push(join(
            "orders_alias_1",
            JoinOn::Keys(vec!["id".to_string(), "region".to_string()]),
            JoinKind::Left,
            Some("SELECT orders.* FROM orders"),
        ));
        state.joins.push(join(
            "teams",
            JoinOn::Condition("team_id".to_string()),
            JoinKind::Full,
            None,
        ));
        assert_eq!(
            compile(&state, None),
            "SELECT users.*, orders_alias_1.*, teams.* FROM users \
             LEFT JOIN (SELECT orders.* FROM orders) AS orders_alias_1 \
             ON users.id = orders_alias_1.id AND users.region = orders_alias_1.region \
             FULL OUTER JOIN teams ON users.team_id = teams.team_id"
        );
    }

    #[test]
    fn test_join_condition_forms() {
        let explicit = join(
            "b",
            JoinOn::Condition("a.id = b.user_id".to_string()),
            JoinKind::Inner,
            None,
        );
        assert_eq!(join_condition("a", &explicit), "a.id = b.user_id");
        let bare = join("b", JoinOn::Condition(" id ".to_string()), JoinKind::Inner, None);
        assert_eq!(join_condition("a", &bare), "a.id = b.id");
    }

    #[test]
    fn test_is_explicit_join_condition() {
        assert!(is_explicit_join_condition("a.id = b.id"));
        assert!(is_explicit_join_condition("id=other_id"));
        assert!(!is_explicit_join_condition("a.id = b.id AND a.x = b.x"));
        assert!(!is_explicit_join_condition(" id = "));
        assert!(!is_explicit_join_condition("id"));
    }

    #[test]
    fn test_literal() {
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::string("O'Brien")), "'O''Brien'");
        assert_eq!(literal(&Value::Bool(true)), "1");
        assert_eq!(literal(&Value::Bool(false)), "0");
        assert_eq!(literal(&Value::Int(42)), "42");
        assert_eq!(literal(&Value::Float(1.5)), "1.5");
    }
}
