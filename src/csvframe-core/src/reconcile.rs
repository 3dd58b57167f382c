//! Result reconciliation
//!
//! The compiled query leaves renames, drops and join collisions to be fixed up
//! on the returned rows. Steps run in a fixed order on every row:
//!
//! 1. computed expressions replace the wildcard columns they shadow
//! 2. the same, for computed columns coming out of join subqueries
//! 3. positional duplicates from joins become suffixed names
//! 4. renames, in chain order
//! 5. drops
//! 6. the explicit selection, if any

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::compiler::expression_aliases;
use crate::error::{Error, Result};
use crate::state::{JoinClause, QueryState, RenameEntry, Suffixes};
use crate::value::Row;

static DUPLICATE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_([0-9]+)$").expect("duplicate key pattern is valid"));

static SUBQUERY_DUPLICATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+):[0-9]+(?:_[0-9]+)?$").expect("subquery duplicate pattern is valid")
});

/// Highest positional number treated as a join collision
const MAX_POSITIONAL_SUFFIX: usize = 10;

/// Repair raw engine rows so they match the logical schema of the pipeline
pub fn reconcile(rows: &mut [Row], state: &QueryState) -> Result<()> {
    let aliases = expression_aliases(state);
    for row in rows.iter_mut() {
        collapse_shadowed(row, &aliases);
    }
    fold_subquery_duplicates(rows, &state.joins);
    apply_join_suffixes(rows, &state.joins);

    let computed: HashSet<&str> = aliases.iter().map(String::as_str).collect();
    for row in rows.iter_mut() {
        apply_renames(row, &state.rename_order, &computed);
        for dropped in &state.drops {
            if let Some(key) = resolve_row_key(row, dropped, &state.suffixes) {
                row.shift_remove(&key);
            }
        }
        if !state.select_cols.is_empty() {
            *row = project(row, &state.select_cols, &state.suffixes)?;
        }
    }
    Ok(())
}

/// Re-key the trailing computed columns under their aliases
///
/// The engine numbers duplicate names, so `CAST(age AS INTEGER) AS age`
/// arrives as `age_1` next to the wildcard `age`. Inserting under the alias
/// overwrites the wildcard value in place; a later expression with the same
/// alias overwrites an earlier one.
fn collapse_shadowed(row: &mut Row, aliases: &[String]) {
    if aliases.is_empty() {
        return;
    }
    let tail = row.split_off(row.len().saturating_sub(aliases.len()));
    let skip = aliases.len() - tail.len();
    for (alias, (_, value)) in aliases.iter().skip(skip).zip(tail) {
        row.insert(alias.clone(), value);
    }
}

/// Fold computed columns of join subqueries back onto the columns they replace
///
/// Inside a subquery the engine names a repeated column `name:N`, so
/// `IFNULL(amount, 0) AS amount` arrives as `amount:1` after the wildcard
/// `amount`. The computed value overwrites the closest preceding copy of the
/// column and the `name:N` key is dropped. Keys whose base is not a computed
/// column of some join are left alone.
pub fn fold_subquery_duplicates(rows: &mut [Row], joins: &[JoinClause]) {
    let computed: HashSet<&str> = joins
        .iter()
        .flat_map(|join| join.computed.iter().map(String::as_str))
        .collect();
    if computed.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        if !row.keys().any(|key| subquery_duplicate_base(key, &computed).is_some()) {
            continue;
        }
        let mut next = Row::with_capacity(row.len());
        for (key, value) in row.drain(..) {
            let Some(base) = subquery_duplicate_base(&key, &computed) else {
                next.insert(key, value);
                continue;
            };
            let target = next
                .keys()
                .rev()
                .find(|k| is_same_column(k, base))
                .cloned()
                .unwrap_or_else(|| base.to_string());
            next.insert(target, value);
        }
        *row = next;
    }
}

fn subquery_duplicate_base<'a>(key: &'a str, computed: &HashSet<&str>) -> Option<&'a str> {
    let base = SUBQUERY_DUPLICATE.captures(key)?.get(1)?.as_str();
    computed.contains(base).then_some(base)
}

/// `key` is `base` itself or a positional copy `base_N`
fn is_same_column(key: &str, base: &str) -> bool {
    match key.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Rewrite positional join collisions (`col_1`, `col_2`, ...) into suffixed names
///
/// `col_N` belongs to the N-th join in declaration order. The base copy `col`
/// becomes `col<left>` and `col_N` becomes `col<right>`, using that join's own
/// suffix pair. Both unsuffixed and positional keys are removed.
pub fn apply_join_suffixes(rows: &mut [Row], joins: &[JoinClause]) {
    if joins.is_empty() {
        return;
    }
    for row in rows.iter_mut() {
        let mut left_names: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut right_names: IndexMap<String, String> = IndexMap::new();
        for key in row.keys() {
            let Some((base, n)) = parse_duplicate_key(key, joins.len()) else {
                continue;
            };
            if !row.contains_key(base) {
                continue;
            }
            let suffixes = joins[n - 1].suffixes.or_default();
            left_names
                .entry(base.to_string())
                .or_default()
                .push(format!("{base}{}", suffixes.left));
            right_names.insert(key.clone(), format!("{base}{}", suffixes.right));
        }
        if right_names.is_empty() {
            continue;
        }

        let mut next = Row::with_capacity(row.len());
        for (key, value) in row.drain(..) {
            if let Some(names) = left_names.get(&key) {
                for name in names {
                    next.insert(name.clone(), value.clone());
                }
            } else if let Some(name) = right_names.get(&key) {
                next.insert(name.clone(), value);
            } else {
                next.insert(key, value);
            }
        }
        *row = next;
    }
}

/// Split an engine-generated positional duplicate name into `(base, n)`
///
/// This is a compatibility shim over the engine's naming of duplicate result
/// columns. Only `n` in `1..=10` and no greater than the number of joins is
/// accepted, so a real column such as `year_2025` is left alone. If the engine
/// ever changes how it names duplicates, this is the one place to adapt.
#[must_use]
pub fn parse_duplicate_key(key: &str, join_count: usize) -> Option<(&str, usize)> {
    let caps = DUPLICATE_KEY.captures(key)?;
    let base = caps.get(1)?.as_str();
    let n: usize = caps.get(2)?.as_str().parse().ok()?;
    if n == 0 || n > MAX_POSITIONAL_SUFFIX || n > join_count {
        return None;
    }
    Some((base, n))
}

fn apply_renames(row: &mut Row, entries: &[RenameEntry], computed: &HashSet<&str>) {
    for entry in entries {
        if !row.contains_key(&entry.original) {
            continue;
        }
        if computed.contains(entry.current.as_str()) && row.contains_key(&entry.current) {
            // The computed column already carries the value under the new name.
            row.shift_remove(&entry.original);
            continue;
        }
        if let Some((idx, _, value)) = row.shift_remove_full(&entry.original) {
            row.shift_remove(&entry.current);
            let idx = idx.min(row.len());
            row.shift_insert(idx, entry.current.clone(), value);
        }
    }
}

fn project(row: &Row, columns: &[String], suffixes: &Suffixes) -> Result<Row> {
    let mut next = Row::with_capacity(columns.len());
    for column in columns {
        let key = resolve_row_key(row, column, suffixes)
            .ok_or_else(|| Error::ColumnNotFound(column.clone()))?;
        if let Some(value) = row.get(&key) {
            next.insert(key, value.clone());
        }
    }
    Ok(next)
}

/// Find the key in `row` that holds the logical column `name`
///
/// Tries the exact name, then the part after the last dot. Names that are
/// qualified or already carry a join suffix also try `<name><suffix>` for the
/// active suffix pair and then the default `_x`/`_y` pair, left first.
#[must_use]
pub fn resolve_row_key(row: &Row, name: &str, active: &Suffixes) -> Option<String> {
    let mut candidates = vec![name];
    if let Some(idx) = name.rfind('.') {
        if idx + 1 < name.len() {
            candidates.push(&name[idx + 1..]);
        }
    }
    if let Some(found) = candidates.iter().find(|c| !c.is_empty() && row.contains_key(**c)) {
        return Some((*found).to_string());
    }

    let defaults = Suffixes::default();
    let pairs: Vec<&Suffixes> = if active.is_empty() || *active == defaults {
        vec![&defaults]
    } else {
        vec![active, &defaults]
    };
    let has_suffix = pairs.iter().any(|pair| {
        (!pair.left.is_empty() && name.ends_with(pair.left.as_str()))
            || (!pair.right.is_empty() && name.ends_with(pair.right.as_str()))
    });
    if !name.contains('.') && !has_suffix {
        return None;
    }
    for base in &candidates {
        for pair in &pairs {
            for suffix in [&pair.left, &pair.right] {
                let candidate = format!("{base}{suffix}");
                if row.contains_key(&candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CastSpec, FillSpec, JoinKind, JoinOn, Mutation, WarningBag};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn join(alias: &str, suffixes: Suffixes) -> JoinClause {
        JoinClause {
            alias: alias.to_string(),
            on: JoinOn::Keys(vec!["id".to_string()]),
            kind: JoinKind::Inner,
            subquery: None,
            suffixes,
            computed: Vec::new(),
        }
    }

    #[test]
    fn test_parse_duplicate_key_bounds() {
        assert_eq!(parse_duplicate_key("val_1", 1), Some(("val", 1)));
        assert_eq!(parse_duplicate_key("val_2", 1), None);
        assert_eq!(parse_duplicate_key("val_0", 3), None);
        assert_eq!(parse_duplicate_key("year_2025", 20), None);
        assert_eq!(parse_duplicate_key("val_11", 20), None);
        assert_eq!(parse_duplicate_key("val", 3), None);
    }

    #[test]
    fn test_join_suffixes_use_each_joins_pair() {
        let joins = vec![
            join("b", Suffixes::new("_A", "_B")),
            join("c", Suffixes::new("_L", "_C")),
        ];
        let mut rows = vec![row(&[
            ("id", Value::Int(1)),
            ("val", Value::string("a")),
            ("id_1", Value::Int(1)),
            ("val_1", Value::string("b")),
            ("id_2", Value::Int(1)),
            ("val_2", Value::string("c")),
        ])];
        apply_join_suffixes(&mut rows, &joins);
        let r = &rows[0];
        assert_eq!(r.get("val_A"), Some(&Value::string("a")));
        assert_eq!(r.get("val_B"), Some(&Value::string("b")));
        assert_eq!(r.get("val_C"), Some(&Value::string("c")));
        assert_eq!(r.get("val_L"), Some(&Value::string("a")));
        assert!(!r.contains_key("val"));
        assert!(!r.contains_key("val_1"));
        assert!(!r.contains_key("val_2"));
        assert!(!r.contains_key("id"));
    }

    #[test]
    fn test_join_suffixes_ignore_real_numbered_columns() {
        let joins = vec![join("b", Suffixes::default())];
        let mut rows = vec![row(&[
            ("score_1", Value::Int(5)),
            ("year_2025", Value::Int(1)),
            ("year", Value::Int(2)),
        ])];
        apply_join_suffixes(&mut rows, &joins);
        assert_eq!(
            rows[0].keys().collect::<Vec<_>>(),
            vec!["score_1", "year_2025", "year"]
        );
    }

    #[test]
    fn test_resolve_row_key_prefers_left_suffix() {
        let r = row(&[
            ("foo_y", Value::Int(2)),
            ("foo_x", Value::Int(1)),
            ("foo_2", Value::Int(3)),
        ]);
        let active = Suffixes::default();
        assert_eq!(resolve_row_key(&r, "tbl.foo", &active).as_deref(), Some("foo_x"));
        assert_eq!(resolve_row_key(&r, "foo", &active), None);
        assert_eq!(resolve_row_key(&r, "foo_y", &active).as_deref(), Some("foo_y"));
    }

    #[test]
    fn test_resolve_row_key_dotted_header() {
        let r = row(&[("A.B", Value::Int(1)), ("B", Value::Int(2))]);
        let active = Suffixes::default();
        assert_eq!(resolve_row_key(&r, "A.B", &active).as_deref(), Some("A.B"));
        assert_eq!(resolve_row_key(&r, "X.B", &active).as_deref(), Some("B"));
    }

    #[test]
    fn test_subquery_fill_overwrites_joined_column() {
        let mut joined = join("orders", Suffixes::default());
        joined.computed = vec!["amount".to_string()];
        let mut rows = vec![row(&[
            ("id", Value::Int(3)),
            ("name", Value::string("Denis")),
            ("id_1", Value::Int(3)),
            ("amount", Value::Null),
            ("amount:1", Value::Int(0)),
        ])];
        fold_subquery_duplicates(&mut rows, &[joined]);
        assert_eq!(
            rows[0],
            row(&[
                ("id", Value::Int(3)),
                ("name", Value::string("Denis")),
                ("id_1", Value::Int(3)),
                ("amount", Value::Int(0)),
            ])
        );
    }

    #[test]
    fn test_subquery_fold_targets_positional_copy() {
        let mut joined = join("orders", Suffixes::default());
        joined.computed = vec!["amount".to_string()];
        let mut rows = vec![row(&[
            ("id", Value::Int(1)),
            ("amount", Value::Int(99)),
            ("id_1", Value::Int(1)),
            ("amount_1", Value::Null),
            ("amount:1", Value::Int(0)),
        ])];
        fold_subquery_duplicates(&mut rows, std::slice::from_ref(&joined));
        apply_join_suffixes(&mut rows, &[joined]);
        let r = &rows[0];
        assert_eq!(r.get("amount_x"), Some(&Value::Int(99)));
        assert_eq!(r.get("amount_y"), Some(&Value::Int(0)));
        assert!(!r.keys().any(|k| k.contains(':')));
    }

    #[test]
    fn test_colon_columns_untouched_without_computed_joins() {
        let mut rows = vec![row(&[("a", Value::Int(1)), ("a:1", Value::Int(2))])];
        fold_subquery_duplicates(&mut rows, &[join("b", Suffixes::default())]);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["a", "a:1"]);

        let mut joined = join("b", Suffixes::default());
        joined.computed = vec!["other".to_string()];
        fold_subquery_duplicates(&mut rows, &[joined]);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["a", "a:1"]);
    }

    #[test]
    fn test_is_same_column() {
        assert!(is_same_column("amount", "amount"));
        assert!(is_same_column("amount_2", "amount"));
        assert!(!is_same_column("amount_", "amount"));
        assert!(!is_same_column("amount_x", "amount"));
        assert!(!is_same_column("amounts", "amount"));
    }

    #[test]
    fn test_cast_then_fill_collapses_to_one_column() {
        let mut state = QueryState::new("people", WarningBag::new());
        state.casts.push(CastSpec {
            column: "age".to_string(),
            dtype: "INTEGER".to_string(),
        });
        state.fill_nas.push(FillSpec {
            column: "age".to_string(),
            value: Value::Int(0),
        });
        let mut rows = vec![row(&[
            ("name", Value::string("Gina")),
            ("age", Value::Null),
            ("age_1", Value::Null),
            ("age_2", Value::Int(0)),
        ])];
        reconcile(&mut rows, &state).unwrap();
        assert_eq!(
            rows[0],
            row(&[("name", Value::string("Gina")), ("age", Value::Int(0))])
        );
    }

    #[test]
    fn test_rename_does_not_clobber_computed_column() {
        let mut state = QueryState::new("t", WarningBag::new());
        state.rename_order.push(RenameEntry {
            original: "a".to_string(),
            current: "x".to_string(),
        });
        state.mutations.push(Mutation {
            column: "x".to_string(),
            expr: "a + 5".to_string(),
        });
        let mut rows = vec![row(&[("a", Value::Int(1)), ("x", Value::Int(6))])];
        reconcile(&mut rows, &state).unwrap();
        assert_eq!(rows[0], row(&[("x", Value::Int(6))]));
    }

    #[test]
    fn test_renames_keep_column_position() {
        let mut state = QueryState::new("t", WarningBag::new());
        state.rename_order.push(RenameEntry {
            original: "a".to_string(),
            current: "z".to_string(),
        });
        let mut rows = vec![row(&[
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
        ])];
        reconcile(&mut rows, &state).unwrap();
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["z", "b"]);
    }

    #[test]
    fn test_drops_and_projection() {
        let mut state = QueryState::new("t", WarningBag::new());
        state.drops.insert("b".to_string());
        state.select_cols = vec!["c".to_string(), "a".to_string()];
        let mut rows = vec![row(&[
            ("a", Value::Int(1)),
            ("b", Value::Int(2)),
            ("c", Value::Int(3)),
        ])];
        reconcile(&mut rows, &state).unwrap();
        assert_eq!(rows[0], row(&[("c", Value::Int(3)), ("a", Value::Int(1))]));
    }

    #[test]
    fn test_missing_selected_column_is_fatal() {
        let mut state = QueryState::new("t", WarningBag::new());
        state.select_cols = vec!["ghost".to_string()];
        let mut rows = vec![row(&[("a", Value::Int(1))])];
        let err = reconcile(&mut rows, &state).unwrap_err();
        assert_eq!(err.to_string(), "column ghost not found");
    }
}
