//! Accumulated query state
//!
//! A [`QueryState`] is built fresh for every materialization by folding the
//! recorded operations into it in order. It carries everything the compiler
//! needs to render one statement plus the schema bookkeeping (rename history,
//! drops, join suffixes) the reconciler needs to repair returned rows.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexSet;

use crate::value::Value;

/// Left/right suffix pair applied to columns that collide across a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suffixes {
    /// Suffix for the base table's copy of a colliding column
    pub left: String,
    /// Suffix for the joined table's copy of a colliding column
    pub right: String,
}

impl Suffixes {
    /// Create a suffix pair
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// A pair with both suffixes empty means "not configured"
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    /// Fall back to the default pair when this one is not configured
    #[must_use]
    pub fn or_default(&self) -> Suffixes {
        if self.is_empty() {
            Suffixes::default()
        } else {
            self.clone()
        }
    }
}

impl Default for Suffixes {
    fn default() -> Self {
        Self::new("_x", "_y")
    }
}

/// Types of join operations supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Inner join - only rows matching on both sides
    Inner,
    /// Left outer join - all base rows, matching joined rows
    Left,
    /// Right outer join - all joined rows, matching base rows
    Right,
    /// Full outer join - all rows from both sides
    Full,
}

impl JoinKind {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
        }
    }

    /// SQL keyword introducing this join
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
        }
    }

    /// Parse a pandas-style `how` value; unknown values fall back to inner
    #[must_use]
    pub fn from_how(how: &str) -> Self {
        match how.to_lowercase().as_str() {
            "left" => JoinKind::Left,
            "right" => JoinKind::Right,
            "outer" | "full" => JoinKind::Full,
            _ => JoinKind::Inner,
        }
    }
}

/// How the ON clause of a join is expressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOn {
    /// Free condition text, or a bare key name
    Condition(String),
    /// Key columns present under the same name on both sides
    Keys(Vec<String>),
}

/// One join recorded in the query state
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    /// Alias the joined relation is known by in the compiled query
    pub alias: String,
    /// Join condition
    pub on: JoinOn,
    /// Join kind
    pub kind: JoinKind,
    /// Compiled query of the joined pipeline, if any
    pub subquery: Option<String>,
    /// Suffix pair used for this join's colliding columns
    pub suffixes: Suffixes,
    /// Output names of the subquery's computed expressions
    pub computed: Vec<String>,
}

/// ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Column as requested by the caller
    pub column: String,
    /// Ascending order when true
    pub ascending: bool,
}

/// Derived column defined by an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Output column name
    pub column: String,
    /// Expression text, written against original column names
    pub expr: String,
}

/// CAST applied to a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastSpec {
    /// Original column name
    pub column: String,
    /// Target SQL type
    pub dtype: String,
}

/// Null replacement applied to a column
#[derive(Debug, Clone, PartialEq)]
pub struct FillSpec {
    /// Original column name
    pub column: String,
    /// Replacement literal
    pub value: Value,
}

/// One step of the rename history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameEntry {
    /// Column name as it exists in the source file
    pub original: String,
    /// Name the column currently goes by
    pub current: String,
}

/// Append-only list of warnings shared by every handle of one lineage
#[derive(Debug, Clone, Default)]
pub struct WarningBag {
    inner: Arc<Mutex<Vec<String>>>,
}

impl WarningBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning
    pub fn push(&self, msg: impl Into<String>) {
        let msg = msg.into();
        log::warn!("{msg}");
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg);
    }

    /// Copy of all warnings recorded so far, in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of warnings recorded so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no warning has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two bags are the same shared list
    #[must_use]
    pub fn shares_with(&self, other: &WarningBag) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Aggregated query state before compilation
#[derive(Debug, Clone)]
pub struct QueryState {
    /// Table the query reads from
    pub base_table: String,
    /// Explicit projection; empty means every column
    pub select_cols: Vec<String>,
    /// WHERE predicates, ANDed together
    pub filters: Vec<String>,
    /// Joins in declaration order
    pub joins: Vec<JoinClause>,
    /// ORDER BY keys
    pub sorts: Vec<SortKey>,
    /// Derived columns
    pub mutations: Vec<Mutation>,
    /// CAST expressions
    pub casts: Vec<CastSpec>,
    /// IFNULL expressions
    pub fill_nas: Vec<FillSpec>,
    /// Original column name to current name
    pub renames: HashMap<String, String>,
    /// Rename history in the order renames were first applied
    pub rename_order: Vec<RenameEntry>,
    /// Logical names dropped from the result
    pub drops: IndexSet<String>,
    /// Suffix pair of the most recent join
    pub suffixes: Suffixes,
    /// Emit renames as `old AS new` in the projection (join subqueries)
    pub inline_renames: bool,
    warnings: WarningBag,
}

impl QueryState {
    /// Create the state for a top-level query
    pub fn new(base_table: impl Into<String>, warnings: WarningBag) -> Self {
        Self {
            base_table: base_table.into(),
            select_cols: Vec::new(),
            filters: Vec::new(),
            joins: Vec::new(),
            sorts: Vec::new(),
            mutations: Vec::new(),
            casts: Vec::new(),
            fill_nas: Vec::new(),
            renames: HashMap::new(),
            rename_order: Vec::new(),
            drops: IndexSet::new(),
            suffixes: Suffixes::default(),
            inline_renames: false,
            warnings,
        }
    }

    /// Create the state for a pipeline compiled into a join subquery
    pub fn subquery(base_table: impl Into<String>, warnings: WarningBag) -> Self {
        let mut state = Self::new(base_table, warnings);
        state.inline_renames = true;
        state
    }

    /// Translate a current column name back to its name in the source file
    #[must_use]
    pub fn resolve_original_column(&self, name: &str) -> String {
        let mut current = normalize_column_name(name);
        for entry in self.rename_order.iter().rev() {
            if entry.current == current {
                current = entry.original.clone();
            }
        }
        current
    }

    /// Translate a source column name to the name it currently goes by
    #[must_use]
    pub fn resolve_current_column(&self, name: &str) -> String {
        let mut current = normalize_column_name(name);
        for entry in &self.rename_order {
            if entry.original == current {
                current = entry.current.clone();
            }
        }
        current
    }

    /// Whether a non-empty projection excludes `name` outright
    #[must_use]
    pub fn excluded_by_selection(&self, name: &str) -> bool {
        !self.select_cols.is_empty() && !self.select_cols.iter().any(|c| c == name)
    }

    /// Whether `name` survives the projection under any of its identities
    #[must_use]
    pub fn column_in_selection(&self, name: &str) -> bool {
        if self.select_cols.is_empty() {
            return true;
        }
        let selected = |candidate: &str| self.select_cols.iter().any(|c| c == candidate);
        selected(name)
            || selected(&self.resolve_current_column(name))
            || selected(&self.resolve_original_column(name))
    }

    /// Record a non-fatal warning
    pub fn warn(&self, msg: impl Into<String>) {
        self.warnings.push(msg);
    }

    /// Warning bag this state reports into
    #[must_use]
    pub fn warnings(&self) -> &WarningBag {
        &self.warnings
    }
}

/// Strip a lowercase table qualifier from a column reference
///
/// `users.name` becomes `name`, while `A.B` is kept as is because an
/// uppercase prefix is more likely part of a dotted column header.
#[must_use]
pub fn normalize_column_name(name: &str) -> String {
    if let Some(idx) = name.rfind('.') {
        if idx + 1 < name.len() {
            let prefix = &name[..idx];
            if prefix == prefix.to_lowercase() {
                return name[idx + 1..].to_string();
            }
        }
    }
    name.to_string()
}

/// Table name a file is registered under: the file name without any extension
#[must_use]
pub fn table_name_from_path(path: &Path) -> String {
    let mut base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    while let Some(idx) = base.rfind('.') {
        if idx == 0 {
            break;
        }
        base.truncate(idx);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state_with_renames(pairs: &[(&str, &str)]) -> QueryState {
        let mut state = QueryState::new("t", WarningBag::new());
        for (original, current) in pairs {
            state.renames.insert(original.to_string(), current.to_string());
            state.rename_order.push(RenameEntry {
                original: original.to_string(),
                current: current.to_string(),
            });
        }
        state
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("users.name"), "name");
        assert_eq!(normalize_column_name("A.B"), "A.B");
        assert_eq!(normalize_column_name("name"), "name");
        assert_eq!(normalize_column_name("trailing."), "trailing.");
    }

    #[test]
    fn test_table_name_from_path() {
        assert_eq!(table_name_from_path(Path::new("data/users.csv")), "users");
        assert_eq!(table_name_from_path(Path::new("logs.csv.gz")), "logs");
        assert_eq!(table_name_from_path(Path::new("plain")), "plain");
    }

    #[test]
    fn test_resolve_through_rename_chain() {
        let state = state_with_renames(&[("a", "y")]);
        assert_eq!(state.resolve_original_column("y"), "a");
        assert_eq!(state.resolve_current_column("a"), "y");
        assert_eq!(state.resolve_original_column("x"), "x");
    }

    #[test]
    fn test_join_kind_from_how() {
        assert_eq!(JoinKind::from_how(""), JoinKind::Inner);
        assert_eq!(JoinKind::from_how("LEFT"), JoinKind::Left);
        assert_eq!(JoinKind::from_how("right"), JoinKind::Right);
        assert_eq!(JoinKind::from_how("outer"), JoinKind::Full);
        assert_eq!(JoinKind::from_how("full"), JoinKind::Full);
        assert_eq!(JoinKind::from_how("sideways"), JoinKind::Inner);
    }

    #[test]
    fn test_warning_bag_is_shared() {
        let bag = WarningBag::new();
        let clone = bag.clone();
        clone.push("drop skipped");
        assert_eq!(bag.snapshot(), vec!["drop skipped".to_string()]);
        assert!(bag.shares_with(&clone));
        assert!(!bag.shares_with(&WarningBag::new()));
    }

    #[test]
    fn test_column_in_selection() {
        let mut state = state_with_renames(&[("a", "b")]);
        assert!(state.column_in_selection("anything"));
        state.select_cols = vec!["b".to_string()];
        assert!(state.column_in_selection("a"));
        assert!(state.column_in_selection("b"));
        assert!(!state.column_in_selection("c"));
    }

    proptest! {
        #[test]
        fn prop_unrenamed_names_resolve_to_themselves(name in "[a-z_][a-z0-9_]{0,12}") {
            let state = state_with_renames(&[("zz_original", "zz_current")]);
            prop_assume!(name != "zz_original" && name != "zz_current");
            prop_assert_eq!(state.resolve_original_column(&name), name.clone());
            prop_assert_eq!(state.resolve_current_column(&name), name);
        }
    }
}
