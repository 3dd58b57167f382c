//! Chainable, lazily evaluated DataFrame handle

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::compiler::{compile, expression_aliases, is_explicit_join_condition};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::ops::{JoinOp, Operation};
use crate::reconcile::reconcile;
use crate::render::{sorted_keys, write_csv, write_table};
use crate::state::{table_name_from_path, JoinKind, JoinOn, QueryState, Suffixes, WarningBag};
use crate::value::{Row, Value};

/// Options for [`DataFrame::merge`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Join keys present under the same name on both sides
    pub on: Vec<String>,
    /// Single join key, used when `on` is empty
    pub on_key: Option<String>,
    /// `inner`, `left`, `right`, `outer` or `full`; anything else means inner
    pub how: Option<String>,
    /// Left/right suffixes for colliding columns, `_x`/`_y` when unset
    pub suffixes: Option<(String, String)>,
}

impl MergeOptions {
    /// Merge on the given key columns
    pub fn on<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            on: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the join kind
    #[must_use]
    pub fn how(mut self, how: impl Into<String>) -> Self {
        self.how = Some(how.into());
        self
    }

    /// Set the suffix pair
    #[must_use]
    pub fn suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = Some((left.into(), right.into()));
        self
    }

    fn keys(&self) -> Vec<String> {
        if !self.on.is_empty() {
            return self.on.clone();
        }
        self.on_key
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect()
    }
}

/// A lazily evaluated table backed by a delimited file
///
/// Every transformation returns a new handle with one more recorded
/// operation; the receiver is never modified. Handles derived from the same
/// source share their warning list and join alias counter. Nothing touches the
/// engine until a materializing method (`rows`, `head`, `tail`, `print`,
/// `to_csv`, `shape`, `columns`) is called, and each of those recompiles the
/// whole chain from scratch.
///
/// Filter, mutate and join condition text is embedded in the compiled SQL
/// verbatim. Never pass untrusted input through them.
#[derive(Clone)]
pub struct DataFrame {
    source: PathBuf,
    engine: Arc<dyn Engine>,
    ops: Arc<Vec<Operation>>,
    warnings: WarningBag,
    alias_counter: Arc<AtomicUsize>,
    deferred: Option<Error>,
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("source", &self.source)
            .field("engine", &self.engine.name())
            .field("ops", &self.ops)
            .field("deferred", &self.deferred)
            .finish()
    }
}

impl DataFrame {
    /// Create a handle reading `path` through `engine`
    pub fn new(path: impl Into<PathBuf>, engine: Arc<dyn Engine>) -> Self {
        Self {
            source: path.into(),
            engine,
            ops: Arc::new(Vec::new()),
            warnings: WarningBag::new(),
            alias_counter: Arc::new(AtomicUsize::new(0)),
            deferred: None,
        }
    }

    /// Source file of this pipeline
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Table name the source file is registered under
    pub fn table_name(&self) -> String {
        table_name_from_path(&self.source)
    }

    /// Recorded operations, oldest first
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    /// Keep rows matching a SQL predicate, like `pandas.DataFrame.query`
    #[must_use]
    pub fn filter(&self, expr: impl Into<String>) -> Self {
        self.with_op(Operation::Filter { expr: expr.into() })
    }

    /// Restrict the result to the given columns, in order
    #[must_use]
    pub fn select<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_op(Operation::Select {
            columns: collect_strings(columns),
        })
    }

    /// Remove columns from the result
    #[must_use]
    pub fn drop<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_op(Operation::Drop {
            columns: collect_strings(columns),
        })
    }

    /// Rename columns; pairs are applied in iteration order
    #[must_use]
    pub fn rename<I, K, V>(&self, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_op(Operation::Rename {
            mapping: mapping
                .into_iter()
                .map(|(old, new)| (old.into(), new.into()))
                .collect(),
        })
    }

    /// Add or replace a column computed from a SQL expression
    ///
    /// The expression may refer to columns by their current names.
    #[must_use]
    pub fn mutate(&self, column: impl Into<String>, expr: impl Into<String>) -> Self {
        self.with_op(Operation::Mutate {
            column: column.into(),
            expr: expr.into(),
        })
    }

    /// Order by a column
    #[must_use]
    pub fn sort(&self, column: impl Into<String>, ascending: bool) -> Self {
        self.with_op(Operation::Sort {
            column: column.into(),
            ascending,
        })
    }

    /// Cast a column to a SQL type
    #[must_use]
    pub fn cast(&self, column: impl Into<String>, dtype: impl Into<String>) -> Self {
        self.with_op(Operation::Cast {
            column: column.into(),
            dtype: dtype.into(),
        })
    }

    /// Drop rows where any of the given columns is null
    #[must_use]
    pub fn drop_na<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_op(Operation::DropNa {
            columns: collect_strings(columns),
        })
    }

    /// Replace nulls in a column
    #[must_use]
    pub fn fill_na(&self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_op(Operation::FillNa {
            column: column.into(),
            value: value.into(),
        })
    }

    /// Inner join on a key column or an explicit `a.x = b.y` condition
    #[must_use]
    pub fn join(&self, other: &DataFrame, on: &str) -> Self {
        self.join_on(other, on, JoinKind::Inner)
    }

    /// Left join on a key column or an explicit condition
    #[must_use]
    pub fn left_join(&self, other: &DataFrame, on: &str) -> Self {
        self.join_on(other, on, JoinKind::Left)
    }

    /// Right join on a key column or an explicit condition
    #[must_use]
    pub fn right_join(&self, other: &DataFrame, on: &str) -> Self {
        self.join_on(other, on, JoinKind::Right)
    }

    /// Full outer join on a key column or an explicit condition
    #[must_use]
    pub fn full_join(&self, other: &DataFrame, on: &str) -> Self {
        self.join_on(other, on, JoinKind::Full)
    }

    /// Join like `pandas.merge`
    ///
    /// Without any key the returned handle carries
    /// [`Error::MissingJoinKey`], returned by every later materialization.
    #[must_use]
    pub fn merge(&self, other: &DataFrame, opts: &MergeOptions) -> Self {
        let keys = opts.keys();
        if keys.is_empty() {
            return self.with_error(Error::MissingJoinKey);
        }
        let suffixes = opts
            .suffixes
            .as_ref()
            .map(|(l, r)| Suffixes::new(l.as_str(), r.as_str()))
            .unwrap_or_default()
            .or_default();
        let kind = JoinKind::from_how(opts.how.as_deref().unwrap_or_default());
        self.join_with(other, JoinOn::Keys(keys), kind, suffixes)
    }

    fn join_on(&self, other: &DataFrame, on: &str, kind: JoinKind) -> Self {
        let on = on.trim();
        if on.is_empty() {
            return self.with_error(Error::MissingJoinKey);
        }
        let on = if is_explicit_join_condition(on) {
            JoinOn::Condition(on.to_string())
        } else {
            JoinOn::Keys(vec![on.to_string()])
        };
        self.join_with(other, on, kind, Suffixes::default())
    }

    fn join_with(&self, other: &DataFrame, on: JoinOn, kind: JoinKind, suffixes: Suffixes) -> Self {
        if let Some(err) = other.deferred.as_ref().filter(|_| self.deferred.is_none()) {
            return self.with_error(err.clone());
        }
        let table = other.table_name();
        let alias = self.next_alias(&table);

        let mut sub_state = QueryState::subquery(table, self.warnings.clone());
        for op in other.ops.iter() {
            op.apply(&mut sub_state);
        }
        let subquery = compile(&sub_state, None);
        let computed = expression_aliases(&sub_state);
        log::debug!("compiled join subquery for {alias}: {subquery}");

        self.with_op(Operation::Join(JoinOp {
            alias,
            subquery: Some(subquery),
            files: other.required_files(),
            on,
            kind,
            suffixes,
            computed,
        }))
    }

    /// Every row of the result
    pub fn rows(&self) -> Result<Vec<Row>> {
        self.execute(None)
    }

    /// The first `n` rows, limited in the compiled query
    pub fn head(&self, n: usize) -> Result<Vec<Row>> {
        self.execute(Some(n))
    }

    /// The last `n` rows; `0` or anything past the row count returns every row
    pub fn tail(&self, n: usize) -> Result<Vec<Row>> {
        let mut rows = self.rows()?;
        if n == 0 || n >= rows.len() {
            return Ok(rows);
        }
        Ok(rows.split_off(rows.len() - n))
    }

    /// Write the result as aligned text with a sorted header line
    pub fn print<W: Write>(&self, out: &mut W) -> Result<()> {
        let rows = self.rows()?;
        write_table(out, &rows)
    }

    /// Export the result as CSV with a sorted header line
    pub fn to_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let rows = self.rows()?;
        write_csv(path.as_ref(), &rows)
    }

    /// `(rows, columns)` of the result
    pub fn shape(&self) -> Result<(usize, usize)> {
        let rows = self.rows()?;
        let cols = rows.first().map_or(0, Row::len);
        Ok((rows.len(), cols))
    }

    /// Sorted column names of the result
    pub fn columns(&self) -> Result<Vec<String>> {
        let rows = self.head(1)?;
        Ok(rows.first().map(sorted_keys).unwrap_or_default())
    }

    /// The SQL the chain compiles to, or an empty string when planning failed
    pub fn debug_sql(&self) -> String {
        if self.deferred.is_some() {
            return String::new();
        }
        compile(&self.build_state(), None)
    }

    /// Deferred planning error, if any
    pub fn err(&self) -> Option<&Error> {
        self.deferred.as_ref()
    }

    /// Non-fatal warnings recorded so far by this lineage, oldest first
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.snapshot()
    }

    /// Every file the query reads, source first
    pub fn required_files(&self) -> Vec<PathBuf> {
        let mut files = IndexSet::new();
        files.insert(self.source.clone());
        for op in self.ops.iter() {
            files.extend(op.required_files().iter().cloned());
        }
        files.into_iter().collect()
    }

    fn build_state(&self) -> QueryState {
        let mut state = QueryState::new(self.table_name(), self.warnings.clone());
        for op in self.ops.iter() {
            log::trace!("applying {}", op.description());
            op.apply(&mut state);
        }
        state
    }

    fn execute(&self, limit: Option<usize>) -> Result<Vec<Row>> {
        if let Some(err) = &self.deferred {
            return Err(err.clone());
        }
        let state = self.build_state();
        if let Some(join) = state
            .joins
            .iter()
            .find(|join| !self.engine.supports_join(join.kind))
        {
            return Err(Error::UnsupportedJoin(join.kind));
        }

        let sql = compile(&state, limit);
        let files = self.required_files();
        log::debug!("executing on {} over {} file(s): {sql}", self.engine.name(), files.len());

        let mut rows = self.engine.execute(&files, &sql)?;
        reconcile(&mut rows, &state)?;
        log::debug!("materialized {} row(s)", rows.len());
        Ok(rows)
    }

    fn with_op(&self, op: Operation) -> Self {
        let mut ops = Vec::with_capacity(self.ops.len() + 1);
        ops.extend(self.ops.iter().cloned());
        ops.push(op);
        Self {
            ops: Arc::new(ops),
            ..self.clone()
        }
    }

    fn with_error(&self, err: Error) -> Self {
        Self {
            deferred: Some(err),
            ..self.clone()
        }
    }

    fn next_alias(&self, base: &str) -> String {
        let n = self.alias_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{base}_alias_{n}")
    }
}

fn collect_strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
