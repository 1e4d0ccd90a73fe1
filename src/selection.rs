//! Selection engine: compiles positional columns and named expressions into an ordered plan
//! and applies it to items.
//!
//! A [`Selection`] is built from two kinds of inputs:
//! - positional **columns** ([`Column`]): a field to keep, a wildcard (`"*"`), a drop
//!   (`"-name"`), a whole-item function, a nested expression, or a fan-out producing several
//!   fields at once;
//! - named **expressions** ([`Expr`]): `target = source`, where the source is another field
//!   (an alias), a constant, or a function of some input fields.
//!
//! Compiling resolves the order in which expressions run. An expression that reads the target
//! of another expression runs after it; a dependency cycle fails with
//! [`StreamError::ExpressionCycle`] from [`Selection::compile`], while
//! [`Selection::compile_lenient`] reports the cycle and breaks it deterministically. Wildcards
//! and drops always apply last.
//!
//! ```
//! use tabstream::item::{Item, ItemType};
//! use tabstream::selection::{Expr, Selection};
//! use tabstream::value::Value;
//!
//! let plan = Selection::new()
//!     .expr("a", Expr::func1("b", |v| Ok(Value::from(v.as_i64().unwrap_or(0) * 10))))
//!     .expr("b", Expr::func1("c", |v| Ok(Value::from(v.as_i64().unwrap_or(0) + 1))))
//!     .expr("c", Expr::lit(5))
//!     .compile(ItemType::Record, None)?;
//! assert_eq!(plan.order(), vec!["c", "b", "a"]);
//!
//! let out = plan.apply(Item::record([("x", 0)]))?;
//! assert_eq!(out, Item::record([("a", 60), ("b", 6), ("c", 5)]));
//! # anyhow::Ok(())
//! ```

use crate::error::{Result, StreamError, stream_error};
use crate::item::{FieldRef, Item, ItemType, StructRow};
use crate::logger::{Level, SharedLogger};
use crate::schema::{Field, StructSchema, ValueType};
use crate::value::Value;
use anyhow::Context;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Function of the values of its input fields.
pub type ValueFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;
/// Function of the whole item.
pub type ItemFn = Arc<dyn Fn(&Item) -> Result<Value> + Send + Sync>;
/// Function producing several output values at once.
pub type MultiFn = Arc<dyn Fn(&[Value]) -> Result<Vec<Value>> + Send + Sync>;

fn arity_error(expected: usize, got: usize) -> anyhow::Error {
    anyhow::anyhow!("expected {expected} argument(s), got {got}")
}

/// Source of a named expression.
#[derive(Clone)]
pub enum Expr {
    /// Copy another field (alias), or the same field (trivial).
    Field(FieldRef),
    Const(Value),
    Func { inputs: Vec<FieldRef>, func: ValueFn },
    Item(ItemFn),
}

impl Expr {
    pub fn field(field: impl Into<FieldRef>) -> Self {
        Self::Field(field.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Self::Const(value.into())
    }

    /// A function receiving the values of `inputs`, in order.
    pub fn func<I, F>(inputs: I, func: F) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldRef>,
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Func {
            inputs: inputs.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    /// A function of exactly one input field.
    pub fn func1<F>(input: impl Into<FieldRef>, func: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self::func([input.into()], move |args: &[Value]| match args {
            [v] => func(v),
            _ => Err(arity_error(1, args.len())),
        })
    }

    /// A function of exactly two input fields.
    pub fn func2<F>(a: impl Into<FieldRef>, b: impl Into<FieldRef>, func: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self::func([a.into(), b.into()], move |args: &[Value]| match args {
            [x, y] => func(x, y),
            _ => Err(arity_error(2, args.len())),
        })
    }

    pub fn item<F>(func: F) -> Self
    where
        F: Fn(&Item) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Item(Arc::new(func))
    }

    /// Named fields this expression reads.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Self::Field(f) => f.as_name().into_iter().collect(),
            Self::Func { inputs, .. } => inputs.iter().filter_map(FieldRef::as_name).collect(),
            Self::Const(_) | Self::Item(_) => Vec::new(),
        }
    }

    fn describe(&self, target: String) -> Description {
        match self {
            Self::Field(f) if f.as_name() == Some(target.as_str()) => Description::Trivial {
                field: f.clone(),
                target,
            },
            Self::Field(f) => Description::Alias {
                source: f.clone(),
                target,
            },
            Self::Const(v) => Description::Function {
                inputs: Vec::new(),
                compute: Compute::Const(v.clone()),
                target,
            },
            Self::Func { inputs, func } => Description::Function {
                inputs: inputs.clone(),
                compute: Compute::Values(Arc::clone(func)),
                target,
            },
            Self::Item(func) => Description::Function {
                inputs: Vec::new(),
                compute: Compute::Item(Arc::clone(func)),
                target,
            },
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(x) => write!(f, "Field({x})"),
            Self::Const(v) => write!(f, "Const({v:?})"),
            Self::Func { inputs, .. } => write!(f, "Func({inputs:?})"),
            Self::Item(_) => f.write_str("Item(..)"),
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self::Field(FieldRef::from(s))
    }
}

impl From<usize> for Expr {
    fn from(p: usize) -> Self {
        Self::Field(FieldRef::Position(p))
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Self::Const(v)
    }
}

/// One positional argument of a selection.
#[derive(Clone)]
pub enum Column {
    /// All input fields not otherwise selected.
    Star,
    Field(FieldRef),
    Drop(Vec<FieldRef>),
    /// Function of the whole item.
    Item(ItemFn),
    Expr(Expr),
    /// One function filling several fields.
    Multiple {
        targets: Vec<String>,
        inputs: Vec<FieldRef>,
        func: MultiFn,
    },
}

impl Column {
    pub fn item<F>(func: F) -> Self
    where
        F: Fn(&Item) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Item(Arc::new(func))
    }

    pub fn drop<I>(fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldRef>,
    {
        Self::Drop(fields.into_iter().map(Into::into).collect())
    }

    pub fn multiple<T, I, F>(targets: T, inputs: I, func: F) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<FieldRef>,
        F: Fn(&[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self::Multiple {
            targets: targets.into_iter().map(Into::into).collect(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            func: Arc::new(func),
        }
    }

    /// Wildcards and drops: applied after every explicit column.
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Star | Self::Drop(_) | Self::Field(FieldRef::Star))
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Star => f.write_str("*"),
            Self::Field(x) => write!(f, "{x}"),
            Self::Drop(x) => write!(f, "Drop({x:?})"),
            Self::Item(_) => f.write_str("Item(..)"),
            Self::Expr(e) => write!(f, "{e:?}"),
            Self::Multiple { targets, inputs, .. } => write!(f, "Multiple({targets:?} <- {inputs:?})"),
        }
    }
}

impl From<&str> for Column {
    fn from(s: &str) -> Self {
        match s.strip_prefix('-') {
            _ if s == "*" => Self::Star,
            Some(rest) if !rest.is_empty() => Self::Drop(vec![FieldRef::from(rest)]),
            _ => Self::Field(FieldRef::from(s)),
        }
    }
}

impl From<String> for Column {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<usize> for Column {
    fn from(p: usize) -> Self {
        Self::Field(FieldRef::Position(p))
    }
}

impl From<FieldRef> for Column {
    fn from(f: FieldRef) -> Self {
        match f {
            FieldRef::Star => Self::Star,
            f => Self::Field(f),
        }
    }
}

impl From<Expr> for Column {
    fn from(e: Expr) -> Self {
        Self::Expr(e)
    }
}

/// How a [`Description::Function`] computes its value.
#[derive(Clone)]
pub enum Compute {
    Values(ValueFn),
    Item(ItemFn),
    Const(Value),
}

/// One compiled transformation step.
#[derive(Clone)]
pub enum Description {
    Trivial { field: FieldRef, target: String },
    Alias { source: FieldRef, target: String },
    Function {
        inputs: Vec<FieldRef>,
        compute: Compute,
        target: String,
    },
    Star,
    Drop { fields: Vec<FieldRef> },
    Multiple {
        inputs: Vec<FieldRef>,
        func: MultiFn,
        targets: Vec<String>,
    },
}

impl Description {
    /// Output field names written by this step.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Self::Trivial { target, .. }
            | Self::Alias { target, .. }
            | Self::Function { target, .. } => vec![target.as_str()],
            Self::Multiple { targets, .. } => targets.iter().map(String::as_str).collect(),
            Self::Star | Self::Drop { .. } => Vec::new(),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Trivial { .. } => "trivial",
            Self::Alias { .. } => "alias",
            Self::Function { .. } => "function",
            Self::Star => "star",
            Self::Drop { .. } => "drop",
            Self::Multiple { .. } => "multiple",
        }
    }

    /// Static output type of a step, when it can be known without running it.
    fn output_type(&self, input_schema: Option<&StructSchema>) -> ValueType {
        let field_type = |f: &FieldRef| {
            let schema = input_schema?;
            let field = match f {
                FieldRef::Name(n) => schema.get_field(n),
                FieldRef::Position(p) => schema.field_at(*p),
                FieldRef::Star => None,
            };
            field.map(Field::value_type)
        };
        match self {
            Self::Trivial { field: f, .. } | Self::Alias { source: f, .. } => {
                field_type(f).unwrap_or_default()
            }
            Self::Function {
                compute: Compute::Const(v),
                ..
            } => ValueType::of(v),
            _ => ValueType::Any,
        }
    }
}

impl fmt::Debug for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trivial { field, .. } => write!(f, "Trivial({field})"),
            Self::Alias { source, target } => write!(f, "Alias({target} <- {source})"),
            Self::Function { inputs, target, .. } => write!(f, "Function({target} <- {inputs:?})"),
            Self::Star => f.write_str("Star"),
            Self::Drop { fields } => write!(f, "Drop({fields:?})"),
            Self::Multiple { inputs, targets, .. } => {
                write!(f, "Multiple({targets:?} <- {inputs:?})")
            }
        }
    }
}

/// Order expressions so that each one runs after the expressions whose targets it reads.
///
/// Kahn's algorithm with ties broken by declaration order, so the result is deterministic.
/// Self-references are not dependencies. When no expression is free of dependencies, the
/// remaining names form (or lead into) a cycle: without `on_cycle` this is an
/// [`StreamError::ExpressionCycle`]; with it the names are reported and the first remaining
/// expression is forced next, dropping its unresolved edges.
///
/// # Errors
/// `ExpressionCycle` as described above.
pub fn topological_order(
    expressions: &IndexMap<String, Expr>,
    mut on_cycle: Option<&mut dyn FnMut(&[String])>,
) -> Result<Vec<usize>> {
    let names: HashSet<&str> = expressions.keys().map(String::as_str).collect();
    let mut pending: Vec<(usize, HashSet<&str>)> = expressions
        .iter()
        .enumerate()
        .map(|(i, (name, expr))| {
            let deps = expr
                .dependencies()
                .into_iter()
                .filter(|d| *d != name.as_str() && names.contains(d))
                .collect();
            (i, deps)
        })
        .collect();

    let mut order = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let next = match pending.iter().position(|(_, deps)| deps.is_empty()) {
            Some(pos) => pos,
            None => {
                let stuck: Vec<String> = pending
                    .iter()
                    .filter_map(|(i, _)| expressions.get_index(*i).map(|(n, _)| n.clone()))
                    .collect();
                match on_cycle.as_mut() {
                    Some(report) => {
                        report(&stuck);
                        0
                    }
                    None => return Err(StreamError::ExpressionCycle { fields: stuck }.into()),
                }
            }
        };
        let (index, _) = pending.remove(next);
        if let Some((done, _)) = expressions.get_index(index) {
            for (_, deps) in &mut pending {
                deps.remove(done.as_str());
            }
        }
        order.push(index);
    }
    Ok(order)
}

/// Builder for a selection: positional columns, named expressions, an optional explicit target
/// kind and an optional logger.
#[derive(Clone, Default)]
pub struct Selection {
    columns: Vec<Column>,
    expressions: IndexMap<String, Expr>,
    target: Option<ItemType>,
    logger: Option<SharedLogger>,
    delimiter: Option<char>,
}

impl fmt::Debug for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("columns", &self.columns)
            .field("expressions", &self.expressions)
            .field("target", &self.target)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selection made of positional columns only.
    pub fn of<I>(columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Column>,
    {
        Self::new().columns(columns)
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<Column>) -> Self {
        self.columns.push(column.into());
        self
    }

    #[must_use]
    pub fn columns<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Column>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add `target = source`. Declaring the same target twice replaces the first expression.
    #[must_use]
    pub fn expr(mut self, target: impl Into<String>, source: impl Into<Expr>) -> Self {
        self.expressions.insert(target.into(), source.into());
        self
    }

    /// Force the output item kind instead of deriving it.
    #[must_use]
    pub const fn to(mut self, target: ItemType) -> Self {
        self.target = Some(target);
        self
    }

    /// Attach a logger: function failures and cycles are then logged instead of raised.
    #[must_use]
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Delimiter used when the output kind is `Line`.
    #[must_use]
    pub const fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub const fn logger(&self) -> Option<&SharedLogger> {
        self.logger.as_ref()
    }

    pub const fn delimiter(&self) -> Option<char> {
        self.delimiter
    }

    /// Output kind for a given input kind.
    ///
    /// Explicit columns only give rows, expressions only give records, and everything else
    /// (including a selection made only of wildcards and drops) keeps the input kind. A line
    /// cannot carry computed fields, so a line input becomes a row unless the selection is
    /// wildcard-only.
    pub fn target_for(&self, input: ItemType) -> ItemType {
        if let Some(t) = self.target {
            return t;
        }
        let wildcard_only = self.columns.iter().all(Column::is_deferred);
        let target = match (self.columns.is_empty(), self.expressions.is_empty()) {
            (false, true) if !wildcard_only => ItemType::Row,
            (true, false) => ItemType::Record,
            _ => input,
        };
        match target {
            ItemType::Line if !(wildcard_only && self.expressions.is_empty()) => ItemType::Row,
            t => t,
        }
    }

    /// Compile for items of `input_type`, failing on expression cycles.
    ///
    /// `input_schema` translates names to positions for plain rows and supplies output types.
    ///
    /// # Errors
    /// `ExpressionCycle` when expressions depend on each other in a loop.
    pub fn compile(
        &self,
        input_type: ItemType,
        input_schema: Option<&Arc<StructSchema>>,
    ) -> Result<SelectionPlan> {
        self.build(input_type, input_schema, None)
    }

    /// Compile, reporting cycles through `on_cycle` and breaking them instead of failing.
    ///
    /// # Errors
    /// Never fails on cycles; kept fallible for symmetry with [`Selection::compile`].
    pub fn compile_lenient<F>(
        &self,
        input_type: ItemType,
        input_schema: Option<&Arc<StructSchema>>,
        mut on_cycle: F,
    ) -> Result<SelectionPlan>
    where
        F: FnMut(&[String]),
    {
        self.build(input_type, input_schema, Some(&mut on_cycle))
    }

    fn build(
        &self,
        input_type: ItemType,
        input_schema: Option<&Arc<StructSchema>>,
        on_cycle: Option<&mut dyn FnMut(&[String])>,
    ) -> Result<SelectionPlan> {
        let target_type = self.target_for(input_type);
        let mut steps = Vec::new();
        let mut deferred = Vec::new();
        let mut layout = Vec::new();
        let mut slot_names: Vec<String> = Vec::new();

        let mut push = |description: Description, layout: &mut Vec<Slot>| {
            let slots: Vec<usize> = description
                .targets()
                .into_iter()
                .map(|name| {
                    slot_names.push(name.to_string());
                    slot_names.len() - 1
                })
                .collect();
            layout.extend(slots.iter().copied().map(Slot::Output));
            steps.push(Step { description, slots });
        };

        for (i, column) in self.columns.iter().enumerate() {
            match column {
                Column::Star | Column::Field(FieldRef::Star) => {
                    layout.push(Slot::Star);
                    deferred.push(Description::Star);
                }
                Column::Drop(fields) => deferred.push(Description::Drop {
                    fields: fields.clone(),
                }),
                Column::Field(f) => {
                    let target = positional_name(f, input_schema.map(|s| &**s));
                    push(
                        Description::Trivial {
                            field: f.clone(),
                            target,
                        },
                        &mut layout,
                    );
                }
                Column::Item(func) => push(
                    Description::Function {
                        inputs: Vec::new(),
                        compute: Compute::Item(Arc::clone(func)),
                        target: format!("_{i}"),
                    },
                    &mut layout,
                ),
                Column::Expr(e) => push(e.describe(format!("_{i}")), &mut layout),
                Column::Multiple {
                    targets,
                    inputs,
                    func,
                } => push(
                    Description::Multiple {
                        inputs: inputs.clone(),
                        func: Arc::clone(func),
                        targets: targets.clone(),
                    },
                    &mut layout,
                ),
            }
        }

        // Expressions are laid out in declaration order but run in dependency order.
        let mut expr_slots = Vec::with_capacity(self.expressions.len());
        for (name, _) in &self.expressions {
            expr_slots.push(slot_names.len());
            layout.push(Slot::Output(slot_names.len()));
            slot_names.push(name.clone());
        }
        for index in topological_order(&self.expressions, on_cycle)? {
            if let Some((name, expr)) = self.expressions.get_index(index) {
                steps.push(Step {
                    description: expr.describe(name.clone()),
                    slots: vec![expr_slots[index]],
                });
            }
        }

        // Wildcards before drops so a drop also removes fields the wildcard brought in.
        deferred.sort_by_key(|d| matches!(d, Description::Drop { .. }));

        let mut name_slots: HashMap<String, Vec<usize>> = HashMap::new();
        for (slot, name) in slot_names.iter().enumerate() {
            name_slots.entry(name.clone()).or_default().push(slot);
        }

        let mode = if target_type == input_type
            && matches!(input_type, ItemType::Record | ItemType::StructRow)
        {
            Mode::InPlace
        } else {
            Mode::OutOfPlace
        };

        let mut plan = SelectionPlan {
            steps,
            deferred,
            layout,
            slot_names,
            name_slots,
            mode,
            input_type,
            target_type,
            input_schema: input_schema.cloned(),
            output_schema: None,
            logger: self.logger.clone(),
            delimiter: self.delimiter.unwrap_or('\t'),
        };
        plan.output_schema = plan.static_schema().map(Arc::new);
        Ok(plan)
    }
}

fn positional_name(field: &FieldRef, schema: Option<&StructSchema>) -> String {
    match field {
        FieldRef::Name(n) => n.clone(),
        FieldRef::Position(p) => schema
            .and_then(|s| s.field_at(*p))
            .map_or_else(|| format!("_{p}"), |f| f.name().to_string()),
        FieldRef::Star => "*".to_string(),
    }
}

/// Whether the plan mutates a copy of the input or builds a fresh output item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Target kind equals the (named) input kind.
    InPlace,
    /// Target kind differs, or the item is a positional row that must be rebuilt.
    OutOfPlace,
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Output(usize),
    Star,
}

#[derive(Clone)]
struct Step {
    description: Description,
    slots: Vec<usize>,
}

/// A compiled selection, applied item by item.
#[derive(Clone)]
pub struct SelectionPlan {
    steps: Vec<Step>,
    deferred: Vec<Description>,
    layout: Vec<Slot>,
    slot_names: Vec<String>,
    name_slots: HashMap<String, Vec<usize>>,
    mode: Mode,
    input_type: ItemType,
    target_type: ItemType,
    input_schema: Option<Arc<StructSchema>>,
    output_schema: Option<Arc<StructSchema>>,
    logger: Option<SharedLogger>,
    delimiter: char,
}

impl fmt::Debug for SelectionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionPlan")
            .field("descriptions", &self.descriptions().collect::<Vec<_>>())
            .field("mode", &self.mode)
            .field("input_type", &self.input_type)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

/// Output fields gathered while applying a plan to one item.
struct Entries {
    named: bool,
    values: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Entries {
    fn new(named: bool) -> Self {
        Self {
            named,
            values: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Named outputs keep the position of the first write and the value of the last one.
    fn put(&mut self, name: &str, value: Value, overwrite: bool) {
        if !self.named {
            self.values.push((name.to_string(), value));
            return;
        }
        match self.index.get(name) {
            Some(&i) if overwrite => self.values[i].1 = value,
            Some(_) => {}
            None => {
                self.index.insert(name.to_string(), self.values.len());
                self.values.push((name.to_string(), value));
            }
        }
    }
}

impl SelectionPlan {
    /// Every step in execution order, wildcards and drops last.
    pub fn descriptions(&self) -> impl Iterator<Item = &Description> {
        self.steps
            .iter()
            .map(|s| &s.description)
            .chain(self.deferred.iter())
    }

    /// Target names of the computing steps, in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.description.targets())
            .collect()
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub const fn target_type(&self) -> ItemType {
        self.target_type
    }

    /// Output struct, when it can be derived without seeing items.
    pub fn output_schema(&self) -> Option<&Arc<StructSchema>> {
        self.output_schema.as_ref()
    }

    fn named_output(&self) -> bool {
        matches!(self.target_type, ItemType::Record | ItemType::StructRow)
    }

    fn dropped(&self) -> (HashSet<&str>, HashSet<usize>) {
        let mut names = HashSet::new();
        let mut positions = HashSet::new();
        for d in &self.deferred {
            if let Description::Drop { fields } = d {
                for f in fields {
                    match f {
                        FieldRef::Name(n) => {
                            names.insert(n.as_str());
                        }
                        FieldRef::Position(p) => {
                            positions.insert(*p);
                        }
                        FieldRef::Star => {}
                    }
                }
            }
        }
        (names, positions)
    }

    fn static_schema(&self) -> Option<StructSchema> {
        if matches!(self.target_type, ItemType::Line | ItemType::Any) {
            return None;
        }
        let input = self.input_schema.as_deref();
        let (dropped_names, dropped_positions) = self.dropped();
        let mut types = vec![ValueType::Any; self.slot_names.len()];
        for step in &self.steps {
            let t = step.description.output_type(input);
            for &slot in &step.slots {
                types[slot] = t;
            }
        }
        let mut fields: IndexMap<String, Field> = IndexMap::new();
        let mut positional = Vec::new();
        let named = self.named_output();
        for slot in &self.layout {
            let candidates: Vec<(Field, bool)> = match slot {
                Slot::Output(i) => {
                    let name = &self.slot_names[*i];
                    vec![(Field::new(name.clone(), types[*i]), true)]
                }
                Slot::Star => input?
                    .fields()
                    .iter()
                    .enumerate()
                    .filter(|(p, f)| {
                        !dropped_positions.contains(p) && !dropped_names.contains(f.name())
                    })
                    .map(|(_, f)| (f.clone(), false))
                    .collect(),
            };
            for (field, explicit) in candidates {
                if explicit && dropped_names.contains(field.name()) {
                    continue;
                }
                if named {
                    match fields.get_mut(field.name()) {
                        Some(existing) if explicit => *existing = field,
                        Some(_) => {}
                        None => {
                            fields.insert(field.name().to_string(), field);
                        }
                    }
                } else {
                    positional.push(field);
                }
            }
        }
        let list: Vec<Field> = if named {
            fields.into_values().collect()
        } else {
            positional
        };
        let mut schema = StructSchema::new().with_duplicates(!named);
        for f in list {
            schema.append_field(f, None, false).ok()?;
        }
        Some(schema)
    }

    /// Apply the plan to one item.
    ///
    /// # Errors
    /// Structural errors always fail. Missing fields and failing user functions fail only when
    /// no logger is attached; otherwise they are logged and the field becomes null.
    pub fn apply(&self, item: Item) -> Result<Item> {
        match self.mode {
            Mode::InPlace => self.apply_in_place(item),
            Mode::OutOfPlace => self.apply_out_of_place(&item),
        }
    }

    fn apply_in_place(&self, item: Item) -> Result<Item> {
        let star_fields = self.star_names(&item);
        let mut work = item;
        for step in &self.steps {
            let values = self.run_step(step, &work, |f| work.get_value(f))?;
            for (&slot, value) in step.slots.iter().zip(values) {
                let field = FieldRef::Name(self.slot_names[slot].clone());
                work.set_value(&field, value, true)
                    .with_context(|| format!("select: write {field}"))?;
            }
        }
        let mut entries = Entries::new(true);
        let (dropped_names, dropped_positions) = self.dropped();
        for slot in &self.layout {
            match slot {
                Slot::Output(i) => {
                    let name = &self.slot_names[*i];
                    if !dropped_names.contains(name.as_str()) {
                        let v = work.get_value_or(&FieldRef::Name(name.clone()), Value::Null)?;
                        entries.put(name, v, true);
                    }
                }
                Slot::Star => {
                    for (p, name) in star_fields.iter().enumerate() {
                        if dropped_positions.contains(&p) || dropped_names.contains(name.as_str()) {
                            continue;
                        }
                        let v = work.get_value_or(&FieldRef::Name(name.clone()), Value::Null)?;
                        entries.put(name, v, false);
                    }
                }
            }
        }
        let schema = match &work {
            Item::StructRow(s) => Some(Arc::clone(s.schema())),
            _ => None,
        };
        self.assemble(entries, schema.as_deref())
    }

    fn apply_out_of_place(&self, item: &Item) -> Result<Item> {
        let mut produced: Vec<Option<Value>> = vec![None; self.slot_names.len()];
        for step in &self.steps {
            let values = self.run_step(step, item, |f| self.resolve(f, item, &produced))?;
            for (&slot, value) in step.slots.iter().zip(values) {
                produced[slot] = Some(value);
            }
        }
        let mut entries = Entries::new(self.named_output());
        let (dropped_names, dropped_positions) = self.dropped();
        for slot in &self.layout {
            match slot {
                Slot::Output(i) => {
                    let name = &self.slot_names[*i];
                    if !dropped_names.contains(name.as_str()) {
                        entries.put(name, produced[*i].take().unwrap_or_default(), true);
                    }
                }
                Slot::Star => {
                    for (p, (name, v)) in self.star_values(item).into_iter().enumerate() {
                        if dropped_positions.contains(&p) || dropped_names.contains(name.as_str()) {
                            continue;
                        }
                        entries.put(&name, v, false);
                    }
                }
            }
        }
        self.assemble(entries, self.input_schema.as_deref())
    }

    /// Read a field for a step: outputs produced earlier in this item win over the input.
    fn resolve(&self, field: &FieldRef, item: &Item, produced: &[Option<Value>]) -> Result<Value> {
        if let FieldRef::Name(n) = field
            && let Some(slots) = self.name_slots.get(n)
            && let Some(v) = slots.iter().rev().find_map(|&s| produced[s].as_ref())
        {
            return Ok(v.clone());
        }
        item.get_value_in(field, self.input_schema.as_deref())
    }

    fn star_names(&self, item: &Item) -> Vec<String> {
        if !self.layout.iter().any(|s| matches!(s, Slot::Star)) {
            return Vec::new();
        }
        match (item, &self.input_schema) {
            (Item::Row(v), Some(schema)) => (0..v.len())
                .map(|p| positional_name(&FieldRef::Position(p), Some(&**schema)))
                .collect(),
            (Item::Line(_), _) => vec!["_0".to_string()],
            _ => item.field_names(),
        }
    }

    fn star_values(&self, item: &Item) -> Vec<(String, Value)> {
        let names = self.star_names(item);
        let values = match item {
            Item::Line(s) => vec![Value::Str(s.clone())],
            Item::Row(v) => v.clone(),
            Item::Record(r) => r.values().cloned().collect(),
            Item::StructRow(s) => s.values().to_vec(),
        };
        names.into_iter().zip(values).collect()
    }

    fn run_step<R>(&self, step: &Step, item: &Item, mut resolve: R) -> Result<Vec<Value>>
    where
        R: FnMut(&FieldRef) -> Result<Value>,
    {
        let mut read = |fields: &[FieldRef]| -> Result<Vec<Value>> {
            fields.iter().map(&mut resolve).collect()
        };
        let result = match &step.description {
            Description::Trivial { field: f, .. } | Description::Alias { source: f, .. } => {
                read(std::slice::from_ref(f))
            }
            Description::Function {
                inputs,
                compute,
                target,
            } => match compute {
                Compute::Const(v) => Ok(vec![v.clone()]),
                Compute::Values(func) => read(inputs).and_then(|args| {
                    func(&args)
                        .map(|v| vec![v])
                        .map_err(|e| user_error(target, item, &e))
                }),
                Compute::Item(func) => func(item)
                    .map(|v| vec![v])
                    .map_err(|e| user_error(target, item, &e)),
            },
            Description::Multiple {
                inputs,
                func,
                targets,
            } => read(inputs).and_then(|args| {
                let name = targets.join(",");
                let out = func(&args).map_err(|e| user_error(&name, item, &e))?;
                if out.len() != targets.len() {
                    return Err(user_error(
                        &name,
                        item,
                        &arity_error(targets.len(), out.len()),
                    ));
                }
                Ok(out)
            }),
            Description::Star | Description::Drop { .. } => Ok(Vec::new()),
        };
        match result {
            Ok(values) => Ok(values),
            Err(e) if is_structural(&e) => Err(e),
            Err(e) => match &self.logger {
                Some(logger) => {
                    logger.log(&format!("select: {e:#}"), Level::Warn);
                    Ok(vec![Value::Null; step.slots.len()])
                }
                None => Err(e),
            },
        }
    }

    fn assemble(&self, entries: Entries, source_schema: Option<&StructSchema>) -> Result<Item> {
        let Entries { values, .. } = entries;
        Ok(match self.target_type {
            ItemType::Row | ItemType::Any => Item::Row(values.into_iter().map(|(_, v)| v).collect()),
            ItemType::Line => {
                let row = Item::Row(values.into_iter().map(|(_, v)| v).collect());
                Item::Line(row.to_line(self.delimiter))
            }
            ItemType::Record => Item::Record(values.into_iter().collect()),
            ItemType::StructRow => {
                let names: Vec<&str> = values.iter().map(|(n, _)| n.as_str()).collect();
                let schema = match &self.output_schema {
                    Some(s) if s.fields().iter().map(Field::name).eq(names.iter().copied()) => {
                        Arc::clone(s)
                    }
                    _ => {
                        let fields = names
                            .iter()
                            .map(|n| {
                                source_schema
                                    .and_then(|s| s.get_field(n))
                                    .cloned()
                                    .unwrap_or_else(|| Field::new(*n, ValueType::Any))
                            })
                            .collect();
                        Arc::new(StructSchema::from_fields(fields)?)
                    }
                };
                Item::StructRow(StructRow::from_parts(
                    values.into_iter().map(|(_, v)| v).collect(),
                    schema,
                ))
            }
        })
    }
}

fn user_error(field: &str, item: &Item, err: &anyhow::Error) -> anyhow::Error {
    StreamError::UserFunction {
        field: field.to_string(),
        item: item.summary(),
        operation: "select".to_string(),
        message: format!("{err:#}"),
    }
    .into()
}

/// Errors that a logger never downgrades.
pub(crate) fn is_structural(err: &anyhow::Error) -> bool {
    matches!(
        stream_error(err),
        Some(
            StreamError::UnsupportedItemKind { .. }
                | StreamError::ExpressionCycle { .. }
                | StreamError::InvalidArgument { .. }
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn plus(n: i64) -> impl Fn(&Value) -> Result<Value> + Send + Sync {
        move |v| Ok(Value::from(v.as_i64().unwrap_or(0) + n))
    }

    #[test]
    fn expressions_run_in_dependency_order() -> Result<()> {
        let plan = Selection::new()
            .expr("a", Expr::func1("b", plus(1)))
            .expr("b", Expr::func1("c", plus(1)))
            .expr("c", Expr::lit(5))
            .compile(ItemType::Record, None)?;
        assert_eq!(plan.order(), vec!["c", "b", "a"]);
        Ok(())
    }

    #[test]
    fn cycle_fails_without_logger() {
        let sel = Selection::new()
            .expr("a", Expr::func1("b", plus(1)))
            .expr("b", Expr::func1("a", plus(1)));
        let err = sel.compile(ItemType::Record, None).unwrap_err();
        match stream_error(&err) {
            Some(StreamError::ExpressionCycle { fields }) => assert_eq!(fields, &["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lenient_compile_reports_and_breaks_cycle() -> Result<()> {
        let mut seen = Vec::new();
        let plan = Selection::new()
            .expr("a", Expr::func1("b", plus(1)))
            .expr("b", Expr::func1("a", plus(1)))
            .compile_lenient(ItemType::Record, None, |names| seen.push(names.to_vec()))?;
        assert_eq!(plan.order(), vec!["a", "b"]);
        assert_eq!(seen, vec![vec!["a".to_string(), "b".to_string()]]);
        Ok(())
    }

    #[test]
    fn self_reference_is_not_a_dependency() -> Result<()> {
        let plan = Selection::new()
            .expr("a", Expr::func1("a", plus(1)))
            .compile(ItemType::Record, None)?;
        let out = plan.apply(Item::record([("a", 1), ("b", 2)]))?;
        assert_eq!(out, Item::record([("a", 2)]));
        Ok(())
    }

    #[test]
    fn star_is_identity_for_every_kind() -> Result<()> {
        let schema = Arc::new(StructSchema::from_names(&["x", "y"])?);
        let items = vec![
            Item::line("a\tb"),
            Item::row([1, 2]),
            Item::record([("x", 1), ("y", 2)]),
            Item::StructRow(StructRow::from_parts(vec![1.into(), 2.into()], Arc::clone(&schema))),
        ];
        for item in items {
            let plan = Selection::of(["*"]).compile(item.item_type(), Some(&schema))?;
            assert_eq!(plan.apply(item.clone())?, item);
        }
        Ok(())
    }

    #[test]
    fn drops_and_wildcards_apply_last() -> Result<()> {
        let plan = Selection::of(["-b", "*"])
            .expr("c", Expr::func1("a", plus(10)))
            .compile(ItemType::Record, None)?;
        assert!(matches!(
            plan.descriptions().map(Description::kind).collect::<Vec<_>>().as_slice(),
            ["function", "star", "drop"]
        ));
        let out = plan.apply(Item::record([("a", 1), ("b", 2)]))?;
        assert_eq!(out, Item::record([("a", 1), ("c", 11)]));
        Ok(())
    }

    #[test]
    fn alias_and_positional_columns_on_rows() -> Result<()> {
        let schema = Arc::new(StructSchema::from_names(&["id", "name"])?);
        let plan = Selection::of([Column::from(1), Column::from("id")])
            .compile(ItemType::Row, Some(&schema))?;
        assert_eq!(plan.target_type(), ItemType::Row);
        assert_eq!(plan.apply(Item::row([Value::from(7), Value::from("x")]))?, Item::row([Value::from("x"), Value::from(7)]));
        assert_eq!(
            plan.output_schema().map(|s| s.field_names()),
            Some(vec!["name".to_string(), "id".to_string()])
        );

        let plan = Selection::new()
            .expr("key", "id")
            .compile(ItemType::Row, Some(&schema))?;
        assert_eq!(plan.target_type(), ItemType::Record);
        assert_eq!(plan.apply(Item::row([7, 8]))?, Item::record([("key", 7)]));
        Ok(())
    }

    #[test]
    fn multiple_fans_out() -> Result<()> {
        let plan = Selection::new()
            .column(Column::multiple(["lo", "hi"], ["v"], |args: &[Value]| {
                let v = args[0].as_i64().unwrap_or(0);
                Ok(vec![Value::from(v - 1), Value::from(v + 1)])
            }))
            .to(ItemType::Record)
            .compile(ItemType::Record, None)?;
        assert_eq!(
            plan.apply(Item::record([("v", 5)]))?,
            Item::record([("lo", 4), ("hi", 6)])
        );
        Ok(())
    }

    #[test]
    fn failing_function_is_fatal_without_logger() -> Result<()> {
        let failing = || Expr::func1("a", |_| anyhow::bail!("boom"));
        let plan = Selection::new()
            .expr("b", failing())
            .compile(ItemType::Record, None)?;
        let err = plan.apply(Item::record([("a", 1)])).unwrap_err();
        assert_eq!(stream_error(&err).map(StreamError::kind), Some("user_function"));

        let logged = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&logged);
        let logger: SharedLogger = Arc::new(move |m: &str, _l: Level| {
            sink.lock().unwrap().push(m.to_string());
        });
        let plan = Selection::new()
            .expr("b", failing())
            .with_logger(logger)
            .compile(ItemType::Record, None)?;
        assert_eq!(plan.apply(Item::record([("a", 1)]))?, Item::record([("b", Value::Null)]));
        assert_eq!(logged.lock().unwrap().len(), 1);
        Ok(())
    }

    #[test]
    fn struct_rows_extend_in_place() -> Result<()> {
        let schema = Arc::new(StructSchema::from_names(&["a"])?);
        let item = Item::StructRow(StructRow::from_parts(vec![1.into()], schema));
        let plan = Selection::of(["*"])
            .expr("b", Expr::func1("a", plus(1)))
            .compile(ItemType::StructRow, None)?;
        assert_eq!(plan.mode(), Mode::InPlace);
        let out = plan.apply(item)?;
        assert_eq!(out.field_names(), vec!["a", "b"]);
        assert_eq!(out.get_value(&FieldRef::from("b"))?, Value::from(2));
        Ok(())
    }
}
