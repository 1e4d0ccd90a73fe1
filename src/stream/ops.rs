//! Filtering and selection.

use super::{Source, Stream};
use crate::error::{Result, StreamError, stream_error};
use crate::item::{FieldRef, Item};
use crate::logger::Level;
use crate::schema::StructSchema;
use crate::selection::Selection;
use crate::value::Value;
use std::sync::Arc;

/// Predicate over one field value.
pub type ValuePredicate = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;
/// Predicate over the whole item.
pub type ItemPredicate = Arc<dyn Fn(&Item) -> Result<bool> + Send + Sync>;

/// One condition of a [`Filter`].
#[derive(Clone)]
pub enum Condition {
    /// The field value is truthy.
    Truthy(FieldRef),
    Equals(FieldRef, Value),
    Matches(FieldRef, ValuePredicate),
    Item(ItemPredicate),
}

/// Conjunction of conditions. An item passes when every condition holds.
#[derive(Clone, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
    skip_errors: bool,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: impl Into<FieldRef>) -> Self {
        self.conditions.push(Condition::Truthy(field.into()));
        self
    }

    #[must_use]
    pub fn equals(mut self, field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Equals(field.into(), value.into()));
        self
    }

    #[must_use]
    pub fn matches<F>(mut self, field: impl Into<FieldRef>, predicate: F) -> Self
    where
        F: Fn(&Value) -> Result<bool> + Send + Sync + 'static,
    {
        self.conditions.push(Condition::Matches(field.into(), Arc::new(predicate)));
        self
    }

    #[must_use]
    pub fn item<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Item) -> Result<bool> + Send + Sync + 'static,
    {
        self.conditions.push(Condition::Item(Arc::new(predicate)));
        self
    }

    /// Drop items whose conditions fail to evaluate instead of failing the stream.
    #[must_use]
    pub const fn skip_errors(mut self, skip: bool) -> Self {
        self.skip_errors = skip;
        self
    }

    /// Evaluate every condition against `item`.
    ///
    /// # Errors
    /// Missing fields, and `UserFunction` errors of failing predicates.
    pub fn check(&self, item: &Item, schema: Option<&StructSchema>) -> Result<bool> {
        for condition in &self.conditions {
            let ok = match condition {
                Condition::Truthy(f) => item.get_value_in(f, schema)?.is_truthy(),
                Condition::Equals(f, v) => item.get_value_in(f, schema)? == *v,
                Condition::Matches(f, p) => {
                    let value = item.get_value_in(f, schema)?;
                    p(&value).map_err(|e| predicate_error(&f.to_string(), item, &e))?
                }
                Condition::Item(p) => p(item).map_err(|e| predicate_error("*", item, &e))?,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn predicate_error(field: &str, item: &Item, err: &anyhow::Error) -> anyhow::Error {
    StreamError::UserFunction {
        field: field.to_string(),
        item: item.summary(),
        operation: String::from("filter"),
        message: format!("{err:#}"),
    }
    .into()
}

impl Stream {
    /// Keep the items passing `filter`.
    #[must_use]
    pub fn filter(self, filter: Filter) -> Self {
        let (iter, meta) = self.into_parts();
        let schema = meta.schema.clone();
        let logger = meta.logger.clone();
        let name = meta.name.clone();
        let out = iter.filter_map(move |r| {
            let item = match r {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            match filter.check(&item, schema.as_deref()) {
                Ok(true) => Some(Ok(item)),
                Ok(false) => None,
                Err(e) if filter.skip_errors => {
                    if let Some(l) = &logger {
                        let kind = stream_error(&e).map_or("error", StreamError::kind);
                        l.log(&format!("{name}: filter skipped item ({kind}): {e:#}"), Level::Debug);
                    }
                    None
                }
                Err(e) => Some(Err(e)),
            }
        });
        Self::from_parts(Source::Lazy(Box::new(out)), meta.reshaped())
    }

    /// Keep the items for which `predicate` returns `true`.
    #[must_use]
    pub fn filter_items<F>(self, mut predicate: F) -> Self
    where
        F: FnMut(&Item) -> bool + 'static,
    {
        let (iter, meta) = self.into_parts();
        let out = iter.filter(move |r| r.as_ref().map_or(true, &mut predicate));
        Self::from_parts(Source::Lazy(Box::new(out)), meta.reshaped())
    }

    /// Apply a selection to every item.
    ///
    /// The selection is compiled once for the stream's item kind and schema. When either the
    /// selection or the stream has a logger, expression cycles are reported and broken and
    /// per-item function failures yield nulls; otherwise both are errors.
    ///
    /// # Errors
    /// Compilation errors (expression cycles without a logger). Item errors surface while the
    /// output is consumed.
    pub fn select(mut self, selection: Selection) -> Result<Self> {
        let input = self.resolve_item_type()?;
        let logger = selection.logger().cloned().or_else(|| self.meta.logger.clone());
        let mut selection = selection;
        if selection.logger().is_none()
            && let Some(l) = &logger
        {
            selection = selection.with_logger(Arc::clone(l));
        }
        if selection.delimiter().is_none() {
            selection = selection.with_delimiter(self.meta.config.delimiter);
        }
        let plan = match &logger {
            Some(l) => selection.compile_lenient(input, self.meta.schema.as_ref(), |fields| {
                l.log(
                    &format!("select: expression cycle between {}; breaking it", fields.join(", ")),
                    Level::Warn,
                );
            })?,
            None => selection.compile(input, self.meta.schema.as_ref())?,
        };
        tracing::debug!(
            stream = %self.meta.name,
            input = %input,
            output = %plan.target_type(),
            order = ?plan.order(),
            "compiled selection"
        );
        let (iter, mut meta) = self.into_parts();
        meta.item_type = plan.target_type();
        meta.schema = plan.output_schema().cloned();
        let out = iter.map(move |r| r.and_then(|item| plan.apply(item)));
        Ok(Self::from_parts(Source::Lazy(Box::new(out)), meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;
    use crate::selection::Column;

    #[test]
    fn conditions_are_anded() -> Result<()> {
        let items = vec![
            Item::record([("a", Value::from(1)), ("b", Value::from("x"))]),
            Item::record([("a", Value::from(0)), ("b", Value::from("x"))]),
            Item::record([("a", Value::from(2)), ("b", Value::from("y"))]),
        ];
        let out = Stream::from_items(items)
            .filter(Filter::new().field("a").equals("b", "x"))
            .collect()?;
        assert_eq!(out.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_fields_fail_unless_skipped() -> Result<()> {
        let items = || vec![Item::record([("a", 1)]), Item::record([("b", 1)])];
        assert!(Stream::from_items(items()).filter(Filter::new().field("a")).collect().is_err());
        let kept = Stream::from_items(items())
            .filter(Filter::new().field("a").skip_errors(true))
            .collect()?;
        assert_eq!(kept, vec![Item::record([("a", 1)])]);
        Ok(())
    }

    #[test]
    fn item_functions_on_lines() -> Result<()> {
        let len = |i: &Item| -> Result<Value> { Ok(Value::from(i.as_line().map_or(0, str::len))) };
        let as_float =
            |i: &Item| -> Result<Value> { Ok(Value::float(i.as_line().unwrap_or("0").parse::<f64>()?)) };
        let as_str = |i: &Item| -> Result<Value> { Ok(Value::from(i.as_line().unwrap_or_default())) };
        let stream = Stream::from_lines(["12", "123", "1234"]).select(Selection::of([
            Column::item(len),
            Column::item(as_float),
            Column::item(as_str),
        ]))?;
        assert_eq!(stream.item_type(), ItemType::Row);
        assert_eq!(
            stream.collect()?,
            vec![
                Item::row([Value::from(2), Value::float(12.0), Value::from("12")]),
                Item::row([Value::from(3), Value::float(123.0), Value::from("123")]),
                Item::row([Value::from(4), Value::float(1234.0), Value::from("1234")]),
            ]
        );
        Ok(())
    }

    #[test]
    fn stream_logger_makes_selection_lenient() -> Result<()> {
        let logger: crate::logger::SharedLogger = Arc::new(crate::logger::NullLogger);
        let out = Stream::from_items(vec![Item::record([("a", 1)])])
            .with_logger(logger)
            .select(
                Selection::new()
                    .expr("x", crate::selection::Expr::field("y"))
                    .expr("y", crate::selection::Expr::field("x")),
            )?
            .collect()?;
        assert_eq!(out.len(), 1);
        Ok(())
    }
}
