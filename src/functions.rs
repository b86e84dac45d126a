//! Built-in function library and user function dispatch.

mod combinators;
mod commands;
mod memory;
mod modifiers;
mod scalar;

use std::fmt;

use crate::ast::{ConditionModifier, Expression, ExpressionKind, FunctionDefinition};
use crate::builder::{FieldSize, FieldType};
use crate::error::{ErrorExpression, EvalResult};
use crate::interpreter::{ExecResult, InterpreterScope, exec_block};
use crate::token::Span;

use combinators::{AllOf, AnyOf, NoneOf, SumOf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunction {
    Memory(FieldSize),
    Bit,
    Prev,
    Prior,
    Bcd,
    Once,
    Repeated,
    Never,
    Unless,
    TriggerWhen,
    Measured,
    Deduct,
    Tally,
    AlwaysTrue,
    AlwaysFalse,
    AllOf,
    AnyOf,
    NoneOf,
    SumOf,
    Range,
    Length,
    Format,
    Achievement,
    Leaderboard,
    RichPresenceDisplay,
    RichPresenceConditionalDisplay,
    RichPresenceValue,
    RichPresenceLookup,
}

impl BuiltinFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(size) = FieldSize::from_function_name(name) {
            return Some(Self::Memory(size));
        }
        let function = match name {
            "bit" => Self::Bit,
            "prev" => Self::Prev,
            "prior" => Self::Prior,
            "bcd" => Self::Bcd,
            "once" => Self::Once,
            "repeated" => Self::Repeated,
            "never" => Self::Never,
            "unless" => Self::Unless,
            "trigger_when" => Self::TriggerWhen,
            "measured" => Self::Measured,
            "deduct" => Self::Deduct,
            "tally" => Self::Tally,
            "always_true" => Self::AlwaysTrue,
            "always_false" => Self::AlwaysFalse,
            "all_of" => Self::AllOf,
            "any_of" => Self::AnyOf,
            "none_of" => Self::NoneOf,
            "sum_of" => Self::SumOf,
            "range" => Self::Range,
            "length" => Self::Length,
            "format" => Self::Format,
            "achievement" => Self::Achievement,
            "leaderboard" => Self::Leaderboard,
            "rich_presence_display" => Self::RichPresenceDisplay,
            "rich_presence_conditional_display" => Self::RichPresenceConditionalDisplay,
            "rich_presence_value" => Self::RichPresenceValue,
            "rich_presence_lookup" => Self::RichPresenceLookup,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Memory(size) => size.function_name(),
            Self::Bit => "bit",
            Self::Prev => "prev",
            Self::Prior => "prior",
            Self::Bcd => "bcd",
            Self::Once => "once",
            Self::Repeated => "repeated",
            Self::Never => "never",
            Self::Unless => "unless",
            Self::TriggerWhen => "trigger_when",
            Self::Measured => "measured",
            Self::Deduct => "deduct",
            Self::Tally => "tally",
            Self::AlwaysTrue => "always_true",
            Self::AlwaysFalse => "always_false",
            Self::AllOf => "all_of",
            Self::AnyOf => "any_of",
            Self::NoneOf => "none_of",
            Self::SumOf => "sum_of",
            Self::Range => "range",
            Self::Length => "length",
            Self::Format => "format",
            Self::Achievement => "achievement",
            Self::Leaderboard => "leaderboard",
            Self::RichPresenceDisplay => "rich_presence_display",
            Self::RichPresenceConditionalDisplay => "rich_presence_conditional_display",
            Self::RichPresenceValue => "rich_presence_value",
            Self::RichPresenceLookup => "rich_presence_lookup",
        }
    }

    /// Runs the builtin on already evaluated arguments.
    pub(crate) fn call(
        self,
        values: &[Expression],
        span: Span,
        scope: &InterpreterScope<'_>,
    ) -> EvalResult<Option<Expression>> {
        let args = Arguments::new(self.name(), values, span);
        match self {
            Self::Memory(size) => memory::accessor(size, &args),
            Self::Bit => memory::bit(&args),
            Self::Prev => memory::wrap(FieldType::Delta, &args),
            Self::Prior => memory::wrap(FieldType::Prior, &args),
            Self::Bcd => memory::wrap(FieldType::Bcd, &args),
            Self::Once => modifiers::once(&args),
            Self::Repeated => modifiers::repeated(&args),
            Self::Never => modifiers::wrap(ConditionModifier::Never, &args),
            Self::Unless => modifiers::wrap(ConditionModifier::Unless, &args),
            Self::TriggerWhen => modifiers::wrap(ConditionModifier::TriggerWhen, &args),
            Self::Measured => modifiers::wrap(ConditionModifier::Measured, &args),
            Self::Deduct => modifiers::wrap(ConditionModifier::Deduct, &args),
            Self::Tally => modifiers::tally(&args),
            Self::AlwaysTrue => modifiers::sentinel(ExpressionKind::AlwaysTrue, &args),
            Self::AlwaysFalse => modifiers::sentinel(ExpressionKind::AlwaysFalse, &args),
            Self::AllOf => combinators::join(&AllOf, &args, scope),
            Self::AnyOf => combinators::join(&AnyOf, &args, scope),
            Self::NoneOf => combinators::join(&NoneOf, &args, scope),
            Self::SumOf => combinators::join(&SumOf, &args, scope),
            Self::Range => scalar::range(&args),
            Self::Length => scalar::length(&args),
            Self::Format => scalar::format(&args),
            Self::Achievement => commands::achievement(&args, scope),
            Self::Leaderboard => commands::leaderboard(&args, scope),
            Self::RichPresenceDisplay => commands::rich_presence_display(&args, scope),
            Self::RichPresenceConditionalDisplay => {
                commands::rich_presence_conditional_display(&args, scope)
            }
            Self::RichPresenceValue => commands::rich_presence_value(&args),
            Self::RichPresenceLookup => commands::rich_presence_lookup(&args),
        }
    }
}

/// Evaluated arguments of one builtin call plus typed accessors.
pub(crate) struct Arguments<'a> {
    function: &'static str,
    values: &'a [Expression],
    span: Span,
}

impl<'a> Arguments<'a> {
    fn new(function: &'static str, values: &'a [Expression], span: Span) -> Self {
        Self {
            function,
            values,
            span,
        }
    }

    pub(crate) fn span(&self) -> Span {
        self.span
    }

    pub(crate) fn error(&self, message: impl fmt::Display) -> ErrorExpression {
        ErrorExpression::evaluation(format!("{}: {message}", self.function), self.span)
    }

    fn type_error(&self, name: &str, expected: &str, value: &Expression) -> ErrorExpression {
        ErrorExpression::evaluation(
            format!(
                "{}: {name} must be {expected}, got {}",
                self.function,
                value.kind_name()
            ),
            value.span,
        )
        .with_cause(value.clone())
    }

    pub(crate) fn expect_count(&self, min: usize, max: usize) -> EvalResult<()> {
        let count = self.values.len();
        if count < min {
            return Err(self.error(format!(
                "expected at least {min} arguments, got {count}"
            )));
        }
        if count > max {
            return Err(self.error(format!("expected at most {max} arguments, got {count}")));
        }
        Ok(())
    }

    pub(crate) fn get(&self, index: usize) -> Option<&'a Expression> {
        self.values.get(index)
    }

    pub(crate) fn rest(&self, start: usize) -> &'a [Expression] {
        self.values.get(start..).unwrap_or_default()
    }

    pub(crate) fn value(&self, index: usize, name: &str) -> EvalResult<&'a Expression> {
        self.get(index)
            .ok_or_else(|| self.error(format!("missing required parameter '{name}'")))
    }

    pub(crate) fn integer(&self, index: usize, name: &str) -> EvalResult<i64> {
        let value = self.value(index, name)?;
        match value.kind {
            ExpressionKind::Integer(integer) => Ok(integer),
            _ => Err(self.type_error(name, "an integer constant", value)),
        }
    }

    pub(crate) fn string(&self, index: usize, name: &str) -> EvalResult<&'a str> {
        let value = self.value(index, name)?;
        match &value.kind {
            ExpressionKind::String(text) => Ok(text),
            _ => Err(self.type_error(name, "a string", value)),
        }
    }

    pub(crate) fn optional_string(&self, index: usize, name: &str, default: &'a str) -> EvalResult<&'a str> {
        match self.get(index) {
            Some(_) => self.string(index, name),
            None => Ok(default),
        }
    }

    /// A value usable as a trigger clause.
    pub(crate) fn condition(&self, index: usize, name: &str) -> EvalResult<Expression> {
        let value = self.value(index, name)?;
        self.check_condition(value, name)?;
        Ok(value.clone())
    }

    pub(crate) fn check_condition(&self, value: &Expression, name: &str) -> EvalResult<()> {
        match value.kind {
            ExpressionKind::Comparison { .. }
            | ExpressionKind::Conditional { .. }
            | ExpressionKind::Modifier { .. }
            | ExpressionKind::Tally { .. }
            | ExpressionKind::Boolean(_)
            | ExpressionKind::AlwaysTrue
            | ExpressionKind::AlwaysFalse => Ok(()),
            _ => Err(self.type_error(name, "a condition", value)),
        }
    }
}

fn evaluate_arguments(args: &[Expression], scope: &InterpreterScope<'_>) -> EvalResult<Vec<Expression>> {
    args.iter().map(|arg| arg.evaluate(scope)).collect()
}

/// Evaluates `args` in `scope` and calls the named user function, builtin or
/// function reference.
pub(crate) fn call_function(
    name: &str,
    args: &[Expression],
    span: Span,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    let values = evaluate_arguments(args, scope)?;
    invoke(name, values, span, scope)
}

/// Calls a function with arguments that are already evaluated.
pub(crate) fn invoke(
    name: &str,
    values: Vec<Expression>,
    span: Span,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    if let Some(definition) = scope.get_function(name) {
        return call_user_function(definition, values, span, scope);
    }
    if let Some(builtin) = BuiltinFunction::from_name(name) {
        return builtin.call(&values, span, scope);
    }
    if let Some(value) = scope.get_variable(name)
        && let ExpressionKind::FunctionReference(target) = &value.kind
        && target != name
    {
        return invoke(target, values, span, scope);
    }
    Err(ErrorExpression::evaluation(
        format!("Unknown function: {name}"),
        span,
    ))
}

fn call_user_function(
    definition: &FunctionDefinition,
    values: Vec<Expression>,
    span: Span,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    let name = &definition.name;
    if scope.depth() >= scope.runtime().settings().max_call_depth {
        return Err(ErrorExpression::evaluation(
            format!("Maximum call depth exceeded calling {name}"),
            span,
        ));
    }
    if values.len() > definition.parameters.len() {
        return Err(ErrorExpression::evaluation(
            format!(
                "Too many parameters passed to {name}: expected {}, got {}",
                definition.parameters.len(),
                values.len()
            ),
            span,
        ));
    }

    log::trace!(
        "{} calls {name} with {} arguments",
        scope.context(),
        values.len()
    );
    let mut call_scope = scope.function_call(name, span);
    let mut values = values.into_iter();
    let mut defaulted = Vec::new();
    for parameter in &definition.parameters {
        let value = match (values.next(), &parameter.default) {
            (Some(value), _) => value,
            (None, Some(default)) => {
                defaulted.push((parameter.name.as_str(), default.span));
                default.clone()
            }
            (None, None) => {
                return Err(ErrorExpression::evaluation(
                    format!("Required parameter '{}' not provided to {name}", parameter.name),
                    span,
                ));
            }
        };
        call_scope.assign_variable(parameter.name.clone(), value);
    }
    // Defaults may refer to other parameters in any order, so they are bound
    // unevaluated and then resolved by name.
    for (parameter, default_span) in defaulted {
        let value = Expression::variable(parameter)
            .with_span(default_span)
            .evaluate(&call_scope)?;
        call_scope.assign_variable(parameter, value);
    }

    match exec_block(&definition.body, &mut call_scope)? {
        ExecResult::Return(value) => Ok(Some(value)),
        ExecResult::Continue => Ok(None),
    }
}
