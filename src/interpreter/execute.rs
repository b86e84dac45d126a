use rustc_hash::FxHashSet;

use crate::ast::{
    AssignTarget, Expression, ExpressionKind, FunctionDefinition, NestedExpressions, Statement,
    block_modifications,
};
use crate::error::{ErrorExpression, EvalResult};
use crate::functions::{BuiltinFunction, call_function};

use super::scope::InterpreterScope;

/// Control-flow marker for statement execution.
#[derive(Debug)]
pub(crate) enum ExecResult {
    Continue,
    Return(Expression),
}

pub(crate) fn exec_block(
    body: &[Statement],
    scope: &mut InterpreterScope<'_>,
) -> EvalResult<ExecResult> {
    for statement in body {
        if let ExecResult::Return(value) = exec_statement(statement, scope)? {
            return Ok(ExecResult::Return(value));
        }
    }
    Ok(ExecResult::Continue)
}

pub(crate) fn exec_statement(
    statement: &Statement,
    scope: &mut InterpreterScope<'_>,
) -> EvalResult<ExecResult> {
    match statement {
        Statement::Assign { target, value } => {
            let value = value.evaluate(scope)?;
            match target {
                AssignTarget::Name(name) => scope.assign_variable(name.clone(), value),
                AssignTarget::Index { name, indices } => {
                    let keys = indices
                        .iter()
                        .map(|index| index.evaluate(scope))
                        .collect::<EvalResult<Vec<_>>>()?;
                    let mut container = scope.get_variable(name).cloned().ok_or_else(|| {
                        ErrorExpression::evaluation(format!("Unknown variable: {name}"), value.span)
                    })?;
                    store_entry(name, &mut container, &keys, value)?;
                    scope.assign_variable(name.clone(), container);
                }
            }
            Ok(ExecResult::Continue)
        }
        Statement::FunctionDef(definition) => Err(ErrorExpression::evaluation(
            "Functions may only be defined at the top level",
            definition.span,
        )),
        Statement::For {
            variable,
            iterable,
            body,
        } => exec_for(variable, iterable, body, scope),
        Statement::If {
            condition,
            then_body,
            else_body,
        } => {
            let body = if condition.is_true(scope)? {
                then_body
            } else {
                else_body
            };
            exec_block(body, scope)
        }
        Statement::Expr(expr) => match &expr.kind {
            ExpressionKind::Return(value) => Ok(ExecResult::Return(value.evaluate(scope)?)),
            ExpressionKind::FunctionCall { name, args } => {
                call_function(name, args, expr.span, scope)?;
                Ok(ExecResult::Continue)
            }
            _ => Err(ErrorExpression::evaluation(
                "Only assignments and function calls can be used as statements",
                expr.span,
            )
            .with_cause(expr.clone())),
        },
    }
}

/// Writes `value` at `keys` inside nested dictionaries. The last key may be
/// new; every earlier key must already exist.
fn store_entry(
    name: &str,
    container: &mut Expression,
    keys: &[Expression],
    value: Expression,
) -> EvalResult<()> {
    let Some((key, rest)) = keys.split_first() else {
        *container = value;
        return Ok(());
    };
    let kind_name = container.kind_name();
    let ExpressionKind::Dictionary(entries) = &mut container.kind else {
        return Err(ErrorExpression::evaluation(
            format!("Cannot index: {name} ({kind_name})"),
            key.span,
        ));
    };
    match entries.iter_mut().find(|(candidate, _)| candidate == key) {
        Some((_, entry)) => store_entry(name, entry, rest, value),
        None if rest.is_empty() => {
            entries.push((key.clone(), value));
            Ok(())
        }
        None => Err(ErrorExpression::evaluation(
            format!("No entry in dictionary for key: {key}"),
            key.span,
        )),
    }
}

/// The loop variable is bound in the current scope for the duration of the
/// loop so the body can update outer variables; any previous binding is
/// restored afterwards.
fn exec_for(
    variable: &str,
    iterable: &Expression,
    body: &[Statement],
    scope: &mut InterpreterScope<'_>,
) -> EvalResult<ExecResult> {
    let mut modified = FxHashSet::default();
    block_modifications(body, &mut modified);
    if modified.contains(variable) {
        return Err(ErrorExpression::evaluation(
            format!("Cannot modify loop variable {variable}"),
            iterable.span,
        ));
    }

    let collection = iterable.evaluate(scope)?;
    let items: Option<Vec<Expression>> = collection
        .iterable_expressions()
        .map(|items| items.cloned().collect());
    let items: Vec<Expression> = match items {
        Some(items) => items,
        None => {
            return Err(ErrorExpression::evaluation(
                format!("Cannot iterate over {}", collection.kind_name()),
                iterable.span,
            )
            .with_cause(collection));
        }
    };

    let shadowed = scope.remove_local(variable);
    let mut result = Ok(ExecResult::Continue);
    for item in items {
        scope.assign_variable(variable, item);
        match exec_block(body, scope) {
            Ok(ExecResult::Continue) => {}
            other => {
                result = other;
                break;
            }
        }
    }
    scope.remove_local(variable);
    if let Some(previous) = shadowed {
        scope.assign_variable(variable, previous);
    }
    result
}

pub(crate) fn define_function(
    definition: &FunctionDefinition,
    scope: &mut InterpreterScope<'_>,
) -> EvalResult<()> {
    let name = &definition.name;
    if BuiltinFunction::from_name(name).is_some() {
        return Err(ErrorExpression::evaluation(
            format!("{name} is a built-in function and cannot be redefined"),
            definition.span,
        ));
    }
    if scope.get_function(name).is_some() {
        return Err(ErrorExpression::evaluation(
            format!("Duplicate function definition: {name}"),
            definition.span,
        ));
    }

    let mut dependencies = FxHashSet::default();
    Statement::FunctionDef(definition.clone()).dependencies(&mut dependencies);
    let mut unresolved: Vec<_> = dependencies
        .into_iter()
        .filter(|dependency| {
            dependency != name
                && scope.get_variable(dependency).is_none()
                && scope.get_function(dependency).is_none()
                && BuiltinFunction::from_name(dependency).is_none()
        })
        .collect();
    if !unresolved.is_empty() {
        unresolved.sort();
        log::debug!("function {name} references names not yet defined: {unresolved:?}");
    }

    scope.define_function(definition.clone());
    Ok(())
}
