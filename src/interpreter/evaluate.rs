use crate::ast::{
    ComparisonOperation, ConditionalOperation, Expression, ExpressionKind, MathematicOperation,
};
use crate::error::{ErrorExpression, EvalResult};
use crate::functions::{BuiltinFunction, call_function};
use crate::token::Span;

use super::scope::{InterpreterScope, ScopeContext};

impl Expression {
    fn rebuild(&self, kind: ExpressionKind) -> Expression {
        Expression {
            kind,
            span: self.span,
            logical_unit: self.logical_unit,
        }
    }

    /// Produces a new tree with every name resolved, every call executed and
    /// every constant subexpression folded.
    pub fn replace_variables(&self, scope: &InterpreterScope<'_>) -> EvalResult<Expression> {
        match &self.kind {
            ExpressionKind::Integer(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::FunctionReference(_)
            | ExpressionKind::MemoryAccessor(_)
            | ExpressionKind::AlwaysTrue
            | ExpressionKind::AlwaysFalse => Ok(self.clone()),
            ExpressionKind::Variable(name) => resolve_variable(name, self.span, scope),
            ExpressionKind::IndexedVariable { base, index } => {
                let container = base.replace_variables(scope)?;
                let key = index.evaluate(scope)?;
                match &container.kind {
                    ExpressionKind::Dictionary(entries) => entries
                        .iter()
                        .find(|(candidate, _)| *candidate == key)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            ErrorExpression::evaluation(
                                format!("No entry in dictionary for key: {key}"),
                                index.span,
                            )
                        }),
                    _ => Err(ErrorExpression::evaluation(
                        format!("Cannot index: {base} ({})", container.kind_name()),
                        base.span,
                    )),
                }
            }
            ExpressionKind::Array(entries) => {
                let entries = entries
                    .iter()
                    .map(|entry| entry.evaluate(scope))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(self.rebuild(ExpressionKind::Array(entries)))
            }
            ExpressionKind::Dictionary(entries) => {
                let mut evaluated: Vec<(Expression, Expression)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = key.evaluate(scope)?;
                    if evaluated.iter().any(|(existing, _)| *existing == key) {
                        return Err(ErrorExpression::evaluation(
                            format!("Duplicate key in dictionary: {key}"),
                            key.span,
                        ));
                    }
                    let value = value.evaluate(scope)?;
                    evaluated.push((key, value));
                }
                Ok(self.rebuild(ExpressionKind::Dictionary(evaluated)))
            }
            ExpressionKind::Mathematic { left, op, right } => {
                let left = left.replace_variables(scope)?;
                let right = right.replace_variables(scope)?;
                fold_mathematic(self, left, *op, right)
            }
            ExpressionKind::Comparison { left, op, right } => {
                let left = left.replace_variables(scope)?;
                let right = right.replace_variables(scope)?;
                fold_comparison(self, left, *op, right)
            }
            ExpressionKind::Conditional { left, op, right } => {
                let left = left
                    .as_deref()
                    .map(|left| left.replace_variables(scope))
                    .transpose()?;
                let right = right.replace_variables(scope)?;
                fold_conditional(self, left, *op, right)
            }
            ExpressionKind::FunctionCall { name, args } => {
                match call_function(name, args, self.span, scope)? {
                    Some(value) => Ok(value),
                    None => Err(ErrorExpression::evaluation(
                        format!("{name} did not return a value"),
                        self.span,
                    )),
                }
            }
            ExpressionKind::Return(value) => Ok(self.rebuild(ExpressionKind::Return(Box::new(
                value.replace_variables(scope)?,
            )))),
            ExpressionKind::Modifier {
                modifier,
                condition,
            } => Ok(self.rebuild(ExpressionKind::Modifier {
                modifier: *modifier,
                condition: Box::new(condition.replace_variables(scope)?),
            })),
            ExpressionKind::Tally { target, entries } => {
                let entries = entries
                    .iter()
                    .map(|entry| entry.replace_variables(scope))
                    .collect::<EvalResult<Vec<_>>>()?;
                Ok(self.rebuild(ExpressionKind::Tally {
                    target: *target,
                    entries,
                }))
            }
            ExpressionKind::RichPresenceMacro(rich_presence_macro) => {
                let mut resolved = rich_presence_macro.clone();
                resolved.expression = Box::new(rich_presence_macro.expression.replace_variables(scope)?);
                Ok(self.rebuild(ExpressionKind::RichPresenceMacro(resolved)))
            }
        }
    }

    pub fn evaluate(&self, scope: &InterpreterScope<'_>) -> EvalResult<Expression> {
        if !self.is_value() {
            return Err(ErrorExpression::evaluation(
                format!("{} is not a value", self.kind_name()),
                self.span,
            )
            .with_cause(self.clone()));
        }
        self.replace_variables(scope)
    }

    /// Evaluates a condition to a constant. `&&` and `||` skip their right
    /// operand once the left decides the result.
    pub fn is_true(&self, scope: &InterpreterScope<'_>) -> EvalResult<bool> {
        match &self.kind {
            ExpressionKind::Conditional { left, op, right } => match (op, left) {
                (ConditionalOperation::Not, _) => Ok(!right.is_true(scope)?),
                (ConditionalOperation::And, Some(left)) => {
                    Ok(left.is_true(scope)? && right.is_true(scope)?)
                }
                (ConditionalOperation::Or, Some(left)) => {
                    Ok(left.is_true(scope)? || right.is_true(scope)?)
                }
                (_, None) => Err(ErrorExpression::evaluation(
                    "Missing left operand",
                    self.span,
                )),
            },
            ExpressionKind::Boolean(value) => Ok(*value),
            ExpressionKind::AlwaysTrue => Ok(true),
            ExpressionKind::AlwaysFalse => Ok(false),
            _ => {
                let value = self.replace_variables(scope)?;
                match value.kind {
                    ExpressionKind::Boolean(value) => Ok(value),
                    ExpressionKind::AlwaysTrue => Ok(true),
                    ExpressionKind::AlwaysFalse => Ok(false),
                    _ => Err(ErrorExpression::evaluation(
                        format!("Expression does not evaluate to a constant boolean: {self}"),
                        self.span,
                    )
                    .with_cause(value)),
                }
            }
        }
    }

    /// Logical negation pushed as far into the tree as it will go.
    pub fn invert(&self) -> Expression {
        let kind = match &self.kind {
            ExpressionKind::Comparison { left, op, right } => ExpressionKind::Comparison {
                left: left.clone(),
                op: op.invert(),
                right: right.clone(),
            },
            ExpressionKind::Conditional {
                left: Some(left),
                op: op @ (ConditionalOperation::And | ConditionalOperation::Or),
                right,
            } => ExpressionKind::Conditional {
                left: Some(Box::new(left.invert())),
                op: if *op == ConditionalOperation::And {
                    ConditionalOperation::Or
                } else {
                    ConditionalOperation::And
                },
                right: Box::new(right.invert()),
            },
            ExpressionKind::Conditional {
                op: ConditionalOperation::Not,
                right,
                ..
            } => return (**right).clone(),
            ExpressionKind::Boolean(value) => ExpressionKind::Boolean(!value),
            ExpressionKind::AlwaysTrue => ExpressionKind::AlwaysFalse,
            ExpressionKind::AlwaysFalse => ExpressionKind::AlwaysTrue,
            _ => return Expression::not(self.clone()).with_span(self.span),
        };
        self.rebuild(kind)
    }

    /// Whether the node is a memory read or arithmetic over one.
    pub(crate) fn references_memory(&self) -> bool {
        match &self.kind {
            ExpressionKind::MemoryAccessor(_) => true,
            ExpressionKind::Mathematic { left, right, .. } => {
                left.references_memory() || right.references_memory()
            }
            _ => false,
        }
    }
}

fn resolve_variable(name: &str, span: Span, scope: &InterpreterScope<'_>) -> EvalResult<Expression> {
    let Some(value) = scope.get_variable(name) else {
        if scope.get_function(name).is_some() || BuiltinFunction::from_name(name).is_some() {
            return Ok(Expression::new(
                ExpressionKind::FunctionReference(name.to_string()),
                span,
            ));
        }
        return Err(ErrorExpression::evaluation(
            format!("Unknown variable: {name}"),
            span,
        ));
    };

    if value.is_fully_reduced() {
        return Ok(value.clone());
    }
    if scope.is_resolving(name) {
        return Err(ErrorExpression::evaluation(
            format!("Recursive reference to variable: {name}"),
            span,
        ));
    }
    let resolving = InterpreterScope::child(
        scope,
        ScopeContext::Resolving {
            name: name.to_string(),
        },
    );
    value.replace_variables(&resolving)
}

fn overflow(original: &Expression) -> ErrorExpression {
    ErrorExpression::evaluation("Integer overflow", original.span).with_cause(original.clone())
}

fn fold_mathematic(
    original: &Expression,
    left: Expression,
    op: MathematicOperation,
    right: Expression,
) -> EvalResult<Expression> {
    match (&left.kind, &right.kind) {
        (ExpressionKind::Integer(a), ExpressionKind::Integer(b)) => {
            let (a, b) = (*a, *b);
            let value = match op {
                MathematicOperation::Add => a.checked_add(b).ok_or_else(|| overflow(original))?,
                MathematicOperation::Subtract => {
                    a.checked_sub(b).ok_or_else(|| overflow(original))?
                }
                MathematicOperation::Multiply => {
                    a.checked_mul(b).ok_or_else(|| overflow(original))?
                }
                MathematicOperation::Divide | MathematicOperation::Modulus if b == 0 => {
                    return Err(ErrorExpression::evaluation("Division by zero", right.span)
                        .with_cause(original.clone()));
                }
                MathematicOperation::Divide => a.checked_div(b).ok_or_else(|| overflow(original))?,
                MathematicOperation::Modulus => a.checked_rem(b).ok_or_else(|| overflow(original))?,
            };
            Ok(original.rebuild(ExpressionKind::Integer(value)))
        }
        (ExpressionKind::String(_), _) | (_, ExpressionKind::String(_))
            if op == MathematicOperation::Add =>
        {
            match (left.constant_text(), right.constant_text()) {
                (Some(a), Some(b)) => Ok(original.rebuild(ExpressionKind::String(a + &b))),
                _ => Err(incompatible(original, &left, op.symbol(), &right)),
            }
        }
        _ if left.references_memory() || right.references_memory() => {
            if !is_numeric(&left) || !is_numeric(&right) {
                return Err(incompatible(original, &left, op.symbol(), &right));
            }
            Ok(original.rebuild(ExpressionKind::Mathematic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            }))
        }
        _ => Err(incompatible(original, &left, op.symbol(), &right)),
    }
}

fn is_numeric(expr: &Expression) -> bool {
    matches!(expr.kind, ExpressionKind::Integer(_)) || expr.references_memory()
}

fn incompatible(original: &Expression, left: &Expression, symbol: &str, right: &Expression) -> ErrorExpression {
    ErrorExpression::evaluation(
        format!(
            "Cannot apply '{symbol}' to {} and {}",
            left.kind_name(),
            right.kind_name()
        ),
        original.span,
    )
    .with_cause(original.clone())
}

fn fold_comparison(
    original: &Expression,
    left: Expression,
    op: ComparisonOperation,
    right: Expression,
) -> EvalResult<Expression> {
    let result = match (&left.kind, &right.kind) {
        (ExpressionKind::Integer(a), ExpressionKind::Integer(b)) => op.compare(a, b),
        (ExpressionKind::String(a), ExpressionKind::String(b)) => op.compare(a, b),
        (ExpressionKind::Boolean(a), ExpressionKind::Boolean(b))
            if matches!(op, ComparisonOperation::Equal | ComparisonOperation::NotEqual) =>
        {
            op.compare(a, b)
        }
        _ if left.references_memory() || right.references_memory() => {
            if !is_numeric(&left) || !is_numeric(&right) {
                return Err(incompatible(original, &left, op.symbol(), &right));
            }
            return Ok(original.rebuild(ExpressionKind::Comparison {
                left: Box::new(left),
                op,
                right: Box::new(right),
            }));
        }
        _ if !left.is_constant()
            && !right.is_constant()
            && matches!(op, ComparisonOperation::Equal | ComparisonOperation::NotEqual) =>
        {
            (left == right) == (op == ComparisonOperation::Equal)
        }
        _ => return Err(incompatible(original, &left, op.symbol(), &right)),
    };
    Ok(original.rebuild(ExpressionKind::Boolean(result)))
}

fn is_condition(expr: &Expression) -> bool {
    !matches!(
        expr.kind,
        ExpressionKind::Integer(_)
            | ExpressionKind::String(_)
            | ExpressionKind::Array(_)
            | ExpressionKind::Dictionary(_)
            | ExpressionKind::FunctionReference(_)
            | ExpressionKind::MemoryAccessor(_)
            | ExpressionKind::Mathematic { .. }
            | ExpressionKind::RichPresenceMacro(_)
    )
}

fn fold_conditional(
    original: &Expression,
    left: Option<Expression>,
    op: ConditionalOperation,
    right: Expression,
) -> EvalResult<Expression> {
    for operand in left.iter().chain([&right]) {
        if !is_condition(operand) {
            let symbol = match op {
                ConditionalOperation::And => "&&",
                ConditionalOperation::Or => "||",
                ConditionalOperation::Not => "!",
            };
            return Err(ErrorExpression::evaluation(
                format!("Cannot apply '{symbol}' to {}", operand.kind_name()),
                operand.span,
            )
            .with_cause(original.clone()));
        }
    }

    let constant = |expr: &Expression| match expr.kind {
        ExpressionKind::Boolean(value) => Some(value),
        _ => None,
    };

    let folded = match (op, left) {
        (ConditionalOperation::Not, _) => match constant(&right) {
            Some(value) => original.rebuild(ExpressionKind::Boolean(!value)),
            None => original.rebuild(ExpressionKind::Conditional {
                left: None,
                op,
                right: Box::new(right),
            }),
        },
        (_, None) => {
            return Err(ErrorExpression::evaluation("Missing left operand", original.span));
        }
        (op, Some(left)) => {
            // The absorbing constant for AND is false; for OR it is true.
            let absorbing = op == ConditionalOperation::Or;
            match (constant(&left), constant(&right)) {
                (Some(value), _) | (_, Some(value)) if value == absorbing => {
                    original.rebuild(ExpressionKind::Boolean(absorbing))
                }
                (Some(_), _) => right,
                (_, Some(_)) => left,
                (None, None) => original.rebuild(ExpressionKind::Conditional {
                    left: Some(Box::new(left)),
                    op,
                    right: Box::new(right),
                }),
            }
        }
    };
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::interpreter::scope::Runtime;
    use crate::parser::{parse, parse_expression};

    fn with_scope<T>(setup: &str, test: impl FnOnce(&InterpreterScope<'_>) -> T) -> T {
        let runtime = Runtime::default();
        let mut scope = InterpreterScope::global(&runtime);
        for statement in parse(setup).unwrap().statements {
            let crate::ast::Statement::Assign { target, value } = statement else {
                panic!("setup must only assign");
            };
            let value = value.evaluate(&scope).unwrap();
            scope.assign_variable(target.name(), value);
        }
        test(&scope)
    }

    fn eval(setup: &str, source: &str) -> EvalResult<Expression> {
        with_scope(setup, |scope| parse_expression(source).unwrap().evaluate(scope))
    }

    #[test]
    fn indexes_dictionaries() {
        let setup = indoc! {r#"
            dict = {1: "one", "key": 2, 6: "six"}
            grid = {1: {2: "a"}, 3: {4: "b"}}
            number = 5
        "#};
        assert_eq!(eval(setup, "dict[1]").unwrap(), Expression::string("one"));
        assert_eq!(eval(setup, "dict[\"key\"]").unwrap(), Expression::integer(2));
        assert_eq!(eval(setup, "dict[2 + 4]").unwrap(), Expression::string("six"));
        assert_eq!(eval(setup, "grid[3][4]").unwrap(), Expression::string("b"));

        let error = eval(setup, "dict[\"missing\"]").unwrap_err();
        assert_eq!(error.message, "No entry in dictionary for key: \"missing\"");

        let error = eval(setup, "number[1]").unwrap_err();
        assert_eq!(error.message, "Cannot index: number (IntegerConstant)");
    }

    #[test]
    fn folds_constants_and_keeps_memory() {
        assert_eq!(eval("", "1 + 2 * 3").unwrap(), Expression::integer(7));
        assert_eq!(eval("", "\"a\" + 1").unwrap(), Expression::string("a1"));
        assert_eq!(eval("", "3 < 4").unwrap(), Expression::boolean(true));
        assert_eq!(
            eval("", "byte(0x10) + 2").unwrap().to_string(),
            "byte(0x000010) + 2"
        );
        assert_eq!(
            eval("", "byte(0x10) == 2 && true").unwrap().to_string(),
            "byte(0x000010) == 2"
        );
        assert_eq!(eval("", "byte(0x10) == 2 && false").unwrap(), Expression::boolean(false));
    }

    #[test]
    fn arithmetic_errors() {
        assert_eq!(eval("", "1 / 0").unwrap_err().message, "Division by zero");
        assert_eq!(
            eval("", "[1] + 2").unwrap_err().message,
            "Cannot apply '+' to Array and IntegerConstant"
        );
        assert_eq!(
            eval("", "{1: 2, 1: 3}").unwrap_err().message,
            "Duplicate key in dictionary: 1"
        );
        assert_eq!(
            eval("", "\"a\" < 1").unwrap_err().message,
            "Cannot apply '<' to StringConstant and IntegerConstant"
        );
    }

    #[test]
    fn unknown_and_recursive_variables() {
        assert_eq!(eval("", "missing").unwrap_err().message, "Unknown variable: missing");

        with_scope("", |scope| {
            let mut local = InterpreterScope::child(scope, ScopeContext::Global);
            local.assign_variable("x", Expression::variable("y"));
            local.assign_variable("y", Expression::variable("x"));
            let error = Expression::variable("x").evaluate(&local).unwrap_err();
            assert_eq!(error.message, "Recursive reference to variable: x");
        });
    }

    #[test]
    fn short_circuits_conditions() {
        with_scope("flag = 1", |scope| {
            let skip_right = parse_expression("flag == 2 && missing == 1").unwrap();
            assert!(!skip_right.is_true(scope).unwrap());
            let skip_or = parse_expression("flag == 1 || missing == 1").unwrap();
            assert!(skip_or.is_true(scope).unwrap());
            let evaluated = parse_expression("flag == 1 && missing == 1").unwrap();
            assert_eq!(
                evaluated.is_true(scope).unwrap_err().message,
                "Unknown variable: missing"
            );
            let not = parse_expression("!(flag == 2)").unwrap();
            assert!(not.is_true(scope).unwrap());
        });
    }

    #[test]
    fn non_constant_conditions_are_rejected() {
        let error = with_scope("", |scope| {
            parse_expression("byte(1) == 2").unwrap().is_true(scope).unwrap_err()
        });
        assert_eq!(
            error.message,
            "Expression does not evaluate to a constant boolean: byte(1) == 2"
        );
    }

    #[test]
    fn inversion() {
        let expr = parse_expression("a == 1 && (b < 2 || !c)").unwrap();
        assert_eq!(expr.invert().to_string(), "a != 1 || (b >= 2 && c)");
        assert_eq!(Expression::boolean(true).invert(), Expression::boolean(false));
        assert_eq!(Expression::variable("x").invert().to_string(), "!x");
    }
}
