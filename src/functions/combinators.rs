//! `all_of`, `any_of`, `none_of` and `sum_of`: fold a collection into one
//! expression, optionally mapping each element through a predicate first.

use crate::ast::{ConditionalOperation, Expression, ExpressionKind, MathematicOperation};
use crate::error::{ErrorExpression, EvalResult};
use crate::interpreter::{InterpreterScope, ScopeContext};

use super::{Arguments, invoke};

pub(super) trait IterableJoiner {
    /// Checks or rewrites one mapped element before it is combined.
    fn prepare(&self, element: Expression, args: &Arguments<'_>) -> EvalResult<Expression>;

    /// Appends `right` to the running result.
    fn combine(&self, left: Option<Expression>, right: Expression) -> EvalResult<Expression>;

    /// Result for an empty collection.
    fn empty_result(&self) -> ExpressionKind;
}

pub(super) struct AllOf;
pub(super) struct AnyOf;
pub(super) struct NoneOf;
pub(super) struct SumOf;

fn constant(expr: &Expression) -> Option<bool> {
    match expr.kind {
        ExpressionKind::Boolean(value) => Some(value),
        _ => None,
    }
}

fn join_conditions(
    left: Option<Expression>,
    op: ConditionalOperation,
    right: Expression,
) -> Expression {
    let Some(left) = left else {
        return right;
    };
    let absorbing = op == ConditionalOperation::Or;
    match (constant(&left), constant(&right)) {
        (Some(value), _) | (_, Some(value)) if value == absorbing => {
            Expression::new(ExpressionKind::Boolean(absorbing), left.span)
        }
        (Some(_), _) => right,
        (_, Some(_)) => left,
        (None, None) => Expression::conditional(left, op, right),
    }
}

impl IterableJoiner for AllOf {
    fn prepare(&self, element: Expression, args: &Arguments<'_>) -> EvalResult<Expression> {
        args.check_condition(&element, "element")?;
        Ok(element)
    }

    fn combine(&self, left: Option<Expression>, right: Expression) -> EvalResult<Expression> {
        Ok(join_conditions(left, ConditionalOperation::And, right))
    }

    fn empty_result(&self) -> ExpressionKind {
        ExpressionKind::AlwaysTrue
    }
}

impl IterableJoiner for AnyOf {
    fn prepare(&self, element: Expression, args: &Arguments<'_>) -> EvalResult<Expression> {
        args.check_condition(&element, "element")?;
        Ok(element)
    }

    fn combine(&self, left: Option<Expression>, right: Expression) -> EvalResult<Expression> {
        Ok(join_conditions(left, ConditionalOperation::Or, right))
    }

    fn empty_result(&self) -> ExpressionKind {
        ExpressionKind::AlwaysFalse
    }
}

impl IterableJoiner for NoneOf {
    fn prepare(&self, element: Expression, args: &Arguments<'_>) -> EvalResult<Expression> {
        args.check_condition(&element, "element")?;
        Ok(element.invert())
    }

    fn combine(&self, left: Option<Expression>, right: Expression) -> EvalResult<Expression> {
        Ok(join_conditions(left, ConditionalOperation::And, right))
    }

    fn empty_result(&self) -> ExpressionKind {
        ExpressionKind::AlwaysTrue
    }
}

impl IterableJoiner for SumOf {
    fn prepare(&self, element: Expression, args: &Arguments<'_>) -> EvalResult<Expression> {
        if matches!(element.kind, ExpressionKind::Integer(_)) || element.references_memory() {
            return Ok(element);
        }
        Err(args.type_error("element", "numeric", &element))
    }

    fn combine(&self, left: Option<Expression>, right: Expression) -> EvalResult<Expression> {
        let Some(left) = left else {
            return Ok(right);
        };
        if let (ExpressionKind::Integer(a), ExpressionKind::Integer(b)) = (&left.kind, &right.kind)
        {
            let sum = a.checked_add(*b).ok_or_else(|| {
                ErrorExpression::evaluation("Integer overflow", right.span).with_cause(right.clone())
            })?;
            return Ok(Expression::new(ExpressionKind::Integer(sum), left.span));
        }
        Ok(Expression::mathematic(left, MathematicOperation::Add, right))
    }

    fn empty_result(&self) -> ExpressionKind {
        ExpressionKind::Integer(0)
    }
}

/// `name(inputs[, predicate])`
pub(super) fn join<J: IterableJoiner>(
    joiner: &J,
    args: &Arguments<'_>,
    scope: &InterpreterScope<'_>,
) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 2)?;
    let inputs = args.value(0, "inputs")?;
    let Some(items) = inputs.iterable_expressions() else {
        return Err(args.type_error("inputs", "an array or dictionary", inputs));
    };
    let predicate = match args.get(1) {
        None => None,
        Some(value) => match &value.kind {
            ExpressionKind::FunctionReference(name) => Some(name.as_str()),
            _ => return Err(args.type_error("predicate", "a function reference", value)),
        },
    };

    let mut result = None;
    for item in items {
        let element = match predicate {
            Some(name) => {
                let iteration = InterpreterScope::child(
                    scope,
                    ScopeContext::Iteration {
                        variable: name.to_string(),
                    },
                );
                invoke(name, vec![item.clone()], args.span(), &iteration)?
                    .ok_or_else(|| args.error(format!("{name} did not return a value")))?
            }
            None => item.clone(),
        };
        let element = joiner.prepare(element, args)?.as_logical_unit();
        result = Some(joiner.combine(result, element)?);
    }

    let result = result.unwrap_or_else(|| Expression::new(joiner.empty_result(), args.span()));
    Ok(Some(result.with_span(args.span()).as_logical_unit()))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::ast::{Expression, ExpressionKind};
    use crate::error::EvalResult;
    use crate::interpreter::{Interpreter, InterpreterScope, Runtime};
    use crate::parser::{parse, parse_expression};

    fn eval(source: &str) -> EvalResult<Expression> {
        let runtime = Runtime::default();
        let scope = InterpreterScope::global(&runtime);
        parse_expression(source)?.evaluate(&scope)
    }

    #[test]
    fn empty_collections() {
        assert_eq!(eval("all_of([])").unwrap().kind, ExpressionKind::AlwaysTrue);
        assert_eq!(eval("any_of([])").unwrap().kind, ExpressionKind::AlwaysFalse);
        assert_eq!(eval("none_of([])").unwrap().kind, ExpressionKind::AlwaysTrue);
        assert_eq!(eval("sum_of([])").unwrap(), Expression::integer(0));
    }

    #[test]
    fn none_of_inverts_each_element() {
        let single = eval("none_of([byte(1) == 2])").unwrap();
        assert!(single.logical_unit);
        assert_eq!(single.to_string(), "byte(0x000001) != 2");

        let pair = eval("none_of([byte(1) == 2, byte(2) < 3])").unwrap();
        assert!(pair.logical_unit);
        assert_eq!(pair.to_string(), "byte(0x000001) != 2 && byte(0x000002) >= 3");
    }

    #[test]
    fn any_of_groups_inside_larger_conditions() {
        let expr = eval("byte(9) == 0 && any_of([byte(1) == 1, byte(2) == 1])").unwrap();
        assert_eq!(
            expr.to_string(),
            "byte(0x000009) == 0 && (byte(0x000001) == 1 || byte(0x000002) == 1)"
        );
    }

    #[test]
    fn constants_fold_away() {
        assert_eq!(eval("all_of([true, byte(1) == 1])").unwrap().to_string(), "byte(0x000001) == 1");
        assert_eq!(eval("any_of([byte(1) == 1, true])").unwrap(), Expression::boolean(true));
        assert_eq!(eval("sum_of([1, 2, 3])").unwrap(), Expression::integer(6));
    }

    #[test]
    fn predicates_map_each_element() {
        let program = parse(indoc! {r#"
            function check(address) => byte(address) == 1
            function weight(address) => byte(address) * 2
            achievement("A", "", 1, any_of({0x10: "a", 0x20: "b"}, check))
            achievement("B", "", 1, sum_of(range(1, 2), weight) > 4)
        "#})
        .unwrap();
        let output = Interpreter::new().run(&program).unwrap();
        assert_eq!(
            output.achievements[0].trigger.to_string(),
            "1=1$0xH000010=1$0xH000020=1"
        );
        assert_eq!(
            output.achievements[1].trigger.to_string(),
            "A:0xH000001*2_A:0xH000002*2_0>4"
        );
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert_eq!(
            eval("all_of(1)").unwrap_err().message,
            "all_of: inputs must be an array or dictionary, got IntegerConstant"
        );
        assert_eq!(
            eval("all_of([1], 2)").unwrap_err().message,
            "all_of: predicate must be a function reference, got IntegerConstant"
        );
        assert_eq!(
            eval("any_of([1])").unwrap_err().message,
            "any_of: element must be a condition, got IntegerConstant"
        );
        assert_eq!(
            eval("sum_of([\"a\"])").unwrap_err().message,
            "sum_of: element must be numeric, got StringConstant"
        );
    }
}
