use crate::ast::{ConditionModifier, Expression, ExpressionKind};
use crate::error::EvalResult;

use super::Arguments;

fn modifier(modifier: ConditionModifier, condition: Expression, args: &Arguments<'_>) -> Expression {
    Expression::new(
        ExpressionKind::Modifier {
            modifier,
            condition: Box::new(condition),
        },
        args.span(),
    )
}

fn positive(args: &Arguments<'_>, index: usize, name: &str) -> EvalResult<u32> {
    let value = args.integer(index, name)?;
    match u32::try_from(value) {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(args.error(format!("{name} must be greater than zero, got {value}"))),
    }
}

pub(super) fn once(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 1)?;
    let condition = args.condition(0, "condition")?;
    Ok(Some(modifier(ConditionModifier::Repeated(1), condition, args)))
}

pub(super) fn repeated(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(2, 2)?;
    let count = positive(args, 0, "count")?;
    let condition = args.condition(1, "condition")?;
    Ok(Some(modifier(ConditionModifier::Repeated(count), condition, args)))
}

/// `never`, `unless`, `trigger_when`, `measured` and `deduct`.
pub(super) fn wrap(kind: ConditionModifier, args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 1)?;
    let condition = args.condition(0, "condition")?;
    Ok(Some(modifier(kind, condition, args)))
}

/// `tally(target, conditions...)`; array arguments are spread.
pub(super) fn tally(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(2, usize::MAX)?;
    let target = positive(args, 0, "count")?;
    let mut entries = Vec::new();
    for value in args.rest(1) {
        match &value.kind {
            ExpressionKind::Array(items) => {
                for item in items {
                    args.check_condition(item, "condition")?;
                    entries.push(item.clone());
                }
            }
            _ => {
                args.check_condition(value, "condition")?;
                entries.push(value.clone());
            }
        }
    }
    if entries.is_empty() {
        return Err(args.error("requires at least one condition"));
    }
    Ok(Some(Expression::new(
        ExpressionKind::Tally { target, entries },
        args.span(),
    )))
}

/// `always_true()` and `always_false()`.
pub(super) fn sentinel(kind: ExpressionKind, args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(0, 0)?;
    Ok(Some(Expression::new(kind, args.span())))
}

#[cfg(test)]
mod tests {
    use crate::error::EvalResult;
    use crate::interpreter::{InterpreterScope, Runtime};
    use crate::parser::parse_expression;

    fn eval(source: &str) -> EvalResult<String> {
        let runtime = Runtime::default();
        let scope = InterpreterScope::global(&runtime);
        parse_expression(source)?.evaluate(&scope).map(|value| value.to_string())
    }

    #[test]
    fn wraps_conditions() {
        assert_eq!(eval("once(byte(1) == 2)").unwrap(), "once(byte(0x000001) == 2)");
        assert_eq!(
            eval("repeated(3, byte(1) == 2)").unwrap(),
            "repeated(3, byte(0x000001) == 2)"
        );
        assert_eq!(
            eval("never(byte(1) != 0)").unwrap(),
            "never(byte(0x000001) != 0)"
        );
        assert_eq!(eval("always_false()").unwrap(), "always_false()");
    }

    #[test]
    fn tally_spreads_arrays() {
        assert_eq!(
            eval("tally(2, [byte(1) == 1, byte(2) == 1], deduct(byte(3) == 1))").unwrap(),
            "tally(2, byte(0x000001) == 1, byte(0x000002) == 1, deduct(byte(0x000003) == 1))"
        );
    }

    #[test]
    fn validates_arguments() {
        assert_eq!(
            eval("repeated(0, byte(1) == 2)").unwrap_err().message,
            "repeated: count must be greater than zero, got 0"
        );
        assert_eq!(
            eval("never(byte(1))").unwrap_err().message,
            "never: condition must be a condition, got MemoryAccessor"
        );
        assert_eq!(
            eval("tally(1, [])").unwrap_err().message,
            "tally: requires at least one condition"
        );
        assert_eq!(
            eval("always_true(1)").unwrap_err().message,
            "always_true: expected at most 0 arguments, got 1"
        );
    }
}
