use crate::ast::{Expression, ExpressionKind};
use crate::error::EvalResult;

use super::Arguments;

/// `range(start, end[, step])`, both ends inclusive.
pub(super) fn range(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(2, 3)?;
    let start = args.integer(0, "start")?;
    let end = args.integer(1, "end")?;
    let step = match args.get(2) {
        Some(_) => args.integer(2, "step")?,
        None => 1,
    };
    if step == 0 {
        return Err(args.error("step must not be zero"));
    }

    let mut entries = Vec::new();
    let mut current = Some(start);
    while let Some(value) = current {
        if (step > 0 && value > end) || (step < 0 && value < end) {
            break;
        }
        entries.push(Expression::integer(value).with_span(args.span()));
        current = value.checked_add(step);
    }
    Ok(Some(Expression::new(ExpressionKind::Array(entries), args.span())))
}

pub(super) fn length(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 1)?;
    let value = args.value(0, "value")?;
    let length = match &value.kind {
        ExpressionKind::Array(entries) => entries.len(),
        ExpressionKind::Dictionary(entries) => entries.len(),
        ExpressionKind::String(text) => text.chars().count(),
        _ => return Err(args.type_error("value", "an array, dictionary or string", value)),
    };
    let length = i64::try_from(length).map_err(|_| args.error("length out of range"))?;
    Ok(Some(Expression::integer(length).with_span(args.span())))
}

/// Replaces `{N}` in `template` with the text of `parameters[N]`.
/// `render` supplies the text of each parameter.
pub(super) fn substitute(
    args: &Arguments<'_>,
    template: &str,
    parameters: &[Expression],
    mut render: impl FnMut(&Expression) -> EvalResult<String>,
) -> EvalResult<String> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '{' {
            output.push(c);
            continue;
        }
        let mut digits = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(digit) if digit.is_ascii_digit() => digits.push(digit),
                _ => return Err(args.error(format!("invalid placeholder in \"{template}\""))),
            }
        }
        let parameter = digits
            .parse::<usize>()
            .ok()
            .and_then(|index| parameters.get(index))
            .ok_or_else(|| args.error(format!("invalid parameter index: {{{digits}}}")))?;
        output.push_str(&render(parameter)?);
    }
    Ok(output)
}

/// `format(template, values...)`
pub(super) fn format(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, usize::MAX)?;
    let template = args.string(0, "format")?;
    let output = substitute(args, template, args.rest(1), |value| {
        value
            .constant_text()
            .ok_or_else(|| args.type_error("parameter", "a constant", value))
    })?;
    Ok(Some(Expression::string(output).with_span(args.span())))
}

#[cfg(test)]
mod tests {
    use crate::ast::Expression;
    use crate::error::EvalResult;
    use crate::interpreter::{InterpreterScope, Runtime};
    use crate::parser::parse_expression;

    fn eval(source: &str) -> EvalResult<Expression> {
        let runtime = Runtime::default();
        let scope = InterpreterScope::global(&runtime);
        parse_expression(source)?.evaluate(&scope)
    }

    #[test]
    fn ranges_are_inclusive() {
        assert_eq!(eval("range(1, 3)").unwrap().to_string(), "[1, 2, 3]");
        assert_eq!(eval("range(0, 10, 5)").unwrap().to_string(), "[0, 5, 10]");
        assert_eq!(eval("range(3, 1, -1)").unwrap().to_string(), "[3, 2, 1]");
        assert_eq!(eval("range(3, 1)").unwrap().to_string(), "[]");
        assert_eq!(
            eval("range(1, 3, 0)").unwrap_err().message,
            "range: step must not be zero"
        );
    }

    #[test]
    fn lengths() {
        assert_eq!(eval("length([1, 2])").unwrap(), Expression::integer(2));
        assert_eq!(eval("length({1: 2})").unwrap(), Expression::integer(1));
        assert_eq!(eval("length(\"abc\")").unwrap(), Expression::integer(3));
        assert_eq!(
            eval("length(4)").unwrap_err().message,
            "length: value must be an array, dictionary or string, got IntegerConstant"
        );
    }

    #[test]
    fn formats_strings() {
        assert_eq!(
            eval("format(\"{1} of {0}\", 5, \"Level\")").unwrap(),
            Expression::string("Level of 5")
        );
        assert_eq!(
            eval("format(\"{2}\", 1)").unwrap_err().message,
            "format: invalid parameter index: {2}"
        );
        assert_eq!(
            eval("format(\"{x}\", 1)").unwrap_err().message,
            "format: invalid placeholder in \"{x}\""
        );
    }
}
