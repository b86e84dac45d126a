use crate::ast::{Expression, ExpressionKind};
use crate::builder::{FieldSize, FieldType, MemoryAccessor};
use crate::error::EvalResult;

use super::Arguments;

fn address(args: &Arguments<'_>, index: usize) -> EvalResult<u32> {
    let value = args.value(index, "address")?;
    match value.kind {
        ExpressionKind::Integer(address) => u32::try_from(address)
            .map_err(|_| args.error(format!("address out of range: {address}"))),
        ExpressionKind::MemoryAccessor(_) | ExpressionKind::Mathematic { .. } => {
            Err(args.error("address must be a constant, indirect addressing is not supported"))
        }
        _ => Err(args.type_error("address", "an integer constant", value)),
    }
}

fn accessor_expression(accessor: MemoryAccessor, args: &Arguments<'_>) -> Expression {
    Expression::new(ExpressionKind::MemoryAccessor(accessor), args.span())
}

/// `byte(address)` and the other fixed-size readers.
pub(super) fn accessor(size: FieldSize, args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 1)?;
    let address = address(args, 0)?;
    Ok(Some(accessor_expression(
        MemoryAccessor::new(size, address),
        args,
    )))
}

/// `bit(index, address)`
pub(super) fn bit(args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(2, 2)?;
    let index = args.integer(0, "index")?;
    let size = FieldSize::bit(index)
        .ok_or_else(|| args.error(format!("index must be between 0 and 7, got {index}")))?;
    let address = address(args, 1)?;
    Ok(Some(accessor_expression(
        MemoryAccessor::new(size, address),
        args,
    )))
}

/// `prev`, `prior` and `bcd` rewrap a plain memory read.
pub(super) fn wrap(field_type: FieldType, args: &Arguments<'_>) -> EvalResult<Option<Expression>> {
    args.expect_count(1, 1)?;
    let value = args.value(0, "accessor")?;
    match value.kind {
        ExpressionKind::MemoryAccessor(accessor) if accessor.field_type == FieldType::Mem => Ok(
            Some(accessor_expression(accessor.with_type(field_type), args)),
        ),
        ExpressionKind::MemoryAccessor(_) => {
            Err(args.error(format!("cannot be applied to {value}")))
        }
        _ => Err(args.error(format!(
            "accessor must be a memory read, got {}",
            value.kind_name()
        ))),
    }
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
    fn builds_accessors() {
        assert_eq!(eval("byte(0x1234)").unwrap(), "byte(0x001234)");
        assert_eq!(eval("bit(3, 16)").unwrap(), "bit3(0x000010)");
        assert_eq!(eval("prev(high4(0x10))").unwrap(), "prev(high4(0x000010))");
        assert_eq!(eval("bcd(dword(0x10))").unwrap(), "bcd(dword(0x000010))");
    }

    #[test]
    fn rejects_bad_arguments() {
        assert_eq!(
            eval("bit(8, 16)").unwrap_err().message,
            "bit: index must be between 0 and 7, got 8"
        );
        assert_eq!(
            eval("byte(-1)").unwrap_err().message,
            "byte: address out of range: -1"
        );
        assert_eq!(
            eval("byte(\"a\")").unwrap_err().message,
            "byte: address must be an integer constant, got StringConstant"
        );
        assert_eq!(
            eval("byte(word(1))").unwrap_err().message,
            "byte: address must be a constant, indirect addressing is not supported"
        );
        assert_eq!(
            eval("prev(prev(byte(1)))").unwrap_err().message,
            "prev: cannot be applied to prev(byte(0x000001))"
        );
        assert_eq!(
            eval("word()").unwrap_err().message,
            "word: expected at least 1 arguments, got 0"
        );
    }
}
