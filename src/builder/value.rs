use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::ast::{Expression, ExpressionKind, MathematicOperation};
use crate::builder::condition::{MemoryAccessor, Operand, Operator, WireError, WireReader, WireResult};
use crate::error::{ErrorExpression, EvalResult};

/// Display format for leaderboard and rich presence values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueFormat {
    Value,
    Score,
    Frames,
    Seconds,
    Centiseconds,
    Minutes,
    SecondsAsMinutes,
    Unsigned,
    Other,
}

impl ValueFormat {
    pub fn from_name(name: &str) -> Option<ValueFormat> {
        let format = match name.to_ascii_uppercase().as_str() {
            "VALUE" => ValueFormat::Value,
            "SCORE" | "POINTS" => ValueFormat::Score,
            "FRAMES" | "TIME" => ValueFormat::Frames,
            "SECS" | "SECONDS" => ValueFormat::Seconds,
            "MILLISECS" | "CENTISECS" => ValueFormat::Centiseconds,
            "MINUTES" => ValueFormat::Minutes,
            "SECS_AS_MINS" => ValueFormat::SecondsAsMinutes,
            "UNSIGNED" => ValueFormat::Unsigned,
            "OTHER" => ValueFormat::Other,
            _ => return None,
        };
        Some(format)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueFormat::Value => "VALUE",
            ValueFormat::Score => "SCORE",
            ValueFormat::Frames => "TIME",
            ValueFormat::Seconds => "SECS",
            ValueFormat::Centiseconds => "MILLISECS",
            ValueFormat::Minutes => "MINUTES",
            ValueFormat::SecondsAsMinutes => "SECS_AS_MINS",
            ValueFormat::Unsigned => "UNSIGNED",
            ValueFormat::Other => "OTHER",
        }
    }
}

impl fmt::Display for ValueFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One memory read in an additive chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SourceTerm {
    pub accessor: MemoryAccessor,
    pub subtract: bool,
    pub modifier: Option<(Operator, u32)>,
}

fn conversion_error(expr: &Expression) -> ErrorExpression {
    ErrorExpression::evaluation(
        format!("Cannot convert {} to a memory value: {expr}", expr.kind_name()),
        expr.span,
    )
    .with_cause(expr.clone())
}

fn factor(value: i64, expr: &Expression) -> EvalResult<u32> {
    u32::try_from(value).map_err(|_| {
        ErrorExpression::evaluation(format!("Invalid scale factor: {value}"), expr.span)
            .with_cause(expr.clone())
    })
}

/// Splits an additive memory expression into terms plus a constant offset.
pub(crate) fn collect_terms(
    expr: &Expression,
    subtract: bool,
    terms: &mut Vec<SourceTerm>,
    offset: &mut i64,
) -> EvalResult<()> {
    match &expr.kind {
        ExpressionKind::Integer(value) => {
            let delta = if subtract { value.checked_neg() } else { Some(*value) };
            *offset = delta
                .and_then(|delta| offset.checked_add(delta))
                .ok_or_else(|| ErrorExpression::evaluation("Integer overflow", expr.span))?;
            Ok(())
        }
        ExpressionKind::MemoryAccessor(accessor) => {
            terms.push(SourceTerm {
                accessor: *accessor,
                subtract,
                modifier: None,
            });
            Ok(())
        }
        ExpressionKind::Mathematic { left, op, right } => match op {
            MathematicOperation::Add => {
                collect_terms(left, subtract, terms, offset)?;
                collect_terms(right, subtract, terms, offset)
            }
            MathematicOperation::Subtract => {
                collect_terms(left, subtract, terms, offset)?;
                collect_terms(right, !subtract, terms, offset)
            }
            MathematicOperation::Multiply | MathematicOperation::Divide => {
                let (accessor, scale) = match (&left.kind, &right.kind) {
                    (ExpressionKind::MemoryAccessor(accessor), ExpressionKind::Integer(scale)) => {
                        (accessor, *scale)
                    }
                    (ExpressionKind::Integer(scale), ExpressionKind::MemoryAccessor(accessor))
                        if *op == MathematicOperation::Multiply =>
                    {
                        (accessor, *scale)
                    }
                    _ => return Err(conversion_error(expr)),
                };
                let operator = if *op == MathematicOperation::Multiply {
                    Operator::Multiply
                } else {
                    if scale == 0 {
                        return Err(ErrorExpression::evaluation("Division by zero", expr.span));
                    }
                    Operator::Divide
                };
                terms.push(SourceTerm {
                    accessor: *accessor,
                    subtract,
                    modifier: Some((operator, factor(scale, expr)?)),
                });
                Ok(())
            }
            MathematicOperation::Modulus => Err(conversion_error(expr)),
        },
        _ => Err(conversion_error(expr)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTerm {
    Memory { operand: Operand, multiplier: i64 },
    Constant(i64),
}

/// Leaderboard/rich presence value: terms summed each frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Value {
    pub terms: Vec<ValueTerm>,
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, term) in self.terms.iter().enumerate() {
            if index > 0 {
                f.write_str("_")?;
            }
            match term {
                ValueTerm::Memory {
                    operand,
                    multiplier: 1,
                } => write!(f, "{operand}")?,
                ValueTerm::Memory {
                    operand,
                    multiplier,
                } => write!(f, "{operand}*{multiplier}")?,
                ValueTerm::Constant(value) => write!(f, "v{value}")?,
            }
        }
        Ok(())
    }
}

fn read_value(reader: &mut WireReader<'_>) -> WireResult<Value> {
    let mut value = Value::default();
    loop {
        let term = if matches!(reader.peek(), Some('v' | 'V')) {
            reader.advance();
            ValueTerm::Constant(reader.read_signed()?)
        } else {
            let operand = reader.read_operand()?;
            let multiplier = if reader.peek() == Some('*') {
                reader.advance();
                reader.read_signed()?
            } else {
                1
            };
            ValueTerm::Memory {
                operand,
                multiplier,
            }
        };
        value.terms.push(term);
        if reader.peek() != Some('_') {
            break;
        }
        reader.advance();
    }
    Ok(value)
}

impl FromStr for Value {
    type Err = WireError;

    fn from_str(input: &str) -> WireResult<Self> {
        let mut reader = WireReader::new(input);
        let value = read_value(&mut reader)?;
        reader.expect_end()?;
        Ok(value)
    }
}

/// Lowers an evaluated arithmetic expression into a [`Value`].
pub fn build_value(expression: &Expression) -> EvalResult<Value> {
    let mut terms = Vec::new();
    let mut offset = 0;
    collect_terms(expression, false, &mut terms, &mut offset)?;

    let mut value = Value::default();
    for term in terms {
        let scale = match term.modifier {
            None => 1,
            Some((Operator::Multiply, factor)) => i64::from(factor),
            Some(_) => {
                return Err(ErrorExpression::evaluation(
                    "Division is not supported in values",
                    expression.span,
                )
                .with_cause(expression.clone()));
            }
        };
        value.terms.push(ValueTerm::Memory {
            operand: Operand::Memory(term.accessor),
            multiplier: if term.subtract { -scale } else { scale },
        });
    }
    if offset != 0 || value.terms.is_empty() {
        value.terms.push(ValueTerm::Constant(offset));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FieldSize;

    fn accessor(size: FieldSize, address: u32) -> Expression {
        Expression::new(
            ExpressionKind::MemoryAccessor(MemoryAccessor::new(size, address)),
            Default::default(),
        )
    }

    #[test]
    fn builds_scaled_sums() {
        let expr = Expression::mathematic(
            Expression::mathematic(
                accessor(FieldSize::Byte, 0x10),
                MathematicOperation::Multiply,
                Expression::integer(100),
            ),
            MathematicOperation::Subtract,
            Expression::mathematic(
                accessor(FieldSize::Word, 0x20),
                MathematicOperation::Add,
                Expression::integer(5),
            ),
        );
        let value = build_value(&expr).unwrap();
        assert_eq!(value.to_string(), "0xH000010*100_0x 000020*-1_v-5");
    }

    #[test]
    fn plain_accessor_has_no_multiplier() {
        let value = build_value(&accessor(FieldSize::DWord, 0xABCDEF)).unwrap();
        assert_eq!(value.to_string(), "0xXabcdef");
    }

    #[test]
    fn rejects_division_and_non_memory() {
        let divided = Expression::mathematic(
            accessor(FieldSize::Byte, 1),
            MathematicOperation::Divide,
            Expression::integer(2),
        );
        assert_eq!(
            build_value(&divided).unwrap_err().message,
            "Division is not supported in values"
        );
        assert_eq!(
            build_value(&Expression::string("x")).unwrap_err().message,
            "Cannot convert StringConstant to a memory value: \"x\""
        );
    }

    #[test]
    fn parses_value_terms() {
        let value: Value = "0xH000010*100_0x 000020*-1_v-5".parse().unwrap();
        assert_eq!(value.terms.len(), 3);
        assert_eq!(value.terms[2], ValueTerm::Constant(-5));
        assert_eq!(value.to_string(), "0xH000010*100_0x 000020*-1_v-5");
    }

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(ValueFormat::from_name("score"), Some(ValueFormat::Score));
        assert_eq!(ValueFormat::from_name("FRAMES").map(ValueFormat::as_str), Some("TIME"));
        assert_eq!(ValueFormat::from_name("fps"), None);
    }
}
