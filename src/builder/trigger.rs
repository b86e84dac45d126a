use std::fmt;
use std::str::FromStr;

use crate::ast::{
    ComparisonOperation, ConditionModifier, ConditionalOperation, Expression, ExpressionKind,
};
use crate::builder::condition::{
    Condition, ConditionFlag, Operand, WireError, WireReader, WireResult,
};
use crate::builder::value::{SourceTerm, collect_terms};
use crate::error::{ErrorExpression, EvalResult};

/// A lowered condition set: the core group plus zero or more alt groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trigger {
    pub core: Vec<Condition>,
    pub alts: Vec<Vec<Condition>>,
}

impl Trigger {
    pub fn groups(&self) -> impl Iterator<Item = &[Condition]> {
        std::iter::once(self.core.as_slice()).chain(self.alts.iter().map(Vec::as_slice))
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, group: &[Condition]) -> fmt::Result {
    for (index, condition) in group.iter().enumerate() {
        if index > 0 {
            f.write_str("_")?;
        }
        write!(f, "{condition}")?;
    }
    Ok(())
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_group(f, &self.core)?;
        for alt in &self.alts {
            f.write_str("$")?;
            write_group(f, alt)?;
        }
        Ok(())
    }
}

impl FromStr for Trigger {
    type Err = WireError;

    fn from_str(input: &str) -> WireResult<Self> {
        let mut reader = WireReader::new(input);
        let trigger = read_trigger(&mut reader)?;
        reader.expect_end()?;
        Ok(trigger)
    }
}

/// Reads groups until the input ends or a character that cannot continue a
/// trigger is found. `S` is accepted as an alt separator.
fn read_trigger(reader: &mut WireReader<'_>) -> WireResult<Trigger> {
    let mut trigger = Trigger::default();
    let mut group = Vec::new();
    let mut in_core = true;

    if matches!(reader.peek(), Some('S' | '$')) {
        reader.advance();
        in_core = false;
    }

    if reader.is_at_end() && in_core {
        return Ok(trigger);
    }

    loop {
        group.push(reader.read_condition()?);
        match reader.peek() {
            Some('_') => {
                reader.advance();
            }
            Some('S' | '$') => {
                reader.advance();
                finish_group(&mut trigger, &mut group, &mut in_core);
            }
            _ => break,
        }
    }
    finish_group(&mut trigger, &mut group, &mut in_core);
    Ok(trigger)
}

fn finish_group(trigger: &mut Trigger, group: &mut Vec<Condition>, in_core: &mut bool) {
    let conditions = std::mem::take(group);
    if *in_core {
        trigger.core = conditions;
        *in_core = false;
    } else {
        trigger.alts.push(conditions);
    }
}

fn lowering_error(message: impl Into<String>, expr: &Expression) -> ErrorExpression {
    ErrorExpression::evaluation(message, expr.span).with_cause(expr.clone())
}

fn is_operation(expr: &Expression, expected: ConditionalOperation) -> bool {
    matches!(&expr.kind, ExpressionKind::Conditional { op, left: Some(_), .. } if *op == expected)
}

/// Splits a left-deep chain of `op` into its operands. A negated chain of the
/// opposite operator is rewritten first so `!(a || b)` yields `!a`, `!b`.
fn flatten(expr: &Expression, op: ConditionalOperation, out: &mut Vec<Expression>) {
    match &expr.kind {
        ExpressionKind::Conditional {
            left: Some(left),
            op: current,
            right,
        } if *current == op => {
            flatten(left, op, out);
            flatten(right, op, out);
        }
        ExpressionKind::Conditional {
            op: ConditionalOperation::Not,
            right,
            ..
        } => {
            let inverted = right.invert();
            if is_operation(&inverted, op) {
                flatten(&inverted, op, out);
            } else {
                out.push(inverted);
            }
        }
        _ => out.push(expr.clone()),
    }
}

/// Lowers an evaluated condition expression into a [`Trigger`].
pub fn build_trigger(expression: &Expression) -> EvalResult<Trigger> {
    let mut clauses = Vec::new();
    flatten(expression, ConditionalOperation::And, &mut clauses);

    let mut trigger = Trigger::default();
    let mut alt_source = None;
    for clause in &clauses {
        if alt_source.is_none() && is_operation(clause, ConditionalOperation::Or) {
            alt_source = Some(clause);
            continue;
        }
        lower_condition(clause, &mut trigger.core)?;
    }

    if let Some(alt_source) = alt_source {
        let mut branches = Vec::new();
        flatten(alt_source, ConditionalOperation::Or, &mut branches);
        for branch in &branches {
            let mut parts = Vec::new();
            flatten(branch, ConditionalOperation::And, &mut parts);
            let mut group = Vec::new();
            for part in &parts {
                lower_condition(part, &mut group)?;
            }
            trigger.alts.push(group);
        }
        if trigger.core.is_empty() {
            trigger.core.push(Condition::always_true());
        }
    }

    Ok(trigger)
}

fn lower_condition(expr: &Expression, out: &mut Vec<Condition>) -> EvalResult<()> {
    match &expr.kind {
        ExpressionKind::Comparison { left, op, right } => {
            lower_comparison(expr, left, *op, right, out)
        }
        ExpressionKind::Boolean(true) | ExpressionKind::AlwaysTrue => {
            out.push(Condition::always_true());
            Ok(())
        }
        ExpressionKind::Boolean(false) | ExpressionKind::AlwaysFalse => {
            out.push(Condition::always_false());
            Ok(())
        }
        ExpressionKind::Conditional {
            op: ConditionalOperation::Not,
            right,
            ..
        } => {
            let inverted = right.invert();
            if matches!(
                inverted.kind,
                ExpressionKind::Conditional {
                    op: ConditionalOperation::Not,
                    ..
                }
            ) {
                return Err(lowering_error(
                    format!("Cannot invert {}", right.kind_name()),
                    expr,
                ));
            }
            lower_condition(&inverted, out)
        }
        ExpressionKind::Conditional { op, .. } => {
            let mut parts = Vec::new();
            flatten(expr, *op, &mut parts);
            let link = if *op == ConditionalOperation::And {
                ConditionFlag::AndNext
            } else {
                ConditionFlag::OrNext
            };
            lower_chain(&parts, link, out)
        }
        ExpressionKind::Modifier {
            modifier,
            condition,
        } => match modifier {
            ConditionModifier::Repeated(count) => lower_hit_chain(condition, *count, out),
            ConditionModifier::Never => lower_flagged(condition, ConditionFlag::ResetIf, out),
            ConditionModifier::Unless => lower_flagged(condition, ConditionFlag::PauseIf, out),
            ConditionModifier::TriggerWhen => {
                lower_flagged(condition, ConditionFlag::Trigger, out)
            }
            ConditionModifier::Measured => lower_flagged(condition, ConditionFlag::Measured, out),
            ConditionModifier::Deduct => Err(lowering_error(
                "deduct can only be used inside tally",
                expr,
            )),
        },
        ExpressionKind::Tally { target, entries } => lower_tally(expr, *target, entries, out),
        _ => Err(lowering_error(
            format!("Cannot convert {} to a condition: {expr}", expr.kind_name()),
            expr,
        )),
    }
}

/// Sets `flag` on the final condition of a lowered part. Parts that already
/// end in a flagged condition cannot be linked.
fn set_final_flag(group: &mut [Condition], flag: ConditionFlag, expr: &Expression) -> EvalResult<()> {
    let last = group
        .last_mut()
        .ok_or_else(|| lowering_error("Condition produced no output", expr))?;
    if last.flag != ConditionFlag::None {
        return Err(lowering_error(
            format!(
                "Cannot combine {} with {}",
                last.flag.name(),
                flag.name()
            ),
            expr,
        ));
    }
    last.flag = flag;
    Ok(())
}

fn lower_chain(parts: &[Expression], link: ConditionFlag, out: &mut Vec<Condition>) -> EvalResult<()> {
    for (index, part) in parts.iter().enumerate() {
        let mut group = Vec::new();
        lower_condition(part, &mut group)?;
        if index + 1 < parts.len() {
            set_final_flag(&mut group, link, part)?;
        }
        out.extend(group);
    }
    Ok(())
}

fn lower_hit_chain(condition: &Expression, count: u32, out: &mut Vec<Condition>) -> EvalResult<()> {
    let mut group = Vec::new();
    if is_operation(condition, ConditionalOperation::And) {
        let mut parts = Vec::new();
        flatten(condition, ConditionalOperation::And, &mut parts);
        let (resets, counted): (Vec<Expression>, Vec<Expression>) =
            parts.into_iter().partition(|part| {
                matches!(
                    part.kind,
                    ExpressionKind::Modifier {
                        modifier: ConditionModifier::Never,
                        ..
                    }
                )
            });
        for reset in &resets {
            if let ExpressionKind::Modifier { condition, .. } = &reset.kind {
                lower_flagged(condition, ConditionFlag::ResetNextIf, &mut group)?;
            }
        }
        if counted.is_empty() {
            return Err(lowering_error(
                "repeated requires at least one condition that is not never",
                condition,
            ));
        }
        lower_chain(&counted, ConditionFlag::AndNext, &mut group)?;
    } else if is_operation(condition, ConditionalOperation::Or) {
        let mut parts = Vec::new();
        flatten(condition, ConditionalOperation::Or, &mut parts);
        lower_chain(&parts, ConditionFlag::AddHits, &mut group)?;
    } else {
        lower_condition(condition, &mut group)?;
    }

    let last = group
        .last_mut()
        .ok_or_else(|| lowering_error("Condition produced no output", condition))?;
    if last.hit_target != 0 {
        return Err(lowering_error("Cannot apply multiple hit counts", condition));
    }
    last.hit_target = count;
    out.extend(group);
    Ok(())
}

fn lower_flagged(condition: &Expression, flag: ConditionFlag, out: &mut Vec<Condition>) -> EvalResult<()> {
    if matches!(flag, ConditionFlag::ResetIf | ConditionFlag::PauseIf)
        && is_operation(condition, ConditionalOperation::Or)
    {
        let mut parts = Vec::new();
        flatten(condition, ConditionalOperation::Or, &mut parts);
        for part in &parts {
            lower_flagged(part, flag, out)?;
        }
        return Ok(());
    }

    let mut group = Vec::new();
    lower_condition(condition, &mut group)?;
    set_final_flag(&mut group, flag, condition)?;
    out.extend(group);
    Ok(())
}

fn lower_tally(
    expr: &Expression,
    target: u32,
    entries: &[Expression],
    out: &mut Vec<Condition>,
) -> EvalResult<()> {
    let mut counted = Vec::new();
    let mut deducted = Vec::new();
    for entry in entries {
        match &entry.kind {
            ExpressionKind::Modifier {
                modifier: ConditionModifier::Deduct,
                condition,
            } => deducted.push(&**condition),
            _ => counted.push(entry),
        }
    }

    let Some((last, counted)) = counted.split_last() else {
        return Err(lowering_error(
            "tally requires at least one condition that is not deducted",
            expr,
        ));
    };

    for (entries, flag) in [
        (counted, ConditionFlag::AddHits),
        (deducted.as_slice(), ConditionFlag::SubHits),
    ] {
        for entry in entries {
            let mut group = Vec::new();
            lower_condition(entry, &mut group)?;
            set_final_flag(&mut group, flag, entry)?;
            out.extend(group);
        }
    }

    let mut group = Vec::new();
    lower_condition(last, &mut group)?;
    let final_condition = group
        .last_mut()
        .ok_or_else(|| lowering_error("Condition produced no output", last))?;
    if final_condition.hit_target != 0 {
        return Err(lowering_error("Cannot apply multiple hit counts", last));
    }
    final_condition.hit_target = target;
    out.extend(group);
    Ok(())
}

fn constant_operand(value: i64, expr: &Expression) -> EvalResult<Operand> {
    if value < 0 {
        return Err(lowering_error(
            format!("Cannot compare against a negative value: {value}"),
            expr,
        ));
    }
    u32::try_from(value)
        .map(Operand::Value)
        .map_err(|_| lowering_error(format!("Value {value} does not fit in 32 bits"), expr))
}

fn lower_comparison(
    expr: &Expression,
    left: &Expression,
    op: ComparisonOperation,
    right: &Expression,
    out: &mut Vec<Condition>,
) -> EvalResult<()> {
    let (left, op, right) = if left.is_constant() && !right.is_constant() {
        (right, op.reverse(), left)
    } else {
        (left, op, right)
    };

    let mut terms = Vec::new();
    let mut offset = 0i64;
    collect_terms(left, false, &mut terms, &mut offset)?;
    if terms.is_empty() {
        return Err(lowering_error(
            format!("Comparison does not reference memory: {expr}"),
            expr,
        ));
    }

    let right_operand = match &right.kind {
        ExpressionKind::Integer(value) => {
            let adjusted = value
                .checked_sub(offset)
                .ok_or_else(|| lowering_error("Comparison value overflow", expr))?;
            constant_operand(adjusted, expr)?
        }
        ExpressionKind::MemoryAccessor(accessor) if offset == 0 => Operand::Memory(*accessor),
        _ => {
            return Err(lowering_error(
                format!("Cannot compare {} against {}", left, right),
                expr,
            ));
        }
    };

    let final_index = terms
        .iter()
        .rposition(|term| !term.subtract && term.modifier.is_none());
    for (index, term) in terms.iter().enumerate() {
        if Some(index) != final_index {
            out.push(source_condition(term));
        }
    }
    let final_operand = match final_index {
        Some(index) => Operand::Memory(terms[index].accessor),
        None => Operand::Value(0),
    };
    out.push(Condition::compare(final_operand, op.into(), right_operand));
    Ok(())
}

fn source_condition(term: &SourceTerm) -> Condition {
    let flag = if term.subtract {
        ConditionFlag::SubSource
    } else {
        ConditionFlag::AddSource
    };
    Condition::source(
        flag,
        Operand::Memory(term.accessor),
        term.modifier.map(|(op, factor)| (op, Operand::Value(factor))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ComparisonOperation as Cmp, MathematicOperation};
    use crate::builder::{FieldSize, MemoryAccessor};

    fn byte(address: u32) -> Expression {
        Expression::new(
            ExpressionKind::MemoryAccessor(MemoryAccessor::new(FieldSize::Byte, address)),
            Default::default(),
        )
    }

    fn eq(left: Expression, right: i64) -> Expression {
        Expression::comparison(left, Cmp::Equal, Expression::integer(right))
    }

    fn modifier(modifier: ConditionModifier, condition: Expression) -> Expression {
        Expression::new(
            ExpressionKind::Modifier {
                modifier,
                condition: Box::new(condition),
            },
            Default::default(),
        )
    }

    fn and(left: Expression, right: Expression) -> Expression {
        Expression::conditional(left, ConditionalOperation::And, right)
    }

    fn or(left: Expression, right: Expression) -> Expression {
        Expression::conditional(left, ConditionalOperation::Or, right)
    }

    fn lowered(expr: Expression) -> String {
        build_trigger(&expr).unwrap().to_string()
    }

    #[test]
    fn lowers_and_chain_to_core_conditions() {
        let expr = and(eq(byte(0x10), 1), eq(byte(0x11), 2));
        assert_eq!(lowered(expr), "0xH000010=1_0xH000011=2");
    }

    #[test]
    fn swaps_constant_to_the_right() {
        let expr = Expression::comparison(Expression::integer(3), Cmp::LessThan, byte(0x10));
        assert_eq!(lowered(expr), "0xH000010>3");
    }

    #[test]
    fn first_or_clause_becomes_alt_groups() {
        let expr = and(
            eq(byte(0x01), 1),
            and(
                or(eq(byte(0x02), 2), eq(byte(0x03), 3)),
                or(eq(byte(0x04), 4), eq(byte(0x05), 5)),
            ),
        );
        assert_eq!(
            lowered(expr),
            "0xH000001=1_O:0xH000004=4_0xH000005=5$0xH000002=2$0xH000003=3"
        );
    }

    #[test]
    fn lone_or_gets_always_true_core() {
        let expr = or(eq(byte(0x02), 2), eq(byte(0x03), 3));
        assert_eq!(lowered(expr), "1=1$0xH000002=2$0xH000003=3");
    }

    #[test]
    fn negated_or_splits_into_inverted_clauses() {
        let expr = Expression::not(or(eq(byte(0x02), 2), eq(byte(0x03), 3)));
        assert_eq!(lowered(expr), "0xH000002!=2_0xH000003!=3");
    }

    #[test]
    fn memory_sums_become_add_source_chains() {
        let sum = Expression::mathematic(
            Expression::mathematic(byte(0x01), MathematicOperation::Add, byte(0x02)),
            MathematicOperation::Subtract,
            byte(0x03),
        );
        let expr = Expression::comparison(
            Expression::mathematic(sum, MathematicOperation::Add, Expression::integer(4)),
            Cmp::GreaterThan,
            Expression::integer(10),
        );
        assert_eq!(lowered(expr), "A:0xH000001_B:0xH000003_0xH000002>6");
    }

    #[test]
    fn scaled_terms_compare_against_zero() {
        let scaled = Expression::mathematic(byte(0x01), MathematicOperation::Multiply, Expression::integer(2));
        assert_eq!(lowered(eq(scaled, 4)), "A:0xH000001*2_0=4");
    }

    #[test]
    fn repeated_variants() {
        assert_eq!(
            lowered(modifier(ConditionModifier::Repeated(3), eq(byte(0x01), 1))),
            "0xH000001=1.3."
        );
        let chain = and(
            eq(byte(0x01), 1),
            and(modifier(ConditionModifier::Never, eq(byte(0x03), 0)), eq(byte(0x02), 2)),
        );
        assert_eq!(
            lowered(modifier(ConditionModifier::Repeated(5), chain)),
            "Z:0xH000003=0_N:0xH000001=1_0xH000002=2.5."
        );
        let alternatives = or(eq(byte(0x01), 1), eq(byte(0x02), 2));
        assert_eq!(
            lowered(modifier(ConditionModifier::Repeated(2), alternatives)),
            "C:0xH000001=1_0xH000002=2.2."
        );
    }

    #[test]
    fn never_and_unless_flags() {
        let expr = and(
            eq(byte(0x01), 1),
            and(
                modifier(ConditionModifier::Never, or(eq(byte(0x02), 2), eq(byte(0x03), 3))),
                modifier(ConditionModifier::Unless, and(eq(byte(0x04), 4), eq(byte(0x05), 5))),
            ),
        );
        assert_eq!(
            lowered(expr),
            "0xH000001=1_R:0xH000002=2_R:0xH000003=3_N:0xH000004=4_P:0xH000005=5"
        );
    }

    #[test]
    fn tally_counts_and_deducts() {
        let tally = Expression::new(
            ExpressionKind::Tally {
                target: 4,
                entries: vec![
                    eq(byte(0x01), 1),
                    modifier(ConditionModifier::Deduct, eq(byte(0x03), 3)),
                    eq(byte(0x02), 2),
                ],
            },
            Default::default(),
        );
        assert_eq!(
            lowered(tally),
            "C:0xH000001=1_D:0xH000003=3_0xH000002=2.4."
        );
    }

    #[test]
    fn sentinels_and_booleans() {
        assert_eq!(lowered(Expression::boolean(true)), "1=1");
        assert_eq!(
            lowered(Expression::new(ExpressionKind::AlwaysFalse, Default::default())),
            "0=1"
        );
    }

    #[test]
    fn rejects_negative_comparisons() {
        let error = build_trigger(&eq(byte(0x01), -1)).unwrap_err();
        assert_eq!(error.message, "Cannot compare against a negative value: -1");
    }

    #[test]
    fn rejects_non_conditions() {
        let error = build_trigger(&byte(0x01)).unwrap_err();
        assert_eq!(
            error.message,
            "Cannot convert MemoryAccessor to a condition: byte(0x000001)"
        );
    }

    #[test]
    fn parses_and_reprints_alt_groups() {
        for text in [
            "0xH000001=1_R:0xH000002=0$0xH000003=1$0xH000004=1.10.",
            "A:0xH000001_B:0xH000003_0xH000002>6",
            "N:0xH000001=1_P:0xH000002=2",
        ] {
            let trigger: Trigger = text.parse().unwrap();
            assert_eq!(trigger.to_string(), text);
        }
    }

    #[test]
    fn accepts_s_as_alt_separator() {
        let trigger: Trigger = "0xH000001=1S0xH000002=2S0xS000003=1".parse().unwrap();
        assert_eq!(trigger.alts.len(), 2);
        assert_eq!(trigger.to_string(), "0xH000001=1$0xH000002=2$0xS000003=1");
    }
}
