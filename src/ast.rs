//! Syntax tree shared by the parser, the evaluator and the trigger builder.
//!
//! The parser builds these nodes once; evaluation never mutates them and
//! always produces new trees. Nodes that only exist after evaluation
//! (memory accessors, modifiers, sentinels) are listed after `Return`.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::builder::{MemoryAccessor, ValueFormat};
use crate::token::Span;

#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
    /// Set on parenthesized input and on combinator output so the result is
    /// treated as a single clause.
    pub logical_unit: bool,
}

/// Structural equality: kinds and payloads only, never position.
impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Integer(i64),
    String(String),
    Boolean(bool),
    Variable(String),
    IndexedVariable {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Array(Vec<Expression>),
    Dictionary(Vec<(Expression, Expression)>),
    Mathematic {
        left: Box<Expression>,
        op: MathematicOperation,
        right: Box<Expression>,
    },
    /// `left` is `None` only for [`ConditionalOperation::Not`].
    Conditional {
        left: Option<Box<Expression>>,
        op: ConditionalOperation,
        right: Box<Expression>,
    },
    Comparison {
        left: Box<Expression>,
        op: ComparisonOperation,
        right: Box<Expression>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    Return(Box<Expression>),

    FunctionReference(String),
    MemoryAccessor(MemoryAccessor),
    Modifier {
        modifier: ConditionModifier,
        condition: Box<Expression>,
    },
    Tally {
        target: u32,
        entries: Vec<Expression>,
    },
    AlwaysTrue,
    AlwaysFalse,
    RichPresenceMacro(RichPresenceMacro),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathematicOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl MathematicOperation {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Modulus => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalOperation {
    And,
    Or,
    /// Right is not true; there is no left side.
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperation {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ComparisonOperation {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }

    /// Operator that holds exactly when `self` does not.
    pub fn invert(self) -> Self {
        match self {
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
            Self::LessThan => Self::GreaterThanOrEqual,
            Self::LessThanOrEqual => Self::GreaterThan,
            Self::GreaterThan => Self::LessThanOrEqual,
            Self::GreaterThanOrEqual => Self::LessThan,
        }
    }

    /// Operator to use when the operands trade places.
    pub fn reverse(self) -> Self {
        match self {
            Self::Equal => Self::Equal,
            Self::NotEqual => Self::NotEqual,
            Self::LessThan => Self::GreaterThan,
            Self::LessThanOrEqual => Self::GreaterThanOrEqual,
            Self::GreaterThan => Self::LessThan,
            Self::GreaterThanOrEqual => Self::LessThanOrEqual,
        }
    }

    pub fn compare<T: Ord>(self, left: T, right: T) -> bool {
        match self {
            Self::Equal => left == right,
            Self::NotEqual => left != right,
            Self::LessThan => left < right,
            Self::LessThanOrEqual => left <= right,
            Self::GreaterThan => left > right,
            Self::GreaterThanOrEqual => left >= right,
        }
    }
}

/// Markers left on a condition by the function library for the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionModifier {
    Repeated(u32),
    Never,
    Unless,
    TriggerWhen,
    Measured,
    Deduct,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RichPresenceMacro {
    pub name: String,
    pub kind: MacroKind,
    pub expression: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroKind {
    Value(ValueFormat),
    Lookup {
        entries: Vec<(i64, String)>,
        fallback: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
    pub span: Span,
}

impl PartialEq for FunctionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.parameters == other.parameters && self.body == other.body
    }
}

/// Assignment target forms accepted by the parser: `name` or `name[i][j]...`.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index { name: String, indices: Vec<Expression> },
}

impl AssignTarget {
    pub fn name(&self) -> &str {
        match self {
            AssignTarget::Name(name) | AssignTarget::Index { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        target: AssignTarget,
        value: Expression,
    },
    FunctionDef(FunctionDefinition),
    For {
        variable: String,
        iterable: Expression,
        body: Vec<Statement>,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self {
            kind,
            span,
            logical_unit: false,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::new(ExpressionKind::Integer(value), Span::default())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ExpressionKind::String(value.into()), Span::default())
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ExpressionKind::Boolean(value), Span::default())
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Variable(name.into()), Span::default())
    }

    pub fn indexed(base: Expression, index: Expression) -> Self {
        let span = base.span;
        Self::new(
            ExpressionKind::IndexedVariable {
                base: Box::new(base),
                index: Box::new(index),
            },
            span,
        )
    }

    pub fn array(entries: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Array(entries), Span::default())
    }

    pub fn dictionary(entries: Vec<(Expression, Expression)>) -> Self {
        Self::new(ExpressionKind::Dictionary(entries), Span::default())
    }

    pub fn mathematic(left: Expression, op: MathematicOperation, right: Expression) -> Self {
        let span = left.span;
        Self::new(
            ExpressionKind::Mathematic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn conditional(left: Expression, op: ConditionalOperation, right: Expression) -> Self {
        let span = left.span;
        Self::new(
            ExpressionKind::Conditional {
                left: Some(Box::new(left)),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn not(right: Expression) -> Self {
        let span = right.span;
        Self::new(
            ExpressionKind::Conditional {
                left: None,
                op: ConditionalOperation::Not,
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn comparison(left: Expression, op: ComparisonOperation, right: Expression) -> Self {
        let span = left.span;
        Self::new(
            ExpressionKind::Comparison {
                left: Box::new(left),
                op,
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Self::new(
            ExpressionKind::FunctionCall {
                name: name.into(),
                args,
            },
            Span::default(),
        )
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn as_logical_unit(mut self) -> Self {
        self.logical_unit = true;
        self
    }

    /// Name used in diagnostics such as `Cannot index: v (IntegerConstant)`.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ExpressionKind::Integer(_) => "IntegerConstant",
            ExpressionKind::String(_) => "StringConstant",
            ExpressionKind::Boolean(_) => "BooleanConstant",
            ExpressionKind::Variable(_) => "Variable",
            ExpressionKind::IndexedVariable { .. } => "IndexedVariable",
            ExpressionKind::Array(_) => "Array",
            ExpressionKind::Dictionary(_) => "Dictionary",
            ExpressionKind::Mathematic { .. } => "Mathematic",
            ExpressionKind::Conditional { .. } => "Conditional",
            ExpressionKind::Comparison { .. } => "Comparison",
            ExpressionKind::FunctionCall { .. } => "FunctionCall",
            ExpressionKind::Return(_) => "Return",
            ExpressionKind::FunctionReference(_) => "FunctionReference",
            ExpressionKind::MemoryAccessor(_) => "MemoryAccessor",
            ExpressionKind::Modifier { .. } => "Modifier",
            ExpressionKind::Tally { .. } => "Tally",
            ExpressionKind::AlwaysTrue => "AlwaysTrue",
            ExpressionKind::AlwaysFalse => "AlwaysFalse",
            ExpressionKind::RichPresenceMacro(_) => "RichPresenceMacro",
        }
    }

    /// Whether the node produces a value when evaluated.
    pub fn is_value(&self) -> bool {
        !matches!(self.kind, ExpressionKind::Return(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Integer(_) | ExpressionKind::String(_) | ExpressionKind::Boolean(_)
        )
    }

    /// Text of a constant as it appears in concatenation and formatted strings.
    pub fn constant_text(&self) -> Option<String> {
        match &self.kind {
            ExpressionKind::String(text) => Some(text.clone()),
            ExpressionKind::Integer(value) => Some(value.to_string()),
            ExpressionKind::Boolean(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// True when no names, calls or returns remain anywhere in the tree.
    pub fn is_fully_reduced(&self) -> bool {
        match &self.kind {
            ExpressionKind::Variable(_)
            | ExpressionKind::IndexedVariable { .. }
            | ExpressionKind::FunctionCall { .. }
            | ExpressionKind::Return(_) => false,
            _ => self
                .nested_expressions()
                .into_iter()
                .all(Expression::is_fully_reduced),
        }
    }

    /// Lazily walks the child values of an iterable node: array entries or
    /// dictionary keys. Each call starts a fresh pass.
    pub fn iterable_expressions(&self) -> Option<Box<dyn Iterator<Item = &Expression> + '_>> {
        match &self.kind {
            ExpressionKind::Array(entries) => Some(Box::new(entries.iter())),
            ExpressionKind::Dictionary(entries) => Some(Box::new(entries.iter().map(|(key, _)| key))),
            _ => None,
        }
    }

    fn precedence(&self) -> u8 {
        match &self.kind {
            ExpressionKind::Conditional { op, .. } => match op {
                ConditionalOperation::Or => 1,
                ConditionalOperation::And => 2,
                ConditionalOperation::Not => 3,
            },
            ExpressionKind::Comparison { .. } => 4,
            ExpressionKind::Mathematic { op, .. } => match op {
                MathematicOperation::Add | MathematicOperation::Subtract => 5,
                _ => 6,
            },
            ExpressionKind::Return(_) => 0,
            _ => 7,
        }
    }
}

/// Child enumeration and name analysis shared by expressions and statements.
pub trait NestedExpressions {
    fn nested_expressions(&self) -> Vec<&Expression>;

    /// Adds the free names this node reads.
    fn dependencies(&self, dependencies: &mut FxHashSet<String>);

    /// Adds the names this node rebinds.
    fn modifications(&self, modifications: &mut FxHashSet<String>);
}

impl NestedExpressions for Expression {
    fn nested_expressions(&self) -> Vec<&Expression> {
        match &self.kind {
            ExpressionKind::IndexedVariable { base, index } => vec![&**base, &**index],
            ExpressionKind::Array(entries) => entries.iter().collect(),
            ExpressionKind::Dictionary(entries) => entries
                .iter()
                .flat_map(|(key, value)| [key, value])
                .collect(),
            ExpressionKind::Mathematic { left, right, .. }
            | ExpressionKind::Comparison { left, right, .. } => vec![&**left, &**right],
            ExpressionKind::Conditional { left, right, .. } => {
                left.iter().map(|left| &**left).chain([&**right]).collect()
            }
            ExpressionKind::FunctionCall { args, .. } => args.iter().collect(),
            ExpressionKind::Return(value) => vec![&**value],
            ExpressionKind::Modifier { condition, .. } => vec![&**condition],
            ExpressionKind::Tally { entries, .. } => entries.iter().collect(),
            ExpressionKind::RichPresenceMacro(rich_presence_macro) => {
                vec![&*rich_presence_macro.expression]
            }
            _ => Vec::new(),
        }
    }

    fn dependencies(&self, dependencies: &mut FxHashSet<String>) {
        match &self.kind {
            ExpressionKind::Variable(name) | ExpressionKind::FunctionReference(name) => {
                dependencies.insert(name.clone());
            }
            ExpressionKind::FunctionCall { name, .. } => {
                dependencies.insert(name.clone());
            }
            _ => {}
        }
        for nested in self.nested_expressions() {
            nested.dependencies(dependencies);
        }
    }

    fn modifications(&self, _modifications: &mut FxHashSet<String>) {}
}

impl NestedExpressions for Statement {
    fn nested_expressions(&self) -> Vec<&Expression> {
        match self {
            Statement::Assign { target, value, .. } => match target {
                AssignTarget::Name(_) => vec![value],
                AssignTarget::Index { indices, .. } => indices.iter().chain([value]).collect(),
            },
            Statement::FunctionDef(_) => Vec::new(),
            Statement::For { iterable, .. } => vec![iterable],
            Statement::If { condition, .. } => vec![condition],
            Statement::Expr(expr) => vec![expr],
        }
    }

    fn dependencies(&self, dependencies: &mut FxHashSet<String>) {
        for nested in self.nested_expressions() {
            nested.dependencies(dependencies);
        }
        match self {
            Statement::Assign {
                target: AssignTarget::Index { name, .. },
                ..
            } => {
                dependencies.insert(name.clone());
            }
            Statement::FunctionDef(definition) => {
                let mut bound = FxHashSet::default();
                for parameter in &definition.parameters {
                    bound.insert(parameter.name.clone());
                    if let Some(default) = &parameter.default {
                        default.dependencies(dependencies);
                    }
                }
                block_modifications(&definition.body, &mut bound);
                let mut body = FxHashSet::default();
                block_dependencies(&definition.body, &mut body);
                dependencies.extend(body.into_iter().filter(|name| !bound.contains(name)));
            }
            Statement::For { variable, body, .. } => {
                let mut inner = FxHashSet::default();
                block_dependencies(body, &mut inner);
                inner.remove(variable);
                dependencies.extend(inner);
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                block_dependencies(then_body, dependencies);
                block_dependencies(else_body, dependencies);
            }
            _ => {}
        }
    }

    fn modifications(&self, modifications: &mut FxHashSet<String>) {
        match self {
            Statement::Assign { target, .. } => {
                modifications.insert(target.name().to_string());
            }
            Statement::FunctionDef(definition) => {
                modifications.insert(definition.name.clone());
            }
            Statement::For { variable, body, .. } => {
                modifications.insert(variable.clone());
                block_modifications(body, modifications);
            }
            Statement::If {
                then_body,
                else_body,
                ..
            } => {
                block_modifications(then_body, modifications);
                block_modifications(else_body, modifications);
            }
            Statement::Expr(_) => {}
        }
    }
}

pub fn block_dependencies(body: &[Statement], dependencies: &mut FxHashSet<String>) {
    for statement in body {
        statement.dependencies(dependencies);
    }
}

pub fn block_modifications(body: &[Statement], modifications: &mut FxHashSet<String>) {
    for statement in body {
        statement.modifications(modifications);
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expression(f, self)
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, min_precedence: u8) -> fmt::Result {
    let grouped = expr.logical_unit && matches!(expr.kind, ExpressionKind::Conditional { .. });
    if grouped || expr.precedence() < min_precedence {
        f.write_str("(")?;
        write_expression(f, expr)?;
        f.write_str(")")
    } else {
        write_expression(f, expr)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, entries: &[Expression]) -> fmt::Result {
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write_expression(f, entry)?;
    }
    Ok(())
}

fn write_string(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            _ => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

fn write_expression(f: &mut fmt::Formatter<'_>, expr: &Expression) -> fmt::Result {
    match &expr.kind {
        ExpressionKind::Integer(value) => write!(f, "{value}"),
        ExpressionKind::String(value) => write_string(f, value),
        ExpressionKind::Boolean(value) => write!(f, "{value}"),
        ExpressionKind::Variable(name) | ExpressionKind::FunctionReference(name) => {
            f.write_str(name)
        }
        ExpressionKind::IndexedVariable { base, index } => {
            write_expression(f, base)?;
            f.write_str("[")?;
            write_expression(f, index)?;
            f.write_str("]")
        }
        ExpressionKind::Array(entries) => {
            f.write_str("[")?;
            write_list(f, entries)?;
            f.write_str("]")
        }
        ExpressionKind::Dictionary(entries) => {
            f.write_str("{")?;
            for (index, (key, value)) in entries.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write_expression(f, key)?;
                f.write_str(": ")?;
                write_expression(f, value)?;
            }
            f.write_str("}")
        }
        ExpressionKind::Mathematic { left, op, right } => {
            let precedence = expr.precedence();
            write_operand(f, left, precedence)?;
            write!(f, " {} ", op.symbol())?;
            write_operand(f, right, precedence + 1)
        }
        ExpressionKind::Conditional { left, op, right } => match (left, op) {
            (_, ConditionalOperation::Not) | (None, _) => {
                f.write_str("!")?;
                write_operand(f, right, 3)
            }
            (Some(left), op) => {
                let precedence = expr.precedence();
                let symbol = if *op == ConditionalOperation::And {
                    "&&"
                } else {
                    "||"
                };
                write_operand(f, left, precedence)?;
                write!(f, " {symbol} ")?;
                write_operand(f, right, precedence + 1)
            }
        },
        ExpressionKind::Comparison { left, op, right } => {
            write_operand(f, left, 5)?;
            write!(f, " {} ", op.symbol())?;
            write_operand(f, right, 5)
        }
        ExpressionKind::FunctionCall { name, args } => {
            write!(f, "{name}(")?;
            write_list(f, args)?;
            f.write_str(")")
        }
        ExpressionKind::Return(value) => {
            f.write_str("return ")?;
            write_expression(f, value)
        }
        ExpressionKind::MemoryAccessor(accessor) => write!(f, "{accessor}"),
        ExpressionKind::Modifier {
            modifier,
            condition,
        } => {
            match modifier {
                ConditionModifier::Repeated(1) => f.write_str("once(")?,
                ConditionModifier::Repeated(count) => write!(f, "repeated({count}, ")?,
                ConditionModifier::Never => f.write_str("never(")?,
                ConditionModifier::Unless => f.write_str("unless(")?,
                ConditionModifier::TriggerWhen => f.write_str("trigger_when(")?,
                ConditionModifier::Measured => f.write_str("measured(")?,
                ConditionModifier::Deduct => f.write_str("deduct(")?,
            }
            write_expression(f, condition)?;
            f.write_str(")")
        }
        ExpressionKind::Tally { target, entries } => {
            write!(f, "tally({target}, ")?;
            write_list(f, entries)?;
            f.write_str(")")
        }
        ExpressionKind::AlwaysTrue => f.write_str("always_true()"),
        ExpressionKind::AlwaysFalse => f.write_str("always_false()"),
        ExpressionKind::RichPresenceMacro(rich_presence_macro) => {
            match &rich_presence_macro.kind {
                MacroKind::Value(_) => f.write_str("rich_presence_value(")?,
                MacroKind::Lookup { .. } => f.write_str("rich_presence_lookup(")?,
            }
            write_string(f, &rich_presence_macro.name)?;
            f.write_str(", ")?;
            write_expression(f, &rich_presence_macro.expression)?;
            f.write_str(")")
        }
    }
}
