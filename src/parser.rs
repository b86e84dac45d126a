use crate::ast::{
    AssignTarget, ComparisonOperation, ConditionalOperation, Expression, ExpressionKind,
    FunctionDefinition, MathematicOperation, Parameter, Program, Statement,
};
use crate::error::{ErrorExpression, EvalResult};
use crate::lexer::tokenize;
use crate::token::{Span, Token, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
    eof: Token<'a>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        let end = tokens.last().map(|token| token.span).unwrap_or_default();
        Self {
            tokens,
            position: 0,
            eof: Token::new(
                TokenKind::EOF,
                Span {
                    start: end.end,
                    ..end
                },
            ),
        }
    }

    pub fn parse_program(mut self) -> EvalResult<Program> {
        let mut statements = Vec::new();
        while !self.at_end() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> EvalResult<Statement> {
        match self.current().kind {
            TokenKind::Function => return self.parse_function_def().map(Statement::FunctionDef),
            TokenKind::For => return self.parse_for(),
            TokenKind::If => return self.parse_if(),
            _ => {}
        }

        let expr = self.parse_expression()?;
        if matches!(self.current().kind, TokenKind::Assign) {
            let target = assign_target(expr)?;
            self.advance();
            let value = self.parse_expression()?;
            return Ok(Statement::Assign { target, value });
        }
        Ok(Statement::Expr(expr))
    }

    fn parse_block(&mut self) -> EvalResult<Vec<Statement>> {
        self.expect(&TokenKind::LBrace, "Expecting opening brace")?;
        let mut body = Vec::new();
        while !matches!(self.current().kind, TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error("Expecting closing brace"));
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_function_def(&mut self) -> EvalResult<FunctionDefinition> {
        let span = self.advance().span;
        let name = self.expect_identifier("Expecting function name")?;
        self.expect(&TokenKind::LParen, "Expecting opening parenthesis after function name")?;

        let mut parameters: Vec<Parameter> = Vec::new();
        while !matches!(self.current().kind, TokenKind::RParen) {
            let parameter_span = self.current().span;
            let parameter = self.expect_identifier("Expecting parameter name")?;
            if parameters.iter().any(|existing| existing.name == parameter) {
                return Err(ErrorExpression::parse(
                    format!("Duplicate parameter name: {parameter}"),
                    parameter_span,
                ));
            }
            let default = if matches!(self.current().kind, TokenKind::Assign) {
                self.advance();
                Some(self.parse_expression()?)
            } else {
                if parameters.iter().any(|existing| existing.default.is_some()) {
                    return Err(ErrorExpression::parse(
                        format!("Parameter {parameter} must have a default value"),
                        parameter_span,
                    ));
                }
                None
            };
            parameters.push(Parameter {
                name: parameter,
                default,
            });
            if matches!(self.current().kind, TokenKind::RParen) {
                break;
            }
            self.expect(&TokenKind::Comma, "Expecting comma between parameters")?;
        }
        self.advance();

        let body = if matches!(self.current().kind, TokenKind::Arrow) {
            let arrow = self.advance().span;
            let value = self.parse_expression()?;
            vec![Statement::Expr(Expression::new(
                ExpressionKind::Return(Box::new(value)),
                arrow,
            ))]
        } else {
            self.parse_block()?
        };

        Ok(FunctionDefinition {
            name,
            parameters,
            body,
            span,
        })
    }

    fn parse_for(&mut self) -> EvalResult<Statement> {
        self.advance();
        let variable = self.expect_identifier("Expecting loop variable")?;
        self.expect(&TokenKind::In, "Expecting 'in' after loop variable")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            variable,
            iterable,
            body,
        })
    }

    fn parse_if(&mut self) -> EvalResult<Statement> {
        self.advance();
        let condition = self.parse_expression()?;
        let then_body = self.parse_block()?;
        let else_body = if matches!(self.current().kind, TokenKind::Else) {
            self.advance();
            if matches!(self.current().kind, TokenKind::If) {
                vec![self.parse_if()?]
            } else {
                self.parse_block()?
            }
        } else {
            Vec::new()
        };
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    pub fn parse_expression(&mut self) -> EvalResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> EvalResult<Expression> {
        let mut expr = self.parse_and()?;
        while matches!(self.current().kind, TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            let span = expr.span;
            expr = Expression::conditional(expr, ConditionalOperation::Or, right).with_span(span);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> EvalResult<Expression> {
        let mut expr = self.parse_not()?;
        while matches!(self.current().kind, TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_not()?;
            let span = expr.span;
            expr = Expression::conditional(expr, ConditionalOperation::And, right).with_span(span);
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> EvalResult<Expression> {
        if matches!(self.current().kind, TokenKind::Bang) {
            let span = self.advance().span;
            let operand = self.parse_not()?;
            return Ok(Expression::not(operand).with_span(span));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> EvalResult<Expression> {
        let left = self.parse_additive()?;
        let op = match self.current().kind {
            TokenKind::EqualEqual => ComparisonOperation::Equal,
            TokenKind::NotEqual => ComparisonOperation::NotEqual,
            TokenKind::Less => ComparisonOperation::LessThan,
            TokenKind::LessEqual => ComparisonOperation::LessThanOrEqual,
            TokenKind::Greater => ComparisonOperation::GreaterThan,
            TokenKind::GreaterEqual => ComparisonOperation::GreaterThanOrEqual,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        let span = left.span;
        Ok(Expression::comparison(left, op, right).with_span(span))
    }

    fn parse_additive(&mut self) -> EvalResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => MathematicOperation::Add,
                TokenKind::Minus => MathematicOperation::Subtract,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let span = expr.span;
            expr = Expression::mathematic(expr, op, right).with_span(span);
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> EvalResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => MathematicOperation::Multiply,
                TokenKind::Slash => MathematicOperation::Divide,
                TokenKind::Percent => MathematicOperation::Modulus,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let span = expr.span;
            expr = Expression::mathematic(expr, op, right).with_span(span);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> EvalResult<Expression> {
        if !matches!(self.current().kind, TokenKind::Minus) {
            return self.parse_postfix();
        }
        let span = self.advance().span;
        if let TokenKind::Integer(value) = self.current().kind {
            self.advance();
            let negated = value
                .checked_neg()
                .ok_or_else(|| ErrorExpression::parse("Integer literal out of range", span))?;
            return Ok(Expression::integer(negated).with_span(span));
        }
        let operand = self.parse_unary()?;
        Ok(Expression::mathematic(
            Expression::integer(0).with_span(span),
            MathematicOperation::Subtract,
            operand,
        )
        .with_span(span))
    }

    fn parse_postfix(&mut self) -> EvalResult<Expression> {
        let mut expr = self.parse_primary()?;
        while matches!(self.current().kind, TokenKind::LBracket) {
            if !matches!(
                expr.kind,
                ExpressionKind::Variable(_) | ExpressionKind::IndexedVariable { .. }
            ) || expr.logical_unit
            {
                return Err(self.error(format!("Cannot index {}", expr.kind_name())).with_cause(expr));
            }
            self.advance();
            let index = self.parse_expression()?;
            if !index.is_value() {
                return Err(ErrorExpression::parse("Invalid index", index.span).with_cause(index));
            }
            self.expect(&TokenKind::RBracket, "Expecting closing bracket")?;
            let span = expr.span;
            expr = Expression::indexed(expr, index).with_span(span);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> EvalResult<Expression> {
        let token = self.advance();
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Integer(value) => ExpressionKind::Integer(value),
            TokenKind::String(value) => ExpressionKind::String(value),
            TokenKind::True => ExpressionKind::Boolean(true),
            TokenKind::False => ExpressionKind::Boolean(false),
            TokenKind::Identifier(name) => {
                if matches!(self.current().kind, TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_list(&TokenKind::RParen, "Invalid argument", "Expecting closing parenthesis")?;
                    ExpressionKind::FunctionCall {
                        name: name.to_string(),
                        args,
                    }
                } else {
                    ExpressionKind::Variable(name.to_string())
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "Expecting closing parenthesis")?;
                return Ok(inner.as_logical_unit());
            }
            TokenKind::LBracket => {
                let entries = self.parse_list(&TokenKind::RBracket, "Invalid array entry", "Expecting closing bracket")?;
                ExpressionKind::Array(entries)
            }
            TokenKind::LBrace => ExpressionKind::Dictionary(self.parse_dictionary()?),
            TokenKind::Return => {
                let value = self.parse_expression()?;
                if !value.is_value() {
                    return Err(ErrorExpression::parse("Invalid return value", value.span).with_cause(value));
                }
                ExpressionKind::Return(Box::new(value))
            }
            other => {
                return Err(ErrorExpression::parse(
                    format!("Unexpected {other}"),
                    span,
                ));
            }
        };
        Ok(Expression::new(kind, span))
    }

    /// Comma separated value entries up to `terminator`, which is consumed.
    fn parse_list(
        &mut self,
        terminator: &TokenKind<'a>,
        invalid_entry: &str,
        unterminated: &str,
    ) -> EvalResult<Vec<Expression>> {
        let mut entries = Vec::new();
        while self.current().kind != *terminator {
            if self.at_end() {
                return Err(self.error(unterminated));
            }
            let entry = self.parse_expression()?;
            if !entry.is_value() {
                return Err(ErrorExpression::parse(invalid_entry, entry.span).with_cause(entry));
            }
            entries.push(entry);
            if self.current().kind == *terminator {
                break;
            }
            if self.at_end() {
                return Err(self.error(unterminated));
            }
            self.expect(&TokenKind::Comma, "Expecting comma between entries")?;
        }
        self.advance();
        Ok(entries)
    }

    fn parse_dictionary(&mut self) -> EvalResult<Vec<(Expression, Expression)>> {
        let mut entries = Vec::new();
        while !matches!(self.current().kind, TokenKind::RBrace) {
            if self.at_end() {
                return Err(self.error("Expecting closing brace"));
            }
            let key = self.parse_expression()?;
            if !key.is_value() {
                return Err(ErrorExpression::parse("Invalid dictionary key", key.span).with_cause(key));
            }
            self.expect(&TokenKind::Colon, "Expecting colon following key expression")?;
            let value = self.parse_expression()?;
            if !value.is_value() {
                return Err(
                    ErrorExpression::parse("Invalid dictionary value", value.span).with_cause(value),
                );
            }
            entries.push((key, value));
            if matches!(self.current().kind, TokenKind::RBrace) {
                break;
            }
            if self.at_end() {
                return Err(self.error("Expecting closing brace"));
            }
            self.expect(&TokenKind::Comma, "Expecting comma between entries")?;
        }
        self.advance();
        Ok(entries)
    }

    fn expect(&mut self, kind: &TokenKind<'a>, message: &str) -> EvalResult<()> {
        if self.current().kind == *kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> EvalResult<String> {
        if let TokenKind::Identifier(name) = self.current().kind {
            self.advance();
            Ok(name.to_string())
        } else {
            Err(self.error(message))
        }
    }

    fn current(&self) -> &Token<'a> {
        self.tokens.get(self.position).unwrap_or(&self.eof)
    }

    fn at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::EOF)
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ErrorExpression {
        let token = self.current();
        ErrorExpression::parse(format!("{}, found {}", message.into(), token.kind), token.span)
    }
}

fn assign_target(expr: Expression) -> EvalResult<AssignTarget> {
    let mut indices = Vec::new();
    let mut current = expr.clone();
    loop {
        match current.kind {
            ExpressionKind::Variable(name) if !current.logical_unit => {
                indices.reverse();
                return Ok(if indices.is_empty() {
                    AssignTarget::Name(name)
                } else {
                    AssignTarget::Index { name, indices }
                });
            }
            ExpressionKind::IndexedVariable { base, index } => {
                indices.push(*index);
                current = *base;
            }
            _ => {
                return Err(
                    ErrorExpression::parse("Invalid assignment target", expr.span).with_cause(expr),
                );
            }
        }
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> EvalResult<Program> {
    Parser::new(tokens).parse_program()
}

pub fn parse(input: &str) -> EvalResult<Program> {
    parse_tokens(tokenize(input)?)
}

/// Parses a single expression; trailing input is an error.
pub fn parse_expression(input: &str) -> EvalResult<Expression> {
    let mut parser = Parser::new(tokenize(input)?);
    let expr = parser.parse_expression()?;
    if !parser.at_end() {
        return Err(parser.error("Unexpected input after expression"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn roundtrip(source: &str) {
        let expr = parse_expression(source).unwrap();
        let printed = expr.to_string();
        assert_eq!(parse_expression(&printed).unwrap(), expr, "{source} -> {printed}");
    }

    #[test]
    fn parses_simple_program() {
        let input = indoc! {"
            function check(addr) => byte(addr) == 4
            count = 4 + 4
            achievement(\"Title\", \"Desc\", 5, check(count))
        "};
        let program = parse(input).expect("parse failed");

        let expected = Program {
            statements: vec![
                Statement::FunctionDef(FunctionDefinition {
                    name: "check".to_string(),
                    parameters: vec![Parameter {
                        name: "addr".to_string(),
                        default: None,
                    }],
                    body: vec![Statement::Expr(Expression::new(
                        ExpressionKind::Return(Box::new(Expression::comparison(
                            Expression::call("byte", vec![Expression::variable("addr")]),
                            ComparisonOperation::Equal,
                            Expression::integer(4),
                        ))),
                        Span::default(),
                    ))],
                    span: Span::default(),
                }),
                Statement::Assign {
                    target: AssignTarget::Name("count".to_string()),
                    value: Expression::mathematic(
                        Expression::integer(4),
                        MathematicOperation::Add,
                        Expression::integer(4),
                    ),
                },
                Statement::Expr(Expression::call(
                    "achievement",
                    vec![
                        Expression::string("Title"),
                        Expression::string("Desc"),
                        Expression::integer(5),
                        Expression::call("check", vec![Expression::variable("count")]),
                    ],
                )),
            ],
        };

        assert_eq!(program, expected);
    }

    #[test]
    fn precedence_and_grouping() {
        let expr = parse_expression("a || b && !c == 1 + 2 * 3").unwrap();
        assert_eq!(expr.to_string(), "a || b && !c == 1 + 2 * 3");

        let grouped = parse_expression("(a || b) && c").unwrap();
        let ExpressionKind::Conditional { left: Some(left), .. } = &grouped.kind else {
            panic!("expected conditional");
        };
        assert!(left.logical_unit);
        assert_eq!(grouped.to_string(), "(a || b) && c");
    }

    #[test]
    fn printed_expressions_parse_back() {
        for source in [
            "byte(0x1234) == 5 && (word(0x10) > 3 || !(bit0(2) == 1))",
            "a - (b - c)",
            "x[\"key\"][2 + 4]",
            "[1, -2, \"three\", {1: \"a\", \"b\": [true, false]}]",
            "0 - f(1, 2) % 3",
            "repeated(10, byte(1) == 2) || never(a != b)",
        ] {
            roundtrip(source);
        }
    }

    #[test]
    fn unary_operators_and_associativity_print_back() {
        for source in [
            "-(a - b)",
            "!(a && b) || c",
            "!!a && !(b || c)",
            "a - (b - c) - d",
            "a / (b * c) % -2",
            "2 * -x",
            "a && (b && c)",
            "(a == b) == c",
            "\"tab\\there \\\"q\\\" back\\\\slash\\nline\"",
        ] {
            roundtrip(source);
        }
        assert_eq!(parse_expression("-(a - b)").unwrap().to_string(), "0 - (a - b)");
        assert_eq!(parse_expression("a - (b - c)").unwrap().to_string(), "a - (b - c)");
        assert_eq!(parse_expression("(a - b) - c").unwrap().to_string(), "a - b - c");
    }

    #[test]
    fn built_trees_print_with_required_parentheses() {
        let (a, b, c) = (
            Expression::variable("a"),
            Expression::variable("b"),
            Expression::variable("c"),
        );
        let trees = [
            Expression::not(Expression::conditional(
                a.clone(),
                ConditionalOperation::And,
                b.clone(),
            )),
            Expression::conditional(
                a.clone(),
                ConditionalOperation::And,
                Expression::conditional(b.clone(), ConditionalOperation::Or, c.clone()),
            ),
            Expression::mathematic(
                a.clone(),
                MathematicOperation::Subtract,
                Expression::mathematic(b.clone(), MathematicOperation::Subtract, c.clone()),
            ),
            Expression::comparison(
                Expression::not(a.clone()),
                ComparisonOperation::Equal,
                b.clone(),
            ),
            Expression::not(Expression::comparison(
                a,
                ComparisonOperation::LessThan,
                Expression::integer(-1),
            )),
            Expression::string("quote \" slash \\ tab \t newline \n"),
        ];
        for tree in trees {
            let printed = tree.to_string();
            assert_eq!(parse_expression(&printed).unwrap(), tree, "{printed}");
        }
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(parse_expression("-5").unwrap(), Expression::integer(-5));
        assert_eq!(
            parse_expression("-x").unwrap(),
            Expression::mathematic(
                Expression::integer(0),
                MathematicOperation::Subtract,
                Expression::variable("x"),
            )
        );
    }

    #[test]
    fn statements() {
        let program = parse(indoc! {"
            // comment
            table[1][\"a\"] = 3
            for i in range(1, 3) {
                if i == 2 { x = i } else if i == 3 { x = 0 } else { y = 1 }
            }
            function f(a, b = 2) { return a + b }
        "})
        .unwrap();
        assert_eq!(program.statements.len(), 3);
        assert_eq!(
            program.statements[0],
            Statement::Assign {
                target: AssignTarget::Index {
                    name: "table".to_string(),
                    indices: vec![Expression::integer(1), Expression::string("a")],
                },
                value: Expression::integer(3),
            }
        );
        let Statement::FunctionDef(definition) = &program.statements[2] else {
            panic!("expected function definition");
        };
        assert_eq!(definition.parameters[1].default, Some(Expression::integer(2)));
    }

    #[test]
    fn list_errors() {
        let error = parse_expression("[1 2]").unwrap_err();
        assert_eq!(error.message, "Expecting comma between entries, found integer 2");
        assert_eq!(error.span.column, 4);

        let error = parse_expression("[1, 2").unwrap_err();
        assert_eq!(error.message, "Expecting closing bracket, found end of script");

        let error = parse_expression("[return 1]").unwrap_err();
        assert_eq!(error.message, "Invalid array entry");
        assert_eq!(error.cause.map(|cause| cause.to_string()), Some("return 1".to_string()));

        let error = parse_expression("{1 2}").unwrap_err();
        assert_eq!(error.message, "Expecting colon following key expression, found integer 2");

        let error = parse_expression("{1: return 2}").unwrap_err();
        assert_eq!(error.message, "Invalid dictionary value");
    }

    #[test]
    fn indexing_requires_a_variable() {
        let error = parse_expression("f(1)[0]").unwrap_err();
        assert_eq!(error.message, "Cannot index FunctionCall, found '['");
    }

    #[test]
    fn reports_lexer_errors_as_parse_errors() {
        let error = parse("x = \"abc").unwrap_err();
        assert_eq!(error.kind, crate::error::ErrorKind::Parse);
        assert_eq!(error.message, "Unterminated string literal");
    }

    #[test]
    fn rejects_invalid_assignment_targets() {
        let error = parse("f(1) = 2").unwrap_err();
        assert_eq!(error.message, "Invalid assignment target");
    }
}
