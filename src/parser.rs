use crate::ast::{
    BinaryOperator, BoolOperator, ClassDef, CompareOperator, ComprehensionKind, Constant,
    ExceptHandler, Expression, FStringPart, FunctionDef, Keyword, Parameter, Program, Statement,
    StatementKind, UnaryOperator,
};
use crate::lexer;
use crate::token::{Span, Token, TokenKind};

pub mod error;

pub use self::error::{ParseError, ParseResult};

pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse_program(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            statements.extend(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> ParseResult<Vec<Statement>> {
        let span = self.current().span;
        let statement = match self.current().kind {
            TokenKind::At => self.parse_decorated()?,
            TokenKind::Def => {
                let function = self.parse_function_def(Vec::new())?;
                Statement::new(StatementKind::FunctionDef(function), span)
            }
            TokenKind::Class => {
                let class = self.parse_class_def(Vec::new())?;
                Statement::new(StatementKind::ClassDef(class), span)
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::Try => self.parse_try()?,
            TokenKind::With => {
                self.skip_until_block_colon()?;
                self.parse_block()?;
                Statement::new(StatementKind::Unsupported("with statement"), span)
            }
            TokenKind::Async => {
                self.advance();
                self.parse_statement()?;
                Statement::new(StatementKind::Unsupported("async statement"), span)
            }
            _ => return self.parse_simple_statements(),
        };
        Ok(vec![statement])
    }

    /// Parses `;`-separated simple statements up to the end of the line.
    fn parse_simple_statements(&mut self) -> ParseResult<Vec<Statement>> {
        let mut statements = vec![self.parse_simple_statement()?];
        while self.check(&TokenKind::Semicolon) {
            self.advance();
            if self.check(&TokenKind::Newline) {
                break;
            }
            statements.push(self.parse_simple_statement()?);
        }
        self.expect(TokenKind::Newline, "newline")?;
        Ok(statements)
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        let kind = match self.current().kind {
            TokenKind::Pass => {
                self.advance();
                StatementKind::Pass
            }
            TokenKind::Break => {
                self.advance();
                StatementKind::Break
            }
            TokenKind::Continue => {
                self.advance();
                StatementKind::Continue
            }
            TokenKind::Return => {
                self.advance();
                if self.at_statement_end() {
                    StatementKind::Return(None)
                } else {
                    StatementKind::Return(Some(self.parse_expression_list()?))
                }
            }
            TokenKind::Raise => {
                self.advance();
                if self.at_statement_end() {
                    StatementKind::Raise(None)
                } else {
                    let exception = self.parse_expression()?;
                    if self.check(&TokenKind::From) {
                        self.advance();
                        self.parse_expression()?;
                    }
                    StatementKind::Raise(Some(exception))
                }
            }
            TokenKind::Global => {
                self.advance();
                let mut names = vec![self.expect_identifier()?];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    names.push(self.expect_identifier()?);
                }
                StatementKind::Global(names)
            }
            TokenKind::Assert => {
                self.advance();
                let condition = self.parse_expression()?;
                let message = if self.check(&TokenKind::Comma) {
                    self.advance();
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                StatementKind::Assert { condition, message }
            }
            TokenKind::Import | TokenKind::From => StatementKind::Import(self.collect_line_text()),
            TokenKind::Nonlocal => {
                self.collect_line_text();
                StatementKind::Unsupported("nonlocal statement")
            }
            TokenKind::Del => {
                self.collect_line_text();
                StatementKind::Unsupported("del statement")
            }
            TokenKind::Yield => {
                self.collect_line_text();
                StatementKind::Unsupported("yield statement")
            }
            _ => self.parse_expression_statement()?,
        };
        Ok(Statement::new(kind, span))
    }

    fn parse_expression_statement(&mut self) -> ParseResult<StatementKind> {
        let first = self.parse_expression_list()?;

        if self.check(&TokenKind::Colon) {
            self.advance();
            self.validate_target(&first)?;
            let annotation = self.parse_expression()?;
            let value = if self.check(&TokenKind::Equal) {
                self.advance();
                Some(self.parse_expression_list()?)
            } else {
                None
            };
            return Ok(StatementKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        if self.check(&TokenKind::Equal) {
            let mut targets = vec![first];
            let mut value = None;
            while self.check(&TokenKind::Equal) {
                self.advance();
                if self.check(&TokenKind::Yield) {
                    self.collect_line_text();
                    return Ok(StatementKind::Unsupported("yield expression"));
                }
                let next = self.parse_expression_list()?;
                if let Some(previous) = value.replace(next) {
                    targets.push(previous);
                }
            }
            for target in &targets {
                self.validate_target(target)?;
            }
            let Some(value) = value else {
                return Err(self.error("expression"));
            };
            return Ok(StatementKind::Assign { targets, value });
        }

        if let Some(op) = augmented_operator(&self.current().kind) {
            self.advance();
            self.validate_target(&first)?;
            let value = self.parse_expression_list()?;
            return Ok(StatementKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        Ok(StatementKind::Expr(first))
    }

    fn validate_target(&self, target: &Expression) -> ParseResult<()> {
        match target {
            Expression::Name(_) | Expression::Attribute { .. } | Expression::Subscript { .. } => {
                Ok(())
            }
            Expression::Tuple(items) | Expression::List(items) => {
                for item in items {
                    self.validate_target(item)?;
                }
                Ok(())
            }
            Expression::Starred(inner) => self.validate_target(inner),
            other => {
                let span = self.current().span;
                Err(ParseError::InvalidAssignmentTarget {
                    target: other.kind_name(),
                    line: span.line,
                    column: span.column,
                })
            }
        }
    }

    fn parse_decorated(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            self.advance();
            decorators.push(self.parse_expression()?);
            self.expect(TokenKind::Newline, "newline")?;
            self.consume_newlines();
        }
        match self.current().kind {
            TokenKind::Def => {
                let function = self.parse_function_def(decorators)?;
                Ok(Statement::new(StatementKind::FunctionDef(function), span))
            }
            TokenKind::Class => {
                let class = self.parse_class_def(decorators)?;
                Ok(Statement::new(StatementKind::ClassDef(class), span))
            }
            _ => Err(self.error("def or class after decorator")),
        }
    }

    fn parse_function_def(&mut self, decorators: Vec<Expression>) -> ParseResult<FunctionDef> {
        self.expect(TokenKind::Def, "def")?;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen, "(")?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.parse_parameter()?);
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen, ")")?;

        let returns = if self.check(&TokenKind::Arrow) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;

        Ok(FunctionDef {
            name,
            params,
            returns,
            decorators,
            body,
        })
    }

    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let prefix = match self.current().kind {
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => {
                self.advance();
                return Ok(Parameter {
                    name: "/".to_string(),
                    annotation: None,
                    default: None,
                });
            }
            _ => "",
        };
        if !prefix.is_empty() {
            self.advance();
            if self.check(&TokenKind::Comma) || self.check(&TokenKind::RParen) {
                return Ok(Parameter {
                    name: prefix.to_string(),
                    annotation: None,
                    default: None,
                });
            }
        }
        let name = format!("{prefix}{}", self.expect_identifier()?);
        let annotation = if self.check(&TokenKind::Colon) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        let default = if self.check(&TokenKind::Equal) {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Parameter {
            name,
            annotation,
            default,
        })
    }

    fn parse_class_def(&mut self, decorators: Vec<Expression>) -> ParseResult<ClassDef> {
        self.expect(TokenKind::Class, "class")?;
        let name = self.expect_identifier()?;
        let (bases, keywords) = if self.check(&TokenKind::LParen) {
            self.advance();
            self.parse_call_arguments()?
        } else {
            (Vec::new(), Vec::new())
        };
        let body = self.parse_block()?;
        Ok(ClassDef {
            name,
            bases,
            keywords,
            decorators,
            body,
        })
    }

    fn parse_if(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.advance(); // `if` or `elif`
        let condition = self.parse_expression()?;
        let then_body = self.parse_block()?;
        let else_body = match self.current().kind {
            TokenKind::Elif => vec![self.parse_if()?],
            TokenKind::Else => {
                self.advance();
                self.parse_block()?
            }
            _ => Vec::new(),
        };
        Ok(Statement::new(
            StatementKind::If {
                condition,
                then_body,
                else_body,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.expect(TokenKind::While, "while")?;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        let else_body = self.parse_optional_else()?;
        Ok(Statement::new(
            StatementKind::While {
                condition,
                body,
                else_body,
            },
            span,
        ))
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.expect(TokenKind::For, "for")?;
        let target = self.parse_target_list()?;
        self.validate_target(&target)?;
        self.expect(TokenKind::In, "in")?;
        let iterable = self.parse_expression_list()?;
        let body = self.parse_block()?;
        let else_body = self.parse_optional_else()?;
        Ok(Statement::new(
            StatementKind::For {
                target,
                iterable,
                body,
                else_body,
            },
            span,
        ))
    }

    fn parse_optional_else(&mut self) -> ParseResult<Vec<Statement>> {
        if self.check(&TokenKind::Else) {
            self.advance();
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_try(&mut self) -> ParseResult<Statement> {
        let span = self.current().span;
        self.expect(TokenKind::Try, "try")?;
        let body = self.parse_block()?;

        let mut handlers = Vec::new();
        while self.check(&TokenKind::Except) {
            let handler_span = self.current().span;
            self.advance();
            let mut exception_type = None;
            let mut name = None;
            if !self.check(&TokenKind::Colon) {
                exception_type = Some(self.parse_expression()?);
                if self.check(&TokenKind::As) {
                    self.advance();
                    name = Some(self.expect_identifier()?);
                }
            }
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                exception_type,
                name,
                body,
                span: handler_span,
            });
        }

        let else_body = self.parse_optional_else()?;
        let finally_body = if self.check(&TokenKind::Finally) {
            self.advance();
            self.parse_block()?
        } else {
            Vec::new()
        };

        if handlers.is_empty() && finally_body.is_empty() {
            return Err(self.error("except or finally"));
        }

        Ok(Statement::new(
            StatementKind::Try {
                body,
                handlers,
                else_body,
                finally_body,
            },
            span,
        ))
    }

    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(TokenKind::Colon, ":")?;
        if !self.check(&TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        self.expect(TokenKind::Newline, "newline")?;
        self.consume_newlines();
        self.expect(TokenKind::Indent, "indent")?;

        let mut body = Vec::new();
        while !matches!(self.current().kind, TokenKind::Dedent | TokenKind::EOF) {
            if self.consume_newlines() {
                continue;
            }
            body.extend(self.parse_statement()?);
        }
        if self.check(&TokenKind::Dedent) {
            self.advance();
        }
        Ok(body)
    }

    fn skip_until_block_colon(&mut self) -> ParseResult<()> {
        let mut depth = 0usize;
        loop {
            match self.current().kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                TokenKind::Colon if depth == 0 => return Ok(()),
                TokenKind::Newline | TokenKind::EOF => return Err(self.error(":")),
                _ => {}
            }
            self.advance();
        }
    }

    /// Consumes the rest of the line and renders it back to source-like text.
    fn collect_line_text(&mut self) -> String {
        let mut text = String::new();
        while !self.at_statement_end() {
            let token = self.advance();
            let piece = token_text(&token.kind);
            let glue = matches!(token.kind, TokenKind::Dot | TokenKind::Comma)
                || text.ends_with('.')
                || text.is_empty();
            if !glue {
                text.push(' ');
            }
            text.push_str(&piece);
        }
        text
    }

    pub fn parse_expression_list(&mut self) -> ParseResult<Expression> {
        let first = self.parse_expression_or_starred()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if !starts_expression(&self.current().kind) {
                break;
            }
            items.push(self.parse_expression_or_starred()?);
        }
        Ok(Expression::Tuple(items))
    }

    /// Loop targets stop above comparisons so `in` is left for the header.
    fn parse_target_list(&mut self) -> ParseResult<Expression> {
        let first = self.parse_bitwise_or()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::In) {
                break;
            }
            items.push(self.parse_bitwise_or()?);
        }
        Ok(Expression::Tuple(items))
    }

    fn parse_expression_or_starred(&mut self) -> ParseResult<Expression> {
        if self.check(&TokenKind::Star) {
            self.advance();
            let inner = self.parse_bitwise_or()?;
            return Ok(Expression::Starred(Box::new(inner)));
        }
        self.parse_expression()
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        if self.check(&TokenKind::Lambda) {
            self.advance();
            while !self.check(&TokenKind::Colon) {
                if self.at_statement_end() {
                    return Err(self.error(":"));
                }
                self.advance();
            }
            self.advance();
            self.parse_expression()?;
            return Ok(Expression::Lambda);
        }

        let body = self.parse_or()?;
        if !self.check(&TokenKind::If) {
            return Ok(body);
        }
        self.advance();
        let condition = self.parse_or()?;
        self.expect(TokenKind::Else, "else")?;
        let orelse = self.parse_expression()?;
        Ok(Expression::IfExp {
            condition: Box::new(condition),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let first = self.parse_and()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&TokenKind::Or) {
            self.advance();
            values.push(self.parse_and()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::Or,
            values,
        })
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let first = self.parse_not()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&TokenKind::And) {
            self.advance();
            values.push(self.parse_not()?);
        }
        Ok(Expression::BoolOp {
            op: BoolOperator::And,
            values,
        })
    }

    fn parse_not(&mut self) -> ParseResult<Expression> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let left = self.parse_bitwise_or()?;
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_operator() {
            ops.push(op);
            comparators.push(self.parse_bitwise_or()?);
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expression::Compare {
            left: Box::new(left),
            ops,
            comparators,
        })
    }

    fn comparison_operator(&mut self) -> Option<CompareOperator> {
        let op = match self.current().kind {
            TokenKind::EqualEqual => CompareOperator::Eq,
            TokenKind::NotEqual => CompareOperator::NotEq,
            TokenKind::Less => CompareOperator::Lt,
            TokenKind::LessEqual => CompareOperator::LtE,
            TokenKind::Greater => CompareOperator::Gt,
            TokenKind::GreaterEqual => CompareOperator::GtE,
            TokenKind::In => CompareOperator::In,
            TokenKind::Not if self.peek_kind(1) == Some(&TokenKind::In) => {
                self.advance();
                CompareOperator::NotIn
            }
            TokenKind::Is => {
                if self.peek_kind(1) == Some(&TokenKind::Not) {
                    self.advance();
                    CompareOperator::IsNot
                } else {
                    CompareOperator::Is
                }
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn parse_bitwise_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_bitwise_xor()?;
        while self.check(&TokenKind::Pipe) {
            self.advance();
            let right = self.parse_bitwise_xor()?;
            expr = binary(expr, BinaryOperator::BitOr, right);
        }
        Ok(expr)
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_bitwise_and()?;
        while self.check(&TokenKind::Caret) {
            self.advance();
            let right = self.parse_bitwise_and()?;
            expr = binary(expr, BinaryOperator::BitXor, right);
        }
        Ok(expr)
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_shift()?;
        while self.check(&TokenKind::Ampersand) {
            self.advance();
            let right = self.parse_shift()?;
            expr = binary(expr, BinaryOperator::BitAnd, right);
        }
        Ok(expr)
    }

    fn parse_shift(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_arithmetic()?;
        loop {
            let op = match self.current().kind {
                TokenKind::LeftShift => BinaryOperator::LeftShift,
                TokenKind::RightShift => BinaryOperator::RightShift,
                _ => break,
            };
            self.advance();
            let right = self.parse_arithmetic()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_arithmetic(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::Slash => BinaryOperator::Div,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                TokenKind::Percent => BinaryOperator::Mod,
                TokenKind::At => BinaryOperator::MatMul,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expression> {
        let op = match self.current().kind {
            TokenKind::Minus => UnaryOperator::Neg,
            TokenKind::Plus => UnaryOperator::Pos,
            TokenKind::Tilde => UnaryOperator::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> ParseResult<Expression> {
        let base = self.parse_primary()?;
        if !self.check(&TokenKind::DoubleStar) {
            return Ok(base);
        }
        self.advance();
        let exponent = self.parse_factor()?;
        Ok(binary(base, BinaryOperator::Pow, exponent))
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect_identifier()?;
                    expr = Expression::Attribute {
                        object: Box::new(expr),
                        name,
                    };
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, keywords) = self.parse_call_arguments()?;
                    expr = Expression::Call {
                        callee: Box::new(expr),
                        args,
                        keywords,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_subscript_index()?;
                    self.expect(TokenKind::RBracket, "]")?;
                    expr = Expression::Subscript {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    /// Parses call arguments after the opening parenthesis, including the closing one.
    fn parse_call_arguments(&mut self) -> ParseResult<(Vec<Expression>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if let TokenKind::Identifier(name) = self.current().kind
                && self.peek_kind(1) == Some(&TokenKind::Equal)
            {
                self.advance();
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword {
                    name: name.to_string(),
                    value,
                });
            } else if self.check(&TokenKind::DoubleStar) {
                self.advance();
                let inner = self.parse_expression()?;
                args.push(Expression::Starred(Box::new(inner)));
            } else {
                let arg = self.parse_expression_or_starred()?;
                if self.check(&TokenKind::For) || self.check(&TokenKind::Async) {
                    self.skip_comprehension_clauses(&TokenKind::RParen)?;
                    args.push(Expression::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(arg),
                    });
                } else {
                    args.push(arg);
                }
            }
            if !self.check(&TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen, ")")?;
        Ok((args, keywords))
    }

    fn parse_subscript_index(&mut self) -> ParseResult<Expression> {
        let first = self.parse_slice_item()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expression::Tuple(items))
    }

    fn parse_slice_item(&mut self) -> ParseResult<Expression> {
        let lower = if self.check(&TokenKind::Colon) {
            None
        } else {
            let expr = self.parse_expression()?;
            if !self.check(&TokenKind::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect(TokenKind::Colon, ":")?;
        let upper = self.parse_optional_slice_bound()?;
        let step = if self.check(&TokenKind::Colon) {
            self.advance();
            self.parse_optional_slice_bound()?
        } else {
            None
        };
        Ok(Expression::Slice { lower, upper, step })
    }

    fn parse_optional_slice_bound(&mut self) -> ParseResult<Option<Box<Expression>>> {
        if matches!(
            self.current().kind,
            TokenKind::Colon | TokenKind::Comma | TokenKind::RBracket
        ) {
            return Ok(None);
        }
        Ok(Some(Box::new(self.parse_expression()?)))
    }

    fn parse_atom(&mut self) -> ParseResult<Expression> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expression::name(name))
            }
            TokenKind::Integer(value) => {
                self.advance();
                Ok(Expression::Constant(Constant::Int(value)))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expression::Constant(Constant::Float(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::Constant(Constant::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::Constant(Constant::Bool(false)))
            }
            TokenKind::None => {
                self.advance();
                Ok(Expression::Constant(Constant::None))
            }
            TokenKind::String(_) | TokenKind::FString(_) => self.parse_string_literals(),
            TokenKind::Bytes(value) => {
                self.advance();
                Ok(Expression::Constant(Constant::Bytes(value)))
            }
            TokenKind::LParen => {
                self.advance();
                if self.check(&TokenKind::RParen) {
                    self.advance();
                    return Ok(Expression::Tuple(Vec::new()));
                }
                let first = self.parse_expression_or_starred()?;
                if self.check(&TokenKind::For) || self.check(&TokenKind::Async) {
                    self.skip_comprehension_clauses(&TokenKind::RParen)?;
                    self.expect(TokenKind::RParen, ")")?;
                    return Ok(Expression::Comprehension {
                        kind: ComprehensionKind::Generator,
                        element: Box::new(first),
                    });
                }
                if self.check(&TokenKind::RParen) {
                    self.advance();
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.check(&TokenKind::Comma) {
                    self.advance();
                    if self.check(&TokenKind::RParen) {
                        break;
                    }
                    items.push(self.parse_expression_or_starred()?);
                }
                self.expect(TokenKind::RParen, ")")?;
                Ok(Expression::Tuple(items))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    let item = self.parse_expression_or_starred()?;
                    if items.is_empty() && self.check(&TokenKind::For) {
                        self.skip_comprehension_clauses(&TokenKind::RBracket)?;
                        self.expect(TokenKind::RBracket, "]")?;
                        return Ok(Expression::Comprehension {
                            kind: ComprehensionKind::List,
                            element: Box::new(item),
                        });
                    }
                    items.push(item);
                    if !self.check(&TokenKind::Comma) {
                        break;
                    }
                    self.advance();
                }
                self.expect(TokenKind::RBracket, "]")?;
                Ok(Expression::List(items))
            }
            TokenKind::LBrace => self.parse_brace_literal(),
            _ => Err(self.error("expression")),
        }
    }

    fn parse_brace_literal(&mut self) -> ParseResult<Expression> {
        self.expect(TokenKind::LBrace, "{")?;
        if self.check(&TokenKind::RBrace) {
            self.advance();
            return Ok(Expression::Dict(Vec::new()));
        }

        let first = self.parse_expression_or_starred()?;
        if self.check(&TokenKind::Colon) {
            self.advance();
            let value = self.parse_expression()?;
            if self.check(&TokenKind::For) {
                self.skip_comprehension_clauses(&TokenKind::RBrace)?;
                self.expect(TokenKind::RBrace, "}")?;
                return Ok(Expression::Comprehension {
                    kind: ComprehensionKind::Dict,
                    element: Box::new(first),
                });
            }
            let mut entries = vec![(first, value)];
            while self.check(&TokenKind::Comma) {
                self.advance();
                if self.check(&TokenKind::RBrace) {
                    break;
                }
                let key = self.parse_expression()?;
                self.expect(TokenKind::Colon, ":")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
            }
            self.expect(TokenKind::RBrace, "}")?;
            return Ok(Expression::Dict(entries));
        }

        if self.check(&TokenKind::For) {
            self.skip_comprehension_clauses(&TokenKind::RBrace)?;
            self.expect(TokenKind::RBrace, "}")?;
            return Ok(Expression::Comprehension {
                kind: ComprehensionKind::Set,
                element: Box::new(first),
            });
        }
        let mut items = vec![first];
        while self.check(&TokenKind::Comma) {
            self.advance();
            if self.check(&TokenKind::RBrace) {
                break;
            }
            items.push(self.parse_expression_or_starred()?);
        }
        self.expect(TokenKind::RBrace, "}")?;
        Ok(Expression::Set(items))
    }

    /// Skips `for ... in ... if ...` clauses up to (not including) `closing`.
    fn skip_comprehension_clauses(&mut self, closing: &TokenKind<'a>) -> ParseResult<()> {
        let mut depth = 0usize;
        loop {
            let kind = &self.current().kind;
            if depth == 0 && kind == closing {
                return Ok(());
            }
            match kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return Err(self.error("closing bracket of comprehension"));
                    }
                    depth -= 1;
                }
                TokenKind::EOF => return Err(self.error("end of comprehension")),
                _ => {}
            }
            self.advance();
        }
    }

    /// Adjacent string literals concatenate; any f-string makes the whole run an f-string.
    fn parse_string_literals(&mut self) -> ParseResult<Expression> {
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut is_fstring = false;
        loop {
            let token = self.current().clone();
            match token.kind {
                TokenKind::String(value) => {
                    self.advance();
                    push_literal(&mut parts, &value);
                }
                TokenKind::FString(body) => {
                    self.advance();
                    is_fstring = true;
                    for part in parse_fstring(&body, token.span)? {
                        match part {
                            FStringPart::Literal(text) => push_literal(&mut parts, &text),
                            substitution => parts.push(substitution),
                        }
                    }
                }
                _ => break,
            }
        }

        if is_fstring {
            return Ok(Expression::FString(parts));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(text)) => text,
            _ => String::new(),
        };
        Ok(Expression::Constant(Constant::Str(text)))
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while self.check(&TokenKind::Newline) {
            consumed = true;
            self.advance();
        }
        consumed
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::EOF
        )
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        if let TokenKind::Identifier(name) = self.current().kind {
            self.advance();
            Ok(name.to_string())
        } else {
            Err(self.error("identifier"))
        }
    }

    fn expect(&mut self, kind: TokenKind<'a>, label: &str) -> ParseResult<()> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(label))
        }
    }

    fn check(&self, kind: &TokenKind<'a>) -> bool {
        &self.current().kind == kind
    }

    fn current(&self) -> &Token<'a> {
        static EOF: Token<'static> = Token {
            kind: TokenKind::EOF,
            span: Span {
                start: 0,
                end: 0,
                line: 0,
                column: 0,
            },
        };
        self.tokens.get(self.position).unwrap_or(&EOF)
    }

    fn peek_kind(&self, offset: usize) -> Option<&TokenKind<'a>> {
        self.tokens
            .get(self.position + offset)
            .map(|token| &token.kind)
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn error(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: format!("{:?}", token.kind),
            line: token.span.line,
            column: token.span.column,
        }
    }
}

fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(existing)) = parts.last_mut() {
        existing.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

fn augmented_operator(kind: &TokenKind<'_>) -> Option<BinaryOperator> {
    let op = match kind {
        TokenKind::PlusEqual => BinaryOperator::Add,
        TokenKind::MinusEqual => BinaryOperator::Sub,
        TokenKind::StarEqual => BinaryOperator::Mul,
        TokenKind::SlashEqual => BinaryOperator::Div,
        TokenKind::DoubleSlashEqual => BinaryOperator::FloorDiv,
        TokenKind::PercentEqual => BinaryOperator::Mod,
        TokenKind::DoubleStarEqual => BinaryOperator::Pow,
        TokenKind::LeftShiftEqual => BinaryOperator::LeftShift,
        TokenKind::RightShiftEqual => BinaryOperator::RightShift,
        TokenKind::AmpersandEqual => BinaryOperator::BitAnd,
        TokenKind::PipeEqual => BinaryOperator::BitOr,
        TokenKind::CaretEqual => BinaryOperator::BitXor,
        _ => return None,
    };
    Some(op)
}

fn starts_expression(kind: &TokenKind<'_>) -> bool {
    !matches!(
        kind,
        TokenKind::Newline
            | TokenKind::EOF
            | TokenKind::Equal
            | TokenKind::Colon
            | TokenKind::Semicolon
            | TokenKind::RParen
            | TokenKind::RBracket
            | TokenKind::RBrace
            | TokenKind::Indent
            | TokenKind::Dedent
    ) && augmented_operator(kind).is_none()
}

fn token_text(kind: &TokenKind<'_>) -> String {
    match kind {
        TokenKind::Identifier(name) => name.to_string(),
        TokenKind::Import => "import".to_string(),
        TokenKind::From => "from".to_string(),
        TokenKind::As => "as".to_string(),
        TokenKind::Dot => ".".to_string(),
        TokenKind::Comma => ",".to_string(),
        TokenKind::Star => "*".to_string(),
        TokenKind::LParen => "(".to_string(),
        TokenKind::RParen => ")".to_string(),
        TokenKind::Integer(value) => value.to_string(),
        other => format!("{other:?}"),
    }
}

/// Splits an f-string body into literal runs and parsed substitutions.
fn parse_fstring(body: &str, span: Span) -> ParseResult<Vec<FStringPart>> {
    let invalid = |message: &str| ParseError::InvalidFString {
        message: message.to_string(),
        line: span.line,
    };

    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => return Err(invalid("single '}' is not allowed")),
            '{' => {
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut expression = String::new();
                let mut conversion = None;
                let mut format_spec: Option<String> = None;
                loop {
                    let Some(c) = chars.next() else {
                        return Err(invalid("expecting '}'"));
                    };
                    if let Some(open) = quote {
                        if c == open {
                            quote = None;
                        }
                        expression.push(c);
                        continue;
                    }
                    match c {
                        '\'' | '"' => {
                            quote = Some(c);
                            expression.push(c);
                        }
                        '(' | '[' | '{' => {
                            depth += 1;
                            expression.push(c);
                        }
                        ')' | ']' => {
                            depth = depth.saturating_sub(1);
                            expression.push(c);
                        }
                        '}' if depth > 0 => {
                            depth -= 1;
                            expression.push(c);
                        }
                        '}' => break,
                        '!' if depth == 0 && chars.peek() != Some(&'=') => {
                            conversion = chars.next();
                            match chars.next() {
                                Some('}') => break,
                                Some(':') => {
                                    format_spec = Some(read_format_spec(&mut chars, span)?);
                                    break;
                                }
                                _ => return Err(invalid("expecting '}' after conversion")),
                            }
                        }
                        ':' if depth == 0 => {
                            format_spec = Some(read_format_spec(&mut chars, span)?);
                            break;
                        }
                        _ => expression.push(c),
                    }
                }

                if expression.trim().is_empty() {
                    return Err(invalid("empty expression not allowed"));
                }
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let value = parse_embedded_expression(expression.trim(), span)?;
                parts.push(FStringPart::Substitution {
                    value,
                    conversion,
                    format_spec,
                });
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

fn read_format_spec(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    span: Span,
) -> ParseResult<String> {
    let mut spec = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return Ok(spec);
        }
        spec.push(c);
    }
    Err(ParseError::InvalidFString {
        message: "expecting '}' after format spec".to_string(),
        line: span.line,
    })
}

fn parse_embedded_expression(source: &str, span: Span) -> ParseResult<Expression> {
    let tokens = lexer::tokenize(source).map_err(|err| ParseError::InvalidFString {
        message: err.to_string(),
        line: span.line,
    })?;
    let mut parser = Parser::new(tokens);
    let value = parser.parse_expression_list()?;
    parser.consume_newlines();
    if !parser.check(&TokenKind::EOF) {
        return Err(ParseError::InvalidFString {
            message: format!("unexpected trailing input in '{{{source}}}'"),
            line: span.line,
        });
    }
    Ok(value)
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Program> {
    Parser::new(tokens).parse_program()
}

/// Parses a standalone expression, such as a string-form annotation.
pub fn parse_expression_source(source: &str) -> Result<Expression, crate::error::CompileError> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let value = parser.parse_expression()?;
    parser.consume_newlines();
    if !parser.check(&TokenKind::EOF) {
        return Err(parser.error("end of expression").into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(input: &str) -> Program {
        let tokens = lexer::tokenize(input).expect("tokenize failed");
        parse_tokens(tokens).expect("parse failed")
    }

    fn kinds(input: &str) -> Vec<StatementKind> {
        parse(input)
            .statements
            .into_iter()
            .map(|statement| statement.kind)
            .collect()
    }

    fn name(value: &str) -> Expression {
        Expression::name(value)
    }

    fn int(value: i64) -> Expression {
        Expression::Constant(Constant::Int(value))
    }

    #[test]
    fn parses_annotated_function() {
        let input = indoc! {"
            def add(a: int, b: int = 2) -> int:
                total: int = a + b
                return total
        "};
        let statements = kinds(input);
        let StatementKind::FunctionDef(function) = &statements[0] else {
            panic!("expected function");
        };
        assert_eq!(function.name, "add");
        assert_eq!(
            function.params,
            vec![
                Parameter {
                    name: "a".to_string(),
                    annotation: Some(name("int")),
                    default: None,
                },
                Parameter {
                    name: "b".to_string(),
                    annotation: Some(name("int")),
                    default: Some(int(2)),
                },
            ]
        );
        assert_eq!(function.returns, Some(name("int")));
        let body = function
            .body
            .iter()
            .map(|statement| statement.kind.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            body,
            vec![
                StatementKind::AnnAssign {
                    target: name("total"),
                    annotation: name("int"),
                    value: Some(binary(name("a"), BinaryOperator::Add, name("b"))),
                },
                StatementKind::Return(Some(name("total"))),
            ]
        );
        assert_eq!(function.body[1].span.line, 3);
        assert_eq!(function.body[1].span.column, 4);
    }

    #[test]
    fn parses_tuple_swap_and_chained_assign() {
        assert_eq!(
            kinds("a, b = b, a\nx = y = 1\n"),
            vec![
                StatementKind::Assign {
                    targets: vec![Expression::Tuple(vec![name("a"), name("b")])],
                    value: Expression::Tuple(vec![name("b"), name("a")]),
                },
                StatementKind::Assign {
                    targets: vec![name("x"), name("y")],
                    value: int(1),
                },
            ]
        );
    }

    #[test]
    fn parses_elif_as_nested_if() {
        let input = indoc! {"
            if a:
                pass
            elif b:
                pass
            else:
                x = 1
        "};
        let statements = kinds(input);
        let StatementKind::If { else_body, .. } = &statements[0] else {
            panic!("expected if");
        };
        assert!(matches!(
            else_body[0].kind,
            StatementKind::If { ref else_body, .. } if else_body.len() == 1
        ));
    }

    #[test]
    fn parses_class_with_base_and_decorated_method() {
        let input = indoc! {"
            class Dog(Animal):
                legs: int = 4

                @staticmethod
                def kind() -> str:
                    return 'dog'
        "};
        let statements = kinds(input);
        let StatementKind::ClassDef(class) = &statements[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "Dog");
        assert_eq!(class.bases, vec![name("Animal")]);
        let StatementKind::FunctionDef(method) = &class.body[1].kind else {
            panic!("expected method");
        };
        assert_eq!(method.decorators, vec![name("staticmethod")]);
    }

    #[test]
    fn parses_try_except_finally() {
        let input = indoc! {"
            try:
                risky()
            except ValueError as err:
                print(err)
            except:
                raise
            finally:
                done()
        "};
        let statements = kinds(input);
        let StatementKind::Try {
            handlers,
            finally_body,
            ..
        } = &statements[0]
        else {
            panic!("expected try");
        };
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].exception_type, Some(name("ValueError")));
        assert_eq!(handlers[0].name.as_deref(), Some("err"));
        assert_eq!(handlers[1].exception_type, None);
        assert_eq!(handlers[1].body[0].kind, StatementKind::Raise(None));
        assert_eq!(finally_body.len(), 1);
    }

    #[test]
    fn keeps_comparison_chains() {
        let statements = kinds("ok = 0 < x <= 10\n");
        let StatementKind::Assign { value, .. } = &statements[0] else {
            panic!("expected assign");
        };
        assert!(matches!(
            value,
            Expression::Compare { ops, .. } if ops == &vec![CompareOperator::Lt, CompareOperator::LtE]
        ));
    }

    #[test]
    fn parses_not_in_and_is_not() {
        let statements = kinds("a = x not in ys\nb = x is not None\n");
        let StatementKind::Assign { value, .. } = &statements[0] else {
            panic!("expected assign");
        };
        assert!(matches!(value, Expression::Compare { ops, .. } if ops == &vec![CompareOperator::NotIn]));
        let StatementKind::Assign { value, .. } = &statements[1] else {
            panic!("expected assign");
        };
        assert!(matches!(value, Expression::Compare { ops, .. } if ops == &vec![CompareOperator::IsNot]));
    }

    #[test]
    fn parses_fstring_segments() {
        let statements = kinds("print(f\"{name}: {value:.2f} {{ok}}\")\n");
        let StatementKind::Expr(Expression::Call { args, .. }) = &statements[0] else {
            panic!("expected call");
        };
        assert_eq!(
            args[0],
            Expression::FString(vec![
                FStringPart::Substitution {
                    value: name("name"),
                    conversion: None,
                    format_spec: None,
                },
                FStringPart::Literal(": ".to_string()),
                FStringPart::Substitution {
                    value: name("value"),
                    conversion: None,
                    format_spec: Some(".2f".to_string()),
                },
                FStringPart::Literal(" {ok}".to_string()),
            ])
        );
    }

    #[test]
    fn parses_comprehensions_as_opaque_nodes() {
        let statements = kinds("xs = [x * 2 for x in range(3) if x]\n");
        let StatementKind::Assign { value, .. } = &statements[0] else {
            panic!("expected assign");
        };
        assert!(matches!(
            value,
            Expression::Comprehension {
                kind: ComprehensionKind::List,
                ..
            }
        ));
    }

    #[test]
    fn parses_slices_and_generic_subscripts() {
        let statements = kinds("x: dict[str, list[int]] = {}\ny = s[1:]\n");
        let StatementKind::AnnAssign { annotation, .. } = &statements[0] else {
            panic!("expected annotated assign");
        };
        assert!(matches!(annotation, Expression::Subscript { index, .. } if matches!(**index, Expression::Tuple(ref items) if items.len() == 2)));
        let StatementKind::Assign { value, .. } = &statements[1] else {
            panic!("expected assign");
        };
        assert!(matches!(
            value,
            Expression::Subscript { index, .. }
                if matches!(**index, Expression::Slice { upper: None, step: None, .. })
        ));
    }

    #[test]
    fn marks_with_statement_unsupported() {
        let input = indoc! {"
            with open('f') as fh:
                pass
        "};
        assert_eq!(
            kinds(input),
            vec![StatementKind::Unsupported("with statement")]
        );
    }

    #[test]
    fn rejects_assignment_to_call() {
        let tokens = lexer::tokenize("f() = 1\n").expect("tokenize failed");
        let err = parse_tokens(tokens).expect_err("expected parse failure");
        assert!(err.to_string().contains("Cannot assign to call"));
    }

    #[test]
    fn reports_unexpected_token() {
        let tokens = lexer::tokenize("def f(:\n    pass\n").expect("tokenize failed");
        let err = parse_tokens(tokens).expect_err("expected parse failure");
        assert!(matches!(err, ParseError::UnexpectedToken { line: 1, .. }));
    }
}
