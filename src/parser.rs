use std::cell::RefCell;

use crate::{
    ast::{
        ComparisonOperator, Expression, InfixOperator, Literal, Program, Property, Statement,
        NULL_IDENTIFIER,
    },
    tokenizer::{Token, TokenKind},
};

#[derive(Debug)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    context: ParseContext,
    pub token: Option<Token>,
}

impl std::error::Error for ParseErrorWithContext {}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "While parsing {}",
            self.context.stack.borrow().join(" > ")
        )?;
        write!(f, "{}", self.error)?;
        if let Some(token) = &self.token {
            write!(f, " at {} but found \"{}\"", token.span, token.kind)?;
            if !token.text.is_empty() && token.text != token.kind.to_string() {
                write!(f, " ({})", token.text)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{0}\"")]
    Expected(TokenKind),
    #[error("Unexpected \"{0}\"")]
    Unexpected(TokenKind),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Constant \"{0}\" must be initialised")]
    MissingConstInitializer(String),
    #[error("Number {0} does not fit in an integer")]
    NumberOutOfRange(String),
    #[error("Expression nested more than {} levels deep", MAX_EXPRESSION_DEPTH)]
    TooDeep,
}

/// Deepest nesting of expressions the parser descends into.
pub const MAX_EXPRESSION_DEPTH: usize = 128;

#[derive(Debug, Clone)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn depth(&self, name: &str) -> usize {
        self.stack.borrow().iter().filter(|&&entry| entry == name).count()
    }

    fn error(&self, error: ParseError, tokens: &[Token]) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context: self.clone(),
            token: tokens.first().cloned(),
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

type ParseResult<'a, T> = Result<(T, &'a [Token]), ParseErrorWithContext>;

/// Parses a whole token stream. The first error aborts parsing.
pub fn program(tokens: &[Token]) -> Result<Program, ParseErrorWithContext> {
    let context = ParseContext::new();
    let _guard = context.push("program");
    let mut statements = Vec::new();
    let mut tokens = tokens;

    loop {
        match tokens.first().map(Token::kind) {
            Some(TokenKind::Eof) => break,
            None => return Err(context.error(ParseError::Expected(TokenKind::Eof), tokens)),
            Some(_) => {
                let (stmt, rest) = statement(&context, tokens)?;
                statements.push(stmt);
                tokens = rest;
            }
        }
    }

    Ok(Program(statements))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("statement");
    let (stmt, tokens) = match tokens.first() {
        Some(keyword) if keyword.kind == TokenKind::VarDeclaration => {
            var_declaration(context, keyword, &tokens[1..])?
        }
        Some(token) if token.kind == TokenKind::Print => print_statement(context, &tokens[1..])?,
        _ => {
            let (expr, rest) = expression(context, tokens)?;
            (Statement::Expression(expr), rest)
        }
    };
    let tokens = consume(context, tokens, TokenKind::Semicolon)?;
    Ok((stmt, tokens))
}

fn var_declaration<'a>(
    context: &ParseContext,
    keyword: &Token,
    tokens: &'a [Token],
) -> ParseResult<'a, Statement> {
    let _guard = context.push("var_declaration");
    let constant = keyword.text == "const";
    let (name, tokens) = match_identifier(context, tokens)?;
    let (value, tokens) = match tokens.first().map(Token::kind) {
        Some(TokenKind::Equal) => expression(context, &tokens[1..])?,
        _ if constant => {
            return Err(context.error(ParseError::MissingConstInitializer(name), tokens))
        }
        _ => (Expression::Identifier(NULL_IDENTIFIER.to_string()), tokens),
    };
    Ok((
        Statement::VarDeclaration {
            name,
            value,
            constant,
        },
        tokens,
    ))
}

fn print_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Statement> {
    let _guard = context.push("print_statement");
    let tokens = consume(context, tokens, TokenKind::LeftParen)?;
    let (expr, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenKind::RightParen)?;
    Ok((Statement::Print(expr), tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("expression");
    if context.depth("expression") > MAX_EXPRESSION_DEPTH {
        return Err(context.error(ParseError::TooDeep, tokens));
    }
    assignment(context, tokens)
}

/// Any left-hand side is accepted here; invalid targets are rejected when
/// the assignment is evaluated.
fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("assignment");
    let (target, rest) = object(context, tokens)?;

    match rest.first().map(Token::kind) {
        Some(TokenKind::Equal) => {
            let (value, rest) = expression(context, &rest[1..])?;
            Ok((
                Expression::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                rest,
            ))
        }
        _ => Ok((target, rest)),
    }
}

fn object<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    if tokens.first().map(Token::kind) != Some(&TokenKind::LeftBrace) {
        return comparison(context, tokens);
    }

    let _guard = context.push("object");
    let mut tokens = &tokens[1..];
    let mut properties = Vec::new();

    loop {
        if let Some(TokenKind::RightBrace) = tokens.first().map(Token::kind) {
            tokens = &tokens[1..];
            break;
        }

        let (key, rest) = match_identifier(context, tokens)?;
        let rest = consume(context, rest, TokenKind::Colon)?;
        let (value, rest) = expression(context, rest)?;
        // Every property, including the last, is followed by a comma.
        tokens = consume(context, rest, TokenKind::Comma)?;
        properties.push(Property { key, value });
    }

    member_access(context, Expression::Object(properties), tokens)
}

fn binary<'a, O>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> ParseResult<'a, Expression>,
    operator: impl Fn(&TokenKind) -> Option<O>,
    combine: fn(Box<Expression>, O, Box<Expression>) -> Expression,
    tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        let op = match operator(token.kind()) {
            Some(op) => op,
            None => break,
        };
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = combine(Box::new(expr), op, Box::new(right));
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("comparison");
    binary(
        context,
        term,
        |kind| match kind {
            TokenKind::EqualEqual => Some(ComparisonOperator::Equal),
            TokenKind::BangEqual => Some(ComparisonOperator::NotEqual),
            TokenKind::Less => Some(ComparisonOperator::LessThan),
            TokenKind::LessEqual => Some(ComparisonOperator::LessThanOrEqual),
            TokenKind::Greater => Some(ComparisonOperator::GreaterThan),
            TokenKind::GreaterEqual => Some(ComparisonOperator::GreaterThanOrEqual),
            _ => None,
        },
        Expression::Comparison,
        tokens,
    )
}

fn term<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("term");
    binary(
        context,
        factor,
        |kind| match kind {
            TokenKind::Plus => Some(InfixOperator::Plus),
            TokenKind::Minus => Some(InfixOperator::Minus),
            _ => None,
        },
        Expression::Binary,
        tokens,
    )
}

fn factor<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("factor");
    binary(
        context,
        member,
        |kind| match kind {
            TokenKind::Star => Some(InfixOperator::Multiply),
            TokenKind::Slash => Some(InfixOperator::Divide),
            TokenKind::Percent => Some(InfixOperator::Modulo),
            _ => None,
        },
        Expression::Binary,
        tokens,
    )
}

fn member<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("member");
    let (expr, tokens) = primary(context, tokens)?;
    member_access(context, expr, tokens)
}

fn member_access<'a>(
    context: &ParseContext,
    mut expr: Expression,
    mut tokens: &'a [Token],
) -> ParseResult<'a, Expression> {
    while let Some(TokenKind::Dot) = tokens.first().map(Token::kind) {
        let (property, rest) = match_identifier(context, &tokens[1..])?;
        expr = Expression::Member(Box::new(expr), property);
        tokens = rest;
    }
    Ok((expr, tokens))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, Expression> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::Unexpected(TokenKind::Eof), tokens));
    };

    match token.kind {
        TokenKind::Identifier => Ok((Expression::Identifier(token.text.clone()), &tokens[1..])),
        TokenKind::Number => {
            let n = token.text.parse::<i64>().map_err(|_| {
                context.error(ParseError::NumberOutOfRange(token.text.clone()), tokens)
            })?;
            Ok((Expression::Literal(Literal::Number(n)), &tokens[1..]))
        }
        TokenKind::String => Ok((
            Expression::Literal(Literal::String(token.text.clone())),
            &tokens[1..],
        )),
        TokenKind::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenKind::RightParen)?;
            Ok((expr, tokens))
        }
        kind => Err(context.error(ParseError::Unexpected(kind), tokens)),
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    kind: TokenKind,
) -> Result<&'a [Token], ParseErrorWithContext> {
    match tokens.first().map(Token::kind) {
        Some(k) if k == &kind => Ok(&tokens[1..]),
        _ => Err(context.error(ParseError::Expected(kind), tokens)),
    }
}

fn match_identifier<'a>(context: &ParseContext, tokens: &'a [Token]) -> ParseResult<'a, String> {
    match tokens.first() {
        Some(token) if token.kind == TokenKind::Identifier => {
            Ok((token.text.clone(), &tokens[1..]))
        }
        _ => Err(context.error(ParseError::ExpectedIdentifier, tokens)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokens;

    fn parse(source: &str) -> Result<Program, ParseErrorWithContext> {
        program(&tokens(source).unwrap())
    }

    fn parse_expression(source: &str) -> Expression {
        let mut program = parse(source).unwrap();
        assert_eq!(program.0.len(), 1);
        match program.0.pop() {
            Some(Statement::Expression(expr)) => expr,
            other => panic!("expected an expression statement, got {:?}", other),
        }
    }

    fn number(n: i64) -> Box<Expression> {
        Box::new(Expression::Literal(Literal::Number(n)))
    }

    fn ident(name: &str) -> Box<Expression> {
        Box::new(Expression::Identifier(name.to_string()))
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let expr = parse_expression("1 + 2 * 3;");
        assert_eq!(
            expr,
            Expression::Binary(
                number(1),
                InfixOperator::Plus,
                Box::new(Expression::Binary(
                    number(2),
                    InfixOperator::Multiply,
                    number(3)
                )),
            )
        );
    }

    #[test]
    fn test_binary_is_left_associative() {
        let expr = parse_expression("8 - 4 - 2;");
        assert_eq!(expr.to_string(), "(- (- 8 4) 2)");
        let expr = parse_expression("8 / 4 % 3;");
        assert_eq!(expr.to_string(), "(% (/ 8 4) 3)");
    }

    #[test]
    fn test_comparison_binds_looser_than_addition() {
        let expr = parse_expression("a + 1 >= b * 2;");
        assert_eq!(expr.to_string(), "(>= (+ a 1) (* b 2))");
    }

    #[test]
    fn test_grouping() {
        let expr = parse_expression("(1 + 2) * 3;");
        assert_eq!(expr.to_string(), "(* (+ 1 2) 3)");
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse_expression("a = b = 3;");
        assert_eq!(
            expr,
            Expression::Assign {
                target: ident("a"),
                value: Box::new(Expression::Assign {
                    target: ident("b"),
                    value: number(3),
                }),
            }
        );
    }

    #[test]
    fn test_invalid_assignment_target_parses() {
        let expr = parse_expression("1 + 2 = 3;");
        assert!(matches!(expr, Expression::Assign { .. }));
    }

    #[test]
    fn test_member_chain() {
        let expr = parse_expression("a.b.c;");
        assert_eq!(
            expr,
            Expression::Member(
                Box::new(Expression::Member(ident("a"), "b".to_string())),
                "c".to_string()
            )
        );
    }

    #[test]
    fn test_member_assignment() {
        let expr = parse_expression("a.b = 1;");
        assert_eq!(expr.to_string(), "(a.b = 1)");
    }

    #[test]
    fn test_object_literal() {
        let expr = parse_expression("{ a: 1, b: { c: \"x\", }, };");
        assert_eq!(expr.to_string(), "{ a: 1, b: { c: \"x\", }, }");
    }

    #[test]
    fn test_empty_object_literal() {
        assert_eq!(parse_expression("{};"), Expression::Object(vec![]));
    }

    #[test]
    fn test_object_literal_member_access() {
        let expr = parse_expression("{ a: 1, }.a;");
        assert_eq!(expr.to_string(), "{ a: 1, }.a");
    }

    #[test]
    fn test_object_literal_requires_trailing_comma() {
        let err = parse("{ a: 1 };").unwrap_err();
        assert_eq!(err.error, ParseError::Expected(TokenKind::Comma));
    }

    #[test]
    fn test_declarations() {
        let program = parse("let x; let y = 2; const z = y;").unwrap();
        assert_eq!(
            program.0,
            vec![
                Statement::VarDeclaration {
                    name: "x".to_string(),
                    value: Expression::Identifier("null".to_string()),
                    constant: false,
                },
                Statement::VarDeclaration {
                    name: "y".to_string(),
                    value: Expression::Literal(Literal::Number(2)),
                    constant: false,
                },
                Statement::VarDeclaration {
                    name: "z".to_string(),
                    value: Expression::Identifier("y".to_string()),
                    constant: true,
                },
            ]
        );
    }

    #[test]
    fn test_const_requires_initializer() {
        let err = parse("const x;").unwrap_err();
        assert_eq!(
            err.error,
            ParseError::MissingConstInitializer("x".to_string())
        );
    }

    #[test]
    fn test_print_statement() {
        let program = parse("print(1 + 1);").unwrap();
        assert_eq!(program.to_string(), "print((+ 1 1));\n");
    }

    #[test]
    fn test_print_requires_parentheses() {
        let err = parse("print 1;").unwrap_err();
        assert_eq!(err.error, ParseError::Expected(TokenKind::LeftParen));
    }

    #[test]
    fn test_missing_close_paren() {
        let err = parse("(1 + 2;").unwrap_err();
        assert_eq!(err.error, ParseError::Expected(TokenKind::RightParen));
        assert_eq!(err.token.map(|t| t.kind), Some(TokenKind::Semicolon));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = parse("1 + 2").unwrap_err();
        assert_eq!(err.error, ParseError::Expected(TokenKind::Semicolon));
        assert_eq!(err.token.map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse("let x = ;").unwrap_err();
        assert_eq!(err.error, ParseError::Unexpected(TokenKind::Semicolon));
    }

    #[test]
    fn test_number_out_of_range() {
        let err = parse("99999999999999999999;").unwrap_err();
        assert_eq!(
            err.error,
            ParseError::NumberOutOfRange("99999999999999999999".to_string())
        );
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}1{};", "(".repeat(depth), ")".repeat(depth));

        let expr = parse_expression(&nested(MAX_EXPRESSION_DEPTH - 1));
        assert_eq!(expr, *number(1));

        let err = parse(&nested(20_000)).unwrap_err();
        assert_eq!(err.error, ParseError::TooDeep);

        let chain = format!("{}1;", "a = ".repeat(MAX_EXPRESSION_DEPTH + 1));
        assert_eq!(parse(&chain).unwrap_err().error, ParseError::TooDeep);
    }

    #[test]
    fn test_error_reports_context() {
        let err = parse("print(1").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("While parsing program > statement > print_statement"));
        assert!(message.contains("Expected \")\""));
    }
}
