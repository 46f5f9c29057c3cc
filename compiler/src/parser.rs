// Parser for fusion description (.fus) files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Grammar:
//   program    = nl* (statement (nl+ statement)*)? nl*
//   statement  = set_stmt | tensor_stmt | fuse_stmt
//   set_stmt   = 'set' IDENT '=' (INT | IDENT)
//   tensor_stmt= 'tensor' IDENT '{' nl* (axis_decl (nl+ axis_decl)*)? nl* '}'
//   axis_decl  = ('bcast' | 'reduce')? IDENT '=' expr ('@' IDENT)?
//   fuse_stmt  = 'fuse' IDENT (',' IDENT)+
//   expr       = product (('+' | '-') product)*
//   product    = atom (('*' | '/') atom)*
//   atom       = INT | LAUNCH_DIM | 'extent' '(' IDENT ')'
//              | 'ceildiv' '(' expr ',' expr ')' | IDENT | '(' expr ')'
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::expr::BinOp;
use crate::lexer::Token;
use crate::parallel::ParallelAxis;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a fusion description. Lexes then parses.
///
/// Returns an AST (if parsing succeeded) plus any errors.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Size expression ──

    let expr = recursive(|expr| {
        let literal = select! {
            Token::Int(n) = e => Expr::Int(n, e.span()),
            Token::LaunchDim(pt) = e => Expr::Launch(pt, e.span()),
        };

        let extent = just(Token::Extent)
            .ignore_then(
                ident
                    .clone()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map(Expr::Extent);

        let ceildiv = just(Token::CeilDiv)
            .ignore_then(
                expr.clone()
                    .then_ignore(just(Token::Comma))
                    .then(expr.clone())
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(lhs, rhs), e| Expr::Binary {
                op: BinOp::CeilDiv,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span: e.span(),
            });

        let symbol = ident.clone().map(Expr::Symbol);

        let parenthesized = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((literal, extent, ceildiv, symbol, parenthesized));

        let fold_binary = |lhs: Expr, (op, rhs): (BinOp, Expr)| {
            let span: SimpleSpan = (lhs.span().start()..rhs.span().end()).into();
            Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            }
        };

        let mul_op = select! {
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
        };
        let product = atom
            .clone()
            .foldl(mul_op.then(atom).repeated(), fold_binary);

        let add_op = select! {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
        };
        product
            .clone()
            .foldl(add_op.then(product).repeated(), fold_binary)
    });

    // ── Parallel axis binding: '@' (BIDx | ... | TIDz) ──

    let parallel_axis = just(Token::Ident)
        .map_with(move |_, e| {
            let span: SimpleSpan = e.span();
            source[span.start()..span.end()].to_string()
        })
        .try_map(|name, span| match name.parse::<ParallelAxis>() {
            Ok(pt) => Ok((pt, span)),
            Err(msg) => Err(Rich::custom(span, msg)),
        });

    // ── Axis declaration ──

    let axis_kind = select! {
        Token::Bcast => AxisKindAst::Broadcast,
        Token::Reduce => AxisKindAst::Reduction,
    };

    let axis_decl = axis_kind
        .or_not()
        .then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr)
        .then(just(Token::At).ignore_then(parallel_axis).or_not())
        .map_with(|(((kind, name), extent), parallel), e| AxisDecl {
            kind,
            name,
            extent,
            parallel,
            span: e.span(),
        });

    let tensor_body = nl
        .clone()
        .ignore_then(
            axis_decl
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl.clone());

    // ── Statements ──

    let set_value = select! {
        Token::Int(n) = e => SetValue::Number(n, e.span()),
    }
    .or(ident.clone().map(SetValue::Ident));

    let set_stmt = just(Token::Set)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(set_value)
        .map(|(name, value)| StatementKind::Set(SetStmt { name, value }));

    let tensor_stmt = just(Token::Tensor)
        .ignore_then(ident.clone())
        .then(tensor_body.delimited_by(just(Token::LBrace), just(Token::RBrace)))
        .map(|(name, axes)| StatementKind::Tensor(TensorStmt { name, axes }));

    let fuse_stmt = just(Token::Fuse)
        .ignore_then(
            ident
                .clone()
                .separated_by(just(Token::Comma))
                .at_least(2)
                .collect::<Vec<_>>(),
        )
        .map(|axes| StatementKind::Fuse(FuseStmt { axes }));

    let statement = choice((set_stmt, tensor_stmt, fuse_stmt)).map_with(|kind, e| Statement {
        kind,
        span: e.span(),
    });

    // ── Program ──

    nl.clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |statements, e| Program {
            statements,
            span: e.span(),
        })
}

// ── Tests ──
