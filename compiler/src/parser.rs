// Parser for textual lowered-IR (.lir) files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Grammar:
//   program  := NL* (stmt (NL+ stmt)*)? NL*
//   stmt     := (IDENT '=')? IDENT attrs? '(' operands? ')'
//   attrs    := '[' attr (',' attr)* ']'
//   attr     := IDENT '=' value
//   value    := INT | FLOAT | IDENT | '?' | '[' (dim (',' dim)*)? ']'
//   dim      := INT | '?'
//   operands := IDENT (',' IDENT)*
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics; parsing continues.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a lowered-IR source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

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

/// Split `name.N` into (`name`, N). Names whose suffix is not a number stay whole.
fn split_port_suffix(ident: Ident) -> Operand {
    if let Some((base, suffix)) = ident.name.rsplit_once('.') {
        if let Ok(port) = suffix.parse::<usize>() {
            if !base.is_empty() {
                return Operand {
                    name: Ident {
                        name: base.to_string(),
                        span: ident.span,
                    },
                    port,
                };
            }
        }
    }
    Operand {
        name: ident,
        port: 0,
    }
}

// ── Main parser builder ──
//
// All rules are built inside `program_parser` so the `source` reference is
// captured once and shared by every combinator.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Dims literal ──

    let dim = select! {
        Token::Int(n) = e => Dim::Fixed(n, e.span()),
        Token::Question = e => Dim::Dynamic(e.span()),
    };

    let dims = dim
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .map_with(|dims, e| AttrValue::Dims(dims, e.span()));

    // ── Attribute value ──

    let value = select! {
        Token::Int(n) = e => AttrValue::Int(n, e.span()),
        Token::Float(v) = e => AttrValue::Float(v, e.span()),
        Token::Question = e => AttrValue::Dynamic(e.span()),
    }
    .or(dims)
    .or(ident.clone().map(AttrValue::Ident));

    let attr = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .then(value)
        .map(|(name, value)| Attr { name, value });

    let attrs = attr
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket));

    // ── Operands ──

    let operands = ident
        .clone()
        .map(split_port_suffix)
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ── Statement ──

    let statement = ident
        .clone()
        .then_ignore(just(Token::Equals))
        .or_not()
        .then(ident)
        .then(attrs.or_not())
        .then(operands)
        .map_with(|(((result, op), attrs), operands), e| Statement {
            result,
            op,
            attrs: attrs.unwrap_or_default(),
            operands,
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
