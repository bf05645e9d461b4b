use criterion::{criterion_group, criterion_main, Criterion};
use sclc::{lexer, token::TokenKind};
use std::hint::black_box;

static INPUT: &str = include_str!("../data/sample.sc");

fn lex(input: &str, tokens: &mut Vec<sclc::token::Token>) {
    lexer::lex(input, tokens);
    let valid = tokens.iter().filter(|token| !token.kind.is_error()).count();
    black_box(valid);
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut tokens = Vec::with_capacity(lexer::SUGGESTED_TOKENS_CAPACITY);

    c.bench_function("lexer", |b| {
        b.iter(|| {
            tokens.clear();
            lex(black_box(INPUT), &mut tokens);
        });
    });
    c.bench_function("lexer_keywords", |b| {
        b.iter(|| {
            let tokens = lexer::lex_in_new(black_box(INPUT));
            let keywords = tokens
                .iter()
                .filter(|token| matches!(token.kind, TokenKind::Contract | TokenKind::Func))
                .count();
            black_box(keywords);
        });
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
