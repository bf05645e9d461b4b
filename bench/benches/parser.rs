use criterion::{criterion_group, criterion_main, Criterion};
use sclc::{
    lexer::SUGGESTED_TOKENS_CAPACITY, options::Options, parser::parse_program, token::Token,
    util::intern::Interner,
};
use std::hint::black_box;

static INPUT: &str = include_str!("../data/sample.sc");

fn parser(input: &str, tokens: &mut Vec<Token>, idents: &mut Interner<str>) {
    let ast = parse_program(input, tokens, idents).unwrap();
    _ = black_box(ast);
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY * 2);
    let mut idents = Interner::with_capacity(256);

    c.bench_function("parser", |b| {
        b.iter(|| {
            tokens.clear();
            parser(black_box(INPUT), &mut tokens, &mut idents);
        });
    });
    c.bench_function("compile", |b| {
        let options = Options::default();
        b.iter(|| black_box(sclc::compile(black_box(INPUT), &options).unwrap()));
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
