mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pyxlate::lattice::{TID_OBJECT, TypeLattice};
use pyxlate::{TranspileOptions, Transpiler, transpile_source};

fn bench_transpiler(c: &mut Criterion) {
    for (label, path) in common::workloads() {
        let program = common::load_program(&path);
        let source = common::load_source(&path);

        c.bench_function(&format!("transpiler_lower_only_{label}"), |b| {
            let transpiler = Transpiler::new(TranspileOptions::default());
            b.iter(|| {
                let output = transpiler.transpile(black_box(&program)).expect("transpile");
                black_box(output);
            })
        });

        c.bench_function(&format!("transpiler_total_{label}"), |b| {
            let options = TranspileOptions::default();
            b.iter(|| {
                let output = transpile_source(black_box(&source), &options).expect("transpile");
                black_box(output);
            })
        });
    }
}

fn bench_lattice(c: &mut Criterion) {
    c.bench_function("lattice_register_chain_200", |b| {
        b.iter(|| {
            let mut lattice = TypeLattice::new();
            let mut base = TID_OBJECT;
            for _ in 0..200 {
                base = lattice.register(Some(base)).expect("register");
            }
            black_box(base);
        })
    });

    let mut lattice = TypeLattice::new();
    let mut ids = Vec::new();
    let mut base = TID_OBJECT;
    for _ in 0..200 {
        base = lattice.register(Some(base)).expect("register");
        ids.push(base);
    }
    c.bench_function("lattice_is_subtype", |b| {
        b.iter(|| {
            let hits = ids
                .iter()
                .filter(|&&id| lattice.is_subtype(black_box(id), ids[100]))
                .count();
            black_box(hits);
        })
    });
}

criterion_group!(benches, bench_transpiler, bench_lattice);
criterion_main!(benches);
