use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use xlower_core::{
    cumulative::build_cumsum, reduction::build_logsumexp, ElemType, Graph, GraphTensor, Shape,
    Tensor,
};

fn random_input(n: usize) -> Tensor {
    let mut rng = StdRng::seed_from_u64(0);
    let data: Vec<f32> = (0..n * n).map(|_| rng.random_range(-1.0..1.0)).collect();
    Tensor::new(&data, &[n, n]).unwrap()
}

fn bench_logsumexp(c: &mut Criterion, n: usize) {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F32, &[n, n]), "x");
    let out = build_logsumexp(&x, &[1], false);
    let compiled = graph.compile(&out).unwrap();
    let input = [random_input(n)];
    c.bench_function(&format!("cpu_logsumexp_{n}x{n}"), |bencher| {
        bencher.iter(|| compiled.run(&input).unwrap());
    });
}

fn bench_cumsum(c: &mut Criterion, n: usize) {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F32, &[n, n]), "x");
    let out = build_cumsum(&x, 1, true, false);
    let compiled = graph.compile(&out).unwrap();
    let input = [random_input(n)];
    c.bench_function(&format!("cpu_cumsum_{n}x{n}"), |bencher| {
        bencher.iter(|| compiled.run(&input).unwrap());
    });
}

fn bench_graph_building(c: &mut Criterion) {
    c.bench_function("build_logsumexp_graph", |bencher| {
        bencher.iter(|| {
            let graph = Graph::empty();
            let x = GraphTensor::parameter(
                &graph,
                0,
                Shape::from_static(ElemType::F32, &[64, 64]),
                "x",
            );
            build_logsumexp(&x, &[0, 1], true)
        });
    });
}

fn bench_logsumexp_sizes(c: &mut Criterion) {
    bench_logsumexp(c, 64);
    bench_logsumexp(c, 256);
}

fn bench_cumsum_sizes(c: &mut Criterion) {
    bench_cumsum(c, 64);
    bench_cumsum(c, 128);
}

criterion_group!(
    benches,
    bench_logsumexp_sizes,
    bench_cumsum_sizes,
    bench_graph_building
);
criterion_main!(benches);
