use xlower_core::{cumulative::*, ElemType, Graph, GraphTensor, ReduceOp, Shape, Tensor};

fn scan_1d(values: &[f32], exclusive: bool, reverse: bool) -> Vec<f32> {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(
        &graph,
        0,
        Shape::from_static(ElemType::F32, &[values.len()]),
        "x",
    );
    let out = build_cumsum(&x, 0, exclusive, reverse);
    assert_eq!(out.shape(), x.shape());
    let compiled = graph.compile(&out).unwrap();
    let input = Tensor::new(values, &[values.len()]).unwrap();
    compiled.run(&[input]).unwrap().to_vec::<f32>().unwrap()
}

#[test]
fn cumsum_variants() {
    let x = [1.0, 2.0, 3.0, 4.0];
    assert_eq!(scan_1d(&x, false, false), vec![1.0, 3.0, 6.0, 10.0]);
    assert_eq!(scan_1d(&x, true, false), vec![0.0, 1.0, 3.0, 6.0]);
    assert_eq!(scan_1d(&x, false, true), vec![10.0, 9.0, 7.0, 4.0]);
    assert_eq!(scan_1d(&x, true, true), vec![9.0, 7.0, 4.0, 0.0]);
}

#[test]
fn cumsum_of_single_element() {
    assert_eq!(scan_1d(&[5.0], false, false), vec![5.0]);
    assert_eq!(scan_1d(&[5.0], true, false), vec![0.0]);
    assert_eq!(scan_1d(&[5.0], true, true), vec![0.0]);
}

#[test]
fn cumprod_along_inner_axis() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::I32, &[2, 3]), "x");
    let inclusive = build_cumprod(&x, 1, false, false);
    let exclusive = build_cumprod(&x, 1, true, false);
    let input = Tensor::new(&[1i32, 2, 3, 4, 5, 6], &[2, 3]).unwrap();

    let res = graph.compile(&inclusive).unwrap().run(&[input.clone()]).unwrap();
    assert_eq!(res.dims(), &[2, 3]);
    assert_eq!(res.to_vec::<i32>().unwrap(), vec![1, 2, 6, 4, 20, 120]);
    let res = graph.compile(&exclusive).unwrap().run(&[input]).unwrap();
    assert_eq!(res.to_vec::<i32>().unwrap(), vec![1, 1, 2, 1, 4, 20]);
}

#[test]
fn cumsum_along_outer_axis_reversed() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F64, &[3, 2]), "x");
    let out = build_cumsum(&x, 0, false, true);
    let input = Tensor::new(&[1.0f64, 10.0, 2.0, 20.0, 3.0, 30.0], &[3, 2]).unwrap();
    let res = graph.compile(&out).unwrap().run(&[input]).unwrap();
    assert_eq!(
        res.to_vec::<f64>().unwrap(),
        vec![6.0, 60.0, 5.0, 50.0, 3.0, 30.0]
    );
}

#[test]
fn cummax_and_cummin() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F32, &[5]), "x");
    let max = build_cummax(&x, 0, false, false);
    let min = build_cummin(&x, 0, false, true);
    let max_excl = build_cummax(&x, 0, true, false);
    let input = Tensor::new(&[2.0f32, 1.0, 4.0, 3.0, 5.0], &[5]).unwrap();
    let run = |out: &GraphTensor| {
        graph
            .compile(out)
            .unwrap()
            .run(&[input.clone()])
            .unwrap()
            .to_vec::<f32>()
            .unwrap()
    };
    assert_eq!(run(&max), vec![2.0, 2.0, 4.0, 4.0, 5.0]);
    assert_eq!(run(&min), vec![1.0, 1.0, 3.0, 3.0, 5.0]);
    assert_eq!(
        run(&max_excl),
        vec![f32::NEG_INFINITY, 2.0, 2.0, 4.0, 4.0]
    );
}

#[test]
fn generic_scan_with_custom_identity() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::Pred, &[4]), "x");
    let init = GraphTensor::one(&graph, ElemType::Pred);
    let out = build_cumulative_computation(&x, 0, ReduceOp::All, &init, false, false);
    let input = Tensor::new(&[true, true, false, true], &[4]).unwrap();
    let res = graph.compile(&out).unwrap().run(&[input]).unwrap();
    assert_eq!(res.to_vec::<bool>().unwrap(), vec![true, true, false, false]);
}

#[test]
fn scan_keeps_dynamic_outer_axis() {
    let graph = Graph::empty();
    let x = GraphTensor::dynamic_parameter(&graph, 0, ElemType::F32, &[None, Some(3)], "x");
    let out = build_cumsum(&x, 1, true, false);
    assert!(out.dim(0).is_dynamic());
    let compiled = graph.compile(&out).unwrap();
    let input = Tensor::new(&[1.0f32, 1.0, 1.0, 2.0, 2.0, 2.0], &[2, 3]).unwrap();
    let res = compiled.run(&[input]).unwrap();
    assert_eq!(res.dims(), &[2, 3]);
    assert_eq!(
        res.to_vec::<f32>().unwrap(),
        vec![0.0, 1.0, 2.0, 0.0, 2.0, 4.0]
    );
}

#[test]
fn scan_of_empty_axis_is_empty() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::F32, &[2, 0]), "x");
    let out = build_cumsum(&x, 1, false, false);
    let res = graph
        .compile(&out)
        .unwrap()
        .run(&[Tensor::new::<f32>(&[], &[2, 0]).unwrap()])
        .unwrap();
    assert_eq!(res.dims(), &[2, 0]);
}

#[test]
fn scans_of_large_s64_values_are_exact() {
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::I64, &[3]), "x");
    let sum = build_cumsum(&x, 0, false, false);
    let max = build_cummax(&x, 0, false, false);
    let big = 1i64 << 53;
    let input = Tensor::new(&[big, 1, i64::MIN], &[3]).unwrap();

    let res = graph.compile(&sum).unwrap().run(&[input.clone()]).unwrap();
    assert_eq!(
        res.to_vec::<i64>().unwrap(),
        vec![big, big + 1, (big + 1).wrapping_add(i64::MIN)]
    );
    let res = graph.compile(&max).unwrap().run(&[input]).unwrap();
    assert_eq!(res.to_vec::<i64>().unwrap(), vec![big, big, big]);
}
