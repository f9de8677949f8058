use xlower_core::{loss::*, ElemType, Graph, GraphTensor, Shape, Tensor};

struct Fixture {
    graph: Graph,
    input: GraphTensor,
    target: GraphTensor,
    args: Vec<Tensor>,
}

fn fixture(input: &[f64], target: &[f64]) -> Fixture {
    let graph = Graph::empty();
    let shape = Shape::from_static(ElemType::F64, &[input.len()]);
    let x = GraphTensor::parameter(&graph, 0, shape.clone(), "input");
    let t = GraphTensor::parameter(&graph, 1, shape, "target");
    Fixture {
        graph,
        input: x,
        target: t,
        args: vec![
            Tensor::new(input, &[input.len()]).unwrap(),
            Tensor::new(target, &[target.len()]).unwrap(),
        ],
    }
}

impl Fixture {
    fn run(&self, out: &GraphTensor, extra: &[Tensor]) -> Vec<f64> {
        let mut args = self.args.clone();
        args.extend_from_slice(extra);
        self.graph
            .compile(out)
            .unwrap()
            .run(&args)
            .unwrap()
            .to_vec::<f64>()
            .unwrap()
    }

    fn scalar(&self, value: f64) -> GraphTensor {
        GraphTensor::constant(&self.graph, value, ElemType::F64)
    }
}

fn assert_close(got: &[f64], expected: &[f64]) {
    assert_eq!(got.len(), expected.len(), "{got:?} vs {expected:?}");
    for (g, e) in got.iter().zip(expected) {
        assert!((g - e).abs() <= 1e-12 * e.abs().max(1.0), "{got:?} vs {expected:?}");
    }
}

#[test]
fn reduction_mode_parsing() {
    assert_eq!("mean".parse::<ReductionMode>().unwrap(), ReductionMode::Mean);
    assert_eq!(ReductionMode::try_from(0).unwrap(), ReductionMode::None);
    assert_eq!(ReductionMode::try_from(2).unwrap(), ReductionMode::Sum);
    assert!(ReductionMode::try_from(3).is_err());
    assert!("avg".parse::<ReductionMode>().is_err());
    assert_eq!(ReductionMode::default().to_string(), "mean");
}

#[test]
fn binary_cross_entropy_forward() {
    let f = fixture(&[0.5, 0.25, 0.9], &[1.0, 0.0, 1.0]);
    let expected = [-(0.5f64.ln()), -(0.75f64.ln()), -(0.9f64.ln())];
    let none = build_binary_cross_entropy(&f.input, &f.target, None, ReductionMode::None);
    let sum = build_binary_cross_entropy(&f.input, &f.target, None, ReductionMode::Sum);
    let mean = build_binary_cross_entropy(&f.input, &f.target, None, ReductionMode::Mean);
    assert_close(&f.run(&none, &[]), &expected);
    let total: f64 = expected.iter().sum();
    assert_close(&f.run(&sum, &[]), &[total]);
    assert_close(&f.run(&mean, &[]), &[total / 3.0]);
}

#[test]
fn binary_cross_entropy_with_weight() {
    let f = fixture(&[0.5, 0.25], &[1.0, 0.0]);
    let w = GraphTensor::parameter(&f.graph, 2, Shape::from_static(ElemType::F64, &[2]), "w");
    let out = build_binary_cross_entropy(&f.input, &f.target, Some(&w), ReductionMode::None);
    let weight = Tensor::new(&[2.0f64, 0.0], &[2]).unwrap();
    assert_close(&f.run(&out, &[weight]), &[-2.0 * 0.5f64.ln(), 0.0]);
}

#[test]
fn binary_cross_entropy_backward() {
    let x = [0.5, 0.25, 0.8];
    let t = [1.0, 0.0, 1.0];
    let f = fixture(&x, &t);
    let elementwise: Vec<f64> = x
        .iter()
        .zip(&t)
        .map(|(x, t)| (x - t) / x / (1.0 - x))
        .collect();

    let grad = GraphTensor::parameter(&f.graph, 2, Shape::from_static(ElemType::F64, &[3]), "g");
    let none = build_binary_cross_entropy_backward(&grad, &f.input, &f.target, None, ReductionMode::None);
    let g = Tensor::new(&[1.0f64, 2.0, 3.0], &[3]).unwrap();
    let expected: Vec<f64> = elementwise.iter().zip([1.0, 2.0, 3.0]).map(|(e, g)| e * g).collect();
    assert_close(&f.run(&none, &[g]), &expected);

    let f = fixture(&x, &t);
    let g = f.scalar(3.0);
    let mean = build_binary_cross_entropy_backward(&g, &f.input, &f.target, None, ReductionMode::Mean);
    let sum = build_binary_cross_entropy_backward(&g, &f.input, &f.target, None, ReductionMode::Sum);
    let expected_sum: Vec<f64> = elementwise.iter().map(|e| e * 3.0).collect();
    let expected_mean: Vec<f64> = elementwise.iter().map(|e| e * 3.0 / 3.0).collect();
    assert_close(&f.run(&sum, &[]), &expected_sum);
    assert_close(&f.run(&mean, &[]), &expected_mean);
}

#[test]
fn l1_loss_forward() {
    let f = fixture(&[1.0, 2.0, 3.0, -1.0], &[2.0, 2.0, 1.0, 1.0]);
    let none = build_l1_loss(&f.input, &f.target, ReductionMode::None);
    let sum = build_l1_loss(&f.input, &f.target, ReductionMode::Sum);
    let mean = build_l1_loss(&f.input, &f.target, ReductionMode::Mean);
    assert_eq!(f.run(&none, &[]), vec![1.0, 0.0, 2.0, 2.0]);
    assert_eq!(f.run(&sum, &[]), vec![5.0]);
    assert_eq!(f.run(&mean, &[]), vec![1.25]);
}

#[test]
fn l1_loss_backward_ties_are_positive() {
    let f = fixture(&[1.0, 2.0, 3.0], &[2.0, 2.0, 1.0]);
    let grad = GraphTensor::parameter(&f.graph, 2, Shape::from_static(ElemType::F64, &[3]), "g");
    let none = build_l1_loss_backward(&grad, &f.input, &f.target, ReductionMode::None);
    let g = Tensor::new(&[0.5f64, 0.5, 2.0], &[3]).unwrap();
    assert_eq!(f.run(&none, &[g]), vec![-0.5, 0.5, 2.0]);

    let f = fixture(&[1.0, 2.0, 3.0], &[2.0, 2.0, 1.0]);
    let g = f.scalar(6.0);
    let mean = build_l1_loss_backward(&g, &f.input, &f.target, ReductionMode::Mean);
    let sum = build_l1_loss_backward(&g, &f.input, &f.target, ReductionMode::Sum);
    assert_close(&f.run(&mean, &[]), &[-2.0, 2.0, 2.0]);
    assert_eq!(f.run(&sum, &[]), vec![-6.0, 6.0, 6.0]);
}

#[test]
fn mse_loss_forward() {
    let f = fixture(&[1.0, 2.0, 4.0, 0.0], &[0.0, 2.0, 1.0, 2.0]);
    let none = build_mse_loss(&f.input, &f.target, ReductionMode::None);
    let sum = build_mse_loss(&f.input, &f.target, ReductionMode::Sum);
    let mean = build_mse_loss(&f.input, &f.target, ReductionMode::Mean);
    assert_eq!(f.run(&none, &[]), vec![1.0, 0.0, 9.0, 4.0]);
    assert_eq!(f.run(&sum, &[]), vec![14.0]);
    assert_eq!(f.run(&mean, &[]), vec![3.5]);
}

#[test]
fn mse_loss_mean_of_empty_input_is_nan() {
    let f = fixture(&[], &[]);
    let mean = build_mse_loss(&f.input, &f.target, ReductionMode::Mean);
    assert_eq!(f.graph.compile(&mean).unwrap().num_parameters(), 2);
    let res = f.run(&mean, &[]);
    assert_eq!(res.len(), 1);
    assert!(res[0].is_nan());
}

#[test]
fn mse_loss_backward() {
    let f = fixture(&[1.0, 2.0, 4.0, 0.0], &[0.0, 2.0, 1.0, 2.0]);
    let g = f.scalar(2.0);
    let none = build_mse_loss_backward(&g, &f.input, &f.target, ReductionMode::None);
    let mean = build_mse_loss_backward(&g, &f.input, &f.target, ReductionMode::Mean);
    assert_eq!(f.run(&none, &[]), vec![4.0, 0.0, 12.0, -8.0]);
    assert_eq!(f.run(&mean, &[]), vec![1.0, 0.0, 3.0, -2.0]);
}

#[test]
fn mse_loss_over_dynamic_input() {
    let graph = Graph::empty();
    let x = GraphTensor::dynamic_parameter(&graph, 0, ElemType::F32, &[None], "input");
    let t = GraphTensor::dynamic_parameter(&graph, 1, ElemType::F32, &[None], "target");
    let mean = build_mse_loss(&x, &t, ReductionMode::Mean);
    let compiled = graph.compile(&mean).unwrap();
    let input = Tensor::new(&[1.0f32, 3.0], &[2]).unwrap();
    let target = Tensor::new(&[0.0f32, 0.0], &[2]).unwrap();
    let res = compiled.run(&[input, target]).unwrap();
    assert_eq!(res.to_scalar::<f32>().unwrap(), 5.0);

    let empty = Tensor::new::<f32>(&[], &[0]).unwrap();
    let res = compiled.run(&[empty.clone(), empty]).unwrap();
    assert!(res.to_scalar::<f32>().unwrap().is_nan());
}
