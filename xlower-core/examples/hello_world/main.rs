use xlower_core::{
    loss::{build_mse_loss, build_mse_loss_backward, ReductionMode},
    reduction::build_std_deviation,
    ElemType, Graph, GraphTensor, Shape, Tensor,
};

fn main() {
    let graph = Graph::empty();
    let shape = Shape::from_static(ElemType::F32, &[3, 4]);
    let x = GraphTensor::parameter(&graph, 0, shape.clone(), "input");
    let t = GraphTensor::parameter(&graph, 1, shape, "target");

    let loss = build_mse_loss(&x, &t, ReductionMode::Mean);
    let one = GraphTensor::one(&graph, ElemType::F32);
    let grad = build_mse_loss_backward(&one, &x, &t, ReductionMode::Mean);
    let std = build_std_deviation(&grad, &[1], false, true);

    graph.visualize("graph.png").unwrap();

    let input = Tensor::new(&(0..12).map(|v| v as f32).collect::<Vec<_>>(), &[3, 4]).unwrap();
    let target = Tensor::ones::<f32>(&[3, 4]);
    let args = [input, target];

    let loss = graph.compile(&loss).unwrap().run(&args).unwrap();
    let std = graph.compile(&std).unwrap().run(&args).unwrap();
    dbg!(loss.to_scalar::<f32>().unwrap());
    dbg!(std.to_vec::<f32>().unwrap());
}
