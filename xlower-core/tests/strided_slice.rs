use xlower_core::{
    strided_slice::{build_strided_slice, compute_indexing_bounds_and_strides},
    ElemType, Error, Graph, GraphTensor, Shape, SliceMasks, Tensor,
};

fn slice_values(
    dims: &[usize],
    begin: &[i64],
    end: &[i64],
    strides: &[i64],
    masks: SliceMasks,
) -> (Vec<usize>, Vec<i32>) {
    let spec = compute_indexing_bounds_and_strides(dims, begin, end, strides, masks).unwrap();
    let graph = Graph::empty();
    let x = GraphTensor::parameter(&graph, 0, Shape::from_static(ElemType::I32, dims), "x");
    let out = build_strided_slice(&x, &spec);
    let n: usize = dims.iter().product();
    let data: Vec<i32> = (0..n as i32).collect();
    let res = graph
        .compile(&out)
        .unwrap()
        .run(&[Tensor::new(&data, dims).unwrap()])
        .unwrap();
    assert_eq!(res.dims(), spec.final_sizes.as_slice());
    (res.dims().to_vec(), res.to_vec::<i32>().unwrap())
}

#[test]
fn simple_strided_range() {
    let spec =
        compute_indexing_bounds_and_strides(&[10], &[2], &[8], &[2], SliceMasks::default()).unwrap();
    assert_eq!(spec.begin, vec![2]);
    assert_eq!(spec.end, vec![8]);
    assert_eq!(spec.strides, vec![2]);
    assert_eq!(spec.processing_sizes, vec![3]);
    assert_eq!(spec.final_sizes, vec![3]);

    let (_, values) = slice_values(&[10], &[2], &[8], &[2], SliceMasks::default());
    assert_eq!(values, vec![2, 4, 6]);
}

#[test]
fn uneven_stride_rounds_up() {
    let (dims, values) = slice_values(&[10], &[1], &[8], &[3], SliceMasks::default());
    assert_eq!(dims, vec![3]);
    assert_eq!(values, vec![1, 4, 7]);
}

#[test]
fn negative_indices_wrap() {
    let masks = SliceMasks {
        end: 1,
        ..Default::default()
    };
    let (_, values) = slice_values(&[10], &[-3], &[0], &[1], masks);
    assert_eq!(values, vec![7, 8, 9]);

    let (_, values) = slice_values(&[10], &[-4], &[-1], &[1], SliceMasks::default());
    assert_eq!(values, vec![6, 7, 8]);
}

#[test]
fn out_of_range_bounds_clamp() {
    let spec =
        compute_indexing_bounds_and_strides(&[5], &[-20], &[20], &[1], SliceMasks::default())
            .unwrap();
    assert_eq!((spec.begin[0], spec.end[0]), (0, 5));
    assert_eq!(spec.processing_sizes, vec![5]);
}

#[test]
fn negative_stride_reverses() {
    let masks = SliceMasks {
        begin: 1,
        end: 1,
        ..Default::default()
    };
    let spec = compute_indexing_bounds_and_strides(&[5], &[0], &[0], &[-1], masks).unwrap();
    assert_eq!((spec.begin[0], spec.end[0]), (4, -1));
    assert_eq!(spec.processing_sizes, vec![5]);
    let (_, values) = slice_values(&[5], &[0], &[0], &[-1], masks);
    assert_eq!(values, vec![4, 3, 2, 1, 0]);

    let (_, values) = slice_values(&[10], &[8], &[1], &[-3], SliceMasks::default());
    assert_eq!(values, vec![8, 5, 2]);
}

#[test]
fn empty_when_direction_disagrees() {
    let spec =
        compute_indexing_bounds_and_strides(&[10], &[6], &[2], &[1], SliceMasks::default())
            .unwrap();
    assert_eq!(spec.processing_sizes, vec![0]);
    let (dims, values) = slice_values(&[10], &[6], &[2], &[1], SliceMasks::default());
    assert_eq!(dims, vec![0]);
    assert!(values.is_empty());
}

#[test]
fn shrink_axis_drops_dimension() {
    let masks = SliceMasks {
        shrink_axis: 1,
        ..Default::default()
    };
    let spec =
        compute_indexing_bounds_and_strides(&[3, 4], &[-1], &[0], &[1], masks).unwrap();
    assert_eq!(spec.processing_sizes, vec![1, 4]);
    assert_eq!(spec.final_sizes, vec![4]);
    assert_eq!((spec.begin[0], spec.end[0]), (2, 3));

    let (dims, values) = slice_values(&[3, 4], &[-1], &[0], &[1], masks);
    assert_eq!(dims, vec![4]);
    assert_eq!(values, vec![8, 9, 10, 11]);
}

#[test]
fn implicit_ellipsis_covers_trailing_axes() {
    let (dims, values) = slice_values(&[2, 3], &[1], &[2], &[1], SliceMasks::default());
    assert_eq!(dims, vec![1, 3]);
    assert_eq!(values, vec![3, 4, 5]);
}

#[test]
fn ellipsis_and_new_axis() {
    // x[..., newaxis, 1:3]
    let masks = SliceMasks {
        ellipsis: 0b001,
        new_axis: 0b010,
        ..Default::default()
    };
    let spec = compute_indexing_bounds_and_strides(
        &[2, 3, 4],
        &[0, 0, 1],
        &[0, 0, 3],
        &[1, 1, 1],
        masks,
    )
    .unwrap();
    assert_eq!(spec.processing_sizes, vec![2, 3, 2]);
    assert_eq!(spec.final_sizes, vec![2, 3, 1, 2]);

    let (_, values) = slice_values(&[2, 3, 4], &[0, 0, 1], &[0, 0, 3], &[1, 1, 1], masks);
    assert_eq!(&values[..4], &[1, 2, 5, 6]);
}

#[test]
fn leading_new_axis() {
    let masks = SliceMasks {
        new_axis: 1,
        ..Default::default()
    };
    let spec = compute_indexing_bounds_and_strides(&[2], &[0], &[0], &[1], masks).unwrap();
    assert_eq!(spec.processing_sizes, vec![2]);
    assert_eq!(spec.final_sizes, vec![1, 2]);
}

#[test]
fn ellipsis_takes_precedence_over_new_axis() {
    let masks = SliceMasks {
        ellipsis: 1,
        new_axis: 1,
        ..Default::default()
    };
    let spec = compute_indexing_bounds_and_strides(&[2, 3], &[0], &[0], &[1], masks).unwrap();
    assert_eq!(spec.final_sizes, vec![2, 3]);
}

#[test]
fn zero_stride_is_rejected() {
    let err = compute_indexing_bounds_and_strides(&[4, 4], &[0, 0], &[4, 4], &[1, 0], SliceMasks::default())
        .unwrap_err();
    assert!(matches!(err, Error::ZeroStride { axis: 1 }), "{err}");
}

#[test]
fn invalid_specs_are_rejected() {
    let err = compute_indexing_bounds_and_strides(&[4], &[0], &[4, 4], &[1], SliceMasks::default())
        .unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");

    let masks = SliceMasks {
        ellipsis: 0b11,
        ..Default::default()
    };
    let err = compute_indexing_bounds_and_strides(&[4, 4], &[0, 0], &[0, 0], &[1, 1], masks)
        .unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");

    let err = compute_indexing_bounds_and_strides(&[4], &[0, 0], &[1, 1], &[1, 1], SliceMasks::default())
        .unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");

    let masks = SliceMasks {
        shrink_axis: 1,
        ..Default::default()
    };
    let err = compute_indexing_bounds_and_strides(&[4], &[4], &[5], &[1], masks).unwrap_err();
    assert!(
        matches!(err, Error::SliceIndexOutOfBounds { axis: 0, index: 4, dim: 4 }),
        "{err}"
    );
}

#[test]
fn mask_bits_past_the_entries_are_rejected() {
    let masks = SliceMasks {
        ellipsis: 0b100,
        ..Default::default()
    };
    let err = compute_indexing_bounds_and_strides(&[4, 5], &[1], &[3], &[1], masks).unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");

    let masks = SliceMasks {
        shrink_axis: 0b10,
        ..Default::default()
    };
    let err = compute_indexing_bounds_and_strides(&[4, 5], &[1], &[3], &[1], masks).unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");
}

#[test]
fn thirty_two_entries_fit_the_masks() {
    let dims = [1usize; 32];
    let ones = [1i64; 32];
    let masks = SliceMasks {
        begin: -1,
        shrink_axis: i32::MIN,
        ..Default::default()
    };
    let spec = compute_indexing_bounds_and_strides(&dims, &[0; 32], &ones, &ones, masks).unwrap();
    assert_eq!(spec.processing_sizes, vec![1; 32]);
    assert_eq!(spec.final_sizes, vec![1; 31]);

    let dims = [1usize; 33];
    let ones = [1i64; 33];
    let err = compute_indexing_bounds_and_strides(&dims, &[0; 33], &ones, &ones, SliceMasks::default())
        .unwrap_err();
    assert!(matches!(err, Error::SliceSpec(_)), "{err}");
}
