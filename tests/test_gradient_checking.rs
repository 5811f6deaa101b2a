// Numerical gradient checks using central finite differences.
//
// Every check uses the scalar objective L = Σ output ⊙ R for a fixed random
// tensor R, so dL/d(output) = R is fed to backward and the analytic gradients
// can be compared against (L(x + h) - L(x - h)) / 2h.

use approx::assert_relative_eq;
use rust_cnn::layers::{ActivationLayer, Conv2DLayer, DenseLayer, Propagate};
use rust_cnn::utils::activations::softmax_jacobian;
use rust_cnn::utils::{ActivationKind, SimpleRng};
use rust_cnn::NDArray;

const H: f32 = 1e-2;

fn random_tensor(shape: &[usize], rng: &mut SimpleRng) -> NDArray {
    let len = shape.iter().product();
    let data = (0..len).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect();
    NDArray::from_vec(shape, data).unwrap()
}

fn objective<L: Propagate>(layer: &mut L, input: &NDArray, output_shape: &[usize], r: &NDArray) -> f32 {
    let mut output = NDArray::zeros(output_shape);
    layer.forward(input, &mut output).unwrap();
    output.data().iter().zip(r.data()).map(|(o, r)| o * r).sum()
}

fn numeric_input_gradient<L: Propagate>(
    layer: &mut L,
    input: &NDArray,
    output_shape: &[usize],
    r: &NDArray,
    index: usize,
    h: f32,
) -> f32 {
    let mut plus = input.clone();
    plus.data_mut()[index] += h;
    let mut minus = input.clone();
    minus.data_mut()[index] -= h;
    (objective(layer, &plus, output_shape, r) - objective(layer, &minus, output_shape, r)) / (2.0 * h)
}

// ============================================================================
// Dense layer
// ============================================================================

mod dense_gradient_tests {
    use super::*;

    fn setup() -> (DenseLayer, NDArray, NDArray, Vec<usize>) {
        let mut rng = SimpleRng::new(11);
        let mut layer = DenseLayer::new(3, None);
        layer.resolve(&[4], &mut rng).unwrap();
        layer.bind(2).unwrap();
        let input = random_tensor(&[2, 4], &mut rng);
        let r = random_tensor(&[2, 3], &mut rng);
        (layer, input, r, vec![2, 3])
    }

    #[test]
    fn test_dense_weight_gradient() {
        let (mut layer, input, r, out_shape) = setup();
        let mut output = NDArray::zeros(&out_shape);
        let mut grad_input = NDArray::zeros(&[2, 4]);
        layer.forward(&input, &mut output).unwrap();
        layer.backward(&input, &r, &mut grad_input).unwrap();
        let analytic = layer.weight_gradient().clone();

        for k in 0..analytic.len() {
            let original = layer.weights().data()[k];
            layer.weights_mut().data_mut()[k] = original + H;
            let plus = objective(&mut layer, &input, &out_shape, &r);
            layer.weights_mut().data_mut()[k] = original - H;
            let minus = objective(&mut layer, &input, &out_shape, &r);
            layer.weights_mut().data_mut()[k] = original;

            let numeric = (plus - minus) / (2.0 * H);
            assert_relative_eq!(analytic.data()[k], numeric, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_dense_bias_gradient() {
        let (mut layer, input, r, out_shape) = setup();
        let mut output = NDArray::zeros(&out_shape);
        let mut grad_input = NDArray::zeros(&[2, 4]);
        layer.forward(&input, &mut output).unwrap();
        layer.backward(&input, &r, &mut grad_input).unwrap();
        let analytic = layer.bias_gradient().clone();

        for k in 0..analytic.len() {
            let original = layer.biases().data()[k];
            layer.biases_mut().data_mut()[k] = original + H;
            let plus = objective(&mut layer, &input, &out_shape, &r);
            layer.biases_mut().data_mut()[k] = original - H;
            let minus = objective(&mut layer, &input, &out_shape, &r);
            layer.biases_mut().data_mut()[k] = original;

            assert_relative_eq!(analytic.data()[k], (plus - minus) / (2.0 * H), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_dense_input_gradient() {
        let (mut layer, input, r, out_shape) = setup();
        let mut output = NDArray::zeros(&out_shape);
        let mut grad_input = NDArray::zeros(&[2, 4]);
        layer.forward(&input, &mut output).unwrap();
        layer.backward(&input, &r, &mut grad_input).unwrap();

        for k in 0..input.len() {
            let numeric = numeric_input_gradient(&mut layer, &input, &out_shape, &r, k, H);
            assert_relative_eq!(grad_input.data()[k], numeric, epsilon = 1e-3);
        }
    }
}

// ============================================================================
// Convolution layer (stride 2, padding 1, two input channels)
// ============================================================================

mod conv_gradient_tests {
    use super::*;

    const IN_SHAPE: [usize; 4] = [2, 2, 5, 5];
    const OUT_SHAPE: [usize; 4] = [2, 2, 3, 3];

    fn setup() -> (Conv2DLayer, NDArray, NDArray) {
        let mut rng = SimpleRng::new(23);
        let mut layer = Conv2DLayer::new(2, 3, 3, 2, 1, Some(ActivationKind::Relu));
        let out = layer.resolve(&IN_SHAPE[1..], &mut rng).unwrap();
        assert_eq!(out, OUT_SHAPE[1..].to_vec());
        layer.bind(2).unwrap();
        let input = random_tensor(&IN_SHAPE, &mut rng);
        let r = random_tensor(&OUT_SHAPE, &mut rng);
        (layer, input, r)
    }

    fn run_backward(layer: &mut Conv2DLayer, input: &NDArray, r: &NDArray) -> NDArray {
        let mut output = NDArray::zeros(&OUT_SHAPE);
        let mut grad_input = NDArray::zeros(&IN_SHAPE);
        layer.forward(input, &mut output).unwrap();
        layer.backward(input, r, &mut grad_input).unwrap();
        grad_input
    }

    #[test]
    fn test_conv_weight_gradient() {
        let (mut layer, input, r) = setup();
        run_backward(&mut layer, &input, &r);
        let analytic = layer.weight_gradient().clone();

        for k in 0..analytic.len() {
            let original = layer.weights().data()[k];
            layer.weights_mut().data_mut()[k] = original + H;
            let plus = objective(&mut layer, &input, &OUT_SHAPE, &r);
            layer.weights_mut().data_mut()[k] = original - H;
            let minus = objective(&mut layer, &input, &OUT_SHAPE, &r);
            layer.weights_mut().data_mut()[k] = original;

            assert_relative_eq!(analytic.data()[k], (plus - minus) / (2.0 * H), epsilon = 2e-3);
        }
    }

    #[test]
    fn test_conv_bias_gradient() {
        let (mut layer, input, r) = setup();
        run_backward(&mut layer, &input, &r);

        // each filter's bias reaches every output cell of that filter
        let per_filter: Vec<f32> = (0..2)
            .map(|f| {
                (0..2)
                    .map(|b| r.data()[b * 18 + f * 9..b * 18 + f * 9 + 9].iter().sum::<f32>())
                    .sum()
            })
            .collect();
        for f in 0..2 {
            assert_relative_eq!(layer.bias_gradient().data()[f], per_filter[f], epsilon = 1e-4);
        }
    }

    #[test]
    fn test_conv_input_gradient() {
        let (mut layer, input, r) = setup();
        let grad_input = run_backward(&mut layer, &input, &r);

        for k in 0..input.len() {
            let numeric = numeric_input_gradient(&mut layer, &input, &OUT_SHAPE, &r, k, H);
            assert_relative_eq!(grad_input.data()[k], numeric, epsilon = 2e-3);
        }
    }
}

// ============================================================================
// Activations
// ============================================================================

mod activation_gradient_tests {
    use super::*;

    #[test]
    fn test_sigmoid_input_gradient() {
        let mut rng = SimpleRng::new(5);
        let mut layer = ActivationLayer::new(ActivationKind::Sigmoid);
        layer.resolve(&[6], &mut rng).unwrap();
        let input = random_tensor(&[2, 6], &mut rng);
        let r = random_tensor(&[2, 6], &mut rng);
        let mut output = NDArray::zeros(&[2, 6]);
        let mut grad_input = NDArray::zeros(&[2, 6]);
        layer.forward(&input, &mut output).unwrap();
        layer.backward(&input, &r, &mut grad_input).unwrap();

        for k in 0..input.len() {
            let numeric = numeric_input_gradient(&mut layer, &input, &[2, 6], &r, k, 1e-2);
            assert_relative_eq!(grad_input.data()[k], numeric, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_softmax_jacobian_matches_finite_differences() {
        let logits = [0.3f32, -1.2, 2.0, 0.5];
        let jacobian = softmax_jacobian(&logits);
        let n = logits.len();

        let softmax = |x: &[f32]| -> Vec<f32> {
            let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let exps: Vec<f32> = x.iter().map(|v| (v - max).exp()).collect();
            let sum: f32 = exps.iter().sum();
            exps.iter().map(|e| e / sum).collect()
        };

        for j in 0..n {
            let mut plus = logits;
            plus[j] += 1e-2;
            let mut minus = logits;
            minus[j] -= 1e-2;
            let (sp, sm) = (softmax(&plus), softmax(&minus));
            for i in 0..n {
                let numeric = (sp[i] - sm[i]) / 2e-2;
                assert_relative_eq!(jacobian[i * n + j], numeric, epsilon = 1e-3);
            }
        }
    }
}
