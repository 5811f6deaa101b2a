//! Regression values for the optimizers through the public API

use approx::assert_relative_eq;
use rust_cnn::optimizers::{Adam, Optimizer, ParamId, SGD};
use rust_cnn::NDArray;

mod adam_tests {
    use super::*;

    #[test]
    fn test_adam_first_step_literal() {
        // t = 1: m_hat = 1, v_hat = 1, step = 0.001 / (1 + 1e-8)
        let mut adam = Adam::new(0.001, 0.9, 0.999, 1e-8);
        let mut param = NDArray::full(&[1], 1.0);
        adam.update(ParamId::new(0), &mut param, &NDArray::full(&[1], 1.0))
            .unwrap();
        assert_relative_eq!(param.data()[0], 0.999, epsilon = 1e-7);
    }

    #[test]
    fn test_adam_through_trait_object() {
        let mut optimizer: Box<dyn Optimizer> = Box::new(Adam::default());
        let mut param = NDArray::full(&[2], 0.0);
        let grad = NDArray::from_vec(&[2], vec![1.0, -1.0]).unwrap();
        for _ in 0..3 {
            optimizer.update(ParamId::new(7), &mut param, &grad).unwrap();
        }
        // constant gradient: every step moves by roughly the learning rate
        assert_relative_eq!(param.data()[0], -0.003, epsilon = 1e-5);
        assert_relative_eq!(param.data()[1], 0.003, epsilon = 1e-5);

        optimizer.set_learning_rate(0.01);
        assert_eq!(optimizer.learning_rate(), 0.01);
        optimizer.reset();
    }
}

mod sgd_tests {
    use super::*;

    #[test]
    fn test_sgd_literal() {
        let mut sgd = SGD::new(0.1);
        let mut param = NDArray::from_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let grad = NDArray::from_vec(&[2, 2], vec![1.0, -1.0, 0.5, 0.0]).unwrap();
        sgd.update(ParamId::new(0), &mut param, &grad).unwrap();
        let expected = [0.9, 2.1, 2.95, 4.0];
        for (p, e) in param.data().iter().zip(expected) {
            assert_relative_eq!(*p, e, epsilon = 1e-6);
        }
    }
}
