//! Adam optimizer over ndarray parameters.

use ndarray::{Array, Dimension, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl AdamConfig {
    pub fn with_lr(lr: f64) -> Self {
        Self {
            lr,
            ..Self::default()
        }
    }
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// First and second moment estimates of one parameter tensor
#[derive(Debug, Clone, PartialEq)]
pub struct AdamSlot<D: Dimension> {
    m: Array<f64, D>,
    v: Array<f64, D>,
}

impl<D: Dimension> AdamSlot<D> {
    pub fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }

    /// Update `param` in place with bias-corrected step size `lr_t`
    pub fn apply(
        &mut self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        lr_t: f64,
        config: &AdamConfig,
    ) {
        let (beta1, beta2, eps) = (config.beta1, config.beta2, config.epsilon);
        Zip::from(param)
            .and(&mut self.m)
            .and(&mut self.v)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                *p -= lr_t * *m / (v.sqrt() + eps);
            });
    }
}

/// Step counter shared by every slot of one optimizer
#[derive(Debug, Clone, PartialEq)]
pub struct Adam {
    config: AdamConfig,
    t: u64,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self { config, t: 0 }
    }

    /// Advance the step counter and return the bias-corrected learning rate
    pub fn begin_step(&mut self) -> f64 {
        self.t += 1;
        let t = self.t as i32;
        let c = &self.config;
        c.lr * (1.0 - c.beta2.powi(t)).sqrt() / (1.0 - c.beta1.powi(t))
    }

    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    pub fn steps(&self) -> u64 {
        self.t
    }

    pub fn reset(&mut self) {
        self.t = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_first_step_moves_by_lr() {
        // After one step m/sqrt(v) is sign(g), so each weight moves by ~lr
        let config = AdamConfig::with_lr(0.1);
        let mut adam = Adam::new(config);
        let mut param = array![1.0, -1.0, 0.5];
        let mut slot = AdamSlot::zeros_like(&param);

        let lr_t = adam.begin_step();
        slot.apply(&mut param, &array![2.0, -3.0, 0.0], lr_t, &config);

        assert!((param[0] - 0.9).abs() < 1e-6);
        assert!((param[1] + 0.9).abs() < 1e-6);
        assert_eq!(param[2], 0.5);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let config = AdamConfig::with_lr(0.01);
        let mut adam = Adam::new(config);
        let mut param = array![[3.0, -2.0]];
        let mut slot = AdamSlot::zeros_like(&param);

        for _ in 0..3_000 {
            let grad = param.mapv(|p| 2.0 * p);
            let lr_t = adam.begin_step();
            slot.apply(&mut param, &grad, lr_t, &config);
        }
        assert!(param.iter().all(|p| p.abs() < 0.05));
        assert_eq!(adam.steps(), 3_000);
    }
}
