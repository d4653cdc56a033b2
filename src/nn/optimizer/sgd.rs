/*
 * @Author       : 老董
 * @Date         : 2026-07-05
 * @Description  : 带动量的随机梯度下降优化器
 */

use super::{LearningRateSchedule, Optimizer, TrainingObjective};
use crate::errors::NetworkError;
use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// 逆缩放调度的幂指数
const POWER_T: f64 = 0.25;
/// 动量系数
const MOMENTUM: f64 = 0.9;
/// 自适应调度的学习率下限
const MIN_LEARNING_RATE: f64 = 1e-6;

/// 随机梯度下降优化器
///
/// 每轮随机打乱样本顺序，逐样本求梯度并做动量更新：
/// v ← β·v − α·∇，θ ← θ + v。
/// 学习率按`LearningRateSchedule`调度；`early_th`给出时，
/// 相邻两轮批量损失之差小于该阈值则提前停止。
pub struct SgdOptimizer {
    coef: ndarray::Array1<f64>,
    velocity: ndarray::Array1<f64>,
    learning_rate_init: f64,
    learning_rate: f64,
    lr_schedule: LearningRateSchedule,
    rng: StdRng,
}

impl SgdOptimizer {
    /// 以初始系数创建优化器，样本打乱顺序取熵源种子
    pub fn new(
        coef: ndarray::Array1<f64>,
        learning_rate_init: f64,
        lr_schedule: LearningRateSchedule,
    ) -> Self {
        Self::with_rng(coef, learning_rate_init, lr_schedule, StdRng::from_entropy())
    }

    /// 显式注入随机数发生器（测试可复现）
    pub fn with_rng(
        coef: ndarray::Array1<f64>,
        learning_rate_init: f64,
        lr_schedule: LearningRateSchedule,
        rng: StdRng,
    ) -> Self {
        let velocity = ndarray::Array1::zeros(coef.len());
        Self {
            coef,
            velocity,
            learning_rate_init,
            learning_rate: learning_rate_init,
            lr_schedule,
            rng,
        }
    }

    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

impl Optimizer for SgdOptimizer {
    fn train(
        &mut self,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
        objective: &mut dyn TrainingObjective,
        max_iter: usize,
        early_th: Option<f64>,
        verbose: bool,
    ) -> Result<f64, NetworkError> {
        if x.nrows() != y.nrows() {
            return Err(NetworkError::DimensionMismatch {
                expected: x.nrows(),
                got: y.nrows(),
                message: "样本数与标签数应一致".to_string(),
            });
        }

        let n_samples = x.nrows();
        let mut order: Vec<usize> = (0..n_samples).collect();
        let mut previous_loss = f64::INFINITY;
        let mut last_loss = objective.loss_with(&self.coef.view(), x, y)?;
        let mut update_count = 0usize;

        for it in 0..max_iter {
            // 1. 打乱样本顺序
            order.shuffle(&mut self.rng);

            // 2. 逐样本动量更新
            for &i in &order {
                update_count += 1;
                if self.lr_schedule == LearningRateSchedule::InvScaling {
                    self.learning_rate =
                        self.learning_rate_init / (update_count as f64).powf(POWER_T);
                }
                let grad = objective.gradient_with(&self.coef.view(), &x.row(i), &y.row(i))?;
                self.velocity *= MOMENTUM;
                self.velocity.scaled_add(-self.learning_rate, &grad);
                self.coef += &self.velocity;
            }

            // 3. 整轮损失与调度/早停判断
            last_loss = objective.loss_with(&self.coef.view(), x, y)?;
            if verbose {
                println!(
                    "iter {}/{} loss={:.6} lr={:.6}",
                    it + 1,
                    max_iter,
                    last_loss,
                    self.learning_rate
                );
            }
            if self.lr_schedule == LearningRateSchedule::Adaptive && last_loss >= previous_loss {
                self.learning_rate = (self.learning_rate / 5.0).max(MIN_LEARNING_RATE);
            }
            if let Some(th) = early_th {
                if (previous_loss - last_loss).abs() < th {
                    break;
                }
            }
            previous_loss = last_loss;
        }
        Ok(last_loss)
    }

    fn coef(&self) -> ArrayView1<'_, f64> {
        self.coef.view()
    }
}
