/*
 * @Author       : 老董
 * @Date         : 2026-07-05
 * @Description  : 优化器契约与训练目标抽象
 */

mod sgd;

pub use sgd::SgdOptimizer;

use crate::errors::NetworkError;
use crate::nn::trainable::Trainable;
use ndarray::{Array1, ArrayView1, ArrayView2};

/// 学习率调度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningRateSchedule {
    /// 恒定学习率
    Constant,
    /// 逆缩放：lr = lr₀ / t^0.25，t为累计更新步数
    InvScaling,
    /// 自适应：某轮损失不再下降时学习率除以5，下限1e-6
    Adaptive,
}

/// 训练目标
///
/// 优化器每次评估前先把试探系数整体替换进目标（非累加），再求值。
/// 两个方法各自独占`&mut self`，这正是Rust版的"闭包对"：
/// 损失闭包与梯度闭包不能同时借用同一个可变目标，于是合为一个trait。
pub trait TrainingObjective {
    /// 替换系数后求批量损失
    fn loss_with(
        &mut self,
        coef: &ArrayView1<f64>,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
    ) -> Result<f64, NetworkError>;

    /// 替换系数后求单样本的展平权重梯度
    fn gradient_with(
        &mut self,
        coef: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
    ) -> Result<Array1<f64>, NetworkError>;
}

/// 任何可训练单元都天然是训练目标
impl<T: Trainable> TrainingObjective for T {
    fn loss_with(
        &mut self,
        coef: &ArrayView1<f64>,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
    ) -> Result<f64, NetworkError> {
        self.update_training_weights(coef, false)?;
        self.loss_batch(x, y)
    }

    fn gradient_with(
        &mut self,
        coef: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
    ) -> Result<Array1<f64>, NetworkError> {
        self.update_training_weights(coef, false)?;
        self.gradient(x, y, false)
    }
}

/// 优化器契约
///
/// 以初始展平系数构造；`train`结束后通过`coef`取回最终系数。
pub trait Optimizer {
    /// 执行优化循环，返回最后一轮的批量损失
    fn train(
        &mut self,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
        objective: &mut dyn TrainingObjective,
        max_iter: usize,
        early_th: Option<f64>,
        verbose: bool,
    ) -> Result<f64, NetworkError>;

    /// 当前（训练后即最终）系数
    fn coef(&self) -> ArrayView1<'_, f64>;
}
