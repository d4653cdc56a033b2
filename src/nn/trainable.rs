/*
 * @Author       : 老董
 * @Date         : 2026-07-05
 * @Description  : 可训练单元契约：单个神经元与整个网络实现同一接口，
 *                 训练驱动只依赖该接口（自相似组合）
 */

use crate::errors::NetworkError;
use crate::nn::optimizer::{LearningRateSchedule, Optimizer, SgdOptimizer};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `fit`的训练选项
///
/// `lr`与`lr_schedule`只在未显式传入优化器时生效（用于构造默认SGD）。
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// 最大迭代轮数
    pub max_iter: usize,
    /// 早停阈值：相邻两轮损失之差小于该值则提前结束
    pub early_th: Option<f64>,
    /// 每轮打印损失
    pub verbose: bool,
    /// 默认优化器的初始学习率，None取0.002
    pub lr: Option<f64>,
    /// 默认优化器的学习率调度，None取逆缩放
    pub lr_schedule: Option<LearningRateSchedule>,
    /// 默认优化器的随机种子（样本打乱顺序），None则取熵源
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            early_th: None,
            verbose: false,
            lr: None,
            lr_schedule: None,
            seed: None,
        }
    }
}

/// 可训练单元契约
///
/// `Neuron`（叶子单元）与`Network`（组合图）都实现本trait，
/// 因此一个网络可以像单个神经元一样被训练，训练驱动无需区分两者。
pub trait Trainable {
    /// 前向缓存类型（叶子为单节点缓存，网络为按节点id索引的缓存仓）
    type Cache;

    /// 展平后的系数视图（按追加顺序拼接）
    fn training_weights(&self) -> Array1<f64>;

    /// 原地更新系数：`add=true`累加，`add=false`整体替换
    fn update_training_weights(
        &mut self,
        values: &ArrayView1<f64>,
        add: bool,
    ) -> Result<(), NetworkError>;

    /// 记录一次前向传播的中间结果
    fn fill_cache(&self, x: &ArrayView1<f64>) -> Self::Cache;

    /// 默认损失
    fn loss(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&Self::Cache>,
    ) -> Result<f64, NetworkError>;

    /// 损失对输入（激活后输出）的导数
    fn dlossds(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&Self::Cache>,
    ) -> Result<Array1<f64>, NetworkError>;

    /// 损失对权重的（直接）导数
    fn dlossdw(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&Self::Cache>,
    ) -> Result<Array1<f64>, NetworkError>;

    /// 反向梯度传播：`inputs=true`返回对输入的梯度，否则返回对系数的梯度
    fn gradient_backward(
        &self,
        graddx: &ArrayView1<f64>,
        graddw: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        inputs: bool,
        cache: Option<&Self::Cache>,
    ) -> Result<Array1<f64>, NetworkError>;

    /// 完整梯度：fill_cache + dlossds/dlossdw + gradient_backward
    fn gradient(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        inputs: bool,
    ) -> Result<Array1<f64>, NetworkError> {
        let cache = self.fill_cache(x);
        let dlossds = self.dlossds(x, y, Some(&cache))?;
        let dlossdw = self.dlossdw(x, y, Some(&cache))?;
        self.gradient_backward(&dlossds.view(), &dlossdw.view(), x, inputs, Some(&cache))
    }

    /// 批量损失：逐行求和
    fn loss_batch(&self, x: &ArrayView2<f64>, y: &ArrayView2<f64>) -> Result<f64, NetworkError> {
        let mut total = 0.0;
        for (xr, yr) in x.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            total += self.loss(&xr, &yr, None)?;
        }
        Ok(total)
    }

    /// 用默认SGD优化器拟合
    ///
    /// 优化器以当前展平系数为起点；训练结束后系数被整体替换为
    /// 优化器的最终系数（替换而非累加）。
    fn fit(
        &mut self,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
        options: &FitOptions,
    ) -> Result<(), NetworkError>
    where
        Self: Sized,
    {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut optimizer = SgdOptimizer::with_rng(
            self.training_weights(),
            options.lr.unwrap_or(0.002),
            options.lr_schedule.unwrap_or(LearningRateSchedule::InvScaling),
            rng,
        );
        self.fit_with(
            x,
            y,
            &mut optimizer,
            options.max_iter,
            options.early_th,
            options.verbose,
        )
    }

    /// 用外部优化器拟合
    ///
    /// 本单元自身充当训练目标（见`TrainingObjective`）：优化器每次
    /// 评估损失/梯度前，先把试探系数整体替换进本单元。
    fn fit_with(
        &mut self,
        x: &ArrayView2<f64>,
        y: &ArrayView2<f64>,
        optimizer: &mut dyn Optimizer,
        max_iter: usize,
        early_th: Option<f64>,
        verbose: bool,
    ) -> Result<(), NetworkError>
    where
        Self: Sized,
    {
        optimizer.train(x, y, self, max_iter, early_th, verbose)?;
        let coef = optimizer.coef().to_owned();
        self.update_training_weights(&coef.view(), false)
    }
}
