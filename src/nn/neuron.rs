/*
 * @Author       : 老董
 * @Date         : 2026-07-03
 * @Description  : 计算单元（神经元）：一次仿射变换加一个激活函数，
 *                 自带前向缓存、默认损失与反向梯度
 */

use crate::errors::NetworkError;
use crate::nn::activation::{Activation, Jacobian};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 神经元系数：偏置存放在每行的第0列，其余列为输入权重
///
/// - `Single`: 单输出，形状`[1 + n_inputs]`
/// - `Multi` : 多输出，形状`[n_outputs, 1 + n_inputs]`，要求`n_outputs >= 2`
///   （恰好1行的2维形式有歧义，构造期直接拒绝）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Coef {
    Single(Array1<f64>),
    Multi(Array2<f64>),
}

/// 一次前向传播的中间结果
///
/// `linear`是激活前的仿射输出，`activated`是激活后的输出（即预测值）。
/// 损失/梯度调用拿到缓存后直接复用，避免重复前向计算。
#[derive(Debug, Clone)]
pub struct NeuronCache {
    pub linear: Array1<f64>,
    pub activated: Array1<f64>,
}

/// 计算单元：`activation(W·x + b)`
///
/// 网络中的原子可训练元素。`node_id`由所属网络在append时分配，
/// 游离神经元为`None`；`tag`只记录来源（如编译自决策树的哪个节点），
/// 不参与任何计算，也不参与相等性比较。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neuron {
    coef: Coef,
    activation: Activation,
    node_id: Option<usize>,
    tag: Option<String>,
}

/// Box-Muller法生成标准正态随机数（rand本身只有均匀分布）
fn randn(rng: &mut StdRng) -> f64 {
    loop {
        let u1: f64 = rng.gen();
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        if z.is_finite() {
            return z;
        }
    }
}

impl Neuron {
    /// 创建单输出神经元
    pub fn new(weights: Array1<f64>, bias: f64, activation: Activation) -> Self {
        let mut coef = Array1::zeros(weights.len() + 1);
        coef[0] = bias;
        coef.slice_mut(ndarray::s![1..]).assign(&weights);
        Self {
            coef: Coef::Single(coef),
            activation,
            node_id: None,
            tag: None,
        }
    }

    /// 创建多输出神经元
    ///
    /// `weights`形状为`[n_outputs, n_inputs]`，`bias`长度为`n_outputs`。
    /// 恰好1行的权重块会被拒绝：单输出必须用1维形式（`new`），
    /// 由调用方显式消歧。
    pub fn multi(
        weights: Array2<f64>,
        bias: Array1<f64>,
        activation: Activation,
    ) -> Result<Self, NetworkError> {
        let (n_outputs, n_inputs) = weights.dim();
        if n_outputs <= 1 {
            return Err(NetworkError::InvalidShape(format!(
                "多输出权重块要求至少2行，实际形状[{n_outputs}, {n_inputs}]；单输出请使用1维形式"
            )));
        }
        if bias.len() != n_outputs {
            return Err(NetworkError::InvalidShape(format!(
                "偏置长度{}与输出数{}不一致",
                bias.len(),
                n_outputs
            )));
        }
        let mut coef = Array2::zeros((n_outputs, n_inputs + 1));
        coef.column_mut(0).assign(&bias);
        coef.slice_mut(ndarray::s![.., 1..]).assign(&weights);
        Ok(Self {
            coef: Coef::Multi(coef),
            activation,
            node_id: None,
            tag: None,
        })
    }

    /// 随机初始化（标准正态）
    ///
    /// softmax类激活默认生成`[2, n_inputs]`的双输出权重块，其余为单输出。
    /// 随机种子由调用方显式注入，保证测试可复现。
    pub fn random(n_inputs: usize, activation: Activation, rng: &mut StdRng) -> Self {
        if activation.is_softmax() {
            let weights = Array2::from_shape_fn((2, n_inputs), |_| randn(rng));
            let bias = Array1::from_shape_fn(2, |_| randn(rng));
            // 2行权重块必然合法，失败只可能是本文件的构造逻辑被改坏
            Self::multi(weights, bias, activation).unwrap()
        } else {
            let weights = Array1::from_shape_fn(n_inputs, |_| randn(rng));
            Self::new(weights, randn(rng), activation)
        }
    }

    /// 给神经元打上来源标签（仅供追溯，不参与计算）
    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// 所属网络分配的节点id，游离神经元为None
    pub const fn node_id(&self) -> Option<usize> {
        self.node_id
    }

    pub(in crate::nn) fn set_node_id(&mut self, id: usize) {
        self.node_id = Some(id);
    }

    pub const fn activation(&self) -> Activation {
        self.activation
    }

    /// 输入维数
    pub fn ndim(&self) -> usize {
        match &self.coef {
            Coef::Single(c) => c.len() - 1,
            Coef::Multi(c) => c.ncols() - 1,
        }
    }

    /// 输出个数
    pub fn n_outputs(&self) -> usize {
        match &self.coef {
            Coef::Single(_) => 1,
            Coef::Multi(c) => c.nrows(),
        }
    }

    /// 展平后的系数个数
    pub fn coef_size(&self) -> usize {
        match &self.coef {
            Coef::Single(c) => c.len(),
            Coef::Multi(c) => c.len(),
        }
    }

    /// 去掉偏置列的输入权重
    pub fn input_weights(&self) -> Array2<f64> {
        match &self.coef {
            Coef::Single(c) => c.slice(ndarray::s![1..]).to_owned().insert_axis(Axis(0)),
            Coef::Multi(c) => c.slice(ndarray::s![.., 1..]).to_owned(),
        }
    }

    /// 偏置（每行第0列）
    pub fn bias(&self) -> Array1<f64> {
        match &self.coef {
            Coef::Single(c) => Array1::from_elem(1, c[0]),
            Coef::Multi(c) => c.column(0).to_owned(),
        }
    }

    /// 激活前的仿射输出：W·x + b
    fn raw_predict(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        match &self.coef {
            Coef::Single(c) => {
                let lin = x.dot(&c.slice(ndarray::s![1..])) + c[0];
                Array1::from_elem(1, lin)
            }
            Coef::Multi(c) => c.slice(ndarray::s![.., 1..]).dot(x) + c.column(0),
        }
    }

    /// 前向预测：activation(W·x + b)，返回长度为`n_outputs`的向量
    pub fn predict(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        let lin = self.raw_predict(x);
        self.activation.forward(&lin.view())
    }

    /// 按行批量预测：同一样本复制n次必然得到n条相同的输出
    pub fn predict_batch(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.n_outputs()));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            out.row_mut(i).assign(&self.predict(&row));
        }
        out
    }

    /// 展平后的系数（读视图的拷贝）
    pub fn training_weights(&self) -> Array1<f64> {
        match &self.coef {
            Coef::Single(c) => c.clone(),
            Coef::Multi(c) => c.iter().copied().collect(),
        }
    }

    /// 原地更新系数
    ///
    /// `add=true`为梯度式累加，`add=false`为整体替换
    /// （优化器交回绝对系数向量时使用）。长度不符时系数保持原样。
    pub fn update_training_weights(
        &mut self,
        values: &ArrayView1<f64>,
        add: bool,
    ) -> Result<(), NetworkError> {
        if values.len() != self.coef_size() {
            return Err(NetworkError::InvalidShape(format!(
                "更新向量长度{}与系数个数{}不一致",
                values.len(),
                self.coef_size()
            )));
        }
        match &mut self.coef {
            Coef::Single(c) => {
                if add {
                    *c += values;
                } else {
                    c.assign(values);
                }
            }
            Coef::Multi(c) => {
                for (dst, &src) in c.iter_mut().zip(values.iter()) {
                    if add {
                        *dst += src;
                    } else {
                        *dst = src;
                    }
                }
            }
        }
        Ok(())
    }

    /// 记录一次前向传播的中间结果
    pub fn fill_cache(&self, x: &ArrayView1<f64>) -> NeuronCache {
        let linear = self.raw_predict(x);
        let activated = self.activation.forward(&linear.view());
        NeuronCache { linear, activated }
    }

    /// loss/dlossds/dlossdw的公共起点：有缓存用缓存，否则重算预测值
    fn cached_prediction(&self, x: &ArrayView1<f64>, cache: Option<&NeuronCache>) -> Array1<f64> {
        match cache {
            Some(c) => c.activated.clone(),
            None => self.predict(x),
        }
    }

    fn check_target(&self, y: &ArrayView1<f64>) -> Result<(), NetworkError> {
        if y.len() != self.n_outputs() {
            return Err(NetworkError::DimensionMismatch {
                expected: self.n_outputs(),
                got: y.len(),
                message: "目标值长度应等于输出个数".to_string(),
            });
        }
        Ok(())
    }

    /// 该激活函数的默认损失（绑定当前系数）
    pub fn loss(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NeuronCache>,
    ) -> Result<f64, NetworkError> {
        self.check_target(y)?;
        let pred = self.cached_prediction(x, cache);
        let w = self.training_weights();
        Ok(self.activation.loss(&w.view(), &pred.view(), y))
    }

    /// 默认损失对本神经元输入（激活后输出）的导数
    pub fn dlossds(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        self.check_target(y)?;
        let pred = self.cached_prediction(x, cache);
        let w = self.training_weights();
        Ok(self.activation.loss_derivative(&w.view(), &pred.view(), y).0)
    }

    /// 默认损失对本神经元权重的（直接）导数
    ///
    /// 各激活的默认损失对权重的导数都不依赖预测值与目标值
    /// （正则项或零），因此忽略`x`/`y`/`cache`，图级散布时
    /// 可以安全地用全局目标值对任意中间节点调用。
    pub fn dlossdw(
        &self,
        _x: &ArrayView1<f64>,
        _y: &ArrayView1<f64>,
        _cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        let w = self.training_weights();
        Ok(self.activation.loss_weight_derivative(&w.view()))
    }

    /// 反向传播的一步
    ///
    /// 在缓存的激活前值处取激活函数的局部雅可比，与下游传入的
    /// `graddx`复合得到局部敏感度`f`（向量激活为`graddx·J`，
    /// 标量激活为逐元素乘）。
    ///
    /// - `inputs=true`：返回对本神经元输入向量的梯度
    ///   （权重与`f`的乘积，多输出时跨输出行求和），供上游累加；
    /// - `inputs=false`：返回对本神经元系数的梯度
    ///   （`[1; x]`与`f`的外积展平），并加上外部传入的`graddw`累加器，
    ///   支持共享下游的多神经元链式累加。
    pub fn gradient_backward(
        &self,
        graddx: &ArrayView1<f64>,
        graddw: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        inputs: bool,
        cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        let owned;
        let cache = match cache {
            Some(c) => c,
            None => {
                owned = self.fill_cache(x);
                &owned
            }
        };

        // 1. 局部敏感度 f = graddx ∘ J(linear)
        let f = match self.activation.derivative(&cache.linear.view()) {
            Jacobian::Full(jac) => graddx.dot(&jac),
            Jacobian::Diagonal(diag) => {
                let mut f = graddx.to_owned();
                f *= &diag;
                f
            }
        };

        // 2.a 对输入的梯度：上游要累加的量
        if inputs {
            return Ok(match &self.coef {
                Coef::Single(c) => {
                    let mut rgrad = c.slice(ndarray::s![1..]).to_owned();
                    rgrad *= f[0];
                    rgrad
                }
                Coef::Multi(c) => {
                    let mut rgrad = Array1::zeros(self.ndim());
                    for (o, row) in c.axis_iter(Axis(0)).enumerate() {
                        for j in 0..self.ndim() {
                            rgrad[j] += row[j + 1] * f[o];
                        }
                    }
                    rgrad
                }
            });
        }

        // 2.b 对系数的梯度：外积[1; x]⊗f，加上已有累加器
        if graddw.len() != self.coef_size() {
            return Err(NetworkError::InvalidShape(format!(
                "梯度累加器长度{}与系数个数{}不一致",
                graddw.len(),
                self.coef_size()
            )));
        }
        let mut rgrad = Array1::zeros(self.coef_size());
        match &self.coef {
            Coef::Single(_) => {
                rgrad[0] = f[0];
                for j in 0..x.len() {
                    rgrad[j + 1] = x[j] * f[0];
                }
            }
            Coef::Multi(_) => {
                let width = self.ndim() + 1;
                for o in 0..self.n_outputs() {
                    rgrad[o * width] = f[o];
                    for j in 0..x.len() {
                        rgrad[o * width + j + 1] = x[j] * f[o];
                    }
                }
            }
        }
        rgrad += graddw;
        Ok(rgrad)
    }
}

impl crate::nn::trainable::Trainable for Neuron {
    type Cache = NeuronCache;

    fn training_weights(&self) -> Array1<f64> {
        Neuron::training_weights(self)
    }

    fn update_training_weights(
        &mut self,
        values: &ArrayView1<f64>,
        add: bool,
    ) -> Result<(), NetworkError> {
        Neuron::update_training_weights(self, values, add)
    }

    fn fill_cache(&self, x: &ArrayView1<f64>) -> NeuronCache {
        Neuron::fill_cache(self, x)
    }

    fn loss(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NeuronCache>,
    ) -> Result<f64, NetworkError> {
        Neuron::loss(self, x, y, cache)
    }

    fn dlossds(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        Neuron::dlossds(self, x, y, cache)
    }

    fn dlossdw(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        Neuron::dlossdw(self, x, y, cache)
    }

    fn gradient_backward(
        &self,
        graddx: &ArrayView1<f64>,
        graddw: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        inputs: bool,
        cache: Option<&NeuronCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        Neuron::gradient_backward(self, graddx, graddw, x, inputs, cache)
    }
}

/// 结构相等：系数逐元素相同且激活函数相同；id与标签不参与比较
impl PartialEq for Neuron {
    fn eq(&self, other: &Self) -> bool {
        if self.activation != other.activation {
            return false;
        }
        match (&self.coef, &other.coef) {
            (Coef::Single(a), Coef::Single(b)) => a == b,
            (Coef::Multi(a), Coef::Multi(b)) => a == b,
            _ => false,
        }
    }
}

impl std::fmt::Display for Neuron {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.coef {
            Coef::Single(c) => write!(
                f,
                "Neuron(weights={}, bias={}, activation={})",
                c.slice(ndarray::s![1..]),
                c[0],
                self.activation
            ),
            Coef::Multi(c) => write!(
                f,
                "Neuron(weights={}, bias={}, activation={})",
                c.slice(ndarray::s![.., 1..]),
                c.column(0),
                self.activation
            ),
        }
    }
}
