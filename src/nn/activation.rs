/*
 * @Author       : 老董
 * @Date         : 2026-07-02
 * @Description  : 激活函数目录：每种激活函数对应一组固定的
 *                 （前向、导数、默认损失、默认损失导数）函数
 */

use crate::errors::NetworkError;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// sigmoid4/softmax4的陡峭系数：把S形曲线压向阶跃函数
const STEEPNESS: f64 = 4.0;
/// Leaky ReLU负半轴斜率
const LEAKY_SLOPE: f64 = 0.01;
/// sigmoid类默认损失中的L2权重惩罚系数
const L2_PENALTY: f64 = 0.01;
/// KL散度损失的下限：避免log(0)，取f32的机器精度（与float64无关，是刻意的松下限）
const KL_EPS: f64 = f32::EPSILON as f64;

/// 激活函数种类
///
/// 每种激活函数绑定一组固定的函数：
/// - `forward`: y = f(x)
/// - `derivative`: dy/dx（标量激活为逐元素导数，softmax为完整雅可比）
/// - `loss` / `loss_derivative`: 该激活的默认损失及其对（预测值，权重）的导数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// y = x，回归用
    Identity,
    /// y = 1 / (1 + e^(-x))
    Sigmoid,
    /// y = 1 / (1 + e^(-4x))，陡峭版，用于逼近阈值判断
    Sigmoid4,
    /// y = max(x, 0)
    Relu,
    /// y = max(x, 0.01x)
    LeakyRelu,
    /// y = softmax(x)，分类用
    Softmax,
    /// y = softmax(4x)，陡峭版，用于逼近argmax
    Softmax4,
}

/// 激活函数在某点的导数
///
/// 标量激活（identity/sigmoid/relu等）逐元素求导，返回对角线；
/// 向量激活（softmax）各输出互相耦合，返回完整雅可比矩阵。
#[derive(Debug, Clone)]
pub enum Jacobian {
    Diagonal(Array1<f64>),
    Full(Array2<f64>),
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 数值稳定的softmax：先减去最大值再取指数，避免溢出
fn stable_softmax(x: &ArrayView1<f64>, scale: f64) -> Array1<f64> {
    let scaled = x.mapv(|v| v * scale);
    let max = scaled.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let exp = scaled.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// softmax的雅可比：diag(s) - s·sᵀ，再乘以链式系数scale
fn softmax_jacobian(x: &ArrayView1<f64>, scale: f64) -> Array2<f64> {
    let s = stable_softmax(x, scale);
    let n = s.len();
    let mut jac = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            let kron = if i == j { s[i] } else { 0.0 };
            jac[[i, j]] = (kron - s[i] * s[j]) * scale;
        }
    }
    jac
}

impl Activation {
    /// 按原始字符串标签解析激活函数种类
    ///
    /// 未知标签是构造期错误，绝不静默退回默认值。
    pub fn from_name(name: &str) -> Result<Self, NetworkError> {
        match name {
            "identity" => Ok(Self::Identity),
            "sigmoid" | "logistic" | "expit" => Ok(Self::Sigmoid),
            "sigmoid4" => Ok(Self::Sigmoid4),
            "relu" => Ok(Self::Relu),
            "leakyrelu" => Ok(Self::LeakyRelu),
            "softmax" => Ok(Self::Softmax),
            "softmax4" => Ok(Self::Softmax4),
            _ => Err(NetworkError::UnknownActivation(name.to_string())),
        }
    }

    /// 激活函数的规范名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sigmoid => "sigmoid",
            Self::Sigmoid4 => "sigmoid4",
            Self::Relu => "relu",
            Self::LeakyRelu => "leakyrelu",
            Self::Softmax => "softmax",
            Self::Softmax4 => "softmax4",
        }
    }

    /// 是否为softmax类（多输出的向量激活）
    pub const fn is_softmax(&self) -> bool {
        matches!(self, Self::Softmax | Self::Softmax4)
    }

    /// 前向计算：y = f(x)
    pub fn forward(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            Self::Identity => x.to_owned(),
            Self::Sigmoid => x.mapv(logistic),
            Self::Sigmoid4 => x.mapv(|v| logistic(v * STEEPNESS)),
            Self::Relu => x.mapv(|v| if v > 0.0 { v } else { 0.0 }),
            Self::LeakyRelu => x.mapv(|v| if v > 0.0 { v } else { v * LEAKY_SLOPE }),
            Self::Softmax => stable_softmax(x, 1.0),
            Self::Softmax4 => stable_softmax(x, STEEPNESS),
        }
    }

    /// 导数：dy/dx
    ///
    /// 与`forward`严格一致（数值微分可验证）：
    /// - sigmoid: f'(x) = f(x)(1 - f(x))，陡峭版带×4链式系数
    /// - softmax: J = diag(s) - s·sᵀ
    pub fn derivative(&self, x: &ArrayView1<f64>) -> Jacobian {
        match self {
            Self::Identity => Jacobian::Diagonal(Array1::ones(x.len())),
            Self::Sigmoid => Jacobian::Diagonal(x.mapv(|v| {
                let y = logistic(v);
                y * (1.0 - y)
            })),
            Self::Sigmoid4 => Jacobian::Diagonal(x.mapv(|v| {
                let y = logistic(v * STEEPNESS);
                y * (1.0 - y) * STEEPNESS
            })),
            Self::Relu => Jacobian::Diagonal(x.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })),
            Self::LeakyRelu => {
                Jacobian::Diagonal(x.mapv(|v| if v > 0.0 { 1.0 } else { LEAKY_SLOPE }))
            }
            Self::Softmax => Jacobian::Full(softmax_jacobian(x, 1.0)),
            Self::Softmax4 => Jacobian::Full(softmax_jacobian(x, STEEPNESS)),
        }
    }

    /// 默认损失：loss(w, prediction, target)，按分量求和后返回标量
    ///
    /// - identity/relu/leakyrelu: 平方误差（回归）
    /// - sigmoid类: 平方误差 + 0.01·w·w（回归阈值 + L2正则）
    /// - softmax类: KL散度（分类诊断），加KL_EPS下限避免log(0)
    pub fn loss(&self, w: &ArrayView1<f64>, prediction: &ArrayView1<f64>, target: &ArrayView1<f64>) -> f64 {
        match self {
            Self::Identity | Self::Relu | Self::LeakyRelu => squared_error(prediction, target),
            Self::Sigmoid | Self::Sigmoid4 => {
                squared_error(prediction, target) + w.dot(w) * L2_PENALTY
            }
            Self::Softmax | Self::Softmax4 => prediction
                .iter()
                .zip(target.iter())
                .map(|(&p, &t)| {
                    let p = p + KL_EPS;
                    let t = t + KL_EPS;
                    p * (p / t).ln()
                })
                .sum(),
        }
    }

    /// 默认损失对权重的（直接）导数：sigmoid类为L2正则项0.02·w，其余为零数组
    ///
    /// 与预测值/目标值无关，因此图级散布时可对任意中间节点调用。
    pub fn loss_weight_derivative(&self, w: &ArrayView1<f64>) -> Array1<f64> {
        match self {
            Self::Sigmoid | Self::Sigmoid4 => w.mapv(|v| v * L2_PENALTY * 2.0),
            _ => Array1::zeros(w.len()),
        }
    }

    /// 默认损失的导数：(∂loss/∂prediction, ∂loss/∂w)
    ///
    /// softmax类损失对权重的导数为零数组——它只作分类诊断，
    /// 不直接在本节点对权重反传。
    pub fn loss_derivative(
        &self,
        w: &ArrayView1<f64>,
        prediction: &ArrayView1<f64>,
        target: &ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let dx_quadratic = || {
            let mut dx = prediction.to_owned();
            dx -= target;
            dx * 2.0
        };
        match self {
            Self::Identity | Self::Relu | Self::LeakyRelu | Self::Sigmoid | Self::Sigmoid4 => {
                (dx_quadratic(), self.loss_weight_derivative(w))
            }
            Self::Softmax | Self::Softmax4 => {
                let dx = prediction
                    .iter()
                    .zip(target.iter())
                    .map(|(&p, &t)| (p + KL_EPS).ln() - (t + KL_EPS).ln() + 1.0)
                    .collect::<Array1<f64>>();
                (dx, self.loss_weight_derivative(w))
            }
        }
    }
}

impl std::fmt::Display for Activation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Activation {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

fn squared_error(prediction: &ArrayView1<f64>, target: &ArrayView1<f64>) -> f64 {
    prediction
        .iter()
        .zip(target.iter())
        .map(|(&p, &t)| (p - t) * (p - t))
        .sum()
}
