//! # Neural Tree
//!
//! `neural_tree`是一个小型可微分计算图引擎：神经元（一次仿射变换加一个
//! 激活函数）组成只追加的DAG，支持带中间缓存的前向求值、单元级与整图级
//! 的损失/梯度计算（前向缓存 + 沿图的反向累加）、面向通用梯度训练的
//! 展平权重视图，以及把二叉决策树编译成等价分层网络的结构编译器。
//!

pub mod errors;
pub mod nn;
pub mod utils;
