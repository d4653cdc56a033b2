/*
 * @Author       : 老董
 * @Date         : 2026-07-02
 * @Description  : 神经网络核心：激活目录、计算单元、计算图、
 *                 决策树编译与训练驱动
 */

pub mod activation;
pub mod network;
pub mod neuron;
pub mod optimizer;
pub mod trainable;

pub use activation::{Activation, Jacobian};
pub use network::{Network, NetworkCache, NodeAttr, TreeSource};
pub use neuron::{Coef, Neuron, NeuronCache};
pub use optimizer::{LearningRateSchedule, Optimizer, SgdOptimizer, TrainingObjective};
pub use trainable::{FitOptions, Trainable};

#[cfg(test)]
mod tests;
