/*
 * @Author       : 老董
 * @Date         : 2026-07-15
 * @Description  : 决策树到网络的编译：把二叉决策树转换成等价的分层网络，
 *                 只用sigmoid阈值节点、成对逻辑组合节点和一个softmax汇聚节点
 */

use super::Network;
use crate::errors::NetworkError;
use crate::nn::activation::Activation;
use crate::nn::neuron::Neuron;
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// 被消费的二叉决策树契约（sklearn风格的平行数组）
///
/// 叶子节点满足`children_left[i] == children_right[i]`；
/// `value`每行是该节点的各类别票数。
#[derive(Debug, Clone)]
pub struct TreeSource {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Array2<f64>,
    pub max_features: usize,
}

impl TreeSource {
    /// 构造并校验各平行数组长度一致
    pub fn new(
        children_left: Vec<i64>,
        children_right: Vec<i64>,
        feature: Vec<i64>,
        threshold: Vec<f64>,
        value: Array2<f64>,
        max_features: usize,
    ) -> Result<Self, NetworkError> {
        let n_nodes = children_left.len();
        for (name, len) in [
            ("children_right", children_right.len()),
            ("feature", feature.len()),
            ("threshold", threshold.len()),
            ("value", value.nrows()),
        ] {
            if len != n_nodes {
                return Err(NetworkError::DimensionMismatch {
                    expected: n_nodes,
                    got: len,
                    message: format!("树的{name}数组长度应等于节点数"),
                });
            }
        }
        Ok(Self {
            children_left,
            children_right,
            feature,
            threshold,
            value,
            max_features,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    pub fn n_classes(&self) -> usize {
        self.value.ncols()
    }

    /// 节点i是否为内部（带阈值判断的）节点
    fn is_split(&self, i: usize) -> bool {
        self.children_left[i] != self.children_right[i]
    }

    /// 叶子节点的多数类
    fn output_class(&self, i: usize) -> usize {
        usize::from(self.value[[i, 1]] > self.value[[i, 0]])
    }
}

impl Network {
    /// 把二叉决策树编译成等价网络
    ///
    /// `k`是sigmoid/softmax的陡峭系数：k越大，网络越逼近树的硬判断边界。
    /// 逐内部节点：
    /// 1. 发出一个阈值节点（sigmoid4，分裂特征权重-k、偏置k·阈值）——
    ///    特征低于阈值时输出≈1，高于时≈0；
    /// 2. 非根节点把前驱输出与阈值输出用两个2输入sigmoid4节点组合：
    ///    AND节点（权重[k,k]、偏置-1.5k，"到达此处且走左支"）与
    ///    差分节点（权重[k,-k]、偏置-0.25k，"到达此处且不走左支"），
    ///    分别登记为左右孩子的前驱；
    /// 3. 根节点则直接从阈值节点合成一个恒等取反节点（权重-1、偏置1）
    ///    作为右孩子前驱，阈值节点本身作为左孩子前驱；
    /// 4. 叶子把前驱登记到其多数类桶下；
    /// 5. 最后发出一个多输出softmax4汇聚节点：输入是按类别分组拼接的
    ///    全部叶子前驱输出，权重矩阵块对角（类内为k），偏置-k/2。
    ///
    /// 只支持二分类树，类别数超过2报`UnsupportedOperation`。
    pub fn from_tree(tree: &TreeSource, k: f64) -> Result<Self, NetworkError> {
        if tree.n_classes() > 2 {
            return Err(NetworkError::UnsupportedOperation(
                "决策树编译只支持二分类问题".to_string(),
            ));
        }

        let max_features = tree.max_features;
        let mut root = Self::new(max_features);
        let feat_index: Vec<usize> = (0..max_features).collect();
        // 树节点 -> 已发出的前驱网络节点id
        let mut predecessor: HashMap<usize, usize> = HashMap::new();
        // 类别 -> 叶子前驱网络节点id列表
        let mut outputs: Vec<Vec<usize>> = vec![Vec::new(); tree.n_classes()];

        for i in 0..tree.n_nodes() {
            if tree.is_split(i) {
                // 阈值节点：sigmoid4(-k·x[feature] + k·threshold)
                let mut coef = Array1::zeros(max_features);
                coef[tree.feature[i] as usize] = -k;
                let node_th = Neuron::new(coef, k * tree.threshold[i], Activation::Sigmoid4)
                    .with_tag(&format!("N{i}-th"));
                let th_id = root.append(node_th, &feat_index)?;

                if let Some(&pred_id) = predecessor.get(&i) {
                    let out_pred = root.attr(pred_id).first_output;
                    let out_th = root.attr(th_id).first_output;

                    // AND节点：两输入都≈1时才≈1
                    let node_true =
                        Neuron::new(ndarray::array![k, k], -k * 1.5, Activation::Sigmoid4)
                            .with_tag(&format!("N{i}-T"));
                    let true_id = root.append(node_true, &[out_pred, out_th])?;

                    // 差分节点：到达此处且不走左支
                    let node_false =
                        Neuron::new(ndarray::array![k, -k], -k * 0.25, Activation::Sigmoid4)
                            .with_tag(&format!("N{i}-F"));
                    let false_id = root.append(node_false, &[out_pred, out_th])?;

                    predecessor.insert(tree.children_left[i] as usize, true_id);
                    predecessor.insert(tree.children_right[i] as usize, false_id);
                } else {
                    // 根节点：恒等取反节点充当右孩子前驱
                    let node_false = Neuron::new(ndarray::array![-1.0], 1.0, Activation::Identity)
                        .with_tag(&format!("N{i}-F"));
                    let out_th = root.attr(th_id).first_output;
                    let neg_id = root.append(node_false, &[out_th])?;

                    predecessor.insert(tree.children_left[i] as usize, th_id);
                    predecessor.insert(tree.children_right[i] as usize, neg_id);
                }
            } else if let Some(&pred_id) = predecessor.get(&i) {
                // 叶子：前驱登记到多数类桶下
                outputs[tree.output_class(i)].push(pred_id);
            }
        }

        // 汇聚节点：按类别分组拼接叶子前驱，块对角权重
        let mut leaf_ids = Vec::new();
        let mut index = vec![0usize];
        for class_ids in &outputs {
            leaf_ids.extend(class_ids.iter().copied());
            index.push(index[index.len() - 1] + class_ids.len());
        }
        let mut coef = Array2::zeros((tree.n_classes(), leaf_ids.len()));
        for class in 0..tree.n_classes() {
            for j in index[class]..index[class + 1] {
                coef[[class, j]] = k;
            }
        }
        let bias = Array1::from_elem(tree.n_classes(), -k / 2.0);
        let feat: Vec<usize> = leaf_ids
            .iter()
            .map(|&id| root.attr(id).first_output)
            .collect();
        let node_final = Neuron::multi(coef, bias, Activation::Softmax4)?.with_tag("Nfinal");
        root.append(node_final, &feat)?;

        Ok(root)
    }
}
