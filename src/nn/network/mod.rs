/*
 * @Author       : 老董
 * @Date         : 2026-07-08
 * @Description  : 计算图：神经元的只追加DAG，共享一个按槽位索引的状态缓冲。
 *                 前`dim`个槽位是外部输入，之后每个神经元的输出依次占用新槽位
 */

mod backward;
mod tree;
mod visualization;

pub use tree::TreeSource;

use crate::errors::NetworkError;
use crate::nn::neuron::{Neuron, NeuronCache};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 节点在图中的放置信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttr {
    /// 喂入该节点的全局槽位（有序）
    pub inputs: Vec<usize>,
    /// 该节点第一个输出槽位
    pub first_output: usize,
    /// 输出槽位个数
    pub n_outputs: usize,
    /// 该节点系数在全局展平权重向量中的偏移
    pub first_coef: usize,
    /// 该节点系数个数
    pub coef_size: usize,
}

impl NodeAttr {
    /// 输出槽位区间
    pub const fn outputs(&self) -> Range<usize> {
        self.first_output..self.first_output + self.n_outputs
    }
}

/// 整图一次前向传播的缓存仓
///
/// 节点id是追加位置，天然致密，故用Vec而非哈希表索引；
/// `state`是完整的槽位状态缓冲，供损失/梯度复用。
#[derive(Debug, Clone)]
pub struct NetworkCache {
    pub nodes: Vec<NeuronCache>,
    pub state: Array1<f64>,
}

/// 神经元计算图
///
/// 拓扑只能通过`append`增长：新节点只能引用已存在的槽位，
/// 因此追加顺序天然是合法的求值顺序，无需环检测。
/// 展平权重向量是各节点系数按追加顺序的拼接，
/// `first_coef`偏移恰好无缝铺满整个向量。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    dim: usize,
    nodes: Vec<Neuron>,
    attrs: Vec<NodeAttr>,
    size: usize,
    /// 槽位（减去dim）-> 产生它的节点id，追加时增量扩展
    output_owner: Vec<usize>,
    /// 槽位 -> 读取它的节点id列表，追加时增量扩展
    consumers: Vec<Vec<usize>>,
}

impl Network {
    /// 创建空网络，`dim`为外部输入维数
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            nodes: Vec::new(),
            attrs: Vec::new(),
            size: dim,
            output_owner: Vec::new(),
            consumers: vec![Vec::new(); dim],
        }
    }

    /// 创建带一个恒等直通节点的网络（权重全1、偏置0，覆盖全部输入）
    pub fn with_identity(dim: usize) -> Self {
        let mut net = Self::new(dim);
        let node = Neuron::new(Array1::ones(dim), 0.0, crate::nn::Activation::Identity);
        let inputs: Vec<usize> = (0..dim).collect();
        // 输入槽位0..dim必然存在，append不会失败
        net.append(node, &inputs).unwrap();
        net
    }

    /// 外部输入维数
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// 全局槽位总数（输入槽位 + 各节点输出槽位）
    pub const fn size(&self) -> usize {
        self.size
    }

    /// 节点个数
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, i: usize) -> &Neuron {
        &self.nodes[i]
    }

    pub fn attr(&self, i: usize) -> &NodeAttr {
        &self.attrs[i]
    }

    pub(in crate::nn) fn nodes_iter(&self) -> impl Iterator<Item = (&Neuron, &NodeAttr)> {
        self.nodes.iter().zip(self.attrs.iter())
    }

    /// 产生槽位`slot`的节点id；输入槽位返回None
    pub fn slot_owner(&self, slot: usize) -> Option<usize> {
        if slot < self.dim {
            None
        } else {
            self.output_owner.get(slot - self.dim).copied()
        }
    }

    /// 读取槽位`slot`的节点id列表
    pub fn slot_consumers(&self, slot: usize) -> &[usize] {
        &self.consumers[slot]
    }

    /// 清空所有节点，回到空网络状态
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.attrs.clear();
        self.size = self.dim;
        self.output_owner.clear();
        self.consumers = vec![Vec::new(); self.dim];
    }

    /// 追加一个节点，返回其id（即追加位置）
    ///
    /// `input_slots`是喂入该节点的全局槽位，个数必须等于节点的输入宽度，
    /// 且每个槽位都必须已经被外部输入或更早追加的节点产生。
    /// 校验先于一切修改：失败时图保持原状。
    /// 这是图拓扑唯一的修改入口——没有删边、没有重排，构造即无环。
    pub fn append(&mut self, node: Neuron, input_slots: &[usize]) -> Result<usize, NetworkError> {
        // 1. 输入宽度校验
        if node.ndim() != input_slots.len() {
            return Err(NetworkError::DimensionMismatch {
                expected: node.ndim(),
                got: input_slots.len(),
                message: "节点权重宽度与输入槽位个数不一致".to_string(),
            });
        }
        // 2. 槽位存在性校验
        for &slot in input_slots {
            if slot >= self.size {
                return Err(NetworkError::DimensionMismatch {
                    expected: self.size,
                    got: slot,
                    message: "输入槽位尚未被任何节点产生".to_string(),
                });
            }
        }

        // 3. 分配id与输出槽位，扩展偏移表与查找表
        let id = self.nodes.len();
        let n_outputs = node.n_outputs();
        let coef_size = node.coef_size();
        let first_coef = self
            .attrs
            .last()
            .map_or(0, |a| a.first_coef + a.coef_size);
        let attr = NodeAttr {
            inputs: input_slots.to_vec(),
            first_output: self.size,
            n_outputs,
            first_coef,
            coef_size,
        };

        let mut node = node;
        node.set_node_id(id);
        for &slot in input_slots {
            self.consumers[slot].push(id);
        }
        self.output_owner.extend(std::iter::repeat(id).take(n_outputs));
        self.consumers
            .extend(std::iter::repeat_with(Vec::new).take(n_outputs));
        self.size += n_outputs;
        self.nodes.push(node);
        self.attrs.push(attr);
        Ok(id)
    }

    /// 展平权重向量的总长度
    pub fn total_coef_size(&self) -> usize {
        self.attrs
            .last()
            .map_or(0, |a| a.first_coef + a.coef_size)
    }

    /// 从状态缓冲中取出某节点的输入向量
    pub(in crate::nn) fn gather_inputs(&self, attr: &NodeAttr, state: &ArrayView1<f64>) -> Array1<f64> {
        attr.inputs.iter().map(|&i| state[i]).collect()
    }

    /// 单样本前向传播，返回完整的槽位状态缓冲
    ///
    /// 槽位`0..dim`为输入原样保留，之后每个节点按追加顺序求值，
    /// 输出写入其指定槽位——追加顺序保证所需输入必然已就绪。
    pub fn predict(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        assert_eq!(x.len(), self.dim, "输入长度应等于网络输入维数");
        let mut state = Array1::zeros(self.size);
        state.slice_mut(s![..self.dim]).assign(x);
        for (node, attr) in self.nodes_iter() {
            let input = self.gather_inputs(attr, &state.view());
            let out = node.predict(&input.view());
            for (j, slot) in attr.outputs().enumerate() {
                state[slot] = out[j];
            }
        }
        state
    }

    /// 批量前向传播：逐样本循环（节点内部自行向量化，图层面不做批量）
    pub fn predict_batch(&self, x: &ArrayView2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.size));
        for (i, row) in x.axis_iter(Axis(0)).enumerate() {
            out.row_mut(i).assign(&self.predict(&row));
        }
        out
    }

    /// 整图前向缓存：各节点缓存按id入仓，完整状态缓冲一并保存
    pub fn fill_cache(&self, x: &ArrayView1<f64>) -> NetworkCache {
        assert_eq!(x.len(), self.dim, "输入长度应等于网络输入维数");
        let mut state = Array1::zeros(self.size);
        state.slice_mut(s![..self.dim]).assign(x);
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (node, attr) in self.nodes_iter() {
            let input = self.gather_inputs(attr, &state.view());
            let cache = node.fill_cache(&input.view());
            for (j, slot) in attr.outputs().enumerate() {
                state[slot] = cache.activated[j];
            }
            nodes.push(cache);
        }
        NetworkCache { nodes, state }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Network({}, nodes={})", self.dim, self.nodes.len())
    }
}
