/*
 * @Author       : 老董
 * @Date         : 2026-07-10
 * @Description  : 图级损失与梯度：输出层定位、权重梯度散布、
 *                 以及沿追加逆序的反向拓扑累加
 */

use super::{Network, NetworkCache};
use crate::errors::NetworkError;
use crate::nn::trainable::Trainable;
use ndarray::{s, Array1, ArrayView1, ArrayView2};

impl Network {
    /// 定位输出层节点：拥有最后`nb_last`个槽位的唯一节点
    ///
    /// 解析出多个节点时报`MultipleOutputUnits`——图级损失只支持
    /// 最后一层由单个节点构成。
    fn output_node(&self, nb_last: usize) -> Result<usize, NetworkError> {
        if self.is_empty() {
            return Err(NetworkError::UnsupportedOperation(
                "空网络没有输出层节点".to_string(),
            ));
        }
        if nb_last == 0 || self.size() - self.dim() < nb_last {
            return Err(NetworkError::DimensionMismatch {
                expected: self.size() - self.dim(),
                got: nb_last,
                message: "预期的输出个数超出网络产生的槽位数".to_string(),
            });
        }
        let first = self.size() - nb_last;
        let mut owner = None;
        let mut count = 0usize;
        for slot in first..self.size() {
            let id = self.slot_owner(slot).ok_or_else(|| {
                NetworkError::DimensionMismatch {
                    expected: self.dim(),
                    got: slot,
                    message: "输出槽位落在外部输入区间".to_string(),
                }
            })?;
            if owner != Some(id) {
                owner = Some(id);
                count += 1;
            }
        }
        if count != 1 {
            return Err(NetworkError::MultipleOutputUnits(count));
        }
        // count == 1时owner必然已赋值
        Ok(owner.unwrap())
    }

    /// 有缓存用缓存，否则重算一遍前向状态
    fn cached_state(&self, x: &ArrayView1<f64>, cache: Option<&NetworkCache>) -> Array1<f64> {
        match cache {
            Some(c) => c.state.clone(),
            None => self.predict(x),
        }
    }

    /// 图级权重梯度的批量版本：上游语义即不支持，显式报错而非悄悄实现一半
    pub fn dlossdw_batch(
        &self,
        _x: &ArrayView2<f64>,
        _y: &ArrayView2<f64>,
    ) -> Result<Array1<f64>, NetworkError> {
        Err(NetworkError::UnsupportedOperation(
            "图级权重梯度只支持单样本输入".to_string(),
        ))
    }
}

impl Trainable for Network {
    type Cache = NetworkCache;

    /// 各节点系数按追加顺序拼接，与`first_coef`偏移表严格对齐
    fn training_weights(&self) -> Array1<f64> {
        let mut res = Array1::zeros(self.total_coef_size());
        for (node, attr) in self.nodes_iter() {
            res.slice_mut(s![attr.first_coef..attr.first_coef + attr.coef_size])
                .assign(&node.training_weights());
        }
        res
    }

    fn update_training_weights(
        &mut self,
        values: &ArrayView1<f64>,
        add: bool,
    ) -> Result<(), NetworkError> {
        if values.len() != self.total_coef_size() {
            return Err(NetworkError::InvalidShape(format!(
                "更新向量长度{}与全局系数个数{}不一致",
                values.len(),
                self.total_coef_size()
            )));
        }
        // 先整体校验长度再逐节点写入，避免中途失败留下半更新状态
        for (node, attr) in self.nodes.iter_mut().zip(self.attrs.iter()) {
            let chunk = values.slice(s![attr.first_coef..attr.first_coef + attr.coef_size]);
            node.update_training_weights(&chunk, add)?;
        }
        Ok(())
    }

    fn fill_cache(&self, x: &ArrayView1<f64>) -> NetworkCache {
        Network::fill_cache(self, x)
    }

    /// 图级损失：定位输出层节点，把状态缓冲切到它的输入上求其默认损失
    fn loss(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NetworkCache>,
    ) -> Result<f64, NetworkError> {
        let state = self.cached_state(x, cache);
        let last = self.output_node(y.len())?;
        let input = self.gather_inputs(self.attr(last), &state.view());
        self.node(last).loss(&input.view(), y, None)
    }

    fn dlossds(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NetworkCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        let state = self.cached_state(x, cache);
        let last = self.output_node(y.len())?;
        let input = self.gather_inputs(self.attr(last), &state.view());
        self.node(last).dlossds(&input.view(), y, None)
    }

    /// 每个节点对自身权重的（直接）损失导数，按`first_coef`散布到全局向量
    fn dlossdw(
        &self,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
        cache: Option<&NetworkCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        let state = self.cached_state(x, cache);
        let mut dw = Array1::zeros(self.total_coef_size());
        for (node, attr) in self.nodes_iter() {
            let input = self.gather_inputs(attr, &state.view());
            let d = node.dlossdw(&input.view(), y, None)?;
            dw.slice_mut(s![attr.first_coef..attr.first_coef + attr.coef_size])
                .assign(&d);
        }
        Ok(dw)
    }

    /// 整图反向拓扑累加
    ///
    /// 以一个`size`长的槽位梯度缓冲为载体：先把`graddx`播种到输出层
    /// 节点的输出槽位，再按追加逆序逐节点处理——取出路由到其输出槽位
    /// 的下游梯度，把对输入的梯度累加回其输入槽位，把对系数的梯度
    /// （带上`graddw`中对应的累加片段）散布到全局梯度向量。
    /// `inputs=true`时返回对外部输入槽位`0..dim`的梯度。
    fn gradient_backward(
        &self,
        graddx: &ArrayView1<f64>,
        graddw: &ArrayView1<f64>,
        x: &ArrayView1<f64>,
        inputs: bool,
        cache: Option<&NetworkCache>,
    ) -> Result<Array1<f64>, NetworkError> {
        if self.is_empty() {
            return Err(NetworkError::UnsupportedOperation(
                "空网络没有可反传的节点".to_string(),
            ));
        }
        if !inputs && graddw.len() != self.total_coef_size() {
            return Err(NetworkError::InvalidShape(format!(
                "梯度累加器长度{}与全局系数个数{}不一致",
                graddw.len(),
                self.total_coef_size()
            )));
        }
        let owned;
        let cache = match cache {
            Some(c) => c,
            None => {
                owned = Network::fill_cache(self, x);
                &owned
            }
        };

        // 1. 播种：graddx作用于输出层节点的输出槽位
        let last = self.output_node(graddx.len())?;
        let mut slot_grad = Array1::<f64>::zeros(self.size());
        for (j, slot) in self.attr(last).outputs().enumerate() {
            slot_grad[slot] = graddx[j];
        }

        // 2. 逆序逐节点累加
        let empty = Array1::<f64>::zeros(0);
        let mut dw = Array1::<f64>::zeros(self.total_coef_size());
        for id in (0..self.len()).rev() {
            let node = self.node(id);
            let attr = self.attr(id);
            let g: Array1<f64> = attr.outputs().map(|slot| slot_grad[slot]).collect();
            let node_input = self.gather_inputs(attr, &cache.state.view());
            let node_cache = &cache.nodes[id];

            // 2.1 对输入的梯度，推回上游槽位
            let dx = node.gradient_backward(
                &g.view(),
                &empty.view(),
                &node_input.view(),
                true,
                Some(node_cache),
            )?;
            for (j, &slot) in attr.inputs.iter().enumerate() {
                slot_grad[slot] += dx[j];
            }

            // 2.2 对系数的梯度，带上外部累加片段后散布
            if !inputs {
                let acc = graddw.slice(s![attr.first_coef..attr.first_coef + attr.coef_size]);
                let dwn = node.gradient_backward(
                    &g.view(),
                    &acc,
                    &node_input.view(),
                    false,
                    Some(node_cache),
                )?;
                dw.slice_mut(s![attr.first_coef..attr.first_coef + attr.coef_size])
                    .assign(&dwn);
            }
        }

        if inputs {
            Ok(slot_grad.slice(s![..self.dim()]).to_owned())
        } else {
            Ok(dw)
        }
    }
}
