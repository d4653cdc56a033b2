/*
 * @Author       : 老董
 * @Date         : 2026-07-16
 * @Description  : 网络的Graphviz DOT导出（纯展示用的序列化，不参与计算）
 */

use super::Network;
use ndarray::ArrayView1;
use std::fmt::Write;

/// 按权重符号选择边的颜色：零为灰、负为红、正为蓝
fn edge_color(w: f64) -> &'static str {
    if w == 0.0 {
        ", color=grey, fontcolor=grey"
    } else if w < 0.0 {
        ", color=red, fontcolor=red"
    } else {
        ", color=blue, fontcolor=blue"
    }
}

impl Network {
    /// 导出为DOT格式的有向图描述
    ///
    /// 每个全局输入槽位一个节点、每个神经元输出槽位一个节点，
    /// 边上标注连接权重。传入样本`x`时，各槽位会附带该样本下的取值。
    /// 可在线预览：<https://dreampuf.github.io/GraphvizOnline/>
    pub fn to_dot(&self, x: Option<&ArrayView1<f64>>) -> String {
        let state = x.map(|sample| self.predict(sample));

        let mut dot = String::new();
        dot.push_str("digraph Tree {\n");
        dot.push_str("node [shape=box, fontsize=10];\n");
        dot.push_str("edge [fontsize=8];\n");

        // 1. 输入槽位
        for i in 0..self.dim() {
            match x {
                Some(sample) => {
                    let _ = writeln!(dot, "{i} [label=\"X[{i}]=\\n{:1.2}\"];", sample[i]);
                }
                None => {
                    let _ = writeln!(dot, "{i} [label=\"X[{i}]\"];");
                }
            }
        }

        // 2. 神经元节点与入边
        for (id, (node, attr)) in self.nodes_iter().enumerate() {
            let weights = node.input_weights();
            let multi = attr.n_outputs > 1;

            // 节点名：单输出用槽位号，多输出用record形状、每个槽位一个port
            let node_name = if multi {
                let slots: Vec<String> = attr.outputs().map(|o| o.to_string()).collect();
                format!("s{}", slots.join("a"))
            } else {
                attr.first_output.to_string()
            };

            let mut label = String::new();
            if let Some(tag) = node.tag() {
                label.push_str(tag);
                label.push_str("\\n");
            }
            let _ = write!(
                label,
                "a={}\\nid={} b={} s={}",
                node.activation(),
                id,
                node.bias(),
                attr.n_outputs
            );
            if let Some(st) = &state {
                let outs: Vec<String> = attr.outputs().map(|o| format!("{:1.2}", st[o])).collect();
                let _ = write!(label, "\\ny=[{}]", outs.join(", "));
            }
            if multi {
                let ports: Vec<String> = attr.outputs().map(|o| format!("<f{o}> {o}")).collect();
                let _ = writeln!(
                    dot,
                    "{node_name} [shape=record, label=\"{label}\\n{}\"];",
                    ports.join("|")
                );
            } else {
                let _ = writeln!(dot, "{node_name} [label=\"{label}\"];");
            }

            for (ii, &inp) in attr.inputs.iter().enumerate() {
                if multi {
                    for (oi, slot) in attr.outputs().enumerate() {
                        let w = weights[[oi, ii]];
                        let _ = writeln!(
                            dot,
                            "{inp} -> {node_name}:f{slot} [label=\"{oi}|{w}\"{}];",
                            edge_color(w)
                        );
                    }
                } else {
                    let w = weights[[0, ii]];
                    let _ = writeln!(
                        dot,
                        "{inp} -> {node_name} [label=\"{w}\"{}];",
                        edge_color(w)
                    );
                }
            }
        }

        dot.push('}');
        dot
    }
}
