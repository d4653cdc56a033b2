/*
 * @Author       : 老董
 * @Description  : 计算单元（神经元）单元测试
 *
 * 测试策略：
 * 1. 构造与形状校验（1行2维权重块拒绝等）
 * 2. 前向预测（单样本与批量一致）
 * 3. 权重的读取/更新往返
 * 4. 缓存短路
 * 5. 梯度与数值微分一致（单输出与多输出）
 */

use crate::assert_err;
use crate::errors::NetworkError;
use crate::nn::{Activation, Neuron, Trainable};
use approx::assert_abs_diff_eq;
use ndarray::{array, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// 测试单输出构造：偏置在系数第0位
#[test]
fn test_neuron_creation_single() {
    let n = Neuron::new(array![1.0, 2.0], 0.5, Activation::Identity);
    assert_eq!(n.ndim(), 2);
    assert_eq!(n.n_outputs(), 1);
    assert_eq!(n.coef_size(), 3);
    assert_eq!(n.training_weights(), array![0.5, 1.0, 2.0]);
    assert_eq!(n.node_id(), None);
    assert_eq!(n.tag(), None);
}

/// 测试多输出构造与形状拒绝
#[test]
fn test_neuron_creation_multi() {
    let n = Neuron::multi(
        Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        array![0.1, 0.2],
        Activation::Softmax,
    )
    .unwrap();
    assert_eq!(n.ndim(), 3);
    assert_eq!(n.n_outputs(), 2);
    assert_eq!(n.coef_size(), 8);
    // 展平按行：每行偏置在前
    assert_eq!(
        n.training_weights(),
        array![0.1, 1.0, 2.0, 3.0, 0.2, 4.0, 5.0, 6.0]
    );

    // 恰好1行的2维权重块有歧义，必须用1维形式
    let result = Neuron::multi(
        Array2::from_shape_vec((1, 3), vec![1.0, 2.0, 3.0]).unwrap(),
        array![0.1],
        Activation::Identity,
    );
    assert_err!(result, NetworkError::InvalidShape { .. });

    // 偏置长度与输出数不一致
    let result = Neuron::multi(
        Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        array![0.1],
        Activation::Identity,
    );
    assert_err!(result, NetworkError::InvalidShape { .. });
}

/// 随机初始化：softmax类默认生成2输出权重块；同种子结果可复现
#[test]
fn test_neuron_random() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = Neuron::random(4, Activation::Sigmoid, &mut rng);
    assert_eq!(n.ndim(), 4);
    assert_eq!(n.n_outputs(), 1);

    let n = Neuron::random(4, Activation::Softmax4, &mut rng);
    assert_eq!(n.ndim(), 4);
    assert_eq!(n.n_outputs(), 2);

    let mut rng1 = StdRng::seed_from_u64(42);
    let mut rng2 = StdRng::seed_from_u64(42);
    assert_eq!(
        Neuron::random(3, Activation::Relu, &mut rng1),
        Neuron::random(3, Activation::Relu, &mut rng2)
    );
}

/// 恒等神经元：权重[1,1]、偏置0，输入[1,2]输出3
#[test]
fn test_neuron_predict_identity() {
    let n = Neuron::new(array![1.0, 1.0], 0.0, Activation::Identity);
    let y = n.predict(&array![1.0, 2.0].view());
    assert_eq!(y, array![3.0]);
}

/// 单样本与批量复制必须逐行一致
#[test]
fn test_neuron_predict_batch_consistency() {
    let n = Neuron::new(array![0.7, -0.4, 1.1], 0.3, Activation::Sigmoid);
    let x = array![0.5, -1.0, 2.0];
    let single = n.predict(&x.view());

    let mut batch = Array2::zeros((4, 3));
    for mut row in batch.axis_iter_mut(Axis(0)) {
        row.assign(&x);
    }
    let out = n.predict_batch(&batch.view());
    assert_eq!(out.nrows(), 4);
    for row in out.axis_iter(Axis(0)) {
        assert_abs_diff_eq!(row[0], single[0], epsilon = 1e-15);
    }

    // 多输出批量
    let n = Neuron::multi(
        Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        array![0.0, 0.0],
        Activation::Softmax,
    )
    .unwrap();
    let x = array![0.3, 0.9];
    let single = n.predict(&x.view());
    let batch = Array2::from_shape_vec((2, 2), vec![0.3, 0.9, 0.3, 0.9]).unwrap();
    let out = n.predict_batch(&batch.view());
    for row in out.axis_iter(Axis(0)) {
        assert_abs_diff_eq!(row[0], single[0], epsilon = 1e-15);
        assert_abs_diff_eq!(row[1], single[1], epsilon = 1e-15);
    }
}

/// +δ再-δ必须精确还原；替换语义必须精确往返
#[test]
fn test_update_training_weights_roundtrip() {
    let mut n = Neuron::new(array![1.0, -2.0], 0.5, Activation::Sigmoid);
    let before = n.training_weights();

    let delta = array![0.25, -0.5, 0.125];
    n.update_training_weights(&delta.view(), true).unwrap();
    assert_eq!(n.training_weights(), array![0.75, 0.5, -1.875]);
    n.update_training_weights(&delta.mapv(|v| -v).view(), true).unwrap();
    assert_eq!(n.training_weights(), before);

    let replacement = array![9.0, 8.0, 7.0];
    n.update_training_weights(&replacement.view(), false).unwrap();
    assert_eq!(n.training_weights(), replacement);
}

/// 长度不符的更新向量报错且系数保持原样
#[test]
fn test_update_training_weights_bad_length() {
    let mut n = Neuron::new(array![1.0, -2.0], 0.5, Activation::Identity);
    let before = n.training_weights();
    let result = n.update_training_weights(&array![1.0, 2.0].view(), true);
    assert_err!(result, NetworkError::InvalidShape { .. });
    assert_eq!(n.training_weights(), before);
}

/// 提供了缓存就必须短路重算（用伪造缓存验证）
#[test]
fn test_fill_cache_short_circuit() {
    let n = Neuron::new(array![1.0, 1.0], 0.0, Activation::Identity);
    let x = array![1.0, 2.0];
    let cache = n.fill_cache(&x.view());
    assert_eq!(cache.linear, array![3.0]);
    assert_eq!(cache.activated, array![3.0]);

    // 伪造的缓存值被原样采信，说明确实没有重算
    let mut fake = cache.clone();
    fake.activated = array![100.0];
    let y = array![0.0];
    let loss = n.loss(&x.view(), &y.view(), Some(&fake)).unwrap();
    assert_abs_diff_eq!(loss, 10000.0, epsilon = 1e-9);
}

/// 相等性：系数与激活函数决定，id与标签不参与
#[test]
fn test_neuron_equality() {
    let a = Neuron::new(array![1.0, 2.0], 0.5, Activation::Sigmoid);
    let b = Neuron::new(array![1.0, 2.0], 0.5, Activation::Sigmoid).with_tag("来源标记");
    assert_eq!(a, b);

    let c = Neuron::new(array![1.0, 2.0], 0.5, Activation::Relu);
    assert_ne!(a, c);
    let d = Neuron::new(array![1.0, 2.1], 0.5, Activation::Sigmoid);
    assert_ne!(a, d);
}

/// 数值微分辅助：loss对系数的梯度
fn numeric_weight_gradient(n: &Neuron, x: &Array1<f64>, y: &Array1<f64>, h: f64) -> Array1<f64> {
    let w = n.training_weights();
    let mut grad = Array1::zeros(w.len());
    for j in 0..w.len() {
        let mut probe = n.clone();
        let mut wp = w.clone();
        wp[j] += h;
        probe.update_training_weights(&wp.view(), false).unwrap();
        let lp = probe.loss(&x.view(), &y.view(), None).unwrap();
        let mut wm = w.clone();
        wm[j] -= h;
        probe.update_training_weights(&wm.view(), false).unwrap();
        let lm = probe.loss(&x.view(), &y.view(), None).unwrap();
        grad[j] = (lp - lm) / (2.0 * h);
    }
    grad
}

/// 单输出sigmoid神经元：完整梯度（含L2正则项）与数值微分一致
#[test]
fn test_gradient_matches_finite_difference_single() {
    let n = Neuron::new(array![0.8, -0.5], 0.2, Activation::Sigmoid);
    let x = array![0.6, -0.3];
    let y = array![0.4];

    let grad = n.gradient(&x.view(), &y.view(), false).unwrap();
    let numeric = numeric_weight_gradient(&n, &x, &y, 1e-6);
    for j in 0..grad.len() {
        assert_abs_diff_eq!(grad[j], numeric[j], epsilon = 1e-6);
    }
}

/// 多输出softmax神经元：完整梯度与数值微分一致
#[test]
fn test_gradient_matches_finite_difference_multi() {
    let n = Neuron::multi(
        Array2::from_shape_vec((2, 2), vec![0.9, -0.2, 0.3, 0.7]).unwrap(),
        array![0.1, -0.1],
        Activation::Softmax,
    )
    .unwrap();
    let x = array![0.5, 1.2];
    let y = array![0.7, 0.3];

    let grad = n.gradient(&x.view(), &y.view(), false).unwrap();
    let numeric = numeric_weight_gradient(&n, &x, &y, 1e-6);
    // 每行2个输入权重加1个偏置，共2行
    assert_eq!(grad.len(), 6);
    for j in 0..grad.len() {
        assert_abs_diff_eq!(grad[j], numeric[j], epsilon = 1e-5);
    }
}

/// 对输入的梯度（inputs=true）与数值微分一致
#[test]
fn test_input_gradient_matches_finite_difference() {
    let n = Neuron::new(array![0.8, -0.5], 0.2, Activation::Sigmoid);
    let x = array![0.6, -0.3];
    let y = array![0.4];
    let h = 1e-6;

    let grad = n.gradient(&x.view(), &y.view(), true).unwrap();
    assert_eq!(grad.len(), 2);
    for j in 0..x.len() {
        let mut xp = x.clone();
        xp[j] += h;
        let mut xm = x.clone();
        xm[j] -= h;
        let numeric = (n.loss(&xp.view(), &y.view(), None).unwrap()
            - n.loss(&xm.view(), &y.view(), None).unwrap())
            / (2.0 * h);
        assert_abs_diff_eq!(grad[j], numeric, epsilon = 1e-6);
    }
}

/// 目标值长度与输出数不符时报错
#[test]
fn test_loss_target_mismatch() {
    let n = Neuron::new(array![1.0], 0.0, Activation::Identity);
    let result = n.loss(&array![1.0].view(), &array![1.0, 2.0].view(), None);
    assert_err!(result, NetworkError::DimensionMismatch { .. });
}

/// serde往返：系数、激活、id与标签全部保留
#[test]
fn test_neuron_serde_roundtrip() {
    let n = Neuron::new(array![1.5, -2.5], 0.75, Activation::Sigmoid4).with_tag("N3-th");
    let json = serde_json::to_string(&n).unwrap();
    let back: Neuron = serde_json::from_str(&json).unwrap();
    assert_eq!(n, back);
    assert_eq!(back.tag(), Some("N3-th"));
}
