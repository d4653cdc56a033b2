use thiserror::Error;

/// 网络构建与训练过程中的错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    // 权重/偏置的秩或形状不合法（如只有1行的2维权重块）
    #[error("形状不合法：{0}")]
    InvalidShape(String),

    // 激活函数查表
    #[error("未知的激活函数'{0}'")]
    UnknownActivation(String),

    // 节点入边数与权重宽度不一致等
    #[error("维度不匹配（预期{expected}，实际{got}）：{message}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        message: String,
    },

    // 图级损失/梯度要求最后一层由唯一节点构成
    #[error("输出层只支持单个节点，实际解析出{0}个")]
    MultipleOutputUnits(usize),

    #[error("不支持的操作：{0}")]
    UnsupportedOperation(String),
}
