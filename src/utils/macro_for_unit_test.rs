/// 错误断言宏 - 灵活粒度验证 Result 错误
///
/// # 用法
/// - `assert_err!(expr)` — 只验证是 Err
/// - `assert_err!(expr, Variant(literal))` — 验证错误类型 + 精确消息（String 变体）
/// - `assert_err!(expr, Pattern { .. })` — 验证错误类型
/// - `assert_err!(expr, Pattern { field, .. } if condition)` — 验证类型 + 条件
///
/// # 示例
/// ```ignore
/// // 只验证是错误
/// assert_err!(result);
///
/// // 验证错误类型 + 精确消息（简洁语法）
/// assert_err!(result, NetworkError::UnknownActivation("elu"));
///
/// // 验证错误类型（忽略所有字段）
/// assert_err!(result, NetworkError::DimensionMismatch { .. });
///
/// // 验证类型 + 关键字段
/// assert_err!(result, NetworkError::DimensionMismatch { expected, .. } if *expected == 2);
/// ```
#[macro_export]
macro_rules! assert_err {
    // 只验证是 Err
    ($expr:expr) => {
        assert!($expr.is_err(), "预期 Err，实际得到 {:?}", $expr);
    };
    // 简洁语法：Variant(字符串字面量) - 精确匹配 String 内容
    ($expr:expr, $err_type:ident :: $variant:ident ( $expected:literal )) => {
        match &$expr {
            Err($err_type::$variant(actual)) => assert_eq!(
                actual, $expected,
                "错误消息不匹配：预期 `{}`，实际得到 `{}`",
                $expected, actual
            ),
            Err(e) => panic!(
                "错误类型不匹配：预期 `{}::{}`，实际得到 `{:?}`",
                stringify!($err_type),
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "预期 Err({}::{})，实际得到 Ok({:?})",
                stringify!($err_type),
                stringify!($variant),
                v
            ),
        }
    };
    // 验证错误类型（模式匹配，忽略字段）
    ($expr:expr, $pattern:pat) => {
        match &$expr {
            Err($pattern) => {}
            Err(e) => panic!(
                "错误类型不匹配：预期 `{}`，实际得到 `{:?}`",
                stringify!($pattern),
                e
            ),
            Ok(v) => panic!("预期 Err({})，实际得到 Ok({:?})", stringify!($pattern), v),
        }
    };
    // 验证类型 + 条件
    ($expr:expr, $pattern:pat if $cond:expr) => {
        match &$expr {
            Err($pattern) if $cond => {}
            Err(e) => panic!(
                "错误不满足条件：预期 `{} if {}`，实际得到 `{:?}`",
                stringify!($pattern),
                stringify!($cond),
                e
            ),
            Ok(v) => panic!("预期 Err({})，实际得到 Ok({:?})", stringify!($pattern), v),
        }
    };
}
