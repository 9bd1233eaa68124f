use serde::Deserialize;

use crate::error::FlowError;

/// 上游输入缓冲的默认容量。
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 16;

/// 上游输入缓冲的容量上限；需求额度也以它为界，驱动层的信号量不会溢出。
pub const MAX_INPUT_BUFFER_SIZE: usize = 1 << 16;

/// 泵送核心的配置项。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将“上游输入侧最多预取多少个元素”显式配置化：容量越大，写方向在一次写入中可合并的
///   元素越多；容量为 1 时退化为“每次只缓存一个单元”。
///
/// ## 契约（What）
/// - `input_buffer_size`：取值范围 `1..=MAX_INPUT_BUFFER_SIZE`，[`validate`](Self::validate) 负责校验；
/// - 支持 `serde` 反序列化，缺省字段取默认值，未知字段直接报错，避免拼写错误被静默忽略。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    input_buffer_size: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowConfig {
    /// 创建默认配置。
    pub const fn new() -> Self {
        Self {
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
        }
    }

    /// 设置上游输入缓冲容量。
    pub fn with_input_buffer_size(mut self, size: usize) -> Self {
        self.input_buffer_size = size;
        self
    }

    /// 读取上游输入缓冲容量。
    pub fn input_buffer_size(&self) -> usize {
        self.input_buffer_size
    }

    /// 校验配置。
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.input_buffer_size == 0 {
            return Err(FlowError::config("input_buffer_size must be greater than zero"));
        }
        if self.input_buffer_size > MAX_INPUT_BUFFER_SIZE {
            return Err(FlowError::config(format!(
                "input_buffer_size must not exceed {MAX_INPUT_BUFFER_SIZE}"
            )));
        }
        Ok(())
    }
}
