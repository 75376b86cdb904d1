//! 库使用的默认参数。
//! `ParkingConfig::default()` 以及演示程序都从这里取值。

use std::num::NonZeroUsize;

/// 按时长计费时每小时的费率。
pub const DEFAULT_RATE_PER_HOUR: u64 = 10;

/// 固定金额支付预览 (`quote_payment`) 返回的金额。
pub const DEFAULT_FLAT_QUOTE_AMOUNT: u64 = 100;

/// 未指定结束时间时，预约的默认时长 (小时)。
pub const DEFAULT_RESERVATION_HOURS: i64 = 24;

/// 每个车库 Actor 请求通道的缓冲区大小。
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 128;

/// 初始种子数据：车库数量。
pub const SEED_GARAGE_COUNT: usize = 3;

/// 初始种子数据：每个车库的汽车车位数量。
pub const SEED_SPOTS_PER_GARAGE: u32 = 24;

pub(crate) fn default_channel_buffer_size() -> NonZeroUsize {
    NonZeroUsize::new(DEFAULT_CHANNEL_BUFFER_SIZE).unwrap_or(NonZeroUsize::MIN)
}
