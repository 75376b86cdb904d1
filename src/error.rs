//! 定义库中使用的错误类型。
//!
//! 本模块包含两种主要的错误枚举：
//! - `GarageError`: 表示在 `GarageManager` 内部处理请求时可能发生的具体业务逻辑错误。
//!   这些错误通常通过请求的回复通道 (`oneshot::Sender`) 返回给调用者。
//! - `ParkingError`: 这是暴露给库用户 (外部协作方) 的顶层错误类型。
//!   它封装了与车库 Actor 通信时可能发生的错误（如通道发送/接收失败）、
//!   配置与快照错误，以及从车库 Actor 收到的 `GarageError`。

use crate::types::{GarageId, Request, ReservationId, SpotId};
use thiserror::Error;
// 引入 Tokio 通道的错误类型，用于表示发送或接收失败
use tokio::sync::{mpsc, oneshot};

/// `GarageManager` 内部处理逻辑中可能产生的具体错误。
///
/// 任何返回这些错误的操作都不会留下部分修改：
/// 车位标记与预约记录要么同时生效，要么同时回滚。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GarageError {
    /// 请求的车库 ID 不存在。
    #[error("车库 ID {0} 不存在")]
    InvalidGarage(GarageId),

    /// 车库中没有满足条件的空闲车位。
    #[error("车库 {0} 没有可用车位")]
    NoAvailableSpots(GarageId),

    /// 预约 ID 未知，或者该预约已经被取消。
    #[error("预约 ID {0} 未找到")]
    ReservationNotFound(ReservationId),

    /// 车位 ID 在车位登记表中不存在。
    #[error("车位 ID {0} 不存在")]
    SpotNotFound(SpotId),

    /// 底层存储写入失败，或存储状态与不变量冲突。
    #[error("存储错误: {0}")]
    Persistence(String),

    /// 表示一个未预期的内部错误或不一致状态。
    /// 通常表示代码逻辑中存在 bug。
    #[error("内部逻辑错误: {0}")]
    Internal(String),
}

/// 外部协作方调用 `ParkingService` / `GarageHandle` 时可能遇到的顶层错误类型。
#[derive(Error, Debug)]
pub enum ParkingError {
    /// 向车库 Actor 发送请求失败。
    ///
    /// 通常发生在车库 Actor 已经关闭 (`shutdown`) 或任务异常退出之后。
    #[error("向车库发送请求失败 (车库可能已停止): {0}")]
    SendRequestError(#[from] mpsc::error::SendError<Request>),

    /// 等待车库 Actor 回复时失败 (Actor 在回复前已终止)。
    #[error("从车库接收回复失败 (车库可能已停止): {0}")]
    ReceiveReplyError(#[from] oneshot::error::RecvError),

    /// 无法识别的车辆类型字符串。
    #[error("无效的车辆类型: {0:?}")]
    InvalidVehicleType(String),

    /// 配置不合法。
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// 快照或配置的 JSON 编解码失败。
    #[error("JSON 编解码失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 车库 Actor 报告的业务逻辑错误。
    #[error("车库报告处理错误: {0}")]
    Garage(#[from] GarageError),
}

impl ParkingError {
    /// 如果是业务逻辑错误，返回其中的 `GarageError`。
    pub fn garage_error(&self) -> Option<&GarageError> {
        match self {
            ParkingError::Garage(e) => Some(e),
            _ => None,
        }
    }
}
