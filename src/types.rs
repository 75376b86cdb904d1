//! 定义库的核心数据结构和类型别名。
//!
//! 这个模块包含了在 `GarageManager`、`GarageHandle` 和 `ParkingService` 之间传递信息
//! 以及维护车库内部状态所需的基础类型定义。

// 引入车库 Actor 内部可能产生的错误类型，主要用于请求的回复通道
pub(crate) use crate::error::GarageError;
use crate::error::ParkingError;
use crate::snapshot::GarageSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
// 引入 Tokio 的 `oneshot` 通道，用于实现异步请求-响应模式
use tokio::sync::oneshot;
use uuid::Uuid;

// --- 基本类型别名 (Basic Type Aliases) ---

/// 车库的唯一标识符，从 1 开始编号。
pub type GarageId = u32;

/// 车位的全局唯一标识符 (跨车库唯一)。
pub type SpotId = u64;

/// 车位在所属车库内的编号 (1..=N)。
pub type SpotNumber = u32;

/// 预约的唯一标识符。
/// 使用随机 UUID v4 (122 位随机数)，对调用方来说是不透明的令牌。
pub type ReservationId = Uuid;

/// 金额，以最小货币单位计。
pub type Money = u64;

// --- 车辆类型 ---

/// 车辆 / 车位类型。
///
/// 自行车可以停在汽车车位上，反之不行。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Bike => "bike",
        }
    }

    /// 判断该类型的车辆能否停入 `spot_type` 类型的车位。
    pub fn fits(self, spot_type: VehicleType) -> bool {
        self == spot_type || (self == VehicleType::Bike && spot_type == VehicleType::Car)
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = ParkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "bike" => Ok(VehicleType::Bike),
            _ => Err(ParkingError::InvalidVehicleType(s.to_string())),
        }
    }
}

// --- 数据结构 (Data Structures) ---

/// 车库的概要信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageInfo {
    pub id: GarageId,
    pub name: String,
    /// 车位总数，创建后不再变化。
    pub capacity: usize,
}

/// 一个物理车位。
///
/// `is_occupied` 只会在车库 Actor 的原子区段内被修改，
/// 当且仅当存在一个引用该车位的有效预约时为 `true`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spot {
    pub id: SpotId,
    pub garage_id: GarageId,
    pub spot_number: SpotNumber,
    pub spot_type: VehicleType,
    pub is_occupied: bool,
}

/// 一条有效预约。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub garage_id: GarageId,
    pub spot_id: SpotId,
    /// 冗余保存的车位编号，便于直接返回给调用方。
    pub spot_number: SpotNumber,
    pub start_time: DateTime<Utc>,
    /// `None` 表示开放式预约 (待支付)，计费时以当前时间为结束时间。
    pub end_time: Option<DateTime<Utc>>,
}

/// 已取消 (归档) 的预约记录。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledReservation {
    pub reservation: Reservation,
    pub cancelled_at: DateTime<Utc>,
}

/// 取消预约成功后的确认信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelConfirmation {
    pub reservation_id: ReservationId,
    pub garage_id: GarageId,
    pub spot_number: SpotNumber,
    pub message: String,
}

/// 按时长计费的结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub reservation_id: ReservationId,
    pub duration_hours: u64,
    pub amount: Money,
}

/// 支付状态。目前只有待支付一种。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
}

/// 固定金额的支付预览。与 `FeeBreakdown` 相互独立。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentQuote {
    pub reservation_id: ReservationId,
    pub garage_id: GarageId,
    pub spot_id: SpotId,
    pub amount: Money,
    pub status: PaymentStatus,
}

/// 空闲车位查询结果，车位编号升序排列。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSpots {
    pub garage_id: GarageId,
    pub vehicle_type: VehicleType,
    pub available_spots: Vec<SpotNumber>,
}

/// `reserve` 操作可选的时间窗口。
/// 未提供的开始时间取当前时间，未提供的结束时间取开始时间 + 默认时长。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ReservationWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// 新预约结束时间的确定方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEnd {
    /// 开始时间 + 配置的默认时长 (24 小时)。
    DefaultSpan,
    /// 调用方指定的结束时间。
    At(DateTime<Utc>),
    /// 不设结束时间。
    OpenEnded,
}

// --- 通道和回调类型 (Channel and Callback Types) ---

/// 创建预约 (`reserve` / `allocate`) 请求的回复通道发送端。
pub type ReserveReplyTx = oneshot::Sender<Result<Reservation, GarageError>>;

/// 取消预约请求的回复通道发送端。
pub type CancelReplyTx = oneshot::Sender<Result<CancelConfirmation, GarageError>>;

/// 计费请求的回复通道发送端。
pub type FeeReplyTx = oneshot::Sender<Result<FeeBreakdown, GarageError>>;

/// 固定金额报价请求的回复通道发送端。
pub type QuoteReplyTx = oneshot::Sender<Result<PaymentQuote, GarageError>>;

/// 空闲车位查询请求的回复通道发送端。
pub type FreeSpotsReplyTx = oneshot::Sender<Result<FreeSpots, GarageError>>;

/// 快照 / 关闭请求的回复通道发送端。
pub type SnapshotReplyTx = oneshot::Sender<GarageSnapshot>;

// --- 请求结构体 (Request Structures for Handle -> GarageManager Communication) ---

/// 创建预约的请求。`reserve` 与 `allocate` 共用，区别只在于参数的默认值。
#[derive(Debug)]
pub struct ReserveRequest {
    /// 车辆类型约束，`None` 表示任意空闲车位均可。
    pub vehicle_type: Option<VehicleType>,
    /// 开始时间，`None` 表示取车库 Actor 的当前时间。
    pub start: Option<DateTime<Utc>>,
    pub end: ReservationEnd,
    pub reply_tx: ReserveReplyTx,
}

#[derive(Debug)]
pub struct CancelRequest {
    pub reservation_id: ReservationId,
    pub reply_tx: CancelReplyTx,
}

#[derive(Debug)]
pub struct ComputeFeeRequest {
    pub reservation_id: ReservationId,
    pub reply_tx: FeeReplyTx,
}

#[derive(Debug)]
pub struct QuotePaymentRequest {
    pub reservation_id: ReservationId,
    pub reply_tx: QuoteReplyTx,
}

#[derive(Debug)]
pub struct ListFreeSpotsRequest {
    pub vehicle_type: VehicleType,
    pub reply_tx: FreeSpotsReplyTx,
}

/// 枚举类型，代表所有可能通过 `GarageHandle` 发送给 `GarageManager` 的请求。
///
/// 每个车库 Actor 按到达顺序逐个处理请求，因此同一车库的所有操作天然串行化。
#[derive(Debug)]
pub enum Request {
    Reserve(ReserveRequest),
    Cancel(CancelRequest),
    ComputeFee(ComputeFeeRequest),
    QuotePayment(QuotePaymentRequest),
    ListFreeSpots(ListFreeSpotsRequest),
    /// 导出车库当前状态的一致性快照。
    Snapshot { reply_tx: SnapshotReplyTx },
    /// 导出最终快照并停止事件循环。
    Shutdown { reply_tx: SnapshotReplyTx },
}
