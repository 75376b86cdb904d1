//! 停车场车位预约库
//!
//! 每个车库由一个独立的 Actor (`GarageManager`) 持有其车位登记表与预约存储，
//! 外部协作方通过 `ParkingService` (实现 `ParkingOperations`) 按车库路由请求。

// 声明模块 (Declare modules)
mod clock;
mod config;
pub mod defaults;
mod directory;
mod error;
mod handle;
pub mod manager;
mod service;
mod snapshot;
mod types;

// 公开导出需要被外部 (如 main 函数、HTTP 层) 使用的类型
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GarageSpec, ParkingConfig};
pub use directory::ReservationDirectory;
pub use error::{GarageError, ParkingError};
pub use handle::GarageHandle;
pub use manager::GarageManager;
pub use service::{ParkingOperations, ParkingService};
pub use snapshot::{GarageRow, GarageSnapshot, ParkingSnapshot, ReservationRow, SpotRow};
pub use types::{
    CancelConfirmation, CancelledReservation, FeeBreakdown, FreeSpots, GarageId, GarageInfo,
    Money, PaymentQuote, PaymentStatus, Request, Reservation, ReservationEnd, ReservationId,
    ReservationWindow, Spot, SpotId, SpotNumber, VehicleType,
};
