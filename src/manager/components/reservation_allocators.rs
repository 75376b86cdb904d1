//! 预约分配器模块
//! 定义了用于选择车位和生成预约 ID 的 trait 和实现。

use crate::manager::components::spot_registry::{spot_accepts, SpotRegistry};
use crate::types::{ReservationId, SpotId, SpotNumber, VehicleType};
use uuid::Uuid;

/// `ReservationAllocator` Trait
///
/// 定义了车位分配策略的核心接口。
/// 实现此 Trait 的组件负责：
/// 1. 生成全局唯一的 `ReservationId`。
/// 2. 在车位登记表中选出一个满足车辆类型约束的空闲车位。
///
/// 分配器只做选择，不修改任何状态；标记车位和写入预约由 `GarageManager` 在同一个原子区段内完成。
pub trait ReservationAllocator: Send + 'static {
    /// 生成一个新的预约 ID。
    fn next_reservation_id(&mut self) -> ReservationId;

    /// 选出一个可用车位。
    ///
    /// # Arguments
    /// * `registry` - 当前车库的车位登记表。
    /// * `vehicle_type` - 车辆类型约束，`None` 表示任意空闲车位。
    ///
    /// # Returns
    /// 选中车位的 `(SpotId, SpotNumber)`，没有可用车位时返回 `None`。
    fn select_spot(
        &self,
        registry: &dyn SpotRegistry,
        vehicle_type: Option<VehicleType>,
    ) -> Option<(SpotId, SpotNumber)>;
}

/// `ReservationAllocator` Trait 的默认实现。
/// 使用随机 UUID v4 作为预约 ID，按车位编号升序选择第一个可用车位。
#[derive(Debug, Default)]
pub struct DefaultReservationAllocator;

impl DefaultReservationAllocator {
    pub fn new() -> Self {
        DefaultReservationAllocator
    }
}

impl ReservationAllocator for DefaultReservationAllocator {
    fn next_reservation_id(&mut self) -> ReservationId {
        Uuid::new_v4()
    }

    fn select_spot(
        &self,
        registry: &dyn SpotRegistry,
        vehicle_type: Option<VehicleType>,
    ) -> Option<(SpotId, SpotNumber)> {
        // spots() 已按编号升序，第一个命中即编号最小
        registry
            .spots()
            .iter()
            .find(|s| spot_accepts(s, vehicle_type))
            .map(|s| (s.id, s.spot_number))
    }
}
