//! 车库 Actor 核心组件的定义与导出
//!
//! 这个模块定义了构成 `GarageManager` 核心功能的各个组件的 Trait，
//! 并提供了默认的组件集合 (`GarageComponents::with_defaults`)。
//!
//! 主要内容包括：
//! - `SpotRegistry`: 车位及其占用标记。
//! - `ReservationStore`: 有效预约与取消历史。
//! - `ReservationAllocator`: 车位选择策略与预约 ID 生成。
//! - `FeeCalculator`: 按时长计费与固定报价。

// --- 子模块声明 ---
pub mod fee_calculator;
pub mod reservation_allocators;
pub mod reservation_store;
pub mod spot_registry;

// --- 公开导出子模块中的关键 Trait 和默认实现 ---
pub use fee_calculator::{billable_hours, DefaultFeeCalculator, FeeCalculator};
pub use reservation_allocators::{DefaultReservationAllocator, ReservationAllocator};
pub use reservation_store::{DefaultReservationStore, ReservationStore};
pub use spot_registry::{spot_accepts, DefaultSpotRegistry, SpotRegistry};

use crate::config::ParkingConfig;
use crate::types::{GarageError, GarageId, Reservation, Spot};

/// 一个车库 Actor 运行所需的全部组件。
///
/// 每个字段都是 trait 对象，可以单独替换为自定义实现，例如带事务的持久化存储。
pub struct GarageComponents {
    pub registry: Box<dyn SpotRegistry>,
    pub store: Box<dyn ReservationStore>,
    pub allocator: Box<dyn ReservationAllocator>,
    pub fee_calculator: Box<dyn FeeCalculator>,
}

impl GarageComponents {
    /// 使用默认实现构建一套组件，车位初始状态取自 `spots`。
    pub fn with_defaults(garage_id: GarageId, spots: Vec<Spot>, config: &ParkingConfig) -> Self {
        GarageComponents {
            registry: Box::new(DefaultSpotRegistry::new(garage_id, spots)),
            store: Box::new(DefaultReservationStore::new()),
            allocator: Box::new(DefaultReservationAllocator::new()),
            fee_calculator: Box::new(DefaultFeeCalculator::new(
                config.rate_per_hour,
                config.flat_quote_amount,
            )),
        }
    }

    /// 载入已有的有效预约 (例如从快照恢复)，同时重新计算车位占用标记。
    ///
    /// 车位占用完全由预约推导，快照中的占用标记不参与计算。
    pub fn load_reservations(&mut self, reservations: Vec<Reservation>) -> Result<(), GarageError> {
        let garage_id = self.registry.garage_id();
        for mut reservation in reservations {
            let spot_number = match self.registry.spot(reservation.spot_id) {
                Some(spot) => spot.spot_number,
                None => {
                    return Err(GarageError::Persistence(format!(
                        "预约 {} 引用了车库 {} 中不存在的车位 ID {}",
                        reservation.id, garage_id, reservation.spot_id
                    )))
                }
            };
            reservation.garage_id = garage_id;
            reservation.spot_number = spot_number;
            let spot_id = reservation.spot_id;
            self.store.insert(reservation)?;
            self.registry.mark_occupied(spot_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VehicleType;
    use chrono::Utc;
    use uuid::Uuid;

    fn components() -> GarageComponents {
        let spots = (1..=3)
            .map(|n| Spot {
                id: 10 + n as u64,
                garage_id: 4,
                spot_number: n,
                spot_type: VehicleType::Car,
                is_occupied: false,
            })
            .collect();
        GarageComponents::with_defaults(4, spots, &ParkingConfig::default())
    }

    fn reservation(spot_id: u64) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            garage_id: 0,
            spot_id,
            spot_number: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    #[test]
    fn test_load_reservations_marks_spots() {
        let mut components = components();
        components
            .load_reservations(vec![reservation(12)])
            .unwrap();
        let occupied: Vec<_> = components
            .registry
            .spots()
            .iter()
            .filter(|s| s.is_occupied)
            .map(|s| s.spot_number)
            .collect();
        assert_eq!(occupied, vec![2]);
        let loaded = components.store.active_for_spot(12).unwrap();
        assert_eq!(loaded.spot_number, 2);
        assert_eq!(loaded.garage_id, 4);
    }

    #[test]
    fn test_load_reservations_rejects_unknown_spot() {
        let mut components = components();
        let err = components
            .load_reservations(vec![reservation(99)])
            .unwrap_err();
        assert!(matches!(err, GarageError::Persistence(_)));
    }

    #[test]
    fn test_load_reservations_rejects_double_booking() {
        let mut components = components();
        let err = components
            .load_reservations(vec![reservation(11), reservation(11)])
            .unwrap_err();
        assert!(matches!(err, GarageError::Persistence(_)));
    }
}
