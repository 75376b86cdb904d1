//! 车位登记表模块
//! 定义了单个车库内车位集合及其占用标记的 trait 和实现。

use crate::types::{GarageError, GarageId, Spot, SpotId, SpotNumber, VehicleType};
use std::collections::HashMap;
use tracing::{debug, trace};

/// 判断车位对给定车辆类型约束是否可用 (空闲且类型匹配)。
/// `vehicle_type` 为 `None` 时只要求空闲。
pub fn spot_accepts(spot: &Spot, vehicle_type: Option<VehicleType>) -> bool {
    !spot.is_occupied && vehicle_type.map_or(true, |v| v.fits(spot.spot_type))
}

/// `SpotRegistry` Trait
///
/// 独占地持有一个车库的车位占用状态。
/// 实现此 Trait 的组件负责：
/// 1. 按车位编号升序保存车位。
/// 2. 按车辆类型列出空闲车位。
/// 3. 提供幂等的占用 / 释放标记。
///
/// 标记方法只应在 `GarageManager` 的原子区段内调用。
pub trait SpotRegistry: Send + 'static {
    /// 所属车库 ID。
    fn garage_id(&self) -> GarageId;

    /// 全部车位，按车位编号升序。
    fn spots(&self) -> &[Spot];

    /// 按 ID 查找车位。
    fn spot(&self, spot_id: SpotId) -> Option<&Spot>;

    /// 列出 `vehicle_type` 可用的空闲车位编号 (升序)。
    /// 自行车可以使用空闲的汽车车位。
    fn free_spots(&self, vehicle_type: VehicleType) -> Vec<SpotNumber> {
        self.spots()
            .iter()
            .filter(|s| spot_accepts(s, Some(vehicle_type)))
            .map(|s| s.spot_number)
            .collect()
    }

    /// 将车位标记为占用。已占用时再次调用无副作用。
    ///
    /// # Returns
    /// * `Err(GarageError::SpotNotFound)`: 车位不存在。
    fn mark_occupied(&mut self, spot_id: SpotId) -> Result<(), GarageError>;

    /// 将车位标记为空闲。已空闲时再次调用无副作用。
    fn mark_free(&mut self, spot_id: SpotId) -> Result<(), GarageError>;
}

/// `SpotRegistry` Trait 的默认实现：内存中的有序车位数组加 ID 索引。
pub struct DefaultSpotRegistry {
    garage_id: GarageId,
    /// 按车位编号升序排列
    spots: Vec<Spot>,
    /// SpotId -> spots 中的下标
    index: HashMap<SpotId, usize>,
}

impl DefaultSpotRegistry {
    /// 创建车位登记表。传入的车位会按编号排序。
    pub fn new(garage_id: GarageId, mut spots: Vec<Spot>) -> Self {
        spots.sort_by_key(|s| s.spot_number);
        let index = spots
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        debug!(
            "(SpotRegistry) 车库 {} 登记了 {} 个车位",
            garage_id,
            spots.len()
        );
        DefaultSpotRegistry {
            garage_id,
            spots,
            index,
        }
    }

    fn set_occupied(&mut self, spot_id: SpotId, occupied: bool) -> Result<(), GarageError> {
        let idx = *self
            .index
            .get(&spot_id)
            .ok_or(GarageError::SpotNotFound(spot_id))?;
        let spot = &mut self.spots[idx];
        if spot.is_occupied != occupied {
            spot.is_occupied = occupied;
            trace!(
                "(SpotRegistry) 车库 {} 车位 #{} (ID {}) 占用状态 -> {}",
                self.garage_id,
                spot.spot_number,
                spot_id,
                occupied
            );
        }
        Ok(())
    }
}

impl SpotRegistry for DefaultSpotRegistry {
    fn garage_id(&self) -> GarageId {
        self.garage_id
    }

    fn spots(&self) -> &[Spot] {
        &self.spots
    }

    fn spot(&self, spot_id: SpotId) -> Option<&Spot> {
        self.index.get(&spot_id).map(|&i| &self.spots[i])
    }

    fn mark_occupied(&mut self, spot_id: SpotId) -> Result<(), GarageError> {
        self.set_occupied(spot_id, true)
    }

    fn mark_free(&mut self, spot_id: SpotId) -> Result<(), GarageError> {
        self.set_occupied(spot_id, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot(id: SpotId, number: SpotNumber, spot_type: VehicleType) -> Spot {
        Spot {
            id,
            garage_id: 1,
            spot_number: number,
            spot_type,
            is_occupied: false,
        }
    }

    fn mixed_registry() -> DefaultSpotRegistry {
        // 故意乱序传入，验证按编号排序
        DefaultSpotRegistry::new(
            1,
            vec![
                spot(13, 3, VehicleType::Bike),
                spot(11, 1, VehicleType::Car),
                spot(14, 4, VehicleType::Bike),
                spot(12, 2, VehicleType::Car),
            ],
        )
    }

    #[test]
    fn test_spots_sorted_by_number() {
        let registry = mixed_registry();
        let numbers: Vec<_> = registry.spots().iter().map(|s| s.spot_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(registry.spot(13).map(|s| s.spot_number), Some(3));
        assert!(registry.spot(99).is_none());
    }

    #[test]
    fn test_free_spots_by_vehicle_type() {
        let mut registry = mixed_registry();
        assert_eq!(registry.free_spots(VehicleType::Car), vec![1, 2]);
        assert_eq!(registry.free_spots(VehicleType::Bike), vec![1, 2, 3, 4]);

        registry.mark_occupied(11).unwrap();
        registry.mark_occupied(14).unwrap();
        assert_eq!(registry.free_spots(VehicleType::Car), vec![2]);
        assert_eq!(registry.free_spots(VehicleType::Bike), vec![2, 3]);
    }

    #[test]
    fn test_marking_is_idempotent() {
        let mut registry = mixed_registry();
        registry.mark_occupied(12).unwrap();
        registry.mark_occupied(12).unwrap();
        assert!(registry.spot(12).unwrap().is_occupied);
        registry.mark_free(12).unwrap();
        registry.mark_free(12).unwrap();
        assert!(!registry.spot(12).unwrap().is_occupied);
    }

    #[test]
    fn test_marking_unknown_spot_fails() {
        let mut registry = mixed_registry();
        assert_eq!(
            registry.mark_occupied(404),
            Err(GarageError::SpotNotFound(404))
        );
        assert_eq!(registry.mark_free(404), Err(GarageError::SpotNotFound(404)));
    }

    #[test]
    fn test_spot_accepts() {
        let mut car = spot(1, 1, VehicleType::Car);
        let bike = spot(2, 2, VehicleType::Bike);
        assert!(spot_accepts(&car, None));
        assert!(spot_accepts(&car, Some(VehicleType::Bike)));
        assert!(!spot_accepts(&bike, Some(VehicleType::Car)));
        car.is_occupied = true;
        assert!(!spot_accepts(&car, None));
    }
}
