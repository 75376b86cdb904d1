//! 预约目录：`ReservationId -> GarageId`。
//!
//! 目录由各车库 Actor 在自己的原子区段内维护 (写入预约后、回复之前登记；取消或回滚时注销)，
//! 因此只要预约在车库中有效，目录中就一定能找到它。`ParkingService` 只读取目录用于路由。

use crate::types::{GarageId, ReservationId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// 全部车库共享的预约目录。克隆体指向同一张表。
#[derive(Debug, Clone, Default)]
pub struct ReservationDirectory {
    entries: Arc<RwLock<HashMap<ReservationId, GarageId>>>,
}

impl ReservationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预约所在的车库。
    pub fn locate(&self, reservation_id: ReservationId) -> Option<GarageId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&reservation_id)
            .copied()
    }

    /// 登记一条预约。ID 已被登记时不覆盖，返回 `false`。
    pub(crate) fn claim(&self, reservation_id: ReservationId, garage_id: GarageId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&reservation_id) {
            return false;
        }
        entries.insert(reservation_id, garage_id);
        true
    }

    pub(crate) fn forget(&self, reservation_id: ReservationId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&reservation_id);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
