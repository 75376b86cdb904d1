//! 预约存储模块
//! 定义了单个车库内有效预约与已取消预约历史的 trait 和实现。

use crate::types::{
    CancelledReservation, GarageError, Reservation, ReservationId, SpotId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};

/// `ReservationStore` Trait
///
/// 独占地持有预约记录的生命周期。
/// 同一车位任一时刻至多有一条有效预约，`insert` 会拒绝违反这一点的写入。
pub trait ReservationStore: Send + 'static {
    /// 插入一条新的有效预约。
    ///
    /// # Returns
    /// * `Err(GarageError::Persistence)`: 预约 ID 重复，或该车位已被另一条有效预约占用。
    fn insert(&mut self, reservation: Reservation) -> Result<(), GarageError>;

    /// 查找有效预约。已取消的预约不会被返回。
    fn get(&self, reservation_id: ReservationId) -> Option<&Reservation>;

    /// 将有效预约移入历史 (取消)。返回被归档的预约。
    fn archive(
        &mut self,
        reservation_id: ReservationId,
        cancelled_at: DateTime<Utc>,
    ) -> Option<Reservation>;

    /// 直接丢弃一条有效预约，不写入历史。
    /// 仅用于回滚从未成功交付给调用方的预约。
    fn discard(&mut self, reservation_id: ReservationId) -> Option<Reservation>;

    /// 该 ID 是否对应一条已取消的预约。
    fn was_cancelled(&self, reservation_id: ReservationId) -> bool;

    /// 引用该车位的有效预约。
    fn active_for_spot(&self, spot_id: SpotId) -> Option<&Reservation>;

    /// 全部有效预约，按车位编号升序。
    fn active(&self) -> Vec<&Reservation>;

    /// 已取消预约的历史，按取消顺序排列。
    fn history(&self) -> &[CancelledReservation];
}

/// `ReservationStore` Trait 的默认实现 (内存)。
#[derive(Default)]
pub struct DefaultReservationStore {
    active: HashMap<ReservationId, Reservation>,
    /// SpotId -> 占用该车位的有效预约
    by_spot: HashMap<SpotId, ReservationId>,
    history: Vec<CancelledReservation>,
}

impl DefaultReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReservationStore for DefaultReservationStore {
    fn insert(&mut self, reservation: Reservation) -> Result<(), GarageError> {
        if self.active.contains_key(&reservation.id) || self.was_cancelled(reservation.id) {
            return Err(GarageError::Persistence(format!(
                "预约 ID {} 已存在",
                reservation.id
            )));
        }
        if let Some(holder) = self.by_spot.get(&reservation.spot_id) {
            return Err(GarageError::Persistence(format!(
                "车位 ID {} 已被预约 {} 占用",
                reservation.spot_id, holder
            )));
        }
        debug!(
            "(ReservationStore) 写入预约 {} (车库 {}, 车位 #{})",
            reservation.id, reservation.garage_id, reservation.spot_number
        );
        self.by_spot.insert(reservation.spot_id, reservation.id);
        self.active.insert(reservation.id, reservation);
        Ok(())
    }

    fn get(&self, reservation_id: ReservationId) -> Option<&Reservation> {
        self.active.get(&reservation_id)
    }

    fn archive(
        &mut self,
        reservation_id: ReservationId,
        cancelled_at: DateTime<Utc>,
    ) -> Option<Reservation> {
        let reservation = self.discard(reservation_id)?;
        self.history.push(CancelledReservation {
            reservation: reservation.clone(),
            cancelled_at,
        });
        Some(reservation)
    }

    fn discard(&mut self, reservation_id: ReservationId) -> Option<Reservation> {
        let reservation = self.active.remove(&reservation_id)?;
        if self.by_spot.remove(&reservation.spot_id) != Some(reservation_id) {
            warn!(
                "(ReservationStore) 车位索引与预约 {} 不一致 (车位 ID {})",
                reservation_id, reservation.spot_id
            );
        }
        Some(reservation)
    }

    fn was_cancelled(&self, reservation_id: ReservationId) -> bool {
        self.history
            .iter()
            .any(|c| c.reservation.id == reservation_id)
    }

    fn active_for_spot(&self, spot_id: SpotId) -> Option<&Reservation> {
        self.by_spot
            .get(&spot_id)
            .and_then(|id| self.active.get(id))
    }

    fn active(&self) -> Vec<&Reservation> {
        let mut all: Vec<&Reservation> = self.active.values().collect();
        all.sort_by_key(|r| r.spot_number);
        all
    }

    fn history(&self) -> &[CancelledReservation] {
        &self.history
    }
}
