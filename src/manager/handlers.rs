//! 车库 Actor 的请求处理逻辑
//!
//! 每个 `handle_*` 方法负责：执行操作、通过 oneshot 通道回复、处理回复失败。
//! 真正修改状态的是 `reserve_spot` / `cancel_reservation` 两个原子区段，
//! 它们在出错时会撤销已经完成的部分修改。

use super::GarageManager;
use crate::types::{
    CancelConfirmation, CancelRequest, ComputeFeeRequest, FeeBreakdown, FreeSpots, GarageError,
    ListFreeSpotsRequest, PaymentQuote, QuotePaymentRequest, Reservation, ReservationEnd,
    ReservationId, ReserveRequest, VehicleType,
};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};

impl GarageManager {
    /// 处理创建预约 (Reserve / Allocate) 请求
    pub(crate) fn handle_reserve(&mut self, req: ReserveRequest) {
        match self.reserve_spot(req.vehicle_type, req.start, req.end) {
            Ok(reservation) => {
                if req.reply_tx.send(Ok(reservation.clone())).is_err() {
                    // 调用方已放弃等待：预约从未交付，撤销它以免车位被永久占用
                    error!(
                        "(GarageManager) 发送 Reserve 回复失败 for Res {}，回滚预约。",
                        reservation.id
                    );
                    self.rollback_reservation(&reservation);
                } else {
                    trace!(
                        "(GarageManager) 已成功回复 Reserve 请求 for Res {} (车库 {}, 车位 #{})",
                        reservation.id,
                        reservation.garage_id,
                        reservation.spot_number
                    );
                }
            }
            Err(e) => {
                warn!("(GarageManager) 车库 {} Reserve 失败: {}", self.garage.id, e);
                let _ = req.reply_tx.send(Err(e));
            }
        }
    }

    /// 处理取消预约请求
    pub(crate) fn handle_cancel(&mut self, req: CancelRequest) {
        let result = self.cancel_reservation(req.reservation_id);
        if let Err(ref e) = result {
            warn!("(GarageManager) 车库 {} Cancel 失败: {}", self.garage.id, e);
        }
        if req.reply_tx.send(result).is_err() {
            // 取消已经生效，调用方只是收不到确认
            warn!(
                "(GarageManager) 发送 Cancel 回复失败 for Res {}",
                req.reservation_id
            );
        }
    }

    /// 处理按时长计费请求
    pub(crate) fn handle_compute_fee(&mut self, req: ComputeFeeRequest) {
        let result = self.compute_fee(req.reservation_id, self.clock.now());
        if req.reply_tx.send(result).is_err() {
            warn!(
                "(GarageManager) 发送 ComputeFee 回复失败 for Res {}",
                req.reservation_id
            );
        }
    }

    /// 处理固定金额报价请求
    pub(crate) fn handle_quote_payment(&mut self, req: QuotePaymentRequest) {
        let result = self.quote_payment(req.reservation_id);
        if req.reply_tx.send(result).is_err() {
            warn!(
                "(GarageManager) 发送 QuotePayment 回复失败 for Res {}",
                req.reservation_id
            );
        }
    }

    /// 处理空闲车位查询请求
    pub(crate) fn handle_list_free_spots(&mut self, req: ListFreeSpotsRequest) {
        let free = self.list_free_spots(req.vehicle_type);
        if req.reply_tx.send(Ok(free)).is_err() {
            warn!(
                "(GarageManager) 发送 ListFreeSpots 回复失败 (车库 {})",
                self.garage.id
            );
        }
    }

    // --- 原子区段 ---

    /// 选车位、标记占用、写入预约。
    ///
    /// 三步之间没有挂起点；写入失败时撤销占用标记，调用结束后要么三步全部生效，要么全部未发生。
    pub(crate) fn reserve_spot(
        &mut self,
        vehicle_type: Option<VehicleType>,
        start: Option<DateTime<Utc>>,
        end: ReservationEnd,
    ) -> Result<Reservation, GarageError> {
        let garage_id = self.garage.id;
        let (spot_id, spot_number) = self
            .allocator
            .select_spot(&*self.registry, vehicle_type)
            .ok_or(GarageError::NoAvailableSpots(garage_id))?;

        let start_time = start.unwrap_or_else(|| self.clock.now());
        let end_time = match end {
            ReservationEnd::DefaultSpan => Some(start_time + self.default_span),
            ReservationEnd::At(at) => Some(at),
            ReservationEnd::OpenEnded => None,
        };
        let reservation = Reservation {
            id: self.allocator.next_reservation_id(),
            garage_id,
            spot_id,
            spot_number,
            start_time,
            end_time,
        };

        self.registry.mark_occupied(spot_id)?;
        if let Err(e) = self.store.insert(reservation.clone()) {
            error!(
                "(GarageManager) 写入预约 {} 失败: {}。回滚车位 #{} 的占用标记。",
                reservation.id, e, spot_number
            );
            if let Err(rollback_err) = self.registry.mark_free(spot_id) {
                error!(
                    "(GarageManager) 回滚车位 ID {} 失败: {}",
                    spot_id, rollback_err
                );
            }
            return Err(e);
        }
        // 回复之前登记目录：调用方收到回复之后无论做什么，预约都可以通过 ID 找到
        if !self.directory.claim(reservation.id, garage_id) {
            error!(
                "(GarageManager) 预约 ID {} 已在目录中登记，回滚。",
                reservation.id
            );
            self.undo_local(&reservation);
            return Err(GarageError::Internal(format!(
                "预约 ID {} 重复",
                reservation.id
            )));
        }

        info!(
            "(GarageManager) 车库 {} 车位 #{} 已预约: Res {} ({} ~ {:?})",
            garage_id, spot_number, reservation.id, start_time, end_time
        );
        Ok(reservation)
    }

    /// 归档预约并释放车位。未知 ID 与已取消 ID 都返回 `ReservationNotFound`。
    pub(crate) fn cancel_reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<CancelConfirmation, GarageError> {
        let (spot_id, spot_number) = match self.store.get(reservation_id) {
            Some(r) => (r.spot_id, r.spot_number),
            None => {
                if self.store.was_cancelled(reservation_id) {
                    debug!(
                        "(GarageManager) 预约 {} 已被取消过，拒绝重复取消",
                        reservation_id
                    );
                }
                return Err(GarageError::ReservationNotFound(reservation_id));
            }
        };

        self.registry.mark_free(spot_id)?;
        if self
            .store
            .archive(reservation_id, self.clock.now())
            .is_none()
        {
            // get 刚刚成功，这里不应发生；恢复占用标记保持不变量
            if let Err(e) = self.registry.mark_occupied(spot_id) {
                error!("(GarageManager) 恢复车位 ID {} 占用标记失败: {}", spot_id, e);
            }
            return Err(GarageError::Internal(format!(
                "预约 {} 归档失败",
                reservation_id
            )));
        }

        self.directory.forget(reservation_id);

        info!(
            "(GarageManager) 车库 {} 预约 {} 已取消，车位 #{} 释放",
            self.garage.id, reservation_id, spot_number
        );
        Ok(CancelConfirmation {
            reservation_id,
            garage_id: self.garage.id,
            spot_number,
            message: format!("Reservation {} cancelled.", reservation_id),
        })
    }

    /// 撤销一条尚未交付给调用方的预约，不写入取消历史，同时注销目录登记。
    fn rollback_reservation(&mut self, reservation: &Reservation) {
        self.directory.forget(reservation.id);
        self.undo_local(reservation);
    }

    /// 从存储中丢弃预约并释放车位，不触碰目录。
    fn undo_local(&mut self, reservation: &Reservation) {
        if self.store.discard(reservation.id).is_none() {
            warn!(
                "(GarageManager) 回滚时未找到预约 {}",
                reservation.id
            );
        }
        if let Err(e) = self.registry.mark_free(reservation.spot_id) {
            error!(
                "(GarageManager) 回滚时释放车位 ID {} 失败: {}",
                reservation.spot_id, e
            );
        }
    }

    // --- 只读操作 ---

    pub(crate) fn compute_fee(
        &self,
        reservation_id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<FeeBreakdown, GarageError> {
        let reservation = self
            .store
            .get(reservation_id)
            .ok_or(GarageError::ReservationNotFound(reservation_id))?;
        Ok(self.fee_calculator.compute_fee(reservation, now))
    }

    pub(crate) fn quote_payment(
        &self,
        reservation_id: ReservationId,
    ) -> Result<PaymentQuote, GarageError> {
        let reservation = self
            .store
            .get(reservation_id)
            .ok_or(GarageError::ReservationNotFound(reservation_id))?;
        Ok(self.fee_calculator.quote_payment(reservation))
    }

    pub(crate) fn list_free_spots(&self, vehicle_type: VehicleType) -> FreeSpots {
        FreeSpots {
            garage_id: self.garage.id,
            vehicle_type,
            available_spots: self.registry.free_spots(vehicle_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::config::ParkingConfig;
    use crate::directory::ReservationDirectory;
    use crate::manager::components::{
        DefaultReservationAllocator, GarageComponents, ReservationAllocator, ReservationStore,
        SpotRegistry,
    };
    use crate::types::{CancelledReservation, GarageInfo, Spot, SpotId, SpotNumber};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tokio::sync::{mpsc, oneshot};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0).unwrap()
    }

    fn spots(count: u32) -> Vec<Spot> {
        (1..=count)
            .map(|n| Spot {
                id: 100 + n as SpotId,
                garage_id: 1,
                spot_number: n,
                spot_type: if n == count {
                    VehicleType::Bike
                } else {
                    VehicleType::Car
                },
                is_occupied: false,
            })
            .collect()
    }

    // 直接构造 GarageManager，不启动事件循环
    fn manager_with(components: GarageComponents, count: u32) -> (GarageManager, ManualClock) {
        let clock = ManualClock::new(t0());
        let (_tx, request_rx) = mpsc::channel(1);
        let manager = GarageManager {
            garage: GarageInfo {
                id: 1,
                name: "Garage 1".to_string(),
                capacity: count as usize,
            },
            request_rx,
            registry: components.registry,
            store: components.store,
            allocator: components.allocator,
            fee_calculator: components.fee_calculator,
            directory: ReservationDirectory::new(),
            clock: Arc::new(clock.clone()),
            default_span: Duration::hours(24),
        };
        (manager, clock)
    }

    fn manager(count: u32) -> (GarageManager, ManualClock) {
        let components = GarageComponents::with_defaults(1, spots(count), &ParkingConfig::default());
        manager_with(components, count)
    }

    fn occupied_numbers(manager: &GarageManager) -> Vec<u32> {
        manager
            .registry
            .spots()
            .iter()
            .filter(|s| s.is_occupied)
            .map(|s| s.spot_number)
            .collect()
    }

    #[test]
    fn test_reserve_defaults_window() {
        let (mut m, _clock) = manager(4);
        let r = m
            .reserve_spot(None, None, ReservationEnd::DefaultSpan)
            .unwrap();
        assert_eq!(r.spot_number, 1);
        assert_eq!(r.start_time, t0());
        assert_eq!(r.end_time, Some(t0() + Duration::hours(24)));
        assert_eq!(occupied_numbers(&m), vec![1]);
    }

    #[test]
    fn test_reserve_lowest_number_reused_after_cancel() {
        let (mut m, _clock) = manager(4);
        let first = m.reserve_spot(None, None, ReservationEnd::DefaultSpan).unwrap();
        let second = m.reserve_spot(None, None, ReservationEnd::DefaultSpan).unwrap();
        assert_eq!((first.spot_number, second.spot_number), (1, 2));

        m.cancel_reservation(first.id).unwrap();
        assert_eq!(occupied_numbers(&m), vec![2]);

        let third = m.reserve_spot(None, None, ReservationEnd::DefaultSpan).unwrap();
        assert_eq!(third.spot_number, 1);
    }

    #[test]
    fn test_reserve_car_skips_bike_spot_and_fails_when_full() {
        let (mut m, _clock) = manager(3);
        for expected in 1..=2 {
            let r = m
                .reserve_spot(Some(VehicleType::Car), None, ReservationEnd::DefaultSpan)
                .unwrap();
            assert_eq!(r.spot_number, expected);
        }
        assert_eq!(
            m.reserve_spot(Some(VehicleType::Car), None, ReservationEnd::DefaultSpan),
            Err(GarageError::NoAvailableSpots(1))
        );
        // 自行车仍可使用剩下的自行车车位
        let bike = m
            .reserve_spot(Some(VehicleType::Bike), None, ReservationEnd::DefaultSpan)
            .unwrap();
        assert_eq!(bike.spot_number, 3);
    }

    #[test]
    fn test_cancel_twice_fails_second_time() {
        let (mut m, _clock) = manager(2);
        let r = m.reserve_spot(None, None, ReservationEnd::DefaultSpan).unwrap();
        let confirmation = m.cancel_reservation(r.id).unwrap();
        assert_eq!(
            confirmation.message,
            format!("Reservation {} cancelled.", r.id)
        );
        assert_eq!(
            m.cancel_reservation(r.id),
            Err(GarageError::ReservationNotFound(r.id))
        );
        assert!(occupied_numbers(&m).is_empty());
        assert_eq!(m.store.history().len(), 1);
    }

    #[test]
    fn test_compute_fee_open_ended_grows_with_clock() {
        let (mut m, clock) = manager(2);
        let r = m
            .reserve_spot(None, Some(t0()), ReservationEnd::OpenEnded)
            .unwrap();
        clock.advance(Duration::minutes(10));
        let early = m.compute_fee(r.id, clock.now()).unwrap();
        clock.advance(Duration::hours(2));
        let late = m.compute_fee(r.id, clock.now()).unwrap();
        assert_eq!(early.duration_hours, 1);
        assert_eq!(late.duration_hours, 3);
        assert!(late.amount >= early.amount);
    }

    #[test]
    fn test_fee_and_quote_for_unknown_reservation() {
        let (m, _clock) = manager(2);
        let id = uuid::Uuid::new_v4();
        assert_eq!(
            m.compute_fee(id, t0()),
            Err(GarageError::ReservationNotFound(id))
        );
        assert_eq!(m.quote_payment(id), Err(GarageError::ReservationNotFound(id)));
    }

    #[test]
    fn test_reply_failure_rolls_back_reservation() {
        let (mut m, _clock) = manager(2);
        let (reply_tx, reply_rx) = oneshot::channel();
        drop(reply_rx);
        m.handle_reserve(ReserveRequest {
            vehicle_type: None,
            start: None,
            end: ReservationEnd::DefaultSpan,
            reply_tx,
        });
        assert!(occupied_numbers(&m).is_empty());
        assert!(m.store.active().is_empty());
        assert!(m.store.history().is_empty());
    }

    /// 写入总是失败的存储，用于验证占用标记回滚。
    struct FailingStore;

    impl ReservationStore for FailingStore {
        fn insert(&mut self, _reservation: Reservation) -> Result<(), GarageError> {
            Err(GarageError::Persistence("disk full".to_string()))
        }
        fn get(&self, _id: ReservationId) -> Option<&Reservation> {
            None
        }
        fn archive(&mut self, _id: ReservationId, _at: DateTime<Utc>) -> Option<Reservation> {
            None
        }
        fn discard(&mut self, _id: ReservationId) -> Option<Reservation> {
            None
        }
        fn was_cancelled(&self, _id: ReservationId) -> bool {
            false
        }
        fn active_for_spot(&self, _spot_id: SpotId) -> Option<&Reservation> {
            None
        }
        fn active(&self) -> Vec<&Reservation> {
            Vec::new()
        }
        fn history(&self) -> &[CancelledReservation] {
            &[]
        }
    }

    #[test]
    fn test_store_failure_rolls_back_spot_mark() {
        let mut components = GarageComponents::with_defaults(1, spots(2), &ParkingConfig::default());
        components.store = Box::new(FailingStore);
        let (mut m, _clock) = manager_with(components, 2);
        let err = m
            .reserve_spot(None, None, ReservationEnd::DefaultSpan)
            .unwrap_err();
        assert_eq!(err, GarageError::Persistence("disk full".to_string()));
        assert!(occupied_numbers(&m).is_empty());
    }

    #[test]
    fn test_list_free_spots() {
        let (mut m, _clock) = manager(3);
        m.reserve_spot(Some(VehicleType::Car), None, ReservationEnd::DefaultSpan)
            .unwrap();
        let cars = m.list_free_spots(VehicleType::Car);
        assert_eq!(cars.available_spots, vec![2]);
        let bikes = m.list_free_spots(VehicleType::Bike);
        assert_eq!(bikes.available_spots, vec![2, 3]);
        assert_eq!(bikes.garage_id, 1);
    }

    #[test]
    fn test_directory_registered_before_reply_and_forgotten_on_cancel() {
        let (mut m, _clock) = manager(3);
        let r = m.reserve_spot(None, None, ReservationEnd::DefaultSpan).unwrap();
        assert_eq!(m.directory.locate(r.id), Some(1));

        m.cancel_reservation(r.id).unwrap();
        assert_eq!(m.directory.locate(r.id), None);
    }

    #[test]
    fn test_reply_failure_forgets_directory_entry() {
        let (mut m, _clock) = manager(2);
        let (reply_tx, reply_rx) = oneshot::channel();
        drop(reply_rx);
        m.handle_reserve(ReserveRequest {
            vehicle_type: None,
            start: None,
            end: ReservationEnd::DefaultSpan,
            reply_tx,
        });
        assert!(m.directory.is_empty());
    }

    /// 总是返回同一个预约 ID 的分配器。
    struct FixedIdAllocator(ReservationId);

    impl ReservationAllocator for FixedIdAllocator {
        fn next_reservation_id(&mut self) -> ReservationId {
            self.0
        }

        fn select_spot(
            &self,
            registry: &dyn SpotRegistry,
            vehicle_type: Option<VehicleType>,
        ) -> Option<(SpotId, SpotNumber)> {
            DefaultReservationAllocator::new().select_spot(registry, vehicle_type)
        }
    }

    #[test]
    fn test_id_taken_by_other_garage_rolls_back_without_touching_it() {
        let id = uuid::Uuid::new_v4();
        let mut components = GarageComponents::with_defaults(1, spots(2), &ParkingConfig::default());
        components.allocator = Box::new(FixedIdAllocator(id));
        let (mut m, _clock) = manager_with(components, 2);
        assert!(m.directory.claim(id, 7));

        let err = m
            .reserve_spot(None, None, ReservationEnd::DefaultSpan)
            .unwrap_err();
        assert!(matches!(err, GarageError::Internal(_)));
        assert!(occupied_numbers(&m).is_empty());
        assert!(m.store.active().is_empty());
        assert_eq!(m.directory.locate(id), Some(7));
    }
}
