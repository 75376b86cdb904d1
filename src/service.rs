//! 面向外部协作方的停车服务。
//!
//! `ParkingService` 为每个车库启动一个 `GarageManager` Actor，并按车库 ID 路由请求。
//! 预约 ID 是全局唯一的不透明令牌。各车库 Actor 在原子区段内维护共享的
//! [`ReservationDirectory`]，服务只读取它来路由 `cancel` / `compute_fee` / `quote_payment`。
//!
//! HTTP 路由、会话等外层逻辑通过 [`ParkingOperations`] trait 调用本服务。

use crate::{
    clock::{Clock, SystemClock},
    config::ParkingConfig,
    directory::ReservationDirectory,
    error::ParkingError,
    handle::GarageHandle,
    manager::{components::GarageComponents, GarageManager},
    snapshot::{GarageSnapshot, ParkingSnapshot},
    types::{
        CancelConfirmation, FeeBreakdown, FreeSpots, GarageError, GarageId, GarageInfo,
        PaymentQuote, Reservation, ReservationEnd, ReservationId, ReservationWindow, Spot, SpotId,
        VehicleType,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 外部协作方 (HTTP 层等) 使用的核心操作接口。
#[async_trait]
pub trait ParkingOperations: Send + Sync {
    /// 在指定车库预约第一个满足车辆类型的空闲车位。
    ///
    /// 窗口缺省开始时间为当前时间，缺省结束时间为开始时间 + 默认时长。
    async fn reserve(
        &self,
        garage_id: GarageId,
        vehicle_type: Option<VehicleType>,
        window: ReservationWindow,
    ) -> Result<Reservation, ParkingError>;

    /// 以调用方给定的时间窗口分配车位，不限车辆类型。`end` 为 `None` 时为开放式预约。
    async fn allocate(
        &self,
        garage_id: GarageId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Reservation, ParkingError>;

    async fn cancel(
        &self,
        reservation_id: ReservationId,
    ) -> Result<CancelConfirmation, ParkingError>;

    async fn quote_payment(
        &self,
        reservation_id: ReservationId,
    ) -> Result<PaymentQuote, ParkingError>;

    async fn compute_fee(
        &self,
        reservation_id: ReservationId,
    ) -> Result<FeeBreakdown, ParkingError>;

    async fn list_free_spots(
        &self,
        garage_id: GarageId,
        vehicle_type: VehicleType,
    ) -> Result<FreeSpots, ParkingError>;
}

#[derive(Debug)]
struct GarageEntry {
    info: GarageInfo,
    handle: GarageHandle,
}

/// 多车库停车服务。克隆体共享同一组车库 Actor。
#[derive(Debug, Clone)]
pub struct ParkingService {
    garages: Arc<BTreeMap<GarageId, GarageEntry>>,
    /// 有效预约所在的车库，由车库 Actor 写入
    directory: ReservationDirectory,
}

impl ParkingService {
    /// 按配置中的种子车库启动服务，使用系统时钟。必须在 Tokio 运行时内调用。
    pub fn start(config: ParkingConfig) -> Result<Self, ParkingError> {
        Self::start_with_clock(config, Arc::new(SystemClock))
    }

    /// 与 [`ParkingService::start`] 相同，但使用给定的时钟。
    ///
    /// 车库 ID 从 1 开始依次分配，车位 ID 在所有车库间连续编号。
    pub fn start_with_clock(
        config: ParkingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ParkingError> {
        config.validate()?;
        let directory = ReservationDirectory::new();
        let mut garages = BTreeMap::new();
        let mut next_spot_id: SpotId = 1;

        for (index, spec) in config.garages.iter().enumerate() {
            let garage_id = (index + 1) as GarageId;
            let spots: Vec<Spot> = spec
                .spot_types()
                .zip(1..)
                .map(|(spot_type, spot_number)| {
                    let spot = Spot {
                        id: next_spot_id,
                        garage_id,
                        spot_number,
                        spot_type,
                        is_occupied: false,
                    };
                    next_spot_id += 1;
                    spot
                })
                .collect();
            let info = GarageInfo {
                id: garage_id,
                name: spec.name.clone(),
                capacity: spots.len(),
            };
            let components = GarageComponents::with_defaults(garage_id, spots, &config);
            let handle = GarageManager::spawn(
                info.clone(),
                components,
                directory.clone(),
                clock.clone(),
                config.default_span(),
                config.channel_buffer_size,
            );
            garages.insert(garage_id, GarageEntry { info, handle });
        }

        info!(
            "(ParkingService) 已初始化 {} 个车库，共 {} 个车位",
            garages.len(),
            next_spot_id - 1
        );
        Ok(Self {
            garages: Arc::new(garages),
            directory,
        })
    }

    /// 从快照恢复服务，使用系统时钟。
    pub fn restore(snapshot: ParkingSnapshot, config: ParkingConfig) -> Result<Self, ParkingError> {
        Self::restore_with_clock(snapshot, config, Arc::new(SystemClock))
    }

    /// 从快照恢复服务。
    ///
    /// 快照中没有任何车库时按配置初始化种子车库。
    /// 车位占用标记由有效预约重新推导，快照中的 `is_occupied` 不参与计算。
    pub fn restore_with_clock(
        snapshot: ParkingSnapshot,
        config: ParkingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ParkingError> {
        if snapshot.is_empty() {
            info!("(ParkingService) 快照为空，按配置初始化种子车库");
            return Self::start_with_clock(config, clock);
        }
        config.validate()?;

        let mismatches = snapshot.occupancy_mismatches();
        if !mismatches.is_empty() {
            warn!(
                "(ParkingService) 快照中 {} 个车位的占用标记与预约不一致，将按预约重新计算: {:?}",
                mismatches.len(),
                mismatches
            );
        }

        let mut seen_spot_ids = HashSet::new();
        let mut seen_spot_numbers = HashSet::new();
        let mut garages = BTreeMap::new();
        let directory = ReservationDirectory::new();

        for (row, spot_rows, reservation_rows) in snapshot.split_by_garage()? {
            let garage_id = row.id;
            let mut spots = Vec::with_capacity(spot_rows.len());
            for spot_row in spot_rows {
                if !seen_spot_ids.insert(spot_row.id) {
                    return Err(GarageError::Persistence(format!(
                        "快照中车位 ID {} 重复",
                        spot_row.id
                    ))
                    .into());
                }
                if !seen_spot_numbers.insert((garage_id, spot_row.spot_number)) {
                    return Err(GarageError::Persistence(format!(
                        "快照中车库 {} 的车位编号 {} 重复",
                        garage_id, spot_row.spot_number
                    ))
                    .into());
                }
                spots.push(Spot {
                    id: spot_row.id,
                    garage_id,
                    spot_number: spot_row.spot_number,
                    spot_type: spot_row.spot_type,
                    is_occupied: false,
                });
            }

            let reservations: Vec<Reservation> =
                reservation_rows.into_iter().map(Reservation::from).collect();
            for reservation in &reservations {
                if !directory.claim(reservation.id, garage_id) {
                    return Err(GarageError::Persistence(format!(
                        "快照中预约 ID {} 重复 (车库 {})",
                        reservation.id, garage_id
                    ))
                    .into());
                }
            }
            let reservation_count = reservations.len();

            let info = GarageInfo {
                id: garage_id,
                name: row.name,
                capacity: spots.len(),
            };
            let mut components = GarageComponents::with_defaults(garage_id, spots, &config);
            components.load_reservations(reservations)?;
            debug!(
                "(ParkingService) 车库 {} 已恢复 {} 条有效预约",
                garage_id, reservation_count
            );

            let handle = GarageManager::spawn(
                info.clone(),
                components,
                directory.clone(),
                clock.clone(),
                config.default_span(),
                config.channel_buffer_size,
            );
            garages.insert(garage_id, GarageEntry { info, handle });
        }

        info!(
            "(ParkingService) 已从快照恢复 {} 个车库，{} 条有效预约",
            garages.len(),
            directory.len()
        );
        Ok(Self {
            garages: Arc::new(garages),
            directory,
        })
    }

    /// 全部车库，按 ID 升序。
    pub fn garages(&self) -> Vec<GarageInfo> {
        self.garages.values().map(|e| e.info.clone()).collect()
    }

    /// 指定车库的 Handle。
    pub fn garage(&self, garage_id: GarageId) -> Result<&GarageHandle, ParkingError> {
        self.garages
            .get(&garage_id)
            .map(|e| &e.handle)
            .ok_or_else(|| GarageError::InvalidGarage(garage_id).into())
    }

    /// 逐个车库导出一致性快照并合并。
    pub async fn snapshot(&self) -> Result<ParkingSnapshot, ParkingError> {
        let parts = join_all(self.garages.values().map(|e| e.handle.snapshot())).await;
        let parts = parts.into_iter().collect::<Result<Vec<GarageSnapshot>, _>>()?;
        Ok(ParkingSnapshot::from_garages(parts))
    }

    /// 停止全部车库 Actor，返回合并后的最终快照。
    ///
    /// 每个车库都会收到关闭请求；任一车库失败时返回第一个错误。
    pub async fn shutdown(self) -> Result<ParkingSnapshot, ParkingError> {
        info!("(ParkingService) 正在关闭 {} 个车库...", self.garages.len());
        let results = join_all(
            self.garages
                .values()
                .map(|e| e.handle.clone().shutdown()),
        )
        .await;
        let parts = results.into_iter().collect::<Result<Vec<GarageSnapshot>, _>>()?;
        let snapshot = ParkingSnapshot::from_garages(parts);
        info!(
            "(ParkingService) 全部车库已关闭，剩余有效预约 {} 条",
            snapshot.reservations.len()
        );
        Ok(snapshot)
    }

    // --- 预约目录 ---

    fn locate(&self, reservation_id: ReservationId) -> Result<&GarageHandle, ParkingError> {
        match self.directory.locate(reservation_id) {
            Some(garage_id) => self.garage(garage_id),
            None => {
                debug!("(ParkingService) 目录中没有预约 {}", reservation_id);
                Err(GarageError::ReservationNotFound(reservation_id).into())
            }
        }
    }

    async fn create(
        &self,
        garage_id: GarageId,
        vehicle_type: Option<VehicleType>,
        start: Option<DateTime<Utc>>,
        end: ReservationEnd,
    ) -> Result<Reservation, ParkingError> {
        self.garage(garage_id)?
            .reserve(vehicle_type, start, end)
            .await
    }
}

#[async_trait]
impl ParkingOperations for ParkingService {
    async fn reserve(
        &self,
        garage_id: GarageId,
        vehicle_type: Option<VehicleType>,
        window: ReservationWindow,
    ) -> Result<Reservation, ParkingError> {
        let end = match window.end {
            Some(end) => ReservationEnd::At(end),
            None => ReservationEnd::DefaultSpan,
        };
        self.create(garage_id, vehicle_type, window.start, end).await
    }

    async fn allocate(
        &self,
        garage_id: GarageId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Reservation, ParkingError> {
        let end = match end {
            Some(end) => ReservationEnd::At(end),
            None => ReservationEnd::OpenEnded,
        };
        self.create(garage_id, None, Some(start), end).await
    }

    async fn cancel(
        &self,
        reservation_id: ReservationId,
    ) -> Result<CancelConfirmation, ParkingError> {
        self.locate(reservation_id)?.cancel(reservation_id).await
    }

    async fn quote_payment(
        &self,
        reservation_id: ReservationId,
    ) -> Result<PaymentQuote, ParkingError> {
        self.locate(reservation_id)?
            .quote_payment(reservation_id)
            .await
    }

    async fn compute_fee(
        &self,
        reservation_id: ReservationId,
    ) -> Result<FeeBreakdown, ParkingError> {
        self.locate(reservation_id)?.compute_fee(reservation_id).await
    }

    async fn list_free_spots(
        &self,
        garage_id: GarageId,
        vehicle_type: VehicleType,
    ) -> Result<FreeSpots, ParkingError> {
        self.garage(garage_id)?.list_free_spots(vehicle_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GarageSpec;

    fn small_config() -> ParkingConfig {
        ParkingConfig::default().with_garages(vec![
            GarageSpec::new("North", 2, 1),
            GarageSpec::new("South", 3, 0),
        ])
    }

    #[tokio::test]
    async fn test_provisioning_assigns_sequential_ids() {
        let service = ParkingService::start(small_config()).unwrap();
        let garages = service.garages();
        assert_eq!(garages.len(), 2);
        assert_eq!((garages[0].id, garages[0].capacity), (1, 3));
        assert_eq!((garages[1].id, garages[1].name.as_str()), (2, "South"));

        let snapshot = service.snapshot().await.unwrap();
        let ids: Vec<SpotId> = snapshot.spots.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(snapshot.spots[2].spot_type, VehicleType::Bike);
        assert_eq!(snapshot.spots[3].spot_number, 1);
    }

    #[tokio::test]
    async fn test_directory_tracks_active_reservations() {
        let service = ParkingService::start(small_config()).unwrap();
        let r = service
            .reserve(2, None, ReservationWindow::default())
            .await
            .unwrap();
        assert!(service.locate(r.id).is_ok());

        service.cancel(r.id).await.unwrap();
        let err = service.locate(r.id).unwrap_err();
        assert_eq!(
            err.garage_error(),
            Some(&GarageError::ReservationNotFound(r.id))
        );
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = small_config();
        config.default_reservation_hours = 0;
        assert!(matches!(
            ParkingService::start(config),
            Err(ParkingError::InvalidConfig(_))
        ));
    }
}
