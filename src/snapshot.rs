//! 车库状态快照。
//!
//! 快照按持久化表结构组织 (`garages` / `spots` / `reservations`)，
//! 时间戳序列化为 RFC 3339 (ISO-8601) 字符串，预约 ID 为 UUID 字符串。

use crate::error::{GarageError, ParkingError};
use crate::types::{
    GarageId, GarageInfo, Reservation, ReservationId, Spot, SpotId, SpotNumber, VehicleType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageRow {
    pub id: GarageId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRow {
    pub id: SpotId,
    pub garage_id: GarageId,
    pub spot_number: SpotNumber,
    pub is_occupied: bool,
    #[serde(rename = "type")]
    pub spot_type: VehicleType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRow {
    pub id: ReservationId,
    pub garage_id: GarageId,
    pub spot_id: SpotId,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl From<&Spot> for SpotRow {
    fn from(spot: &Spot) -> Self {
        SpotRow {
            id: spot.id,
            garage_id: spot.garage_id,
            spot_number: spot.spot_number,
            is_occupied: spot.is_occupied,
            spot_type: spot.spot_type,
        }
    }
}

impl From<&Reservation> for ReservationRow {
    fn from(r: &Reservation) -> Self {
        ReservationRow {
            id: r.id,
            garage_id: r.garage_id,
            spot_id: r.spot_id,
            start_time: r.start_time,
            end_time: r.end_time,
        }
    }
}

impl From<ReservationRow> for Reservation {
    // 车位编号在载入车库时根据 spot_id 补全
    fn from(row: ReservationRow) -> Self {
        Reservation {
            id: row.id,
            garage_id: row.garage_id,
            spot_id: row.spot_id,
            spot_number: 0,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

/// 单个车库的一致性快照，由车库 Actor 在处理请求的间隙生成。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageSnapshot {
    pub garage: GarageRow,
    pub spots: Vec<SpotRow>,
    pub reservations: Vec<ReservationRow>,
}

impl GarageSnapshot {
    pub(crate) fn capture<'a>(
        garage: &GarageInfo,
        spots: &[Spot],
        reservations: impl IntoIterator<Item = &'a Reservation>,
    ) -> Self {
        GarageSnapshot {
            garage: GarageRow {
                id: garage.id,
                name: garage.name.clone(),
            },
            spots: spots.iter().map(SpotRow::from).collect(),
            reservations: reservations.into_iter().map(ReservationRow::from).collect(),
        }
    }
}

/// 全部车库的快照，三张表平铺。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingSnapshot {
    pub garages: Vec<GarageRow>,
    pub spots: Vec<SpotRow>,
    pub reservations: Vec<ReservationRow>,
}

impl ParkingSnapshot {
    /// 合并各车库快照，按车库 ID 排序。
    pub fn from_garages(mut parts: Vec<GarageSnapshot>) -> Self {
        parts.sort_by_key(|p| p.garage.id);
        let mut snapshot = ParkingSnapshot::default();
        for part in parts {
            snapshot.garages.push(part.garage);
            snapshot.spots.extend(part.spots);
            snapshot.reservations.extend(part.reservations);
        }
        snapshot
    }

    pub fn to_json(&self) -> Result<String, ParkingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ParkingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_empty(&self) -> bool {
        self.garages.is_empty()
    }

    /// 占用标记与有效预约不一致的车位 ID。
    /// 对于由本库生成的快照，结果总是为空。
    pub fn occupancy_mismatches(&self) -> Vec<SpotId> {
        let reserved: HashSet<SpotId> = self.reservations.iter().map(|r| r.spot_id).collect();
        self.spots
            .iter()
            .filter(|s| s.is_occupied != reserved.contains(&s.id))
            .map(|s| s.id)
            .collect()
    }

    /// 按车库拆分，供恢复时逐个构建车库 Actor。
    ///
    /// 引用未知车库的车位或预约会被报告为错误。
    pub(crate) fn split_by_garage(
        self,
    ) -> Result<Vec<(GarageRow, Vec<SpotRow>, Vec<ReservationRow>)>, ParkingError> {
        let mut parts: BTreeMap<GarageId, (GarageRow, Vec<SpotRow>, Vec<ReservationRow>)> =
            BTreeMap::new();
        for garage in self.garages {
            let id = garage.id;
            if parts.insert(id, (garage, Vec::new(), Vec::new())).is_some() {
                return Err(GarageError::Persistence(format!(
                    "快照中车库 ID {} 重复",
                    id
                ))
                .into());
            }
        }
        for spot in self.spots {
            match parts.get_mut(&spot.garage_id) {
                Some(part) => part.1.push(spot),
                None => {
                    return Err(GarageError::Persistence(format!(
                        "车位 ID {} 引用了不存在的车库 {}",
                        spot.id, spot.garage_id
                    ))
                    .into())
                }
            }
        }
        for reservation in self.reservations {
            match parts.get_mut(&reservation.garage_id) {
                Some(part) => part.2.push(reservation),
                None => {
                    return Err(GarageError::InvalidGarage(
                        reservation.garage_id,
                    )
                    .into())
                }
            }
        }
        Ok(parts.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sample() -> ParkingSnapshot {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap();
        ParkingSnapshot {
            garages: vec![GarageRow {
                id: 1,
                name: "Garage 1".to_string(),
            }],
            spots: vec![
                SpotRow {
                    id: 1,
                    garage_id: 1,
                    spot_number: 1,
                    is_occupied: true,
                    spot_type: VehicleType::Car,
                },
                SpotRow {
                    id: 2,
                    garage_id: 1,
                    spot_number: 2,
                    is_occupied: false,
                    spot_type: VehicleType::Bike,
                },
            ],
            reservations: vec![ReservationRow {
                id: Uuid::new_v4(),
                garage_id: 1,
                spot_id: 1,
                start_time: start,
                end_time: None,
            }],
        }
    }

    #[test]
    fn test_json_uses_table_layout() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["spots"][1]["type"], "bike");
        assert_eq!(value["reservations"][0]["start_time"], "2025-06-01T08:30:00Z");
        assert!(value["reservations"][0]["end_time"].is_null());
        assert_eq!(ParkingSnapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn test_occupancy_mismatches() {
        let mut snapshot = sample();
        assert!(snapshot.occupancy_mismatches().is_empty());
        snapshot.spots[1].is_occupied = true;
        assert_eq!(snapshot.occupancy_mismatches(), vec![2]);
    }

    #[test]
    fn test_split_by_garage_rejects_orphan_spot() {
        let mut snapshot = sample();
        snapshot.spots[0].garage_id = 9;
        assert!(snapshot.split_by_garage().is_err());
    }

    #[test]
    fn test_split_by_garage_groups_rows() {
        let parts = sample().split_by_garage().unwrap();
        assert_eq!(parts.len(), 1);
        let (garage, spots, reservations) = &parts[0];
        assert_eq!(garage.id, 1);
        assert_eq!(spots.len(), 2);
        assert_eq!(reservations.len(), 1);
    }
}
