//! 停车服务的配置。
//!
//! 所有字段都有默认值 (见 `defaults` 模块)，因此 JSON 配置文件只需写出需要覆盖的字段。

use crate::defaults::{
    default_channel_buffer_size, DEFAULT_FLAT_QUOTE_AMOUNT, DEFAULT_RATE_PER_HOUR,
    DEFAULT_RESERVATION_HOURS, SEED_GARAGE_COUNT, SEED_SPOTS_PER_GARAGE,
};
use crate::error::ParkingError;
use crate::types::{Money, VehicleType};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;

/// 单个车库的布局。
///
/// 车位编号从 1 开始，先排汽车车位，再排自行车车位。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarageSpec {
    pub name: String,
    pub car_spots: u32,
    #[serde(default)]
    pub bike_spots: u32,
}

impl GarageSpec {
    pub fn new(name: impl Into<String>, car_spots: u32, bike_spots: u32) -> Self {
        Self {
            name: name.into(),
            car_spots,
            bike_spots,
        }
    }

    /// 车位总数。超出 `u32` 范围时饱和，`ParkingConfig::validate` 会拒绝这种布局。
    pub fn capacity(&self) -> u32 {
        self.car_spots.saturating_add(self.bike_spots)
    }

    /// 按车位编号顺序列出每个车位的类型。
    pub fn spot_types(&self) -> impl Iterator<Item = VehicleType> {
        let cars = std::iter::repeat(VehicleType::Car).take(self.car_spots as usize);
        let bikes = std::iter::repeat(VehicleType::Bike).take(self.bike_spots as usize);
        cars.chain(bikes)
    }
}

/// 停车服务的全局配置。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkingConfig {
    /// `compute_fee` 使用的每小时费率。
    pub rate_per_hour: Money,
    /// `quote_payment` 返回的固定金额。
    pub flat_quote_amount: Money,
    /// 未指定结束时间时预约的默认时长 (小时)，必须大于 0。
    pub default_reservation_hours: i64,
    /// 每个车库 Actor 请求通道的缓冲区大小。
    pub channel_buffer_size: NonZeroUsize,
    /// 没有任何车库时用于初始化的种子车库。
    pub garages: Vec<GarageSpec>,
}

impl Default for ParkingConfig {
    fn default() -> Self {
        let garages = (1..=SEED_GARAGE_COUNT)
            .map(|n| GarageSpec::new(format!("Garage {}", n), SEED_SPOTS_PER_GARAGE, 0))
            .collect();
        Self {
            rate_per_hour: DEFAULT_RATE_PER_HOUR,
            flat_quote_amount: DEFAULT_FLAT_QUOTE_AMOUNT,
            default_reservation_hours: DEFAULT_RESERVATION_HOURS,
            channel_buffer_size: default_channel_buffer_size(),
            garages,
        }
    }
}

impl ParkingConfig {
    /// 从 JSON 文本加载配置，缺失字段取默认值，并执行校验。
    pub fn from_json_str(json: &str) -> Result<Self, ParkingError> {
        let config: ParkingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_garages(mut self, garages: Vec<GarageSpec>) -> Self {
        self.garages = garages;
        self
    }

    pub fn with_rate_per_hour(mut self, rate: Money) -> Self {
        self.rate_per_hour = rate;
        self
    }

    pub fn with_flat_quote_amount(mut self, amount: Money) -> Self {
        self.flat_quote_amount = amount;
        self
    }

    pub fn validate(&self) -> Result<(), ParkingError> {
        if self.default_reservation_hours <= 0 {
            return Err(ParkingError::InvalidConfig(format!(
                "default_reservation_hours 必须大于 0, 实际为 {}",
                self.default_reservation_hours
            )));
        }
        if let Some(spec) = self.garages.iter().find(|g| g.name.trim().is_empty()) {
            return Err(ParkingError::InvalidConfig(format!(
                "车库名称不能为空 (车位数 {})",
                spec.capacity()
            )));
        }
        if let Some(spec) = self
            .garages
            .iter()
            .find(|g| g.car_spots.checked_add(g.bike_spots).is_none())
        {
            return Err(ParkingError::InvalidConfig(format!(
                "车库 {} 的车位总数超出范围 (汽车 {}, 自行车 {})",
                spec.name, spec.car_spots, spec.bike_spots
            )));
        }
        Ok(())
    }

    pub(crate) fn default_span(&self) -> chrono::Duration {
        chrono::Duration::hours(self.default_reservation_hours)
    }
}
