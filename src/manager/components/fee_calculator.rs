//! 计费模块
//! 定义了两种相互独立的计费方式：按时长计费 (`compute_fee`) 与固定金额报价 (`quote_payment`)。

use crate::types::{FeeBreakdown, Money, PaymentQuote, PaymentStatus, Reservation};
use chrono::{DateTime, Utc};

const MILLIS_PER_HOUR: i64 = 60 * 60 * 1000;

/// 计算 `start..end` 的计费小时数 (向上取整)。
///
/// 任何正时长至少计 1 小时；结束时间不晚于开始时间时计 0 小时。
pub fn billable_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR) as u64
}

/// `FeeCalculator` Trait
///
/// 所有方法都是纯计算，不修改预约。
pub trait FeeCalculator: Send + 'static {
    /// 按时长计费。结束时间缺失时以 `now` 代替，
    /// 因此对开放式预约重复调用得到的时长单调不减。
    fn compute_fee(&self, reservation: &Reservation, now: DateTime<Utc>) -> FeeBreakdown;

    /// 固定金额的待支付报价。
    fn quote_payment(&self, reservation: &Reservation) -> PaymentQuote;
}

/// `FeeCalculator` Trait 的默认实现。
#[derive(Debug, Clone)]
pub struct DefaultFeeCalculator {
    rate_per_hour: Money,
    flat_quote_amount: Money,
}

impl DefaultFeeCalculator {
    pub fn new(rate_per_hour: Money, flat_quote_amount: Money) -> Self {
        DefaultFeeCalculator {
            rate_per_hour,
            flat_quote_amount,
        }
    }
}

impl FeeCalculator for DefaultFeeCalculator {
    fn compute_fee(&self, reservation: &Reservation, now: DateTime<Utc>) -> FeeBreakdown {
        let end = reservation.end_time.unwrap_or(now);
        let duration_hours = billable_hours(reservation.start_time, end);
        FeeBreakdown {
            reservation_id: reservation.id,
            duration_hours,
            amount: duration_hours.saturating_mul(self.rate_per_hour),
        }
    }

    fn quote_payment(&self, reservation: &Reservation) -> PaymentQuote {
        PaymentQuote {
            reservation_id: reservation.id,
            garage_id: reservation.garage_id,
            spot_id: reservation.spot_id,
            amount: self.flat_quote_amount,
            status: PaymentStatus::Pending,
        }
    }
}
