//! 定义 `GarageHandle`，这是与单个车库 Actor (`GarageManager`) 交互的接口。
//!
//! `GarageHandle` 封装了与 `GarageManager` 进行异步通信的细节：
//! 每个方法创建一个 oneshot 回复通道，把请求发送到 Actor 的 MPSC 通道，然后等待回复。
//!
//! 这个句柄是 `Clone` 的，允许多个任务共享对同一个车库的访问；
//! 所有请求由 Actor 按到达顺序逐个处理。

use crate::{
    error::ParkingError,
    snapshot::GarageSnapshot,
    types::{
        CancelConfirmation, CancelRequest, ComputeFeeRequest, FeeBreakdown, FreeSpots, GarageError,
        GarageId, ListFreeSpotsRequest, PaymentQuote, QuotePaymentRequest, Request, Reservation,
        ReservationEnd, ReservationId, ReserveRequest, VehicleType,
    },
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

/// 与 `GarageManager` 交互的句柄。
///
/// 克隆成本很低 (只复制内部的 MPSC 发送端)。
#[derive(Clone, Debug)]
pub struct GarageHandle {
    garage_id: GarageId,
    /// 用于向 `GarageManager` 发送 `Request` 的 MPSC 通道发送端。
    request_tx: mpsc::Sender<Request>,
}

impl GarageHandle {
    /// 只在 `GarageManager::spawn` 中创建。
    pub(crate) fn new(garage_id: GarageId, request_tx: mpsc::Sender<Request>) -> Self {
        Self {
            garage_id,
            request_tx,
        }
    }

    pub fn garage_id(&self) -> GarageId {
        self.garage_id
    }

    /// 在该车库中创建一条预约。
    ///
    /// # Arguments
    ///
    /// * `vehicle_type`: 车辆类型约束，`None` 表示任意空闲车位均可。
    /// * `start`: 开始时间，`None` 表示取车库的当前时间。
    /// * `end`: 结束时间的确定方式，见 [`ReservationEnd`]。
    ///
    /// # Returns
    ///
    /// * `Ok(Reservation)`: 预约成功，车位已被标记为占用。
    /// * `Err(ParkingError)`: 发送请求失败 (`SendRequestError`)、接收回复失败 (`ReceiveReplyError`)，
    ///   或者车库报告的业务逻辑错误 (`Garage`)，例如 `NoAvailableSpots`。
    pub async fn reserve(
        &self,
        vehicle_type: Option<VehicleType>,
        start: Option<DateTime<Utc>>,
        end: ReservationEnd,
    ) -> Result<Reservation, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::Reserve(ReserveRequest {
            vehicle_type,
            start,
            end,
            reply_tx,
        });
        let reservation = self.call("Reserve", request, reply_rx).await?;
        debug!(
            "(Handle) 收到 Reserve 回复: Res {} -> 车库 {} 车位 #{}",
            reservation.id, reservation.garage_id, reservation.spot_number
        );
        Ok(reservation)
    }

    /// 取消一条有效预约并释放车位。
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
    ) -> Result<CancelConfirmation, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::Cancel(CancelRequest {
            reservation_id,
            reply_tx,
        });
        self.call("Cancel", request, reply_rx).await
    }

    /// 按时长计费。开放式预约以车库当前时间作为结束时间。
    pub async fn compute_fee(
        &self,
        reservation_id: ReservationId,
    ) -> Result<FeeBreakdown, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::ComputeFee(ComputeFeeRequest {
            reservation_id,
            reply_tx,
        });
        self.call("ComputeFee", request, reply_rx).await
    }

    /// 固定金额的待支付报价。
    pub async fn quote_payment(
        &self,
        reservation_id: ReservationId,
    ) -> Result<PaymentQuote, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::QuotePayment(QuotePaymentRequest {
            reservation_id,
            reply_tx,
        });
        self.call("QuotePayment", request, reply_rx).await
    }

    /// 列出该车辆类型可用的空闲车位编号 (升序)。
    pub async fn list_free_spots(
        &self,
        vehicle_type: VehicleType,
    ) -> Result<FreeSpots, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Request::ListFreeSpots(ListFreeSpotsRequest {
            vehicle_type,
            reply_tx,
        });
        self.call("ListFreeSpots", request, reply_rx).await
    }

    /// 导出车库当前状态的一致性快照。
    pub async fn snapshot(&self) -> Result<GarageSnapshot, ParkingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send("Snapshot", Request::Snapshot { reply_tx }).await?;
        reply_rx.await.map_err(|e| {
            error!("(Handle) 接收车库 {} 快照失败: {}", self.garage_id, e);
            ParkingError::ReceiveReplyError(e)
        })
    }

    /// 停止车库 Actor，返回其最终快照。
    ///
    /// 消耗当前 Handle。其他克隆体之后发送的请求会以 `SendRequestError` 失败。
    pub async fn shutdown(self) -> Result<GarageSnapshot, ParkingError> {
        info!("(Handle) 请求关闭车库 {}...", self.garage_id);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send("Shutdown", Request::Shutdown { reply_tx }).await?;
        match reply_rx.await {
            Ok(snapshot) => {
                info!(
                    "(Handle) 车库 {} 已关闭，最终有效预约 {} 条",
                    self.garage_id,
                    snapshot.reservations.len()
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!("(Handle) 接收车库 {} 关闭回复失败: {}", self.garage_id, e);
                Err(ParkingError::ReceiveReplyError(e))
            }
        }
    }

    // --- 内部辅助 ---

    async fn send(&self, op: &'static str, request: Request) -> Result<(), ParkingError> {
        self.request_tx.send(request).await.map_err(|e| {
            error!(
                "(Handle) 向车库 {} 发送 {} 请求失败: {}",
                self.garage_id, op, e
            );
            ParkingError::SendRequestError(e)
        })?;
        trace!("(Handle) {} 请求已发送 (车库 {})", op, self.garage_id);
        Ok(())
    }

    /// 发送请求并等待带业务结果的回复。
    async fn call<T>(
        &self,
        op: &'static str,
        request: Request,
        reply_rx: oneshot::Receiver<Result<T, GarageError>>,
    ) -> Result<T, ParkingError> {
        self.send(op, request).await?;
        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(garage_err)) => {
                warn!(
                    "(Handle) {} 请求失败 (车库 {}): {}",
                    op, self.garage_id, garage_err
                );
                Err(ParkingError::Garage(garage_err))
            }
            Err(recv_error) => {
                error!(
                    "(Handle) 接收 {} 回复失败 (车库 {}): {}",
                    op, self.garage_id, recv_error
                );
                Err(ParkingError::ReceiveReplyError(recv_error))
            }
        }
    }
}
