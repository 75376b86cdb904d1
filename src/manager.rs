//! 车库 Actor (`GarageManager`) 的主模块定义和核心事件循环
//!
//! 包含 `GarageManager` 结构体定义、启动函数 (`spawn`)、主事件循环 (`run`)
//! 以及请求分发逻辑 (`handle_request`)。
//! 具体的请求处理逻辑放在 `handlers` 子模块中，可替换的核心组件放在 `components` 子模块中。
//!
//! 每个车库由一个独立的 Actor 任务持有，请求按到达顺序逐个处理：
//! 同一车库内的 `reserve` / `cancel` 天然串行化，不同车库之间互不阻塞。

// 声明子模块 (Declare submodules)
pub mod components;
mod handlers;

use crate::clock::Clock;
use crate::directory::ReservationDirectory;
use crate::handle::GarageHandle;
use crate::manager::components::{
    FeeCalculator, GarageComponents, ReservationAllocator, ReservationStore, SpotRegistry,
};
use crate::snapshot::GarageSnapshot;
use crate::types::{GarageInfo, Request};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

/// 车库 Actor 结构体定义
pub struct GarageManager {
    /// 车库概要信息
    garage: GarageInfo,
    /// 接收来自 Handle 的请求的 MPSC 通道接收端
    request_rx: mpsc::Receiver<Request>,

    /// 车位登记表，独占车位占用状态
    pub(crate) registry: Box<dyn SpotRegistry>,
    /// 预约存储，独占预约生命周期
    pub(crate) store: Box<dyn ReservationStore>,
    /// 车位选择策略与预约 ID 生成
    pub(crate) allocator: Box<dyn ReservationAllocator>,
    /// 计费
    pub(crate) fee_calculator: Box<dyn FeeCalculator>,

    /// 全部车库共享的预约目录，只在原子区段内写入
    pub(crate) directory: ReservationDirectory,
    /// 时间来源
    pub(crate) clock: Arc<dyn Clock>,
    /// 未指定结束时间时的默认预约时长
    pub(crate) default_span: chrono::Duration,
}

impl GarageManager {
    /// 启动车库 Actor 任务
    ///
    /// 返回与该车库交互的 Handle。必须在 Tokio 运行时内调用。
    pub fn spawn(
        garage: GarageInfo,
        components: GarageComponents,
        directory: ReservationDirectory,
        clock: Arc<dyn Clock>,
        default_span: chrono::Duration,
        channel_buffer_size: NonZeroUsize,
    ) -> GarageHandle {
        let chan_size = usize::from(channel_buffer_size);
        let (request_tx, request_rx) = mpsc::channel(chan_size);

        let GarageComponents {
            registry,
            store,
            allocator,
            fee_calculator,
        } = components;

        let garage_id = garage.id;
        info!(
            "(GarageManager) 车库 {} ({}) 任务已启动。车位数: {}, 通道缓冲区: {}",
            garage.id, garage.name, garage.capacity, chan_size
        );

        let manager = GarageManager {
            garage,
            request_rx,
            registry,
            store,
            allocator,
            fee_calculator,
            directory,
            clock,
            default_span,
        };

        tokio::spawn(manager.run()); // manager 的所有权转移到新任务
        GarageHandle::new(garage_id, request_tx)
    }

    /// 车库 Actor 的主事件循环
    async fn run(mut self) {
        debug!("(GarageManager) 车库 {} 事件循环开始。", self.garage.id);
        loop {
            tokio::select! {
                maybe_request = self.request_rx.recv() => {
                    match maybe_request {
                        Some(request) => {
                            trace!("(GarageManager) 车库 {} 收到请求: {:?}", self.garage.id, request);
                            // 处理请求，如果 handle_request 返回 false，则停止循环
                            if !self.handle_request(request) {
                                info!("(GarageManager) 车库 {} 收到关闭请求，停止事件循环。", self.garage.id);
                                break;
                            }
                        }
                        None => {
                            // 请求通道关闭，表示所有 Handle 都已 Drop
                            info!(
                                "(GarageManager) 车库 {} 请求通道已关闭 (Handle 已全部 Drop)，剩余 {} 条有效预约。",
                                self.garage.id,
                                self.store.active().len()
                            );
                            break;
                        }
                    }
                }
            }
        }
        info!("(GarageManager) 车库 {} 任务退出。", self.garage.id);
    }

    /// 处理单个请求的核心逻辑分发
    ///
    /// 这里是同步函数：每个请求从读取到修改状态再到回复，中间没有任何挂起点，
    /// 因此选车位与标记占用不可能被同一车库的其他请求打断。
    /// 返回 `true` 继续运行，`false` 停止事件循环。
    fn handle_request(&mut self, request: Request) -> bool {
        match request {
            Request::Reserve(req) => self.handle_reserve(req),
            Request::Cancel(req) => self.handle_cancel(req),
            Request::ComputeFee(req) => self.handle_compute_fee(req),
            Request::QuotePayment(req) => self.handle_quote_payment(req),
            Request::ListFreeSpots(req) => self.handle_list_free_spots(req),
            Request::Snapshot { reply_tx } => {
                if reply_tx.send(self.snapshot()).is_err() {
                    error!("(GarageManager) 发送车库 {} 快照失败 (通道可能已关闭)", self.garage.id);
                }
            }
            Request::Shutdown { reply_tx } => {
                let snapshot = self.snapshot();
                info!(
                    "(GarageManager) 车库 {} 关闭，最终有效预约 {} 条。",
                    self.garage.id,
                    snapshot.reservations.len()
                );
                if reply_tx.send(snapshot).is_err() {
                    error!("(GarageManager) 发送车库 {} 最终快照失败 (通道可能已关闭)", self.garage.id);
                }
                // 关闭请求是终止信号
                return false;
            }
        }
        true
    }

    fn snapshot(&self) -> GarageSnapshot {
        GarageSnapshot::capture(&self.garage, self.registry.spots(), self.store.active())
    }
}
