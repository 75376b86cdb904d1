//! 主程序入口和示例用法演示
//!
//! 1. 读取配置 (环境变量 `PARKING_CONFIG` 指向的 JSON 文件，未设置时使用默认种子车库)。
//! 2. 启动停车服务 (每个车库一个 Actor)。
//! 3. 多个任务并发预约同一车库，验证分配到的车位互不相同。
//! 4. 取消预约、计费、报价、按车辆类型查询空闲车位。
//! 5. 关闭服务并输出最终快照 (JSON)。

use chrono::{Duration, Utc};
use futures::future::join_all;
use garage_slots::{
    GarageError, ParkingConfig, ParkingError, ParkingOperations, ParkingService,
    ReservationWindow, VehicleType,
};
use std::collections::HashSet;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

fn load_config() -> Result<ParkingConfig, ParkingError> {
    match std::env::var("PARKING_CONFIG") {
        Ok(path) => {
            info!("从 {} 读取配置", path);
            let json = std::fs::read_to_string(&path).map_err(|e| {
                ParkingError::InvalidConfig(format!("无法读取配置文件 {}: {}", path, e))
            })?;
            ParkingConfig::from_json_str(&json)
        }
        Err(_) => Ok(ParkingConfig::default()),
    }
}

#[tokio::main] // 使用 tokio 作为异步运行时
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // --- 初始化日志系统 ---
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG) // 设置日志级别
        .with_target(false) // 不显示模块路径
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("========================================================");
    info!("启动停车场车位预约示例");
    info!("========================================================");

    let config = load_config()?;
    info!(
        "配置: 车库 {} 个, 费率 {}/小时, 固定报价 {}, 默认时长 {} 小时",
        config.garages.len(),
        config.rate_per_hour,
        config.flat_quote_amount,
        config.default_reservation_hours
    );

    let service = ParkingService::start(config)?;
    for garage in service.garages() {
        info!("车库 {} ({}): {} 个车位", garage.id, garage.name, garage.capacity);
    }
    let garage_id = match service.garages().first() {
        Some(g) => g.id,
        None => {
            warn!("没有任何车库，示例结束。");
            return Ok(());
        }
    };

    // --- 并发预约 ---
    let writers = 5;
    info!("启动 {} 个并发预约任务 (车库 {})...", writers, garage_id);
    let tasks = (0..writers).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let result = service
                .reserve(garage_id, Some(VehicleType::Car), ReservationWindow::default())
                .await;
            (i, result)
        })
    });
    let mut reservations = Vec::new();
    for joined in join_all(tasks).await {
        match joined? {
            (i, Ok(r)) => {
                info!("(任务 {}) 预约成功: Res {} -> 车位 #{}", i, r.id, r.spot_number);
                reservations.push(r);
            }
            (i, Err(e)) => error!("(任务 {}) 预约失败: {}", i, e),
        }
    }
    let distinct: HashSet<_> = reservations.iter().map(|r| r.spot_id).collect();
    info!(
        "共 {} 条预约，占用 {} 个不同车位",
        reservations.len(),
        distinct.len()
    );

    // --- 显式时间窗口与开放式分配 ---
    let start = Utc::now() - Duration::minutes(90);
    let windowed = service
        .reserve(
            garage_id,
            None,
            ReservationWindow::new(start, start + Duration::minutes(90)),
        )
        .await?;
    let fee = service.compute_fee(windowed.id).await?;
    info!(
        "窗口预约 Res {}: 计费 {} 小时, 金额 {}",
        windowed.id, fee.duration_hours, fee.amount
    );

    let open = service.allocate(garage_id, start, None).await?;
    let open_fee = service.compute_fee(open.id).await?;
    let quote = service.quote_payment(open.id).await?;
    info!(
        "开放式预约 Res {}: 当前计费 {} 小时 ({}), 固定报价 {} ({:?})",
        open.id, open_fee.duration_hours, open_fee.amount, quote.amount, quote.status
    );

    // --- 取消 ---
    if let Some(first) = reservations.first() {
        let confirmation = service.cancel(first.id).await?;
        info!("{}", confirmation.message);
        match service.cancel(first.id).await {
            Err(e) if matches!(e.garage_error(), Some(GarageError::ReservationNotFound(_))) => {
                info!("重复取消被拒绝: {}", e)
            }
            other => warn!("重复取消出现意外结果: {:?}", other),
        }
    }

    // --- 空闲车位查询 ---
    for vehicle_type in [VehicleType::Car, VehicleType::Bike] {
        let free = service.list_free_spots(garage_id, vehicle_type).await?;
        info!(
            "车库 {} 可供 {} 使用的空闲车位: {:?}",
            free.garage_id, free.vehicle_type, free.available_spots
        );
    }
    if let Err(e) = service.list_free_spots(999, VehicleType::Car).await {
        info!("查询不存在的车库: {}", e);
    }

    // --- 关闭并输出快照 ---
    let snapshot = service.shutdown().await?;
    let mismatches = snapshot.occupancy_mismatches();
    if mismatches.is_empty() {
        info!("最终快照: 占用标记与有效预约一致");
    } else {
        error!("最终快照: 车位 {:?} 占用标记不一致", mismatches);
    }
    println!("{}", snapshot.to_json()?);

    info!("========================================================");
    info!("示例程序正常结束。");
    Ok(())
}
