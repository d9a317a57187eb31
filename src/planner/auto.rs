//! 日程自动调度器
//!
//! 每天在配置时刻（配置时区）触发一次：当天已有日程则幂等跳过，否则以
//! force_regenerate=false 调用编排器，随后执行维护扫描。独立于任何用户请求
//! 路径运行，失败只记日志并指数退避，绝不让宿主进程崩溃。

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use tokio_util::sync::CancellationToken;

use crate::config::PlanningConfig;
use crate::core::error::PlanningError;
use crate::core::time::{parse_hhmm, TimezoneManager};
use crate::planner::generator::{GenerationOrchestrator, GenerationRequest};

/// 失败退避起点/上限（秒）
const RETRY_BASE_SECS: u64 = 30;
const RETRY_MAX_SECS: u64 = 300;

/// 计算 now 之后下一次 HH:MM 触发时刻（纯函数，便于测试日界翻转）
pub fn next_trigger_after(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let trigger_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    let today_trigger = now.date().and_time(trigger_time);
    if now < today_trigger {
        today_trigger
    } else {
        today_trigger + ChronoDuration::days(1)
    }
}

/// 自动调度器
pub struct AutoScheduler {
    config: Arc<PlanningConfig>,
    orchestrator: Arc<GenerationOrchestrator>,
    tz: TimezoneManager,
    chat_id: String,
}

impl AutoScheduler {
    pub fn new(
        config: Arc<PlanningConfig>,
        orchestrator: Arc<GenerationOrchestrator>,
        chat_id: impl Into<String>,
    ) -> Self {
        let tz = TimezoneManager::new(&config.schedule.timezone);
        Self {
            config,
            orchestrator,
            tz,
            chat_id: chat_id.into(),
        }
    }

    /// 启动后台定时任务；通过 CancellationToken 停止
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.schedule.auto_generate {
                tracing::info!("Auto schedule generation disabled");
                return;
            }
            let (hour, minute) = match parse_hhmm(&self.config.schedule.auto_schedule_time) {
                // validate() 已保证可解析，这里只是兜底
                Some(m) => ((m / 60) as u32, (m % 60) as u32),
                None => {
                    tracing::error!(
                        "Bad auto_schedule_time '{}', scheduler not started",
                        self.config.schedule.auto_schedule_time
                    );
                    return;
                }
            };
            tracing::info!(
                "Auto scheduler started, daily at {:02}:{:02} ({})",
                hour,
                minute,
                self.tz.name()
            );

            let mut failures = 0u32;
            loop {
                let now = self.tz.now();
                let next = next_trigger_after(now, hour, minute);
                let wait_secs = (next - now).num_seconds().max(1) as u64;
                tracing::info!("Next schedule generation at {} ({}s)", next, wait_secs);

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_secs(wait_secs)) => {}
                }

                match self.run_once(&cancel).await {
                    Ok(_) => failures = 0,
                    Err(e) => {
                        tracing::error!("Auto generation failed: {}", e);
                        failures += 1;
                        let wait = (RETRY_BASE_SECS << (failures - 1).min(4)).min(RETRY_MAX_SECS);
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(std::time::Duration::from_secs(wait)) => {}
                        }
                    }
                }
            }
            tracing::info!("Auto scheduler stopped");
        })
    }

    /// 单次触发：已有日程跳过，否则生成 + 维护扫描
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<(), PlanningError> {
        let today = self.tz.today();

        let existing = self
            .orchestrator
            .goal_manager()
            .count_day(&self.chat_id, today)?;
        if existing > 0 {
            tracing::info!("Day {} already has {} goals, auto generation skipped", today, existing);
        } else {
            let request = GenerationRequest {
                chat_id: self.chat_id.clone(),
                day: today,
                force_regenerate: false,
            };
            self.orchestrator.generate(request, cancel).await?;
            tracing::info!("Auto generation for {} done", today);
        }

        let (promoted, deleted) = self.orchestrator.goal_manager().run_maintenance(today)?;
        tracing::debug!("Maintenance after trigger: +{} completed, -{} deleted", promoted, deleted);
        Ok(())
    }
}
