//! 生成编排器：有界多轮状态机
//!
//! 单轮 = 构建提示词（携带上一轮反馈）→ LLM 调用（超时轮内有限重试，配额/限流
//! 立即致命）→ 解析 → 语义校验 → 质量评分。接受即去重后批量落库；轮次耗尽则
//! 返回历史最佳轮（不落库）。同一天的并发生成按天互斥，落败方直接得到
//! GenerationInProgress。Accepted 之前不产生任何写入，取消不会留下半写状态。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::config::PlanningConfig;
use crate::core::error::{LlmError, PlanningError};
use crate::core::models::{Goal, GoalDraft};
use crate::llm::LlmClient;
use crate::planner::context::ContextLoader;
use crate::planner::goals::GoalManager;
use crate::planner::{parser, prompt, schema, scorer, validator};

/// 超时重试的退避基数（秒）：1s, 2s, ...
const BACKOFF_BASE_SECS: u64 = 1;

/// 一次生成请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub chat_id: String,
    pub day: NaiveDate,
    /// true：当天旧条目整体接管；false：已有条目时直接短路返回
    pub force_regenerate: bool,
}

/// 生成结果
#[derive(Debug)]
pub enum GenerationOutcome {
    /// 已接受并落库
    Generated {
        goals: Vec<Goal>,
        score: f32,
        rounds: u32,
    },
    /// 当天已有日程，零 LLM 调用短路
    Existing { goals: Vec<Goal> },
    /// 轮次耗尽：返回历史最佳轮草稿与质量告警，未写入任何数据
    Degraded {
        drafts: Vec<GoalDraft>,
        score: f32,
        warnings: Vec<String>,
    },
}

/// 某一轮的留底（用于耗尽时选择历史最佳，而不是最后一轮）
struct RoundRecord {
    drafts: Vec<GoalDraft>,
    score: f32,
    violations: Vec<String>,
}

/// 生成编排器
pub struct GenerationOrchestrator {
    config: Arc<PlanningConfig>,
    llm: Arc<dyn LlmClient>,
    goals: Arc<GoalManager>,
    /// 在途生成的日期集合（按天互斥）
    in_flight: Mutex<HashSet<NaiveDate>>,
}

/// 在途标记的持有凭证，Drop 时释放
struct DayGuard<'a> {
    set: &'a Mutex<HashSet<NaiveDate>>,
    day: NaiveDate,
}

impl Drop for DayGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.day);
    }
}

impl GenerationOrchestrator {
    pub fn new(
        config: Arc<PlanningConfig>,
        llm: Arc<dyn LlmClient>,
        goals: Arc<GoalManager>,
    ) -> Self {
        Self {
            config,
            llm,
            goals,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn goal_manager(&self) -> &Arc<GoalManager> {
        &self.goals
    }

    /// 驱动一次完整生成
    pub async fn generate(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationOutcome, PlanningError> {
        let _guard = self.acquire_day(request.day)?;
        let cfg = &self.config.schedule;

        let loader = ContextLoader::new(&self.config, &self.goals);
        let ctx = loader.load(&request.chat_id, request.day, request.force_regenerate)?;

        // 短路：非强制且当天已有日程，零 LLM 调用
        if !request.force_regenerate && !ctx.existing.is_empty() {
            tracing::info!(
                "Day {} already has {} goals, skipping generation",
                request.day,
                ctx.existing.len()
            );
            return Ok(GenerationOutcome::Existing {
                goals: ctx.existing.clone(),
            });
        }

        let schema = schema::build_schema(cfg);
        let max_rounds = if cfg.use_multi_round { cfg.max_rounds } else { 1 };

        let mut feedback: Vec<String> = Vec::new();
        let mut best: Option<RoundRecord> = None;
        let mut last_failure = String::new();

        for round in 1..=max_rounds {
            if cancel.is_cancelled() {
                return Err(PlanningError::Cancelled);
            }

            let prompt_text = if feedback.is_empty() {
                prompt::build_schedule_prompt(&ctx, cfg, &schema)
            } else {
                prompt::build_retry_prompt(&ctx, cfg, &schema, &feedback)
            };

            tracing::info!("Generation round {}/{} for {}", round, max_rounds, request.day);
            let response = self.call_llm(&prompt_text, cancel).await?;

            let drafts = match parser::parse_schedule_response(&response, cfg) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!("Round {} parse failed: {}", round, e);
                    last_failure = e.to_string();
                    feedback = vec![format!("上一次输出不是合法的日程 JSON（{}），请严格按 Schema 输出", e)];
                    continue;
                }
            };

            let violations = validator::validate(&drafts, cfg);
            let score = scorer::score(&drafts, &violations, &ctx, cfg);
            tracing::info!(
                "Round {}: {} drafts, {} violations, score {:.2}",
                round,
                drafts.len(),
                violations.len(),
                score
            );

            let record = RoundRecord {
                drafts,
                score,
                violations,
            };
            let accepted = record.violations.is_empty() && record.score >= cfg.quality_threshold;

            if accepted {
                let goals = self.goals.apply_drafts(
                    &request.chat_id,
                    request.day,
                    &record.drafts,
                    request.force_regenerate,
                )?;
                return Ok(GenerationOutcome::Generated {
                    goals,
                    score: record.score,
                    rounds: round,
                });
            }

            // 准备下一轮反馈：校验违规优先，其次评分短板
            feedback = if record.violations.is_empty() {
                let mut reasons = scorer::shortfalls(&record.drafts, &ctx, cfg);
                reasons.insert(
                    0,
                    format!(
                        "日程质量分 {:.2} 低于要求的 {:.2}",
                        record.score, cfg.quality_threshold
                    ),
                );
                reasons
            } else {
                record.violations.clone()
            };
            last_failure = format!("validation failed: {}", feedback.join("; "));

            // 留底历史最佳（回归是可能的，不能只看最后一轮）
            if best.as_ref().map_or(true, |b| record.score > b.score) {
                best = Some(record);
            }
        }

        match best {
            Some(b) => {
                let mut warnings = b.violations;
                warnings.push(format!(
                    "{} 轮后仍未达到质量阈值 {:.2}，返回最佳轮（{:.2}），未写入",
                    max_rounds, cfg.quality_threshold, b.score
                ));
                Ok(GenerationOutcome::Degraded {
                    drafts: b.drafts,
                    score: b.score,
                    warnings,
                })
            }
            None => Err(PlanningError::GenerationFailed {
                rounds: max_rounds,
                reason: last_failure,
            }),
        }
    }

    /// LLM 调用：超时在轮内有限重试（指数退避），配额/限流立即致命
    async fn call_llm(
        &self,
        prompt_text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PlanningError> {
        let cfg = &self.config.schedule;
        let timeout = Duration::from_secs(cfg.generation_timeout_secs);

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(PlanningError::Cancelled);
            }
            let result = match tokio::time::timeout(timeout, self.llm.complete(prompt_text)).await {
                Ok(inner) => inner,
                Err(_) => Err(LlmError::Timeout(cfg.generation_timeout_secs)),
            };
            match result {
                Ok(text) => return Ok(text),
                Err(LlmError::Timeout(secs)) if attempt < cfg.llm_timeout_retries => {
                    attempt += 1;
                    let wait = BACKOFF_BASE_SECS << (attempt - 1);
                    tracing::warn!(
                        "LLM timeout after {}s, retry {}/{} in {}s",
                        secs,
                        attempt,
                        cfg.llm_timeout_retries,
                        wait
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => {
                    if e.is_fatal() {
                        tracing::error!("LLM fatal error, not retrying: {}", e);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    fn acquire_day(&self, day: NaiveDate) -> Result<DayGuard<'_>, PlanningError> {
        let mut set = self.in_flight.lock().unwrap();
        if !set.insert(day) {
            return Err(PlanningError::GenerationInProgress(day));
        }
        Ok(DayGuard {
            set: &self.in_flight,
            day,
        })
    }
}
