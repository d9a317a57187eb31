//! 引擎配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NECTAR__*` 覆盖（双下划线表示嵌套，
//! 如 `NECTAR__SCHEDULE__MAX_ROUNDS=3`）。加载后必须调用 validate() 再投入使用。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::error::PlanningError;
use crate::core::time::parse_hhmm;
use crate::core::validate::sanitize_custom_prompt;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlanningConfig {
    pub schedule: ScheduleSection,
    pub persona: PersonaSection,
    pub preferences: PreferencesSection,
    pub cache: CacheSection,
    pub cleanup: CleanupSection,
    pub admin: AdminSection,
}

/// [schedule] 段：生成参数、多轮开关、定时触发
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// 是否向对话注入当前日程状态
    pub inject_schedule: bool,
    /// 是否启用每日定时生成
    pub auto_generate: bool,
    /// 定时生成时刻（HH:MM，配置时区）
    pub auto_schedule_time: String,
    /// IANA 时区名
    pub timezone: String,
    pub use_multi_round: bool,
    /// 生成轮次上限（1-3）
    pub max_rounds: u32,
    /// 质量阈值（0.80-0.90）
    pub quality_threshold: f32,
    pub min_activities: usize,
    pub max_activities: usize,
    /// 描述长度窗口（字符）
    pub min_description_length: usize,
    pub max_description_length: usize,
    /// 相邻活动空档告警阈值（分钟）
    pub gap_threshold_minutes: u16,
    /// 单次 LLM 调用超时（秒）
    pub generation_timeout_secs: u64,
    /// 超时在轮内的重试次数上限
    pub llm_timeout_retries: u32,
    /// 自定义风格指令（使用前经 sanitize）
    pub custom_prompt: String,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            inject_schedule: true,
            auto_generate: true,
            auto_schedule_time: "00:30".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            use_multi_round: true,
            max_rounds: 2,
            quality_threshold: 0.85,
            min_activities: 8,
            max_activities: 15,
            min_description_length: 15,
            max_description_length: 60,
            gap_threshold_minutes: 30,
            generation_timeout_secs: 180,
            llm_timeout_retries: 2,
            custom_prompt: String::new(),
        }
    }
}

/// [persona] 段：人设（缺失时生成直接失败）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PersonaSection {
    pub bot_name: String,
    pub personality: String,
    pub interest: String,
    pub reply_style: String,
}

/// [preferences] 段：作息/用餐锚点（HH:MM）与兴趣活动
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PreferencesSection {
    pub wake_time: Option<String>,
    pub sleep_time: Option<String>,
    pub breakfast_time: Option<String>,
    pub lunch_time: Option<String>,
    pub dinner_time: Option<String>,
    pub favorite_activities: Vec<String>,
}

impl PreferencesSection {
    /// 已声明的时间锚点（名称, 分钟数），忽略不可解析项
    pub fn anchors(&self) -> Vec<(&'static str, u16)> {
        let mut out = Vec::new();
        let fields = [
            ("起床", &self.wake_time),
            ("睡觉", &self.sleep_time),
            ("早餐", &self.breakfast_time),
            ("午餐", &self.lunch_time),
            ("晚餐", &self.dinner_time),
        ];
        for (name, value) in fields {
            if let Some(m) = value.as_deref().and_then(parse_hhmm) {
                out.push((name, m));
            }
        }
        out
    }
}

/// [cache] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub ttl_secs: u64,
    pub max_size: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_size: 100,
        }
    }
}

/// [cleanup] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    /// 完成/取消多少天后删除
    pub old_goals_days: u32,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self { old_goals_days: 30 }
    }
}

/// [admin] 段：管理员列表（权限执行在核心之外）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AdminSection {
    pub users: Vec<String>,
}

impl PlanningConfig {
    /// 校验配置合法性；非法配置拒绝启动而不是带病运行
    pub fn validate(&self) -> Result<(), PlanningError> {
        let s = &self.schedule;

        if s.min_activities < 1 || s.min_activities > s.max_activities {
            return Err(PlanningError::Config(format!(
                "activity count range invalid: {}-{}",
                s.min_activities, s.max_activities
            )));
        }
        if s.min_description_length < 5 || s.min_description_length > s.max_description_length {
            return Err(PlanningError::Config(format!(
                "description length range invalid: {}-{}",
                s.min_description_length, s.max_description_length
            )));
        }
        if !(1..=3).contains(&s.max_rounds) {
            return Err(PlanningError::Config(format!(
                "max_rounds must be 1-3, got {}",
                s.max_rounds
            )));
        }
        if !(0.80..=0.90).contains(&s.quality_threshold) {
            return Err(PlanningError::Config(format!(
                "quality_threshold must be 0.80-0.90, got {}",
                s.quality_threshold
            )));
        }
        if s.generation_timeout_secs < 10 {
            return Err(PlanningError::Config(format!(
                "generation_timeout_secs must be >= 10, got {}",
                s.generation_timeout_secs
            )));
        }
        if s.gap_threshold_minutes == 0 {
            return Err(PlanningError::Config(
                "gap_threshold_minutes must be positive".to_string(),
            ));
        }
        if parse_hhmm(&s.auto_schedule_time).is_none() {
            return Err(PlanningError::Config(format!(
                "auto_schedule_time not HH:MM: {}",
                s.auto_schedule_time
            )));
        }
        // 清洗失败视为配置错误（报告，不截断）
        sanitize_custom_prompt(&s.custom_prompt)?;

        if self.cache.max_size == 0 {
            return Err(PlanningError::Config(
                "cache.max_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 清洗后的自定义指令（validate 已保证可通过）
    pub fn sanitized_custom_prompt(&self) -> String {
        sanitize_custom_prompt(&self.schedule.custom_prompt).unwrap_or_default()
    }
}

/// 从 config 目录加载配置，环境变量 NECTAR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NECTAR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<PlanningConfig, PlanningError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NECTAR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder
        .build()
        .map_err(|e| PlanningError::Config(e.to_string()))?;
    let cfg: PlanningConfig = c
        .try_deserialize()
        .map_err(|e| PlanningError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = PlanningConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.schedule.max_rounds, 2);
        assert_eq!(cfg.cache.max_size, 100);
        assert_eq!(cfg.cleanup.old_goals_days, 30);
    }

    #[test]
    fn test_validate_rejects_inverted_activity_range() {
        let mut cfg = PlanningConfig::default();
        cfg.schedule.min_activities = 20;
        cfg.schedule.max_activities = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_rounds_and_threshold() {
        let mut cfg = PlanningConfig::default();
        cfg.schedule.max_rounds = 0;
        assert!(cfg.validate().is_err());
        cfg.schedule.max_rounds = 4;
        assert!(cfg.validate().is_err());

        let mut cfg = PlanningConfig::default();
        cfg.schedule.quality_threshold = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_trigger_time() {
        let mut cfg = PlanningConfig::default();
        cfg.schedule.auto_schedule_time = "25:00".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_dirty_custom_prompt() {
        let mut cfg = PlanningConfig::default();
        cfg.schedule.custom_prompt = "```ignore".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_preference_anchors() {
        let prefs = PreferencesSection {
            breakfast_time: Some("08:00".to_string()),
            lunch_time: Some("not-a-time".to_string()),
            ..Default::default()
        };
        let anchors = prefs.anchors();
        assert_eq!(anchors, vec![("早餐", 480)]);
    }
}
