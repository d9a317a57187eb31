//! Mock LLM 客户端（用于测试，无需 API）
//!
//! MockLlmClient 返回一份固定的全天无缝日程；ScriptedLlmClient 按脚本依次
//! 弹出预设响应（含错误），用于多轮/失败路径测试。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::error::LlmError;
use crate::llm::LlmClient;

/// 固定返回一份合格日程的 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

/// 13 项、全天无缝衔接的样例响应（带围栏，顺带覆盖解析容错）
pub const SAMPLE_SCHEDULE_JSON: &str = r#"```json
{
  "schedule_items": [
    {"name":"睡觉","description":"蜷在被窝里一觉睡到自然醒的感觉真好","goal_type":"daily_routine","priority":"high","time_slot":"00:00","duration_hours":7.5},
    {"name":"起床洗漱","description":"迷迷糊糊爬起来刷牙洗脸清醒一下","goal_type":"daily_routine","priority":"medium","time_slot":"07:30","duration_hours":0.5},
    {"name":"早餐","description":"出门前简单吃了点面包和牛奶垫垫肚子","goal_type":"meal","priority":"high","time_slot":"08:00","duration_hours":0.5},
    {"name":"上午学习","description":"泡在图书馆认真啃书学习新的知识点","goal_type":"study","priority":"high","time_slot":"08:30","duration_hours":3.5},
    {"name":"午餐","description":"去食堂吃了喜欢的那几个菜味道不错","goal_type":"meal","priority":"high","time_slot":"12:00","duration_hours":0.5},
    {"name":"午休","description":"趴在桌上小憩一会儿恢复下午的精力","goal_type":"rest","priority":"medium","time_slot":"12:30","duration_hours":0.5},
    {"name":"下午学习","description":"继续把上午没看完的章节慢慢啃完","goal_type":"study","priority":"high","time_slot":"13:00","duration_hours":2.0},
    {"name":"兴趣活动","description":"捣鼓一会儿自己最近迷上的小爱好","goal_type":"learn_topic","priority":"medium","time_slot":"15:00","duration_hours":2.0},
    {"name":"运动","description":"出门沿着操场慢悠悠地跑了好几圈","goal_type":"exercise","priority":"medium","time_slot":"17:00","duration_hours":1.0},
    {"name":"晚餐","description":"晚饭吃得很丰盛连汤都喝得干干净净","goal_type":"meal","priority":"high","time_slot":"18:00","duration_hours":0.5},
    {"name":"娱乐","description":"窝在椅子上刷刷视频放松紧绷的神经","goal_type":"entertainment","priority":"low","time_slot":"18:30","duration_hours":3.0},
    {"name":"夜聊","description":"和好朋友煲电话粥分享今天的小趣事","goal_type":"social_maintenance","priority":"medium","time_slot":"21:30","duration_hours":1.0},
    {"name":"睡前准备","description":"洗澡护肤把东西收拾好准备上床睡觉","goal_type":"daily_routine","priority":"medium","time_slot":"22:30","duration_hours":1.5}
  ]
}
```"#;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(SAMPLE_SCHEDULE_JSON.to_string())
    }
}

/// 脚本化客户端：按顺序弹出预设结果，记录调用次数与收到的提示词
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 累计调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 收到过的全部提示词（用于断言反馈是否被带入下一轮）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("script exhausted".to_string())))
    }
}
