//! 查询缓存：容量 + TTL 双重受限的 LRU
//!
//! 被动过期：访问时检查，过期即淘汰并计为未命中；容量溢出时先清过期项，
//! 仍超限再淘汰最久未使用的键。写路径必须在写入对外可见前调用 invalidate。
//! 缓存值只是瞬时快照，权威状态始终在 GoalStore。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct CacheInner {
    /// key -> (值, 过期时刻)
    map: HashMap<String, (Value, Instant)>,
    /// 访问序：队首最旧，命中/写入移到队尾
    order: VecDeque<String>,
}

/// 线程安全的 LRU 缓存
pub struct LruCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LruCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_size: max_size.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_at(key, Instant::now())
    }

    pub fn put(&self, key: &str, value: Value) {
        self.put_at(key, value, Instant::now());
    }

    /// 按给定时刻读取（时间注入便于测试 TTL 行为）
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Value> {
        let mut inner = self.inner.lock().unwrap();
        let hit = inner.map.get(key).map(|(v, e)| (v.clone(), *e));
        match hit {
            Some((_, expire)) if expire <= now => {
                // 过期即淘汰，按未命中处理
                inner.map.remove(key);
                inner.order.retain(|k| k != key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some((value, _)) => {
                Self::touch(&mut inner.order, key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// 按给定时刻写入/刷新
    pub fn put_at(&self, key: &str, value: Value, now: Instant) {
        let mut inner = self.inner.lock().unwrap();
        let expire = now + self.ttl;
        if inner.map.insert(key.to_string(), (value, expire)).is_some() {
            Self::touch(&mut inner.order, key);
        } else {
            inner.order.push_back(key.to_string());
        }

        if inner.map.len() > self.max_size {
            // TTL 过期优先于 LRU 位次
            let expired: Vec<String> = inner
                .map
                .iter()
                .filter(|(_, (_, e))| *e <= now)
                .map(|(k, _)| k.clone())
                .collect();
            for k in expired {
                inner.map.remove(&k);
                inner.order.retain(|x| x != &k);
            }
        }
        while inner.map.len() > self.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.map.remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// 失效指定前缀的所有键；写路径操作在对外可见前必须调用
    pub fn invalidate(&self, prefix: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.retain(|k, _| !k.starts_with(prefix));
        let alive: std::collections::HashSet<String> = inner.map.keys().cloned().collect();
        inner.order.retain(|k| alive.contains(k));
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 累计 (命中, 未命中)
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    fn touch(order: &mut VecDeque<String>, key: &str) {
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        order.push_back(key.to_string());
    }
}
