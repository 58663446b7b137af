use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;

/// 硬件加速路径的健康状态
///
/// 连续失败达到阈值后进入 Disabled，进程内不再恢复，避免在故障的
/// 加速后端上反复抖动。一次成功不会重新启用。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccelState {
    Enabled { failures: u32 },
    Disabled,
}

pub struct AccelController {
    threshold: u32,
    states: Mutex<HashMap<String, AccelState>>,
}

impl AccelController {
    pub const DEFAULT_THRESHOLD: u32 = 2;

    pub fn new(threshold: u32) -> Self {
        Self { threshold: threshold.max(1), states: Mutex::new(HashMap::new()) }
    }

    /// 某资源是否仍允许走加速路径
    pub fn should_accelerate(&self, key: &str) -> bool {
        let states = self.states.lock().unwrap();
        !matches!(states.get(key), Some(AccelState::Disabled))
    }

    pub fn record_failure(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        let state = states.entry(key.to_string()).or_insert(AccelState::Enabled { failures: 0 });
        if let AccelState::Enabled { failures } = state {
            *failures += 1;
            if *failures >= self.threshold {
                warn!("连续失败 {} 次，禁用加速路径: {}", failures, key);
                *state = AccelState::Disabled;
            }
        }
    }

    pub fn record_success(&self, key: &str) {
        let mut states = self.states.lock().unwrap();
        // Disabled 是终态，成功也不恢复
        if let Some(AccelState::Enabled { failures }) = states.get_mut(key) {
            *failures = 0;
        }
    }
}

impl Default for AccelController {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}
