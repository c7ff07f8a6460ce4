use std::time::{Duration, Instant};

/// 默认采样窗口: 1秒
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// 速度采样器
///
/// 保存一个独立于任务字段的采样锚点（时间 + 字节数）。
/// 距上次采样不足一个窗口时不重新计算，任务上的速度保持上一次的值
#[derive(Debug, Clone)]
pub struct SpeedSampler {
    interval: Duration,
    anchor_at: Instant,
    anchor_bytes: u64,
}

impl SpeedSampler {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            anchor_at: now,
            anchor_bytes: 0,
        }
    }

    /// 输入当前累计字节数，窗口到期时返回新的速度 (bytes/s) 并重置锚点
    pub fn sample(&mut self, now: Instant, downloaded: u64) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.anchor_at);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let bytes = downloaded.saturating_sub(self.anchor_bytes);
        let speed = bytes as f64 / elapsed.as_secs_f64();

        self.anchor_at = now;
        self.anchor_bytes = downloaded;
        Some(speed)
    }
}
