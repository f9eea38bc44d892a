//! 等待时间解析工具
//! 语法：可选的十进制数字 + 可选的单位 `s`/`ms`，其后的字符一律忽略
//! 只有数字时单位默认为秒，只有单位时数值默认为 1，两者皆无视为无效

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static WAIT_SPEC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)? *(ms|s)?").unwrap()
});

/// 兜底等待时间（默认值本身也无法解析时使用）
const FALLBACK_WAIT: Duration = Duration::from_secs(10);

/// 时间单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUnit {
    Seconds,
    Millis,
}

/// 解析后的等待时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    pub amount: u64,
    pub unit: WaitUnit,
}

impl WaitSpec {
    /// 解析 wait-spec，不符合语法时返回 None（调用方改用默认值）
    pub fn parse(spec: &str) -> Option<Self> {
        let lowered = spec.trim().to_lowercase();
        let captures = WAIT_SPEC_REGEX.captures(&lowered)?;
        let digits = captures.get(1).map(|m| m.as_str());
        let unit = captures.get(2).map(|m| m.as_str());

        if digits.is_none() && unit.is_none() {
            return None;
        }

        let amount = match digits {
            Some(d) => d.parse().ok()?,
            None => 1,
        };
        let unit = match unit {
            Some("ms") => WaitUnit::Millis,
            _ => WaitUnit::Seconds,
        };
        Some(Self { amount, unit })
    }

    /// 规范化为 `<数值><单位>` 形式，如 ` 5 MS` -> `5ms`
    pub fn normalize(spec: &str) -> Option<String> {
        Self::parse(spec).map(|w| w.to_string())
    }

    pub fn duration(&self) -> Duration {
        match self.unit {
            WaitUnit::Seconds => Duration::from_secs(self.amount),
            WaitUnit::Millis => Duration::from_millis(self.amount),
        }
    }

    /// 依次尝试规则自带的等待时间、默认值，最后使用内置兜底值
    pub fn resolve(spec: Option<&str>, default: &str) -> Duration {
        if let Some(wait) = spec.and_then(Self::parse) {
            return wait.duration();
        }
        if let Some(raw) = spec {
            debug!(wait = raw, "等待时间无法解析，改用默认值 {}", default);
        }
        Self::parse(default)
            .map(|w| w.duration())
            .unwrap_or(FALLBACK_WAIT)
    }
}

impl fmt::Display for WaitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            WaitUnit::Seconds => "s",
            WaitUnit::Millis => "ms",
        };
        write!(f, "{}{}", self.amount, unit)
    }
}
