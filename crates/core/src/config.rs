//! 설정 관리: flowtest.toml 파싱 및 런타임 설정
//!
//! [`FlowtestConfig`]는 하네스와 CLI가 읽는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`FLOWTEST_HELPER_TAG=v0.1.4` 형식, 그리고 `LTIMEOUT`/`HTIMEOUT`)
//! 3. 설정 파일 (`flowtest.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), flowtest_core::error::FlowtestError> {
//! use flowtest_core::config::FlowtestConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = FlowtestConfig::load("flowtest.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = FlowtestConfig::parse("[timeouts]\nlow = \"90s\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, FlowtestError};
use crate::stage::Stage;

/// 저수준 타임아웃 환경변수 (기존 스크립트 호환)
pub const LOW_TIMEOUT_ENV: &str = "LTIMEOUT";

/// 고수준 타임아웃 환경변수 (기존 스크립트 호환)
pub const HIGH_TIMEOUT_ENV: &str = "HTIMEOUT";

/// flowtest 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowtestConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 스테이지 타임아웃 설정
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// 헬퍼 파드 이미지 설정
    #[serde(default)]
    pub helper: HelperConfig,
    /// 클러스터 접근 및 시스템 가드 설정
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Prometheus 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl FlowtestConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FlowtestError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 파일 없이 기본값에 환경변수 오버라이드만 적용합니다.
    pub fn from_env() -> Result<Self, FlowtestError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowtestError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FlowtestError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                FlowtestError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, FlowtestError> {
        toml::from_str(toml_str).map_err(|e| {
            FlowtestError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `FLOWTEST_{SECTION}_{FIELD}`.
    /// `LTIMEOUT`/`HTIMEOUT`은 `FLOWTEST_TIMEOUTS_*`보다 나중에 적용됩니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "FLOWTEST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "FLOWTEST_GENERAL_LOG_FORMAT");

        // Timeouts
        override_string(&mut self.timeouts.low, "FLOWTEST_TIMEOUTS_LOW");
        override_string(&mut self.timeouts.high, "FLOWTEST_TIMEOUTS_HIGH");
        override_csv(
            &mut self.timeouts.high_stages,
            "FLOWTEST_TIMEOUTS_HIGH_STAGES",
        );
        override_string(&mut self.timeouts.low, LOW_TIMEOUT_ENV);
        override_string(&mut self.timeouts.high, HIGH_TIMEOUT_ENV);

        // Helper
        override_string(&mut self.helper.image, "FLOWTEST_HELPER_IMAGE");
        override_string(&mut self.helper.tag, "FLOWTEST_HELPER_TAG");

        // Cluster
        override_string(&mut self.cluster.kubectl, "FLOWTEST_CLUSTER_KUBECTL");
        override_string(
            &mut self.cluster.triage_namespace,
            "FLOWTEST_CLUSTER_TRIAGE_NAMESPACE",
        );
        override_string(
            &mut self.cluster.reservation_name,
            "FLOWTEST_CLUSTER_RESERVATION_NAME",
        );
        override_bool(
            &mut self.cluster.mark_triage_on_failure,
            "FLOWTEST_CLUSTER_MARK_TRIAGE_ON_FAILURE",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "FLOWTEST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "FLOWTEST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "FLOWTEST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), FlowtestError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        let low = self.timeouts.low()?;
        let high = self.timeouts.high()?;
        if low.is_zero() || high.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "timeouts".to_owned(),
                reason: "timeouts must be greater than zero".to_owned(),
            }
            .into());
        }
        self.timeouts.high_stages()?;

        if self.helper.image.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "helper.image".to_owned(),
                reason: "image must not be empty".to_owned(),
            }
            .into());
        }
        if self.helper.tag.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "helper.tag".to_owned(),
                reason: "tag must not be empty".to_owned(),
            }
            .into());
        }

        if self.cluster.kubectl.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "cluster.kubectl".to_owned(),
                reason: "kubectl path must not be empty".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "port must be non-zero when metrics are enabled".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 스테이지 타임아웃 설정
///
/// 값은 `humantime` 형식(`90s`, `5m`, `1h 30m`)입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 기본 스테이지 타임아웃
    pub low: String,
    /// `high_stages`에 적용되는 타임아웃
    pub high: String,
    /// 고수준 타임아웃을 쓰는 스테이지 이름
    pub high_stages: Vec<String>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            low: "5m".to_owned(),
            high: "15m".to_owned(),
            high_stages: vec![Stage::Setup.to_string(), Stage::Teardown.to_string()],
        }
    }
}

impl TimeoutConfig {
    /// 기본 타임아웃을 파싱합니다.
    pub fn low(&self) -> Result<Duration, ConfigError> {
        parse_duration("timeouts.low", &self.low)
    }

    /// 고수준 타임아웃을 파싱합니다.
    pub fn high(&self) -> Result<Duration, ConfigError> {
        parse_duration("timeouts.high", &self.high)
    }

    /// 고수준 스테이지 목록을 파싱합니다.
    pub fn high_stages(&self) -> Result<Vec<Stage>, ConfigError> {
        self.high_stages
            .iter()
            .map(|s| {
                s.parse::<Stage>().map_err(|reason| ConfigError::InvalidValue {
                    field: "timeouts.high_stages".to_owned(),
                    reason,
                })
            })
            .collect()
    }
}

/// 헬퍼 파드 이미지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// 이미지 저장소
    pub image: String,
    /// 이미지 태그
    pub tag: String,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            image: "ghcr.io/nearnodeflash/nnf-integration-test-helper".to_owned(),
            tag: "latest".to_owned(),
        }
    }
}

impl HelperConfig {
    /// `image:tag` 형식의 이미지 참조
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// 클러스터 접근 및 시스템 가드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// kubectl 실행 파일 경로
    pub kubectl: String,
    /// 트리아지 표시 네임스페이스
    pub triage_namespace: String,
    /// 예약 ConfigMap 이름 (default 네임스페이스)
    pub reservation_name: String,
    /// 케이스 실패 시 트리아지 표시 생성 여부
    pub mark_triage_on_failure: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_owned(),
            triage_namespace: "flowtest-triage".to_owned(),
            reservation_name: "flowtest-reservation".to_owned(),
            mark_triage_on_failure: true,
        }
    }
}

/// Prometheus 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: format!("'{value}' is not a duration: {e}"),
    })
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
