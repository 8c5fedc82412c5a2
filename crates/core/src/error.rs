//! 에러 타입: 도메인별 에러 정의

/// flowtest 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum FlowtestError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 디렉티브 파싱 에러
    #[error("directive error: {0}")]
    Directive(#[from] DirectiveError),

    /// 리소스 저장소 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 디렉티브 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    /// `#DW` 접두어 누락
    #[error("directive must begin with '#DW': '{0}'")]
    MissingPrefix(String),

    /// 커맨드 누락
    #[error("directive has no command: '{0}'")]
    MissingCommand(String),

    /// `key=value` 형식이 아닌 인자
    #[error("malformed argument '{argument}' in directive '{directive}'")]
    MalformedArgument { directive: String, argument: String },

    /// 중복된 키
    #[error("duplicate key '{key}' in directive '{directive}'")]
    DuplicateKey { directive: String, key: String },
}

/// 리소스 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 객체가 존재하지 않음
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// 이미 존재하는 객체
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// 낙관적 동시성 충돌 (resourceVersion 불일치)
    #[error("conflict updating {kind} '{name}'")]
    Conflict { kind: String, name: String },

    /// API 호출 실패
    #[error("api error: {0}")]
    Api(String),

    /// 직렬화/역직렬화 실패
    #[error("decode error for {kind}: {reason}")]
    Decode { kind: String, reason: String },
}

impl StoreError {
    /// 객체 부재 에러인지 확인합니다.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// 재시도 가능한 충돌 에러인지 확인합니다.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
