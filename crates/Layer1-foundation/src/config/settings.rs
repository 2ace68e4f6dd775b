//! Scriptdeck Config - 통합 설정
//!
//! 로그 저장소와 태스크 매니저 설정을 하나로 관리

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 설정 파일명
pub const SCRIPTDECK_CONFIG_FILE: &str = "config.json";

// ============================================================================
// Scriptdeck Config (통합)
// ============================================================================

/// Scriptdeck 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptdeckConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 로그 저장소 설정
    #[serde(default)]
    pub logs: LogSettings,

    /// 태스크 매니저 설정
    #[serde(default)]
    pub tasks: TaskSettings,
}

impl ScriptdeckConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 현재 디렉토리 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let project = JsonStore::current_project()?;
        Self::load_layers(JsonStore::global().ok(), Some(project))
    }

    /// 글로벌 + 지정된 프로젝트 루트 병합 로드
    pub fn load_for_project(root: impl AsRef<Path>) -> Result<Self> {
        Self::load_layers(
            JsonStore::global().ok(),
            Some(JsonStore::project(root.as_ref())),
        )
    }

    /// 저장소 레이어를 순서대로 병합 (뒤쪽이 우선)
    pub fn load_layers(global: Option<JsonStore>, project: Option<JsonStore>) -> Result<Self> {
        let mut config = Self::new();

        for store in [global, project].into_iter().flatten() {
            if let Some(layer) = store.load_optional::<ScriptdeckConfig>(SCRIPTDECK_CONFIG_FILE)? {
                config.merge(layer);
            }
        }

        Ok(config)
    }

    /// 지정된 저장소에 저장
    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(SCRIPTDECK_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: ScriptdeckConfig) {
        if other.version != default_version() {
            self.version = other.version;
        }
        self.logs.merge(other.logs);
        self.tasks.merge(other.tasks);
    }
}

// ============================================================================
// Log Settings
// ============================================================================

/// 로그 저장소 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSettings {
    /// 실행당 최대 로그 엔트리 수
    #[serde(default = "default_max_entries")]
    pub max_entries_per_execution: usize,

    /// 자동 정리 주기 (초)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// 마지막 엔트리 이후 보관 기간 (초)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// 구독자별 큐 크기
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue_capacity: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            max_entries_per_execution: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_age_secs: default_max_age(),
            subscriber_queue_capacity: default_subscriber_queue(),
        }
    }
}

impl LogSettings {
    fn merge(&mut self, other: LogSettings) {
        if other.max_entries_per_execution != default_max_entries() {
            self.max_entries_per_execution = other.max_entries_per_execution;
        }
        if other.cleanup_interval_secs != default_cleanup_interval() {
            self.cleanup_interval_secs = other.cleanup_interval_secs;
        }
        if other.max_age_secs != default_max_age() {
            self.max_age_secs = other.max_age_secs;
        }
        if other.subscriber_queue_capacity != default_subscriber_queue() {
            self.subscriber_queue_capacity = other.subscriber_queue_capacity;
        }
    }
}

// ============================================================================
// Task Settings
// ============================================================================

/// 태스크 매니저 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSettings {
    /// 백그라운드 전환 시 보관할 로그 스냅샷 크기
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: usize,

    /// 백그라운드 태스크 저장 파일명
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            snapshot_limit: default_snapshot_limit(),
            state_file: default_state_file(),
        }
    }
}

impl TaskSettings {
    fn merge(&mut self, other: TaskSettings) {
        if other.snapshot_limit != default_snapshot_limit() {
            self.snapshot_limit = other.snapshot_limit;
        }
        if other.state_file != default_state_file() {
            self.state_file = other.state_file;
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_max_entries() -> usize {
    1000
}

fn default_cleanup_interval() -> u64 {
    5 * 60
}

fn default_max_age() -> u64 {
    2 * 60 * 60
}

fn default_subscriber_queue() -> usize {
    256
}

fn default_snapshot_limit() -> usize {
    100
}

fn default_state_file() -> String {
    "background_tasks.json".to_string()
}
