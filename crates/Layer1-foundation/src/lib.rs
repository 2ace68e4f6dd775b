//! # scriptdeck-foundation
//!
//! Foundation layer for Scriptdeck:
//! - Error: 공통 에러 타입
//! - Storage: JsonStore (durable), SessionMarkers (volatile, process-lifetime)
//! - Config: 통합 설정 (ScriptdeckConfig, LogSettings, TaskSettings)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{LogSettings, ScriptdeckConfig, TaskSettings, SCRIPTDECK_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, SessionMarkers};
