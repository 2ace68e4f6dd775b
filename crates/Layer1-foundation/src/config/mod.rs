//! Config - 통합 설정 관리
//!
//! - `settings.rs` - ScriptdeckConfig 통합 설정 (로그/태스크)

mod settings;

pub use settings::{LogSettings, ScriptdeckConfig, TaskSettings, SCRIPTDECK_CONFIG_FILE};
