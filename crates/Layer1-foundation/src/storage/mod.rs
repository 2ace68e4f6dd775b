//! Storage module for Scriptdeck
//!
//! - `json`: JSON - 범용 파일 저장/로드 (프로세스 재시작 후에도 유지)
//! - `session`: 프로세스 수명 동안만 유지되는 세션 마커

mod json;
mod session;

// JSON Storage (durable)
pub use json::JsonStore;

// Session markers (volatile)
pub use session::SessionMarkers;
