//! 督促层：成果校验与每周复盘（各一次 LLM 调用）

pub mod reflection;
pub mod validator;

use std::path::Path;

pub use reflection::{trailing_window, ReflectionGenerator};
pub use validator::{Outcome, WinValidator};

/// 从 prompts 目录读取 `<name>`，不存在或为空时用内置默认值
pub fn load_prompt(dir: &Path, name: &str, default: &str) -> String {
    let path = dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(s) if !s.trim().is_empty() => {
            tracing::info!("Loaded prompt override from {}", path.display());
            s.trim().to_string()
        }
        _ => default.to_string(),
    }
}
