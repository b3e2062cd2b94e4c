//! A `Logger` collaborator passed in at construction to every component,
//! instead of components reaching for a process-wide default.
//!
//! Log records still flow through the ordinary `log` facade and whatever
//! sink the application installed (`env_logger` in this crate's own tests
//! and demos) — only the *tag* identifying which component emitted a
//! record is threaded explicitly, so a component never has to guess its
//! own name for diagnostics.

use std::fmt;

use log::Level;

/// A named logging handle for one component instance, e.g.
/// `Logger::new("sync_master")` or `Logger::new("lifecycle[ECU1]")`.
#[derive(Debug, Clone)]
pub struct Logger {
  component: String,
}

impl Logger {
  pub fn new(component: impl Into<String>) -> Self {
    Logger {
      component: component.into(),
    }
  }

  /// A logger for a sub-scope of this one, e.g. a per-participant logger
  /// derived from a shared master logger.
  pub fn scoped(&self, suffix: impl fmt::Display) -> Self {
    Logger::new(format!("{}[{}]", self.component, suffix))
  }

  pub fn error(&self, msg: impl fmt::Display) {
    log::error!("[{}] {}", self.component, msg);
  }

  pub fn warn(&self, msg: impl fmt::Display) {
    log::warn!("[{}] {}", self.component, msg);
  }

  pub fn info(&self, msg: impl fmt::Display) {
    log::info!("[{}] {}", self.component, msg);
  }

  pub fn debug(&self, msg: impl fmt::Display) {
    log::debug!("[{}] {}", self.component, msg);
  }

  pub fn trace(&self, msg: impl fmt::Display) {
    log::trace!("[{}] {}", self.component, msg);
  }

  pub fn log(&self, level: Level, msg: impl fmt::Display) {
    log::log!(level, "[{}] {}", self.component, msg);
  }
}

impl Default for Logger {
  fn default() -> Self {
    Logger::new("synkit")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scoped_logger_carries_parent_tag() {
    let master = Logger::new("sync_master");
    let scoped = master.scoped("ECU1");
    assert_eq!(scoped.component, "sync_master[ECU1]");
  }
}
