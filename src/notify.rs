// SPDX-License-Identifier: MPL-2.0

//! User-visible notices
//!
//! Notices are best-effort: a presenter must never fail into the caller.

use crate::config::ConfigProvider;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Shows a short text to the user
pub trait Presenter: Send + Sync {
    fn show_notice(&self, text: &str);
}

/// Presenter that writes notices to the log
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn show_notice(&self, text: &str) {
        info!(notice = text, "Notice");
    }
}

/// Gatekeeper in front of a presenter
///
/// Silenced by `disable_toast`; some notices are shown once per access point.
pub struct Notices {
    presenter: Arc<dyn Presenter>,
    config: Arc<dyn ConfigProvider>,
    shown: Mutex<HashSet<&'static str>>,
}

impl Notices {
    pub fn new(presenter: Arc<dyn Presenter>, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            presenter,
            config,
            shown: Mutex::new(HashSet::new()),
        }
    }

    pub fn show(&self, text: &str) {
        if self.config.disable_toast() {
            return;
        }
        self.presenter.show_notice(text);
    }

    /// Show `text` only the first time `access_point` reports it
    pub fn show_once(&self, access_point: &'static str, text: &str) {
        let first = match self.shown.lock() {
            Ok(mut shown) => shown.insert(access_point),
            Err(_) => {
                warn!(access_point, "Notice registry poisoned");
                false
            }
        };
        if first {
            self.show(text);
        }
    }

    /// Allow every once-only notice again
    pub fn reset(&self) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.clear();
        }
    }
}
