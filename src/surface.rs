// ===============================
// src/surface.rs
// ===============================
//
// Permukaan UI yang dipakai engine: notifikasi sementara + dialog ya/tidak.
// Keduanya di-inject ke BatchSession supaya test bisa pakai double yang deterministik.
//
use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Notices disappear on their own after this long.
pub const NOTICE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind { Success, Error, Info }

pub trait Confirm {
    /// Blocking yes/no question.
    fn confirm(&mut self, message: &str) -> bool;
}

pub trait Notify {
    fn notify(&mut self, message: &str, kind: NoticeKind);
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub kind: NoticeKind,
    pub shown_at: Instant,
}

/// Holds at most one notice; a new one replaces the old.
#[derive(Debug)]
pub struct NoticeBoard {
    current: Option<Notice>,
    ttl: Duration,
}

impl Default for NoticeBoard {
    fn default() -> Self { Self::with_ttl(NOTICE_TTL) }
}

impl NoticeBoard {
    pub fn with_ttl(ttl: Duration) -> Self { Self { current: None, ttl } }

    pub fn show(&mut self, message: &str, kind: NoticeKind, now: Instant) {
        self.current = Some(Notice { message: message.to_string(), kind, shown_at: now });
    }

    /// Active notice at `now`; an expired one is dropped.
    pub fn current(&mut self, now: Instant) -> Option<&Notice> {
        let expired = self
            .current
            .as_ref()
            .map(|n| now.saturating_duration_since(n.shown_at) >= self.ttl)
            .unwrap_or(false);
        if expired {
            self.current = None;
        }
        self.current.as_ref()
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }
}

/// stdin/stdout implementation used by the console driver.
#[derive(Debug, Default)]
pub struct ConsoleSurface {
    pub board: NoticeBoard,
}

impl Confirm for ConsoleSurface {
    fn confirm(&mut self, message: &str) -> bool {
        println!("{message}");
        print!("[y/N] > ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(e) => {
                warn!(?e, "confirm: stdin read failed, treating as no");
                false
            }
        }
    }
}

impl Notify for ConsoleSurface {
    fn notify(&mut self, message: &str, kind: NoticeKind) {
        let tag = match kind {
            NoticeKind::Success => "ok",
            NoticeKind::Error => "error",
            NoticeKind::Info => "info",
        };
        info!(kind = tag, %message, "notice");
        println!("[{tag}] {message}");
        self.board.show(message, kind, Instant::now());
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::*;

    /// Answers confirmations from a script (default: no) and records everything.
    #[derive(Debug, Default)]
    pub struct ScriptedSurface {
        pub answers: VecDeque<bool>,
        pub prompts: Vec<String>,
        pub notices: Vec<(String, NoticeKind)>,
    }

    impl ScriptedSurface {
        pub fn answering(answers: &[bool]) -> Self {
            Self { answers: answers.iter().copied().collect(), ..Default::default() }
        }

        pub fn last_notice(&self) -> Option<&(String, NoticeKind)> {
            self.notices.last()
        }
    }

    impl Confirm for ScriptedSurface {
        fn confirm(&mut self, message: &str) -> bool {
            self.prompts.push(message.to_string());
            self.answers.pop_front().unwrap_or(false)
        }
    }

    impl Notify for ScriptedSurface {
        fn notify(&mut self, message: &str, kind: NoticeKind) {
            self.notices.push((message.to_string(), kind));
        }
    }
}
