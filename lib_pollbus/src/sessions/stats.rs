//! # Session Statistics
//!
//! Counters are lock-free `AtomicU64`s updated from the polling tasks and the
//! broker delivery task. A tick bumps requests, then responses, then
//! published, each with `Release`; `snapshot` loads them in the opposite
//! order with `Acquire`, so any snapshot satisfies
//! `published <= responses <= requests` even while ticks are running.
//! The start and end timestamps live behind a small mutex since they are
//! written only by the session's own lifecycle calls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;

#[derive(Debug, Default, Clone, Copy)]
struct Window {
    started_at: Option<DateTime<Local>>,
    ended_at: Option<DateTime<Local>>,
}

/// Live statistics of one session, shared with its tasks through an `Arc`.
#[derive(Debug, Default)]
pub struct SessionStats {
    requests: AtomicU64,
    responses: AtomicU64,
    published: AtomicU64,
    received: AtomicU64,
    window: Mutex<Window>,
}

impl SessionStats {
    /// Counts an issued HTTP request.
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Release);
    }

    /// Counts a successful HTTP response.
    pub fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Release);
    }

    /// Counts a message published on the bus.
    pub fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Release);
    }

    /// Counts a message received from the bus.
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Stamps the session start time.
    pub fn mark_started(&self) {
        let mut window = self.window.lock().expect("Stats lock poisoned");
        window.started_at = Some(Local::now());
    }

    /// Stamps the session end time. Never earlier than the start time.
    pub fn mark_ended(&self) {
        let mut window = self.window.lock().expect("Stats lock poisoned");
        let now = Local::now();
        window.ended_at = Some(match window.started_at {
            Some(start) if now < start => start,
            _ => now,
        });
    }

    /// Zeroes every counter and unsets both timestamps.
    pub fn clear(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.responses.store(0, Ordering::Relaxed);
        self.published.store(0, Ordering::Relaxed);
        self.received.store(0, Ordering::Relaxed);
        *self.window.lock().expect("Stats lock poisoned") = Window::default();
    }

    /// A point-in-time copy of the statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let window = *self.window.lock().expect("Stats lock poisoned");
        // reverse of the write order in a tick
        let published = self.published.load(Ordering::Acquire);
        let responses = self.responses.load(Ordering::Acquire);
        let requests = self.requests.load(Ordering::Acquire);
        StatsSnapshot {
            session_start_time: window.started_at,
            session_end_time: window.ended_at,
            requests_count: requests,
            responses_count: responses,
            messages_published_count: published,
            messages_received_count: self.received.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`SessionStats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// When the session was started, if it has been.
    pub session_start_time: Option<DateTime<Local>>,
    /// When the session was last stopped, if it has been.
    pub session_end_time: Option<DateTime<Local>>,
    /// HTTP requests issued.
    pub requests_count: u64,
    /// Successful HTTP responses.
    pub responses_count: u64,
    /// Messages published on the bus.
    pub messages_published_count: u64,
    /// Messages received from the bus.
    pub messages_received_count: u64,
}

impl StatsSnapshot {
    /// `end - start`, when both are set.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.session_start_time, self.session_end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Which counters a report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    /// Fetch and publish.
    Publisher,
    /// Subscribe and count.
    Subscriber,
    /// Fetch only.
    RestPolling,
}

impl SessionKind {
    fn title(self) -> &'static str {
        match self {
            SessionKind::Publisher => "PollingPublisherSession",
            SessionKind::Subscriber => "PollingSubscriberSession",
            SessionKind::RestPolling => "RestPollingSession",
        }
    }
}

/// Read-only snapshot of a session, printable as the console stats banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// The kind of session that produced the report.
    pub kind: SessionKind,
    // end - start in milliseconds, when both stamps are set
    #[serde(skip)]
    elapsed_ms: Option<i64>,
    /// The statistics.
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

impl SessionReport {
    /// Builds a report from a snapshot.
    pub fn new(kind: SessionKind, stats: StatsSnapshot) -> Self {
        Self {
            kind,
            elapsed_ms: stats.elapsed().map(|d| d.num_milliseconds()),
            stats,
        }
    }

    /// The formatted elapsed duration (`"-"` when unknown).
    pub fn duration(&self) -> String {
        self.elapsed_ms
            .map(format_elapsed_ms)
            .unwrap_or_else(|| "-".to_string())
    }
}

/// Formats milliseconds rounded to the nearest second, e.g. `"2 minutes 5 seconds"`.
pub fn format_elapsed_ms(ms: i64) -> String {
    let total = (ms.max(0) + 500) / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{} hours {} minutes {} seconds", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{} minutes {} seconds", minutes, seconds)
    } else {
        format!("{} seconds", seconds)
    }
}

fn format_clock(ts: Option<DateTime<Local>>) -> String {
    ts.map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.kind.title();
        // "*-*-...-*" wide enough to frame "* <title>"
        let width = (title.len() + 2) | 1;
        let rule: String = (0..width)
            .map(|i| if i % 2 == 0 { '*' } else { '-' })
            .collect();

        writeln!(f)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "* {}", title)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Session stats")?;
        writeln!(f, "- Duration:            {}", self.duration())?;
        writeln!(f, "- Start time:          {}", format_clock(self.stats.session_start_time))?;
        writeln!(f, "- End time:            {}", format_clock(self.stats.session_end_time))?;
        match self.kind {
            SessionKind::Publisher => {
                writeln!(f, "- Requests sent:       {}", self.stats.requests_count)?;
                writeln!(f, "- Responses received:  {}", self.stats.responses_count)?;
                writeln!(f, "- Messages published:  {}", self.stats.messages_published_count)?;
            }
            SessionKind::Subscriber => {
                writeln!(f, "- Messages received:   {}", self.stats.messages_received_count)?;
            }
            SessionKind::RestPolling => {
                writeln!(f, "- Requests sent:       {}", self.stats.requests_count)?;
                writeln!(f, "- Responses received:  {}", self.stats.responses_count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_rounded_to_seconds() {
        assert_eq!(format_elapsed_ms(0), "0 seconds");
        assert_eq!(format_elapsed_ms(1499), "1 seconds");
        assert_eq!(format_elapsed_ms(1500), "2 seconds");
        assert_eq!(format_elapsed_ms(125_000), "2 minutes 5 seconds");
        assert_eq!(format_elapsed_ms(3_725_000), "1 hours 2 minutes 5 seconds");
        assert_eq!(format_elapsed_ms(-20), "0 seconds");
    }

    #[test]
    fn clear_resets_counters_and_stamps() {
        let stats = SessionStats::default();
        stats.mark_started();
        stats.record_request();
        stats.record_response();
        stats.record_published();
        stats.record_received();
        stats.mark_ended();

        stats.clear();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn end_is_never_before_start() {
        let stats = SessionStats::default();
        stats.mark_started();
        stats.mark_ended();
        let snap = stats.snapshot();
        assert!(snap.session_end_time.unwrap() >= snap.session_start_time.unwrap());
        assert!(snap.elapsed().unwrap() >= chrono::Duration::zero());
    }

    #[test]
    fn snapshots_keep_counter_order_under_concurrent_ticks() {
        use std::sync::atomic::AtomicBool;
        use std::sync::Arc;

        let stats = Arc::new(SessionStats::default());
        let done = Arc::new(AtomicBool::new(false));
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let stats = Arc::clone(&stats);
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        stats.record_request();
                        stats.record_response();
                        stats.record_published();
                    }
                })
            })
            .collect();

        for _ in 0..200_000 {
            let snap = stats.snapshot();
            assert!(snap.responses_count <= snap.requests_count, "{:?}", snap);
            assert!(snap.messages_published_count <= snap.responses_count, "{:?}", snap);
        }
        done.store(true, Ordering::Relaxed);
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn report_lists_counters_for_its_kind() {
        let stats = SessionStats::default();
        stats.record_request();
        stats.record_request();
        stats.record_response();
        stats.record_published();

        let text = SessionReport::new(SessionKind::Publisher, stats.snapshot()).to_string();
        assert!(text.contains("* PollingPublisherSession"));
        assert!(text.contains("- Requests sent:       2"));
        assert!(text.contains("- Responses received:  1"));
        assert!(text.contains("- Messages published:  1"));
        assert!(text.contains("- Duration:            -"));
        assert!(!text.contains("Messages received"));

        let text = SessionReport::new(SessionKind::Subscriber, stats.snapshot()).to_string();
        assert!(text.contains("- Messages received:   0"));
        assert!(!text.contains("Requests sent"));
    }

    #[test]
    fn report_serializes_camel_case() {
        let stats = SessionStats::default();
        stats.record_received();
        let json = serde_json::to_value(SessionReport::new(SessionKind::Subscriber, stats.snapshot()))
            .unwrap();
        assert_eq!(json["kind"], "subscriber");
        assert_eq!(json["messagesReceivedCount"], 1);
        assert!(json["sessionStartTime"].is_null());
    }
}
