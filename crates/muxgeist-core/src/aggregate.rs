//! Multi-pane context aggregation.
//!
//! Builds one bounded text blob for a session out of every pane worth
//! looking at. The rules, in order:
//!
//! 1. Panes whose title contains the self-identifier are skipped, so the
//!    daemon never feeds its own companion UI back into the context.
//! 2. Captures no longer than the noise threshold are dropped.
//! 3. Each kept pane gets a `=== PANE <id> (<title>) ===` header followed by
//!    its content. Headers are written whole or not at all; content is cut
//!    on a char boundary when the buffer fills.
//! 4. Once the buffer reaches capacity minus the safety margin no further
//!    panes are captured.
//! 5. If the pane listing is empty or unavailable, or no pane survives the
//!    filters, the active pane's raw capture becomes the whole buffer.

use tracing::{debug, trace};

use crate::buffer::{ContextBuffer, DEFAULT_CONTEXT_CAPACITY};
use crate::error::MultiplexerError;
use crate::multiplexer::{MultiplexerClient, PaneInfo};

/// Title substring identifying the daemon's own UI pane.
pub const DEFAULT_SELF_TITLE: &str = "muxgeist";

/// Captures of this many bytes or fewer are treated as blank.
pub const DEFAULT_MIN_CONTENT_BYTES: usize = 10;

/// Headroom left at the end of the buffer before pane intake stops.
pub const DEFAULT_SAFETY_MARGIN: usize = 500;

/// Tunables for [`PaneAggregator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Buffer capacity in bytes.
    pub capacity: usize,
    pub safety_margin: usize,
    pub min_content_bytes: usize,
    /// Panes whose title contains this are never captured. Empty disables
    /// self-exclusion.
    pub self_title: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CONTEXT_CAPACITY,
            safety_margin: DEFAULT_SAFETY_MARGIN,
            min_content_bytes: DEFAULT_MIN_CONTENT_BYTES,
            self_title: DEFAULT_SELF_TITLE.to_string(),
        }
    }
}

/// Header line introducing one pane's content in an aggregated buffer.
pub fn pane_header(pane_id: &str, title: &str) -> String {
    format!("\n=== PANE {} ({}) ===\n", pane_id, title)
}

/// Which path produced an aggregated buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPath {
    /// Headed sections for this many panes.
    MultiPane { panes: usize },
    /// Raw capture of the active pane.
    Fallback,
}

/// A finished aggregation, ready to be swapped into a session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub buffer: ContextBuffer,
    pub path: AggregationPath,
}

/// Captures and merges a session's panes into one [`ContextBuffer`].
#[derive(Debug, Clone, Default)]
pub struct PaneAggregator {
    config: AggregatorConfig,
}

impl PaneAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Whether `pane` is the daemon's own UI pane.
    pub fn is_self_pane(&self, pane: &PaneInfo) -> bool {
        !self.config.self_title.is_empty() && pane.title.contains(&self.config.self_title)
    }

    fn is_noise(&self, content: &str) -> bool {
        content.len() <= self.config.min_content_bytes
    }

    fn intake_limit(&self) -> usize {
        self.config
            .capacity
            .saturating_sub(self.config.safety_margin)
    }

    /// Aggregate all interesting panes of `session`.
    ///
    /// Individual pane capture failures only drop that pane. The call fails
    /// only when the fallback capture of the active pane fails, in which
    /// case the caller should keep whatever buffer it had.
    pub async fn aggregate<C>(
        &self,
        client: &C,
        session: &str,
    ) -> Result<Aggregation, MultiplexerError>
    where
        C: MultiplexerClient + ?Sized,
    {
        let panes = match client.list_panes(session).await {
            Ok(panes) => panes,
            Err(e) => {
                debug!(session, error = %e, "pane listing failed, capturing active pane");
                Vec::new()
            }
        };

        if panes.is_empty() {
            return self.fallback(client, session).await;
        }

        let mut buffer = ContextBuffer::new(self.config.capacity);
        let limit = self.intake_limit();
        let mut retained = 0;

        for pane in &panes {
            if self.is_self_pane(pane) {
                trace!(session, pane = %pane.id, title = %pane.title, "skipping own pane");
                continue;
            }

            if buffer.len() >= limit {
                debug!(
                    session,
                    bytes = buffer.len(),
                    "context buffer full, ignoring remaining panes"
                );
                break;
            }

            let content = match client.capture_pane(session, Some(&pane.id)).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(session, pane = %pane.id, error = %e, "pane capture failed");
                    continue;
                }
            };

            if self.is_noise(&content) {
                trace!(session, pane = %pane.id, bytes = content.len(), "pane is blank");
                continue;
            }

            if !buffer.push_whole(&pane_header(&pane.id, &pane.title)) {
                break;
            }
            buffer.push_truncated(&content);
            retained += 1;
        }

        if retained == 0 {
            return self.fallback(client, session).await;
        }

        Ok(Aggregation {
            buffer,
            path: AggregationPath::MultiPane { panes: retained },
        })
    }

    async fn fallback<C>(&self, client: &C, session: &str) -> Result<Aggregation, MultiplexerError>
    where
        C: MultiplexerClient + ?Sized,
    {
        let content = client.capture_pane(session, None).await?;
        Ok(Aggregation {
            buffer: ContextBuffer::from_capture(self.config.capacity, &content),
            path: AggregationPath::Fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeMultiplexer, FakeSession, MultiplexerCall};
    use crate::protocol::split_pane_sections;

    fn aggregator() -> PaneAggregator {
        PaneAggregator::default()
    }

    fn small_aggregator(capacity: usize, safety_margin: usize) -> PaneAggregator {
        PaneAggregator::new(AggregatorConfig {
            capacity,
            safety_margin,
            ..AggregatorConfig::default()
        })
    }

    #[tokio::test]
    async fn test_excludes_own_pane() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("0.0", "shell", "hello world\n")
                .with_pane("0.1", "muxgeist", "ignored ui\n"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert_eq!(result.path, AggregationPath::MultiPane { panes: 1 });
        assert_eq!(
            result.buffer.as_str(),
            "\n=== PANE 0.0 (shell) ===\nhello world\n"
        );
        assert!(!result.buffer.as_str().contains("muxgeist"));
        assert!(!result.buffer.as_str().contains("ignored ui"));
    }

    #[tokio::test]
    async fn test_self_exclusion_is_substring_match() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("0.0", "muxgeist-ai (renaming)", "assistant output here\n")
                .with_pane("0.1", "build", "cargo build output\n"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");
        let sections = split_pane_sections(result.buffer.as_str());

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "build");
        // The excluded pane is never even captured.
        assert!(!fake.calls().contains(&MultiplexerCall::CapturePane {
            session: "dev".to_string(),
            pane: Some("0.0".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_short_single_pane_falls_back_to_raw_capture() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("0.0", "shell", "x\n")
                .with_active_content("x\n"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert_eq!(result.path, AggregationPath::Fallback);
        assert_eq!(result.buffer.as_str(), "x\n");
    }

    #[tokio::test]
    async fn test_all_panes_excluded_falls_back() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%3", "/src")
                .with_pane("0.0", "muxgeist", "the assistant pane content\n")
                .with_pane("0.1", "shell", "")
                .with_active_content("ui"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert_eq!(result.path, AggregationPath::Fallback);
        assert_eq!(result.buffer.as_str(), "ui");
    }

    #[tokio::test]
    async fn test_empty_listing_falls_back() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src").with_active_content("active pane text"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert_eq!(result.path, AggregationPath::Fallback);
        assert_eq!(result.buffer.as_str(), "active pane text");
    }

    #[tokio::test]
    async fn test_listing_failure_falls_back() {
        let fake = FakeMultiplexer::new();
        let mut session = FakeSession::new("%0", "/src")
            .with_pane("0.0", "shell", "content that would be captured")
            .with_active_content("active only");
        session.fail_list_panes = true;
        fake.add_session("dev", session);

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert_eq!(result.path, AggregationPath::Fallback);
        assert_eq!(result.buffer.as_str(), "active only");
    }

    #[tokio::test]
    async fn test_fallback_failure_is_an_error() {
        let fake = FakeMultiplexer::new();
        let aggregator = aggregator();

        // Session unknown to the multiplexer: listing and capture both fail.
        assert!(aggregator.aggregate(&fake, "gone").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_pane_capture_is_skipped() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_failing_pane("0.0", "broken")
                .with_pane("0.1", "shell", "still captured fine\n"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");
        let sections = split_pane_sections(result.buffer.as_str());

        assert_eq!(result.path, AggregationPath::MultiPane { panes: 1 });
        assert_eq!(sections[0].pane_id, "0.1");
    }

    #[tokio::test]
    async fn test_sections_follow_enumeration_order() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("1.2", "logs", "tail -f output line\n")
                .with_pane("0.0", "editor", "fn main() {}\n// more\n")
                .with_pane("0.1", "shell", "   \n")
                .with_pane("2.0", "tests", "running 12 tests\n"),
        );

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");
        let sections = split_pane_sections(result.buffer.as_str());
        let order: Vec<_> = sections.iter().map(|s| s.pane_id.as_str()).collect();

        assert_eq!(order, vec!["1.2", "0.0", "2.0"]);
        assert_eq!(sections[1].content, "fn main() {}\n// more\n");
    }

    #[tokio::test]
    async fn test_stops_accepting_panes_near_capacity() {
        let fake = FakeMultiplexer::new();
        let big = "a".repeat(300);
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("0.0", "one", &big)
                .with_pane("0.1", "two", &big)
                .with_pane("0.2", "three", &big),
        );

        // Limit is 512 - 100 = 412: the first pane fits (~325 bytes), the
        // second starts below the limit and is truncated, the third is never
        // captured.
        let result = small_aggregator(512, 100)
            .aggregate(&fake, "dev")
            .await
            .expect("aggregate");

        assert_eq!(result.path, AggregationPath::MultiPane { panes: 2 });
        assert_eq!(result.buffer.len(), 512);
        assert!(!fake.calls().contains(&MultiplexerCall::CapturePane {
            session: "dev".to_string(),
            pane: Some("0.2".to_string()),
        }));
    }

    #[tokio::test]
    async fn test_header_never_half_written() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src")
                .with_pane("0.0", "first", &"b".repeat(50))
                .with_pane("0.1", "second-with-a-long-title", "more content here"),
        );

        // First section is 26 + 50 = 76 bytes, leaving 4: too small for the
        // second header, which must not appear partially.
        let result = small_aggregator(80, 0)
            .aggregate(&fake, "dev")
            .await
            .expect("aggregate");

        let text = result.buffer.as_str();
        assert_eq!(result.path, AggregationPath::MultiPane { panes: 1 });
        assert!(text.ends_with(&"b".repeat(50)));
        assert!(!text.contains("second"));
        assert!(result.buffer.len() <= 80);
    }

    #[tokio::test]
    async fn test_truncation_keeps_valid_utf8() {
        let fake = FakeMultiplexer::new();
        fake.add_session(
            "dev",
            FakeSession::new("%0", "/src").with_pane("0.0", "shell", &"日本語".repeat(40)),
        );

        let result = small_aggregator(101, 0)
            .aggregate(&fake, "dev")
            .await
            .expect("aggregate");

        let text = result.buffer.as_str();
        assert!(text.len() <= 101);
        assert!(text.chars().all(|c| c != '\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_length_bounded_for_many_panes() {
        let fake = FakeMultiplexer::new();
        let mut session = FakeSession::new("%0", "/src");
        for i in 0..40 {
            session = session.with_pane(&format!("0.{}", i), "shell", &"z".repeat(700));
        }
        fake.add_session("dev", session);

        let result = aggregator().aggregate(&fake, "dev").await.expect("aggregate");

        assert!(result.buffer.len() <= DEFAULT_CONTEXT_CAPACITY);
        for section in split_pane_sections(result.buffer.as_str()) {
            assert_eq!(section.title, "shell");
            assert!(section.pane_id.starts_with("0."));
        }
    }

    #[test]
    fn test_empty_self_title_disables_exclusion() {
        let aggregator = PaneAggregator::new(AggregatorConfig {
            self_title: String::new(),
            ..AggregatorConfig::default()
        });
        assert!(!aggregator.is_self_pane(&PaneInfo::new("0.0", "muxgeist", "python3")));
    }

    #[test]
    fn test_pane_header_format() {
        assert_eq!(pane_header("0.1", "vim"), "\n=== PANE 0.1 (vim) ===\n");
    }
}
