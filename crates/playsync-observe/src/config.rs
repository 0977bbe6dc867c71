//! Observer tuning.

use web_time::Duration;

/// Thresholds used while sampling the media element.
///
/// All gaps are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverConfig {
    /// Fallback sampling period when no native event fires.
    pub sampling_interval: Duration,
    /// Buffer gap at or below which playback is considered starved.
    pub rebuffering_gap: f64,
    /// Gap needed to leave a stall caused by a seek.
    pub resume_gap_after_seeking: f64,
    /// Gap needed to leave a stall caused by a low ready state.
    pub resume_gap_after_not_enough_data: f64,
    /// Gap needed to leave a plain buffering stall.
    pub resume_gap_after_buffering: f64,
    /// Minimum buffer ahead before a still position counts as frozen.
    pub minimum_buffer_before_freezing: f64,
    /// Distance to the duration under which the content is fully loaded.
    pub end_of_content_tolerance: f64,
    /// Whether a media buffer pipeline feeds the element. Stall detection is
    /// only meaningful in that mode.
    pub with_media_source: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(1000),
            rebuffering_gap: 0.5,
            resume_gap_after_seeking: 1.5,
            resume_gap_after_not_enough_data: 0.5,
            resume_gap_after_buffering: 5.0,
            minimum_buffer_before_freezing: 1.0,
            end_of_content_tolerance: 0.25,
            with_media_source: true,
        }
    }
}

impl ObserverConfig {
    /// Tighter thresholds for low-latency live contents.
    #[must_use]
    pub fn low_latency() -> Self {
        Self {
            sampling_interval: Duration::from_millis(250),
            rebuffering_gap: 0.2,
            resume_gap_after_seeking: 0.5,
            resume_gap_after_not_enough_data: 0.5,
            resume_gap_after_buffering: 3.0,
            end_of_content_tolerance: 0.5,
            ..Self::default()
        }
    }

    /// Set the fallback sampling period.
    #[must_use]
    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    /// Set the starvation threshold.
    #[must_use]
    pub fn with_rebuffering_gap(mut self, gap: f64) -> Self {
        self.rebuffering_gap = gap;
        self
    }

    /// Enable or disable stall detection tied to a media buffer pipeline.
    #[must_use]
    pub fn with_media_source(mut self, enabled: bool) -> Self {
        self.with_media_source = enabled;
        self
    }

    /// Build from process environment. See [`Self::from_env_with`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Build from a custom environment lookup.
    ///
    /// - `PLAYSYNC_LOW_LATENCY` (`1`/`true`/`yes`/`on`) starts from
    ///   [`Self::low_latency`].
    /// - `PLAYSYNC_SAMPLING_INTERVAL_MS` overrides the sampling period.
    /// - `PLAYSYNC_REBUFFERING_GAP` overrides the starvation threshold.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match get_env("PLAYSYNC_LOW_LATENCY") {
            Some(value) if env_flag(&value) => Self::low_latency(),
            _ => Self::default(),
        };
        if let Some(ms) = get_env("PLAYSYNC_SAMPLING_INTERVAL_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
        {
            config.sampling_interval = Duration::from_millis(ms);
        }
        if let Some(gap) = get_env("PLAYSYNC_REBUFFERING_GAP")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|gap| gap.is_finite() && *gap >= 0.0)
        {
            config.rebuffering_gap = gap;
        }
        config
    }
}

#[inline]
fn env_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
