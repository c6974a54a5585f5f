pub mod listener;

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Modifier bitmask values matching the CGEventFlags layout used by the
/// macOS event tap. The detector only ever tests containment, so any
/// consistent encoding works for the pure logic and its tests.
pub const MODIFIER_COMMAND: u64 = 0x0010_0000;
pub const MODIFIER_SHIFT: u64 = 0x0002_0000;
pub const MODIFIER_ALT: u64 = 0x0008_0000;
pub const MODIFIER_CONTROL: u64 = 0x0004_0000;

const KEY_CODE_C: u16 = 8;
const KEY_CODE_B: u16 = 11;
const KEY_CODE_R: u16 = 15;
const KEY_CODE_T: u16 = 17;

const DEFAULT_MAX_INTERVAL_MS: u64 = 500;

/// An immutable trigger description: which key, which modifiers, and how
/// many repeated presses inside the inter-press window count as one
/// activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HotkeyConfig {
    pub key_code: u16,
    pub modifiers: u64,
    pub display_name: String,
    pub sequence_count: u32,
    #[serde(default = "default_max_interval_ms")]
    max_interval_ms: u64,
}

fn default_max_interval_ms() -> u64 {
    DEFAULT_MAX_INTERVAL_MS
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self::new(KEY_CODE_C, MODIFIER_COMMAND, "Cmd+C (3x)", 3)
            .expect("default hotkey config is valid")
    }
}

impl HotkeyConfig {
    pub fn new(
        key_code: u16,
        modifiers: u64,
        display_name: &str,
        sequence_count: u32,
    ) -> Result<Self, String> {
        Self::with_interval(
            key_code,
            modifiers,
            display_name,
            sequence_count,
            Duration::from_millis(DEFAULT_MAX_INTERVAL_MS),
        )
    }

    pub fn with_interval(
        key_code: u16,
        modifiers: u64,
        display_name: &str,
        sequence_count: u32,
        max_interval: Duration,
    ) -> Result<Self, String> {
        if sequence_count == 0 {
            return Err("Hotkey sequence count must be at least 1".to_string());
        }

        if max_interval.is_zero() {
            return Err("Hotkey inter-press interval must be greater than zero".to_string());
        }

        Ok(Self {
            key_code,
            modifiers,
            display_name: display_name.to_string(),
            sequence_count,
            max_interval_ms: max_interval.as_millis() as u64,
        })
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    /// An event matches when the key code is equal and the event flags
    /// contain the required modifier mask. Extra modifiers held by the
    /// user do not disqualify the press.
    pub fn matches(&self, key_code: u16, flags: u64) -> bool {
        key_code == self.key_code && flags & self.modifiers == self.modifiers
    }

    /// Deserialized configs bypass the constructor, so re-check the
    /// invariants before trusting persisted values.
    pub fn validate(&self) -> Result<(), String> {
        if self.sequence_count == 0 {
            return Err("Hotkey sequence count must be at least 1".to_string());
        }

        if self.max_interval_ms == 0 {
            return Err("Hotkey inter-press interval must be greater than zero".to_string());
        }

        Ok(())
    }

    /// The fixed set of selectable trigger presets.
    pub fn presets() -> Vec<HotkeyConfig> {
        let triple = [
            (KEY_CODE_C, "Cmd+C (3x)"),
            (KEY_CODE_B, "Cmd+B (3x)"),
            (KEY_CODE_T, "Cmd+T (3x)"),
            (KEY_CODE_R, "Cmd+R (3x)"),
        ];
        let double = [
            (KEY_CODE_C, "Cmd+Shift+C (2x)"),
            (KEY_CODE_B, "Cmd+Shift+B (2x)"),
            (KEY_CODE_T, "Cmd+Shift+T (2x)"),
            (KEY_CODE_R, "Cmd+Shift+R (2x)"),
        ];

        triple
            .iter()
            .map(|(key_code, label)| (*key_code, MODIFIER_COMMAND, *label, 3))
            .chain(
                double.iter().map(|(key_code, label)| {
                    (*key_code, MODIFIER_COMMAND | MODIFIER_SHIFT, *label, 2)
                }),
            )
            .map(|(key_code, modifiers, label, count)| {
                HotkeyConfig::new(key_code, modifiers, label, count)
                    .expect("preset hotkey configs are valid")
            })
            .collect()
    }
}

/// Emitted once the configured number of matching presses land inside
/// the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation;

/// Recognizes repeated-press sequences in a raw key-down stream.
///
/// Pure state machine over (key, flags, now); never fails, never does
/// I/O. Auto-repeat filtering is the event source's responsibility.
#[derive(Debug)]
pub struct SequenceDetector {
    config: HotkeyConfig,
    press_count: u32,
    last_press: Option<Instant>,
}

impl SequenceDetector {
    pub fn new(config: HotkeyConfig) -> Self {
        Self {
            config,
            press_count: 0,
            last_press: None,
        }
    }

    pub fn config(&self) -> &HotkeyConfig {
        &self.config
    }

    /// Replaces the active config and discards any partial sequence; a
    /// pending count never carries over between configs.
    pub fn set_config(&mut self, config: HotkeyConfig) {
        debug!(hotkey = %config.display_name, "sequence detector reconfigured");
        self.config = config;
        self.press_count = 0;
        self.last_press = None;
    }

    pub fn on_key_down(&mut self, key_code: u16, flags: u64, now: Instant) -> Option<Activation> {
        if !self.config.matches(key_code, flags) {
            self.press_count = 0;
            return None;
        }

        let within_window = self
            .last_press
            .is_some_and(|last| now.duration_since(last) <= self.config.max_interval());

        self.press_count = if within_window {
            self.press_count + 1
        } else {
            1
        };
        self.last_press = Some(now);

        if self.press_count >= self.config.sequence_count {
            self.press_count = 0;
            debug!(hotkey = %self.config.display_name, "hotkey sequence activated");
            return Some(Activation);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(sequence_count: u32) -> HotkeyConfig {
        HotkeyConfig::with_interval(
            KEY_CODE_C,
            MODIFIER_COMMAND,
            "Cmd+C (test)",
            sequence_count,
            Duration::from_millis(500),
        )
        .expect("test config should be valid")
    }

    #[test]
    fn rejects_zero_sequence_count_and_zero_interval() {
        assert!(HotkeyConfig::new(KEY_CODE_C, MODIFIER_COMMAND, "bad", 0).is_err());
        assert!(HotkeyConfig::with_interval(
            KEY_CODE_C,
            MODIFIER_COMMAND,
            "bad",
            3,
            Duration::ZERO,
        )
        .is_err());
    }

    #[test]
    fn default_config_is_triple_cmd_c() {
        let config = HotkeyConfig::default();
        assert_eq!(config.key_code, KEY_CODE_C);
        assert_eq!(config.modifiers, MODIFIER_COMMAND);
        assert_eq!(config.sequence_count, 3);
        assert_eq!(config.max_interval(), Duration::from_millis(500));
    }

    #[test]
    fn matching_allows_extra_modifiers() {
        let config = test_config(3);
        assert!(config.matches(KEY_CODE_C, MODIFIER_COMMAND));
        assert!(config.matches(KEY_CODE_C, MODIFIER_COMMAND | MODIFIER_SHIFT));
        assert!(!config.matches(KEY_CODE_C, MODIFIER_SHIFT));
        assert!(!config.matches(KEY_CODE_B, MODIFIER_COMMAND));
    }

    #[test]
    fn activates_exactly_once_per_threshold_and_resets() {
        let mut detector = SequenceDetector::new(test_config(3));
        let start = Instant::now();
        let step = Duration::from_millis(100);

        assert_eq!(detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start), None);
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 2),
            Some(Activation)
        );

        // Counter restarted: three more presses are needed for the next
        // activation, never a double-fire on press four.
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 3),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 4),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 5),
            Some(Activation)
        );
    }

    #[test]
    fn gap_longer_than_window_restarts_count_at_one() {
        let mut detector = SequenceDetector::new(test_config(3));
        let start = Instant::now();

        assert_eq!(detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start), None);
        assert_eq!(
            detector.on_key_down(
                KEY_CODE_C,
                MODIFIER_COMMAND,
                start + Duration::from_millis(100)
            ),
            None
        );

        // Third press arrives too late; it becomes press one of a new
        // sequence rather than completing the old one.
        let late = start + Duration::from_millis(100) + Duration::from_millis(501);
        assert_eq!(detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, late), None);
        assert_eq!(
            detector.on_key_down(
                KEY_CODE_C,
                MODIFIER_COMMAND,
                late + Duration::from_millis(100)
            ),
            None
        );
        assert_eq!(
            detector.on_key_down(
                KEY_CODE_C,
                MODIFIER_COMMAND,
                late + Duration::from_millis(200)
            ),
            Some(Activation)
        );
    }

    #[test]
    fn press_exactly_at_window_boundary_still_counts() {
        let mut detector = SequenceDetector::new(test_config(2));
        let start = Instant::now();

        assert_eq!(detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start), None);
        assert_eq!(
            detector.on_key_down(
                KEY_CODE_C,
                MODIFIER_COMMAND,
                start + Duration::from_millis(500)
            ),
            Some(Activation)
        );
    }

    #[test]
    fn non_matching_key_resets_pending_sequence() {
        let mut detector = SequenceDetector::new(test_config(3));
        let start = Instant::now();
        let step = Duration::from_millis(100);

        detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start);
        detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step);
        detector.on_key_down(KEY_CODE_B, MODIFIER_COMMAND, start + step * 2);

        // The interrupted sequence must start over from scratch.
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 3),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 4),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 5),
            Some(Activation)
        );
    }

    #[test]
    fn replacing_config_discards_partial_sequence() {
        let mut detector = SequenceDetector::new(test_config(3));
        let start = Instant::now();
        let step = Duration::from_millis(100);

        detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start);
        detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step);

        detector.set_config(test_config(2));

        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 2),
            None
        );
        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start + step * 3),
            Some(Activation)
        );
    }

    #[test]
    fn single_press_config_activates_on_every_press() {
        let mut detector = SequenceDetector::new(test_config(1));
        let start = Instant::now();

        assert_eq!(
            detector.on_key_down(KEY_CODE_C, MODIFIER_COMMAND, start),
            Some(Activation)
        );
        assert_eq!(
            detector.on_key_down(
                KEY_CODE_C,
                MODIFIER_COMMAND,
                start + Duration::from_millis(50)
            ),
            Some(Activation)
        );
    }

    #[test]
    fn presets_include_triple_and_double_press_variants() {
        let presets = HotkeyConfig::presets();
        assert_eq!(presets.len(), 8);
        assert!(presets.iter().all(|config| config.validate().is_ok()));
        assert!(presets
            .iter()
            .any(|config| config.sequence_count == 2
                && config.modifiers == (MODIFIER_COMMAND | MODIFIER_SHIFT)));
    }
}
