//! Topic construction for the bridge
//!
//! All topics hang off the configured base topic. Data topics are
//! `<base>/<vin>/<path...>`; commands are received on `<base>/SET/#`.

use super::command::COMMAND_SEGMENT;

/// Topic construction functions
pub struct TopicBuilder;

impl TopicBuilder {
    /// Subscription filter for inbound commands: `<base>/SET/#`
    pub fn command_filter(base_topic: &str) -> String {
        format!("{base_topic}/{COMMAND_SEGMENT}/#")
    }

    /// Root of all data published for one vehicle: `<base>/<vin>`
    pub fn vehicle_root(base_topic: &str, vin: &str) -> String {
        format!("{base_topic}/{vin}")
    }

    /// Append one level to a topic
    pub fn child(parent: &str, level: &str) -> String {
        format!("{parent}/{level}")
    }

    /// Check a received topic against a subscription filter
    ///
    /// Supports the `+` single-level and trailing `#` multi-level wildcards.
    pub fn matches_filter(filter: &str, topic: &str) -> bool {
        let mut filter_levels = filter.split('/');
        let mut topic_levels = topic.split('/');

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => continue,
                (Some(f), Some(t)) if f == t => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}
