//! Topic filters the runtime subscribes to after connecting.

use heapless::{String, Vec};

use crate::packet::QoS;

/// Maximum length for a single topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Owned list of `(topic filter, QoS)` pairs.
///
/// Topics are copied in, so callers can register from temporary strings.
///
/// ```ignore
/// let mut registry = TopicRegistry::<8>::new();
/// registry.add_topic("device/cmd", QoS::AtLeastOnce);
/// registry.add_topic("device/+/set", QoS::AtMostOnce);
/// ```
#[derive(Default)]
pub struct TopicRegistry<const MAX_TOPICS: usize> {
    topics: Vec<(String<MAX_TOPIC_LEN>, QoS), MAX_TOPICS>,
}

impl<const MAX_TOPICS: usize> TopicRegistry<MAX_TOPICS> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic filter, replacing the QoS if it is already registered.
    ///
    /// Returns `false` if the registry is full or the topic is empty or too long.
    pub fn add_topic(&mut self, topic: &str, qos: QoS) -> bool {
        if topic.is_empty() || topic.len() > MAX_TOPIC_LEN {
            return false;
        }
        if let Some(entry) = self.topics.iter_mut().find(|(t, _)| t.as_str() == topic) {
            entry.1 = qos;
            return true;
        }

        let mut owned = String::new();
        if owned.push_str(topic).is_err() {
            return false;
        }
        self.topics.push((owned, qos)).is_ok()
    }

    /// Drops a topic filter. Returns whether it was registered.
    pub fn remove_topic(&mut self, topic: &str) -> bool {
        match self.topics.iter().position(|(t, _)| t.as_str() == topic) {
            Some(index) => {
                self.topics.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, QoS)> {
        self.topics.iter().map(|(topic, qos)| (topic.as_str(), *qos))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn clear(&mut self) {
        self.topics.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_iterate_in_order() {
        let mut registry = TopicRegistry::<4>::new();
        assert!(registry.add_topic("a/b", QoS::AtMostOnce));
        assert!(registry.add_topic("c/#", QoS::ExactlyOnce));
        let topics: heapless::Vec<(&str, QoS), 4> = registry.iter().collect();
        assert_eq!(topics.as_slice(), &[("a/b", QoS::AtMostOnce), ("c/#", QoS::ExactlyOnce)]);
    }

    #[test]
    fn test_re_adding_updates_qos() {
        let mut registry = TopicRegistry::<2>::new();
        registry.add_topic("a", QoS::AtMostOnce);
        registry.add_topic("a", QoS::AtLeastOnce);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next(), Some(("a", QoS::AtLeastOnce)));
    }

    #[test]
    fn test_rejects_when_full_or_invalid() {
        let mut registry = TopicRegistry::<1>::new();
        assert!(!registry.add_topic("", QoS::AtMostOnce));
        let long = [b'x'; MAX_TOPIC_LEN + 1];
        assert!(!registry.add_topic(core::str::from_utf8(&long).unwrap(), QoS::AtMostOnce));
        assert!(registry.add_topic("a", QoS::AtMostOnce));
        assert!(!registry.add_topic("b", QoS::AtMostOnce));

        assert!(registry.remove_topic("a"));
        assert!(!registry.remove_topic("a"));
        assert!(registry.is_empty());
    }
}
