//! # Network Status
//!
//! [`Connectivity`] owns what the device knows about its IP link: whether it is up
//! and which IPv4 configuration it holds. Whoever drives the network stack reports
//! changes through explicit calls, and every change is broadcast as a
//! [`NetworkStatus`] through a [`Publisher`], so interested tasks link a queue
//! instead of reading shared state.
//!
//! ```ignore
//! static NETWORK_EVENTS: Queue<NetworkStatus, 4> = Queue::new();
//! static NETWORK_STATUS: Publisher<NetworkStatus, 2> = Publisher::new();
//!
//! let _link = Link::new(&NETWORK_STATUS, &NETWORK_EVENTS)?;
//! let mut connectivity = Connectivity::new(&NETWORK_STATUS);
//! connectivity.track(stack, Duration::from_millis(500)).await;
//! ```

use embassy_net::{Ipv4Address, Ipv4Cidr, Stack, StaticConfigV4};
use embassy_time::{Duration, Timer};

use crate::ipc::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkEvent {
    /// An IPv4 configuration was obtained or renewed.
    GotIp,
    Disconnected,
}

/// Broadcast on every connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkStatus {
    pub event: NetworkEvent,
    /// The local address differs from the one reported before.
    pub ip_changed: bool,
}

impl NetworkStatus {
    pub fn is_connected(&self) -> bool {
        self.event == NetworkEvent::GotIp
    }
}

/// The IPv4 configuration of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub address: Ipv4Cidr,
    pub gateway: Option<Ipv4Address>,
}

impl From<&StaticConfigV4> for IpInfo {
    fn from(config: &StaticConfigV4) -> Self {
        Self {
            address: config.address,
            gateway: config.gateway,
        }
    }
}

/// Current link status, published to subscribers on every change.
pub struct Connectivity<'p, 'q, const SUBS: usize> {
    publisher: &'p Publisher<'q, NetworkStatus, SUBS>,
    ip: Option<IpInfo>,
}

impl<'p, 'q, const SUBS: usize> Connectivity<'p, 'q, SUBS> {
    pub fn new(publisher: &'p Publisher<'q, NetworkStatus, SUBS>) -> Self {
        Self {
            publisher,
            ip: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ip.is_some()
    }

    pub fn ip_info(&self) -> Option<IpInfo> {
        self.ip
    }

    /// Local IPv4 address while connected.
    pub fn local_ip(&self) -> Option<Ipv4Address> {
        self.ip.map(|info| info.address.address())
    }

    /// Records a new or renewed IPv4 configuration and publishes `GotIp`.
    pub fn set_connected(&mut self, info: IpInfo) -> NetworkStatus {
        let previous = self.ip.replace(info).map(|old| old.address.address());
        let address = info.address.address();
        let ip_changed = previous != Some(address);
        let [a, b, c, d] = address.octets();
        info!(
            "Network up: {}.{}.{}.{}/{} (changed: {})",
            a,
            b,
            c,
            d,
            info.address.prefix_len(),
            ip_changed
        );
        self.publish(NetworkStatus {
            event: NetworkEvent::GotIp,
            ip_changed,
        })
    }

    /// Forgets the IPv4 configuration and publishes `Disconnected`.
    pub fn set_disconnected(&mut self) -> NetworkStatus {
        self.ip = None;
        info!("Network down");
        self.publish(NetworkStatus {
            event: NetworkEvent::Disconnected,
            ip_changed: true,
        })
    }

    /// Brings the status in line with the stack's current configuration.
    ///
    /// Publishes only when something changed and returns what was published.
    pub fn apply_config(&mut self, config: Option<&StaticConfigV4>) -> Option<NetworkStatus> {
        match (config.map(IpInfo::from), self.ip) {
            (Some(new), Some(current)) if new == current => None,
            (Some(new), _) => Some(self.set_connected(new)),
            (None, Some(_)) => Some(self.set_disconnected()),
            (None, None) => None,
        }
    }

    /// Follows `stack`, applying its IPv4 configuration every `interval`. Never returns.
    pub async fn track(&mut self, stack: Stack<'_>, interval: Duration) {
        loop {
            let config = if stack.is_link_up() {
                stack.config_v4()
            } else {
                None
            };
            self.apply_config(config.as_ref());
            Timer::after(interval).await;
        }
    }

    fn publish(&self, status: NetworkStatus) -> NetworkStatus {
        self.publisher.publish(status);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{Link, Queue};

    fn config(last_octet: u8) -> StaticConfigV4 {
        StaticConfigV4 {
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 1, last_octet), 24),
            gateway: Some(Ipv4Address::new(192, 168, 1, 1)),
            dns_servers: Default::default(),
        }
    }

    #[test]
    fn test_status_is_published_to_linked_queue() {
        let queue = Queue::<NetworkStatus, 4>::new();
        let publisher = Publisher::<NetworkStatus, 2>::new();
        let _link = Link::new(&publisher, &queue).unwrap();
        let mut connectivity = Connectivity::new(&publisher);

        connectivity.set_connected(IpInfo::from(&config(10)));
        assert_eq!(connectivity.local_ip(), Some(Ipv4Address::new(192, 168, 1, 10)));
        connectivity.set_disconnected();
        assert_eq!(connectivity.local_ip(), None);

        let first = queue.pop().unwrap();
        assert!(first.is_connected());
        assert!(first.ip_changed);
        assert_eq!(
            queue.pop(),
            Some(NetworkStatus {
                event: NetworkEvent::Disconnected,
                ip_changed: true,
            })
        );
    }

    #[test]
    fn test_renewal_with_same_address_is_not_a_change() {
        let publisher = Publisher::<NetworkStatus, 1>::new();
        let mut connectivity = Connectivity::new(&publisher);

        assert!(connectivity.set_connected(IpInfo::from(&config(10))).ip_changed);
        assert!(!connectivity.set_connected(IpInfo::from(&config(10))).ip_changed);
        assert!(connectivity.set_connected(IpInfo::from(&config(11))).ip_changed);
    }

    #[test]
    fn test_apply_config_publishes_only_changes() {
        let queue = Queue::<NetworkStatus, 8>::new();
        let publisher = Publisher::<NetworkStatus, 1>::new();
        let _link = Link::new(&publisher, &queue).unwrap();
        let mut connectivity = Connectivity::new(&publisher);

        assert_eq!(connectivity.apply_config(None), None);
        assert!(connectivity.apply_config(Some(&config(20))).is_some());
        assert_eq!(connectivity.apply_config(Some(&config(20))), None);
        let down = connectivity.apply_config(None).unwrap();
        assert_eq!(down.event, NetworkEvent::Disconnected);
        assert!(!connectivity.is_connected());
        assert_eq!(queue.count(), 2);
    }
}
