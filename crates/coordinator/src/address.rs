//! Peer-to-peer address directory.

use rti_messages::Message;
use rti_types::FederateId;
use std::net::{IpAddr, Ipv4Addr};

/// A federate's advertised peer-to-peer server endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// Federate id → advertised endpoint.
///
/// Advertisements are fire-and-forget and queries are pull-based, so a query
/// can race an advertisement; the querier retries.
#[derive(Debug, Clone)]
pub struct AddressDirectory {
    entries: Vec<Option<PeerAddress>>,
}

impl AddressDirectory {
    pub fn new(num_federates: usize) -> Self {
        Self {
            entries: vec![None; num_federates],
        }
    }

    /// Record `federate`'s endpoint. The host is where its RTI connection
    /// comes from.
    pub fn advertise(&mut self, federate: FederateId, host: IpAddr, port: u16) {
        if let Some(entry) = self.entries.get_mut(federate.index()) {
            *entry = Some(PeerAddress {
                ip: ipv4_of(host),
                port,
            });
        }
    }

    /// Withdraw `federate`'s endpoint once it leaves.
    pub fn forget(&mut self, federate: FederateId) {
        if let Some(entry) = self.entries.get_mut(federate.index()) {
            *entry = None;
        }
    }

    pub fn lookup(&self, federate: FederateId) -> Option<PeerAddress> {
        self.entries.get(federate.index()).copied().flatten()
    }

    /// The reply to an address query; port `None` means "not yet known".
    pub fn reply(&self, federate: FederateId) -> Message {
        match self.lookup(federate) {
            Some(address) => Message::AddressQueryReply {
                port: Some(address.port),
                ip: address.ip,
            },
            None => Message::AddressQueryReply {
                port: None,
                ip: Ipv4Addr::UNSPECIFIED,
            },
        }
    }
}

fn ipv4_of(host: IpAddr) -> Ipv4Addr {
    match host {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) if v6.is_loopback() => Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_unknown_then_advertised() {
        let mut directory = AddressDirectory::new(2);
        assert_eq!(
            directory.reply(FederateId(1)),
            Message::AddressQueryReply {
                port: None,
                ip: Ipv4Addr::UNSPECIFIED
            }
        );

        directory.advertise(FederateId(1), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5000);
        assert_eq!(
            directory.reply(FederateId(1)),
            Message::AddressQueryReply {
                port: Some(5000),
                ip: Ipv4Addr::new(10, 0, 0, 2)
            }
        );
    }

    #[test]
    fn test_forget_withdraws_endpoint() {
        let mut directory = AddressDirectory::new(2);
        directory.advertise(FederateId(0), IpAddr::V4(Ipv4Addr::LOCALHOST), 7000);
        directory.advertise(FederateId(1), IpAddr::V4(Ipv4Addr::LOCALHOST), 7001);
        directory.forget(FederateId(0));
        directory.forget(FederateId(9));
        assert_eq!(directory.lookup(FederateId(0)), None);
        assert_eq!(directory.lookup(FederateId(1)).map(|a| a.port), Some(7001));
    }

    #[test]
    fn test_out_of_range_is_unknown() {
        let mut directory = AddressDirectory::new(1);
        directory.advertise(FederateId(4), IpAddr::V4(Ipv4Addr::LOCALHOST), 1);
        assert_eq!(directory.lookup(FederateId(4)), None);
    }

    #[test]
    fn test_ipv6_hosts_map_to_ipv4() {
        let mut directory = AddressDirectory::new(2);
        directory.advertise(FederateId(0), IpAddr::V6(Ipv6Addr::LOCALHOST), 1);
        directory.advertise(
            FederateId(1),
            IpAddr::V6(Ipv4Addr::new(192, 168, 1, 9).to_ipv6_mapped()),
            2,
        );
        assert_eq!(directory.lookup(FederateId(0)).unwrap().ip, Ipv4Addr::LOCALHOST);
        assert_eq!(
            directory.lookup(FederateId(1)).unwrap().ip,
            Ipv4Addr::new(192, 168, 1, 9)
        );
    }
}
