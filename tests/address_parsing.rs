//! Property tests for peer address splitting.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use proptest::prelude::*;
use waf_gate::waf::transaction::split_remote_addr;

proptest! {
    #[test]
    fn ipv4_socket_addr_splits_into_ip_and_port(ip in any::<Ipv4Addr>(), port in any::<u16>()) {
        let addr = SocketAddrV4::new(ip, port).to_string();
        prop_assert_eq!(split_remote_addr(&addr), (ip.to_string(), port));
    }

    #[test]
    fn ipv6_socket_addr_loses_brackets(ip in any::<Ipv6Addr>(), port in any::<u16>()) {
        let addr = SocketAddrV6::new(ip, port, 0, 0).to_string();
        prop_assert_eq!(split_remote_addr(&addr), (ip.to_string(), port));
    }

    #[test]
    fn bare_ipv6_has_no_port(ip in any::<Ipv6Addr>()) {
        let (host, port) = split_remote_addr(&ip.to_string());
        // "::" style addresses always carry at least two colons.
        prop_assert_eq!(port, 0);
        prop_assert_eq!(host, ip.to_string());
    }

    #[test]
    fn colonless_input_is_all_host(s in "[^:]{0,32}") {
        prop_assert_eq!(split_remote_addr(&s), (s.clone(), 0));
    }

    #[test]
    fn never_panics(s in ".{0,64}") {
        let _ = split_remote_addr(&s);
    }
}
