//! Proptest generators for property-based testing.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use proptest::prelude::*;
use uuid::Uuid;
use warden_core::GrantScope;
use warden_perms::ACTIONS;

/// Generate a plausible user name.
pub fn user_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Generate a password of printable ASCII.
pub fn password() -> impl Strategy<Value = String> {
    "[ -~]{1,40}"
}

/// Generate a client address, v4 or v6.
pub fn ip_address() -> impl Strategy<Value = IpAddr> {
    prop_oneof![
        any::<[u8; 4]>().prop_map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        any::<[u8; 16]>().prop_map(|b| IpAddr::V6(Ipv6Addr::from(b))),
    ]
}

/// Generate a grant scope.
pub fn grant_scope() -> impl Strategy<Value = GrantScope> {
    prop_oneof![
        Just(GrantScope::Global),
        any::<u128>().prop_map(|n| GrantScope::Repository(Uuid::from_u128(n))),
        any::<u128>().prop_map(|n| GrantScope::Team(Uuid::from_u128(n))),
    ]
}

/// Pick a name from the action table.
pub fn action_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ACTIONS.iter().map(|rule| rule.name).collect::<Vec<_>>())
}

/// Generate a token lifetime between one minute and one week, in seconds.
pub fn lifetime_secs() -> impl Strategy<Value = i64> {
    60i64..=604_800
}
