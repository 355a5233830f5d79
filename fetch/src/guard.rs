//! Host guard: SSRF mitigation.
//!
//! Every address a target maps to is classified against the IANA
//! special-purpose registries. A single non-public address rejects the whole
//! host; there is no "first good address" fallback. The validated address set
//! is returned so the fetch can pin its connection to exactly those addresses
//! instead of resolving a second time.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::Pin;
use std::time::Instant;

use serde::Serialize;
use tokio::net::lookup_host;
use tokio::time::timeout;
use url::Host;

use crate::resolved::ResolvedConfig;
use crate::types::{ErrorCode, FetchError, TimeoutPhase};
use crate::validate::FetchTarget;

/// Resolution future type alias.
pub type ResolveFut<'a> = Pin<Box<dyn Future<Output = io::Result<Vec<IpAddr>>> + Send + 'a>>;

/// Hostname resolution capability.
///
/// Implementations must return every address the name maps to (A and AAAA).
pub trait Resolve: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> ResolveFut<'a>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str, port: u16) -> ResolveFut<'a> {
        Box::pin(async move {
            let addrs = lookup_host((host, port)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        })
    }
}

/// Network class of a single address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressClass {
    Public,
    Private,
    Loopback,
    LinkLocal,
    Multicast,
    Unspecified,
    Reserved,
    /// Matched an operator-configured blocked range.
    Denylisted,
}

impl AddressClass {
    #[must_use]
    pub fn is_public(self) -> bool {
        self == AddressClass::Public
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AddressClass::Public => "public",
            AddressClass::Private => "private",
            AddressClass::Loopback => "loopback",
            AddressClass::LinkLocal => "link_local",
            AddressClass::Multicast => "multicast",
            AddressClass::Unspecified => "unspecified",
            AddressClass::Reserved => "reserved",
            AddressClass::Denylisted => "denylisted",
        }
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An address tagged with its class. Transient; only lives during a guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
    pub class: AddressClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let (addr, prefix) = text.trim().split_once('/')?;
        let network = addr.parse::<IpAddr>().ok()?;
        let prefix = prefix.parse::<u8>().ok()?;
        match network {
            IpAddr::V4(_) if prefix > 32 => return None,
            IpAddr::V6(_) if prefix > 128 => return None,
            _ => {}
        }
        Some(Self { network, prefix })
    }

    fn contains(&self, ip: IpAddr) -> bool {
        match (ip, self.network) {
            (IpAddr::V4(ipv4), IpAddr::V4(net)) => {
                prefix_match(&ipv4.octets(), &net.octets(), self.prefix)
            }
            (IpAddr::V6(ipv6), IpAddr::V6(net)) => {
                prefix_match(&ipv6.octets(), &net.octets(), self.prefix)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

struct SpecialRange {
    network: IpAddr,
    prefix: u8,
    class: AddressClass,
}

impl SpecialRange {
    const fn v4(octets: [u8; 4], prefix: u8, class: AddressClass) -> Self {
        Self {
            network: IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])),
            prefix,
            class,
        }
    }

    const fn v6(segments: [u16; 8], prefix: u8, class: AddressClass) -> Self {
        let [a, b, c, d, e, f, g, h] = segments;
        Self {
            network: IpAddr::V6(Ipv6Addr::new(a, b, c, d, e, f, g, h)),
            prefix,
            class,
        }
    }

    fn contains(&self, ip: IpAddr) -> bool {
        Cidr {
            network: self.network,
            prefix: self.prefix,
        }
        .contains(ip)
    }
}

// First match wins: more specific ranges come first.
const IPV4_SPECIAL_RANGES: &[SpecialRange] = &[
    SpecialRange::v4([0, 0, 0, 0], 32, AddressClass::Unspecified),
    SpecialRange::v4([0, 0, 0, 0], 8, AddressClass::Reserved),
    SpecialRange::v4([10, 0, 0, 0], 8, AddressClass::Private),
    SpecialRange::v4([100, 64, 0, 0], 10, AddressClass::Private),
    SpecialRange::v4([127, 0, 0, 0], 8, AddressClass::Loopback),
    SpecialRange::v4([169, 254, 0, 0], 16, AddressClass::LinkLocal),
    SpecialRange::v4([172, 16, 0, 0], 12, AddressClass::Private),
    SpecialRange::v4([192, 0, 0, 0], 24, AddressClass::Reserved),
    SpecialRange::v4([192, 0, 2, 0], 24, AddressClass::Reserved),
    SpecialRange::v4([192, 88, 99, 0], 24, AddressClass::Reserved),
    SpecialRange::v4([192, 168, 0, 0], 16, AddressClass::Private),
    SpecialRange::v4([198, 18, 0, 0], 15, AddressClass::Reserved),
    SpecialRange::v4([198, 51, 100, 0], 24, AddressClass::Reserved),
    SpecialRange::v4([203, 0, 113, 0], 24, AddressClass::Reserved),
    SpecialRange::v4([224, 0, 0, 0], 4, AddressClass::Multicast),
    SpecialRange::v4([240, 0, 0, 0], 4, AddressClass::Reserved),
];

const IPV6_SPECIAL_RANGES: &[SpecialRange] = &[
    SpecialRange::v6([0, 0, 0, 0, 0, 0, 0, 0], 128, AddressClass::Unspecified),
    SpecialRange::v6([0, 0, 0, 0, 0, 0, 0, 1], 128, AddressClass::Loopback),
    SpecialRange::v6([0x100, 0, 0, 0, 0, 0, 0, 0], 64, AddressClass::Reserved),
    SpecialRange::v6([0x2001, 0, 0, 0, 0, 0, 0, 0], 23, AddressClass::Reserved),
    SpecialRange::v6([0x2001, 0xdb8, 0, 0, 0, 0, 0, 0], 32, AddressClass::Reserved),
    SpecialRange::v6([0xfc00, 0, 0, 0, 0, 0, 0, 0], 7, AddressClass::Private),
    SpecialRange::v6([0xfe80, 0, 0, 0, 0, 0, 0, 0], 10, AddressClass::LinkLocal),
    SpecialRange::v6([0xfec0, 0, 0, 0, 0, 0, 0, 0], 10, AddressClass::Reserved),
    SpecialRange::v6([0xff00, 0, 0, 0, 0, 0, 0, 0], 8, AddressClass::Multicast),
];

/// Global unicast space; all other IPv6 is unallocated or special.
const IPV6_GLOBAL_UNICAST: SpecialRange =
    SpecialRange::v6([0x2000, 0, 0, 0, 0, 0, 0, 0], 3, AddressClass::Public);

/// Classify an address against the special-purpose registries.
///
/// IPv6 forms that embed an IPv4 address (IPv4-mapped, NAT64 well-known
/// prefix, 6to4) are classified by the embedded address.
#[must_use]
pub fn classify_ip(ip: IpAddr) -> AddressClass {
    match ip {
        IpAddr::V4(v4) => classify_ipv4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = embedded_ipv4(v6) {
                return classify_ipv4(v4);
            }
            if let Some(range) = IPV6_SPECIAL_RANGES.iter().find(|r| r.contains(ip)) {
                return range.class;
            }
            if IPV6_GLOBAL_UNICAST.contains(ip) {
                AddressClass::Public
            } else {
                AddressClass::Reserved
            }
        }
    }
}

fn classify_ipv4(v4: Ipv4Addr) -> AddressClass {
    let ip = IpAddr::V4(v4);
    IPV4_SPECIAL_RANGES
        .iter()
        .find(|r| r.contains(ip))
        .map_or(AddressClass::Public, |r| r.class)
}

fn embedded_ipv4(v6: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = v6.to_ipv4_mapped() {
        return Some(v4);
    }
    let seg = v6.segments();
    let join = |hi: u16, lo: u16| Ipv4Addr::from((u32::from(hi) << 16) | u32::from(lo));
    // NAT64 well-known prefix 64:ff9b::/96
    if seg[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        return Some(join(seg[6], seg[7]));
    }
    // 6to4 2002::/16
    if seg[0] == 0x2002 {
        return Some(join(seg[1], seg[2]));
    }
    None
}

fn prefix_match(ip: &[u8], net: &[u8], prefix: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let full = (prefix / 8) as usize;
    let rem = prefix % 8;

    if ip.len() < full || net.len() < full {
        return false;
    }

    if ip[..full] != net[..full] {
        return false;
    }

    if rem == 0 {
        return true;
    }

    let mask = 0xFFu8 << (8 - rem);
    ip[full] & mask == net[full] & mask
}

/// Tag an address, honoring configured denylists and the loopback override.
pub(crate) fn evaluate_ip(ip: IpAddr, config: &ResolvedConfig) -> ResolvedAddress {
    let class = classify_ip(ip);
    if class == AddressClass::Loopback && config.security.allow_insecure_overrides {
        return ResolvedAddress {
            ip,
            class: AddressClass::Public,
        };
    }
    if class.is_public() {
        let mapped = match ip {
            IpAddr::V6(v6) => embedded_ipv4(v6).map_or(ip, IpAddr::V4),
            IpAddr::V4(_) => ip,
        };
        if config
            .security
            .blocked_cidrs
            .iter()
            .any(|cidr| cidr.contains(ip) || cidr.contains(mapped))
        {
            return ResolvedAddress {
                ip,
                class: AddressClass::Denylisted,
            };
        }
    }
    ResolvedAddress { ip, class }
}

/// Run the host guard for one hop.
///
/// Returns the validated address set, sorted IPv6-first. Resolution shares the
/// caller's deadline.
pub(crate) async fn check_host(
    target: &FetchTarget,
    config: &ResolvedConfig,
    resolver: &dyn Resolve,
    deadline: Instant,
) -> Result<Vec<IpAddr>, FetchError> {
    let mut ips = match target.host() {
        Host::Ipv4(ip) => vec![IpAddr::V4(*ip)],
        Host::Ipv6(ip) => vec![IpAddr::V6(*ip)],
        Host::Domain(name) => resolve_all(name, target.port(), config, resolver, deadline).await?,
    };

    sort_ips(&mut ips);
    ips.dedup();

    for ip in &ips {
        let address = evaluate_ip(*ip, config);
        if !address.class.is_public() {
            tracing::warn!(
                host = target.host_str(),
                ip = %address.ip,
                class = %address.class,
                "rejecting non-public fetch target"
            );
            return Err(FetchError::new(
                ErrorCode::PrivateHostRejected,
                format!("connection to {} blocked ({})", address.ip, address.class),
                false,
            )
            .with_detail("host", target.host_str())
            .with_detail("blocked_ip", address.ip.to_string())
            .with_detail("class", address.class.as_str()));
        }
    }

    tracing::debug!(host = target.host_str(), addresses = ips.len(), "host guard passed");
    Ok(ips)
}

async fn resolve_all(
    host: &str,
    port: u16,
    config: &ResolvedConfig,
    resolver: &dyn Resolve,
    deadline: Instant,
) -> Result<Vec<IpAddr>, FetchError> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(config.timeout_error(TimeoutPhase::Dns));
    }

    let ips = timeout(remaining, resolver.resolve(host, port))
        .await
        .map_err(|_| config.timeout_error(TimeoutPhase::Dns))?
        .map_err(|e| {
            FetchError::new(
                ErrorCode::DnsResolutionFailed,
                format!("dns lookup failed: {e}"),
                false,
            )
            .with_detail("host", host)
            .with_detail("error", e.to_string())
        })?;

    if ips.is_empty() {
        return Err(FetchError::new(
            ErrorCode::DnsResolutionFailed,
            "dns lookup returned no addresses",
            false,
        )
        .with_detail("host", host));
    }

    Ok(ips)
}

fn sort_ips(ips: &mut [IpAddr]) {
    ips.sort_by(|a, b| match (a, b) {
        (IpAddr::V6(a6), IpAddr::V6(b6)) => a6.octets().cmp(&b6.octets()),
        (IpAddr::V4(a4), IpAddr::V4(b4)) => a4.octets().cmp(&b4.octets()),
        (IpAddr::V6(_), IpAddr::V4(_)) => Ordering::Less,
        (IpAddr::V4(_), IpAddr::V6(_)) => Ordering::Greater,
    });
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::{AddressClass, Cidr, classify_ip, evaluate_ip};
    use crate::resolved::ResolvedConfig;
    use crate::types::{FetchConfig, SecurityConfig};

    fn class_of(text: &str) -> AddressClass {
        classify_ip(text.parse::<IpAddr>().expect("valid ip literal"))
    }

    #[test]
    fn ipv4_special_ranges() {
        assert_eq!(class_of("10.0.0.5"), AddressClass::Private);
        assert_eq!(class_of("172.16.0.1"), AddressClass::Private);
        assert_eq!(class_of("172.31.255.255"), AddressClass::Private);
        assert_eq!(class_of("192.168.1.10"), AddressClass::Private);
        assert_eq!(class_of("100.64.0.1"), AddressClass::Private);
        assert_eq!(class_of("127.0.0.1"), AddressClass::Loopback);
        assert_eq!(class_of("127.255.0.9"), AddressClass::Loopback);
        assert_eq!(class_of("169.254.169.254"), AddressClass::LinkLocal);
        assert_eq!(class_of("224.0.0.1"), AddressClass::Multicast);
        assert_eq!(class_of("239.255.255.250"), AddressClass::Multicast);
        assert_eq!(class_of("0.0.0.0"), AddressClass::Unspecified);
        assert_eq!(class_of("0.1.2.3"), AddressClass::Reserved);
        assert_eq!(class_of("192.0.2.1"), AddressClass::Reserved);
        assert_eq!(class_of("198.18.0.1"), AddressClass::Reserved);
        assert_eq!(class_of("240.0.0.1"), AddressClass::Reserved);
        assert_eq!(class_of("255.255.255.255"), AddressClass::Reserved);
    }

    #[test]
    fn ipv4_public() {
        assert_eq!(class_of("93.184.216.34"), AddressClass::Public);
        assert_eq!(class_of("8.8.8.8"), AddressClass::Public);
        assert_eq!(class_of("172.32.0.1"), AddressClass::Public);
        assert_eq!(class_of("1.1.1.1"), AddressClass::Public);
    }

    #[test]
    fn ipv6_special_ranges() {
        assert_eq!(class_of("::"), AddressClass::Unspecified);
        assert_eq!(class_of("::1"), AddressClass::Loopback);
        assert_eq!(class_of("fc00::1"), AddressClass::Private);
        assert_eq!(class_of("fd12:3456::1"), AddressClass::Private);
        assert_eq!(class_of("fe80::1"), AddressClass::LinkLocal);
        assert_eq!(class_of("ff02::1"), AddressClass::Multicast);
        assert_eq!(class_of("2001:db8::1"), AddressClass::Reserved);
        assert_eq!(class_of("100::1"), AddressClass::Reserved);
        assert_eq!(class_of("fec0::1"), AddressClass::Reserved);
        assert_eq!(class_of("::2"), AddressClass::Reserved);
    }

    #[test]
    fn ipv6_public() {
        assert_eq!(class_of("2606:4700:4700::1111"), AddressClass::Public);
        assert_eq!(class_of("2a00:1450:4001::200e"), AddressClass::Public);
    }

    #[test]
    fn ipv6_embedding_ipv4_uses_embedded_class() {
        assert_eq!(class_of("::ffff:127.0.0.1"), AddressClass::Loopback);
        assert_eq!(class_of("::ffff:10.1.2.3"), AddressClass::Private);
        assert_eq!(class_of("::ffff:8.8.8.8"), AddressClass::Public);
        assert_eq!(class_of("64:ff9b::a9fe:a9fe"), AddressClass::LinkLocal);
        assert_eq!(class_of("2002:c0a8:0101::1"), AddressClass::Private);
        assert_eq!(class_of("2002:0808:0808::1"), AddressClass::Public);
    }

    #[test]
    fn cidr_parsing() {
        assert!(Cidr::parse("10.0.0.0/8").is_some());
        assert!(Cidr::parse("2001:db8::/32").is_some());
        assert!(Cidr::parse("10.0.0.0/33").is_none());
        assert!(Cidr::parse("10.0.0.0").is_none());
        assert!(Cidr::parse("nonsense/8").is_none());
    }

    #[test]
    fn configured_cidrs_denylist_public_addresses() {
        let config = ResolvedConfig::from_config(&FetchConfig {
            security: Some(SecurityConfig {
                blocked_cidrs: Some(vec!["93.184.216.0/24".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        })
        .expect("resolved config");

        let blocked = evaluate_ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)), &config);
        assert_eq!(blocked.class, AddressClass::Denylisted);

        let mapped = evaluate_ip("::ffff:93.184.216.34".parse().expect("ip"), &config);
        assert_eq!(mapped.class, AddressClass::Denylisted);

        let allowed = evaluate_ip(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)), &config);
        assert_eq!(allowed.class, AddressClass::Public);
    }

    #[test]
    fn loopback_stays_blocked_without_overrides() {
        let config = ResolvedConfig::from_config(&FetchConfig::default()).expect("resolved");
        let address = evaluate_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), &config);
        assert_eq!(address.class, AddressClass::Loopback);
    }
}
