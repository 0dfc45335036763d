// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow classifiers and their OpenFlow match strings

use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use strum::{EnumString, IntoStaticStr};
use thiserror::Error;

/// Ethertype of IPv4, always matched by classifiers.
pub const IPV4_ETHERTYPE: u16 = 0x0800;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },
    #[error("Port range {min}-{max} cannot be expressed as a single value/mask")]
    UnalignedPortRange { min: u16, max: u16 },
}

/// IP protocols classifiers can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
}

impl Protocol {
    /// The IP protocol number.
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Protocol::Icmp => 1,
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

/// A range of L4 ports that a single OpenFlow match can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRange {
    Single(u16),
    /// Ports matching `value` under `mask`.
    Masked { value: u16, mask: u16 },
}

impl PortRange {
    /// The range `min..=max`.
    ///
    /// Ranges other than a single port must span a power of two number of ports and start on a
    /// multiple of it, e.g. `1024..=2047`.
    ///
    /// # Errors
    ///
    /// Fails if `min > max` or if the range is not aligned.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(min: u16, max: u16) -> Result<Self, ClassifierError> {
        if min > max {
            return Err(ClassifierError::InvalidPortRange { min, max });
        }
        if min == max {
            return Ok(PortRange::Single(min));
        }
        let size = u32::from(max) - u32::from(min) + 1;
        if !size.is_power_of_two() || u32::from(min) % size != 0 {
            return Err(ClassifierError::UnalignedPortRange { min, max });
        }
        // size is at most 2^16, so the mask fits in 16 bits
        let mask = (0x1_0000 - size) as u16;
        Ok(PortRange::Masked { value: min, mask })
    }

    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            PortRange::Single(p) => p == port,
            PortRange::Masked { value, mask } => port & mask == value,
        }
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRange::Single(port) => write!(f, "{port}"),
            PortRange::Masked { value, mask } => write!(f, "{value:#06x}/{mask:#06x}"),
        }
    }
}

/// Criteria selecting the traffic steered into a port chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowClassifier {
    pub name: String,
    pub protocol: Option<Protocol>,
    pub source_ip_prefix: Option<Ipv4Net>,
    pub destination_ip_prefix: Option<Ipv4Net>,
    pub source_ports: Option<PortRange>,
    pub destination_ports: Option<PortRange>,
    /// Name of the port the traffic comes from, if restricted.
    pub logical_source_port: Option<String>,
    /// Name of the port the traffic goes to, if restricted.
    pub logical_destination_port: Option<String>,
}

impl FlowClassifier {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// The OpenFlow match string for this classifier: comma-separated `key=value` fields, IPv4
    /// always matched.
    ///
    /// ```
    /// # use dcemu_sfc::{FlowClassifier, PortRange, Protocol};
    /// let classifier = FlowClassifier {
    ///     protocol: Some(Protocol::Tcp),
    ///     source_ip_prefix: Some("10.0.0.10/32".parse().unwrap()),
    ///     destination_ip_prefix: Some("10.0.0.12/32".parse().unwrap()),
    ///     destination_ports: Some(PortRange::Single(80)),
    ///     ..FlowClassifier::new("web")
    /// };
    /// assert_eq!(
    ///     classifier.to_match(),
    ///     "dl_type=2048,nw_proto=6,nw_src=10.0.0.10/32,nw_dst=10.0.0.12/32,tp_dst=80"
    /// );
    /// ```
    #[must_use]
    pub fn to_match(&self) -> String {
        let mut fields = vec![format!("dl_type={IPV4_ETHERTYPE}")];
        if let Some(protocol) = self.protocol {
            fields.push(format!("nw_proto={}", protocol.number()));
        }
        if let Some(prefix) = self.source_ip_prefix {
            fields.push(format!("nw_src={prefix}"));
        }
        if let Some(prefix) = self.destination_ip_prefix {
            fields.push(format!("nw_dst={prefix}"));
        }
        if let Some(ports) = self.destination_ports {
            fields.push(format!("tp_dst={ports}"));
        }
        if let Some(ports) = self.source_ports {
            fields.push(format!("tp_src={ports}"));
        }
        fields.join(",")
    }
}

/// A value of a parsed match field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchValue {
    Int(u64),
    Str(String),
}

fn parse_int(value: &str) -> Option<u64> {
    let (digits, radix) = match value.get(..2) {
        Some("0x" | "0X") => (&value[2..], 16),
        Some("0o" | "0O") => (&value[2..], 8),
        Some("0b" | "0B") => (&value[2..], 2),
        _ => (value, 10),
    };
    if digits.is_empty() || digits.starts_with('+') {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Split a match string into its fields, the way the flow backend reads it.
///
/// Values that are integers (decimal, or prefixed with `0x`, `0o` or `0b`) are parsed as such,
/// others are kept as strings. Tokens that are not `key=value` are ignored.
#[must_use]
pub fn parse_match(flow_match: &str) -> BTreeMap<String, MatchValue> {
    flow_match
        .split(',')
        .filter_map(|token| {
            let mut kv = token.split('=');
            let (Some(key), Some(value), None) = (kv.next(), kv.next(), kv.next()) else {
                return None;
            };
            let value = parse_int(value)
                .map_or_else(|| MatchValue::Str(value.to_string()), MatchValue::Int);
            Some((key.to_string(), value))
        })
        .collect()
}
