//! Subnet normalization
//!
//! Every address that enters the lockout engine is first normalized into a
//! full address and the subnet prefix used to group it:
//!
//! | Family | Full address                         | Subnet prefix            |
//! | ------ | ------------------------------------ | ------------------------ |
//! | IPv4   | unchanged (`203.0.113.5`)            | `/24` (`203.0.113.`)     |
//! | IPv6   | expanded, no `::` (`2001:0db8:...`)  | `/64` (`2001:0db8:0000:0000:`) |
//!
//! Both the attempt and lockout stores match on the prefix, so this module is
//! the only place that decides which addresses share a subnet.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
};

use serde::{Deserialize, Serialize};

use crate::{Error, error::AddressError};

/// The address family a subnet prefix was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    V4,
    V6,
}

/// A subnet grouping key, expressed as a textual prefix of the full address.
///
/// Stores receive this value instead of a query fragment and translate it into
/// whatever prefix comparison their engine supports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubnetPrefix {
    family: AddressFamily,
    prefix: String,
}

impl SubnetPrefix {
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    /// Length of the prefix in bytes. Addresses are ASCII, so this is also the
    /// character count SQL backends compare against.
    pub fn len(&self) -> usize {
        self.prefix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Whether a stored full address belongs to this subnet.
    pub fn matches(&self, address: &str) -> bool {
        address.starts_with(&self.prefix)
    }

    /// Smallest string greater than every address in this subnet.
    ///
    /// SQL backends match `ip_address >= prefix AND ip_address < upper_bound`
    /// so the comparison can use an index on `ip_address`. Prefixes always end
    /// in `.` or `:`, which become `/` and `;`.
    pub fn upper_bound(&self) -> String {
        let mut upper = self.prefix.clone();
        if let Some(last) = upper.pop() {
            let next = char::from_u32(u32::from(last) + 1).unwrap_or(char::MAX);
            upper.push(next);
        }
        upper
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix)
    }
}

/// An address after normalization, together with its subnet prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub address: String,
    pub subnet: SubnetPrefix,
}

impl NormalizedAddress {
    pub fn family(&self) -> AddressFamily {
        self.subnet.family
    }
}

impl fmt::Display for NormalizedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Normalize a raw request source address.
///
/// Accepts any textual IPv4 or IPv6 address. Anything else, including zone
/// suffixes and surrounding whitespace, is rejected with
/// [`AddressError::Invalid`].
pub fn normalize(raw: &str) -> Result<NormalizedAddress, Error> {
    let ip: IpAddr = raw
        .parse()
        .map_err(|_| AddressError::Invalid(raw.to_string()))?;

    let normalized = match ip {
        IpAddr::V4(v4) => normalize_v4(raw, v4),
        IpAddr::V6(v6) => normalize_v6(v6),
    };

    tracing::debug!(
        address = %normalized.address,
        subnet = %normalized.subnet,
        "Normalized source address"
    );

    Ok(normalized)
}

fn normalize_v4(raw: &str, ip: Ipv4Addr) -> NormalizedAddress {
    let [a, b, c, _] = ip.octets();
    NormalizedAddress {
        // The standard parser only accepts the canonical dotted quad, so the
        // input is already in its stored form.
        address: raw.to_string(),
        subnet: SubnetPrefix {
            family: AddressFamily::V4,
            prefix: format!("{a}.{b}.{c}."),
        },
    }
}

fn normalize_v6(ip: Ipv6Addr) -> NormalizedAddress {
    let hextets: Vec<String> = ip
        .segments()
        .iter()
        .map(|segment| format!("{segment:04x}"))
        .collect();

    let mut prefix = hextets[..4].join(":");
    prefix.push(':');

    NormalizedAddress {
        address: hextets.join(":"),
        subnet: SubnetPrefix {
            family: AddressFamily::V6,
            prefix,
        },
    }
}
