//! Parsing the configuration text form of the resource extensions.
//!
//! Extension values are authored as a list of name and value pairs in the
//! style of OpenSSL extension configuration:
//!
//! ```text
//! IPv4 = 10.0.0.0/8
//! IPv4 = 192.168.0.13
//! IPv6-SAFI = 1: 2001:db8::-2001:db8::42
//! AS = 64496
//! RDI = inherit
//! ```
//!
//! The name selects the family or choice, the value carries one resource:
//! a prefix, a range, a single address or identifier, or the `inherit`
//! marker. The functions here consume such a list and return the finished
//! extension value in canonical form. On any error the partial result is
//! discarded.

use std::{error, fmt};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use crate::asres::{AsId, AsIdentifiers};
use crate::error::InvalidInheritance;
use crate::ipres::{AddressFamily, IpResources, AFI_IPV4, AFI_IPV6};


//------------ parse_ip_resources --------------------------------------------

/// Parses the text form of the IP address resources extension.
///
/// Recognised names are `IPv4`, `IPv6`, `IPv4-SAFI`, and `IPv6-SAFI`. The
/// SAFI variants expect the value to start with the SAFI number and a
/// colon. The returned value is in canonical form.
pub fn parse_ip_resources<'a, I>(values: I) -> Result<IpResources, ParseError>
where I: IntoIterator<Item = (&'a str, &'a str)> {
    let mut res = IpResources::new();
    for (name, value) in values {
        let (afi, with_safi) = match name {
            "IPv4" => (AFI_IPV4, false),
            "IPv6" => (AFI_IPV6, false),
            "IPv4-SAFI" => (AFI_IPV4, true),
            "IPv6-SAFI" => (AFI_IPV6, true),
            _ => return Err(ParseError::ExtensionName(name.into())),
        };
        let (safi, rest) = if with_safi {
            let (safi, rest) = parse_safi(value)?;
            (Some(safi), rest)
        }
        else {
            (None, value)
        };
        let family = AddressFamily::new(afi, safi);
        let rest = trim(rest);
        if rest == "inherit" {
            res.add_inherit(family)?;
        }
        else {
            parse_ip_value(&mut res, family, rest, value)?;
        }
    }
    res.canonize();
    Ok(res)
}

/// Parses the leading SAFI of a value.
///
/// The SAFI is a decimal or `0x` prefixed hexadecimal integer of at most
/// eight bits, terminated by a colon. Returns the SAFI and the value
/// behind the colon.
fn parse_safi(value: &str) -> Result<(u8, &str), ParseError> {
    let colon = match value.find(':') {
        Some(colon) => colon,
        None => return Err(ParseError::value(value)),
    };
    let safi = match parse_int(trim(&value[..colon])) {
        Some(safi) if safi <= 0xFF => safi as u8,
        _ => return Err(ParseError::value(value)),
    };
    Ok((safi, &value[colon + 1..]))
}

/// Parses a single prefix, range, or address value into `res`.
fn parse_ip_value(
    res: &mut IpResources,
    family: AddressFamily,
    s: &str,
    value: &str,
) -> Result<(), ParseError> {
    let afi = family.afi();
    if let Some(pos) = s.find('/') {
        let (addr, len) = parse_addr(trim(&s[..pos]), afi)
            .ok_or_else(|| ParseError::value(value))?;
        let prefix_len = match u8::from_str(trim(&s[pos + 1..])) {
            Ok(prefix_len) if usize::from(prefix_len) <= len * 8 => {
                prefix_len
            }
            _ => return Err(ParseError::value(value)),
        };
        res.add_prefix(family, &addr[..len], prefix_len)?;
    }
    else if let Some(pos) = s.find('-') {
        let (min, len) = parse_addr(trim(&s[..pos]), afi)
            .ok_or_else(|| ParseError::value(value))?;
        let (max, _) = parse_addr(trim(&s[pos + 1..]), afi)
            .ok_or_else(|| ParseError::value(value))?;
        if min[..len] > max[..len] {
            return Err(ParseError::value(value))
        }
        res.add_range(family, &min[..len], &max[..len])?;
    }
    else {
        // A plain address stands for the range containing just itself
        // and will normally collapse into a host prefix.
        let (addr, len) = parse_addr(s, afi)
            .ok_or_else(|| ParseError::value(value))?;
        res.add_range(family, &addr[..len], &addr[..len])?;
    }
    Ok(())
}

/// Parses an address in presentation format.
///
/// Returns the raw address and its length.
fn parse_addr(s: &str, afi: u16) -> Option<([u8; 16], usize)> {
    let mut buf = [0u8; 16];
    match afi {
        AFI_IPV4 => {
            let addr = Ipv4Addr::from_str(s).ok()?;
            buf[..4].copy_from_slice(&addr.octets());
            Some((buf, 4))
        }
        AFI_IPV6 => {
            let addr = Ipv6Addr::from_str(s).ok()?;
            buf.copy_from_slice(&addr.octets());
            Some((buf, 16))
        }
        _ => None,
    }
}


//------------ parse_as_identifiers ------------------------------------------

/// Parses the text form of the AS resources extension.
///
/// Recognised names are `AS` and `RDI`; values are a single identifier, a
/// range of two identifiers separated by a dash, or `inherit`. The
/// returned value is in canonical form.
pub fn parse_as_identifiers<'a, I>(
    values: I,
) -> Result<AsIdentifiers, ParseError>
where I: IntoIterator<Item = (&'a str, &'a str)> {
    let mut res = AsIdentifiers::new();
    for (name, value) in values {
        let rdi = match name {
            "AS" => false,
            "RDI" => true,
            _ => return Err(ParseError::ExtensionName(name.into())),
        };
        let s = trim(value);
        if s == "inherit" {
            if rdi {
                res.inherit_rdi()?
            }
            else {
                res.inherit_asnum()?
            }
            continue
        }
        let (min, max) = parse_as_value(s, value)?;
        if rdi {
            res.add_rdi_range(min, max)?
        }
        else {
            res.add_asnum_range(min, max)?
        }
    }
    res.canonize();
    Ok(res)
}

/// Parses a single AS number or range.
fn parse_as_value(s: &str, value: &str) -> Result<(AsId, AsId), ParseError> {
    let digits = s.find(|ch: char| !ch.is_ascii_digit()).unwrap_or(s.len());
    let min = u32::from_str(&s[..digits]).map_err(|_| {
        ParseError::InvalidAsNumber(value.into())
    })?;
    if digits == s.len() {
        return Ok((AsId::from(min), AsId::from(min)))
    }
    let rest = match trim(&s[digits..]).strip_prefix('-') {
        Some(rest) => trim(rest),
        None => return Err(ParseError::InvalidAsNumber(value.into())),
    };
    if rest.is_empty() || rest.contains(|ch: char| !ch.is_ascii_digit()) {
        return Err(ParseError::InvalidAsRange(value.into()))
    }
    let max = u32::from_str(rest).map_err(|_| {
        ParseError::InvalidAsRange(value.into())
    })?;
    if min > max {
        return Err(ParseError::InvalidAsRange(value.into()))
    }
    Ok((AsId::from(min), AsId::from(max)))
}


//------------ Helpers -------------------------------------------------------

/// Strips leading and trailing blanks and tabs.
fn trim(s: &str) -> &str {
    s.trim_matches(|ch| ch == ' ' || ch == '\t')
}

/// Parses an unsigned decimal or `0x` prefixed hexadecimal integer.
fn parse_int(s: &str) -> Option<u32> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    }
    else {
        u32::from_str(s).ok()
    }
}


//------------ ParseError ----------------------------------------------------

/// An error happened while parsing the text form of an extension.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The name of a pair is not a known extension element.
    ExtensionName(String),

    /// The value of a pair is malformed.
    ExtensionValue(String),

    /// Inherited and explicit resources were mixed in one family.
    InvalidInheritance,

    /// A value is not a valid AS number.
    InvalidAsNumber(String),

    /// A value is not a valid AS range.
    InvalidAsRange(String),
}

impl ParseError {
    fn value(value: &str) -> Self {
        ParseError::ExtensionValue(value.into())
    }
}

impl From<InvalidInheritance> for ParseError {
    fn from(_: InvalidInheritance) -> Self {
        ParseError::InvalidInheritance
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::ExtensionName(ref name) => {
                write!(f, "unknown extension element '{}'", name)
            }
            ParseError::ExtensionValue(ref value) => {
                write!(f, "invalid extension value '{}'", value)
            }
            ParseError::InvalidInheritance => {
                f.write_str("cannot mix inherit with explicit resources")
            }
            ParseError::InvalidAsNumber(ref value) => {
                write!(f, "invalid AS number '{}'", value)
            }
            ParseError::InvalidAsRange(ref value) => {
                write!(f, "invalid AS range '{}'", value)
            }
        }
    }
}

impl error::Error for ParseError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::ipres::AddressChoice;
    use crate::asres::AsChoice;

    #[test]
    fn ip_prefixes_canonize() {
        let res = parse_ip_resources(vec![
            ("IPv4", "10.0.0.0/24"),
            ("IPv4", "10.0.1.0/24"),
            ("IPv4", "10.0.2.0/23"),
        ]).unwrap();
        assert_eq!(res.to_string(), "IPv4:\n  10.0.0.0/22\n");
    }

    #[test]
    fn ip_safi_family() {
        let res = parse_ip_resources(vec![
            ("IPv6-SAFI", "1: 2001:db8::/32"),
        ]).unwrap();
        assert_eq!(res.families().len(), 1);
        assert_eq!(res.families()[0].family().as_ref(), &[0, 2, 1]);
        match res.families()[0].choice() {
            AddressChoice::Blocks(blocks) => assert_eq!(blocks.len(), 1),
            AddressChoice::Inherit => panic!("unexpected inherit"),
        }

        // Hexadecimal SAFIs are fine too.
        let res = parse_ip_resources(vec![
            ("IPv4-SAFI", "0x40 : 10.0.0.0/8"),
        ]).unwrap();
        assert_eq!(res.families()[0].family().safi(), Some(64));
    }

    #[test]
    fn ip_singletons_and_ranges() {
        let res = parse_ip_resources(vec![
            ("IPv4", "192.168.0.13"),
            ("IPv4", " 10.0.0.1 - 10.0.0.2 "),
            ("IPv6", "2001:db8::1-2001:db8::5"),
            ("IPv4", "10.0.4.0 - 10.0.5.255"),
        ]).unwrap();
        assert_eq!(
            res.to_string(),
            "IPv4:\n  10.0.0.1-10.0.0.2\n  10.0.4.0/23\n  192.168.0.13/32\n\
             IPv6:\n  2001:db8::1-2001:db8::5\n"
        );
    }

    #[test]
    fn ip_full_space_and_hosts() {
        let res = parse_ip_resources(vec![
            ("IPv4", "0.0.0.0-255.255.255.255"),
        ]).unwrap();
        assert_eq!(res.to_string(), "IPv4:\n  0.0.0.0/0\n");

        let res = parse_ip_resources(vec![
            ("IPv6", "2001:db8::1"),
            ("IPv4", "192.168.0.13/32"),
        ]).unwrap();
        assert_eq!(
            res.to_string(),
            "IPv4:\n  192.168.0.13/32\nIPv6:\n  2001:db8::1/128\n"
        );
    }

    #[test]
    fn ip_inherit_conflicts() {
        let res = parse_ip_resources(vec![
            ("IPv4", "inherit"),
            ("IPv4", "inherit"),
            ("IPv6", "2001:db8::/32"),
        ]).unwrap();
        assert!(res.families()[0].choice().is_inherit());

        assert_eq!(
            parse_ip_resources(vec![
                ("IPv4", "inherit"),
                ("IPv4", "10.0.0.0/8"),
            ]),
            Err(ParseError::InvalidInheritance)
        );
        assert_eq!(
            parse_ip_resources(vec![
                ("IPv4", "10.0.0.0/8"),
                ("IPv4", "inherit"),
            ]),
            Err(ParseError::InvalidInheritance)
        );
    }

    #[test]
    fn ip_errors() {
        assert_eq!(
            parse_ip_resources(vec![("IPv5", "10.0.0.0/8")]),
            Err(ParseError::ExtensionName("IPv5".into()))
        );
        assert!(parse_ip_resources(vec![("IPv4", "10/8")]).is_err());
        assert!(parse_ip_resources(vec![("IPv4", "10.0.0.0/33")]).is_err());
        assert!(
            parse_ip_resources(vec![("IPv4", "10.0.0.0/8 junk")]).is_err()
        );
        assert!(
            parse_ip_resources(vec![("IPv4", "10.0.0.9-10.0.0.1")]).is_err()
        );
        assert!(
            parse_ip_resources(vec![("IPv6", "10.0.0.0/8")]).is_err()
        );
        assert!(
            parse_ip_resources(vec![("IPv4-SAFI", "10.0.0.0/8")]).is_err()
        );
        assert!(
            parse_ip_resources(vec![("IPv4-SAFI", "256: 10.0.0.0/8")])
                .is_err()
        );
    }

    #[test]
    fn empty_family_list() {
        let res = parse_ip_resources(Vec::new()).unwrap();
        assert!(res.is_empty());
    }

    #[test]
    fn as_numbers_canonize() {
        let res = parse_as_identifiers(vec![
            ("AS", "64496"),
            ("AS", "64498-64500"),
            ("AS", "64497"),
            ("AS", "64500 - 64510"),
        ]).unwrap();
        assert_eq!(
            res.to_string(),
            "Autonomous System Numbers:\n  64496-64510\n"
        );
    }

    #[test]
    fn as_choices_are_independent() {
        let res = parse_as_identifiers(vec![
            ("AS", "64496"),
            ("RDI", "inherit"),
        ]).unwrap();
        assert!(res.asnum().map_or(false, |choice| !choice.is_inherit()));
        assert!(res.rdi().map_or(false, AsChoice::is_inherit));

        match res.asnum() {
            Some(AsChoice::Ids(blocks)) => assert_eq!(blocks.len(), 1),
            _ => panic!("expected explicit blocks"),
        }
    }

    #[test]
    fn as_errors() {
        assert_eq!(
            parse_as_identifiers(vec![("ASN", "64496")]),
            Err(ParseError::ExtensionName("ASN".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![("AS", "foo")]),
            Err(ParseError::InvalidAsNumber("foo".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![("AS", "64496+64510")]),
            Err(ParseError::InvalidAsNumber("64496+64510".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![("AS", "64496-")]),
            Err(ParseError::InvalidAsRange("64496-".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![("AS", "64496-foo")]),
            Err(ParseError::InvalidAsRange("64496-foo".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![("AS", "64510-64496")]),
            Err(ParseError::InvalidAsRange("64510-64496".into()))
        );
        assert_eq!(
            parse_as_identifiers(vec![
                ("AS", "inherit"),
                ("AS", "64496"),
            ]),
            Err(ParseError::InvalidInheritance)
        );
    }
}
