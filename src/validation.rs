//! Path validation of the resource extensions.
//!
//! RFC 3779 requires that a certificate only claims resources its issuer
//! also claims. The functions in this module walk a certificate chain
//! given leaf first and check this nested resources requirement for both
//! extensions, resolving the inherit marker along the way. A trust anchor
//! must not inherit: there is nothing left to inherit from.
//!
//! The walk does not know about certificates. The host library implements
//! [`ResourceExtensions`] for whatever its chains consist of and reports
//! violations through a verify callback in the style of
//! `X509_STORE_CTX`: the callback sees every violation and decides
//! whether the walk continues, so it can either abort early or collect
//! all problems of a chain.
//!
//! [`ResourceExtensions`]: trait.ResourceExtensions.html

use std::{error, fmt};
use log::warn;
use crate::asres::{AsChoice, AsIdBlocks, AsIdentifiers};
use crate::ipres::{
    AddressBlocks, AddressChoice, AddressFamily, IpResources
};


//------------ ResourceExtensions --------------------------------------------

/// Access to the resource extensions of a certificate.
pub trait ResourceExtensions {
    /// Returns the certificate's IP address resources, if present.
    fn ip_resources(&self) -> Option<&IpResources>;

    /// Returns the certificate's AS resources, if present.
    fn as_identifiers(&self) -> Option<&AsIdentifiers>;
}


//------------ Violation -----------------------------------------------------

/// A violation of the nested resources requirement.
///
/// This is the "unnested resource" error of RFC 3779 path validation. It
/// is reported both for resources not covered by the issuer and for a
/// trust anchor using the inherit marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Violation {
    /// The chain index of the certificate the violation was found at.
    depth: usize,
}

impl Violation {
    /// Returns the chain index of the offending certificate.
    pub fn depth(self) -> usize {
        self.depth
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unnested resources at chain depth {}", self.depth)
    }
}

impl error::Error for Violation { }


//------------ Path validation -----------------------------------------------

/// Validates both resource extensions along a chain.
///
/// The chain is ordered leaf first and trust anchor last. The walk stops
/// at the first violation.
pub fn validate_path<C: ResourceExtensions>(
    chain: &[C],
) -> Result<(), Violation> {
    validate_path_with(chain, |_| false)
}

/// Validates both resource extensions, reporting to a callback.
///
/// Every violation is passed to `verify_cb`. If the callback returns
/// `false`, the walk aborts and the function fails with that violation.
/// If the callback keeps returning `true`, the function succeeds no
/// matter how many violations were reported.
pub fn validate_path_with<C, F>(
    chain: &[C],
    mut verify_cb: F,
) -> Result<(), Violation>
where C: ResourceExtensions, F: FnMut(&Violation) -> bool {
    validate_as_path_with(chain, &mut verify_cb)?;
    validate_ip_path_with(chain, &mut verify_cb)
}

/// Validates the AS resources extension along a chain.
pub fn validate_as_path<C: ResourceExtensions>(
    chain: &[C],
) -> Result<(), Violation> {
    validate_as_path_with(chain, |_| false)
}

/// Validates the AS resources extension, reporting to a callback.
pub fn validate_as_path_with<C, F>(
    chain: &[C],
    mut verify_cb: F,
) -> Result<(), Violation>
where C: ResourceExtensions, F: FnMut(&Violation) -> bool {
    // If the leaf doesn't have the extension, resources are not
    // constrained and we are done.
    let ext = match chain.first().and_then(|cert| cert.as_identifiers()) {
        Some(ext) => ext,
        None => return Ok(()),
    };

    let mut asnum = as_claim(ext.asnum());
    let mut rdi = as_claim(ext.rdi());

    for (depth, cert) in chain.iter().enumerate().skip(1) {
        match cert.as_identifiers() {
            None => {
                if asnum.is_blocks() || rdi.is_blocks() {
                    report(depth, &mut verify_cb)?;
                }
            }
            Some(ext) => {
                as_step(&mut asnum, ext.asnum(), depth, &mut verify_cb)?;
                as_step(&mut rdi, ext.rdi(), depth, &mut verify_cb)?;
            }
        }
    }

    // The trust anchor must not inherit.
    if let Some(ext) = chain.last().and_then(|cert| cert.as_identifiers()) {
        let depth = chain.len() - 1;
        if ext.asnum().map_or(false, AsChoice::is_inherit) {
            report(depth, &mut verify_cb)?;
        }
        if ext.rdi().map_or(false, AsChoice::is_inherit) {
            report(depth, &mut verify_cb)?;
        }
    }

    Ok(())
}

/// Validates the IP resources extension along a chain.
pub fn validate_ip_path<C: ResourceExtensions>(
    chain: &[C],
) -> Result<(), Violation> {
    validate_ip_path_with(chain, |_| false)
}

/// Validates the IP resources extension, reporting to a callback.
///
/// The check runs independently per address family of the leaf's
/// extension, matching families by their full key.
pub fn validate_ip_path_with<C, F>(
    chain: &[C],
    mut verify_cb: F,
) -> Result<(), Violation>
where C: ResourceExtensions, F: FnMut(&Violation) -> bool {
    let ext = match chain.first().and_then(|cert| cert.ip_resources()) {
        Some(ext) => ext,
        None => return Ok(()),
    };

    let mut claims: Vec<(AddressFamily, Claim<AddressBlocks>)> = {
        ext.families().iter().map(|item| {
            (item.family(), ip_claim(item.choice()))
        }).collect()
    };

    for (depth, cert) in chain.iter().enumerate().skip(1) {
        match cert.ip_resources() {
            None => {
                if claims.iter().any(|(_, claim)| claim.is_blocks()) {
                    report(depth, &mut verify_cb)?;
                }
            }
            Some(ext) => {
                for item in claims.iter_mut() {
                    let family = item.0;
                    ip_step(
                        &mut item.1, ext.family(family), family, depth,
                        &mut verify_cb
                    )?;
                }
            }
        }
    }

    if let Some(ext) = chain.last().and_then(|cert| cert.ip_resources()) {
        let depth = chain.len() - 1;
        for item in ext.families() {
            if item.choice().is_inherit() {
                report(depth, &mut verify_cb)?;
            }
        }
    }

    Ok(())
}


//------------ Claim ---------------------------------------------------------

/// The pending claim of the chain below the current certificate.
enum Claim<'a, T> {
    /// There is nothing left to check.
    None,

    /// The resources are inherited from further up the chain.
    Inherit,

    /// These resources have to be covered.
    Blocks(&'a T),
}

impl<'a, T> Claim<'a, T> {
    fn is_blocks(&self) -> bool {
        match *self {
            Claim::Blocks(_) => true,
            _ => false,
        }
    }
}

fn as_claim(choice: Option<&AsChoice>) -> Claim<AsIdBlocks> {
    match choice {
        None => Claim::None,
        Some(AsChoice::Inherit) => Claim::Inherit,
        Some(AsChoice::Ids(blocks)) => Claim::Blocks(blocks),
    }
}

fn ip_claim(choice: &AddressChoice) -> Claim<AddressBlocks> {
    match choice {
        AddressChoice::Inherit => Claim::Inherit,
        AddressChoice::Blocks(blocks) => Claim::Blocks(blocks),
    }
}

/// Advances one AS choice claim past the certificate at `depth`.
fn as_step<'a, F>(
    claim: &mut Claim<'a, AsIdBlocks>,
    parent: Option<&'a AsChoice>,
    depth: usize,
    verify_cb: &mut F,
) -> Result<(), Violation>
where F: FnMut(&Violation) -> bool {
    match parent {
        None => {
            if claim.is_blocks() {
                report(depth, verify_cb)?;
                *claim = Claim::None;
            }
        }
        Some(AsChoice::Inherit) => {
            // The parent passes the obligation further up.
        }
        Some(AsChoice::Ids(parent_blocks)) => {
            let covered = match *claim {
                Claim::None | Claim::Inherit => true,
                Claim::Blocks(child) => parent_blocks.encompasses(child),
            };
            if covered {
                // From here on up, the parent's resources are the ones
                // that need to be covered.
                *claim = Claim::Blocks(parent_blocks);
            }
            else {
                report(depth, verify_cb)?;
            }
        }
    }
    Ok(())
}

/// Advances one family's claim past the certificate at `depth`.
fn ip_step<'a, F>(
    claim: &mut Claim<'a, AddressBlocks>,
    parent: Option<&'a AddressChoice>,
    family: AddressFamily,
    depth: usize,
    verify_cb: &mut F,
) -> Result<(), Violation>
where F: FnMut(&Violation) -> bool {
    match parent {
        None => {
            // The parent's extension does not cover this family at all.
            if claim.is_blocks() {
                report(depth, verify_cb)?;
                *claim = Claim::None;
            }
        }
        Some(AddressChoice::Inherit) => { }
        Some(AddressChoice::Blocks(parent_blocks)) => {
            let covered = match *claim {
                Claim::None | Claim::Inherit => true,
                Claim::Blocks(child) => {
                    match family.addr_len() {
                        Some(addr_len) => {
                            parent_blocks.encompasses(child, addr_len)
                        }
                        // Without a defined address width there is no
                        // way to compare the blocks.
                        None => false,
                    }
                }
            };
            if covered {
                *claim = Claim::Blocks(parent_blocks);
            }
            else {
                report(depth, verify_cb)?;
            }
        }
    }
    Ok(())
}

/// Reports a violation through the callback.
fn report<F: FnMut(&Violation) -> bool>(
    depth: usize,
    verify_cb: &mut F,
) -> Result<(), Violation> {
    let violation = Violation { depth };
    warn!("{}", violation);
    if verify_cb(&violation) {
        Ok(())
    }
    else {
        Err(violation)
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::conf::{parse_as_identifiers, parse_ip_resources};

    #[derive(Default)]
    struct Cert {
        ip: Option<IpResources>,
        asid: Option<AsIdentifiers>,
    }

    impl Cert {
        fn with_as(values: &[(&str, &str)]) -> Self {
            Cert {
                ip: None,
                asid: Some(
                    parse_as_identifiers(values.iter().cloned()).unwrap()
                ),
            }
        }

        fn with_ip(values: &[(&str, &str)]) -> Self {
            Cert {
                ip: Some(
                    parse_ip_resources(values.iter().cloned()).unwrap()
                ),
                asid: None,
            }
        }
    }

    impl ResourceExtensions for Cert {
        fn ip_resources(&self) -> Option<&IpResources> {
            self.ip.as_ref()
        }

        fn as_identifiers(&self) -> Option<&AsIdentifiers> {
            self.asid.as_ref()
        }
    }

    fn depths_of(chain: &[Cert]) -> Vec<usize> {
        let mut depths = Vec::new();
        validate_path_with(chain, |violation| {
            depths.push(violation.depth());
            true
        }).unwrap();
        depths
    }

    #[test]
    fn inherit_resolves_up_the_chain() {
        let chain = [
            Cert::with_as(&[("AS", "100-200")]),
            Cert::with_as(&[("AS", "inherit")]),
            Cert::with_as(&[("AS", "50-300")]),
        ];
        assert_eq!(validate_as_path(&chain), Ok(()));
        assert_eq!(validate_path(&chain), Ok(()));
    }

    #[test]
    fn unnested_reported_at_offending_depth() {
        let chain = [
            Cert::with_as(&[("AS", "100-200")]),
            Cert::with_as(&[("AS", "inherit")]),
            Cert::with_as(&[("AS", "50-150")]),
        ];
        assert_eq!(
            validate_path(&chain),
            Err(Violation { depth: 2 })
        );
        assert_eq!(depths_of(&chain), [2]);
    }

    #[test]
    fn trust_anchor_must_not_inherit() {
        let chain = [
            Cert::with_as(&[("AS", "100-200")]),
            Cert::with_as(&[("AS", "inherit")]),
        ];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 1 }));

        // Even a chain of one is held to this.
        let chain = [Cert::with_as(&[("AS", "inherit")])];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 0 }));
    }

    #[test]
    fn leaf_without_extension_passes() {
        let chain = [
            Cert::default(),
            Cert::with_as(&[("AS", "50-150")]),
        ];
        assert_eq!(validate_path(&chain), Ok(()));
    }

    #[test]
    fn missing_extension_in_the_middle() {
        let chain = [
            Cert::with_as(&[("AS", "100-200")]),
            Cert::default(),
            Cert::with_as(&[("AS", "50-300")]),
        ];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 1 }));
        // The collecting callback sees the one violation and the walk
        // still checks the rest of the chain.
        assert_eq!(depths_of(&chain), [1]);
    }

    #[test]
    fn each_level_must_nest_in_its_issuer() {
        // The middle certificate's own resources exceed the root's even
        // though the leaf's do not.
        let chain = [
            Cert::with_as(&[("AS", "100-200")]),
            Cert::with_as(&[("AS", "100-400")]),
            Cert::with_as(&[("AS", "50-300")]),
        ];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 2 }));
    }

    #[test]
    fn ip_families_validate_independently() {
        let chain = [
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/24"),
                ("IPv6", "inherit"),
            ]),
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/16"),
                ("IPv6", "2001:db8::/32"),
            ]),
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/8"),
                ("IPv6", "2001:db8::/32"),
            ]),
        ];
        assert_eq!(validate_ip_path(&chain), Ok(()));
        assert_eq!(validate_path(&chain), Ok(()));

        let chain = [
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/24"),
                ("IPv6", "2001:db8::/32"),
            ]),
            Cert::with_ip(&[
                ("IPv4", "10.1.0.0/16"),
                ("IPv6", "2001:db8::/32"),
            ]),
        ];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 1 }));
    }

    #[test]
    fn family_missing_in_parent() {
        let chain = [
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/24"),
                ("IPv6", "2001:db8::/48"),
            ]),
            Cert::with_ip(&[("IPv4", "10.0.0.0/8")]),
            Cert::with_ip(&[("IPv4", "10.0.0.0/8")]),
        ];
        // The missing IPv6 family is reported once; afterwards the
        // family is no longer tracked.
        assert_eq!(depths_of(&chain), [1]);
    }

    #[test]
    fn ip_trust_anchor_must_not_inherit() {
        let chain = [
            Cert::with_ip(&[("IPv4", "10.0.0.0/24")]),
            Cert::with_ip(&[
                ("IPv4", "10.0.0.0/8"),
                ("IPv6", "inherit"),
            ]),
        ];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 1 }));
    }

    #[test]
    fn both_extensions_are_checked() {
        let mut leaf = Cert::with_as(&[("AS", "64496")]);
        leaf.ip = Some(parse_ip_resources(vec![
            ("IPv4", "10.0.0.0/24"),
        ]).unwrap());
        let mut root = Cert::with_as(&[("AS", "64496-64511")]);
        root.ip = Some(parse_ip_resources(vec![
            ("IPv4", "192.168.0.0/16"),
        ]).unwrap());

        let chain = [leaf, root];
        assert_eq!(validate_path(&chain), Err(Violation { depth: 1 }));
        assert_eq!(depths_of(&chain), [1]);
    }
}
