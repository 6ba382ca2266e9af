//! Error types used by multiple modules.

use std::{error, fmt};


//------------ InvalidInheritance --------------------------------------------

/// Inherited and explicit resources were mixed within one family.
///
/// A family or choice either defers to the issuer via the inherit marker
/// or lists its resources explicitly, never both. This error is returned
/// by the builder methods of [`IpResources`] and [`AsIdentifiers`] when an
/// operation would combine the two.
///
/// [`IpResources`]: ../ipres/struct.IpResources.html
/// [`AsIdentifiers`]: ../asres/struct.AsIdentifiers.html
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvalidInheritance;

impl fmt::Display for InvalidInheritance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("cannot mix inherit with explicit resources")
    }
}

impl error::Error for InvalidInheritance { }
