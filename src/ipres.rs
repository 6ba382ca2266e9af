//! IP address resources for use with X.509 certificates.
//!
//! The types in this module implement the IP address delegation extension
//! defined in RFC 3779, section 2. The extension carries a sequence of
//! address families, each of which either lists the delegated address
//! blocks explicitly or carries the inherit marker deferring to the
//! issuer certificate.
//!
//! Values can be built through the methods of [`IpResources`] – typically
//! driven by the configuration parser in the [`conf`] module – or decoded
//! from their DER representation. Explicitly built values need to be
//! brought into canonical form through [`IpResources::canonize`] before
//! they are encoded.
//!
//! [`IpResources`]: struct.IpResources.html
//! [`IpResources::canonize`]: struct.IpResources.html#method.canonize
//! [`conf`]: ../conf/index.html

use std::fmt;
use std::cmp::Ordering;
use std::net::{Ipv4Addr, Ipv6Addr};
use bcder::{ConstOid, Mode, OctetString, Oid, Tag};
use bcder::decode::{self, DecodeError, IntoSource, Source};
use bcder::encode::{self, Choice2, PrimitiveContent, Values};
use crate::addr::{self, Bits, RawAddr};
use crate::error::InvalidInheritance;


//------------ Extension OID -------------------------------------------------

/// The object identifier of the IP address resources extension.
///
/// This is `id-pe-ipAddrBlocks`, 1.3.6.1.5.5.7.1.7.
pub const ID_PE_IP_ADDR_BLOCKS: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 1, 7]);


//------------ AddressFamily -------------------------------------------------

/// The AFI of IPv4 addresses.
pub const AFI_IPV4: u16 = 1;

/// The AFI of IPv6 addresses.
pub const AFI_IPV6: u16 = 2;

/// The key identifying an address family within the extension.
///
/// The key consists of a 16 bit address family identifier (AFI) in
/// network byte order, optionally followed by a single byte with the
/// subsequent address family identifier (SAFI). The ordering of keys is
/// the lexicographical ordering of their bytes with a shorter key sorting
/// before a longer key it is a prefix of.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AddressFamily {
    /// The raw key.
    ///
    /// If there is no SAFI, the last byte is zero.
    key: [u8; 3],

    /// The length of the key, either 2 or 3.
    len: u8,
}

impl AddressFamily {
    /// The plain IPv4 address family.
    pub const IPV4: Self = AddressFamily { key: [0, 1, 0], len: 2 };

    /// The plain IPv6 address family.
    pub const IPV6: Self = AddressFamily { key: [0, 2, 0], len: 2 };

    /// Creates a family key from an AFI and an optional SAFI.
    pub fn new(afi: u16, safi: Option<u8>) -> Self {
        let bytes = afi.to_be_bytes();
        match safi {
            Some(safi) => {
                AddressFamily { key: [bytes[0], bytes[1], safi], len: 3 }
            }
            None => {
                AddressFamily { key: [bytes[0], bytes[1], 0], len: 2 }
            }
        }
    }

    /// Returns the address family identifier.
    pub fn afi(self) -> u16 {
        u16::from_be_bytes([self.key[0], self.key[1]])
    }

    /// Returns the subsequent address family identifier if present.
    pub fn safi(self) -> Option<u8> {
        if self.len == 3 {
            Some(self.key[2])
        }
        else {
            None
        }
    }

    /// Returns the length of a raw address in this family if defined.
    ///
    /// Only the IPv4 and IPv6 AFIs have a defined address length.
    pub fn addr_len(self) -> Option<usize> {
        match self.afi() {
            AFI_IPV4 => Some(4),
            AFI_IPV6 => Some(16),
            _ => None,
        }
    }

    /// Takes a family key from the beginning of a constructed value.
    fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let string = OctetString::take_from(cons)?;
        let mut octets = string.octets();
        let (hi, lo) = match (octets.next(), octets.next()) {
            (Some(hi), Some(lo)) => (hi, lo),
            _ => return Err(cons.content_err("short address family key")),
        };
        let safi = octets.next();
        if octets.next().is_some() {
            return Err(cons.content_err("overlong address family key"))
        }
        Ok(AddressFamily::new(u16::from_be_bytes([hi, lo]), safi))
    }

    /// Returns a value encoder for the family key.
    fn encode(self) -> impl Values {
        OctetString::encode_slice(self)
    }
}


//--- AsRef, PartialOrd, and Ord

impl AsRef<[u8]> for AddressFamily {
    fn as_ref(&self) -> &[u8] {
        &self.key[..usize::from(self.len)]
    }
}

impl PartialOrd for AddressFamily {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AddressFamily {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_ref().cmp(other.as_ref())
    }
}


//--- Display

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.afi() {
            AFI_IPV4 => f.write_str("IPv4")?,
            AFI_IPV6 => f.write_str("IPv6")?,
            afi => write!(f, "Unknown AFI {}", afi)?,
        }
        if let Some(safi) = self.safi() {
            match safi {
                1 => f.write_str(" (Unicast)")?,
                2 => f.write_str(" (Multicast)")?,
                3 => f.write_str(" (Unicast/Multicast)")?,
                4 => f.write_str(" (MPLS)")?,
                64 => f.write_str(" (Tunnel)")?,
                65 => f.write_str(" (VPLS)")?,
                66 => f.write_str(" (BGP MDT)")?,
                128 => f.write_str(" (MPLS-labeled VPN)")?,
                safi => write!(f, " (Unknown SAFI {})", safi)?,
            }
        }
        Ok(())
    }
}


//------------ IpResources ---------------------------------------------------

/// The IP address resources extension of a certificate.
///
/// The value is a sequence of address families, each carrying either an
/// explicit, ordered sequence of address blocks or the inherit marker.
/// Family keys are unique within the sequence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IpResources(Vec<IpAddressFamily>);

impl IpResources {
    /// Creates an empty value without any families.
    pub fn new() -> Self {
        IpResources(Vec::new())
    }

    /// Returns the address families in order.
    pub fn families(&self) -> &[IpAddressFamily] {
        &self.0
    }

    /// Returns whether there are no families at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the choice of the given family if it is present.
    pub fn family(&self, family: AddressFamily) -> Option<&AddressChoice> {
        self.0.iter().find(|item| item.family == family)
            .map(|item| &item.choice)
    }
}

/// # Building Values
///
/// These methods create a family when it is first touched and otherwise
/// extend the existing one, so resources for one family may be added
/// over multiple calls. They mirror the operations available in the
/// configuration text form.
impl IpResources {
    /// Marks a family as inheriting the issuer's resources.
    ///
    /// Succeeds quietly if the family already inherits and fails if it
    /// already contains explicit address blocks.
    pub fn add_inherit(
        &mut self,
        family: AddressFamily,
    ) -> Result<(), InvalidInheritance> {
        let item = self.find_or_create_family(family);
        match item.choice {
            AddressChoice::Inherit => Ok(()),
            AddressChoice::Blocks(ref blocks) if blocks.is_empty() => {
                item.choice = AddressChoice::Inherit;
                Ok(())
            }
            AddressChoice::Blocks(_) => Err(InvalidInheritance),
        }
    }

    /// Adds a prefix of `prefix_len` bits taken from `addr` to a family.
    ///
    /// Only the first `⌈prefix_len / 8⌉` bytes of `addr` are read.
    /// Callers must provide at least that many bytes and keep the prefix
    /// length within the family's address width.
    ///
    /// Fails if the family inherits.
    pub fn add_prefix(
        &mut self,
        family: AddressFamily,
        addr: &[u8],
        prefix_len: u8,
    ) -> Result<(), InvalidInheritance> {
        debug_assert!(usize::from(prefix_len) <= addr.len() * 8);
        let block = IpBlock::Prefix(Bits::pack_prefix(addr, prefix_len));
        self.blocks_mut(family)?.push(block);
        Ok(())
    }

    /// Adds the address range `[min, max]` to a family.
    ///
    /// The raw addresses must be of the family's width and in order,
    /// `min ≤ max`. A range that covers exactly one prefix is added as
    /// that prefix instead.
    ///
    /// Fails if the family inherits.
    pub fn add_range(
        &mut self,
        family: AddressFamily,
        min: &[u8],
        max: &[u8],
    ) -> Result<(), InvalidInheritance> {
        debug_assert!(min.len() == max.len() && min <= max);
        let block = IpBlock::range(min, max);
        self.blocks_mut(family)?.push(block);
        Ok(())
    }

    /// Returns the family with the given key, creating it if necessary.
    ///
    /// Families are few, so a linear scan will do.
    fn find_or_create_family(
        &mut self,
        family: AddressFamily,
    ) -> &mut IpAddressFamily {
        match self.0.iter().position(|item| item.family == family) {
            Some(pos) => &mut self.0[pos],
            None => {
                self.0.push(IpAddressFamily {
                    family,
                    choice: AddressChoice::Blocks(AddressBlocks::default()),
                });
                let pos = self.0.len() - 1;
                &mut self.0[pos]
            }
        }
    }

    fn blocks_mut(
        &mut self,
        family: AddressFamily,
    ) -> Result<&mut Vec<IpBlock>, InvalidInheritance> {
        let item = self.find_or_create_family(family);
        match item.choice {
            AddressChoice::Inherit => Err(InvalidInheritance),
            AddressChoice::Blocks(ref mut blocks) => Ok(&mut blocks.0),
        }
    }

    /// Brings the value into canonical form.
    ///
    /// Sorts and merges the address blocks of each family and sorts the
    /// family list by key. Families of an AFI without a defined address
    /// width are left untouched.
    pub fn canonize(&mut self) {
        for item in &mut self.0 {
            let len = match item.family.addr_len() {
                Some(len) => len,
                None => continue,
            };
            if let AddressChoice::Blocks(ref mut blocks) = item.choice {
                blocks.canonize(len)
            }
        }
        self.0.sort_by_key(|item| item.family);
    }
}

/// # Decoding and Encoding
///
impl IpResources {
    /// Takes an encoded value from the beginning of a constructed value.
    pub fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let mut families = Vec::new();
            while let Some(item) = IpAddressFamily::take_opt_from(cons)? {
                if families.iter().any(|present: &IpAddressFamily| {
                    present.family == item.family
                }) {
                    return Err(cons.content_err("duplicate address family"))
                }
                families.push(item)
            }
            Ok(IpResources(families))
        })
    }

    /// Decodes a DER encoded value from a source.
    pub fn decode<S: IntoSource>(
        source: S,
    ) -> Result<Self, DecodeError<<S::Source as Source>::Error>> {
        Mode::Der.decode(source, Self::take_from)
    }

    /// Returns a value encoder for the value.
    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(
            encode::iter(self.0.iter().map(|item| item.encode_ref()))
        )
    }
}


//--- Display

impl fmt::Display for IpResources {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for item in &self.0 {
            write!(f, "{}", item.family)?;
            match item.choice {
                AddressChoice::Inherit => writeln!(f, ": inherit")?,
                AddressChoice::Blocks(ref blocks) => {
                    writeln!(f, ":")?;
                    for block in &blocks.0 {
                        writeln!(f, "  {}", block.display(item.family))?;
                    }
                }
            }
        }
        Ok(())
    }
}


//------------ IpAddressFamily -----------------------------------------------

/// A single address family and the resources delegated for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpAddressFamily {
    /// The family key.
    family: AddressFamily,

    /// The resources of the family.
    choice: AddressChoice,
}

impl IpAddressFamily {
    /// Returns the family key.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Returns the resources of the family.
    pub fn choice(&self) -> &AddressChoice {
        &self.choice
    }

    fn take_opt_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let family = AddressFamily::take_from(cons)?;
            let choice = AddressChoice::take_from(cons, family.addr_len())?;
            Ok(IpAddressFamily { family, choice })
        })
    }

    fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.family.encode(),
            self.choice.encode_ref(),
        ))
    }
}


//------------ AddressChoice -------------------------------------------------

/// The resources of one address family.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AddressChoice {
    /// The family's resources are those certified for the issuer.
    Inherit,

    /// The family's resources are given explicitly.
    Blocks(AddressBlocks),
}

impl AddressChoice {
    /// Returns whether the choice is the inherit marker.
    pub fn is_inherit(&self) -> bool {
        match *self {
            AddressChoice::Inherit => true,
            _ => false,
        }
    }

    fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
        addr_len: Option<usize>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_value(|tag, content| {
            if tag == Tag::NULL {
                content.to_null()?;
                Ok(AddressChoice::Inherit)
            }
            else if tag == Tag::SEQUENCE {
                AddressBlocks::parse_content(content, addr_len)
                    .map(AddressChoice::Blocks)
            }
            else {
                Err(content.content_err("invalid IPAddressChoice"))
            }
        })
    }

    fn encode_ref(&self) -> impl Values + '_ {
        match *self {
            AddressChoice::Inherit => Choice2::One(().encode()),
            AddressChoice::Blocks(ref blocks) => {
                Choice2::Two(blocks.encode_ref())
            }
        }
    }
}


//------------ AddressBlocks -------------------------------------------------

/// A sequence of address prefixes and ranges.
///
/// In canonical form the sequence is ordered by the blocks' minimum
/// addresses, no two blocks overlap or touch, and no range could be
/// expressed as a prefix.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AddressBlocks(Vec<IpBlock>);

impl AddressBlocks {
    /// Returns the blocks of the sequence in order.
    pub fn iter(&self) -> impl Iterator<Item = &IpBlock> {
        self.0.iter()
    }

    /// Returns whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of blocks in the sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether `other` is fully covered by `self`.
    ///
    /// Both values must be in canonical form. `addr_len` is the address
    /// width of the family the two sequences belong to.
    pub fn encompasses(&self, other: &Self, addr_len: usize) -> bool {
        let mut parent = self.0.iter();
        let mut cur = parent.next();
        for block in &other.0 {
            let child_min = block.min(addr_len);
            let child_max = block.max(addr_len);
            loop {
                let covering = match cur {
                    Some(covering) => covering,
                    None => return false,
                };
                if covering.max(addr_len)[..addr_len]
                    < child_max[..addr_len]
                {
                    cur = parent.next();
                    continue
                }
                if covering.min(addr_len)[..addr_len]
                    > child_min[..addr_len]
                {
                    return false
                }
                break
            }
        }
        true
    }

    /// Sorts the blocks and resolves duplicates, overlaps and adjacency.
    fn canonize(&mut self, len: usize) {
        self.0.sort_by(|a, b| a.compare(b, len));
        let mut i = 0;
        while i + 1 < self.0.len() {
            let a_max = self.0[i].max(len);
            let b_max = self.0[i + 1].max(len);

            // If a contains b, b can simply go.
            if a_max[..len] >= b_max[..len] {
                self.0.remove(i + 1);
                continue
            }

            // If a and b overlap or are adjacent, merge them into a
            // single element. Adjacency is checked by subtracting one
            // from b's minimum. If that wraps around, both elements
            // start at the zero address and thus overlap.
            let mut b_min = self.0[i + 1].min(len);
            let wrapped = !addr::decrement(&mut b_min, len);
            if wrapped || a_max[..len] >= b_min[..len] {
                let a_min = self.0[i].min(len);
                self.0[i] = IpBlock::range(&a_min[..len], &b_max[..len]);
                self.0.remove(i + 1);
                continue
            }

            i += 1
        }
    }

    fn parse_content<S: Source>(
        content: &mut decode::Content<S>,
        addr_len: Option<usize>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let cons = content.as_constructed()?;
        let mut blocks = Vec::new();
        while let Some(block) = IpBlock::take_opt_from(cons, addr_len)? {
            blocks.push(block)
        }
        Ok(AddressBlocks(blocks))
    }

    fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(
            encode::iter(self.0.iter().map(|block| block.encode_ref()))
        )
    }
}


//------------ IpBlock -------------------------------------------------------

/// A single element of an address block sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IpBlock {
    /// A prefix: an address of which only the leading bits matter.
    Prefix(Bits),

    /// The range of addresses between a minimum and a maximum.
    ///
    /// Canonical sequences only contain ranges that cannot be expressed
    /// as a single prefix.
    Range(AddressRange),
}

impl IpBlock {
    /// Creates a block covering the addresses from `min` to `max`.
    ///
    /// If the range covers exactly one prefix, a prefix block is created
    /// instead.
    pub fn range(min: &[u8], max: &[u8]) -> Self {
        match addr::range_prefix_len(min, max) {
            Some(prefix_len) => {
                IpBlock::Prefix(Bits::pack_prefix(min, prefix_len))
            }
            None => {
                IpBlock::Range(AddressRange {
                    min: Bits::pack_min(min),
                    max: Bits::pack_max(max),
                })
            }
        }
    }

    /// Returns the expanded minimum address of the block.
    pub fn min(&self, addr_len: usize) -> RawAddr {
        match *self {
            IpBlock::Prefix(ref bits) => bits.expand(addr_len, 0x00),
            IpBlock::Range(ref range) => range.min.expand(addr_len, 0x00),
        }
    }

    /// Returns the expanded maximum address of the block.
    pub fn max(&self, addr_len: usize) -> RawAddr {
        match *self {
            IpBlock::Prefix(ref bits) => bits.expand(addr_len, 0xFF),
            IpBlock::Range(ref range) => range.max.expand(addr_len, 0xFF),
        }
    }

    /// Returns a value displaying the block within the given family.
    pub fn display(&self, family: AddressFamily) -> DisplayBlock {
        DisplayBlock { block: self, family }
    }

    /// Compares two blocks for canonical ordering.
    ///
    /// Blocks are ordered by their minimum address. On a tie the shorter
    /// prefix comes first, with ranges after all prefixes.
    fn compare(&self, other: &Self, len: usize) -> Ordering {
        self.min(len)[..len].cmp(&other.min(len)[..len]).then_with(|| {
            self.sort_len(len).cmp(&other.sort_len(len))
        })
    }

    fn sort_len(&self, len: usize) -> u8 {
        match *self {
            IpBlock::Prefix(ref bits) => bits.prefix_len(),
            IpBlock::Range(_) => (len * 8) as u8,
        }
    }

    fn take_opt_from<S: Source>(
        cons: &mut decode::Constructed<S>,
        addr_len: Option<usize>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_value(|tag, content| {
            if tag == Tag::BIT_STRING {
                Bits::parse_content(content, addr_len).map(IpBlock::Prefix)
            }
            else if tag == Tag::SEQUENCE {
                let cons = content.as_constructed()?;
                let min = Bits::take_from(cons, addr_len)?;
                let max = Bits::take_from(cons, addr_len)?;
                Ok(IpBlock::Range(AddressRange { min, max }))
            }
            else {
                Err(content.content_err("invalid IPAddressOrRange"))
            }
        })
    }

    fn encode_ref(&self) -> impl Values + '_ {
        match *self {
            IpBlock::Prefix(ref bits) => Choice2::One(bits.encode_ref()),
            IpBlock::Range(ref range) => {
                Choice2::Two(encode::sequence((
                    range.min.encode_ref(),
                    range.max.encode_ref(),
                )))
            }
        }
    }
}


//------------ AddressRange --------------------------------------------------

/// An address range that cannot be expressed as a prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddressRange {
    /// The smallest address of the range.
    min: Bits,

    /// The largest address of the range.
    max: Bits,
}

impl AddressRange {
    /// Returns the bit string of the smallest address.
    pub fn min(&self) -> &Bits {
        &self.min
    }

    /// Returns the bit string of the largest address.
    pub fn max(&self) -> &Bits {
        &self.max
    }
}


//------------ DisplayBlock --------------------------------------------------

/// An address block displayed within the context of its family.
pub struct DisplayBlock<'a> {
    /// The block to display.
    block: &'a IpBlock,

    /// The family providing address length and formatting.
    family: AddressFamily,
}

impl<'a> fmt::Display for DisplayBlock<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self.block {
            IpBlock::Prefix(ref bits) => {
                fmt_addr(bits, self.family, 0x00, f)?;
                write!(f, "/{}", bits.prefix_len())
            }
            IpBlock::Range(ref range) => {
                fmt_addr(&range.min, self.family, 0x00, f)?;
                f.write_str("-")?;
                fmt_addr(&range.max, self.family, 0xFF, f)
            }
        }
    }
}

/// Formats one address bit string according to its family.
///
/// Families without a defined address length get their raw bytes dumped
/// in hex with the unused bit count appended.
fn fmt_addr(
    bits: &Bits,
    family: AddressFamily,
    fill: u8,
    f: &mut fmt::Formatter,
) -> fmt::Result {
    match family.afi() {
        AFI_IPV4 => {
            let addr = bits.expand(4, fill);
            let mut octets = [0u8; 4];
            octets.copy_from_slice(&addr[..4]);
            write!(f, "{}", Ipv4Addr::from(octets))
        }
        AFI_IPV6 => {
            write!(f, "{}", Ipv6Addr::from(bits.expand(16, fill)))
        }
        _ => {
            for (i, byte) in bits.octets().iter().enumerate() {
                if i > 0 {
                    f.write_str(":")?;
                }
                write!(f, "{:02x}", byte)?;
            }
            write!(f, "[{}]", bits.unused())
        }
    }
}


//============ Tests =========================================================
