//! Autonomous System identifier resources for use with X.509 certificates.
//!
//! The types in this module implement the AS resources extension defined
//! in RFC 3779, section 3. The extension carries up to two independent
//! choices: AS numbers proper and Routing Domain Identifiers. Each choice
//! either lists its identifiers and identifier ranges explicitly or
//! carries the inherit marker deferring to the issuer certificate.
//!
//! Values are built through the methods of [`AsIdentifiers`] or decoded
//! from their DER representation; explicitly built values are brought
//! into canonical form through [`AsIdentifiers::canonize`].
//!
//! [`AsIdentifiers`]: struct.AsIdentifiers.html
//! [`AsIdentifiers::canonize`]: struct.AsIdentifiers.html#method.canonize

use std::fmt;
use std::cmp::Ordering;
use bcder::{ConstOid, Mode, Oid, Tag};
use bcder::decode::{self, DecodeError, IntoSource, Source};
use bcder::encode::{self, Choice2, PrimitiveContent, Values};
use crate::error::InvalidInheritance;


//------------ Extension OID -------------------------------------------------

/// The object identifier of the AS resources extension.
///
/// This is `id-pe-autonomousSysIds`, 1.3.6.1.5.5.7.1.8.
pub const ID_PE_AUTONOMOUS_SYS_IDS: ConstOid = Oid(&[43, 6, 1, 5, 5, 7, 1, 8]);


//------------ AsIdentifiers -------------------------------------------------

/// The AS resources extension of a certificate.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AsIdentifiers {
    /// The AS numbers choice.
    asnum: Option<AsChoice>,

    /// The routing domain identifiers choice.
    rdi: Option<AsChoice>,
}

impl AsIdentifiers {
    /// Creates an empty value without either choice.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the AS numbers choice if present.
    pub fn asnum(&self) -> Option<&AsChoice> {
        self.asnum.as_ref()
    }

    /// Returns the routing domain identifiers choice if present.
    pub fn rdi(&self) -> Option<&AsChoice> {
        self.rdi.as_ref()
    }

    /// Returns whether neither choice is present.
    pub fn is_empty(&self) -> bool {
        self.asnum.is_none() && self.rdi.is_none()
    }
}

/// # Building Values
///
impl AsIdentifiers {
    /// Marks the AS numbers choice as inheriting the issuer's resources.
    pub fn inherit_asnum(&mut self) -> Result<(), InvalidInheritance> {
        AsChoice::add_inherit(&mut self.asnum)
    }

    /// Marks the RDI choice as inheriting the issuer's resources.
    pub fn inherit_rdi(&mut self) -> Result<(), InvalidInheritance> {
        AsChoice::add_inherit(&mut self.rdi)
    }

    /// Adds a single AS number to the AS numbers choice.
    pub fn add_asnum(&mut self, id: AsId) -> Result<(), InvalidInheritance> {
        AsChoice::add_block(&mut self.asnum, AsBlock::Id(id))
    }

    /// Adds a range of AS numbers to the AS numbers choice.
    ///
    /// The endpoints must be in order, `min ≤ max`. A range with equal
    /// endpoints is added as a single identifier.
    pub fn add_asnum_range(
        &mut self, min: AsId, max: AsId,
    ) -> Result<(), InvalidInheritance> {
        AsChoice::add_block(&mut self.asnum, AsBlock::new(min, max))
    }

    /// Adds a single identifier to the RDI choice.
    pub fn add_rdi(&mut self, id: AsId) -> Result<(), InvalidInheritance> {
        AsChoice::add_block(&mut self.rdi, AsBlock::Id(id))
    }

    /// Adds a range of identifiers to the RDI choice.
    pub fn add_rdi_range(
        &mut self, min: AsId, max: AsId,
    ) -> Result<(), InvalidInheritance> {
        AsChoice::add_block(&mut self.rdi, AsBlock::new(min, max))
    }

    /// Brings both choices into canonical form.
    pub fn canonize(&mut self) {
        if let Some(AsChoice::Ids(ref mut blocks)) = self.asnum {
            blocks.canonize()
        }
        if let Some(AsChoice::Ids(ref mut blocks)) = self.rdi {
            blocks.canonize()
        }
    }
}

/// # Decoding and Encoding
///
impl AsIdentifiers {
    /// Takes an encoded value from the beginning of a constructed value.
    pub fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let asnum = cons.take_opt_constructed_if(
                Tag::CTX_0, AsChoice::take_from
            )?;
            let rdi = cons.take_opt_constructed_if(
                Tag::CTX_1, AsChoice::take_from
            )?;
            Ok(AsIdentifiers { asnum, rdi })
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
        encode::sequence((
            self.asnum.as_ref().map(|choice| {
                encode::sequence_as(Tag::CTX_0, choice.encode_ref())
            }),
            self.rdi.as_ref().map(|choice| {
                encode::sequence_as(Tag::CTX_1, choice.encode_ref())
            }),
        ))
    }
}


//--- Display

impl fmt::Display for AsIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref choice) = self.asnum {
            writeln!(f, "Autonomous System Numbers:")?;
            choice.fmt_body(f)?;
        }
        if let Some(ref choice) = self.rdi {
            writeln!(f, "Routing Domain Identifiers:")?;
            choice.fmt_body(f)?;
        }
        Ok(())
    }
}


//------------ AsChoice ------------------------------------------------------

/// One choice of AS identifier resources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AsChoice {
    /// The choice's resources are those certified for the issuer.
    Inherit,

    /// The choice's resources are given explicitly.
    Ids(AsIdBlocks),
}

impl AsChoice {
    /// Returns whether the choice is the inherit marker.
    pub fn is_inherit(&self) -> bool {
        match *self {
            AsChoice::Inherit => true,
            _ => false,
        }
    }

    fn add_inherit(
        choice: &mut Option<Self>,
    ) -> Result<(), InvalidInheritance> {
        match *choice {
            None => {
                *choice = Some(AsChoice::Inherit);
                Ok(())
            }
            Some(AsChoice::Inherit) => Ok(()),
            Some(AsChoice::Ids(_)) => Err(InvalidInheritance),
        }
    }

    fn add_block(
        choice: &mut Option<Self>,
        block: AsBlock,
    ) -> Result<(), InvalidInheritance> {
        match *choice {
            None => {
                *choice = Some(AsChoice::Ids(AsIdBlocks(vec![block])));
                Ok(())
            }
            Some(AsChoice::Inherit) => Err(InvalidInheritance),
            Some(AsChoice::Ids(ref mut blocks)) => {
                blocks.0.push(block);
                Ok(())
            }
        }
    }

    fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_value(|tag, content| {
            if tag == Tag::NULL {
                content.to_null()?;
                Ok(AsChoice::Inherit)
            }
            else if tag == Tag::SEQUENCE {
                AsIdBlocks::parse_content(content).map(AsChoice::Ids)
            }
            else {
                Err(content.content_err("invalid ASIdentifierChoice"))
            }
        })
    }

    fn encode_ref(&self) -> impl Values + '_ {
        match *self {
            AsChoice::Inherit => Choice2::One(().encode()),
            AsChoice::Ids(ref blocks) => Choice2::Two(blocks.encode_ref()),
        }
    }

    fn fmt_body(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AsChoice::Inherit => writeln!(f, "  inherit"),
            AsChoice::Ids(ref blocks) => {
                for block in &blocks.0 {
                    writeln!(f, "  {}", block)?;
                }
                Ok(())
            }
        }
    }
}


//------------ AsIdBlocks ----------------------------------------------------

/// A sequence of AS identifiers and identifier ranges.
///
/// In canonical form the sequence is ordered, no two elements overlap or
/// touch, and no range has equal endpoints.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AsIdBlocks(Vec<AsBlock>);

impl AsIdBlocks {
    /// Returns the blocks of the sequence in order.
    pub fn iter(&self) -> impl Iterator<Item = &AsBlock> {
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
    /// Both values must be in canonical form.
    pub fn encompasses(&self, other: &Self) -> bool {
        let mut parent = self.0.iter();
        let mut cur = parent.next();
        for block in &other.0 {
            loop {
                let covering = match cur {
                    Some(covering) => covering,
                    None => return false,
                };
                if covering.max() < block.max() {
                    cur = parent.next();
                    continue
                }
                if covering.min() > block.min() {
                    return false
                }
                break
            }
        }
        true
    }

    /// Sorts the blocks and resolves duplicates, overlaps and adjacency.
    fn canonize(&mut self) {
        // Degenerate ranges become identifiers first so the sweep only
        // sees canonical elements.
        for block in &mut self.0 {
            if let AsBlock::Range(range) = *block {
                if range.min == range.max {
                    *block = AsBlock::Id(range.min)
                }
            }
        }

        self.0.sort_by(|a, b| a.compare(b));

        let mut i = 0;
        while i + 1 < self.0.len() {
            let a = self.0[i];
            let b = self.0[i + 1];

            // If a contains b, b can simply go.
            if a.max() >= b.max() {
                self.0.remove(i + 1);
                continue
            }

            // If b contains a, a goes instead. Since a does not contain
            // b, sharing the minimum is enough.
            if a.min() == b.min() {
                self.0.remove(i);
                continue
            }

            // If a and b overlap or are adjacent, merge them.
            if u64::from(u32::from(a.max())) + 1
                >= u64::from(u32::from(b.min()))
            {
                self.0[i] = AsBlock::new(a.min(), b.max());
                self.0.remove(i + 1);
                continue
            }

            i += 1
        }
    }

    fn parse_content<S: Source>(
        content: &mut decode::Content<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        let cons = content.as_constructed()?;
        let mut blocks = Vec::new();
        while let Some(block) = AsBlock::take_opt_from(cons)? {
            blocks.push(block)
        }
        Ok(AsIdBlocks(blocks))
    }

    fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence(
            encode::iter(self.0.iter().map(|block| block.encode()))
        )
    }
}


//------------ AsBlock -------------------------------------------------------

/// A single element of an AS identifier sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AsBlock {
    /// A single identifier.
    Id(AsId),

    /// A continuous range of identifiers.
    Range(AsRange),
}

impl AsBlock {
    /// Creates a block covering the identifiers from `min` to `max`.
    ///
    /// If the endpoints are equal, the block is a single identifier.
    pub fn new(min: AsId, max: AsId) -> Self {
        debug_assert!(min <= max);
        if min == max {
            AsBlock::Id(min)
        }
        else {
            AsBlock::Range(AsRange { min, max })
        }
    }

    /// Returns the smallest identifier of the block.
    pub fn min(&self) -> AsId {
        match *self {
            AsBlock::Id(id) => id,
            AsBlock::Range(ref range) => range.min,
        }
    }

    /// Returns the largest identifier of the block.
    pub fn max(&self) -> AsId {
        match *self {
            AsBlock::Id(id) => id,
            AsBlock::Range(ref range) => range.max,
        }
    }

    /// Compares two blocks for canonical ordering.
    ///
    /// Identifiers and ranges are ordered by their minimum; two ranges
    /// tie-break on their maximum.
    fn compare(&self, other: &Self) -> Ordering {
        match (*self, *other) {
            (AsBlock::Id(a), AsBlock::Id(b)) => a.cmp(&b),
            (AsBlock::Range(a), AsBlock::Range(b)) => {
                a.min.cmp(&b.min).then_with(|| a.max.cmp(&b.max))
            }
            (AsBlock::Id(a), AsBlock::Range(b)) => a.cmp(&b.min),
            (AsBlock::Range(a), AsBlock::Id(b)) => a.min.cmp(&b),
        }
    }

    fn take_opt_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_value(|tag, content| {
            if tag == Tag::INTEGER {
                AsId::parse_content(content).map(AsBlock::Id)
            }
            else if tag == Tag::SEQUENCE {
                let cons = content.as_constructed()?;
                let min = AsId::take_from(cons)?;
                let max = AsId::take_from(cons)?;
                Ok(AsBlock::Range(AsRange { min, max }))
            }
            else {
                Err(content.content_err("invalid ASIdOrRange"))
            }
        })
    }

    fn encode(self) -> impl Values {
        match self {
            AsBlock::Id(id) => Choice2::One(id.encode()),
            AsBlock::Range(range) => {
                Choice2::Two(encode::sequence((
                    range.min.encode(),
                    range.max.encode(),
                )))
            }
        }
    }
}


//--- Display

impl fmt::Display for AsBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AsBlock::Id(id) => id.fmt(f),
            AsBlock::Range(ref range) => {
                write!(f, "{}-{}", range.min, range.max)
            }
        }
    }
}


//------------ AsId ----------------------------------------------------------

/// An AS identifier.
///
/// The wire format allows identifiers of arbitrary size but values beyond
/// 32 bits have never been assigned, so the type sticks to `u32` and the
/// decoder rejects larger values.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd
)]
pub struct AsId(u32);

impl AsId {
    fn take_from<S: Source>(
        cons: &mut decode::Constructed<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        cons.take_u32().map(AsId)
    }

    fn parse_content<S: Source>(
        content: &mut decode::Content<S>,
    ) -> Result<Self, DecodeError<S::Error>> {
        content.to_u32().map(AsId)
    }

    fn encode(self) -> impl Values {
        self.0.encode()
    }
}


//--- From

impl From<u32> for AsId {
    fn from(id: u32) -> Self {
        AsId(id)
    }
}

impl From<AsId> for u32 {
    fn from(id: AsId) -> Self {
        id.0
    }
}


//--- Display

impl fmt::Display for AsId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}


//------------ AsRange -------------------------------------------------------

/// A continuous, non-degenerate range of AS identifiers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AsRange {
    /// The smallest identifier of the range.
    min: AsId,

    /// The largest identifier of the range.
    max: AsId,
}

impl AsRange {
    /// Returns the smallest identifier of the range.
    pub fn min(&self) -> AsId {
        self.min
    }

    /// Returns the largest identifier of the range.
    pub fn max(&self) -> AsId {
        self.max
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn asnum_blocks(input: &[(u32, u32)]) -> AsIdBlocks {
        let mut res = AsIdentifiers::new();
        for &(min, max) in input {
            let (min, max) = if min <= max { (min, max) } else { (max, min) };
            res.add_asnum_range(AsId(min), AsId(max)).unwrap();
        }
        res.canonize();
        match res.asnum() {
            Some(AsChoice::Ids(blocks)) => blocks.clone(),
            _ => AsIdBlocks::default(),
        }
    }

    fn as_pairs(blocks: &AsIdBlocks) -> Vec<(u32, u32)> {
        blocks.0.iter()
            .map(|block| (block.min().0, block.max().0))
            .collect()
    }

    #[test]
    fn extension_oid() {
        assert_eq!(
            ID_PE_AUTONOMOUS_SYS_IDS.to_string(),
            "1.3.6.1.5.5.7.1.8"
        );
    }

    #[test]
    fn merge_overlapping_and_adjacent() {
        assert_eq!(as_pairs(&asnum_blocks(&[(3, 5), (6, 9)])), [(3, 9)]);
        assert_eq!(as_pairs(&asnum_blocks(&[(3, 5), (4, 9)])), [(3, 9)]);
        assert_eq!(as_pairs(&asnum_blocks(&[(3, 9), (5, 7)])), [(3, 9)]);
        assert_eq!(
            as_pairs(&asnum_blocks(&[(3, 5), (7, 9)])),
            [(3, 5), (7, 9)]
        );
    }

    #[test]
    fn degenerate_range_becomes_id() {
        let blocks = asnum_blocks(&[(10, 10)]);
        assert_eq!(blocks.0, [AsBlock::Id(AsId(10))]);
    }

    #[test]
    fn scattered_input_canonizes() {
        let blocks = asnum_blocks(
            &[(64496, 64496), (64498, 64500), (64497, 64497), (64500, 64510)]
        );
        assert_eq!(as_pairs(&blocks), [(64496, 64510)]);
    }

    #[test]
    fn inherit_is_exclusive() {
        let mut res = AsIdentifiers::new();
        res.inherit_asnum().unwrap();
        res.inherit_asnum().unwrap();
        assert_eq!(res.add_asnum(AsId(12)), Err(InvalidInheritance));

        // The two choices are independent.
        res.add_rdi(AsId(12)).unwrap();
        assert_eq!(res.inherit_rdi(), Err(InvalidInheritance));
    }

    const SIMPLE: &[u8] = &[
        0x30, 0x0F,                         // ASIdentifiers
        0xA0, 0x0D,                         //   [0] asnum
        0x30, 0x0B,                         //     asIdsOrRanges
        0x02, 0x01, 0x0A,                   //       10
        0x30, 0x06,                         //       range
        0x02, 0x01, 0x14,                   //         20
        0x02, 0x01, 0x1E,                   //         30
    ];

    #[test]
    fn decode_then_encode() {
        let res = AsIdentifiers::decode(SIMPLE).unwrap();
        assert!(res.rdi().is_none());
        match res.asnum() {
            Some(AsChoice::Ids(blocks)) => {
                assert_eq!(as_pairs(blocks), [(10, 10), (20, 30)]);
            }
            _ => panic!("expected explicit blocks"),
        }

        let encoded = bcder::Captured::from_values(
            Mode::Der, res.encode_ref()
        );
        assert_eq!(encoded.as_slice(), SIMPLE);
    }

    const INHERIT_RDI: &[u8] = &[
        0x30, 0x04,
        0xA1, 0x02,                         // [1] rdi
        0x05, 0x00,                         //   inherit
    ];

    #[test]
    fn decode_inherit() {
        let res = AsIdentifiers::decode(INHERIT_RDI).unwrap();
        assert!(res.asnum().is_none());
        assert!(res.rdi().map_or(false, AsChoice::is_inherit));

        let encoded = bcder::Captured::from_values(
            Mode::Der, res.encode_ref()
        );
        assert_eq!(encoded.as_slice(), INHERIT_RDI);
    }

    #[test]
    fn encompasses_blocks() {
        let outer = asnum_blocks(&[(10, 20), (30, 40)]);
        let inner = asnum_blocks(&[(12, 14), (30, 40)]);
        assert!(outer.encompasses(&inner));
        assert!(!inner.encompasses(&outer));
        assert!(outer.encompasses(&outer));
        assert!(outer.encompasses(&AsIdBlocks::default()));
        assert!(!AsIdBlocks::default().encompasses(&outer));

        let crossing = asnum_blocks(&[(18, 32)]);
        assert!(!outer.encompasses(&crossing));
    }

    #[test]
    fn display_choices() {
        let mut res = AsIdentifiers::new();
        res.add_asnum(AsId(64496)).unwrap();
        res.add_asnum_range(AsId(64498), AsId(64501)).unwrap();
        res.inherit_rdi().unwrap();
        res.canonize();
        assert_eq!(
            res.to_string(),
            "Autonomous System Numbers:\n  64496\n  64498-64501\n\
             Routing Domain Identifiers:\n  inherit\n"
        );
    }

    proptest! {
        #[test]
        fn canonize_properties(
            input in proptest::collection::vec(
                (any::<u32>(), any::<u32>()), 1..12
            )
        ) {
            let blocks = asnum_blocks(&input);

            // Ordered with gaps between consecutive blocks, no
            // degenerate ranges.
            for pair in blocks.0.windows(2) {
                prop_assert!(
                    u64::from(pair[0].max().0) + 1
                        < u64::from(pair[1].min().0)
                );
            }
            for block in &blocks.0 {
                if let AsBlock::Range(range) = block {
                    prop_assert!(range.min < range.max);
                }
            }

            // Idempotent and independent of input order.
            let mut again = blocks.clone();
            again.canonize();
            prop_assert_eq!(&again, &blocks);

            let mut reversed = input.clone();
            reversed.reverse();
            prop_assert_eq!(&asnum_blocks(&reversed), &blocks);
        }
    }
}
