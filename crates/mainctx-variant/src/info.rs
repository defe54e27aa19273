//! Type info cache
//!
//! Alignment and size facts for every definite type, plus the member
//! offset table of tuples and dict entries.
//!
//! Basic types resolve to entries of a constant table indexed by
//! `type_char - 'b'`. Container types are reference counted and interned
//! by type string: while any reference is alive, every lookup of the same
//! string returns the same descriptor. The intern table only holds weak
//! references; the last strong reference removes the entry.
//!
//! Alignments are stored one less than the power of two (0, 1, 3 or 7).
//! A fixed size of 0 means the type is variable-sized.
//!
//! # Member offsets
//!
//! For member `m` of a tuple, with `prev_end` the end of the variable-sized
//! member `m.i()` (or 0 when `m.i()` is `NO_OFFSET`):
//!
//! ```text
//! start = ((prev_end + m.a()) & m.b()) | m.c()
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use mainctx_core::ktrace;

use crate::error::VariantTypeError;
use crate::type_string;

/// `MemberInfo::i()` for members not preceded by a variable-sized member
pub const NO_OFFSET: usize = usize::MAX;

/// Layout facts of a basic type
#[derive(Debug, PartialEq, Eq)]
pub struct BasicInfo {
    type_string: &'static str,
    alignment: u8,
    fixed_size: u8,
}

const fn fixed_aligned(type_string: &'static str, size: u8) -> BasicInfo {
    BasicInfo { type_string, alignment: size - 1, fixed_size: size }
}

const fn unaligned(type_string: &'static str) -> BasicInfo {
    BasicInfo { type_string, alignment: 0, fixed_size: 0 }
}

const fn aligned(type_string: &'static str, alignment: u8) -> BasicInfo {
    BasicInfo { type_string, alignment: alignment - 1, fixed_size: 0 }
}

const NOT_A_TYPE: BasicInfo = BasicInfo { type_string: "", alignment: 0, fixed_size: 0 };

static BASIC_TABLE: [BasicInfo; 24] = [
    fixed_aligned("b", 1), // boolean
    NOT_A_TYPE,            // c
    fixed_aligned("d", 8), // double
    NOT_A_TYPE,            // e
    NOT_A_TYPE,            // f
    unaligned("g"),        // signature
    fixed_aligned("h", 4), // handle
    fixed_aligned("i", 4), // int32
    NOT_A_TYPE,            // j
    NOT_A_TYPE,            // k
    NOT_A_TYPE,            // l
    NOT_A_TYPE,            // m
    fixed_aligned("n", 2), // int16
    unaligned("o"),        // object path
    NOT_A_TYPE,            // p
    fixed_aligned("q", 2), // uint16
    NOT_A_TYPE,            // r
    unaligned("s"),        // string
    fixed_aligned("t", 8), // uint64
    fixed_aligned("u", 4), // uint32
    aligned("v", 8),       // variant
    NOT_A_TYPE,            // w
    fixed_aligned("x", 8), // int64
    fixed_aligned("y", 1), // byte
];

fn basic(type_char: u8) -> Result<&'static BasicInfo, VariantTypeError> {
    type_char
        .checked_sub(b'b')
        .and_then(|index| BASIC_TABLE.get(index as usize))
        .filter(|info| !info.type_string.is_empty())
        .ok_or(VariantTypeError::Indefinite)
}

/// How the end of a tuple member is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberEnding {
    /// The member has a fixed size
    Fixed,
    /// Variable-sized and last: it runs to the start of the offset table
    Last,
    /// Variable-sized: its end is stored in the offset table
    Offset,
}

/// Offset-table entry of one tuple member
#[derive(Debug, Clone)]
pub struct MemberInfo {
    type_info: TypeInfo,
    i: usize,
    a: usize,
    b: usize,
    c: u8,
    ending: MemberEnding,
}

impl MemberInfo {
    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    /// Index of the variable-sized member this one is placed after,
    /// `NO_OFFSET` if none
    #[inline]
    pub fn i(&self) -> usize {
        self.i
    }

    #[inline]
    pub fn a(&self) -> usize {
        self.a
    }

    /// Alignment mask (already inverted)
    #[inline]
    pub fn b(&self) -> usize {
        self.b
    }

    #[inline]
    pub fn c(&self) -> u8 {
        self.c
    }

    #[inline]
    pub fn ending_type(&self) -> MemberEnding {
        self.ending
    }

    /// Start offset of this member given the end of member `i()`
    #[inline]
    pub fn start_offset(&self, prev_end: usize) -> usize {
        (prev_end.wrapping_add(self.a) & self.b) | self.c as usize
    }
}

enum ContainerKind {
    /// Arrays and maybes
    Array { element: TypeInfo },
    /// Tuples and dict entries
    Tuple { members: Box<[MemberInfo]> },
}

/// Interned descriptor of a container type
pub struct ContainerInfo {
    type_string: Box<str>,
    alignment: u8,
    fixed_size: usize,
    kind: ContainerKind,
}

impl Drop for ContainerInfo {
    fn drop(&mut self) {
        let mut table = lock_table();
        let Some(map) = table.as_mut() else {
            return;
        };
        // a racing lookup may already have replaced the entry
        let ours = map
            .get(&*self.type_string)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), self));
        if ours {
            map.remove(&*self.type_string);
            ktrace!("type info '{}' released", self.type_string);
            if map.is_empty() {
                *table = None;
            }
        }
    }
}

/// Alignment mask and fixed size (0 = variable)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub alignment: usize,
    pub fixed_size: usize,
}

/// Reference to the descriptor of one definite type
#[derive(Clone)]
pub enum TypeInfo {
    Basic(&'static BasicInfo),
    Container(Arc<ContainerInfo>),
}

type InternTable = Option<HashMap<Box<str>, Weak<ContainerInfo>>>;

static TABLE: Mutex<InternTable> = Mutex::new(None);

fn lock_table() -> MutexGuard<'static, InternTable> {
    TABLE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lookup(type_string: &str) -> Option<Arc<ContainerInfo>> {
    lock_table().as_ref()?.get(type_string)?.upgrade()
}

/// Descriptor for a definite type string
pub fn get(type_string: &str) -> Result<TypeInfo, VariantTypeError> {
    type_string::validate(type_string)?;
    if !type_string::is_definite(type_string) {
        return Err(VariantTypeError::Indefinite);
    }
    get_valid(type_string)
}

fn get_valid(type_string: &str) -> Result<TypeInfo, VariantTypeError> {
    match type_string.as_bytes()[0] {
        b'a' | b'm' | b'(' | b'{' => intern(type_string).map(TypeInfo::Container),
        c => basic(c).map(TypeInfo::Basic),
    }
}

fn intern(type_string: &str) -> Result<Arc<ContainerInfo>, VariantTypeError> {
    if let Some(info) = lookup(type_string) {
        return Ok(info);
    }

    // children are resolved outside the table lock
    let built = Arc::new(build(type_string)?);

    let mut table = lock_table();
    let map = table.get_or_insert_with(HashMap::new);
    if let Some(existing) = map.get(type_string).and_then(Weak::upgrade) {
        drop(table);
        drop(built);
        return Ok(existing);
    }
    map.insert(type_string.into(), Arc::downgrade(&built));
    ktrace!("type info '{}' interned", type_string);
    Ok(built)
}

fn build(type_string: &str) -> Result<ContainerInfo, VariantTypeError> {
    match type_string.as_bytes()[0] {
        b'a' | b'm' => {
            let element = get_valid(type_string::element(type_string)?)?;
            let alignment = element.alignment();
            Ok(ContainerInfo {
                type_string: type_string.into(),
                alignment,
                fixed_size: 0,
                kind: ContainerKind::Array { element },
            })
        }
        _ => {
            let members = build_members(type_string)?;
            let (alignment, fixed_size) = tuple_base_info(&members);
            Ok(ContainerInfo {
                type_string: type_string.into(),
                alignment,
                fixed_size,
                kind: ContainerKind::Tuple { members: members.into_boxed_slice() },
            })
        }
    }
}

#[inline]
fn align(offset: usize, alignment: usize) -> usize {
    offset.wrapping_add(offset.wrapping_neg() & alignment)
}

fn build_members(type_string: &str) -> Result<Vec<MemberInfo>, VariantTypeError> {
    let items: Vec<&str> = type_string::items(type_string)?.collect();
    let mut members = Vec::with_capacity(items.len());

    let (mut i, mut a, mut b, mut c) = (NO_OFFSET, 0usize, 0usize, 0usize);
    for (index, item) in items.iter().enumerate() {
        let type_info = get_valid(item)?;
        let d = type_info.alignment() as usize;
        let e = type_info.fixed_size();

        if d <= b {
            c = align(c, d);
        } else {
            a += align(c, b);
            b = d;
            c = 0;
        }

        let ending = if e != 0 {
            MemberEnding::Fixed
        } else if index + 1 == items.len() {
            MemberEnding::Last
        } else {
            MemberEnding::Offset
        };

        // fold the aligned part of c into a so c fits a byte
        let a_folded = a + (!b & c);
        let c_folded = c & b;
        members.push(MemberInfo {
            type_info,
            i,
            a: a_folded + b,
            b: !b,
            c: c_folded as u8,
            ending,
        });

        if e == 0 {
            i = i.wrapping_add(1);
            a = 0;
            b = 0;
            c = 0;
        } else {
            c += e;
        }
    }

    Ok(members)
}

fn tuple_base_info(members: &[MemberInfo]) -> (u8, usize) {
    let Some(last) = members.last() else {
        // the unit tuple occupies one byte
        return (0, 1);
    };

    let alignment = members.iter().fold(0u8, |acc, m| acc | m.type_info.alignment());
    let last_size = last.type_info.fixed_size();
    let fixed_size = if last.i == NO_OFFSET && last_size != 0 {
        align(((last.a & last.b) | last.c as usize) + last_size, alignment as usize)
    } else {
        0
    };
    (alignment, fixed_size)
}

impl TypeInfo {
    /// Type string this descriptor was built for
    pub fn type_string(&self) -> &str {
        match self {
            TypeInfo::Basic(info) => info.type_string,
            TypeInfo::Container(info) => &info.type_string,
        }
    }

    #[inline]
    pub fn alignment(&self) -> u8 {
        match self {
            TypeInfo::Basic(info) => info.alignment,
            TypeInfo::Container(info) => info.alignment,
        }
    }

    #[inline]
    pub fn fixed_size(&self) -> usize {
        match self {
            TypeInfo::Basic(info) => info.fixed_size as usize,
            TypeInfo::Container(info) => info.fixed_size,
        }
    }

    pub fn query(&self) -> Layout {
        Layout { alignment: self.alignment() as usize, fixed_size: self.fixed_size() }
    }

    /// Nesting depth of the type
    pub fn query_depth(&self) -> usize {
        match self {
            TypeInfo::Basic(_) => 1,
            TypeInfo::Container(info) => type_string::depth(&info.type_string),
        }
    }

    /// Element of an array or maybe
    pub fn element(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Container(info) => match &info.kind {
                ContainerKind::Array { element } => Some(element),
                ContainerKind::Tuple { .. } => None,
            },
            TypeInfo::Basic(_) => None,
        }
    }

    /// Layout of the element of an array or maybe
    pub fn query_element(&self) -> Option<Layout> {
        self.element().map(TypeInfo::query)
    }

    /// Members of a tuple or dict entry
    pub fn members(&self) -> Option<&[MemberInfo]> {
        match self {
            TypeInfo::Container(info) => match &info.kind {
                ContainerKind::Tuple { members } => Some(members),
                ContainerKind::Array { .. } => None,
            },
            TypeInfo::Basic(_) => None,
        }
    }

    pub fn n_members(&self) -> Option<usize> {
        self.members().map(<[MemberInfo]>::len)
    }

    pub fn member_info(&self, index: usize) -> Option<&MemberInfo> {
        self.members()?.get(index)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, TypeInfo::Container(_))
    }

    /// Whether both refer to the same descriptor
    pub fn ptr_eq(a: &TypeInfo, b: &TypeInfo) -> bool {
        match (a, b) {
            (TypeInfo::Basic(x), TypeInfo::Basic(y)) => std::ptr::eq(*x, *y),
            (TypeInfo::Container(x), TypeInfo::Container(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("type", &self.type_string())
            .field("alignment", &self.alignment())
            .field("fixed_size", &self.fixed_size())
            .finish()
    }
}

/// Number of container descriptors currently alive
pub fn live_container_count() -> usize {
    lock_table().as_ref().map_or(0, HashMap::len)
}

/// Whether a live descriptor for `type_string` is interned
pub fn is_interned(type_string: &str) -> bool {
    lookup(type_string).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn layout(s: &str) -> (usize, usize) {
        let info = get(s).unwrap();
        (info.query().alignment, info.query().fixed_size)
    }

    #[test]
    fn test_basic_table() {
        assert_eq!(layout("b"), (0, 1));
        assert_eq!(layout("y"), (0, 1));
        assert_eq!(layout("n"), (1, 2));
        assert_eq!(layout("q"), (1, 2));
        assert_eq!(layout("i"), (3, 4));
        assert_eq!(layout("u"), (3, 4));
        assert_eq!(layout("h"), (3, 4));
        assert_eq!(layout("x"), (7, 8));
        assert_eq!(layout("t"), (7, 8));
        assert_eq!(layout("d"), (7, 8));
        assert_eq!(layout("s"), (0, 0));
        assert_eq!(layout("o"), (0, 0));
        assert_eq!(layout("g"), (0, 0));
        assert_eq!(layout("v"), (7, 0));
        assert_eq!(get("i").unwrap().query_depth(), 1);
        assert_eq!(get("g").unwrap().type_string(), "g");
        assert!(TypeInfo::ptr_eq(&get("i").unwrap(), &get("i").unwrap()));
    }

    #[test]
    fn test_indefinite_and_invalid_rejected() {
        assert_eq!(get("r").unwrap_err(), VariantTypeError::Indefinite);
        assert_eq!(get("a?").unwrap_err(), VariantTypeError::Indefinite);
        assert_eq!(get("*").unwrap_err(), VariantTypeError::Indefinite);
        assert_eq!(get("").unwrap_err(), VariantTypeError::Empty);
        assert!(matches!(get("c"), Err(VariantTypeError::UnexpectedChar { .. })));
    }

    #[test]
    fn test_arrays_and_maybes() {
        assert_eq!(layout("ay"), (0, 0));
        assert_eq!(layout("ax"), (7, 0));
        assert_eq!(layout("mi"), (3, 0));
        assert_eq!(layout("a(qx)"), (7, 0));

        let info = get("aai").unwrap();
        let element = info.element().unwrap();
        assert_eq!(element.type_string(), "ai");
        assert_eq!(element.element().unwrap().type_string(), "i");
        assert_eq!(info.query_element(), Some(Layout { alignment: 3, fixed_size: 0 }));
        assert_eq!(info.query_depth(), 3);
        assert!(info.members().is_none());
    }

    #[test]
    fn test_tuple_sizes() {
        assert_eq!(layout("()"), (0, 1));
        assert_eq!(layout("(qx)"), (7, 16));
        assert_eq!(layout("(yi)"), (3, 8));
        assert_eq!(layout("(iy)"), (3, 8));
        assert_eq!(layout("(yy)"), (0, 2));
        assert_eq!(layout("(ii)"), (3, 8));
        assert_eq!(layout("(si)"), (3, 0));
        assert_eq!(layout("{sv}"), (7, 0));
        assert_eq!(layout("{yy}"), (0, 2));
        assert_eq!(layout("((yi)y)"), (3, 12));
    }

    #[test]
    fn test_member_ending_types() {
        let info = get("(su(qx)ni)").unwrap();
        let endings: Vec<MemberEnding> =
            info.members().unwrap().iter().map(MemberInfo::ending_type).collect();
        assert_eq!(
            endings,
            vec![
                MemberEnding::Offset,
                MemberEnding::Fixed,
                MemberEnding::Fixed,
                MemberEnding::Fixed,
                MemberEnding::Fixed,
            ]
        );

        let info = get("(ss)").unwrap();
        assert_eq!(info.member_info(0).unwrap().ending_type(), MemberEnding::Offset);
        assert_eq!(info.member_info(1).unwrap().ending_type(), MemberEnding::Last);
        assert!(info.member_info(2).is_none());
        assert_eq!(info.n_members(), Some(2));
    }

    /// Lay members out in a straight line and compare with the table
    fn check_offsets(type_string: &str, variable_sizes: &[usize]) {
        let info = get(type_string).unwrap();
        let members = info.members().unwrap();
        let mut sizes = variable_sizes.iter().copied();
        let mut variable_ends = Vec::new();
        let mut pos = 0usize;

        for (index, member) in members.iter().enumerate() {
            let Layout { alignment, fixed_size } = member.type_info().query();
            pos = align(pos, alignment);

            let prev_end = match member.i() {
                NO_OFFSET => 0,
                i => variable_ends[i],
            };
            assert_eq!(
                member.start_offset(prev_end),
                pos,
                "{} member {} with {:?}",
                type_string,
                index,
                variable_sizes
            );

            if fixed_size != 0 {
                pos += fixed_size;
            } else {
                pos += sizes.next().unwrap_or(0);
                variable_ends.push(pos);
            }
        }
    }

    #[test]
    fn test_offsets_match_straight_line_layout() {
        for len in 0..24 {
            check_offsets("(su(qx)ni)", &[len]);
        }
        for (x, y) in [(0, 0), (1, 7), (3, 5), (8, 1), (13, 2)] {
            check_offsets("(sysx)", &[x, y]);
            check_offsets("(yayqaxv)", &[x, y, x + y]);
            check_offsets("(ia{sv}(yy)t)", &[x]);
            check_offsets("(ts(ui)ysq)", &[x, y]);
        }
        check_offsets("(qx)", &[]);
        check_offsets("((yi)yx)", &[]);
    }

    #[test]
    fn test_su_qx_ni_offsets() {
        let info = get("(su(qx)ni)").unwrap();
        let m = info.members().unwrap();
        // s is 5 bytes: u at 8, (qx) at 16, n at 32, i at 36
        assert_eq!(m[1].start_offset(5), 8);
        assert_eq!(m[2].start_offset(5), 16);
        assert_eq!(m[3].start_offset(5), 32);
        assert_eq!(m[4].start_offset(5), 36);
        assert_eq!(m[0].i(), NO_OFFSET);
        assert_eq!(m[4].i(), 0);
        assert_eq!(info.fixed_size(), 0);
        assert_eq!(info.alignment(), 7);
    }

    #[test]
    fn test_interning_shares_and_releases() {
        let first = get("a(tyyn)").unwrap();
        let second = get("a(tyyn)").unwrap();
        assert!(TypeInfo::ptr_eq(&first, &second));
        assert!(is_interned("a(tyyn)"));
        assert!(is_interned("(tyyn)"));

        // the element is shared with a direct lookup
        let element = get("(tyyn)").unwrap();
        assert!(TypeInfo::ptr_eq(first.element().unwrap(), &element));

        drop(first);
        drop(second);
        assert!(!is_interned("a(tyyn)"));
        assert!(is_interned("(tyyn)"));
        drop(element);
        assert!(!is_interned("(tyyn)"));
    }

    #[test]
    fn test_concurrent_get_converges() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| get("(dda{s(nq)}mx)").unwrap()))
            .collect();
        let infos: Vec<TypeInfo> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for info in &infos[1..] {
            assert!(TypeInfo::ptr_eq(&infos[0], info));
        }
        assert!(live_container_count() > 0);
        drop(infos);
        assert!(!is_interned("(dda{s(nq)}mx)"));
    }
}
