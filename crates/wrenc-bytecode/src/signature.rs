//! Method signatures and their 64-bit dispatch ids.
//!
//! A [`Signature`] is the canonical identity of a callable member: its name,
//! shape (getter / setter / method / subscript / subscript-setter /
//! initializer) and arity. Dispatch never compares signatures structurally —
//! it hashes the canonical string form down to a [`SignatureId`] and looks
//! that up in a per-class table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The shape of a signature, mirroring how it was declared in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureKind {
    Getter,
    Setter,
    Method,
    Subscript,
    SubscriptSetter,
    Initializer,
}

/// A method identity: name + kind + arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub kind: SignatureKind,
    pub arity: u8,
}

impl Signature {
    pub fn new(name: impl Into<String>, kind: SignatureKind, arity: u8) -> Self {
        Self { name: name.into(), kind, arity }
    }

    /// Canonical string form, using `_` placeholders for each parameter.
    ///
    /// `foo(_,_)` for a 2-ary method, `foo=(_)` for a setter, `[_]` for a
    /// subscript getter, `[_]=(_)` for a subscript setter.
    pub fn canonical(&self) -> String {
        let params = |n: u8| -> String {
            std::iter::repeat("_").take(n as usize).collect::<Vec<_>>().join(",")
        };
        match self.kind {
            SignatureKind::Getter => self.name.clone(),
            SignatureKind::Setter => format!("{}=({})", self.name, params(1)),
            SignatureKind::Method => format!("{}({})", self.name, params(self.arity)),
            SignatureKind::Subscript => format!("[{}]", params(self.arity)),
            SignatureKind::SubscriptSetter => {
                format!("[{}]=({})", params(self.arity.saturating_sub(1)), params(1))
            }
            SignatureKind::Initializer => format!("init {}({})", self.name, params(self.arity)),
        }
    }

    /// Parses a canonical string back into a [`Signature`].
    ///
    /// Round-trips with [`Signature::canonical`]: `parse(s).canonical() == s`
    /// for every string `s` this function produces.
    pub fn parse(s: &str) -> Option<Signature> {
        if let Some(rest) = s.strip_prefix("init ") {
            let (name, arity) = parse_call(rest)?;
            return Some(Signature::new(name, SignatureKind::Initializer, arity));
        }
        if let Some(rest) = s.strip_prefix('[') {
            if let Some((inside, after)) = rest.split_once(']') {
                let getter_arity = count_params(inside);
                if let Some(setter_rest) = after.strip_prefix("=(") {
                    let setter_rest = setter_rest.strip_suffix(')')?;
                    let setter_arity = count_params(setter_rest);
                    return Some(Signature::new(
                        String::new(),
                        SignatureKind::SubscriptSetter,
                        getter_arity + setter_arity,
                    ));
                }
                if after.is_empty() {
                    return Some(Signature::new(String::new(), SignatureKind::Subscript, getter_arity));
                }
            }
            return None;
        }
        if let Some((name, rest)) = s.split_once("=(") {
            let rest = rest.strip_suffix(')')?;
            if count_params(rest) == 1 {
                return Some(Signature::new(name, SignatureKind::Setter, 1));
            }
            return None;
        }
        if s.contains('(') {
            let (name, arity) = parse_call(s)?;
            return Some(Signature::new(name, SignatureKind::Method, arity));
        }
        Some(Signature::new(s, SignatureKind::Getter, 0))
    }

    /// The 64-bit dispatch id, derived from the canonical string.
    pub fn id(&self) -> SignatureId {
        SignatureId(hash_string(self.canonical().as_bytes(), seed()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

fn parse_call(s: &str) -> Option<(String, u8)> {
    let (name, rest) = s.split_once('(')?;
    let rest = rest.strip_suffix(')')?;
    Some((name.to_string(), count_params(rest)))
}

fn count_params(s: &str) -> u8 {
    if s.is_empty() {
        0
    } else {
        s.split(',').count() as u8
    }
}

/// Hashed method-dispatch identifier. Collisions across 10^6 distinct
/// signatures are treated as acceptable (probability ~1e-6); a colliding
/// pair also needs a shared receiver class to cause a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignatureId(pub u64);

impl fmt::Display for SignatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Seed used for every signature-id hash: `hash("signature id", 0)`.
fn seed() -> u64 {
    hash_string(b"signature id", 0)
}

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

fn rotl64(x: u64, r: u32) -> u64 {
    x.rotate_left(r)
}

fn final_mix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

/// Murmur3-like 64-bit hash over raw bytes, seeded. A two-lane (h1/h2) mix,
/// each lane finalized independently and then combined into a single 64-bit
/// output — only `h1` is returned, since the two are mixed thoroughly enough
/// by that point that XOR-ing them back together wouldn't add randomness.
pub fn hash_data(data: &[u8], seed: u64) -> u64 {
    let mut h1 = seed;
    let mut h2 = seed;
    let nblocks = data.len() / 16;

    for i in 0..nblocks {
        let base = i * 16;
        let mut k1 = u64::from_le_bytes(data[base..base + 8].try_into().unwrap());
        let mut k2 = u64::from_le_bytes(data[base + 8..base + 16].try_into().unwrap());

        k1 = k1.wrapping_mul(C1);
        k1 = rotl64(k1, 31);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;

        h1 = rotl64(h1, 27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2);
        k2 = rotl64(k2, 33);
        k2 = k2.wrapping_mul(C1);
        h2 ^= k2;

        h2 = rotl64(h2, 31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x3849_5ab5);
    }

    // Tail: a single 16-byte block, zero-padded, rather than folding the
    // trailing bytes onto a shared 8-byte lane (that would lose information
    // for 9-15 byte tails).
    let tail_start = nblocks * 16;
    let tail = &data[tail_start..];
    let mut tail_block = [0u8; 16];
    tail_block[..tail.len()].copy_from_slice(tail);
    let mut k1 = u64::from_le_bytes(tail_block[0..8].try_into().unwrap());
    let mut k2 = u64::from_le_bytes(tail_block[8..16].try_into().unwrap());

    k2 = k2.wrapping_mul(C2);
    k2 = rotl64(k2, 33);
    k2 = k2.wrapping_mul(C1);
    h2 ^= k2;

    k1 = k1.wrapping_mul(C1);
    k1 = rotl64(k1, 31);
    k1 = k1.wrapping_mul(C2);
    h1 ^= k1;

    let len = data.len() as u64;
    h1 ^= len;
    h2 ^= len;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = final_mix64(h1);
    h2 = final_mix64(h2);

    h1.wrapping_add(h2)
}

/// Convenience wrapper over [`hash_data`] for UTF-8 text.
pub fn hash_string(s: &[u8], seed: u64) -> u64 {
    hash_data(s, seed)
}

/// Finds the dispatch id for a signature already in canonical string form.
pub fn find_signature_id(canonical: &str) -> SignatureId {
    SignatureId(hash_string(canonical.as_bytes(), seed()))
}
