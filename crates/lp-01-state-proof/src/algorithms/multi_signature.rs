//! # BLS Multi-Signature (BLS12-381)
//!
//! Checks the aggregated signature validators put on a state root.
//!
//! ## Notes
//!
//! - Signatures are on G1 (48 bytes compressed)
//! - Public keys are on G2 (96 bytes compressed)
//! - Keys are `sk * g` for a pool-wide generator `g` that need not be the
//!   standard one, so the pairing equation is evaluated directly:
//!   `e(sig, g) == e(H(m), Σ pk)`.
//! - The safe `blst::min_sig` API (`PublicKey`, `Signature::verify`,
//!   `AggregatePublicKey`) pairs against the standard G2 generator only, so
//!   it cannot check keys under a custom `g`. This module calls the raw
//!   `blst_*` functions instead. Every `unsafe` block passes pointers to
//!   points owned by the calling frame.

use std::collections::{BTreeMap, BTreeSet};

use blst::{
    blst_final_exp, blst_fp12, blst_fp12_is_equal, blst_hash_to_g1, blst_miller_loop, blst_p1,
    blst_p1_affine, blst_p1_affine_in_g1, blst_p1_affine_is_inf, blst_p1_deserialize,
    blst_p1_to_affine, blst_p2, blst_p2_add_or_double_affine, blst_p2_affine,
    blst_p2_affine_compress, blst_p2_affine_generator, blst_p2_affine_in_g2,
    blst_p2_affine_is_inf, blst_p2_deserialize, blst_p2_from_affine, blst_p2_to_affine,
    BLST_ERROR,
};
use shared_types::{NodeAlias, VerificationKey};
use tracing::debug;

use crate::domain::BlsGenerator;

/// Domain separation tag for hashing messages to G1.
pub const DST: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_POP_";

/// Compressed standard G2 generator.
pub fn standard_generator() -> [u8; 96] {
    let mut out = [0u8; 96];
    // SAFETY: blst returns a pointer to a static, valid affine point and
    // `out` has room for a compressed G2 point.
    unsafe { blst_p2_affine_compress(out.as_mut_ptr(), blst_p2_affine_generator()) };
    out
}

/// Decode and subgroup-check a G1 point (48 or 96 bytes).
pub(crate) fn decode_g1(bytes: &[u8]) -> Option<blst_p1_affine> {
    if bytes.len() != 48 && bytes.len() != 96 {
        return None;
    }
    let mut point = blst_p1_affine::default();
    // SAFETY: length checked above; blst reads 48 bytes for a compressed
    // point and 96 otherwise, as flagged in the first byte.
    let err = unsafe { blst_p1_deserialize(&mut point, bytes.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return None;
    }
    // SAFETY: `point` is an initialized affine point.
    let valid = unsafe { blst_p1_affine_in_g1(&point) && !blst_p1_affine_is_inf(&point) };
    valid.then_some(point)
}

/// Decode and subgroup-check a G2 point (96 or 192 bytes).
pub(crate) fn decode_g2(bytes: &[u8]) -> Option<blst_p2_affine> {
    if bytes.len() != 96 && bytes.len() != 192 {
        return None;
    }
    let mut point = blst_p2_affine::default();
    // SAFETY: length checked above, matching the encoding flagged in the
    // first byte.
    let err = unsafe { blst_p2_deserialize(&mut point, bytes.as_ptr()) };
    if err != BLST_ERROR::BLST_SUCCESS {
        return None;
    }
    // SAFETY: `point` is an initialized affine point.
    let valid = unsafe { blst_p2_affine_in_g2(&point) && !blst_p2_affine_is_inf(&point) };
    valid.then_some(point)
}

fn hash_to_g1(message: &[u8]) -> blst_p1_affine {
    let mut projective = blst_p1::default();
    let mut affine = blst_p1_affine::default();
    // SAFETY: all pointers reference live buffers with the lengths passed.
    unsafe {
        blst_hash_to_g1(
            &mut projective,
            message.as_ptr(),
            message.len(),
            DST.as_ptr(),
            DST.len(),
            std::ptr::null(),
            0,
        );
        blst_p1_to_affine(&mut affine, &projective);
    }
    affine
}

fn aggregate_g2(points: &[blst_p2_affine]) -> Option<blst_p2_affine> {
    let (first, rest) = points.split_first()?;
    let mut sum = blst_p2::default();
    // SAFETY: every point is an initialized, subgroup-checked affine point.
    unsafe {
        blst_p2_from_affine(&mut sum, first);
        for point in rest {
            let acc = sum;
            blst_p2_add_or_double_affine(&mut sum, &acc, point);
        }
    }
    let mut affine = blst_p2_affine::default();
    // SAFETY: `sum` is an initialized projective point.
    unsafe { blst_p2_to_affine(&mut affine, &sum) };
    Some(affine)
}

fn pairing(q: &blst_p2_affine, p: &blst_p1_affine) -> blst_fp12 {
    let mut loop_result = blst_fp12::default();
    let mut result = blst_fp12::default();
    // SAFETY: both inputs are initialized, subgroup-checked points.
    unsafe {
        blst_miller_loop(&mut loop_result, q, p);
        blst_final_exp(&mut result, &loop_result);
    }
    result
}

/// Check an aggregated signature over `signed_value`.
///
/// At least `|verkeys| - threshold` distinct known participants are
/// required. Any decode or pairing failure yields `false`.
pub fn verify_multisignature(
    signature: &[u8],
    participating_aliases: &[NodeAlias],
    signed_value: &[u8],
    verkeys: &BTreeMap<NodeAlias, VerificationKey>,
    threshold: usize,
    generator: &BlsGenerator,
) -> bool {
    let participants: BTreeSet<&NodeAlias> = participating_aliases
        .iter()
        .filter(|alias| verkeys.contains_key(*alias))
        .collect();

    let required = verkeys.len().saturating_sub(threshold).max(1);
    if participants.len() < required {
        debug!(
            participants = participants.len(),
            required, "Not enough known signers in multi-signature"
        );
        return false;
    }

    let Some(sig) = decode_g1(signature) else {
        debug!("Multi-signature is not a valid G1 point");
        return false;
    };
    let Some(g) = decode_g2(generator.as_bytes()) else {
        debug!("Generator is not a valid G2 point");
        return false;
    };

    let mut keys = Vec::with_capacity(participants.len());
    for alias in participants {
        match verkeys.get(alias).and_then(|vk| decode_g2(vk.as_bytes())) {
            Some(pk) => keys.push(pk),
            None => {
                debug!(%alias, "Verification key is not a valid G2 point");
                return false;
            }
        }
    }
    let Some(aggregate_pk) = aggregate_g2(&keys) else {
        return false;
    };

    let lhs = pairing(&g, &sig);
    let rhs = pairing(&aggregate_pk, &hash_to_g1(signed_value));
    // SAFETY: both values are initialized field elements.
    unsafe { blst_fp12_is_equal(&lhs, &rhs) }
}
