//! HMAC signing and verification of canonical strings.
//!
//! Signatures travel as lowercase hex. Verification decodes the supplied hex
//! and compares digests with [`Mac::verify_slice`], which runs in constant
//! time.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha512;

use crate::canonical::Canonical;
use crate::models::{CommandParams, HmacAlgorithm};
use crate::validate::{CommandSpec, HMAC_PARAM, PUBLIC_KEY_PARAM, SIGNATURE_PARAM};

type HmacSha1 = Hmac<Sha1>;
type HmacSha512 = Hmac<Sha512>;

/// Computes the hex-encoded HMAC of `canonical` keyed by `secret`.
///
/// This is what a well-behaved client sends as the `sig` parameter.
pub fn sign(canonical: &str, secret: &[u8], algorithm: HmacAlgorithm) -> String {
    let digest = match algorithm {
        HmacAlgorithm::Sha1 => mac_bytes::<HmacSha1>(secret, canonical.as_bytes()),
        HmacAlgorithm::Sha512 => mac_bytes::<HmacSha512>(secret, canonical.as_bytes()),
    };
    hex::encode(digest)
}

/// Client-side helper: adds `pub`, `hmac` and a matching `sig` to `params`.
pub fn sign_command(
    spec: &CommandSpec,
    params: CommandParams,
    public_key: &str,
    secret: &[u8],
    algorithm: HmacAlgorithm,
) -> CommandParams {
    let params = params
        .with(PUBLIC_KEY_PARAM, public_key)
        .with(HMAC_PARAM, algorithm.as_str());
    let canonical = Canonical::for_command(spec, &params);
    let signature = sign(canonical.as_str(), secret, algorithm);
    params.with(SIGNATURE_PARAM, signature)
}

/// Checks `signature` against the HMAC of `canonical`.
///
/// Returns `false` for a signature that is not valid hex.
pub fn verify(canonical: &str, signature: &str, secret: &[u8], algorithm: HmacAlgorithm) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    match algorithm {
        HmacAlgorithm::Sha1 => verify_with::<HmacSha1>(secret, canonical.as_bytes(), &expected),
        HmacAlgorithm::Sha512 => {
            verify_with::<HmacSha512>(secret, canonical.as_bytes(), &expected)
        }
    }
}

fn mac_bytes<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn verify_with<M: Mac + KeyInit>(key: &[u8], data: &[u8], signature: &[u8]) -> bool {
    let Ok(mut mac) = <M as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(data);
    mac.verify_slice(signature).is_ok()
}
