//! RSA key operations.
//!
//! The service uses RSA-2048 with the non-standard public exponent e=3,
//! and serialises key material as length-prefixed MPIs. The private key
//! is stored server-side wrapped with the master key; the challenge
//! session id (CSID) is an RSA ciphertext that yields the session id.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::Rng;

use crate::base64::{base64url_decode, base64url_encode};
use crate::crypto::aes::{aes128_ecb_decrypt, aes128_ecb_encrypt};
use crate::crypto::buffer::{align_buf, slice_buf};
use crate::error::{MegaError, Result};

/// Length of the plaintext session id inside a decrypted CSID.
const SID_LEN: usize = 43;

/// RSA keypair in the service's component form.
#[derive(Debug, Clone)]
pub struct MegaRsaKey {
    /// Prime factor p
    pub p: BigUint,
    /// Prime factor q
    pub q: BigUint,
    /// Private exponent d
    pub d: BigUint,
    /// CRT coefficient p^-1 mod q
    pub u: BigUint,
    /// Modulus n = p * q
    pub m: BigUint,
    /// Public exponent (always 3)
    pub e: BigUint,
}

impl MegaRsaKey {
    /// Generate a new 2048-bit keypair with e=3.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let e = BigUint::from(3u32);

        // Both primes must satisfy p ≡ 2 (mod 3) so that gcd(e, p-1) = 1.
        let p = generate_prime_for_e3(&mut rng, 1024)?;
        let q = generate_prime_for_e3(&mut rng, 1024)?;

        let m = &p * &q;
        let phi = (&p - 1u32) * (&q - 1u32);

        let d = mod_inverse(&e, &phi)
            .ok_or_else(|| MegaError::Crypto("no modular inverse for private exponent".into()))?;
        let u = mod_inverse(&p, &q)
            .ok_or_else(|| MegaError::Crypto("no modular inverse for CRT coefficient".into()))?;

        Ok(Self { p, q, d, u, m, e })
    }

    /// Whether the private components are available.
    pub fn has_private(&self) -> bool {
        !self.p.is_zero() && !self.q.is_zero()
    }

    /// Encode the public key as `MPI(m) || MPI(e)`, base64.
    pub fn encode_public_key(&self) -> String {
        let mut data = Vec::new();
        append_mpi(&mut data, &self.m);
        append_mpi(&mut data, &self.e);
        base64url_encode(&data)
    }

    /// Decode a public key from its `MPI(m) || MPI(e)` base64 form.
    ///
    /// The private components are left zeroed.
    pub fn from_encoded_public_key(b64: &str) -> Result<Self> {
        let data = base64url_decode(b64)?;
        let mut pos = 0;
        let m = read_mpi(&data, &mut pos)?;
        let e = read_mpi(&data, &mut pos)?;

        Ok(Self {
            m,
            e,
            p: BigUint::zero(),
            q: BigUint::zero(),
            d: BigUint::zero(),
            u: BigUint::zero(),
        })
    }

    /// Raw private key material: `MPI(p) || MPI(q) || MPI(d) || MPI(u)`.
    pub fn private_key_bytes(&self) -> Vec<u8> {
        let mut data = Vec::new();
        append_mpi(&mut data, &self.p);
        append_mpi(&mut data, &self.q);
        append_mpi(&mut data, &self.d);
        append_mpi(&mut data, &self.u);
        data
    }

    /// Encode the private key wrapped with the master key, base64.
    pub fn encode_private_key(&self, mk: &[u8; 16]) -> String {
        let padded = align_buf(&self.private_key_bytes(), 16, false);
        base64url_encode(&aes128_ecb_encrypt(&padded, mk))
    }

    /// Encrypt a payload under the public key: `c = m^e mod n`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let m = BigUint::from_bytes_be(plaintext);
        mod_pow(&m, &self.e, &self.m).to_bytes_be()
    }

    /// Decrypt an RSA ciphertext (raw big-endian integer).
    ///
    /// Returns `None` on empty input, missing private components, or a
    /// zero result.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        if ciphertext.is_empty() {
            return None;
        }

        let c = BigUint::from_bytes_be(ciphertext);
        let m = if self.has_private() {
            rsa_decrypt_crt(&c, &self.d, &self.p, &self.q, &self.u)
        } else {
            return None;
        };

        let bytes = m.to_bytes_be();
        if bytes.is_empty() {
            return None;
        }
        Some(bytes)
    }

    /// Decrypt a challenge session id.
    ///
    /// The CSID is an MPI-wrapped RSA ciphertext; the first 43 plaintext
    /// bytes, re-encoded as URL base64, are the session id.
    pub fn decrypt_session_id(&self, csid_b64: &str) -> Result<String> {
        let data = base64url_decode(csid_b64)?;
        let mut pos = 0;
        let c = read_mpi(&data, &mut pos)?;

        let plain = rsa_decrypt_crt(&c, &self.d, &self.p, &self.q, &self.u).to_bytes_be();
        if plain.len() < SID_LEN {
            return Err(MegaError::Crypto("decrypted session id too short".into()));
        }

        Ok(base64url_encode(&slice_buf(&plain, 0, SID_LEN)))
    }
}

/// Unwrap and parse a master-key-wrapped private key.
pub fn decrypt_private_key(privk_b64: &str, mk: &[u8; 16]) -> Result<MegaRsaKey> {
    let wrapped = base64url_decode(privk_b64)?;
    if wrapped.is_empty() || wrapped.len() % 16 != 0 {
        return Err(MegaError::Crypto("wrapped private key misaligned".into()));
    }
    parse_raw_private_key(&aes128_ecb_decrypt(&wrapped, mk))
}

/// Parse unwrapped private key material (`MPI(p,q,d,u)`).
pub fn parse_raw_private_key(data: &[u8]) -> Result<MegaRsaKey> {
    let mut pos = 0;
    let p = read_mpi(data, &mut pos)?;
    let q = read_mpi(data, &mut pos)?;
    let d = read_mpi(data, &mut pos)?;
    let u = read_mpi(data, &mut pos)?;

    if p <= BigUint::one() || q <= BigUint::one() || d.is_zero() || u.is_zero() {
        return Err(MegaError::Crypto("degenerate private key component".into()));
    }

    let m = &p * &q;
    Ok(MegaRsaKey {
        p,
        q,
        d,
        u,
        m,
        e: BigUint::from(3u32),
    })
}

/// Append a number in MPI form: 2-byte big-endian bit length, then the
/// big-endian number bytes.
fn append_mpi(buf: &mut Vec<u8>, n: &BigUint) {
    let bytes = n.to_bytes_be();
    let bit_len = if n.is_zero() { 0 } else { n.bits() as u16 };
    buf.extend_from_slice(&bit_len.to_be_bytes());
    if !n.is_zero() {
        buf.extend_from_slice(&bytes);
    }
}

/// Read an MPI from a byte slice, advancing `pos`.
pub fn read_mpi(data: &[u8], pos: &mut usize) -> Result<BigUint> {
    if *pos + 2 > data.len() {
        return Err(MegaError::Crypto("MPI header truncated".into()));
    }

    let bit_len = u16::from_be_bytes([data[*pos], data[*pos + 1]]) as usize;
    let byte_len = (bit_len + 7) / 8;
    *pos += 2;

    if *pos + byte_len > data.len() {
        return Err(MegaError::Crypto("MPI body truncated".into()));
    }

    let value = BigUint::from_bytes_be(&data[*pos..*pos + byte_len]);
    *pos += byte_len;
    Ok(value)
}

/// Generate a random prime p ≡ 2 (mod 3) of the requested bit length.
fn generate_prime_for_e3(rng: &mut impl Rng, bits: usize) -> Result<BigUint> {
    for _ in 0..10000 {
        let mut bytes = vec![0u8; bits / 8];
        rng.fill(&mut bytes[..]);
        bytes[0] |= 0x80;
        let last = bytes.len() - 1;
        bytes[last] |= 0x01;

        let candidate = BigUint::from_bytes_be(&bytes);
        let rem = (&candidate % 3u32).to_u32_digits().first().copied().unwrap_or(0);
        let p = match rem {
            0 => &candidate + 2u32,
            1 => &candidate + 1u32,
            _ => candidate,
        };

        if is_probably_prime(&p, 20) {
            return Ok(p);
        }
    }

    Err(MegaError::Crypto("prime generation exhausted".into()))
}

/// Miller-Rabin probabilistic primality test.
fn is_probably_prime(n: &BigUint, rounds: usize) -> bool {
    if n <= &BigUint::one() {
        return false;
    }
    if n == &BigUint::from(2u32) {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let n_minus_1 = n - 1u32;
    let mut d = n_minus_1.clone();
    let mut r = 0u32;
    while d.is_even() {
        d >>= 1;
        r += 1;
    }

    let mut rng = rand::thread_rng();

    'witness: for _ in 0..rounds {
        let a = loop {
            let bytes: Vec<u8> = (0..n.to_bytes_be().len()).map(|_| rng.gen()).collect();
            let candidate = BigUint::from_bytes_be(&bytes) % n;
            if candidate >= BigUint::from(2u32) && candidate < n_minus_1 {
                break candidate;
            }
        };

        let mut x = mod_pow(&a, &d, n);
        if x.is_one() || x == n_minus_1 {
            continue 'witness;
        }

        for _ in 0..r.saturating_sub(1) {
            x = mod_pow(&x, &BigUint::from(2u32), n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }

        return false;
    }

    true
}

/// base^exp mod modulus.
fn mod_pow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    if modulus.is_one() {
        return BigUint::zero();
    }
    base.modpow(exp, modulus)
}

/// a^-1 mod m via the extended Euclidean algorithm.
fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    use num_bigint::BigInt;
    use num_traits::Signed;

    let mut old_r = BigInt::from(a.clone());
    let mut r = BigInt::from(m.clone());
    let mut old_s = BigInt::one();
    let mut s = BigInt::zero();

    while !r.is_zero() {
        let quotient = &old_r / &r;
        let next_r = &old_r - &quotient * &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &quotient * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }

    if old_r != BigInt::one() {
        return None;
    }
    if old_s.is_negative() {
        old_s += BigInt::from(m.clone());
    }
    old_s.to_biguint()
}

/// RSA decryption with the Chinese Remainder Theorem.
fn rsa_decrypt_crt(
    c: &BigUint,
    d: &BigUint,
    p: &BigUint,
    q: &BigUint,
    u: &BigUint,
) -> BigUint {
    let xp = (c % p).modpow(&(d % (p - 1u32)), p);
    let xq = (c % q).modpow(&(d % (q - 1u32)), q);

    let t = if xq >= xp {
        ((&xq - &xp) * u) % q
    } else {
        let tmp = ((&xp - &xq) * u) % q;
        if tmp.is_zero() {
            tmp
        } else {
            q - tmp
        }
    };

    &t * p + &xp
}
