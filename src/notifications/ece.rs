//! WebPush message decryption (RFC 8291 over RFC 8188 `aes128gcm`).
//!
//! # Record Layout
//!
//! ```text
//! salt (16) | rs (4, big-endian) | idlen (1) | keyid (idlen) | ciphertext
//! ```
//!
//! `keyid` carries the sender's ephemeral P-256 public key. Decryption:
//!
//! 1. ECDH(client private, sender public) -> shared secret
//! 2. HKDF(salt = auth secret, ikm = shared secret,
//!    info = "WebPush: info\0" || client public || sender public) -> 32-byte IKM
//! 3. HKDF(salt = record salt, ikm = IKM) expanded with
//!    "Content-Encoding: aes128gcm\0" -> 16-byte CEK
//!    and "Content-Encoding: nonce\0" -> 12-byte nonce
//! 4. AES-128-GCM open, then strip the `0x02` delimiter and trailing padding
//!
//! Pure functions only: no state, no I/O.

// Rust guideline compliant 2026-02

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use p256::PublicKey;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::subscription::PushSubscription;
use crate::error::CryptoError;

/// Salt length in the record header.
pub const SALT_LEN: usize = 16;

/// Fixed header bytes before the key id: salt, record size, key-id length.
const HEADER_LEN: usize = SALT_LEN + 4 + 1;

/// Uncompressed P-256 point length.
const UNCOMPRESSED_POINT_LEN: usize = 65;

/// SEC1 tag of an uncompressed point.
const UNCOMPRESSED_TAG: u8 = 0x04;

/// AES-GCM authentication tag length.
const TAG_LEN: usize = 16;

/// Smallest accepted record: header plus an uncompressed key id.
pub const MIN_RECORD_LEN: usize = HEADER_LEN + UNCOMPRESSED_POINT_LEN;

/// Delimiter that ends application data inside the final record.
pub const PADDING_DELIMITER: u8 = 0x02;

const KEY_INFO_LABEL: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

const IKM_LEN: usize = 32;
const CEK_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Borrowed view over one encrypted record.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedRecord<'a> {
    /// Per-record HKDF salt.
    pub salt: &'a [u8; SALT_LEN],
    /// Declared record size.
    pub record_size: u32,
    /// Sender public key bytes.
    pub key_id: &'a [u8],
    /// AES-GCM ciphertext including the tag.
    pub ciphertext: &'a [u8],
}

impl<'a> EncryptedRecord<'a> {
    /// Split raw payload bytes into the record fields.
    ///
    /// Rejects anything shorter than [`MIN_RECORD_LEN`] before touching the
    /// header, and any key-id length that would run past the buffer.
    pub fn parse(payload: &'a [u8]) -> Result<Self, CryptoError> {
        if payload.len() < MIN_RECORD_LEN {
            return Err(CryptoError::MalformedRecord(format!(
                "record is {} bytes, need at least {}",
                payload.len(),
                MIN_RECORD_LEN
            )));
        }

        let (salt, rest) = payload.split_at(SALT_LEN);
        let salt: &[u8; SALT_LEN] = salt
            .try_into()
            .map_err(|_slice_err| CryptoError::MalformedRecord("salt".to_string()))?;
        let record_size = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        let key_id_len = usize::from(rest[4]);

        let key_id_end = HEADER_LEN + key_id_len;
        if key_id_end > payload.len() {
            return Err(CryptoError::MalformedRecord(format!(
                "key id length {} overruns {}-byte record",
                key_id_len,
                payload.len()
            )));
        }

        let ciphertext = &payload[key_id_end..];
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::MalformedRecord(format!(
                "ciphertext is {} bytes, shorter than the tag",
                ciphertext.len()
            )));
        }

        Ok(Self {
            salt,
            record_size,
            key_id: &payload[HEADER_LEN..key_id_end],
            ciphertext,
        })
    }
}

/// Content-encryption key and nonce for one record.
pub(crate) struct ContentKeys {
    pub(crate) cek: Zeroizing<[u8; CEK_LEN]>,
    pub(crate) nonce: [u8; NONCE_LEN],
}

/// Parse and decrypt a raw payload for `subscription`.
pub fn decrypt_payload(
    payload: &[u8],
    subscription: &PushSubscription,
) -> Result<Vec<u8>, CryptoError> {
    let record = EncryptedRecord::parse(payload)?;
    decrypt(&record, subscription)
}

/// Decrypt one record with the subscription's key pair and auth secret.
///
/// Returns the application data with the padding delimiter and trailing
/// padding removed. A failed tag check yields
/// [`CryptoError::AuthenticationFailure`] and no plaintext.
pub fn decrypt(
    record: &EncryptedRecord<'_>,
    subscription: &PushSubscription,
) -> Result<Vec<u8>, CryptoError> {
    // Only the uncompressed form is accepted; its bytes feed the key info as received.
    if record.key_id.len() != UNCOMPRESSED_POINT_LEN || record.key_id[0] != UNCOMPRESSED_TAG {
        return Err(CryptoError::KeyAgreement);
    }
    let sender =
        PublicKey::from_sec1_bytes(record.key_id).map_err(|_invalid| CryptoError::KeyAgreement)?;

    let shared = p256::ecdh::diffie_hellman(
        subscription.client_secret().to_nonzero_scalar(),
        sender.as_affine(),
    );

    let client_public = subscription.client_public_bytes();

    let keys = derive_content_keys(
        shared.raw_secret_bytes().as_slice(),
        subscription.auth_secret(),
        &client_public,
        record.key_id,
        record.salt,
    )?;

    let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&keys.cek[..]));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&keys.nonce), record.ciphertext)
        .map_err(|_tag| CryptoError::AuthenticationFailure)?;

    Ok(strip_padding(plaintext))
}

/// Run the key schedule from the ECDH secret down to the CEK and nonce.
pub(crate) fn derive_content_keys(
    shared_secret: &[u8],
    auth_secret: &[u8],
    client_public: &[u8],
    sender_public: &[u8],
    salt: &[u8],
) -> Result<ContentKeys, CryptoError> {
    let key_hkdf = Hkdf::<Sha256>::new(Some(auth_secret), shared_secret);
    let mut ikm = Zeroizing::new([0u8; IKM_LEN]);
    key_hkdf
        .expand_multi_info(&[KEY_INFO_LABEL, client_public, sender_public], &mut ikm[..])
        .map_err(|_len| CryptoError::KeyDerivationShort { requested: IKM_LEN })?;

    let content_hkdf = Hkdf::<Sha256>::new(Some(salt), &ikm[..]);

    let mut cek = Zeroizing::new([0u8; CEK_LEN]);
    content_hkdf
        .expand(CEK_INFO, &mut cek[..])
        .map_err(|_len| CryptoError::KeyDerivationShort { requested: CEK_LEN })?;

    let mut nonce = [0u8; NONCE_LEN];
    content_hkdf
        .expand(NONCE_INFO, &mut nonce)
        .map_err(|_len| CryptoError::KeyDerivationShort { requested: NONCE_LEN })?;

    Ok(ContentKeys { cek, nonce })
}

/// Truncate at the last [`PADDING_DELIMITER`]. No delimiter: unchanged.
pub fn strip_padding(mut plaintext: Vec<u8>) -> Vec<u8> {
    if let Some(index) = plaintext.iter().rposition(|&b| b == PADDING_DELIMITER) {
        plaintext.truncate(index);
    }
    plaintext
}

/// Sender-side mirror of [`decrypt`] for tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use p256::SecretKey;

    /// Encrypt `plaintext` for `subscription` with a fresh sender key and `salt`.
    pub(crate) fn encrypt_for(
        subscription: &PushSubscription,
        plaintext: &[u8],
        salt: [u8; SALT_LEN],
    ) -> Vec<u8> {
        let sender = SecretKey::random(&mut OsRng);
        let sender_public = sender.public_key().to_encoded_point(false);
        let shared = p256::ecdh::diffie_hellman(
            sender.to_nonzero_scalar(),
            subscription.client_public().as_affine(),
        );

        let keys = derive_content_keys(
            shared.raw_secret_bytes().as_slice(),
            subscription.auth_secret(),
            &subscription.client_public_bytes(),
            sender_public.as_bytes(),
            &salt,
        )
        .unwrap();

        let mut padded = plaintext.to_vec();
        padded.push(PADDING_DELIMITER);
        let cipher = Aes128Gcm::new(Key::<Aes128Gcm>::from_slice(&keys.cek[..]));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&keys.nonce), padded.as_slice())
            .unwrap();

        let mut record = Vec::new();
        record.extend_from_slice(&salt);
        record.extend_from_slice(&4096u32.to_be_bytes());
        record.push(sender_public.as_bytes().len() as u8);
        record.extend_from_slice(sender_public.as_bytes());
        record.extend_from_slice(&ciphertext);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::encrypt_for;
    use super::*;
    use p256::elliptic_curve::rand_core::OsRng;
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use p256::SecretKey;

    /// RFC 8291 section 5 example.
    fn rfc8291_subscription() -> PushSubscription {
        let ua_private =
            hex::decode("ab5757a70dd4a53e553a6bbf71ffefea2874ec07a6b379e3c48f895a02dc33de")
                .unwrap();
        let auth: [u8; 16] = hex::decode("05305932a1c7eabe13b6cec9fda48882")
            .unwrap()
            .try_into()
            .unwrap();
        PushSubscription::from_parts(
            "rfc8291",
            "",
            SecretKey::from_slice(&ua_private).unwrap(),
            auth,
        )
    }

    const RFC8291_RECORD: &str = "0c6bfaadad67958803092d454676f397000010004104fe33f4ab0dea71914db55823f73b54948f41306d920732dbb9a59a53286482200e597a7b7bc260ba1c227998580992e93973002f3012a28ae8f06bbb78e5ec0ff297de5b429bba7153d3a4ae0caa091fd425f3b4b5414add8ab37a19c1bbb05cf5cb5b2a2e0562d558635641ec52812c6c8ff42e95ccb86be7cd";

    #[test]
    fn test_rfc8291_known_answer() {
        let sub = rfc8291_subscription();
        assert_eq!(
            hex::encode(sub.client_public_bytes()),
            "042571b2becdfde360551aaf1ed0f4cd366c11cebe555f89bcb7b186a53339173168ece2ebe018597bd30479b86e3c8f8eced577ca59187e9246990db682008b0e"
        );

        let payload = hex::decode(RFC8291_RECORD).unwrap();
        let plaintext = decrypt_payload(&payload, &sub).unwrap();
        assert_eq!(plaintext, b"When I grow up, I want to be a watermelon");
    }

    #[test]
    fn test_parse_rfc8291_header() {
        let payload = hex::decode(RFC8291_RECORD).unwrap();
        let record = EncryptedRecord::parse(&payload).unwrap();
        assert_eq!(record.record_size, 4096);
        assert_eq!(record.key_id.len(), 65);
        assert_eq!(record.key_id[0], 0x04);
        assert_eq!(record.ciphertext.len(), payload.len() - 86);
    }

    #[test]
    fn test_roundtrip_random_keys() {
        for salt_byte in [0u8, 7, 255] {
            let sub = PushSubscription::generate("key");
            let record = encrypt_for(&sub, b"hello push", [salt_byte; SALT_LEN]);
            assert_eq!(decrypt_payload(&record, &sub).unwrap(), b"hello push");
        }
    }

    #[test]
    fn test_short_record_rejected() {
        let sub = PushSubscription::generate("key");
        assert!(matches!(
            decrypt_payload(&[0u8; 10], &sub),
            Err(CryptoError::MalformedRecord(_))
        ));
        assert!(matches!(
            decrypt_payload(&[0u8; MIN_RECORD_LEN - 1], &sub),
            Err(CryptoError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_key_id_overrun_rejected() {
        let mut payload = vec![0u8; MIN_RECORD_LEN];
        payload[20] = 255;
        assert!(matches!(
            EncryptedRecord::parse(&payload),
            Err(CryptoError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_invalid_sender_key() {
        let sub = PushSubscription::generate("key");
        let mut record = encrypt_for(&sub, b"data", [1; SALT_LEN]);
        // Keep the uncompressed tag but move the point off the curve.
        record[HEADER_LEN + 1] ^= 0xff;
        record[HEADER_LEN + 2] ^= 0xff;
        assert!(matches!(
            decrypt_payload(&record, &sub),
            Err(CryptoError::KeyAgreement)
        ));
    }

    #[test]
    fn test_compressed_sender_key_rejected() {
        let sub = PushSubscription::generate("key");
        let sender = SecretKey::random(&mut OsRng);
        let compressed = sender.public_key().to_encoded_point(true);
        assert_eq!(compressed.as_bytes().len(), 33);

        let mut record = vec![1u8; SALT_LEN];
        record.extend_from_slice(&4096u32.to_be_bytes());
        record.push(33);
        record.extend_from_slice(compressed.as_bytes());
        record.extend_from_slice(&[0u8; 40]);

        assert!(matches!(
            decrypt_payload(&record, &sub),
            Err(CryptoError::KeyAgreement)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_authentication() {
        let sub = PushSubscription::generate("key");
        let record = encrypt_for(&sub, b"do not touch", [3; SALT_LEN]);
        let ciphertext_start = MIN_RECORD_LEN;

        for index in ciphertext_start..record.len() {
            let mut tampered = record.clone();
            tampered[index] ^= 0x01;
            assert!(
                matches!(
                    decrypt_payload(&tampered, &sub),
                    Err(CryptoError::AuthenticationFailure)
                ),
                "byte {index} flip was not detected"
            );
        }
    }

    #[test]
    fn test_tampered_salt_fails_authentication() {
        let sub = PushSubscription::generate("key");
        let mut record = encrypt_for(&sub, b"salted", [9; SALT_LEN]);
        record[0] ^= 0x80;
        assert!(matches!(
            decrypt_payload(&record, &sub),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_wrong_subscription_fails_authentication() {
        let sub = PushSubscription::generate("key");
        let other = PushSubscription::generate("key");
        let record = encrypt_for(&sub, b"for sub only", [5; SALT_LEN]);
        assert!(matches!(
            decrypt_payload(&record, &other),
            Err(CryptoError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_strip_padding() {
        assert_eq!(strip_padding(vec![0x68, 0x69, 0x02, 0x00, 0x00]), vec![0x68, 0x69]);
        assert_eq!(strip_padding(vec![0x68, 0x69]), vec![0x68, 0x69]);
        assert_eq!(strip_padding(vec![0x02, 0x41, 0x02, 0x00]), vec![0x02, 0x41]);
        assert!(strip_padding(vec![0x02]).is_empty());
    }

    #[test]
    fn test_plaintext_containing_delimiter_uses_last() {
        let sub = PushSubscription::generate("key");
        let record = encrypt_for(&sub, &[0x61, 0x02, 0x62], [2; SALT_LEN]);
        assert_eq!(decrypt_payload(&record, &sub).unwrap(), vec![0x61, 0x02, 0x62]);
    }
}
