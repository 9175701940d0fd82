use super::canonical::{SpaceEncoding, canonical_string};
use md5::{Digest, Md5};
use subtle::ConstantTimeEq;

/// Signs and verifies gateway parameter sets.
///
/// Holds the merchant passphrase (absent in gateway modes that do not use
/// one) and the value encoding convention. Signing is pure: the same
/// parameters always produce the same code.
#[derive(Clone)]
pub struct GatewaySigner {
    passphrase: Option<String>,
    encoding: SpaceEncoding,
}

impl std::fmt::Debug for GatewaySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySigner")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl GatewaySigner {
    pub fn new(passphrase: Option<String>, encoding: SpaceEncoding) -> Self {
        Self {
            passphrase: passphrase.filter(|p| !p.is_empty()),
            encoding,
        }
    }

    pub fn encoding(&self) -> SpaceEncoding {
        self.encoding
    }

    /// Compute the lowercase hex MD5 code over the canonical form of `params`.
    pub fn sign<I, K, V>(&self, params: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let canonical = canonical_string(params, self.passphrase.as_deref(), self.encoding);
        hex::encode(Md5::digest(canonical.as_bytes()))
    }

    /// Recompute the code for `params` and compare it to `provided` in
    /// constant time.
    pub fn verify<I, K, V>(&self, params: I, provided: &str) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let expected = self.sign(params);
        let provided = provided.trim().to_ascii_lowercase();
        expected.as_bytes().ct_eq(provided.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> Vec<(&'static str, &'static str)> {
        vec![
            ("merchant_id", "10000100"),
            ("merchant_key", "46f0cd694581a"),
            ("amount", "1200.00"),
            ("item_name", "Order #1"),
            ("m_payment_id", "SHOP-1-u1"),
        ]
    }

    #[test]
    fn test_known_vector_with_passphrase() {
        let signer = GatewaySigner::new(Some("jt7NOE43FZPn".into()), SpaceEncoding::Plus);
        assert_eq!(signer.sign(sample()), "0f7fc0076148ab5f68b1eaaa45fa3b43");
    }

    #[test]
    fn test_known_vector_without_passphrase() {
        let signer = GatewaySigner::new(None, SpaceEncoding::Plus);
        assert_eq!(signer.sign(sample()), "ad90c6710d918f2498b5aa9b7a04cbb5");
        let empty = GatewaySigner::new(Some(String::new()), SpaceEncoding::Plus);
        assert_eq!(empty.sign(sample()), "ad90c6710d918f2498b5aa9b7a04cbb5");
    }

    #[test]
    fn test_sign_then_verify() {
        let signer = GatewaySigner::new(Some("secret".into()), SpaceEncoding::Percent);
        let code = signer.sign(sample());
        assert!(signer.verify(sample(), &code));
        assert!(signer.verify(sample(), &code.to_ascii_uppercase()));
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let signer = GatewaySigner::new(Some("secret".into()), SpaceEncoding::Plus);
        let mut reversed = sample();
        reversed.reverse();
        let hashed: HashMap<_, _> = sample().into_iter().collect();
        let code = signer.sign(sample());
        assert_eq!(signer.sign(reversed), code);
        assert_eq!(signer.sign(hashed), code);
    }

    #[test]
    fn test_every_single_character_mutation_is_rejected() {
        let signer = GatewaySigner::new(Some("secret".into()), SpaceEncoding::Plus);
        let code = signer.sign(sample());

        for (idx, (_, value)) in sample().iter().enumerate() {
            for pos in 0..value.len() {
                let mut bytes = value.as_bytes().to_vec();
                bytes[pos] = if bytes[pos] == b'x' { b'y' } else { b'x' };
                let mutated = String::from_utf8(bytes).unwrap();

                let mut params: Vec<(&str, String)> = sample()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_owned()))
                    .collect();
                params[idx].1 = mutated;
                assert!(!signer.verify(params, &code));
            }
        }
    }

    #[test]
    fn test_wrong_passphrase_is_rejected() {
        let signer = GatewaySigner::new(Some("secret".into()), SpaceEncoding::Plus);
        let other = GatewaySigner::new(Some("Secret".into()), SpaceEncoding::Plus);
        let code = signer.sign(sample());
        assert!(!other.verify(sample(), &code));
        assert!(!signer.verify(sample(), ""));
    }

    #[test]
    fn test_signature_field_is_ignored_when_verifying() {
        let signer = GatewaySigner::new(None, SpaceEncoding::Plus);
        let code = signer.sign(sample());
        let mut echoed: Vec<(&str, &str)> = sample();
        echoed.push(("signature", code.as_str()));
        assert!(signer.verify(echoed, &code));
    }
}
