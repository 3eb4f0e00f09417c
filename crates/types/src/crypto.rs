//! Signing primitives.
//!
//! Signing is pluggable: the engine and pipeline authenticate committee
//! messages through the [`MessageAuthenticator`] trait and check verifier
//! attestation signatures through [`ProofVerifier`]. The default committee
//! authenticator uses Ed25519 with per-node keys derived deterministically
//! from node identifiers, so every committee member can compute every peer's
//! verifying key without key exchange.

use crate::identifiers::NodeId;
use crate::proof::QosProof;
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Domain separator for deriving a node's signing key from its identifier.
const NODE_KEY_DOMAIN: &[u8] = b"veriqo-node-key-v1:";

/// Ed25519 keypair for committee message signing.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Create a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Derive the deterministic keypair for a committee node.
    ///
    /// The derivation hashes the node id with a domain separator and uses the
    /// digest as the Ed25519 seed. Peers derive the same key from the same
    /// id, which is what lets a fixed-membership committee verify signatures
    /// without a key-exchange protocol.
    pub fn derive_for_node(node_id: &NodeId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(NODE_KEY_DOMAIN);
        hasher.update(node_id.as_str().as_bytes());
        let seed: [u8; 32] = hasher.finalize().into();
        Self::from_seed(&seed)
    }

    /// The verifying half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing.verifying_key())
    }

    /// Sign a message, returning the signature hex-encoded.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.signing.verifying_key().as_bytes()))
            .finish()
    }
}

/// Ed25519 verifying key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Verify a hex-encoded signature over a message.
    pub fn verify(&self, message: &[u8], signature_hex: &str) -> bool {
        let Ok(bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes) else {
            return false;
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        self.0.verify(message, &signature).is_ok()
    }
}

/// Signs outgoing committee messages and verifies peers' signatures.
///
/// Implementations must be cheap to call from the node's event loop.
pub trait MessageAuthenticator: Send + Sync {
    /// Sign a message on behalf of the local node.
    fn sign(&self, message: &[u8]) -> String;

    /// Verify a signature claimed by `sender`.
    fn verify(&self, sender: &NodeId, message: &[u8], signature: &str) -> bool;
}

/// Ed25519 authenticator for a fixed-membership committee.
///
/// Holds the local signing key and the derived verifying keys of every
/// committee member. Unknown senders always fail verification.
pub struct CommitteeAuthenticator {
    keypair: KeyPair,
    peers: HashMap<NodeId, PublicKey>,
}

impl CommitteeAuthenticator {
    /// Build the authenticator for `local` within `committee`.
    ///
    /// `committee` must include the local node.
    pub fn derive(local: &NodeId, committee: &[NodeId]) -> Self {
        let peers = committee
            .iter()
            .map(|id| (id.clone(), KeyPair::derive_for_node(id).public_key()))
            .collect();
        Self {
            keypair: KeyPair::derive_for_node(local),
            peers,
        }
    }
}

impl MessageAuthenticator for CommitteeAuthenticator {
    fn sign(&self, message: &[u8]) -> String {
        self.keypair.sign(message)
    }

    fn verify(&self, sender: &NodeId, message: &[u8], signature: &str) -> bool {
        match self.peers.get(sender) {
            Some(key) => key.verify(message, signature),
            None => false,
        }
    }
}

/// Verifies a verifier's attestation signature.
///
/// The committee does not mandate a verifier signature scheme; deployments
/// plug in whatever their verifier fleet uses.
pub trait ProofVerifier: Send + Sync {
    fn verify(&self, proof: &QosProof) -> bool;
}

/// Accepts any attestation carrying a non-empty signature.
///
/// Stands in for deployments whose verifier keys are not distributed to the
/// committee. Structural emptiness is still rejected upstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceProofVerifier;

impl ProofVerifier for PresenceProofVerifier {
    fn verify(&self, proof: &QosProof) -> bool {
        !proof.signature.is_empty()
    }
}
