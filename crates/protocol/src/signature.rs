//! EIP-191 approval signatures.
//!
//! A seller authorizes freezing (and later transferring) their tokens by
//! signing a canonical JSON payload. The payload bytes must match the signer
//! UI bit for bit: four-space indentation, fixed key order.

use alloy_primitives::{hex, keccak256};
use ierc_types::{protocol::SIGNATURE_TITLE, ErrCode, ProtocolError};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SECP256K1
};
use serde::Serialize;

/// The payload a seller signed when approving a one-shot trade.
#[derive(Debug, Clone)]
pub struct Approval {
    pub signer: String,
    pub to:     String,
    pub tick:   String,
    pub amt:    String,
    pub value:  String,
    pub nonce:  String
}

#[derive(Serialize)]
struct ApprovalPayload<'a> {
    title: &'static str,
    to:    &'a str,
    tick:  &'a str,
    amt:   &'a str,
    value: &'a str,
    nonce: &'a str
}

impl Approval {
    pub fn new(
        tick: impl Into<String>,
        signer: impl Into<String>,
        to: impl Into<String>,
        amt: impl Into<String>,
        value: impl Into<String>,
        nonce: impl Into<String>
    ) -> Self {
        Self {
            signer: signer.into(),
            to:     to.into(),
            tick:   tick.into(),
            amt:    amt.into(),
            value:  value.into(),
            nonce:  nonce.into()
        }
    }

    /// The canonical JSON message the wallet displayed for signing.
    pub fn message(&self) -> String {
        let payload = ApprovalPayload {
            title: SIGNATURE_TITLE,
            to:    &self.to,
            tick:  &self.tick,
            amt:   &self.amt,
            value: &self.value,
            nonce: &self.nonce
        };

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        payload
            .serialize(&mut serializer)
            .expect("approval payload always serializes");

        String::from_utf8(buf).expect("serde_json emits utf-8")
    }

    /// Recovers the signing address from a 65-byte hex signature and checks
    /// it against `signer` (which must already be lowercase).
    pub fn verify(&self, signature: &str) -> Result<(), ProtocolError> {
        if signature.is_empty() || !signature.to_lowercase().starts_with("0x") {
            return Err(ProtocolError::new(ErrCode::InvalidSignature, "invalid sign format"));
        }

        let sig = hex::decode(&signature[2..]).map_err(|_| {
            ProtocolError::new(ErrCode::InvalidSignature, "signature is an invalid hex string")
        })?;

        if sig.len() != 65 {
            return Err(ProtocolError::new(
                ErrCode::InvalidSignature,
                "signature is not of proper length"
            ));
        }

        let mut v = sig[64];
        if v > 1 {
            v -= 27;
        }
        let recovery_id = RecoveryId::from_i32(v as i32)
            .map_err(|err| ProtocolError::new(ErrCode::InvalidSignature, err.to_string()))?;
        let recoverable = RecoverableSignature::from_compact(&sig[..64], recovery_id)
            .map_err(|err| ProtocolError::new(ErrCode::InvalidSignature, err.to_string()))?;

        let message = self.message();
        let digest = keccak256(format!(
            "\x19Ethereum Signed Message:\n{}{}",
            message.len(),
            message
        ));

        let digest = Message::from_digest_slice(digest.as_slice())
            .map_err(|err| ProtocolError::new(ErrCode::InvalidSignature, err.to_string()))?;
        let public_key = SECP256K1
            .recover_ecdsa(&digest, &recoverable)
            .map_err(|err| ProtocolError::new(ErrCode::InvalidSignature, err.to_string()))?;

        let key_hash = keccak256(&public_key.serialize_uncompressed()[1..]);
        let address = format!("0x{}", hex::encode(&key_hash[12..]));

        if address != self.signer {
            return Err(ProtocolError::new(ErrCode::SignatureNotMatch, "signature not match"));
        }

        Ok(())
    }
}
