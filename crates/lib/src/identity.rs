//! Chat-user identity sent with the handshake, signed with the app's API key.
//!
//! Payload format: `userId_firstName_lastName_profileImageUrl_phoneNo_email`, empty string for
//! missing fields. Signature: lowercase hex HMAC-SHA256 of the payload's UTF-8 bytes.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const FIELD_SEPARATOR: &str = "_";

/// Chat user as configured in `SPRINKL_CHAT_USER`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatUser {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub phone_no: Option<String>,
    pub email: Option<String>,
}

/// Payload and signature as posted in the handshake body (`chatUser`, `chatUserSignature`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedChatUser {
    pub payload: String,
    pub signature: String,
}

impl ChatUser {
    /// Build from a JSON object. Numbers and booleans are stringified; other types count as missing.
    pub fn from_value(v: &Value) -> Self {
        let field = |name: &str| match v.get(name) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            _ => None,
        };
        Self {
            user_id: field("userId"),
            first_name: field("firstName"),
            last_name: field("lastName"),
            profile_image_url: field("profileImageUrl"),
            phone_no: field("phoneNo"),
            email: field("email"),
        }
    }

    /// Canonical payload string the vendor verifies.
    pub fn payload(&self) -> String {
        [
            &self.user_id,
            &self.first_name,
            &self.last_name,
            &self.profile_image_url,
            &self.phone_no,
            &self.email,
        ]
        .iter()
        .map(|f| f.as_deref().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
    }

    /// Sign the payload with `secret`.
    pub fn sign(&self, secret: &str) -> SignedChatUser {
        let payload = self.payload();
        let signature = hmac_sha256_hex(secret, &payload);
        SignedChatUser { payload, signature }
    }
}

fn hmac_sha256_hex(secret: &str, message: &str) -> String {
    // Keys longer than the block size are hashed, shorter ones padded.
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_keeps_field_order_and_blanks() {
        let user = ChatUser::from_value(&json!({
            "email": "ada@example.com",
            "userId": "u-1",
            "lastName": "Lovelace",
            "phoneNo": 5551234
        }));
        assert_eq!(user.payload(), "u-1__Lovelace__5551234_ada@example.com");
    }

    #[test]
    fn empty_user_is_all_separators() {
        assert_eq!(ChatUser::default().payload(), "_____");
    }

    #[test]
    fn signature_matches_rfc4231_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let sig = hmac_sha256_hex("Jefe", "what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn sign_returns_payload_and_hex_signature() {
        let user = ChatUser {
            user_id: Some("u-1".to_string()),
            ..Default::default()
        };
        let signed = user.sign("secret");
        assert_eq!(signed.payload, "u-1_____");
        assert_eq!(signed.signature.len(), 64);
        assert!(signed.signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(signed, user.sign("secret"));
        assert_ne!(signed.signature, user.sign("other").signature);
    }

    #[test]
    fn empty_and_oversized_secrets_sign() {
        let user = ChatUser::default();
        assert_eq!(user.sign("").signature.len(), 64);
        let long = "k".repeat(200);
        assert_ne!(user.sign(&long).signature, user.sign("").signature);
    }
}
