//! BTMiner privileged session: token derivation and AES envelopes.
//!
//! A privileged call fetches a fresh salt/nonce pair from the device,
//! derives `host_passwd_md5` and `host_sign` with md5-crypt, then wraps the
//! command as `{"enc":1,"data":<base64 AES-256-ECB>}`. The AES key is the
//! SHA-256 digest of `host_passwd_md5`. Tokens are never reused.

use std::sync::OnceLock;

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{ApiError, Result};

const BLOCK: usize = 16;

fn salt_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(r"^\s*\$(\d+)\$([\w\./]*)\$").expect("valid salt grammar"))
}

/// md5-crypt `word` with a salt given as `$<id>$<salt>$`.
///
/// Returns the full `$1$<salt>$<hash>` string.
#[allow(deprecated)]
pub fn crypt(word: &str, salt: &str) -> Result<String> {
    let caps = salt_grammar()
        .captures(salt)
        .ok_or_else(|| ApiError::ProtocolConfig(format!("Salt format is not correct: {salt:?}")))?;
    let bare = caps.get(2).map_or("", |m| m.as_str());

    pwhash::md5_crypt::hash_with(format!("$1${bare}$").as_str(), word)
        .map_err(|e| ApiError::ProtocolConfig(format!("md5-crypt failed: {e}")))
}

/// The hash segment of a `$1$<salt>$<hash>` string.
fn hash_segment(crypted: &str) -> Result<String> {
    crypted
        .split('$')
        .nth(3)
        .map(str::to_string)
        .ok_or_else(|| ApiError::ProtocolConfig(format!("Unexpected crypt output: {crypted}")))
}

/// Credentials proving possession of the admin password for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegedToken {
    pub host_sign: String,
    pub host_passwd_md5: String,
}

impl PrivilegedToken {
    pub fn derive(password: &str, salt: &str, time: &str, new_salt: &str) -> Result<Self> {
        let host_passwd_md5 = hash_segment(&crypt(password, &format!("$1${salt}$"))?)?;
        let host_sign = hash_segment(&crypt(
            &format!("{host_passwd_md5}{time}"),
            &format!("$1${new_salt}$"),
        )?)?;
        Ok(Self {
            host_sign,
            host_passwd_md5,
        })
    }

    /// Derive from a `get_token` reply: `{"Msg": {"salt", "time", "newsalt"}}`.
    pub fn from_reply(password: &str, reply: &Value) -> Result<Self> {
        let field = |name: &str| {
            reply["Msg"][name]
                .as_str()
                .ok_or_else(|| ApiError::Command(format!("Token reply missing {name}")))
        };
        Self::derive(password, field("salt")?, field("time")?, field("newsalt")?)
    }

    pub fn aes_key(&self) -> [u8; 32] {
        Sha256::digest(self.host_passwd_md5.as_bytes()).into()
    }

    /// Sign `command` with this token and wrap it for the wire.
    pub fn seal(&self, command: &Value) -> Result<Vec<u8>> {
        let mut signed = command.clone();
        let obj = signed.as_object_mut().ok_or_else(|| {
            ApiError::InvalidParameter("privileged command must be a JSON object".to_string())
        })?;
        obj.insert("token".to_string(), Value::String(self.host_sign.clone()));

        let data = encrypt(&self.aes_key(), &signed)?;
        Ok(serde_json::to_vec(&json!({"enc": 1, "data": data}))?)
    }

    /// Open the `enc` field of a privileged reply.
    pub fn open(&self, ciphertext: &str) -> Result<Value> {
        decrypt(&self.aes_key(), ciphertext)
    }
}

/// JSON-serialize, NUL-pad to the block size, AES-ECB, base64.
pub fn encrypt(key: &[u8; 32], value: &Value) -> Result<String> {
    let mut buf = serde_json::to_vec(value)?;
    let padded = buf.len().div_ceil(BLOCK) * BLOCK;
    buf.resize(padded, 0);

    let cipher = Aes256::new(key.into());
    for chunk in buf.chunks_mut(BLOCK) {
        cipher.encrypt_block(chunk.into());
    }
    Ok(STANDARD.encode(buf))
}

/// Inverse of [`encrypt`]. Whitespace in the base64 text is ignored.
pub fn decrypt(key: &[u8; 32], ciphertext: &str) -> Result<Value> {
    let compact: String = ciphertext.split_whitespace().collect();
    let mut buf = STANDARD
        .decode(compact)
        .map_err(|e| ApiError::Envelope(format!("bad base64: {e}")))?;
    if buf.is_empty() || buf.len() % BLOCK != 0 {
        return Err(ApiError::Envelope(format!(
            "ciphertext length {} is not a multiple of {BLOCK}",
            buf.len()
        )));
    }

    let cipher = Aes256::new(key.into());
    for chunk in buf.chunks_mut(BLOCK) {
        cipher.decrypt_block(chunk.into());
    }

    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    serde_json::from_slice(&buf[..end]).map_err(|e| ApiError::Envelope(format!("bad plaintext: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRYPT_ALPHABET: &str = "./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    #[test]
    fn test_crypt_output_shape() {
        let out = crypt("admin", "$1$BQ5hoXV9$").unwrap();
        assert!(out.starts_with("$1$BQ5hoXV9$"));
        let hash = hash_segment(&out).unwrap();
        assert_eq!(hash.len(), 22);
        assert!(hash.chars().all(|c| CRYPT_ALPHABET.contains(c)));
    }

    #[test]
    fn test_crypt_known_answer() {
        // Matches `openssl passwd -1 -salt BQ5hoXV9 admin`.
        assert_eq!(
            crypt("admin", "$1$BQ5hoXV9$").unwrap(),
            "$1$BQ5hoXV9$RxmaDUO33TS7O26yeMHZ81"
        );
    }

    #[test]
    fn test_crypt_is_deterministic_per_salt() {
        let a = crypt("admin", "$1$saltA$").unwrap();
        let b = crypt("admin", "$1$saltA$").unwrap();
        let c = crypt("admin", "$1$saltB$").unwrap();
        assert_eq!(a, b);
        assert_ne!(hash_segment(&a).unwrap(), hash_segment(&c).unwrap());
    }

    #[test]
    fn test_crypt_accepts_leading_whitespace() {
        assert!(crypt("admin", "  $1$abc$").is_ok());
    }

    #[test]
    fn test_malformed_salt_is_protocol_config_error() {
        for salt in ["abc", "$x$abc$", "$1$abc", "$1$ab#c$"] {
            assert!(
                matches!(crypt("admin", salt), Err(ApiError::ProtocolConfig(_))),
                "salt {salt:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_token_derivation_chains_hashes() {
        let token = PrivilegedToken::derive("admin", "BQ5hoXV9", "7465", "qV4C4nTy").unwrap();
        let expected_md5 = hash_segment(&crypt("admin", "$1$BQ5hoXV9$").unwrap()).unwrap();
        assert_eq!(token.host_passwd_md5, expected_md5);
        let expected_sign =
            hash_segment(&crypt(&format!("{expected_md5}7465"), "$1$qV4C4nTy$").unwrap()).unwrap();
        assert_eq!(token.host_sign, expected_sign);
    }

    #[test]
    fn test_token_from_reply() {
        let reply = json!({
            "STATUS": "S",
            "Code": 134,
            "Msg": {"time": "7465", "salt": "BQ5hoXV9", "newsalt": "qV4C4nTy"}
        });
        let token = PrivilegedToken::from_reply("admin", &reply).unwrap();
        assert_eq!(
            token,
            PrivilegedToken::derive("admin", "BQ5hoXV9", "7465", "qV4C4nTy").unwrap()
        );

        let missing = json!({"STATUS": "S", "Msg": {"salt": "x"}});
        assert!(PrivilegedToken::from_reply("admin", &missing).is_err());
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = [7u8; 32];
        for value in [
            json!({}),
            json!({"cmd": "reboot"}),
            json!({"cmd": "set_led", "color": "red", "period": 2000, "duration": 1000, "start": 0}),
            json!({"cmd": "update_pools", "pool1": "stratum+tcp://pool.example:3333", "worker1": "w.1", "passwd1": "x"}),
            json!([1, 2.5, "é", null, true]),
            json!("exactly sixteen!"),
        ] {
            let sealed = encrypt(&key, &value).unwrap();
            assert_eq!(STANDARD.decode(&sealed).unwrap().len() % BLOCK, 0);
            assert_eq!(decrypt(&key, &sealed).unwrap(), value);
        }
    }

    #[test]
    fn test_decrypt_tolerates_wrapped_base64() {
        let key = [1u8; 32];
        let sealed = encrypt(&key, &json!({"cmd": "power_off", "respbefore": "true"})).unwrap();
        let wrapped = format!("{}\n{}", &sealed[..8], &sealed[8..]);
        assert_eq!(decrypt(&key, &wrapped).unwrap()["cmd"], "power_off");
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let key = [1u8; 32];
        assert!(matches!(decrypt(&key, "!!!"), Err(ApiError::Envelope(_))));
        assert!(matches!(decrypt(&key, "AAAA"), Err(ApiError::Envelope(_))));
    }

    #[test]
    fn test_seal_adds_token_and_wraps() {
        let token = PrivilegedToken {
            host_sign: "sign".to_string(),
            host_passwd_md5: "md5".to_string(),
        };
        let wire: Value = serde_json::from_slice(&token.seal(&json!({"cmd": "reboot"})).unwrap()).unwrap();
        assert_eq!(wire["enc"], 1);
        let inner = token.open(wire["data"].as_str().unwrap()).unwrap();
        assert_eq!(inner, json!({"cmd": "reboot", "token": "sign"}));
    }

    #[test]
    fn test_aes_key_is_sha256_of_md5() {
        let token = PrivilegedToken {
            host_sign: String::new(),
            host_passwd_md5: "abc".to_string(),
        };
        let key = token.aes_key();
        assert_eq!(key[..4], [0xba, 0x78, 0x16, 0xbf]);
    }
}
