//! Signature MD5 des appels Last.fm (`api_sig`)
//!
//! Les paramètres sont triés par nom, concaténés en `nomvaleur`, suivis du
//! secret partagé. `format` et `callback` ne sont jamais signés.

use md5::{Digest, Md5};

const UNSIGNED: [&str; 2] = ["format", "callback"];

pub fn api_signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params
        .iter()
        .filter(|(name, _)| !UNSIGNED.contains(name))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Md5::new();
    for (name, value) in sorted {
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(secret.as_bytes());

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_does_not_matter() {
        let a = api_signature(&[("method", "auth.getSession"), ("api_key", "k"), ("token", "t")], "s");
        let b = api_signature(&[("token", "t"), ("method", "auth.getSession"), ("api_key", "k")], "s");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_known_signature() {
        // md5("api_keykmethodauth.getSessiontokents")
        let sig = api_signature(
            &[("method", "auth.getSession"), ("api_key", "k"), ("token", "t"), ("format", "json")],
            "s",
        );
        let mut hasher = Md5::new();
        hasher.update(b"api_keykmethodauth.getSessiontokents");
        assert_eq!(sig, format!("{:x}", hasher.finalize()));
    }
}
