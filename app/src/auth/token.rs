use std::collections::BTreeSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use log::*;
use serde::Deserialize;

use super::{AuthContext, AuthError, KeySet};

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    permissions: Option<BTreeSet<String>>,
}

/// Checks RS256 bearer tokens against a fixed issuer, audience and key set.
#[derive(Debug)]
pub struct TokenVerifier {
    keys: KeySet,
    validation: Validation,
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header =
        header.ok_or_else(|| AuthError::invalid_header("Authorization header is expected."))?;
    let parts = header.split_whitespace().collect::<Vec<_>>();

    match parts.as_slice() {
        [scheme, ..] if !scheme.eq_ignore_ascii_case("bearer") => Err(
            AuthError::invalid_header("Authorization header must start with \"Bearer\"."),
        ),
        [] | [_] => Err(AuthError::invalid_header("Token not found.")),
        [_, token] => Ok(*token),
        _ => Err(AuthError::invalid_header(
            "Authorization header must be bearer token.",
        )),
    }
}

impl TokenVerifier {
    pub fn new(issuer: &str, audience: &str, leeway: u64, keys: KeySet) -> Self {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = leeway;
        TokenVerifier { keys, validation }
    }

    /// Verifies the token carried by an `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = bearer_token(header)?;
        self.verify(token)
    }

    pub fn verify(&self, token: &str) -> Result<AuthContext, AuthError> {
        let header = jsonwebtoken::decode_header(token).map_err(|e| {
            debug!("Undecodable token header: {}", e);
            AuthError::invalid_header("Authorization malformed.")
        })?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_header("Authorization malformed."))?;
        let key = self.keys.get(&kid).ok_or_else(|| {
            debug!("No signing key with id {:?}", kid);
            AuthError::invalid_header("Unable to find the appropriate key.")
        })?;

        let data = jsonwebtoken::decode::<Claims>(token, key, &self.validation).map_err(|e| {
            debug!("Token rejected: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::token_expired(),
                ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidSubject
                | ErrorKind::ImmatureSignature
                | ErrorKind::MissingRequiredClaim(_) => AuthError::invalid_claims(),
                _ => AuthError::invalid_header("Unable to parse authentication token."),
            }
        })?;

        let Claims { sub, permissions } = data.claims;
        let permissions = permissions.ok_or_else(AuthError::missing_permissions)?;
        trace!("Verified token for {:?} with {:?}", sub, permissions);
        Ok(AuthContext {
            subject: sub,
            permissions,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use maplit::btreeset;
    use serde_json::{json, Value};
    use std::time::{SystemTime, UNIX_EPOCH};

    const PRIVATE_KEY: &str = include_str!("../../tests/keys/private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/keys/public.pem");
    const ISSUER: &str = "https://coffee.example.auth0.com/";
    const AUDIENCE: &str = "coffee";

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs()
    }

    fn verifier() -> TokenVerifier {
        let mut keys = KeySet::new();
        keys.add_pem("test-key", PUBLIC_KEY.as_bytes())
            .expect("add key");
        TokenVerifier::new(ISSUER, AUDIENCE, 0, keys)
    }

    fn claims(permissions: &[&str]) -> Value {
        json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "auth0|barista",
            "exp": now() + 600,
            "permissions": permissions,
        })
    }

    fn sign(kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("encoding key");
        jsonwebtoken::encode(&header, claims, &key).expect("sign")
    }

    #[test]
    fn accepts_valid_token() {
        let token = sign(Some("test-key"), &claims(&["get:drinks-detail", "post:drinks"]));
        let ctx = verifier().verify(&token).expect("verify");

        assert_eq!(ctx.subject.as_deref(), Some("auth0|barista"));
        assert_eq!(
            ctx.permissions,
            btreeset! {"get:drinks-detail".to_string(), "post:drinks".to_string()}
        );
    }

    #[test]
    fn accepts_audience_lists() {
        let mut claims = claims(&[]);
        claims["aud"] = json!([AUDIENCE, "https://coffee.example.auth0.com/userinfo"]);
        let token = sign(Some("test-key"), &claims);

        assert!(verifier().verify(&token).is_ok());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let mut claims = claims(&["post:drinks"]);
        claims["exp"] = json!(now() - 600);
        let token = sign(Some("test-key"), &claims);

        assert_eq!(verifier().verify(&token), Err(AuthError::token_expired()));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let mut claims = claims(&["post:drinks"]);
        claims["aud"] = json!("tea");
        let token = sign(Some("test-key"), &claims);

        assert_eq!(verifier().verify(&token), Err(AuthError::invalid_claims()));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let mut claims = claims(&["post:drinks"]);
        claims["iss"] = json!("https://elsewhere.example/");
        let token = sign(Some("test-key"), &claims);

        assert_eq!(verifier().verify(&token), Err(AuthError::invalid_claims()));
    }

    #[test]
    fn missing_expiry_is_rejected() {
        let mut claims = claims(&["post:drinks"]);
        claims.as_object_mut().expect("object").remove("exp");
        let token = sign(Some("test-key"), &claims);

        assert_eq!(verifier().verify(&token), Err(AuthError::invalid_claims()));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let token = sign(Some("other-key"), &claims(&["post:drinks"]));

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::invalid_header(
                "Unable to find the appropriate key."
            ))
        );
    }

    #[test]
    fn token_without_key_id_is_malformed() {
        let token = sign(None, &claims(&["post:drinks"]));

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::invalid_header("Authorization malformed."))
        );
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            verifier().verify("not-a-token"),
            Err(AuthError::invalid_header("Authorization malformed."))
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let honest = sign(Some("test-key"), &claims(&[]));
        let forged = sign(Some("test-key"), &claims(&["delete:drinks"]));
        let honest_parts = honest.split('.').collect::<Vec<_>>();
        let forged_parts = forged.split('.').collect::<Vec<_>>();
        let token = format!(
            "{}.{}.{}",
            honest_parts[0], forged_parts[1], honest_parts[2]
        );

        assert_eq!(
            verifier().verify(&token),
            Err(AuthError::invalid_header(
                "Unable to parse authentication token."
            ))
        );
    }

    #[test]
    fn missing_permissions_claim_is_rejected() {
        let mut claims = claims(&[]);
        claims.as_object_mut().expect("object").remove("permissions");
        let token = sign(Some("test-key"), &claims);

        let err = verifier().verify(&token).expect_err("no permissions");
        assert_eq!(err, AuthError::missing_permissions());
        assert_eq!(err.status, 400);
    }

    #[test]
    fn bearer_header_forms() {
        assert_eq!(bearer_token(Some("Bearer abc")), Ok("abc"));
        assert_eq!(bearer_token(Some("bearer abc")), Ok("abc"));
        assert_eq!(
            bearer_token(None),
            Err(AuthError::invalid_header("Authorization header is expected."))
        );
        assert_eq!(
            bearer_token(Some("Basic abc")),
            Err(AuthError::invalid_header(
                "Authorization header must start with \"Bearer\"."
            ))
        );
        assert_eq!(
            bearer_token(Some("Bearer")),
            Err(AuthError::invalid_header("Token not found."))
        );
        assert_eq!(
            bearer_token(Some("Bearer abc def")),
            Err(AuthError::invalid_header(
                "Authorization header must be bearer token."
            ))
        );
        assert_eq!(
            bearer_token(Some("")),
            Err(AuthError::invalid_header("Token not found."))
        );
    }

    #[test]
    fn authorize_reads_header_value() {
        let token = sign(Some("test-key"), &claims(&["patch:drinks"]));
        let header = format!("Bearer {}", token);
        let ctx = verifier().authorize(Some(&header)).expect("authorize");

        assert!(ctx.has_permission("patch:drinks"));
        assert!(!ctx.has_permission("delete:drinks"));
    }
}
