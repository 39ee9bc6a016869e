use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{DeviceClaims, TokenType};
use chrono::NaiveDateTime;
use derive_more::Display;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use uuid::Uuid;

#[derive(Debug, Display, Eq, PartialEq)]
pub enum DeviceAuthError {
    #[display(fmt = "Device Identifier Token Missing")]
    Missing,
    #[display(fmt = "Device Identifier Token Expired")]
    Expired,
    #[display(fmt = "Device Identifier Token Mismatched")]
    Mismatch,
}

fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize
}

/// Mints the device-identifier-token stored on the kiosk row at
/// registration. The same string is handed to the device; every scan must
/// present it back.
pub fn mint_device_token(
    kiosk_id: u64,
    organization_id: u64,
    secret: &str,
    ttl: usize,
) -> (String, DeviceClaims) {
    let claims = DeviceClaims {
        kiosk_id,
        organization_id,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type: TokenType::Device,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("device token encoding cannot fail with HS256");

    (token, claims)
}

/// Verifies the token a device presented against the kiosk's stored token.
/// The presented token must decode with our key, belong to this kiosk, and
/// be byte-equal to the stored one; the stored expiry must not have passed.
pub fn verify_device_token(
    stored: Option<&str>,
    dit_expiry: Option<NaiveDateTime>,
    presented: &str,
    kiosk_id: u64,
    at: NaiveDateTime,
    secret: &str,
) -> Result<(), DeviceAuthError> {
    let stored = stored.ok_or(DeviceAuthError::Missing)?;

    match dit_expiry {
        Some(expiry) if at <= expiry => {}
        _ => return Err(DeviceAuthError::Expired),
    }

    let data = decode::<DeviceClaims>(
        presented,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => DeviceAuthError::Expired,
        _ => DeviceAuthError::Mismatch,
    })?;

    if data.claims.token_type != TokenType::Device
        || data.claims.kiosk_id != kiosk_id
        || stored != presented
    {
        return Err(DeviceAuthError::Mismatch);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    const SECRET: &str = "test-secret";

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 3)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn valid_token_round_trips() {
        let (token, _) = mint_device_token(5, 7, SECRET, 3600);
        let expiry = at() + Duration::hours(1);
        assert_eq!(
            verify_device_token(Some(&token), Some(expiry), &token, 5, at(), SECRET),
            Ok(())
        );
    }

    #[test]
    fn missing_stored_token() {
        let (token, _) = mint_device_token(5, 7, SECRET, 3600);
        assert_eq!(
            verify_device_token(None, Some(at()), &token, 5, at(), SECRET),
            Err(DeviceAuthError::Missing)
        );
    }

    #[test]
    fn expired_by_kiosk_row() {
        let (token, _) = mint_device_token(5, 7, SECRET, 3600);
        let expiry = at() - Duration::minutes(1);
        assert_eq!(
            verify_device_token(Some(&token), Some(expiry), &token, 5, at(), SECRET),
            Err(DeviceAuthError::Expired)
        );
        assert_eq!(
            verify_device_token(Some(&token), None, &token, 5, at(), SECRET),
            Err(DeviceAuthError::Expired)
        );
    }

    #[test]
    fn wrong_kiosk_is_mismatch() {
        let (token, _) = mint_device_token(5, 7, SECRET, 3600);
        let expiry = at() + Duration::hours(1);
        assert_eq!(
            verify_device_token(Some(&token), Some(expiry), &token, 6, at(), SECRET),
            Err(DeviceAuthError::Mismatch)
        );
    }

    #[test]
    fn token_replaced_on_kiosk_is_mismatch() {
        let (stored, _) = mint_device_token(5, 7, SECRET, 3600);
        let (presented, _) = mint_device_token(5, 7, SECRET, 3600);
        let expiry = at() + Duration::hours(1);
        // jti differs, so the strings differ even for the same kiosk
        assert_eq!(
            verify_device_token(Some(&stored), Some(expiry), &presented, 5, at(), SECRET),
            Err(DeviceAuthError::Mismatch)
        );
    }

    #[test]
    fn garbage_token_is_mismatch() {
        let (stored, _) = mint_device_token(5, 7, SECRET, 3600);
        let expiry = at() + Duration::hours(1);
        assert_eq!(
            verify_device_token(Some(&stored), Some(expiry), "not-a-jwt", 5, at(), SECRET),
            Err(DeviceAuthError::Mismatch)
        );
    }
}
