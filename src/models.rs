use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
    /// Present only if this user is linked to a member record
    pub member_id: Option<u64>,
}

/// Claims carried by a kiosk's device-identifier-token. Minted at kiosk
/// registration, presented with every scan.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub kiosk_id: u64,
    pub organization_id: u64,
    pub exp: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
    Device,
}
