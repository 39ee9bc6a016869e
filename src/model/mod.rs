pub mod attendance;
pub mod kiosk;
pub mod leave;
pub mod location;
pub mod member;
pub mod org;
pub mod role;
pub mod scan;
pub mod shift;
