pub mod db_utils;
pub mod enrollment_filter;
pub mod gallery_cache;
pub mod org_cache;
