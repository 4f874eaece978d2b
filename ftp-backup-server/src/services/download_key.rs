//! Daily download keys for archive links.
//!
//! A key is `sha256(filename + YYYY-MM-DD + site_url + salt)` in hex, so a
//! link stops working when the local date changes.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const DOWNLOAD_KEY_SALT: &str = "ftp-backup-secure-key";

pub fn generate_download_key(filename: &str, date: NaiveDate, site_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(site_url.as_bytes());
    hasher.update(DOWNLOAD_KEY_SALT.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time check of `key` against today's key for `filename`.
pub fn validate_download_key(key: &str, filename: &str, date: NaiveDate, site_url: &str) -> bool {
    let expected = generate_download_key(filename, date, site_url);
    key.len() == expected.len() && bool::from(key.as_bytes().ct_eq(expected.as_bytes()))
}
