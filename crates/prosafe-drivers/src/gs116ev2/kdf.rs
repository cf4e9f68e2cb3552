//! Password hashing used by the GS116Ev2 login form.

use hmac::{Hmac, Mac};
use md5::Md5;

use super::consts::{HMAC_MD5_KEY, PASSWORD_BLOCK_LEN};

type HmacMd5 = Hmac<Md5>;

/// Repeats `password` followed by a NUL as many whole times as fit into the
/// block, then NUL-pads to the block length.
fn pad_password(password: &str) -> Vec<u8> {
    let mut unit = password.as_bytes().to_vec();
    unit.push(0);

    let repeat = PASSWORD_BLOCK_LEN / unit.len();
    let mut block = unit.repeat(repeat);
    block.resize(PASSWORD_BLOCK_LEN, 0);
    block
}

/// Hex HMAC-MD5 of the padded password, as posted by the login form.
pub fn password_kdf(password: &str) -> String {
    let mut mac =
        HmacMd5::new_from_slice(HMAC_MD5_KEY.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&pad_password(password));
    hex::encode(mac.finalize().into_bytes())
}
