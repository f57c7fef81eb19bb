/*!
 * Content checksums attached to uploads for server-side verification
 */

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};

/// Base64-encoded MD5 digest, the value of a `Content-MD5` header
pub fn content_md5(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    STANDARD.encode(digest)
}
