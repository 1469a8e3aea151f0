use base64::{Engine as _, engine::general_purpose};
use rand::{rngs::OsRng, RngCore};

/// Random bytes in a link id (128 bits).
const LINK_ID_BYTES: usize = 16;
/// Length of the encoded id.
pub const LINK_ID_LEN: usize = 22;

/// Generates a URL-safe link identifier.
pub fn new_link_id() -> String {
    let mut bytes = [0u8; LINK_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Cheap shape check so malformed ids never reach the store.
pub fn is_well_formed(id: &str) -> bool {
    id.len() == LINK_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
