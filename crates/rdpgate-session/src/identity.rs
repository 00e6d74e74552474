//! Session identity generation

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::SessionError;
use crate::naming::SessionId;

/// Draw a fresh session id from the OS entropy source
///
/// Four random bytes give 2^32 possible ids; collisions between concurrently
/// live sessions are accepted as negligible rather than checked.
pub fn generate() -> Result<SessionId, SessionError> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SessionError::Entropy(e.to_string()))?;
    Ok(SessionId::from_bytes(bytes))
}
