//! Payment references: `REF-<YYYYMMDD>-<PLATE>-<SUFFIX>`.

use chrono::{DateTime, Utc};
use rand::Rng;
use crate::error::{BookingError, BookingResult};
use crate::repository::TripLock;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 5;
const PLATE_LEN: usize = 7;
const MAX_ATTEMPTS: usize = 16;

/// Uppercased alphanumeric part of a number plate, at most seven characters.
pub fn plate_fragment(number_plate: &str) -> String {
    number_plate
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(PLATE_LEN)
        .collect()
}

pub fn candidate<R: Rng + ?Sized>(departure: DateTime<Utc>, number_plate: &str, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!(
        "REF-{}-{}-{}",
        departure.format("%Y%m%d"),
        plate_fragment(number_plate),
        suffix
    )
}

/// Draw candidates until one is not used by any booking.
pub async fn unique_reference(
    lock: &mut dyn TripLock,
    departure: DateTime<Utc>,
    number_plate: &str,
) -> BookingResult<String> {
    for _ in 0..MAX_ATTEMPTS {
        let reference = candidate(departure, number_plate, &mut rand::thread_rng());
        if !lock.reference_taken(&reference).await? {
            return Ok(reference);
        }
        tracing::debug!(reference = %reference, "Payment reference collision, retrying");
    }
    Err(BookingError::Core(ryde_core::CoreError::StorageError(
        "could not allocate a unique payment reference".to_string(),
    )))
}
