/// Price of `seat_count` seats at `seat_price` minor units each.
pub fn quote(seat_price: i64, seat_count: usize) -> Result<i64, PricingError> {
    if seat_price <= 0 {
        return Err(PricingError::InvalidSeatPrice(seat_price));
    }
    i64::try_from(seat_count)
        .ok()
        .and_then(|count| seat_price.checked_mul(count))
        .ok_or(PricingError::Overflow)
}

/// The client quotes what it saw on screen; a stale price is rejected rather than charged.
pub fn ensure_expected(quoted: i64, expected: i64) -> Result<(), PricingError> {
    if quoted == expected {
        Ok(())
    } else {
        Err(PricingError::PriceMismatch { expected, actual: quoted })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("Seat price must be positive, got {0}")]
    InvalidSeatPrice(i64),

    #[error("Price overflow")]
    Overflow,

    #[error("Price changed: client expected {expected}, current price is {actual}")]
    PriceMismatch {
        expected: i64,
        actual: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote(4_500_00, 3), Ok(13_500_00));
        assert_eq!(quote(0, 1), Err(PricingError::InvalidSeatPrice(0)));
        assert_eq!(quote(i64::MAX, 2), Err(PricingError::Overflow));
    }

    #[test]
    fn test_stale_client_price() {
        assert!(ensure_expected(9_000_00, 9_000_00).is_ok());
        assert_eq!(
            ensure_expected(9_000_00, 8_000_00),
            Err(PricingError::PriceMismatch { expected: 8_000_00, actual: 9_000_00 })
        );
    }
}
