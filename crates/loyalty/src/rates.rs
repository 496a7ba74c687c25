//! Points exchange rates and currency conversion
//!
//! All monetary amounts are integer cents. Points are credited at
//! [`EARN_RATE`] per currency unit spent and charged at [`REDEEM_RATE`] per
//! currency unit of tier price. The 7:1 asymmetry is deliberate: redeeming a
//! tier costs far more points than its cash price would earn, so points can
//! never be cycled through purchases at a profit.

/// Points credited per currency unit spent on a purchase.
pub const EARN_RATE: i64 = 10;

/// Points charged per currency unit of tier price on redemption.
pub const REDEEM_RATE: i64 = 70;

/// Points earned for a cash amount.
///
/// Always floors so a fractional purchase never over-credits. Saturates at
/// extreme amounts; the result never wraps negative.
pub fn earned_points(amount_cents: i64) -> i64 {
    amount_cents.saturating_mul(EARN_RATE) / 100
}

/// Points required to redeem a tier at the given cash price.
///
/// Always ceils so a fractional price never under-charges. Saturates at
/// extreme prices; the result never wraps negative.
pub fn required_points(price_cents: i64) -> i64 {
    price_cents.saturating_mul(REDEEM_RATE).saturating_add(99) / 100
}
