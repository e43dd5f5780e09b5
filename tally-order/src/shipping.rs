//! Advisory shipping fees. The order keeps whatever cost the caller finally
//! submits; these functions only suggest one.

use rust_decimal::Decimal;

/// Flat fee added to every cash-on-delivery parcel
pub const COD_HANDLING_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// (inclusive upper weight bound in grams, postage)
const POSTAGE_TABLE: [(u32, i64); 18] = [
    (250, 200),
    (500, 250),
    (1_000, 300),
    (2_000, 400),
    (3_000, 450),
    (4_000, 500),
    (5_000, 550),
    (6_000, 600),
    (7_000, 650),
    (8_000, 700),
    (9_000, 750),
    (10_000, 800),
    (15_000, 850),
    (20_000, 1_100),
    (25_000, 1_600),
    (30_000, 2_100),
    (35_000, 2_600),
    (40_000, 3_100),
];

/// Heavier parcels are charged the last band
const POSTAGE_CEILING: i64 = 3_100;

struct CommissionTier {
    floor: i64,
    ceiling: i64,
    step: i64,
    rate: i64,
}

const COMMISSION_TIERS: [CommissionTier; 4] = [
    CommissionTier { floor: 0, ceiling: 2_000, step: 100, rate: 2 },
    CommissionTier { floor: 2_000, ceiling: 10_000, step: 2_000, rate: 10 },
    CommissionTier { floor: 10_000, ceiling: 50_000, step: 4_000, rate: 50 },
    CommissionTier { floor: 50_000, ceiling: 100_000, step: 5_000, rate: 100 },
];

/// Amounts above this are charged the commission of this amount
pub const COMMISSION_CAP: i64 = 100_000;

/// Weight-banded base fee
pub fn postage(weight_grams: u32) -> Decimal {
    let fee = POSTAGE_TABLE
        .iter()
        .find(|(limit, _)| weight_grams <= *limit)
        .map(|(_, fee)| *fee)
        .unwrap_or(POSTAGE_CEILING);
    Decimal::from(fee)
}

/// COD collection commission on the order amount.
///
/// Each tier charges `ceil(part of amount inside tier / step) * rate` and tiers
/// add up. Amounts above [`COMMISSION_CAP`] pay the capped total (1580).
pub fn commission(order_amount: Decimal) -> Decimal {
    if order_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let amount = order_amount.min(Decimal::from(COMMISSION_CAP));

    let mut total = Decimal::ZERO;
    for tier in &COMMISSION_TIERS {
        let floor = Decimal::from(tier.floor);
        if amount <= floor {
            break;
        }
        let in_tier = amount.min(Decimal::from(tier.ceiling)) - floor;
        let steps = (in_tier / Decimal::from(tier.step)).ceil();
        total += steps * Decimal::from(tier.rate);
    }
    total
}

/// Suggested fee for a parcel.
///
/// `Speed Post` and `Post` pay postage only, `COD` adds commission and the
/// handling fee, every other method (including `Pickup`) is free.
pub fn shipping_cost(weight_grams: u32, order_amount: Decimal, method: &str) -> Decimal {
    match method {
        "Speed Post" | "Post" => postage(weight_grams),
        "COD" => postage(weight_grams) + commission(order_amount) + COD_HANDLING_FEE,
        _ => Decimal::ZERO,
    }
}
