//! Money arithmetic shared by carts, orders and reviews.
//!
//! All amounts are integer minor units (cents).

use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};

use crate::models::Ratings;

/// Flat sales tax, in percent.
pub const TAX_RATE_PERCENT: i64 = 8;
/// Subtotals strictly above this ship for free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 10_000;
pub const FLAT_SHIPPING: i64 = 1_000;

/// Price a customer pays for one unit.
pub fn unit_price(price: i64, discounted_price: Option<i64>) -> i64 {
    match discounted_price {
        Some(discounted) if discounted <= price => discounted,
        _ => price,
    }
}

pub fn line_total(price: i64, quantity: i32) -> i64 {
    price * i64::from(quantity)
}

/// Sum of `price * quantity` over `(price, quantity)` pairs.
pub fn subtotal<I>(lines: I) -> i64
where
    I: IntoIterator<Item = (i64, i32)>,
{
    lines
        .into_iter()
        .map(|(price, quantity)| line_total(price, quantity))
        .sum()
}

/// 8% of `items_price`, rounded half-up to the cent.
pub fn tax_for(items_price: i64) -> i64 {
    (items_price * TAX_RATE_PERCENT + 50).div_euclid(100)
}

pub fn shipping_for(items_price: i64) -> i64 {
    if items_price > FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub items_price: i64,
    pub tax_price: i64,
    pub shipping_price: i64,
    pub total_price: i64,
}

impl OrderTotals {
    pub fn from_items_price(items_price: i64) -> Self {
        let tax_price = tax_for(items_price);
        let shipping_price = shipping_for(items_price);
        Self {
            items_price,
            tax_price,
            shipping_price,
            total_price: items_price + tax_price + shipping_price,
        }
    }

    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = (i64, i32)>,
    {
        Self::from_items_price(subtotal(lines))
    }
}

/// Mean rating; zero when there are no reviews.
pub fn ratings_from<I>(ratings: I) -> Ratings
where
    I: IntoIterator<Item = i16>,
{
    let (sum, count) = ratings
        .into_iter()
        .fold((0_i64, 0_i32), |(sum, count), r| (sum + i64::from(r), count + 1));
    if count == 0 {
        return Ratings {
            average: 0.0,
            count: 0,
        };
    }
    Ratings {
        average: sum as f64 / f64::from(count),
        count,
    }
}

/// Human-readable order reference: `ORD-<unix millis>-<6 uppercase alphanumerics>`.
pub fn tracking_number(now: DateTime<Utc>) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("ORD-{}-{}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discounted_price_wins_when_present() {
        assert_eq!(unit_price(10_000, Some(8_000)), 8_000);
        assert_eq!(unit_price(10_000, None), 10_000);
    }

    #[test]
    fn discounted_order_example() {
        let price = unit_price(10_000, Some(8_000));
        let totals = OrderTotals::from_lines([(price, 2)]);
        assert_eq!(totals.items_price, 16_000);
        assert_eq!(totals.tax_price, 1_280);
        assert_eq!(totals.shipping_price, 0);
        assert_eq!(totals.total_price, 17_280);
    }

    #[test]
    fn shipping_is_charged_at_exactly_the_threshold() {
        let totals = OrderTotals::from_items_price(10_000);
        assert_eq!(totals.shipping_price, 1_000);
        assert_eq!(totals.tax_price, 800);
        assert_eq!(totals.total_price, 11_800);

        assert_eq!(OrderTotals::from_items_price(10_001).shipping_price, 0);
    }

    #[test]
    fn tax_rounds_half_up_to_the_cent() {
        // 8% of 0.06 = 0.0048 -> 0.00; 8% of 0.07 = 0.0056 -> 0.01
        assert_eq!(tax_for(6), 0);
        assert_eq!(tax_for(7), 1);
        // 8% of 12.34 = 0.9872 -> 0.99
        assert_eq!(tax_for(1_234), 99);
    }

    #[test]
    fn totals_always_add_up() {
        for items_price in [0, 1, 99, 5_000, 9_999, 10_000, 10_001, 123_457] {
            let t = OrderTotals::from_items_price(items_price);
            assert_eq!(t.total_price, t.items_price + t.tax_price + t.shipping_price);
        }
    }

    #[test]
    fn subtotal_sums_price_times_quantity() {
        assert_eq!(subtotal([(1_999, 3), (500, 1)]), 6_497);
        assert_eq!(subtotal(Vec::<(i64, i32)>::new()), 0);
    }

    #[test]
    fn ratings_are_zero_without_reviews() {
        let r = ratings_from(Vec::<i16>::new());
        assert_eq!(r.count, 0);
        assert_eq!(r.average, 0.0);
    }

    #[test]
    fn ratings_average_the_reviews() {
        let r = ratings_from([5, 4, 4]);
        assert_eq!(r.count, 3);
        assert!((r.average - 13.0 / 3.0).abs() < f64::EPSILON);

        let r = ratings_from([5, 3]);
        assert_eq!(r.average, 4.0);
    }

    #[test]
    fn tracking_numbers_are_timestamped_and_unique() {
        let now = Utc::now();
        let a = tracking_number(now);
        let b = tracking_number(now);
        assert!(a.starts_with(&format!("ORD-{}-", now.timestamp_millis())));
        assert_eq!(a.rsplit('-').next().map(str::len), Some(6));
        assert_ne!(a, b);
    }
}
