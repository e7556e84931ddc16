//! Armor mitigation.

use crate::components::Armor;
use crate::math::Fixed;

/// Damage left after armor.
///
/// Flat reduction applies first, then the percentage. The result never drops
/// below `damage * (1 - cap)`, so heavy armor still lets a guaranteed share
/// through.
#[must_use]
pub fn reduce_damage(damage: Fixed, armor: Armor, cap: Fixed) -> Fixed {
    if damage <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let percent = armor.percent.clamp(Fixed::ZERO, Fixed::ONE);
    let after_flat = (damage - armor.flat.max(Fixed::ZERO)).max(Fixed::ZERO);
    let mitigated = after_flat.saturating_mul(Fixed::ONE - percent);
    let floor = damage.saturating_mul(Fixed::ONE - cap.clamp(Fixed::ZERO, Fixed::ONE));
    mitigated.max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn armor(flat: i32, percent: f64) -> Armor {
        Armor::new(Fixed::from_num(flat), Fixed::from_num(percent))
    }

    #[test]
    fn test_flat_then_percent() {
        let reduced = reduce_damage(Fixed::from_num(20), armor(4, 0.5), Fixed::from_num(0.75));
        assert_eq!(reduced, Fixed::from_num(8));
    }

    #[test]
    fn test_cap_guarantees_minimum_damage() {
        // 20 - 30 flat would be zero; the cap lets 25% through.
        let reduced = reduce_damage(Fixed::from_num(20), armor(30, 0.0), Fixed::from_num(0.75));
        assert_eq!(reduced, Fixed::from_num(5));
    }

    #[test]
    fn test_no_armor_passes_damage_through() {
        let reduced = reduce_damage(Fixed::from_num(13), Armor::default(), Fixed::from_num(0.75));
        assert_eq!(reduced, Fixed::from_num(13));
    }

    proptest! {
        #[test]
        fn prop_reduction_bounded_and_monotonic(
            a in 0i32..10_000,
            b in 0i32..10_000,
            flat in 0i32..200,
            percent in 0u32..=100,
            cap in 0u32..=100,
        ) {
            let armor = Armor::new(Fixed::from_num(flat), Fixed::from_num(percent) / 100);
            let cap = Fixed::from_num(cap) / 100;
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let low = Fixed::from_num(low);
            let high = Fixed::from_num(high);

            let reduced_low = reduce_damage(low, armor, cap);
            let reduced_high = reduce_damage(high, armor, cap);
            prop_assert!(reduced_low <= reduced_high);
            prop_assert!(reduced_high <= high);
            prop_assert!(reduced_high >= high * (Fixed::ONE - cap));
        }
    }
}
