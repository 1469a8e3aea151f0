use crate::config::{LockSurcharge, PricingConfig};
use crate::error::DomainError;
use crate::models::link::{ContentType, LinkOptions};

/// One day in milliseconds.
pub const DAY_MS: i64 = 86_400_000;

fn invalid(msg: &str) -> DomainError {
    DomainError::Validation(msg.to_string())
}

/// Rejects option combinations that have no price.
pub fn check_options(
    content_type: ContentType,
    size_bytes: Option<u64>,
    options: &LinkOptions,
) -> Result<(), DomainError> {
    if content_type == ContentType::File && size_bytes.is_none() {
        return Err(invalid("File links require a size"));
    }
    if options.max_views == Some(0) {
        return Err(invalid("max_views must be at least 1"));
    }
    if options.timer_ms.is_some_and(|t| t <= 0) {
        return Err(invalid("timer must be positive"));
    }
    if options.password.as_deref().is_some_and(str::is_empty) {
        return Err(invalid("password must not be empty"));
    }
    if options.allowed_regions.as_ref().is_some_and(Vec::is_empty) {
        return Err(invalid("allowed_regions must not be empty"));
    }
    if options.device_id.as_deref().is_some_and(|d| d.trim().is_empty()) {
        return Err(invalid("device_id must not be empty"));
    }
    Ok(())
}

/// Extra credits for timers longer than a day: one per started day beyond the first.
pub fn timer_surcharge(timer_ms: Option<i64>) -> i64 {
    match timer_ms {
        Some(t) if t > DAY_MS => ((t - DAY_MS) as u64).div_ceil(DAY_MS as u64) as i64,
        _ => 0,
    }
}

/// Credit cost of a link with the given type, size and options.
pub fn cost(
    pricing: &PricingConfig,
    content_type: ContentType,
    size_bytes: Option<u64>,
    options: &LinkOptions,
) -> Result<i64, DomainError> {
    check_options(content_type, size_bytes, options)?;

    let mut total = match (content_type, size_bytes) {
        (ContentType::Text, _) => pricing.text_cost,
        (ContentType::File, Some(size)) if size > pricing.file_large_threshold => {
            pricing.file_large_cost
        }
        (ContentType::File, _) => pricing.file_small_cost,
    };

    if options.password.is_some() {
        total += pricing.password_cost;
    }
    if options.screenshot_block {
        total += pricing.screenshot_block_cost;
    }
    if options.camouflage {
        total += pricing.camouflage_cost;
    }

    let locks = options.has_region_lock() as i64 + options.has_device_lock() as i64;
    total += match pricing.lock_surcharge {
        LockSurcharge::Combined if locks > 0 => pricing.lock_cost,
        LockSurcharge::Combined => 0,
        LockSurcharge::Additive => locks * pricing.lock_cost,
    };

    total += timer_surcharge(options.timer_ms);

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing() -> PricingConfig {
        PricingConfig::default()
    }

    #[test]
    fn plain_text_costs_one() {
        assert_eq!(cost(&pricing(), ContentType::Text, None, &LinkOptions::default()), Ok(1));
    }

    #[test]
    fn seven_day_timer_adds_six() {
        let options = LinkOptions {
            timer_ms: Some(7 * DAY_MS),
            ..Default::default()
        };
        assert_eq!(timer_surcharge(options.timer_ms), 6);
        assert_eq!(cost(&pricing(), ContentType::Text, None, &options), Ok(7));
    }

    #[test]
    fn timer_surcharge_rounds_partial_days_up() {
        assert_eq!(timer_surcharge(None), 0);
        assert_eq!(timer_surcharge(Some(DAY_MS)), 0);
        assert_eq!(timer_surcharge(Some(DAY_MS + 1)), 1);
        assert_eq!(timer_surcharge(Some(2 * DAY_MS)), 1);
        assert_eq!(timer_surcharge(Some(2 * DAY_MS + 1)), 2);
    }

    #[test]
    fn file_base_depends_on_threshold() {
        let options = LinkOptions::default();
        let threshold = pricing().file_large_threshold;
        assert_eq!(cost(&pricing(), ContentType::File, Some(threshold), &options), Ok(3));
        assert_eq!(cost(&pricing(), ContentType::File, Some(threshold + 1), &options), Ok(5));
    }

    #[test]
    fn every_feature_adds_its_price() {
        let options = LinkOptions {
            password: Some("pw".into()),
            screenshot_block: true,
            camouflage: true,
            ..Default::default()
        };
        assert_eq!(cost(&pricing(), ContentType::Text, None, &options), Ok(1 + 1 + 2 + 3));
    }

    #[test]
    fn region_and_device_lock_under_both_policies() {
        let both = LinkOptions {
            allowed_regions: Some(vec!["US".into()]),
            device_id: Some("device".into()),
            ..Default::default()
        };
        let region_only = LinkOptions {
            allowed_regions: Some(vec!["US".into()]),
            ..Default::default()
        };

        let combined = pricing();
        assert_eq!(cost(&combined, ContentType::Text, None, &both), Ok(3));
        assert_eq!(cost(&combined, ContentType::Text, None, &region_only), Ok(3));

        let additive = PricingConfig {
            lock_surcharge: LockSurcharge::Additive,
            ..pricing()
        };
        assert_eq!(cost(&additive, ContentType::Text, None, &both), Ok(5));
        assert_eq!(cost(&additive, ContentType::Text, None, &region_only), Ok(3));
    }

    #[test]
    fn invalid_combinations_are_rejected_not_clamped() {
        let p = pricing();
        assert!(cost(&p, ContentType::File, None, &LinkOptions::default()).is_err());

        for options in [
            LinkOptions { max_views: Some(0), ..Default::default() },
            LinkOptions { timer_ms: Some(0), ..Default::default() },
            LinkOptions { timer_ms: Some(-5), ..Default::default() },
            LinkOptions { password: Some(String::new()), ..Default::default() },
            LinkOptions { allowed_regions: Some(vec![]), ..Default::default() },
            LinkOptions { device_id: Some(" ".into()), ..Default::default() },
        ] {
            assert!(
                matches!(
                    cost(&p, ContentType::Text, None, &options),
                    Err(DomainError::Validation(_))
                ),
                "{options:?}"
            );
        }
    }

    #[test]
    fn key_order_does_not_change_cost() {
        let a: LinkOptions = sonic_rs::from_str(
            r#"{"password":"x","camouflage":true,"timer_ms":172800001,"allowed_regions":["US"]}"#,
        )
        .unwrap();
        let b: LinkOptions = sonic_rs::from_str(
            r#"{"allowed_regions":["US"],"timer_ms":172800001,"camouflage":true,"password":"x"}"#,
        )
        .unwrap();
        assert_eq!(a, b);
        assert_eq!(
            cost(&pricing(), ContentType::Text, None, &a),
            cost(&pricing(), ContentType::Text, None, &b)
        );
    }
}
