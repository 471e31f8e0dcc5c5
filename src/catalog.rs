//! Product ranking and conversion from raw store entries to paywall models.

use crate::config::SyncConfig;
use crate::oracle::RawProduct;
use crate::types::{PeriodUnit, ProductModel};

/// Rank of the configured weekly plan.
const WEEKLY_RANK: u32 = 0;

/// Rank of the configured yearly plan.
const YEARLY_RANK: u32 = 1;

/// Paywall rank of a raw product: configured plans first, then by period unit.
pub fn paywall_rank(product: &RawProduct, config: &SyncConfig) -> u32 {
    if config.weekly_product_id.as_deref() == Some(product.id.as_str()) {
        return WEEKLY_RANK;
    }
    if config.yearly_product_id.as_deref() == Some(product.id.as_str()) {
        return YEARLY_RANK;
    }
    product
        .period
        .map(|p| p.unit)
        .unwrap_or(PeriodUnit::Unknown)
        .rank()
}

/// Sort in paywall order. Ties break on product identifier so the
/// result does not depend on the order the store returned.
pub fn rank_products(products: &mut [RawProduct], config: &SyncConfig) {
    products.sort_by(|a, b| {
        paywall_rank(a, config)
            .cmp(&paywall_rank(b, config))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Convert ranked raw entries to paywall models.
pub fn build_models(products: &[RawProduct]) -> Vec<ProductModel> {
    products.iter().map(ProductModel::from_raw).collect()
}

impl ProductModel {
    pub fn from_raw(raw: &RawProduct) -> Self {
        let currency_symbol = raw
            .currency_symbol
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| extract_currency_symbol(&raw.display_price));

        Self {
            product_id: raw.id.clone(),
            display_name: raw.display_name.clone(),
            display_price: raw.display_price.clone(),
            currency_code: raw.currency_code.clone(),
            currency_symbol,
            price: raw.price,
            period: raw.period.unwrap_or_default(),
        }
    }
}

/// Pull the currency symbol out of a localized price string.
///
/// Handles prefix forms ("$9.99", "PLN 9,99"), suffix forms ("9,99 €"),
/// and falls back to every non-digit, non-whitespace character.
pub fn extract_currency_symbol(display_price: &str) -> String {
    let s = display_price.trim();

    if let Some(first_digit) = s.find(|c: char| c.is_ascii_digit()) {
        let prefix = s[..first_digit].trim();
        if !prefix.is_empty() {
            return prefix.to_string();
        }
    }

    if let Some(last_digit) = s.rfind(|c: char| c.is_ascii_digit()) {
        let suffix = s[last_digit + 1..].trim();
        if !suffix.is_empty() {
            return suffix.to_string();
        }
    }

    s.chars()
        .filter(|c| !c.is_numeric() && !c.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SubscriptionPeriod;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    const WEEKLY: &str = "com.demo.pro.weekly";
    const YEARLY: &str = "com.demo.pro.yearly";
    const MONTHLY: &str = "com.demo.pro.monthly";

    fn raw(id: &str, unit: Option<PeriodUnit>) -> RawProduct {
        RawProduct {
            id: id.to_string(),
            display_name: id.to_string(),
            display_price: "$4.99".to_string(),
            currency_code: "USD".to_string(),
            currency_symbol: None,
            price: Decimal::new(499, 2),
            period: unit.map(|u| SubscriptionPeriod::new(u, 1)),
        }
    }

    fn config() -> SyncConfig {
        let mut config = SyncConfig::with_plans(WEEKLY, YEARLY);
        config.product_ids.push(MONTHLY.to_string());
        config
    }

    #[test]
    fn test_configured_plans_rank_first() {
        let config = config();
        // Yearly id carrying a daily period still ranks by identity.
        assert_eq!(paywall_rank(&raw(YEARLY, Some(PeriodUnit::Day)), &config), 1);
        assert_eq!(paywall_rank(&raw(WEEKLY, None), &config), 0);
        assert_eq!(paywall_rank(&raw(MONTHLY, Some(PeriodUnit::Month)), &config), 2);
        assert_eq!(paywall_rank(&raw("lifetime", None), &config), 99);
    }

    #[test]
    fn test_ties_break_on_identifier() {
        let config = SyncConfig::default();
        let mut products = vec![
            raw("b.month", Some(PeriodUnit::Month)),
            raw("a.month", Some(PeriodUnit::Month)),
        ];
        rank_products(&mut products, &config);
        assert_eq!(products[0].id, "a.month");
        assert_eq!(products[1].id, "b.month");
    }

    proptest! {
        #[test]
        fn prop_rank_ignores_input_order(
            products in Just(vec![
                raw(YEARLY, Some(PeriodUnit::Year)),
                raw(WEEKLY, Some(PeriodUnit::Week)),
                raw(MONTHLY, Some(PeriodUnit::Month)),
            ]).prop_shuffle()
        ) {
            let mut products = products;
            rank_products(&mut products, &config());
            let ids: Vec<&str> = products.iter().map(|p| p.id.as_str()).collect();
            prop_assert_eq!(ids, vec![WEEKLY, YEARLY, MONTHLY]);
        }
    }

    #[test]
    fn test_extract_currency_symbol() {
        assert_eq!(extract_currency_symbol("$9.99"), "$");
        assert_eq!(extract_currency_symbol("¥300"), "¥");
        assert_eq!(extract_currency_symbol("PLN 9,99"), "PLN");
        assert_eq!(extract_currency_symbol("9,99 €"), "€");
        assert_eq!(extract_currency_symbol("  US$ 4.99 "), "US$");
        assert_eq!(extract_currency_symbol("Free"), "Free");
    }

    #[test]
    fn test_model_prefers_explicit_symbol() {
        let mut entry = raw(WEEKLY, Some(PeriodUnit::Week));
        entry.currency_symbol = Some("US$".into());
        let model = ProductModel::from_raw(&entry);
        assert_eq!(model.currency_symbol, "US$");
        assert!(model.is_weekly());

        entry.currency_symbol = None;
        assert_eq!(ProductModel::from_raw(&entry).currency_symbol, "$");
    }

    #[test]
    fn test_model_without_period_is_unknown() {
        let model = ProductModel::from_raw(&raw("lifetime", None));
        assert_eq!(model.period.unit, PeriodUnit::Unknown);
        assert_eq!(model.period.value, 0);
    }
}
