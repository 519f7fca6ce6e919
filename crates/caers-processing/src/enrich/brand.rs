//! Heuristic brand extraction from free-text product descriptions.
//!
//! The brand is not looked up anywhere; it is derived from the product text
//! alone, with a category-dependent rule for how many tokens to keep.

use crate::config::BrandConfig;
use crate::error::Result;
use crate::types::columns;
use crate::utils::string_column;
use polars::prelude::*;
use tracing::{debug, info};

/// Split product text into upper-cased, non-stopword tokens.
///
/// ASCII punctuation is removed before splitting on whitespace, so
/// `"Almonds!!"` and `"Almonds"` produce the same token.
pub fn brand_tokens(product: &str, config: &BrandConfig) -> Vec<String> {
    let cleaned: String = product
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|token| !config.is_stopword(&token.to_lowercase()))
        .map(str::to_uppercase)
        .collect()
}

/// Derive a brand from a product description and its category.
///
/// Multi-token categories keep up to `trim_len` tokens joined by a space;
/// every other category keeps the first token. Returns an empty string
/// when no token survives stopword removal.
pub fn extract_brand(product: &str, category: &str, config: &BrandConfig) -> String {
    let tokens = brand_tokens(product, config);

    if tokens.is_empty() {
        return String::new();
    }

    if config.is_multi_token_category(category) {
        let keep = tokens.len().min(config.trim_len);
        return tokens[..keep].join(" ");
    }

    tokens[0].clone()
}

/// Table-level brand enrichment.
#[derive(Debug, Clone, Default)]
pub struct BrandExtractor {
    config: BrandConfig,
}

impl BrandExtractor {
    pub fn new(config: BrandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrandConfig {
        &self.config
    }

    /// Drop rows without a product and append a `brand` column.
    ///
    /// Returns the enriched table and, for each of its rows, the input row
    /// it came from.
    pub fn enrich(&self, df: &DataFrame) -> Result<(DataFrame, Vec<usize>)> {
        let kept: Vec<usize> = string_column(df, columns::PRODUCT)?
            .into_iter()
            .enumerate()
            .filter_map(|(row, product)| product.map(|_| row))
            .collect();
        let take = IdxCa::from_vec(
            "idx".into(),
            kept.iter().map(|row| *row as IdxSize).collect(),
        );
        let with_product = df.take(&take)?;
        let dropped = df.height() - with_product.height();

        if dropped > 0 {
            debug!("Excluded {} rows without a product", dropped);
        }

        let products = string_column(&with_product, columns::PRODUCT)?;
        let categories = string_column(&with_product, columns::CATEGORY)?;

        let brands: Vec<String> = products
            .into_iter()
            .zip(categories.into_iter())
            .map(|(product, category)| {
                extract_brand(product.unwrap_or_default(), category.unwrap_or_default(), &self.config)
            })
            .collect();

        let empty = brands.iter().filter(|b| b.is_empty()).count();
        info!(
            "Derived brands for {} rows ({} without any brand token)",
            brands.len(),
            empty
        );

        let mut enriched = with_product;
        enriched.with_column(Series::new(columns::BRAND.into(), brands))?;
        Ok((enriched, kept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::string_values;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn pinned_config() -> BrandConfig {
        // Small fixed list so expectations do not depend on the full corpus.
        let stopwords: BTreeSet<String> = ["the", "a", "of", "and", "with"]
            .iter()
            .map(|w| w.to_string())
            .collect();
        BrandConfig {
            trim_len: 2,
            stopwords,
            ..BrandConfig::default()
        }
    }

    #[test]
    fn test_multi_token_category_keeps_two_tokens() {
        let config = pinned_config();
        assert_eq!(
            brand_tokens("Great Value Almonds!!", &config),
            vec!["GREAT", "VALUE", "ALMONDS"]
        );
        assert_eq!(
            extract_brand("Great Value Almonds!!", "Nuts/Edible Seed", &config),
            "GREAT VALUE"
        );
    }

    #[test]
    fn test_other_category_keeps_first_token() {
        let config = pinned_config();
        assert_eq!(extract_brand("The Quorn Burger", "Cosmetics", &config), "QUORN");
    }

    #[test]
    fn test_default_stopwords_match_pinned_examples() {
        let config = BrandConfig::default();
        assert_eq!(
            extract_brand("Great Value Almonds!!", "Nuts/Edible Seed", &config),
            "GREAT VALUE"
        );
        assert_eq!(extract_brand("The Quorn Burger", "Cosmetics", &config), "QUORN");
    }

    #[test]
    fn test_fewer_tokens_than_trim_len() {
        let config = pinned_config();
        assert_eq!(
            extract_brand("the  Centrum.", "Vit/Min/Prot/Unconv Diet(Human/Animal)", &config),
            "CENTRUM"
        );
    }

    #[test]
    fn test_only_stopwords_gives_empty_brand() {
        let config = pinned_config();
        assert_eq!(extract_brand("The, of & a", "Cosmetics", &config), "");
        assert_eq!(extract_brand("", "Nuts/Edible Seed", &config), "");
    }

    #[test]
    fn test_stopword_match_is_case_insensitive() {
        let config = pinned_config();
        assert_eq!(extract_brand("THE Kind Bar", "Snack Food Item", &config), "KIND");
    }

    #[test]
    fn test_punctuation_inside_tokens_is_removed() {
        let config = pinned_config();
        assert_eq!(
            extract_brand("Trader Joe's Pistachios", "Nuts/Edible Seed", &config),
            "TRADER JOES"
        );
    }

    #[test]
    fn test_enrich_drops_rows_without_product() {
        let df = df![
            "report_id" => ["1", "2", "3"],
            "product" => [Some("Blue Diamond Almonds"), None, Some("The Quorn Burger")],
            "category" => [Some("Nuts/Edible Seed"), Some("Cosmetics"), None],
        ]
        .unwrap();

        let extractor = BrandExtractor::new(pinned_config());
        let (enriched, kept) = extractor.enrich(&df).unwrap();

        assert_eq!(kept, vec![0, 2]);
        assert_eq!(enriched.height(), 2);
        assert_eq!(
            string_values(&enriched, "brand").unwrap(),
            vec![Some("BLUE DIAMOND".to_string()), Some("QUORN".to_string())]
        );
        assert_eq!(
            string_values(&enriched, "report_id").unwrap(),
            vec![Some("1".to_string()), Some("3".to_string())]
        );
    }

    #[test]
    fn test_enrich_requires_product_column() {
        let df = df!["report_id" => ["1"], "category" => ["Cosmetics"]].unwrap();
        let result = BrandExtractor::default().enrich(&df);
        assert!(result.is_err());
    }
}
