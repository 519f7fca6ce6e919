//! Report enrichment stages.
//!
//! - Brand extraction from free-text product descriptions
//! - Patient age normalization to years

pub mod age;
pub mod brand;
pub mod stopwords;

pub use age::{
    AGE_SENTINEL, AgeIssue, AgeNormalization, AgeNormalizer, AgeUnit, CANONICAL_AGE_UNIT,
    age_in_years,
};
pub use brand::{BrandExtractor, brand_tokens, extract_brand};
