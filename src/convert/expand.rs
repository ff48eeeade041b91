use crate::config::{ConversionConfig, ListingDefaults, MAX_PHOTOS};
use crate::convert::models::{GroupedProducts, OutputRow, ProductAggregate, VISIBILITY_ACTIVE};
use crate::convert::pricing::{format_price, transform_price};

/// Run-scoped SKU counter. Each call to `next_sku` hands out a fresh,
/// zero-padded value; values are never reused within a run.
#[derive(Debug, Clone)]
pub struct SkuSequence {
    next: u64,
    width: usize,
}

impl SkuSequence {
    pub fn new(width: usize) -> Self {
        Self::starting_at(1, width)
    }

    pub fn starting_at(first: u64, width: usize) -> Self {
        Self { next: first, width }
    }

    pub fn next_sku(&mut self) -> String {
        let value = self.next;
        self.next += 1;
        format!("{value:0width$}", width = self.width)
    }

    pub fn issued(&self) -> u64 {
        self.next.saturating_sub(1)
    }
}

/// Per-run settings consumed by the expander.
#[derive(Debug, Clone)]
pub struct ExpandOptions<'a> {
    pub price_multiplier: f64,
    pub category: &'a str,
    pub product_type: &'a str,
    pub defaults: &'a ListingDefaults,
}

impl<'a> ExpandOptions<'a> {
    pub fn from_config(config: &'a ConversionConfig) -> Self {
        Self {
            price_multiplier: config.price_multiplier,
            category: &config.default_category,
            product_type: &config.default_product_type,
            defaults: &config.defaults,
        }
    }
}

/// Expands every product in first-seen order.
pub fn expand_all(
    products: &GroupedProducts,
    options: &ExpandOptions<'_>,
    skus: &mut SkuSequence,
) -> Vec<OutputRow> {
    products
        .iter()
        .flat_map(|product| expand_product(product, options, skus))
        .collect()
}

/// Turns one product into listing rows. Products with at most one variant
/// yield a single complete row; otherwise every variant gets a row and only
/// the first carries product-level fields.
pub fn expand_product(
    product: &ProductAggregate,
    options: &ExpandOptions<'_>,
    skus: &mut SkuSequence,
) -> Vec<OutputRow> {
    let quantity = options.defaults.default_quantity.to_string();

    if product.variants.len() <= 1 {
        let mut row = product_row(product, options);
        row.price = format_price(transform_price(product.base_price, options.price_multiplier));
        row.quantity = quantity;
        row.sku = skus.next_sku();
        return vec![row];
    }

    let first = &product.variants[0];
    let variation_1 = first.option1_name.clone();
    let variation_2 = first.option2_name.clone();

    product
        .variants
        .iter()
        .enumerate()
        .map(|(idx, variant)| {
            let price = if variant.price > 0.0 {
                transform_price(variant.price, options.price_multiplier)
            } else {
                transform_price(product.base_price, options.price_multiplier)
            };
            let price = format_price(price);
            let sku = skus.next_sku();

            let mut row = if idx == 0 {
                let mut row = product_row(product, options);
                row.price = price.clone();
                row.quantity = quantity.clone();
                row.sku = sku.clone();
                row.variation_1 = variation_1.clone();
                row.variation_2 = variation_2.clone();
                row
            } else {
                OutputRow::default()
            };

            row.v1_option = variant.option1_value.clone();
            row.v2_option = variant.option2_value.clone();
            row.var_price = price;
            row.var_quantity = quantity.clone();
            row.var_sku = sku;
            if !row.v1_option.is_empty() || !row.v2_option.is_empty() {
                row.var_visibility = VISIBILITY_ACTIVE.to_string();
            }
            row
        })
        .collect()
}

fn product_row(product: &ProductAggregate, options: &ExpandOptions<'_>) -> OutputRow {
    let defaults = options.defaults;
    let mut row = OutputRow {
        category: options.category.to_string(),
        who_made_it: defaults.who_made_it.clone(),
        what_is_it: defaults.what_is_it.clone(),
        when_made: defaults.when_made.clone(),
        renewal_options: defaults.renewal_options.clone(),
        product_type: capitalize(options.product_type),
        materials: defaults.materials.clone(),
        production_partners: defaults.production_partners.clone(),
        section: defaults.section.clone(),
        shipping_profile: defaults.shipping_profile.clone(),
        return_policy: defaults.return_policy.clone(),
        ..OutputRow::default()
    };
    for (slot, image) in row.photos.iter_mut().zip(product.images.iter().take(MAX_PHOTOS)) {
        *slot = image.clone();
    }
    row
}

fn capitalize(value: &str) -> String {
    let mut chars = value.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::models::Variant;

    fn config() -> ConversionConfig {
        ConversionConfig {
            default_category: "Home & Living > Bathroom".into(),
            ..ConversionConfig::default()
        }
    }

    fn variant(price: f64, option: &str) -> Variant {
        Variant {
            option1_name: "Color".into(),
            option1_value: option.into(),
            price,
            ..Variant::default()
        }
    }

    #[test]
    fn sku_sequence_pads_and_never_repeats() {
        let mut skus = SkuSequence::new(5);
        assert_eq!(skus.next_sku(), "00001");
        assert_eq!(skus.next_sku(), "00002");
        assert_eq!(skus.issued(), 2);
        let mut wide = SkuSequence::starting_at(123456, 5);
        assert_eq!(wide.next_sku(), "123456");
    }

    #[test]
    fn single_variant_product_is_one_full_row() {
        let config = config();
        let options = ExpandOptions::from_config(&config);
        let product = ProductAggregate {
            images: vec!["https://cdn.example.com/a.jpg".into()],
            variants: vec![variant(10.0, "")],
            base_price: 10.0,
            ..ProductAggregate::new("a")
        };
        let mut skus = SkuSequence::new(5);
        let rows = expand_product(&product, &options, &mut skus);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.price, "39.99");
        assert_eq!(row.quantity, "8");
        assert_eq!(row.sku, "00001");
        assert_eq!(row.category, "Home & Living > Bathroom");
        assert_eq!(row.product_type, "Physical");
        assert_eq!(row.shipping_profile, "Free Delivery");
        assert_eq!(row.primary_photo(), Some("https://cdn.example.com/a.jpg"));
        assert!(row.var_sku.is_empty());
        assert!(row.var_visibility.is_empty());
    }

    #[test]
    fn product_without_variants_still_gets_a_row() {
        let config = config();
        let options = ExpandOptions::from_config(&config);
        let product = ProductAggregate::new("bare");
        let mut skus = SkuSequence::new(5);
        let rows = expand_product(&product, &options, &mut skus);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, "0");
        assert_eq!(rows[0].sku, "00001");
    }

    #[test]
    fn multi_variant_product_is_sparse_after_first_row() {
        let config = config();
        let options = ExpandOptions::from_config(&config);
        let product = ProductAggregate {
            images: vec!["https://cdn.example.com/b1.jpg".into()],
            variants: vec![variant(20.0, "Red"), variant(0.0, "Blue"), variant(25.0, "")],
            base_price: 20.0,
            ..ProductAggregate::new("b")
        };
        let mut skus = SkuSequence::starting_at(7, 5);
        let rows = expand_product(&product, &options, &mut skus);
        assert_eq!(rows.len(), 3);

        let with_category: Vec<_> = rows.iter().filter(|r| !r.category.is_empty()).collect();
        assert_eq!(with_category.len(), 1);

        assert_eq!(rows[0].variation_1, "Color");
        assert_eq!(rows[0].price, "79.99");
        assert_eq!(rows[0].sku, "00007");
        assert_eq!(rows[0].var_sku, "00007");
        assert_eq!(rows[0].var_visibility, VISIBILITY_ACTIVE);
        assert!(rows[0].primary_photo().is_some());

        // zero-priced variant falls back to the product base price
        assert_eq!(rows[1].var_price, "79.99");
        assert_eq!(rows[1].var_sku, "00008");
        assert!(rows[1].price.is_empty());
        assert!(rows[1].sku.is_empty());
        assert!(rows[1].who_made_it.is_empty());
        assert!(!rows[1].primary_photo().is_some());

        assert_eq!(rows[2].var_price, "99.99");
        assert!(rows[2].var_visibility.is_empty());
        assert_eq!(rows[2].var_quantity, "8");
    }

    #[test]
    fn skus_increase_across_products() {
        let config = config();
        let options = ExpandOptions::from_config(&config);
        let mut grouped = GroupedProducts::default();
        grouped.entry("one").variants = vec![variant(5.0, "")];
        grouped.entry("two").variants = vec![variant(5.0, "S"), variant(6.0, "M")];
        let mut skus = SkuSequence::new(5);
        let rows = expand_all(&grouped, &options, &mut skus);
        let issued: Vec<&str> = rows.iter().map(|r| r.label_sku()).collect();
        assert_eq!(issued, vec!["00001", "00002", "00003"]);
        assert_eq!(skus.issued(), 3);
    }

    #[test]
    fn capitalize_matches_sheet_convention() {
        assert_eq!(capitalize("physical"), "Physical");
        assert_eq!(capitalize("DIGITAL"), "Digital");
        assert_eq!(capitalize(""), "");
    }
}
