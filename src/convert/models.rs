use crate::config::MAX_PHOTOS;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One line of the source catalog export. Every column is optional text;
/// numeric parsing happens during grouping so bad cells can be recovered.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceRow {
    #[serde(rename = "Handle")]
    pub handle: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Body (HTML)")]
    pub body_html: String,
    #[serde(rename = "Tags")]
    pub tags: String,
    #[serde(rename = "Vendor")]
    pub vendor: String,
    #[serde(rename = "Type")]
    pub product_type: String,
    #[serde(rename = "Image Src")]
    pub image_src: String,
    #[serde(rename = "Option1 Name")]
    pub option1_name: String,
    #[serde(rename = "Option1 Value")]
    pub option1_value: String,
    #[serde(rename = "Option2 Name")]
    pub option2_name: String,
    #[serde(rename = "Option2 Value")]
    pub option2_value: String,
    #[serde(rename = "Variant SKU")]
    pub variant_sku: String,
    #[serde(rename = "Variant Price")]
    pub variant_price: String,
    #[serde(rename = "Variant Image")]
    pub variant_image: String,
    #[serde(rename = "Variant Inventory Qty")]
    pub variant_quantity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Variant {
    pub option1_name: String,
    pub option1_value: String,
    pub option2_name: String,
    pub option2_value: String,
    pub sku: String,
    pub price: f64,
    pub image: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductAggregate {
    pub handle: String,
    pub title: String,
    pub description: String,
    pub tags: String,
    pub vendor: String,
    pub product_type: String,
    pub images: Vec<String>,
    pub variants: Vec<Variant>,
    pub base_price: f64,
    pub total_quantity: u64,
}

impl ProductAggregate {
    pub fn new(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }
}

/// Products keyed by handle, iterated in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct GroupedProducts {
    products: IndexMap<String, ProductAggregate>,
}

impl GroupedProducts {
    pub fn entry(&mut self, handle: &str) -> &mut ProductAggregate {
        self.products
            .entry(handle.to_string())
            .or_insert_with(|| ProductAggregate::new(handle))
    }

    #[cfg(test)]
    pub fn get(&self, handle: &str) -> Option<&ProductAggregate> {
        self.products.get(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProductAggregate> {
        self.products.values()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn variant_count(&self) -> usize {
        self.products.values().map(|product| product.variants.len()).sum()
    }
}

pub const OUTPUT_COLUMNS: [&str; 46] = [
    "Title",
    "Description",
    "Category",
    "Who made it?",
    "What is it?",
    "When was it made?",
    "Renewal options",
    "Product type",
    "Tags",
    "Materials",
    "Production partners",
    "Section",
    "Price",
    "Quantity",
    "SKU",
    "Variation 1",
    "V1 Option",
    "Variation 2",
    "V2 Option",
    "Var Price",
    "Var Quantity",
    "Var SKU",
    "Var Visibility",
    "Var Photo",
    "Shipping profile",
    "Weight",
    "Length",
    "Width",
    "Height",
    "Return policy",
    "Photo 1",
    "Photo 2",
    "Photo 3",
    "Photo 4",
    "Photo 5",
    "Photo 6",
    "Photo 7",
    "Photo 8",
    "Photo 9",
    "Photo 10",
    "Video 1",
    "Digital file 1",
    "Digital file 2",
    "Digital file 3",
    "Digital file 4",
    "Digital file 5",
];

pub const VISIBILITY_ACTIVE: &str = "Active";

/// A row of the target listing schema. Every column is always present;
/// unpopulated columns are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputRow {
    pub title: String,
    pub description: String,
    pub category: String,
    pub who_made_it: String,
    pub what_is_it: String,
    pub when_made: String,
    pub renewal_options: String,
    pub product_type: String,
    pub tags: String,
    pub materials: String,
    pub production_partners: String,
    pub section: String,
    pub price: String,
    pub quantity: String,
    pub sku: String,
    pub variation_1: String,
    pub v1_option: String,
    pub variation_2: String,
    pub v2_option: String,
    pub var_price: String,
    pub var_quantity: String,
    pub var_sku: String,
    pub var_visibility: String,
    pub var_photo: String,
    pub shipping_profile: String,
    pub weight: String,
    pub length: String,
    pub width: String,
    pub height: String,
    pub return_policy: String,
    pub photos: [String; MAX_PHOTOS],
    pub video: String,
    pub digital_files: [String; 5],
}

impl OutputRow {
    pub fn primary_photo(&self) -> Option<&str> {
        let photo = self.photos[0].trim();
        (!photo.is_empty()).then_some(photo)
    }

    /// SKU used to label the row in logs and reports.
    pub fn label_sku(&self) -> &str {
        if self.sku.is_empty() {
            &self.var_sku
        } else {
            &self.sku
        }
    }

    /// Cell values in `OUTPUT_COLUMNS` order.
    pub fn cells(&self) -> Vec<&str> {
        let mut cells: Vec<&str> = vec![
            self.title.as_str(),
            self.description.as_str(),
            self.category.as_str(),
            self.who_made_it.as_str(),
            self.what_is_it.as_str(),
            self.when_made.as_str(),
            self.renewal_options.as_str(),
            self.product_type.as_str(),
            self.tags.as_str(),
            self.materials.as_str(),
            self.production_partners.as_str(),
            self.section.as_str(),
            self.price.as_str(),
            self.quantity.as_str(),
            self.sku.as_str(),
            self.variation_1.as_str(),
            self.v1_option.as_str(),
            self.variation_2.as_str(),
            self.v2_option.as_str(),
            self.var_price.as_str(),
            self.var_quantity.as_str(),
            self.var_sku.as_str(),
            self.var_visibility.as_str(),
            self.var_photo.as_str(),
            self.shipping_profile.as_str(),
            self.weight.as_str(),
            self.length.as_str(),
            self.width.as_str(),
            self.height.as_str(),
            self.return_policy.as_str(),
        ];
        cells.extend(self.photos.iter().map(String::as_str));
        cells.push(&self.video);
        cells.extend(self.digital_files.iter().map(String::as_str));
        cells
    }

    fn cells_mut(&mut self) -> Vec<&mut String> {
        let mut cells: Vec<&mut String> = vec![
            &mut self.title,
            &mut self.description,
            &mut self.category,
            &mut self.who_made_it,
            &mut self.what_is_it,
            &mut self.when_made,
            &mut self.renewal_options,
            &mut self.product_type,
            &mut self.tags,
            &mut self.materials,
            &mut self.production_partners,
            &mut self.section,
            &mut self.price,
            &mut self.quantity,
            &mut self.sku,
            &mut self.variation_1,
            &mut self.v1_option,
            &mut self.variation_2,
            &mut self.v2_option,
            &mut self.var_price,
            &mut self.var_quantity,
            &mut self.var_sku,
            &mut self.var_visibility,
            &mut self.var_photo,
            &mut self.shipping_profile,
            &mut self.weight,
            &mut self.length,
            &mut self.width,
            &mut self.height,
            &mut self.return_policy,
        ];
        cells.extend(self.photos.iter_mut());
        cells.push(&mut self.video);
        cells.extend(self.digital_files.iter_mut());
        cells
    }

    /// Rebuilds a row from named cells; unknown names are ignored and
    /// missing columns stay empty.
    pub fn from_named_cells<'a>(named: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let lookup: HashMap<&str, &str> = named.into_iter().collect();
        let mut row = Self::default();
        for (column, cell) in OUTPUT_COLUMNS.iter().zip(row.cells_mut()) {
            if let Some(value) = lookup.get(column) {
                *cell = (*value).to_string();
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_cover_every_column_in_order() {
        let mut row = OutputRow {
            title: "t".into(),
            return_policy: "r".into(),
            video: "v".into(),
            ..OutputRow::default()
        };
        row.photos[9] = "p10".into();
        row.digital_files[4] = "d5".into();
        let cells = row.cells();
        assert_eq!(cells.len(), OUTPUT_COLUMNS.len());
        assert_eq!(cells[0], "t");
        assert_eq!(cells[29], "r");
        assert_eq!(cells[39], "p10");
        assert_eq!(cells[40], "v");
        assert_eq!(cells[45], "d5");
    }

    #[test]
    fn named_cells_ignore_unknown_columns() {
        let row = OutputRow::from_named_cells([
            ("SKU", "00007"),
            ("Photo 1", "https://cdn.example.com/a.jpg"),
            ("Legacy Column", "ignored"),
        ]);
        assert_eq!(row.sku, "00007");
        assert_eq!(row.primary_photo(), Some("https://cdn.example.com/a.jpg"));
        assert!(row.title.is_empty());
    }

    #[test]
    fn grouped_products_keep_first_seen_order() {
        let mut grouped = GroupedProducts::default();
        grouped.entry("b").title = "B".into();
        grouped.entry("a").title = "A".into();
        grouped.entry("b").tags = "x".into();
        let handles: Vec<&str> = grouped.iter().map(|p| p.handle.as_str()).collect();
        assert_eq!(handles, vec!["b", "a"]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.get("b").map(|p| p.tags.as_str()), Some("x"));
    }
}
